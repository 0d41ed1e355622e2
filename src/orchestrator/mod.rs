//! 编排层（Orchestration Layer）
//!
//! ```text
//! tutor_app (学习会话：等级循环、取消、汇总)
//!     ↓
//! level_runner (一个等级：遍历单元、写进度、徽章)
//!     ↓
//! workflow::StepFlow (一个单元)
//!     ↓
//! services / clients / infrastructure
//! ```

pub mod level_runner;
pub mod tutor_app;

pub use level_runner::{LevelRunner, LevelStats};
pub use tutor_app::{App, AppParts, SessionSummary};
