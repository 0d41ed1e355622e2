//! # DOST 阅读辅导
//!
//! 儿童分级阅读练习：按故事逐级朗读，录音发送到工作流后端分析，
//! 播放返回的语音反馈；教师 / 管理员通过数据层管理学生、故事与进度。
//!
//! ## 架构设计
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 播放器、录音器、偏好文件、语音缓存
//!
//! ### ② 客户端（Clients）
//! - `clients/store` - 数据层接口（`DataStore`），托管数据库与内存两种实现
//! - `clients/webhook_client` - 工作流后端（分析、语音生成、resumeUrl）
//!
//! ### ③ 业务能力层（Services）
//! - 故事、名单、进度、徽章、活动日志、朗读记录，各管一组表
//!
//! ### ④ 流程层（Workflow）
//! - `Phase` - 单元阶段状态机
//! - `StepFlow` - 一个单元的完整顺序（旁白 → 分析 → 录音 → 回复）
//!
//! ### ⑤ 编排层（Orchestration）
//! - `LevelRunner` - 一个等级
//! - `App` - 学习会话
//!
//! 等级之间的差异全部在声明式计划表 `models::plan` 中。

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod session;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{get_api_base, DataStore, MemoryStore, RestStore, WebhookClient};
pub use config::{ApiEnv, Config};
pub use error::{AppError, AppResult};
pub use orchestrator::{App, AppParts, LevelRunner, LevelStats, SessionSummary};
pub use session::{route, SessionStore, View};
pub use workflow::{Phase, StepFlow, StepOutcome};
