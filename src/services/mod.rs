//! 业务能力层
//!
//! 每个服务只包装一组表的读写，不关心学习流程的先后顺序。

pub mod activity_logger;
pub mod badge_service;
pub mod progress_service;
pub mod reading_log_service;
pub mod roster_service;
pub mod story_service;

pub use activity_logger::ActivityLogger;
pub use badge_service::BadgeService;
pub use progress_service::{LevelOverride, ProgressService};
pub use reading_log_service::ReadingLogService;
pub use roster_service::{RosterService, StudentList};
pub use story_service::StoryService;
