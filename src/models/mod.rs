pub mod activity;
pub mod analysis;
pub mod badge;
pub mod loaders;
pub mod plan;
pub mod progress;
pub mod reading_log;
pub mod story;
pub mod user;

pub use activity::{ActivityLog, ActivityType};
pub use analysis::{AnalysisReply, ReplyAudio};
pub use badge::{Badge, BadgeCriteria, ReadingMetrics, StudentBadge};
pub use loaders::{load_all_plan_files, load_plan_table};
pub use plan::{LevelPlan, PayloadShape, PlanTable, UnitKind, UnitPlan};
pub use progress::{StudentProgress, MAX_LEVEL};
pub use reading_log::ReadingLog;
pub use story::{LevelInfo, LevelStep, Story, StoryDraft};
pub use user::{NewStudent, Role, Student, Teacher, User};
