//! 活动日志（只追加）

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    SessionStarted,
    StepStarted,
    StepCompleted,
    LevelCompleted,
    VoiceSubmitted,
    RemoteError,
    MediaError,
    BadgeAwarded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLog {
    pub student_id: i64,
    pub activity_type: ActivityType,
    pub story_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_response: Option<serde_json::Value>,
}

impl ActivityLog {
    pub fn new(student_id: i64, story_id: i64, activity_type: ActivityType) -> Self {
        Self {
            student_id,
            activity_type,
            story_id,
            level: None,
            step: None,
            error_message: None,
            voice_file: None,
            api_response: None,
        }
    }

    pub fn at(mut self, level: u8, step: u32) -> Self {
        self.level = Some(level);
        self.step = Some(step);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_voice_file(mut self, name: impl Into<String>) -> Self {
        self.voice_file = Some(name.into());
        self
    }

    pub fn with_response(mut self, response: serde_json::Value) -> Self {
        self.api_response = Some(response);
        self
    }
}
