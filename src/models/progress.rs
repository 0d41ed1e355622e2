//! 学生进度
//!
//! 每个 (学生, 故事) 一行，记录当前等级 / 步骤、已完成等级与积分。

use serde::{Deserialize, Serialize};

use crate::error::BusinessError;

/// 最高等级
pub const MAX_LEVEL: u8 = 5;

/// 校验等级在 1..=5 之内
pub fn validate_level(level: u8) -> Result<u8, BusinessError> {
    if (1..=MAX_LEVEL).contains(&level) {
        Ok(level)
    } else {
        Err(BusinessError::InvalidLevel { level })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentProgress {
    #[serde(default)]
    pub id: Option<i64>,
    pub student_id: i64,
    pub story_id: i64,
    pub current_level: u8,
    pub current_step: u32,
    #[serde(default)]
    pub completed_levels: Vec<u8>,
    #[serde(default)]
    pub points: u32,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl StudentProgress {
    /// 新行（尚未写入）
    pub fn fresh(student_id: i64, story_id: i64, level: u8, step: u32) -> Self {
        Self {
            id: None,
            student_id,
            story_id,
            current_level: level,
            current_step: step.max(1),
            completed_levels: Vec::new(),
            points: 0,
            completed: false,
            updated_at: None,
        }
    }

    /// 第 5 级完成即视为故事完成
    pub fn is_story_completed(&self) -> bool {
        self.completed_levels.contains(&MAX_LEVEL)
    }

    /// 标记某个等级完成，并把指针移到下一个等级的第一步
    pub fn mark_level_completed(&mut self, level: u8) -> Result<(), BusinessError> {
        let level = validate_level(level)?;
        if !self.completed_levels.contains(&level) {
            self.completed_levels.push(level);
            self.completed_levels.sort_unstable();
        }
        self.current_level = (level + 1).min(MAX_LEVEL);
        self.current_step = 1;
        self.completed = self.is_story_completed();
        Ok(())
    }

    /// 写库时使用的 JSON（不带 id）
    pub fn to_row(&self) -> serde_json::Value {
        serde_json::json!({
            "student_id": self.student_id,
            "story_id": self.story_id,
            "current_level": self.current_level,
            "current_step": self.current_step,
            "completed_levels": self.completed_levels,
            "points": self.points,
            "completed": self.completed,
            "updated_at": chrono::Utc::now().to_rfc3339(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_requires_level_five() {
        let mut p = StudentProgress::fresh(1, 1, 1, 1);
        p.completed_levels = vec![1];
        assert!(!p.is_story_completed());
        p.completed_levels = vec![1, 2, 3, 4, 5];
        assert!(p.is_story_completed());
    }

    #[test]
    fn mark_level_completed_moves_pointer_and_caps_at_five() {
        let mut p = StudentProgress::fresh(1, 1, 4, 3);
        p.mark_level_completed(4).unwrap();
        assert_eq!((p.current_level, p.current_step), (5, 1));
        assert!(!p.completed);

        p.mark_level_completed(5).unwrap();
        p.mark_level_completed(5).unwrap();
        assert_eq!(p.current_level, 5);
        assert_eq!(p.completed_levels, vec![4, 5]);
        assert!(p.completed);
    }

    #[test]
    fn out_of_range_levels_are_rejected() {
        assert!(validate_level(0).is_err());
        assert!(validate_level(6).is_err());
        let mut p = StudentProgress::fresh(1, 1, 1, 1);
        assert!(p.mark_level_completed(9).is_err());
    }
}
