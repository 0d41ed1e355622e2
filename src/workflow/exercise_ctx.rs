//! 单元处理上下文
//!
//! 封装"哪个学生、哪个故事、第几级的第几个单元"这一信息

use std::fmt::Display;

#[derive(Debug, Clone)]
pub struct ExerciseCtx {
    pub student_id: i64,
    pub story_id: i64,
    pub level: u8,
    /// 单元序号（从1开始，对应 current_step）
    pub unit_index: usize,
    pub unit_count: usize,
}

impl ExerciseCtx {
    pub fn new(student_id: i64, story_id: i64, level: u8, unit_index: usize, unit_count: usize) -> Self {
        Self {
            student_id,
            story_id,
            level,
            unit_index,
            unit_count,
        }
    }

    pub fn has_more(&self) -> bool {
        self.unit_index < self.unit_count
    }

    pub fn step(&self) -> u32 {
        self.unit_index as u32
    }
}

impl Display for ExerciseCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[学生 {} 故事 {} 等级 {} 单元 {}/{}]",
            self.student_id, self.story_id, self.level, self.unit_index, self.unit_count
        )
    }
}
