//! 学习进度服务 - 业务能力层
//!
//! 每个 (学生, 故事) 一行 student_progress。所有写操作都是
//! "先读后写"，没有事务和乐观锁，并发完成事件下以最后一次写入为准。

use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use crate::clients::store::{from_row, from_rows, tables, DataStore, Query};
use crate::models::progress::validate_level;
use crate::models::StudentProgress;

/// 管理员改等级的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelOverride {
    Inserted,
    Updated,
}

pub struct ProgressService {
    store: Arc<dyn DataStore>,
}

fn key(student_id: i64, story_id: i64) -> Query {
    Query::new()
        .eq("student_id", student_id)
        .eq("story_id", story_id)
}

impl ProgressService {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    pub async fn get_student_progress(
        &self,
        student_id: i64,
        story_id: i64,
    ) -> Result<Option<StudentProgress>> {
        let row = self
            .store
            .select_one(tables::STUDENT_PROGRESS, &key(student_id, story_id))
            .await?;
        Ok(row
            .map(|r| from_row(tables::STUDENT_PROGRESS, r))
            .transpose()?)
    }

    /// 学生所有故事的进度
    pub async fn get_all_progress(&self, student_id: i64) -> Result<Vec<StudentProgress>> {
        let rows = self
            .store
            .select(
                tables::STUDENT_PROGRESS,
                &Query::new().eq("student_id", student_id).order("story_id", true),
            )
            .await?;
        Ok(from_rows(tables::STUDENT_PROGRESS, rows)?)
    }

    /// 当前等级；没有进度行时为 1
    pub async fn get_current_level(&self, student_id: i64, story_id: i64) -> Result<u8> {
        Ok(self
            .get_student_progress(student_id, story_id)
            .await?
            .map_or(1, |p| p.current_level))
    }

    /// completed_levels 包含 5 时视为完成
    pub async fn is_story_completed(&self, student_id: i64, story_id: i64) -> Result<bool> {
        Ok(self
            .get_student_progress(student_id, story_id)
            .await?
            .map_or(false, |p| p.is_story_completed()))
    }

    /// 写入整行：有 id 时更新，否则插入
    async fn save(&self, progress: &StudentProgress) -> Result<StudentProgress> {
        let row = match progress.id {
            Some(id) => self
                .store
                .update(
                    tables::STUDENT_PROGRESS,
                    &Query::new().eq("id", id),
                    progress.to_row(),
                )
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| anyhow::anyhow!("进度行 #{} 已不存在", id))?,
            None => {
                self.store
                    .insert(tables::STUDENT_PROGRESS, progress.to_row())
                    .await?
            }
        };
        Ok(from_row(tables::STUDENT_PROGRESS, row)?)
    }

    async fn load_or_fresh(&self, student_id: i64, story_id: i64, level: u8) -> Result<StudentProgress> {
        Ok(self
            .get_student_progress(student_id, story_id)
            .await?
            .unwrap_or_else(|| StudentProgress::fresh(student_id, story_id, level, 1)))
    }

    /// 记录当前步骤指针
    pub async fn advance_step(
        &self,
        student_id: i64,
        story_id: i64,
        level: u8,
        step: u32,
    ) -> Result<StudentProgress> {
        let level = validate_level(level)?;
        let mut progress = self.load_or_fresh(student_id, story_id, level).await?;
        progress.current_level = level;
        progress.current_step = step.max(1);
        debug!(
            "[学生 {} 故事 {}] 指针 → 等级 {} 步骤 {}",
            student_id, story_id, level, progress.current_step
        );
        self.save(&progress).await
    }

    /// 完成一个等级：记入 completed_levels，指针移到下一等级，加积分
    pub async fn complete_level(
        &self,
        student_id: i64,
        story_id: i64,
        level: u8,
        points: u32,
    ) -> Result<StudentProgress> {
        let mut progress = self.load_or_fresh(student_id, story_id, level).await?;
        progress.mark_level_completed(level)?;
        progress.points = progress.points.saturating_add(points);
        let saved = self.save(&progress).await?;
        info!(
            "[学生 {} 故事 {}] ✓ 等级 {} 完成，积分 {}",
            student_id, story_id, level, saved.points
        );
        Ok(saved)
    }

    /// 加积分；没有进度行时插入一行
    pub async fn award_points(
        &self,
        student_id: i64,
        story_id: i64,
        points: u32,
    ) -> Result<StudentProgress> {
        let mut progress = self.load_or_fresh(student_id, story_id, 1).await?;
        progress.points = progress.points.saturating_add(points);
        self.save(&progress).await
    }

    /// 管理员直接设置等级
    ///
    /// 没有进度行时插入一行（步骤为 1），否则原地更新
    pub async fn admin_update_level(
        &self,
        student_id: i64,
        story_id: i64,
        level: u8,
    ) -> Result<LevelOverride> {
        let level = validate_level(level)?;
        match self.get_student_progress(student_id, story_id).await? {
            Some(existing) => {
                let id = existing
                    .id
                    .ok_or_else(|| anyhow::anyhow!("进度行缺少 id"))?;
                self.store
                    .update(
                        tables::STUDENT_PROGRESS,
                        &Query::new().eq("id", id),
                        json!({
                            "current_level": level,
                            "current_step": 1,
                            "updated_at": chrono::Utc::now().to_rfc3339(),
                        }),
                    )
                    .await?;
                info!("[学生 {} 故事 {}] 管理员将等级改为 {}", student_id, story_id, level);
                Ok(LevelOverride::Updated)
            }
            None => {
                let fresh = StudentProgress::fresh(student_id, story_id, level, 1);
                self.store
                    .insert(tables::STUDENT_PROGRESS, fresh.to_row())
                    .await?;
                info!("[学生 {} 故事 {}] 管理员创建进度，等级 {}", student_id, story_id, level);
                Ok(LevelOverride::Inserted)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::MemoryStore;

    #[tokio::test]
    async fn advance_then_complete_level() {
        let svc = ProgressService::new(Arc::new(MemoryStore::new()));
        let p = svc.advance_step(7, 1, 1, 3).await.unwrap();
        assert_eq!((p.current_level, p.current_step), (1, 3));

        let p = svc.complete_level(7, 1, 1, 20).await.unwrap();
        assert_eq!((p.current_level, p.current_step), (2, 1));
        assert_eq!(p.completed_levels, vec![1]);
        assert_eq!(p.points, 20);
        assert_eq!(svc.get_current_level(7, 1).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn award_points_accumulates_on_one_row() {
        let store = Arc::new(MemoryStore::new());
        let svc = ProgressService::new(store.clone());
        svc.award_points(1, 1, 5).await.unwrap();
        let p = svc.award_points(1, 1, 5).await.unwrap();
        assert_eq!(p.points, 10);
        assert_eq!(store.count(tables::STUDENT_PROGRESS).await, 1);
    }

    #[tokio::test]
    async fn invalid_levels_are_rejected() {
        let svc = ProgressService::new(Arc::new(MemoryStore::new()));
        assert!(svc.admin_update_level(1, 1, 0).await.is_err());
        assert!(svc.advance_step(1, 1, 6, 1).await.is_err());
    }
}
