//! 故事服务 - 业务能力层
//!
//! 故事目录与等级参考数据的增删改查

use anyhow::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::clients::store::{from_row, from_rows, tables, DataStore, Query};
use crate::models::{LevelInfo, LevelStep, Story, StoryDraft};

pub struct StoryService {
    store: Arc<dyn DataStore>,
}

impl StoryService {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    /// 所有故事，按 id 排序
    pub async fn get_stories(&self) -> Result<Vec<Story>> {
        let rows = self
            .store
            .select(tables::STORIES, &Query::new().order("id", true))
            .await?;
        Ok(from_rows(tables::STORIES, rows)?)
    }

    pub async fn get_story(&self, story_id: i64) -> Result<Option<Story>> {
        let row = self
            .store
            .select_one(tables::STORIES, &Query::new().eq("id", story_id))
            .await?;
        Ok(row.map(|r| from_row(tables::STORIES, r)).transpose()?)
    }

    pub async fn create_story(&self, draft: &StoryDraft) -> Result<Story> {
        let row = self
            .store
            .insert(tables::STORIES, serde_json::to_value(draft)?)
            .await?;
        let story: Story = from_row(tables::STORIES, row)?;
        info!("✓ 故事已创建: #{} {}", story.id, story.title);
        Ok(story)
    }

    /// 更新故事；不存在时返回 None
    pub async fn update_story(&self, story_id: i64, draft: &StoryDraft) -> Result<Option<Story>> {
        let rows = self
            .store
            .update(
                tables::STORIES,
                &Query::new().eq("id", story_id),
                serde_json::to_value(draft)?,
            )
            .await?;
        Ok(rows
            .into_iter()
            .next()
            .map(|r| from_row(tables::STORIES, r))
            .transpose()?)
    }

    /// 删除故事，返回是否删除了记录
    pub async fn delete_story(&self, story_id: i64) -> Result<bool> {
        let n = self
            .store
            .delete(tables::STORIES, &Query::new().eq("id", story_id))
            .await?;
        debug!("删除故事 #{}: {} 行", story_id, n);
        Ok(n > 0)
    }

    /// 锁定 / 解锁故事
    pub async fn set_locked(&self, story_id: i64, locked: bool) -> Result<bool> {
        let rows = self
            .store
            .update(
                tables::STORIES,
                &Query::new().eq("id", story_id),
                json!({ "locked": locked }),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    pub async fn get_levels(&self) -> Result<Vec<LevelInfo>> {
        let rows = self
            .store
            .select(tables::LEVELS, &Query::new().order("level_number", true))
            .await?;
        Ok(from_rows(tables::LEVELS, rows)?)
    }

    /// 某个等级的步骤定义，按 step_number 排序；等级不存在时为空
    pub async fn get_level_steps(&self, level_number: u8) -> Result<Vec<LevelStep>> {
        let level: Option<Value> = self
            .store
            .select_one(tables::LEVELS, &Query::new().eq("level_number", level_number))
            .await?;
        let Some(level) = level else {
            return Ok(Vec::new());
        };
        let level: LevelInfo = from_row(tables::LEVELS, level)?;

        let rows = self
            .store
            .select(
                tables::LEVEL_STEPS,
                &Query::new()
                    .eq("level_id", level.id)
                    .order("step_number", true),
            )
            .await?;
        Ok(from_rows(tables::LEVEL_STEPS, rows)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::MemoryStore;

    #[tokio::test]
    async fn story_crud() {
        let svc = StoryService::new(Arc::new(MemoryStore::new()));
        let draft = StoryDraft {
            title: "Kelebek".into(),
            locked: true,
            ..Default::default()
        };
        let story = svc.create_story(&draft).await.unwrap();
        assert!(story.locked);

        assert!(svc.set_locked(story.id, false).await.unwrap());
        assert!(!svc.get_story(story.id).await.unwrap().unwrap().locked);

        let renamed = StoryDraft {
            title: "Kelebek ve Arı".into(),
            ..Default::default()
        };
        let updated = svc.update_story(story.id, &renamed).await.unwrap().unwrap();
        assert_eq!(updated.title, "Kelebek ve Arı");
        assert!(svc.update_story(999, &renamed).await.unwrap().is_none());

        assert!(svc.delete_story(story.id).await.unwrap());
        assert!(svc.get_stories().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn level_steps_are_ordered() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert(tables::LEVELS, json!({"level_number": 2, "title": "Okuma"}))
            .await
            .unwrap();
        for n in [3, 1, 2] {
            store
                .insert(
                    tables::LEVEL_STEPS,
                    json!({"level_id": 1, "step_number": n, "title": format!("Adım {}", n)}),
                )
                .await
                .unwrap();
        }
        let svc = StoryService::new(store);
        let steps = svc.get_level_steps(2).await.unwrap();
        let numbers: Vec<u32> = steps.iter().map(|s| s.step_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert!(svc.get_level_steps(4).await.unwrap().is_empty());
    }
}
