//! 徽章服务 - 业务能力层

use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use crate::clients::store::{from_row, from_rows, tables, DataStore, Query};
use crate::models::{Badge, ReadingMetrics, StudentBadge};

pub struct BadgeService {
    store: Arc<dyn DataStore>,
}

impl BadgeService {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    /// 徽章目录
    pub async fn get_badges(&self) -> Result<Vec<Badge>> {
        let rows = self
            .store
            .select(tables::BADGES, &Query::new().order("id", true))
            .await?;
        Ok(from_rows(tables::BADGES, rows)?)
    }

    pub async fn get_student_badges(&self, student_id: i64) -> Result<Vec<StudentBadge>> {
        let rows = self
            .store
            .select(
                tables::STUDENT_BADGES,
                &Query::new().eq("student_id", student_id).order("id", true),
            )
            .await?;
        Ok(from_rows(tables::STUDENT_BADGES, rows)?)
    }

    /// 颁发徽章
    ///
    /// # 返回
    /// 新写入的记录；已经颁发过时返回 `None`
    pub async fn award_badge(
        &self,
        student_id: i64,
        badge_id: i64,
        story_id: i64,
    ) -> Result<Option<StudentBadge>> {
        let existing = self
            .store
            .select_one(
                tables::STUDENT_BADGES,
                &Query::new()
                    .eq("student_id", student_id)
                    .eq("badge_id", badge_id)
                    .eq("story_id", story_id),
            )
            .await?;
        if existing.is_some() {
            debug!("学生 {} 在故事 {} 已拥有徽章 #{}，跳过", student_id, story_id, badge_id);
            return Ok(None);
        }

        let row = self
            .store
            .insert(
                tables::STUDENT_BADGES,
                json!({
                    "student_id": student_id,
                    "badge_id": badge_id,
                    "story_id": story_id,
                    "awarded_at": chrono::Utc::now().to_rfc3339(),
                }),
            )
            .await?;
        Ok(Some(from_row(tables::STUDENT_BADGES, row)?))
    }

    /// 按指标颁发所有满足条件的徽章，返回本次新得到的徽章
    pub async fn check_and_award(
        &self,
        student_id: i64,
        story_id: i64,
        metrics: &ReadingMetrics,
    ) -> Result<Vec<Badge>> {
        let mut awarded = Vec::new();
        for badge in self.get_badges().await? {
            if !badge.is_earned_by(metrics) {
                continue;
            }
            if self.award_badge(student_id, badge.id, story_id).await?.is_some() {
                info!("🏅 [学生 {}] 获得徽章: {}", student_id, badge.name);
                awarded.push(badge);
            }
        }
        Ok(awarded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::MemoryStore;

    async fn seeded() -> (Arc<MemoryStore>, BadgeService) {
        let store = Arc::new(MemoryStore::new());
        store
            .insert(
                tables::BADGES,
                json!({"name": "Hızlı Okuyucu", "criteria_type": "wpm", "criteria_value": 50.0}),
            )
            .await
            .unwrap();
        store
            .insert(
                tables::BADGES,
                json!({"name": "Dikkatli Okuyucu", "criteria_type": "accuracy", "criteria_value": 90.0}),
            )
            .await
            .unwrap();
        let svc = BadgeService::new(store.clone());
        (store, svc)
    }

    #[tokio::test]
    async fn check_and_award_only_matching_badges_once() {
        let (store, svc) = seeded().await;
        let metrics = ReadingMetrics {
            wpm: 55.0,
            accuracy: 80.0,
            points: 0,
            level: 2,
        };
        let first = svc.check_and_award(4, 1, &metrics).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].name, "Hızlı Okuyucu");

        let second = svc.check_and_award(4, 1, &metrics).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(store.count(tables::STUDENT_BADGES).await, 1);
        assert_eq!(svc.get_student_badges(4).await.unwrap().len(), 1);
    }
}
