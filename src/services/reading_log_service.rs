//! 朗读记录服务 - 业务能力层

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::clients::store::{from_row, from_rows, tables, DataStore, Query};
use crate::models::reading_log::score_attempt;
use crate::models::ReadingLog;

pub struct ReadingLogService {
    store: Arc<dyn DataStore>,
}

impl ReadingLogService {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    /// 记录一次计时朗读
    ///
    /// # 参数
    /// - `text`: 单元原文
    /// - `transcript`: 后端返回的识别文字（可选）
    /// - `elapsed`: 录音时长
    pub async fn record_attempt(
        &self,
        student_id: i64,
        story_id: i64,
        level: u8,
        text: &str,
        transcript: Option<&str>,
        elapsed: Duration,
    ) -> Result<ReadingLog> {
        let score = score_attempt(text, transcript, elapsed);
        let log = ReadingLog {
            student_id,
            story_id,
            level,
            wpm: score.wpm,
            correct_words: score.correct_words,
            total_words: score.total_words,
            duration_secs: elapsed.as_secs_f64(),
            created_at: None,
        };
        let row = self
            .store
            .insert(tables::READING_LOGS, serde_json::to_value(&log)?)
            .await?;
        let saved: ReadingLog = from_row(tables::READING_LOGS, row)?;
        info!(
            "📖 [学生 {} 等级 {}] {:.1} 词/分, {}/{} 词正确",
            student_id, level, saved.wpm, saved.correct_words, saved.total_words
        );
        Ok(saved)
    }

    pub async fn get_logs(&self, student_id: i64, story_id: i64) -> Result<Vec<ReadingLog>> {
        let rows = self
            .store
            .select(
                tables::READING_LOGS,
                &Query::new()
                    .eq("student_id", student_id)
                    .eq("story_id", story_id)
                    .order("id", true),
            )
            .await?;
        Ok(from_rows(tables::READING_LOGS, rows)?)
    }

    /// 最近一次朗读的 (wpm, 正确率)，没有记录时返回 `None`
    pub async fn latest_metrics(&self, student_id: i64, story_id: i64) -> Result<Option<(f64, f64)>> {
        let row = self
            .store
            .select_one(
                tables::READING_LOGS,
                &Query::new()
                    .eq("student_id", student_id)
                    .eq("story_id", story_id)
                    .order("id", false),
            )
            .await?;
        Ok(row
            .map(|r| from_row::<ReadingLog>(tables::READING_LOGS, r))
            .transpose()?
            .map(|log| (log.wpm, log.accuracy())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::MemoryStore;

    #[tokio::test]
    async fn latest_metrics_follow_newest_attempt() {
        let svc = ReadingLogService::new(Arc::new(MemoryStore::new()));
        assert!(svc.latest_metrics(1, 1).await.unwrap().is_none());

        svc.record_attempt(1, 1, 2, "bir iki üç dört", Some("bir iki"), Duration::from_secs(60))
            .await
            .unwrap();
        svc.record_attempt(1, 1, 3, "bir iki üç dört", None, Duration::from_secs(30))
            .await
            .unwrap();

        let (wpm, accuracy) = svc.latest_metrics(1, 1).await.unwrap().unwrap();
        assert_eq!(wpm, 8.0);
        assert_eq!(accuracy, 100.0);
        assert_eq!(svc.get_logs(1, 1).await.unwrap().len(), 2);
    }
}
