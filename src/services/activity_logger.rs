//! 活动日志写入服务 - 业务能力层
//!
//! 只负责"追加一条 activity_logs"，写入失败只记 warn，不影响学习流程

use std::sync::Arc;
use tracing::{debug, warn};

use crate::clients::store::{tables, DataStore};
use crate::models::ActivityLog;

#[derive(Clone)]
pub struct ActivityLogger {
    store: Arc<dyn DataStore>,
}

impl ActivityLogger {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    /// 追加一条活动记录
    ///
    /// # 返回
    /// 是否写入成功
    pub async fn log(&self, entry: ActivityLog) -> bool {
        debug!(
            "活动: 学生 {} | 故事 {} | {:?} | 等级 {:?} 步骤 {:?}",
            entry.student_id, entry.story_id, entry.activity_type, entry.level, entry.step
        );

        let row = match serde_json::to_value(&entry) {
            Ok(row) => row,
            Err(e) => {
                warn!("⚠️ 活动记录无法序列化: {}", e);
                return false;
            }
        };

        match self.store.insert(tables::ACTIVITY_LOGS, row).await {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    "⚠️ 写入活动日志失败 (学生 {} {:?}): {}",
                    entry.student_id, entry.activity_type, e
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::store::Query;
    use crate::clients::MemoryStore;
    use crate::error::AppResult;
    use crate::models::ActivityType;
    use async_trait::async_trait;
    use serde_json::Value;

    struct BrokenStore;

    #[async_trait]
    impl DataStore for BrokenStore {
        async fn select(&self, _: &str, _: &Query) -> AppResult<Vec<Value>> {
            Ok(Vec::new())
        }
        async fn insert(&self, table: &str, _: Value) -> AppResult<Value> {
            Err(crate::error::StoreError::RequestFailed {
                table: table.to_string(),
                message: "offline".into(),
            }
            .into())
        }
        async fn update(&self, _: &str, _: &Query, _: Value) -> AppResult<Vec<Value>> {
            Ok(Vec::new())
        }
        async fn delete(&self, _: &str, _: &Query) -> AppResult<usize> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn writes_entry_with_error_message() {
        let store = Arc::new(MemoryStore::new());
        let logger = ActivityLogger::new(store.clone());
        let ok = logger
            .log(ActivityLog::new(3, 1, ActivityType::RemoteError).at(2, 1).with_error("timeout"))
            .await;
        assert!(ok);

        let rows = store
            .select(tables::ACTIVITY_LOGS, &Query::new().eq("student_id", 3))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["activity_type"], "remote_error");
        assert_eq!(rows[0]["error_message"], "timeout");
    }

    #[tokio::test]
    async fn store_failures_are_swallowed() {
        let logger = ActivityLogger::new(Arc::new(BrokenStore));
        assert!(!logger.log(ActivityLog::new(1, 1, ActivityType::StepStarted)).await);
    }
}
