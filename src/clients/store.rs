//! 数据层接口
//!
//! 托管数据库的表操作都归结为四个动作：select / insert / update / delete。
//! 行以 JSON 表示，类型转换由 services 完成。

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::Display;

use crate::error::{AppError, AppResult};

/// 表名
pub mod tables {
    pub const TEACHERS: &str = "teachers";
    pub const STUDENTS: &str = "students";
    pub const STORIES: &str = "stories";
    pub const LEVELS: &str = "levels";
    pub const LEVEL_STEPS: &str = "level_steps";
    pub const STUDENT_PROGRESS: &str = "student_progress";
    pub const ACTIVITY_LOGS: &str = "activity_logs";
    pub const BADGES: &str = "badges";
    pub const STUDENT_BADGES: &str = "student_badges";
    pub const READING_LOGS: &str = "reading_logs";
}

/// 排序
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// 查询条件：等值过滤 + 排序 + 条数
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<(String, Value)>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    pub fn order(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// 行是否满足所有等值过滤
    pub fn matches(&self, row: &Value) -> bool {
        self.filters
            .iter()
            .all(|(col, expected)| row.get(col).map_or(false, |v| v == expected))
    }
}

impl Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .filters
            .iter()
            .map(|(c, v)| format!("{}={}", c, v))
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

#[async_trait]
pub trait DataStore: Send + Sync {
    async fn select(&self, table: &str, query: &Query) -> AppResult<Vec<Value>>;

    /// 插入一行并返回写入后的行（含 id）
    async fn insert(&self, table: &str, row: Value) -> AppResult<Value>;

    /// 更新匹配的行，返回更新后的行
    async fn update(&self, table: &str, query: &Query, patch: Value) -> AppResult<Vec<Value>>;

    /// 删除匹配的行，返回删除条数
    async fn delete(&self, table: &str, query: &Query) -> AppResult<usize>;

    /// 第一条匹配的行
    async fn select_one(&self, table: &str, query: &Query) -> AppResult<Option<Value>> {
        let q = query.clone().limit(1);
        Ok(self.select(table, &q).await?.into_iter().next())
    }
}

/// JSON 行 → 类型
pub fn from_row<T: DeserializeOwned>(table: &str, row: Value) -> AppResult<T> {
    serde_json::from_value(row).map_err(|e| AppError::malformed_row(table, e))
}

/// JSON 行列表 → 类型列表
pub fn from_rows<T: DeserializeOwned>(table: &str, rows: Vec<Value>) -> AppResult<Vec<T>> {
    rows.into_iter().map(|r| from_row(table, r)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_matches_all_filters() {
        let q = Query::new().eq("student_id", 3).eq("story_id", 1);
        assert!(q.matches(&json!({"student_id": 3, "story_id": 1, "x": true})));
        assert!(!q.matches(&json!({"student_id": 3, "story_id": 2})));
        assert!(!q.matches(&json!({"student_id": 3})));
        assert_eq!(q.to_string(), "student_id=3,story_id=1");
    }
}
