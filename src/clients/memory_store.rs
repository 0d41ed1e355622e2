//! 进程内数据层，与托管数据库使用相同的查询语义

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::clients::store::{DataStore, Query};
use crate::error::{AppResult, StoreError};

#[derive(Debug, Default)]
struct Table {
    rows: Vec<Value>,
    next_id: i64,
}

/// 内存数据层
///
/// 插入时自动补 `id` 与 `created_at`
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 某张表的行数
    pub async fn count(&self, table: &str) -> usize {
        self.tables
            .read()
            .await
            .get(table)
            .map_or(0, |t| t.rows.len())
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn select(&self, table: &str, query: &Query) -> AppResult<Vec<Value>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Value> = tables
            .get(table)
            .map(|t| t.rows.iter().filter(|r| query.matches(r)).cloned().collect())
            .unwrap_or_default();

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ord = compare(a.get(&order.column), b.get(&order.column));
                if order.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: Value) -> AppResult<Value> {
        let Value::Object(mut obj) = row else {
            return Err(StoreError::MalformedRow {
                table: table.to_string(),
                message: "插入的行必须是 JSON 对象".to_string(),
            }
            .into());
        };

        let mut tables = self.tables.write().await;
        let t = tables.entry(table.to_string()).or_default();

        match obj.get("id").and_then(Value::as_i64) {
            Some(id) => t.next_id = t.next_id.max(id),
            None => {
                t.next_id += 1;
                obj.insert("id".to_string(), Value::from(t.next_id));
            }
        }
        obj.entry("created_at")
            .or_insert_with(|| Value::from(chrono::Utc::now().to_rfc3339()));

        let stored = Value::Object(obj);
        t.rows.push(stored.clone());
        Ok(stored)
    }

    async fn update(&self, table: &str, query: &Query, patch: Value) -> AppResult<Vec<Value>> {
        let patch: Map<String, Value> = match patch {
            Value::Object(m) => m,
            _ => {
                return Err(StoreError::MalformedRow {
                    table: table.to_string(),
                    message: "更新内容必须是 JSON 对象".to_string(),
                }
                .into())
            }
        };

        let mut tables = self.tables.write().await;
        let mut updated = Vec::new();
        if let Some(t) = tables.get_mut(table) {
            for row in t.rows.iter_mut().filter(|r| query.matches(r)) {
                if let Value::Object(obj) = row {
                    for (k, v) in &patch {
                        if k != "id" {
                            obj.insert(k.clone(), v.clone());
                        }
                    }
                }
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, query: &Query) -> AppResult<usize> {
        let mut tables = self.tables.write().await;
        let Some(t) = tables.get_mut(table) else {
            return Ok(0);
        };
        let before = t.rows.len();
        t.rows.retain(|r| !query.matches(r));
        Ok(before - t.rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn insert_assigns_ids_and_select_orders() {
        let store = MemoryStore::new();
        store.insert("stories", json!({"title": "B"})).await.unwrap();
        let a = store.insert("stories", json!({"title": "A"})).await.unwrap();
        assert_eq!(a["id"], json!(2));
        assert!(a.get("created_at").is_some());

        let rows = store
            .select("stories", &Query::new().order("title", true))
            .await
            .unwrap();
        assert_eq!(rows[0]["title"], json!("A"));

        let first = store
            .select_one("stories", &Query::new().order("id", false))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first["id"], json!(2));
    }

    #[tokio::test]
    async fn update_keeps_id_and_delete_counts() {
        let store = MemoryStore::new();
        store.insert("students", json!({"teacher_id": 1, "first_name": "Ali"})).await.unwrap();
        store.insert("students", json!({"teacher_id": 2, "first_name": "Can"})).await.unwrap();

        let q = Query::new().eq("teacher_id", 1);
        let rows = store
            .update("students", &q, json!({"first_name": "Veli", "id": 99}))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], json!(1));
        assert_eq!(rows[0]["first_name"], json!("Veli"));

        assert_eq!(store.delete("students", &q).await.unwrap(), 1);
        assert_eq!(store.count("students").await, 1);
        assert_eq!(store.delete("nope", &q).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn non_object_rows_are_rejected() {
        let store = MemoryStore::new();
        assert!(store.insert("stories", json!([1, 2])).await.is_err());
    }
}
