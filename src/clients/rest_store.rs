/// 托管数据库 REST 客户端
///
/// PostgREST 方言：`/rest/v1/{table}?col=eq.v&order=col.asc&limit=n`，
/// 使用匿名 key 认证，行级权限由服务端负责。
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::clients::store::{DataStore, Query};
use crate::config::Config;
use crate::error::{AppResult, StoreError};

pub struct RestStore {
    http: Client,
    base_url: String,
    anon_key: String,
}

/// 过滤值转成 PostgREST 的字面量
fn filter_literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

impl RestStore {
    pub fn new(config: &Config) -> AppResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            http,
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// 查询参数
    pub fn query_params(query: &Query) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = query
            .filters
            .iter()
            .map(|(col, v)| (col.clone(), format!("eq.{}", filter_literal(v))))
            .collect();
        if let Some(order) = &query.order {
            let dir = if order.ascending { "asc" } else { "desc" };
            params.push(("order".to_string(), format!("{}.{}", order.column, dir)));
        }
        if let Some(limit) = query.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key))
            .header("Accept", "application/json")
    }

    async fn send(&self, table: &str, req: RequestBuilder) -> AppResult<Value> {
        let resp = self.authed(req).send().await.map_err(|e| StoreError::RequestFailed {
            table: table.to_string(),
            message: e.to_string(),
        })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| StoreError::RequestFailed {
            table: table.to_string(),
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(StoreError::BadResponse {
                table: table.to_string(),
                status: status.as_u16(),
                body,
            }
            .into());
        }

        if body.trim().is_empty() || status == StatusCode::NO_CONTENT {
            return Ok(Value::Array(Vec::new()));
        }

        serde_json::from_str(&body).map_err(|e| {
            StoreError::MalformedRow {
                table: table.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }

    fn into_rows(value: Value) -> Vec<Value> {
        match value {
            Value::Array(rows) => rows,
            Value::Null => Vec::new(),
            single => vec![single],
        }
    }
}

#[async_trait]
impl DataStore for RestStore {
    async fn select(&self, table: &str, query: &Query) -> AppResult<Vec<Value>> {
        debug!("SELECT {} [{}]", table, query);
        let req = self
            .http
            .get(self.table_url(table))
            .query(&[("select", "*")])
            .query(&Self::query_params(query));
        Ok(Self::into_rows(self.send(table, req).await?))
    }

    async fn insert(&self, table: &str, row: Value) -> AppResult<Value> {
        debug!("INSERT {}", table);
        let req = self
            .http
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(&row);
        Self::into_rows(self.send(table, req).await?)
            .into_iter()
            .next()
            .ok_or_else(|| {
                StoreError::NotFound {
                    table: table.to_string(),
                    filter: "inserted row".to_string(),
                }
                .into()
            })
    }

    async fn update(&self, table: &str, query: &Query, patch: Value) -> AppResult<Vec<Value>> {
        debug!("UPDATE {} [{}]", table, query);
        let req = self
            .http
            .patch(self.table_url(table))
            .query(&Self::query_params(query))
            .header("Prefer", "return=representation")
            .json(&patch);
        Ok(Self::into_rows(self.send(table, req).await?))
    }

    async fn delete(&self, table: &str, query: &Query) -> AppResult<usize> {
        debug!("DELETE {} [{}]", table, query);
        let req = self
            .http
            .delete(self.table_url(table))
            .query(&Self::query_params(query))
            .header("Prefer", "return=representation");
        Ok(Self::into_rows(self.send(table, req).await?).len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_params_use_postgrest_operators() {
        let q = Query::new()
            .eq("student_id", 3)
            .eq("user_id", "abc")
            .order("created_at", false)
            .limit(1);
        let params = RestStore::query_params(&q);
        assert_eq!(
            params,
            vec![
                ("student_id".to_string(), "eq.3".to_string()),
                ("user_id".to_string(), "eq.abc".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
                ("limit".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn single_object_bodies_become_one_row() {
        assert_eq!(RestStore::into_rows(json!({"id": 1})).len(), 1);
        assert!(RestStore::into_rows(Value::Null).is_empty());
    }
}
