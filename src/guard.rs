//! 批量查询保护
//!
//! 统计 GraphQL 请求体（单个 `{query}` 或批量 `[{query}, ...]`）中所有操作的
//! 顶层选择数，超过配置上限时在认证与授权之前直接拒绝。

use async_graphql_parser::parse_query;
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use serde_json::Value;
use std::sync::Arc;

use crate::{error::AppError, middleware::AppState};

/// 读取请求体的上限
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// 单条查询文本的顶层选择数；无法解析的文本计为 0，交给后续处理报错
fn count_query(query: &str) -> u32 {
    match parse_query(query) {
        Ok(doc) => doc
            .operations
            .iter()
            .map(|(_, op)| op.node.selection_set.node.items.len() as u32)
            .sum(),
        Err(e) => {
            tracing::debug!(error = %e, "Unparseable query text, not counted");
            0
        }
    }
}

fn count_operation(op: &Value) -> u32 {
    op.get("query")
        .and_then(Value::as_str)
        .map(count_query)
        .unwrap_or(0)
}

/// 统计请求体中的顶层选择数
///
/// 非 JSON 或不含 `query` 字段的请求体计为 0。
pub fn count_selections(body: &[u8]) -> u32 {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Array(batch)) => batch.iter().map(count_operation).sum(),
        Ok(op @ Value::Object(_)) => count_operation(&op),
        _ => 0,
    }
}

/// 检查选择数是否超限，上限为 0 表示不限制
pub fn check_limit(count: u32, limit: u32) -> Result<(), AppError> {
    if limit > 0 && count > limit {
        return Err(AppError::BatchLimitExceeded { count, limit });
    }
    Ok(())
}

/// 批量查询保护中间件
pub async fn batch_guard_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let limit = state.config.authz.batch_selection_limit;
    if limit == 0 || req.method() != Method::POST {
        return Ok(next.run(req).await);
    }

    let (parts, body) = req.into_parts();
    let bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read request body: {}", e)))?;

    let count = count_selections(&bytes);
    if let Err(e) = check_limit(count, limit) {
        tracing::warn!(count, limit, uri = %parts.uri, "Batched query limit exceeded");
        metrics::counter!("batch_guard_rejections_total").increment(1);
        return Err(e);
    }

    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_query_counts_top_level_only() {
        let body = br#"{"query":"{ channels(orgId: \"o\") { uuid name versions { uuid } } groups(orgId: \"o\") { uuid } }"}"#;
        assert_eq!(count_selections(body), 2);
    }

    #[test]
    fn test_batch_sums_all_operations() {
        let body = br#"[{"query":"{ a b }"},{"query":"query Q { c }"},{"variables":{}}]"#;
        assert_eq!(count_selections(body), 3);
    }

    #[test]
    fn test_non_graphql_bodies_count_zero() {
        assert_eq!(count_selections(b""), 0);
        assert_eq!(count_selections(b"not json"), 0);
        assert_eq!(count_selections(br#"{"name":"edge"}"#), 0);
        assert_eq!(count_selections(br#"{"query":"{ unclosed"}"#), 0);
    }

    #[test]
    fn test_limit_boundary() {
        assert!(check_limit(2, 2).is_ok());
        let err = check_limit(3, 2).unwrap_err();
        assert_eq!(err.user_message(), "Batched query limit exceeded");
        assert_eq!(err.code(), 400);
        // 0 表示不限制
        assert!(check_limit(10_000, 0).is_ok());
    }
}
