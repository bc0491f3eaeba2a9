//! 统一错误模型
//! 定义所有错误类型和错误响应格式

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thiserror::Error;

/// 结果类型别名
pub type Result<T> = std::result::Result<T, AppError>;

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// 无法解析出调用方身份
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// 身份已知但权限不足，消息包含动作与资源标识
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// 批量变更的输入格式错误
    #[error("Validation error: {0}")]
    Validation(String),

    /// 批量授权在逐项检查之前被结构性拒绝
    #[error("Query error: {0}")]
    Query(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Batched query limit exceeded: {count} > {limit}")]
    BatchLimitExceeded { count: u32, limit: u32 },

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// 获取 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_)
            | AppError::Query(_)
            | AppError::BadRequest(_)
            | AppError::BatchLimitExceeded { .. } => StatusCode::BAD_REQUEST,
            AppError::Database(_)
            | AppError::Store(_)
            | AppError::Config(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 机器可匹配的错误类别
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Authentication(_) => "AuthenticationError",
            AppError::Forbidden(_) => "ForbiddenError",
            AppError::NotFound(_) => "NotFoundError",
            AppError::Validation(_) => "ValidationError",
            AppError::Query(_) => "QueryError",
            AppError::BadRequest(_) => "BadRequestError",
            AppError::BatchLimitExceeded { .. } => "BatchLimitError",
            AppError::Database(_)
            | AppError::Store(_)
            | AppError::Config(_)
            | AppError::Internal(_) => "InternalError",
        }
    }

    /// 获取用户友好的错误消息（不包含敏感信息）
    pub fn user_message(&self) -> String {
        match self {
            AppError::Authentication(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::Query(msg)
            | AppError::BadRequest(msg) => msg.clone(),
            AppError::BatchLimitExceeded { .. } => "Batched query limit exceeded".to_string(),
            AppError::Database(_) | AppError::Store(_) => "Database error occurred".to_string(),
            AppError::Config(_) => "Configuration error".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
        }
    }

    /// 获取错误码
    pub fn code(&self) -> u16 {
        self.status_code().as_u16()
    }

    // 便捷方法
    pub fn not_found(msg: &str) -> Self {
        AppError::NotFound(msg.to_string())
    }

    pub fn validation(msg: &str) -> Self {
        AppError::Validation(msg.to_string())
    }

    pub fn authentication(msg: &str) -> Self {
        AppError::Authentication(msg.to_string())
    }

    pub fn internal_error(msg: &str) -> Self {
        AppError::Internal(msg.to_string())
    }

    /// 批量操作的通用查询错误
    pub fn query(operation: &str, req_id: &str) -> Self {
        AppError::Query(format!("Query {} error. MessageID: {}.", operation, req_id))
    }
}

/// 错误响应 DTO
///
/// 同时放入响应扩展，请求追踪中间件据此把 request_id 改写为本次请求的 id。
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub code: u16,
    pub kind: &'static str,
    pub message: String,
    pub request_id: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // 经过请求追踪中间件时会被替换
        let request_id = uuid::Uuid::new_v4().to_string();

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: self.code(),
                kind: self.kind(),
                message: self.user_message(),
                request_id,
            },
        };

        // 服务端错误记录完整上下文，客户端错误只记 warn
        if status.is_server_error() {
            tracing::error!(
                code = self.code(),
                message = %self,
                "Application error"
            );
        } else {
            tracing::warn!(
                code = self.code(),
                kind = self.kind(),
                message = %error_response.error.message,
                "Request rejected"
            );
        }

        let mut response = (status, Json(error_response.clone())).into_response();
        response.extensions_mut().insert(error_response);
        response
    }
}

/// 从 config::ConfigError 转换
impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        AppError::Config(e.to_string())
    }
}

/// 从 validator::ValidationErrors 转换
impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(AppError::authentication("no token").code(), 401);
        assert_eq!(AppError::Forbidden("x".to_string()).code(), 403);
        assert_eq!(AppError::not_found("x").code(), 404);
        assert_eq!(AppError::validation("x").code(), 400);
        assert_eq!(AppError::query("assignClusterGroups", "r1").code(), 400);
        assert_eq!(AppError::BatchLimitExceeded { count: 3, limit: 2 }.code(), 400);
    }

    #[test]
    fn test_user_message_no_sensitive_info() {
        let error = AppError::Database(sqlx::Error::RowNotFound);
        let message = error.user_message();
        assert_eq!(message, "Database error occurred");
        assert!(!message.contains("sqlx"));

        let error = AppError::Store("duplicate key value violates unique constraint".to_string());
        assert_eq!(error.user_message(), "Database error occurred");
    }

    #[test]
    fn test_query_error_message() {
        let error = AppError::query("assignClusterGroups", "req-1");
        assert_eq!(
            error.user_message(),
            "Query assignClusterGroups error. MessageID: req-1."
        );
        assert_eq!(error.kind(), "QueryError");
    }
}
