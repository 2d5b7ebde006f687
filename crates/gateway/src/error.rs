//! # Gateway エラー型
//!
//! HTTPレスポンスとして呼び出し元に返るエラーのみを扱う。
//! バックエンドの失敗（`BackendError`）はフォールバックで回復されるため、ここには現れない。

use attest_types::Envelope;
use axum::http::StatusCode;
use axum::Json;

/// Gatewayエラー型。
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// リクエストボディがJSONとしてパースできない
    #[error("Invalid JSON")]
    InvalidJson,
    /// 必須フィールドの欠落・型不一致
    #[error("不正なリクエスト: {0}")]
    Validation(String),
    /// 未知のパス
    #[error("Not found")]
    NotFound(String),
    /// シリアライズ失敗等の予期しない内部エラー
    #[error("内部エラー: {0}")]
    Internal(String),
}

/// 現在時刻をRFC 3339で返す。
pub(crate) fn now_rfc3339() -> String {
    crate::operation::format_timestamp(chrono::Utc::now())
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        match &self {
            GatewayError::InvalidJson => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": self.to_string() })),
            )
                .into_response(),
            GatewayError::NotFound(path) => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": self.to_string(), "path": path })),
            )
                .into_response(),
            GatewayError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                Json(Envelope::error(self.to_string(), now_rfc3339())),
            )
                .into_response(),
            GatewayError::Internal(_) => {
                tracing::error!(error = %self, "リクエスト処理中に内部エラーが発生");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(Envelope::error(self.to_string(), now_rfc3339())),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_json_body() {
        let response = GatewayError::InvalidJson.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({ "error": "Invalid JSON" })
        );
    }

    #[tokio::test]
    async fn test_not_found_echoes_path() {
        let response = GatewayError::NotFound("/api/unknown".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Not found");
        assert_eq!(body["path"], "/api/unknown");
    }

    /// 入力検証エラーはエラーエンベロープで返る
    #[tokio::test]
    async fn test_validation_is_error_envelope() {
        let response = GatewayError::Validation("dataは必須です".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert!(body["payload"]["error"]
            .as_str()
            .unwrap()
            .contains("dataは必須です"));
    }

    #[tokio::test]
    async fn test_internal_is_500_envelope() {
        let response = GatewayError::Internal("boom".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["status"], "error");
    }
}
