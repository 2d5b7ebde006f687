//! # Gatewayエンドポイント
//!
//! | メソッド | パス | 処理 |
//! |----------|------|------|
//! | GET | /api/tee/info | TEE情報 |
//! | GET, POST | /api/tee/measurements | 測定レジスタ |
//! | POST | /api/tee/key | 鍵導出 |
//! | POST | /api/tee/quote | quote取得 |
//! | POST | /api/tee/execute | 関数実行 |
//! | POST | /api/attestation/generate | Attestation生成 |
//! | POST | /api/attestation/verify | Attestation検証 |
//! | POST | /api/attestation/submit | エクスプローラー提出情報 |
//! | GET, POST | /api/security/status | セキュリティ状態 |
//! | GET, POST | /api/node/info | ノード情報 |
//! | GET | /api/health, /health, / | ヘルスチェック |
//!
//! 上記以外のパス・メソッドは404。CORSプリフライトは `CorsLayer` が応答する。

pub mod attestation;
pub mod node_info;
pub mod status;
pub mod tee;

use std::sync::Arc;

use axum::body::Bytes;
use axum::http::Uri;
use axum::response::IntoResponse;
use axum::routing::get;
use serde::de::DeserializeOwned;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::GatewayState;
use crate::error::GatewayError;

pub use attestation::{handle_generate, handle_submit, handle_verify};
pub use node_info::handle_node_info;
pub use status::{handle_health, handle_security_status};
pub use tee::{handle_execute, handle_info, handle_key, handle_measurements, handle_quote};

/// 全ルートとミドルウェアを組み立てる。
pub fn build_router(state: Arc<GatewayState>) -> axum::Router {
    axum::Router::new()
        .route("/api/tee/info", get(handle_info))
        .route(
            "/api/tee/measurements",
            get(handle_measurements).post(handle_measurements),
        )
        .route("/api/tee/key", axum::routing::post(handle_key))
        .route("/api/tee/quote", axum::routing::post(handle_quote))
        .route("/api/tee/execute", axum::routing::post(handle_execute))
        .route(
            "/api/attestation/generate",
            axum::routing::post(handle_generate),
        )
        .route("/api/attestation/verify", axum::routing::post(handle_verify))
        .route("/api/attestation/submit", axum::routing::post(handle_submit))
        .route(
            "/api/security/status",
            get(handle_security_status).post(handle_security_status),
        )
        .route(
            "/api/node/info",
            get(handle_node_info).post(handle_node_info),
        )
        .route("/api/health", get(handle_health))
        .route("/health", get(handle_health))
        .route("/", get(handle_health))
        .fallback(handle_not_found)
        .method_not_allowed_fallback(handle_not_found)
        .with_state(state)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// リクエストボディをパースする。
///
/// JSONとして不正なら `InvalidJson`、型が合わなければ `Validation`。
/// 必須フィールドの確認は `Operation` の構築時に行う。
pub(crate) fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, GatewayError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|_| GatewayError::InvalidJson)?;
    serde_json::from_value(value).map_err(|e| GatewayError::Validation(e.to_string()))
}

async fn handle_not_found(uri: Uri) -> GatewayError {
    GatewayError::NotFound(uri.path().to_string())
}

fn handle_panic(_panic: Box<dyn std::any::Any + Send + 'static>) -> axum::response::Response {
    GatewayError::Internal("ハンドラが異常終了しました".to_string()).into_response()
}
