//! # /api/tee/*
//!
//! TEE情報・測定レジスタ・鍵導出・quote取得・関数実行。
//! いずれも `AttestationRouter` に委譲し、結果は成功エンベロープで返る。

use std::sync::Arc;

use attest_types::{Envelope, ExecuteRequest, KeyRequest, QuoteRequest};
use axum::body::Bytes;
use axum::extract::State;
use axum::Json;

use crate::config::GatewayState;
use crate::error::GatewayError;
use crate::operation::{Operation, OperationResult};
use crate::router::AttestationRouter;

use super::parse_body;

/// GET /api/tee/info: TEE情報。
pub async fn handle_info(
    State(state): State<Arc<GatewayState>>,
) -> Result<Json<Envelope<OperationResult>>, GatewayError> {
    Ok(Json(AttestationRouter::new(&state).dispatch(Operation::Info).await?))
}

/// GET|POST /api/tee/measurements: 測定レジスタ。POSTのボディは読まない。
pub async fn handle_measurements(
    State(state): State<Arc<GatewayState>>,
) -> Result<Json<Envelope<OperationResult>>, GatewayError> {
    let envelope = AttestationRouter::new(&state)
        .dispatch(Operation::Measurements)
        .await?;
    Ok(Json(envelope))
}

/// POST /api/tee/key: 鍵導出。
pub async fn handle_key(
    State(state): State<Arc<GatewayState>>,
    body: Bytes,
) -> Result<Json<Envelope<OperationResult>>, GatewayError> {
    let op = Operation::get_key(parse_body::<KeyRequest>(&body)?)?;
    Ok(Json(AttestationRouter::new(&state).dispatch(op).await?))
}

/// POST /api/tee/quote: quote取得。
pub async fn handle_quote(
    State(state): State<Arc<GatewayState>>,
    body: Bytes,
) -> Result<Json<Envelope<OperationResult>>, GatewayError> {
    let op = Operation::get_quote(parse_body::<QuoteRequest>(&body)?)?;
    Ok(Json(AttestationRouter::new(&state).dispatch(op).await?))
}

/// POST /api/tee/execute: エンクレーブ内での関数実行。
pub async fn handle_execute(
    State(state): State<Arc<GatewayState>>,
    body: Bytes,
) -> Result<Json<Envelope<OperationResult>>, GatewayError> {
    let op = Operation::execute(parse_body::<ExecuteRequest>(&body)?)?;
    Ok(Json(AttestationRouter::new(&state).dispatch(op).await?))
}
