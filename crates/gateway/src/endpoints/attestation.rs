//! # /api/attestation/*
//!
//! Attestationの生成・検証と、エクスプローラーへの提出情報の組み立て。

use std::sync::Arc;

use attest_crypto::sha256_hex;
use attest_types::{
    Envelope, GenerateAttestationRequest, QuoteSubmission, SubmitQuoteRequest,
    VerifyAttestationRequest,
};
use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use chrono::Utc;

use crate::config::GatewayState;
use crate::error::GatewayError;
use crate::operation::{format_timestamp, required, Operation, OperationResult};
use crate::router::AttestationRouter;

use super::parse_body;

/// 提出直後の状態。エクスプローラーへの送信はクライアントが行う。
const SUBMISSION_READY: &str = "ready";

/// POST /api/attestation/generate: Attestation生成。
///
/// nonce省略時の既定値とレコードのタイムスタンプは同じ受付時刻から作られる。
pub async fn handle_generate(
    State(state): State<Arc<GatewayState>>,
    body: Bytes,
) -> Result<Json<Envelope<OperationResult>>, GatewayError> {
    let issued_at = Utc::now();
    let req = parse_body::<GenerateAttestationRequest>(&body)?;
    let op = Operation::generate_attestation(req, issued_at)?;
    let envelope = AttestationRouter::new(&state)
        .dispatch_at(op, issued_at)
        .await?;
    Ok(Json(envelope))
}

/// POST /api/attestation/verify: Attestation検証。
pub async fn handle_verify(
    State(state): State<Arc<GatewayState>>,
    body: Bytes,
) -> Result<Json<Envelope<OperationResult>>, GatewayError> {
    let op = Operation::verify_attestation(parse_body::<VerifyAttestationRequest>(&body)?)?;
    Ok(Json(AttestationRouter::new(&state).dispatch(op).await?))
}

/// POST /api/attestation/submit: quoteのハッシュとエクスプローラーURLを返す。
/// バックエンドは呼ばない。
pub async fn handle_submit(
    State(state): State<Arc<GatewayState>>,
    body: Bytes,
) -> Result<Json<Envelope<QuoteSubmission>>, GatewayError> {
    let req = parse_body::<SubmitQuoteRequest>(&body)?;
    let quote = required(req.quote, "quote")?;
    let submission = quote_submission(&state.attestation_explorer, &quote);
    Ok(Json(Envelope::success(submission, format_timestamp(Utc::now()))))
}

fn quote_submission(explorer: &str, quote: &str) -> QuoteSubmission {
    let quote_hash = sha256_hex(quote);
    QuoteSubmission {
        verification_url: format!("{explorer}reports/{}", &quote_hash[..16]),
        explorer_url: explorer.to_string(),
        quote_hash,
        submission_status: SUBMISSION_READY.to_string(),
    }
}
