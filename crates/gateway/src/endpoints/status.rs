//! # セキュリティ状態・ヘルスチェック

use std::sync::Arc;

use attest_types::{Envelope, HealthRecord};
use axum::extract::State;
use axum::Json;
use chrono::Utc;

use crate::config::GatewayState;
use crate::error::GatewayError;
use crate::operation::{format_timestamp, Operation, OperationResult};
use crate::router::AttestationRouter;
use crate::transport::{self, BackendDescriptor};

/// ヘルスチェックに載せるサービス名。
pub const SERVICE_NAME: &str = "attest-gateway";

/// GET|POST /api/security/status: セキュリティ状態。
pub async fn handle_security_status(
    State(state): State<Arc<GatewayState>>,
) -> Result<Json<Envelope<OperationResult>>, GatewayError> {
    let envelope = AttestationRouter::new(&state)
        .dispatch(Operation::SecurityStatus)
        .await?;
    Ok(Json(envelope))
}

/// GET /api/health: 生存確認と、現時点で選択されるバックエンド。
///
/// 探索のみ行い、バックエンドには接続しない。
pub async fn handle_health(State(state): State<Arc<GatewayState>>) -> Json<Envelope<HealthRecord>> {
    let (availability, descriptor) = transport::probe(&state.sockets);
    let (transport, socket_path) = match descriptor {
        BackendDescriptor::Real {
            transport,
            socket_path,
        } => (Some(transport), Some(socket_path.display().to_string())),
        BackendDescriptor::Unavailable => (None, None),
    };

    let record = HealthRecord {
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        transport,
        socket_path,
        dstack_available: availability.dstack,
        tappd_available: availability.tappd,
    };
    Json(Envelope::success(record, format_timestamp(Utc::now())))
}
