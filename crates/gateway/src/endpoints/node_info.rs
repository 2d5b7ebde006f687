//! # GET|POST /api/node/info
//!
//! ノード情報公開エンドポイント。

use std::sync::Arc;

use attest_types::{Envelope, NodeInfoRecord};
use axum::extract::State;
use axum::Json;
use chrono::Utc;

use crate::config::GatewayState;
use crate::operation::format_timestamp;

/// ダッシュボードが公開されるポート。
const DASHBOARD_PORT: u16 = 8090;

/// GET|POST /api/node/info: ノード情報公開。
///
/// クライアントがノードのダッシュボードとAttestationエクスプローラーに辿り着くための情報を返す。
pub async fn handle_node_info(
    State(state): State<Arc<GatewayState>>,
) -> Json<Envelope<NodeInfoRecord>> {
    let identity = &state.identity;
    Json(Envelope::success(
        NodeInfoRecord {
            app_id: identity.app_id.clone(),
            instance_id: identity.instance_id.clone(),
            device_id: identity.device_id.clone(),
            dashboard_url: format!(
                "https://{}-{DASHBOARD_PORT}.{}/",
                identity.instance_id, state.dashboard_domain
            ),
            attestation_explorer: state.attestation_explorer.clone(),
        },
        format_timestamp(Utc::now()),
    ))
}
