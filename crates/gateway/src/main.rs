//! # Attest Gateway
//!
//! TEEのAttestation操作をHTTP/JSONで公開するゲートウェイ。
//!
//! ## 責務
//! - ローカルソケットの探索による実機バックエンドの選択（`transport`）
//! - 2種類のソケットプロトコルでのバックエンド呼び出し（`backend`）
//! - バックエンドがない・失敗した場合の決定的なフォールバック生成（`fallback`）
//! - 経路によらない安定したレスポンスエンベロープ（`router`）
//!
//! ## 出自
//! 全ての操作結果は `is_real` と `source` を持つ。フォールバックの値を
//! 実機の値として返すことはない。

mod backend;
mod config;
mod endpoints;
mod error;
mod fallback;
mod normalize;
mod operation;
mod router;
mod transport;

#[cfg(test)]
mod test_helpers;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config::Cli;

// ---------------------------------------------------------------------------
// エントリポイント
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let addr = cli.listen_addr();
    let state = Arc::new(cli.into_state());

    let (availability, selected) = transport::probe(&state.sockets);
    tracing::info!(
        backend = selected.source().unwrap_or(attest_types::FALLBACK_SOURCE),
        app_id = %state.identity.app_id,
        device_id = %state.identity.device_id,
        dstack = %state.sockets.primary.display(),
        dstack_available = availability.dstack,
        tappd = %state.sockets.secondary.display(),
        tappd_available = availability.tappd,
        timeout_ms = state.backend_timeout.as_millis() as u64,
        "TEEバックエンド設定"
    );
    if !availability.dstack && !availability.tappd {
        tracing::warn!("TEEソケットが見つかりません。全ての操作をフォールバックで応答します");
    }

    let app = endpoints::build_router(state);

    tracing::info!("Gatewayを {} で起動します", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
