//! # Gateway設定・共有状態
//!
//! コマンドライン引数・環境変数からの設定読み込みとGatewayの共有状態の定義。
//! 共有状態は起動時に一度だけ構築され、以降は読み取り専用。

use std::path::PathBuf;
use std::time::Duration;

/// プライマリソケット（改行区切りJSON RPC）の既定パス。
pub const DEFAULT_DSTACK_SOCKET: &str = "/var/run/dstack.sock";

/// セカンダリソケット（ソケット上のHTTP）の既定パス。
pub const DEFAULT_TAPPD_SOCKET: &str = "/var/run/tappd.sock";

/// Gatewayの起動引数。全項目が環境変数からも設定可能。
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "attest-gateway", version, about = "TEE attestation HTTP gateway")]
pub struct Cli {
    /// リッスンするホスト
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// リッスンするポート
    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// アプリケーションID
    #[arg(
        long,
        env = "APP_ID",
        default_value = "app_55531fcff1d542372a3fb0627f1fc12721f2fa24"
    )]
    pub app_id: String,

    /// デバイスID
    #[arg(long, env = "DEVICE_ID", default_value = "tee-device-001")]
    pub device_id: String,

    /// インスタンスID
    #[arg(
        long,
        env = "INSTANCE_ID",
        default_value = "6de516cec046f6e4a301d45ead2bde6e83fd6ed0"
    )]
    pub instance_id: String,

    /// プライマリソケットのパス
    #[arg(long, env = "DSTACK_SOCKET", default_value = DEFAULT_DSTACK_SOCKET)]
    pub dstack_socket: PathBuf,

    /// セカンダリソケットのパス
    #[arg(long, env = "TAPPD_SOCKET", default_value = DEFAULT_TAPPD_SOCKET)]
    pub tappd_socket: PathBuf,

    /// バックエンドの接続・読み取りタイムアウト（ミリ秒）
    #[arg(long, env = "BACKEND_TIMEOUT_MS", default_value_t = 250)]
    pub backend_timeout_ms: u64,

    /// AttestationエクスプローラーのベースURL
    #[arg(
        long,
        env = "ATTESTATION_EXPLORER",
        default_value = "https://proof.t16z.com/"
    )]
    pub attestation_explorer: String,

    /// ノードダッシュボードのドメイン
    #[arg(
        long,
        env = "DASHBOARD_DOMAIN",
        default_value = "dstack-pha-prod7.phala.network"
    )]
    pub dashboard_domain: String,
}

impl Cli {
    /// リッスンアドレス（"host:port"）。
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// 共有状態を構築する。
    pub fn into_state(self) -> GatewayState {
        GatewayState {
            identity: Identity {
                app_id: self.app_id,
                device_id: self.device_id,
                instance_id: self.instance_id,
            },
            sockets: SocketPaths {
                primary: self.dstack_socket,
                secondary: self.tappd_socket,
            },
            backend_timeout: Duration::from_millis(self.backend_timeout_ms),
            attestation_explorer: self.attestation_explorer,
            dashboard_domain: self.dashboard_domain,
        }
    }
}

/// ランタイムの識別子。プロセス生存期間中は不変。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// アプリケーションID（フォールバック測定値のシード）
    pub app_id: String,
    /// デバイスID
    pub device_id: String,
    /// インスタンスID
    pub instance_id: String,
}

/// トランスポート探索の対象となる2つのソケットパス。優先順位順。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketPaths {
    /// プライマリ（改行区切りJSON RPC）
    pub primary: PathBuf,
    /// セカンダリ（ソケット上のHTTP）
    pub secondary: PathBuf,
}

impl Default for SocketPaths {
    fn default() -> Self {
        Self {
            primary: PathBuf::from(DEFAULT_DSTACK_SOCKET),
            secondary: PathBuf::from(DEFAULT_TAPPD_SOCKET),
        }
    }
}

/// Gatewayの共有状態。`Arc` で全リクエストから共有される。
pub struct GatewayState {
    /// ランタイム識別子
    pub identity: Identity,
    /// 探索対象のソケットパス
    pub sockets: SocketPaths,
    /// バックエンド呼び出しのタイムアウト
    pub backend_timeout: Duration,
    /// AttestationエクスプローラーのベースURL（末尾スラッシュ付き）
    pub attestation_explorer: String,
    /// ノードダッシュボードのドメイン
    pub dashboard_domain: String,
}
