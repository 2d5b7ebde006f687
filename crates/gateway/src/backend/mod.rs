//! # TEEバックエンドクライアント
//!
//! ローカルソケット上の2種類のプロトコルを `BackendClient` トレイトで抽象化する。
//!
//! 現在のクライアント実装:
//! - `rpc`: 改行区切りJSON RPC（プライマリソケット）
//! - `http`: ソケット上のHTTP/1.1（セカンダリソケット）
//!
//! 1回の呼び出しにつき接続は1回のみ。リトライは行わない。
//! 失敗は全て `BackendError` として返り、呼び出し側でフォールバックに回復される。

pub mod http;
pub mod rpc;

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use attest_types::TransportKind;
use tokio::net::UnixStream;

use crate::transport::BackendDescriptor;

/// レスポンスの最大サイズ（バイト）。
pub const MAX_RESPONSE_BYTES: u64 = 1024 * 1024;

/// バックエンド呼び出しのエラー。どちらも回復可能（フォールバックの契機）。
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// ソケットに接続できない・タイムアウト
    #[error("バックエンドに到達できません: {0}")]
    Unreachable(String),
    /// 応答はあったがペイロードを解釈できない
    #[error("バックエンドの応答が不正です: {0}")]
    Malformed(String),
}

/// TEEバックエンドクライアントのトレイト。
#[async_trait::async_trait]
pub trait BackendClient: Send + Sync {
    /// 通信プロトコル種別を返す。
    fn transport(&self) -> TransportKind;

    /// バックエンドのメソッドを呼び出し、JSONペイロードを返す。
    async fn call(
        &self,
        method: &str,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value, BackendError>;
}

/// 探索結果に対応するクライアントを構築する。`Unavailable` の場合は `None`。
///
/// クライアントはリクエストごとに構築され、接続は `call` のたびに張り直す。
pub fn connect_client(
    descriptor: &BackendDescriptor,
    timeout: Duration,
) -> Option<Box<dyn BackendClient>> {
    match descriptor {
        BackendDescriptor::Real {
            transport: TransportKind::SocketRpc,
            socket_path,
        } => Some(Box::new(rpc::RpcSocketClient::new(socket_path.clone(), timeout))),
        BackendDescriptor::Real {
            transport: TransportKind::SocketHttp,
            socket_path,
        } => Some(Box::new(http::HttpSocketClient::new(socket_path.clone(), timeout))),
        BackendDescriptor::Unavailable => None,
    }
}

/// ソケットに接続する。失敗は `Unreachable`。
pub(crate) async fn open_socket(path: &Path) -> Result<UnixStream, BackendError> {
    UnixStream::connect(path)
        .await
        .map_err(|e| BackendError::Unreachable(format!("{}: {e}", path.display())))
}

/// 接続から読み取りまでを期限付きで実行する。期限超過は `Unreachable`。
pub(crate) async fn with_deadline<T>(
    timeout: Duration,
    exchange: impl Future<Output = Result<T, BackendError>>,
) -> Result<T, BackendError> {
    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| {
            BackendError::Unreachable(format!("{}ms以内に応答がありません", timeout.as_millis()))
        })?
}

/// I/Oエラーを `Unreachable` に変換する。
pub(crate) fn io_unreachable(context: &str) -> impl Fn(std::io::Error) -> BackendError + '_ {
    move |e| BackendError::Unreachable(format!("{context}: {e}"))
}
