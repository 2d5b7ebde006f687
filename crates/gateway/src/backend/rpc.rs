//! # 改行区切りJSON RPCクライアント
//!
//! ## プロトコル (Gateway → TEEホスト)
//! ```text
//! {"method":"<Method>","params":{...}}\n
//! ```
//!
//! ## プロトコル (TEEホスト → Gateway)
//! ```text
//! <JSON>\n   （または接続クローズまで）
//! ```
//!
//! 応答が `{"result": ...}` の形であれば `result` を取り出す。
//! `error` が null 以外であれば `Malformed`。

use std::path::PathBuf;
use std::time::Duration;

use attest_types::TransportKind;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

use super::{io_unreachable, open_socket, with_deadline, BackendClient, BackendError, MAX_RESPONSE_BYTES};

/// 改行区切りJSON RPCクライアント。
pub struct RpcSocketClient {
    /// ソケットパス
    socket_path: PathBuf,
    /// 接続から読み取り完了までの期限
    timeout: Duration,
}

impl RpcSocketClient {
    /// クライアントを構築する。接続はまだ行わない。
    pub fn new(socket_path: PathBuf, timeout: Duration) -> Self {
        Self {
            socket_path,
            timeout,
        }
    }

    /// 1行のリクエストを送り、1行（またはEOFまで）の応答を読み取る。
    async fn exchange(&self, request: &[u8]) -> Result<Vec<u8>, BackendError> {
        let mut stream = open_socket(&self.socket_path).await?;

        stream
            .write_all(request)
            .await
            .map_err(io_unreachable("リクエスト送信失敗"))?;
        stream
            .flush()
            .await
            .map_err(io_unreachable("リクエスト送信失敗"))?;

        let mut reader = BufReader::new(stream).take(MAX_RESPONSE_BYTES);
        let mut response = Vec::new();
        reader
            .read_until(b'\n', &mut response)
            .await
            .map_err(io_unreachable("レスポンス読み取り失敗"))?;

        Ok(response)
    }
}

#[async_trait::async_trait]
impl BackendClient for RpcSocketClient {
    fn transport(&self) -> TransportKind {
        TransportKind::SocketRpc
    }

    async fn call(
        &self,
        method: &str,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value, BackendError> {
        let request = encode_request(method, params)?;
        let response = with_deadline(self.timeout, self.exchange(&request)).await?;
        decode_response(&response)
    }
}

/// `{"method", "params"}` + 改行 をエンコードする。
fn encode_request(method: &str, params: &serde_json::Value) -> Result<Vec<u8>, BackendError> {
    let mut line = serde_json::to_vec(&serde_json::json!({
        "method": method,
        "params": params,
    }))
    .map_err(|e| BackendError::Malformed(format!("リクエストのシリアライズに失敗: {e}")))?;
    line.push(b'\n');
    Ok(line)
}

/// 応答行をJSONとしてデコードする。
fn decode_response(raw: &[u8]) -> Result<serde_json::Value, BackendError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(BackendError::Malformed("空のレスポンス".to_string()));
    }

    let value: serde_json::Value = serde_json::from_slice(raw)
        .map_err(|e| BackendError::Malformed(format!("JSONのパースに失敗: {e}")))?;

    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        return Err(BackendError::Malformed(format!(
            "バックエンドがエラーを返しました: {error}"
        )));
    }

    match value {
        serde_json::Value::Object(mut map) if map.contains_key("result") => {
            Ok(map.remove("result").unwrap_or_default())
        }
        other => Ok(other),
    }
}
