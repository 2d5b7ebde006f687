//! # ソケット上のHTTPクライアント
//!
//! ## プロトコル (Gateway → TEEホスト)
//! ```text
//! GET /prpc/Tappd.<Method>?json HTTP/1.1
//! Host: localhost
//! Connection: close
//! [Content-Type: application/json]
//! [Content-Length: <n>]
//!
//! [<params JSON>]
//! ```
//!
//! ## プロトコル (TEEホスト → Gateway)
//! ステータス200のHTTP/1.1レスポンス。ボディはJSON（chunked転送にも対応）。
//! 200以外のステータス、またはボディが空の場合は `Malformed`。

use std::path::PathBuf;
use std::time::Duration;

use attest_types::TransportKind;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::{io_unreachable, open_socket, with_deadline, BackendClient, BackendError, MAX_RESPONSE_BYTES};

/// RPCパスの接頭辞。メソッド名がそのまま続く。
pub const RPC_PATH_PREFIX: &str = "/prpc/Tappd.";

/// ソケット上のHTTPクライアント。
pub struct HttpSocketClient {
    /// ソケットパス
    socket_path: PathBuf,
    /// 接続から読み取り完了までの期限
    timeout: Duration,
}

impl HttpSocketClient {
    /// クライアントを構築する。接続はまだ行わない。
    pub fn new(socket_path: PathBuf, timeout: Duration) -> Self {
        Self {
            socket_path,
            timeout,
        }
    }

    /// リクエストを送り、接続が閉じられるまで応答を読み取る。
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

        let mut response = Vec::new();
        (&mut stream)
            .take(MAX_RESPONSE_BYTES + 1)
            .read_to_end(&mut response)
            .await
            .map_err(io_unreachable("レスポンス読み取り失敗"))?;

        if response.len() as u64 > MAX_RESPONSE_BYTES {
            return Err(BackendError::Malformed(format!(
                "レスポンスが上限を超えています: {MAX_RESPONSE_BYTES} bytes"
            )));
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl BackendClient for HttpSocketClient {
    fn transport(&self) -> TransportKind {
        TransportKind::SocketHttp
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

/// GETリクエストを組み立てる。paramsがnullでなければJSONボディとして付与する。
fn encode_request(method: &str, params: &serde_json::Value) -> Result<Vec<u8>, BackendError> {
    let body = if params.is_null() {
        Vec::new()
    } else {
        serde_json::to_vec(params)
            .map_err(|e| BackendError::Malformed(format!("paramsのシリアライズに失敗: {e}")))?
    };

    let mut head = format!(
        "GET {RPC_PATH_PREFIX}{method}?json HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n"
    );
    if !body.is_empty() {
        head.push_str("Content-Type: application/json\r\n");
        head.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    head.push_str("\r\n");

    let mut request = head.into_bytes();
    request.extend_from_slice(&body);
    Ok(request)
}

/// HTTPレスポンスからステータスを確認し、JSONボディを取り出す。
fn decode_response(raw: &[u8]) -> Result<serde_json::Value, BackendError> {
    let separator = find(raw, b"\r\n\r\n")
        .ok_or_else(|| BackendError::Malformed("ヘッダとボディの区切りがありません".to_string()))?;

    let head = std::str::from_utf8(&raw[..separator])
        .map_err(|e| BackendError::Malformed(format!("ヘッダがUTF-8ではありません: {e}")))?;
    let mut lines = head.split("\r\n");

    let status = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| BackendError::Malformed("ステータス行が不正です".to_string()))?;
    if status != 200 {
        return Err(BackendError::Malformed(format!(
            "バックエンドがHTTP {status}を返しました"
        )));
    }

    let chunked = lines.any(|line| {
        line.split_once(':').is_some_and(|(name, value)| {
            name.trim().eq_ignore_ascii_case("transfer-encoding")
                && value.to_ascii_lowercase().contains("chunked")
        })
    });

    let body = &raw[separator + 4..];
    let body = if chunked {
        decode_chunked(body)?
    } else {
        body.to_vec()
    };

    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(BackendError::Malformed("ボディがありません".to_string()));
    }

    serde_json::from_slice(&body)
        .map_err(|e| BackendError::Malformed(format!("JSONのパースに失敗: {e}")))
}

/// `Transfer-Encoding: chunked` のボディを連結する。
fn decode_chunked(mut body: &[u8]) -> Result<Vec<u8>, BackendError> {
    let truncated = || BackendError::Malformed("chunkedボディが途中で切れています".to_string());
    let mut decoded = Vec::new();

    loop {
        let line_end = find(body, b"\r\n").ok_or_else(truncated)?;
        let size_line = std::str::from_utf8(&body[..line_end]).map_err(|_| truncated())?;
        let size_hex = size_line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_hex, 16)
            .map_err(|e| BackendError::Malformed(format!("chunkサイズが不正です: {e}")))?;
        body = body.get(line_end + 2..).ok_or_else(truncated)?;

        if size == 0 {
            return Ok(decoded);
        }
        // chunkサイズは受信済みのボディ長を超えられない
        if size > body.len() {
            return Err(truncated());
        }
        let (chunk, rest) = body.split_at(size);
        decoded.extend_from_slice(chunk);
        body = rest.strip_prefix(b"\r\n").ok_or_else(truncated)?;
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
