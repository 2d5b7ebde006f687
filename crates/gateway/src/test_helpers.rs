//! # テスト用共通ヘルパー
//!
//! backend, router, endpointsのテストで共有するモックTEEホスト群。
//! いずれも一時ディレクトリ上の一意なパスにUnixソケットを作成する。

use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::task::JoinHandle;

/// テスト用の一意なソケットパスを返す（ファイルは作成しない）。
pub fn unique_socket_path(label: &str) -> PathBuf {
    let id = uuid::Uuid::new_v4().simple().to_string();
    std::env::temp_dir().join(format!("attest-{label}-{}.sock", &id[..12]))
}

/// 改行区切りJSON RPCのモックを起動する。
/// 1接続だけ受け付け、1行読んで `response` + 改行を返す。受信したリクエスト行を返す。
pub async fn start_rpc_mock(path: &Path, response: &str) -> JoinHandle<Vec<u8>> {
    let listener = UnixListener::bind(path).unwrap();
    let response = format!("{response}\n");

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(stream);
        let mut request = Vec::new();
        reader.read_until(b'\n', &mut request).await.unwrap();

        let mut stream = reader.into_inner();
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.flush().await.unwrap();
        request
    })
}

/// ソケット上のHTTPのモックを起動する。
/// 1接続だけ受け付け、ヘッダとContent-Length分のボディを読んで `raw_response` を返し、接続を閉じる。
pub async fn start_http_mock(path: &Path, raw_response: Vec<u8>) -> JoinHandle<String> {
    let listener = UnixListener::bind(path).unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(stream);

        let mut head = String::new();
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            if let Some(value) = line
                .to_ascii_lowercase()
                .strip_prefix("content-length:")
                .map(|v| v.trim().to_string())
            {
                content_length = value.parse().unwrap();
            }
            head.push_str(&line);
            if line == "\r\n" || line.is_empty() {
                break;
            }
        }

        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).await.unwrap();
        head.push_str(&String::from_utf8(body).unwrap());

        let mut stream = reader.into_inner();
        stream.write_all(&raw_response).await.unwrap();
        stream.shutdown().await.unwrap();
        head
    })
}

/// HTTP 200 + JSONボディの生レスポンスを組み立てる。
pub fn http_ok(body: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    )
    .into_bytes()
}

/// 1接続だけ受け付け、リクエストを読まずに `raw_response` を書いて閉じるモックを起動する。
/// クライアントが途中で読み取りをやめた場合の書き込みエラーは無視する。
pub async fn start_raw_mock(path: &Path, raw_response: Vec<u8>) {
    let listener = UnixListener::bind(path).unwrap();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _ = stream.write_all(&raw_response).await;
        let _ = stream.shutdown().await;
    });
}

/// 接続を受け付けるが一切応答しないモックを起動する。
pub async fn start_silent_mock(path: &Path) {
    let listener = UnixListener::bind(path).unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
}

/// ソケットファイルだけが残り、接続は拒否される状態を作る。
pub fn refused_socket(path: &Path) {
    let listener = std::os::unix::net::UnixListener::bind(path).unwrap();
    drop(listener);
}
