//! # Attestationルーター
//!
//! 1操作ごとに以下を行う:
//! 1. 受付時刻を確定し、ソケットを探索する
//! 2. 実機バックエンドがあれば呼び出し、応答を正規化する
//! 3. バックエンドがない・失敗した場合はフォールバックで生成する
//! 4. 結果を成功エンベロープで包む
//!
//! バックエンドの失敗はここで回復され、呼び出し元にエラーとして返ることはない。
//! 返るのはフォールバック生成自体の失敗（`GatewayError::Internal`）のみ。
//! ルーターはリクエストごとに構築され、状態を持たない。

use attest_types::Envelope;
use chrono::{DateTime, Utc};

use crate::backend::{self, BackendClient, BackendError};
use crate::config::GatewayState;
use crate::error::GatewayError;
use crate::fallback;
use crate::normalize::normalize;
use crate::operation::{Operation, OperationResult, RequestContext};
use crate::transport::{self, source_name, BackendDescriptor};

/// Attestationルーター。
pub struct AttestationRouter<'a> {
    state: &'a GatewayState,
}

impl<'a> AttestationRouter<'a> {
    pub fn new(state: &'a GatewayState) -> Self {
        Self { state }
    }

    /// 現在時刻を受付時刻として操作を実行する。
    pub async fn dispatch(&self, op: Operation) -> Result<Envelope<OperationResult>, GatewayError> {
        self.dispatch_at(op, Utc::now()).await
    }

    /// 指定した受付時刻で操作を実行する。
    pub async fn dispatch_at(
        &self,
        op: Operation,
        issued_at: DateTime<Utc>,
    ) -> Result<Envelope<OperationResult>, GatewayError> {
        let (availability, descriptor) = transport::probe(&self.state.sockets);
        let ctx = RequestContext {
            identity: &self.state.identity,
            availability,
            issued_at,
        };

        let result = match self.call_real(&descriptor, &op, &ctx).await {
            Some(result) => result,
            None => fallback::generate(&op, &ctx)
                .map_err(|e| GatewayError::Internal(format!("フォールバック生成に失敗: {e}")))?,
        };

        let provenance = result.provenance();
        tracing::debug!(
            operation = op.name(),
            is_real = provenance.is_real,
            source = %provenance.source,
            "操作完了"
        );

        Ok(Envelope::success(result, ctx.timestamp()))
    }

    /// 実機バックエンドを呼び出す。利用不可・失敗時は `None`。
    async fn call_real(
        &self,
        descriptor: &BackendDescriptor,
        op: &Operation,
        ctx: &RequestContext<'_>,
    ) -> Option<OperationResult> {
        let client = backend::connect_client(descriptor, self.state.backend_timeout)?;

        match call_and_normalize(client.as_ref(), op, ctx).await {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::warn!(
                    operation = op.name(),
                    transport = ?client.transport(),
                    error = %e,
                    "バックエンド呼び出しに失敗、フォールバックで応答"
                );
                None
            }
        }
    }
}

async fn call_and_normalize(
    client: &dyn BackendClient,
    op: &Operation,
    ctx: &RequestContext<'_>,
) -> Result<OperationResult, BackendError> {
    let raw = client
        .call(op.backend_method(), &op.backend_params())
        .await?;
    normalize(op, raw, source_name(client.transport()), ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Identity, SocketPaths};
    use crate::test_helpers::{
        http_ok, refused_socket, start_http_mock, start_rpc_mock, unique_socket_path,
    };
    use attest_crypto::sha256_hex;
    use attest_types::{EnvelopeStatus, Provenance};
    use chrono::TimeZone;
    use std::time::Duration;

    fn state(sockets: SocketPaths) -> GatewayState {
        GatewayState {
            identity: Identity {
                app_id: "app_123".to_string(),
                device_id: "tee-device-001".to_string(),
                instance_id: "instance-1".to_string(),
            },
            sockets,
            backend_timeout: Duration::from_millis(200),
            attestation_explorer: "https://proof.t16z.com/".to_string(),
            dashboard_domain: "example.test".to_string(),
        }
    }

    fn no_sockets() -> SocketPaths {
        SocketPaths {
            primary: unique_socket_path("primary"),
            secondary: unique_socket_path("secondary"),
        }
    }

    fn issued_at() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    /// ソケットがなければフォールバックで応答する
    #[tokio::test]
    async fn test_measurements_without_backend() {
        let state = state(no_sockets());
        let envelope = AttestationRouter::new(&state)
            .dispatch(Operation::Measurements)
            .await
            .unwrap();

        assert_eq!(envelope.status, EnvelopeStatus::Success);
        let OperationResult::Measurements(record) = envelope.payload else {
            panic!("Measurementsレコードではありません");
        };
        assert_eq!(record.registers.mrtd, sha256_hex("mrtd:app_123"));
        assert_eq!(record.provenance, Provenance::fallback());
    }

    /// 同一入力・同一時刻ならエンベロープ全体が一致する
    #[tokio::test]
    async fn test_fallback_dispatch_is_deterministic() {
        let state = state(no_sockets());
        let router = AttestationRouter::new(&state);
        let op = Operation::GetKey {
            path: "wallet".to_string(),
            purpose: "signing".to_string(),
        };

        let first = router.dispatch_at(op.clone(), issued_at()).await.unwrap();
        let second = router.dispatch_at(op, issued_at()).await.unwrap();
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
        assert_eq!(first.timestamp, "2023-11-14T22:13:20.000Z");
    }

    #[tokio::test]
    async fn test_real_rpc_backend() {
        let sockets = no_sockets();
        let received = start_rpc_mock(&sockets.primary, r#"{"quote":"abcd","event_log":"[]"}"#).await;
        let state = state(sockets.clone());

        let envelope = AttestationRouter::new(&state)
            .dispatch(Operation::GetQuote {
                data: "hello".to_string(),
            })
            .await
            .unwrap();

        let OperationResult::Quote(record) = envelope.payload else {
            panic!("Quoteレコードではありません");
        };
        assert_eq!(record.quote, "abcd");
        assert_eq!(record.event_log.as_deref(), Some("[]"));
        assert_eq!(record.provenance, Provenance::real("dstack"));

        let request: serde_json::Value =
            serde_json::from_slice(&received.await.unwrap()).unwrap();
        assert_eq!(request["method"], "GetQuote");
        assert_eq!(request["params"]["report_data"], sha256_hex("hello"));

        let _ = std::fs::remove_file(&sockets.primary);
    }

    #[tokio::test]
    async fn test_real_http_backend() {
        let sockets = no_sockets();
        let _received = start_http_mock(&sockets.secondary, http_ok(r#"{"verified":false}"#)).await;
        let state = state(sockets.clone());

        let envelope = AttestationRouter::new(&state)
            .dispatch(Operation::VerifyAttestation {
                attestation_id: "tee-1".to_string(),
                expected_data: "x".to_string(),
            })
            .await
            .unwrap();

        let OperationResult::Verification(record) = envelope.payload else {
            panic!("Verificationレコードではありません");
        };
        assert!(!record.verified);
        assert_eq!(record.provenance, Provenance::real("tappd"));

        let _ = std::fs::remove_file(&sockets.secondary);
    }

    /// 接続拒否はフォールバックに回復する
    #[tokio::test]
    async fn test_refused_backend_falls_back() {
        let sockets = no_sockets();
        refused_socket(&sockets.primary);
        let state = state(sockets.clone());

        let envelope = AttestationRouter::new(&state)
            .dispatch(Operation::SecurityStatus)
            .await
            .unwrap();

        assert_eq!(envelope.status, EnvelopeStatus::Success);
        let OperationResult::Security(status) = envelope.payload else {
            panic!("Securityレコードではありません");
        };
        assert_eq!(status.provenance, Provenance::fallback());
        assert!(status.dstack_available);
        assert!(!status.secure);

        let _ = std::fs::remove_file(&sockets.primary);
    }

    /// 解釈できないペイロードは実機扱いにしない
    #[tokio::test]
    async fn test_malformed_payload_falls_back() {
        let sockets = no_sockets();
        let _received = start_rpc_mock(&sockets.primary, r#"{"unexpected":true}"#).await;
        let state = state(sockets.clone());

        let envelope = AttestationRouter::new(&state)
            .dispatch_at(Operation::Measurements, issued_at())
            .await
            .unwrap();

        let OperationResult::Measurements(record) = envelope.payload else {
            panic!("Measurementsレコードではありません");
        };
        assert_eq!(record.provenance, Provenance::fallback());
        assert_eq!(record.registers.rtmr0, sha256_hex("rtmr0:app_123"));

        let _ = std::fs::remove_file(&sockets.primary);
    }

    /// 不正なchunkサイズを返すバックエンドもフォールバックに回復する
    #[tokio::test]
    async fn test_overflowing_chunked_response_falls_back() {
        let sockets = no_sockets();
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
                    ffffffffffffffff\r\nab\r\n0\r\n\r\n"
            .to_vec();
        let _received = start_http_mock(&sockets.secondary, raw).await;
        let state = state(sockets.clone());

        let envelope = AttestationRouter::new(&state)
            .dispatch(Operation::Measurements)
            .await
            .unwrap();

        assert_eq!(envelope.status, EnvelopeStatus::Success);
        let OperationResult::Measurements(record) = envelope.payload else {
            panic!("Measurementsレコードではありません");
        };
        assert_eq!(record.provenance, Provenance::fallback());

        let _ = std::fs::remove_file(&sockets.secondary);
    }

    /// 生成したAttestationをそのまま検証できる
    #[tokio::test]
    async fn test_generate_then_verify() {
        let state = state(no_sockets());
        let router = AttestationRouter::new(&state);

        let generated = router
            .dispatch(Operation::GenerateAttestation {
                data: "x".to_string(),
                nonce: "n".to_string(),
            })
            .await
            .unwrap();
        let OperationResult::Attestation(attestation) = generated.payload else {
            panic!("Attestationレコードではありません");
        };
        assert!(attestation.attestation_id.starts_with("tee-"));

        let verify = Operation::VerifyAttestation {
            attestation_id: attestation.attestation_id.clone(),
            expected_data: attestation.input_data.clone(),
        };
        let first = router.dispatch_at(verify.clone(), issued_at()).await.unwrap();
        let second = router.dispatch_at(verify, issued_at()).await.unwrap();

        let OperationResult::Verification(record) = &first.payload else {
            panic!("Verificationレコードではありません");
        };
        assert!(record.verified);
        assert_eq!(record.attestation_id, attestation.attestation_id);
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
    }
}
