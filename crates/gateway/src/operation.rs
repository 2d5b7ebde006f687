//! # 論理操作と操作結果
//!
//! HTTPリクエストを検証した後の操作（`Operation`）と、
//! 実機・フォールバックいずれかの経路で生成された結果（`OperationResult`）。

use attest_crypto::sha256_hex;
use attest_types::{
    AttestationRecord, ExecuteRequest, ExecutionRecord, GenerateAttestationRequest, InfoRecord,
    KeyRecord, KeyRequest, MeasurementsRecord, Provenance, QuoteRecord, QuoteRequest,
    SecurityStatusRecord, VerificationRecord, VerifyAttestationRequest,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Identity;
use crate::error::GatewayError;
use crate::transport::Availability;

/// purpose省略時の既定値。
pub const DEFAULT_KEY_PURPOSE: &str = "attestation";

/// TEE種別。
pub const TEE_TYPE: &str = "Intel TDX";

/// 提供機能の一覧。
pub const CAPABILITIES: [&str; 3] = ["attestation", "sealing", "measurement"];

/// 検証済みの論理操作。
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// TEE情報
    Info,
    /// 測定レジスタ
    Measurements,
    /// Attestation生成
    GenerateAttestation { data: String, nonce: String },
    /// Attestation検証
    VerifyAttestation {
        attestation_id: String,
        expected_data: String,
    },
    /// 鍵導出
    GetKey { path: String, purpose: String },
    /// quote取得
    GetQuote { data: String },
    /// エンクレーブ内での関数実行
    Execute {
        function: String,
        params: serde_json::Value,
    },
    /// セキュリティ状態
    SecurityStatus,
}

impl Operation {
    // ------------------------------------------------------------------
    // リクエストからの構築（入力検証）
    // ------------------------------------------------------------------

    /// Attestation生成。nonce省略時は受付時刻から生成する。
    pub fn generate_attestation(
        req: GenerateAttestationRequest,
        issued_at: DateTime<Utc>,
    ) -> Result<Self, GatewayError> {
        Ok(Operation::GenerateAttestation {
            data: required(req.data, "data")?,
            nonce: req.nonce.unwrap_or_else(|| default_nonce(issued_at)),
        })
    }

    /// Attestation検証。
    pub fn verify_attestation(req: VerifyAttestationRequest) -> Result<Self, GatewayError> {
        Ok(Operation::VerifyAttestation {
            attestation_id: required(req.attestation_id, "attestation_id")?,
            expected_data: required(req.expected_data, "expected_data")?,
        })
    }

    /// 鍵導出。purpose省略時は `"attestation"`。
    pub fn get_key(req: KeyRequest) -> Result<Self, GatewayError> {
        Ok(Operation::GetKey {
            path: required(req.path, "path")?,
            purpose: req
                .purpose
                .unwrap_or_else(|| DEFAULT_KEY_PURPOSE.to_string()),
        })
    }

    /// quote取得。
    pub fn get_quote(req: QuoteRequest) -> Result<Self, GatewayError> {
        Ok(Operation::GetQuote {
            data: required(req.data, "data")?,
        })
    }

    /// 関数実行。params省略時は空オブジェクト。
    pub fn execute(req: ExecuteRequest) -> Result<Self, GatewayError> {
        Ok(Operation::Execute {
            function: required(req.function, "function")?,
            params: req
                .params
                .filter(|p| !p.is_null())
                .unwrap_or_else(|| serde_json::json!({})),
        })
    }

    // ------------------------------------------------------------------
    // バックエンド呼び出し
    // ------------------------------------------------------------------

    /// ログ用の操作名。
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Info => "info",
            Operation::Measurements => "measurements",
            Operation::GenerateAttestation { .. } => "generate_attestation",
            Operation::VerifyAttestation { .. } => "verify_attestation",
            Operation::GetKey { .. } => "get_key",
            Operation::GetQuote { .. } => "get_quote",
            Operation::Execute { .. } => "execute",
            Operation::SecurityStatus => "security_status",
        }
    }

    /// バックエンドのメソッド名。
    pub fn backend_method(&self) -> &'static str {
        match self {
            Operation::Info | Operation::Measurements | Operation::SecurityStatus => "Info",
            Operation::GenerateAttestation { .. } | Operation::GetQuote { .. } => "GetQuote",
            Operation::VerifyAttestation { .. } => "VerifyQuote",
            Operation::GetKey { .. } => "GetKey",
            Operation::Execute { .. } => "Execute",
        }
    }

    /// バックエンドに渡すパラメータ。パラメータを取らない操作は `null`。
    pub fn backend_params(&self) -> serde_json::Value {
        match self {
            Operation::Info | Operation::Measurements | Operation::SecurityStatus => {
                serde_json::Value::Null
            }
            Operation::GenerateAttestation { data, nonce } => serde_json::json!({
                "report_data": attestation_report_data(data, nonce),
            }),
            Operation::GetQuote { data } => serde_json::json!({
                "report_data": sha256_hex(data),
            }),
            Operation::VerifyAttestation {
                attestation_id,
                expected_data,
            } => serde_json::json!({
                "attestation_id": attestation_id,
                "expected_data": expected_data,
            }),
            Operation::GetKey { path, purpose } => serde_json::json!({
                "path": path,
                "purpose": purpose,
            }),
            Operation::Execute { function, params } => serde_json::json!({
                "function": function,
                "params": params,
            }),
        }
    }
}

/// 必須フィールドを取り出す。欠落・空文字列は `Validation`。
pub(crate) fn required(value: Option<String>, field: &str) -> Result<String, GatewayError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| GatewayError::Validation(format!("{field}は必須です")))
}

/// Attestationのreport_data（`sha256("<data>:<nonce>")`）。
pub fn attestation_report_data(data: &str, nonce: &str) -> String {
    sha256_hex(format!("{data}:{nonce}"))
}

/// 1リクエストの処理中に共有される入力。
#[derive(Debug, Clone)]
pub struct RequestContext<'a> {
    /// ランタイム識別子
    pub identity: &'a Identity,
    /// リクエスト受付時点の各ソケットの有無
    pub availability: Availability,
    /// リクエスト受付時刻
    pub issued_at: DateTime<Utc>,
}

impl RequestContext<'_> {
    /// 受付時刻（RFC 3339）。
    pub fn timestamp(&self) -> String {
        format_timestamp(self.issued_at)
    }

    /// 受付時刻（UNIXミリ秒）。
    pub fn millis(&self) -> i64 {
        self.issued_at.timestamp_millis()
    }
}

/// 時刻をRFC 3339（ミリ秒精度、UTC "Z"）で整形する。
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// nonce省略時の既定値（"<秒>.<マイクロ秒>"）。
pub fn default_nonce(at: DateTime<Utc>) -> String {
    format!("{}.{:06}", at.timestamp(), at.timestamp_subsec_micros())
}

/// 操作結果。エンベロープの `payload` としてそのままシリアライズされる。
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OperationResult {
    Info(InfoRecord),
    Measurements(MeasurementsRecord),
    Attestation(AttestationRecord),
    Verification(VerificationRecord),
    Key(KeyRecord),
    Quote(QuoteRecord),
    Execution(ExecutionRecord),
    Security(SecurityStatusRecord),
}

impl OperationResult {
    /// 結果の出自。
    pub fn provenance(&self) -> &Provenance {
        match self {
            OperationResult::Info(r) => &r.provenance,
            OperationResult::Measurements(r) => &r.provenance,
            OperationResult::Attestation(r) => &r.provenance,
            OperationResult::Verification(r) => &r.provenance,
            OperationResult::Key(r) => &r.provenance,
            OperationResult::Quote(r) => &r.provenance,
            OperationResult::Execution(r) => &r.provenance,
            OperationResult::Security(r) => &r.provenance,
        }
    }
}
