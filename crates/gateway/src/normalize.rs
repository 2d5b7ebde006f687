//! # 実機ペイロードの正規化
//!
//! バックエンドが返したJSONを操作ごとのレコードに変換する。
//! 変換できないペイロードは `BackendError::Malformed` となり、
//! ルーターがフォールバックに切り替える（出自を偽らないため）。

use attest_crypto::{is_hex_digest, sha256_hex};
use attest_types::{
    AttestationRecord, ExecutionRecord, InfoRecord, KeyRecord, MeasurementSet, MeasurementsRecord,
    Provenance, QuoteRecord, SecurityStatusRecord, VerificationRecord,
};
use serde_json::Value;

use crate::backend::BackendError;
use crate::operation::{Operation, OperationResult, RequestContext, CAPABILITIES, TEE_TYPE};

/// バックエンドの応答を操作のレコードに変換する。
pub fn normalize(
    op: &Operation,
    raw: Value,
    source: &str,
    ctx: &RequestContext<'_>,
) -> Result<OperationResult, BackendError> {
    let provenance = Provenance::real(source);
    let identity = ctx.identity;

    let result = match op {
        Operation::Info => {
            expect_object(&raw)?;
            OperationResult::Info(InfoRecord {
                app_id: string_or(&raw, "app_id", &identity.app_id),
                device_id: string_or(&raw, "device_id", &identity.device_id),
                instance_id: string_or(&raw, "instance_id", &identity.instance_id),
                tee_type: string_or(&raw, "tee_type", TEE_TYPE),
                capabilities: CAPABILITIES.iter().map(|c| c.to_string()).collect(),
                tcb_info: extract_measurements(&raw).ok().map(|(set, _)| set),
                dstack_available: ctx.availability.dstack,
                tappd_available: ctx.availability.tappd,
                backend_info: Some(raw),
                provenance,
            })
        }
        Operation::Measurements => {
            let (registers, tcb) = extract_measurements(&raw)?;
            OperationResult::Measurements(MeasurementsRecord {
                registers,
                compose_hash: optional_string(&tcb, "compose_hash")?,
                os_image_hash: optional_string(&tcb, "os_image_hash")?,
                device_id: identity.device_id.clone(),
                provenance,
            })
        }
        Operation::GenerateAttestation { data, nonce } => {
            let quote = required_string(&raw, "quote")?;
            let quote_digest = sha256_hex(&quote);
            OperationResult::Attestation(AttestationRecord {
                attestation_id: format!("tee-{}", &quote_digest[..16]),
                input_data: data.clone(),
                nonce: nonce.clone(),
                quote,
                measurements: extract_measurements(&raw).ok().map(|(set, _)| set),
                device_id: identity.device_id.clone(),
                timestamp: ctx.timestamp(),
                provenance,
            })
        }
        Operation::VerifyAttestation {
            attestation_id,
            expected_data,
        } => {
            let verified = raw
                .get("verified")
                .and_then(Value::as_bool)
                .ok_or_else(|| malformed("verified（bool）がありません"))?;
            OperationResult::Verification(VerificationRecord {
                attestation_id: attestation_id.clone(),
                expected_data: expected_data.clone(),
                verified,
                provenance,
            })
        }
        Operation::GetKey { path, purpose } => OperationResult::Key(KeyRecord {
            key_id: format!("key-{path}"),
            path: path.clone(),
            purpose: purpose.clone(),
            key: required_string(&raw, "key")?,
            signature_chain: signature_chain(&raw)?,
            timestamp: ctx.timestamp(),
            provenance,
        }),
        Operation::GetQuote { data } => OperationResult::Quote(QuoteRecord {
            quote_id: format!("quote-{}", ctx.millis()),
            data: data.clone(),
            quote: required_string(&raw, "quote")?,
            event_log: optional_string(&raw, "event_log")?,
            timestamp: ctx.timestamp(),
            provenance,
        }),
        Operation::Execute { function, params } => {
            let execution_id = match raw.get("execution_id").and_then(Value::as_str) {
                Some(id) => id.to_string(),
                None => sha256_hex(format!("{function}:{params}:{}", ctx.millis()))[..16]
                    .to_string(),
            };
            let result = match raw {
                Value::Object(mut map) if map.contains_key("result") => {
                    map.remove("result").unwrap_or_default()
                }
                other => other,
            };
            OperationResult::Execution(ExecutionRecord {
                execution_id,
                function: function.clone(),
                params: params.clone(),
                result,
                timestamp: ctx.timestamp(),
                provenance,
            })
        }
        Operation::SecurityStatus => {
            expect_object(&raw)?;
            OperationResult::Security(SecurityStatusRecord {
                secure: true,
                tee_enabled: true,
                attestation_available: true,
                dstack_available: ctx.availability.dstack,
                tappd_available: ctx.availability.tappd,
                device_id: identity.device_id.clone(),
                provenance,
            })
        }
    };

    Ok(result)
}

/// 測定レジスタを取り出す。
///
/// `tcb_info` があればその中（オブジェクトまたはJSON文字列）から、なければトップレベルから読む。
/// 5つ全てが存在し、hexで、長さが揃っていなければならない。
/// レジスタを読んだオブジェクトも返す（compose_hash等の取り出し用）。
pub fn extract_measurements(raw: &Value) -> Result<(MeasurementSet, Value), BackendError> {
    let tcb = match raw.get("tcb_info") {
        Some(Value::String(encoded)) => serde_json::from_str::<Value>(encoded)
            .map_err(|e| malformed(&format!("tcb_infoのパースに失敗: {e}")))?,
        Some(object @ Value::Object(_)) => object.clone(),
        Some(_) => return Err(malformed("tcb_infoの型が不正です")),
        None => raw.clone(),
    };

    let register = |name: &str| -> Result<String, BackendError> {
        let value = required_string(&tcb, name)?;
        if !is_hex_digest(&value) {
            return Err(malformed(&format!("{name}がhexではありません")));
        }
        Ok(value)
    };

    let set = MeasurementSet {
        mrtd: register("mrtd")?,
        rtmr0: register("rtmr0")?,
        rtmr1: register("rtmr1")?,
        rtmr2: register("rtmr2")?,
        rtmr3: register("rtmr3")?,
    };

    let width = set.mrtd.len();
    if set.iter().any(|(_, value)| value.len() != width) {
        return Err(malformed("測定レジスタの長さが揃っていません"));
    }

    Ok((set, tcb))
}

fn malformed(message: &str) -> BackendError {
    BackendError::Malformed(message.to_string())
}

fn expect_object(raw: &Value) -> Result<(), BackendError> {
    if raw.is_object() {
        Ok(())
    } else {
        Err(malformed("JSONオブジェクトではありません"))
    }
}

fn required_string(raw: &Value, field: &str) -> Result<String, BackendError> {
    raw.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| malformed(&format!("{field}（文字列）がありません")))
}

/// 存在しない・nullなら `None`。文字列以外は不正。
fn optional_string(raw: &Value, field: &str) -> Result<Option<String>, BackendError> {
    match raw.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(malformed(&format!("{field}の型が不正です"))),
    }
}

fn string_or(raw: &Value, field: &str, default: &str) -> String {
    raw.get(field)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

fn signature_chain(raw: &Value) -> Result<Vec<String>, BackendError> {
    match raw.get("signature_chain") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| malformed("signature_chainの要素が文字列ではありません"))
            })
            .collect(),
        Some(_) => Err(malformed("signature_chainの型が不正です")),
    }
}
