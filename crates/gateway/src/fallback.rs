//! # 決定的フォールバック生成器
//!
//! 実機バックエンドが利用できない・失敗した場合に使用する。
//! 全ての値は `(Operation, Identity, 受付時刻)` の純粋関数であり、
//! 同一入力からは常に同一出力が得られる（実機なしでの再現可能なテスト用）。
//!
//! 生成される値はハードウェア由来ではない。全レコードは `is_real = false`,
//! `source = "fallback"` を持つ。
//!
//! ## 導出規則
//! | 値 | 導出 |
//! |----|------|
//! | レジスタ | `sha256("<register>:<app_id>")` |
//! | compose_hash | `sha256("compose:<app_id>")` |
//! | attestation quote | `sha256("quote:<app_id>:<data>:<nonce>")` |
//! | quote | `sha256("quote:<app_id>:<data>")` |
//! | 鍵 | `HKDF-SHA256(ikm=app_id, salt=instance_id, info="<path>:<purpose>")` |

use attest_crypto::{hkdf_derive_key, sha256_hex, CryptoError};
use attest_types::{
    AttestationRecord, ExecutionRecord, InfoRecord, KeyRecord, MeasurementSet, MeasurementsRecord,
    Provenance, QuoteRecord, SecurityStatusRecord, VerificationRecord,
};

use crate::config::Identity;
use crate::operation::{Operation, OperationResult, RequestContext, CAPABILITIES, TEE_TYPE};

/// フォールバックのOSイメージ名（os_image_hashのシード）。
pub const FALLBACK_OS_IMAGE: &str = "DStack 0.5.3";

/// 操作に対応するフォールバック結果を生成する。
///
/// 失敗し得るのは鍵導出のみ。
pub fn generate(op: &Operation, ctx: &RequestContext<'_>) -> Result<OperationResult, CryptoError> {
    let result = match op {
        Operation::Info => OperationResult::Info(info(ctx)),
        Operation::Measurements => OperationResult::Measurements(measurements(ctx.identity)),
        Operation::GenerateAttestation { data, nonce } => {
            OperationResult::Attestation(attestation(ctx, data, nonce))
        }
        Operation::VerifyAttestation {
            attestation_id,
            expected_data,
        } => OperationResult::Verification(VerificationRecord {
            attestation_id: attestation_id.clone(),
            expected_data: expected_data.clone(),
            // 構文的に正しいリクエストは全て検証成功とする。実際の検証は行っていない。
            verified: true,
            provenance: Provenance::fallback(),
        }),
        Operation::GetKey { path, purpose } => OperationResult::Key(key(ctx, path, purpose)?),
        Operation::GetQuote { data } => OperationResult::Quote(QuoteRecord {
            quote_id: format!("quote-{}", ctx.millis()),
            data: data.clone(),
            quote: sha256_hex(format!("quote:{}:{data}", ctx.identity.app_id)),
            event_log: None,
            timestamp: ctx.timestamp(),
            provenance: Provenance::fallback(),
        }),
        Operation::Execute { function, params } => {
            OperationResult::Execution(execution(ctx, function, params))
        }
        Operation::SecurityStatus => OperationResult::Security(SecurityStatusRecord {
            secure: false,
            tee_enabled: false,
            attestation_available: false,
            dstack_available: ctx.availability.dstack,
            tappd_available: ctx.availability.tappd,
            device_id: ctx.identity.device_id.clone(),
            provenance: Provenance::fallback(),
        }),
    };

    Ok(result)
}

/// 1レジスタ分の疑似測定値。
pub fn register_digest(register: &str, app_id: &str) -> String {
    sha256_hex(format!("{register}:{app_id}"))
}

/// 疑似測定レジスタ一式。
pub fn measurement_set(identity: &Identity) -> MeasurementSet {
    let app_id = identity.app_id.as_str();
    MeasurementSet {
        mrtd: register_digest("mrtd", app_id),
        rtmr0: register_digest("rtmr0", app_id),
        rtmr1: register_digest("rtmr1", app_id),
        rtmr2: register_digest("rtmr2", app_id),
        rtmr3: register_digest("rtmr3", app_id),
    }
}

fn measurements(identity: &Identity) -> MeasurementsRecord {
    MeasurementsRecord {
        registers: measurement_set(identity),
        compose_hash: Some(sha256_hex(format!("compose:{}", identity.app_id))),
        os_image_hash: Some(sha256_hex(FALLBACK_OS_IMAGE)),
        device_id: identity.device_id.clone(),
        provenance: Provenance::fallback(),
    }
}

fn info(ctx: &RequestContext<'_>) -> InfoRecord {
    let identity = ctx.identity;
    InfoRecord {
        app_id: identity.app_id.clone(),
        device_id: identity.device_id.clone(),
        instance_id: identity.instance_id.clone(),
        tee_type: TEE_TYPE.to_string(),
        capabilities: CAPABILITIES.iter().map(|c| c.to_string()).collect(),
        tcb_info: Some(measurement_set(identity)),
        dstack_available: ctx.availability.dstack,
        tappd_available: ctx.availability.tappd,
        backend_info: None,
        provenance: Provenance::fallback(),
    }
}

fn attestation(ctx: &RequestContext<'_>, data: &str, nonce: &str) -> AttestationRecord {
    let identity = ctx.identity;
    let nonce_digest = sha256_hex(nonce);
    AttestationRecord {
        attestation_id: format!("tee-{}-{}", ctx.millis(), &nonce_digest[..16]),
        input_data: data.to_string(),
        nonce: nonce.to_string(),
        quote: sha256_hex(format!("quote:{}:{data}:{nonce}", identity.app_id)),
        measurements: Some(measurement_set(identity)),
        device_id: identity.device_id.clone(),
        timestamp: ctx.timestamp(),
        provenance: Provenance::fallback(),
    }
}

fn key(ctx: &RequestContext<'_>, path: &str, purpose: &str) -> Result<KeyRecord, CryptoError> {
    let identity = ctx.identity;
    let key = hkdf_derive_key(
        identity.app_id.as_bytes(),
        identity.instance_id.as_bytes(),
        format!("{path}:{purpose}").as_bytes(),
    )?;

    Ok(KeyRecord {
        key_id: format!("key-{path}"),
        path: path.to_string(),
        purpose: purpose.to_string(),
        key: hex::encode(key),
        signature_chain: Vec::new(),
        timestamp: ctx.timestamp(),
        provenance: Provenance::fallback(),
    })
}

fn execution(
    ctx: &RequestContext<'_>,
    function: &str,
    params: &serde_json::Value,
) -> ExecutionRecord {
    let execution_digest = sha256_hex(format!("{function}:{params}:{}", ctx.millis()));
    ExecutionRecord {
        execution_id: execution_digest[..16].to_string(),
        function: function.to_string(),
        params: params.clone(),
        result: serde_json::json!({
            "simulated": true,
            "function": function,
            "params": params,
        }),
        timestamp: ctx.timestamp(),
        provenance: Provenance::fallback(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Availability;
    use attest_crypto::SHA256_HEX_LEN;
    use chrono::{TimeZone, Utc};

    fn identity() -> Identity {
        Identity {
            app_id: "app_123".to_string(),
            device_id: "tee-device-001".to_string(),
            instance_id: "instance-1".to_string(),
        }
    }

    fn ctx(identity: &Identity) -> RequestContext<'_> {
        RequestContext {
            identity,
            availability: Availability {
                dstack: false,
                tappd: false,
            },
            issued_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn test_register_digest_matches_definition() {
        let set = measurement_set(&identity());
        assert_eq!(set.mrtd, sha256_hex("mrtd:app_123"));
        assert_eq!(set.rtmr3, sha256_hex("rtmr3:app_123"));
        assert!(set.iter().all(|(_, value)| value.len() == SHA256_HEX_LEN));
    }

    /// 同一入力で出力がバイト単位で一致する
    #[test]
    fn test_generate_is_deterministic() {
        let identity = identity();
        let ops = [
            Operation::Info,
            Operation::Measurements,
            Operation::GenerateAttestation {
                data: "x".to_string(),
                nonce: "n".to_string(),
            },
            Operation::GetKey {
                path: "wallet".to_string(),
                purpose: "signing".to_string(),
            },
            Operation::Execute {
                function: "add".to_string(),
                params: serde_json::json!({"a": 1}),
            },
        ];

        for op in &ops {
            let first = serde_json::to_string(&generate(op, &ctx(&identity)).unwrap()).unwrap();
            let second = serde_json::to_string(&generate(op, &ctx(&identity)).unwrap()).unwrap();
            assert_eq!(first, second, "{} is not deterministic", op.name());
        }
    }

    /// 全操作の結果がフォールバック出自を持つ
    #[test]
    fn test_every_result_is_marked_fallback() {
        let identity = identity();
        let ops = [
            Operation::Info,
            Operation::Measurements,
            Operation::GenerateAttestation {
                data: "x".to_string(),
                nonce: "n".to_string(),
            },
            Operation::VerifyAttestation {
                attestation_id: "tee-1".to_string(),
                expected_data: "x".to_string(),
            },
            Operation::GetKey {
                path: "p".to_string(),
                purpose: "q".to_string(),
            },
            Operation::GetQuote {
                data: "d".to_string(),
            },
            Operation::Execute {
                function: "f".to_string(),
                params: serde_json::json!({}),
            },
            Operation::SecurityStatus,
        ];

        for op in &ops {
            let result = generate(op, &ctx(&identity)).unwrap();
            assert_eq!(result.provenance(), &Provenance::fallback(), "{}", op.name());
        }
    }

    #[test]
    fn test_attestation_id_embeds_time_and_nonce() {
        let identity = identity();
        let op = Operation::GenerateAttestation {
            data: "x".to_string(),
            nonce: "n".to_string(),
        };
        let OperationResult::Attestation(record) = generate(&op, &ctx(&identity)).unwrap() else {
            panic!("Attestationレコードではありません");
        };
        assert_eq!(
            record.attestation_id,
            format!("tee-1700000000000-{}", &sha256_hex("n")[..16])
        );
        assert_eq!(record.quote, sha256_hex("quote:app_123:x:n"));
        assert_eq!(record.measurements, Some(measurement_set(&identity)));
    }

    /// 鍵はpathとpurposeで分離される
    #[test]
    fn test_key_depends_on_path_and_purpose() {
        let identity = identity();
        let key_of = |path: &str, purpose: &str| {
            let op = Operation::GetKey {
                path: path.to_string(),
                purpose: purpose.to_string(),
            };
            match generate(&op, &ctx(&identity)).unwrap() {
                OperationResult::Key(record) => record.key,
                other => panic!("Keyレコードではありません: {other:?}"),
            }
        };

        assert_eq!(key_of("wallet", "signing"), key_of("wallet", "signing"));
        assert_ne!(key_of("wallet", "signing"), key_of("wallet", "encryption"));
        assert_ne!(key_of("wallet", "signing"), key_of("other", "signing"));
        assert_eq!(key_of("wallet", "signing").len(), SHA256_HEX_LEN);

        let expected = hkdf_derive_key(b"app_123", b"instance-1", b"wallet:signing").unwrap();
        assert_eq!(key_of("wallet", "signing"), hex::encode(expected));
    }

    #[test]
    fn test_security_status_never_claims_secure() {
        let identity = identity();
        let OperationResult::Security(status) =
            generate(&Operation::SecurityStatus, &ctx(&identity)).unwrap()
        else {
            panic!("Securityレコードではありません");
        };
        assert!(!status.secure);
        assert!(!status.tee_enabled);
        assert!(!status.attestation_available);
    }
}
