//! # Attest Gateway 共有型定義
//!
//! HTTP APIのリクエストボディ、レスポンスエンベロープ、各操作の結果レコードを
//! Rust構造体として提供する。
//!
//! ## 出自（Provenance）の規則
//! - `is_real` / `source` は結果を生成したコードパスを記録する。
//! - quoteの中身から推測してはならない。フォールバック経路の結果を
//!   `is_real = true` として返すことは禁止。

use serde::{Deserialize, Serialize};

/// フォールバック経路の `source` 値。
pub const FALLBACK_SOURCE: &str = "fallback";

// ---------------------------------------------------------------------------
// レスポンスエンベロープ
// ---------------------------------------------------------------------------

/// エンベロープのステータス。
///
/// Gateway自身が結果（実機・フォールバックいずれか）を返せたかどうかのみを表す。
/// 実機由来かどうかはペイロード側の `Provenance` が持つ。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStatus {
    /// 結果を生成できた
    Success,
    /// 入力不正または内部エラー
    Error,
}

/// 全エンドポイント共通のレスポンスエンベロープ。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// "success" | "error"
    pub status: EnvelopeStatus,
    /// 操作ごとのペイロード
    pub payload: T,
    /// レスポンス生成時刻（RFC 3339）
    pub timestamp: String,
}

impl<T> Envelope<T> {
    /// 成功エンベロープを構築する。
    pub fn success(payload: T, timestamp: impl Into<String>) -> Self {
        Self {
            status: EnvelopeStatus::Success,
            payload,
            timestamp: timestamp.into(),
        }
    }
}

impl Envelope<ErrorPayload> {
    /// エラーエンベロープを構築する。
    pub fn error(message: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            status: EnvelopeStatus::Error,
            payload: ErrorPayload {
                error: message.into(),
            },
            timestamp: timestamp.into(),
        }
    }
}

/// エラーエンベロープのペイロード。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// エラーメッセージ
    pub error: String,
}

/// 結果の出自。各レコードに `#[serde(flatten)]` で埋め込まれる。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// 実機バックエンドが結果を生成した場合のみtrue
    pub is_real: bool,
    /// バックエンド名（"dstack" / "tappd" / "fallback"）
    pub source: String,
}

impl Provenance {
    /// 実機バックエンド由来。
    pub fn real(source: impl Into<String>) -> Self {
        Self {
            is_real: true,
            source: source.into(),
        }
    }

    /// フォールバック生成器由来。
    pub fn fallback() -> Self {
        Self {
            is_real: false,
            source: FALLBACK_SOURCE.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// トランスポート
// ---------------------------------------------------------------------------

/// TEEホストとの通信プロトコル種別。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// 改行区切りJSON RPC（プライマリソケット）
    SocketRpc,
    /// ソケット上のHTTP/1.1（セカンダリソケット）
    SocketHttp,
}

// ---------------------------------------------------------------------------
// 測定値
// ---------------------------------------------------------------------------

/// 測定レジスタの集合。全値は同一長のhexダイジェスト。
///
/// フィールド順がそのままシリアライズ順になる（mrtd, rtmr0..rtmr3）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementSet {
    /// TDビルド時測定値
    pub mrtd: String,
    /// ランタイム測定レジスタ0（ファームウェア）
    pub rtmr0: String,
    /// ランタイム測定レジスタ1（カーネル）
    pub rtmr1: String,
    /// ランタイム測定レジスタ2（initrd・コマンドライン）
    pub rtmr2: String,
    /// ランタイム測定レジスタ3（アプリケーション）
    pub rtmr3: String,
}

impl MeasurementSet {
    /// レジスタ名の一覧（シリアライズ順）。
    pub const REGISTERS: [&'static str; 5] = ["mrtd", "rtmr0", "rtmr1", "rtmr2", "rtmr3"];

    /// レジスタ名と値の組をシリアライズ順で返す。
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        Self::REGISTERS.into_iter().zip([
            self.mrtd.as_str(),
            self.rtmr0.as_str(),
            self.rtmr1.as_str(),
            self.rtmr2.as_str(),
            self.rtmr3.as_str(),
        ])
    }
}

// ---------------------------------------------------------------------------
// API リクエスト
// ---------------------------------------------------------------------------
//
// 必須フィールドも `Option` で受ける。欠落は JSON 構文エラー (400 Invalid JSON) ではなく
// 入力検証エラー (エラーエンベロープ) として扱うため。

/// POST /api/attestation/generate リクエスト。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateAttestationRequest {
    /// Attestationに紐付けるデータ（必須）
    pub data: Option<String>,
    /// フレッシュネス用ノンス（省略時はGatewayが現在時刻から生成）
    pub nonce: Option<String>,
}

/// POST /api/attestation/verify リクエスト。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyAttestationRequest {
    /// 検証対象のAttestation ID（必須）
    pub attestation_id: Option<String>,
    /// 期待されるデータ（必須）
    pub expected_data: Option<String>,
}

/// POST /api/tee/key リクエスト。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyRequest {
    /// 鍵導出パス（必須）
    pub path: Option<String>,
    /// 鍵の用途（省略時 "attestation"）
    pub purpose: Option<String>,
}

/// POST /api/tee/quote リクエスト。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuoteRequest {
    /// quoteに含めるデータ（必須）
    pub data: Option<String>,
}

/// POST /api/tee/execute リクエスト。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteRequest {
    /// エンクレーブ内で実行する関数名（必須）
    pub function: Option<String>,
    /// 関数パラメータ（省略時 `{}`）
    pub params: Option<serde_json::Value>,
}

/// POST /api/attestation/submit リクエスト。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitQuoteRequest {
    /// エクスプローラーへ提出するquote（必須）
    pub quote: Option<String>,
}

// ---------------------------------------------------------------------------
// 操作結果レコード
// ---------------------------------------------------------------------------

/// GET /api/tee/info のペイロード。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoRecord {
    /// アプリケーションID
    pub app_id: String,
    /// デバイスID
    pub device_id: String,
    /// インスタンスID
    pub instance_id: String,
    /// TEE種別
    pub tee_type: String,
    /// 提供機能
    pub capabilities: Vec<String>,
    /// 測定レジスタ（取得できた場合）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcb_info: Option<MeasurementSet>,
    /// プライマリソケットの有無
    pub dstack_available: bool,
    /// セカンダリソケットの有無
    pub tappd_available: bool,
    /// バックエンドが返した生の情報（実機経路のみ）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_info: Option<serde_json::Value>,
    /// 出自
    #[serde(flatten)]
    pub provenance: Provenance,
}

/// GET /api/tee/measurements のペイロード。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementsRecord {
    /// 測定レジスタ
    #[serde(flatten)]
    pub registers: MeasurementSet,
    /// docker-composeのハッシュ
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compose_hash: Option<String>,
    /// OSイメージのハッシュ
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_image_hash: Option<String>,
    /// デバイスID
    pub device_id: String,
    /// 出自
    #[serde(flatten)]
    pub provenance: Provenance,
}

/// POST /api/attestation/generate のペイロード。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationRecord {
    /// Attestation ID
    pub attestation_id: String,
    /// 入力データ
    pub input_data: String,
    /// ノンス
    pub nonce: String,
    /// quote（不透明なhex文字列）
    pub quote: String,
    /// 測定レジスタ（取得できた場合）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurements: Option<MeasurementSet>,
    /// デバイスID
    pub device_id: String,
    /// 生成時刻（RFC 3339）
    pub timestamp: String,
    /// 出自
    #[serde(flatten)]
    pub provenance: Provenance,
}

/// POST /api/attestation/verify のペイロード。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRecord {
    /// 検証対象のAttestation ID
    pub attestation_id: String,
    /// 期待されるデータ
    pub expected_data: String,
    /// 検証結果
    pub verified: bool,
    /// 出自
    #[serde(flatten)]
    pub provenance: Provenance,
}

/// POST /api/tee/key のペイロード。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRecord {
    /// 鍵ID（"key-<path>"）
    pub key_id: String,
    /// 鍵導出パス
    pub path: String,
    /// 鍵の用途
    pub purpose: String,
    /// hexエンコードされた鍵
    pub key: String,
    /// 署名チェーン（実機経路のみ）
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signature_chain: Vec<String>,
    /// 生成時刻（RFC 3339）
    pub timestamp: String,
    /// 出自
    #[serde(flatten)]
    pub provenance: Provenance,
}

/// POST /api/tee/quote のペイロード。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRecord {
    /// quote ID
    pub quote_id: String,
    /// 入力データ
    pub data: String,
    /// quote（不透明なhex文字列）
    pub quote: String,
    /// イベントログ（実機経路のみ）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_log: Option<String>,
    /// 生成時刻（RFC 3339）
    pub timestamp: String,
    /// 出自
    #[serde(flatten)]
    pub provenance: Provenance,
}

/// POST /api/tee/execute のペイロード。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// 実行ID
    pub execution_id: String,
    /// 関数名
    pub function: String,
    /// 関数パラメータ
    pub params: serde_json::Value,
    /// 実行結果
    pub result: serde_json::Value,
    /// 実行時刻（RFC 3339）
    pub timestamp: String,
    /// 出自
    #[serde(flatten)]
    pub provenance: Provenance,
}

/// GET|POST /api/security/status のペイロード。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityStatusRecord {
    /// 実機TEE上で動作していると確認できた場合のみtrue
    pub secure: bool,
    /// TEEバックエンドが応答した
    pub tee_enabled: bool,
    /// 実機Attestationが取得可能
    pub attestation_available: bool,
    /// プライマリソケットの有無
    pub dstack_available: bool,
    /// セカンダリソケットの有無
    pub tappd_available: bool,
    /// デバイスID
    pub device_id: String,
    /// 出自
    #[serde(flatten)]
    pub provenance: Provenance,
}

/// GET /api/health のペイロード。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRecord {
    /// サービス名
    pub service: String,
    /// バージョン
    pub version: String,
    /// 現在選択されるバックエンド（なければ `None`）
    pub transport: Option<TransportKind>,
    /// 選択されるソケットのパス
    pub socket_path: Option<String>,
    /// プライマリソケットの有無
    pub dstack_available: bool,
    /// セカンダリソケットの有無
    pub tappd_available: bool,
}

/// GET|POST /api/node/info のペイロード。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfoRecord {
    /// アプリケーションID
    pub app_id: String,
    /// インスタンスID
    pub instance_id: String,
    /// デバイスID
    pub device_id: String,
    /// ノードダッシュボードURL
    pub dashboard_url: String,
    /// Attestationエクスプローラー
    pub attestation_explorer: String,
}

/// POST /api/attestation/submit のペイロード。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteSubmission {
    /// quoteのSHA-256（hex）
    pub quote_hash: String,
    /// エクスプローラーURL
    pub explorer_url: String,
    /// 検証レポートURL
    pub verification_url: String,
    /// 提出状態
    pub submission_status: String,
}
