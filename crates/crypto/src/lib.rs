//! # Attest Gateway 暗号プリミティブ
//!
//! フォールバック生成器が決定的な疑似測定値・疑似鍵を導出するためのプリミティブ。
//! 実際のquote生成・検証は行わない（外部のエンクレーブランタイムに委譲）。
//!
//! ## アルゴリズム
//! | 用途 | アルゴリズム |
//! |------|------------|
//! | ダイジェスト | SHA-256 |
//! | 鍵導出 | HKDF-SHA256 |

use hkdf::Hkdf;
use sha2::{Digest, Sha256};

/// 暗号処理のエラー型
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// HKDF鍵導出エラー
    #[error("HKDF鍵導出に失敗しました: {0}")]
    HkdfError(String),
}

/// 導出鍵（32バイト）
pub type DerivedKey = [u8; 32];

/// SHA-256のhex文字列長。
pub const SHA256_HEX_LEN: usize = 64;

/// SHA-256ハッシュ計算。
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// SHA-256ハッシュを小文字hex文字列で返す。
pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(sha256(data.as_ref()))
}

/// HKDF-SHA256による鍵導出。
///
/// 同一の `(ikm, salt, info)` からは常に同一の鍵が得られる。
pub fn hkdf_derive_key(ikm: &[u8], salt: &[u8], info: &[u8]) -> Result<DerivedKey, CryptoError> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut key = [0u8; 32];
    hkdf.expand(info, &mut key)
        .map_err(|e| CryptoError::HkdfError(e.to_string()))?;
    Ok(key)
}

/// 文字列が偶数長の16進数のみで構成されているか。
pub fn is_hex_digest(value: &str) -> bool {
    !value.is_empty()
        && value.len() % 2 == 0
        && value.bytes().all(|b| b.is_ascii_hexdigit())
}
