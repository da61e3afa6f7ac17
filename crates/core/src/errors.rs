use thiserror::Error;

/// Unified error type for the entire twfolio-core library.
/// Every public function returns `Result<T, CoreError>`.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Storage / File ──────────────────────────────────────────────
    #[error("Invalid file format: {0}")]
    InvalidFileFormat(String),

    #[error("Unsupported file version: {0}")]
    UnsupportedVersion(u16),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed — wrong password or corrupted file")]
    Decryption,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // ── File I/O (native only) ──────────────────────────────────────
    #[error("File I/O error: {0}")]
    FileIO(String),

    // ── Quote / FX upstream ─────────────────────────────────────────
    #[error("Provider error ({provider}): {message}")]
    Provider {
        provider: String,
        message: String,
    },

    /// Every source in the fallback chain failed. `attempts` concatenates
    /// each source's error text — diagnostic, not meant to be parsed.
    #[error("No quote for {symbol} after trying all sources: {attempts}")]
    ProviderExhausted {
        symbol: String,
        attempts: String,
    },

    #[error("USD/TWD exchange rate unavailable: {0}")]
    FxUnavailable(String),

    #[error("Network error: {0}")]
    Network(String),

    // ── Sync ────────────────────────────────────────────────────────
    #[error("Sync failed: {0}")]
    Sync(String),

    #[error("Not signed in — no active sync session")]
    NotSignedIn,

    // ── Business logic ──────────────────────────────────────────────
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{kind} not found: {key}")]
    NotFound {
        kind: &'static str,
        key: String,
    },
}

impl CoreError {
    pub(crate) fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        CoreError::NotFound {
            kind,
            key: key.into(),
        }
    }
}

// ── Conversion helpers (From impls) ─────────────────────────────────

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::FileIO(e.to_string())
    }
}

impl From<bincode::Error> for CoreError {
    fn from(e: bincode::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Deserialization(e.to_string())
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        // Sanitize error message: strip query parameters from URLs so that
        // API keys passed as query params never end up in error text.
        let msg = e.to_string();
        let sanitized = if let Some(idx) = msg.find('?') {
            format!("{}?<query redacted>", &msg[..idx])
        } else {
            msg
        };
        CoreError::Network(sanitized)
    }
}

impl From<aes_gcm::Error> for CoreError {
    fn from(_: aes_gcm::Error) -> Self {
        CoreError::Decryption
    }
}
