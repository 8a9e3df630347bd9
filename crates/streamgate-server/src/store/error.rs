use std::path::PathBuf;

/// Errors surfaced by the key ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Publisher name was empty (or whitespace-only) after trimming.
    #[error("publisher name must not be empty")]
    EmptyName,

    /// The backing file could not be read or written.
    #[error("key ledger {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backing file exists but does not decode as a flat JSON mapping.
    #[error("key ledger {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Every generation attempt collided with a key already in the ledger.
    #[error("could not generate an unused stream key after {attempts} attempts")]
    KeyGeneration { attempts: u32 },
}
