pub mod error;
pub mod ledger;

pub use error::LedgerError;
pub use ledger::{generate_key, KeyLedger, KeyMap, GENERATED_KEY_LEN};
