use constant_time_eq::constant_time_eq;
use tracing::warn;

use crate::store::KeyLedger;

/// Outcome of a publish authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied,
}

/// Check a candidate stream key against the current ledger contents.
///
/// Reads a fresh snapshot on every call so a revoked key is rejected on
/// the very next publish attempt. The match is exact and byte-for-byte,
/// compared in constant time per stored value. A ledger that cannot be
/// read denies everything rather than letting unknown publishers through.
pub fn authorize_publish(ledger: &KeyLedger, candidate: &str) -> Decision {
    if candidate.is_empty() {
        return Decision::Denied;
    }

    let map = match ledger.load() {
        Ok(map) => map,
        Err(e) => {
            warn!(error = %e, "key ledger unreadable during publish check, denying");
            return Decision::Denied;
        }
    };

    if map
        .values()
        .any(|key| constant_time_eq(key.as_bytes(), candidate.as_bytes()))
    {
        Decision::Allowed
    } else {
        Decision::Denied
    }
}
