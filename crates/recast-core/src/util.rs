//! General utilities: token generation, timestamps, cancellation.

use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// Bytes fixed at first use that set this process's tokens apart from
/// another process's.
fn process_seed() -> &'static [u8; 32] {
    static SEED: OnceLock<[u8; 32]> = OnceLock::new();
    SEED.get_or_init(|| {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let digest = Sha256::new()
            .chain_update(nanos.to_le_bytes())
            .chain_update(std::process::id().to_le_bytes())
            .finalize();
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&digest);
        seed
    })
}

/// Returns `<kind>_<16 hex digits>`, never repeated within the process.
///
/// The digits are the first eight bytes of SHA-256 over the process seed,
/// the kind and a process-wide sequence number.
pub fn token(kind: &str) -> String {
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);

    let n = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let digest = Sha256::new()
        .chain_update(process_seed())
        .chain_update(kind.as_bytes())
        .chain_update(n.to_le_bytes())
        .finalize();
    format!("{kind}_{}", hex::encode(&digest[..8]))
}

/// Returns a string like `snap_0123456789abcdef`.
pub fn generate_snapshot_id() -> String {
    token("snap")
}

/// Returns a string like `undo_0123456789abcdef`.
pub fn generate_undo_token() -> String {
    token("undo")
}

/// Returns a string like `sess_0123456789abcdef`.
pub fn generate_session_id() -> String {
    token("sess")
}

/// Format a timestamp in ISO 8601 (`2026-01-31T12:00:00Z`).
pub fn format_timestamp(time: SystemTime) -> String {
    use chrono::{DateTime, Utc};

    let datetime: DateTime<Utc> = time.into();
    datetime.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Current UTC time in ISO 8601.
pub fn format_timestamp_now() -> String {
    format_timestamp(SystemTime::now())
}

// ============================================================================
// Cancellation
// ============================================================================

/// Shared cancellation flag for long-running scans.
///
/// Clones observe the same flag. Scans poll it at statement and
/// compilation-unit boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn tokens_have_expected_shape() {
        let snap = generate_snapshot_id();
        assert!(snap.starts_with("snap_"));
        assert_eq!(snap.len(), 5 + 16);
        assert!(generate_undo_token().starts_with("undo_"));
        assert!(generate_session_id().starts_with("sess_"));
    }

    #[test]
    fn token_digits_are_lowercase_hex() {
        let step = token("step");
        let digits = step.strip_prefix("step_").unwrap();
        assert_eq!(digits.len(), 16);
        assert!(digits.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        assert_ne!(token("step"), step);
    }

    #[test]
    fn tokens_are_unique() {
        let tokens: HashSet<String> = (0..1000).map(|_| generate_undo_token()).collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[test]
    fn epoch_formats_exactly() {
        assert_eq!(format_timestamp(UNIX_EPOCH), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn timestamp_is_iso8601() {
        let ts = format_timestamp_now();
        assert_eq!(ts.len(), 20);
        assert!(ts.ends_with('Z'));
        assert_eq!(&ts[10..11], "T");
    }

    #[test]
    fn cancellation_is_shared_between_clones() {
        let flag = CancellationFlag::new();
        let observer = flag.clone();
        assert!(!observer.is_cancelled());
        flag.cancel();
        assert!(observer.is_cancelled());
        observer.reset();
        assert!(!flag.is_cancelled());
    }
}
