//! Short content digests for change detection.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest truncated to 16 characters.
///
/// Identities produced here are for change detection only, never for
/// cryptographic purposes.
pub fn short_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}
