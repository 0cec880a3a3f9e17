//! Single-use backup codes.
//!
//! Codes are 8 characters from an alphabet without look-alike characters
//! (no `0`/`O`, `1`/`I`) and are shown as two groups, e.g. `K7QD-M2XP`.
//! Only SHA-256 hashes of the normalized form are stored.

use rand::RngCore;
use sha2::{Digest, Sha256};

const BACKUP_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const BACKUP_CODE_LEN: usize = 8;
const BACKUP_CODE_GROUP_SIZE: usize = 4;

/// A batch of freshly generated backup codes.
pub struct BackupCodeBatch {
    /// Display form, handed to the user once.
    pub codes: Vec<String>,

    /// Hashes to persist, in the same order as `codes`.
    pub hashes: Vec<String>,
}

impl BackupCodeBatch {
    /// Generates `count` codes from the thread-local CSPRNG.
    #[must_use]
    pub fn generate(count: usize) -> Self {
        Self::generate_with_rng(&mut rand::thread_rng(), count)
    }

    fn generate_with_rng<R: RngCore + ?Sized>(rng: &mut R, count: usize) -> Self {
        let codes: Vec<String> = (0..count).map(|_| generate_code(rng)).collect();
        let hashes = codes.iter().map(|code| hash_backup_code(code)).collect();
        Self { codes, hashes }
    }
}

/// Uppercases the input and drops everything that is not alphanumeric,
/// so `k7qd m2xp` and `K7QD-M2XP` are the same code.
#[must_use]
pub fn normalize_backup_code(input: &str) -> String {
    input
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|ch| ch.to_ascii_uppercase())
        .collect()
}

/// Hex-encoded SHA-256 of the normalized code.
#[must_use]
pub fn hash_backup_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_backup_code(code).as_bytes());
    hex::encode(hasher.finalize())
}

/// Returns `true` if the normalized input has the shape of a backup code.
#[must_use]
pub fn is_well_formed(input: &str) -> bool {
    let normalized = normalize_backup_code(input);
    normalized.len() == BACKUP_CODE_LEN
        && normalized
            .bytes()
            .all(|ch| BACKUP_CODE_ALPHABET.contains(&ch))
}

fn generate_code<R: RngCore + ?Sized>(rng: &mut R) -> String {
    let mut bytes = [0u8; BACKUP_CODE_LEN];
    rng.fill_bytes(&mut bytes);

    let mut code = String::with_capacity(BACKUP_CODE_LEN + 1);
    for (idx, byte) in bytes.iter().enumerate() {
        if idx > 0 && idx % BACKUP_CODE_GROUP_SIZE == 0 {
            code.push('-');
        }
        // The alphabet has 32 entries, so the modulo is unbiased.
        let ch = BACKUP_CODE_ALPHABET[usize::from(*byte) % BACKUP_CODE_ALPHABET.len()];
        code.push(char::from(ch));
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_codes_have_display_shape() {
        let batch = BackupCodeBatch::generate(10);
        assert_eq!(batch.codes.len(), 10);
        assert_eq!(batch.hashes.len(), 10);

        for code in &batch.codes {
            assert_eq!(code.len(), 9);
            assert_eq!(code.as_bytes()[4], b'-');
            assert!(is_well_formed(code));
        }
    }

    #[test]
    fn test_hashes_match_codes() {
        let batch = BackupCodeBatch::generate(3);
        for (code, hash) in batch.codes.iter().zip(&batch.hashes) {
            assert_eq!(&hash_backup_code(code), hash);
            assert_eq!(hash.len(), 64);
            assert!(!hash.contains(code.as_str()));
        }
    }

    #[test]
    fn test_codes_are_distinct() {
        let batch = BackupCodeBatch::generate(50);
        let unique: HashSet<_> = batch.codes.iter().collect();
        assert_eq!(unique.len(), 50);
    }

    #[test]
    fn test_normalization_ignores_case_and_separators() {
        assert_eq!(normalize_backup_code(" k7qd-m2xp "), "K7QDM2XP");
        assert_eq!(hash_backup_code("k7qd m2xp"), hash_backup_code("K7QD-M2XP"));
    }

    #[test]
    fn test_well_formed_rejects_ambiguous_and_short() {
        assert!(is_well_formed("ABCD-EFGH"));
        assert!(!is_well_formed("ABCD-EFG"));
        assert!(!is_well_formed("ABCD-EFG0"));
        assert!(!is_well_formed("ABCD-EFGI"));
    }
}
