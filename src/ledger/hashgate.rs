// Proof-of-work admission check for minting.
//
// The digest covers previous hash, sender hash, receiver hash, amount and nonce,
// and is accepted when it is strictly below 2^difficulty.

use sha2::{Digest, Sha256};

use super::crypto::Hash256;

/// Outcome of a proof-of-work check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowCheck {
    /// The digest of the candidate transaction
    pub digest: Hash256,

    /// Whether the digest is below the difficulty threshold
    pub valid: bool,
}

/// Computes the digest of a candidate transaction
pub fn compute_digest(
    previous_hash: &Hash256,
    sender: &Hash256,
    receiver: &Hash256,
    amount: u64,
    nonce: u64,
) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(previous_hash.as_bytes());
    hasher.update(sender.as_bytes());
    hasher.update(receiver.as_bytes());
    hasher.update(amount.to_be_bytes());
    hasher.update(nonce.to_be_bytes());

    Hash256::from_digest(&hasher.finalize())
}

/// Returns true if `digest < 2^difficulty`
///
/// A difficulty of zero only admits the all-zero digest; a difficulty of
/// 256 or more admits every digest.
pub fn meets_difficulty(digest: &Hash256, difficulty: u32) -> bool {
    if difficulty >= Hash256::BITS {
        return true;
    }

    digest.leading_zero_bits() >= Hash256::BITS - difficulty
}

/// Computes the digest and compares it against the threshold
pub fn check(
    previous_hash: &Hash256,
    sender: &Hash256,
    receiver: &Hash256,
    amount: u64,
    nonce: u64,
    difficulty: u32,
) -> PowCheck {
    let digest = compute_digest(previous_hash, sender, receiver, amount, nonce);

    PowCheck {
        digest,
        valid: meets_difficulty(&digest, difficulty),
    }
}

/// Boolean form of [`check`]
pub fn validate(
    previous_hash: &Hash256,
    sender: &Hash256,
    receiver: &Hash256,
    amount: u64,
    nonce: u64,
    difficulty: u32,
) -> bool {
    check(previous_hash, sender, receiver, amount, nonce, difficulty).valid
}

/// Searches upward from `start` for a nonce that passes the check
///
/// Gives up after `max_attempts` nonces or when the nonce space is exhausted.
/// Returns the nonce with its digest.
pub fn find_nonce(
    previous_hash: &Hash256,
    sender: &Hash256,
    receiver: &Hash256,
    amount: u64,
    difficulty: u32,
    start: u64,
    max_attempts: u64,
) -> Option<(u64, Hash256)> {
    let mut nonce = start;

    for _ in 0..max_attempts {
        let outcome = check(previous_hash, sender, receiver, amount, nonce, difficulty);
        if outcome.valid {
            return Some((nonce, outcome.digest));
        }

        nonce = nonce.checked_add(1)?;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIFFICULTY: u32 = 248;

    fn inputs() -> (Hash256, Hash256, Hash256) {
        (
            Hash256::digest(b"previous"),
            Hash256::ZERO,
            Hash256::digest(b"receiver"),
        )
    }

    #[test]
    fn test_digest_is_deterministic() {
        let (previous, sender, receiver) = inputs();

        for nonce in 0..32 {
            let first = check(&previous, &sender, &receiver, 50, nonce, DIFFICULTY);
            let second = check(&previous, &sender, &receiver, 50, nonce, DIFFICULTY);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_digest_covers_every_field() {
        let (previous, sender, receiver) = inputs();
        let base = compute_digest(&previous, &sender, &receiver, 50, 7);

        assert_ne!(base, compute_digest(&Hash256::ZERO, &sender, &receiver, 50, 7));
        assert_ne!(base, compute_digest(&previous, &receiver, &receiver, 50, 7));
        assert_ne!(base, compute_digest(&previous, &sender, &previous, 50, 7));
        assert_ne!(base, compute_digest(&previous, &sender, &receiver, 51, 7));
        assert_ne!(base, compute_digest(&previous, &sender, &receiver, 50, 8));
    }

    #[test]
    fn test_threshold_boundaries() {
        let mut bytes = [0u8; 32];
        assert!(meets_difficulty(&Hash256(bytes), 0));

        bytes[31] = 1;
        assert!(!meets_difficulty(&Hash256(bytes), 0));
        assert!(meets_difficulty(&Hash256(bytes), 1));

        // 2^8 is not below 2^8
        bytes[31] = 0;
        bytes[30] = 1;
        assert!(!meets_difficulty(&Hash256(bytes), 8));
        assert!(meets_difficulty(&Hash256(bytes), 9));

        let max = Hash256([0xFF; 32]);
        assert!(!meets_difficulty(&max, 255));
        assert!(meets_difficulty(&max, 256));
        assert!(meets_difficulty(&max, 1000));
    }

    #[test]
    fn test_found_nonce_validates() {
        let (previous, sender, receiver) = inputs();

        let (nonce, digest) =
            find_nonce(&previous, &sender, &receiver, 50, DIFFICULTY, 0, 1_000_000)
                .expect("a nonce at difficulty 248 should be found quickly");

        assert!(validate(&previous, &sender, &receiver, 50, nonce, DIFFICULTY));
        assert_eq!(digest, compute_digest(&previous, &sender, &receiver, 50, nonce));
        assert!(digest.leading_zero_bits() >= 8);
    }

    #[test]
    fn test_higher_difficulty_keeps_valid_nonces_valid() {
        let (previous, sender, receiver) = inputs();
        let (nonce, _) =
            find_nonce(&previous, &sender, &receiver, 50, DIFFICULTY, 0, 1_000_000).unwrap();

        for difficulty in DIFFICULTY..=300 {
            assert!(validate(&previous, &sender, &receiver, 50, nonce, difficulty));
        }
    }

    #[test]
    fn test_zero_difficulty_rejects_found_nonce() {
        let (previous, sender, receiver) = inputs();
        let (nonce, _) =
            find_nonce(&previous, &sender, &receiver, 50, DIFFICULTY, 0, 1_000_000).unwrap();

        assert!(!validate(&previous, &sender, &receiver, 50, nonce, 0));
    }

    #[test]
    fn test_find_nonce_respects_attempt_limit() {
        let (previous, sender, receiver) = inputs();

        assert_eq!(find_nonce(&previous, &sender, &receiver, 50, 0, 0, 100), None);
        assert_eq!(
            find_nonce(&previous, &sender, &receiver, 50, 256, 42, 1).map(|(nonce, _)| nonce),
            Some(42)
        );
        assert_eq!(find_nonce(&previous, &sender, &receiver, 50, 0, u64::MAX, 10), None);
    }
}
