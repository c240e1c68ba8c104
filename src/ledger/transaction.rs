use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::crypto::Hash256;
use super::hashgate;

/// A minted entry in the ledger's log.
///
/// Transfers never produce one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Tip of the ledger when the transaction was created
    #[schema(value_type = String)]
    pub previous_hash: Hash256,

    /// Sender identity hash; zero for minted coins
    #[schema(value_type = String)]
    pub sender: Hash256,

    /// Receiver identity hash
    #[schema(value_type = String)]
    pub receiver: Hash256,

    /// Amount being created
    pub amount: u64,

    /// Proof-of-work nonce chosen by the caller
    pub nonce: u64,
}

impl Transaction {
    /// Creates a mint candidate linked to `previous_hash`
    pub fn new_mint(previous_hash: Hash256, receiver: Hash256, amount: u64, nonce: u64) -> Self {
        Transaction {
            previous_hash,
            sender: Hash256::ZERO,
            receiver,
            amount,
            nonce,
        }
    }

    /// Computes the proof-of-work digest of this transaction
    pub fn digest(&self) -> Hash256 {
        hashgate::compute_digest(
            &self.previous_hash,
            &self.sender,
            &self.receiver,
            self.amount,
            self.nonce,
        )
    }

    /// Runs the proof-of-work check at the given difficulty
    pub fn check_pow(&self, difficulty: u32) -> hashgate::PowCheck {
        hashgate::check(
            &self.previous_hash,
            &self.sender,
            &self.receiver,
            self.amount,
            self.nonce,
            difficulty,
        )
    }

    /// Checks if the transaction created new coins
    pub fn is_mint(&self) -> bool {
        self.sender.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::crypto::Address;

    #[test]
    fn test_mint_transaction() {
        let receiver = Address("miner".to_string()).identity_hash();
        let transaction = Transaction::new_mint(Hash256::ZERO, receiver, 50, 9);

        assert!(transaction.is_mint());
        assert_eq!(transaction.previous_hash, Hash256::ZERO);
        assert_eq!(transaction.receiver, receiver);
        assert_eq!(transaction.amount, 50);
        assert_eq!(transaction.nonce, 9);
    }

    #[test]
    fn test_digest_matches_hashgate() {
        let receiver = Address("miner".to_string()).identity_hash();
        let previous = Hash256::digest(b"tip");
        let transaction = Transaction::new_mint(previous, receiver, 25, 3);

        assert_eq!(
            transaction.digest(),
            hashgate::compute_digest(&previous, &Hash256::ZERO, &receiver, 25, 3)
        );
        assert_eq!(transaction.check_pow(256).digest, transaction.digest());
        assert!(transaction.check_pow(256).valid);
    }
}
