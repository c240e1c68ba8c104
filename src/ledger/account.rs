use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use std::collections::BTreeMap;

use super::crypto::{Address, Hash256};

/// Errors that can occur during account operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountError {
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: u64, available: u64 },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Balance overflow: {balance} + {amount} does not fit")]
    BalanceOverflow { balance: u64, amount: u64 },
}

/// Represents an account in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Account {
    /// Version of the account structure
    #[serde(default = "default_version")]
    pub version: u32,

    /// The account's identifier
    pub address: Address,

    /// The account's balance
    pub balance: u64,

    /// Hash of the address, fixed at registration
    #[schema(value_type = String)]
    pub address_hash: Hash256,

    /// Indices of the log entries that credited this account
    pub transaction_refs: Vec<u64>,
}

/// Default version for accounts
fn default_version() -> u32 {
    1
}

impl Account {
    /// Creates a fresh account with a zero balance and no history
    pub fn new(address: Address) -> Self {
        let address_hash = address.identity_hash();

        Account {
            version: default_version(),
            address,
            balance: 0,
            address_hash,
            transaction_refs: Vec::new(),
        }
    }

    /// Increases the account's balance
    pub fn deposit(&mut self, amount: u64) -> Result<(), AccountError> {
        if amount == 0 {
            return Err(AccountError::InvalidAmount(
                "Amount must be positive".to_string(),
            ));
        }

        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(AccountError::BalanceOverflow {
                balance: self.balance,
                amount,
            })?;
        Ok(())
    }

    /// Decreases the account's balance
    pub fn withdraw(&mut self, amount: u64) -> Result<(), AccountError> {
        if amount == 0 {
            return Err(AccountError::InvalidAmount(
                "Amount must be positive".to_string(),
            ));
        }

        if !self.has_sufficient_funds(amount) {
            return Err(AccountError::InsufficientBalance {
                required: amount,
                available: self.balance,
            });
        }

        self.balance -= amount;
        Ok(())
    }

    /// Records a log index that credited this account
    pub fn record_transaction(&mut self, index: u64) {
        self.transaction_refs.push(index);
    }

    pub fn has_sufficient_funds(&self, amount: u64) -> bool {
        self.balance >= amount
    }

    /// Whether registering again would throw away balance or history
    pub fn has_activity(&self) -> bool {
        self.balance > 0 || !self.transaction_refs.is_empty()
    }
}

/// Account table embedded in the ledger.
///
/// Not synchronized on its own: the ledger's lock guards every access.
#[derive(Debug, Clone, Default)]
pub struct AccountRegistry {
    accounts: BTreeMap<Address, Account>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &Address) -> Option<&Account> {
        self.accounts.get(address)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.accounts.contains_key(address)
    }

    /// Inserts or replaces an account, returning the previous entry
    pub fn insert(&mut self, account: Account) -> Option<Account> {
        self.accounts.insert(account.address.clone(), account)
    }

    /// Balance of an account, `None` if it was never registered
    pub fn balance(&self, address: &Address) -> Option<u64> {
        self.accounts.get(address).map(|account| account.balance)
    }

    /// Sum of every balance, widened so it cannot overflow
    pub fn total_supply(&self) -> u128 {
        self.accounts
            .values()
            .map(|account| u128::from(account.balance))
            .sum()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// All accounts ordered by address
    pub fn all(&self) -> Vec<Account> {
        self.accounts.values().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_creation() {
        let address = Address("test_address".to_string());
        let account = Account::new(address.clone());

        assert_eq!(account.address, address);
        assert_eq!(account.balance, 0);
        assert_eq!(account.address_hash, address.identity_hash());
        assert!(account.transaction_refs.is_empty());
        assert!(!account.has_activity());
    }

    #[test]
    fn test_deposit_and_withdraw() {
        let mut account = Account::new(Address("test_address".to_string()));

        account.deposit(100).unwrap();
        assert_eq!(account.balance, 100);

        account.withdraw(50).unwrap();
        assert_eq!(account.balance, 50);

        let result = account.withdraw(100);
        assert_eq!(
            result,
            Err(AccountError::InsufficientBalance {
                required: 100,
                available: 50
            })
        );
        assert_eq!(account.balance, 50);
    }

    #[test]
    fn test_zero_amounts_are_rejected() {
        let mut account = Account::new(Address("zero".to_string()));

        assert!(matches!(account.deposit(0), Err(AccountError::InvalidAmount(_))));
        assert!(matches!(account.withdraw(0), Err(AccountError::InvalidAmount(_))));
    }

    #[test]
    fn test_deposit_overflow_leaves_balance() {
        let mut account = Account::new(Address("whale".to_string()));
        account.deposit(u64::MAX).unwrap();

        assert_eq!(
            account.deposit(1),
            Err(AccountError::BalanceOverflow {
                balance: u64::MAX,
                amount: 1
            })
        );
        assert_eq!(account.balance, u64::MAX);
    }

    #[test]
    fn test_registry() {
        let mut registry = AccountRegistry::new();
        let alice = Address("alice".to_string());
        let bob = Address("bob".to_string());

        assert!(registry.is_empty());
        assert_eq!(registry.balance(&alice), None);

        let mut account = Account::new(alice.clone());
        account.deposit(30).unwrap();
        assert!(registry.insert(account).is_none());
        registry.insert(Account::new(bob.clone()));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.balance(&alice), Some(30));
        assert_eq!(registry.total_supply(), 30);

        let replaced = registry.insert(Account::new(alice.clone())).unwrap();
        assert_eq!(replaced.balance, 30);
        assert_eq!(registry.balance(&alice), Some(0));

        let addresses: Vec<Address> = registry.all().into_iter().map(|a| a.address).collect();
        assert_eq!(addresses, vec![alice, bob]);
    }
}
