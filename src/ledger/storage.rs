use std::path::Path;

use log::debug;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use thiserror::Error;

use super::account::Account;
use super::crypto::{Address, Hash256};
use super::transaction::Transaction;

const CONFIG_KEY: &str = "config";
const TIP_KEY: &str = "tip";

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Corrupted storage: {0}")]
    Corrupted(String),

    #[error("Storage transaction aborted")]
    Aborted,
}

/// Immutable ledger configuration recorded when the store is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerMetadata {
    pub authority: Address,
    pub authority_name: String,
    pub difficulty: u32,
}

/// A log entry being appended along with the tip it produces
#[derive(Debug, Clone, Copy)]
pub struct AppendedEntry<'a> {
    pub index: u64,
    pub transaction: &'a Transaction,
    pub tip: Hash256,
}

/// Everything read back from disk
#[derive(Debug, Clone)]
pub struct StoredLedger {
    pub metadata: LedgerMetadata,
    pub tip: Hash256,
    pub transactions: Vec<Transaction>,
    pub accounts: Vec<Account>,
}

/// Durable copy of the ledger state
pub struct LedgerStorage {
    /// The database instance
    db: Db,

    /// Log entries keyed by big-endian index
    transactions: Tree,

    /// Accounts keyed by address
    accounts: Tree,

    /// Configuration and tip
    metadata: Tree,
}

impl std::fmt::Debug for LedgerStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerStorage")
            .field("transactions", &self.transactions.len())
            .field("accounts", &self.accounts.len())
            .finish()
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    bincode::serialize(value).map_err(|e| StorageError::SerializationError(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    bincode::deserialize(bytes).map_err(|e| StorageError::DeserializationError(e.to_string()))
}

impl LedgerStorage {
    /// Opens (or creates) the store at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - The path to the storage directory
    ///
    /// # Returns
    ///
    /// A storage handle with the transactions, accounts and metadata trees open
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;

        let transactions = db.open_tree("transactions")?;
        let accounts = db.open_tree("accounts")?;
        let metadata = db.open_tree("metadata")?;

        Ok(Self {
            db,
            transactions,
            accounts,
            metadata,
        })
    }

    /// Writes the configuration and genesis tip of a new ledger
    pub fn initialize(&self, metadata: &LedgerMetadata) -> Result<(), StorageError> {
        self.metadata.insert(CONFIG_KEY, encode(metadata)?)?;
        self.metadata.insert(TIP_KEY, Hash256::ZERO.0.to_vec())?;
        self.flush()
    }

    /// Reads the stored configuration, `None` for a fresh store
    pub fn get_metadata(&self) -> Result<Option<LedgerMetadata>, StorageError> {
        match self.metadata.get(CONFIG_KEY)? {
            Some(value) => Ok(Some(decode(&value)?)),
            None => Ok(None),
        }
    }

    pub fn get_tip(&self) -> Result<Hash256, StorageError> {
        match self.metadata.get(TIP_KEY)? {
            Some(value) => {
                let bytes = <[u8; 32]>::try_from(&value[..]).map_err(|_| {
                    StorageError::Corrupted(format!("tip has {} bytes", value.len()))
                })?;
                Ok(Hash256(bytes))
            }
            None => Ok(Hash256::ZERO),
        }
    }

    pub fn get_transaction(&self, index: u64) -> Result<Option<Transaction>, StorageError> {
        match self.transactions.get(index.to_be_bytes())? {
            Some(value) => Ok(Some(decode(&value)?)),
            None => Ok(None),
        }
    }

    /// Reads the whole log, checking that indices are contiguous from zero
    pub fn get_all_transactions(&self) -> Result<Vec<Transaction>, StorageError> {
        let mut transactions = Vec::new();

        for result in self.transactions.iter() {
            let (key, value) = result?;
            let index_bytes = <[u8; 8]>::try_from(&key[..]).map_err(|_| {
                StorageError::Corrupted(format!("transaction key has {} bytes", key.len()))
            })?;
            let index = u64::from_be_bytes(index_bytes);

            if index != transactions.len() as u64 {
                return Err(StorageError::Corrupted(format!(
                    "expected transaction {} but found {}",
                    transactions.len(),
                    index
                )));
            }

            transactions.push(decode(&value)?);
        }

        Ok(transactions)
    }

    pub fn get_account(&self, address: &Address) -> Result<Option<Account>, StorageError> {
        match self.accounts.get(address.0.as_bytes())? {
            Some(value) => Ok(Some(decode(&value)?)),
            None => Ok(None),
        }
    }

    pub fn get_all_accounts(&self) -> Result<Vec<Account>, StorageError> {
        let mut accounts = Vec::new();

        for result in self.accounts.iter() {
            let (key, value) = result?;
            let account: Account = decode(&value)?;

            if account.address.0.as_bytes() != &key[..] {
                return Err(StorageError::Corrupted(format!(
                    "account {} stored under key {}",
                    account.address,
                    String::from_utf8_lossy(&key)
                )));
            }

            accounts.push(account);
        }

        Ok(accounts)
    }

    /// Loads the full state
    ///
    /// # Returns
    ///
    /// `None` if the store was never initialized, otherwise the metadata, tip,
    /// log and accounts, with the log checked for gaps
    pub fn load(&self) -> Result<Option<StoredLedger>, StorageError> {
        let metadata = match self.get_metadata()? {
            Some(metadata) => metadata,
            None => return Ok(None),
        };

        Ok(Some(StoredLedger {
            metadata,
            tip: self.get_tip()?,
            transactions: self.get_all_transactions()?,
            accounts: self.get_all_accounts()?,
        }))
    }

    /// Atomically writes the accounts touched by one ledger call and,
    /// for a mint, the appended entry and new tip. Flushes before returning.
    ///
    /// # Arguments
    ///
    /// * `accounts` - The accounts as they should read after the call
    /// * `appended` - The log entry and tip produced by a mint, if any
    ///
    /// # Returns
    ///
    /// `Ok(())` once the transaction has committed and been flushed
    pub fn commit(
        &self,
        accounts: &[&Account],
        appended: Option<AppendedEntry<'_>>,
    ) -> Result<(), StorageError> {
        let account_values = accounts
            .iter()
            .map(|account| Ok((account.address.0.clone(), encode(*account)?)))
            .collect::<Result<Vec<_>, StorageError>>()?;

        let entry_value = match appended {
            Some(entry) => Some((
                entry.index.to_be_bytes().to_vec(),
                encode(entry.transaction)?,
                entry.tip.0.to_vec(),
            )),
            None => None,
        };

        (&self.transactions, &self.accounts, &self.metadata)
            .transaction(|(transactions, accounts, metadata)| {
                for (key, value) in &account_values {
                    accounts.insert(key.as_bytes(), value.clone())?;
                }

                if let Some((key, value, tip)) = &entry_value {
                    transactions.insert(key.clone(), value.clone())?;
                    metadata.insert(TIP_KEY, tip.clone())?;
                }

                Ok::<(), ConflictableTransactionError<()>>(())
            })
            .map_err(|err: TransactionError<()>| match err {
                TransactionError::Storage(err) => StorageError::DatabaseError(err),
                TransactionError::Abort(()) => StorageError::Aborted,
            })?;

        debug!(
            "Committed {} account(s){} to storage",
            accounts.len(),
            if appended.is_some() { " and one log entry" } else { "" }
        );

        self.flush()
    }

    /// Flushes all pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> LedgerMetadata {
        LedgerMetadata {
            authority: Address("miner".to_string()),
            authority_name: "QuantumCoin".to_string(),
            difficulty: 250,
        }
    }

    #[test]
    fn test_fresh_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LedgerStorage::new(dir.path()).unwrap();

        assert!(storage.load().unwrap().is_none());
        assert_eq!(storage.get_tip().unwrap(), Hash256::ZERO);
    }

    #[test]
    fn test_commit_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LedgerStorage::new(dir.path()).unwrap();
        storage.initialize(&metadata()).unwrap();

        let mut alice = Account::new(Address("alice".to_string()));
        let transaction = Transaction::new_mint(Hash256::ZERO, alice.address_hash, 40, 1);
        alice.deposit(40).unwrap();
        alice.record_transaction(0);
        let bob = Account::new(Address("bob".to_string()));

        storage.commit(&[&bob], None).unwrap();
        storage
            .commit(
                &[&alice],
                Some(AppendedEntry {
                    index: 0,
                    transaction: &transaction,
                    tip: transaction.digest(),
                }),
            )
            .unwrap();

        let stored = storage.load().unwrap().unwrap();
        assert_eq!(stored.metadata, metadata());
        assert_eq!(stored.tip, transaction.digest());
        assert_eq!(stored.transactions, vec![transaction.clone()]);
        assert_eq!(stored.accounts, vec![alice.clone(), bob]);

        assert_eq!(storage.get_transaction(0).unwrap(), Some(transaction));
        assert_eq!(storage.get_transaction(1).unwrap(), None);
        assert_eq!(storage.get_account(&alice.address).unwrap(), Some(alice));
    }

    #[test]
    fn test_gap_in_log_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LedgerStorage::new(dir.path()).unwrap();
        storage.initialize(&metadata()).unwrap();

        let account = Account::new(Address("alice".to_string()));
        let transaction = Transaction::new_mint(Hash256::ZERO, account.address_hash, 1, 0);
        storage
            .commit(
                &[&account],
                Some(AppendedEntry {
                    index: 1,
                    transaction: &transaction,
                    tip: transaction.digest(),
                }),
            )
            .unwrap();

        assert!(matches!(
            storage.get_all_transactions(),
            Err(StorageError::Corrupted(_))
        ));
    }
}
