use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::account::{Account, AccountError, AccountRegistry};
use super::crypto::{Address, Hash256};
use super::events::{EventBus, EventKind, EventReceiver};
use super::hashgate::{self, PowCheck};
use super::storage::{AppendedEntry, LedgerMetadata, LedgerStorage, StorageError};
use super::transaction::Transaction;

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Invalid proof of work: digest {digest} is not below 2^{difficulty}")]
    InvalidProofOfWork { digest: Hash256, difficulty: u32 },

    #[error("Account error: {0}")]
    Account(#[from] AccountError),

    #[error("Unregistered account: {0}")]
    UnregisteredAccount(Address),

    #[error("Only the authority {authority} may mint, not {caller}")]
    Unauthorized { caller: Address, authority: Address },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid chain: {0}")]
    InvalidChain(String),
}

impl LedgerError {
    /// True when the persisted ledger itself is unusable, as opposed to a
    /// rejected call or a transient database failure
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            LedgerError::InvalidChain(_)
                | LedgerError::Storage(
                    StorageError::Corrupted(_) | StorageError::DeserializationError(_)
                )
        )
    }
}

/// Settings fixed when the ledger is created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// The only principal allowed to mint
    pub authority: Address,

    /// Display name of the authority
    pub authority_name: String,

    /// Proof-of-work exponent: a digest must be below 2^difficulty
    pub difficulty: u32,

    /// When false, any caller may mint as long as the proof of work holds
    pub restrict_mint_to_authority: bool,
}

impl LedgerConfig {
    pub fn new(authority: Address, authority_name: impl Into<String>, difficulty: u32) -> Self {
        LedgerConfig {
            authority,
            authority_name: authority_name.into(),
            difficulty,
            restrict_mint_to_authority: true,
        }
    }

    pub fn with_restricted_minting(mut self, restrict: bool) -> Self {
        self.restrict_mint_to_authority = restrict;
        self
    }

    fn metadata(&self) -> LedgerMetadata {
        LedgerMetadata {
            authority: self.authority.clone(),
            authority_name: self.authority_name.clone(),
            difficulty: self.difficulty,
        }
    }
}

/// Consistent view of the ledger-wide fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LedgerSnapshot {
    pub authority: Address,
    pub authority_name: String,
    pub difficulty: u32,
    pub restrict_mint_to_authority: bool,
    pub log_length: u64,
    #[schema(value_type = String)]
    pub tip: Hash256,
    pub account_count: u64,
}

/// The fields a miner needs to search for a nonce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MintTemplate {
    #[schema(value_type = String)]
    pub previous_hash: Hash256,
    #[schema(value_type = String)]
    pub sender: Hash256,
    #[schema(value_type = String)]
    pub receiver: Hash256,
    pub difficulty: u32,
}

/// Result of a successful mint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintReceipt {
    /// Position of the transaction in the log
    pub index: u64,

    pub transaction: Transaction,

    /// Digest of the transaction, now the ledger's tip
    pub tip: Hash256,
}

/// Result of a successful transfer, read under the transfer's lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReceipt {
    pub sender_balance: u64,

    pub receiver_balance: u64,

    /// Whether the receiver was created by this transfer
    pub receiver_created: bool,
}

/// Mutable state, only ever touched under the ledger's lock
#[derive(Debug, Default)]
struct LedgerState {
    /// Digest of the most recent log entry, zero at genesis
    tip: Hash256,

    /// Append-only log of minted transactions
    log: Vec<Transaction>,

    accounts: AccountRegistry,

    /// Sequence number of the next published event
    next_event: u64,
}

/// Single-authority ledger with proof-of-work gated minting
#[derive(Debug, Clone)]
pub struct Ledger {
    config: Arc<LedgerConfig>,

    state: Arc<Mutex<LedgerState>>,

    events: EventBus,

    /// Storage for ledger data
    storage: Option<Arc<LedgerStorage>>,
}

impl Ledger {
    /// Creates an empty in-memory ledger
    pub fn new(config: LedgerConfig) -> Self {
        info!(
            "Ledger created for authority {} ({}) at difficulty 2^{}",
            config.authority_name, config.authority, config.difficulty
        );

        Ledger {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(LedgerState::default())),
            events: EventBus::new(),
            storage: None,
        }
    }

    /// Opens a ledger backed by a sled database at `storage_path`
    ///
    /// A fresh store is initialized from `config`. An existing store keeps its
    /// recorded authority and difficulty; only the minting restriction is
    /// taken from `config`.
    ///
    /// # Arguments
    ///
    /// * `config` - Settings for a new store
    /// * `storage_path` - The path to the storage directory
    ///
    /// # Returns
    ///
    /// The restored ledger, or `InvalidChain` if the stored log fails verification
    pub fn with_storage<P: AsRef<Path>>(
        config: LedgerConfig,
        storage_path: P,
    ) -> Result<Self, LedgerError> {
        let storage = LedgerStorage::new(storage_path)?;

        let (config, state) = match storage.load()? {
            None => {
                info!("No existing ledger found in storage, starting from genesis");
                storage.initialize(&config.metadata())?;
                (config, LedgerState::default())
            }
            Some(stored) => {
                if stored.metadata != config.metadata() {
                    warn!(
                        "Stored ledger configuration {:?} differs from requested {:?}; keeping the stored one",
                        stored.metadata,
                        config.metadata()
                    );
                }

                let config = LedgerConfig {
                    authority: stored.metadata.authority,
                    authority_name: stored.metadata.authority_name,
                    difficulty: stored.metadata.difficulty,
                    restrict_mint_to_authority: config.restrict_mint_to_authority,
                };

                let mut accounts = AccountRegistry::new();
                for account in stored.accounts {
                    accounts.insert(account);
                }

                info!(
                    "Loaded ledger with {} transactions and {} accounts from storage",
                    stored.transactions.len(),
                    accounts.len()
                );

                let state = LedgerState {
                    tip: stored.tip,
                    log: stored.transactions,
                    accounts,
                    next_event: 0,
                };
                (config, state)
            }
        };

        let ledger = Ledger {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(state)),
            events: EventBus::new(),
            storage: Some(Arc::new(storage)),
        };

        ledger.verify_chain()?;
        Ok(ledger)
    }

    // Every mutation happens after the last fallible step, so a guard
    // recovered from a poisoned lock still sees a consistent state.
    fn lock_state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &mut LedgerState, kind: EventKind) {
        let sequence = state.next_event;
        state.next_event += 1;
        self.events.publish(sequence, kind);
    }

    fn persist(
        &self,
        accounts: &[&Account],
        appended: Option<AppendedEntry<'_>>,
    ) -> Result<(), LedgerError> {
        if let Some(storage) = &self.storage {
            storage.commit(accounts, appended)?;
        }
        Ok(())
    }

    /// Creates the caller's account, replacing any existing one
    ///
    /// Re-registering resets the balance and transaction history.
    ///
    /// # Arguments
    ///
    /// * `caller` - The address to register
    ///
    /// # Returns
    ///
    /// The fresh account as stored
    pub fn register(&self, caller: &Address) -> Result<Account, LedgerError> {
        let mut state = self.lock_state();
        let account = Account::new(caller.clone());

        if let Some(existing) = state.accounts.get(caller) {
            if existing.has_activity() {
                warn!(
                    "Re-registering {} discards a balance of {} and {} transaction reference(s)",
                    caller,
                    existing.balance,
                    existing.transaction_refs.len()
                );
            }
        }

        self.persist(&[&account], None)?;
        state.accounts.insert(account.clone());

        info!("Registered account {} ({})", caller, account.address_hash);
        self.publish(
            &mut state,
            EventKind::AccountCreated {
                address: account.address.clone(),
                address_hash: account.address_hash,
            },
        );

        Ok(account)
    }

    /// Mints `amount` new coins to `receiver` if `nonce` satisfies the proof of work
    ///
    /// The candidate links to the current tip; on success its digest becomes
    /// the new tip. A `PowChecked` event is published for every candidate
    /// that reaches the check, whether or not the mint then commits.
    ///
    /// # Arguments
    ///
    /// * `caller` - Who is minting
    /// * `receiver` - The registered account to credit
    /// * `amount` - The number of coins to create
    /// * `nonce` - The proof-of-work nonce
    ///
    /// # Returns
    ///
    /// The log index, the appended transaction and the new tip
    pub fn mint(
        &self,
        caller: &Address,
        receiver: &Address,
        amount: u64,
        nonce: u64,
    ) -> Result<MintReceipt, LedgerError> {
        if amount == 0 {
            return Err(AccountError::InvalidAmount("Mint amount must be positive".to_string()).into());
        }

        if self.config.restrict_mint_to_authority && *caller != self.config.authority {
            return Err(LedgerError::Unauthorized {
                caller: caller.clone(),
                authority: self.config.authority.clone(),
            });
        }

        let mut state = self.lock_state();

        let mut receiver_account = state
            .accounts
            .get(receiver)
            .cloned()
            .ok_or_else(|| LedgerError::UnregisteredAccount(receiver.clone()))?;

        let candidate =
            Transaction::new_mint(state.tip, receiver_account.address_hash, amount, nonce);
        let pow = candidate.check_pow(self.config.difficulty);
        self.publish(
            &mut state,
            EventKind::PowChecked {
                digest: pow.digest,
                accepted: pow.valid,
            },
        );

        if !pow.valid {
            debug!("Rejected mint nonce {}: digest {}", nonce, pow.digest);
            return Err(LedgerError::InvalidProofOfWork {
                digest: pow.digest,
                difficulty: self.config.difficulty,
            });
        }

        let index = state.log.len() as u64;
        receiver_account.deposit(amount)?;
        receiver_account.record_transaction(index);

        self.persist(
            &[&receiver_account],
            Some(AppendedEntry {
                index,
                transaction: &candidate,
                tip: pow.digest,
            }),
        )?;

        state.tip = pow.digest;
        state.log.push(candidate.clone());
        state.accounts.insert(receiver_account);

        info!(
            "Minted {} coins to {} as transaction {} (tip {})",
            amount, receiver, index, pow.digest
        );
        self.publish(
            &mut state,
            EventKind::TransactionMinted {
                index,
                receiver: receiver.clone(),
                transaction: candidate.clone(),
            },
        );

        Ok(MintReceipt {
            index,
            transaction: candidate,
            tip: pow.digest,
        })
    }

    /// Moves `amount` from the caller to `receiver`
    ///
    /// An unregistered receiver is created on the fly. Transfers are not
    /// appended to the log and never move the tip.
    ///
    /// # Arguments
    ///
    /// * `caller` - The registered sender
    /// * `receiver` - The recipient, created if unknown
    /// * `amount` - The number of coins to move
    ///
    /// # Returns
    ///
    /// Both balances as they stood when the transfer committed
    pub fn transfer(
        &self,
        caller: &Address,
        receiver: &Address,
        amount: u64,
    ) -> Result<TransferReceipt, LedgerError> {
        if amount == 0 {
            return Err(
                AccountError::InvalidAmount("Transfer amount must be positive".to_string()).into(),
            );
        }

        let mut state = self.lock_state();

        let mut sender = state
            .accounts
            .get(caller)
            .cloned()
            .ok_or_else(|| LedgerError::UnregisteredAccount(caller.clone()))?;

        let receipt = if caller == receiver {
            if !sender.has_sufficient_funds(amount) {
                return Err(AccountError::InsufficientBalance {
                    required: amount,
                    available: sender.balance,
                }
                .into());
            }

            TransferReceipt {
                sender_balance: sender.balance,
                receiver_balance: sender.balance,
                receiver_created: false,
            }
        } else {
            sender.withdraw(amount)?;

            let (mut recipient, created) = match state.accounts.get(receiver) {
                Some(account) => (account.clone(), false),
                None => (Account::new(receiver.clone()), true),
            };
            recipient.deposit(amount)?;

            self.persist(&[&sender, &recipient], None)?;

            let receipt = TransferReceipt {
                sender_balance: sender.balance,
                receiver_balance: recipient.balance,
                receiver_created: created,
            };
            let created_hash = recipient.address_hash;
            state.accounts.insert(sender);
            state.accounts.insert(recipient);

            if created {
                info!("Created account {} on first transfer", receiver);
                self.publish(
                    &mut state,
                    EventKind::AccountCreated {
                        address: receiver.clone(),
                        address_hash: created_hash,
                    },
                );
            }

            receipt
        };

        info!("Sent {} coins from {} to {}", amount, caller, receiver);
        self.publish(
            &mut state,
            EventKind::CoinsSent {
                from: caller.clone(),
                to: receiver.clone(),
                amount,
            },
        );

        Ok(receipt)
    }

    /// Runs the proof-of-work check at the ledger's difficulty without touching state
    pub fn check_pow(
        &self,
        previous_hash: &Hash256,
        sender: &Hash256,
        receiver: &Hash256,
        amount: u64,
        nonce: u64,
    ) -> PowCheck {
        hashgate::check(
            previous_hash,
            sender,
            receiver,
            amount,
            nonce,
            self.config.difficulty,
        )
    }

    /// The inputs a mint to `receiver` would be checked against right now
    pub fn mint_template(&self, receiver: &Address) -> Result<MintTemplate, LedgerError> {
        let state = self.lock_state();
        let account = state
            .accounts
            .get(receiver)
            .ok_or_else(|| LedgerError::UnregisteredAccount(receiver.clone()))?;

        Ok(MintTemplate {
            previous_hash: state.tip,
            sender: Hash256::ZERO,
            receiver: account.address_hash,
            difficulty: self.config.difficulty,
        })
    }

    /// Subscribes to events published after this call
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    pub fn authority(&self) -> &Address {
        &self.config.authority
    }

    pub fn authority_name(&self) -> &str {
        &self.config.authority_name
    }

    pub fn difficulty(&self) -> u32 {
        self.config.difficulty
    }

    pub fn restricts_minting(&self) -> bool {
        self.config.restrict_mint_to_authority
    }

    pub fn is_persistent(&self) -> bool {
        self.storage.is_some()
    }

    pub fn tip(&self) -> Hash256 {
        self.lock_state().tip
    }

    pub fn log_length(&self) -> u64 {
        self.lock_state().log.len() as u64
    }

    /// Reads the ledger-wide fields under a single lock
    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.lock_state();

        LedgerSnapshot {
            authority: self.config.authority.clone(),
            authority_name: self.config.authority_name.clone(),
            difficulty: self.config.difficulty,
            restrict_mint_to_authority: self.config.restrict_mint_to_authority,
            log_length: state.log.len() as u64,
            tip: state.tip,
            account_count: state.accounts.len() as u64,
        }
    }

    /// Balance of a registered account
    pub fn balance(&self, address: &Address) -> Option<u64> {
        self.lock_state().accounts.balance(address)
    }

    pub fn account(&self, address: &Address) -> Option<Account> {
        self.lock_state().accounts.get(address).cloned()
    }

    /// All accounts ordered by address
    pub fn accounts(&self) -> Vec<Account> {
        self.lock_state().accounts.all()
    }

    /// Sum of all balances
    pub fn total_supply(&self) -> u128 {
        self.lock_state().accounts.total_supply()
    }

    pub fn transaction(&self, index: u64) -> Option<Transaction> {
        let state = self.lock_state();
        usize::try_from(index)
            .ok()
            .and_then(|index| state.log.get(index))
            .cloned()
    }

    /// The whole log in append order
    pub fn transactions(&self) -> Vec<Transaction> {
        self.lock_state().log.clone()
    }

    /// The log entries referenced by an account, in the order they credited it
    pub fn account_transactions(&self, address: &Address) -> Option<Vec<Transaction>> {
        self.account_with_transactions(address)
            .map(|(_, transactions)| transactions)
    }

    /// An account together with the log entries it references, read under one lock
    pub fn account_with_transactions(
        &self,
        address: &Address,
    ) -> Option<(Account, Vec<Transaction>)> {
        let state = self.lock_state();
        let account = state.accounts.get(address)?;

        let transactions = account
            .transaction_refs
            .iter()
            .filter_map(|index| usize::try_from(*index).ok())
            .filter_map(|index| state.log.get(index).cloned())
            .collect();

        Some((account.clone(), transactions))
    }

    /// Recomputes the hash chain and checks every account's references
    pub fn verify_chain(&self) -> Result<(), LedgerError> {
        let state = self.lock_state();
        let mut expected_previous = Hash256::ZERO;

        for (index, transaction) in state.log.iter().enumerate() {
            if transaction.previous_hash != expected_previous {
                return Err(LedgerError::InvalidChain(format!(
                    "transaction {} links to {} instead of {}",
                    index, transaction.previous_hash, expected_previous
                )));
            }

            if !transaction.is_mint() {
                return Err(LedgerError::InvalidChain(format!(
                    "transaction {} has sender {} but only mints are logged",
                    index, transaction.sender
                )));
            }

            let pow = transaction.check_pow(self.config.difficulty);
            if !pow.valid {
                return Err(LedgerError::InvalidChain(format!(
                    "transaction {} fails proof of work with digest {}",
                    index, pow.digest
                )));
            }

            expected_previous = pow.digest;
        }

        if state.tip != expected_previous {
            return Err(LedgerError::InvalidChain(format!(
                "tip {} does not match last digest {}",
                state.tip, expected_previous
            )));
        }

        for account in state.accounts.iter() {
            if account.address_hash != account.address.identity_hash() {
                return Err(LedgerError::InvalidChain(format!(
                    "account {} has a mismatched address hash",
                    account.address
                )));
            }

            for window in account.transaction_refs.windows(2) {
                if window[0] >= window[1] {
                    return Err(LedgerError::InvalidChain(format!(
                        "account {} has out-of-order references",
                        account.address
                    )));
                }
            }

            for index in &account.transaction_refs {
                let transaction = usize::try_from(*index)
                    .ok()
                    .and_then(|i| state.log.get(i))
                    .ok_or_else(|| {
                        LedgerError::InvalidChain(format!(
                            "account {} references missing transaction {}",
                            account.address, index
                        ))
                    })?;

                if transaction.receiver != account.address_hash {
                    return Err(LedgerError::InvalidChain(format!(
                        "account {} references transaction {} of another receiver",
                        account.address, index
                    )));
                }
            }
        }

        Ok(())
    }

    /// Boolean form of [`Ledger::verify_chain`]
    pub fn is_valid(&self) -> bool {
        match self.verify_chain() {
            Ok(()) => true,
            Err(err) => {
                warn!("Ledger verification failed: {}", err);
                false
            }
        }
    }
}
