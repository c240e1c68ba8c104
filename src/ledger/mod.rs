// Ledger module
//
// This module contains the core ledger implementation including:
// - Proof-of-work admission check (hashgate)
// - Ledger state machine with its account registry
// - Minted transaction structure
// - Address and hash types
// - Event notifications and persistent storage

pub mod account;
pub mod chain;
pub mod crypto;
pub mod events;
pub mod hashgate;
pub mod storage;
pub mod transaction;

// Re-export main components for easier access
pub use account::{Account, AccountError};
pub use chain::{
    Ledger, LedgerConfig, LedgerError, LedgerSnapshot, MintReceipt, MintTemplate, TransferReceipt,
};
pub use crypto::{Address, Hash256};
pub use events::{EventKind, EventReceiver, LedgerEvent};
pub use transaction::Transaction;
