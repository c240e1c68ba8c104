//! QuantumCoin: a single-authority ledger where new coins are minted only
//! with a valid proof of work and then moved freely between accounts.
//!
//! - [`ledger`] - the ledger state machine, proof-of-work gate, events and storage
//! - [`api`] - REST endpoints exposing the ledger
//! - [`config`] - server and ledger configuration

#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod ledger;
