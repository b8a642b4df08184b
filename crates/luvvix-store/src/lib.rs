//! # luvvix-store
//!
//! Relational storage for LuvviX secure chat, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle with typed CRUD helpers
//! for the shared tables (`directory_entries`, `conversations`,
//! `participants`, `messages`, `key_wraps`, `contacts`), the device-local
//! [`KeyVault`], and [`RemoteStore`], the async handle the chat services use.
//! Every multi-row write runs in a single transaction so a failure leaves no
//! partial state behind.

pub mod contacts;
pub mod conversations;
pub mod database;
pub mod directory;
pub mod key_wraps;
pub mod keyvault;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod participants;
pub mod remote;

mod error;
mod sql;

pub use database::Database;
pub use error::{Result, StoreError};
pub use keyvault::KeyVault;
pub use models::*;
pub use remote::{CommitGate, RemoteStore};
