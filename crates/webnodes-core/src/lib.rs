//! webnodes Core - shared domain types and ports
//!
//! This crate contains the pieces every provider module builds on:
//! - **Domain types** - `Message`, `ChangeEvent`, `WatchState`, `Credentials`
//! - **Diffing** - snapshot and cursor change classification with glob filtering
//! - **Port definitions** - `CredentialStore`, `NodeContext`, `InputNode`
//! - **Configuration** - YAML configuration with defaults and validation
//!
//! # Architecture
//!
//! Apart from reading the configuration file, nothing in here performs I/O.
//! Provider modules implement the ports and feed their listings through
//! [`diff`].

pub mod config;
pub mod diff;
pub mod domain;
pub mod filter;
pub mod ports;

pub use domain::{
    ChangeEvent, ChangeKind, Credentials, DomainError, Location, Message, NodeError,
    SubscriptionId, WatchState,
};
