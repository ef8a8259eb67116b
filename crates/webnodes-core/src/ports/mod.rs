//! Port definitions
//!
//! These traits form the boundary between provider modules and whatever hosts
//! them. Adapters live in other crates.
//!
//! ## Ports Overview
//!
//! - [`CredentialStore`] - narrow read/write/clear access to stored credentials
//! - [`NodeContext`] - emission, status and warning/error callbacks of the host
//! - [`InputNode`] - a handler invoked with inbound messages

pub mod credentials;
pub mod host;

pub use credentials::CredentialStore;
pub use host::{invoke, report_failure, InputNode, NodeContext, NodeStatus, StatusColor, StatusShape};
