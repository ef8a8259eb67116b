//! Domain types
//!
//! - [`message`] - the envelope emitted to the host
//! - [`change`] - change events produced by watchers
//! - [`watch_state`] - last observed remote state per subscription
//! - [`credentials`] - tagged credential kinds
//! - [`errors`] - domain and node error taxonomies

pub mod change;
pub mod credentials;
pub mod errors;
pub mod message;
pub mod watch_state;

pub use change::{ChangeEvent, ChangeKind};
pub use credentials::Credentials;
pub use errors::{DomainError, NodeError};
pub use message::{Location, Message};
pub use watch_state::{SubscriptionId, WatchState};
