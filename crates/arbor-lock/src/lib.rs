//! Lock coordinator for arbor.
//!
//! Maintenance operations (merge, rebase, versioning) take exclusive locks
//! on branch paths before they touch history. Locks are hierarchical: a lock
//! on a branch blocks new locks on its descendants and ancestors. Waiting is
//! async and bounded by a timeout; dropping the future cancels the wait.
//!
//! # Key Types
//!
//! - [`LockCoordinator`] -- the registry and acquisition logic
//! - [`Lockable`] / [`LockContext`] -- what is locked, and by whom and why
//! - [`LockEvent`] / [`LockListener`] -- transitions published for other nodes
//! - [`RemoteLockView`] -- idempotent replica of another node's locks

pub mod config;
pub mod coordinator;
pub mod error;
pub mod notify;
pub mod types;

pub use config::LockConfig;
pub use coordinator::LockCoordinator;
pub use error::{LockError, Result};
pub use notify::{
    BroadcastLockListener, LockEvent, LockEventKind, LockEventStream, LockListener, RemoteLockView,
};
pub use types::{LockContext, LockInfo, Lockable};
