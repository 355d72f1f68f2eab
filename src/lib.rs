//! browse-web - JSON action server over a single-owner notes collection
//!
//! Re-exports all modules for use by the binary target.

// Host resource and action handlers
pub mod actions;
pub mod collection;
pub mod error;

// Threading and HTTP
pub mod bridge;
pub mod server;

// App modules
pub mod cli;
pub mod config;

pub use actions::{Action, Command, handle_action};
pub use bridge::{Bridge, OwnerContext, OwnerQueue, OwnerThread};
pub use collection::{Collection, CollectionHost, HostSlot, MemoryCollection};
pub use error::{ActionError, BridgeError, CollectionError};
pub use server::{BrowseServer, Router};
