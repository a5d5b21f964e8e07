//! # docweave-collab
//!
//! Binds an editing session to a Loro CRDT document so concurrent edits from
//! several peers converge. Updates travel through an [`UpdateTransport`] as
//! opaque bytes.

pub mod binding;
pub mod error;
pub mod plugin;
mod shape;
pub mod transport;

pub use binding::{BindingState, CollabBinding, SyncOutcome};
pub use error::CollabError;
pub use plugin::{apply_remote_update, attach, SharedBinding, SyncPlugin, SYNC_PLUGIN_KEY};
pub use transport::{MemoryTransport, TransportError, UpdateTransport};
