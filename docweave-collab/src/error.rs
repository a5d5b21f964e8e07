use crate::transport::TransportError;
use docweave_core::EditorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollabError {
    #[error("Binding is not bound to a shared document")]
    NotBound,

    #[error("Binding is already bound")]
    AlreadyBound,

    #[error("Binding has been torn down")]
    TornDown,

    #[error("CRDT error: {0}")]
    Crdt(#[from] loro::LoroError),

    #[error("Export error: {0}")]
    Export(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Editor(#[from] EditorError),
}
