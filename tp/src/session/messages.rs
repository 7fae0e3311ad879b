//! Conversation store messages
//!
//! Commands and responses for the actor pattern.

use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::ConversationState;

/// Errors from conversation store operations
#[derive(Debug, Error)]
pub enum StateError {
    /// The persisted state could not be read back; the entry was evicted
    #[error("Session '{session_id}' state is corrupted: {reason}")]
    Corrupted { session_id: String, reason: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Channel error")]
    ChannelError,
}

/// Response from store operations
pub type StateResponse<T> = Result<T, StateError>;

/// Commands sent to the ConversationStore actor
#[derive(Debug)]
pub enum SessionCommand {
    Load {
        session_id: String,
        reply: oneshot::Sender<StateResponse<Option<ConversationState>>>,
    },
    Save {
        state: Box<ConversationState>,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    SaveRaw {
        session_id: String,
        payload: String,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    Remove {
        session_id: String,
        reply: oneshot::Sender<StateResponse<bool>>,
    },
    PurgeExpired {
        reply: oneshot::Sender<StateResponse<usize>>,
    },
    Len {
        reply: oneshot::Sender<StateResponse<usize>>,
    },

    // Shutdown
    Shutdown,
}
