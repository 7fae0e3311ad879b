//! Conversation state storage and the turn endpoint
//!
//! - [`ConversationStore`]: actor owning the expiring session store
//! - [`SessionLocks`]: one async lock per session id
//! - [`PlannerService`]: load, step, persist under the session lock

mod locks;
mod messages;
mod service;
mod store;

pub use locks::SessionLocks;
pub use messages::{SessionCommand, StateError, StateResponse};
pub use service::PlannerService;
pub use store::ConversationStore;
