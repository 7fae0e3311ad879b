//! ConversationStore - actor that owns the SessionStore
//!
//! All reads and writes of conversation state go through one task, so the
//! store itself needs no locking. Serializing turns of the same session is
//! the job of [`super::SessionLocks`].

use std::sync::Arc;

use sessionstore::{Clock, SessionStore, StoreError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::messages::{SessionCommand, StateError, StateResponse};
use crate::domain::ConversationState;

/// Handle to send commands to the ConversationStore
#[derive(Clone)]
pub struct ConversationStore {
    tx: mpsc::Sender<SessionCommand>,
}

impl ConversationStore {
    /// Spawn a new ConversationStore actor
    ///
    /// Entries expire `ttl` after their last write, measured with `clock`.
    pub fn spawn(clock: Arc<dyn Clock>, ttl: chrono::Duration) -> Self {
        debug!(ttl_secs = ttl.num_seconds(), "spawn: called");
        let store = SessionStore::new(clock, ttl);
        let (tx, rx) = mpsc::channel(256);

        tokio::spawn(actor_loop(store, rx));

        info!("ConversationStore spawned");
        Self { tx }
    }

    /// Load a session's state; `None` when unknown or expired
    pub async fn load(&self, session_id: &str) -> StateResponse<Option<ConversationState>> {
        debug!(%session_id, "load: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(SessionCommand::Load {
                session_id: session_id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// Save a session's state, restarting its expiry window
    pub async fn save(&self, state: ConversationState) -> StateResponse<()> {
        debug!(session_id = %state.session_id, machine = %state.machine, "save: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(SessionCommand::Save {
                state: Box::new(state),
                reply: reply_tx,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// Write an already-serialized payload for a session
    pub async fn save_raw(&self, session_id: &str, payload: impl Into<String>) -> StateResponse<()> {
        debug!(%session_id, "save_raw: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(SessionCommand::SaveRaw {
                session_id: session_id.to_string(),
                payload: payload.into(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// Remove a session; returns whether it existed
    pub async fn remove(&self, session_id: &str) -> StateResponse<bool> {
        debug!(%session_id, "remove: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(SessionCommand::Remove {
                session_id: session_id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// Drop every expired session; returns how many were removed
    pub async fn purge_expired(&self) -> StateResponse<usize> {
        debug!("purge_expired: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(SessionCommand::PurgeExpired { reply: reply_tx })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// Number of live sessions
    pub async fn len(&self) -> StateResponse<usize> {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(SessionCommand::Len { reply: reply_tx })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// Shutdown the ConversationStore
    pub async fn shutdown(&self) -> Result<(), StateError> {
        debug!("shutdown: called");
        self.tx
            .send(SessionCommand::Shutdown)
            .await
            .map_err(|_| StateError::ChannelError)
    }
}

async fn actor_loop(mut store: SessionStore, mut rx: mpsc::Receiver<SessionCommand>) {
    debug!("actor_loop: called");
    debug!("ConversationStore actor started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            SessionCommand::Load { session_id, reply } => {
                debug!(%session_id, "actor_loop: Load command");
                let result = match store.get::<ConversationState>(&session_id) {
                    Ok(state) => Ok(state),
                    Err(StoreError::Corrupted { key, reason }) => {
                        warn!(session_id = %key, %reason, "actor_loop: evicting corrupted session state");
                        store.remove(&key);
                        Err(StateError::Corrupted {
                            session_id: key,
                            reason,
                        })
                    }
                    Err(e) => Err(StateError::Store(e.to_string())),
                };
                let _ = reply.send(result);
            }

            SessionCommand::Save { state, reply } => {
                debug!(session_id = %state.session_id, "actor_loop: Save command");
                let result = store
                    .put(&state.session_id, state.as_ref(), None)
                    .map_err(|e| StateError::Store(e.to_string()));
                let _ = reply.send(result);
            }

            SessionCommand::SaveRaw {
                session_id,
                payload,
                reply,
            } => {
                debug!(%session_id, "actor_loop: SaveRaw command");
                store.put_raw(&session_id, payload, None);
                let _ = reply.send(Ok(()));
            }

            SessionCommand::Remove { session_id, reply } => {
                debug!(%session_id, "actor_loop: Remove command");
                let _ = reply.send(Ok(store.remove(&session_id)));
            }

            SessionCommand::PurgeExpired { reply } => {
                let purged = store.purge_expired();
                debug!(purged, "actor_loop: PurgeExpired command");
                let _ = reply.send(Ok(purged));
            }

            SessionCommand::Len { reply } => {
                let _ = reply.send(Ok(store.len()));
            }

            SessionCommand::Shutdown => {
                debug!("actor_loop: Shutdown command");
                info!("ConversationStore shutting down");
                break;
            }
        }
    }

    debug!("ConversationStore actor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sessionstore::ManualClock;

    fn setup() -> (Arc<ManualClock>, ConversationStore) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap()));
        let store = ConversationStore::spawn(clock.clone(), chrono::Duration::hours(24));
        (clock, store)
    }

    fn state(id: &str) -> ConversationState {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap();
        ConversationState::new(id, crate::domain::TurnHistory::new(4, 100), now)
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (_clock, store) = setup();
        let mut s = state("s1");
        s.trip_info.destination = Some("Paris".to_string());

        store.save(s.clone()).await.unwrap();
        let loaded = store.load("s1").await.unwrap();
        assert_eq!(loaded, Some(s));

        assert!(store.load("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expiry_after_inactivity() {
        let (clock, store) = setup();
        store.save(state("s1")).await.unwrap();

        clock.advance(chrono::Duration::hours(23));
        assert!(store.load("s1").await.unwrap().is_some());

        clock.advance(chrono::Duration::hours(2));
        assert!(store.load("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_restarts_expiry_window() {
        let (clock, store) = setup();
        store.save(state("s1")).await.unwrap();

        clock.advance(chrono::Duration::hours(20));
        store.save(state("s1")).await.unwrap();
        clock.advance(chrono::Duration::hours(20));

        assert!(store.load("s1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_corrupted_state_is_evicted() {
        let (_clock, store) = setup();
        store.save_raw("s1", "{not json").await.unwrap();

        let err = store.load("s1").await.unwrap_err();
        assert!(matches!(err, StateError::Corrupted { ref session_id, .. } if session_id == "s1"));

        // Second load sees nothing: the bad entry is gone
        assert!(store.load("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_and_purge() {
        let (clock, store) = setup();
        store.save(state("a")).await.unwrap();
        store.save(state("b")).await.unwrap();

        assert!(store.remove("a").await.unwrap());
        assert!(!store.remove("a").await.unwrap());

        clock.advance(chrono::Duration::hours(25));
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_closes_channel() {
        let (_clock, store) = setup();
        store.shutdown().await.unwrap();
        tokio::task::yield_now().await;

        // Give the actor a moment to exit
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(matches!(store.load("s1").await, Err(StateError::ChannelError)));
    }
}
