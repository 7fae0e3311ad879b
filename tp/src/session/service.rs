//! PlannerService - the conversational turn endpoint

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::locks::SessionLocks;
use super::messages::{StateError, StateResponse};
use super::store::ConversationStore;
use crate::domain::{ConversationState, PlanResponse, QuickPlanRequest, TurnRequest, generate_session_id};
use crate::planning::{Persistence, PlanningEngine};

/// Runs turns against stored sessions
///
/// Cloning is cheap; clones share the engine, the store and the lock table.
#[derive(Clone)]
pub struct PlannerService {
    engine: Arc<PlanningEngine>,
    store: ConversationStore,
    locks: SessionLocks,
}

impl PlannerService {
    pub fn new(engine: Arc<PlanningEngine>, store: ConversationStore) -> Self {
        Self {
            engine,
            store,
            locks: SessionLocks::new(),
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Run one conversational turn
    ///
    /// A missing context id starts a new session under a generated id. The
    /// session lock is held from load to save and dropped once idle.
    pub async fn handle_turn(&self, request: TurnRequest) -> PlanResponse {
        let session_id = request.context_id.unwrap_or_else(generate_session_id);
        debug!(%session_id, query_len = request.query.len(), "handle_turn: called");

        let response = {
            let _guard = self.locks.acquire(&session_id).await;
            self.run_turn(&session_id, &request.query).await
        };
        self.locks.release(&session_id);
        response
    }

    async fn run_turn(&self, session_id: &str, query: &str) -> PlanResponse {
        let state = match self.load_or_create(session_id).await {
            Ok(state) => state,
            Err(e) => {
                warn!(%session_id, error = %e, "run_turn: session store unavailable");
                return PlanResponse::Error {
                    message: format!("Session store unavailable: {}", e),
                    context_id: Some(session_id.to_string()),
                };
            }
        };

        let outcome = self.engine.step(state, query).await;

        let persisted = match outcome.persistence {
            Persistence::Save | Persistence::Restore => self.store.save(outcome.state).await,
            Persistence::Discard => {
                info!(%session_id, "run_turn: discarding session");
                self.store.remove(session_id).await.map(|_| ())
            }
        };

        if let Err(e) = persisted {
            warn!(%session_id, error = %e, "run_turn: failed to persist session");
            return PlanResponse::Error {
                message: format!("Failed to save session: {}", e),
                context_id: Some(session_id.to_string()),
            };
        }

        outcome.response
    }

    /// Stateless single-shot planning; no session is read or written
    pub async fn quick_plan(&self, request: QuickPlanRequest) -> PlanResponse {
        debug!(query_len = request.query.len(), "quick_plan: called");
        self.engine.quick_plan(&request.query).await
    }

    /// Current stored state of a session
    pub async fn session(&self, session_id: &str) -> StateResponse<Option<ConversationState>> {
        self.store.load(session_id).await
    }

    /// Sweep expired sessions and idle locks
    pub async fn purge_expired(&self) -> StateResponse<usize> {
        let purged = self.store.purge_expired().await?;
        let locks = self.locks.prune();
        debug!(purged, locks, "purge_expired: done");
        Ok(purged)
    }

    /// Run [`Self::purge_expired`] every `every` until the store goes away
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        debug!(every_ms = every.as_millis() as u64, "spawn_sweeper: called");
        let service = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                match service.purge_expired().await {
                    Ok(0) => {}
                    Ok(purged) => info!(purged, "spawn_sweeper: expired sessions removed"),
                    Err(StateError::ChannelError) => {
                        debug!("spawn_sweeper: store closed, stopping");
                        break;
                    }
                    Err(e) => warn!(error = %e, "spawn_sweeper: purge failed"),
                }
            }
        })
    }

    async fn load_or_create(&self, session_id: &str) -> StateResponse<ConversationState> {
        match self.store.load(session_id).await {
            Ok(Some(state)) => Ok(state),
            Ok(None) => {
                info!(%session_id, "load_or_create: starting new session");
                Ok(self.engine.new_state(session_id))
            }
            Err(StateError::Corrupted { reason, .. }) => {
                warn!(%session_id, %reason, "load_or_create: discarded corrupted state, starting fresh");
                Ok(self.engine.new_state(session_id))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversationConfig;
    use crate::domain::{MachineState, TripField};
    use crate::extract::KeywordExtractor;
    use crate::graph::TaskGraphBuilder;
    use chrono::{TimeZone, Utc};
    use sessionstore::ManualClock;

    fn service() -> PlannerService {
        service_with_clock().0
    }

    fn service_with_clock() -> (PlannerService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap()));
        let config = ConversationConfig::default();
        let engine = PlanningEngine::new(
            Arc::new(KeywordExtractor::new().unwrap()),
            TaskGraphBuilder::new().unwrap(),
            clock.clone(),
            config.clone(),
        );
        let store = ConversationStore::spawn(clock.clone(), config.session_ttl());
        (PlannerService::new(Arc::new(engine), store), clock)
    }

    #[tokio::test]
    async fn test_missing_context_generates_session() {
        let service = service();
        let response = service.handle_turn(TurnRequest::new("I want to visit Paris")).await;

        let id = response.context_id().unwrap().to_string();
        assert!(id.contains("-session-"));

        let stored = service.session(&id).await.unwrap().unwrap();
        assert_eq!(stored.trip_info.destination.as_deref(), Some("Paris"));
        assert_eq!(stored.pending_question, Some(TripField::Origin));
    }

    #[tokio::test]
    async fn test_turns_accumulate_on_same_session() {
        let service = service();
        let first = service.handle_turn(TurnRequest::with_context("I want to visit Paris", "s1")).await;
        assert_eq!(first.status(), "input_required");

        let second = service
            .handle_turn(TurnRequest::with_context("March 15 to March 22 from New York", "s1"))
            .await;
        assert!(second.is_completed());

        let stored = service.session("s1").await.unwrap().unwrap();
        assert_eq!(stored.machine, MachineState::Complete);
        assert!(stored.task_list.is_some());
    }

    #[tokio::test]
    async fn test_corrupted_session_starts_fresh() {
        let service = service();
        service.store().save_raw("s1", "{\"session_id\": 42").await.unwrap();

        let response = service.handle_turn(TurnRequest::with_context("I want to visit Paris", "s1")).await;
        assert_eq!(response.status(), "input_required");
        assert_eq!(response.context_id(), Some("s1"));

        let stored = service.session("s1").await.unwrap().unwrap();
        assert_eq!(stored.turn_count, 1);
    }

    #[tokio::test]
    async fn test_quick_plan_leaves_store_untouched() {
        let service = service();
        let response = service
            .quick_plan(QuickPlanRequest {
                query: "Trip to Paris next month".to_string(),
            })
            .await;

        assert_eq!(response.status(), "input_required");
        assert!(response.context_id().is_none());
        assert_eq!(service.store().len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_lock_dropped_after_turn() {
        let service = service();
        service.handle_turn(TurnRequest::with_context("I want to visit Paris", "s1")).await;
        service.handle_turn(TurnRequest::new("I want to visit Rome")).await;
        assert!(service.locks.is_empty());
    }

    #[tokio::test]
    async fn test_sweeper_purges_expired_sessions() {
        let (service, clock) = service_with_clock();
        service.handle_turn(TurnRequest::with_context("I want to visit Paris", "s1")).await;
        clock.advance(chrono::Duration::hours(25));

        let sweeper = service.spawn_sweeper(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Already swept, so nothing is left to purge
        assert_eq!(service.purge_expired().await.unwrap(), 0);

        service.store().shutdown().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), sweeper).await.unwrap().unwrap();
    }
}
