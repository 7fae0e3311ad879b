//! Orchestrator - drives planning turns and dispatches completed rounds
//!
//! A completed TaskList is walked wave by wave. Every task in a wave whose
//! dependencies all succeeded is dispatched concurrently in its own spawned
//! task; the next wave starts once the whole wave has answered. A task whose
//! dependency failed or was skipped is itself skipped.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::dispatch::AgentDispatcher;
use super::report::{ProgressEvent, RoundReport, TaskOutcome, TaskStatus, TurnReply};
use crate::config::DispatchConfig;
use crate::domain::{PlanResponse, PlannerTask, QuickPlanRequest, TaskList, TurnRequest};
use crate::graph::{self, GraphError};
use crate::registry::AgentResolver;
use crate::session::PlannerService;

/// Errors that abort a whole round
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The TaskList is not a valid DAG; this is a builder defect
    #[error("Invalid task graph: {0}")]
    InvalidGraph(#[from] GraphError),
}

const CANCELLED_REASON: &str = "round cancelled";

/// Dispatches planner output to agents
#[derive(Clone)]
pub struct Orchestrator {
    service: PlannerService,
    resolver: Arc<dyn AgentResolver>,
    dispatcher: Arc<dyn AgentDispatcher>,
    config: DispatchConfig,
}

impl Orchestrator {
    pub fn new(
        service: PlannerService,
        resolver: Arc<dyn AgentResolver>,
        dispatcher: Arc<dyn AgentDispatcher>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            service,
            resolver,
            dispatcher,
            config,
        }
    }

    pub fn service(&self) -> &PlannerService {
        &self.service
    }

    /// Run one conversational turn, dispatching the round if it completed
    pub async fn handle_turn(
        &self,
        request: TurnRequest,
        progress: mpsc::Sender<ProgressEvent>,
        cancel: watch::Receiver<bool>,
    ) -> Result<TurnReply, OrchestratorError> {
        debug!(context_id = ?request.context_id, "handle_turn: called");
        let response = self.service.handle_turn(request).await;
        self.finish(response, progress, cancel).await
    }

    /// Quick-plan a request, dispatching the round if it completed
    pub async fn quick_plan(
        &self,
        request: QuickPlanRequest,
        progress: mpsc::Sender<ProgressEvent>,
        cancel: watch::Receiver<bool>,
    ) -> Result<TurnReply, OrchestratorError> {
        debug!("quick_plan: called");
        let response = self.service.quick_plan(request).await;
        self.finish(response, progress, cancel).await
    }

    async fn finish(
        &self,
        response: PlanResponse,
        progress: mpsc::Sender<ProgressEvent>,
        cancel: watch::Receiver<bool>,
    ) -> Result<TurnReply, OrchestratorError> {
        let report = match response.task_list() {
            Some(task_list) => Some(self.execute(task_list, progress, cancel).await?),
            None => None,
        };
        Ok(TurnReply { response, report })
    }

    /// Dispatch every task of a TaskList
    ///
    /// A cyclic or otherwise invalid graph aborts before anything is sent.
    /// A cancel signal or a closed progress channel stops further waves;
    /// dispatches already in flight finish in the background and are
    /// reported as skipped.
    pub async fn execute(
        &self,
        task_list: &TaskList,
        progress: mpsc::Sender<ProgressEvent>,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<RoundReport, OrchestratorError> {
        let tasks = &task_list.tasks;
        debug!(task_count = tasks.len(), "execute: called");

        let layers = graph::waves(tasks).inspect_err(|e| {
            error!(error = %e, "execute: refusing to dispatch invalid task graph");
        })?;

        emit(
            &progress,
            ProgressEvent::RoundStarted {
                task_count: tasks.len(),
                wave_count: layers.len(),
            },
        )
        .await;

        let mut outcomes: Vec<Option<TaskOutcome>> = vec![None; tasks.len()];
        let mut statuses: HashMap<&str, TaskStatus> = HashMap::new();
        let mut cancelled = false;

        for (wave_idx, wave) in layers.iter().enumerate() {
            if is_cancelled(&cancel, &progress) {
                info!(wave = wave_idx, "execute: cancelled before wave");
                cancelled = true;
                break;
            }

            emit(
                &progress,
                ProgressEvent::WaveStarted {
                    wave: wave_idx,
                    task_ids: wave.iter().map(|&i| tasks[i].id.clone()).collect(),
                },
            )
            .await;

            let mut in_flight = Vec::new();
            for &idx in wave {
                let task = &tasks[idx];
                if let Some(dep) = task
                    .depends_on
                    .iter()
                    .find(|d| statuses.get(d.as_str()) != Some(&TaskStatus::Succeeded))
                {
                    let reason = format!("dependency {} did not succeed", dep);
                    debug!(task_id = %task.id, %reason, "execute: skipping task");
                    statuses.insert(&task.id, TaskStatus::Skipped);
                    emit(
                        &progress,
                        ProgressEvent::TaskSkipped {
                            task_id: task.id.clone(),
                            reason: reason.clone(),
                        },
                    )
                    .await;
                    outcomes[idx] = Some(TaskOutcome::skipped(&task.id, reason));
                    continue;
                }

                emit(
                    &progress,
                    ProgressEvent::TaskDispatched {
                        task_id: task.id.clone(),
                        capability: task.capability.clone(),
                    },
                )
                .await;
                in_flight.push(idx);
            }

            let handles: Vec<_> = in_flight.iter().map(|&idx| self.spawn_dispatch(tasks[idx].clone())).collect();

            let results = tokio::select! {
                results = join_all(handles) => results,
                _ = wait_for_cancel(&mut cancel, &progress) => {
                    warn!(wave = wave_idx, in_flight = in_flight.len(), "execute: cancelled mid-wave, discarding in-flight results");
                    cancelled = true;
                    break;
                }
            };

            for (&idx, joined) in in_flight.iter().zip(results) {
                let task = &tasks[idx];
                let outcome = match joined {
                    Ok(outcome) => outcome,
                    Err(e) => TaskOutcome::failed(&task.id, format!("dispatch task aborted: {}", e)),
                };
                let event = match outcome.status {
                    TaskStatus::Succeeded => ProgressEvent::TaskSucceeded {
                        task_id: task.id.clone(),
                        agent: outcome.agent.clone().unwrap_or_default(),
                        summary: outcome.detail.clone(),
                    },
                    _ => ProgressEvent::TaskFailed {
                        task_id: task.id.clone(),
                        reason: outcome.detail.clone(),
                    },
                };
                emit(&progress, event).await;
                statuses.insert(&task.id, outcome.status);
                outcomes[idx] = Some(outcome);
            }
        }

        let outcomes: Vec<TaskOutcome> = outcomes
            .into_iter()
            .zip(tasks)
            .map(|(outcome, task)| outcome.unwrap_or_else(|| TaskOutcome::skipped(&task.id, CANCELLED_REASON.to_string())))
            .collect();

        let report = RoundReport {
            task_list: task_list.clone(),
            outcomes,
            cancelled,
        };

        info!(
            succeeded = report.succeeded().len(),
            failed = report.failed().len(),
            skipped = report.skipped().len(),
            cancelled,
            "execute: round finished"
        );
        emit(
            &progress,
            ProgressEvent::RoundFinished {
                succeeded: report.succeeded().len(),
                failed: report.failed().len(),
                skipped: report.skipped().len(),
                cancelled,
            },
        )
        .await;

        Ok(report)
    }

    /// Resolve and dispatch one task in its own tokio task
    fn spawn_dispatch(&self, task: PlannerTask) -> tokio::task::JoinHandle<TaskOutcome> {
        let resolver = self.resolver.clone();
        let dispatcher = self.dispatcher.clone();
        let timeout = self.config.timeout();

        tokio::spawn(async move {
            let endpoint = match resolver.resolve(&task.capability).await {
                Ok(endpoint) => endpoint,
                Err(e) => {
                    warn!(task_id = %task.id, error = %e, "spawn_dispatch: resolution failed");
                    return TaskOutcome::failed(&task.id, e.to_string());
                }
            };

            match tokio::time::timeout(timeout, dispatcher.dispatch(&endpoint, &task)).await {
                Ok(Ok(reply)) => {
                    debug!(task_id = %task.id, agent = %reply.agent, "spawn_dispatch: succeeded");
                    TaskOutcome::succeeded(&task.id, reply.agent, reply.summary)
                }
                Ok(Err(e)) => {
                    warn!(task_id = %task.id, error = %e, "spawn_dispatch: dispatch failed");
                    TaskOutcome::failed(&task.id, e.to_string())
                }
                Err(_) => {
                    warn!(task_id = %task.id, timeout_ms = timeout.as_millis() as u64, "spawn_dispatch: timed out");
                    TaskOutcome::failed(
                        &task.id,
                        format!("agent did not answer within {}ms", timeout.as_millis()),
                    )
                }
            }
        })
    }
}

async fn emit(progress: &mpsc::Sender<ProgressEvent>, event: ProgressEvent) {
    // A closed channel is observed by is_cancelled
    let _ = progress.send(event).await;
}

fn is_cancelled(cancel: &watch::Receiver<bool>, progress: &mpsc::Sender<ProgressEvent>) -> bool {
    *cancel.borrow() || progress.is_closed()
}

/// Resolves once the round should stop
async fn wait_for_cancel(cancel: &mut watch::Receiver<bool>, progress: &mpsc::Sender<ProgressEvent>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        tokio::select! {
            changed = cancel.changed() => {
                if changed.is_err() {
                    progress.closed().await;
                    return;
                }
            }
            _ = progress.closed() => return,
        }
    }
}
