//! Domain types for the trip planner
//!
//! Core types: TripInfo (accumulated facts), ConversationState (per-session
//! machine state), PlannerTask/TaskList (planning output), and the request
//! and response shapes of the planning endpoints.

mod conversation;
mod id;
mod response;
mod task;
mod trip;

pub use conversation::{ConversationState, MachineState, Role, Turn, TurnHistory};
pub use id::generate_session_id;
pub use response::{PlanResponse, QuickPlanRequest, TurnRequest};
pub use task::{PlannerTask, TaskList, TaskMetadata, TaskType};
pub use trip::{Budget, FieldChange, TripField, TripInfo, TripType, TripUpdate};
