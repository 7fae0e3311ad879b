//! Task graph construction and validation
//!
//! [`TaskGraphBuilder`] applies the generation rules; [`validate`] and
//! [`waves`] check and layer any task list, generated or not.

mod builder;
mod dag;

pub use builder::TaskGraphBuilder;
pub use dag::{GraphError, critical_path_minutes, validate, waves};

#[cfg(test)]
pub(crate) use dag::tests::task as test_task;
