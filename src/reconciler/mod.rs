//! Reconciler module - route table convergence and its control loop

pub mod route_table;
pub mod trigger;

pub use route_table::{OutcomeBoard, ReconcileAction, ReconcileOutcome, Reconciler};
pub use trigger::ReconcileLoop;
