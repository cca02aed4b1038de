//! Stage graph engine.
//!
//! A plan is a walk over six fixed stages connected by `Edge`s. The only
//! cycle is the refinement loop from the quality gate back to activity
//! search, bounded by the iteration cap carried in the `TripContext`.
//!
//! The `GraphEngine` owns one context per request, lends it to each stage in
//! turn, retries retryable stage failures once, and enforces the plan-level
//! deadline and cancellation.

pub mod context;
pub mod edge;
pub mod executor;
pub mod stage;

pub use context::{Acceptance, TripContext};
pub use edge::{Edge, EdgeCondition};
pub use executor::{EngineSettings, GraphEngine, PlanOutcome, StageRecord};
pub use stage::{Stage, StageId};
