use serde::{Deserialize, Serialize};

use tripweave_core::error::{Result, TripError};

use super::context::TripContext;
use super::stage::StageId;

/// A transition between two stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: StageId,
    pub to: StageId,
    #[serde(default)]
    pub condition: EdgeCondition,
}

/// Condition for traversing an edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeCondition {
    /// Always traverse this edge.
    #[default]
    Always,
    /// The latest verdict needs more detail and the search cap leaves room
    /// for another pass.
    NeedsRefinement,
    /// Fallback when no earlier edge from the same stage matched.
    Otherwise,
}

impl Edge {
    /// Create an unconditional edge.
    pub fn always(from: StageId, to: StageId) -> Self {
        Self {
            from,
            to,
            condition: EdgeCondition::Always,
        }
    }

    /// Create the loop-back edge guarded by the iteration cap.
    pub fn on_refinement(from: StageId, to: StageId) -> Self {
        Self {
            from,
            to,
            condition: EdgeCondition::NeedsRefinement,
        }
    }

    /// Create a fallback edge.
    pub fn otherwise(from: StageId, to: StageId) -> Self {
        Self {
            from,
            to,
            condition: EdgeCondition::Otherwise,
        }
    }
}

/// The planning graph:
/// parse → weather → decide → activity_search → quality_gate → (activity_search | generate).
pub fn trip_edges() -> Vec<Edge> {
    vec![
        Edge::always(StageId::Parse, StageId::Weather),
        Edge::always(StageId::Weather, StageId::Decide),
        Edge::always(StageId::Decide, StageId::ActivitySearch),
        Edge::always(StageId::ActivitySearch, StageId::QualityGate),
        Edge::on_refinement(StageId::QualityGate, StageId::ActivitySearch),
        Edge::otherwise(StageId::QualityGate, StageId::Generate),
    ]
}

/// Evaluate an edge condition against the context.
///
/// `NeedsRefinement` requires a verdict to exist; reaching it without one
/// means the stages ran out of order.
pub fn evaluate_condition(condition: EdgeCondition, ctx: &TripContext) -> Result<bool> {
    match condition {
        EdgeCondition::Always | EdgeCondition::Otherwise => Ok(true),
        EdgeCondition::NeedsRefinement => {
            let verdict = ctx.latest_verdict().ok_or_else(|| {
                TripError::invariant("refinement edge evaluated without a quality verdict")
            })?;
            Ok(!verdict.is_pass() && ctx.iteration_count() < ctx.max_iterations())
        }
    }
}
