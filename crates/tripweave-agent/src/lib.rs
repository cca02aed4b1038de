pub mod graph;
pub mod planner;
pub mod stages;

pub use graph::{
    Acceptance, EngineSettings, GraphEngine, PlanOutcome, Stage, StageId, StageRecord, TripContext,
};
pub use planner::TripPlanner;
pub use stages::{
    ActivitySearchStage, DecisionStage, GenerateStage, ParseStage, QualityGate, WeatherStage,
};
