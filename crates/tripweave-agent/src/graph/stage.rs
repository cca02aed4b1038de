use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use tripweave_core::error::Result;

use super::context::TripContext;

/// Identifies one of the six planning stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Parse,
    Weather,
    Decide,
    ActivitySearch,
    QualityGate,
    Generate,
}

impl StageId {
    pub const ALL: [StageId; 6] = [
        StageId::Parse,
        StageId::Weather,
        StageId::Decide,
        StageId::ActivitySearch,
        StageId::QualityGate,
        StageId::Generate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::Parse => "parse",
            StageId::Weather => "weather",
            StageId::Decide => "decide",
            StageId::ActivitySearch => "activity_search",
            StageId::QualityGate => "quality_gate",
            StageId::Generate => "generate",
        }
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed transform over the trip context.
///
/// The context is lent for one call only. A stage must finish all of its
/// fallible work before writing to the context, so that a failed attempt
/// leaves the context untouched and the engine can retry it.
pub trait Stage: Send + Sync + 'static {
    fn id(&self) -> StageId;

    fn run<'a>(&'a self, ctx: &'a mut TripContext) -> BoxFuture<'a, Result<()>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        assert_eq!(StageId::ActivitySearch.to_string(), "activity_search");
        assert_eq!(StageId::QualityGate.as_str(), "quality_gate");
        assert_eq!(StageId::ALL.len(), 6);
    }

    #[test]
    fn test_stage_id_serde() {
        let json = serde_json::to_string(&StageId::QualityGate).unwrap();
        assert_eq!(json, "\"quality_gate\"");
        let parsed: StageId = serde_json::from_str("\"activity_search\"").unwrap();
        assert_eq!(parsed, StageId::ActivitySearch);
    }
}
