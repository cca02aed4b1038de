//! The six planning stages, in graph order.

pub mod decide;
pub mod generate;
pub mod parse;
pub mod quality;
pub mod search;
pub mod weather;

pub use decide::DecisionStage;
pub use generate::GenerateStage;
pub use parse::ParseStage;
pub use quality::QualityGate;
pub use search::ActivitySearchStage;
pub use weather::WeatherStage;
