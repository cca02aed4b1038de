use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use tripweave_core::config::PlannerConfig;
use tripweave_core::error::Result;
use tripweave_core::traits::{ReasoningClient, SearchProvider, WeatherProvider};

use crate::graph::{EngineSettings, GraphEngine, PlanOutcome, Stage};
use crate::stages::{
    ActivitySearchStage, DecisionStage, GenerateStage, ParseStage, QualityGate, WeatherStage,
};

/// Public entry point: wires the collaborators into the six stages and
/// runs one engine per request.
pub struct TripPlanner {
    reasoning: Arc<dyn ReasoningClient>,
    weather: Arc<dyn WeatherProvider>,
    search: Arc<dyn SearchProvider>,
    config: PlannerConfig,
}

impl TripPlanner {
    pub fn new(
        reasoning: Arc<dyn ReasoningClient>,
        weather: Arc<dyn WeatherProvider>,
        search: Arc<dyn SearchProvider>,
        config: PlannerConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            reasoning,
            weather,
            search,
            config,
        })
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Build an engine whose search loop is capped at `max_iterations` passes.
    pub fn engine(&self, max_iterations: u32) -> Result<GraphEngine> {
        let threshold = self.config.precipitation_threshold;
        let stages: Vec<Arc<dyn Stage>> = vec![
            Arc::new(ParseStage::new(self.reasoning.clone(), &self.config)),
            Arc::new(WeatherStage::new(self.weather.clone())),
            Arc::new(DecisionStage::new(self.reasoning.clone(), threshold)),
            Arc::new(ActivitySearchStage::new(self.search.clone(), &self.config)),
            Arc::new(QualityGate::new(self.reasoning.clone(), &self.config)),
            Arc::new(GenerateStage::new(threshold)),
        ];
        let settings = EngineSettings {
            max_iterations,
            ..EngineSettings::from_config(&self.config)
        };
        GraphEngine::new(stages, settings)
    }

    /// Plan a trip with the configured search cap and return the itinerary text.
    pub async fn plan_trip(&self, request_text: &str) -> Result<String> {
        self.plan_trip_with_iterations(request_text, self.config.max_search_iterations)
            .await
    }

    pub async fn plan_trip_with_iterations(
        &self,
        request_text: &str,
        max_search_iterations: u32,
    ) -> Result<String> {
        let outcome = self
            .plan(request_text, max_search_iterations, CancellationToken::new())
            .await?;
        Ok(outcome.itinerary().to_string())
    }

    /// Plan a trip and return the full execution report.
    pub async fn plan(
        &self,
        request_text: &str,
        max_search_iterations: u32,
        cancel: CancellationToken,
    ) -> Result<PlanOutcome> {
        self.engine(max_search_iterations)?
            .plan_with_cancel(request_text, cancel)
            .await
    }
}
