use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::info;

use tripweave_core::error::Result;
use tripweave_core::traits::ReasoningClient;
use tripweave_core::types::{DailyForecast, WeatherCondition, WeatherForecast, WeatherPreference};

use crate::graph::{Stage, StageId, TripContext};

/// Comfortable range for outdoor plans, inclusive.
const OUTDOOR_MIN_C: f32 = 5.0;
const OUTDOOR_MAX_C: f32 = 32.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayClass {
    Wet,
    Clear,
    Mixed,
}

pub fn classify_day(day: &DailyForecast, threshold: f32) -> DayClass {
    if day.precipitation_probability > threshold || day.condition.is_precipitation() {
        return DayClass::Wet;
    }
    let fair = matches!(day.condition, WeatherCondition::Clear | WeatherCondition::Clouds);
    if fair && (OUTDOOR_MIN_C..=OUTDOOR_MAX_C).contains(&day.temp_max_c) {
        DayClass::Clear
    } else {
        DayClass::Mixed
    }
}

/// Majority rule over the forecast. Ties and empty forecasts resolve to `Both`.
pub fn decide_preference(forecast: &WeatherForecast, threshold: f32) -> WeatherPreference {
    let total = forecast.len();
    let count = |class: DayClass| {
        forecast
            .days
            .iter()
            .filter(|d| classify_day(d, threshold) == class)
            .count()
    };

    if count(DayClass::Wet) * 2 > total {
        WeatherPreference::Indoor
    } else if count(DayClass::Clear) * 2 > total {
        WeatherPreference::Outdoor
    } else {
        WeatherPreference::Both
    }
}

/// One line per forecast day, for prompts.
pub fn describe_forecast(forecast: &WeatherForecast) -> String {
    forecast
        .days
        .iter()
        .enumerate()
        .map(|(i, d)| {
            format!(
                "Day {} ({}): {}, {:.0}% chance of precipitation, {:.0}-{:.0}°C",
                i + 1,
                d.date,
                d.condition,
                d.precipitation_probability * 100.0,
                d.temp_min_c,
                d.temp_max_c
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Classifies the forecast into an activity preference and asks the
/// reasoning collaborator to justify it.
pub struct DecisionStage {
    reasoning: Arc<dyn ReasoningClient>,
    threshold: f32,
}

impl DecisionStage {
    pub fn new(reasoning: Arc<dyn ReasoningClient>, precipitation_threshold: f32) -> Self {
        Self {
            reasoning,
            threshold: precipitation_threshold,
        }
    }
}

impl Stage for DecisionStage {
    fn id(&self) -> StageId {
        StageId::Decide
    }

    fn run<'a>(&'a self, ctx: &'a mut TripContext) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let forecast = ctx.forecast()?;
            let preference = decide_preference(forecast, self.threshold);

            let prompt = format!(
                "Based on this weather forecast:\n{}\n\n\
                 The itinerary will prioritize {} activities. \
                 Explain this choice to the traveller in at most two sentences, \
                 mentioning rain or extreme temperatures where relevant.",
                describe_forecast(forecast),
                preference
            );
            let rationale = self
                .reasoning
                .call(prompt, "You are a concise travel planner.".into())
                .await?;

            info!(preference = %preference, "Weather preference decided");
            ctx.set_preference(preference, Some(rationale.trim().to_string()))
        })
    }
}
