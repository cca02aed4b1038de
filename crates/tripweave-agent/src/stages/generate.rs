use std::fmt::Write as _;

use futures::future::BoxFuture;
use tracing::info;

use tripweave_core::error::{Result, TripError};
use tripweave_core::types::{ActivityCandidate, WeatherPreference};

use super::decide::{classify_day, DayClass};
use crate::graph::{Acceptance, Stage, StageId, TripContext};

const SNIPPET_CHARS: usize = 140;

fn title_case(category: &str) -> String {
    let mut chars = category.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{}...", cut.trim_end())
}

fn activity_line(category: &str, candidate: &ActivityCandidate) -> String {
    if candidate.snippet.is_empty() {
        format!("- **{}**: {}", title_case(category), candidate.name)
    } else {
        format!(
            "- **{}**: {}: {}",
            title_case(category),
            candidate.name,
            truncate(&candidate.snippet, SNIPPET_CHARS)
        )
    }
}

/// Render the itinerary text for a finalized context.
///
/// Output depends only on the context: categories iterate in sorted order
/// and each day rotates through the weather-compatible candidates by index.
pub fn render(ctx: &TripContext, threshold: f32) -> Result<String> {
    let acceptance = ctx
        .acceptance()
        .ok_or_else(|| TripError::invariant("itinerary rendered before acceptance"))?;
    let request = ctx.request()?;
    let forecast = ctx.forecast()?;
    let preference = ctx.preference()?;

    let mut out = String::new();
    let _ = writeln!(out, "# {}-Day Itinerary for {}", request.num_days, request.city);
    let _ = writeln!(out);

    if let Acceptance::Forced { passes, reason } = acceptance {
        let _ = writeln!(
            out,
            "> **Caveat:** activity research did not pass the quality check after {} search \
             pass(es) ({}). Some suggestions may be generic or missing.",
            passes, reason
        );
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "**Weather preference:** {}", preference);
    if let Some(rationale) = ctx.preference_rationale() {
        let _ = writeln!(out, "{}", rationale);
    }

    let compatible: Vec<(&String, Vec<&ActivityCandidate>)> = request
        .interests
        .iter()
        .map(|category| {
            let fitting = ctx
                .candidates_for(category)
                .iter()
                .filter(|c| c.suitability.fits(preference))
                .collect();
            (category, fitting)
        })
        .collect();
    let indoor: Vec<&ActivityCandidate> = ctx
        .candidates()
        .values()
        .flatten()
        .filter(|c| c.suitability == WeatherPreference::Indoor)
        .collect();

    for index in 0..request.num_days as usize {
        let _ = writeln!(out);
        let day = forecast.day(index);
        match day {
            Some(d) => {
                let _ = writeln!(
                    out,
                    "## Day {} ({}): {}, {:.0}-{:.0}°C, {:.0}% chance of precipitation",
                    index + 1,
                    d.date,
                    d.condition,
                    d.temp_min_c,
                    d.temp_max_c,
                    d.precipitation_probability * 100.0
                );
            }
            None => {
                let _ = writeln!(out, "## Day {} (forecast unavailable)", index + 1);
            }
        }

        for (category, fitting) in &compatible {
            if fitting.is_empty() {
                let _ = writeln!(
                    out,
                    "- **{}**: no weather-suitable suggestions found",
                    title_case(category)
                );
            } else {
                let pick = fitting[index % fitting.len()];
                let _ = writeln!(out, "{}", activity_line(category, pick));
            }
        }

        let wet = day.is_some_and(|d| classify_day(d, threshold) == DayClass::Wet);
        if wet && preference != WeatherPreference::Indoor {
            if indoor.is_empty() {
                let _ = writeln!(out, "- Backup plan: keep an indoor option in mind in case of rain.");
            } else {
                let backup = indoor[index % indoor.len()];
                let _ = writeln!(out, "- Backup plan: if it rains, head to {}.", backup.name);
            }
        }
    }

    Ok(out)
}

/// Formats the finalized context into itinerary text. Makes no external calls.
pub struct GenerateStage {
    threshold: f32,
}

impl GenerateStage {
    pub fn new(precipitation_threshold: f32) -> Self {
        Self {
            threshold: precipitation_threshold,
        }
    }
}

impl Stage for GenerateStage {
    fn id(&self) -> StageId {
        StageId::Generate
    }

    fn run<'a>(&'a self, ctx: &'a mut TripContext) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let text = render(ctx, self.threshold)?;
            info!(bytes = text.len(), "Itinerary generated");
            ctx.set_itinerary(text)
        })
    }
}
