use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use tripweave_core::error::{Result, TripError};
use tripweave_core::types::{
    ActivityCandidate, Deficiency, QualityVerdict, TripRequest, WeatherForecast,
    WeatherPreference,
};

/// How the activity research was accepted for generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Acceptance {
    /// The quality gate passed.
    Validated,
    /// The search cap was reached without a pass.
    Forced { passes: u32, reason: String },
}

/// Planning state threaded through every stage of one request.
///
/// Created once per request and owned by the engine. Stages receive it by
/// mutable borrow for the duration of a single call; each field is set by
/// exactly one stage, and the setters reject out-of-order writes.
#[derive(Debug, Clone, Serialize)]
pub struct TripContext {
    plan_id: String,
    request_text: String,
    request: Option<TripRequest>,
    forecast: Option<WeatherForecast>,
    preference: Option<WeatherPreference>,
    preference_rationale: Option<String>,
    candidates: BTreeMap<String, Vec<ActivityCandidate>>,
    iteration_count: u32,
    max_iterations: u32,
    verdicts: Vec<QualityVerdict>,
    acceptance: Option<Acceptance>,
    itinerary: Option<String>,
}

impl TripContext {
    pub fn new(request_text: impl Into<String>, max_iterations: u32) -> Self {
        Self {
            plan_id: Uuid::new_v4().to_string(),
            request_text: request_text.into(),
            request: None,
            forecast: None,
            preference: None,
            preference_rationale: None,
            candidates: BTreeMap::new(),
            iteration_count: 0,
            max_iterations,
            verdicts: Vec::new(),
            acceptance: None,
            itinerary: None,
        }
    }

    pub fn plan_id(&self) -> &str {
        &self.plan_id
    }

    pub fn request_text(&self) -> &str {
        &self.request_text
    }

    // ── Request ───────────────────────────────────────────────

    pub fn request(&self) -> Result<&TripRequest> {
        self.request
            .as_ref()
            .ok_or_else(|| TripError::invariant("trip request read before parsing"))
    }

    pub fn set_request(&mut self, request: TripRequest) -> Result<()> {
        if self.request.is_some() {
            return Err(TripError::invariant("trip request set twice"));
        }
        if request.interests.is_empty() {
            return Err(TripError::invariant("trip request has no interests"));
        }
        self.request = Some(request);
        Ok(())
    }

    // ── Forecast ──────────────────────────────────────────────

    pub fn forecast(&self) -> Result<&WeatherForecast> {
        self.forecast
            .as_ref()
            .ok_or_else(|| TripError::invariant("forecast read before the weather stage"))
    }

    pub fn set_forecast(&mut self, forecast: WeatherForecast) -> Result<()> {
        self.request()?;
        if self.forecast.is_some() {
            return Err(TripError::invariant("forecast set twice"));
        }
        self.forecast = Some(forecast);
        Ok(())
    }

    // ── Preference ────────────────────────────────────────────

    pub fn preference(&self) -> Result<WeatherPreference> {
        self.preference
            .ok_or_else(|| TripError::invariant("weather preference read before the decision stage"))
    }

    pub fn preference_rationale(&self) -> Option<&str> {
        self.preference_rationale.as_deref()
    }

    /// Set the weather preference. Allowed exactly once, after the forecast.
    pub fn set_preference(
        &mut self,
        preference: WeatherPreference,
        rationale: Option<String>,
    ) -> Result<()> {
        self.forecast()?;
        if self.preference.is_some() {
            return Err(TripError::invariant("weather preference set twice"));
        }
        self.preference = Some(preference);
        self.preference_rationale = rationale.filter(|r| !r.trim().is_empty());
        Ok(())
    }

    // ── Candidates ────────────────────────────────────────────

    pub fn candidates(&self) -> &BTreeMap<String, Vec<ActivityCandidate>> {
        &self.candidates
    }

    pub fn candidates_for(&self, category: &str) -> &[ActivityCandidate] {
        self.candidates
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Replace (never append) the candidate list of one category.
    pub fn replace_candidates(
        &mut self,
        category: impl Into<String>,
        candidates: Vec<ActivityCandidate>,
    ) -> Result<()> {
        self.preference()?;
        let category = category.into();
        if !self.request()?.interests.contains(&category) {
            return Err(TripError::invariant(format!(
                "candidates for unrequested category '{}'",
                category
            )));
        }
        self.candidates.insert(category, candidates);
        Ok(())
    }

    // ── Search loop ───────────────────────────────────────────

    /// Number of activity search passes dispatched so far.
    pub fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Count one more search pass. Only the engine calls this.
    pub(crate) fn begin_search_pass(&mut self) -> Result<u32> {
        if self.iteration_count >= self.max_iterations {
            return Err(TripError::invariant(format!(
                "search pass {} exceeds the cap of {}",
                self.iteration_count + 1,
                self.max_iterations
            )));
        }
        self.iteration_count += 1;
        Ok(self.iteration_count)
    }

    pub fn verdicts(&self) -> &[QualityVerdict] {
        &self.verdicts
    }

    pub fn latest_verdict(&self) -> Option<&QualityVerdict> {
        self.verdicts.last()
    }

    pub fn record_verdict(&mut self, verdict: QualityVerdict) -> Result<()> {
        if self.iteration_count == 0 {
            return Err(TripError::invariant("quality verdict before any search pass"));
        }
        self.verdicts.push(verdict);
        Ok(())
    }

    /// Deficiencies to refine on the next search pass, if the latest
    /// verdict asked for more detail.
    pub fn refinement_hints(&self) -> Option<&BTreeMap<String, Deficiency>> {
        self.latest_verdict()
            .filter(|v| !v.is_pass())
            .map(|v| &v.deficiencies)
    }

    // ── Finalization ──────────────────────────────────────────

    pub fn acceptance(&self) -> Option<&Acceptance> {
        self.acceptance.as_ref()
    }

    /// Close the search loop: accept after a pass, or force acceptance once
    /// the cap is reached.
    pub(crate) fn accept(&mut self) -> Result<&Acceptance> {
        let verdict = self
            .latest_verdict()
            .ok_or_else(|| TripError::invariant("generation requested before any quality verdict"))?;
        let acceptance = if verdict.is_pass() {
            Acceptance::Validated
        } else if self.iteration_count >= self.max_iterations {
            Acceptance::Forced {
                passes: self.iteration_count,
                reason: verdict.reason.clone(),
            }
        } else {
            return Err(TripError::invariant(
                "generation requested before a pass or the search cap",
            ));
        };
        Ok(&*self.acceptance.insert(acceptance))
    }

    pub fn itinerary(&self) -> Option<&str> {
        self.itinerary.as_deref()
    }

    pub fn set_itinerary(&mut self, itinerary: String) -> Result<()> {
        if self.acceptance.is_none() {
            return Err(TripError::invariant("itinerary produced before acceptance"));
        }
        self.itinerary = Some(itinerary);
        Ok(())
    }
}
