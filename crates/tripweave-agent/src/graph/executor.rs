use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use tripweave_core::config::PlannerConfig;
use tripweave_core::error::{Result, TripError};

use super::context::{Acceptance, TripContext};
use super::edge::{evaluate_condition, trip_edges, Edge};
use super::stage::{Stage, StageId};

/// A stage is attempted at most this many times.
const MAX_ATTEMPTS: u32 = 2;

/// Result of one stage attempt.
#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub stage: StageId,
    /// 1-based attempt number.
    pub attempt: u32,
    pub succeeded: bool,
    pub elapsed_ms: u64,
}

/// Result of planning one trip.
#[derive(Debug, Clone, Serialize)]
pub struct PlanOutcome {
    /// Final context, including every verdict and the itinerary.
    pub context: TripContext,
    /// Stage attempts in execution order.
    pub stage_records: Vec<StageRecord>,
    pub total_elapsed_ms: u64,
}

impl PlanOutcome {
    pub fn itinerary(&self) -> &str {
        self.context.itinerary().unwrap_or_default()
    }

    /// Number of activity search passes that ran.
    pub fn search_passes(&self) -> u32 {
        self.context.iteration_count()
    }

    pub fn was_forced(&self) -> bool {
        matches!(self.context.acceptance(), Some(Acceptance::Forced { .. }))
    }
}

/// Engine-level knobs.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_iterations: u32,
    /// Base delay before retrying a failed stage. Jittered by ±20%.
    pub retry_backoff: Duration,
    /// Overall planning deadline. `None` means unlimited.
    pub plan_timeout: Option<Duration>,
}

impl EngineSettings {
    pub fn from_config(config: &PlannerConfig) -> Self {
        Self {
            max_iterations: config.max_search_iterations,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            plan_timeout: (config.plan_timeout_secs > 0)
                .then(|| Duration::from_secs(config.plan_timeout_secs)),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&PlannerConfig::default())
    }
}

/// Walks the stage graph for one request at a time.
///
/// Starting from the parse stage, each stage runs against the shared
/// [`TripContext`], then outgoing edges are evaluated in declaration order
/// and the first match picks the next stage. The engine alone advances the
/// search pass counter and closes the loop before generation.
pub struct GraphEngine {
    stages: HashMap<StageId, Arc<dyn Stage>>,
    edges: Vec<Edge>,
    entry: StageId,
    settings: EngineSettings,
}

impl GraphEngine {
    /// Build an engine over the planning graph.
    ///
    /// Every [`StageId`] must be served by exactly one stage.
    pub fn new(stages: Vec<Arc<dyn Stage>>, settings: EngineSettings) -> Result<Self> {
        if settings.max_iterations == 0 {
            return Err(TripError::Config(
                "max search iterations must be at least 1".into(),
            ));
        }
        let mut map: HashMap<StageId, Arc<dyn Stage>> = HashMap::new();
        for stage in stages {
            let id = stage.id();
            if map.insert(id, stage).is_some() {
                return Err(TripError::Config(format!("stage '{}' registered twice", id)));
            }
        }
        if let Some(missing) = StageId::ALL.iter().find(|id| !map.contains_key(id)) {
            return Err(TripError::Config(format!("stage '{}' is not registered", missing)));
        }
        Ok(Self {
            stages: map,
            edges: trip_edges(),
            entry: StageId::Parse,
            settings,
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Plan a trip from free text.
    pub async fn plan(&self, request_text: &str) -> Result<PlanOutcome> {
        self.plan_with_cancel(request_text, CancellationToken::new())
            .await
    }

    /// Plan a trip, abandoning all outstanding work when `cancel` fires or
    /// the plan deadline passes.
    pub async fn plan_with_cancel(
        &self,
        request_text: &str,
        cancel: CancellationToken,
    ) -> Result<PlanOutcome> {
        let ctx = TripContext::new(request_text, self.settings.max_iterations);
        let span = info_span!("plan", plan_id = %ctx.plan_id());

        async move {
            let run = self.run(ctx);
            let bounded = async {
                match self.settings.plan_timeout {
                    Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| {
                        warn!(limit_secs = limit.as_secs(), "Plan deadline reached");
                        TripError::Timeout {
                            secs: limit.as_secs(),
                        }
                    })?,
                    None => run.await,
                }
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("Plan cancelled");
                    Err(TripError::Cancelled)
                }
                result = bounded => result,
            }
        }
        .instrument(span)
        .await
        .map_err(TripError::into_terminal)
    }

    async fn run(&self, mut ctx: TripContext) -> Result<PlanOutcome> {
        let start = Instant::now();
        let mut records = Vec::new();
        let mut current = self.entry;
        // parse, weather, decide, one search and gate per pass, generate
        let step_limit = 4 + 2 * self.settings.max_iterations as usize;
        let mut steps = 0usize;

        loop {
            steps += 1;
            if steps > step_limit {
                return Err(TripError::invariant(format!(
                    "stage graph exceeded {} steps",
                    step_limit
                )));
            }

            let stage = self.stages.get(&current).ok_or_else(|| {
                TripError::invariant(format!("stage '{}' not found in graph", current))
            })?;

            match current {
                StageId::ActivitySearch => {
                    let pass = ctx.begin_search_pass()?;
                    info!(pass, max = ctx.max_iterations(), "Starting activity search pass");
                }
                StageId::Generate => {
                    if let Acceptance::Forced { passes, reason } = ctx.accept()? {
                        warn!(passes, reason = %reason, "Search cap reached, generating without a passing verdict");
                    }
                }
                _ => {}
            }

            self.run_stage(stage.as_ref(), &mut ctx, &mut records).await?;

            match self.next_stage(current, &ctx)? {
                Some(next) => current = next,
                None => {
                    debug!(stage = %current, "No outgoing edges, graph complete");
                    break;
                }
            }
        }

        if ctx.itinerary().is_none() {
            return Err(TripError::invariant("graph finished without an itinerary"));
        }

        let total_elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            passes = ctx.iteration_count(),
            total_elapsed_ms,
            "Itinerary ready"
        );

        Ok(PlanOutcome {
            context: ctx,
            stage_records: records,
            total_elapsed_ms,
        })
    }

    /// Run one stage, retrying once on a retryable failure.
    async fn run_stage(
        &self,
        stage: &dyn Stage,
        ctx: &mut TripContext,
        records: &mut Vec<StageRecord>,
    ) -> Result<()> {
        let id = stage.id();
        let mut attempt = 1;

        loop {
            debug!(stage = %id, attempt, "Running stage");
            let started = Instant::now();
            let result = stage.run(ctx).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            records.push(StageRecord {
                stage: id,
                attempt,
                succeeded: result.is_ok(),
                elapsed_ms,
            });

            match result {
                Ok(()) => {
                    debug!(stage = %id, attempt, elapsed_ms, "Stage complete");
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    let backoff = jittered(self.settings.retry_backoff);
                    warn!(
                        stage = %id,
                        attempt,
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "Stage failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(stage = %id, attempt, error = %e, "Stage failed");
                    return Err(e);
                }
            }
        }
    }

    /// First matching outgoing edge, if any.
    fn next_stage(&self, from: StageId, ctx: &TripContext) -> Result<Option<StageId>> {
        for edge in self.edges.iter().filter(|e| e.from == from) {
            if evaluate_condition(edge.condition, ctx)? {
                debug!(from = %edge.from, to = %edge.to, condition = ?edge.condition, "Following edge");
                return Ok(Some(edge.to));
            }
        }
        Ok(None)
    }
}

fn jittered(base: Duration) -> Duration {
    // 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((base.as_millis() as f64 * jitter) as u64)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    use futures::future::BoxFuture;

    use super::*;
    use tripweave_core::types::{
        Deficiency, QualityVerdict, TripRequest, WeatherForecast, WeatherPreference,
    };

    /// Minimal stage that applies a fixed write, failing first if asked.
    struct FakeStage {
        id: StageId,
        failures: AtomicU32,
        failure: fn() -> TripError,
        gate_passes: bool,
    }

    impl FakeStage {
        fn ok(id: StageId) -> Arc<dyn Stage> {
            Arc::new(Self {
                id,
                failures: AtomicU32::new(0),
                failure: || TripError::upstream("fake", "down"),
                gate_passes: true,
            })
        }

        fn failing(id: StageId, times: u32, failure: fn() -> TripError) -> Arc<dyn Stage> {
            Arc::new(Self {
                id,
                failures: AtomicU32::new(times),
                failure,
                gate_passes: true,
            })
        }

        fn strict_gate() -> Arc<dyn Stage> {
            Arc::new(Self {
                id: StageId::QualityGate,
                failures: AtomicU32::new(0),
                failure: || TripError::upstream("fake", "down"),
                gate_passes: false,
            })
        }
    }

    impl Stage for FakeStage {
        fn id(&self) -> StageId {
            self.id
        }

        fn run<'a>(&'a self, ctx: &'a mut TripContext) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                if self
                    .failures
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
                {
                    return Err((self.failure)());
                }
                match self.id {
                    StageId::Parse => ctx.set_request(TripRequest::new("Lisbon", 2, ["food"])),
                    StageId::Weather => ctx.set_forecast(WeatherForecast::default()),
                    StageId::Decide => ctx.set_preference(WeatherPreference::Both, None),
                    StageId::ActivitySearch => ctx.replace_candidates("food", Vec::new()),
                    StageId::QualityGate => {
                        let verdict = if self.gate_passes {
                            QualityVerdict::pass("ok")
                        } else {
                            let mut d = BTreeMap::new();
                            d.insert("food".to_string(), Deficiency::Empty);
                            QualityVerdict::needs_more_detail("food is empty", d)
                        };
                        ctx.record_verdict(verdict)
                    }
                    StageId::Generate => ctx.set_itinerary("done".into()),
                }
            })
        }
    }

    fn settings(max_iterations: u32) -> EngineSettings {
        EngineSettings {
            max_iterations,
            retry_backoff: Duration::from_millis(10),
            plan_timeout: None,
        }
    }

    fn all_ok() -> Vec<Arc<dyn Stage>> {
        StageId::ALL.iter().map(|id| FakeStage::ok(*id)).collect()
    }

    fn replace(stages: &mut Vec<Arc<dyn Stage>>, stage: Arc<dyn Stage>) {
        stages.retain(|s| s.id() != stage.id());
        stages.push(stage);
    }

    #[test]
    fn test_missing_stage_rejected() {
        let mut stages = all_ok();
        stages.retain(|s| s.id() != StageId::Decide);
        let err = GraphEngine::new(stages, settings(2)).err().unwrap();
        assert!(matches!(err, TripError::Config(ref m) if m.contains("decide")));
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let mut stages = all_ok();
        stages.push(FakeStage::ok(StageId::Parse));
        assert!(GraphEngine::new(stages, settings(2)).is_err());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        assert!(GraphEngine::new(all_ok(), settings(0)).is_err());
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = PlannerConfig::default();
        config.plan_timeout_secs = 0;
        let s = EngineSettings::from_config(&config);
        assert!(s.plan_timeout.is_none());
        assert_eq!(s.max_iterations, 2);
        assert_eq!(s.retry_backoff, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_linear_run_visits_each_stage_once() {
        let engine = GraphEngine::new(all_ok(), settings(2)).unwrap();
        let outcome = engine.plan("anything").await.unwrap();
        let order: Vec<StageId> = outcome.stage_records.iter().map(|r| r.stage).collect();
        assert_eq!(order, StageId::ALL.to_vec());
        assert_eq!(outcome.itinerary(), "done");
        assert_eq!(outcome.search_passes(), 1);
        assert!(!outcome.was_forced());
    }

    #[tokio::test]
    async fn test_loop_stops_at_cap_and_forces_acceptance() {
        let mut stages = all_ok();
        replace(&mut stages, FakeStage::strict_gate());
        let engine = GraphEngine::new(stages, settings(3)).unwrap();
        let outcome = engine.plan("anything").await.unwrap();

        assert_eq!(outcome.search_passes(), 3);
        let searches = outcome
            .stage_records
            .iter()
            .filter(|r| r.stage == StageId::ActivitySearch)
            .count();
        assert_eq!(searches, 3);
        assert_eq!(outcome.context.verdicts().len(), 3);
        assert!(outcome.was_forced());
        assert_eq!(
            outcome.stage_records.last().map(|r| r.stage),
            Some(StageId::Generate)
        );
    }

    #[tokio::test]
    async fn test_retryable_failure_retried_once() {
        let mut stages = all_ok();
        replace(
            &mut stages,
            FakeStage::failing(StageId::Weather, 1, || TripError::UpstreamTimeout {
                service: "weather".into(),
                secs: 10,
            }),
        );
        let engine = GraphEngine::new(stages, settings(2)).unwrap();
        let outcome = engine.plan("anything").await.unwrap();

        let weather: Vec<&StageRecord> = outcome
            .stage_records
            .iter()
            .filter(|r| r.stage == StageId::Weather)
            .collect();
        assert_eq!(weather.len(), 2);
        assert!(!weather[0].succeeded);
        assert_eq!(weather[1].attempt, 2);
        assert!(weather[1].succeeded);
    }

    #[tokio::test]
    async fn test_second_failure_is_terminal() {
        let mut stages = all_ok();
        replace(
            &mut stages,
            FakeStage::failing(StageId::Weather, 2, || TripError::UpstreamTimeout {
                service: "weather".into(),
                secs: 10,
            }),
        );
        let engine = GraphEngine::new(stages, settings(2)).unwrap();
        let err = engine.plan("anything").await.unwrap_err();
        assert!(matches!(err, TripError::UpstreamUnavailable { ref service, .. } if service == "weather"));
    }

    #[tokio::test]
    async fn test_non_retryable_failure_not_retried() {
        let mut stages = all_ok();
        let parse = FakeStage::failing(StageId::Parse, 1, || {
            TripError::InputParse("no city".into())
        });
        replace(&mut stages, parse);
        let engine = GraphEngine::new(stages, settings(2)).unwrap();
        let err = engine.plan("anything").await.unwrap_err();
        assert!(matches!(err, TripError::InputParse(_)));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let engine = GraphEngine::new(all_ok(), settings(2)).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let err = engine.plan_with_cancel("anything", token).await.unwrap_err();
        assert!(matches!(err, TripError::Cancelled));
    }
}
