//! Shared test utilities: scripted collaborators and forecast fixtures.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{Days, NaiveDate};
use futures::future::BoxFuture;

use tripweave_core::error::{Result, TripError};
use tripweave_core::traits::{ReasoningClient, SearchProvider, WeatherProvider};
use tripweave_core::types::{DailyForecast, SearchHit, WeatherCondition};

/// One scripted collaborator reply.
#[derive(Debug, Clone)]
pub enum MockReply<T> {
    Ok(T),
    Unavailable,
    Timeout,
    RateLimited,
    NotFound,
    /// Sleep for the given duration, then answer.
    Delayed(Duration, T),
}

impl<T> MockReply<T> {
    async fn resolve(self, service: &str) -> Result<T> {
        match self {
            MockReply::Ok(value) => Ok(value),
            MockReply::Delayed(delay, value) => {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
            MockReply::Unavailable => Err(TripError::upstream(service, "mock outage")),
            MockReply::Timeout => Err(TripError::UpstreamTimeout {
                service: service.into(),
                secs: 1,
            }),
            MockReply::RateLimited => Err(TripError::RateLimited {
                service: service.into(),
            }),
            MockReply::NotFound => Err(TripError::NotFound {
                service: service.into(),
                what: "mock".into(),
            }),
        }
    }
}

/// Replies keyed by a substring of the request. The last reply of a
/// sequence repeats forever.
struct Script<T> {
    rules: Vec<(String, VecDeque<MockReply<T>>)>,
}

impl<T: Clone> Script<T> {
    fn new() -> Self {
        Self { rules: Vec::new() }
    }

    fn push(&mut self, needle: &str, replies: Vec<MockReply<T>>) {
        self.rules.push((needle.to_string(), replies.into()));
    }

    fn next(&mut self, request: &str) -> Option<MockReply<T>> {
        let (_, replies) = self
            .rules
            .iter_mut()
            .find(|(needle, _)| request.contains(needle.as_str()))?;
        if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        }
    }
}

// ── Reasoning ─────────────────────────────────────────────────

/// Reasoning collaborator answering from a script.
pub struct MockReasoning {
    script: Mutex<Script<String>>,
    default: String,
    prompts: Mutex<Vec<String>>,
}

impl MockReasoning {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script::new()),
            default: "OK".to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Reply used when no rule matches the prompt.
    pub fn with_default(mut self, text: impl Into<String>) -> Self {
        self.default = text.into();
        self
    }

    /// Always answer `text` to prompts containing `needle`.
    pub fn respond_to(self, needle: &str, text: impl Into<String>) -> Self {
        self.script_for(needle, vec![MockReply::Ok(text.into())])
    }

    /// Answer prompts containing `needle` with `replies`, in order.
    pub fn script_for(self, needle: &str, replies: Vec<MockReply<String>>) -> Self {
        self.script.lock().unwrap().push(needle, replies);
        self
    }

    /// Every prompt seen so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Number of prompts containing `needle`.
    pub fn calls_matching(&self, needle: &str) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains(needle))
            .count()
    }
}

impl Default for MockReasoning {
    fn default() -> Self {
        Self::new()
    }
}

impl ReasoningClient for MockReasoning {
    fn call(&self, prompt: String, _context: String) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            self.prompts.lock().unwrap().push(prompt.clone());
            let reply = self
                .script
                .lock()
                .unwrap()
                .next(&prompt)
                .unwrap_or_else(|| MockReply::Ok(self.default.clone()));
            reply.resolve("reasoning").await
        })
    }
}

// ── Weather ───────────────────────────────────────────────────

/// Weather collaborator serving a fixed forecast, optionally failing first.
pub struct MockWeather {
    replies: Mutex<VecDeque<MockReply<Vec<DailyForecast>>>>,
    fallback: Vec<DailyForecast>,
    calls: AtomicUsize,
}

impl MockWeather {
    pub fn new(days: Vec<DailyForecast>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: days,
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue replies served before the fixed forecast.
    pub fn with_replies(self, replies: Vec<MockReply<Vec<DailyForecast>>>) -> Self {
        self.replies.lock().unwrap().extend(replies);
        self
    }

    /// Fail the first `n` calls with a timeout.
    pub fn failing_first(self, n: usize) -> Self {
        self.with_replies(vec![MockReply::Timeout; n])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl WeatherProvider for MockWeather {
    fn name(&self) -> &str {
        "mock-weather"
    }

    fn fetch(&self, _city: String, days: u32) -> BoxFuture<'_, Result<Vec<DailyForecast>>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let queued = self.replies.lock().unwrap().pop_front();
            let forecast = match queued {
                Some(reply) => reply.resolve("weather").await?,
                None => self.fallback.clone(),
            };
            Ok(forecast.into_iter().take(days as usize).collect())
        })
    }
}

// ── Search ────────────────────────────────────────────────────

/// Search collaborator answering from a script keyed by query substring.
pub struct MockSearch {
    script: Mutex<Script<Vec<SearchHit>>>,
    queries: Mutex<Vec<String>>,
    completed: AtomicUsize,
}

impl MockSearch {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script::new()),
            queries: Mutex::new(Vec::new()),
            completed: AtomicUsize::new(0),
        }
    }

    /// Queries containing `needle` return `hits`.
    pub fn with_hits(self, needle: &str, hits: Vec<SearchHit>) -> Self {
        self.script_for(needle, vec![MockReply::Ok(hits)])
    }

    /// Queries containing `needle` are answered by `replies`, in order.
    pub fn script_for(self, needle: &str, replies: Vec<MockReply<Vec<SearchHit>>>) -> Self {
        self.script.lock().unwrap().push(needle, replies);
        self
    }

    /// Queries containing `needle` fail with a rate limit.
    pub fn failing(self, needle: &str) -> Self {
        self.script_for(needle, vec![MockReply::RateLimited])
    }

    /// Every query seen so far, in arrival order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    /// Number of searches that ran to completion (successfully or not).
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

impl Default for MockSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchProvider for MockSearch {
    fn name(&self) -> &str {
        "mock-search"
    }

    fn search(&self, query: String) -> BoxFuture<'_, Result<Vec<SearchHit>>> {
        Box::pin(async move {
            self.queries.lock().unwrap().push(query.clone());
            let reply = self
                .script
                .lock()
                .unwrap()
                .next(&query)
                .unwrap_or(MockReply::Ok(Vec::new()));
            let result = reply.resolve("search").await;
            self.completed.fetch_add(1, Ordering::SeqCst);
            result
        })
    }
}

// ── Fixtures ──────────────────────────────────────────────────

/// First forecast day used by the fixtures.
pub fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
}

/// A forecast day `offset` days after [`start_date`].
pub fn day(offset: u64, condition: WeatherCondition, pop: f32) -> DailyForecast {
    DailyForecast {
        date: start_date().checked_add_days(Days::new(offset)).unwrap(),
        condition,
        precipitation_probability: pop,
        temp_min_c: 12.0,
        temp_max_c: 20.0,
    }
}

/// Consecutive forecast days from `(condition, pop)` pairs.
pub fn forecast(days: &[(WeatherCondition, f32)]) -> Vec<DailyForecast> {
    days.iter()
        .enumerate()
        .map(|(i, (condition, pop))| day(i as u64, *condition, *pop))
        .collect()
}

/// `n` dry, sunny days.
pub fn sunny(n: usize) -> Vec<DailyForecast> {
    forecast(&vec![(WeatherCondition::Clear, 0.0); n])
}

/// `n` rainy days.
pub fn rainy(n: usize) -> Vec<DailyForecast> {
    forecast(&vec![(WeatherCondition::Rain, 0.9); n])
}

/// Search hits with the given venue names.
pub fn hits(names: &[&str]) -> Vec<SearchHit> {
    names
        .iter()
        .map(|name| {
            SearchHit::new(
                *name,
                format!("https://example.com/{}", name.to_lowercase().replace(' ', "-")),
                format!("{} is a local favourite.", name),
            )
        })
        .collect()
}
