use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::{DailyForecast, SearchHit};

/// Reasoning collaborator: a single prompt/response round trip.
pub trait ReasoningClient: Send + Sync + 'static {
    /// Answer `prompt`, with `context` supplied as background instructions.
    ///
    /// Fails with an upstream error on timeout or outage.
    fn call(&self, prompt: String, context: String) -> BoxFuture<'_, Result<String>>;
}

/// Weather collaborator.
pub trait WeatherProvider: Send + Sync + 'static {
    /// Provider name used in logs and errors.
    fn name(&self) -> &str;

    /// Daily forecast for `city`, at most `days` records, ordered by date.
    ///
    /// Fails with `NotFound` for unknown cities and `UpstreamTimeout` on timeout.
    fn fetch(&self, city: String, days: u32) -> BoxFuture<'_, Result<Vec<DailyForecast>>>;
}

/// Web search collaborator.
pub trait SearchProvider: Send + Sync + 'static {
    /// Provider name used in logs and errors.
    fn name(&self) -> &str;

    /// Run one search. Fails with `RateLimited` or `UpstreamTimeout`.
    fn search(&self, query: String) -> BoxFuture<'_, Result<Vec<SearchHit>>>;
}
