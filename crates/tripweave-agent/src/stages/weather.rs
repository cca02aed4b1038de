use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, warn};

use tripweave_core::error::{Result, TripError};
use tripweave_core::traits::WeatherProvider;
use tripweave_core::types::WeatherForecast;

use crate::graph::{Stage, StageId, TripContext};

/// Fetches the daily forecast for the requested city.
pub struct WeatherStage {
    provider: Arc<dyn WeatherProvider>,
}

impl WeatherStage {
    pub fn new(provider: Arc<dyn WeatherProvider>) -> Self {
        Self { provider }
    }
}

impl Stage for WeatherStage {
    fn id(&self) -> StageId {
        StageId::Weather
    }

    fn run<'a>(&'a self, ctx: &'a mut TripContext) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let request = ctx.request()?;
            let (city, num_days) = (request.city.clone(), request.num_days);

            let mut days = self.provider.fetch(city.clone(), num_days).await?;
            if days.is_empty() {
                return Err(TripError::NotFound {
                    service: self.provider.name().to_string(),
                    what: format!("forecast for {}", city),
                });
            }
            days.sort_by_key(|d| d.date);
            days.truncate(num_days as usize);
            if days.len() < num_days as usize {
                warn!(
                    covered = days.len(),
                    requested = num_days,
                    "Forecast covers only part of the trip"
                );
            }

            info!(
                provider = self.provider.name(),
                days = days.len(),
                "Forecast fetched"
            );
            ctx.set_forecast(WeatherForecast::new(days))
        })
    }
}
