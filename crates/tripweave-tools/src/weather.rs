use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use futures::future::BoxFuture;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use tripweave_core::config::WeatherConfig;
use tripweave_core::error::{Result, TripError};
use tripweave_core::traits::WeatherProvider;
use tripweave_core::types::{DailyForecast, WeatherCondition};

const SERVICE: &str = "weather";

/// The free forecast endpoint covers five days in 3-hour steps.
pub const FORECAST_HORIZON_DAYS: u32 = 5;
const STEPS_PER_DAY: u32 = 8;

/// OpenWeatherMap 5-day / 3-hour forecast client.
pub struct OpenWeatherClient {
    api_key: String,
    base_url: String,
    timeout_secs: u64,
    http: reqwest::Client,
}

impl OpenWeatherClient {
    pub fn new(config: &WeatherConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| TripError::Config("weather.api_key is not set".into()))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Ok(Self {
            api_key,
            base_url: config.base_url.clone(),
            timeout_secs: config.timeout_secs,
            http,
        })
    }
}

#[derive(Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    list: Vec<ForecastEntry>,
    #[serde(default)]
    city: Option<CityInfo>,
}

#[derive(Deserialize)]
struct CityInfo {
    /// Offset from UTC in seconds.
    #[serde(default)]
    timezone: i64,
}

#[derive(Deserialize)]
struct ForecastEntry {
    dt: i64,
    main: EntryMain,
    #[serde(default)]
    weather: Vec<EntryWeather>,
    #[serde(default)]
    pop: f32,
}

#[derive(Deserialize)]
struct EntryMain {
    temp: f32,
    #[serde(default)]
    temp_min: Option<f32>,
    #[serde(default)]
    temp_max: Option<f32>,
}

#[derive(Deserialize)]
struct EntryWeather {
    main: String,
}

struct DayAccumulator {
    condition: WeatherCondition,
    pop: f32,
    min: f32,
    max: f32,
}

/// Fold 3-hour forecast entries into per-day records, keyed by the city's
/// local date. Returns at most `days` records.
pub fn parse_forecast(body: &str, days: u32) -> Result<Vec<DailyForecast>> {
    let parsed: ForecastResponse =
        serde_json::from_str(body).map_err(|e| TripError::malformed_body(SERVICE, e))?;
    let offset = parsed.city.map(|c| c.timezone).unwrap_or(0);

    let mut by_date: BTreeMap<NaiveDate, DayAccumulator> = BTreeMap::new();
    for entry in parsed.list {
        let Some(local) = DateTime::<Utc>::from_timestamp(entry.dt + offset, 0) else {
            continue;
        };
        let condition = entry
            .weather
            .first()
            .map(|w| WeatherCondition::from_provider(&w.main))
            .unwrap_or(WeatherCondition::Unknown);
        let low = entry.main.temp_min.unwrap_or(entry.main.temp);
        let high = entry.main.temp_max.unwrap_or(entry.main.temp);
        let pop = entry.pop.clamp(0.0, 1.0);

        by_date
            .entry(local.date_naive())
            .and_modify(|day| {
                // Unknown only wins when nothing else was reported.
                if day.condition == WeatherCondition::Unknown
                    || (condition != WeatherCondition::Unknown && condition > day.condition)
                {
                    day.condition = condition;
                }
                day.pop = day.pop.max(pop);
                day.min = day.min.min(low);
                day.max = day.max.max(high);
            })
            .or_insert(DayAccumulator {
                condition,
                pop,
                min: low,
                max: high,
            });
    }

    Ok(by_date
        .into_iter()
        .take(days as usize)
        .map(|(date, day)| DailyForecast {
            date,
            condition: day.condition,
            precipitation_probability: day.pop,
            temp_min_c: day.min,
            temp_max_c: day.max,
        })
        .collect())
}

impl WeatherProvider for OpenWeatherClient {
    fn name(&self) -> &str {
        "openweathermap"
    }

    fn fetch(&self, city: String, days: u32) -> BoxFuture<'_, Result<Vec<DailyForecast>>> {
        Box::pin(async move {
            let steps = (days.min(FORECAST_HORIZON_DAYS) * STEPS_PER_DAY).to_string();
            let resp = self
                .http
                .get(&self.base_url)
                .query(&[
                    ("q", city.as_str()),
                    ("appid", self.api_key.as_str()),
                    ("units", "metric"),
                    ("cnt", steps.as_str()),
                ])
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        TripError::UpstreamTimeout {
                            service: SERVICE.into(),
                            secs: self.timeout_secs,
                        }
                    } else {
                        TripError::upstream(SERVICE, e.to_string())
                    }
                })?;

            let status = resp.status();
            let body = resp
                .text()
                .await
                .map_err(|e| TripError::upstream(SERVICE, e.to_string()))?;

            match status {
                s if s.is_success() => {}
                StatusCode::NOT_FOUND => {
                    return Err(TripError::NotFound {
                        service: SERVICE.into(),
                        what: format!("city '{}'", city),
                    })
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    return Err(TripError::RateLimited {
                        service: SERVICE.into(),
                    })
                }
                s => {
                    return Err(TripError::Http {
                        service: SERVICE.into(),
                        message: format!("HTTP {}: {}", s, body),
                    })
                }
            }

            let forecast = parse_forecast(&body, days)?;
            if forecast.is_empty() {
                return Err(TripError::NotFound {
                    service: SERVICE.into(),
                    what: format!("forecast for '{}'", city),
                });
            }
            debug!(city = %city, days = forecast.len(), "Fetched forecast");
            Ok(forecast)
        })
    }
}
