use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// What the traveller asked for, as understood by the parse stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRequest {
    pub city: String,
    pub num_days: u32,
    /// Interest categories. Never empty once parsing has finished.
    pub interests: BTreeSet<String>,
}

impl TripRequest {
    pub fn new<I, S>(city: impl Into<String>, num_days: u32, interests: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            city: city.into(),
            num_days,
            interests: interests.into_iter().map(Into::into).collect(),
        }
    }
}

/// Coarse weather condition, ordered from mildest to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeatherCondition {
    Clear,
    Clouds,
    Fog,
    Drizzle,
    Rain,
    Snow,
    Thunderstorm,
    Unknown,
}

impl WeatherCondition {
    /// Map an OpenWeatherMap `weather[].main` group name.
    pub fn from_provider(main: &str) -> Self {
        match main.trim().to_ascii_lowercase().as_str() {
            "clear" => Self::Clear,
            "clouds" => Self::Clouds,
            "mist" | "fog" | "haze" | "smoke" | "dust" | "sand" | "ash" => Self::Fog,
            "drizzle" => Self::Drizzle,
            "rain" | "squall" => Self::Rain,
            "snow" => Self::Snow,
            "thunderstorm" | "tornado" => Self::Thunderstorm,
            _ => Self::Unknown,
        }
    }

    /// Conditions that spoil outdoor plans regardless of the reported probability.
    pub fn is_precipitation(&self) -> bool {
        matches!(self, Self::Rain | Self::Snow | Self::Thunderstorm)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::Clouds => "Clouds",
            Self::Fog => "Fog",
            Self::Drizzle => "Drizzle",
            Self::Rain => "Rain",
            Self::Snow => "Snow",
            Self::Thunderstorm => "Thunderstorm",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for WeatherCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One day of forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub condition: WeatherCondition,
    /// Probability of precipitation, 0.0–1.0.
    pub precipitation_probability: f32,
    pub temp_min_c: f32,
    pub temp_max_c: f32,
}

/// Ordered per-day forecast for the trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherForecast {
    pub days: Vec<DailyForecast>,
}

impl WeatherForecast {
    pub fn new(days: Vec<DailyForecast>) -> Self {
        Self { days }
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Forecast for the zero-based trip day, if the provider covered it.
    pub fn day(&self, index: usize) -> Option<&DailyForecast> {
        self.days.get(index)
    }
}

/// Whether the itinerary should favour indoor or outdoor activities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WeatherPreference {
    Indoor,
    Outdoor,
    Both,
}

impl WeatherPreference {
    /// Whether an activity tagged `self` fits an itinerary that prefers `preference`.
    pub fn fits(&self, preference: WeatherPreference) -> bool {
        match preference {
            WeatherPreference::Both => true,
            other => *self == other || *self == WeatherPreference::Both,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Indoor => "INDOOR",
            Self::Outdoor => "OUTDOOR",
            Self::Both => "BOTH",
        }
    }
}

impl std::fmt::Display for WeatherPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw hit from the search collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

impl SearchHit {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        snippet: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
        }
    }
}

/// A venue or activity found for one interest category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityCandidate {
    pub name: String,
    pub category: String,
    pub snippet: String,
    pub url: String,
    pub suitability: WeatherPreference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictStatus {
    Pass,
    NeedsMoreDetail,
}

/// Why a category failed the quality bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Deficiency {
    /// No candidates at all (including a failed sub-query).
    Empty,
    /// Some candidates, fewer than the minimum.
    TooFew { found: usize, required: usize },
    /// Enough candidates, but too few name a specific place.
    Generic { specific: usize, required: usize },
}

impl std::fmt::Display for Deficiency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Deficiency::Empty => write!(f, "no candidates"),
            Deficiency::TooFew { found, required } => {
                write!(f, "{} of {} candidates", found, required)
            }
            Deficiency::Generic { specific, required } => {
                write!(f, "{} of {} specific names", specific, required)
            }
        }
    }
}

/// Outcome of one quality gate evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub status: VerdictStatus,
    pub reason: String,
    /// Deficient categories. Empty exactly when `status` is `Pass`.
    pub deficiencies: BTreeMap<String, Deficiency>,
}

impl QualityVerdict {
    pub fn pass(reason: impl Into<String>) -> Self {
        Self {
            status: VerdictStatus::Pass,
            reason: reason.into(),
            deficiencies: BTreeMap::new(),
        }
    }

    pub fn needs_more_detail(
        reason: impl Into<String>,
        deficiencies: BTreeMap<String, Deficiency>,
    ) -> Self {
        Self {
            status: VerdictStatus::NeedsMoreDetail,
            reason: reason.into(),
            deficiencies,
        }
    }

    pub fn is_pass(&self) -> bool {
        self.status == VerdictStatus::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_from_provider() {
        assert_eq!(WeatherCondition::from_provider("Clear"), WeatherCondition::Clear);
        assert_eq!(WeatherCondition::from_provider("Rain"), WeatherCondition::Rain);
        assert_eq!(WeatherCondition::from_provider("Mist"), WeatherCondition::Fog);
        assert_eq!(
            WeatherCondition::from_provider("Thunderstorm"),
            WeatherCondition::Thunderstorm
        );
        assert_eq!(WeatherCondition::from_provider("???"), WeatherCondition::Unknown);
    }

    #[test]
    fn test_condition_severity_order() {
        assert!(WeatherCondition::Rain > WeatherCondition::Clouds);
        assert!(WeatherCondition::Thunderstorm > WeatherCondition::Snow);
        assert!(WeatherCondition::Clear < WeatherCondition::Fog);
    }

    #[test]
    fn test_preference_fits() {
        use WeatherPreference::*;
        assert!(Indoor.fits(Both));
        assert!(Outdoor.fits(Both));
        assert!(Indoor.fits(Indoor));
        assert!(Both.fits(Indoor));
        assert!(!Outdoor.fits(Indoor));
        assert!(!Indoor.fits(Outdoor));
    }

    #[test]
    fn test_preference_serializes_uppercase() {
        let json = serde_json::to_string(&WeatherPreference::Indoor).unwrap();
        assert_eq!(json, "\"INDOOR\"");
        assert_eq!(WeatherPreference::Both.to_string(), "BOTH");
    }

    #[test]
    fn test_trip_request_dedups_interests() {
        let req = TripRequest::new("Warsaw", 5, ["food", "museums", "food"]);
        assert_eq!(req.interests.len(), 2);
        assert!(req.interests.contains("museums"));
    }

    #[test]
    fn test_verdict_constructors() {
        assert!(QualityVerdict::pass("ok").is_pass());
        let mut d = BTreeMap::new();
        d.insert("parks".to_string(), Deficiency::Empty);
        let v = QualityVerdict::needs_more_detail("thin", d);
        assert!(!v.is_pass());
        assert_eq!(v.deficiencies["parks"], Deficiency::Empty);
    }
}
