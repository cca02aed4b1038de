use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use futures::future::BoxFuture;
use regex::Regex;
use tracing::{debug, info};

use tripweave_core::config::PlannerConfig;
use tripweave_core::error::{Result, TripError};
use tripweave_core::traits::ReasoningClient;
use tripweave_core::types::TripRequest;

use crate::graph::{Stage, StageId, TripContext};

/// Interest vocabulary: surface words mapped to canonical categories.
const INTEREST_WORDS: &[(&str, &[&str])] = &[
    ("museums", &["museum", "museums"]),
    ("art", &["art", "arts", "gallery", "galleries"]),
    ("food", &["food", "foodie", "cuisine", "eating", "dining"]),
    ("restaurants", &["restaurant", "restaurants"]),
    ("cafes", &["cafe", "cafes", "café", "cafés", "coffee"]),
    ("bars", &["bar", "bars", "pub", "pubs", "nightlife", "cocktails"]),
    ("parks", &["park", "parks", "garden", "gardens"]),
    ("hiking", &["hike", "hikes", "hiking", "trail", "trails", "trekking"]),
    ("beaches", &["beach", "beaches"]),
    ("shopping", &["shopping", "shops", "market", "markets"]),
    ("history", &["history", "historic", "historical"]),
    ("architecture", &["architecture", "church", "churches", "castle", "castles"]),
    ("sightseeing", &["sightseeing", "sights", "landmarks"]),
    ("temples", &["temple", "temples", "shrine", "shrines"]),
    ("music", &["music", "concert", "concerts", "jazz"]),
    ("theater", &["theater", "theatre", "theaters", "theatres", "opera"]),
];

/// Capitalized words that follow "to"/"in" without naming a place.
const NOT_A_CITY: &[&str] = &[
    "I", "The", "A", "An", "My", "Our", "We", "Me", "Please", "Day", "Days", "Week", "Weeks",
    "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday", "January",
    "February", "March", "April", "May", "June", "July", "August", "September", "October",
    "November", "December", "Spring", "Summer", "Autumn", "Fall", "Winter",
];

/// Prepositions and connectives, compared case-insensitively, that end a
/// place name in title-case text ("Trip To Warsaw For 5 Days").
const CONNECTIVES: &[&str] = &[
    "to", "in", "for", "on", "with", "and", "during", "next", "this", "from", "at", "of", "by",
    "over", "until", "around", "visit", "visiting",
];

fn is_connective(word: &str) -> bool {
    CONNECTIVES.iter().any(|c| c.eq_ignore_ascii_case(word))
}

const NUMBER_WORDS: &[(&str, u32)] = &[
    ("a", 1),
    ("an", 1),
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
    ("eleven", 11),
    ("twelve", 12),
    ("thirteen", 13),
    ("fourteen", 14),
];

fn city_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b(?i:to|in|visit|visiting|explore|exploring|around|see)\s+([A-Z][\p{L}'-]*(?:\s+[A-Z][\p{L}'-]*)*)",
        )
        .unwrap()
    })
}

fn days_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(\d{1,3}|an?|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|thirteen|fourteen)[\s-]+(days?|nights?|weeks?)\b",
        )
        .unwrap()
    })
}

fn weekend_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bweekend\b").unwrap())
}

/// First capitalized place name introduced by a travel preposition or verb.
pub fn extract_city(text: &str) -> Option<String> {
    city_re().captures_iter(text).find_map(|caps| {
        let words: Vec<&str> = caps[1]
            .split_whitespace()
            .skip_while(|w| is_connective(w))
            .take_while(|w| !NOT_A_CITY.contains(w) && !is_connective(w))
            .collect();
        (!words.is_empty()).then(|| words.join(" "))
    })
}

/// Trip length in days, from "5 days", "a week", "three-night", "weekend".
///
/// A duration introduced by "for" wins over earlier ones, so "in 2 weeks
/// for 3 days" is a three-day trip.
pub fn extract_days(text: &str) -> Option<u32> {
    let mut first = None;
    for caps in days_re().captures_iter(text) {
        let Some(days) = duration_days(&caps) else {
            continue;
        };
        let start = caps.get(0).map_or(0, |m| m.start());
        let before = text[..start].trim_end();
        let after_for = before
            .rsplit(|c: char| !c.is_alphabetic())
            .next()
            .is_some_and(|w| w.eq_ignore_ascii_case("for"));
        if after_for {
            return Some(days);
        }
        first.get_or_insert(days);
    }
    first.or_else(|| weekend_re().is_match(text).then_some(2))
}

fn duration_days(caps: &regex::Captures<'_>) -> Option<u32> {
    let count = caps[1].to_ascii_lowercase();
    let n = match count.parse::<u32>() {
        Ok(n) => n,
        Err(_) => NUMBER_WORDS
            .iter()
            .find(|(word, _)| *word == count)
            .map(|(_, n)| *n)?,
    };
    let unit = caps[2].to_ascii_lowercase();
    Some(if unit.starts_with("week") { n.saturating_mul(7) } else { n })
}

/// Canonical interest category for one word, if it is in the vocabulary.
fn interest_for(word: &str) -> Option<&'static str> {
    INTEREST_WORDS
        .iter()
        .find(|(_, words)| words.contains(&word))
        .map(|(category, _)| *category)
}

/// Interest categories mentioned anywhere in the text.
pub fn extract_interests(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .filter_map(|w| interest_for(&w.to_lowercase()))
        .map(String::from)
        .collect()
}

/// Fields recovered from a `City: / Days: / Interests:` reply.
#[derive(Debug, Default, PartialEq)]
struct ReasonedFields {
    city: Option<String>,
    days: Option<u32>,
    interests: BTreeSet<String>,
}

fn parse_reasoning_reply(reply: &str) -> ReasonedFields {
    let mut fields = ReasonedFields::default();
    for line in reply.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "city" => {
                if !value.is_empty() && !value.eq_ignore_ascii_case("unknown") {
                    fields.city = Some(value.to_string());
                }
            }
            "days" => {
                fields.days = value
                    .split_whitespace()
                    .next()
                    .and_then(|n| n.parse().ok());
            }
            "interests" => {
                fields.interests = value
                    .split(',')
                    .map(|i| i.trim().to_lowercase())
                    .filter(|i| !i.is_empty() && i != "none")
                    .map(|i| interest_for(&i).map(String::from).unwrap_or(i))
                    .collect();
            }
            _ => {}
        }
    }
    fields
}

/// Extracts city, trip length and interests from free text.
pub struct ParseStage {
    reasoning: Arc<dyn ReasoningClient>,
    default_interests: Vec<String>,
    max_days: u32,
    use_reasoning: bool,
}

impl ParseStage {
    pub fn new(reasoning: Arc<dyn ReasoningClient>, config: &PlannerConfig) -> Self {
        Self {
            reasoning,
            default_interests: config
                .default_interests
                .iter()
                .map(|i| i.trim().to_lowercase())
                .filter(|i| !i.is_empty())
                .collect(),
            max_days: config.max_days,
            use_reasoning: config.reasoning_parse,
        }
    }

    async fn parse(&self, text: &str) -> Result<TripRequest> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TripError::InputParse("request is empty".into()));
        }

        let mut city = extract_city(text);
        let mut days = extract_days(text);
        let mut interests = extract_interests(text);

        if (city.is_none() || days.is_none()) && self.use_reasoning {
            debug!("Falling back to reasoning-assisted extraction");
            let prompt = format!(
                "Extract the following from this travel request: \"{}\"\n\
                 Return ONLY in this format:\n\
                 City: <city name>\n\
                 Days: <number>\n\
                 Interests: <comma-separated interests>",
                text
            );
            let reply = self
                .reasoning
                .call(prompt, "You extract structured trip details.".into())
                .await?;
            let reasoned = parse_reasoning_reply(&reply);
            city = city.or(reasoned.city);
            days = days.or(reasoned.days);
            if interests.is_empty() {
                interests = reasoned.interests;
            }
        }

        let city =
            city.ok_or_else(|| TripError::InputParse("could not find a destination city".into()))?;
        let days =
            days.ok_or_else(|| TripError::InputParse("could not find the trip length".into()))?;
        if days == 0 || days > self.max_days {
            return Err(TripError::InputParse(format!(
                "trip length of {} days is outside 1..={}",
                days, self.max_days
            )));
        }
        if interests.is_empty() {
            interests = self.default_interests.iter().cloned().collect();
        }

        Ok(TripRequest {
            city,
            num_days: days,
            interests,
        })
    }
}

impl Stage for ParseStage {
    fn id(&self) -> StageId {
        StageId::Parse
    }

    fn run<'a>(&'a self, ctx: &'a mut TripContext) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let request = self.parse(ctx.request_text()).await?;
            info!(
                city = %request.city,
                days = request.num_days,
                interests = ?request.interests,
                "Parsed trip request"
            );
            ctx.set_request(request)
        })
    }
}
