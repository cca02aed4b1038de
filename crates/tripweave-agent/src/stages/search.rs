use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use tripweave_core::config::PlannerConfig;
use tripweave_core::error::{Result, TripError};
use tripweave_core::traits::SearchProvider;
use tripweave_core::types::{ActivityCandidate, Deficiency, SearchHit, WeatherPreference};

use crate::graph::{Stage, StageId, TripContext};

const INDOOR_WORDS: &[&str] = &[
    "museum", "museums", "gallery", "galleries", "theatre", "theatres", "theater", "theaters",
    "cinema", "restaurant", "restaurants", "cafe", "cafes", "café", "bistro", "bar", "bars",
    "pub", "pubs", "brewery", "mall", "aquarium", "library", "opera", "spa", "indoor", "hall",
];

const OUTDOOR_WORDS: &[&str] = &[
    "park", "parks", "garden", "gardens", "beach", "beaches", "trail", "trails", "hike",
    "hiking", "zoo", "outdoor", "outdoors", "lake", "river", "viewpoint", "square", "mountain",
    "mountains", "hill", "promenade", "forest",
];

const TITLE_SEPARATORS: &[&str] = &[" | ", " - ", " – ", " — "];

/// Result of one category sub-query. Failures never cross the fan-in.
#[derive(Debug)]
pub enum SubQueryOutcome {
    Found(Vec<SearchHit>),
    Failed(TripError),
    TimedOut,
}

/// Search query for one category.
///
/// Refinement passes rewrite the query according to what the previous
/// verdict found lacking.
pub fn build_query(
    city: &str,
    category: &str,
    preference: WeatherPreference,
    hint: Option<Deficiency>,
) -> String {
    let modifier = match preference {
        WeatherPreference::Indoor => "indoor ",
        WeatherPreference::Outdoor => "outdoor ",
        WeatherPreference::Both => "",
    };
    match hint {
        None => format!("best {}{} in {}", modifier, category, city),
        Some(Deficiency::Empty) | Some(Deficiency::TooFew { .. }) => {
            format!("top 10 {}{} in {} recommendations", modifier, category, city)
        }
        Some(Deficiency::Generic { .. }) => {
            format!("specific named {}{} places to visit in {}", modifier, category, city)
        }
    }
}

/// Strip site suffixes such as " | Tripadvisor" or " - Wikipedia".
pub fn clean_title(title: &str) -> String {
    let cut = TITLE_SEPARATORS
        .iter()
        .filter_map(|sep| title.find(sep))
        .min()
        .unwrap_or(title.len());
    title[..cut].trim().to_string()
}

fn tag(text: &str) -> Option<WeatherPreference> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let indoor = words.iter().any(|w| INDOOR_WORDS.contains(w));
    let outdoor = words.iter().any(|w| OUTDOOR_WORDS.contains(w));
    match (indoor, outdoor) {
        (true, false) => Some(WeatherPreference::Indoor),
        (false, true) => Some(WeatherPreference::Outdoor),
        (true, true) => Some(WeatherPreference::Both),
        (false, false) => None,
    }
}

/// Weather suitability from venue keywords; the name outranks the snippet.
pub fn suitability_for(name: &str, snippet: &str) -> WeatherPreference {
    tag(name)
        .or_else(|| tag(snippet))
        .unwrap_or(WeatherPreference::Both)
}

/// Turn raw hits into deduplicated candidates, keeping provider order.
pub fn to_candidates(hits: Vec<SearchHit>, category: &str, max: usize) -> Vec<ActivityCandidate> {
    let mut seen = HashSet::new();
    hits.into_iter()
        .filter_map(|hit| {
            let name = clean_title(&hit.title);
            if name.is_empty() || !seen.insert(name.to_lowercase()) {
                return None;
            }
            let snippet = hit.snippet.trim().to_string();
            Some(ActivityCandidate {
                suitability: suitability_for(&name, &snippet),
                name,
                category: category.to_string(),
                snippet,
                url: hit.url,
            })
        })
        .take(max)
        .collect()
}

/// Searches every requested category concurrently.
///
/// One task per category is spawned into a `JoinSet`. Each task carries
/// its own timeout and the stage as a whole has a deadline, after which
/// outstanding tasks are aborted. A category whose sub-query failed or
/// timed out gets an empty list. Dropping the stage future drops the
/// `JoinSet`, which aborts whatever is still running.
pub struct ActivitySearchStage {
    search: Arc<dyn SearchProvider>,
    query_timeout: Duration,
    stage_timeout: Duration,
    max_candidates: usize,
}

impl ActivitySearchStage {
    pub fn new(search: Arc<dyn SearchProvider>, config: &PlannerConfig) -> Self {
        Self {
            search,
            query_timeout: Duration::from_secs(config.search_timeout_secs),
            stage_timeout: Duration::from_secs(config.search_stage_timeout_secs),
            max_candidates: config.max_candidates_per_category,
        }
    }

    async fn fan_out(&self, queries: Vec<(String, String)>) -> BTreeMap<String, SubQueryOutcome> {
        let mut set = JoinSet::new();
        for (category, query) in queries {
            let search = Arc::clone(&self.search);
            let limit = self.query_timeout;
            set.spawn(async move {
                debug!(category = %category, query = %query, "Dispatching search");
                let outcome = match tokio::time::timeout(limit, search.search(query)).await {
                    Ok(Ok(hits)) => SubQueryOutcome::Found(hits),
                    Ok(Err(e)) => SubQueryOutcome::Failed(e),
                    Err(_) => SubQueryOutcome::TimedOut,
                };
                (category, outcome)
            });
        }

        let deadline = Instant::now() + self.stage_timeout;
        let mut outcomes = BTreeMap::new();
        loop {
            match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok((category, outcome)))) => {
                    outcomes.insert(category, outcome);
                }
                Ok(Some(Err(e))) => warn!(error = %e, "Search task did not complete"),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        outstanding = set.len(),
                        "Search stage deadline reached, aborting outstanding queries"
                    );
                    set.abort_all();
                    break;
                }
            }
        }
        outcomes
    }
}

impl Stage for ActivitySearchStage {
    fn id(&self) -> StageId {
        StageId::ActivitySearch
    }

    fn run<'a>(&'a self, ctx: &'a mut TripContext) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let preference = ctx.preference()?;
            let request = ctx.request()?;
            let city = request.city.clone();

            let targets: Vec<(String, Option<Deficiency>)> = match ctx.refinement_hints() {
                Some(hints) if !hints.is_empty() => hints
                    .iter()
                    .filter(|(category, _)| request.interests.contains(*category))
                    .map(|(category, deficiency)| (category.clone(), Some(*deficiency)))
                    .collect(),
                _ => request.interests.iter().map(|c| (c.clone(), None)).collect(),
            };

            let queries = targets
                .iter()
                .map(|(category, hint)| {
                    (category.clone(), build_query(&city, category, preference, *hint))
                })
                .collect();
            let mut outcomes = self.fan_out(queries).await;

            let mut merged = Vec::with_capacity(targets.len());
            for (category, _) in targets {
                let candidates = match outcomes.remove(&category) {
                    Some(SubQueryOutcome::Found(hits)) => {
                        to_candidates(hits, &category, self.max_candidates)
                    }
                    Some(SubQueryOutcome::Failed(e)) => {
                        warn!(category = %category, error = %e, "Search failed, leaving category empty");
                        Vec::new()
                    }
                    Some(SubQueryOutcome::TimedOut) | None => {
                        warn!(category = %category, "Search timed out, leaving category empty");
                        Vec::new()
                    }
                };
                merged.push((category, candidates));
            }

            for (category, candidates) in merged {
                info!(category = %category, found = candidates.len(), "Category searched");
                ctx.replace_candidates(category, candidates)?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tripweave_core::types::{QualityVerdict, TripRequest, WeatherForecast};
    use tripweave_test_utils::{hits, MockReply, MockSearch};

    fn ready(interests: &[&str], preference: WeatherPreference) -> TripContext {
        let mut ctx = TripContext::new("x", 2);
        ctx.set_request(TripRequest::new("Warsaw", 3, interests.iter().copied()))
            .unwrap();
        ctx.set_forecast(WeatherForecast::default()).unwrap();
        ctx.set_preference(preference, None).unwrap();
        ctx.begin_search_pass().unwrap();
        ctx
    }

    fn stage(search: Arc<MockSearch>) -> ActivitySearchStage {
        ActivitySearchStage::new(search, &PlannerConfig::default())
    }

    #[test]
    fn test_build_query() {
        assert_eq!(
            build_query("Warsaw", "museums", WeatherPreference::Indoor, None),
            "best indoor museums in Warsaw"
        );
        assert_eq!(
            build_query("Warsaw", "food", WeatherPreference::Both, None),
            "best food in Warsaw"
        );
        assert_eq!(
            build_query("Nice", "beaches", WeatherPreference::Outdoor, Some(Deficiency::Empty)),
            "top 10 outdoor beaches in Nice recommendations"
        );
        assert_eq!(
            build_query(
                "Nice",
                "food",
                WeatherPreference::Both,
                Some(Deficiency::Generic { specific: 0, required: 2 })
            ),
            "specific named food places to visit in Nice"
        );
    }

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("Wawel Castle - Wikipedia"), "Wawel Castle");
        assert_eq!(
            clean_title("POLIN Museum | Tripadvisor - Reviews"),
            "POLIN Museum"
        );
        assert_eq!(clean_title("  Hala Koszyki  "), "Hala Koszyki");
    }

    #[test]
    fn test_suitability_for() {
        assert_eq!(suitability_for("National Museum", ""), WeatherPreference::Indoor);
        assert_eq!(suitability_for("Łazienki Park", ""), WeatherPreference::Outdoor);
        assert_eq!(
            suitability_for("Hala Koszyki", "a food hall with a rooftop garden"),
            WeatherPreference::Both
        );
        assert_eq!(suitability_for("Hala Koszyki", "food court"), WeatherPreference::Both);
        assert_eq!(suitability_for("Barbican", ""), WeatherPreference::Both);
    }

    #[test]
    fn test_to_candidates_dedups_and_caps() {
        let raw = hits(&["A Museum", "B Gallery", "A Museum", "C Park", "D", "E", "F"]);
        let candidates = to_candidates(raw, "art", 4);
        let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["A Museum", "B Gallery", "C Park", "D"]);
        assert!(candidates.iter().all(|c| c.category == "art"));
        assert_eq!(candidates[2].suitability, WeatherPreference::Outdoor);
    }

    #[tokio::test]
    async fn test_partial_failure_leaves_category_empty() {
        let search = Arc::new(
            MockSearch::new()
                .with_hits("museums", hits(&["National Museum", "POLIN Museum"]))
                .with_hits("food", hits(&["Hala Koszyki", "Bar Prasowy"]))
                .failing("parks"),
        );
        let mut ctx = ready(&["museums", "food", "parks"], WeatherPreference::Both);
        stage(search.clone()).run(&mut ctx).await.unwrap();

        assert_eq!(ctx.candidates_for("museums").len(), 2);
        assert_eq!(ctx.candidates_for("food").len(), 2);
        assert!(ctx.candidates_for("parks").is_empty());
        assert!(ctx.candidates().contains_key("parks"));
        assert_eq!(search.queries().len(), 3);
    }

    #[tokio::test]
    async fn test_preference_biases_queries() {
        let search = Arc::new(MockSearch::new());
        let mut ctx = ready(&["museums"], WeatherPreference::Indoor);
        stage(search.clone()).run(&mut ctx).await.unwrap();
        assert_eq!(search.queries(), vec!["best indoor museums in Warsaw".to_string()]);
    }

    #[tokio::test]
    async fn test_refinement_searches_only_deficient_categories() {
        let search = Arc::new(
            MockSearch::new()
                .with_hits("best food", hits(&["Hala Koszyki", "Bar Prasowy"]))
                .with_hits("top 10 parks", hits(&["Łazienki Park", "Saxon Garden"])),
        );
        let search_stage = stage(search.clone());
        let mut ctx = ready(&["food", "parks"], WeatherPreference::Both);
        search_stage.run(&mut ctx).await.unwrap();
        assert!(ctx.candidates_for("parks").is_empty());

        let mut deficiencies = BTreeMap::new();
        deficiencies.insert("parks".to_string(), Deficiency::Empty);
        ctx.record_verdict(QualityVerdict::needs_more_detail("parks empty", deficiencies))
            .unwrap();
        ctx.begin_search_pass().unwrap();
        search_stage.run(&mut ctx).await.unwrap();

        let queries = search.queries();
        assert_eq!(queries.len(), 3);
        assert_eq!(queries[2], "top 10 parks in Warsaw recommendations");
        assert_eq!(ctx.candidates_for("parks").len(), 2);
        assert_eq!(ctx.candidates_for("food")[0].name, "Hala Koszyki");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_query_times_out_without_failing_stage() {
        let search = Arc::new(
            MockSearch::new()
                .with_hits("food", hits(&["Hala Koszyki"]))
                .script_for(
                    "museums",
                    vec![MockReply::Delayed(Duration::from_secs(3600), hits(&["Late Museum"]))],
                ),
        );
        let mut ctx = ready(&["museums", "food"], WeatherPreference::Both);
        stage(search.clone()).run(&mut ctx).await.unwrap();

        assert!(ctx.candidates_for("museums").is_empty());
        assert_eq!(ctx.candidates_for("food").len(), 1);
        assert_eq!(search.completed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stage_deadline_aborts_outstanding_queries() {
        let search = Arc::new(MockSearch::new().script_for(
            "museums",
            vec![MockReply::Delayed(Duration::from_secs(20), hits(&["Late Museum"]))],
        ));
        let mut config = PlannerConfig::default();
        config.search_timeout_secs = 60;
        config.search_stage_timeout_secs = 5;
        let search_stage = ActivitySearchStage::new(search.clone(), &config);
        let mut ctx = ready(&["museums"], WeatherPreference::Both);

        let started = Instant::now();
        search_stage.run(&mut ctx).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(6));
        assert!(ctx.candidates_for("museums").is_empty());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(search.completed(), 0);
    }

    #[tokio::test]
    async fn test_search_before_preference_is_invariant_violation() {
        let mut ctx = TripContext::new("x", 2);
        ctx.set_request(TripRequest::new("Warsaw", 3, ["food"])).unwrap();
        let err = stage(Arc::new(MockSearch::new()))
            .run(&mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, TripError::InvariantViolation(_)));
    }
}
