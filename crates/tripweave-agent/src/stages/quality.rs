use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, OnceLock};

use futures::future::BoxFuture;
use regex::Regex;
use tracing::{info, warn};

use tripweave_core::config::PlannerConfig;
use tripweave_core::error::{Result, TripError};
use tripweave_core::traits::ReasoningClient;
use tripweave_core::types::{ActivityCandidate, Deficiency, QualityVerdict};

use crate::graph::{Stage, StageId, TripContext};

fn listicle_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(best|top\s*\d*)\b|\b(things to do|guide|list of|near me|tripadvisor)\b",
        )
        .unwrap()
    })
}

fn need_more_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)NEED_MORE[\s:]*(.*)").unwrap())
}

/// Whether a candidate name reads as a listicle rather than a place.
pub fn is_generic_name(name: &str) -> bool {
    let name = name.trim();
    name.chars().count() < 3 || listicle_re().is_match(name)
}

/// Deficiency of one category, if it misses the bar.
pub fn assess(candidates: &[ActivityCandidate], min: usize) -> Option<Deficiency> {
    if candidates.is_empty() {
        return Some(Deficiency::Empty);
    }
    if candidates.len() < min {
        return Some(Deficiency::TooFew {
            found: candidates.len(),
            required: min,
        });
    }
    let specific = candidates.iter().filter(|c| !is_generic_name(&c.name)).count();
    if specific < min {
        return Some(Deficiency::Generic {
            specific,
            required: min,
        });
    }
    None
}

/// Categories the reviewer flagged, or `None` when it was satisfied.
///
/// `NEED_MORE` without recognizable categories flags every category. A
/// reply with neither keyword counts as satisfied.
fn parse_review(reply: &str, interests: &BTreeSet<String>) -> Option<BTreeSet<String>> {
    let caps = need_more_re().captures(reply)?;
    let flagged: BTreeSet<String> = caps[1]
        .split(|c: char| c == ',' || c == '\n')
        .map(|c| c.trim().trim_end_matches('.').to_lowercase())
        .filter(|c| interests.contains(c))
        .collect();
    Some(if flagged.is_empty() {
        interests.clone()
    } else {
        flagged
    })
}

fn describe_deficiencies(deficiencies: &BTreeMap<String, Deficiency>) -> String {
    deficiencies
        .iter()
        .map(|(category, d)| format!("{}: {}", category, d))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Judges whether the candidates are numerous and specific enough.
pub struct QualityGate {
    reasoning: Arc<dyn ReasoningClient>,
    min_candidates: usize,
    use_reasoning: bool,
}

impl QualityGate {
    pub fn new(reasoning: Arc<dyn ReasoningClient>, config: &PlannerConfig) -> Self {
        Self {
            reasoning,
            min_candidates: config.min_candidates_per_category,
            use_reasoning: config.reasoning_quality_check,
        }
    }

    async fn review(
        &self,
        city: &str,
        interests: &BTreeSet<String>,
        ctx: &TripContext,
    ) -> Result<Option<BTreeSet<String>>> {
        let listing = interests
            .iter()
            .map(|category| {
                let names: Vec<&str> = ctx
                    .candidates_for(category)
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect();
                format!("- {}: {}", category, names.join("; "))
            })
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Review these activities for {}:\n{}\n\n\
             Do these include specific venue or place names? Be lenient: if you can identify \
             a few actual names per category, answer SUFFICIENT.\n\
             If a category is only generic descriptions, answer NEED_MORE: followed by the \
             comma-separated categories.\n\
             Answer only: SUFFICIENT or NEED_MORE: <categories>",
            city, listing
        );
        let reply = self
            .reasoning
            .call(prompt, "You review travel research for specificity.".into())
            .await?;
        Ok(parse_review(&reply, interests))
    }
}

impl Stage for QualityGate {
    fn id(&self) -> StageId {
        StageId::QualityGate
    }

    fn run<'a>(&'a self, ctx: &'a mut TripContext) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if ctx.candidates().is_empty() {
                return Err(TripError::invariant(
                    "quality gate reached with an empty candidate mapping",
                ));
            }
            let request = ctx.request()?;
            let city = request.city.clone();
            let interests = request.interests.clone();

            let deficiencies: BTreeMap<String, Deficiency> = interests
                .iter()
                .filter_map(|category| {
                    assess(ctx.candidates_for(category), self.min_candidates)
                        .map(|d| (category.clone(), d))
                })
                .collect();

            let verdict = if !deficiencies.is_empty() {
                QualityVerdict::needs_more_detail(describe_deficiencies(&deficiencies), deficiencies)
            } else if self.use_reasoning {
                match self.review(&city, &interests, ctx).await {
                    Ok(None) => QualityVerdict::pass("every category names specific places"),
                    Ok(Some(flagged)) => {
                        let deficiencies: BTreeMap<String, Deficiency> = flagged
                            .into_iter()
                            .map(|category| {
                                let specific = ctx
                                    .candidates_for(&category)
                                    .iter()
                                    .filter(|c| !is_generic_name(&c.name))
                                    .count();
                                let d = Deficiency::Generic {
                                    specific,
                                    required: self.min_candidates,
                                };
                                (category, d)
                            })
                            .collect();
                        let reason = format!(
                            "reviewer asked for more specific places in {}",
                            deficiencies.keys().cloned().collect::<Vec<_>>().join(", ")
                        );
                        QualityVerdict::needs_more_detail(reason, deficiencies)
                    }
                    Err(e) => {
                        warn!(error = %e, "Specificity review unavailable, keeping count-based verdict");
                        QualityVerdict::pass("every category meets the candidate minimum")
                    }
                }
            } else {
                QualityVerdict::pass("every category meets the candidate minimum")
            };

            info!(
                pass = ctx.iteration_count(),
                status = ?verdict.status,
                reason = %verdict.reason,
                "Quality verdict"
            );
            ctx.record_verdict(verdict)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tripweave_core::types::{TripRequest, VerdictStatus, WeatherForecast, WeatherPreference};
    use tripweave_test_utils::{MockReasoning, MockReply};

    fn candidate(name: &str, category: &str) -> ActivityCandidate {
        ActivityCandidate {
            name: name.into(),
            category: category.into(),
            snippet: String::new(),
            url: String::new(),
            suitability: WeatherPreference::Both,
        }
    }

    fn searched(lists: &[(&str, &[&str])]) -> TripContext {
        let mut ctx = TripContext::new("x", 2);
        ctx.set_request(TripRequest::new("Kyoto", 2, lists.iter().map(|(c, _)| *c)))
            .unwrap();
        ctx.set_forecast(WeatherForecast::default()).unwrap();
        ctx.set_preference(WeatherPreference::Both, None).unwrap();
        ctx.begin_search_pass().unwrap();
        for (category, names) in lists {
            let list = names.iter().map(|n| candidate(n, category)).collect();
            ctx.replace_candidates(*category, list).unwrap();
        }
        ctx
    }

    fn gate(reasoning: MockReasoning) -> QualityGate {
        QualityGate::new(Arc::new(reasoning), &PlannerConfig::default())
    }

    #[test]
    fn test_is_generic_name() {
        assert!(is_generic_name("Best museums in Kyoto"));
        assert!(is_generic_name("Top 10 temples"));
        assert!(is_generic_name("THE 15 BEST Things to Do in Kyoto"));
        assert!(is_generic_name("Kyoto travel guide"));
        assert!(is_generic_name("XY"));
        assert!(!is_generic_name("Kinkaku-ji"));
        assert!(!is_generic_name("Nishiki Market"));
        assert!(!is_generic_name("Bestia Restaurant"));
    }

    #[test]
    fn test_assess() {
        let min = 2;
        assert_eq!(assess(&[], min), Some(Deficiency::Empty));
        assert_eq!(
            assess(&[candidate("Kinkaku-ji", "temples")], min),
            Some(Deficiency::TooFew { found: 1, required: 2 })
        );
        assert_eq!(
            assess(
                &[
                    candidate("Kinkaku-ji", "temples"),
                    candidate("Top 10 temples in Kyoto", "temples")
                ],
                min
            ),
            Some(Deficiency::Generic { specific: 1, required: 2 })
        );
        assert_eq!(
            assess(
                &[candidate("Kinkaku-ji", "temples"), candidate("Ginkaku-ji", "temples")],
                min
            ),
            None
        );
    }

    #[test]
    fn test_parse_review() {
        let interests: BTreeSet<String> =
            ["food", "temples"].iter().map(|s| s.to_string()).collect();
        assert_eq!(parse_review("SUFFICIENT", &interests), None);
        assert_eq!(parse_review("maybe?", &interests), None);
        let flagged = parse_review("NEED_MORE: Food.", &interests).unwrap();
        assert_eq!(flagged.into_iter().collect::<Vec<_>>(), vec!["food"]);
        assert_eq!(parse_review("need_more", &interests).unwrap(), interests);
    }

    #[tokio::test]
    async fn test_pass_when_every_category_is_specific() {
        let reasoning = MockReasoning::new().with_default("SUFFICIENT");
        let mut ctx = searched(&[
            ("temples", &["Kinkaku-ji", "Fushimi Inari Taisha"]),
            ("food", &["Nishiki Market", "Pontocho Alley"]),
        ]);
        gate(reasoning).run(&mut ctx).await.unwrap();
        assert!(ctx.latest_verdict().unwrap().is_pass());
    }

    #[tokio::test]
    async fn test_deficient_categories_recorded() {
        let reasoning = Arc::new(MockReasoning::new());
        let quality = QualityGate::new(reasoning.clone(), &PlannerConfig::default());
        let mut ctx = searched(&[
            ("temples", &["Kinkaku-ji", "Ginkaku-ji"]),
            ("food", &["Nishiki Market"]),
            ("parks", &[]),
        ]);
        quality.run(&mut ctx).await.unwrap();

        let verdict = ctx.latest_verdict().unwrap();
        assert_eq!(verdict.status, VerdictStatus::NeedsMoreDetail);
        assert_eq!(verdict.deficiencies.len(), 2);
        assert_eq!(verdict.deficiencies["parks"], Deficiency::Empty);
        assert!(matches!(verdict.deficiencies["food"], Deficiency::TooFew { found: 1, .. }));
        assert!(verdict.reason.contains("parks: no candidates"));
        assert!(reasoning.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_reviewer_can_ask_for_more() {
        let reasoning =
            MockReasoning::new().respond_to("Review these activities", "NEED_MORE: food");
        let mut ctx = searched(&[
            ("temples", &["Kinkaku-ji", "Ginkaku-ji"]),
            ("food", &["Local eats", "Street snacks"]),
        ]);
        gate(reasoning).run(&mut ctx).await.unwrap();

        let verdict = ctx.latest_verdict().unwrap();
        assert!(!verdict.is_pass());
        assert_eq!(verdict.deficiencies.keys().collect::<Vec<_>>(), vec!["food"]);
        assert!(matches!(verdict.deficiencies["food"], Deficiency::Generic { .. }));
    }

    #[tokio::test]
    async fn test_reviewer_outage_is_absorbed() {
        let reasoning = MockReasoning::new().script_for("Review", vec![MockReply::Unavailable]);
        let mut ctx = searched(&[("temples", &["Kinkaku-ji", "Ginkaku-ji"])]);
        gate(reasoning).run(&mut ctx).await.unwrap();
        assert!(ctx.latest_verdict().unwrap().is_pass());
    }

    #[tokio::test]
    async fn test_empty_mapping_is_invariant_violation() {
        let mut ctx = TripContext::new("x", 2);
        ctx.set_request(TripRequest::new("Kyoto", 2, ["food"])).unwrap();
        let err = gate(MockReasoning::new()).run(&mut ctx).await.unwrap_err();
        assert!(matches!(err, TripError::InvariantViolation(_)));
        assert!(ctx.verdicts().is_empty());
    }
}
