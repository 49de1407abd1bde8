/// Gust/wave comparative analysis.
///
/// Puts the two rogue criteria side by side (how often does each phenomenon
/// occur among its own eligible observations) and summarizes the gust
/// factor distribution overall and per wind-speed category.

use serde::Serialize;

use super::rogue::{self, RogueCriterion, RogueKind};
use crate::config::RogueConfig;
use crate::model::{AnalysisError, Observation, Variable, WindCategory};
use crate::stats::{self, Summary};

/// One row of the rogue-rate comparison table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateComparison {
    pub phenomenon: RogueKind,
    pub definition: String,
    pub events: usize,
    pub eligible: usize,
    pub occurrence_pct: Option<f64>,
}

/// Wave and gust rogue rates, each over its own eligible set.
pub fn compare_rates(observations: &[Observation], config: &RogueConfig) -> Result<Vec<RateComparison>, AnalysisError> {
    [RogueCriterion::wave(config), RogueCriterion::gust(config)]
        .into_iter()
        .map(|criterion| {
            let summary = rogue::summarize(observations, &criterion)?;
            Ok(RateComparison {
                phenomenon: criterion.kind,
                definition: criterion.definition(),
                events: summary.events,
                eligible: summary.eligible,
                occurrence_pct: summary.occurrence_pct,
            })
        })
        .collect()
}

/// Gust factor (gust ÷ sustained wind); `None` on a missing or zero wind.
pub fn gust_factor(obs: &Observation) -> Option<f64> {
    rogue::rogue_ratio(obs.value(Variable::Gust), obs.value(Variable::WindSpeed))
}

/// Distribution of the gust factor over observations at or above `min_wind`.
pub fn gust_factor_summary(observations: &[Observation], min_wind: f64) -> Option<Summary> {
    let factors: Vec<f64> = observations
        .iter()
        .filter(|o| o.value(Variable::WindSpeed).is_some_and(|w| w >= min_wind))
        .filter_map(gust_factor)
        .collect();
    Summary::of(&factors)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryGustFactor {
    pub category: WindCategory,
    pub label: &'static str,
    pub n: usize,
    pub mean: f64,
    pub p95: f64,
}

/// Mean and p95 gust factor per wind-speed category, over observations at
/// or above `min_wind`; empty categories are omitted.
pub fn gust_factor_by_category(observations: &[Observation], min_wind: f64) -> Vec<CategoryGustFactor> {
    let mut buckets: std::collections::BTreeMap<WindCategory, Vec<f64>> = Default::default();
    for obs in observations {
        let Some(wind) = obs.value(Variable::WindSpeed).filter(|w| *w >= min_wind) else {
            continue;
        };
        if let Some(factor) = gust_factor(obs) {
            buckets.entry(WindCategory::from_speed(wind)).or_default().push(factor);
        }
    }

    buckets
        .into_iter()
        .map(|(category, factors)| CategoryGustFactor {
            category,
            label: category.label(),
            n: factors.len(),
            mean: stats::mean(&factors),
            p95: stats::quantile(&factors, 0.95),
        })
        .collect()
}
