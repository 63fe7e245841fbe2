//! Planning parameter resolution.

use chronicle_core::{PlannerPolicy, PlanningSettings, VolumeRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Where a resolved planning parameter came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamSource {
    Setting,
    Inferred,
    Default,
}

/// Planned volume count and target total chapters after applying settings,
/// persisted records and policy defaults in that order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanningParams {
    pub planned_volume_count: u32,
    pub target_total_chapters: u32,
    pub count_source: ParamSource,
    pub total_source: ParamSource,
}

impl PlanningParams {
    pub fn resolve(
        volumes: &[VolumeRecord],
        settings: &PlanningSettings,
        policy: &PlannerPolicy,
    ) -> Self {
        let distinct: BTreeSet<u32> = volumes
            .iter()
            .map(|v| v.number)
            .filter(|n| *n > 0)
            .collect();

        let (planned_volume_count, count_source) = match settings.planned_volume_count() {
            Some(count) => (count, ParamSource::Setting),
            None if !distinct.is_empty() => (distinct.len() as u32, ParamSource::Inferred),
            None => (policy.default_volume_count.max(1), ParamSource::Default),
        };

        let (target_total_chapters, total_source) = match settings.target_total_chapters() {
            Some(total) => (total, ParamSource::Setting),
            None => match fully_bounded_end(volumes, planned_volume_count) {
                Some(end) => (end, ParamSource::Inferred),
                None => (
                    planned_volume_count
                        .saturating_mul(policy.default_chapters_per_volume.max(1)),
                    ParamSource::Default,
                ),
            },
        };

        Self {
            planned_volume_count,
            target_total_chapters,
            count_source,
            total_source,
        }
    }

    /// Nominal chapters per volume, used for the plausibility check.
    pub fn expected_span(&self) -> f64 {
        f64::from(self.target_total_chapters) / f64::from(self.planned_volume_count.max(1))
    }

    /// Whole chapters per estimated volume.
    pub fn estimated_span(&self) -> u32 {
        self.target_total_chapters
            .div_ceil(self.planned_volume_count.max(1))
            .max(1)
    }
}

/// Highest persisted end chapter, but only when every planned volume
/// `1..=planned` has a record with both boundaries.
fn fully_bounded_end(volumes: &[VolumeRecord], planned: u32) -> Option<u32> {
    let mut max_end = None;
    for number in 1..=planned {
        let end = volumes
            .iter()
            .filter(|v| v.number == number)
            .find_map(|v| v.bounds())
            .map(|(_, end)| end)?;
        max_end = max_end.max(Some(end));
    }
    max_end.filter(|end| *end > 0)
}
