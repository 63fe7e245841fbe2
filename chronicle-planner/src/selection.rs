//! Chapter-to-volume selection with elastic end boundaries.

use crate::params::PlanningParams;
use chronicle_core::{ChapterNumber, PlannerPolicy, PlanningSettings, VolumeRecord};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How the selected range was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionSource {
    /// A persisted volume contains the chapter
    Persisted,
    /// The chapter runs past the last persisted volume, within its buffer
    ExtendedPastEnd,
    /// Computed from planning parameters only
    Estimated,
}

/// The volume a chapter belongs to. Recomputed on every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeSelection {
    pub volume_number: u32,
    pub hard_start: ChapterNumber,
    pub hard_end: ChapterNumber,
    pub soft_end: ChapterNumber,
    pub buffer: u32,
    /// Position inside the hard range, 0 to 100
    pub progress_percent: f64,
    pub overrun: bool,
    pub overrun_chapters: u32,
    pub buffer_remaining: u32,
    pub source: SelectionSource,
    /// No persisted record backs this range
    pub fallback: bool,
    pub planned_volume_count: u32,
    pub target_total_chapters: u32,
}

impl VolumeSelection {
    pub fn span(&self) -> u32 {
        self.hard_end - self.hard_start + 1
    }

    pub fn is_trusted(&self) -> bool {
        !self.fallback
    }
}

/// Result of a volume lookup. `NotFound` means there is nothing to plan
/// from; a low-confidence estimate is still `Found` with `fallback` set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "selection", rename_all = "snake_case")]
pub enum VolumeLookup {
    Found(VolumeSelection),
    NotFound,
}

impl VolumeLookup {
    pub fn selection(&self) -> Option<&VolumeSelection> {
        match self {
            VolumeLookup::Found(selection) => Some(selection),
            VolumeLookup::NotFound => None,
        }
    }

    pub fn into_selection(self) -> Option<VolumeSelection> {
        match self {
            VolumeLookup::Found(selection) => Some(selection),
            VolumeLookup::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, VolumeLookup::Found(_))
    }
}

/// Soft buffer past a volume's hard end: `max(min, ceil(ratio × span))`.
pub fn soft_buffer(span: u32, policy: &PlannerPolicy) -> u32 {
    let proportional = (policy.buffer_ratio * f64::from(span)).ceil() as u32;
    policy.min_buffer_chapters.max(proportional)
}

struct Range {
    number: u32,
    start: ChapterNumber,
    end: ChapterNumber,
}

impl Range {
    fn span(&self) -> u32 {
        self.end - self.start + 1
    }

    fn soft_end(&self, policy: &PlannerPolicy) -> ChapterNumber {
        self.end.saturating_add(soft_buffer(self.span(), policy))
    }

    fn measure(
        &self,
        chapter: ChapterNumber,
        source: SelectionSource,
        params: &PlanningParams,
        policy: &PlannerPolicy,
    ) -> VolumeSelection {
        let span = self.span();
        let buffer = soft_buffer(span, policy);
        let soft_end = self.end.saturating_add(buffer);
        let position = chapter.saturating_sub(self.start).saturating_add(1);
        let progress_percent = (f64::from(position) / f64::from(span) * 100.0).clamp(0.0, 100.0);
        let overrun_chapters = chapter.saturating_sub(self.end);

        VolumeSelection {
            volume_number: self.number,
            hard_start: self.start,
            hard_end: self.end,
            soft_end,
            buffer,
            progress_percent,
            overrun: overrun_chapters > 0,
            overrun_chapters,
            buffer_remaining: soft_end.saturating_sub(chapter),
            source,
            fallback: source == SelectionSource::Estimated,
            planned_volume_count: params.planned_volume_count,
            target_total_chapters: params.target_total_chapters,
        }
    }
}

/// Map `chapter` onto a volume. Pure and deterministic.
///
/// Tries, in order: a persisted volume containing the chapter (unless its
/// span is implausibly short), the buffer past the last persisted volume
/// that ends before the chapter, and finally ranges estimated from the
/// planning parameters.
pub fn plan_volume(
    volumes: &[VolumeRecord],
    settings: &PlanningSettings,
    chapter: ChapterNumber,
    policy: &PlannerPolicy,
) -> VolumeLookup {
    if chapter == 0 || (volumes.is_empty() && settings.is_empty()) {
        return VolumeLookup::NotFound;
    }

    let params = PlanningParams::resolve(volumes, settings, policy);

    let mut persisted: Vec<Range> = volumes
        .iter()
        .filter_map(|v| {
            v.bounds().map(|(start, end)| Range {
                number: v.number,
                start,
                end,
            })
        })
        .collect();
    persisted.sort_by(|a, b| a.number.cmp(&b.number).then_with(|| a.start.cmp(&b.start)));

    if let Some(found) = persisted
        .iter()
        .find(|r| r.start <= chapter && chapter <= r.end)
    {
        let minimum = policy.min_plausible_span_ratio * params.expected_span();
        if f64::from(found.span()) >= minimum {
            return VolumeLookup::Found(found.measure(chapter, SelectionSource::Persisted, &params, policy));
        }
        debug!(
            chapter,
            volume = found.number,
            span = found.span(),
            expected = params.expected_span(),
            "persisted volume span implausible, estimating"
        );
        return VolumeLookup::Found(estimate(chapter, &params, policy));
    }

    let preceding = persisted
        .iter()
        .filter(|r| r.end < chapter)
        .max_by(|a, b| a.end.cmp(&b.end).then_with(|| a.number.cmp(&b.number)));
    if let Some(last) = preceding {
        if chapter <= last.soft_end(policy) {
            return VolumeLookup::Found(last.measure(
                chapter,
                SelectionSource::ExtendedPastEnd,
                &params,
                policy,
            ));
        }
    }

    VolumeLookup::Found(estimate(chapter, &params, policy))
}

/// Walk estimated volumes and return the first whose soft range holds the
/// chapter. The last volume takes everything beyond.
fn estimate(chapter: ChapterNumber, params: &PlanningParams, policy: &PlannerPolicy) -> VolumeSelection {
    let planned = params.planned_volume_count.max(1);
    let span = params.estimated_span();

    let mut range = Range {
        number: 1,
        start: 1,
        end: 1,
    };
    for number in 1..=planned {
        let start = (number - 1).saturating_mul(span).saturating_add(1);
        let end = if number == planned {
            params.target_total_chapters.max(start)
        } else {
            start.saturating_add(span - 1)
        };
        range = Range { number, start, end };
        if chapter >= start && chapter <= range.soft_end(policy) {
            break;
        }
    }
    range.measure(chapter, SelectionSource::Estimated, params, policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_test_utils::fixtures;

    fn policy() -> PlannerPolicy {
        PlannerPolicy::default()
    }

    fn select(volumes: &[VolumeRecord], settings: PlanningSettings, chapter: ChapterNumber) -> VolumeSelection {
        plan_volume(volumes, &settings, chapter, &policy())
            .into_selection()
            .unwrap()
    }

    #[test]
    fn test_soft_buffer() {
        assert_eq!(soft_buffer(100, &policy()), 10);
        assert_eq!(soft_buffer(20, &policy()), 5);
        assert_eq!(soft_buffer(101, &policy()), 11);
    }

    #[test]
    fn test_first_chapter_of_second_volume() {
        let selection = select(&fixtures::five_volumes(), fixtures::five_by_five_hundred(), 101);
        assert_eq!(selection.volume_number, 2);
        assert_eq!(selection.source, SelectionSource::Persisted);
        assert!(!selection.fallback);
        assert!((selection.progress_percent - 1.0).abs() < 1e-9);
        assert!(!selection.overrun);
        assert_eq!(selection.soft_end, 210);
        assert_eq!(selection.buffer_remaining, 109);
    }

    #[test]
    fn test_run_past_end_within_buffer() {
        let volumes = vec![VolumeRecord::new(1, 1, 100)];
        let selection = select(&volumes, fixtures::five_by_five_hundred(), 110);
        assert_eq!(selection.volume_number, 1);
        assert_eq!(selection.source, SelectionSource::ExtendedPastEnd);
        assert!(selection.overrun);
        assert_eq!(selection.overrun_chapters, 10);
        assert_eq!(selection.buffer_remaining, 0);
        assert!(!selection.fallback);
        assert!((selection.progress_percent - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_buffer_exhausted_moves_to_next_volume() {
        let volumes = vec![VolumeRecord::new(1, 1, 100)];
        let selection = select(&volumes, fixtures::five_by_five_hundred(), 111);
        assert_eq!(selection.volume_number, 2);
        assert_eq!(selection.source, SelectionSource::Estimated);
        assert!(selection.fallback);
        assert_eq!((selection.hard_start, selection.hard_end), (101, 200));
        assert!(!selection.overrun);
    }

    #[test]
    fn test_no_volumes_estimates_with_fallback() {
        let selection = select(&[], fixtures::five_by_five_hundred(), 250);
        assert_eq!(selection.volume_number, 3);
        assert!(selection.fallback);
        assert_eq!((selection.hard_start, selection.hard_end), (201, 300));
        assert!((selection.progress_percent - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_estimated_soft_range_keeps_earlier_volume() {
        let selection = select(&[], fixtures::five_by_five_hundred(), 105);
        assert_eq!(selection.volume_number, 1);
        assert!(selection.overrun);
        assert_eq!(selection.overrun_chapters, 5);
    }

    #[test]
    fn test_last_volume_has_no_ceiling() {
        let selection = select(&[], fixtures::five_by_five_hundred(), 900);
        assert_eq!(selection.volume_number, 5);
        assert_eq!(selection.hard_end, 500);
        assert_eq!(selection.overrun_chapters, 400);
        assert_eq!(selection.buffer_remaining, 0);
    }

    #[test]
    fn test_last_volume_absorbs_remainder() {
        let selection = select(&[], PlanningSettings::new(3, 100), 95);
        assert_eq!(selection.volume_number, 3);
        assert_eq!((selection.hard_start, selection.hard_end), (69, 100));
    }

    #[test]
    fn test_implausible_span_is_ignored() {
        let volumes = vec![
            VolumeRecord::new(1, 1, 100),
            VolumeRecord::new(2, 101, 120),
            VolumeRecord::new(3, 121, 300),
        ];
        let selection = select(&volumes, fixtures::five_by_five_hundred(), 115);
        assert_eq!(selection.source, SelectionSource::Estimated);
        assert!(selection.fallback);
        assert_eq!(selection.volume_number, 2);
    }

    #[test]
    fn test_not_found_without_any_planning_data() {
        assert_eq!(
            plan_volume(&[], &PlanningSettings::default(), 10, &policy()),
            VolumeLookup::NotFound
        );
    }

    #[test]
    fn test_chapter_zero_not_found() {
        assert_eq!(
            plan_volume(&fixtures::five_volumes(), &fixtures::five_by_five_hundred(), 0, &policy()),
            VolumeLookup::NotFound
        );
    }

    #[test]
    fn test_records_without_settings_are_trusted() {
        let selection = select(&fixtures::five_volumes(), PlanningSettings::default(), 333);
        assert_eq!(selection.volume_number, 4);
        assert_eq!(selection.target_total_chapters, 500);
        assert!(!selection.fallback);
    }

    #[test]
    fn test_lookup_serializes_with_status_tag() {
        let lookup = plan_volume(&[], &fixtures::five_by_five_hundred(), 1, &policy());
        let value = serde_json::to_value(&lookup).unwrap();
        assert_eq!(value["status"], "found");
        assert_eq!(value["selection"]["source"], "estimated");
        let missing = serde_json::to_value(VolumeLookup::NotFound).unwrap();
        assert_eq!(missing["status"], "not_found");
    }
}
