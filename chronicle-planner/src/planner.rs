//! Store-backed volume planner.

use crate::selection::{plan_volume, VolumeLookup};
use chronicle_core::{ChapterNumber, NovelId, PlannerPolicy, PlanningSettings};
use chronicle_storage::VolumeStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Reads volume records and planning settings, then plans. Read-only and
/// lock-free, so any number of lookups may run in parallel.
pub struct VolumePlanner {
    store: Arc<dyn VolumeStore>,
    policy: PlannerPolicy,
}

impl VolumePlanner {
    pub fn new(store: Arc<dyn VolumeStore>, policy: PlannerPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &PlannerPolicy {
        &self.policy
    }

    /// Select the volume for `chapter`. Unreadable records or settings are
    /// treated as absent.
    pub async fn select_volume(&self, novel_id: NovelId, chapter: ChapterNumber) -> VolumeLookup {
        let volumes = match self.store.list_volumes(novel_id).await {
            Ok(volumes) => volumes,
            Err(e) => {
                warn!(novel_id = %novel_id, chapter, error = %e, "volume records unavailable");
                Vec::new()
            }
        };
        let settings = match self.store.planning_settings(novel_id).await {
            Ok(settings) => settings,
            Err(e) => {
                warn!(novel_id = %novel_id, chapter, error = %e, "planning settings unavailable");
                PlanningSettings::default()
            }
        };

        let lookup = plan_volume(&volumes, &settings, chapter, &self.policy);
        match &lookup {
            VolumeLookup::Found(selection) => debug!(
                novel_id = %novel_id,
                chapter,
                volume = selection.volume_number,
                source = ?selection.source,
                fallback = selection.fallback,
                "volume selected"
            ),
            VolumeLookup::NotFound => debug!(novel_id = %novel_id, chapter, "no planning data"),
        }
        lookup
    }
}

impl std::fmt::Debug for VolumePlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumePlanner")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::SelectionSource;
    use chronicle_core::{new_novel_id, VolumeRecord};
    use chronicle_storage::MockEntityStore;
    use chronicle_test_utils::fixtures;

    #[tokio::test]
    async fn test_select_from_store() {
        let store = Arc::new(MockEntityStore::new());
        let novel = new_novel_id();
        store.set_volumes(novel, fixtures::five_volumes()).unwrap();
        store.set_planning_settings(novel, fixtures::five_by_five_hundred()).unwrap();

        let planner = VolumePlanner::new(store.clone(), PlannerPolicy::default());
        let before = store.mutation_count();
        let selection = planner.select_volume(novel, 101).await.into_selection().unwrap();

        assert_eq!(selection.volume_number, 2);
        assert_eq!(selection.source, SelectionSource::Persisted);
        assert_eq!(store.mutation_count(), before);
    }

    #[tokio::test]
    async fn test_unknown_novel_not_found() {
        let planner = VolumePlanner::new(Arc::new(MockEntityStore::new()), PlannerPolicy::default());
        assert_eq!(planner.select_volume(new_novel_id(), 12).await, VolumeLookup::NotFound);
    }

    #[tokio::test]
    async fn test_settings_only_is_fallback() {
        let store = Arc::new(MockEntityStore::new());
        let novel = new_novel_id();
        store.set_planning_settings(novel, fixtures::five_by_five_hundred()).unwrap();
        let planner = VolumePlanner::new(store, PlannerPolicy::default());

        let selection = planner.select_volume(novel, 42).await.into_selection().unwrap();
        assert!(selection.fallback);
        assert_eq!(selection.volume_number, 1);
    }

    #[tokio::test]
    async fn test_novels_are_isolated() {
        let store = Arc::new(MockEntityStore::new());
        let a = new_novel_id();
        let b = new_novel_id();
        store.set_volumes(a, vec![VolumeRecord::new(1, 1, 40)]).unwrap();
        let planner = VolumePlanner::new(store, PlannerPolicy::default());

        assert!(planner.select_volume(a, 10).await.is_found());
        assert_eq!(planner.select_volume(b, 10).await, VolumeLookup::NotFound);
    }
}
