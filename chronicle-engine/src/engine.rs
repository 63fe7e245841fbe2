//! Continuity engine facade.

use chronicle_context::{render_context, ContextAssembler, ContextWindow, OptimizedContext};
use chronicle_core::{
    ChapterNumber, ChapterSummary, ChapterText, ChronicleConfig, ChronicleResult, NovelId,
};
use chronicle_extract::{MergeReport, StateExtractor};
use chronicle_llm::TextGenerator;
use chronicle_planner::{VolumeLookup, VolumePlanner};
use chronicle_storage::{ChapterCleanup, EntityStore, VolumeStore};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type WriteLocks = DashMap<NovelId, Arc<Mutex<()>>>;

/// Result of a chapter regeneration: what the cleanup removed, then the
/// fresh extraction pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegenerationReport {
    /// `None` when the cleanup call failed
    pub cleanup: Option<ChapterCleanup>,
    pub merge: MergeReport,
}

/// Everything needed to write the next chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterPreparation {
    pub volume: VolumeLookup,
    pub context: OptimizedContext,
    pub window: ContextWindow,
}

/// Entry point for the three continuity engines.
///
/// Extraction passes for one novel run one at a time under a per-novel
/// lock. Context assembly and volume planning are read-only and take no
/// lock.
#[derive(Clone)]
pub struct ContinuityEngine {
    entities: Arc<dyn EntityStore>,
    extractor: Arc<StateExtractor>,
    assembler: ContextAssembler,
    planner: Arc<VolumePlanner>,
    config: ChronicleConfig,
    /// One entry per novel written through this engine. Entries stay until
    /// [`ContinuityEngine::release_idle_locks`] drops the ones nobody holds.
    write_locks: Arc<WriteLocks>,
}

impl ContinuityEngine {
    /// Build an engine. The configuration is validated first.
    pub fn new(
        entities: Arc<dyn EntityStore>,
        volumes: Arc<dyn VolumeStore>,
        generator: Arc<dyn TextGenerator>,
        config: ChronicleConfig,
    ) -> ChronicleResult<Self> {
        config.validate()?;
        Ok(Self {
            extractor: Arc::new(StateExtractor::new(
                entities.clone(),
                generator,
                config.extraction.clone(),
            )),
            assembler: ContextAssembler::new(config.budget.clone()),
            planner: Arc::new(VolumePlanner::new(volumes, config.planner.clone())),
            entities,
            config,
            write_locks: Arc::new(DashMap::new()),
        })
    }

    /// Build an engine over one store that serves both entities and volumes.
    pub fn with_store<S>(
        store: Arc<S>,
        generator: Arc<dyn TextGenerator>,
        config: ChronicleConfig,
    ) -> ChronicleResult<Self>
    where
        S: EntityStore + VolumeStore + 'static,
    {
        Self::new(store.clone(), store, generator, config)
    }

    pub fn config(&self) -> &ChronicleConfig {
        &self.config
    }

    /// The write lock for `novel_id`, created on first use.
    pub fn novel_lock(&self, novel_id: NovelId) -> Arc<Mutex<()>> {
        self.write_locks.entry(novel_id).or_default().clone()
    }

    /// Number of novels that currently have a write lock entry.
    pub fn tracked_novels(&self) -> usize {
        self.write_locks.len()
    }

    /// Drop lock entries that no caller holds. Returns how many were removed.
    pub fn release_idle_locks(&self) -> usize {
        let before = self.write_locks.len();
        self.write_locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        let released = before.saturating_sub(self.write_locks.len());
        if released > 0 {
            debug!(released, remaining = self.write_locks.len(), "idle write locks released");
        }
        released
    }

    // ========================================================================
    // EXTRACTION
    // ========================================================================

    /// Extract facts from a finished chapter and merge them into the store.
    /// Never fails; problems are described in the report.
    pub async fn extract_and_merge(
        &self,
        novel_id: NovelId,
        chapter: ChapterNumber,
        title: &str,
        text: &str,
    ) -> MergeReport {
        let lock = self.novel_lock(novel_id);
        let _guard = lock.lock().await;
        self.extractor
            .extract_and_merge(novel_id, chapter, title, text)
            .await
    }

    /// Run [`Self::extract_and_merge`] on a background task. The caller can
    /// acknowledge the chapter without awaiting the handle.
    pub fn spawn_extraction(
        &self,
        novel_id: NovelId,
        chapter: ChapterNumber,
        title: String,
        text: String,
    ) -> JoinHandle<MergeReport> {
        let engine = self.clone();
        tokio::spawn(async move {
            let report = engine
                .extract_and_merge(novel_id, chapter, &title, &text)
                .await;
            info!(
                novel_id = %novel_id,
                chapter,
                status = ?report.status,
                writes = report.writes(),
                failures = report.failures.len(),
                "background extraction finished"
            );
            report
        })
    }

    /// Remove what `chapter` contributed, then extract from its new text.
    /// Both steps run under the novel's write lock.
    pub async fn regenerate_chapter(
        &self,
        novel_id: NovelId,
        chapter: ChapterNumber,
        title: &str,
        text: &str,
    ) -> RegenerationReport {
        let lock = self.novel_lock(novel_id);
        let _guard = lock.lock().await;

        let cleanup = match self.entities.delete_chapter_entities(novel_id, chapter).await {
            Ok(cleanup) => {
                info!(novel_id = %novel_id, chapter, removed = cleanup.total(), "chapter entities removed");
                Some(cleanup)
            }
            Err(e) => {
                warn!(novel_id = %novel_id, chapter, error = %e, "chapter cleanup failed");
                None
            }
        };

        let merge = self
            .extractor
            .extract_and_merge(novel_id, chapter, title, text)
            .await;
        RegenerationReport { cleanup, merge }
    }

    // ========================================================================
    // CONTEXT AND PLANNING
    // ========================================================================

    /// Budgeted context for writing `chapter`. Read-only.
    pub async fn assemble_context(
        &self,
        novel_id: NovelId,
        chapter: ChapterNumber,
        recent_chapters: Vec<ChapterText>,
        summaries: Vec<ChapterSummary>,
    ) -> OptimizedContext {
        self.assembler
            .assemble_from_store(self.entities.as_ref(), novel_id, chapter, recent_chapters, summaries)
            .await
    }

    /// Render a context within the configured token budget.
    pub fn render(&self, context: &OptimizedContext) -> ContextWindow {
        render_context(context, self.config.budget.token_budget)
    }

    /// Volume that `chapter` belongs to. Read-only.
    pub async fn select_volume(&self, novel_id: NovelId, chapter: ChapterNumber) -> VolumeLookup {
        self.planner.select_volume(novel_id, chapter).await
    }

    /// Volume lookup, optimized context and rendered window in one call.
    pub async fn prepare_chapter(
        &self,
        novel_id: NovelId,
        chapter: ChapterNumber,
        recent_chapters: Vec<ChapterText>,
        summaries: Vec<ChapterSummary>,
    ) -> ChapterPreparation {
        let (volume, context) = tokio::join!(
            self.select_volume(novel_id, chapter),
            self.assemble_context(novel_id, chapter, recent_chapters, summaries),
        );
        let window = self.render(&context);
        ChapterPreparation {
            volume,
            context,
            window,
        }
    }
}

impl std::fmt::Debug for ContinuityEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContinuityEngine")
            .field("config", &self.config)
            .field("tracked_novels", &self.write_locks.len())
            .finish_non_exhaustive()
    }
}
