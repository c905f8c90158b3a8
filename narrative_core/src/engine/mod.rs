//! Context Engine - the orchestrator consumed by the generation loop.
//!
//! One engine serves one narrative. It reads the shared store to assemble
//! contexts and validate output, and it is the single writer that commits
//! accepted chapters and closes units. Collaborator calls never happen while
//! the store is locked for writing.

mod session;

pub use session::*;

use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use story_bible::{
    ChapterId, ChapterSummary, LifeStatus, NarrativeStateStore, SettingFact, StateError,
    TimelineEvent, UnitId,
};
use tracing::{debug, info, warn};

use crate::boundary::{BoundaryDecision, BoundaryDetector};
use crate::collaborators::{
    with_timeout, Generation, Generator, GoalJudge, NoRetrieval, Retriever, UpstreamError,
};
use crate::config::EngineConfig;
use crate::consistency::{
    describing_sentence, extract_markers, resolve_markers, ChapterText, ConsistencyTracker,
    NameIndex, Severity, ValidationReport,
};
use crate::context_assembler::{BudgetReport, ContextAssembler, Fragment, SummaryDraft};
use crate::error::Result;
use crate::ingest::ingest_characters;
use crate::stage::{NovelStage, StageParams};
use crate::text::split_sentences;

/// The narrative state shared between the engine and its callers.
pub type SharedStore = Arc<RwLock<NarrativeStateStore>>;

/// Wrap a store for sharing.
pub fn shared(store: NarrativeStateStore) -> SharedStore {
    Arc::new(RwLock::new(store))
}

/// Phrases that, right after a character's name, mark the character's death.
const DEATH_CUES: &[&str] = &[
    "died", "dies", "was killed", "is dead", "was slain", "perished", "死了", "死去", "身亡", "喪命",
    "丧命", "犧牲了", "牺牲了",
];

/// A context ready for the generation collaborator.
#[derive(Debug, Clone)]
pub struct BuiltContext {
    pub text: String,
    pub report: BudgetReport,
    pub fragments: Vec<Fragment>,
}

/// What committing a chapter recorded in the store.
#[derive(Debug, Clone)]
pub struct CommittedChapter {
    pub chapter_id: ChapterId,
    pub ordinal: u32,

    /// Timeline events recorded from the chapter's markers.
    pub timeline_events: usize,

    /// Markers that would have moved story time backwards.
    pub skipped_markers: Vec<String>,

    /// Setting subjects first described by this chapter.
    pub established_settings: Vec<String>,

    /// Characters who died in this chapter.
    pub deaths: Vec<String>,
}

/// Generated text for a chapter, not yet validated or committed.
#[derive(Debug, Clone)]
pub struct Draft {
    pub context: BuiltContext,
    pub stage: NovelStage,
    pub params: StageParams,
    pub generation: Generation,
}

pub struct ContextEngine {
    store: SharedStore,
    config: EngineConfig,
    assembler: ContextAssembler,
    boundary: BoundaryDetector,
    tracker: ConsistencyTracker,
    retriever: Arc<dyn Retriever>,
    goal_judge: Option<Arc<dyn GoalJudge>>,
    generator: Option<Arc<dyn Generator>>,
    session: Mutex<SessionCache>,
}

impl ContextEngine {
    /// Create an engine over a shared store. Retrieval is off until a
    /// retriever is attached.
    pub fn new(store: SharedStore, config: EngineConfig) -> Self {
        Self {
            assembler: ContextAssembler::new(
                config.tiers,
                config.retrieval_top_k,
                config.max_context_tokens,
            ),
            boundary: BoundaryDetector::new(config.boundary.clone()),
            tracker: ConsistencyTracker::standard(),
            retriever: Arc::new(NoRetrieval),
            goal_judge: None,
            generator: None,
            session: Mutex::new(SessionCache::new()),
            store,
            config,
        }
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = retriever;
        self
    }

    pub fn with_goal_judge(mut self, judge: Arc<dyn GoalJudge>) -> Self {
        self.goal_judge = Some(judge);
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_tracker(mut self, tracker: ConsistencyTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Assemble the context for chapter `chapter_ordinal` of an active unit.
    pub async fn build_context(&self, unit_id: UnitId, chapter_ordinal: u32) -> Result<BuiltContext> {
        let query = {
            let state = self.store.read().await;
            let unit = state.unit(unit_id)?;
            if unit.is_closed() {
                return Err(StateError::UnitClosed(unit.ordinal).into());
            }
            self.assembler.retrieval_query(&state, unit)
        };

        let retrieved = self
            .assembler
            .retrieval()
            .search(self.retriever.as_ref(), &query, self.config.timeouts.retrieval())
            .await;

        let state = self.store.read().await;
        let unit = state.unit(unit_id)?;
        let context = self
            .assembler
            .assemble(&state, unit, chapter_ordinal, &retrieved)?;

        info!(
            unit = unit.ordinal,
            chapter = chapter_ordinal,
            fragments = context.fragments.len(),
            used_tokens = context.report.used_tokens,
            max_tokens = context.report.max_tokens,
            dropped = ?context.report.dropped,
            retrieval_degraded = context.report.retrieval_degraded,
            "context built"
        );

        Ok(BuiltContext {
            text: context.to_prompt_string(),
            report: context.report,
            fragments: context.fragments,
        })
    }

    /// Validate generated chapter text against the current state. Never mutates the store.
    pub async fn validate_output(&self, unit_id: UnitId, chapter_text: &str) -> Result<ValidationReport> {
        let state = self.store.read().await;
        let unit = state.unit(unit_id)?;
        let names = self.session.lock().await.names(&state);

        let issues = self.tracker.check(chapter_text, &state, &names);
        let report = ValidationReport::new(issues, &self.config.policy);

        info!(
            unit = unit.ordinal,
            critical = report.count(Severity::Critical),
            high = report.count(Severity::High),
            medium = report.count(Severity::Medium),
            low = report.count(Severity::Low),
            verdict = ?report.verdict,
            "chapter validated"
        );
        Ok(report)
    }

    /// Decide whether a unit has reached its dramatic completion.
    pub async fn evaluate_boundary(&self, unit_id: UnitId) -> Result<BoundaryDecision> {
        let (unit, recent) = {
            let state = self.store.read().await;
            let unit = state.unit(unit_id)?.clone();
            let recent: Vec<String> = state
                .last_chapters(unit_id, self.config.boundary.recent_chapters)
                .into_iter()
                .map(|c| c.text.clone())
                .collect();
            (unit, recent)
        };

        let decision = self
            .boundary
            .evaluate(
                &unit,
                &recent,
                self.goal_judge.as_deref(),
                self.config.timeouts.goal_check(),
            )
            .await;

        info!(
            unit = unit.ordinal,
            actual = unit.actual_chapters,
            estimated = unit.estimated_chapters,
            should_close = decision.should_close,
            reason = %decision.reason,
            votes = ?decision.votes,
            "boundary evaluated"
        );
        Ok(decision)
    }

    /// Accept a chapter and record what it establishes: its digest, timeline
    /// markers, first descriptions of declared setting subjects, and deaths.
    pub async fn commit_chapter(
        &self,
        unit_id: UnitId,
        text: impl Into<String>,
        digest: impl Into<String>,
    ) -> Result<CommittedChapter> {
        let text = text.into();
        let mut state = self.store.write().await;

        let (chapter_id, ordinal) = {
            let chapter = state.accept_chapter(unit_id, text.as_str())?;
            (chapter.id, chapter.ordinal)
        };
        state.put_chapter_summary(ChapterSummary::new(chapter_id, digest))?;

        let chapter = ChapterText::parse(&text);

        let mut timeline_events = 0;
        let mut skipped_markers = Vec::new();
        let start = state.timeline().current_position();
        for resolved in resolve_markers(extract_markers(&chapter), start) {
            if resolved.regresses() {
                warn!(
                    marker = %resolved.marker.label,
                    position = resolved.position,
                    established = resolved.established,
                    "skipping marker that moves time backwards"
                );
                skipped_markers.push(resolved.marker.label);
                continue;
            }
            let mut event = TimelineEvent::new(
                chapter_id,
                resolved.marker.label.clone(),
                resolved.marker.kind(),
                resolved.position,
            );
            if resolved.marker.flashback {
                event = event.as_flashback();
            }
            match state.record_timeline_event(event) {
                Ok(()) => timeline_events += 1,
                Err(error) => {
                    warn!(%error, "timeline event rejected");
                    skipped_markers.push(resolved.marker.label);
                }
            }
        }

        let subjects: Vec<String> = state
            .settings()
            .undescribed_subjects()
            .map(String::from)
            .collect();
        let mut established_settings = Vec::new();
        for key in subjects {
            let description = chapter
                .present()
                .find_map(|p| describing_sentence(&p.text, &key).map(String::from));
            if let Some(description) = description {
                if state.establish_setting(SettingFact::new(&key, description, chapter_id)) {
                    established_settings.push(key);
                }
            }
        }

        let names = self.session.lock().await.names(&state);
        let mut deaths = Vec::new();
        for name in detect_deaths(&chapter, &names) {
            let alive = state.character(&name).is_some_and(|c| !c.is_dead());
            if alive {
                state.update_life_status(&name, LifeStatus::Dead, Some(chapter_id), false)?;
                deaths.push(name);
            }
        }

        info!(
            chapter = ordinal,
            timeline_events,
            skipped = skipped_markers.len(),
            established = ?established_settings,
            deaths = ?deaths,
            "chapter committed"
        );

        Ok(CommittedChapter {
            chapter_id,
            ordinal,
            timeline_events,
            skipped_markers,
            established_settings,
            deaths,
        })
    }

    /// Close a unit and store its precomputed summary tiers.
    ///
    /// Tiers are derived before the store is locked for writing.
    pub async fn close_unit(
        &self,
        unit_id: UnitId,
        reason: impl Into<String>,
        draft: SummaryDraft,
    ) -> Result<()> {
        {
            let state = self.store.read().await;
            let unit = state.unit(unit_id)?;
            if unit.is_closed() {
                return Err(StateError::UnitClosed(unit.ordinal).into());
            }
        }

        let summary = self.assembler.compressor().precompute(unit_id, &draft);

        let mut state = self.store.write().await;
        state.close_unit(unit_id, reason)?;
        state.put_unit_summary(summary)?;

        let unit = state.unit(unit_id)?;
        info!(
            unit = unit.ordinal,
            chapters = unit.actual_chapters,
            reason = unit.close_reason.as_deref().unwrap_or_default(),
            "unit closed"
        );
        Ok(())
    }

    /// Parse collaborator output describing characters and register them all.
    /// A name clash registers none of them.
    pub async fn register_characters(&self, output: &str) -> Result<usize> {
        let profiles = ingest_characters(output)?;
        let names: Vec<String> = profiles.iter().map(|p| p.name.clone()).collect();

        let mut state = self.store.write().await;
        state.register_characters(profiles)?;
        debug!(names = ?names, "characters registered");
        Ok(names.len())
    }

    /// Build the context for a chapter and generate it under the stage
    /// parameters for its position in the story. Nothing is committed.
    pub async fn draft_chapter(
        &self,
        unit_id: UnitId,
        chapter_ordinal: u32,
        total_chapters: u32,
    ) -> Result<Draft> {
        let generator = self
            .generator
            .clone()
            .ok_or_else(|| UpstreamError::Permanent("no generator configured".to_string()))?;

        let context = self.build_context(unit_id, chapter_ordinal).await?;

        let story_chapter = {
            let state = self.store.read().await;
            let unit = state.unit(unit_id)?;
            state
                .units_before(unit.ordinal)
                .iter()
                .map(|u| u.actual_chapters)
                .sum::<u32>()
                + chapter_ordinal
        };
        let (stage, params) = self.config.stages.for_chapter(story_chapter, total_chapters);

        let generation = with_timeout(
            self.config.timeouts.generation(),
            generator.generate(&context.text, &params),
        )
        .await?;

        info!(
            chapter = story_chapter,
            %stage,
            input_tokens = generation.usage.input_tokens,
            output_tokens = generation.usage.output_tokens,
            "chapter drafted"
        );

        Ok(Draft {
            context,
            stage,
            params,
            generation,
        })
    }
}

/// Registered characters named right before a death cue outside flashbacks.
fn detect_deaths(chapter: &ChapterText, names: &NameIndex) -> Vec<String> {
    let mut deaths: Vec<String> = Vec::new();
    for paragraph in chapter.present() {
        for sentence in split_sentences(&paragraph.text) {
            let lower = sentence.to_lowercase();
            for cue in DEATH_CUES {
                for (index, _) in lower.match_indices(*cue) {
                    if let Some(name) = names.name_ending(&lower[..index]) {
                        if !deaths.iter().any(|d| d == name) {
                            deaths.push(name.to_string());
                        }
                    }
                }
            }
        }
    }
    deaths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::BoundaryReason;
    use crate::collaborators::{RetrievalHit, TokenUsage};
    use crate::consistency::{IssueKind, Verdict};
    use crate::context_assembler::{FragmentKind, TierPolicy};
    use crate::error::EngineError;
    use async_trait::async_trait;
    use std::time::Duration;
    use story_bible::{CharacterProfile, SummaryTier, Unit};

    struct FixedJudge(bool);

    #[async_trait]
    impl GoalJudge for FixedJudge {
        async fn goal_achieved(&self, _goal: &str, _recent: &[String]) -> std::result::Result<bool, UpstreamError> {
            Ok(self.0)
        }
    }

    struct StaticRetriever(Vec<RetrievalHit>);

    #[async_trait]
    impl Retriever for StaticRetriever {
        async fn search(&self, _query: &str, _top_k: usize) -> std::result::Result<Vec<RetrievalHit>, UpstreamError> {
            Ok(self.0.clone())
        }
    }

    struct FailingRetriever;

    #[async_trait]
    impl Retriever for FailingRetriever {
        async fn search(&self, _query: &str, _top_k: usize) -> std::result::Result<Vec<RetrievalHit>, UpstreamError> {
            Err(UpstreamError::Transient("connection reset".into()))
        }
    }

    struct EchoGenerator;

    #[async_trait]
    impl Generator for EchoGenerator {
        async fn generate(&self, context: &str, params: &StageParams) -> std::result::Result<Generation, UpstreamError> {
            Ok(Generation {
                text: format!("Generated at temperature {}.", params.temperature),
                usage: TokenUsage {
                    input_tokens: context.len() as u32,
                    output_tokens: 5,
                },
            })
        }
    }

    struct StalledGenerator;

    #[async_trait]
    impl Generator for StalledGenerator {
        async fn generate(&self, _context: &str, _params: &StageParams) -> std::result::Result<Generation, UpstreamError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Err(UpstreamError::Transient("unreachable".into()))
        }
    }

    fn engine_with(store: NarrativeStateStore) -> ContextEngine {
        ContextEngine::new(shared(store), EngineConfig::default())
    }

    async fn add_unit(engine: &ContextEngine, unit: Unit) -> UnitId {
        engine.store().write().await.add_unit(unit)
    }

    async fn fill(engine: &ContextEngine, unit_id: UnitId, count: u32) -> Vec<ChapterId> {
        let mut ids = Vec::new();
        for n in 1..=count {
            let committed = engine
                .commit_chapter(
                    unit_id,
                    format!("The crew kept working through shift {}.", n),
                    format!("Shift {} passed.", n),
                )
                .await
                .unwrap();
            ids.push(committed.chapter_id);
        }
        ids
    }

    async fn closed_units(engine: &ContextEngine, count: u32) {
        for ordinal in 1..=count {
            let id = add_unit(engine, Unit::new(ordinal, format!("Volume {}", ordinal), "goal", 10)).await;
            engine
                .close_unit(
                    id,
                    "goal achieved",
                    SummaryDraft::new(format!("Full account of volume {}, with every turn.", ordinal))
                        .with_medium(format!("Medium account of volume {}.", ordinal))
                        .with_minimal(format!("Volume {}.", ordinal)),
                )
                .await
                .unwrap();
        }
    }

    fn tally(tiers: &[(u32, SummaryTier)], tier: SummaryTier) -> usize {
        tiers.iter().filter(|(_, t)| *t == tier).count()
    }

    #[tokio::test]
    async fn test_boundary_before_window() {
        let engine = engine_with(NarrativeStateStore::new());
        let unit = add_unit(&engine, Unit::new(1, "Siege", "The fortress falls", 12)).await;
        fill(&engine, unit, 9).await;

        let decision = engine.evaluate_boundary(unit).await.unwrap();

        assert!(!decision.should_close);
        assert_eq!(decision.reason_text(), "chapter count not reached");
    }

    #[tokio::test]
    async fn test_boundary_hard_cap_overrides_signals() {
        let engine = engine_with(NarrativeStateStore::new()).with_goal_judge(Arc::new(FixedJudge(false)));
        let unit = add_unit(&engine, Unit::new(1, "Siege", "The fortress falls", 12)).await;
        fill(&engine, unit, 15).await;

        let decision = engine.evaluate_boundary(unit).await.unwrap();

        assert!(decision.should_close);
        assert_eq!(decision.reason, BoundaryReason::HardCapExceeded);
        assert_eq!(decision.reason_text(), "hard cap exceeded");
    }

    #[tokio::test]
    async fn test_boundary_signals_close_unit() {
        let engine = engine_with(NarrativeStateStore::new()).with_goal_judge(Arc::new(FixedJudge(true)));
        let unit = add_unit(&engine, Unit::new(1, "Siege", "The fortress falls", 10)).await;
        fill(&engine, unit, 9).await;
        engine
            .commit_chapter(unit, "At last the fortress falls to the rebels.", "The fortress falls.")
            .await
            .unwrap();

        let decision = engine.evaluate_boundary(unit).await.unwrap();
        assert!(decision.should_close);
        assert_eq!(decision.votes.map(|v| v.yes_count()), Some(3));
    }

    #[tokio::test]
    async fn test_history_tiers_by_distance() {
        let mut store = NarrativeStateStore::new();
        store.set_outline("A crew drifts between stations for seventeen volumes.");
        let engine = engine_with(store);
        closed_units(&engine, 16).await;
        let active = add_unit(&engine, Unit::new(17, "Volume 17", "goal", 10)).await;
        fill(&engine, active, 7).await;

        let context = engine.build_context(active, 8).await.unwrap();
        let tiers = &context.report.history_tiers;

        assert_eq!(tiers.len(), 16);
        assert_eq!(tally(tiers, SummaryTier::Minimal), 11);
        assert_eq!(tally(tiers, SummaryTier::Medium), 3);
        assert_eq!(tally(tiers, SummaryTier::Full), 2);
        let ordinals: Vec<u32> = tiers.iter().map(|(o, _)| *o).collect();
        assert_eq!(ordinals, (1..=16).collect::<Vec<_>>());
        assert!(tiers[..11].iter().all(|(_, t)| *t == SummaryTier::Minimal));

        let history: Vec<&Fragment> = context
            .fragments
            .iter()
            .filter(|f| matches!(f.kind, FragmentKind::UnitHistory { .. }))
            .collect();
        assert_eq!(history.len(), 16);
        assert_eq!(history[0].text, "Volume 1.");
        assert_eq!(history[15].text, "Full account of volume 16, with every turn.");

        assert!(context.text.starts_with("## Story outline"));
        assert!(context.text.trim_end().ends_with("The crew kept working through shift 7."));
        assert!(context.text.contains("Shift 6 passed."));
    }

    #[tokio::test]
    async fn test_history_tiers_with_single_full_unit() {
        let config = EngineConfig {
            tiers: TierPolicy {
                full_within: 1,
                medium_within: 5,
            },
            ..EngineConfig::default()
        };
        let engine = ContextEngine::new(shared(NarrativeStateStore::new()), config);
        closed_units(&engine, 16).await;
        let active = add_unit(&engine, Unit::new(17, "Volume 17", "goal", 10)).await;
        fill(&engine, active, 7).await;

        let context = engine.build_context(active, 8).await.unwrap();
        let tiers = &context.report.history_tiers;

        assert_eq!(tally(tiers, SummaryTier::Minimal), 11);
        assert_eq!(tally(tiers, SummaryTier::Medium), 4);
        assert_eq!(tally(tiers, SummaryTier::Full), 1);
        assert_eq!(tiers[15], (16, SummaryTier::Full));
    }

    #[tokio::test]
    async fn test_setting_contradiction_across_chapters() {
        let mut store = NarrativeStateStore::new();
        store.declare_setting("research station");
        let engine = engine_with(store);
        let unit = add_unit(&engine, Unit::new(1, "Arrival", "Reach the station", 10)).await;

        let committed = engine
            .commit_chapter(
                unit,
                "Snow buried the ridge. The research station is abandoned, its antenna bent.",
                "They find the station.",
            )
            .await
            .unwrap();
        assert_eq!(committed.established_settings, vec!["research station"]);

        let report = engine
            .validate_output(unit, "By noon they walked into a bustling station.")
            .await
            .unwrap();

        let issue = report
            .issues
            .iter()
            .find(|i| i.kind.code() == "setting_contradiction")
            .unwrap();
        assert!(issue.severity >= Severity::Medium);
    }

    #[tokio::test]
    async fn test_dead_character_rejected_after_commit() {
        let mut store = NarrativeStateStore::new();
        store.register_character(CharacterProfile::new("Mira")).unwrap();
        store.register_character(CharacterProfile::new("Jonas")).unwrap();
        let engine = engine_with(store);
        let unit = add_unit(&engine, Unit::new(1, "Blast", "Survive the blast", 10)).await;

        let committed = engine
            .commit_chapter(unit, "Mira screamed as Jonas died in the blast.", "Jonas dies.")
            .await
            .unwrap();
        assert_eq!(committed.deaths, vec!["Jonas"]);

        let report = engine
            .validate_output(unit, "Jonas walked into the mess hall.")
            .await
            .unwrap();
        assert_eq!(report.verdict, Verdict::Reject);
        assert!(report.has_critical());
        assert!(matches!(
            report.into_result(),
            Err(EngineError::ConsistencyCritical { .. })
        ));

        let report = engine
            .validate_output(unit, "Mira remembered Jonas laughing in the galley.")
            .await
            .unwrap();
        assert_eq!(report.verdict, Verdict::Accept);
    }

    #[tokio::test]
    async fn test_clean_chapter_has_no_high_issues() {
        let mut store = NarrativeStateStore::new();
        store
            .register_character(CharacterProfile::new("Mira").with_ability("piloting"))
            .unwrap();
        let engine = engine_with(store);
        let unit = add_unit(&engine, Unit::new(1, "Launch", "Leave orbit", 10)).await;
        engine.commit_chapter(unit, "Day 2. Mira checked the engines.", "Checks.").await.unwrap();

        let report = engine
            .validate_output(unit, "The next morning Mira said the launch was on.")
            .await
            .unwrap();

        assert!(report.issues.iter().all(|i| i.severity < Severity::High), "{:?}", report.issues);
        assert_eq!(report.verdict, Verdict::Accept);
    }

    #[tokio::test]
    async fn test_commit_records_timeline_and_skips_regressions() {
        let engine = engine_with(NarrativeStateStore::new());
        let unit = add_unit(&engine, Unit::new(1, "Drift", "Find land", 10)).await;

        let first = engine
            .commit_chapter(unit, "Day 3 began with rain. Two days later the sky cleared.", "Rain.")
            .await
            .unwrap();
        assert_eq!(first.timeline_events, 2);

        let second = engine.commit_chapter(unit, "Day 4 was calm.", "Calm.").await.unwrap();
        assert_eq!(second.skipped_markers, vec!["Day 4"]);
        assert_eq!(engine.store().read().await.timeline().current_position(), 5);

        let report = engine.validate_output(unit, "On Day 1 they set sail.").await.unwrap();
        assert!(report
            .issues
            .iter()
            .any(|i| matches!(i.kind, IssueKind::TimelineError { position: 1, established: 5, .. })));
        assert_eq!(report.verdict, Verdict::Warn);
    }

    #[tokio::test]
    async fn test_retrieval_hits_ranked_and_deduplicated() {
        let engine = engine_with(NarrativeStateStore::new());
        let first = add_unit(&engine, Unit::new(1, "Volume 1", "goal", 10)).await;
        let old = fill(&engine, first, 3).await;
        engine
            .close_unit(first, "goal achieved", SummaryDraft::new("Volume one in brief."))
            .await
            .unwrap();
        let second = add_unit(&engine, Unit::new(2, "Volume 2", "goal", 10)).await;
        let recent = fill(&engine, second, 2).await;

        let hit = |chapter_id: ChapterId, score: f32| RetrievalHit {
            chapter_id,
            snippet: format!("snippet scored {}", score),
            score,
        };
        let retriever = StaticRetriever(vec![hit(old[1], 0.5), hit(recent[0], 1.0), hit(old[0], 0.9)]);
        let engine = ContextEngine::new(Arc::clone(engine.store()), EngineConfig::default())
            .with_retriever(Arc::new(retriever));

        let context = engine.build_context(second, 3).await.unwrap();

        let retrieved: Vec<(u32, u32)> = context
            .fragments
            .iter()
            .filter_map(|f| match f.kind {
                FragmentKind::Retrieved {
                    unit_ordinal,
                    chapter_ordinal,
                } => Some((unit_ordinal, chapter_ordinal)),
                _ => None,
            })
            .collect();
        assert_eq!(retrieved, vec![(1, 1), (1, 2)]);
        assert!(!context.report.retrieval_degraded);
    }

    #[tokio::test]
    async fn test_retrieval_failure_degrades() {
        let engine = engine_with(NarrativeStateStore::new()).with_retriever(Arc::new(FailingRetriever));
        let unit = add_unit(&engine, Unit::new(1, "Volume 1", "goal", 10)).await;
        fill(&engine, unit, 1).await;

        let context = engine.build_context(unit, 2).await.unwrap();

        assert!(context.report.retrieval_degraded);
        assert!(context.text.contains("shift 1"));
    }

    #[tokio::test]
    async fn test_required_fragments_over_budget() {
        let mut store = NarrativeStateStore::new();
        store.set_outline("word ".repeat(500));
        let config = EngineConfig {
            max_context_tokens: 100,
            ..EngineConfig::default()
        };
        let engine = ContextEngine::new(shared(store), config);
        let unit = add_unit(&engine, Unit::new(1, "Volume 1", "goal", 10)).await;

        let err = engine.build_context(unit, 1).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::BudgetInfeasible {
                max_tokens: 100,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_summary_is_surfaced() {
        let engine = engine_with(NarrativeStateStore::new());
        let first = add_unit(&engine, Unit::new(1, "Volume 1", "goal", 10)).await;
        engine.store().write().await.close_unit(first, "forced").unwrap();
        let second = add_unit(&engine, Unit::new(2, "Volume 2", "goal", 10)).await;

        let err = engine.build_context(second, 1).await.unwrap_err();
        assert!(matches!(err, EngineError::SummaryMissing { unit_ordinal: 1 }));
    }

    #[tokio::test]
    async fn test_closed_unit_rejects_context_and_commit() {
        let engine = engine_with(NarrativeStateStore::new());
        let unit = add_unit(&engine, Unit::new(1, "Volume 1", "goal", 10)).await;
        engine
            .close_unit(unit, "goal achieved", SummaryDraft::new("Done."))
            .await
            .unwrap();

        assert!(matches!(
            engine.build_context(unit, 1).await,
            Err(EngineError::State(StateError::UnitClosed(1)))
        ));
        assert!(engine.commit_chapter(unit, "More.", "More.").await.is_err());
        assert!(engine.close_unit(unit, "again", SummaryDraft::new("x")).await.is_err());
    }

    #[tokio::test]
    async fn test_draft_uses_stage_params_and_never_commits() {
        let engine = engine_with(NarrativeStateStore::new()).with_generator(Arc::new(EchoGenerator));
        let unit = add_unit(&engine, Unit::new(1, "Volume 1", "goal", 10)).await;
        fill(&engine, unit, 2).await;
        let revision = engine.store().read().await.revision();

        let draft = engine.draft_chapter(unit, 3, 100).await.unwrap();

        assert_eq!(draft.stage, NovelStage::Opening);
        assert_eq!(draft.params.temperature, 0.65);
        assert!(draft.generation.text.contains("0.65"));
        assert_eq!(engine.store().read().await.revision(), revision);
    }

    #[tokio::test]
    async fn test_draft_timeout_leaves_store_untouched() {
        let mut config = EngineConfig::default();
        config.timeouts.generation_ms = 10;
        let engine = ContextEngine::new(shared(NarrativeStateStore::new()), config)
            .with_generator(Arc::new(StalledGenerator));
        let unit = add_unit(&engine, Unit::new(1, "Volume 1", "goal", 10)).await;
        let revision = engine.store().read().await.revision();

        let err = engine.draft_chapter(unit, 1, 10).await.unwrap_err();

        assert!(matches!(err, EngineError::UpstreamFailure(UpstreamError::Timeout(_))));
        assert_eq!(engine.store().read().await.revision(), revision);
    }

    #[tokio::test]
    async fn test_draft_without_generator() {
        let engine = engine_with(NarrativeStateStore::new());
        let unit = add_unit(&engine, Unit::new(1, "Volume 1", "goal", 10)).await;
        assert!(matches!(
            engine.draft_chapter(unit, 1, 10).await,
            Err(EngineError::UpstreamFailure(UpstreamError::Permanent(_)))
        ));
    }

    #[tokio::test]
    async fn test_death_needs_whole_name() {
        let mut store = NarrativeStateStore::new();
        store.register_character(CharacterProfile::new("Mira")).unwrap();
        let engine = engine_with(store);
        let unit = add_unit(&engine, Unit::new(1, "Blast", "Survive the blast", 10)).await;

        let committed = engine
            .commit_chapter(unit, "The stranger Kamira died in the blast.", "A stranger dies.")
            .await
            .unwrap();

        assert!(committed.deaths.is_empty());
        assert!(!engine.store().read().await.character("Mira").unwrap().is_dead());
        let report = engine.validate_output(unit, "Mira sealed the hatch.").await.unwrap();
        assert!(!report.has_critical());
    }

    #[tokio::test]
    async fn test_oversized_day_numbers_are_ignored() {
        let engine = engine_with(NarrativeStateStore::new());
        let unit = add_unit(&engine, Unit::new(1, "Drift", "Find land", 10)).await;
        let text = "Day 9223372036854775807 began. The next day, the crew slept.";

        let report = engine.validate_output(unit, text).await.unwrap();
        assert!(report.issues.is_empty(), "{:?}", report.issues);

        let committed = engine.commit_chapter(unit, text, "The crew slept.").await.unwrap();
        assert_eq!(committed.timeline_events, 1);
        assert_eq!(engine.store().read().await.timeline().current_position(), 1);
    }

    #[tokio::test]
    async fn test_memory_cue_does_not_shield_present_action() {
        let mut store = NarrativeStateStore::new();
        store.register_character(CharacterProfile::new("Mira")).unwrap();
        store.register_character(CharacterProfile::new("Jonas")).unwrap();
        let engine = engine_with(store);
        let unit = add_unit(&engine, Unit::new(1, "Blast", "Survive the blast", 10)).await;
        engine
            .commit_chapter(unit, "Jonas died in the blast.", "Jonas dies.")
            .await
            .unwrap();

        let report = engine
            .validate_output(
                unit,
                "Jonas walked into the hangar and took the controls. Mira remembered the code.",
            )
            .await
            .unwrap();

        assert_eq!(report.verdict, Verdict::Reject);
        assert!(report
            .issues
            .iter()
            .any(|i| i.kind.code() == "dead_character_appears" && i.severity == Severity::Critical));
    }

    #[tokio::test]
    async fn test_register_characters_is_all_or_nothing() {
        let engine = engine_with(NarrativeStateStore::new());
        let revision = engine.store().read().await.revision();

        let result = engine
            .register_characters("[{\"name\": \"Voss\"}, {\"name\": \"Voss\"}]")
            .await;

        assert!(matches!(
            result,
            Err(EngineError::State(StateError::DuplicateCharacter(_)))
        ));
        let state = engine.store().read().await;
        assert!(state.character("Voss").is_none());
        assert_eq!(state.revision(), revision);
    }

    #[tokio::test]
    async fn test_register_characters_from_output() {
        let engine = engine_with(NarrativeStateStore::new());
        let output = "Here you go:\n```json\n[{\"角色名\": \"林月\", \"別名\": \"月兒\"}, {\"name\": \"Voss\"}]\n```";

        assert_eq!(engine.register_characters(output).await.unwrap(), 2);

        let unit = add_unit(&engine, Unit::new(1, "Volume 1", "goal", 10)).await;
        let report = engine.validate_output(unit, "\"Move,\" Voss said.").await.unwrap();
        assert!(report.issues.is_empty());
        assert_eq!(
            engine.store().read().await.character("月兒").map(|c| c.name.clone()),
            Some("林月".to_string())
        );
    }
}
