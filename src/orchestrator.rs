//! Turn orchestrator
//!
//! Owns the session: both history threads, the session flags and the scene
//! image handle. Two operations drive it:
//!
//! - `submit_turn` advances the story. The first turn runs image generation,
//!   vision grounding and choice generation in sequence (each depends on the
//!   previous result). Later turns run image and choice generation
//!   concurrently and join both.
//! - `submit_refinement` edits the current scene. It touches only the image
//!   thread.
//!
//! Service calls work on snapshots. Nothing reaches the live threads until
//! every call of the operation has succeeded, so a failure at any step leaves
//! the session exactly as it was.

mod scene;

use scene::SceneImage;

use crate::error::StoryError;
use crate::history::{Actor, HistoryEntry, HistoryStore, Part, SessionState, Snapshot, Thread};
use crate::prompts::{self, InstructionMode, Style, Theme};
use crate::services::{
    ChoiceGeneration, Choices, GeneratedImage, ImageGeneration, ImageRequest, ServiceResult,
    VisionGrounding,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinError;
use tracing::Instrument;

/// Caller-supplied parameters for one turn
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub action: String,
    /// Omitted theme or style keeps the session's current one
    pub theme: Option<String>,
    pub style: Option<String>,
}

/// Concurrency state of the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    Busy,
}

/// Per-step durations of a committed turn
#[derive(Debug, Clone, Default)]
pub struct TurnTimings {
    pub image: Duration,
    /// Only the first turn is grounded
    pub grounding: Option<Duration>,
    pub choices: Duration,
    pub total: Duration,
}

/// Result bundle of a successful turn
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// 1-based number of this turn
    pub turn: u32,
    pub image: GeneratedImage,
    pub choices: Choices,
    pub timings: TurnTimings,
    pub scene_path: Option<PathBuf>,
}

/// Result of a successful refinement
#[derive(Debug, Clone)]
pub struct RefinementOutcome {
    pub image: GeneratedImage,
    pub elapsed: Duration,
    pub scene_path: Option<PathBuf>,
}

/// Read-only view of the session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub turn_started: bool,
    pub in_flight: bool,
    pub turns: u32,
    pub image_thread_len: usize,
    pub narrative_thread_len: usize,
    pub choices: Option<Choices>,
    pub theme: &'static str,
    pub style: &'static str,
    pub scene_path: Option<PathBuf>,
}

struct Session {
    history: HistoryStore,
    flags: SessionState,
    turns: u32,
    /// Theme and style of the last successful turn, reused by refinements
    theme: &'static Theme,
    style: &'static Style,
    choices: Option<Choices>,
    scene: Option<SceneImage>,
}

impl Session {
    fn new() -> Self {
        let (theme, style) = prompts::defaults();
        Self {
            history: HistoryStore::new(),
            flags: SessionState::default(),
            turns: 0,
            theme,
            style,
            choices: None,
            scene: None,
        }
    }

    /// Back to a fresh session. Hands back the scene handle for release.
    fn reset(&mut self) -> Option<SceneImage> {
        let (theme, style) = prompts::defaults();
        self.history.reset();
        self.flags = SessionState::default();
        self.turns = 0;
        self.theme = theme;
        self.style = style;
        self.choices = None;
        self.scene.take()
    }
}

fn release_scene(scene: SceneImage) {
    let path = scene.path().to_path_buf();
    if let Err(e) = scene.release() {
        tracing::warn!(path = %path.display(), error = %e, "Failed to release scene image");
    }
}

/// Service results of a turn that has not been committed yet
struct PendingTurn {
    image: ServiceResult<GeneratedImage>,
    grounding: Option<ServiceResult<String>>,
    choices: ServiceResult<Choices>,
    /// Entries for the narrative thread, choices entry excluded
    narrative: Vec<HistoryEntry>,
}

/// Clears `in_flight` when the operation ends, however it ends
struct InFlight<'a> {
    session: &'a Mutex<Session>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock(self.session).flags.in_flight = false;
    }
}

fn lock(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drives turns and refinements against the three generation services
pub struct TurnOrchestrator<I, C, V> {
    image: Arc<I>,
    choices: Arc<C>,
    grounding: Arc<V>,
    session: Mutex<Session>,
    scene_dir: PathBuf,
}

impl<I, C, V> TurnOrchestrator<I, C, V>
where
    I: ImageGeneration + 'static,
    C: ChoiceGeneration + 'static,
    V: VisionGrounding + 'static,
{
    pub fn new(image: I, choices: C, grounding: V, scene_dir: impl Into<PathBuf>) -> Self {
        Self {
            image: Arc::new(image),
            choices: Arc::new(choices),
            grounding: Arc::new(grounding),
            session: Mutex::new(Session::new()),
            scene_dir: scene_dir.into(),
        }
    }

    pub fn state(&self) -> OrchestratorState {
        if lock(&self.session).flags.in_flight {
            OrchestratorState::Busy
        } else {
            OrchestratorState::Idle
        }
    }

    pub fn session_state(&self) -> SessionState {
        lock(&self.session).flags
    }

    pub fn thread_len(&self, thread: Thread) -> usize {
        lock(&self.session).history.len(thread)
    }

    #[allow(dead_code)] // Used by tests
    pub fn snapshot(&self, thread: Thread) -> Snapshot {
        lock(&self.session).history.snapshot(thread)
    }

    pub fn summary(&self) -> SessionSummary {
        let session = lock(&self.session);
        SessionSummary {
            turn_started: session.flags.turn_started,
            in_flight: session.flags.in_flight,
            turns: session.turns,
            image_thread_len: session.history.len(Thread::Image),
            narrative_thread_len: session.history.len(Thread::Narrative),
            choices: session.choices.clone(),
            theme: session.theme.name,
            style: session.style.name,
            scene_path: session.scene.as_ref().map(|s| s.path().to_path_buf()),
        }
    }

    /// Bytes and MIME type of the current scene image
    pub fn scene(&self) -> Option<(Arc<[u8]>, String)> {
        lock(&self.session)
            .scene
            .as_ref()
            .map(|s| (s.data(), s.mime_type().to_string()))
    }

    /// Check and set `in_flight` in one critical section
    fn begin(&self) -> Result<InFlight<'_>, StoryError> {
        let mut session = lock(&self.session);
        if session.flags.in_flight {
            tracing::debug!("Rejecting submission, operation already in flight");
            return Err(StoryError::Busy);
        }
        session.flags.in_flight = true;
        Ok(InFlight {
            session: &self.session,
        })
    }

    /// Run one turn and commit it, or fail and commit nothing.
    pub async fn submit_turn(&self, request: TurnRequest) -> Result<TurnOutcome, StoryError> {
        let action = request.action.trim().to_string();
        if action.is_empty() {
            return Err(StoryError::invalid_input("Action text is empty"));
        }

        let _in_flight = self.begin()?;
        let (image_history, narrative_history, turn_started, turn, theme, style) = {
            let session = lock(&self.session);
            (
                session.history.snapshot(Thread::Image),
                session.history.snapshot(Thread::Narrative),
                session.flags.turn_started,
                session.turns + 1,
                request.theme.as_deref().map_or(session.theme, prompts::theme),
                request.style.as_deref().map_or(session.style, prompts::style),
            )
        };

        let pipeline = if turn_started { "concurrent" } else { "sequential" };
        let span = tracing::info_span!(
            "turn",
            turn,
            pipeline,
            theme = theme.name,
            style = style.name
        );
        let started = Instant::now();

        let result = async {
            if turn_started {
                self.run_concurrent(image_history, narrative_history, &action, theme, style)
                    .await
            } else {
                self.run_sequential(image_history, narrative_history, &action, theme, style)
                    .await
            }
        }
        .instrument(span.clone())
        .await;

        let pending = match result {
            Ok(pending) => pending,
            Err(e) => {
                span.in_scope(|| {
                    tracing::warn!(
                        kind = e.kind().as_str(),
                        error = %e,
                        "Turn failed, history unchanged"
                    );
                });
                return Err(e);
            }
        };

        let (mut outcome, old_scene) =
            self.commit_turn(pending, &action, turn, theme, style, started.elapsed());
        outcome.scene_path = self
            .swap_scene(old_scene, &outcome.image)
            .instrument(span.clone())
            .await;
        span.in_scope(|| {
            tracing::info!(
                image_ms = %outcome.timings.image.as_millis(),
                grounding_ms = ?outcome.timings.grounding.map(|d| d.as_millis()),
                choices_ms = %outcome.timings.choices.as_millis(),
                total_ms = %outcome.timings.total.as_millis(),
                "Turn committed"
            );
        });
        Ok(outcome)
    }

    /// First turn: image, then grounding of that image, then choices seeded
    /// by the grounding description.
    async fn run_sequential(
        &self,
        image_history: Snapshot,
        mut narrative: Snapshot,
        action: &str,
        theme: &'static Theme,
        style: &'static Style,
    ) -> Result<PendingTurn, StoryError> {
        let image = self
            .image
            .generate(ImageRequest {
                history: image_history,
                text: action.to_string(),
                theme,
                style,
                mode: InstructionMode::Advance,
            })
            .await?;
        tracing::debug!(elapsed_ms = %image.elapsed.as_millis(), "Opening scene generated");

        let grounding = self
            .grounding
            .describe(Arc::clone(&image.value.data), image.value.mime_type.clone())
            .await?;
        tracing::debug!(elapsed_ms = %grounding.elapsed.as_millis(), "Opening scene grounded");

        let additions = vec![
            HistoryEntry::user_text(action),
            HistoryEntry::model_text(grounding.value.clone()),
        ];
        narrative.extend(additions.iter().cloned());

        let choices = self
            .choices
            .generate(narrative, prompts::narrator_instruction(theme))
            .await?;

        Ok(PendingTurn {
            image,
            grounding: Some(grounding),
            choices,
            narrative: additions,
        })
    }

    /// Later turns: image and choices are independent, so fork both and join.
    ///
    /// Both tasks always run to completion. If either fails the turn fails and
    /// the other result is dropped.
    async fn run_concurrent(
        &self,
        image_history: Snapshot,
        mut narrative: Snapshot,
        action: &str,
        theme: &'static Theme,
        style: &'static Style,
    ) -> Result<PendingTurn, StoryError> {
        let user_entry = HistoryEntry::user_text(action);
        narrative.push(user_entry.clone());

        let image_request = ImageRequest {
            history: image_history,
            text: action.to_string(),
            theme,
            style,
            mode: InstructionMode::Advance,
        };
        let image_task = tokio::spawn({
            let image = Arc::clone(&self.image);
            async move { image.generate(image_request).await }.in_current_span()
        });

        let system_instruction = prompts::narrator_instruction(theme);
        let choice_task = tokio::spawn({
            let choices = Arc::clone(&self.choices);
            async move { choices.generate(narrative, system_instruction).await }.in_current_span()
        });

        let (image, choices) = tokio::join!(image_task, choice_task);
        match (joined(image, "image generation"), joined(choices, "choice generation")) {
            (Ok(image), Ok(choices)) => Ok(PendingTurn {
                image,
                grounding: None,
                choices,
                narrative: vec![user_entry],
            }),
            (Err(e), choices) => {
                if choices.is_ok() {
                    tracing::debug!("Discarding choice result after image failure");
                }
                Err(e)
            }
            (Ok(_), Err(e)) => {
                tracing::debug!("Discarding image result after choice failure");
                Err(e)
            }
        }
    }

    /// Append both threads and update the flags in one critical section.
    ///
    /// Takes the old scene handle out in the same section; the caller swaps
    /// in the new one once the lock is released.
    fn commit_turn(
        &self,
        pending: PendingTurn,
        action: &str,
        turn: u32,
        theme: &'static Theme,
        style: &'static Style,
        total: Duration,
    ) -> (TurnOutcome, Option<SceneImage>) {
        let PendingTurn {
            image,
            grounding,
            choices,
            mut narrative,
        } = pending;
        narrative.push(HistoryEntry::model_text(choices_json(&choices.value)));
        tracing::debug!(instruction = %image.value.instruction, "Committing turn");

        let old_scene = {
            let mut session = lock(&self.session);
            session.history.commit(
                Thread::Image,
                [HistoryEntry::user_text(action), model_image_entry(&image.value)],
            );
            session.history.commit(Thread::Narrative, narrative);
            session.flags.turn_started = true;
            session.turns = turn;
            session.theme = theme;
            session.style = style;
            session.choices = Some(choices.value.clone());
            session.scene.take()
        };

        let outcome = TurnOutcome {
            turn,
            image: image.value,
            choices: choices.value,
            timings: TurnTimings {
                image: image.elapsed,
                grounding: grounding.map(|g| g.elapsed),
                choices: choices.elapsed,
                total,
            },
            scene_path: None,
        };
        (outcome, old_scene)
    }

    /// Release the old scene handle, then materialize `image` as the new one.
    ///
    /// File I/O runs on the blocking pool with the session unlocked. A failure
    /// to write the new file leaves no scene; history is unaffected.
    async fn swap_scene(&self, old: Option<SceneImage>, image: &GeneratedImage) -> Option<PathBuf> {
        let dir = self.scene_dir.clone();
        let data = Arc::clone(&image.data);
        let mime_type = image.mime_type.clone();
        let created = tokio::task::spawn_blocking(move || {
            if let Some(old) = old {
                release_scene(old);
            }
            SceneImage::create(&dir, data, &mime_type)
        })
        .await;

        match created {
            Ok(Ok(scene)) => {
                let path = scene.path().to_path_buf();
                lock(&self.session).scene = Some(scene);
                Some(path)
            }
            Ok(Err(e)) => {
                tracing::warn!(dir = %self.scene_dir.display(), error = %e, "Failed to write scene image");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Scene image task failed");
                None
            }
        }
    }

    /// Edit the current scene. Only the image thread changes.
    pub async fn submit_refinement(&self, instruction: &str) -> Result<RefinementOutcome, StoryError> {
        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Err(StoryError::invalid_input("Refinement instruction is empty"));
        }

        let _in_flight = self.begin()?;
        let (history, theme, style) = {
            let session = lock(&self.session);
            (session.history.snapshot(Thread::Image), session.theme, session.style)
        };

        let span = tracing::info_span!("refinement", theme = theme.name, style = style.name);
        let result = self
            .image
            .generate(ImageRequest {
                history,
                text: instruction.to_string(),
                theme,
                style,
                mode: InstructionMode::Refine,
            })
            .instrument(span.clone())
            .await;

        let image = match result {
            Ok(image) => image,
            Err(e) => {
                span.in_scope(|| {
                    tracing::warn!(
                        kind = e.kind().as_str(),
                        error = %e,
                        "Refinement failed, image thread unchanged"
                    );
                });
                return Err(e);
            }
        };

        span.in_scope(|| {
            tracing::debug!(instruction = %image.value.instruction, "Committing refinement");
        });
        let old_scene = {
            let mut session = lock(&self.session);
            session.history.commit(
                Thread::Image,
                [HistoryEntry::user_text(instruction), model_image_entry(&image.value)],
            );
            session.scene.take()
        };
        let scene_path = self
            .swap_scene(old_scene, &image.value)
            .instrument(span.clone())
            .await;

        span.in_scope(|| {
            tracing::info!(elapsed_ms = %image.elapsed.as_millis(), "Refinement committed");
        });
        Ok(RefinementOutcome {
            image: image.value,
            elapsed: image.elapsed,
            scene_path,
        })
    }

    /// Clear both threads and all flags, and release the scene image.
    ///
    /// Rejected while a turn or refinement is in flight.
    pub fn reset(&self) -> Result<(), StoryError> {
        let scene = {
            let mut session = lock(&self.session);
            if session.flags.in_flight {
                return Err(StoryError::Busy);
            }
            session.reset()
        };
        if let Some(scene) = scene {
            release_scene(scene);
        }
        tracing::info!("Session reset");
        Ok(())
    }
}

fn joined<T>(
    result: Result<Result<T, StoryError>, JoinError>,
    what: &str,
) -> Result<T, StoryError> {
    result.map_err(|e| StoryError::TaskFailed(format!("{what} task failed: {e}")))?
}

fn model_image_entry(image: &GeneratedImage) -> HistoryEntry {
    let mut parts = vec![Part::image(Arc::clone(&image.data), image.mime_type.clone())];
    if let Some(text) = &image.byproduct_text {
        parts.push(Part::text(text.clone()));
    }
    HistoryEntry {
        role: Actor::Model,
        parts,
    }
}

/// Choices as stored in the narrative thread, in the narrator's own format
fn choices_json(choices: &Choices) -> String {
    serde_json::json!({ "choices": choices }).to_string()
}
