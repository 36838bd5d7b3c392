mod config;
mod engine;
pub mod scoring;
mod stats;

use std::sync::Arc;

use rand::Rng;

use crate::durable::DurableStore;
use crate::quiz::QuestionSupplier;
use crate::store::KeyValueStore;

pub use engine::{TOPIC_INPUT_TIMEOUT, VOTING_TIMEOUT};

/// Picks an index into a non-empty slice of candidates. Injectable so tests
/// can pin tie-break behavior.
pub trait Chooser: Send + Sync {
    fn pick(&self, len: usize) -> usize;
}

/// Default chooser backed by the thread-local RNG.
pub struct RandChooser;

impl Chooser for RandChooser {
    fn pick(&self, len: usize) -> usize {
        rand::rng().random_range(0..len)
    }
}

/// The match orchestration engine.
///
/// All state lives in the shared key-value store; the engine itself is
/// stateless and any number of instances may act on the same match
/// concurrently. Transition decisions go through the store's guarded writes
/// so they happen exactly once per round phase.
pub struct GameEngine {
    store: Arc<dyn KeyValueStore>,
    supplier: Arc<dyn QuestionSupplier>,
    durable: Arc<dyn DurableStore>,
    chooser: Arc<dyn Chooser>,
}

impl GameEngine {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        supplier: Arc<dyn QuestionSupplier>,
        durable: Arc<dyn DurableStore>,
    ) -> Self {
        Self {
            store,
            supplier,
            durable,
            chooser: Arc::new(RandChooser),
        }
    }

    /// Replace the random-choice source (tie-breaks, fallback picks).
    pub fn with_chooser(mut self, chooser: Arc<dyn Chooser>) -> Self {
        self.chooser = chooser;
        self
    }
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// Hash field names used across the match key space.
pub(crate) const FIELD_STATE: &str = "state";
pub(crate) const FIELD_CURRENT_ROUND: &str = "currentRound";
pub(crate) const FIELD_PHASE: &str = "phase";
pub(crate) const FIELD_PHASE_STARTED_AT: &str = "phaseStartedAt";
pub(crate) const FIELD_ROUNDS_TOTAL: &str = "roundsTotal";
pub(crate) const FIELD_TIME_PER_QUESTION: &str = "timePerQuestion";
pub(crate) const FIELD_QUESTIONS_PER_ROUND: &str = "questionsPerRound";
pub(crate) const FIELD_TOPIC_TITLE: &str = "topicTitle";
pub(crate) const FIELD_DIFFICULTY: &str = "difficulty";
pub(crate) const FIELD_PROPOSER_ID: &str = "proposerId";
