//! The round phase state machine.
//!
//! Client-driven calls and sweep-driven calls may race on the same match
//! from any number of tasks; the store's guarded writes are the only
//! synchronization point. Every transition decision is a compare-and-swap on
//! the round's `phase` field (or on the match record for round advance), so
//! it is taken exactly once no matter how many callers observe "I was last".

use std::collections::HashMap;
use std::time::Duration;

use super::{
    now_ms, GameEngine, FIELD_CURRENT_ROUND, FIELD_DIFFICULTY, FIELD_PHASE,
    FIELD_PHASE_STARTED_AT, FIELD_PROPOSER_ID, FIELD_STATE, FIELD_TOPIC_TITLE,
};
use crate::error::{GameError, GameResult};
use crate::keys;
use crate::quiz::QuestionSetRequest;
use crate::types::{
    AnswerOutcome, AnswerRecord, AnswerSubmission, Difficulty, MatchState, MatchView,
    PublicQuestion, Question, RecordedAnswer, RoundPhase, SelectedTopic, SubmitOutcome,
    TopicProposal, TopicSubmission, UserId,
};

/// How long players may propose topics before the sweeper moves on.
pub const TOPIC_INPUT_TIMEOUT: Duration = Duration::from_secs(30);
/// How long players may vote before the sweeper moves on.
pub const VOTING_TIMEOUT: Duration = Duration::from_secs(20);

/// Serializes question selection across racing sweeps; expires in case the
/// claiming worker dies mid-selection.
const SELECTING_CLAIM_TTL: Duration = Duration::from_secs(30);

/// Finished rounds linger this long for late readers, then expire.
const ROUND_KEY_TTL: Duration = Duration::from_secs(3600);

/// Lobby keys carry a 1-hour idle TTL; a running match refreshes it on every
/// phase transition so long matches cannot lose their member set mid-game.
const LOBBY_REFRESH_TTL: Duration = Duration::from_secs(3600);

const MIN_TOPIC_CHARACTERS: usize = 3;
const MAX_TOPIC_CHARACTERS: usize = 40;

/// Last resort when a round has no proposals and the topic catalog is empty.
const STATIC_FALLBACK_TOPIC: &str = "Pandas";

struct RoundMeta {
    phase: RoundPhase,
    phase_started_at: i64,
}

impl GameEngine {
    /// Propose a topic for the current round. When this submission is the
    /// last missing one, the phase advances immediately (the event-triggered
    /// path): straight to `SELECT_QUESTION` for a 2-player match, otherwise
    /// to `VOTING`.
    pub async fn submit_topic(
        &self,
        lobby_id: &str,
        user_id: &str,
        input: TopicSubmission,
    ) -> GameResult<SubmitOutcome> {
        let round = self.require_in_progress(lobby_id).await?;

        let meta = self.require_round_meta(lobby_id, round).await?;
        if meta.phase != RoundPhase::TopicInput {
            return Err(GameError::forbidden("Not in topic input phase"));
        }

        self.require_member(lobby_id, user_id).await?;

        let topic_title = input.topic_title.trim();
        if topic_title.len() < MIN_TOPIC_CHARACTERS || topic_title.len() > MAX_TOPIC_CHARACTERS {
            return Err(GameError::forbidden("Invalid topic title"));
        }

        let inputs_key = keys::game::round_inputs(lobby_id, round);
        if self.store.hexists(&inputs_key, user_id).await? {
            return Err(GameError::forbidden("Topic already submitted"));
        }

        let proposal = TopicProposal {
            topic_title: topic_title.to_string(),
            difficulty: input.difficulty,
        };
        let encoded = serde_json::to_string(&proposal)
            .map_err(|e| GameError::internal(format!("failed to encode proposal: {e}")))?;
        self.store
            .hset(&inputs_key, &[(user_id, encoded)])
            .await?;

        let members = self.members(lobby_id).await?;
        let submitted = self.store.hlen(&inputs_key).await?;
        if submitted < members.len() {
            return Ok(SubmitOutcome::WaitingForOthers);
        }

        // A 2-player match has no meaningful vote.
        let next = if members.len() == 2 {
            RoundPhase::SelectQuestion
        } else {
            RoundPhase::Voting
        };

        let next_phase = self
            .advance_from(lobby_id, round, RoundPhase::TopicInput, next)
            .await?;
        Ok(SubmitOutcome::AllSubmitted { next_phase })
    }

    /// Vote for another member's proposal. The last vote advances the phase
    /// to `SELECT_QUESTION` immediately.
    pub async fn submit_vote(
        &self,
        lobby_id: &str,
        user_id: &str,
        voted_for_user_id: &str,
    ) -> GameResult<SubmitOutcome> {
        let round = self.require_in_progress(lobby_id).await?;

        let meta = self.require_round_meta(lobby_id, round).await?;
        if meta.phase != RoundPhase::Voting {
            return Err(GameError::forbidden("Not in voting phase"));
        }

        self.require_member(lobby_id, user_id).await?;

        let votes_key = keys::game::round_votes(lobby_id, round);
        if self.store.hexists(&votes_key, user_id).await? {
            return Err(GameError::forbidden("Vote already submitted"));
        }

        let proposal_exists = self
            .store
            .hexists(&keys::game::round_inputs(lobby_id, round), voted_for_user_id)
            .await?;
        if !proposal_exists {
            return Err(GameError::forbidden("Voted proposal does not exist"));
        }

        if user_id == voted_for_user_id {
            return Err(GameError::forbidden("Cannot vote for your own topic"));
        }

        self.store
            .hset(&votes_key, &[(user_id, voted_for_user_id.to_string())])
            .await?;

        let members = self.members(lobby_id).await?;
        let votes_count = self.store.hlen(&votes_key).await?;
        if votes_count < members.len() {
            return Ok(SubmitOutcome::WaitingForOthers);
        }

        let next_phase = self
            .advance_from(lobby_id, round, RoundPhase::Voting, RoundPhase::SelectQuestion)
            .await?;
        Ok(SubmitOutcome::AllSubmitted { next_phase })
    }

    /// Pick the round's topic and fetch its question set, then move to
    /// `ANSWERING`. No-op unless the match is in progress and the round is in
    /// `SELECT_QUESTION`; redundant calls while a selection is in flight are
    /// absorbed by a claim key. On supplier failure the round stays in
    /// `SELECT_QUESTION` so a later sweep can retry.
    pub async fn select_question(&self, lobby_id: &str) -> GameResult<()> {
        let Some((state, round)) = self.match_meta(lobby_id).await? else {
            return Ok(());
        };
        if state != MatchState::InProgress {
            return Ok(());
        }

        let Some(meta) = self.round_meta(lobby_id, round).await? else {
            return Ok(());
        };
        if meta.phase != RoundPhase::SelectQuestion {
            return Ok(());
        }

        let claim_key = keys::game::selecting(lobby_id, round);
        let claimed = self
            .store
            .set_nx(&claim_key, "1", Some(SELECTING_CLAIM_TTL))
            .await?;
        if !claimed {
            tracing::debug!(lobby_id, round, "question selection already in flight");
            return Ok(());
        }

        let result = self.perform_selection(lobby_id, round).await;
        // Release the claim either way; on failure the next sweep retries.
        self.store.del(&[&claim_key]).await?;
        result
    }

    async fn perform_selection(&self, lobby_id: &str, round: u32) -> GameResult<()> {
        let raw_inputs = self
            .store
            .hget_all(&keys::game::round_inputs(lobby_id, round))
            .await?;

        let mut proposals: Vec<(UserId, TopicProposal)> = raw_inputs
            .into_iter()
            .map(|(user_id, value)| {
                serde_json::from_str(&value)
                    .map(|proposal| (user_id, proposal))
                    .map_err(|e| GameError::internal(format!("corrupt proposal data: {e}")))
            })
            .collect::<GameResult<_>>()?;
        proposals.sort_by(|a, b| a.0.cmp(&b.0));

        let selected = if proposals.is_empty() {
            match self.durable.find_random_topic().await? {
                Some(topic) => SelectedTopic {
                    topic_title: topic.title,
                    difficulty: Difficulty::Easy,
                    proposer_id: None,
                },
                None => {
                    tracing::warn!(lobby_id, round, "topic catalog is empty, using static fallback");
                    SelectedTopic {
                        topic_title: STATIC_FALLBACK_TOPIC.to_string(),
                        difficulty: Difficulty::Easy,
                        proposer_id: None,
                    }
                }
            }
        } else {
            let raw_votes = self
                .store
                .hget_all(&keys::game::round_votes(lobby_id, round))
                .await?;

            let mut vote_counts: HashMap<&str, u32> = HashMap::new();
            for voted_for in raw_votes.values() {
                *vote_counts.entry(voted_for.as_str()).or_insert(0) += 1;
            }

            let (winner_id, proposal) = if vote_counts.is_empty() {
                // Nobody voted: uniform pick among all proposals.
                let index = self.chooser.pick(proposals.len());
                proposals[index].clone()
            } else {
                let max_votes = *vote_counts.values().max().unwrap_or(&0);
                let mut top_candidates: Vec<&str> = vote_counts
                    .iter()
                    .filter(|(_, count)| **count == max_votes)
                    .map(|(user_id, _)| *user_id)
                    .collect();
                top_candidates.sort_unstable();

                let winner = top_candidates[self.chooser.pick(top_candidates.len())];
                proposals
                    .iter()
                    .find(|(user_id, _)| user_id.as_str() == winner)
                    .cloned()
                    .ok_or_else(|| GameError::internal("winning proposal missing"))?
            };

            SelectedTopic {
                topic_title: proposal.topic_title,
                difficulty: proposal.difficulty,
                proposer_id: Some(winner_id),
            }
        };

        let config = self.match_config(lobby_id).await?;
        let questions = self
            .supplier
            .question_set(QuestionSetRequest {
                topic: selected.topic_title.clone(),
                difficulty: selected.difficulty.scale(),
                count: config.questions_per_round,
                exclude_texts: Vec::new(),
            })
            .await?;

        self.store
            .hset(
                &keys::game::selected(lobby_id, round),
                &[
                    (FIELD_TOPIC_TITLE, selected.topic_title.clone()),
                    (FIELD_DIFFICULTY, selected.difficulty.as_str().to_string()),
                    (
                        FIELD_PROPOSER_ID,
                        selected.proposer_id.clone().unwrap_or_default(),
                    ),
                ],
            )
            .await?;

        let encoded = serde_json::to_string(&questions)
            .map_err(|e| GameError::internal(format!("failed to encode questions: {e}")))?;
        self.store
            .set(&keys::game::questions(lobby_id, round), &encoded)
            .await?;

        // The claim serializes selections, so a failed CAS here means the
        // claim outlived its TTL and another worker already completed the
        // round's selection.
        let won = self
            .try_enter_phase(
                lobby_id,
                round,
                RoundPhase::SelectQuestion,
                RoundPhase::Answering,
            )
            .await?;
        if !won {
            return Err(GameError::conflict(
                "Round advanced past SELECT_QUESTION during selection",
            ));
        }

        tracing::info!(
            lobby_id,
            round,
            topic = %selected.topic_title,
            proposer = ?selected.proposer_id,
            "questions ready, answering phase open"
        );
        Ok(())
    }

    /// Record one answer. When every member has answered every question the
    /// round finalizes synchronously and the computed score deltas are
    /// returned.
    pub async fn submit_answer(
        &self,
        lobby_id: &str,
        user_id: &str,
        payload: AnswerSubmission,
    ) -> GameResult<AnswerOutcome> {
        let round = self.require_in_progress(lobby_id).await?;

        let meta = self.require_round_meta(lobby_id, round).await?;
        if meta.phase != RoundPhase::Answering {
            return Err(GameError::forbidden("Not in answering phase"));
        }

        self.require_member(lobby_id, user_id).await?;

        let questions = self
            .round_questions(lobby_id, round)
            .await?
            .ok_or_else(|| GameError::not_found("Questions not found for this round"))?;

        let question = questions
            .iter()
            .find(|q| q.id == payload.question_id)
            .ok_or_else(|| GameError::forbidden("Invalid question"))?;
        if question.answer(&payload.answer_id).is_none() {
            return Err(GameError::forbidden("Invalid answer"));
        }

        let answers_key = keys::game::answers(lobby_id, round);
        let mut record: AnswerRecord = match self.store.hget(&answers_key, user_id).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| GameError::internal(format!("corrupt answer data: {e}")))?,
            None => AnswerRecord::default(),
        };

        if record.answers.contains_key(&payload.question_id) {
            return Err(GameError::forbidden("Already answered"));
        }

        record.answers.insert(
            payload.question_id.clone(),
            RecordedAnswer {
                answer_id: payload.answer_id.clone(),
                answered_at: now_ms(),
            },
        );
        let encoded = serde_json::to_string(&record)
            .map_err(|e| GameError::internal(format!("failed to encode answers: {e}")))?;
        self.store.hset(&answers_key, &[(user_id, encoded)]).await?;

        let members = self.members(lobby_id).await?;
        let mut all_answered = true;
        for member_id in &members {
            let complete = match self.store.hget(&answers_key, member_id).await? {
                None => false,
                Some(raw) => {
                    let parsed: AnswerRecord = serde_json::from_str(&raw)
                        .map_err(|e| GameError::internal(format!("corrupt answer data: {e}")))?;
                    parsed.answers.len() == questions.len()
                }
            };
            if !complete {
                all_answered = false;
                break;
            }
        }

        if !all_answered {
            return Ok(AnswerOutcome::WaitingForOthers);
        }

        match self.finalize_answering(lobby_id, round).await? {
            Some(score_deltas) => Ok(AnswerOutcome::RoundComplete { score_deltas }),
            // A racing caller claimed finalization; this answer still counted.
            None => Ok(AnswerOutcome::WaitingForOthers),
        }
    }

    /// The timeout-triggered path. No-op unless the match is in progress and
    /// the current phase has outlived its deadline; then applies the same
    /// transitions as the event-triggered path.
    pub async fn check_phase_timeout(&self, lobby_id: &str) -> GameResult<()> {
        let Some((state, round)) = self.match_meta(lobby_id).await? else {
            return Ok(());
        };
        if state != MatchState::InProgress {
            return Ok(());
        }

        let Some(meta) = self.round_meta(lobby_id, round).await? else {
            return Ok(());
        };

        let timeout = match meta.phase {
            RoundPhase::TopicInput => TOPIC_INPUT_TIMEOUT,
            RoundPhase::Voting => VOTING_TIMEOUT,
            RoundPhase::Answering => {
                let config = self.match_config(lobby_id).await?;
                Duration::from_secs(config.time_per_question as u64)
            }
            // Normally completed synchronously by their triggering call;
            // swept immediately as crash/upstream-failure recovery.
            RoundPhase::SelectQuestion | RoundPhase::RoundEnd => Duration::ZERO,
            RoundPhase::MatchEnd => return Ok(()),
        };

        let elapsed = now_ms().saturating_sub(meta.phase_started_at);
        if elapsed < timeout.as_millis() as i64 {
            return Ok(());
        }

        self.handle_phase_timeout(lobby_id, round, meta.phase).await
    }

    async fn handle_phase_timeout(
        &self,
        lobby_id: &str,
        round: u32,
        phase: RoundPhase,
    ) -> GameResult<()> {
        tracing::debug!(lobby_id, round, phase = phase.as_str(), "phase deadline passed");

        match phase {
            RoundPhase::TopicInput => {
                let submitted = self
                    .store
                    .hlen(&keys::game::round_inputs(lobby_id, round))
                    .await?;
                let members = self.members(lobby_id).await?;

                // No proposals, or a 2-player match: voting is pointless.
                let next = if submitted == 0 || members.len() == 2 {
                    RoundPhase::SelectQuestion
                } else {
                    RoundPhase::Voting
                };

                let won = self
                    .try_enter_phase(lobby_id, round, RoundPhase::TopicInput, next)
                    .await?;
                if won && next == RoundPhase::SelectQuestion {
                    self.select_question(lobby_id).await?;
                }
                Ok(())
            }

            RoundPhase::Voting => {
                let won = self
                    .try_enter_phase(
                        lobby_id,
                        round,
                        RoundPhase::Voting,
                        RoundPhase::SelectQuestion,
                    )
                    .await?;
                if won {
                    self.select_question(lobby_id).await?;
                }
                Ok(())
            }

            RoundPhase::SelectQuestion => self.select_question(lobby_id).await,

            RoundPhase::Answering => {
                self.finalize_answering(lobby_id, round).await?;
                Ok(())
            }

            RoundPhase::RoundEnd => self.advance_round(lobby_id).await,

            RoundPhase::MatchEnd => Ok(()),
        }
    }

    /// Shared by the answer-completion path and the answering timeout.
    /// Claims the round by CAS `ANSWERING → ROUND_END`; exactly one caller
    /// gets `Some(deltas)`, every other racer gets `None`.
    async fn finalize_answering(
        &self,
        lobby_id: &str,
        round: u32,
    ) -> GameResult<Option<HashMap<UserId, i64>>> {
        let Some(meta) = self.round_meta(lobby_id, round).await? else {
            return Ok(None);
        };
        if meta.phase != RoundPhase::Answering {
            return Ok(None);
        }

        let config = self.match_config(lobby_id).await?;
        if config.time_per_question == 0 || meta.phase_started_at == 0 {
            return Err(GameError::internal("Invalid timing configuration"));
        }
        let time_limit_ms = config.time_per_question as i64 * 1000;

        let questions = self
            .round_questions(lobby_id, round)
            .await?
            .ok_or_else(|| GameError::internal("Questions not stored for round finalization"))?;

        let members = self.members(lobby_id).await?;
        let answers_key = keys::game::answers(lobby_id, round);
        let mut answers: HashMap<UserId, AnswerRecord> = HashMap::new();
        for member_id in &members {
            if let Some(raw) = self.store.hget(&answers_key, member_id).await? {
                let record = serde_json::from_str(&raw)
                    .map_err(|e| GameError::internal(format!("corrupt answer data: {e}")))?;
                answers.insert(member_id.clone(), record);
            }
        }

        // The claim: whoever flips ANSWERING -> ROUND_END applies the scores
        // and advances the round; everyone else backs off.
        let won = self
            .try_enter_phase(lobby_id, round, RoundPhase::Answering, RoundPhase::RoundEnd)
            .await?;
        if !won {
            return Ok(None);
        }

        let score_deltas = super::scoring::score_round(
            &questions,
            &answers,
            &members,
            meta.phase_started_at,
            time_limit_ms,
        );

        let scores_key = keys::game::scores(lobby_id);
        for (member_id, delta) in &score_deltas {
            if *delta != 0 {
                self.store.hincr_by(&scores_key, member_id, *delta).await?;
            }
        }

        tracing::info!(lobby_id, round, ?score_deltas, "round finalized");

        self.advance_round(lobby_id).await?;

        Ok(Some(score_deltas))
    }

    /// Move to the next round, or finish the match once `roundsTotal` rounds
    /// are played. Exactly-once via CAS on `currentRound` / match `state`.
    async fn advance_round(&self, lobby_id: &str) -> GameResult<()> {
        let Some((state, current_round)) = self.match_meta(lobby_id).await? else {
            return Ok(());
        };
        if state != MatchState::InProgress {
            return Ok(());
        }

        let config = self.match_config(lobby_id).await?;
        if config.rounds_total == 0 || current_round > config.rounds_total {
            return Err(GameError::internal("Invalid match configuration"));
        }

        let meta_key = keys::game::match_meta(lobby_id);

        if current_round >= config.rounds_total {
            let won = self
                .store
                .hset_if_eq(
                    &meta_key,
                    FIELD_STATE,
                    MatchState::InProgress.as_str(),
                    &[(FIELD_STATE, MatchState::Finished.as_str().to_string())],
                )
                .await?;
            if !won {
                return Ok(());
            }

            self.store
                .hset(
                    &keys::lobby::meta(lobby_id),
                    &[(
                        FIELD_STATE,
                        crate::types::LobbyState::Finished.as_str().to_string(),
                    )],
                )
                .await?;
            self.store
                .hset(
                    &keys::game::round_meta(lobby_id, current_round),
                    &[
                        (FIELD_PHASE, RoundPhase::MatchEnd.as_str().to_string()),
                        (FIELD_PHASE_STARTED_AT, now_ms().to_string()),
                    ],
                )
                .await?;

            // Durable stats first; the score aggregate dies with the match.
            self.finalize_match_stats(lobby_id).await?;

            self.store
                .srem(keys::game::ACTIVE_MATCHES, lobby_id)
                .await?;
            self.store
                .del(&[
                    &keys::game::match_meta(lobby_id),
                    &keys::game::match_config(lobby_id),
                    &keys::game::scores(lobby_id),
                ])
                .await?;
            self.expire_round_keys(lobby_id, current_round).await?;

            tracing::info!(lobby_id, rounds = current_round, "match finished");
            return Ok(());
        }

        let next_round = current_round + 1;
        let won = self
            .store
            .hset_if_eq(
                &meta_key,
                FIELD_CURRENT_ROUND,
                &current_round.to_string(),
                &[(FIELD_CURRENT_ROUND, next_round.to_string())],
            )
            .await?;
        if !won {
            return Ok(());
        }

        self.store
            .hset(
                &keys::game::round_meta(lobby_id, next_round),
                &[
                    (FIELD_PHASE, RoundPhase::TopicInput.as_str().to_string()),
                    (FIELD_PHASE_STARTED_AT, now_ms().to_string()),
                ],
            )
            .await?;
        self.expire_round_keys(lobby_id, current_round).await?;

        tracing::info!(lobby_id, next_round, "round advanced");
        Ok(())
    }

    /// Lobby ids the sweeper should visit.
    pub async fn active_matches(&self) -> GameResult<Vec<String>> {
        Ok(self.store.smembers(keys::game::ACTIVE_MATCHES).await?)
    }

    /// Snapshot of the running match for clients.
    pub async fn match_view(&self, lobby_id: &str) -> GameResult<MatchView> {
        let (state, current_round) = self
            .match_meta(lobby_id)
            .await?
            .ok_or_else(|| GameError::not_found("Match not found"))?;
        let meta = self.require_round_meta(lobby_id, current_round).await?;

        let selected_topic = self.read_selected(lobby_id, current_round).await?;

        let raw_scores = self.store.hget_all(&keys::game::scores(lobby_id)).await?;
        let scores = raw_scores
            .into_iter()
            .filter_map(|(user_id, raw)| raw.parse().ok().map(|score| (user_id, score)))
            .collect();

        Ok(MatchView {
            lobby_id: lobby_id.to_string(),
            state,
            current_round,
            phase: meta.phase,
            phase_started_at: meta.phase_started_at,
            selected_topic,
            scores,
        })
    }

    /// The current round's questions with the correct answers hidden.
    /// Briefly absent while `SELECT_QUESTION` is still in flight.
    pub async fn current_questions(&self, lobby_id: &str) -> GameResult<Vec<PublicQuestion>> {
        let round = self.require_in_progress(lobby_id).await?;
        let questions = self
            .round_questions(lobby_id, round)
            .await?
            .ok_or_else(|| GameError::not_found("Questions not found for this round"))?;
        Ok(questions.iter().map(PublicQuestion::from).collect())
    }

    // ---- shared plumbing ----

    /// CAS the round's phase; the winner also stamps `phaseStartedAt`, in the
    /// same guarded write so no reader ever sees the new phase with a stale
    /// clock.
    async fn try_enter_phase(
        &self,
        lobby_id: &str,
        round: u32,
        from: RoundPhase,
        to: RoundPhase,
    ) -> GameResult<bool> {
        let won = self
            .store
            .hset_if_eq(
                &keys::game::round_meta(lobby_id, round),
                FIELD_PHASE,
                from.as_str(),
                &[
                    (FIELD_PHASE, to.as_str().to_string()),
                    (FIELD_PHASE_STARTED_AT, now_ms().to_string()),
                ],
            )
            .await?;
        if won {
            tracing::debug!(
                lobby_id,
                round,
                from = from.as_str(),
                to = to.as_str(),
                "phase transition"
            );
            for key in [
                keys::lobby::meta(lobby_id),
                keys::lobby::members(lobby_id),
                keys::lobby::ready(lobby_id),
            ] {
                self.store.expire(&key, LOBBY_REFRESH_TTL).await?;
            }
        }
        Ok(won)
    }

    /// Event-path completion: CAS into `next`, run selection when entering
    /// `SELECT_QUESTION`, and report the phase the caller actually landed in
    /// if somebody else already advanced it.
    async fn advance_from(
        &self,
        lobby_id: &str,
        round: u32,
        from: RoundPhase,
        next: RoundPhase,
    ) -> GameResult<RoundPhase> {
        if self.try_enter_phase(lobby_id, round, from, next).await? {
            if next == RoundPhase::SelectQuestion {
                // Selection runs synchronously on entry; a supplier failure
                // must not fail the submission that triggered it. The round
                // stays in SELECT_QUESTION and the sweeper retries.
                if let Err(error) = self.select_question(lobby_id).await {
                    tracing::warn!(lobby_id, round, %error, "question selection failed");
                }
            }
            Ok(next)
        } else {
            self.require_round_meta(lobby_id, round)
                .await
                .map(|meta| meta.phase)
        }
    }

    async fn match_meta(&self, lobby_id: &str) -> GameResult<Option<(MatchState, u32)>> {
        let raw = self.store.hget_all(&keys::game::match_meta(lobby_id)).await?;
        let Some(raw_state) = raw.get(FIELD_STATE) else {
            return Ok(None);
        };

        let state = MatchState::parse(raw_state)
            .ok_or_else(|| GameError::internal("invalid stored match state"))?;
        let current_round = raw
            .get(FIELD_CURRENT_ROUND)
            .and_then(|r| r.parse().ok())
            .ok_or_else(|| GameError::internal("invalid stored round number"))?;

        Ok(Some((state, current_round)))
    }

    async fn require_in_progress(&self, lobby_id: &str) -> GameResult<u32> {
        match self.match_meta(lobby_id).await? {
            Some((MatchState::InProgress, round)) => Ok(round),
            _ => Err(GameError::forbidden("Match is not in progress")),
        }
    }

    async fn round_meta(&self, lobby_id: &str, round: u32) -> GameResult<Option<RoundMeta>> {
        let raw = self
            .store
            .hget_all(&keys::game::round_meta(lobby_id, round))
            .await?;
        let (Some(raw_phase), Some(raw_started)) =
            (raw.get(FIELD_PHASE), raw.get(FIELD_PHASE_STARTED_AT))
        else {
            return Ok(None);
        };

        let phase = RoundPhase::parse(raw_phase)
            .ok_or_else(|| GameError::internal("invalid stored round phase"))?;
        let phase_started_at = raw_started
            .parse()
            .map_err(|_| GameError::internal("invalid stored phase timestamp"))?;

        Ok(Some(RoundMeta {
            phase,
            phase_started_at,
        }))
    }

    async fn require_round_meta(&self, lobby_id: &str, round: u32) -> GameResult<RoundMeta> {
        self.round_meta(lobby_id, round)
            .await?
            .ok_or_else(|| GameError::internal("round metadata missing"))
    }

    async fn members(&self, lobby_id: &str) -> GameResult<Vec<String>> {
        Ok(self
            .store
            .smembers(&keys::lobby::members(lobby_id))
            .await?)
    }

    async fn require_member(&self, lobby_id: &str, user_id: &str) -> GameResult<()> {
        let is_member = self
            .store
            .sismember(&keys::lobby::members(lobby_id), user_id)
            .await?;
        if !is_member {
            return Err(GameError::forbidden("User is not a lobby member"));
        }
        Ok(())
    }

    async fn round_questions(
        &self,
        lobby_id: &str,
        round: u32,
    ) -> GameResult<Option<Vec<Question>>> {
        match self
            .store
            .get(&keys::game::questions(lobby_id, round))
            .await?
        {
            None => Ok(None),
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| GameError::internal(format!("corrupt question data: {e}"))),
        }
    }

    async fn read_selected(
        &self,
        lobby_id: &str,
        round: u32,
    ) -> GameResult<Option<SelectedTopic>> {
        let raw = self
            .store
            .hget_all(&keys::game::selected(lobby_id, round))
            .await?;
        let Some(topic_title) = raw.get(FIELD_TOPIC_TITLE) else {
            return Ok(None);
        };

        let difficulty = raw
            .get(FIELD_DIFFICULTY)
            .and_then(|d| Difficulty::parse(d))
            .ok_or_else(|| GameError::internal("invalid stored difficulty"))?;
        let proposer_id = raw
            .get(FIELD_PROPOSER_ID)
            .filter(|id| !id.is_empty())
            .cloned();

        Ok(Some(SelectedTopic {
            topic_title: topic_title.clone(),
            difficulty,
            proposer_id,
        }))
    }

    async fn expire_round_keys(&self, lobby_id: &str, round: u32) -> GameResult<()> {
        for key in [
            keys::game::round_meta(lobby_id, round),
            keys::game::round_inputs(lobby_id, round),
            keys::game::round_votes(lobby_id, round),
            keys::game::selected(lobby_id, round),
            keys::game::questions(lobby_id, round),
            keys::game::answers(lobby_id, round),
        ] {
            self.store.expire(&key, ROUND_KEY_TTL).await?;
        }
        Ok(())
    }
}
