//! Match configuration and match start.

use super::{
    now_ms, GameEngine, FIELD_CURRENT_ROUND, FIELD_PHASE, FIELD_PHASE_STARTED_AT,
    FIELD_QUESTIONS_PER_ROUND, FIELD_ROUNDS_TOTAL, FIELD_STATE, FIELD_TIME_PER_QUESTION,
};
use crate::error::{GameError, GameResult};
use crate::keys;
use crate::types::{LobbyState, MatchConfig, MatchStartView, MatchState, RoundPhase};

const MAX_ROUNDS: u32 = 50;
const MIN_TIME_PER_QUESTION: u32 = 5;
const MAX_TIME_PER_QUESTION: u32 = 120;
const MAX_QUESTIONS_PER_ROUND: u32 = 10;

impl GameEngine {
    /// Validate and store the match tunables. Owner only, lobby must be in
    /// `SETUP`; out-of-range values are rejected without mutating anything.
    pub async fn set_match_config(
        &self,
        lobby_id: &str,
        owner_id: &str,
        config: MatchConfig,
    ) -> GameResult<MatchConfig> {
        self.require_setup_owner(lobby_id, owner_id).await?;

        if config.rounds_total == 0 || config.rounds_total > MAX_ROUNDS {
            return Err(GameError::forbidden("Invalid roundsTotal"));
        }
        if config.time_per_question < MIN_TIME_PER_QUESTION
            || config.time_per_question > MAX_TIME_PER_QUESTION
        {
            return Err(GameError::forbidden("Invalid timePerQuestion"));
        }
        if config.questions_per_round == 0 || config.questions_per_round > MAX_QUESTIONS_PER_ROUND {
            return Err(GameError::forbidden("Invalid questionsPerRound"));
        }

        self.store
            .hset(
                &keys::game::match_config(lobby_id),
                &[
                    (FIELD_ROUNDS_TOTAL, config.rounds_total.to_string()),
                    (FIELD_TIME_PER_QUESTION, config.time_per_question.to_string()),
                    (
                        FIELD_QUESTIONS_PER_ROUND,
                        config.questions_per_round.to_string(),
                    ),
                ],
            )
            .await?;

        Ok(config)
    }

    /// Start the match: round 1 begins in `TOPIC_INPUT` and the lobby is
    /// mirrored to `IN_GAME`. The match record is authoritative from here on.
    pub async fn start_match(&self, lobby_id: &str, owner_id: &str) -> GameResult<MatchStartView> {
        self.require_setup_owner(lobby_id, owner_id).await?;

        let raw = self
            .store
            .hget_all(&keys::game::match_config(lobby_id))
            .await?;
        if !raw.contains_key(FIELD_ROUNDS_TOTAL)
            || !raw.contains_key(FIELD_TIME_PER_QUESTION)
            || !raw.contains_key(FIELD_QUESTIONS_PER_ROUND)
        {
            return Err(GameError::forbidden("Match configuration is not complete"));
        }
        let config = self.match_config(lobby_id).await?;

        self.store
            .hset(
                &keys::game::match_meta(lobby_id),
                &[
                    (FIELD_STATE, MatchState::InProgress.as_str().to_string()),
                    (FIELD_CURRENT_ROUND, "1".to_string()),
                ],
            )
            .await?;

        self.store
            .hset(
                &keys::game::round_meta(lobby_id, 1),
                &[
                    (FIELD_PHASE, RoundPhase::TopicInput.as_str().to_string()),
                    (FIELD_PHASE_STARTED_AT, now_ms().to_string()),
                ],
            )
            .await?;

        self.store
            .hset(
                &keys::lobby::meta(lobby_id),
                &[(FIELD_STATE, LobbyState::InGame.as_str().to_string())],
            )
            .await?;

        // Fresh score aggregate, and the sweeper starts watching this match.
        self.store.del(&[&keys::game::scores(lobby_id)]).await?;
        self.store
            .sadd(keys::game::ACTIVE_MATCHES, lobby_id)
            .await?;

        tracing::info!(lobby_id, ?config, "match started");

        Ok(MatchStartView {
            lobby_id: lobby_id.to_string(),
            state: MatchState::InProgress,
            current_round: 1,
            phase: RoundPhase::TopicInput,
            config,
        })
    }

    /// Read the stored config of a started match. A started match without a
    /// complete, parseable config is corrupt state, not a client error.
    pub(super) async fn match_config(&self, lobby_id: &str) -> GameResult<MatchConfig> {
        let raw = self
            .store
            .hget_all(&keys::game::match_config(lobby_id))
            .await?;

        let field = |name: &str| -> GameResult<u32> {
            raw.get(name)
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| GameError::internal("Invalid match configuration"))
        };

        Ok(MatchConfig {
            rounds_total: field(FIELD_ROUNDS_TOTAL)?,
            time_per_question: field(FIELD_TIME_PER_QUESTION)?,
            questions_per_round: field(FIELD_QUESTIONS_PER_ROUND)?,
        })
    }

    async fn require_setup_owner(&self, lobby_id: &str, owner_id: &str) -> GameResult<()> {
        let meta = self.store.hget_all(&keys::lobby::meta(lobby_id)).await?;
        let lobby_owner = meta
            .get("ownerId")
            .ok_or_else(|| GameError::not_found("Lobby not found"))?;

        if lobby_owner != owner_id {
            return Err(GameError::forbidden("Only lobby owner can start the match"));
        }

        let state = meta
            .get(FIELD_STATE)
            .and_then(|s| LobbyState::parse(s))
            .ok_or_else(|| GameError::internal("invalid stored lobby state"))?;
        if state != LobbyState::Setup {
            return Err(GameError::forbidden(
                "Match can only be started in the SETUP phase",
            ));
        }

        Ok(())
    }
}
