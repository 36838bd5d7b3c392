//! End-of-match statistics persistence.

use std::collections::HashMap;

use super::GameEngine;
use crate::durable::UserStatsDelta;
use crate::error::GameResult;
use crate::keys;
use crate::types::UserId;

impl GameEngine {
    /// Upsert every participant's running record. Winners are all members
    /// tied for the maximum cumulative score; ties are not broken.
    ///
    /// Must run before the score aggregate is deleted, and exactly once per
    /// match (guarded by the finish CAS in the round-advance path).
    pub(super) async fn finalize_match_stats(&self, lobby_id: &str) -> GameResult<()> {
        let members = self
            .store
            .smembers(&keys::lobby::members(lobby_id))
            .await?;
        if members.is_empty() {
            return Ok(());
        }

        let raw_scores = self.store.hget_all(&keys::game::scores(lobby_id)).await?;
        let scores: HashMap<UserId, i64> = members
            .iter()
            .map(|user_id| {
                let score = raw_scores
                    .get(user_id)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0);
                (user_id.clone(), score)
            })
            .collect();

        let max_score = scores.values().copied().max().unwrap_or(0);
        let winners: Vec<&UserId> = scores
            .iter()
            .filter(|(_, score)| **score == max_score)
            .map(|(user_id, _)| user_id)
            .collect();

        tracing::info!(lobby_id, ?winners, max_score, "finalizing match stats");

        for user_id in &members {
            let won = winners.contains(&user_id);
            self.durable
                .upsert_user_stats(
                    user_id,
                    UserStatsDelta {
                        games_played: 1,
                        games_won: if won { 1 } else { 0 },
                        games_lost: if won { 0 } else { 1 },
                    },
                )
                .await?;
        }

        Ok(())
    }
}
