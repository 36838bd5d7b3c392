//! Periodic driver that forces phase transitions when participants fail to
//! act. All policy lives in the engine; the sweeper only detects expiry.

use std::sync::Arc;
use std::time::Duration;

use crate::game::GameEngine;

/// Spawn a background task that calls `check_phase_timeout` for every active
/// match on a fixed interval. Redundant invocations and matches that finish
/// or disappear mid-sweep are no-ops by the engine's contract.
pub fn spawn_timeout_sweeper(engine: Arc<GameEngine>, interval: Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            let lobby_ids = match engine.active_matches().await {
                Ok(ids) => ids,
                Err(error) => {
                    tracing::error!(%error, "failed to list active matches");
                    continue;
                }
            };

            if lobby_ids.is_empty() {
                continue;
            }

            let sweeps = lobby_ids.iter().map(|lobby_id| {
                let engine = engine.clone();
                async move {
                    if let Err(error) = engine.check_phase_timeout(lobby_id).await {
                        tracing::error!(lobby_id, %error, "phase timeout check failed");
                    }
                }
            });

            futures::future::join_all(sweeps).await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::durable::InMemoryDurableStore;
    use crate::lobby::LobbyManager;
    use crate::quiz::StaticQuestionSupplier;
    use crate::store::{InMemoryStore, KeyValueStore};
    use crate::types::{Answer, MatchConfig, Question, RoundPhase};

    fn catalog() -> Vec<Question> {
        vec![Question {
            id: "q1".to_string(),
            question: "question 1".to_string(),
            answers: (0..4)
                .map(|a| Answer {
                    id: format!("q1-a{a}"),
                    text: format!("answer {a}"),
                    is_correct: a == 0,
                })
                .collect(),
        }]
    }

    #[tokio::test]
    async fn sweeper_drives_an_expired_phase_forward() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let durable = Arc::new(InMemoryDurableStore::new());
        let lobbies = LobbyManager::new(store.clone(), durable.clone());
        let engine = Arc::new(GameEngine::new(
            store.clone(),
            Arc::new(StaticQuestionSupplier::new(catalog())),
            durable,
        ));

        let lobby_id = lobbies.create_lobby("alice").await.unwrap();
        lobbies.join_lobby(&lobby_id, "bob").await.unwrap();
        lobbies.set_ready(&lobby_id, "bob", true).await.unwrap();
        lobbies.start_setup(&lobby_id, "alice").await.unwrap();

        engine
            .set_match_config(
                &lobby_id,
                "alice",
                MatchConfig {
                    rounds_total: 1,
                    time_per_question: 30,
                    questions_per_round: 1,
                },
            )
            .await
            .unwrap();
        engine.start_match(&lobby_id, "alice").await.unwrap();

        // Backdate the phase so the very first sweep sees it as expired.
        let stale = chrono::Utc::now().timestamp_millis() - 600_000;
        store
            .hset(
                &crate::keys::game::round_meta(&lobby_id, 1),
                &[("phaseStartedAt", stale.to_string())],
            )
            .await
            .unwrap();

        spawn_timeout_sweeper(engine.clone(), Duration::from_millis(10));

        // Zero proposals at timeout: the sweep skips straight through
        // selection into ANSWERING.
        let mut phase = None;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let meta = store
                .hget(&crate::keys::game::round_meta(&lobby_id, 1), "phase")
                .await
                .unwrap();
            phase = meta.and_then(|p| RoundPhase::parse(&p));
            if phase == Some(RoundPhase::Answering) {
                break;
            }
        }
        assert_eq!(phase, Some(RoundPhase::Answering));
    }
}
