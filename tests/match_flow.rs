//! End-to-end flows through lobby assembly, match configuration, rounds and
//! final statistics, driven the same way the HTTP layer drives the engine.

use std::sync::Arc;

use quizarena::durable::{DurableStore, InMemoryDurableStore};
use quizarena::game::{Chooser, GameEngine};
use quizarena::keys;
use quizarena::lobby::LobbyManager;
use quizarena::quiz::StaticQuestionSupplier;
use quizarena::store::{InMemoryStore, KeyValueStore};
use quizarena::types::{
    Answer, AnswerOutcome, AnswerSubmission, Difficulty, LobbyState, MatchConfig, Question,
    RoundPhase, SubmitOutcome, TopicSubmission,
};

/// Deterministic tie-break: always the first (sorted) candidate.
struct FirstChooser;

impl Chooser for FirstChooser {
    fn pick(&self, _len: usize) -> usize {
        0
    }
}

fn catalog(n: usize) -> Vec<Question> {
    (1..=n)
        .map(|i| Question {
            id: format!("q{i}"),
            question: format!("question {i}"),
            answers: (0..4)
                .map(|a| Answer {
                    id: format!("q{i}-a{a}"),
                    text: format!("answer {a}"),
                    is_correct: a == 0,
                })
                .collect(),
        })
        .collect()
}

struct Harness {
    store: Arc<dyn KeyValueStore>,
    lobbies: LobbyManager,
    engine: GameEngine,
    durable: Arc<InMemoryDurableStore>,
}

/// Assemble a lobby in SETUP with the given members, first member owning it.
async fn setup_lobby(members: &[&str], topics: Vec<String>) -> (Harness, String) {
    let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
    let durable = Arc::new(InMemoryDurableStore::with_topics(topics));
    let lobbies = LobbyManager::new(store.clone(), durable.clone());
    let engine = GameEngine::new(
        store.clone(),
        Arc::new(StaticQuestionSupplier::new(catalog(10))),
        durable.clone(),
    )
    .with_chooser(Arc::new(FirstChooser));

    let lobby_id = lobbies.create_lobby(members[0]).await.unwrap();
    for member in &members[1..] {
        lobbies.join_lobby(&lobby_id, member).await.unwrap();
        lobbies.set_ready(&lobby_id, member, true).await.unwrap();
    }
    lobbies.start_setup(&lobby_id, members[0]).await.unwrap();

    (
        Harness {
            store,
            lobbies,
            engine,
            durable,
        },
        lobby_id,
    )
}

fn topic(title: &str) -> TopicSubmission {
    TopicSubmission {
        topic_title: title.to_string(),
        difficulty: Difficulty::Easy,
    }
}

fn answer(question: &str, answer: &str) -> AnswerSubmission {
    AnswerSubmission {
        question_id: question.to_string(),
        answer_id: answer.to_string(),
    }
}

async fn phase_of(h: &Harness, lobby_id: &str, round: u32) -> RoundPhase {
    let raw = h
        .store
        .hget(&keys::game::round_meta(lobby_id, round), "phase")
        .await
        .unwrap()
        .expect("round meta should exist");
    RoundPhase::parse(&raw).expect("stored phase should be canonical")
}

/// Backdate the current phase so the next sweep sees it as expired.
async fn expire_phase(h: &Harness, lobby_id: &str, round: u32) {
    let stale = chrono::Utc::now().timestamp_millis() - 600_000;
    h.store
        .hset(
            &keys::game::round_meta(lobby_id, round),
            &[("phaseStartedAt", stale.to_string())],
        )
        .await
        .unwrap();
}

/// Scenario A: a 2-member single-round match runs front to back, skipping the
/// voting phase, and finishes with both members tied as winners.
#[tokio::test]
async fn two_player_single_round_match_ends_with_tied_winners() {
    let (h, lobby_id) = setup_lobby(&["alice", "bob"], vec![]).await;

    h.engine
        .set_match_config(
            &lobby_id,
            "alice",
            MatchConfig {
                rounds_total: 1,
                time_per_question: 30,
                questions_per_round: 3,
            },
        )
        .await
        .unwrap();
    let started = h.engine.start_match(&lobby_id, "alice").await.unwrap();
    assert_eq!(started.phase, RoundPhase::TopicInput);

    let first = h
        .engine
        .submit_topic(&lobby_id, "alice", topic("Birds"))
        .await
        .unwrap();
    assert_eq!(first, SubmitOutcome::WaitingForOthers);

    // Two players: the last proposal skips voting entirely.
    let second = h
        .engine
        .submit_topic(&lobby_id, "bob", topic("Bees"))
        .await
        .unwrap();
    assert_eq!(
        second,
        SubmitOutcome::AllSubmitted {
            next_phase: RoundPhase::SelectQuestion
        }
    );
    assert_eq!(phase_of(&h, &lobby_id, 1).await, RoundPhase::Answering);

    let questions = h.engine.current_questions(&lobby_id).await.unwrap();
    assert_eq!(questions.len(), 3);

    // Pin the answering clock far in the past so both members land on the
    // same award and finish tied.
    expire_phase(&h, &lobby_id, 1).await;

    for q in ["q1", "q2", "q3"] {
        let outcome = h
            .engine
            .submit_answer(&lobby_id, "alice", answer(q, &format!("{q}-a0")))
            .await
            .unwrap();
        assert_eq!(outcome, AnswerOutcome::WaitingForOthers);
    }
    for q in ["q1", "q2"] {
        h.engine
            .submit_answer(&lobby_id, "bob", answer(q, &format!("{q}-a0")))
            .await
            .unwrap();
    }

    // The last answer of the last member finalizes the round synchronously.
    let last = h
        .engine
        .submit_answer(&lobby_id, "bob", answer("q3", "q3-a0"))
        .await
        .unwrap();
    match last {
        AnswerOutcome::RoundComplete { score_deltas } => {
            assert_eq!(score_deltas.len(), 2);
        }
        AnswerOutcome::WaitingForOthers => panic!("expected round completion"),
    }

    // Match is over: lobby mirrors FINISHED, both members are winners.
    let lobby = h.lobbies.get_lobby(&lobby_id).await.unwrap();
    assert_eq!(lobby.state, LobbyState::Finished);
    assert_eq!(phase_of(&h, &lobby_id, 1).await, RoundPhase::MatchEnd);

    for user in ["alice", "bob"] {
        let stats = h.durable.user_stats(user).await.unwrap().unwrap();
        assert_eq!(stats.games_played, 1);
        assert_eq!(stats.games_won, 1);
        assert_eq!(stats.games_lost, 0);
    }

    // Match-scoped keys were purged.
    assert!(h
        .store
        .hget_all(&keys::game::match_meta(&lobby_id))
        .await
        .unwrap()
        .is_empty());
    assert!(h
        .store
        .hget_all(&keys::game::match_config(&lobby_id))
        .await
        .unwrap()
        .is_empty());
    assert!(h
        .store
        .hget_all(&keys::game::scores(&lobby_id))
        .await
        .unwrap()
        .is_empty());
}

/// Scenario B: with three members and only two proposals, the topic deadline
/// sends the round to VOTING.
#[tokio::test]
async fn topic_timeout_with_partial_proposals_opens_voting() {
    let (h, lobby_id) = setup_lobby(&["alice", "bob", "carol"], vec![]).await;

    h.engine
        .set_match_config(
            &lobby_id,
            "alice",
            MatchConfig {
                rounds_total: 1,
                time_per_question: 30,
                questions_per_round: 2,
            },
        )
        .await
        .unwrap();
    h.engine.start_match(&lobby_id, "alice").await.unwrap();

    h.engine
        .submit_topic(&lobby_id, "alice", topic("Birds"))
        .await
        .unwrap();
    h.engine
        .submit_topic(&lobby_id, "bob", topic("Bees"))
        .await
        .unwrap();

    expire_phase(&h, &lobby_id, 1).await;
    h.engine.check_phase_timeout(&lobby_id).await.unwrap();

    assert_eq!(phase_of(&h, &lobby_id, 1).await, RoundPhase::Voting);

    // carol never proposed, but may still vote for an existing proposal.
    let outcome = h
        .engine
        .submit_vote(&lobby_id, "carol", "alice")
        .await
        .unwrap();
    assert_eq!(outcome, SubmitOutcome::WaitingForOthers);
}

/// Scenario C: nobody proposes, so the timeout path falls back to a
/// supplier-chosen topic with no proposer.
#[tokio::test]
async fn topic_timeout_without_proposals_uses_the_fallback_topic() {
    let (h, lobby_id) = setup_lobby(
        &["alice", "bob", "carol"],
        vec!["Ancient Rome".to_string()],
    )
    .await;

    h.engine
        .set_match_config(
            &lobby_id,
            "alice",
            MatchConfig {
                rounds_total: 1,
                time_per_question: 30,
                questions_per_round: 2,
            },
        )
        .await
        .unwrap();
    h.engine.start_match(&lobby_id, "alice").await.unwrap();

    expire_phase(&h, &lobby_id, 1).await;
    h.engine.check_phase_timeout(&lobby_id).await.unwrap();

    assert_eq!(phase_of(&h, &lobby_id, 1).await, RoundPhase::Answering);

    let view = h.engine.match_view(&lobby_id).await.unwrap();
    let selected = view.selected_topic.expect("topic should be selected");
    assert_eq!(selected.topic_title, "Ancient Rome");
    assert_eq!(selected.difficulty, Difficulty::Easy);
    assert_eq!(selected.proposer_id, None);
}

/// A full 3-player round including the voting phase.
#[tokio::test]
async fn three_player_round_votes_out_a_topic() {
    let (h, lobby_id) = setup_lobby(&["alice", "bob", "carol"], vec![]).await;

    h.engine
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
    h.engine.start_match(&lobby_id, "alice").await.unwrap();

    for (user, title) in [("alice", "Birds"), ("bob", "Bees"), ("carol", "Ants")] {
        h.engine
            .submit_topic(&lobby_id, user, topic(title))
            .await
            .unwrap();
    }
    assert_eq!(phase_of(&h, &lobby_id, 1).await, RoundPhase::Voting);

    h.engine
        .submit_vote(&lobby_id, "alice", "carol")
        .await
        .unwrap();
    h.engine
        .submit_vote(&lobby_id, "bob", "carol")
        .await
        .unwrap();
    let last = h
        .engine
        .submit_vote(&lobby_id, "carol", "alice")
        .await
        .unwrap();
    assert_eq!(
        last,
        SubmitOutcome::AllSubmitted {
            next_phase: RoundPhase::SelectQuestion
        }
    );

    let view = h.engine.match_view(&lobby_id).await.unwrap();
    assert_eq!(view.phase, RoundPhase::Answering);
    let selected = view.selected_topic.unwrap();
    assert_eq!(selected.topic_title, "Ants");
    assert_eq!(selected.proposer_id.as_deref(), Some("carol"));
}

/// Round advance: a 2-round match moves through a fresh TOPIC_INPUT before
/// finishing, and stats are written exactly once at the end.
#[tokio::test]
async fn rounds_advance_until_the_configured_total() {
    let (h, lobby_id) = setup_lobby(&["alice", "bob"], vec![]).await;

    h.engine
        .set_match_config(
            &lobby_id,
            "alice",
            MatchConfig {
                rounds_total: 2,
                time_per_question: 30,
                questions_per_round: 1,
            },
        )
        .await
        .unwrap();
    h.engine.start_match(&lobby_id, "alice").await.unwrap();

    // Round 1: alice answers correctly, bob wrongly.
    h.engine
        .submit_topic(&lobby_id, "alice", topic("Birds"))
        .await
        .unwrap();
    h.engine
        .submit_topic(&lobby_id, "bob", topic("Bees"))
        .await
        .unwrap();
    h.engine
        .submit_answer(&lobby_id, "alice", answer("q1", "q1-a0"))
        .await
        .unwrap();
    let outcome = h
        .engine
        .submit_answer(&lobby_id, "bob", answer("q1", "q1-a1"))
        .await
        .unwrap();
    assert!(matches!(outcome, AnswerOutcome::RoundComplete { .. }));

    // Round 2 opened with a fresh TOPIC_INPUT.
    let view = h.engine.match_view(&lobby_id).await.unwrap();
    assert_eq!(view.current_round, 2);
    assert_eq!(view.phase, RoundPhase::TopicInput);
    assert!(view.scores.get("alice").copied().unwrap_or(0) > 0);

    // No stats yet: the match is still running.
    assert!(h.durable.user_stats("alice").await.unwrap().is_none());

    // Round 2: nobody acts at all; sweeps drive it to completion.
    expire_phase(&h, &lobby_id, 2).await;
    h.engine.check_phase_timeout(&lobby_id).await.unwrap();
    assert_eq!(phase_of(&h, &lobby_id, 2).await, RoundPhase::Answering);

    expire_phase(&h, &lobby_id, 2).await;
    h.engine.check_phase_timeout(&lobby_id).await.unwrap();

    // Match finished: alice outscored bob across rounds.
    let alice = h.durable.user_stats("alice").await.unwrap().unwrap();
    let bob = h.durable.user_stats("bob").await.unwrap().unwrap();
    assert_eq!((alice.games_played, alice.games_won, alice.games_lost), (1, 1, 0));
    assert_eq!((bob.games_played, bob.games_won, bob.games_lost), (1, 0, 1));

    assert!(!h
        .store
        .sismember(keys::game::ACTIVE_MATCHES, &lobby_id)
        .await
        .unwrap());
}

/// Concurrency property: every missing member submits at the same moment and
/// the phase still advances exactly once.
#[tokio::test]
async fn concurrent_final_proposals_cause_a_single_transition() {
    let (h, lobby_id) = setup_lobby(&["alice", "bob", "carol", "dave"], vec![]).await;

    h.engine
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
    h.engine.start_match(&lobby_id, "alice").await.unwrap();

    let (a, b, c, d) = tokio::join!(
        h.engine.submit_topic(&lobby_id, "alice", topic("Birds")),
        h.engine.submit_topic(&lobby_id, "bob", topic("Bees")),
        h.engine.submit_topic(&lobby_id, "carol", topic("Ants")),
        h.engine.submit_topic(&lobby_id, "dave", topic("Moths")),
    );
    for outcome in [a, b, c, d] {
        outcome.unwrap();
    }

    // Four members: exactly one transition into VOTING, and no further.
    assert_eq!(phase_of(&h, &lobby_id, 1).await, RoundPhase::Voting);
    let view = h.engine.match_view(&lobby_id).await.unwrap();
    assert_eq!(view.current_round, 1);
}

/// Redundant sweeps racing an expired phase advance it exactly once.
#[tokio::test]
async fn concurrent_sweeps_are_idempotent() {
    let (h, lobby_id) = setup_lobby(&["alice", "bob", "carol"], vec![]).await;

    h.engine
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
    h.engine.start_match(&lobby_id, "alice").await.unwrap();

    h.engine
        .submit_topic(&lobby_id, "alice", topic("Birds"))
        .await
        .unwrap();

    expire_phase(&h, &lobby_id, 1).await;

    let (s1, s2, s3, s4, s5) = tokio::join!(
        h.engine.check_phase_timeout(&lobby_id),
        h.engine.check_phase_timeout(&lobby_id),
        h.engine.check_phase_timeout(&lobby_id),
        h.engine.check_phase_timeout(&lobby_id),
        h.engine.check_phase_timeout(&lobby_id),
    );
    for sweep in [s1, s2, s3, s4, s5] {
        sweep.unwrap();
    }

    // One proposal, three members: the expired TOPIC_INPUT opens VOTING once.
    assert_eq!(phase_of(&h, &lobby_id, 1).await, RoundPhase::Voting);
}

/// Concurrent last votes: selection runs once and the question set is
/// written once.
#[tokio::test]
async fn concurrent_final_votes_select_once() {
    let (h, lobby_id) = setup_lobby(&["alice", "bob", "carol"], vec![]).await;

    h.engine
        .set_match_config(
            &lobby_id,
            "alice",
            MatchConfig {
                rounds_total: 1,
                time_per_question: 30,
                questions_per_round: 2,
            },
        )
        .await
        .unwrap();
    h.engine.start_match(&lobby_id, "alice").await.unwrap();

    for (user, title) in [("alice", "Birds"), ("bob", "Bees"), ("carol", "Ants")] {
        h.engine
            .submit_topic(&lobby_id, user, topic(title))
            .await
            .unwrap();
    }

    let (a, b, c) = tokio::join!(
        h.engine.submit_vote(&lobby_id, "alice", "bob"),
        h.engine.submit_vote(&lobby_id, "bob", "alice"),
        h.engine.submit_vote(&lobby_id, "carol", "bob"),
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();

    let view = h.engine.match_view(&lobby_id).await.unwrap();
    assert_eq!(view.phase, RoundPhase::Answering);
    assert_eq!(view.current_round, 1);

    let selected = view.selected_topic.unwrap();
    assert_eq!(selected.proposer_id.as_deref(), Some("bob"));

    let questions = h.engine.current_questions(&lobby_id).await.unwrap();
    assert_eq!(questions.len(), 2);
}
