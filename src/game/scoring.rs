//! Speed-weighted scoring for a finished answering phase.

use std::collections::HashMap;

use crate::types::{AnswerRecord, Question, UserId};

/// Points for a correct answer given instantly.
pub const MAX_POINTS_PER_QUESTION: i64 = 1000;

/// Compute per-member score deltas for one round.
///
/// Each correct answer awards `floor(1000 × max(0, 1 − elapsed/timeLimit))`
/// where `elapsed` is measured from the start of the answering phase. Pure
/// function: the caller persists the deltas and clears round state. Every
/// member appears in the result, including those who never answered.
pub fn score_round(
    questions: &[Question],
    answers: &HashMap<UserId, AnswerRecord>,
    members: &[UserId],
    phase_started_at: i64,
    time_limit_ms: i64,
) -> HashMap<UserId, i64> {
    let mut deltas = HashMap::new();

    for member in members {
        let delta = deltas.entry(member.clone()).or_insert(0i64);

        let Some(record) = answers.get(member) else {
            continue;
        };

        for question in questions {
            let Some(given) = record.answers.get(&question.id) else {
                continue;
            };
            let Some(correct) = question.correct_answer() else {
                continue;
            };

            if given.answer_id == correct.id {
                let elapsed = given.answered_at - phase_started_at;
                let speed_factor = (1.0 - elapsed as f64 / time_limit_ms as f64).max(0.0);
                *delta += (MAX_POINTS_PER_QUESTION as f64 * speed_factor).floor() as i64;
            }
        }
    }

    deltas
}
