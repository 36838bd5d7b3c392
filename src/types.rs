use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque ID types for type safety
pub type LobbyId = String;
pub type UserId = String;
pub type QuestionId = String;
pub type AnswerId = String;

/// Lifecycle of a lobby, from assembly to teardown.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LobbyState {
    Waiting,
    Setup,
    InGame,
    Finished,
}

impl LobbyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LobbyState::Waiting => "WAITING",
            LobbyState::Setup => "SETUP",
            LobbyState::InGame => "IN_GAME",
            LobbyState::Finished => "FINISHED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "WAITING" => Some(LobbyState::Waiting),
            "SETUP" => Some(LobbyState::Setup),
            "IN_GAME" => Some(LobbyState::InGame),
            "FINISHED" => Some(LobbyState::Finished),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchState {
    InProgress,
    Finished,
}

impl MatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchState::InProgress => "IN_PROGRESS",
            MatchState::Finished => "FINISHED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IN_PROGRESS" => Some(MatchState::InProgress),
            "FINISHED" => Some(MatchState::Finished),
            _ => None,
        }
    }
}

/// Sub-step of a round. Transitions are monotonic within a round.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundPhase {
    TopicInput,
    Voting,
    SelectQuestion,
    Answering,
    RoundEnd,
    MatchEnd,
}

impl RoundPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundPhase::TopicInput => "TOPIC_INPUT",
            RoundPhase::Voting => "VOTING",
            RoundPhase::SelectQuestion => "SELECT_QUESTION",
            RoundPhase::Answering => "ANSWERING",
            RoundPhase::RoundEnd => "ROUND_END",
            RoundPhase::MatchEnd => "MATCH_END",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TOPIC_INPUT" => Some(RoundPhase::TopicInput),
            "VOTING" => Some(RoundPhase::Voting),
            "SELECT_QUESTION" => Some(RoundPhase::SelectQuestion),
            "ANSWERING" => Some(RoundPhase::Answering),
            "ROUND_END" => Some(RoundPhase::RoundEnd),
            "MATCH_END" => Some(RoundPhase::MatchEnd),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "EASY",
            Difficulty::Medium => "MEDIUM",
            Difficulty::Hard => "HARD",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "EASY" => Some(Difficulty::Easy),
            "MEDIUM" => Some(Difficulty::Medium),
            "HARD" => Some(Difficulty::Hard),
            _ => None,
        }
    }

    /// Numeric scale used by question suppliers.
    pub fn scale(&self) -> u8 {
        match self {
            Difficulty::Easy => 1,
            Difficulty::Medium => 2,
            Difficulty::Hard => 3,
        }
    }
}

/// Per-match tunables, immutable once the match starts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MatchConfig {
    pub rounds_total: u32,
    pub time_per_question: u32,
    pub questions_per_round: u32,
}

/// A player's suggested topic for a round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TopicProposal {
    pub topic_title: String,
    pub difficulty: Difficulty,
}

/// The round's chosen topic. `proposer_id = None` means the system fallback
/// was used because nobody proposed.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SelectedTopic {
    pub topic_title: String,
    pub difficulty: Difficulty,
    pub proposer_id: Option<UserId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub id: AnswerId,
    pub text: String,
    pub is_correct: bool,
}

/// A quiz question with four answers, exactly one of them correct.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,
    pub question: String,
    pub answers: Vec<Answer>,
}

impl Question {
    pub fn correct_answer(&self) -> Option<&Answer> {
        self.answers.iter().find(|a| a.is_correct)
    }

    pub fn answer(&self, answer_id: &str) -> Option<&Answer> {
        self.answers.iter().find(|a| a.id == answer_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecordedAnswer {
    pub answer_id: AnswerId,
    /// Epoch milliseconds at the moment the answer was stored.
    pub answered_at: i64,
}

/// All answers a single user gave during one round, keyed by question id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerRecord {
    pub answers: HashMap<QuestionId, RecordedAnswer>,
}

/// A topic submission payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicSubmission {
    pub topic_title: String,
    pub difficulty: Difficulty,
}

/// An answer submission payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSubmission {
    pub question_id: QuestionId,
    pub answer_id: AnswerId,
}

/// Snapshot returned when a match starts.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MatchStartView {
    pub lobby_id: LobbyId,
    pub state: MatchState,
    pub current_round: u32,
    pub phase: RoundPhase,
    pub config: MatchConfig,
}

/// Snapshot of a running match for clients.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MatchView {
    pub lobby_id: LobbyId,
    pub state: MatchState,
    pub current_round: u32,
    pub phase: RoundPhase,
    pub phase_started_at: i64,
    pub selected_topic: Option<SelectedTopic>,
    pub scores: HashMap<UserId, i64>,
}

/// A question as shown to players: the correct answer is not marked.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub id: QuestionId,
    pub question: String,
    pub answers: Vec<PublicAnswer>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublicAnswer {
    pub id: AnswerId,
    pub text: String,
}

impl From<&Question> for PublicQuestion {
    fn from(question: &Question) -> Self {
        Self {
            id: question.id.clone(),
            question: question.question.clone(),
            answers: question
                .answers
                .iter()
                .map(|a| PublicAnswer {
                    id: a.id.clone(),
                    text: a.text.clone(),
                })
                .collect(),
        }
    }
}

/// Outcome of a topic or vote submission.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(
    tag = "status",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum SubmitOutcome {
    WaitingForOthers,
    AllSubmitted { next_phase: RoundPhase },
}

/// Outcome of an answer submission.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(
    tag = "status",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum AnswerOutcome {
    WaitingForOthers,
    RoundComplete { score_deltas: HashMap<UserId, i64> },
}

/// Snapshot of a lobby for clients.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LobbyView {
    pub lobby_id: LobbyId,
    pub owner_id: UserId,
    pub state: LobbyState,
    pub members: Vec<LobbyMember>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LobbyMember {
    pub user_id: UserId,
    pub username: String,
    pub ready: bool,
}

/// Result of removing a member from a lobby.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LobbyRemoval {
    Destroyed,
    Updated { lobby: LobbyView },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_round_trips_through_store_strings() {
        for phase in [
            RoundPhase::TopicInput,
            RoundPhase::Voting,
            RoundPhase::SelectQuestion,
            RoundPhase::Answering,
            RoundPhase::RoundEnd,
            RoundPhase::MatchEnd,
        ] {
            assert_eq!(RoundPhase::parse(phase.as_str()), Some(phase));
        }
        assert_eq!(RoundPhase::parse("IN_PROGESS"), None);
    }

    #[test]
    fn difficulty_maps_to_supplier_scale() {
        assert_eq!(Difficulty::Easy.scale(), 1);
        assert_eq!(Difficulty::Medium.scale(), 2);
        assert_eq!(Difficulty::Hard.scale(), 3);
    }

    #[test]
    fn answer_record_serializes_with_camel_case_fields() {
        let mut record = AnswerRecord::default();
        record.answers.insert(
            "q1".to_string(),
            RecordedAnswer {
                answer_id: "a3".to_string(),
                answered_at: 1_700_000_000_000,
            },
        );

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"answeredAt\""));
        assert!(json.contains("\"answerId\""));

        let back: AnswerRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
