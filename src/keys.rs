//! Key-space helpers for the shared store.
//!
//! Keys are namespaced per lobby/match/round so unrelated matches never
//! contend on the same keys.

/// Lobby-scoped keys.
pub mod lobby {
    pub fn meta(lobby_id: &str) -> String {
        format!("lobby:{lobby_id}:meta")
    }

    pub fn members(lobby_id: &str) -> String {
        format!("lobby:{lobby_id}:members")
    }

    pub fn ready(lobby_id: &str) -> String {
        format!("lobby:{lobby_id}:ready")
    }

    /// Reverse pointer enforcing "a user belongs to at most one lobby".
    pub fn user_lobby(user_id: &str) -> String {
        format!("user:{user_id}:lobby")
    }
}

/// Match- and round-scoped keys.
pub mod game {
    /// Registry of matches the timeout sweeper visits.
    pub const ACTIVE_MATCHES: &str = "match:active";

    pub fn match_meta(lobby_id: &str) -> String {
        format!("match:{lobby_id}:meta")
    }

    pub fn match_config(lobby_id: &str) -> String {
        format!("match:{lobby_id}:config")
    }

    pub fn scores(lobby_id: &str) -> String {
        format!("match:{lobby_id}:scores")
    }

    pub fn round_meta(lobby_id: &str, round: u32) -> String {
        format!("match:{lobby_id}:round:{round}:meta")
    }

    pub fn round_inputs(lobby_id: &str, round: u32) -> String {
        format!("match:{lobby_id}:round:{round}:inputs")
    }

    pub fn round_votes(lobby_id: &str, round: u32) -> String {
        format!("match:{lobby_id}:round:{round}:votes")
    }

    pub fn selected(lobby_id: &str, round: u32) -> String {
        format!("match:{lobby_id}:round:{round}:selected")
    }

    pub fn questions(lobby_id: &str, round: u32) -> String {
        format!("match:{lobby_id}:round:{round}:questions")
    }

    pub fn answers(lobby_id: &str, round: u32) -> String {
        format!("match:{lobby_id}:round:{round}:answers")
    }

    /// Claim marker serializing question selection for a round.
    pub fn selecting(lobby_id: &str, round: u32) -> String {
        format!("match:{lobby_id}:round:{round}:selecting")
    }
}
