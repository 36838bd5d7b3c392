//! Pre-match room lifecycle: membership, readiness, ownership, teardown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::durable::DurableStore;
use crate::error::{GameError, GameResult};
use crate::keys;
use crate::store::KeyValueStore;
use crate::types::{LobbyId, LobbyMember, LobbyRemoval, LobbyState, LobbyView, UserId};

/// Idle lobbies expire an hour after their last mutation.
const LOBBY_TTL: Duration = Duration::from_secs(3600);

const FIELD_OWNER_ID: &str = "ownerId";
const FIELD_STATE: &str = "state";
const FIELD_CREATED_AT: &str = "createdAt";

pub struct LobbyManager {
    store: Arc<dyn KeyValueStore>,
    durable: Arc<dyn DurableStore>,
}

impl LobbyManager {
    pub fn new(store: Arc<dyn KeyValueStore>, durable: Arc<dyn DurableStore>) -> Self {
        Self { store, durable }
    }

    /// Create a lobby with `owner_id` as its sole, ready member.
    pub async fn create_lobby(&self, owner_id: &str) -> GameResult<LobbyId> {
        let existing = self.store.get(&keys::lobby::user_lobby(owner_id)).await?;
        if existing.is_some() {
            return Err(GameError::forbidden("User is already in a lobby"));
        }

        let lobby_id = ulid::Ulid::new().to_string();

        self.store
            .hset(
                &keys::lobby::meta(&lobby_id),
                &[
                    (FIELD_OWNER_ID, owner_id.to_string()),
                    (FIELD_STATE, LobbyState::Waiting.as_str().to_string()),
                    (FIELD_CREATED_AT, now_ms().to_string()),
                ],
            )
            .await?;

        self.store
            .sadd(&keys::lobby::members(&lobby_id), owner_id)
            .await?;
        self.store
            .hset(&keys::lobby::ready(&lobby_id), &[(owner_id, "1".to_string())])
            .await?;
        self.store
            .set(&keys::lobby::user_lobby(owner_id), &lobby_id)
            .await?;

        self.refresh_ttl(&lobby_id).await?;

        tracing::info!(lobby_id, owner_id, "lobby created");
        Ok(lobby_id)
    }

    pub async fn get_lobby(&self, lobby_id: &str) -> GameResult<LobbyView> {
        let meta = self.meta(lobby_id).await?;
        let owner_id = meta.owner_id;

        let mut member_ids = self
            .store
            .smembers(&keys::lobby::members(lobby_id))
            .await?;
        member_ids.sort();

        let ready_map = self.store.hget_all(&keys::lobby::ready(lobby_id)).await?;
        let usernames = self.durable.member_usernames(&member_ids).await?;

        let members = member_ids
            .into_iter()
            .map(|user_id| LobbyMember {
                username: usernames
                    .get(&user_id)
                    .cloned()
                    .unwrap_or_else(|| user_id.clone()),
                ready: ready_map.get(&user_id).map(String::as_str) == Some("1"),
                user_id,
            })
            .collect();

        Ok(LobbyView {
            lobby_id: lobby_id.to_string(),
            owner_id,
            state: meta.state,
            members,
        })
    }

    pub async fn join_lobby(&self, lobby_id: &str, user_id: &str) -> GameResult<LobbyView> {
        let meta = self.meta(lobby_id).await?;
        if meta.state != LobbyState::Waiting {
            return Err(GameError::forbidden("Lobby is not joinable"));
        }

        let existing = self.store.get(&keys::lobby::user_lobby(user_id)).await?;
        if existing.is_some() {
            return Err(GameError::forbidden("User is already in a lobby"));
        }

        self.store
            .sadd(&keys::lobby::members(lobby_id), user_id)
            .await?;
        self.store
            .hset(&keys::lobby::ready(lobby_id), &[(user_id, "0".to_string())])
            .await?;
        self.store
            .set(&keys::lobby::user_lobby(user_id), lobby_id)
            .await?;

        self.refresh_ttl(lobby_id).await?;

        self.get_lobby(lobby_id).await
    }

    pub async fn set_ready(&self, lobby_id: &str, user_id: &str, ready: bool) -> GameResult<LobbyView> {
        let is_member = self
            .store
            .sismember(&keys::lobby::members(lobby_id), user_id)
            .await?;
        if !is_member {
            return Err(GameError::forbidden("Not a lobby member"));
        }

        self.store
            .hset(
                &keys::lobby::ready(lobby_id),
                &[(user_id, if ready { "1" } else { "0" }.to_string())],
            )
            .await?;

        self.refresh_ttl(lobby_id).await?;

        self.get_lobby(lobby_id).await
    }

    /// Move the lobby from `WAITING` to `SETUP`. Owner only, and only once
    /// every member has flagged ready.
    pub async fn start_setup(&self, lobby_id: &str, user_id: &str) -> GameResult<LobbyView> {
        let meta = self.meta(lobby_id).await?;
        if meta.owner_id != user_id {
            return Err(GameError::forbidden("Only lobby owner can start the game"));
        }
        if meta.state != LobbyState::Waiting {
            return Err(GameError::forbidden("Cannot start game from this lobby state"));
        }

        let members = self
            .store
            .smembers(&keys::lobby::members(lobby_id))
            .await?;
        let ready_map = self.store.hget_all(&keys::lobby::ready(lobby_id)).await?;
        let all_ready = members
            .iter()
            .all(|id| ready_map.get(id).map(String::as_str) == Some("1"));

        if !all_ready {
            return Err(GameError::forbidden("Not all players are ready"));
        }

        self.store
            .hset(
                &keys::lobby::meta(lobby_id),
                &[(FIELD_STATE, LobbyState::Setup.as_str().to_string())],
            )
            .await?;

        self.refresh_ttl(lobby_id).await?;

        self.get_lobby(lobby_id).await
    }

    pub async fn leave_lobby(&self, lobby_id: &str, user_id: &str) -> GameResult<LobbyRemoval> {
        let meta = self.meta(lobby_id).await?;
        if meta.state != LobbyState::Waiting {
            return Err(GameError::forbidden("Cannot leave during an active game"));
        }

        let is_member = self
            .store
            .sismember(&keys::lobby::members(lobby_id), user_id)
            .await?;
        if !is_member {
            return Err(GameError::forbidden("User is not a member of this lobby"));
        }

        self.remove_member(lobby_id, user_id).await
    }

    pub async fn kick_player(
        &self,
        lobby_id: &str,
        owner_id: &str,
        target_user_id: &str,
    ) -> GameResult<LobbyRemoval> {
        let meta = self.meta(lobby_id).await?;
        if meta.owner_id != owner_id {
            return Err(GameError::forbidden("Only lobby owner can kick players"));
        }
        if owner_id == target_user_id {
            return Err(GameError::forbidden("Owner cannot kick themselves"));
        }
        if meta.state != LobbyState::Waiting {
            return Err(GameError::forbidden(
                "Cannot kick players during an active game",
            ));
        }

        let is_member = self
            .store
            .sismember(&keys::lobby::members(lobby_id), target_user_id)
            .await?;
        if !is_member {
            return Err(GameError::not_found("User is not in this lobby"));
        }

        self.remove_member(lobby_id, target_user_id).await
    }

    async fn remove_member(&self, lobby_id: &str, user_id: &str) -> GameResult<LobbyRemoval> {
        self.store
            .srem(&keys::lobby::members(lobby_id), user_id)
            .await?;
        self.store
            .hdel(&keys::lobby::ready(lobby_id), user_id)
            .await?;
        self.store
            .del(&[&keys::lobby::user_lobby(user_id)])
            .await?;

        let mut remaining = self
            .store
            .smembers(&keys::lobby::members(lobby_id))
            .await?;

        if remaining.is_empty() {
            self.destroy_lobby(lobby_id).await?;
            return Ok(LobbyRemoval::Destroyed);
        }

        let meta = self.meta(lobby_id).await?;
        if meta.owner_id == user_id {
            remaining.sort();
            let new_owner_id = &remaining[0];
            self.store
                .hset(
                    &keys::lobby::meta(lobby_id),
                    &[(FIELD_OWNER_ID, new_owner_id.clone())],
                )
                .await?;
            tracing::info!(lobby_id, new_owner_id, "lobby ownership reassigned");
        }

        self.refresh_ttl(lobby_id).await?;

        Ok(LobbyRemoval::Updated {
            lobby: self.get_lobby(lobby_id).await?,
        })
    }

    /// Unconditionally clear all lobby keys and every member's reverse
    /// pointer. Safe to call on an already-destroyed lobby.
    pub async fn destroy_lobby(&self, lobby_id: &str) -> GameResult<()> {
        let members = self
            .store
            .smembers(&keys::lobby::members(lobby_id))
            .await?;
        for user_id in &members {
            self.store.del(&[&keys::lobby::user_lobby(user_id)]).await?;
        }

        self.store
            .del(&[
                &keys::lobby::meta(lobby_id),
                &keys::lobby::members(lobby_id),
                &keys::lobby::ready(lobby_id),
            ])
            .await?;

        tracing::info!(lobby_id, "lobby destroyed");
        Ok(())
    }

    async fn meta(&self, lobby_id: &str) -> GameResult<LobbyMeta> {
        let raw = self.store.hget_all(&keys::lobby::meta(lobby_id)).await?;
        LobbyMeta::from_raw(&raw).ok_or_else(|| GameError::not_found("Lobby not found"))
    }

    /// Bound storage growth from abandoned lobbies. The reverse pointers
    /// share the lobby's deadline so an expired lobby cannot strand its
    /// members in a ghost membership.
    async fn refresh_ttl(&self, lobby_id: &str) -> GameResult<()> {
        self.store
            .expire(&keys::lobby::meta(lobby_id), LOBBY_TTL)
            .await?;
        self.store
            .expire(&keys::lobby::members(lobby_id), LOBBY_TTL)
            .await?;
        self.store
            .expire(&keys::lobby::ready(lobby_id), LOBBY_TTL)
            .await?;

        let members = self
            .store
            .smembers(&keys::lobby::members(lobby_id))
            .await?;
        for user_id in &members {
            self.store
                .expire(&keys::lobby::user_lobby(user_id), LOBBY_TTL)
                .await?;
        }
        Ok(())
    }
}

struct LobbyMeta {
    owner_id: UserId,
    state: LobbyState,
}

impl LobbyMeta {
    fn from_raw(raw: &HashMap<String, String>) -> Option<Self> {
        let owner_id = raw.get(FIELD_OWNER_ID)?.clone();
        let state = LobbyState::parse(raw.get(FIELD_STATE)?)?;
        Some(Self { owner_id, state })
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
