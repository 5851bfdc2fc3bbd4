use thiserror::Error;

use crate::{
    db::{DatabaseError, GuildData, NewGuild, NewPlayer, NewRank, PlayerData},
    reconcile::LEADER_RANK,
    util::random_string,
    QuartermasterContext,
};

const KEY_LENGTH: usize = 32;

/// Resolves opaque player keys and registers new guilds
pub struct Auth {
    context: QuartermasterContext,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// The key is unknown or belongs to a deactivated player
    #[error("Invalid player key")]
    InvalidKey,
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(DatabaseError),
}

/// A resolved key: the acting player and the guild they belong to
#[derive(Debug, Clone)]
pub struct SessionData {
    pub player: PlayerData,
    pub guild: GuildData,
}

#[derive(Debug)]
pub struct NewGuildRegistration {
    pub guild_name: String,
    pub server: String,
    pub leader_name: String,
    pub leader_class: Option<String>,
}

/// What a successful registration hands back to the caller. The key is
/// shown exactly once here.
#[derive(Debug)]
pub struct RegisteredGuild {
    pub guild: GuildData,
    pub leader: PlayerData,
    pub key: String,
}

impl Auth {
    pub fn new(context: &QuartermasterContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Registers a guild along with its leader player, minting the
    /// leader's auth key
    pub async fn register_guild(
        &self,
        registration: NewGuildRegistration,
    ) -> Result<RegisteredGuild, DatabaseError> {
        let db = &self.context.database;

        let guild = db
            .create_guild(NewGuild {
                name: registration.guild_name,
                server: registration.server,
            })
            .await?;

        let leader_rank = db
            .create_rank(NewRank {
                guild_id: guild.id,
                name: LEADER_RANK.to_string(),
            })
            .await?;

        let key = random_string(KEY_LENGTH);

        let leader = db
            .create_player(NewPlayer {
                guild_id: guild.id,
                name: registration.leader_name,
                class: registration.leader_class,
                level: None,
                rank_id: Some(leader_rank.id),
                admin: true,
                alt: false,
                active: true,
                last_seen: None,
                zone: None,
                notes: None,
                key: Some(key.clone()),
            })
            .await?;

        Ok(RegisteredGuild { guild, leader, key })
    }

    /// Resolves a key to its player and guild, if the player is still
    /// active
    pub async fn session(&self, key: &str) -> Result<SessionData, AuthError> {
        let player = self
            .context
            .database
            .player_by_key(key)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound { .. } => AuthError::InvalidKey,
                err => AuthError::Db(err),
            })?;

        if !player.active {
            return Err(AuthError::InvalidKey);
        }

        let guild = self
            .context
            .database
            .guild_by_id(player.guild_id)
            .await
            .map_err(AuthError::Db)?;

        Ok(SessionData { player, guild })
    }
}
