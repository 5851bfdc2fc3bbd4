use log::info;
use thiserror::Error;

use crate::{
    db::{DatabaseError, GuildData, PlayerData, PrimaryKey, UpdatedGuild},
    events::GuildEvent,
    reconcile::LEADER_RANK,
    QuartermasterContext,
};

/// Guild-level administration: the loot lock, settings, leadership, and
/// alt linkage
pub struct GuildManager {
    context: QuartermasterContext,
}

#[derive(Debug, Error)]
pub enum GuildError {
    #[error("Only the guild leader can do this")]
    NotLeader,
    #[error("A player cannot be linked as their own alt")]
    SelfLink,
    #[error("{name} is not one of your linked alts")]
    NotLinked { name: String },
    #[error("{name} is inactive and cannot receive leadership")]
    Inactive { name: String },
    #[error(transparent)]
    Db(#[from] DatabaseError),
}

impl GuildManager {
    pub fn new(context: &QuartermasterContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// The guild roster, hidden players excluded
    pub async fn roster(&self, guild_id: PrimaryKey) -> Result<Vec<PlayerData>, DatabaseError> {
        let players = self.context.database.players_by_guild(guild_id).await?;

        Ok(players.into_iter().filter(|p| !p.hidden).collect())
    }

    /// Locks or unlocks loot requesting for the guild
    pub async fn set_loot_lock(
        &self,
        guild: &GuildData,
        locked: bool,
    ) -> Result<(), DatabaseError> {
        self.context.database.set_loot_lock(guild.id, locked).await?;

        info!(
            "Loot requesting {} for guild {}",
            if locked { "locked" } else { "unlocked" },
            guild.name
        );

        self.context.emit(GuildEvent::LootLock {
            guild_id: guild.id,
            locked,
        });

        Ok(())
    }

    /// Updates the message of the day and webhook settings
    pub async fn update_settings(
        &self,
        updated_guild: UpdatedGuild,
    ) -> Result<GuildData, DatabaseError> {
        self.context.database.update_guild(updated_guild).await
    }

    /// Whether the player currently holds the Leader rank
    pub async fn is_leader(&self, player: &PlayerData) -> Result<bool, DatabaseError> {
        let ranks = self.context.database.ranks_by_guild(player.guild_id).await?;

        let leader_rank = ranks
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(LEADER_RANK));

        Ok(leader_rank.is_some_and(|r| player.rank_id == Some(r.id)))
    }

    /// Errors unless the player holds the Leader rank
    pub async fn ensure_leader(&self, player: &PlayerData) -> Result<(), GuildError> {
        if self.is_leader(player).await? {
            Ok(())
        } else {
            Err(GuildError::NotLeader)
        }
    }

    /// Explicitly hands the Leader rank to another active member. The
    /// outgoing leader keeps admin but loses the rank; a later roster
    /// dump restores whatever rank the game now reports for them.
    pub async fn transfer_leadership(
        &self,
        guild: &GuildData,
        leader: &PlayerData,
        successor_name: &str,
    ) -> Result<PlayerData, GuildError> {
        let db = &self.context.database;

        let successor = db.player_by_name(guild.id, successor_name).await?;

        if !successor.active {
            return Err(GuildError::Inactive {
                name: successor.name,
            });
        }

        let ranks = db.ranks_by_guild(guild.id).await?;
        let leader_rank = ranks
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(LEADER_RANK))
            .ok_or(DatabaseError::NotFound {
                resource: "rank",
                identifier: "Leader",
            })?;

        db.set_player_rank(leader.id, None).await?;
        db.set_player_rank(successor.id, Some(leader_rank.id)).await?;
        db.set_player_admin(successor.id, true).await?;

        info!(
            "Guild {} leadership transferred from {} to {}",
            guild.name, leader.name, successor.name
        );

        db.player_by_id(successor.id).await.map_err(Into::into)
    }

    /// Links a named guild member as an alt of the acting player
    pub async fn link_alt(
        &self,
        player: &PlayerData,
        alt_name: &str,
    ) -> Result<PlayerData, GuildError> {
        let db = &self.context.database;

        let alt = db.player_by_name(player.guild_id, alt_name).await?;

        if alt.id == player.id {
            return Err(GuildError::SelfLink);
        }

        db.set_player_main(alt.id, Some(player.id), true).await?;

        db.player_by_id(alt.id).await.map_err(Into::into)
    }

    /// Severs the link between the acting player and one of their alts
    pub async fn unlink_alt(
        &self,
        player: &PlayerData,
        alt_id: PrimaryKey,
    ) -> Result<(), GuildError> {
        let db = &self.context.database;

        let alt = db.player_by_id(alt_id).await?;

        if alt.main_id != Some(player.id) {
            return Err(GuildError::NotLinked { name: alt.name });
        }

        db.set_player_main(alt.id, None, alt.alt).await?;

        Ok(())
    }

    /// The alts currently linked to the player
    pub async fn linked_alts(
        &self,
        player: &PlayerData,
    ) -> Result<Vec<PlayerData>, DatabaseError> {
        let players = self.context.database.players_by_guild(player.guild_id).await?;

        Ok(players
            .into_iter()
            .filter(|p| p.main_id == Some(player.id))
            .collect())
    }

    /// Hides or unhides a player from the roster and attendance views
    pub async fn set_hidden(
        &self,
        guild: &GuildData,
        player_id: PrimaryKey,
        hidden: bool,
    ) -> Result<(), GuildError> {
        let player = self.member_by_id(guild, player_id).await?;

        self.context
            .database
            .set_player_hidden(player.id, hidden)
            .await
            .map_err(Into::into)
    }

    /// Grants or revokes a player's admin flag
    pub async fn set_admin(
        &self,
        guild: &GuildData,
        player_id: PrimaryKey,
        admin: bool,
    ) -> Result<(), GuildError> {
        let player = self.member_by_id(guild, player_id).await?;

        self.context
            .database
            .set_player_admin(player.id, admin)
            .await
            .map_err(Into::into)
    }

    /// Fetches a player and checks they belong to the guild
    async fn member_by_id(
        &self,
        guild: &GuildData,
        player_id: PrimaryKey,
    ) -> Result<PlayerData, DatabaseError> {
        let player = self.context.database.player_by_id(player_id).await?;

        if player.guild_id != guild.id {
            return Err(DatabaseError::NotFound {
                resource: "player",
                identifier: "id",
            });
        }

        Ok(player)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[tokio::test]
    async fn linking_an_unknown_alt_touches_nothing() {
        let (app, _events) = testing::app().await;
        let registered = testing::register_guild(&app, "Cursed Few", "Vulak").await;

        let result = app
            .guilds
            .link_alt(&registered.leader, "Nonexistent")
            .await;

        assert!(matches!(
            result,
            Err(GuildError::Db(DatabaseError::NotFound { .. }))
        ));

        let alts = app
            .guilds
            .linked_alts(&registered.leader)
            .await
            .expect("alts are listed");

        assert!(alts.is_empty());
    }

    #[tokio::test]
    async fn linking_and_unlinking_an_alt() {
        let (app, _events) = testing::app().await;
        let registered = testing::register_guild(&app, "Cursed Few", "Vulak").await;
        testing::add_player(&app, registered.guild.id, "Bankatron").await;

        let alt = app
            .guilds
            .link_alt(&registered.leader, "Bankatron")
            .await
            .expect("alt links");

        assert_eq!(alt.main_id, Some(registered.leader.id));
        assert!(alt.alt);

        app.guilds
            .unlink_alt(&registered.leader, alt.id)
            .await
            .expect("alt unlinks");

        let alts = app
            .guilds
            .linked_alts(&registered.leader)
            .await
            .expect("alts are listed");

        assert!(alts.is_empty());
    }

    #[tokio::test]
    async fn leadership_transfer_moves_the_rank_and_admin_flag() {
        let (app, _events) = testing::app().await;
        let registered = testing::register_guild(&app, "Cursed Few", "Vulak").await;
        testing::add_player(&app, registered.guild.id, "Aaryonar").await;

        let successor = app
            .guilds
            .transfer_leadership(&registered.guild, &registered.leader, "Aaryonar")
            .await
            .expect("leadership transfers");

        assert!(successor.admin);
        assert!(app
            .guilds
            .is_leader(&successor)
            .await
            .expect("rank resolves"));

        let former = app
            .database()
            .player_by_id(registered.leader.id)
            .await
            .expect("the former leader reloads");

        let check = app.guilds.ensure_leader(&former).await;

        assert!(matches!(check, Err(GuildError::NotLeader)));
    }
}
