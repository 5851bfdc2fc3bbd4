use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    Postgres, Transaction,
};

use super::{
    Database, DatabaseError, GuildData, IntoDatabaseError, ItemData, LootData, LootRequestData,
    NewGuild, NewItem, NewLootRequest, NewPlayer, NewRank, PlayerData, PrimaryKey, RaidDumpData,
    RankData, Result, UpdatedGuild,
};
use crate::{
    reconcile::{AttendanceOp, RosterOp},
    util::random_string,
};

const KEY_LENGTH: usize = 32;

/// [Database] backed by PostgreSQL. Expects the schema from the
/// repository's schema.sql to already exist.
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(IntoDatabaseError::any)?;

        Ok(Self { pool })
    }
}

impl IntoDatabaseError for sqlx::Error {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            sqlx::Error::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => DatabaseError::Internal(Box::new(e)),
        }
    }

    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }
}

/// Maps a Postgres unique violation to [DatabaseError::Conflict]
fn conflict_on_unique(
    error: sqlx::Error,
    resource: &'static str,
    field: &'static str,
    value: &str,
) -> DatabaseError {
    if let sqlx::Error::Database(db_error) = &error {
        if db_error.code().as_deref() == Some("23505") {
            return DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            };
        }
    }

    error.any()
}

#[async_trait]
impl Database for PgDatabase {
    async fn guild_by_id(&self, guild_id: PrimaryKey) -> Result<GuildData> {
        sqlx::query_as::<_, GuildData>("SELECT * FROM guilds WHERE id = $1")
            .bind(guild_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("guild", "id"))
    }

    async fn create_guild(&self, new_guild: NewGuild) -> Result<GuildData> {
        sqlx::query_as::<_, GuildData>(
            "INSERT INTO guilds (name, server) VALUES ($1, $2) RETURNING *",
        )
        .bind(&new_guild.name)
        .bind(&new_guild.server)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "guild", "name", &new_guild.name))
    }

    async fn update_guild(&self, updated_guild: UpdatedGuild) -> Result<GuildData> {
        sqlx::query_as::<_, GuildData>(
            "UPDATE guilds
             SET motd = $2, raid_webhook = $3, rot_webhook = $4
             WHERE id = $1
             RETURNING *",
        )
        .bind(updated_guild.id)
        .bind(&updated_guild.motd)
        .bind(&updated_guild.raid_webhook)
        .bind(&updated_guild.rot_webhook)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("guild", "id"))
    }

    async fn set_loot_lock(&self, guild_id: PrimaryKey, locked: bool) -> Result<()> {
        sqlx::query("UPDATE guilds SET loot_locked = $2 WHERE id = $1")
            .bind(guild_id)
            .bind(locked)
            .execute(&self.pool)
            .await
            .map_err(IntoDatabaseError::any)?;

        Ok(())
    }

    async fn player_by_id(&self, player_id: PrimaryKey) -> Result<PlayerData> {
        sqlx::query_as::<_, PlayerData>("SELECT * FROM players WHERE id = $1")
            .bind(player_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("player", "id"))
    }

    async fn player_by_key(&self, key: &str) -> Result<PlayerData> {
        sqlx::query_as::<_, PlayerData>("SELECT * FROM players WHERE key = $1")
            .bind(key)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("player", "key"))
    }

    async fn player_by_name(&self, guild_id: PrimaryKey, name: &str) -> Result<PlayerData> {
        sqlx::query_as::<_, PlayerData>(
            "SELECT * FROM players WHERE guild_id = $1 AND lower(name) = lower($2)",
        )
        .bind(guild_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("player", "name"))
    }

    async fn players_by_guild(&self, guild_id: PrimaryKey) -> Result<Vec<PlayerData>> {
        sqlx::query_as::<_, PlayerData>(
            "SELECT * FROM players WHERE guild_id = $1 ORDER BY name",
        )
        .bind(guild_id)
        .fetch_all(&self.pool)
        .await
        .map_err(IntoDatabaseError::any)
    }

    async fn create_player(&self, new_player: NewPlayer) -> Result<PlayerData> {
        insert_player(&self.pool, &new_player).await
    }

    async fn set_player_main(
        &self,
        player_id: PrimaryKey,
        main_id: Option<PrimaryKey>,
        alt: bool,
    ) -> Result<()> {
        sqlx::query("UPDATE players SET main_id = $2, alt = $3 WHERE id = $1")
            .bind(player_id)
            .bind(main_id)
            .bind(alt)
            .execute(&self.pool)
            .await
            .map_err(IntoDatabaseError::any)?;

        Ok(())
    }

    async fn set_player_rank(
        &self,
        player_id: PrimaryKey,
        rank_id: Option<PrimaryKey>,
    ) -> Result<()> {
        sqlx::query("UPDATE players SET rank_id = $2 WHERE id = $1")
            .bind(player_id)
            .bind(rank_id)
            .execute(&self.pool)
            .await
            .map_err(IntoDatabaseError::any)?;

        Ok(())
    }

    async fn set_player_admin(&self, player_id: PrimaryKey, admin: bool) -> Result<()> {
        sqlx::query("UPDATE players SET admin = $2 WHERE id = $1")
            .bind(player_id)
            .bind(admin)
            .execute(&self.pool)
            .await
            .map_err(IntoDatabaseError::any)?;

        Ok(())
    }

    async fn set_player_hidden(&self, player_id: PrimaryKey, hidden: bool) -> Result<()> {
        sqlx::query("UPDATE players SET hidden = $2 WHERE id = $1")
            .bind(player_id)
            .bind(hidden)
            .execute(&self.pool)
            .await
            .map_err(IntoDatabaseError::any)?;

        Ok(())
    }

    async fn ranks_by_guild(&self, guild_id: PrimaryKey) -> Result<Vec<RankData>> {
        sqlx::query_as::<_, RankData>("SELECT * FROM ranks WHERE guild_id = $1")
            .bind(guild_id)
            .fetch_all(&self.pool)
            .await
            .map_err(IntoDatabaseError::any)
    }

    async fn create_rank(&self, new_rank: NewRank) -> Result<RankData> {
        sqlx::query_as::<_, RankData>(
            "INSERT INTO ranks (guild_id, name) VALUES ($1, $2) RETURNING *",
        )
        .bind(new_rank.guild_id)
        .bind(&new_rank.name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "rank", "name", &new_rank.name))
    }

    async fn item_by_id(&self, item_id: PrimaryKey) -> Result<ItemData> {
        sqlx::query_as::<_, ItemData>("SELECT * FROM items WHERE id = $1")
            .bind(item_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("item", "id"))
    }

    async fn list_items(&self) -> Result<Vec<ItemData>> {
        sqlx::query_as::<_, ItemData>("SELECT * FROM items ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(IntoDatabaseError::any)
    }

    async fn create_item(&self, new_item: NewItem) -> Result<ItemData> {
        sqlx::query_as::<_, ItemData>(
            "INSERT INTO items (name, is_spell) VALUES ($1, $2) RETURNING *",
        )
        .bind(&new_item.name)
        .bind(new_item.is_spell)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "item", "name", &new_item.name))
    }

    async fn loots_by_guild(&self, guild_id: PrimaryKey) -> Result<Vec<LootData>> {
        sqlx::query_as::<_, LootData>("SELECT * FROM loots WHERE guild_id = $1")
            .bind(guild_id)
            .fetch_all(&self.pool)
            .await
            .map_err(IntoDatabaseError::any)
    }

    async fn loot_by_item(&self, guild_id: PrimaryKey, item_id: PrimaryKey) -> Result<LootData> {
        sqlx::query_as::<_, LootData>(
            "SELECT * FROM loots WHERE guild_id = $1 AND item_id = $2",
        )
        .bind(guild_id)
        .bind(item_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("loot", "item_id"))
    }

    async fn upsert_loot(&self, loot: LootData) -> Result<LootData> {
        sqlx::query_as::<_, LootData>(
            "INSERT INTO loots (guild_id, item_id, raid_quantity, rot_quantity)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (guild_id, item_id)
             DO UPDATE SET raid_quantity = EXCLUDED.raid_quantity,
                           rot_quantity = EXCLUDED.rot_quantity
             RETURNING *",
        )
        .bind(loot.guild_id)
        .bind(loot.item_id)
        .bind(loot.raid_quantity)
        .bind(loot.rot_quantity)
        .fetch_one(&self.pool)
        .await
        .map_err(IntoDatabaseError::any)
    }

    async fn delete_loot(&self, guild_id: PrimaryKey, item_id: PrimaryKey) -> Result<()> {
        sqlx::query("DELETE FROM loots WHERE guild_id = $1 AND item_id = $2")
            .bind(guild_id)
            .bind(item_id)
            .execute(&self.pool)
            .await
            .map_err(IntoDatabaseError::any)?;

        Ok(())
    }

    async fn loot_request_by_id(&self, request_id: PrimaryKey) -> Result<LootRequestData> {
        sqlx::query_as::<_, LootRequestData>("SELECT * FROM loot_requests WHERE id = $1")
            .bind(request_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("loot request", "id"))
    }

    async fn active_requests_by_guild(
        &self,
        guild_id: PrimaryKey,
    ) -> Result<Vec<LootRequestData>> {
        self.requests_by_guild(guild_id, false).await
    }

    async fn archived_requests_by_guild(
        &self,
        guild_id: PrimaryKey,
    ) -> Result<Vec<LootRequestData>> {
        self.requests_by_guild(guild_id, true).await
    }

    async fn create_loot_request(&self, new_request: NewLootRequest) -> Result<LootRequestData> {
        sqlx::query_as::<_, LootRequestData>(
            "INSERT INTO loot_requests
               (player_id, item_id, alt_name, class_override, spell_name,
                quantity, current_item, raid_night)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING *",
        )
        .bind(new_request.player_id)
        .bind(new_request.item_id)
        .bind(&new_request.alt_name)
        .bind(&new_request.class_override)
        .bind(&new_request.spell_name)
        .bind(new_request.quantity)
        .bind(&new_request.current_item)
        .bind(new_request.raid_night)
        .fetch_one(&self.pool)
        .await
        .map_err(IntoDatabaseError::any)
    }

    async fn delete_loot_request(&self, request_id: PrimaryKey) -> Result<()> {
        sqlx::query("DELETE FROM loot_requests WHERE id = $1")
            .bind(request_id)
            .execute(&self.pool)
            .await
            .map_err(IntoDatabaseError::any)?;

        Ok(())
    }

    async fn set_request_granted(&self, request_id: PrimaryKey, granted: bool) -> Result<()> {
        sqlx::query("UPDATE loot_requests SET granted = $2 WHERE id = $1")
            .bind(request_id)
            .bind(granted)
            .execute(&self.pool)
            .await
            .map_err(IntoDatabaseError::any)?;

        Ok(())
    }

    async fn archive_requests(
        &self,
        guild_id: PrimaryKey,
        raid_night: bool,
    ) -> Result<Vec<LootRequestData>> {
        sqlx::query_as::<_, LootRequestData>(
            "UPDATE loot_requests r
             SET archived = TRUE
             FROM players p
             WHERE p.id = r.player_id
               AND p.guild_id = $1
               AND r.raid_night = $2
               AND NOT r.archived
             RETURNING r.*",
        )
        .bind(guild_id)
        .bind(raid_night)
        .fetch_all(&self.pool)
        .await
        .map_err(IntoDatabaseError::any)
    }

    async fn attendance_since(
        &self,
        guild_id: PrimaryKey,
        since: DateTime<Utc>,
    ) -> Result<Vec<RaidDumpData>> {
        sqlx::query_as::<_, RaidDumpData>(
            "SELECT d.player_id, d.at
             FROM raid_dumps d
             JOIN players p ON p.id = d.player_id
             WHERE p.guild_id = $1 AND d.at >= $2",
        )
        .bind(guild_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(IntoDatabaseError::any)
    }

    async fn apply_roster_ops(&self, guild_id: PrimaryKey, ops: Vec<RosterOp>) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(IntoDatabaseError::any)?;

        for op in ops {
            match op {
                RosterOp::CreateRank { name } => {
                    sqlx::query("INSERT INTO ranks (guild_id, name) VALUES ($1, $2)")
                        .bind(guild_id)
                        .bind(&name)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| conflict_on_unique(e, "rank", "name", &name))?;
                }
                RosterOp::CreatePlayer {
                    name,
                    class,
                    level,
                    rank,
                    alt,
                    last_seen,
                    zone,
                    notes,
                } => {
                    let rank_id = resolve_rank(&mut tx, guild_id, rank.as_deref()).await?;
                    let key = (!alt).then(|| random_string(KEY_LENGTH));

                    let new_player = NewPlayer {
                        guild_id,
                        name,
                        class,
                        level,
                        rank_id,
                        admin: false,
                        alt,
                        active: true,
                        last_seen,
                        zone,
                        notes,
                        key,
                    };

                    insert_player(&mut *tx, &new_player).await?;
                }
                RosterOp::UpdatePlayer {
                    id,
                    class,
                    level,
                    rank,
                    alt,
                    clear_main,
                    last_seen,
                    zone,
                    notes,
                } => {
                    let rank_id = resolve_rank(&mut tx, guild_id, rank.as_deref()).await?;

                    sqlx::query(
                        "UPDATE players
                         SET class = $2, level = $3, rank_id = $4, alt = $5,
                             active = TRUE, last_seen = $6, zone = $7, notes = $8
                         WHERE id = $1",
                    )
                    .bind(id)
                    .bind(&class)
                    .bind(level)
                    .bind(rank_id)
                    .bind(alt)
                    .bind(last_seen)
                    .bind(&zone)
                    .bind(&notes)
                    .execute(&mut *tx)
                    .await
                    .map_err(IntoDatabaseError::any)?;

                    if clear_main {
                        sqlx::query("UPDATE players SET main_id = NULL WHERE id = $1")
                            .bind(id)
                            .execute(&mut *tx)
                            .await
                            .map_err(IntoDatabaseError::any)?;
                    }
                }
                RosterOp::DeactivatePlayer { id } => {
                    sqlx::query(
                        "UPDATE players SET active = FALSE, admin = FALSE WHERE id = $1",
                    )
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .map_err(IntoDatabaseError::any)?;
                }
            }
        }

        tx.commit().await.map_err(IntoDatabaseError::any)
    }

    async fn apply_attendance_ops(
        &self,
        guild_id: PrimaryKey,
        ops: Vec<AttendanceOp>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(IntoDatabaseError::any)?;

        for op in ops {
            match op {
                AttendanceOp::CreatePlayer { name, class } => {
                    let new_player = NewPlayer::bare(guild_id, name, class);

                    insert_player(&mut *tx, &new_player).await?;
                }
                AttendanceOp::RecordAttendance { name, at } => {
                    sqlx::query(
                        "INSERT INTO raid_dumps (player_id, at)
                         SELECT id, $3 FROM players
                         WHERE guild_id = $1 AND lower(name) = lower($2)
                         ON CONFLICT (player_id, at) DO NOTHING",
                    )
                    .bind(guild_id)
                    .bind(&name)
                    .bind(at)
                    .execute(&mut *tx)
                    .await
                    .map_err(IntoDatabaseError::any)?;
                }
            }
        }

        tx.commit().await.map_err(IntoDatabaseError::any)
    }
}

impl PgDatabase {
    async fn requests_by_guild(
        &self,
        guild_id: PrimaryKey,
        archived: bool,
    ) -> Result<Vec<LootRequestData>> {
        sqlx::query_as::<_, LootRequestData>(
            "SELECT r.*
             FROM loot_requests r
             JOIN players p ON p.id = r.player_id
             WHERE p.guild_id = $1 AND r.archived = $2
             ORDER BY r.created_at",
        )
        .bind(guild_id)
        .bind(archived)
        .fetch_all(&self.pool)
        .await
        .map_err(IntoDatabaseError::any)
    }
}

async fn insert_player<'e, E>(executor: E, new_player: &NewPlayer) -> Result<PlayerData>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, PlayerData>(
        "INSERT INTO players
           (guild_id, name, class, level, rank_id, admin, alt, active,
            last_seen, zone, notes, key)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
         RETURNING *",
    )
    .bind(new_player.guild_id)
    .bind(&new_player.name)
    .bind(&new_player.class)
    .bind(new_player.level)
    .bind(new_player.rank_id)
    .bind(new_player.admin)
    .bind(new_player.alt)
    .bind(new_player.active)
    .bind(new_player.last_seen)
    .bind(&new_player.zone)
    .bind(&new_player.notes)
    .bind(&new_player.key)
    .fetch_one(executor)
    .await
    .map_err(|e| conflict_on_unique(e, "player", "name", &new_player.name))
}

async fn resolve_rank(
    tx: &mut Transaction<'_, Postgres>,
    guild_id: PrimaryKey,
    rank: Option<&str>,
) -> Result<Option<PrimaryKey>> {
    let Some(name) = rank else {
        return Ok(None);
    };

    sqlx::query_scalar::<_, PrimaryKey>(
        "SELECT id FROM ranks WHERE guild_id = $1 AND lower(name) = lower($2)",
    )
    .bind(guild_id)
    .bind(name)
    .fetch_optional(&mut **tx)
    .await
    .map_err(IntoDatabaseError::any)
}
