use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::reconcile::{AttendanceOp, RosterOp};

mod data;
pub use data::*;

mod memory;
pub use memory::*;

mod pg;
pub use pg::*;

pub type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
}

/// Helper trait to reduce boilerplate
pub trait IntoDatabaseError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError;
    fn any(self) -> DatabaseError;
}

/// Represents a type that can fetch and mutate quartermaster data in a
/// relational store
#[async_trait]
pub trait Database: Send + Sync {
    async fn guild_by_id(&self, guild_id: PrimaryKey) -> Result<GuildData>;
    async fn create_guild(&self, new_guild: NewGuild) -> Result<GuildData>;
    async fn update_guild(&self, updated_guild: UpdatedGuild) -> Result<GuildData>;
    async fn set_loot_lock(&self, guild_id: PrimaryKey, locked: bool) -> Result<()>;

    async fn player_by_id(&self, player_id: PrimaryKey) -> Result<PlayerData>;
    async fn player_by_key(&self, key: &str) -> Result<PlayerData>;
    async fn player_by_name(&self, guild_id: PrimaryKey, name: &str) -> Result<PlayerData>;
    async fn players_by_guild(&self, guild_id: PrimaryKey) -> Result<Vec<PlayerData>>;
    async fn create_player(&self, new_player: NewPlayer) -> Result<PlayerData>;
    async fn set_player_main(
        &self,
        player_id: PrimaryKey,
        main_id: Option<PrimaryKey>,
        alt: bool,
    ) -> Result<()>;
    async fn set_player_rank(
        &self,
        player_id: PrimaryKey,
        rank_id: Option<PrimaryKey>,
    ) -> Result<()>;
    async fn set_player_admin(&self, player_id: PrimaryKey, admin: bool) -> Result<()>;
    async fn set_player_hidden(&self, player_id: PrimaryKey, hidden: bool) -> Result<()>;

    async fn ranks_by_guild(&self, guild_id: PrimaryKey) -> Result<Vec<RankData>>;
    async fn create_rank(&self, new_rank: NewRank) -> Result<RankData>;

    async fn item_by_id(&self, item_id: PrimaryKey) -> Result<ItemData>;
    async fn list_items(&self) -> Result<Vec<ItemData>>;
    async fn create_item(&self, new_item: NewItem) -> Result<ItemData>;

    async fn loots_by_guild(&self, guild_id: PrimaryKey) -> Result<Vec<LootData>>;
    async fn loot_by_item(&self, guild_id: PrimaryKey, item_id: PrimaryKey) -> Result<LootData>;
    async fn upsert_loot(&self, loot: LootData) -> Result<LootData>;
    async fn delete_loot(&self, guild_id: PrimaryKey, item_id: PrimaryKey) -> Result<()>;

    async fn loot_request_by_id(&self, request_id: PrimaryKey) -> Result<LootRequestData>;
    async fn active_requests_by_guild(&self, guild_id: PrimaryKey)
        -> Result<Vec<LootRequestData>>;
    async fn archived_requests_by_guild(
        &self,
        guild_id: PrimaryKey,
    ) -> Result<Vec<LootRequestData>>;
    async fn create_loot_request(&self, new_request: NewLootRequest) -> Result<LootRequestData>;
    async fn delete_loot_request(&self, request_id: PrimaryKey) -> Result<()>;
    async fn set_request_granted(&self, request_id: PrimaryKey, granted: bool) -> Result<()>;
    /// Archives every un-archived request matching the raid-night flag,
    /// returning the rows as they were archived
    async fn archive_requests(
        &self,
        guild_id: PrimaryKey,
        raid_night: bool,
    ) -> Result<Vec<LootRequestData>>;

    async fn attendance_since(
        &self,
        guild_id: PrimaryKey,
        since: DateTime<Utc>,
    ) -> Result<Vec<RaidDumpData>>;

    /// Applies a roster reconciliation plan atomically. Either every
    /// operation commits or none do.
    async fn apply_roster_ops(&self, guild_id: PrimaryKey, ops: Vec<RosterOp>) -> Result<()>;
    /// Applies an attendance reconciliation plan atomically. Duplicate
    /// attendance rows are ignored, so re-applying is a no-op.
    async fn apply_attendance_ops(
        &self,
        guild_id: PrimaryKey,
        ops: Vec<AttendanceOp>,
    ) -> Result<()>;
}
