use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// The type used for primary keys in the database.
pub type PrimaryKey = i32;

/// A guild, the tenant root everything else belongs to
#[derive(Debug, Clone, FromRow)]
pub struct GuildData {
    pub id: PrimaryKey,
    pub name: String,
    /// The game server the guild plays on
    pub server: String,
    /// While locked, members cannot submit new loot requests
    pub loot_locked: bool,
    pub motd: Option<String>,
    /// Discord webhook for raid-night loot summaries
    pub raid_webhook: Option<String>,
    /// Discord webhook for rot loot summaries
    pub rot_webhook: Option<String>,
}

/// A guild member. Soft-deleted only, `active` flips off when a roster
/// dump no longer mentions them.
#[derive(Debug, Clone, FromRow)]
pub struct PlayerData {
    pub id: PrimaryKey,
    pub guild_id: PrimaryKey,
    /// Unique within the guild
    pub name: String,
    pub class: Option<String>,
    pub level: Option<i32>,
    /// Unknown until a roster dump assigns one
    pub rank_id: Option<PrimaryKey>,
    pub admin: bool,
    pub alt: bool,
    /// Back-reference to the main this alt is linked to
    pub main_id: Option<PrimaryKey>,
    pub active: bool,
    pub hidden: bool,
    pub last_seen: Option<NaiveDate>,
    pub zone: Option<String>,
    pub notes: Option<String>,
    /// The opaque auth token. Only mains get one.
    pub key: Option<String>,
}

/// A named rank tier, unique by (guild, case-insensitive name)
#[derive(Debug, Clone, FromRow)]
pub struct RankData {
    pub id: PrimaryKey,
    pub guild_id: PrimaryKey,
    pub name: String,
}

/// A global catalog item
#[derive(Debug, Clone, FromRow)]
pub struct ItemData {
    pub id: PrimaryKey,
    pub name: String,
    /// Consumable spell-unlocks require a spell name on requests
    pub is_spell: bool,
}

/// Grantable copies of an item within a guild. Deleted once both
/// counters reach zero.
#[derive(Debug, Clone, FromRow)]
pub struct LootData {
    pub guild_id: PrimaryKey,
    pub item_id: PrimaryKey,
    pub raid_quantity: i32,
    pub rot_quantity: i32,
}

/// A player's claim against an item
#[derive(Debug, Clone, FromRow)]
pub struct LootRequestData {
    pub id: PrimaryKey,
    pub player_id: PrimaryKey,
    pub item_id: PrimaryKey,
    /// Set when requesting on behalf of a linked alt
    pub alt_name: Option<String>,
    /// Overrides the player's stored class for this request
    pub class_override: Option<String>,
    pub spell_name: Option<String>,
    pub quantity: i32,
    pub current_item: Option<String>,
    pub raid_night: bool,
    pub granted: bool,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
}

/// One row per player per observed raid dump. Existence alone means
/// "present" for that date.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RaidDumpData {
    pub player_id: PrimaryKey,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewGuild {
    pub name: String,
    pub server: String,
}

#[derive(Debug)]
pub struct UpdatedGuild {
    pub id: PrimaryKey,
    pub motd: Option<String>,
    pub raid_webhook: Option<String>,
    pub rot_webhook: Option<String>,
}

#[derive(Debug)]
pub struct NewPlayer {
    pub guild_id: PrimaryKey,
    pub name: String,
    pub class: Option<String>,
    pub level: Option<i32>,
    pub rank_id: Option<PrimaryKey>,
    pub admin: bool,
    pub alt: bool,
    pub active: bool,
    pub last_seen: Option<NaiveDate>,
    pub zone: Option<String>,
    pub notes: Option<String>,
    /// The minted auth token, if any
    pub key: Option<String>,
}

impl NewPlayer {
    /// A bare player known only by name and class, as minted by a raid
    /// dump before any roster dump has described them.
    pub fn bare(guild_id: PrimaryKey, name: String, class: Option<String>) -> Self {
        Self {
            guild_id,
            name,
            class,
            level: None,
            rank_id: None,
            admin: false,
            alt: false,
            active: true,
            last_seen: None,
            zone: None,
            notes: None,
            key: None,
        }
    }
}

#[derive(Debug)]
pub struct NewRank {
    pub guild_id: PrimaryKey,
    pub name: String,
}

#[derive(Debug)]
pub struct NewItem {
    pub name: String,
    pub is_spell: bool,
}

#[derive(Debug)]
pub struct NewLootRequest {
    pub player_id: PrimaryKey,
    pub item_id: PrimaryKey,
    pub alt_name: Option<String>,
    pub class_override: Option<String>,
    pub spell_name: Option<String>,
    pub quantity: i32,
    pub current_item: Option<String>,
    pub raid_night: bool,
}
