//! All schemas that are exposed from endpoints are defined here. Player
//! auth keys never pass through this module; the one-time key of a fresh
//! registration is the only key the API ever returns.

use chrono::{DateTime, NaiveDate, Utc};
use quartermaster_core::{
    GuildData, ItemData, LootData, LootRequestView, PlayerAttendance, PlayerData, RegisteredGuild,
};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Guild {
    id: i32,
    name: String,
    server: String,
    loot_locked: bool,
    motd: Option<String>,
    raid_webhook: Option<String>,
    rot_webhook: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    id: i32,
    name: String,
    class: Option<String>,
    level: Option<i32>,
    rank_id: Option<i32>,
    admin: bool,
    alt: bool,
    main_id: Option<i32>,
    active: bool,
    hidden: bool,
    last_seen: Option<NaiveDate>,
    zone: Option<String>,
    notes: Option<String>,
}

/// What a successful guild registration returns. The key is shown
/// exactly once here.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    guild: Guild,
    leader: Player,
    key: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    id: i32,
    name: String,
    is_spell: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Loot {
    item_id: i32,
    raid_quantity: i32,
    rot_quantity: i32,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LootRequest {
    id: i32,
    item_id: i32,
    /// The persona the request is for: the alt name if one was given,
    /// otherwise the requesting player
    requester: String,
    class: Option<String>,
    spell_name: Option<String>,
    quantity: i32,
    current_item: Option<String>,
    raid_night: bool,
    granted: bool,
    archived: bool,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    player_id: i32,
    name: String,
    /// Percentage of raid nights attended in the last 30 days
    thirty: i32,
    ninety: i32,
    one_eighty: i32,
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl ToSerialized<Guild> for GuildData {
    fn to_serialized(&self) -> Guild {
        Guild {
            id: self.id,
            name: self.name.clone(),
            server: self.server.clone(),
            loot_locked: self.loot_locked,
            motd: self.motd.clone(),
            raid_webhook: self.raid_webhook.clone(),
            rot_webhook: self.rot_webhook.clone(),
        }
    }
}

impl ToSerialized<Player> for PlayerData {
    fn to_serialized(&self) -> Player {
        Player {
            id: self.id,
            name: self.name.clone(),
            class: self.class.clone(),
            level: self.level,
            rank_id: self.rank_id,
            admin: self.admin,
            alt: self.alt,
            main_id: self.main_id,
            active: self.active,
            hidden: self.hidden,
            last_seen: self.last_seen,
            zone: self.zone.clone(),
            notes: self.notes.clone(),
        }
    }
}

impl ToSerialized<Registration> for RegisteredGuild {
    fn to_serialized(&self) -> Registration {
        Registration {
            guild: self.guild.to_serialized(),
            leader: self.leader.to_serialized(),
            key: self.key.clone(),
        }
    }
}

impl ToSerialized<Item> for ItemData {
    fn to_serialized(&self) -> Item {
        Item {
            id: self.id,
            name: self.name.clone(),
            is_spell: self.is_spell,
        }
    }
}

impl ToSerialized<Loot> for LootData {
    fn to_serialized(&self) -> Loot {
        Loot {
            item_id: self.item_id,
            raid_quantity: self.raid_quantity,
            rot_quantity: self.rot_quantity,
        }
    }
}

impl ToSerialized<LootRequest> for LootRequestView {
    fn to_serialized(&self) -> LootRequest {
        LootRequest {
            id: self.request.id,
            item_id: self.request.item_id,
            requester: self.requester.clone(),
            class: self.class.clone(),
            spell_name: self.request.spell_name.clone(),
            quantity: self.request.quantity,
            current_item: self.request.current_item.clone(),
            raid_night: self.request.raid_night,
            granted: self.request.granted,
            archived: self.request.archived,
            created_at: self.request.created_at,
        }
    }
}

impl ToSerialized<Attendance> for PlayerAttendance {
    fn to_serialized(&self) -> Attendance {
        Attendance {
            player_id: self.player_id,
            name: self.name.clone(),
            thirty: self.thirty,
            ninety: self.ninety,
            one_eighty: self.one_eighty,
        }
    }
}
