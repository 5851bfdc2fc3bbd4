use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::{
    db::{ItemData, LootData, PrimaryKey},
    loot::LootRequestView,
};

pub type EventSender = UnboundedSender<GuildEvent>;
pub type EventReceiver = UnboundedReceiver<GuildEvent>;

/// The queue the managers push [GuildEvent]s into
pub fn event_channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

/// Events emitted by the managers after a mutation commits. The server
/// fans these out to the connected push streams of the affected guild.
#[derive(Debug, Clone)]
pub enum GuildEvent {
    /// Loot requesting was locked or unlocked
    LootLock {
        guild_id: PrimaryKey,
        locked: bool,
    },
    /// The active request list changed, carrying the full fresh list
    Requests {
        guild_id: PrimaryKey,
        requests: Vec<LootRequestView>,
    },
    /// The grantable loot counters changed, carrying the full fresh list
    Loots {
        guild_id: PrimaryKey,
        loots: Vec<LootData>,
    },
    /// The global item catalog changed. Delivered to every connection
    /// regardless of guild.
    Items { items: Vec<ItemData> },
}

impl GuildEvent {
    /// The guild the event targets, or `None` for catalog-wide events
    pub fn guild_id(&self) -> Option<PrimaryKey> {
        match self {
            Self::LootLock { guild_id, .. } => Some(*guild_id),
            Self::Requests { guild_id, .. } => Some(*guild_id),
            Self::Loots { guild_id, .. } => Some(*guild_id),
            Self::Items { .. } => None,
        }
    }
}
