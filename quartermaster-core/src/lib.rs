mod attendance;
mod auth;
mod db;
mod dumps;
mod events;
mod guilds;
mod imports;
mod loot;
mod reconcile;
mod util;

use std::sync::Arc;

use log::debug;

pub use attendance::*;
pub use auth::*;
pub use db::*;
pub use dumps::*;
pub use events::*;
pub use guilds::*;
pub use imports::*;
pub use loot::*;
pub use reconcile::*;

/// The quartermaster system, facilitating guild registration, loot
/// distribution, dump imports, and attendance tracking.
pub struct Quartermaster {
    context: QuartermasterContext,

    pub auth: Auth,
    pub guilds: GuildManager,
    pub loot: LootManager,
    pub imports: ImportManager,
    pub attendance: AttendanceManager,
}

/// A type passed to the managers to access storage and emit events
#[derive(Clone)]
pub struct QuartermasterContext {
    pub database: Arc<dyn Database>,
    events: EventSender,
}

impl Quartermaster {
    pub fn new<Db>(database: Db, events: EventSender) -> Self
    where
        Db: Database + 'static,
    {
        let context = QuartermasterContext {
            database: Arc::new(database),
            events,
        };

        Self {
            auth: Auth::new(&context),
            guilds: GuildManager::new(&context),
            loot: LootManager::new(&context),
            imports: ImportManager::new(&context),
            attendance: AttendanceManager::new(&context),
            context,
        }
    }

    pub fn database(&self) -> &Arc<dyn Database> {
        &self.context.database
    }
}

impl QuartermasterContext {
    /// Hands an event to the broadcaster. The mutation has already
    /// committed at this point, a missing consumer only loses the push.
    pub(crate) fn emit(&self, event: GuildEvent) {
        if self.events.send(event).is_err() {
            debug!("No event consumer is running, dropping event");
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// A [Quartermaster] over a fresh in-memory store, along with the
    /// receiving end of its event queue
    pub async fn app() -> (Quartermaster, EventReceiver) {
        let (sender, receiver) = event_channel();

        (Quartermaster::new(MemoryDatabase::new(), sender), receiver)
    }

    pub async fn register_guild(
        app: &Quartermaster,
        guild_name: &str,
        leader_name: &str,
    ) -> RegisteredGuild {
        app.auth
            .register_guild(NewGuildRegistration {
                guild_name: guild_name.to_string(),
                server: "Blue".to_string(),
                leader_name: leader_name.to_string(),
                leader_class: Some("Wizard".to_string()),
            })
            .await
            .expect("guild registers")
    }

    pub async fn add_player(app: &Quartermaster, guild_id: PrimaryKey, name: &str) -> PlayerData {
        app.database()
            .create_player(NewPlayer::bare(guild_id, name.to_string(), None))
            .await
            .expect("player creates")
    }

    pub async fn add_item(app: &Quartermaster, name: &str) -> ItemData {
        app.loot
            .create_item(NewItem {
                name: name.to_string(),
                is_spell: false,
            })
            .await
            .expect("item creates")
    }
}
