use std::collections::HashMap;

use log::{info, warn};
use serde_json::json;
use thiserror::Error;

use crate::{
    db::{
        DatabaseError, GuildData, ItemData, LootData, LootRequestData, NewItem, NewLootRequest,
        PlayerData, PrimaryKey,
    },
    events::GuildEvent,
    QuartermasterContext,
};

/// The loot request lifecycle, grantable quantities, and the item
/// catalog
pub struct LootManager {
    context: QuartermasterContext,
    http: reqwest::Client,
}

#[derive(Debug, Error)]
pub enum LootError {
    #[error("Loot requesting is currently locked")]
    Locked,
    #[error("A spell name is required when requesting this item")]
    SpellNameRequired,
    #[error("Quantity must be at least 1")]
    InvalidQuantity,
    #[error("Only the requesting player can withdraw a request")]
    NotRequestOwner,
    #[error("Archived requests are read-only history")]
    Archived,
    #[error("{name} is not one of your linked alts")]
    UnknownAlt { name: String },
    #[error(transparent)]
    Db(#[from] DatabaseError),
}

/// A request joined with its requester, with the display precedence
/// rules already applied
#[derive(Debug, Clone)]
pub struct LootRequestView {
    pub request: LootRequestData,
    /// The persona the request is for: the alt name if present,
    /// otherwise the requesting player
    pub requester: String,
    /// The class override if present, otherwise the player's stored
    /// class
    pub class: Option<String>,
}

/// Override-if-present, else the player's stored class
pub fn effective_class(request: &LootRequestData, player: &PlayerData) -> Option<String> {
    request.class_override.clone().or_else(|| player.class.clone())
}

/// The alt persona if the request names one, else the player
pub fn effective_name(request: &LootRequestData, player: &PlayerData) -> String {
    request
        .alt_name
        .clone()
        .unwrap_or_else(|| player.name.clone())
}

impl LootManager {
    pub fn new(context: &QuartermasterContext) -> Self {
        Self {
            context: context.clone(),
            http: reqwest::Client::new(),
        }
    }

    /// Adds an item to the global catalog
    pub async fn create_item(&self, new_item: NewItem) -> Result<ItemData, DatabaseError> {
        let item = self.context.database.create_item(new_item).await?;
        let items = self.context.database.list_items().await?;

        self.context.emit(GuildEvent::Items { items });

        Ok(item)
    }

    pub async fn list_items(&self) -> Result<Vec<ItemData>, DatabaseError> {
        self.context.database.list_items().await
    }

    /// The guild's grantable loot counters
    pub async fn loots(&self, guild_id: PrimaryKey) -> Result<Vec<LootData>, DatabaseError> {
        self.context.database.loots_by_guild(guild_id).await
    }

    /// The active (un-archived) requests for a guild, joined with their
    /// requesters
    pub async fn request_views(
        &self,
        guild_id: PrimaryKey,
    ) -> Result<Vec<LootRequestView>, DatabaseError> {
        let requests = self.context.database.active_requests_by_guild(guild_id).await?;

        self.join_requests(guild_id, requests).await
    }

    /// The archived request history for a guild
    pub async fn archived_views(
        &self,
        guild_id: PrimaryKey,
    ) -> Result<Vec<LootRequestView>, DatabaseError> {
        let requests = self
            .context
            .database
            .archived_requests_by_guild(guild_id)
            .await?;

        self.join_requests(guild_id, requests).await
    }

    /// Submits a loot request for the acting player
    pub async fn create_request(
        &self,
        guild: &GuildData,
        player: &PlayerData,
        new_request: NewLootRequest,
    ) -> Result<LootRequestData, LootError> {
        if guild.loot_locked {
            return Err(LootError::Locked);
        }

        if new_request.quantity < 1 {
            return Err(LootError::InvalidQuantity);
        }

        let item = self.context.database.item_by_id(new_request.item_id).await?;

        if item.is_spell && new_request.spell_name.is_none() {
            return Err(LootError::SpellNameRequired);
        }

        if let Some(alt_name) = &new_request.alt_name {
            self.ensure_linked_alt(player, alt_name).await?;
        }

        let request = self
            .context
            .database
            .create_loot_request(NewLootRequest {
                player_id: player.id,
                ..new_request
            })
            .await?;

        self.emit_requests(guild.id).await?;

        Ok(request)
    }

    /// Withdraws an un-archived request. Owners only.
    pub async fn delete_request(
        &self,
        player: &PlayerData,
        request_id: PrimaryKey,
    ) -> Result<(), LootError> {
        let request = self.context.database.loot_request_by_id(request_id).await?;

        if request.player_id != player.id {
            return Err(LootError::NotRequestOwner);
        }

        if request.archived {
            return Err(LootError::Archived);
        }

        self.context.database.delete_loot_request(request_id).await?;
        self.emit_requests(player.guild_id).await?;

        Ok(())
    }

    /// Grants or revokes a request
    pub async fn grant_request(
        &self,
        guild: &GuildData,
        request_id: PrimaryKey,
        granted: bool,
    ) -> Result<(), LootError> {
        let request = self.context.database.loot_request_by_id(request_id).await?;
        let requester = self.context.database.player_by_id(request.player_id).await?;

        if requester.guild_id != guild.id {
            return Err(DatabaseError::NotFound {
                resource: "loot request",
                identifier: "id",
            }
            .into());
        }

        if request.archived {
            return Err(LootError::Archived);
        }

        self.context
            .database
            .set_request_granted(request_id, granted)
            .await?;

        self.emit_requests(guild.id).await?;

        Ok(())
    }

    /// Sets one of the two grantable counters for an item. The loot row
    /// disappears once both counters are zero.
    pub async fn set_quantity(
        &self,
        guild: &GuildData,
        item_id: PrimaryKey,
        raid_night: bool,
        quantity: i32,
    ) -> Result<(), LootError> {
        if quantity < 0 {
            return Err(LootError::InvalidQuantity);
        }

        // Ensure the item exists in the catalog
        let _ = self.context.database.item_by_id(item_id).await?;

        let current = match self.context.database.loot_by_item(guild.id, item_id).await {
            Ok(loot) => loot,
            Err(DatabaseError::NotFound { .. }) => LootData {
                guild_id: guild.id,
                item_id,
                raid_quantity: 0,
                rot_quantity: 0,
            },
            Err(e) => return Err(e.into()),
        };

        let updated = if raid_night {
            LootData {
                raid_quantity: quantity,
                ..current
            }
        } else {
            LootData {
                rot_quantity: quantity,
                ..current
            }
        };

        self.store_or_delete(updated).await?;
        self.emit_loots(guild.id).await?;

        Ok(())
    }

    /// Archives every active request matching the raid-night flag,
    /// rolls unused raid-night quantity into rot, and posts a summary
    /// to the guild's Discord webhook if one is configured.
    pub async fn finish_requests(
        &self,
        guild: &GuildData,
        raid_night: bool,
    ) -> Result<Vec<LootRequestView>, LootError> {
        let archived = self
            .context
            .database
            .archive_requests(guild.id, raid_night)
            .await?;

        let mut granted_per_item: HashMap<PrimaryKey, i32> = HashMap::new();

        for request in archived.iter().filter(|r| r.granted) {
            *granted_per_item.entry(request.item_id).or_default() += request.quantity;
        }

        let loots = self.context.database.loots_by_guild(guild.id).await?;

        for loot in loots {
            let granted = granted_per_item.get(&loot.item_id).copied().unwrap_or(0);

            let updated = if raid_night {
                if loot.raid_quantity == 0 {
                    continue;
                }

                // Whatever was not granted tonight becomes rot loot
                let leftover = (loot.raid_quantity - granted).max(0);

                LootData {
                    raid_quantity: 0,
                    rot_quantity: loot.rot_quantity + leftover,
                    ..loot
                }
            } else {
                if granted == 0 {
                    continue;
                }

                LootData {
                    rot_quantity: (loot.rot_quantity - granted).max(0),
                    ..loot
                }
            };

            self.store_or_delete(updated).await?;
        }

        info!(
            "Finished {} loot session for guild {}, archived {} requests",
            if raid_night { "raid-night" } else { "rot" },
            guild.name,
            archived.len()
        );

        let views = self.join_requests(guild.id, archived).await?;

        self.post_summary(guild, raid_night, &views).await;

        self.emit_loots(guild.id).await?;
        self.emit_requests(guild.id).await?;

        Ok(views)
    }

    /// Posts the granted-loot summary to the configured webhook. Failure
    /// is logged and never surfaced, the session is finished either way.
    async fn post_summary(&self, guild: &GuildData, raid_night: bool, views: &[LootRequestView]) {
        let webhook = if raid_night {
            guild.raid_webhook.clone()
        } else {
            guild.rot_webhook.clone()
        };

        let Some(url) = webhook else {
            return;
        };

        let items: HashMap<PrimaryKey, String> = match self.context.database.list_items().await {
            Ok(items) => items.into_iter().map(|i| (i.id, i.name)).collect(),
            Err(e) => {
                warn!("Skipping webhook summary, item catalog unavailable: {e}");
                return;
            }
        };

        let mut lines = vec![format!(
            "{} loot session finished:",
            if raid_night { "Raid-night" } else { "Rot" }
        )];

        for view in views.iter().filter(|v| v.request.granted) {
            let item = items
                .get(&view.request.item_id)
                .map(String::as_str)
                .unwrap_or("Unknown item");

            lines.push(format!(
                "{} x{} → {}",
                item, view.request.quantity, view.requester
            ));
        }

        if lines.len() == 1 {
            lines.push("Nothing was granted.".to_string());
        }

        let request = self.http.post(url).json(&json!({ "content": lines.join("\n") }));

        tokio::spawn(async move {
            if let Err(e) = request.send().await {
                warn!("Could not deliver loot summary webhook: {e}");
            }
        });
    }

    async fn store_or_delete(&self, loot: LootData) -> Result<(), DatabaseError> {
        if loot.raid_quantity == 0 && loot.rot_quantity == 0 {
            self.context
                .database
                .delete_loot(loot.guild_id, loot.item_id)
                .await
        } else {
            self.context.database.upsert_loot(loot).await.map(|_| ())
        }
    }

    async fn ensure_linked_alt(
        &self,
        player: &PlayerData,
        alt_name: &str,
    ) -> Result<(), LootError> {
        let players = self.context.database.players_by_guild(player.guild_id).await?;

        let linked = players
            .iter()
            .any(|p| p.main_id == Some(player.id) && p.name.eq_ignore_ascii_case(alt_name));

        if linked {
            Ok(())
        } else {
            Err(LootError::UnknownAlt {
                name: alt_name.to_string(),
            })
        }
    }

    async fn join_requests(
        &self,
        guild_id: PrimaryKey,
        requests: Vec<LootRequestData>,
    ) -> Result<Vec<LootRequestView>, DatabaseError> {
        let players = self.context.database.players_by_guild(guild_id).await?;
        let by_id: HashMap<PrimaryKey, &PlayerData> =
            players.iter().map(|p| (p.id, p)).collect();

        Ok(requests
            .into_iter()
            .map(|request| {
                let view = by_id.get(&request.player_id).map(|player| LootRequestView {
                    requester: effective_name(&request, player),
                    class: effective_class(&request, player),
                    request: request.clone(),
                });

                view.unwrap_or(LootRequestView {
                    requester: "Unknown".to_string(),
                    class: request.class_override.clone(),
                    request,
                })
            })
            .collect())
    }

    async fn emit_requests(&self, guild_id: PrimaryKey) -> Result<(), DatabaseError> {
        let requests = self.request_views(guild_id).await?;

        self.context.emit(GuildEvent::Requests { guild_id, requests });

        Ok(())
    }

    async fn emit_loots(&self, guild_id: PrimaryKey) -> Result<(), DatabaseError> {
        let loots = self.context.database.loots_by_guild(guild_id).await?;

        self.context.emit(GuildEvent::Loots { guild_id, loots });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::NewItem, testing};

    fn request_for(item_id: PrimaryKey, raid_night: bool) -> NewLootRequest {
        NewLootRequest {
            player_id: 0,
            item_id,
            alt_name: None,
            class_override: None,
            spell_name: None,
            quantity: 1,
            current_item: None,
            raid_night,
        }
    }

    #[tokio::test]
    async fn grant_and_finish_consumes_the_raid_quantity() {
        let (app, _events) = testing::app().await;
        let registered = testing::register_guild(&app, "Cursed Few", "Vulak").await;
        let guild = &registered.guild;

        let item = app
            .loot
            .create_item(NewItem {
                name: "Godly Plate of the Whale".to_string(),
                is_spell: false,
            })
            .await
            .expect("item is created");

        app.loot
            .set_quantity(guild, item.id, true, 1)
            .await
            .expect("quantity is set");

        let request = app
            .loot
            .create_request(guild, &registered.leader, request_for(item.id, true))
            .await
            .expect("request is created");

        app.loot
            .grant_request(guild, request.id, true)
            .await
            .expect("request is granted");

        let archived = app
            .loot
            .finish_requests(guild, true)
            .await
            .expect("session finishes");

        assert_eq!(archived.len(), 1);
        assert!(archived[0].request.granted);

        let active = app
            .loot
            .request_views(guild.id)
            .await
            .expect("active list loads");
        assert!(active.is_empty());

        let history = app
            .loot
            .archived_views(guild.id)
            .await
            .expect("history loads");
        assert_eq!(history.len(), 1);
        assert!(history[0].request.granted);

        // Fully consumed: nothing rolled over into rot, row deleted
        let loots = app.loot.loots(guild.id).await.expect("loots load");
        assert!(loots.is_empty());
    }

    #[tokio::test]
    async fn ungranted_raid_quantity_rolls_over_into_rot() {
        let (app, _events) = testing::app().await;
        let registered = testing::register_guild(&app, "Cursed Few", "Vulak").await;
        let guild = &registered.guild;

        let item = testing::add_item(&app, "Cloak of Flames").await;

        app.loot
            .set_quantity(guild, item.id, true, 2)
            .await
            .expect("quantity is set");

        let request = app
            .loot
            .create_request(guild, &registered.leader, request_for(item.id, true))
            .await
            .expect("request is created");

        app.loot
            .grant_request(guild, request.id, true)
            .await
            .expect("request is granted");

        app.loot
            .finish_requests(guild, true)
            .await
            .expect("session finishes");

        let loots = app.loot.loots(guild.id).await.expect("loots load");

        assert_eq!(loots.len(), 1);
        assert_eq!(loots[0].raid_quantity, 0);
        assert_eq!(loots[0].rot_quantity, 1);
    }

    #[tokio::test]
    async fn locked_guilds_reject_new_requests() {
        let (app, _events) = testing::app().await;
        let registered = testing::register_guild(&app, "Cursed Few", "Vulak").await;
        let item = testing::add_item(&app, "Cloak of Flames").await;

        app.guilds
            .set_loot_lock(&registered.guild, true)
            .await
            .expect("lock is set");

        let guild = app
            .database()
            .guild_by_id(registered.guild.id)
            .await
            .expect("guild reloads");

        let result = app
            .loot
            .create_request(&guild, &registered.leader, request_for(item.id, true))
            .await;

        assert!(matches!(result, Err(LootError::Locked)));
    }

    #[tokio::test]
    async fn spell_items_require_a_spell_name() {
        let (app, _events) = testing::app().await;
        let registered = testing::register_guild(&app, "Cursed Few", "Vulak").await;

        let spell = app
            .loot
            .create_item(NewItem {
                name: "Spell: Manifest Elements".to_string(),
                is_spell: true,
            })
            .await
            .expect("item is created");

        let result = app
            .loot
            .create_request(
                &registered.guild,
                &registered.leader,
                request_for(spell.id, true),
            )
            .await;

        assert!(matches!(result, Err(LootError::SpellNameRequired)));
    }

    #[tokio::test]
    async fn only_the_owner_can_withdraw_a_request() {
        let (app, _events) = testing::app().await;
        let registered = testing::register_guild(&app, "Cursed Few", "Vulak").await;
        let other = testing::add_player(&app, registered.guild.id, "Aaryonar").await;
        let item = testing::add_item(&app, "Cloak of Flames").await;

        let request = app
            .loot
            .create_request(
                &registered.guild,
                &registered.leader,
                request_for(item.id, true),
            )
            .await
            .expect("request is created");

        let result = app.loot.delete_request(&other, request.id).await;
        assert!(matches!(result, Err(LootError::NotRequestOwner)));

        app.loot
            .delete_request(&registered.leader, request.id)
            .await
            .expect("the owner can withdraw");
    }

    #[tokio::test]
    async fn class_precedence_prefers_the_override() {
        let (app, _events) = testing::app().await;
        let registered = testing::register_guild(&app, "Cursed Few", "Vulak").await;
        let item = testing::add_item(&app, "Cloak of Flames").await;

        let mut new_request = request_for(item.id, true);
        new_request.class_override = Some("Enchanter".to_string());

        app.loot
            .create_request(&registered.guild, &registered.leader, new_request)
            .await
            .expect("request is created");

        let views = app
            .loot
            .request_views(registered.guild.id)
            .await
            .expect("views load");

        assert_eq!(views[0].class.as_deref(), Some("Enchanter"));
        // The leader registered as a Wizard; without an override the
        // stored class shows through
        assert_eq!(views[0].requester, "Vulak");
    }
}
