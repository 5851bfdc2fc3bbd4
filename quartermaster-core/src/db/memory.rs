use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{
    Database, DatabaseError, GuildData, ItemData, LootData, LootRequestData, NewGuild, NewItem,
    NewLootRequest, NewPlayer, NewRank, PlayerData, PrimaryKey, RaidDumpData, RankData, Result,
    UpdatedGuild,
};
use crate::{
    reconcile::{AttendanceOp, RosterOp},
    util::random_string,
};

const KEY_LENGTH: usize = 32;

/// An in-memory [Database], used in tests and when no Postgres instance
/// is configured. State is a plain set of vecs behind one lock, so every
/// apply is trivially atomic.
#[derive(Default)]
pub struct MemoryDatabase {
    state: Mutex<State>,
}

#[derive(Default, Clone)]
struct State {
    next_id: PrimaryKey,
    guilds: Vec<GuildData>,
    players: Vec<PlayerData>,
    ranks: Vec<RankData>,
    items: Vec<ItemData>,
    loots: Vec<LootData>,
    requests: Vec<LootRequestData>,
    raid_dumps: Vec<RaidDumpData>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

impl State {
    fn next_id(&mut self) -> PrimaryKey {
        self.next_id += 1;
        self.next_id
    }

    fn guild(&self, guild_id: PrimaryKey) -> Result<&GuildData> {
        self.guilds
            .iter()
            .find(|g| g.id == guild_id)
            .ok_or(DatabaseError::NotFound {
                resource: "guild",
                identifier: "id",
            })
    }

    fn guild_mut(&mut self, guild_id: PrimaryKey) -> Result<&mut GuildData> {
        self.guilds
            .iter_mut()
            .find(|g| g.id == guild_id)
            .ok_or(DatabaseError::NotFound {
                resource: "guild",
                identifier: "id",
            })
    }

    fn player_mut(&mut self, player_id: PrimaryKey) -> Result<&mut PlayerData> {
        self.players
            .iter_mut()
            .find(|p| p.id == player_id)
            .ok_or(DatabaseError::NotFound {
                resource: "player",
                identifier: "id",
            })
    }

    fn player_by_name(&self, guild_id: PrimaryKey, name: &str) -> Result<&PlayerData> {
        self.players
            .iter()
            .find(|p| p.guild_id == guild_id && p.name.eq_ignore_ascii_case(name))
            .ok_or(DatabaseError::NotFound {
                resource: "player",
                identifier: "name",
            })
    }

    fn insert_player(&mut self, new_player: NewPlayer) -> Result<PlayerData> {
        let exists = self
            .players
            .iter()
            .any(|p| p.guild_id == new_player.guild_id && p.name.eq_ignore_ascii_case(&new_player.name));

        if exists {
            return Err(DatabaseError::Conflict {
                resource: "player",
                field: "name",
                value: new_player.name,
            });
        }

        let player = PlayerData {
            id: self.next_id(),
            guild_id: new_player.guild_id,
            name: new_player.name,
            class: new_player.class,
            level: new_player.level,
            rank_id: new_player.rank_id,
            admin: new_player.admin,
            alt: new_player.alt,
            main_id: None,
            active: new_player.active,
            hidden: false,
            last_seen: new_player.last_seen,
            zone: new_player.zone,
            notes: new_player.notes,
            key: new_player.key,
        };

        self.players.push(player.clone());

        Ok(player)
    }

    fn insert_rank(&mut self, guild_id: PrimaryKey, name: String) -> Result<RankData> {
        let exists = self
            .ranks
            .iter()
            .any(|r| r.guild_id == guild_id && r.name.eq_ignore_ascii_case(&name));

        if exists {
            return Err(DatabaseError::Conflict {
                resource: "rank",
                field: "name",
                value: name,
            });
        }

        let rank = RankData {
            id: self.next_id(),
            guild_id,
            name,
        };

        self.ranks.push(rank.clone());

        Ok(rank)
    }

    fn snapshot(&self) -> State {
        self.clone()
    }

    fn restore(&mut self, snapshot: State) {
        *self = snapshot;
    }

    fn rank_id_by_name(&self, guild_id: PrimaryKey, name: &str) -> Option<PrimaryKey> {
        self.ranks
            .iter()
            .find(|r| r.guild_id == guild_id && r.name.eq_ignore_ascii_case(name))
            .map(|r| r.id)
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn guild_by_id(&self, guild_id: PrimaryKey) -> Result<GuildData> {
        self.state.lock().guild(guild_id).cloned()
    }

    async fn create_guild(&self, new_guild: NewGuild) -> Result<GuildData> {
        let mut state = self.state.lock();

        let exists = state.guilds.iter().any(|g| {
            g.server.eq_ignore_ascii_case(&new_guild.server)
                && g.name.eq_ignore_ascii_case(&new_guild.name)
        });

        if exists {
            return Err(DatabaseError::Conflict {
                resource: "guild",
                field: "name",
                value: new_guild.name,
            });
        }

        let guild = GuildData {
            id: state.next_id(),
            name: new_guild.name,
            server: new_guild.server,
            loot_locked: false,
            motd: None,
            raid_webhook: None,
            rot_webhook: None,
        };

        state.guilds.push(guild.clone());

        Ok(guild)
    }

    async fn update_guild(&self, updated_guild: UpdatedGuild) -> Result<GuildData> {
        let mut state = self.state.lock();

        let guild = state.guild_mut(updated_guild.id)?;

        guild.motd = updated_guild.motd;
        guild.raid_webhook = updated_guild.raid_webhook;
        guild.rot_webhook = updated_guild.rot_webhook;

        Ok(guild.clone())
    }

    async fn set_loot_lock(&self, guild_id: PrimaryKey, locked: bool) -> Result<()> {
        self.state.lock().guild_mut(guild_id)?.loot_locked = locked;

        Ok(())
    }

    async fn player_by_id(&self, player_id: PrimaryKey) -> Result<PlayerData> {
        self.state
            .lock()
            .players
            .iter()
            .find(|p| p.id == player_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "player",
                identifier: "id",
            })
    }

    async fn player_by_key(&self, key: &str) -> Result<PlayerData> {
        self.state
            .lock()
            .players
            .iter()
            .find(|p| p.key.as_deref() == Some(key))
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "player",
                identifier: "key",
            })
    }

    async fn player_by_name(&self, guild_id: PrimaryKey, name: &str) -> Result<PlayerData> {
        self.state.lock().player_by_name(guild_id, name).cloned()
    }

    async fn players_by_guild(&self, guild_id: PrimaryKey) -> Result<Vec<PlayerData>> {
        let mut players: Vec<_> = self
            .state
            .lock()
            .players
            .iter()
            .filter(|p| p.guild_id == guild_id)
            .cloned()
            .collect();

        players.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(players)
    }

    async fn create_player(&self, new_player: NewPlayer) -> Result<PlayerData> {
        self.state.lock().insert_player(new_player)
    }

    async fn set_player_main(
        &self,
        player_id: PrimaryKey,
        main_id: Option<PrimaryKey>,
        alt: bool,
    ) -> Result<()> {
        let mut state = self.state.lock();

        let player = state.player_mut(player_id)?;
        player.main_id = main_id;
        player.alt = alt;

        Ok(())
    }

    async fn set_player_rank(
        &self,
        player_id: PrimaryKey,
        rank_id: Option<PrimaryKey>,
    ) -> Result<()> {
        self.state.lock().player_mut(player_id)?.rank_id = rank_id;

        Ok(())
    }

    async fn set_player_admin(&self, player_id: PrimaryKey, admin: bool) -> Result<()> {
        self.state.lock().player_mut(player_id)?.admin = admin;

        Ok(())
    }

    async fn set_player_hidden(&self, player_id: PrimaryKey, hidden: bool) -> Result<()> {
        self.state.lock().player_mut(player_id)?.hidden = hidden;

        Ok(())
    }

    async fn ranks_by_guild(&self, guild_id: PrimaryKey) -> Result<Vec<RankData>> {
        Ok(self
            .state
            .lock()
            .ranks
            .iter()
            .filter(|r| r.guild_id == guild_id)
            .cloned()
            .collect())
    }

    async fn create_rank(&self, new_rank: NewRank) -> Result<RankData> {
        self.state
            .lock()
            .insert_rank(new_rank.guild_id, new_rank.name)
    }

    async fn item_by_id(&self, item_id: PrimaryKey) -> Result<ItemData> {
        self.state
            .lock()
            .items
            .iter()
            .find(|i| i.id == item_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "item",
                identifier: "id",
            })
    }

    async fn list_items(&self) -> Result<Vec<ItemData>> {
        let mut items = self.state.lock().items.clone();

        items.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(items)
    }

    async fn create_item(&self, new_item: NewItem) -> Result<ItemData> {
        let mut state = self.state.lock();

        let exists = state
            .items
            .iter()
            .any(|i| i.name.eq_ignore_ascii_case(&new_item.name));

        if exists {
            return Err(DatabaseError::Conflict {
                resource: "item",
                field: "name",
                value: new_item.name,
            });
        }

        let item = ItemData {
            id: state.next_id(),
            name: new_item.name,
            is_spell: new_item.is_spell,
        };

        state.items.push(item.clone());

        Ok(item)
    }

    async fn loots_by_guild(&self, guild_id: PrimaryKey) -> Result<Vec<LootData>> {
        Ok(self
            .state
            .lock()
            .loots
            .iter()
            .filter(|l| l.guild_id == guild_id)
            .cloned()
            .collect())
    }

    async fn loot_by_item(&self, guild_id: PrimaryKey, item_id: PrimaryKey) -> Result<LootData> {
        self.state
            .lock()
            .loots
            .iter()
            .find(|l| l.guild_id == guild_id && l.item_id == item_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "loot",
                identifier: "item_id",
            })
    }

    async fn upsert_loot(&self, loot: LootData) -> Result<LootData> {
        let mut state = self.state.lock();

        state.guild(loot.guild_id)?;

        match state
            .loots
            .iter_mut()
            .find(|l| l.guild_id == loot.guild_id && l.item_id == loot.item_id)
        {
            Some(existing) => *existing = loot.clone(),
            None => state.loots.push(loot.clone()),
        }

        Ok(loot)
    }

    async fn delete_loot(&self, guild_id: PrimaryKey, item_id: PrimaryKey) -> Result<()> {
        self.state
            .lock()
            .loots
            .retain(|l| !(l.guild_id == guild_id && l.item_id == item_id));

        Ok(())
    }

    async fn loot_request_by_id(&self, request_id: PrimaryKey) -> Result<LootRequestData> {
        self.state
            .lock()
            .requests
            .iter()
            .find(|r| r.id == request_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "loot request",
                identifier: "id",
            })
    }

    async fn active_requests_by_guild(
        &self,
        guild_id: PrimaryKey,
    ) -> Result<Vec<LootRequestData>> {
        Ok(self.guild_requests(guild_id, false))
    }

    async fn archived_requests_by_guild(
        &self,
        guild_id: PrimaryKey,
    ) -> Result<Vec<LootRequestData>> {
        Ok(self.guild_requests(guild_id, true))
    }

    async fn create_loot_request(&self, new_request: NewLootRequest) -> Result<LootRequestData> {
        let mut state = self.state.lock();

        let request = LootRequestData {
            id: state.next_id(),
            player_id: new_request.player_id,
            item_id: new_request.item_id,
            alt_name: new_request.alt_name,
            class_override: new_request.class_override,
            spell_name: new_request.spell_name,
            quantity: new_request.quantity,
            current_item: new_request.current_item,
            raid_night: new_request.raid_night,
            granted: false,
            archived: false,
            created_at: Utc::now(),
        };

        state.requests.push(request.clone());

        Ok(request)
    }

    async fn delete_loot_request(&self, request_id: PrimaryKey) -> Result<()> {
        self.state.lock().requests.retain(|r| r.id != request_id);

        Ok(())
    }

    async fn set_request_granted(&self, request_id: PrimaryKey, granted: bool) -> Result<()> {
        let mut state = self.state.lock();

        let request = state
            .requests
            .iter_mut()
            .find(|r| r.id == request_id)
            .ok_or(DatabaseError::NotFound {
                resource: "loot request",
                identifier: "id",
            })?;

        request.granted = granted;

        Ok(())
    }

    async fn archive_requests(
        &self,
        guild_id: PrimaryKey,
        raid_night: bool,
    ) -> Result<Vec<LootRequestData>> {
        let mut state = self.state.lock();

        let member_ids: Vec<_> = state
            .players
            .iter()
            .filter(|p| p.guild_id == guild_id)
            .map(|p| p.id)
            .collect();

        let mut archived = Vec::new();

        for request in state.requests.iter_mut() {
            let matches = !request.archived
                && request.raid_night == raid_night
                && member_ids.contains(&request.player_id);

            if matches {
                request.archived = true;
                archived.push(request.clone());
            }
        }

        Ok(archived)
    }

    async fn attendance_since(
        &self,
        guild_id: PrimaryKey,
        since: DateTime<Utc>,
    ) -> Result<Vec<RaidDumpData>> {
        let state = self.state.lock();

        let member_ids: Vec<_> = state
            .players
            .iter()
            .filter(|p| p.guild_id == guild_id)
            .map(|p| p.id)
            .collect();

        Ok(state
            .raid_dumps
            .iter()
            .filter(|d| d.at >= since && member_ids.contains(&d.player_id))
            .cloned()
            .collect())
    }

    async fn apply_roster_ops(&self, guild_id: PrimaryKey, ops: Vec<RosterOp>) -> Result<()> {
        // A single lock hold plus a snapshot stands in for a transaction
        let mut state = self.state.lock();

        state.guild(guild_id)?;
        let snapshot = state.snapshot();

        let result = Self::roster_ops(&mut state, guild_id, ops);

        if result.is_err() {
            state.restore(snapshot);
        }

        result
    }

    async fn apply_attendance_ops(
        &self,
        guild_id: PrimaryKey,
        ops: Vec<AttendanceOp>,
    ) -> Result<()> {
        let mut state = self.state.lock();

        state.guild(guild_id)?;
        let snapshot = state.snapshot();

        let result = Self::attendance_ops(&mut state, guild_id, ops);

        if result.is_err() {
            state.restore(snapshot);
        }

        result
    }
}

impl MemoryDatabase {
    fn roster_ops(state: &mut State, guild_id: PrimaryKey, ops: Vec<RosterOp>) -> Result<()> {
        for op in ops {
            match op {
                RosterOp::CreateRank { name } => {
                    state.insert_rank(guild_id, name)?;
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
                    let rank_id = rank.and_then(|r| state.rank_id_by_name(guild_id, &r));
                    let key = (!alt).then(|| random_string(KEY_LENGTH));

                    state.insert_player(NewPlayer {
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
                    })?;
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
                    let rank_id = rank.and_then(|r| state.rank_id_by_name(guild_id, &r));

                    let player = state.player_mut(id)?;
                    player.class = class;
                    player.level = level;
                    player.rank_id = rank_id;
                    player.alt = alt;
                    player.active = true;
                    player.last_seen = last_seen;
                    player.zone = zone;
                    player.notes = notes;

                    if clear_main {
                        player.main_id = None;
                    }
                }
                RosterOp::DeactivatePlayer { id } => {
                    let player = state.player_mut(id)?;
                    player.active = false;
                    player.admin = false;
                }
            }
        }

        Ok(())
    }

    fn attendance_ops(
        state: &mut State,
        guild_id: PrimaryKey,
        ops: Vec<AttendanceOp>,
    ) -> Result<()> {
        for op in ops {
            match op {
                AttendanceOp::CreatePlayer { name, class } => {
                    state.insert_player(NewPlayer::bare(guild_id, name, class))?;
                }
                AttendanceOp::RecordAttendance { name, at } => {
                    let player_id = state.player_by_name(guild_id, &name)?.id;

                    let recorded = state
                        .raid_dumps
                        .iter()
                        .any(|d| d.player_id == player_id && d.at == at);

                    if !recorded {
                        state.raid_dumps.push(RaidDumpData { player_id, at });
                    }
                }
            }
        }

        Ok(())
    }
}

impl MemoryDatabase {
    fn guild_requests(&self, guild_id: PrimaryKey, archived: bool) -> Vec<LootRequestData> {
        let state = self.state.lock();

        let member_ids: Vec<_> = state
            .players
            .iter()
            .filter(|p| p.guild_id == guild_id)
            .map(|p| p.id)
            .collect();

        let mut requests: Vec<_> = state
            .requests
            .iter()
            .filter(|r| r.archived == archived && member_ids.contains(&r.player_id))
            .cloned()
            .collect();

        requests.sort_by_key(|r| r.created_at);

        requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn player_names_conflict_within_a_guild_ignoring_case() {
        let db = MemoryDatabase::new();

        let guild = db
            .create_guild(NewGuild {
                name: "Cursed Few".to_string(),
                server: "Blue".to_string(),
            })
            .await
            .expect("guild creates");

        db.create_player(NewPlayer::bare(guild.id, "Vulak".to_string(), None))
            .await
            .expect("player creates");

        let duplicate = db
            .create_player(NewPlayer::bare(guild.id, "vulak".to_string(), None))
            .await;

        assert!(matches!(duplicate, Err(DatabaseError::Conflict { .. })));
    }

    #[tokio::test]
    async fn rejected_roster_plans_are_not_partially_applied() {
        let db = MemoryDatabase::new();

        let guild = db
            .create_guild(NewGuild {
                name: "Cursed Few".to_string(),
                server: "Blue".to_string(),
            })
            .await
            .expect("guild creates");

        db.create_player(NewPlayer::bare(guild.id, "Vulak".to_string(), None))
            .await
            .expect("player creates");

        // The second create collides with the existing player, which
        // fails the whole plan including the rank before it
        let result = db
            .apply_roster_ops(
                guild.id,
                vec![
                    RosterOp::CreateRank {
                        name: "Officer".to_string(),
                    },
                    RosterOp::CreatePlayer {
                        name: "Vulak".to_string(),
                        class: None,
                        level: None,
                        rank: None,
                        alt: false,
                        last_seen: None,
                        zone: None,
                        notes: None,
                    },
                ],
            )
            .await;

        assert!(matches!(result, Err(DatabaseError::Conflict { .. })));

        let ranks = db.ranks_by_guild(guild.id).await.expect("ranks load");
        assert!(ranks.is_empty(), "the rank rolled back with the plan");
    }

    #[tokio::test]
    async fn created_mains_get_a_key_and_alts_do_not() {
        let db = MemoryDatabase::new();

        let guild = db
            .create_guild(NewGuild {
                name: "Cursed Few".to_string(),
                server: "Blue".to_string(),
            })
            .await
            .expect("guild creates");

        db.apply_roster_ops(
            guild.id,
            vec![
                RosterOp::CreatePlayer {
                    name: "Vulak".to_string(),
                    class: None,
                    level: None,
                    rank: None,
                    alt: false,
                    last_seen: None,
                    zone: None,
                    notes: None,
                },
                RosterOp::CreatePlayer {
                    name: "Bankatron".to_string(),
                    class: None,
                    level: None,
                    rank: None,
                    alt: true,
                    last_seen: None,
                    zone: None,
                    notes: None,
                },
            ],
        )
        .await
        .expect("plan applies");

        let main = db.player_by_name(guild.id, "Vulak").await.expect("main exists");
        let alt = db
            .player_by_name(guild.id, "Bankatron")
            .await
            .expect("alt exists");

        assert!(main.key.is_some());
        assert!(alt.key.is_none());
    }
}
