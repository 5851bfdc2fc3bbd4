use std::io::{Cursor, Read};

use log::info;
use thiserror::Error;

use crate::{
    db::{DatabaseError, GuildData},
    dumps::{capture_time, parse_attendance, parse_roster},
    reconcile::{plan_attendance, plan_roster, ReconcileError},
    QuartermasterContext,
};

/// Feeds uploaded dump files through the parse → plan → apply pipeline
pub struct ImportManager {
    context: QuartermasterContext,
}

#[derive(Debug, Error)]
pub enum ImportError {
    /// Dump files carry their capture timestamp in the file name
    #[error("Could not find a capture timestamp in {name}")]
    UnrecognizedFileName { name: String },
    #[error("Could not read the archive: {0}")]
    Archive(String),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Db(#[from] DatabaseError),
}

impl ImportManager {
    pub fn new(context: &QuartermasterContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Reconciles a full guild-roster dump. Validation failures abort
    /// the whole import with nothing written.
    pub async fn import_roster(&self, guild: &GuildData, text: &str) -> Result<(), ImportError> {
        let rows = parse_roster(text);

        let players = self.context.database.players_by_guild(guild.id).await?;
        let ranks = self.context.database.ranks_by_guild(guild.id).await?;

        let ops = plan_roster(&players, &ranks, &rows)?;
        let op_count = ops.len();

        self.context.database.apply_roster_ops(guild.id, ops).await?;

        info!(
            "Imported roster dump for guild {}: {} rows, {} operations",
            guild.name,
            rows.len(),
            op_count
        );

        Ok(())
    }

    /// Records one raid-dump snapshot. Re-importing the same file is a
    /// no-op since attendance rows are deduplicated on insert.
    pub async fn import_raid_dump(
        &self,
        guild: &GuildData,
        file_name: &str,
        bytes: &[u8],
        utc_offset_minutes: i64,
    ) -> Result<usize, ImportError> {
        let at = capture_time(file_name, utc_offset_minutes).ok_or_else(|| {
            ImportError::UnrecognizedFileName {
                name: file_name.to_string(),
            }
        })?;

        let text = String::from_utf8_lossy(bytes);
        let rows = parse_attendance(&text);

        let players = self.context.database.players_by_guild(guild.id).await?;
        let ops = plan_attendance(&players, &rows, at);

        self.context
            .database
            .apply_attendance_ops(guild.id, ops)
            .await?;

        info!(
            "Imported raid dump {} for guild {}: {} attendees",
            file_name,
            guild.name,
            rows.len()
        );

        Ok(rows.len())
    }

    /// Processes a zip archive of raid dumps, oldest entry first, each
    /// through the same path as a single upload
    pub async fn import_raid_archive(
        &self,
        guild: &GuildData,
        bytes: &[u8],
        utc_offset_minutes: i64,
    ) -> Result<usize, ImportError> {
        let cursor = Cursor::new(bytes.to_vec());
        let mut archive =
            zip::ZipArchive::new(cursor).map_err(|e| ImportError::Archive(e.to_string()))?;

        let mut entries = Vec::new();

        for index in 0..archive.len() {
            let mut file = archive
                .by_index(index)
                .map_err(|e| ImportError::Archive(e.to_string()))?;

            if file.is_dir() {
                continue;
            }

            let name = file
                .name()
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string();

            let modified = file.last_modified();
            let order = (
                modified.year(),
                modified.month(),
                modified.day(),
                modified.hour(),
                modified.minute(),
                modified.second(),
            );

            let mut contents = Vec::new();
            file.read_to_end(&mut contents)
                .map_err(|e| ImportError::Archive(e.to_string()))?;

            entries.push((order, name, contents));
        }

        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut imported = 0;

        for (_, name, contents) in entries {
            self.import_raid_dump(guild, &name, &contents, utc_offset_minutes)
                .await?;

            imported += 1;
        }

        Ok(imported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use chrono::{TimeZone, Utc};
    use std::io::Write;

    const RAID_FILE: &str = "RaidRoster-20230415-213012.txt";

    fn raid_dump(names: &[&str]) -> String {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| format!("{}\t{}\t60\tWizard\tGroup\t", i + 1, name))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn roster_dump(rows: &[(&str, &str)]) -> String {
        rows.iter()
            .map(|(name, rank)| format!("{name}\t60\tWizard\t{rank}\t\t01/15/23\tOasis\t"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[tokio::test]
    async fn raid_dump_import_is_idempotent() {
        let (app, _events) = testing::app().await;
        let registered = testing::register_guild(&app, "Cursed Few", "Vulak").await;
        let guild = &registered.guild;

        let dump = raid_dump(&["Vulak", "Aaryonar"]);

        app.imports
            .import_raid_dump(guild, RAID_FILE, dump.as_bytes(), 0)
            .await
            .expect("first import succeeds");
        app.imports
            .import_raid_dump(guild, RAID_FILE, dump.as_bytes(), 0)
            .await
            .expect("re-import succeeds");

        let since = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let records = app
            .database()
            .attendance_since(guild.id, since)
            .await
            .expect("attendance loads");

        // One row per (player, timestamp) pair despite the double upload
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn raid_dumps_create_players_for_unseen_names() {
        let (app, _events) = testing::app().await;
        let registered = testing::register_guild(&app, "Cursed Few", "Vulak").await;
        let guild = &registered.guild;

        app.imports
            .import_raid_dump(guild, RAID_FILE, raid_dump(&["Newblood"]).as_bytes(), 0)
            .await
            .expect("import succeeds");

        let created = app
            .database()
            .player_by_name(guild.id, "Newblood")
            .await
            .expect("the attendee was created");

        assert_eq!(created.rank_id, None);
        assert_eq!(created.key, None);
    }

    #[tokio::test]
    async fn ragged_raid_lines_are_excluded() {
        let (app, _events) = testing::app().await;
        let registered = testing::register_guild(&app, "Cursed Few", "Vulak").await;
        let guild = &registered.guild;

        let dump = format!("{}\n14\t\n15\t\t\t", raid_dump(&["Vulak"]));

        let imported = app
            .imports
            .import_raid_dump(guild, RAID_FILE, dump.as_bytes(), 0)
            .await
            .expect("import succeeds");

        assert_eq!(imported, 1);

        let players = app
            .database()
            .players_by_guild(guild.id)
            .await
            .expect("players load");

        // Only the leader; the placeholder rows created nobody
        assert_eq!(players.len(), 1);
    }

    #[tokio::test]
    async fn unstamped_file_names_are_rejected() {
        let (app, _events) = testing::app().await;
        let registered = testing::register_guild(&app, "Cursed Few", "Vulak").await;

        let result = app
            .imports
            .import_raid_dump(&registered.guild, "raid.txt", b"", 0)
            .await;

        assert!(matches!(
            result,
            Err(ImportError::UnrecognizedFileName { .. })
        ));
    }

    #[tokio::test]
    async fn roster_import_updates_and_creates_players() {
        let (app, _events) = testing::app().await;
        let registered = testing::register_guild(&app, "Cursed Few", "Vulak").await;
        let guild = &registered.guild;

        let dump = roster_dump(&[("Vulak", "Leader"), ("Aaryonar", "Officer")]);

        app.imports
            .import_roster(guild, &dump)
            .await
            .expect("import succeeds");

        let aaryonar = app
            .database()
            .player_by_name(guild.id, "Aaryonar")
            .await
            .expect("the new member was created");

        assert!(aaryonar.active);
        assert!(aaryonar.rank_id.is_some());
        assert!(aaryonar.key.is_some(), "mains are minted a key");

        let vulak = app
            .database()
            .player_by_id(registered.leader.id)
            .await
            .expect("the leader reloads");

        assert_eq!(vulak.zone.as_deref(), Some("Oasis"));
    }

    #[tokio::test]
    async fn rejected_roster_dumps_write_nothing() {
        let (app, _events) = testing::app().await;
        let registered = testing::register_guild(&app, "Cursed Few", "Vulak").await;
        let guild = &registered.guild;

        // No Leader row at all: partial export, rejected outright
        let dump = roster_dump(&[("Aaryonar", "Officer")]);

        let result = app.imports.import_roster(guild, &dump).await;
        assert!(matches!(
            result,
            Err(ImportError::Reconcile(ReconcileError::MissingLeader))
        ));

        let players = app
            .database()
            .players_by_guild(guild.id)
            .await
            .expect("players load");
        let ranks = app
            .database()
            .ranks_by_guild(guild.id)
            .await
            .expect("ranks load");

        assert_eq!(players.len(), 1);
        assert_eq!(ranks.len(), 1);
    }

    #[tokio::test]
    async fn absent_players_are_deactivated_and_lose_admin() {
        let (app, _events) = testing::app().await;
        let registered = testing::register_guild(&app, "Cursed Few", "Vulak").await;
        let guild = &registered.guild;

        let quitter = testing::add_player(&app, guild.id, "Quitter").await;
        app.database()
            .set_player_admin(quitter.id, true)
            .await
            .expect("admin is set");

        let dump = roster_dump(&[("Vulak", "Leader")]);

        app.imports
            .import_roster(guild, &dump)
            .await
            .expect("import succeeds");

        let quitter = app
            .database()
            .player_by_id(quitter.id)
            .await
            .expect("player reloads");

        assert!(!quitter.active);
        assert!(!quitter.admin);
    }

    #[tokio::test]
    async fn archives_import_every_entry_oldest_first() {
        let (app, _events) = testing::app().await;
        let registered = testing::register_guild(&app, "Cursed Few", "Vulak").await;
        let guild = &registered.guild;

        let stamp = |day, hour, minute| {
            zip::DateTime::from_date_and_time(2023, 4, day, hour, minute, 0)
                .expect("stamp is valid")
        };

        // The newer entry is written first so only the last-modified
        // sort can put the older one ahead of it
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);

            writer
                .start_file(
                    "RaidRoster-20230416-210500.txt",
                    zip::write::FileOptions::default().last_modified_time(stamp(16, 21, 5)),
                )
                .expect("entry starts");
            writer
                .write_all(raid_dump(&["Vulak", "Cekenar"]).as_bytes())
                .expect("entry writes");

            writer
                .start_file(
                    "RaidRoster-20230415-213012.txt",
                    zip::write::FileOptions::default().last_modified_time(stamp(15, 21, 30)),
                )
                .expect("entry starts");
            writer
                .write_all(raid_dump(&["Vulak", "Aaryonar"]).as_bytes())
                .expect("entry writes");

            writer.finish().expect("archive finishes");
        }

        let imported = app
            .imports
            .import_raid_archive(guild, buffer.get_ref(), 0)
            .await
            .expect("archive imports");

        assert_eq!(imported, 2);

        let since = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let records = app
            .database()
            .attendance_since(guild.id, since)
            .await
            .expect("attendance loads");

        assert_eq!(records.len(), 4);

        // The older entry ran first, so the player it minted got the
        // lower id
        let aaryonar = app
            .database()
            .player_by_name(guild.id, "Aaryonar")
            .await
            .expect("older entry's attendee exists");
        let cekenar = app
            .database()
            .player_by_name(guild.id, "Cekenar")
            .await
            .expect("newer entry's attendee exists");

        assert!(aaryonar.id < cekenar.id);
    }
}
