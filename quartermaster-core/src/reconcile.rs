//! Turns parsed dump rows and the current persisted state into a list of
//! discrete storage operations. Everything here is pure; the [Database]
//! applies a plan inside one transaction, so a rejected plan leaves no
//! partial writes behind.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::{
    db::{PlayerData, PrimaryKey, RankData},
    dumps::{AttendanceRow, RosterRow},
};

/// The rank name that marks the guild leader
pub const LEADER_RANK: &str = "Leader";

#[derive(Debug, Error, PartialEq)]
pub enum ReconcileError {
    /// A full roster export always contains the leader. A dump without
    /// one is partial or corrupt.
    #[error("The dump has no row with the {LEADER_RANK} rank, it may be partial or corrupt")]
    MissingLeader,
    /// Leadership changes must go through an explicit transfer, never
    /// silently through a dump.
    #[error("The dump moves the {LEADER_RANK} rank away from {holder}, transfer leadership explicitly instead")]
    LeadershipChanged { holder: String },
    /// At most one player per guild holds the leader rank. A dump
    /// naming several is corrupt.
    #[error("The dump names more than one player with the {LEADER_RANK} rank, it may be corrupt")]
    DuplicateLeader,
}

/// A single storage operation of a roster reconciliation plan
#[derive(Debug, Clone, PartialEq)]
pub enum RosterOp {
    /// Create a rank the guild has not seen before
    CreateRank { name: String },
    /// Create a player for a dump row with no existing match. The store
    /// mints an auth token unless the row is an alt.
    CreatePlayer {
        name: String,
        class: Option<String>,
        level: Option<i32>,
        rank: Option<String>,
        alt: bool,
        last_seen: Option<NaiveDate>,
        zone: Option<String>,
        notes: Option<String>,
    },
    /// Refresh an existing player from their dump row and mark them
    /// active again
    UpdatePlayer {
        id: PrimaryKey,
        class: Option<String>,
        level: Option<i32>,
        rank: Option<String>,
        alt: bool,
        /// Set when the row no longer flags the player as an alt, so
        /// the alt→main link is severed
        clear_main: bool,
        last_seen: Option<NaiveDate>,
        zone: Option<String>,
        notes: Option<String>,
    },
    /// The player is absent from the dump: mark inactive and strip
    /// admin rights
    DeactivatePlayer { id: PrimaryKey },
}

/// A single storage operation of an attendance reconciliation plan.
/// Players are referenced by name because created ids are not known
/// until the plan is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum AttendanceOp {
    /// Create a player seen in a raid dump but unknown to the guild
    CreatePlayer { name: String, class: Option<String> },
    /// Record presence for one (player, timestamp) pair. Duplicates are
    /// ignored on apply.
    RecordAttendance {
        name: String,
        at: DateTime<Utc>,
    },
}

/// Computes the operations needed to reconcile a full guild-roster dump
/// against the current player and rank state.
pub fn plan_roster(
    players: &[PlayerData],
    ranks: &[RankData],
    rows: &[RosterRow],
) -> Result<Vec<RosterOp>, ReconcileError> {
    let leader_names: Vec<&str> = rows
        .iter()
        .filter(|r| rank_is_leader(r.rank.as_deref()))
        .map(|r| r.name.as_str())
        .collect();

    if leader_names.is_empty() {
        return Err(ReconcileError::MissingLeader);
    }

    let distinct_leaders: HashSet<String> = leader_names
        .iter()
        .map(|name| name.to_lowercase())
        .collect();

    if distinct_leaders.len() > 1 {
        return Err(ReconcileError::DuplicateLeader);
    }

    if let Some(holder) = current_leader(players, ranks) {
        let still_leading = leader_names
            .iter()
            .any(|name| name.eq_ignore_ascii_case(&holder.name));

        if !still_leading {
            return Err(ReconcileError::LeadershipChanged {
                holder: holder.name.clone(),
            });
        }
    }

    let mut ops = Vec::new();

    // New ranks first, so player ops can reference them by name
    let mut known_ranks: HashSet<String> =
        ranks.iter().map(|r| r.name.to_lowercase()).collect();

    for row in rows {
        if let Some(rank) = &row.rank {
            if known_ranks.insert(rank.to_lowercase()) {
                ops.push(RosterOp::CreateRank { name: rank.clone() });
            }
        }
    }

    for player in players {
        match row_by_name(rows, &player.name) {
            Some(row) => ops.push(RosterOp::UpdatePlayer {
                id: player.id,
                class: row.class.clone(),
                level: row.level,
                rank: row.rank.clone(),
                alt: row.alt,
                clear_main: !row.alt && player.main_id.is_some(),
                last_seen: row.last_seen,
                zone: row.zone.clone(),
                notes: row.notes.clone(),
            }),
            None => {
                // An inactive player cannot remain an admin
                if player.active || player.admin {
                    ops.push(RosterOp::DeactivatePlayer { id: player.id })
                }
            }
        }
    }

    for row in rows {
        let is_known = players
            .iter()
            .any(|p| p.name.eq_ignore_ascii_case(&row.name));

        if !is_known {
            ops.push(RosterOp::CreatePlayer {
                name: row.name.clone(),
                class: row.class.clone(),
                level: row.level,
                rank: row.rank.clone(),
                alt: row.alt,
                last_seen: row.last_seen,
                zone: row.zone.clone(),
                notes: row.notes.clone(),
            });
        }
    }

    Ok(ops)
}

/// Computes the operations needed to record one raid-dump snapshot taken
/// at `at`. Unseen names become bare players; every named attendee gets
/// one attendance row.
pub fn plan_attendance(
    players: &[PlayerData],
    rows: &[AttendanceRow],
    at: DateTime<Utc>,
) -> Vec<AttendanceOp> {
    let mut ops = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for row in rows {
        if !seen.insert(row.name.to_lowercase()) {
            continue;
        }

        let is_known = players
            .iter()
            .any(|p| p.name.eq_ignore_ascii_case(&row.name));

        if !is_known {
            ops.push(AttendanceOp::CreatePlayer {
                name: row.name.clone(),
                class: row.class.clone(),
            });
        }

        ops.push(AttendanceOp::RecordAttendance {
            name: row.name.clone(),
            at,
        });
    }

    ops
}

fn rank_is_leader(rank: Option<&str>) -> bool {
    rank.is_some_and(|r| r.eq_ignore_ascii_case(LEADER_RANK))
}

fn current_leader<'p>(players: &'p [PlayerData], ranks: &[RankData]) -> Option<&'p PlayerData> {
    let leader_rank = ranks
        .iter()
        .find(|r| r.name.eq_ignore_ascii_case(LEADER_RANK))?;

    players.iter().find(|p| p.rank_id == Some(leader_rank.id))
}

fn row_by_name<'r>(rows: &'r [RosterRow], name: &str) -> Option<&'r RosterRow> {
    rows.iter().find(|r| r.name.eq_ignore_ascii_case(name))
}
