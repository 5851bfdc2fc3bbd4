//! Rolling attendance percentages derived from raw raid-dump existence
//! records.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::{
    db::{DatabaseError, PlayerData, PrimaryKey, RaidDumpData},
    QuartermasterContext,
};

/// How far back attendance is tracked at all, in days
pub const TRACKING_WINDOW_DAYS: i64 = 180;

const WINDOWS: [i64; 3] = [30, 90, 180];

/// Aggregated attendance for one main player
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerAttendance {
    pub player_id: PrimaryKey,
    pub name: String,
    /// Percentage of raid nights attended in the last 30 days
    pub thirty: i32,
    pub ninety: i32,
    pub one_eighty: i32,
}

/// Read-side manager for the attendance aggregation
pub struct AttendanceManager {
    context: QuartermasterContext,
}

impl AttendanceManager {
    pub fn new(context: &QuartermasterContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    pub async fn player_attendance(
        &self,
        guild_id: PrimaryKey,
    ) -> Result<Vec<PlayerAttendance>, DatabaseError> {
        let now = Utc::now();
        let since = now - Duration::days(TRACKING_WINDOW_DAYS);

        let players = self.context.database.players_by_guild(guild_id).await?;
        let dumps = self.context.database.attendance_since(guild_id, since).await?;

        Ok(summarize(&players, &dumps, now))
    }
}

/// Computes 30/90/180-day attendance percentages per main player.
///
/// Alt attendance is folded onto the alt's linked main. The denominator
/// of a window is the count of distinct dates on which *any* tracked
/// player has a record, so the percentage answers "what fraction of the
/// raid nights held did you attend". Windows with zero raid nights yield
/// 0%.
pub fn summarize(
    players: &[PlayerData],
    dumps: &[RaidDumpData],
    now: DateTime<Utc>,
) -> Vec<PlayerAttendance> {
    let by_id: HashMap<PrimaryKey, &PlayerData> =
        players.iter().map(|p| (p.id, p)).collect();

    let mut guild_dates: BTreeSet<NaiveDate> = BTreeSet::new();
    let mut player_dates: HashMap<PrimaryKey, BTreeSet<NaiveDate>> = HashMap::new();

    for dump in dumps {
        let date = dump.at.date_naive();
        guild_dates.insert(date);

        let credited = by_id
            .get(&dump.player_id)
            .map(|p| {
                if p.alt {
                    p.main_id.unwrap_or(p.id)
                } else {
                    p.id
                }
            })
            .unwrap_or(dump.player_id);

        player_dates.entry(credited).or_default().insert(date);
    }

    let mut results: Vec<PlayerAttendance> = players
        .iter()
        .filter(|p| !p.alt && !p.hidden)
        .map(|p| {
            let attended = player_dates.get(&p.id);
            let empty = BTreeSet::new();
            let attended = attended.unwrap_or(&empty);

            let windows: Vec<i32> = WINDOWS
                .iter()
                .map(|days| {
                    let cutoff = (now - Duration::days(*days)).date_naive();
                    let held = guild_dates.iter().filter(|d| **d > cutoff).count();
                    let present = attended.iter().filter(|d| **d > cutoff).count();

                    percentage(present, held)
                })
                .collect();

            PlayerAttendance {
                player_id: p.id,
                name: p.name.clone(),
                thirty: windows[0],
                ninety: windows[1],
                one_eighty: windows[2],
            }
        })
        .collect();

    results.sort_by(|a, b| a.name.cmp(&b.name));
    results
}

/// Rounds half away from zero, 0% when no raid nights were held
fn percentage(numerator: usize, denominator: usize) -> i32 {
    if denominator == 0 {
        return 0;
    }

    ((100.0 * numerator as f64) / denominator as f64).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn player(id: PrimaryKey, name: &str) -> PlayerData {
        PlayerData {
            id,
            guild_id: 1,
            name: name.to_string(),
            class: None,
            level: None,
            rank_id: None,
            admin: false,
            alt: false,
            main_id: None,
            active: true,
            hidden: false,
            last_seen: None,
            zone: None,
            notes: None,
            key: None,
        }
    }

    fn alt_of(id: PrimaryKey, name: &str, main_id: PrimaryKey) -> PlayerData {
        let mut alt = player(id, name);
        alt.alt = true;
        alt.main_id = Some(main_id);
        alt
    }

    fn dump(player_id: PrimaryKey, days_ago: i64, now: DateTime<Utc>) -> RaidDumpData {
        RaidDumpData {
            player_id,
            at: now - Duration::days(days_ago),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 6, 1, 21, 0, 0).unwrap()
    }

    #[test]
    fn empty_windows_yield_zero_percent() {
        let players = [player(1, "Vulak")];

        let results = summarize(&players, &[], now());

        assert_eq!(results[0].thirty, 0);
        assert_eq!(results[0].ninety, 0);
        assert_eq!(results[0].one_eighty, 0);
    }

    #[test]
    fn the_denominator_is_shared_across_the_guild() {
        let now = now();
        let players = [player(1, "Vulak"), player(2, "Aaryonar")];
        // Two raid nights held, Aaryonar attended neither but the
        // nights still count against them
        let dumps = [dump(1, 1, now), dump(1, 3, now)];

        let results = summarize(&players, &dumps, now);

        let aaryonar = results.iter().find(|r| r.name == "Aaryonar").unwrap();
        let vulak = results.iter().find(|r| r.name == "Vulak").unwrap();

        assert_eq!(vulak.thirty, 100);
        assert_eq!(aaryonar.thirty, 0);
    }

    #[test]
    fn alt_attendance_credits_the_linked_main() {
        let now = now();
        let players = [player(1, "Vulak"), alt_of(2, "Bankatron", 1)];
        let dumps = [dump(2, 1, now)];

        let results = summarize(&players, &dumps, now);

        // Alts are folded away, only the main appears
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Vulak");
        assert_eq!(results[0].thirty, 100);
    }

    #[test]
    fn windows_partition_by_age() {
        let now = now();
        let players = [player(1, "Vulak"), player(2, "Aaryonar")];
        // One recent night Vulak attended, one old night they missed
        let dumps = [dump(1, 5, now), dump(2, 5, now), dump(2, 60, now)];

        let results = summarize(&players, &dumps, now);
        let vulak = results.iter().find(|r| r.name == "Vulak").unwrap();

        assert_eq!(vulak.thirty, 100);
        assert_eq!(vulak.ninety, 50);
        assert_eq!(vulak.one_eighty, 50);
    }

    #[test]
    fn percentages_round_half_away_from_zero() {
        let now = now();
        let players = [player(1, "Vulak"), player(2, "Aaryonar")];
        // 8 nights held, Vulak attended 3: 37.5% rounds up to 38
        let mut dumps: Vec<_> = (1..=8).map(|d| dump(2, d, now)).collect();
        dumps.extend((1..=3).map(|d| dump(1, d, now)));

        let results = summarize(&players, &dumps, now);
        let vulak = results.iter().find(|r| r.name == "Vulak").unwrap();

        assert_eq!(vulak.thirty, 38);
    }

    #[test]
    fn multiple_dumps_on_one_date_count_once() {
        let now = now();
        let players = [player(1, "Vulak")];
        let dumps = [
            RaidDumpData {
                player_id: 1,
                at: now - Duration::hours(2),
            },
            RaidDumpData {
                player_id: 1,
                at: now - Duration::hours(3),
            },
        ];

        let results = summarize(&players, &dumps, now);

        assert_eq!(results[0].thirty, 100);
    }
}
