//! Pure parsers for the semi-structured text exports the game client
//! produces. No I/O happens here; malformed input is skipped, never fatal.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Dump files are stamped `<prefix>-<yyyyMMdd>-<HHmmss>.<ext>`
    static ref FILE_STAMP: Regex =
        Regex::new(r"-(\d{8})-(\d{6})\.[A-Za-z0-9]+$").expect("stamp pattern compiles");
}

/// One line of a full guild-roster export
#[derive(Debug, Clone, PartialEq)]
pub struct RosterRow {
    pub name: String,
    pub level: Option<i32>,
    pub class: Option<String>,
    pub rank: Option<String>,
    pub alt: bool,
    pub last_seen: Option<NaiveDate>,
    pub zone: Option<String>,
    pub notes: Option<String>,
}

/// One attendee line of a raid-roster export
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceRow {
    pub name: String,
    pub class: Option<String>,
}

/// Parses a tab-delimited guild-roster line. Fields are positional:
/// name, level, class, rank, alt flag, last-on date, zone, notes.
/// Short lines are unparsable and yield `None`.
pub fn parse_roster_line(line: &str) -> Option<RosterRow> {
    let fields: Vec<&str> = line.split('\t').collect();

    if fields.len() < 6 {
        return None;
    }

    let name = fields[0].trim();

    if name.is_empty() {
        return None;
    }

    Some(RosterRow {
        name: name.to_string(),
        level: fields[1].trim().parse().ok(),
        class: non_empty(fields[2]),
        rank: non_empty(fields[3]),
        alt: fields[4].trim().eq_ignore_ascii_case("a"),
        last_seen: NaiveDate::parse_from_str(fields[5].trim(), "%m/%d/%y").ok(),
        zone: fields.get(6).and_then(|f| non_empty(f)),
        notes: fields.get(7).and_then(|f| non_empty(f)),
    })
}

/// Parses a tab-delimited raid-attendance line. The export emits
/// numbered-but-empty rows for absent raid slots, which come out shorter
/// than 5 fields and are filtered here.
pub fn parse_attendance_line(line: &str) -> Option<AttendanceRow> {
    let fields: Vec<&str> = line.split('\t').collect();

    if fields.len() < 5 {
        return None;
    }

    let name = fields[1].trim();

    if name.is_empty() {
        return None;
    }

    Some(AttendanceRow {
        name: name.to_string(),
        class: non_empty(fields[3]),
    })
}

/// Parses every roster line of a dump, dropping unparsable ones
pub fn parse_roster(text: &str) -> Vec<RosterRow> {
    text.lines().filter_map(parse_roster_line).collect()
}

/// Parses every attendee line of a raid dump, dropping placeholder rows
pub fn parse_attendance(text: &str) -> Vec<AttendanceRow> {
    text.lines().filter_map(parse_attendance_line).collect()
}

/// Extracts the capture timestamp encoded in a dump file name.
///
/// The export tool stamps local time with no timezone info, so the
/// caller's UTC offset in minutes (as reported by their browser) is
/// trusted to reconstruct UTC.
pub fn capture_time(file_name: &str, utc_offset_minutes: i64) -> Option<DateTime<Utc>> {
    let captures = FILE_STAMP.captures(file_name)?;

    let date = NaiveDate::parse_from_str(&captures[1], "%Y%m%d").ok()?;
    let time = NaiveTime::parse_from_str(&captures[2], "%H%M%S").ok()?;
    let local = NaiveDateTime::new(date, time);

    let utc = local + Duration::minutes(utc_offset_minutes);

    Some(DateTime::from_naive_utc_and_offset(utc, Utc))
}

fn non_empty(field: &str) -> Option<String> {
    let trimmed = field.trim();

    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_a_full_roster_line() {
        let line = "Vulak\t60\tWizard\tLeader\t\t01/15/23\tPlane of Sky\tbanker";
        let row = parse_roster_line(line).expect("line parses");

        assert_eq!(row.name, "Vulak");
        assert_eq!(row.level, Some(60));
        assert_eq!(row.class.as_deref(), Some("Wizard"));
        assert_eq!(row.rank.as_deref(), Some("Leader"));
        assert!(!row.alt);
        assert_eq!(row.last_seen, NaiveDate::from_ymd_opt(2023, 1, 15));
        assert_eq!(row.zone.as_deref(), Some("Plane of Sky"));
        assert_eq!(row.notes.as_deref(), Some("banker"));
    }

    #[test]
    fn flags_alts_and_tolerates_missing_trailing_fields() {
        let row = parse_roster_line("Bankatron\t1\tWarrior\tMember\tA\t\t")
            .expect("line parses without date, zone, or notes");

        assert!(row.alt);
        assert_eq!(row.last_seen, None);
        assert_eq!(row.zone, None);
        assert_eq!(row.notes, None);
    }

    #[test]
    fn skips_ragged_roster_lines() {
        assert_eq!(parse_roster_line("Vulak\t60\tWizard"), None);
        assert_eq!(parse_roster_line(""), None);
    }

    #[test]
    fn parses_attendee_lines() {
        let row = parse_attendance_line("1\tVulak\t60\tWizard\tGroup Leader\t")
            .expect("line parses");

        assert_eq!(row.name, "Vulak");
        assert_eq!(row.class.as_deref(), Some("Wizard"));
    }

    #[test]
    fn filters_placeholder_raid_rows() {
        // Absent raid slots are emitted as a bare slot number
        assert_eq!(parse_attendance_line("14\t"), None);
        assert_eq!(parse_attendance_line("14\t\t\t"), None);
    }

    #[test]
    fn filters_unnamed_raid_rows() {
        assert_eq!(parse_attendance_line("14\t\t\t\t\t"), None);
    }

    #[test]
    fn extracts_capture_time_from_file_names() {
        let at = capture_time("RaidRoster-20230415-213012.txt", 0).expect("stamp parses");

        assert_eq!(at, Utc.with_ymd_and_hms(2023, 4, 15, 21, 30, 12).unwrap());
    }

    #[test]
    fn applies_the_client_utc_offset() {
        // UTC-5 browsers report an offset of 300 minutes
        let at = capture_time("RaidRoster-20230415-213012.txt", 300).expect("stamp parses");

        assert_eq!(at, Utc.with_ymd_and_hms(2023, 4, 16, 2, 30, 12).unwrap());
    }

    #[test]
    fn rejects_file_names_without_a_stamp() {
        assert_eq!(capture_time("RaidRoster.txt", 0), None);
        assert_eq!(capture_time("RaidRoster-2023-0415.txt", 0), None);
    }
}
