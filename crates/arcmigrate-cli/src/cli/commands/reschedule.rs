//! Implementation of `arcmigrate reschedule`.
//!
//! Interactive: shifts one test cycle to a new calendar date, offers
//! per-session hour nudges, and writes the schedule back only after the
//! operator confirms. Prompts go to stderr so `--json` output stays clean.

use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::Result;
use chrono::{FixedOffset, LocalResult, TimeZone};
use serde::Serialize;

use arcmigrate_core::core::MigrationError;
use arcmigrate_core::directory::{ParticipantDirectory, ReportKind, ReportStore};
use arcmigrate_core::reschedule::{
    apply_shift, find_anchor, nudge_session, schedule_zone, sessions_in_cycle, shift_delta,
    TestSchedule,
};

use crate::output::{Formatter, OutputFormat};
use crate::store::MirrorStore;

/// Serializable output for the reschedule command.
#[derive(Serialize)]
struct RescheduleOutput {
    arc_id: String,
    cycle: u32,
    sessions_shifted: usize,
    delta_seconds: i64,
    written: bool,
}

/// Run the interactive rescheduling flow.
pub fn run_reschedule(
    store_root: &Path,
    arc_id: &str,
    target_date: &str,
    cycle: u32,
    format: OutputFormat,
    input: &mut dyn BufRead,
) -> Result<()> {
    let store = MirrorStore::open(store_root)?;

    let participant = store.lookup_by_external_id(arc_id)?.ok_or_else(|| {
        MigrationError::ParticipantNotFound {
            external_id: arc_id.to_string(),
        }
    })?;
    let document = store
        .read_singleton_report(&participant.participant_id, ReportKind::TestSchedule)?
        .ok_or_else(|| MigrationError::ReportNotFound {
            participant_id: arc_id.to_string(),
            kind: ReportKind::TestSchedule.to_string(),
        })?;
    let mut schedule: TestSchedule = serde_json::from_value(document)?;

    let zone = schedule_zone(&schedule)?;
    let anchor = find_anchor(&schedule, cycle)?;
    let delta = shift_delta(schedule.sessions[anchor].session_date, target_date, zone)?;
    apply_shift(&mut schedule, cycle, delta);

    let indexes = sessions_in_cycle(&schedule, cycle);
    eprintln!("Cycle {cycle} shifted to {target_date} ({} sessions):", indexes.len());
    for &i in &indexes {
        let s = &schedule.sessions[i];
        eprintln!(
            "  week {} day {} session {}  ->  {}",
            s.week,
            s.day,
            s.session,
            local_time(s.session_date, zone)
        );
    }

    // Per-session hour nudges, each reverted unless confirmed.
    for &i in &indexes {
        let current = local_time(schedule.sessions[i].session_date, zone);
        let answer = prompt(
            input,
            &format!("Nudge session at {current} by hours (blank to keep):"),
        )?;
        if answer.is_empty() {
            continue;
        }
        let Ok(hours) = answer.parse::<i64>() else {
            eprintln!("Not a whole number of hours, keeping {current}.");
            continue;
        };
        if hours == 0 {
            continue;
        }

        nudge_session(&mut schedule.sessions[i], hours);
        let nudged = local_time(schedule.sessions[i].session_date, zone);
        let keep = prompt(input, &format!("Now {nudged}. Keep this change? (y/n):"))?;
        if !confirmed(&keep) {
            nudge_session(&mut schedule.sessions[i], -hours);
            eprintln!("Reverted to {current}.");
        }
    }

    let answer = prompt(input, "Write the updated schedule? (y/n):")?;
    let written = confirmed(&answer);
    if written {
        let value = serde_json::to_value(&schedule)?;
        store.write_singleton_report(&participant.participant_id, ReportKind::TestSchedule, &value)?;
        tracing::info!(%arc_id, cycle, delta, "schedule rewritten");
    } else {
        eprintln!("Nothing written.");
    }

    Formatter::new(format).print(&RescheduleOutput {
        arc_id: arc_id.to_string(),
        cycle,
        sessions_shifted: indexes.len(),
        delta_seconds: delta as i64,
        written,
    })?;
    Ok(())
}

fn prompt(input: &mut dyn BufRead, message: &str) -> Result<String> {
    eprint!("{message} ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn confirmed(answer: &str) -> bool {
    matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes")
}

fn local_time(session_date: f64, zone: FixedOffset) -> String {
    match zone.timestamp_opt(session_date.floor() as i64, 0) {
        LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M %:z").to_string(),
        _ => format!("epoch {session_date}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arcmigrate_core::directory::{AttributeMap, NewAccount};
    use serde_json::json;
    use std::io::Cursor;
    use tempfile::tempdir;

    // 2020-01-01T09:30:00-05:00
    const ANCHOR: f64 = 1_577_889_000.0;

    fn seeded_store(root: &Path) -> (MirrorStore, String) {
        let store = MirrorStore::open(root).unwrap();
        let pid = store
            .create_participant(&NewAccount {
                study_id: "StLouis".to_string(),
                external_id: "000042".to_string(),
                password: "Secr3t!aB".to_string(),
                phone: None,
                attributes: AttributeMap::new(),
            })
            .unwrap();

        let schedule = json!({
            "participant_id": "000042",
            "timezone_offset": "-05:00",
            "sessions": [
                {"session_id": "a", "session_date": ANCHOR, "week": 0, "day": 0, "session": 0},
                {"session_id": "b", "session_date": ANCHOR + 3600.0, "week": 0, "day": 0, "session": 1}
            ]
        });
        store
            .write_singleton_report(&pid, ReportKind::TestSchedule, &schedule)
            .unwrap();
        (store, pid)
    }

    fn stored_dates(store: &MirrorStore, pid: &str) -> Vec<f64> {
        let doc = store
            .read_singleton_report(pid, ReportKind::TestSchedule)
            .unwrap()
            .unwrap();
        doc["sessions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["session_date"].as_f64().unwrap())
            .collect()
    }

    #[test]
    fn test_confirmed_shift_is_written() {
        let dir = tempdir().unwrap();
        let (store, pid) = seeded_store(dir.path());

        // No nudges, then confirm the write.
        let mut input = Cursor::new("\n\ny\n");
        run_reschedule(
            dir.path(),
            "000042",
            "2020-01-11",
            1,
            OutputFormat::Text,
            &mut input,
        )
        .unwrap();

        let ten_days = 10.0 * 86_400.0;
        assert_eq!(
            stored_dates(&store, &pid),
            vec![ANCHOR + ten_days, ANCHOR + 3600.0 + ten_days]
        );
    }

    #[test]
    fn test_declined_shift_writes_nothing() {
        let dir = tempdir().unwrap();
        let (store, pid) = seeded_store(dir.path());

        let mut input = Cursor::new("\n\nn\n");
        run_reschedule(
            dir.path(),
            "000042",
            "2020-01-11",
            1,
            OutputFormat::Text,
            &mut input,
        )
        .unwrap();

        assert_eq!(stored_dates(&store, &pid), vec![ANCHOR, ANCHOR + 3600.0]);
    }

    #[test]
    fn test_declined_nudge_is_reverted() {
        let dir = tempdir().unwrap();
        let (store, pid) = seeded_store(dir.path());

        // Nudge the first session by 2 hours but decline it, skip the
        // second, then confirm the write.
        let mut input = Cursor::new("2\nn\n\ny\n");
        run_reschedule(
            dir.path(),
            "000042",
            "2020-01-11",
            1,
            OutputFormat::Text,
            &mut input,
        )
        .unwrap();

        let ten_days = 10.0 * 86_400.0;
        assert_eq!(
            stored_dates(&store, &pid),
            vec![ANCHOR + ten_days, ANCHOR + 3600.0 + ten_days]
        );
    }

    #[test]
    fn test_accepted_nudge_is_kept() {
        let dir = tempdir().unwrap();
        let (store, pid) = seeded_store(dir.path());

        let mut input = Cursor::new("2\ny\n\ny\n");
        run_reschedule(
            dir.path(),
            "000042",
            "2020-01-11",
            1,
            OutputFormat::Text,
            &mut input,
        )
        .unwrap();

        let ten_days = 10.0 * 86_400.0;
        assert_eq!(
            stored_dates(&store, &pid),
            vec![
                ANCHOR + ten_days + 2.0 * 3600.0,
                ANCHOR + 3600.0 + ten_days
            ]
        );
    }

    #[test]
    fn test_unknown_participant_fails() {
        let dir = tempdir().unwrap();
        let _ = seeded_store(dir.path());

        let mut input = Cursor::new("");
        let result = run_reschedule(
            dir.path(),
            "999999",
            "2020-01-11",
            1,
            OutputFormat::Text,
            &mut input,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_schedule_fails() {
        let dir = tempdir().unwrap();
        let store = MirrorStore::open(dir.path()).unwrap();
        store
            .create_participant(&NewAccount {
                study_id: "StLouis".to_string(),
                external_id: "000042".to_string(),
                password: "Secr3t!aB".to_string(),
                phone: None,
                attributes: AttributeMap::new(),
            })
            .unwrap();

        let mut input = Cursor::new("");
        let result = run_reschedule(
            dir.path(),
            "000042",
            "2020-01-11",
            1,
            OutputFormat::Text,
            &mut input,
        );
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("TestSchedule"));
    }

    #[test]
    fn test_bad_date_fails_before_writing() {
        let dir = tempdir().unwrap();
        let (store, pid) = seeded_store(dir.path());

        let mut input = Cursor::new("");
        let result = run_reschedule(
            dir.path(),
            "000042",
            "01/11/2020",
            1,
            OutputFormat::Text,
            &mut input,
        );
        assert!(result.is_err());
        assert_eq!(stored_dates(&store, &pid), vec![ANCHOR, ANCHOR + 3600.0]);
    }
}
