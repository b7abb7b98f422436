use chrono::{DateTime, Duration, NaiveDate};
use presence_core::db::open_db;
use presence_core::{
    AttendanceRecorder, AttendanceRepository, EnvelopeCodec, ManualClock, Principal,
    RecordOutcome, ScanMethod, ScanRejection, ScanVerifier, SigningKey,
    SqliteAttendanceRepository, SqliteTokenRepository, TokenIssuer,
};
use std::sync::{Arc, Barrier};
use std::thread;

const SCANNERS: usize = 10;

fn march(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}

#[test]
fn concurrent_scans_for_one_identity_record_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("presence.db");
    drop(open_db(&path).unwrap());

    let clock = ManualClock::shared(DateTime::parse_from_rfc3339("2024-03-01T09:00:00+00:00").unwrap());
    let barrier = Arc::new(Barrier::new(SCANNERS));
    let handles: Vec<_> = (0..SCANNERS)
        .map(|index| {
            let path = path.clone();
            let clock = clock.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let recorder =
                    AttendanceRecorder::new(SqliteAttendanceRepository::try_new(&conn).unwrap(), clock);
                barrier.wait();
                recorder
                    .record_at("E1", march(1), ScanMethod::Camera, 1_000 + index as i64)
                    .unwrap()
            })
        })
        .collect();

    let outcomes: Vec<RecordOutcome> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    let winners: Vec<_> = outcomes.iter().filter(|outcome| outcome.is_new()).collect();
    assert_eq!(winners.len(), 1);
    let winner = winners[0].record().clone();
    for outcome in &outcomes {
        assert_eq!(outcome.record(), &winner);
    }

    let conn = open_db(&path).unwrap();
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM attendance_records WHERE identity_id = 'E1';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(count, 1);

    let repo = SqliteAttendanceRepository::try_new(&conn).unwrap();
    let stored = repo.find("E1", march(1)).unwrap().unwrap();
    assert_eq!(stored.uuid, winner.uuid);
    assert_eq!(stored.recorded_at, winner.recorded_at);
}

#[test]
fn concurrent_scans_for_distinct_identities_all_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("presence.db");
    drop(open_db(&path).unwrap());

    let clock = ManualClock::shared(DateTime::parse_from_rfc3339("2024-03-01T09:00:00+00:00").unwrap());
    let barrier = Arc::new(Barrier::new(SCANNERS));
    let handles: Vec<_> = (0..SCANNERS)
        .map(|index| {
            let path = path.clone();
            let clock = clock.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let recorder =
                    AttendanceRecorder::new(SqliteAttendanceRepository::try_new(&conn).unwrap(), clock);
                barrier.wait();
                recorder
                    .record_if_absent(&format!("E{index}"), march(1), ScanMethod::Manual)
                    .unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap().is_new());
    }
}

#[test]
fn same_identity_may_record_again_the_next_day() {
    let dir = tempfile::tempdir().unwrap();
    let conn = open_db(dir.path().join("presence.db")).unwrap();
    let clock = ManualClock::shared(DateTime::parse_from_rfc3339("2024-03-01T09:00:00+00:00").unwrap());
    let recorder = AttendanceRecorder::new(SqliteAttendanceRepository::try_new(&conn).unwrap(), clock);

    assert!(recorder
        .record_if_absent("E1", march(1), ScanMethod::Camera)
        .unwrap()
        .is_new());
    assert!(recorder
        .record_if_absent("E1", march(2), ScanMethod::Camera)
        .unwrap()
        .is_new());
    assert!(!recorder
        .record_if_absent(" E1 ", march(2), ScanMethod::Manual)
        .unwrap()
        .is_new());
}

#[test]
fn concurrent_scans_of_one_code_report_the_winning_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("presence.db");
    let codec = EnvelopeCodec::new(SigningKey::from_bytes(vec![9; 32]).unwrap());
    let start = DateTime::parse_from_rfc3339("2024-03-01T08:59:00+00:00").unwrap();

    let envelope = {
        let conn = open_db(&path).unwrap();
        TokenIssuer::new(
            SqliteTokenRepository::try_new(&conn).unwrap(),
            codec.clone(),
            ManualClock::shared(start),
        )
        .ensure_today(false)
        .unwrap()
        .envelope
    };

    let barrier = Arc::new(Barrier::new(SCANNERS));
    let handles: Vec<_> = (0..SCANNERS)
        .map(|index| {
            let path = path.clone();
            let codec = codec.clone();
            let envelope = envelope.clone();
            let barrier = Arc::clone(&barrier);
            // Each device sees a slightly different instant on the same day.
            let clock = ManualClock::shared(start + Duration::milliseconds(index as i64 * 7));
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let recorder = AttendanceRecorder::new(
                    SqliteAttendanceRepository::try_new(&conn).unwrap(),
                    clock.clone(),
                );
                let verifier = ScanVerifier::new(
                    SqliteTokenRepository::try_new(&conn).unwrap(),
                    recorder,
                    codec,
                    clock,
                );
                barrier.wait();
                verifier.scan(&Principal::employee("E1"), &envelope, ScanMethod::Camera)
            })
        })
        .collect();

    let mut winners = Vec::new();
    let mut losers = Vec::new();
    for handle in handles {
        match handle.join().unwrap() {
            Ok(receipt) => winners.push(receipt.record),
            Err(ScanRejection::AlreadyRecorded(record)) => losers.push(record),
            Err(other) => panic!("unexpected rejection: {other}"),
        }
    }

    assert_eq!(winners.len(), 1);
    assert_eq!(losers.len(), SCANNERS - 1);
    let winner = &winners[0];
    for record in &losers {
        assert_eq!(record.uuid, winner.uuid);
        assert_eq!(record.recorded_at, winner.recorded_at);
    }

    let conn = open_db(&path).unwrap();
    let stored = SqliteAttendanceRepository::try_new(&conn)
        .unwrap()
        .find("E1", march(1))
        .unwrap()
        .unwrap();
    assert_eq!(&stored, winner);
}
