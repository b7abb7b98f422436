use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, NaiveDate};
use presence_core::db::open_db_in_memory;
use presence_core::{
    AttendanceListQuery, AttendanceRecorder, Clock, EnvelopeCodec, ManualClock, Principal,
    ScanMethod, ScanRejection, ScanVerifier, SigningKey, SqliteAttendanceRepository,
    SqliteTokenRepository, TokenIssuer, TokenRepository, TokenSecret,
};
use rusqlite::Connection;
use std::sync::Arc;

type SqliteVerifier<'conn> =
    ScanVerifier<SqliteTokenRepository<'conn>, SqliteAttendanceRepository<'conn>>;

fn codec() -> EnvelopeCodec {
    EnvelopeCodec::new(SigningKey::from_bytes(vec![17; 32]).unwrap())
}

fn march(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}

fn clock_at(value: &str) -> Arc<ManualClock> {
    ManualClock::shared(DateTime::parse_from_rfc3339(value).unwrap())
}

fn issuer<'conn>(
    conn: &'conn Connection,
    clock: Arc<dyn Clock>,
) -> TokenIssuer<SqliteTokenRepository<'conn>> {
    TokenIssuer::new(SqliteTokenRepository::try_new(conn).unwrap(), codec(), clock)
}

fn verifier(conn: &Connection, clock: Arc<dyn Clock>) -> SqliteVerifier<'_> {
    let recorder = AttendanceRecorder::new(
        SqliteAttendanceRepository::try_new(conn).unwrap(),
        Arc::clone(&clock),
    );
    ScanVerifier::new(
        SqliteTokenRepository::try_new(conn).unwrap(),
        recorder,
        codec(),
        clock,
    )
}

fn attendance_rows(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM attendance_records;", [], |row| {
        row.get(0)
    })
    .unwrap()
}

#[test]
fn daily_scenario_records_once_and_rotation_invalidates_old_code() {
    let conn = open_db_in_memory().unwrap();
    let clock = clock_at("2024-03-01T08:55:00+07:00");
    let issuer = issuer(&conn, clock.clone());
    let verifier = verifier(&conn, clock.clone());

    let issued = issuer.generate(&Principal::admin("A1"), false).unwrap();
    assert_eq!(issued.issue_date(), march(1));

    let receipt = verifier
        .scan(&Principal::employee("E1"), &issued.envelope, ScanMethod::Camera)
        .unwrap();
    assert_eq!(receipt.record.identity_id, "E1");
    assert_eq!(receipt.record.date, march(1));
    assert_eq!(receipt.record.method, ScanMethod::Camera);
    assert_eq!(receipt.recorded_at(), clock.now().timestamp_millis());
    assert_eq!(attendance_rows(&conn), 1);

    clock.advance(Duration::minutes(3));
    let repeat = verifier
        .scan(&Principal::employee("E1"), &issued.envelope, ScanMethod::Manual)
        .unwrap_err();
    match &repeat {
        ScanRejection::AlreadyRecorded(existing) => {
            assert_eq!(existing, &receipt.record);
        }
        other => panic!("expected AlreadyRecorded, got {other}"),
    }
    assert!(repeat.is_benign());
    assert!(!repeat.is_retryable());
    assert_eq!(attendance_rows(&conn), 1);

    let rotated = issuer.generate(&Principal::admin("A1"), true).unwrap();
    assert_ne!(rotated.envelope, issued.envelope);

    let stale = verifier
        .scan(&Principal::employee("E2"), &issued.envelope, ScanMethod::Camera)
        .unwrap_err();
    assert!(matches!(stale, ScanRejection::InvalidCredential));
    assert_eq!(attendance_rows(&conn), 1);

    verifier
        .scan(&Principal::employee("E2"), &rotated.envelope, ScanMethod::Manual)
        .unwrap();
    assert_eq!(attendance_rows(&conn), 2);
}

#[test]
fn yesterdays_code_is_expired_even_though_its_row_exists() {
    let conn = open_db_in_memory().unwrap();
    let clock = clock_at("2024-03-01T17:00:00+00:00");
    let issuer = issuer(&conn, clock.clone());
    let verifier = verifier(&conn, clock.clone());

    let yesterday = issuer.ensure_today(false).unwrap();
    clock.advance(Duration::hours(8));

    let tokens = SqliteTokenRepository::try_new(&conn).unwrap();
    assert!(tokens.find_by_date(march(1)).unwrap().is_some());

    let err = verifier
        .scan(&Principal::employee("E1"), &yesterday.envelope, ScanMethod::Camera)
        .unwrap_err();
    match err {
        ScanRejection::Expired { issue_date, today } => {
            assert_eq!(issue_date, march(1));
            assert_eq!(today, march(2));
        }
        other => panic!("expected Expired, got {other}"),
    }
    assert_eq!(attendance_rows(&conn), 0);
}

#[test]
fn validly_signed_code_for_a_future_date_is_expired() {
    let conn = open_db_in_memory().unwrap();
    let clock = clock_at("2024-03-01T10:00:00+00:00");
    let verifier = verifier(&conn, clock);

    let envelope = codec().sign(&TokenSecret::generate(), march(2));
    let err = verifier
        .scan(&Principal::employee("E1"), &envelope, ScanMethod::Camera)
        .unwrap_err();
    assert!(matches!(err, ScanRejection::Expired { .. }));
}

#[test]
fn corrupted_signature_is_rejected_regardless_of_payload() {
    let conn = open_db_in_memory().unwrap();
    let clock = clock_at("2024-03-01T10:00:00+00:00");
    let issuer = issuer(&conn, clock.clone());
    let verifier = verifier(&conn, clock);
    let issued = issuer.ensure_today(false).unwrap();

    let (head, mac) = issued.envelope.rsplit_once('.').unwrap();
    let mut mac_bytes = URL_SAFE_NO_PAD.decode(mac).unwrap();
    mac_bytes[31] ^= 0x80;
    let corrupted = format!("{head}.{}", URL_SAFE_NO_PAD.encode(&mac_bytes));

    let err = verifier
        .scan(&Principal::employee("E1"), &corrupted, ScanMethod::Manual)
        .unwrap_err();
    assert!(matches!(err, ScanRejection::InvalidSignature));

    let foreign = EnvelopeCodec::new(SigningKey::from_bytes(vec![18; 32]).unwrap())
        .sign(&issued.token.secret, issued.issue_date());
    let err = verifier
        .scan(&Principal::employee("E1"), &foreign, ScanMethod::Manual)
        .unwrap_err();
    assert!(matches!(err, ScanRejection::InvalidSignature));
    assert_eq!(attendance_rows(&conn), 0);
}

#[test]
fn garbage_input_is_malformed() {
    let conn = open_db_in_memory().unwrap();
    let verifier = verifier(&conn, clock_at("2024-03-01T10:00:00+00:00"));

    for value in ["", "   ", "https://example.com/qr", "pt1.only-two"] {
        let err = verifier
            .scan(&Principal::employee("E1"), value, ScanMethod::Manual)
            .unwrap_err();
        assert!(
            matches!(err, ScanRejection::Malformed(_)),
            "{value:?} gave {err}"
        );
        assert_eq!(err.code(), "malformed");
    }
}

#[test]
fn pasted_code_with_whitespace_is_accepted() {
    let conn = open_db_in_memory().unwrap();
    let clock = clock_at("2024-03-01T10:00:00+00:00");
    let issued = issuer(&conn, clock.clone()).ensure_today(false).unwrap();
    let verifier = verifier(&conn, clock);

    let receipt = verifier
        .scan(
            &Principal::employee("E1"),
            &format!("\n  {}  \n", issued.envelope),
            ScanMethod::Manual,
        )
        .unwrap();
    assert_eq!(receipt.record.method, ScanMethod::Manual);
}

#[test]
fn signed_code_without_stored_token_is_invalid_credential() {
    let conn = open_db_in_memory().unwrap();
    let verifier = verifier(&conn, clock_at("2024-03-01T10:00:00+00:00"));

    let envelope = codec().sign(&TokenSecret::generate(), march(1));
    let err = verifier
        .scan(&Principal::employee("E1"), &envelope, ScanMethod::Camera)
        .unwrap_err();
    assert!(matches!(err, ScanRejection::InvalidCredential));
}

#[test]
fn midnight_grace_accepts_previous_code_only_inside_window() {
    let conn = open_db_in_memory().unwrap();
    let clock = clock_at("2024-03-01T23:59:50+00:00");
    let issued = issuer(&conn, clock.clone()).ensure_today(false).unwrap();
    let verifier = verifier(&conn, clock.clone()).with_midnight_grace(Duration::minutes(2));

    clock.advance(Duration::seconds(30));
    let receipt = verifier
        .scan(&Principal::employee("E1"), &issued.envelope, ScanMethod::Camera)
        .unwrap();
    assert_eq!(receipt.record.date, march(1));

    clock.advance(Duration::minutes(5));
    let err = verifier
        .scan(&Principal::employee("E2"), &issued.envelope, ScanMethod::Camera)
        .unwrap_err();
    assert!(matches!(err, ScanRejection::Expired { .. }));
}

#[test]
fn listing_shows_scan_results_to_admins() {
    let conn = open_db_in_memory().unwrap();
    let clock = clock_at("2024-03-01T09:00:00+00:00");
    let issued = issuer(&conn, clock.clone()).ensure_today(false).unwrap();
    let verifier = verifier(&conn, clock.clone());

    for id in ["E1", "E2", "E3"] {
        verifier
            .scan(&Principal::employee(id), &issued.envelope, ScanMethod::Camera)
            .unwrap();
    }

    let recorder = AttendanceRecorder::new(
        SqliteAttendanceRepository::try_new(&conn).unwrap(),
        clock,
    );
    let query = AttendanceListQuery {
        date: Some(march(1)),
        ..AttendanceListQuery::default()
    };
    let records = recorder.list(&Principal::admin("A1"), &query).unwrap();
    let ids: Vec<_> = records.iter().map(|r| r.identity_id.as_str()).collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.contains(&"E1") && ids.contains(&"E2") && ids.contains(&"E3"));
}
