use crate::cli::{CallerArgs, Commands};
use crate::error::{CliError, Result};
use chrono::{Datelike, NaiveDate};
use log::info;
use presence_core::db::open_db;
use presence_core::{
    default_log_level, init_logging, AttendanceListQuery, AttendanceRecorder, Clock,
    DailyScheduler, EnvelopeCodec, IssuedToken, PresenceConfig, Principal, ScanMethod,
    ScanRejection, ScanVerifier, SqliteAttendanceRepository, SqliteTokenRepository, SystemClock,
    TokenIssuer,
};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

/// Loaded configuration plus the process-wide clock.
pub struct Runtime {
    config: PresenceConfig,
    clock: Arc<dyn Clock>,
}

impl Runtime {
    /// Loads the config file and starts logging.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config = PresenceConfig::load(config_path)?;
        let level = config
            .log_level
            .clone()
            .unwrap_or_else(|| default_log_level().to_string());
        init_logging(&level, config.log_dir.as_deref()).map_err(CliError::Logging)?;

        Ok(Self {
            config,
            clock: Arc::new(SystemClock),
        })
    }

    fn codec(&self) -> Result<EnvelopeCodec> {
        Ok(EnvelopeCodec::new(self.config.signing_key()?))
    }
}

pub fn handle_command(runtime: &Runtime, command: Commands, json_output: bool) -> Result<()> {
    match command {
        Commands::Serve => serve(runtime, json_output),
        Commands::Generate { caller, force } => generate(runtime, &caller, force, json_output),
        Commands::Scan {
            value,
            caller,
            manual,
        } => {
            let method = if manual {
                ScanMethod::Manual
            } else {
                ScanMethod::Camera
            };
            scan(runtime, &caller, &value, method, json_output)
        }
        Commands::List {
            caller,
            date,
            month,
            identity,
            limit,
            offset,
        } => {
            let mut query = AttendanceListQuery {
                identity_id: identity,
                limit,
                offset,
                ..AttendanceListQuery::default()
            };
            if let Some(date) = date {
                query.date = Some(parse_date(&date)?);
            }
            if let Some(month) = month {
                let (since, until) = month_range(&month)?;
                query.since = Some(since);
                query.until = Some(until);
            }
            list(runtime, &caller, &query, json_output)
        }
    }
}

fn principal(caller: &CallerArgs) -> Principal {
    Principal::new(caller.id.trim(), caller.role)
}

fn serve(runtime: &Runtime, json_output: bool) -> Result<()> {
    let database_path = runtime.config.database_path.clone();
    let codec = runtime.codec()?;
    let clock = Arc::clone(&runtime.clock);

    let scheduler = DailyScheduler::new(
        Arc::clone(&runtime.clock),
        move |_date| -> Result<()> {
            let conn = open_db(&database_path)?;
            let issuer = TokenIssuer::new(
                SqliteTokenRepository::try_new(&conn)?,
                codec.clone(),
                Arc::clone(&clock),
            );
            let issued = issuer.ensure_today(false)?;
            print_token(&issued, json_output)?;
            Ok(())
        },
    );

    let handle = scheduler.spawn()?;
    info!(
        "event=serve_start module=cli status=ok db={}",
        runtime.config.database_path.display()
    );
    handle.join();
    Ok(())
}

fn generate(runtime: &Runtime, caller: &CallerArgs, force: bool, json_output: bool) -> Result<()> {
    let conn = open_db(&runtime.config.database_path)?;
    let issuer = TokenIssuer::new(
        SqliteTokenRepository::try_new(&conn)?,
        runtime.codec()?,
        Arc::clone(&runtime.clock),
    );
    let issued = issuer.generate(&principal(caller), force)?;
    print_token(&issued, json_output)
}

fn scan(
    runtime: &Runtime,
    caller: &CallerArgs,
    value: &str,
    method: ScanMethod,
    json_output: bool,
) -> Result<()> {
    let conn = open_db(&runtime.config.database_path)?;
    let recorder = AttendanceRecorder::new(
        SqliteAttendanceRepository::try_new(&conn)?,
        Arc::clone(&runtime.clock),
    );
    let verifier = ScanVerifier::new(
        SqliteTokenRepository::try_new(&conn)?,
        recorder,
        runtime.codec()?,
        Arc::clone(&runtime.clock),
    )
    .with_midnight_grace(runtime.config.scan_grace());

    let (record, already_recorded) = match verifier.scan(&principal(caller), value, method) {
        Ok(receipt) => (receipt.record, false),
        Err(ScanRejection::AlreadyRecorded(record)) => (record, true),
        Err(rejection) => return Err(rejection.into()),
    };

    if json_output {
        let output = json!({
            "success": true,
            "already_recorded": already_recorded,
            "record": record,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if already_recorded {
        println!(
            "Already checked in: {} on {} at {}",
            record.identity_id,
            record.date,
            format_millis(record.recorded_at)
        );
    } else {
        println!(
            "Checked in: {} on {} at {}",
            record.identity_id,
            record.date,
            format_millis(record.recorded_at)
        );
    }
    Ok(())
}

fn list(
    runtime: &Runtime,
    caller: &CallerArgs,
    query: &AttendanceListQuery,
    json_output: bool,
) -> Result<()> {
    let conn = open_db(&runtime.config.database_path)?;
    let recorder = AttendanceRecorder::new(
        SqliteAttendanceRepository::try_new(&conn)?,
        Arc::clone(&runtime.clock),
    );
    let records = recorder.list(&principal(caller), query)?;

    if json_output {
        let output = json!({
            "success": true,
            "records": records,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No attendance records.");
        return Ok(());
    }
    for record in &records {
        println!(
            "{}  {:<24}  {}  {}",
            record.date,
            record.identity_id,
            format_millis(record.recorded_at),
            record.method.as_str()
        );
    }
    Ok(())
}

fn print_token(issued: &IssuedToken, json_output: bool) -> Result<()> {
    if json_output {
        let output = json!({
            "success": true,
            "issue_date": issued.issue_date().to_string(),
            "envelope": issued.envelope,
            "freshly_issued": issued.freshly_issued,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Attendance code for {}:", issued.issue_date());
        println!("{}", issued.envelope);
    }
    Ok(())
}

fn format_millis(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|utc| {
            utc.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S %:z")
                .to_string()
        })
        .unwrap_or_else(|| millis.to_string())
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| CliError::InvalidInput(format!("expected YYYY-MM-DD, got `{value}`")))
}

/// Inclusive first and last day of a `YYYY-MM` month.
fn month_range(value: &str) -> Result<(NaiveDate, NaiveDate)> {
    let invalid = || CliError::InvalidInput(format!("expected YYYY-MM, got `{value}`"));
    let first = NaiveDate::parse_from_str(&format!("{}-01", value.trim()), "%Y-%m-%d")
        .map_err(|_| invalid())?;
    let next_month = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    };
    let last = next_month
        .and_then(|date| date.pred_opt())
        .ok_or_else(invalid)?;
    Ok((first, last))
}
