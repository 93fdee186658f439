//! log-sink - command-line client for the log-sink service
//!
//! Usage:
//!   log-sink send --name N [--level L] [--message M] [--extra JSON]
//!   log-sink tail [--name N] [--level-min L] [--include-extra]
//!   log-sink query [--name N] [--since-minutes M] [--limit N] [--include-extra]
//!   log-sink permissions

use chrono::{SecondsFormat, Utc};
use clap::Parser;
use log_sink::cli::{Cli, Command};
use log_sink::config::{self, Config};
use log_sink::error::{Result, SinkError};
use log_sink::logging::init_tracing;
use log_sink::record::DateRange;
use log_sink::{
    Connection, LogData, LogRecord, Query, QueryOptions, Range, StreamFilter, WebSocketConnector,
};
use std::process::ExitCode;
use tracing::warn;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Cannot start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = config::load(cli.config.as_deref())?;

    let mut options = config.peer_options();
    if let Some(url) = cli.url {
        options.url = url;
    }
    let user = cli.user.unwrap_or_else(|| config.server.user.clone());

    let connection = Connection::new(WebSocketConnector::new());
    config.apply_defaults(&connection)?;
    connection.events().error.subscribe(|e| warn!("{}", e));
    connection.connect(user, config.server.password.clone(), &options)?;

    let result = execute(&connection, &config, cli.command).await;

    let closed = connection.closed();
    if connection.close().is_ok() {
        closed.await;
    }
    result
}

async fn execute(connection: &Connection, config: &Config, command: Command) -> Result<()> {
    match command {
        Command::Send {
            name,
            level,
            message,
            extra,
        } => {
            let mut data = LogData::new(name, level);
            data.message = message;
            if let Some(extra) = extra {
                let value = serde_json::from_str(&extra).map_err(|e| SinkError::InvalidArgument {
                    field: "extra",
                    reason: format!("Invalid extra, expected JSON: {}", e),
                })?;
                data.extra = Some(value);
            }
            connection.send_log_confirmed(data).await
        }

        Command::Tail {
            name,
            level_min,
            include_extra,
        } => {
            let filter = StreamFilter {
                name,
                level: level_min.map(|l| Range::at_least(u8::from(l).into())),
                ..Default::default()
            };
            let mut stream = connection.stream(filter, include_extra).await?;
            loop {
                tokio::select! {
                    record = stream.recv() => match record {
                        Some(record) => print_record(&record),
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => {
                        stream.stop();
                        break;
                    }
                }
            }
            Ok(())
        }

        Command::Query {
            name,
            since_minutes,
            limit,
            include_extra,
        } => {
            let date = match since_minutes {
                Some(minutes) => DateRange::last_minutes(minutes, Utc::now())?,
                None => DateRange::default(),
            };
            let query = Query {
                name,
                date,
                ..Default::default()
            };
            let options = QueryOptions {
                include_extra: include_extra || config.query.include_extra,
                limit: Some(limit.unwrap_or(config.query.limit)),
                ..Default::default()
            };
            for record in connection.query(query, options).await? {
                print_record(&record);
            }
            Ok(())
        }

        Command::Permissions => {
            for origin in connection.get_permissions().await? {
                println!("{}", origin);
            }
            Ok(())
        }
    }
}

fn print_record(record: &LogRecord) {
    let mut line = format!(
        "{} {:5} {}/{}",
        record.date.to_rfc3339_opts(SecondsFormat::Millis, true),
        record.level.to_string(),
        record.origin.as_deref().unwrap_or("-"),
        record.name
    );
    if let Some(message) = &record.message {
        line.push_str(": ");
        line.push_str(message);
    }
    if let Some(extra) = &record.extra {
        line.push(' ');
        line.push_str(&extra.to_string());
    }
    println!("{}", line);
}
