//! CLI driver over `quotebook_core`.
//!
//! # Responsibility
//! - Provide a minimal executable to exercise the core against a SQLite file.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Environment:
//! - `QUOTEBOOK_DB`: database path (default `quotebook.db`).
//! - `QUOTEBOOK_CONFIG`: optional JSON config file.
//! - `QUOTEBOOK_LOG_DIR`: absolute directory enabling file logs.

use quotebook_core::{
    core_version, default_log_level, init_logging_with, ping, CoreConfig, DisabledTransport,
    LoggingOptions, NoopEventSink, Quotebook, RecordDraft, SqliteStorage, SystemClock,
};
use std::process::ExitCode;
use std::sync::Arc;

const USAGE: &str = "usage: quotebook_cli <ping|version|list [category]|categories|random [category]|add <category> <text...>|export|import <file>|clear>";

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &[String]) -> Result<(), String> {
    let Some(command) = args.first().map(String::as_str) else {
        return Err(USAGE.to_string());
    };

    match command {
        "ping" => {
            println!("quotebook_core ping={}", ping());
            return Ok(());
        }
        "version" => {
            println!("quotebook_core version={}", core_version());
            return Ok(());
        }
        _ => {}
    }

    init_cli_logging()?;
    let mut book = open_book()?;
    let rest = &args[1..];

    match command {
        "list" => {
            for record in book.store().list_sorted_by_category(first(rest)) {
                println!("[{}] {} ({})", record.category, record.text, record.id);
            }
        }
        "categories" => {
            for category in book.store().categories() {
                println!("{category}");
            }
        }
        "random" => {
            let record = book.show_random(first(rest)).map_err(|err| err.to_string())?;
            match &record.author {
                Some(author) => println!("\"{}\" - {author} [{}]", record.text, record.category),
                None => println!("\"{}\" [{}]", record.text, record.category),
            }
        }
        "add" => {
            let [category, words @ ..] = rest else {
                return Err(USAGE.to_string());
            };
            let record = book
                .add(RecordDraft::new(words.join(" "), category.as_str()))
                .map_err(|err| err.to_string())?;
            println!("added id={}", record.id);
        }
        "export" => {
            let bytes = book.export().map_err(|err| err.to_string())?;
            println!("{}", String::from_utf8_lossy(&bytes));
        }
        "import" => {
            let path = first(rest).ok_or_else(|| USAGE.to_string())?;
            let bytes =
                std::fs::read(path).map_err(|err| format!("cannot read `{path}`: {err}"))?;
            let report = book.import(&bytes).map_err(|err| err.to_string())?;
            println!("imported accepted={} rejected={}", report.accepted, report.rejected);
        }
        "clear" => {
            book.clear_all_data();
            println!("cleared");
        }
        other => return Err(format!("unknown command `{other}`\n{USAGE}")),
    }

    book.shutdown();
    Ok(())
}

fn first(args: &[String]) -> Option<&str> {
    args.first().map(String::as_str)
}

fn init_cli_logging() -> Result<(), String> {
    let Ok(log_dir) = std::env::var("QUOTEBOOK_LOG_DIR") else {
        return Ok(());
    };
    let options = LoggingOptions::new(default_log_level(), log_dir).with_stderr_mirror();
    init_logging_with(&options).map_err(|err| err.to_string())
}

fn load_config() -> Result<CoreConfig, String> {
    match std::env::var("QUOTEBOOK_CONFIG") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path)
                .map_err(|err| format!("cannot read config `{path}`: {err}"))?;
            CoreConfig::from_json_str(&raw).map_err(|err| err.to_string())
        }
        Err(_) => Ok(CoreConfig::default()),
    }
}

fn open_book() -> Result<Quotebook<DisabledTransport>, String> {
    let config = load_config()?;
    let db_path = std::env::var("QUOTEBOOK_DB").unwrap_or_else(|_| "quotebook.db".to_string());

    let durable = SqliteStorage::open(&db_path).map_err(|err| err.to_string())?;
    let session = SqliteStorage::open(&db_path)
        .map_err(|err| err.to_string())?
        .with_scope("session");

    let (book, _report) = Quotebook::init(
        &config,
        Arc::new(durable),
        Arc::new(session),
        DisabledTransport,
        Arc::new(SystemClock),
        Arc::new(NoopEventSink),
    );
    Ok(book)
}
