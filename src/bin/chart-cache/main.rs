mod logging;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use chart_cache::store::{CleanupOptions, SaveFailure};
use chart_cache::{BirthRecord, Config, Lookup, SessionStore, ValidationError};

/// CLI-specific errors.
#[derive(Error, Debug)]
pub enum AppError {
    /// Library error (wraps all chart_cache errors)
    #[error(transparent)]
    Library(#[from] chart_cache::Error),

    /// Best-effort save that did not happen
    #[error(transparent)]
    Save(#[from] SaveFailure),

    /// Logging setup failed
    #[error(transparent)]
    Logging(#[from] logging::LoggingError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Input was not JSON
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Birth record failed validation
    #[error("invalid birth record: {0}")]
    InvalidRecord(#[from] ValidationError),

    #[error("expected a JSON object")]
    NotAnObject,

    #[error("either a JSON argument or --file must be given")]
    MissingInput,

    /// Nothing to print
    #[error("{0}")]
    NotFound(String),

    #[error("storage is not available")]
    Unavailable,

    #[error("integrity check found {0} issue(s)")]
    Unhealthy(usize),
}

impl From<chart_cache::ConfigError> for AppError {
    fn from(e: chart_cache::ConfigError) -> Self {
        Self::Library(e.into())
    }
}

impl From<chart_cache::StorageError> for AppError {
    fn from(e: chart_cache::StorageError) -> Self {
        Self::Library(e.into())
    }
}

#[derive(Parser)]
#[command(name = "chart-cache")]
#[command(about = "Inspect and manage the chart cache: birth data, chart ids and session payloads")]
struct Cli {
    /// Store path (overrides storage.path from the config file)
    #[arg(long, global = true, env = "CHART_CACHE_PATH")]
    path: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true, env = "CHART_CACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter (overrides logging.level from the config file)
    #[arg(long, global = true, env = "CHART_CACHE_LOG")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and store a birth record
    SetBirth {
        /// Birth record as JSON
        json: Option<String>,

        /// Read the birth record from a file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Print the current birth record and its metadata
    GetBirth,

    /// Print the metadata of the current record
    Meta,

    /// Store the chart id for the current record
    SetChartId {
        /// Chart id
        chart_id: String,
    },

    /// Print the chart id for the current record
    GetChartId,

    /// Remove the birth record, chart id and legacy keys
    Clear,

    /// Remove everything the store owns, preferences included
    ClearAll,

    /// Merge a JSON object into the session record
    SaveSession {
        /// Session fields as a JSON object
        json: Option<String>,

        /// Read the session fields from a file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Print the session record, preferences and current birth record
    LoadSession,

    /// Store a preference
    SetPref {
        /// Preference name
        name: String,

        /// Preference value as JSON
        value: String,
    },

    /// Print a preference
    GetPref {
        /// Preference name
        name: String,
    },

    /// Print a diagnostic snapshot of both scopes
    Diagnostics,

    /// Check stored state for anything a read would reject
    Verify,

    /// Remove stale and unrecognized data
    Cleanup {
        /// Remove preference entries past their maximum age
        #[arg(long)]
        expired_preferences: bool,

        /// Remove keys that belong to no known layout
        #[arg(long)]
        unrecognized: bool,

        /// Clear an expired or corrupt birth record
        #[arg(long)]
        stale_envelope: bool,

        /// Enable every purge
        #[arg(long)]
        all: bool,

        /// Report without removing anything
        #[arg(long)]
        dry_run: bool,
    },
}

/// Format an error for user-friendly display
fn format_error(err: &AppError) -> String {
    use std::io::IsTerminal;

    let use_colors = std::io::stderr().is_terminal();

    let (red, yellow, reset) = if use_colors {
        ("\x1b[0;31m", "\x1b[0;33m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    let mut output = format!("{red}Error:{reset} {err}\n");

    if let Some(hint) = get_error_hint(err) {
        output.push_str(&format!("{yellow}Hint:{reset} {hint}\n"));
    }

    output
}

/// Get a helpful hint for common errors
fn get_error_hint(err: &AppError) -> Option<&'static str> {
    match err {
        AppError::Library(e) if e.is_quota_exceeded() => {
            Some("Run 'chart-cache cleanup --all' to free space")
        }
        AppError::Library(chart_cache::Error::Config(_)) => {
            Some("Check the TOML file passed with --config")
        }
        AppError::InvalidRecord(_) => Some(
            "Required fields: dateOfBirth, timeOfBirth, latitude (-90..90), longitude (-180..180), timezone",
        ),
        AppError::Json(_) | AppError::NotAnObject => {
            Some("Quote the JSON argument for your shell, e.g. '{\"theme\": \"dark\"}'")
        }
        AppError::MissingInput => Some("Pass the JSON inline or use --file path.json"),
        AppError::NotFound(_) => Some("Run 'chart-cache set-birth <JSON>' to store a record"),
        AppError::Save(SaveFailure::QuotaExceeded { .. }) => {
            Some("Run 'chart-cache cleanup --all' to free space")
        }
        AppError::Unhealthy(_) => {
            Some("Run 'chart-cache cleanup --stale-envelope' to discard unreadable state")
        }
        _ => None,
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        eprint!("{}", format_error(&err));
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), AppError> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    logging::init(&config.logging)?;

    let path = cli.path.unwrap_or_else(|| config.storage.path.clone());
    let store = SessionStore::open(&path, config.store.clone())?;
    execute(cli.command, &store, &path)
}

/// Run one command against an open store.
fn execute(command: Commands, store: &SessionStore, path: &Path) -> Result<(), AppError> {
    match command {
        Commands::SetBirth { json, file } => {
            let candidate = read_json_input(json, file.as_deref())?;
            let record = BirthRecord::from_value(&candidate)?;
            if !store.set_birth_record(&record)? {
                return Err(AppError::Unavailable);
            }
            let meta = store
                .get_meta()
                .ok_or_else(|| AppError::NotFound("record was not readable after write".into()))?;
            println!(
                "Stored birth record {} at {}",
                meta.fingerprint, meta.saved_at_iso
            );
            Ok(())
        }
        Commands::GetBirth => {
            let envelope = found(store.lookup_birth_data())?;
            print_json(&envelope)
        }
        Commands::Meta => {
            let envelope = found(store.lookup_birth_data())?;
            print_json(&envelope.meta)
        }
        Commands::SetChartId { chart_id } => {
            if !store.set_chart_id(&chart_id)? {
                return Err(AppError::NotFound("chart id must not be empty".into()));
            }
            println!("Stored chart id {}", chart_id.trim());
            Ok(())
        }
        Commands::GetChartId => {
            let chart_id = store
                .get_chart_id()
                .ok_or_else(|| AppError::NotFound("no fresh chart id stored".into()))?;
            println!("{chart_id}");
            Ok(())
        }
        Commands::Clear => {
            store.clear();
            println!("Cleared birth record and chart id");
            Ok(())
        }
        Commands::ClearAll => {
            store.clear_all();
            println!("Cleared all stored data at {}", path.display());
            Ok(())
        }
        Commands::SaveSession { json, file } => {
            let Value::Object(fields) = read_json_input(json, file.as_deref())? else {
                return Err(AppError::NotAnObject);
            };
            let saved = store.save_session(fields)?;
            println!("Saved session {} at {}", saved.session_id, saved.saved_at);
            Ok(())
        }
        Commands::LoadSession => print_json(&store.load_session()),
        Commands::SetPref { name, value } => {
            let value: Value = serde_json::from_str(&value)?;
            store.set_preference(&name, value)?;
            println!("Stored preference '{name}'");
            Ok(())
        }
        Commands::GetPref { name } => {
            let value = store
                .get_preference(&name)
                .ok_or_else(|| AppError::NotFound(format!("preference '{name}' not set")))?;
            print_json(&value)
        }
        Commands::Diagnostics => print_json(&store.get_diagnostics()),
        Commands::Verify => {
            let report = store.verify_storage_integrity();
            if report.is_healthy() {
                println!("OK");
                return Ok(());
            }
            for issue in &report.issues {
                println!("- {issue}");
            }
            Err(AppError::Unhealthy(report.issues.len()))
        }
        Commands::Cleanup {
            expired_preferences,
            unrecognized,
            stale_envelope,
            all,
            dry_run,
        } => {
            let options = CleanupOptions {
                purge_expired_preferences: all || expired_preferences,
                purge_unrecognized: all || unrecognized,
                purge_stale_envelope: all || stale_envelope,
                dry_run,
            };
            print_json(&store.run_storage_cleanup(options))
        }
    }
}

/// Inline JSON wins over `--file`.
fn read_json_input(inline: Option<String>, file: Option<&Path>) -> Result<Value, AppError> {
    let raw = match (inline, file) {
        (Some(raw), _) => raw,
        (None, Some(path)) => std::fs::read_to_string(path)?,
        (None, None) => return Err(AppError::MissingInput),
    };
    Ok(serde_json::from_str(&raw)?)
}

fn found(lookup: Lookup) -> Result<chart_cache::Envelope, AppError> {
    match lookup {
        Lookup::Found(envelope) => Ok(envelope),
        Lookup::Absent => Err(AppError::NotFound("no birth record stored".into())),
        Lookup::Expired { age } => Err(AppError::NotFound(format!(
            "birth record was {}s old, past its TTL, and was cleared",
            age.as_secs()
        ))),
        Lookup::SchemaMismatch { stored } => Err(AppError::NotFound(format!(
            "birth record had schema '{stored}' and was cleared"
        ))),
        Lookup::Corrupt { key, reason } => Err(AppError::NotFound(format!(
            "'{key}' was corrupt ({reason}); birth record cleared"
        ))),
        Lookup::Unavailable => Err(AppError::Unavailable),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use clap::CommandFactory;
    use tempfile::TempDir;

    use chart_cache::store::IntegrityIssue;
    use chart_cache::{StorageScope, StoreConfig};

    use super::*;

    const MUMBAI: &str = r#"{"name":"Test Person","dateOfBirth":"1990-01-01","timeOfBirth":"12:00","latitude":19.076,"longitude":72.8777,"timezone":"Asia/Kolkata"}"#;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("chart-cache").chain(args.iter().copied())).unwrap()
    }

    fn open(dir: &TempDir) -> SessionStore {
        SessionStore::open(dir.path(), StoreConfig::default()).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_set_birth_then_chart_id() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        let cli = parse(&["--path", "ignored", "set-birth", MUMBAI]);
        assert_eq!(cli.path.as_deref(), Some(Path::new("ignored")));
        execute(cli.command, &store, dir.path()).unwrap();
        assert_eq!(
            store.get_birth_data().unwrap().data.display_name(),
            "Test Person"
        );

        let err = execute(parse(&["get-chart-id"]).command, &store, dir.path()).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        execute(parse(&["set-chart-id", "chart_7"]).command, &store, dir.path()).unwrap();
        assert_eq!(store.get_chart_id().as_deref(), Some("chart_7"));
        execute(parse(&["get-chart-id"]).command, &store, dir.path()).unwrap();

        execute(parse(&["clear"]).command, &store, dir.path()).unwrap();
        assert_eq!(store.get_birth_data(), None);
    }

    #[test]
    fn test_set_birth_from_file() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let file = dir.path().join("birth.json");
        std::fs::write(&file, MUMBAI).unwrap();

        let file_arg = file.to_str().unwrap();
        execute(parse(&["set-birth", "--file", file_arg]).command, &store, dir.path()).unwrap();
        assert!(store.get_birth_data().is_some());
    }

    #[test]
    fn test_input_errors() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        let err = execute(parse(&["set-birth"]).command, &store, dir.path()).unwrap_err();
        assert!(matches!(err, AppError::MissingInput));
        assert!(get_error_hint(&err).is_some());

        let err = execute(parse(&["set-birth", "{}"]).command, &store, dir.path()).unwrap_err();
        assert!(matches!(err, AppError::InvalidRecord(_)));

        let err = execute(parse(&["save-session", "[1, 2]"]).command, &store, dir.path()).unwrap_err();
        assert!(matches!(err, AppError::NotAnObject));

        let err = execute(parse(&["set-pref", "theme", "dark"]).command, &store, dir.path()).unwrap_err();
        assert!(matches!(err, AppError::Json(_)));
    }

    #[test]
    fn test_preferences_and_session() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        execute(parse(&["set-pref", "theme", r#""dark""#]).command, &store, dir.path()).unwrap();
        assert_eq!(store.get_preference("theme"), Some(serde_json::json!("dark")));
        execute(parse(&["get-pref", "theme"]).command, &store, dir.path()).unwrap();

        execute(
            parse(&["save-session", r#"{"step": 2}"#]).command,
            &store,
            dir.path(),
        )
        .unwrap();
        assert_eq!(store.session_record().unwrap()["step"], 2);

        execute(parse(&["clear-all"]).command, &store, dir.path()).unwrap();
        assert_eq!(store.get_preference("theme"), None);
    }

    #[test]
    fn test_verify_reports_orphan_chart_id() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        execute(parse(&["verify"]).command, &store, dir.path()).unwrap();

        store.set_chart_id("chart_without_record").unwrap();
        assert_eq!(
            store.verify_storage_integrity().issues,
            vec![IntegrityIssue::OrphanChartId]
        );
        let err = execute(parse(&["verify"]).command, &store, dir.path()).unwrap_err();
        assert!(matches!(err, AppError::Unhealthy(1)));
    }

    #[test]
    fn test_cleanup_flags() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store.session_scope().set("widget-state", "1").unwrap();

        execute(
            parse(&["cleanup", "--all", "--dry-run"]).command,
            &store,
            dir.path(),
        )
        .unwrap();
        assert!(store.session_scope().contains("widget-state").unwrap());

        execute(parse(&["cleanup", "--unrecognized"]).command, &store, dir.path()).unwrap();
        assert!(!store.session_scope().contains("widget-state").unwrap());
    }
}
