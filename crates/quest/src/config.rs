use anyhow::anyhow;
use clap::{Parser, Subcommand};
use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{
    env,
    fs::{self, File},
    io::{Read, Write},
    path::PathBuf,
    time::Duration,
};
use time::{format_description::well_known::Iso8601, OffsetDateTime};
use uuid::Uuid;

use crate::infra::location::{Accuracy, WatchOptions};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to Settings.toml file holding configuration options
    #[arg(short, long)]
    pub config: Option<String>,

    /// Log level to run with the service (default: info)
    #[arg(short, long)]
    pub level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// Join an event, quests are tracked for this participant afterwards
    Join {
        #[arg(long)]
        event_id: Uuid,
        #[arg(long)]
        event_name: String,
        #[arg(long)]
        participant_id: Uuid,
        /// RFC 3339 start of the event
        #[arg(long)]
        starts_at: Option<String>,
        /// RFC 3339 end of the event
        #[arg(long)]
        ends_at: Option<String>,
    },
    /// Track a quest along a recorded route until it completes or the route ends
    Run {
        /// Quest definition as JSON
        #[arg(long)]
        quest: PathBuf,
        /// Recorded location track as JSON
        #[arg(long)]
        track: PathBuf,
        /// Photo submitted once the participant is in range
        #[arg(long)]
        photo: Option<PathBuf>,
    },
    /// Show completed quests and the point total
    Status,
    /// Leave the current event, wiping local quest data
    Leave,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Settings {
    pub config: Option<String>,
    pub level: Option<String>,
    pub db_settings: DBSettings,
    pub verifier_settings: VerifierSettings,
    pub tracker_settings: TrackerSettings,
}

impl ConfigurableSettings for Settings {
    fn apply_cli_overrides(&mut self, cli_settings: &CliSettings) {
        if let Some(level) = &cli_settings.level {
            self.level = Some(level.clone());
        }
        if let Some(config) = &cli_settings.config {
            self.config = Some(config.clone());
        }
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("./config/local.toml")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DBSettings {
    pub data_folder: String,
    pub read_max_connections: u32,
    pub write_max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub sqlite_config: SqliteConfigSerde,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SqliteConfigSerde {
    pub mode: String,
    pub busy_timeout_ms: u32,
    pub journal_mode: String,
    pub synchronous: String,
    pub cache_size: i32,
}

impl Default for DBSettings {
    fn default() -> Self {
        DBSettings {
            data_folder: String::from("./data"),
            read_max_connections: 4,
            write_max_connections: 1,
            acquire_timeout_secs: 15,
            sqlite_config: SqliteConfigSerde::default(),
        }
    }
}

impl Default for SqliteConfigSerde {
    fn default() -> Self {
        Self {
            mode: "ReadWriteCreate".to_string(),
            busy_timeout_ms: 5000,
            journal_mode: "WAL".to_string(),
            synchronous: "NORMAL".to_string(),
            cache_size: 10000,
        }
    }
}

impl SqliteConfigSerde {
    pub fn testing() -> Self {
        Self {
            mode: "Memory".to_string(),
            journal_mode: "MEMORY".to_string(),
            synchronous: "OFF".to_string(),
            busy_timeout_ms: 1000,
            cache_size: 2000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifierSettings {
    /// Base url of the backend hosting the verify-quest-photo function
    pub base_url: String,
    /// File holding the api key sent as a bearer token
    pub api_key_file: String,
    /// Use the in-memory classifier instead of calling the backend
    pub mock_enabled: bool,
    /// Reason returned by the mock classifier, None means it approves every photo
    pub mock_reject_reason: Option<String>,
    /// Artificial latency for the mock classifier
    pub mock_delay_ms: Option<u64>,
    /// Retries on transient transport errors before giving up
    pub max_retries: u32,
}

impl Default for VerifierSettings {
    fn default() -> Self {
        VerifierSettings {
            base_url: String::from("http://127.0.0.1:54321"),
            api_key_file: String::from("./creds/verifier_api_key"),
            mock_enabled: false,
            mock_reject_reason: None,
            mock_delay_ms: Some(500),
            max_retries: 3,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrackerSettings {
    pub accuracy: Accuracy,
    /// Minimum time between two samples
    pub min_interval_ms: u64,
    /// Minimum movement between two samples, whichever threshold hits first wins
    pub min_displacement_meters: f64,
    /// Divides the recorded offsets of a replayed track
    pub replay_speedup: u32,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        TrackerSettings {
            accuracy: Accuracy::Balanced,
            min_interval_ms: 5000,
            min_displacement_meters: 10.0,
            replay_speedup: 10,
        }
    }
}

impl From<&TrackerSettings> for WatchOptions {
    fn from(settings: &TrackerSettings) -> Self {
        WatchOptions {
            accuracy: settings.accuracy,
            min_interval: Duration::from_millis(settings.min_interval_ms),
            min_displacement_meters: settings.min_displacement_meters,
        }
    }
}

pub fn get_settings() -> Result<(Settings, Command), anyhow::Error> {
    let cli = Cli::parse();
    let command = cli.command.clone();
    let settings = get_settings_with_cli(cli.into())?;
    Ok((settings, command))
}

pub struct CliSettings {
    pub config: Option<String>,
    pub level: Option<String>,
}

impl From<Cli> for CliSettings {
    fn from(cli: Cli) -> Self {
        Self {
            config: cli.config,
            level: cli.level,
        }
    }
}

pub trait ConfigurableSettings: Serialize + for<'de> Deserialize<'de> + Default {
    /// Apply CLI settings after loading from file
    fn apply_cli_overrides(&mut self, cli_settings: &CliSettings);

    /// Get the default config file path
    fn default_config_path() -> PathBuf {
        PathBuf::from("./config/settings.toml")
    }

    /// Get the config directory path
    fn config_directory() -> PathBuf {
        PathBuf::from("./config")
    }
}

pub fn get_settings_with_cli<T: ConfigurableSettings>(
    cli_settings: CliSettings,
) -> Result<T, anyhow::Error> {
    let mut settings = if let Some(config_path) = cli_settings.config.clone() {
        let path = PathBuf::from(config_path);

        let absolute_path = if path.is_absolute() {
            path
        } else {
            env::current_dir()?.join(path)
        };

        match File::open(absolute_path) {
            Ok(mut file) => {
                let mut content = String::new();
                file.read_to_string(&mut content)
                    .map_err(|e| anyhow!("Failed to read config: {}", e))?;
                toml::from_str(&content)
                    .map_err(|e| anyhow!("Failed to map config to settings: {}", e))?
            }
            Err(err) => return Err(anyhow!("Failed to find file: {}", err)),
        }
    } else {
        let default_path = T::default_config_path();
        match File::open(&default_path) {
            Ok(mut file) => {
                let mut content = String::new();
                file.read_to_string(&mut content)
                    .map_err(|e| anyhow!("Failed to read default config: {}", e))?;
                toml::from_str(&content)
                    .map_err(|e| anyhow!("Failed to parse default config: {}", e))?
            }
            Err(_) => {
                let default_settings = T::default();

                fs::create_dir_all(T::config_directory())
                    .map_err(|e| anyhow!("Failed to create config directory: {}", e))?;

                let toml_content = toml::to_string(&default_settings)
                    .map_err(|e| anyhow!("Failed to serialize default settings: {}", e))?;

                let mut file = fs::File::create(&default_path)
                    .map_err(|e| anyhow!("Failed to create config file: {}", e))?;
                file.write_all(toml_content.as_bytes())
                    .map_err(|e| anyhow!("Failed to write default config: {}", e))?;

                default_settings
            }
        }
    };

    settings.apply_cli_overrides(&cli_settings);

    Ok(settings)
}

pub fn setup_logger(
    level: Option<String>,
    filter_targets: Vec<String>,
) -> Result<(), fern::InitError> {
    let rust_log = get_log_level(level);
    let colors = ColoredLevelConfig::new()
        .trace(Color::White)
        .debug(Color::Cyan)
        .info(Color::Blue)
        .warn(Color::Yellow)
        .error(Color::Magenta);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            let timestamp = OffsetDateTime::now_utc()
                .format(&Iso8601::DEFAULT)
                .unwrap_or_default();
            out.finish(format_args!(
                "[{} {}] {}: {}",
                timestamp,
                colors.color(record.level()),
                record.target(),
                message
            ));
        })
        .level(rust_log)
        .filter(move |metadata| {
            !filter_targets
                .iter()
                .any(|filter| metadata.target().starts_with(filter))
        })
        .chain(std::io::stderr())
        .apply()?;
    Ok(())
}

pub fn get_log_level(level: Option<String>) -> LevelFilter {
    let level = level
        .or_else(|| env::var("RUST_LOG").ok())
        .unwrap_or_default();
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}
