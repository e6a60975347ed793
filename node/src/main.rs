use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, Command};
use config::{Config, File as ConfigFile};
use custcat_ai_core::{ArtifactDigests, FittedArtifacts};
use custcat_ai_service::PredictionService;
use custcat_rpc::{shutdown_signal, start_server, AppState, ServerConfig};
use custcat_storage::SledStorage;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::net::{IpAddr, TcpListener};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod version;

use version::{git_commit_hash, CUSTCAT_VERSION};

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone)]
struct AppConfig {
    config_path: Option<PathBuf>,

    // HTTP
    rpc_host: String,
    rpc_port: u16,
    rpc_allowed_origins: Vec<String>,
    max_in_flight: usize,
    max_body_bytes: usize,

    // Storage
    db_path: String,

    // Artifacts
    artifacts_dir: PathBuf,
    artifact_digests: ArtifactDigests,

    // Logging
    log_level: String,
    log_format: String,

    // Development
    dev_mode: bool,
}

impl AppConfig {
    fn load(config_path_override: Option<&str>) -> Result<Self> {
        let resolved_path = if let Some(path) = config_path_override {
            let path = PathBuf::from(path);
            if !path.exists() {
                anyhow::bail!(
                    "Configuration file {} not found (specified via --config)",
                    path.display()
                );
            }
            Some(path)
        } else {
            let path = PathBuf::from(DEFAULT_CONFIG_PATH);
            if path.exists() {
                Some(path)
            } else {
                None
            }
        };

        let mut builder = Config::builder();

        if let Some(path) = &resolved_path {
            builder = builder.add_source(ConfigFile::from(path.as_path()));
        }

        builder = builder.add_source(config::Environment::with_prefix("CUSTCAT"));

        let config = builder.build()?;

        let rpc_allowed_origins: Vec<String> =
            get_string_value(&config, &["rpc_allowed_origins", "rpc.allowed_origins"])
                .unwrap_or_else(|| "*".to_string())
                .split(',')
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .collect();

        Ok(Self {
            config_path: resolved_path,
            rpc_host: get_string_value(&config, &["rpc_host", "rpc.host"])
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            rpc_port: get_parsed_value(&config, &["rpc_port", "rpc.port"], 8000)?,
            rpc_allowed_origins,
            max_in_flight: get_parsed_value(
                &config,
                &["rpc_max_in_flight", "rpc.max_in_flight"],
                256,
            )?,
            max_body_bytes: get_parsed_value(
                &config,
                &["rpc_max_body_bytes", "rpc.max_body_bytes"],
                16 * 1024,
            )?,
            db_path: get_string_value(&config, &["db_path", "storage.db_path"])
                .unwrap_or_else(|| "./data/predictions".to_string()),
            artifacts_dir: get_string_value(&config, &["artifacts_dir", "artifacts.dir"])
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./artifacts")),
            artifact_digests: ArtifactDigests {
                scaler: get_string_value(
                    &config,
                    &["artifacts_scaler_blake3", "artifacts.scaler_blake3"],
                ),
                pca: get_string_value(&config, &["artifacts_pca_blake3", "artifacts.pca_blake3"]),
                knn: get_string_value(&config, &["artifacts_knn_blake3", "artifacts.knn_blake3"]),
            },
            log_level: get_string_value(&config, &["log_level", "logging.level"])
                .unwrap_or_else(|| "info".to_string()),
            log_format: get_string_value(&config, &["log_format", "logging.format"])
                .unwrap_or_else(|| "pretty".to_string()),
            dev_mode: get_bool_value(&config, &["dev_mode", "node.dev_mode"], false),
        })
    }

    fn validate(&self) -> Result<()> {
        if self.rpc_host.trim().is_empty() {
            anyhow::bail!("RPC_HOST must not be empty");
        }
        if self.rpc_port == 0 {
            anyhow::bail!("RPC_PORT must be greater than zero");
        }
        if self.max_in_flight == 0 {
            anyhow::bail!("RPC_MAX_IN_FLIGHT must be greater than zero");
        }
        if self.max_body_bytes == 0 {
            anyhow::bail!("RPC_MAX_BODY_BYTES must be greater than zero");
        }
        if self.db_path.trim().is_empty() {
            anyhow::bail!("DB_PATH must not be empty");
        }
        if !matches!(self.log_format.as_str(), "pretty" | "json") {
            anyhow::bail!(
                "Invalid LOG_FORMAT '{}'; expected 'pretty' or 'json'",
                self.log_format
            );
        }
        self.artifact_digests
            .validate()
            .map_err(|reason| anyhow::anyhow!("Invalid artifact digest: {reason}"))?;
        Ok(())
    }

    fn rpc_addr(&self) -> String {
        format!("{}:{}", self.rpc_host, self.rpc_port)
    }

    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            max_in_flight: self.max_in_flight,
            max_body_bytes: self.max_body_bytes,
            allowed_origins: self.rpc_allowed_origins.clone(),
        }
    }
}

fn get_string_value(config: &Config, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        config
            .get_string(key)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

fn get_parsed_value<T>(config: &Config, keys: &[&str], default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    for key in keys {
        if let Some(raw) = get_string_value(config, &[key]) {
            return raw
                .parse::<T>()
                .map_err(|err| anyhow::anyhow!("Invalid value '{raw}' for {key}: {err}"));
        }
    }
    Ok(default)
}

fn get_bool_value(config: &Config, keys: &[&str], default: bool) -> bool {
    for key in keys {
        if let Ok(value) = config.get_bool(key) {
            return value;
        }
        if let Ok(raw) = config.get_string(key) {
            if let Ok(parsed) = raw.parse::<bool>() {
                return parsed;
            }
        }
    }
    default
}

fn build_cli() -> Command {
    Command::new("custcat-node")
        .version(CUSTCAT_VERSION)
        .about("Customer category prediction service")
        .disable_version_flag(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path"),
        )
        .arg(
            Arg::new("rpc-host")
                .long("rpc-host")
                .value_name("HOST")
                .help("Override HTTP bind host"),
        )
        .arg(
            Arg::new("rpc-port")
                .long("rpc-port")
                .value_name("PORT")
                .value_parser(value_parser!(u16))
                .help("Override HTTP port"),
        )
        .arg(
            Arg::new("db-path")
                .long("db-path")
                .value_name("DIR")
                .help("Prediction store directory"),
        )
        .arg(
            Arg::new("artifacts-dir")
                .long("artifacts-dir")
                .value_name("DIR")
                .help("Directory holding scaler.json, pca.json and knn_model.json"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .help("Override the log level"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .value_parser(["pretty", "json"])
                .help("Select log output format"),
        )
        .arg(
            Arg::new("max-in-flight")
                .long("max-in-flight")
                .value_name("N")
                .value_parser(value_parser!(usize))
                .help("Maximum concurrently processed requests"),
        )
        .arg(
            Arg::new("dev")
                .long("dev")
                .action(ArgAction::SetTrue)
                .help("Run in development mode"),
        )
        .arg(
            Arg::new("check")
                .long("check")
                .action(ArgAction::SetTrue)
                .help("Validate configuration and artifacts, then exit"),
        )
        .arg(
            Arg::new("version_flag")
                .short('V')
                .long("version")
                .action(ArgAction::SetTrue)
                .help("Print detailed version information and exit"),
        )
}

fn load_config_with_overrides(matches: &clap::ArgMatches) -> Result<AppConfig> {
    let config_path = matches
        .get_one::<String>("config")
        .map(|value| value.as_str());
    let mut config = AppConfig::load(config_path)?;
    apply_overrides(matches, &mut config);
    config.validate()?;
    Ok(config)
}

fn apply_overrides(matches: &clap::ArgMatches, config: &mut AppConfig) {
    if let Some(rpc_host) = matches.get_one::<String>("rpc-host") {
        config.rpc_host = rpc_host.clone();
    }

    if let Some(rpc_port) = matches.get_one::<u16>("rpc-port") {
        config.rpc_port = *rpc_port;
    }

    if let Some(db_path) = matches.get_one::<String>("db-path") {
        config.db_path = db_path.clone();
    }

    if let Some(dir) = matches.get_one::<String>("artifacts-dir") {
        config.artifacts_dir = PathBuf::from(dir);
    }

    if let Some(log_level) = matches.get_one::<String>("log-level") {
        config.log_level = log_level.clone();
    }

    if let Some(log_format) = matches.get_one::<String>("log-format") {
        config.log_format = log_format.clone();
    }

    if let Some(max_in_flight) = matches.get_one::<usize>("max-in-flight") {
        config.max_in_flight = *max_in_flight;
    }

    if matches.get_flag("dev") {
        config.dev_mode = true;
        config.log_level = "debug".to_string();
        config.log_format = "pretty".to_string();
        if config.rpc_host == "127.0.0.1" {
            config.rpc_host = "0.0.0.0".to_string();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    if matches.get_flag("version_flag") {
        print_version_info();
        return Ok(());
    }

    let config = load_config_with_overrides(&matches)?;

    if matches.get_flag("check") {
        return run_self_check(&config);
    }

    init_logging(&config)?;

    info!("Starting custcat-node {}", CUSTCAT_VERSION);
    if let Some(path) = &config.config_path {
        info!("Config file: {}", path.display());
    } else {
        info!("Config file: (built-in defaults)");
    }
    info!("Development mode: {}", config.dev_mode);

    if !config.dev_mode {
        if let Ok(ip) = config.rpc_host.parse::<IpAddr>() {
            if ip.is_unspecified() {
                warn!(
                    "HTTP host {} binds to all interfaces outside dev mode; consider CUSTCAT_RPC_HOST=127.0.0.1 behind a reverse proxy",
                    config.rpc_host
                );
            }
        }
    }

    // Nothing is served unless every artifact loads and checks out.
    let artifacts =
        match FittedArtifacts::load_from_dir(&config.artifacts_dir, &config.artifact_digests) {
            Ok(artifacts) => artifacts,
            Err(err) => {
                error!("Failed to load fitted artifacts: {}", err);
                return Err(err).with_context(|| {
                    format!(
                        "cannot start without artifacts in {}",
                        config.artifacts_dir.display()
                    )
                });
            }
        };
    for source in &artifacts.sources {
        info!("Artifact {} blake3={}", source.path.display(), source.blake3);
    }

    if let Some(parent) = Path::new(&config.db_path).parent() {
        fs::create_dir_all(parent)?;
    }
    let storage = Arc::new(
        SledStorage::new(&config.db_path)
            .with_context(|| format!("failed to open prediction store at {}", config.db_path))?,
    );
    info!("Prediction store: {}", config.db_path);

    let service = PredictionService::from_artifacts(&artifacts, storage.clone());
    let state = AppState::new(service, config.server_config());

    start_server(state, &config.rpc_addr(), shutdown_signal()).await?;

    storage.flush()?;
    info!("custcat-node shutdown complete");
    Ok(())
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    Ok(())
}

fn print_version_info() {
    println!("custcat-node {} (commit {})", CUSTCAT_VERSION, git_commit_hash());
}

fn run_self_check(config: &AppConfig) -> Result<()> {
    println!("Running custcat-node self-check...");
    let mut issues = Vec::new();

    if let Err(err) = ensure_port_available(&config.rpc_host, config.rpc_port) {
        issues.push(err);
    }

    if let Err(err) = ensure_storage_directory(&config.db_path) {
        issues.push(err);
    }

    match FittedArtifacts::load_from_dir(&config.artifacts_dir, &config.artifact_digests) {
        Ok(artifacts) => {
            for source in &artifacts.sources {
                println!("  {} blake3={}", source.path.display(), source.blake3);
            }
        }
        Err(err) => issues.push(format!("Artifacts: {err}")),
    }

    if issues.is_empty() {
        println!("OK");
        Ok(())
    } else {
        for issue in &issues {
            eprintln!("- {issue}");
        }
        anyhow::bail!("self-check failed")
    }
}

fn ensure_port_available(host: &str, port: u16) -> Result<(), String> {
    let addr = format!("{host}:{port}");
    match TcpListener::bind(&addr) {
        Ok(listener) => drop(listener),
        Err(err) => {
            return Err(format!(
                "HTTP port {addr} is not available for binding: {err}"
            ))
        }
    }
    Ok(())
}

/// The store directory's parent must exist (or be creatable) and be writable.
fn ensure_storage_directory(db_path: &str) -> Result<(), String> {
    let dir = match Path::new(db_path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)
        .map_err(|err| format!("Unable to create {}: {}", dir.display(), err))?;

    let sentinel = dir.join(".custcat_write_test");
    match OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&sentinel)
    {
        Ok(mut file) => {
            if let Err(err) = file.write_all(b"ok") {
                return Err(format!("Unable to write into {}: {}", dir.display(), err));
            }
        }
        Err(err) => {
            return Err(format!(
                "Unable to open {} for writing: {}",
                dir.display(),
                err
            ));
        }
    }
    let _ = fs::remove_file(&sentinel);
    Ok(())
}
