use crate::services::path_sanitizer::PathPolicy;
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, fmt, path::PathBuf};

pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

const ENV_HOST: &str = "BLOB_BUNNY_HOST";
const ENV_PORT: &str = "BLOB_BUNNY_PORT";
const ENV_DATA_DIR: &str = "BLOB_BUNNY_DATA_DIR";
const ENV_DATABASE_URL: &str = "BLOB_BUNNY_DATABASE_URL";
const ENV_API_TOKEN: &str = "BLOB_BUNNY_API_TOKEN";
const ENV_MAX_FILE_SIZE: &str = "BLOB_BUNNY_MAX_FILE_SIZE";
const ENV_REQUIRE_EXTENSION: &str = "BLOB_BUNNY_REQUIRE_EXTENSION";
const ENV_ALLOW_HIDDEN: &str = "BLOB_BUNNY_ALLOW_HIDDEN";

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Absolute directory blob content is written under.
    pub data_dir: PathBuf,
    pub database_url: String,
    pub api_token: String,
    pub max_file_size: u64,
    pub path_policy: PathPolicy,
}

// Hand-written so the token never reaches the logs.
impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("data_dir", &self.data_dir)
            .field("database_url", &self.database_url)
            .field("api_token", &"<redacted>")
            .field("max_file_size", &self.max_file_size)
            .field("path_policy", &self.path_policy)
            .finish()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Minimal blob storage over HTTP")]
pub struct Args {
    /// Host to bind to (overrides BLOB_BUNNY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides BLOB_BUNNY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where blob content is stored (overrides BLOB_BUNNY_DATA_DIR)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Database URL (overrides BLOB_BUNNY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Maximum upload size in bytes (overrides BLOB_BUNNY_MAX_FILE_SIZE)
    #[arg(long)]
    pub max_file_size: Option<String>,

    /// Accept pathnames without a file extension
    #[arg(long)]
    pub allow_no_extension: bool,

    /// Accept path segments starting with `.`
    #[arg(long)]
    pub allow_hidden: bool,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::from_sources(args, |key| env::var(key).ok())?;
        Ok((cfg, migrate))
    }

    /// Merge `args` over values looked up with `env`, over defaults.
    pub fn from_sources(args: Args, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = args
            .host
            .or_else(|| env(ENV_HOST))
            .unwrap_or_else(|| "0.0.0.0".into());

        let port = match args.port {
            Some(port) => port,
            None => match env(ENV_PORT) {
                Some(value) => value
                    .parse::<u16>()
                    .with_context(|| format!("parsing {} value `{}`", ENV_PORT, value))?,
                None => 3000,
            },
        };

        let data_dir = args
            .data_dir
            .or_else(|| non_blank(env(ENV_DATA_DIR)).map(PathBuf::from))
            .with_context(|| format!("{} environment variable is not set", ENV_DATA_DIR))?;
        let data_dir = std::path::absolute(&data_dir)
            .with_context(|| format!("resolving data directory {}", data_dir.display()))?;

        let database_url = args
            .database_url
            .or_else(|| env(ENV_DATABASE_URL))
            .unwrap_or_else(|| "sqlite://blobs.db".into());

        let Some(api_token) = non_blank(env(ENV_API_TOKEN)) else {
            bail!("{} environment variable is not set", ENV_API_TOKEN);
        };

        let max_file_size = match args.max_file_size.or_else(|| env(ENV_MAX_FILE_SIZE)) {
            Some(raw) => parse_max_file_size(&raw)?,
            None => DEFAULT_MAX_FILE_SIZE,
        };

        let require_extension = if args.allow_no_extension {
            false
        } else {
            parse_flag(ENV_REQUIRE_EXTENSION, env(ENV_REQUIRE_EXTENSION), true)?
        };
        let allow_hidden_segments =
            args.allow_hidden || parse_flag(ENV_ALLOW_HIDDEN, env(ENV_ALLOW_HIDDEN), false)?;

        Ok(Self {
            host,
            port,
            data_dir,
            database_url,
            api_token: api_token.trim().to_string(),
            max_file_size,
            path_policy: PathPolicy {
                require_extension,
                allow_hidden_segments,
                ..PathPolicy::default()
            },
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_max_file_size(raw: &str) -> Result<u64> {
    match raw.trim().parse::<u64>() {
        Ok(size) if size > 0 => Ok(size),
        _ => bail!(
            "{} must be a positive number of bytes, got `{}`",
            ENV_MAX_FILE_SIZE,
            raw
        ),
    }
}

fn parse_flag(key: &str, value: Option<String>, default: bool) -> Result<bool> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        "" => Ok(default),
        other => bail!("{} must be a boolean, got `{}`", key, other),
    }
}
