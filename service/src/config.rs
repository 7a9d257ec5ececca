use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Master secret used only when running in development without an explicit one.
const DEVELOPMENT_MASTER_SECRET: &str = "development-only-master-secret-change-me";

#[derive(Clone, Debug, PartialEq)]
pub enum RustEnv {
    Development,
    Production,
    Staging,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RustEnvParseError;

impl FromStr for RustEnv {
    type Err = RustEnvParseError;
    fn from_str(level: &str) -> Result<RustEnv, Self::Err> {
        match level.to_lowercase().as_str() {
            "development" => Ok(RustEnv::Development),
            "production" => Ok(RustEnv::Production),
            "staging" => Ok(RustEnv::Staging),
            _ => Err(RustEnvParseError),
        }
    }
}

impl fmt::Display for RustEnv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RustEnv::Development => write!(f, "development"),
            RustEnv::Production => write!(f, "production"),
            RustEnv::Staging => write!(f, "staging"),
        }
    }
}

/// Which backend holds the shared keyed state and carries the event stream.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreBackend {
    /// Shared Redis instance; required for multi-instance deployments.
    Redis,
    /// In-process state; single instance only.
    Memory,
}

#[derive(Debug, PartialEq, Eq)]
pub struct StoreBackendParseError;

impl FromStr for StoreBackend {
    type Err = StoreBackendParseError;
    fn from_str(backend: &str) -> Result<StoreBackend, Self::Err> {
        match backend.to_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(StoreBackendParseError),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StoreBackend::Redis => write!(f, "redis"),
            StoreBackend::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// A list of full CORS origin URLs that allowed to receive server responses.
    #[arg(
        long,
        env,
        value_delimiter = ',',
        use_value_delimiter = true,
        default_value = "http://localhost:3000,https://localhost:3000"
    )]
    pub allowed_origins: Vec<String>,

    /// Redis URL holding credential state and carrying the cross-instance event stream
    #[arg(long, env, default_value = "redis://127.0.0.1:6379")]
    redis_url: Option<String>,

    /// Backend for shared state and events: `redis` or `memory` (single instance only)
    #[arg(
        long,
        env,
        default_value_t = StoreBackend::Redis,
        value_parser = clap::builder::PossibleValuesParser::new(["redis", "memory", "REDIS", "MEMORY"])
            .map(|s| s.parse::<StoreBackend>().unwrap()),
    )]
    pub store_backend: StoreBackend,

    /// Master secret from which the credential signing key is derived
    #[arg(long, env)]
    credential_master_secret: Option<String>,

    /// Seconds an issued attendance credential stays valid
    #[arg(long, env, default_value_t = 900)]
    pub credential_ttl_secs: u64,

    /// Seconds a credential timestamp may lie in the future
    #[arg(long, env, default_value_t = 60)]
    pub credential_clock_skew_secs: u64,

    /// Validation attempts allowed per subject per minute
    #[arg(long, env, default_value_t = 5)]
    pub credential_rate_limit_per_minute: u64,

    /// Seconds a per-subject secret lives before it is lazily regenerated
    #[arg(long, env, default_value_t = 2_592_000)]
    pub subject_secret_ttl_secs: u64,

    /// Extra seconds a revoked signature stays blacklisted past its credential's expiry
    #[arg(long, env, default_value_t = 300)]
    pub blacklist_margin_secs: u64,

    /// Maximum number of live sessions held by this instance
    #[arg(long, env, default_value_t = 5000)]
    pub max_sessions: usize,

    /// Maximum number of live sessions a single owner may hold
    #[arg(long, env, default_value_t = 3)]
    pub max_sessions_per_owner: usize,

    /// Messages buffered per session before new messages are dropped
    #[arg(long, env, default_value_t = 64)]
    pub session_queue_capacity: usize,

    /// Seconds without client activity before a session is reclaimed
    #[arg(long, env, default_value_t = 600)]
    pub session_idle_timeout_secs: u64,

    /// Seconds between idle session sweeps
    #[arg(long, env, default_value_t = 60)]
    pub session_cleanup_interval_secs: u64,

    /// Seconds between event bus liveness probes
    #[arg(long, env, default_value_t = 30)]
    pub bus_health_check_interval_secs: u64,

    /// Seconds to wait before re-subscribing a pattern whose stream was lost
    #[arg(long, env, default_value_t = 2)]
    pub bus_resubscribe_backoff_secs: u64,

    /// Tag stamped on every published event; a random one is generated when absent
    #[arg(long, env)]
    instance_id: Option<String>,

    /// The host interface to listen for incoming connections
    #[arg(short, long, env, default_value = "127.0.0.1")]
    pub interface: Option<String>,

    /// The host TCP port to listen for incoming connections
    #[arg(short, long, env, default_value_t = 4000)]
    pub port: u16,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,

    /// Set the Rust runtime environment to use.
    #[arg(
    short,
    long,
    env,
    default_value_t = RustEnv::Development,
    value_parser = clap::builder::PossibleValuesParser::new([
        "DEVELOPMENT", "PRODUCTION", "STAGING",
        "development", "production", "staging"
    ])
        .map(|s| s.parse::<RustEnv>().unwrap()),
    )]
    pub runtime_env: RustEnv,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        let mut config = Config::parse();
        if config.instance_id.is_none() {
            config.instance_id = Some(uuid::Uuid::new_v4().to_string());
        }
        config
    }

    pub fn redis_url(&self) -> &str {
        self.redis_url.as_deref().unwrap_or("redis://127.0.0.1:6379")
    }

    /// Returns the configured master secret. Outside production and staging a
    /// fixed development secret is used when none was provided.
    pub fn credential_master_secret(&self) -> Option<String> {
        match (&self.credential_master_secret, self.runtime_env()) {
            (Some(secret), _) => Some(secret.clone()),
            (None, RustEnv::Development) => Some(DEVELOPMENT_MASTER_SECRET.to_string()),
            (None, _) => None,
        }
    }

    pub fn instance_id(&self) -> &str {
        self.instance_id.as_deref().unwrap_or("unknown-instance")
    }

    pub fn credential_ttl(&self) -> Duration {
        Duration::from_secs(self.credential_ttl_secs)
    }

    pub fn credential_clock_skew(&self) -> Duration {
        Duration::from_secs(self.credential_clock_skew_secs)
    }

    pub fn subject_secret_ttl(&self) -> Duration {
        Duration::from_secs(self.subject_secret_ttl_secs)
    }

    pub fn blacklist_margin(&self) -> Duration {
        Duration::from_secs(self.blacklist_margin_secs)
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }

    pub fn session_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.session_cleanup_interval_secs)
    }

    pub fn bus_health_check_interval(&self) -> Duration {
        Duration::from_secs(self.bus_health_check_interval_secs)
    }

    pub fn bus_resubscribe_backoff(&self) -> Duration {
        Duration::from_secs(self.bus_resubscribe_backoff_secs)
    }

    pub fn runtime_env(&self) -> RustEnv {
        self.runtime_env.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["attendance_platform_rs"];
        argv.extend_from_slice(args);
        Config::parse_from(argv)
    }

    #[test]
    fn test_defaults_match_credential_and_session_policy() {
        let config = parse(&[]);

        assert_eq!(config.credential_ttl(), Duration::from_secs(15 * 60));
        assert_eq!(config.credential_clock_skew(), Duration::from_secs(60));
        assert_eq!(config.credential_rate_limit_per_minute, 5);
        assert_eq!(config.max_sessions_per_owner, 3);
        assert_eq!(config.session_idle_timeout(), Duration::from_secs(600));
        assert_eq!(config.store_backend, StoreBackend::Redis);
    }

    #[test]
    fn test_store_backend_parses_case_insensitively() {
        assert_eq!("MEMORY".parse::<StoreBackend>(), Ok(StoreBackend::Memory));
        assert_eq!("redis".parse::<StoreBackend>(), Ok(StoreBackend::Redis));
        assert_eq!("sqlite".parse::<StoreBackend>(), Err(StoreBackendParseError));
    }

    #[test]
    fn test_master_secret_falls_back_only_in_development() {
        let development = parse(&["--runtime-env", "development"]);
        assert!(development.credential_master_secret().is_some());

        let production = parse(&["--runtime-env", "production"]);
        assert!(production.credential_master_secret().is_none());

        let explicit = parse(&[
            "--runtime-env",
            "production",
            "--credential-master-secret",
            "s3cret",
        ]);
        assert_eq!(explicit.credential_master_secret().as_deref(), Some("s3cret"));
    }
}
