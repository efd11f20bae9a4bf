use clap::Parser;
use lib_switch::configs::{load_config, ConfigError, StoreKind, SwitchConfig};
use std::path::PathBuf;

/// Used when neither `--config` nor `SWITCH_CONFIG` is given.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[derive(Parser, Debug, Clone, Default)]
#[clap(about = "Dead man's switch: alerts when clients stop sending heartbeats", version)]
pub struct Cli {
    #[clap(long, env = "SWITCH_CONFIG", help = "Path to the YAML configuration file.")]
    pub config: Option<PathBuf>,

    #[clap(long, env = "LISTEN_ADDR", help = "Socket address to listen on, e.g. 0.0.0.0:8080.")]
    pub listen_addr: Option<String>,

    #[clap(long, env = "TIMEOUT_SECONDS", help = "Seconds of silence before a client is reported missing (min 60).")]
    pub timeout_seconds: Option<u64>,

    #[clap(long, env = "CHECK_INTERVAL_SECONDS", help = "Seconds between liveness evaluations.")]
    pub check_interval_seconds: Option<u64>,

    #[clap(long, env = "HEARTBEAT_DB_PATH", help = "SQLite database file.")]
    pub db_path: Option<PathBuf>,

    #[clap(long, env = "BASE_PATH", help = "Prefix for every route, e.g. /dead-mans-switch.")]
    pub base_path: Option<String>,

    #[clap(long, env = "SWITCH_STORE", help = "Heartbeat store backend: sqlite, memory or redis.")]
    pub store: Option<StoreKind>,

    #[clap(long, env = "REDIS_URL", help = "Redis connection URL for the redis store.")]
    pub redis_url: Option<String>,

    #[clap(long, env = "WEB_DIR", help = "Directory holding index.html and static assets.")]
    pub web_dir: Option<PathBuf>,

    #[clap(long, env = "LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Overrides `base` with every value given on the command line or in the
    /// environment.
    pub fn merge_into(self, base: SwitchConfig) -> SwitchConfig {
        SwitchConfig {
            listen_addr: self.listen_addr.unwrap_or(base.listen_addr),
            timeout_seconds: self.timeout_seconds.unwrap_or(base.timeout_seconds),
            check_interval_seconds: self.check_interval_seconds.unwrap_or(base.check_interval_seconds),
            db_path: self.db_path.unwrap_or(base.db_path),
            base_path: self.base_path.unwrap_or(base.base_path),
            store: self.store.unwrap_or(base.store),
            redis_url: self.redis_url.unwrap_or(base.redis_url),
            web_dir: self.web_dir.unwrap_or(base.web_dir),
            log_dir: self.log_dir.unwrap_or(base.log_dir),
            log_level: self.log_level.unwrap_or(base.log_level),
            ..base
        }
    }
}

/// Defaults, then the YAML file, then env/CLI. The result is validated and its
/// base path normalized.
pub fn resolve_config(cli: Cli) -> Result<SwitchConfig, ConfigError> {
    let file_config = load_config(&cli.config_path())?;
    let mut config = cli.merge_into(file_config);
    config.base_path = config.normalized_base_path();
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn cli_values_override_file_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timeout_seconds: 900\nlisten_addr: \"127.0.0.1:9000\"\nbase_path: /").unwrap();

        let cli = Cli {
            config: Some(file.path().to_path_buf()),
            timeout_seconds: Some(120),
            store: Some(StoreKind::Memory),
            ..Default::default()
        };
        let cfg = resolve_config(cli).unwrap();
        assert_eq!(cfg.timeout_seconds, 120);
        assert_eq!(cfg.listen_addr, "127.0.0.1:9000");
        assert_eq!(cfg.store, StoreKind::Memory);
        assert_eq!(cfg.base_path, "");
    }

    #[test]
    fn invalid_override_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli {
            config: Some(dir.path().join("absent.yaml")),
            timeout_seconds: Some(10),
            ..Default::default()
        };
        assert!(matches!(resolve_config(cli), Err(ConfigError::TimeoutTooShort { .. })));
    }

    #[test]
    fn flags_parse() {
        let cli = Cli::try_parse_from([
            "server_switch",
            "--store",
            "redis",
            "--base-path",
            "/dms/",
            "--check-interval-seconds",
            "10",
        ])
        .unwrap();
        assert_eq!(cli.store, Some(StoreKind::Redis));
        assert_eq!(cli.check_interval_seconds, Some(10));
        let cfg = cli.merge_into(SwitchConfig::default());
        assert_eq!(cfg.normalized_base_path(), "/dms");
    }
}
