use dirs::data_dir;
use std::{fs, path::PathBuf};

use crate::error::{AppError, AppResult};
use crate::relay::context::{Provider, DEFAULT_BASE_URL};

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    /// Defaults used when a catalog request omits provider or base URL.
    pub backend: BackendConfig,
    pub http: HttpConfig,
    pub log: LogConfig,
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct BackendConfig {
    pub provider: Provider,
    pub base_url: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Ollama,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Outbound HTTP settings. Both timeouts are unset unless configured;
/// local generation can legitimately take minutes.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct HttpConfig {
    pub connect_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct LogConfig {
    /// Minimum level: debug, info, warn or error
    pub level: String,
    /// Persist log lines to SQLite
    pub persist: bool,
    /// Override for the log database location
    pub db_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            persist: true,
            db_path: None,
        }
    }
}

fn app_dir() -> PathBuf {
    let mut p = data_dir().unwrap_or_else(|| PathBuf::from("."));
    p.push("LocalChat");
    p
}

pub fn settings_path() -> PathBuf {
    if let Ok(path) = std::env::var("CHAT_RELAY_CONFIG") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    let mut p = app_dir();
    p.push("settings.toml");
    p
}

pub fn default_log_db_path() -> PathBuf {
    let mut p = app_dir();
    p.push("relay.db");
    p
}

impl LogConfig {
    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(default_log_db_path)
    }
}

/// Parse settings from TOML text.
pub fn parse(text: &str) -> AppResult<Settings> {
    toml::from_str(text).map_err(|e| AppError::Config(format!("Failed to parse config: {}", e)))
}

/// Load settings from disk, falling back to defaults, then apply
/// environment overrides.
///
/// Runs before the logger is initialised, so it reports on stderr.
pub fn load() -> Settings {
    let p = settings_path();
    let mut cfg = if p.exists() {
        match fs::read_to_string(&p).map_err(AppError::from).and_then(|s| parse(&s)) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Config at {:?} unusable, using defaults: {}", p, e);
                Settings::default()
            }
        }
    } else {
        let defaults = Settings::default();
        // First run: leave an editable file behind.
        if let Err(e) = save(&defaults) {
            eprintln!("Could not write default config to {:?}: {}", p, e);
        }
        defaults
    };

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
    cfg
}

/// Apply `CHAT_RELAY_*` overrides from a variable lookup.
pub fn apply_env_overrides(cfg: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(host) = lookup("CHAT_RELAY_HOST").filter(|h| !h.trim().is_empty()) {
        cfg.server.host = host;
    }
    if let Some(port) = lookup("CHAT_RELAY_PORT") {
        match port.trim().parse::<u16>() {
            Ok(port) => cfg.server.port = port,
            Err(_) => eprintln!("Ignoring invalid CHAT_RELAY_PORT: {}", port),
        }
    }
    if let Some(level) = lookup("CHAT_RELAY_LOG_LEVEL").filter(|l| !l.trim().is_empty()) {
        cfg.log.level = level;
    }
}

pub fn save(cfg: &Settings) -> AppResult<()> {
    let p = settings_path();
    if let Some(parent) = p.parent() {
        fs::create_dir_all(parent)?;
    }

    let s = toml::to_string_pretty(cfg)
        .map_err(|e| AppError::Config(format!("Failed to serialize config: {}", e)))?;
    fs::write(&p, s)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Settings::default();
        assert_eq!(cfg.server.bind_addr(), "127.0.0.1:8787");
        assert_eq!(cfg.backend.provider, Provider::Ollama);
        assert_eq!(cfg.backend.base_url, "http://localhost:11434");
        assert!(cfg.http.request_timeout_secs.is_none());
        assert!(cfg.http.connect_timeout_secs.is_none());
        assert_eq!(cfg.log.level, "info");
    }

    #[test]
    fn test_parse_partial() {
        let cfg = parse(
            r#"
            [server]
            port = 9000

            [backend]
            provider = "lmstudio"
            base_url = "http://localhost:1234"

            [http]
            connect_timeout_secs = 5
            "#,
        )
        .unwrap();

        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.backend.provider, Provider::LmStudio);
        assert_eq!(cfg.backend.base_url, "http://localhost:1234");
        assert_eq!(cfg.http.connect_timeout_secs, Some(5));
        assert!(cfg.log.persist);
    }

    #[test]
    fn test_parse_invalid() {
        let err = parse("[server]\nport = \"high\"").unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = Settings::default();
        apply_env_overrides(&mut cfg, |key| match key {
            "CHAT_RELAY_HOST" => Some("0.0.0.0".to_string()),
            "CHAT_RELAY_PORT" => Some("not-a-port".to_string()),
            "CHAT_RELAY_LOG_LEVEL" => Some("debug".to_string()),
            _ => None,
        });
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.server.port, 8787);
        assert_eq!(cfg.log.level, "debug");
    }

    #[test]
    fn test_round_trip_through_toml() {
        let mut cfg = Settings::default();
        cfg.log.db_path = Some(PathBuf::from("/tmp/relay-test.db"));
        let text = toml::to_string_pretty(&cfg).unwrap();
        let back = parse(&text).unwrap();
        assert_eq!(back.log.resolved_db_path(), PathBuf::from("/tmp/relay-test.db"));
    }
}
