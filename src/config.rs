use rand::RngCore;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub reaper: ReaperConfig,
    #[serde(default)]
    pub mail: MailConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base used when building download links
    #[serde(default = "default_public_url")]
    pub public_url: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_local_path")]
    pub local_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Notarize uploads unless the request opts out
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Hex-encoded ed25519 seed; generated and persisted when empty
    #[serde(default)]
    pub signer_key: String,
    #[serde(default = "default_registration_timeout")]
    pub registration_timeout_secs: u64,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReaperConfig {
    #[serde(default = "default_reaper_interval")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_mail_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default)]
    pub sender_email: String,
    #[serde(default = "default_sender_name")]
    pub sender_name: String,
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_max_upload_bytes() -> usize {
    100 * 1024 * 1024
}

fn default_db_path() -> String {
    "data/notarydrop.db".to_string()
}

fn default_local_path() -> String {
    "data/uploads".to_string()
}

fn default_true() -> bool {
    true
}

fn default_registration_timeout() -> u64 {
    30
}

fn default_queue_depth() -> usize {
    64
}

fn default_reaper_interval() -> u64 {
    60
}

fn default_mail_api_url() -> String {
    "https://api.mailjet.com/v3.1/send".to_string()
}

fn default_sender_name() -> String {
    "NotaryDrop".to_string()
}

const LEDGER_KEY_PATH: &str = "data/.ledger_key";

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            local_path: default_local_path(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            signer_key: String::new(),
            registration_timeout_secs: default_registration_timeout(),
            queue_depth: default_queue_depth(),
        }
    }
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_reaper_interval(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: default_mail_api_url(),
            api_key: String::new(),
            api_secret: String::new(),
            sender_email: String::new(),
            sender_name: default_sender_name(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides();
        config.ensure_directories()?;
        config.ensure_ledger_key()?;
        tracing::info!(
            "Ledger enabled={}, reaper interval={}s, mail enabled={}",
            config.ledger.enabled,
            config.reaper.interval_secs,
            config.mail.enabled
        );
        Ok(config)
    }

    /// Build the public download link for a stored file
    pub fn download_link(&self, file_id: &str) -> String {
        format!(
            "{}/api/v1/download/{}",
            self.server.public_url.trim_end_matches('/'),
            file_id
        )
    }

    /// Ensure the ledger signing key exists and is persisted
    fn ensure_ledger_key(&mut self) -> anyhow::Result<()> {
        if !self.ledger.signer_key.trim().is_empty() {
            return Ok(());
        }

        let key_path = Path::new(LEDGER_KEY_PATH);
        if key_path.exists() {
            let key = fs::read_to_string(key_path)?;
            self.ledger.signer_key = key.trim().to_string();
            tracing::info!("Loaded persisted ledger key from {}", LEDGER_KEY_PATH);
        } else {
            let mut seed = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut seed);
            let key = hex::encode(seed);

            if let Some(parent) = key_path.parent() {
                fs::create_dir_all(parent)?;
            }

            fs::write(key_path, &key)?;
            self.ledger.signer_key = key;
            tracing::info!("Generated and persisted new ledger key to {}", LEDGER_KEY_PATH);
        }
        Ok(())
    }

    /// Load configuration from conf.ini or config.toml
    fn load_from_file() -> anyhow::Result<Self> {
        let config_paths = ["conf.ini", "config.toml", "data/conf.ini", "data/config.toml"];

        for path in config_paths {
            if Path::new(path).exists() {
                let content = fs::read_to_string(path)?;
                let config: Config = toml::from_str(&content)?;
                tracing::info!("Loaded configuration from {}", path);
                return Ok(config);
            }
        }

        tracing::info!("No configuration file found, using defaults");
        Ok(Config::default())
    }

    /// Apply environment variable overrides
    /// Format: ND_CONF_<SECTION>_<KEY>
    fn apply_env_overrides(&mut self) {
        // Server overrides
        if let Ok(val) = env::var("ND_CONF_SERVER_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = env::var("ND_CONF_SERVER_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }
        if let Ok(val) = env::var("ND_CONF_SERVER_PUBLIC_URL") {
            if !val.trim().is_empty() {
                self.server.public_url = val;
            }
        }
        if let Ok(val) = env::var("ND_CONF_SERVER_MAX_UPLOAD_BYTES") {
            if let Ok(bytes) = val.parse() {
                self.server.max_upload_bytes = bytes;
            }
        }

        // Database overrides
        if let Ok(val) = env::var("ND_CONF_DATABASE_PATH") {
            self.database.path = val;
        }

        // Storage overrides
        if let Ok(val) = env::var("ND_CONF_STORAGE_LOCAL_PATH") {
            self.storage.local_path = val;
        }

        // Ledger overrides
        if let Ok(val) = env::var("ND_CONF_LEDGER_ENABLED") {
            if let Ok(v) = val.parse() {
                self.ledger.enabled = v;
            }
        }
        if let Ok(val) = env::var("ND_CONF_LEDGER_SIGNER_KEY") {
            self.ledger.signer_key = val;
        }
        if let Ok(val) = env::var("ND_CONF_LEDGER_TIMEOUT") {
            if let Ok(secs) = val.parse() {
                self.ledger.registration_timeout_secs = secs;
            }
        }

        // Reaper overrides
        if let Ok(val) = env::var("ND_CONF_REAPER_INTERVAL") {
            if let Ok(secs) = val.parse() {
                self.reaper.interval_secs = secs;
            }
        }

        // Mail overrides
        if let Ok(val) = env::var("ND_CONF_MAIL_ENABLED") {
            if let Ok(v) = val.parse() {
                self.mail.enabled = v;
            }
        }
        if let Ok(val) = env::var("ND_CONF_MAIL_API_KEY") {
            self.mail.api_key = val;
        }
        if let Ok(val) = env::var("ND_CONF_MAIL_API_SECRET") {
            self.mail.api_secret = val;
        }
        if let Ok(val) = env::var("ND_CONF_MAIL_SENDER_EMAIL") {
            self.mail.sender_email = val;
        }
    }

    /// Ensure required directories exist
    fn ensure_directories(&self) -> anyhow::Result<()> {
        // Ensure database directory exists
        if let Some(parent) = Path::new(&self.database.path).parent() {
            fs::create_dir_all(parent)?;
        }

        // Ensure local storage directory exists
        fs::create_dir_all(&self.storage.local_path)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.reaper.interval_secs, 60);
        assert!(config.ledger.enabled);
        assert!(!config.mail.enabled);
    }

    #[test]
    fn test_partial_sections() {
        let config: Config = toml::from_str(
            r#"
            [server]
            public_url = "https://drop.example.org/"

            [reaper]
            interval_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.reaper.interval_secs, 5);
        assert_eq!(
            config.download_link("abc"),
            "https://drop.example.org/api/v1/download/abc"
        );
    }
}
