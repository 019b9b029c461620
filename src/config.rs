use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server address (e.g., "0.0.0.0:48080")
    #[serde(default = "default_addr")]
    pub addr: String,
    /// Tenant used by logins that carry no tenant name
    #[serde(default = "default_tenant_id")]
    pub default_tenant_id: i64,
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Cache (redis) configuration
    #[serde(default)]
    pub redis: RedisConfig,
    /// Token signing configuration
    #[serde(default)]
    pub jwt: JwtConfig,
    /// Password hashing configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Verification code configuration
    #[serde(default)]
    pub sms: SmsConfig,
    /// Social login providers
    #[serde(default)]
    pub social: SocialConfig,
    /// WebSocket configuration
    #[serde(default)]
    pub websocket: WebSocketConfig,
    /// Job scheduler configuration
    #[serde(default)]
    pub job: JobConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database type (postgres or sqlite)
    #[serde(default = "default_db_type", rename = "type")]
    pub db_type: String,
    /// Database host, or file path for sqlite
    #[serde(default = "default_db_host")]
    pub host: String,
    /// Database port
    #[serde(default = "default_db_port")]
    pub port: u16,
    /// Database name
    #[serde(default = "default_db_name", rename = "database")]
    pub name: String,
    /// Database user
    #[serde(default = "default_db_user", rename = "username")]
    pub user: String,
    /// Database password
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub database: u8,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            port: default_redis_port(),
            database: 0,
            password: None,
        }
    }
}

impl RedisConfig {
    /// Build the redis connection URL
    pub fn connection_url(&self) -> String {
        match &self.password {
            Some(password) if !password.is_empty() => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.database
            ),
            _ => format!("redis://{}:{}/{}", self.host, self.port, self.database),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JwtConfig {
    /// HS256 signing secret
    #[serde(default = "default_jwt_secret")]
    pub secret: String,
    #[serde(default = "default_jwt_issuer")]
    pub issuer: String,
    /// Access token lifetime (default 30 days)
    #[serde(default = "default_access_ttl")]
    pub access_ttl_secs: i64,
    /// Refresh token lifetime (default 60 days)
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_secs: i64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: default_jwt_secret(),
            issuer: default_jwt_issuer(),
            access_ttl_secs: default_access_ttl(),
            refresh_ttl_secs: default_refresh_ttl(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// bcrypt cost used for new password hashes
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            bcrypt_cost: default_bcrypt_cost(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SmsConfig {
    /// Verification code lifetime
    #[serde(default = "default_sms_expire")]
    pub expire_secs: u64,
    /// Minimal interval between two codes for the same mobile and scene
    #[serde(default = "default_sms_frequency")]
    pub send_frequency_secs: u64,
    /// Codes per mobile and scene per day
    #[serde(default = "default_sms_daily_limit")]
    pub daily_limit: i64,
    #[serde(default = "default_sms_code_length")]
    pub code_length: usize,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            expire_secs: default_sms_expire(),
            send_frequency_secs: default_sms_frequency(),
            daily_limit: default_sms_daily_limit(),
            code_length: default_sms_code_length(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SocialConfig {
    /// Providers keyed by social type code (e.g. "10" for gitee)
    #[serde(default)]
    pub providers: HashMap<String, SocialProviderConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SocialProviderConfig {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub user_info_url: String,
    /// Field of the user info document holding the stable account id
    #[serde(default = "default_open_id_field")]
    pub open_id_field: String,
    #[serde(default = "default_nickname_field")]
    pub nickname_field: String,
    #[serde(default = "default_avatar_field")]
    pub avatar_field: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebSocketConfig {
    /// Connections silent for longer than this are closed
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_secs: u64,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_secs: default_heartbeat_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobConfig {
    /// Whether the scheduler loads running jobs on startup
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

// Default value functions
fn default_addr() -> String {
    "0.0.0.0:48080".to_string()
}

fn default_tenant_id() -> i64 {
    1
}

fn default_db_type() -> String {
    "postgres".to_string()
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_name() -> String {
    "yudao".to_string()
}

fn default_db_user() -> String {
    "postgres".to_string()
}

fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_jwt_secret() -> String {
    "yudao-admin-secret-change-me-in-production".to_string()
}

fn default_jwt_issuer() -> String {
    "yudao-go".to_string()
}

fn default_access_ttl() -> i64 {
    30 * 24 * 3600
}

fn default_refresh_ttl() -> i64 {
    60 * 24 * 3600
}

fn default_bcrypt_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

fn default_sms_expire() -> u64 {
    300
}

fn default_sms_frequency() -> u64 {
    60
}

fn default_sms_daily_limit() -> i64 {
    10
}

fn default_sms_code_length() -> usize {
    4
}

fn default_open_id_field() -> String {
    "id".to_string()
}

fn default_nickname_field() -> String {
    "name".to_string()
}

fn default_avatar_field() -> String {
    "avatar_url".to_string()
}

fn default_heartbeat_timeout() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            default_tenant_id: default_tenant_id(),
            log: LogConfig::default(),
            database: DatabaseConfig::default(),
            redis: RedisConfig::default(),
            jwt: JwtConfig::default(),
            auth: AuthConfig::default(),
            sms: SmsConfig::default(),
            social: SocialConfig::default(),
            websocket: WebSocketConfig::default(),
            job: JobConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: default_db_type(),
            host: default_db_host(),
            port: default_db_port(),
            name: default_db_name(),
            user: default_db_user(),
            password: String::new(),
        }
    }
}

impl DatabaseConfig {
    /// Generate database connection URL
    pub fn connection_url(&self) -> String {
        if self.db_type == "sqlite" {
            return format!("sqlite://{}?mode=rwc", self.host);
        }
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
