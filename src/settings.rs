use serde::{Deserialize, Serialize};
use std::fs;

use crate::utils::crypto::generate_secret;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SatchelSettings {
    #[serde(default)]
    pub application: ApplicationSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

/// Storage backend selected at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Memory,
    File,
    CachedFile,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            "cached_file" | "cached-file" => Ok(Self::CachedFile),
            other => Err(format!("unknown session backend: {other}")),
        }
    }
}

/// `SameSite` attribute written on the session cookie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSitePolicy {
    Lax,
    Strict,
    None,
}

impl From<SameSitePolicy> for actix_web::cookie::SameSite {
    fn from(policy: SameSitePolicy) -> Self {
        match policy {
            SameSitePolicy::Lax => Self::Lax,
            SameSitePolicy::Strict => Self::Strict,
            SameSitePolicy::None => Self::None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub cookie_name: String,
    pub cookie_path: String,
    pub cookie_domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSitePolicy,
    /// Lifetime of a session (store entry and cookie) in seconds
    pub default_age_seconds: u64,
    /// Issue browser-session cookies unless a session overrides its expiry
    pub expire_at_browser_close: bool,
    /// Persist and re-issue the cookie on every request, not only after changes
    pub save_every_request: bool,
    pub backend: BackendKind,
    /// Directory used by the file backends
    pub file_path: String,
    /// Signing secrets, current first. Older entries are only used to verify.
    pub secret_keys: Vec<String>,
    /// Reject session cookies whose signature is older than this, if set.
    /// The store's expiry date is authoritative either way.
    pub token_max_age_seconds: Option<u64>,
    /// Upper bound for a single backend operation
    pub backend_timeout_ms: u64,
    /// How often expired sessions are swept; 0 disables the sweeper
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `env_logger` filter directives, e.g. `info` or `satchel=debug`
    pub level: String,
}

impl LoggingSettings {
    /// Logger builder honouring the configured filter directives
    #[must_use]
    pub fn logger_builder(&self) -> env_logger::Builder {
        let mut builder = env_logger::Builder::new();
        builder.parse_filters(&self.level);
        builder
    }
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cookie_name: "satchel_session".to_string(),
            cookie_path: "/".to_string(),
            cookie_domain: None,
            secure: true, // Default to secure cookies
            http_only: true,
            same_site: SameSitePolicy::Lax,
            default_age_seconds: 60 * 60 * 24 * 14, // two weeks
            expire_at_browser_close: false,
            save_every_request: false,
            backend: BackendKind::Memory,
            file_path: "sessions".to_string(),
            secret_keys: Vec::new(), // Will be generated if empty
            token_max_age_seconds: None,
            backend_timeout_ms: 5000,
            sweep_interval_seconds: 3600,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl SatchelSettings {
    /// Load settings from configuration files and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Logger initialization fails
    /// - Settings file cannot be read or parsed
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::load_env_file();

        let mut settings = Self::load_base_settings()?;
        Self::apply_env_overrides(&mut settings);
        settings.logging.logger_builder().try_init()?;
        Self::ensure_secret_keys(&mut settings.session);

        Ok(settings)
    }

    /// Load base settings from TOML file(s) or use defaults
    ///
    /// Priority, highest first:
    /// 1. Environment variables (applied separately afterwards)
    /// 2. Settings.toml in `SATCHEL_SECRETS_DIR`
    /// 3. Settings.toml in the current directory
    /// 4. Defaults
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file cannot be read or parsed
    fn load_base_settings() -> Result<Self, Box<dyn std::error::Error>> {
        let mut settings = Self::default();

        let default_config_path = std::path::PathBuf::from("Settings.toml");
        if default_config_path.exists() {
            settings = Self::from_toml(&fs::read_to_string(&default_config_path)?)?;
            println!(
                "✓ Loaded base settings from {}",
                default_config_path.display()
            );
        }

        if let Ok(secrets_dir) = std::env::var("SATCHEL_SECRETS_DIR") {
            let secrets_path = std::path::Path::new(&secrets_dir).join("Settings.toml");
            if secrets_path.exists() {
                settings = Self::from_toml(&fs::read_to_string(&secrets_path)?)?;
                println!("✓ Overriding settings from {}", secrets_path.display());
            } else {
                println!(
                    "ℹ SATCHEL_SECRETS_DIR set but no Settings.toml found at: {}",
                    secrets_path.display()
                );
            }
        }

        Ok(settings)
    }

    /// Parse settings from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid settings TOML
    pub fn from_toml(content: &str) -> Result<Self, basic_toml::Error> {
        basic_toml::from_str(content)
    }

    /// Apply environment variable overrides to settings
    pub fn apply_env_overrides(settings: &mut Self) {
        Self::apply_application_env_overrides(&mut settings.application);
        Self::apply_session_env_overrides(&mut settings.session);
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            settings.logging.level = log_level;
        }
    }

    fn apply_application_env_overrides(app_settings: &mut ApplicationSettings) {
        if let Ok(host) = std::env::var("HOST") {
            app_settings.host = host;
        }
        Self::apply_parsed_env_override("PORT", &mut app_settings.port);
    }

    /// Apply environment overrides for session settings
    pub fn apply_session_env_overrides(session_settings: &mut SessionSettings) {
        if let Ok(name) = std::env::var("SESSION_COOKIE_NAME") {
            session_settings.cookie_name = name;
        }
        if let Ok(domain) = std::env::var("SESSION_COOKIE_DOMAIN") {
            session_settings.cookie_domain = (!domain.is_empty()).then_some(domain);
        }
        if let Ok(path) = std::env::var("SESSION_FILE_PATH") {
            session_settings.file_path = path;
        }
        Self::apply_parsed_env_override("SESSION_COOKIE_SECURE", &mut session_settings.secure);
        Self::apply_parsed_env_override(
            "SESSION_COOKIE_AGE",
            &mut session_settings.default_age_seconds,
        );
        Self::apply_parsed_env_override(
            "SESSION_SAVE_EVERY_REQUEST",
            &mut session_settings.save_every_request,
        );
        Self::apply_parsed_env_override(
            "SESSION_EXPIRE_AT_BROWSER_CLOSE",
            &mut session_settings.expire_at_browser_close,
        );
        Self::apply_parsed_env_override("SESSION_BACKEND", &mut session_settings.backend);

        if let Ok(keys) = std::env::var("SESSION_SECRET_KEYS") {
            let keys: Vec<String> = keys
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(ToString::to_string)
                .collect();
            if !keys.is_empty() {
                session_settings.secret_keys = keys;
            }
        }
    }

    /// Overwrite `target` with the parsed value of `env_var`, ignoring unparsable values
    fn apply_parsed_env_override<T: std::str::FromStr>(env_var: &str, target: &mut T) {
        if let Ok(value_str) = std::env::var(env_var) {
            if let Ok(value) = value_str.parse::<T>() {
                *target = value;
            } else {
                log::warn!("Ignoring unparsable value for {env_var}: {value_str:?}");
            }
        }
    }

    /// Generate a signing secret when none is configured
    pub fn ensure_secret_keys(session_settings: &mut SessionSettings) {
        session_settings.secret_keys.retain(|k| !k.is_empty());
        if session_settings.secret_keys.is_empty() {
            let secret = generate_secret();
            Self::warn_about_generated_secret(&secret);
            session_settings.secret_keys.push(secret);
        }
    }

    fn warn_about_generated_secret(secret: &str) {
        eprintln!("⚠️  WARNING: Using auto-generated session signing secret");
        eprintln!("📝 Generated secret: {secret}");
        eprintln!("🔒 For production use, set the SESSION_SECRET_KEYS environment variable");
        eprintln!("   or configure session.secret_keys in Settings.toml");
        eprintln!("💡 Existing sessions become invalid on each restart unless explicitly configured");
    }

    /// Load environment variables from .env file
    fn load_env_file() {
        if let Ok(contents) = std::fs::read_to_string(".env") {
            for line in contents.lines() {
                if let Some((key, value)) = line.split_once('=') {
                    std::env::set_var(key.trim(), value.trim());
                }
            }
        }
    }

    /// Get the bind address for the server
    #[must_use]
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }
}
