//! Configuration management for grabpackt.
//!
//! Handles loading, saving, and validating configuration from
//! platform-specific config directories or a user-supplied path.

use crate::error::ConfigError;
use lettre::message::Mailbox;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Application name used for config directory.
const APP_NAME: &str = "grabpackt";

/// Default config filename.
const CONFIG_FILENAME: &str = "config.toml";

/// Placeholder values for unconfigured credentials.
const EMAIL_PLACEHOLDER: &str = "YOUR_PACKT_EMAIL";
const PASSWORD_PLACEHOLDER: &str = "YOUR_PACKT_PASSWORD";

/// Upper bound for the politeness delay between requests.
const MAX_REQUEST_DELAY_SEC: f64 = 3600.0;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Publisher account credentials.
    pub account: AccountConfig,

    /// Site endpoints and HTTP behaviour.
    pub site: SiteConfig,

    /// Download settings for the claimed book.
    pub download: DownloadConfig,

    /// Notification email settings.
    pub email: EmailConfig,
}

/// Publisher account credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Login email address.
    pub email: String,

    /// Login password.
    pub password: String,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            email: EMAIL_PLACEHOLDER.to_string(),
            password: PASSWORD_PLACEHOLDER.to_string(),
        }
    }
}

impl AccountConfig {
    /// Checks if the credentials are filled in (not placeholders).
    pub fn is_configured(&self) -> bool {
        !self.email.is_empty()
            && self.email != EMAIL_PLACEHOLDER
            && !self.password.is_empty()
            && self.password != PASSWORD_PLACEHOLDER
    }
}

/// Site endpoints and HTTP client settings.
///
/// Paths are resolved against `base_url`, which also serves as the login page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Root of the publisher's website.
    pub base_url: String,

    /// Path of the free learning offer page.
    pub offer_path: String,

    /// Path of the account's ebook library.
    pub library_path: String,

    /// User agent sent with every request.
    pub user_agent: String,

    /// Request timeout in seconds.
    pub timeout_sec: u64,

    /// Delay between web requests in seconds.
    pub delay_between_requests_sec: f64,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.packtpub.com/".to_string(),
            offer_path: "packt/offers/free-learning".to_string(),
            library_path: "account/my-ebooks".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            timeout_sec: 30,
            delay_between_requests_sec: 1.0,
        }
    }
}

impl SiteConfig {
    /// Parses the base URL.
    pub fn base(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidValue {
            key: "site.base_url".to_string(),
            message: e.to_string(),
        })
    }

    /// Checks the timeout and request delay are usable durations.
    fn validate_timing(&self) -> Result<(), ConfigError> {
        if self.timeout_sec == 0 {
            return Err(ConfigError::InvalidValue {
                key: "site.timeout_sec".to_string(),
                message: "must be at least 1 second".to_string(),
            });
        }

        let delay = self.delay_between_requests_sec;
        if !(0.0..=MAX_REQUEST_DELAY_SEC).contains(&delay) {
            return Err(ConfigError::InvalidValue {
                key: "site.delay_between_requests_sec".to_string(),
                message: format!(
                    "{} is outside 0 to {} seconds",
                    delay, MAX_REQUEST_DELAY_SEC
                ),
            });
        }

        Ok(())
    }
}

/// Downloadable formats of an owned book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookFormat {
    Pdf,
    Epub,
    Mobi,
    Code,
}

impl BookFormat {
    /// Returns the format name as shown in links and messages.
    pub fn name(self) -> &'static str {
        match self {
            BookFormat::Pdf => "pdf",
            BookFormat::Epub => "epub",
            BookFormat::Mobi => "mobi",
            BookFormat::Code => "code",
        }
    }

    /// Returns the file extension used for downloaded files.
    pub fn extension(self) -> &'static str {
        match self {
            BookFormat::Code => "zip",
            other => other.name(),
        }
    }
}

/// Download settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Resolve download links for the claimed book.
    pub enabled: bool,

    /// Formats to fetch, in order.
    pub formats: Vec<BookFormat>,

    /// Only report the links; don't download anything.
    pub links_only: bool,

    /// Bundle downloaded files into one archive when there is more than one.
    pub zip: bool,

    /// Create the archive even for a single file.
    pub force_zip: bool,

    /// Directory for downloaded files.
    pub directory: PathBuf,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            formats: vec![BookFormat::Pdf, BookFormat::Epub],
            links_only: true,
            zip: false,
            force_zip: false,
            directory: PathBuf::from("downloads"),
        }
    }
}

/// Transport security for the SMTP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// Implicit TLS, usually port 465.
    Tls,
    /// Plain connection upgraded with STARTTLS, usually port 587.
    StartTls,
    /// Unencrypted; only for local relays.
    None,
}

/// Notification email settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    /// Send a notification after each run.
    pub enabled: bool,

    /// SMTP server host name.
    pub smtp_host: String,

    /// SMTP server port.
    pub smtp_port: u16,

    /// Connection security.
    pub security: SmtpSecurity,

    /// SMTP user name; leave empty to skip authentication.
    pub username: String,

    /// SMTP password.
    pub password: String,

    /// Sender address.
    pub from: String,

    /// Recipient addresses.
    pub to: Vec<String>,

    /// Attach downloaded files (or the archive) to the email.
    pub attach: bool,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 587,
            security: SmtpSecurity::StartTls,
            username: String::new(),
            password: String::new(),
            from: "grabpackt <grabpackt@example.com>".to_string(),
            to: Vec::new(),
            attach: false,
        }
    }
}

impl Config {
    /// Returns the platform-specific config directory path.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Returns the full path to the default config file.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join(CONFIG_FILENAME))
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Saves configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Writes a default config to `path` unless a file is already there.
    ///
    /// Returns `true` when a template was written and needs filling in.
    pub fn write_template_if_missing(path: &Path) -> Result<bool, ConfigError> {
        if path.exists() {
            return Ok(false);
        }

        Self::default().save_to(path)?;
        Ok(true)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.account.is_configured() {
            return Err(ConfigError::MissingValue(
                "account.email / account.password (set your Packt login in config file)"
                    .to_string(),
            ));
        }

        self.site.base()?;
        self.site.validate_timing()?;

        if self.download.enabled && self.download.formats.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "download.formats".to_string(),
                message: "must list at least one format when downloads are enabled".to_string(),
            });
        }

        if self.email.enabled {
            self.validate_email()?;
        }

        Ok(())
    }

    fn validate_email(&self) -> Result<(), ConfigError> {
        if self.email.smtp_host.trim().is_empty() {
            return Err(ConfigError::MissingValue("email.smtp_host".to_string()));
        }

        if self.email.to.is_empty() {
            return Err(ConfigError::MissingValue("email.to".to_string()));
        }

        let addresses = std::iter::once(("email.from", &self.email.from))
            .chain(self.email.to.iter().map(|to| ("email.to", to)));
        for (key, address) in addresses {
            if let Err(e) = address.parse::<Mailbox>() {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("'{}': {}", address, e),
                });
            }
        }

        Ok(())
    }
}
