//! Access to the publisher's website.
//!
//! A [`PacktSession`] is only handed out by a successful login, so every
//! offer, library and claim request runs on an authenticated cookie store.
//! Page parsing lives in the `offer` and `library` modules and works on plain
//! HTML strings.

mod library;
mod offer;
mod session;

pub use library::{DownloadLink, Library, OwnedBook};
pub use offer::Offer;
pub use session::PacktSession;

use crate::config::SiteConfig;
use crate::error::SiteError;
use std::time::Duration;
use url::Url;

/// Common HTTP client configuration for the site session.
pub fn create_http_client(config: &SiteConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .cookie_store(true)
        .timeout(Duration::from_secs(config.timeout_sec))
        .build()
}

/// Applies rate limiting delay.
///
/// Values that don't form a duration (negative, NaN, too large) mean no delay.
pub async fn rate_limit(delay_sec: f64) {
    match Duration::try_from_secs_f64(delay_sec) {
        Ok(delay) if !delay.is_zero() => tokio::time::sleep(delay).await,
        Ok(_) => {}
        Err(e) => tracing::warn!(delay_sec, error = %e, "ignoring request delay"),
    }
}

/// Resolves a site-relative path or href against the base URL.
///
/// Leading slashes resolve from the host root, anything else from `base`.
pub fn resolve_url(base: &Url, relative: &str) -> Result<Url, SiteError> {
    base.join(relative)
        .map_err(|e| SiteError::InvalidUrl(format!("{}: {}", relative, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_url() {
        let base = Url::parse("https://www.packtpub.com/").unwrap();
        assert_eq!(
            resolve_url(&base, "/freelearning-claim/1/2").unwrap().as_str(),
            "https://www.packtpub.com/freelearning-claim/1/2"
        );
        assert_eq!(
            resolve_url(&base, "account/my-ebooks").unwrap().as_str(),
            "https://www.packtpub.com/account/my-ebooks"
        );
        assert_eq!(
            resolve_url(&base, "https://cdn.example.com/x.pdf").unwrap().as_str(),
            "https://cdn.example.com/x.pdf"
        );
    }

    #[tokio::test]
    async fn test_rate_limit_ignores_unusable_delays() {
        for delay in [f64::INFINITY, f64::NAN, 1e20, -1.0, 0.0] {
            rate_limit(delay).await;
        }
    }

    #[test]
    fn test_client_builds_from_defaults() {
        assert!(create_http_client(&SiteConfig::default()).is_ok());
    }
}
