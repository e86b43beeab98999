//! Authenticated session against the publisher's website.

use super::library::{DownloadLink, Library};
use super::offer::{Offer, normalize_whitespace};
use super::{create_http_client, rate_limit, resolve_url};
use crate::config::{AccountConfig, SiteConfig};
use crate::error::{ConfigError, DownloadError, SiteError};
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use reqwest::header::REFERER;
use scraper::{Html, Selector};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::io::AsyncWriteExt;
use url::Url;

/// Drupal form id of the login form. Not the CSRF token.
const LOGIN_FORM_ID: &str = "packt_user_login_form";

/// CSS selectors used for the login exchange.
struct Selectors {
    /// Per-request CSRF token inside the login form.
    form_build_id: Selector,
    /// Error banner shown after a failed login.
    error_message: Selector,
}

static SELECTORS: LazyLock<Selectors> = LazyLock::new(|| Selectors {
    form_build_id: Selector::parse(r#"#packt-user-login-form [name="form_build_id"]"#).unwrap(),
    error_message: Selector::parse(".messages.error").unwrap(),
});

/// An HTTP session that has passed the site's login.
pub struct PacktSession {
    client: reqwest::Client,
    config: SiteConfig,
    base: Url,
}

impl PacktSession {
    /// Logs in with the account credentials.
    ///
    /// Fetches the login page for its CSRF token and posts the login form.
    pub async fn login(account: &AccountConfig, config: &SiteConfig) -> Result<Self, SiteError> {
        let base = config
            .base()
            .map_err(|e: ConfigError| SiteError::InvalidUrl(e.to_string()))?;
        let client = create_http_client(config)?;

        let login_page = Self::get_text(&client, config, base.clone()).await?;
        let form_build_id = Self::extract_form_build_id(&login_page)?;
        tracing::debug!(%form_build_id, "found login form");

        let payload = [
            ("email", account.email.as_str()),
            ("password", account.password.as_str()),
            ("op", "Login"),
            ("form_id", LOGIN_FORM_ID),
            ("form_build_id", form_build_id.as_str()),
        ];

        rate_limit(config.delay_between_requests_sec).await;
        let response = client.post(base.clone()).form(&payload).send().await?;
        let status = response.status();
        Self::check_login_status(base.as_str(), status)?;

        let body = response.text().await?;
        if let Some(message) = Self::extract_login_error(&body) {
            return Err(SiteError::LoginRejected(message));
        }

        Ok(Self {
            client,
            config: config.clone(),
            base,
        })
    }

    fn extract_form_build_id(html: &str) -> Result<String, SiteError> {
        let doc = Html::parse_document(html);
        doc.select(&SELECTORS.form_build_id)
            .next()
            .and_then(|input| input.value().attr("value"))
            .map(str::to_string)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SiteError::ElementNotFound("login form build id".to_string()))
    }

    fn extract_login_error(html: &str) -> Option<String> {
        let doc = Html::parse_document(html);
        doc.select(&SELECTORS.error_message)
            .next()
            .map(|elem| normalize_whitespace(&elem.text().collect::<String>()))
            .filter(|message| !message.is_empty())
    }

    fn check_login_status(url: &str, status: StatusCode) -> Result<(), SiteError> {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SiteError::LoginRejected(
                format!("HTTP {}", status.as_u16()),
            )),
            s if !s.is_success() => Err(SiteError::UnexpectedStatus {
                url: url.to_string(),
                status: s.as_u16(),
            }),
            _ => Ok(()),
        }
    }

    /// Fetches a page before login; 401/403 count as a rejected login.
    async fn get_text(
        client: &reqwest::Client,
        config: &SiteConfig,
        url: Url,
    ) -> Result<String, SiteError> {
        rate_limit(config.delay_between_requests_sec).await;

        let response = client.get(url.clone()).send().await?;
        Self::check_login_status(url.as_str(), response.status())?;
        Ok(response.text().await?)
    }

    /// Fetches a page on the authenticated session and returns its body.
    async fn fetch_page(&self, url: Url, referer: Option<&Url>) -> Result<String, SiteError> {
        rate_limit(self.config.delay_between_requests_sec).await;

        let mut request = self.client.get(url.clone());
        if let Some(referer) = referer {
            request = request.header(REFERER, referer.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        tracing::debug!(%url, status = status.as_u16(), "fetched page");

        if !status.is_success() {
            return Err(SiteError::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.text().await?)
    }

    fn offer_url(&self) -> Result<Url, SiteError> {
        resolve_url(&self.base, &self.config.offer_path)
    }

    /// Base URL of the site, used to resolve links found on its pages.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Fetches and parses the day's offer.
    pub async fn fetch_offer(&self) -> Result<Offer, SiteError> {
        let body = self.fetch_page(self.offer_url()?, None).await?;
        Offer::parse(&body)
    }

    /// Fetches and parses the account's library.
    pub async fn fetch_library(&self) -> Result<Library, SiteError> {
        let url = resolve_url(&self.base, &self.config.library_path)?;
        let body = self.fetch_page(url, None).await?;
        Library::parse(&body)
    }

    /// Claims the offer and returns the library the site lands on afterwards.
    ///
    /// The claim only counts once the returned library lists the offer.
    pub async fn claim(&self, offer: &Offer) -> Result<Library, SiteError> {
        let url = resolve_url(&self.base, &offer.claim_path)?;
        let referer = self.offer_url()?;

        let body = match self.fetch_page(url, Some(&referer)).await {
            Ok(body) => body,
            Err(SiteError::UnexpectedStatus { status, .. }) => {
                return Err(SiteError::ClaimRejected(format!("HTTP {}", status)));
            }
            Err(e) => return Err(e),
        };

        let library = Library::parse(&body).map_err(|e| {
            SiteError::ClaimRejected(format!("claim did not lead to the library ({})", e))
        })?;

        if !library.owns(offer) {
            return Err(SiteError::ClaimRejected(format!(
                "'{}' is not in the library after claiming",
                offer.title
            )));
        }

        Ok(library)
    }

    /// Streams a download to `dest`.
    pub async fn download(&self, link: &DownloadLink, dest: &Path) -> Result<(), DownloadError> {
        rate_limit(self.config.delay_between_requests_sec).await;

        let response = self
            .client
            .get(link.url.clone())
            .send()
            .await?
            .error_for_status()?;

        write_stream(response.bytes_stream(), dest).await
    }
}

/// Writes a byte stream to `dest` through a `.part` file.
///
/// The partial file is removed if the stream or a write fails.
async fn write_stream<S, B, E>(stream: S, dest: &Path) -> Result<(), DownloadError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    DownloadError: From<E>,
{
    let mut partial = dest.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    let written = async {
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut stream = std::pin::pin!(stream);
        while let Some(chunk) = stream.next().await {
            file.write_all(chunk?.as_ref()).await?;
        }
        file.flush().await?;
        Ok::<_, DownloadError>(())
    }
    .await;

    if let Err(e) = written {
        if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
            tracing::debug!(
                path = %partial.display(),
                error = %cleanup,
                "could not remove partial download"
            );
        }
        return Err(e);
    }

    tokio::fs::rename(&partial, dest).await?;
    Ok(())
}
