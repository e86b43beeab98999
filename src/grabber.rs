//! The daily grab: login, offer, library check, claim, download.
//!
//! Steps run strictly in order and the first site failure ends the run with
//! a [`Outcome::Failed`]. The finished [`Report`] is what gets mailed and
//! what decides the exit status.

use crate::config::Config;
use crate::console::Console;
use crate::download::{self, DownloadSummary};
use crate::error::SiteError;
use crate::notify::Notifier;
use crate::site::{Library, Offer, OwnedBook, PacktSession};
use std::fmt;

/// Pipeline step that produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Login,
    Offer,
    Library,
    Claim,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Login => "login",
            Stage::Offer => "offer page",
            Stage::Library => "library check",
            Stage::Claim => "claim",
        };
        f.write_str(name)
    }
}

/// Result of the claim part of a run.
#[derive(Debug)]
pub enum Outcome {
    /// The offer was in the library before this run.
    AlreadyOwned(Offer),

    /// This run added the offer to the library.
    Claimed(Offer),

    /// A step failed; later steps were skipped.
    Failed { stage: Stage, error: SiteError },
}

impl Outcome {
    /// The offer, if the run got far enough to see it.
    pub fn offer(&self) -> Option<&Offer> {
        match self {
            Outcome::AlreadyOwned(offer) | Outcome::Claimed(offer) => Some(offer),
            Outcome::Failed { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Outcome::Failed { .. })
    }

    /// One-line summary, e.g. `Claimed: Mastering Rust`.
    pub fn summary(&self) -> String {
        match self {
            Outcome::Claimed(offer) => format!("Claimed: {}", offer.title),
            Outcome::AlreadyOwned(offer) => format!("Already owned: {}", offer.title),
            Outcome::Failed { stage, .. } => format!("Failed at {}", stage),
        }
    }
}

/// What happened to the notification email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationStatus {
    /// Email is disabled or no notifier was given.
    Skipped,
    Sent,
    Failed(String),
}

/// Everything a run produced.
#[derive(Debug)]
pub struct Report {
    pub outcome: Outcome,

    /// Present when downloads are enabled and the book is in the library.
    pub downloads: Option<DownloadSummary>,

    pub notification: NotificationStatus,
}

impl Report {
    fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            downloads: None,
            notification: NotificationStatus::Skipped,
        }
    }

    /// Process exit status: 0 when the offer ends up owned, 1 otherwise.
    ///
    /// Download and notification problems never change it.
    pub fn exit_status(&self) -> u8 {
        if self.outcome.is_success() { 0 } else { 1 }
    }
}

/// Runs the claim steps and, if a notifier is given, sends the report.
pub async fn run(config: &Config, notifier: Option<&dyn Notifier>, console: &Console) -> Report {
    let mut report = grab(config, console).await;

    let Some(notifier) = notifier else {
        return report;
    };

    console.step("Sending notification email...");
    report.notification = match notifier.notify(&report).await {
        Ok(()) => {
            console.success("Notification sent");
            NotificationStatus::Sent
        }
        Err(e) => {
            tracing::warn!(error = %e, "notification failed");
            console.error(&format!("Failed to send notification: {}", e));
            NotificationStatus::Failed(e.to_string())
        }
    };

    report
}

/// Runs login, offer, library check, claim and downloads.
pub async fn grab(config: &Config, console: &Console) -> Report {
    console.step("Logging in...");
    let session = match PacktSession::login(&config.account, &config.site).await {
        Ok(session) => session,
        Err(error) => return failed(console, Stage::Login, error),
    };
    console.success(&format!("Logged in as {}", config.account.email));

    console.step("Fetching offer of the day...");
    let offer = match session.fetch_offer().await {
        Ok(offer) => offer,
        Err(error) => return failed(console, Stage::Offer, error),
    };
    console.success(&format!("Today's free book: {}", offer.title));
    console.info(&format!("Book ID: {}", offer.id));

    console.step("Checking library...");
    let library = match session.fetch_library().await {
        Ok(library) => library,
        Err(error) => return failed(console, Stage::Library, error),
    };
    tracing::debug!(books = library.len(), "library parsed");

    let (outcome, library) = if library.owns(&offer) {
        console.info(&format!("'{}' is already in your library", offer.title));
        (Outcome::AlreadyOwned(offer), library)
    } else {
        console.step("Claiming book...");
        match session.claim(&offer).await {
            Ok(library) => {
                console.success(&format!("Claimed '{}'", offer.title));
                (Outcome::Claimed(offer), library)
            }
            Err(error) => return failed(console, Stage::Claim, error),
        }
    };

    let mut report = Report::new(outcome);

    if config.download.enabled {
        report.downloads =
            download_offer(&session, &library, &report.outcome, config, console).await;
    }

    report
}

async fn download_offer(
    session: &PacktSession,
    library: &Library,
    outcome: &Outcome,
    config: &Config,
    console: &Console,
) -> Option<DownloadSummary> {
    let offer = outcome.offer()?;
    let book: &OwnedBook = match library.find(offer) {
        Some(book) => book,
        None => {
            console.warning("Book not found in library listing; skipping downloads");
            return None;
        }
    };

    console.step(if config.download.links_only {
        "Collecting download links..."
    } else {
        "Downloading book files..."
    });

    let summary = download::fetch_book(session, book, &config.download).await;

    for error in &summary.errors {
        console.warning(error);
    }
    if config.download.links_only {
        console.success(&format!("Found {} download links", summary.links.len()));
    } else {
        console.success(&format!("{} files ready", summary.files.len()));
        if let Some(archive) = &summary.archive {
            console.info(&format!("Archive: {}", archive.display()));
        }
    }

    Some(summary)
}

fn failed(console: &Console, stage: Stage, error: SiteError) -> Report {
    tracing::error!(%stage, error = %error, "run failed");
    console.error(&format!("{} failed: {}", stage, error));
    Report::new(Outcome::Failed { stage, error })
}
