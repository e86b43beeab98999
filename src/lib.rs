//! grabpackt - claim the daily free Packt Publishing ebook.
//!
//! This library provides functionality for:
//! - Logging into the publisher's website and reading the offer of the day
//! - Claiming the offer unless the library already holds it
//! - Downloading the claimed book and mailing a summary of the run

pub mod config;
pub mod console;
pub mod download;
pub mod error;
pub mod grabber;
pub mod logging;
pub mod notify;
pub mod site;

// Re-export commonly used types
pub use config::Config;
pub use console::Console;
pub use error::{ConfigError, DownloadError, NotifyError, SiteError};
pub use grabber::{NotificationStatus, Outcome, Report, Stage};
pub use notify::{Notifier, SmtpNotifier};
pub use site::{Library, Offer, OwnedBook, PacktSession};
