//! Email notification of a run's result.

use crate::config::{EmailConfig, SmtpSecurity};
use crate::error::NotifyError;
use crate::grabber::{Outcome, Report};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::fmt::Write as _;
use std::path::Path;

/// Delivers a finished report somewhere a person will see it.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, report: &Report) -> Result<(), NotifyError>;
}

/// Sends the report as an email over SMTP.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    config: EmailConfig,
}

impl SmtpNotifier {
    pub fn new(config: &EmailConfig) -> Result<Self, NotifyError> {
        let host = config.smtp_host.as_str();
        let builder = match config.security {
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(host)?,
            SmtpSecurity::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?,
            SmtpSecurity::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
        };

        let mut builder = builder.port(config.smtp_port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            config: config.clone(),
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, report: &Report) -> Result<(), NotifyError> {
        let message = compose(report, &self.config)?;
        let response = self.transport.send(message).await?;
        tracing::debug!(code = %response.code(), "mail accepted");
        Ok(())
    }
}

/// Builds the notification email for a report.
pub fn compose(report: &Report, config: &EmailConfig) -> Result<Message, NotifyError> {
    let mut builder = Message::builder()
        .from(config.from.parse::<Mailbox>()?)
        .subject(subject(report));
    for to in &config.to {
        builder = builder.to(to.parse::<Mailbox>()?);
    }

    let body = MultiPart::alternative_plain_html(render_text(report), render_html(report));

    let attachments = match (&report.downloads, config.attach) {
        (Some(downloads), true) => downloads.attachments(),
        _ => Vec::new(),
    };

    if attachments.is_empty() {
        return Ok(builder.multipart(body)?);
    }

    let mut mixed = MultiPart::mixed().multipart(body);
    for path in attachments {
        mixed = mixed.singlepart(attachment(path)?);
    }
    Ok(builder.multipart(mixed)?)
}

fn attachment(path: &Path) -> Result<lettre::message::SinglePart, NotifyError> {
    let bytes = std::fs::read(path).map_err(|source| NotifyError::Attachment {
        path: path.to_path_buf(),
        source,
    })?;

    let mime = match path.extension().and_then(|e| e.to_str()) {
        Some("pdf") => "application/pdf",
        Some("epub") => "application/epub+zip",
        Some("mobi") => "application/x-mobipocket-ebook",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    };

    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());

    Ok(Attachment::new(filename).body(bytes, ContentType::parse(mime)?))
}

/// Subject line summarising the outcome.
pub fn subject(report: &Report) -> String {
    format!("[grabpackt] {}", report.outcome.summary())
}

fn headline(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Claimed(offer) => {
            format!("Today's free book '{}' was added to your library.", offer.title)
        }
        Outcome::AlreadyOwned(offer) => {
            format!("Today's free book '{}' was already in your library.", offer.title)
        }
        Outcome::Failed { stage, error } => {
            format!("Claiming today's free book failed at the {} step: {}", stage, error)
        }
    }
}

/// Plain-text body.
pub fn render_text(report: &Report) -> String {
    let mut text = headline(&report.outcome);
    text.push('\n');

    if let Some(downloads) = &report.downloads {
        if !downloads.links.is_empty() {
            text.push_str("\nDownload links:\n");
            for link in &downloads.links {
                let _ = writeln!(text, "  {}: {}", link.format.name(), link.url);
            }
        }

        if !downloads.files.is_empty() {
            text.push_str("\nDownloaded files:\n");
            for file in &downloads.files {
                let _ = writeln!(text, "  {}", file.display());
            }
        }

        if let Some(archive) = &downloads.archive {
            let _ = writeln!(text, "\nArchive: {}", archive.display());
        }

        if !downloads.errors.is_empty() {
            text.push_str("\nProblems:\n");
            for error in &downloads.errors {
                let _ = writeln!(text, "  {}", error);
            }
        }
    }

    text
}

/// HTML body.
pub fn render_html(report: &Report) -> String {
    let mut html = String::from("<html><body>\n");
    let _ = writeln!(html, "<p>{}</p>", escape_html(&headline(&report.outcome)));

    if let Some(downloads) = &report.downloads {
        if !downloads.links.is_empty() {
            html.push_str("<h3>Download links</h3>\n<ul>\n");
            for link in &downloads.links {
                let url = escape_html(link.url.as_str());
                let _ = writeln!(
                    html,
                    "<li><a href=\"{}\">{}</a></li>",
                    url,
                    link.format.name()
                );
            }
            html.push_str("</ul>\n");
        }

        if !downloads.files.is_empty() {
            html.push_str("<h3>Downloaded files</h3>\n<ul>\n");
            for file in &downloads.files {
                let _ = writeln!(html, "<li>{}</li>", escape_html(&file.display().to_string()));
            }
            html.push_str("</ul>\n");
        }

        if !downloads.errors.is_empty() {
            html.push_str("<h3>Problems</h3>\n<ul>\n");
            for error in &downloads.errors {
                let _ = writeln!(html, "<li>{}</li>", escape_html(error));
            }
            html.push_str("</ul>\n");
        }
    }

    html.push_str("</body></html>\n");
    html
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
