//! Downloading and bundling the files of an owned book.

use crate::config::{BookFormat, DownloadConfig};
use crate::error::DownloadError;
use crate::site::{DownloadLink, OwnedBook, PacktSession};
use std::fs::File;
use std::path::{Path, PathBuf};
use zip::write::{SimpleFileOptions, ZipWriter};

/// What the download step produced.
#[derive(Debug, Clone, Default)]
pub struct DownloadSummary {
    /// Links resolved for the requested formats.
    pub links: Vec<DownloadLink>,

    /// Files present on disk after the step.
    pub files: Vec<PathBuf>,

    /// Archive bundling the files, if one was created.
    pub archive: Option<PathBuf>,

    /// Failures that didn't stop the step.
    pub errors: Vec<String>,
}

impl DownloadSummary {
    /// Files worth attaching to a notification: the archive if any, else the files.
    pub fn attachments(&self) -> Vec<&Path> {
        match &self.archive {
            Some(archive) => vec![archive.as_path()],
            None => self.files.iter().map(PathBuf::as_path).collect(),
        }
    }
}

/// Resolves links for the book and, unless only links are wanted, downloads them.
///
/// Individual failures are recorded in the summary and the remaining formats
/// are still attempted.
pub async fn fetch_book(
    session: &PacktSession,
    book: &OwnedBook,
    config: &DownloadConfig,
) -> DownloadSummary {
    let mut summary = DownloadSummary::default();

    match book.download_links(&config.formats, session.base()) {
        Ok(links) => summary.links = links,
        Err(e) => {
            summary.errors.push(e.to_string());
            return summary;
        }
    }

    if summary.links.is_empty() {
        tracing::warn!(book = %book.id, "none of the requested formats are available");
    }

    if config.links_only {
        return summary;
    }

    let book_dir = config.directory.join(&book.id);
    if let Err(e) = tokio::fs::create_dir_all(&book_dir).await {
        summary.errors.push(format!("{}: {}", book_dir.display(), e));
        return summary;
    }

    let mut downloaded: Vec<(BookFormat, PathBuf)> = Vec::new();
    for link in &summary.links {
        let dest = book_dir.join(format!("{}.{}", book.id, link.format.extension()));

        match fetch_file(session, link, &dest).await {
            Ok(()) => downloaded.push((link.format, dest)),
            Err(e) => {
                tracing::warn!(url = %link.url, error = %e, "download failed");
                summary
                    .errors
                    .push(format!("{} download failed: {}", link.format.name(), e));
            }
        }
    }

    if config.zip && (downloaded.len() > 1 || (config.force_zip && !downloaded.is_empty())) {
        let (files, title, dir) = (
            downloaded.clone(),
            book.title.clone(),
            config.directory.clone(),
        );
        let archived = tokio::task::spawn_blocking(move || create_archive(&files, &title, &dir))
            .await
            .map_err(DownloadError::from)
            .and_then(|result| result);
        match archived {
            Ok(path) => summary.archive = Some(path),
            Err(e) => summary.errors.push(e.to_string()),
        }
    }

    summary.files = downloaded.into_iter().map(|(_, path)| path).collect();
    summary
}

/// Downloads a file unless it is already on disk.
async fn fetch_file(
    session: &PacktSession,
    link: &DownloadLink,
    dest: &Path,
) -> Result<(), DownloadError> {
    if tokio::fs::try_exists(dest).await? {
        tracing::debug!(path = %dest.display(), "already downloaded");
        return Ok(());
    }

    session.download(link, dest).await
}

/// Bundles files into `{dir}/{title}.zip`, naming entries `{title}.{ext}`.
fn create_archive(
    files: &[(BookFormat, PathBuf)],
    title: &str,
    dir: &Path,
) -> Result<PathBuf, DownloadError> {
    let name = sanitize_filename(title);
    let archive_path = dir.join(format!("{}.zip", name));

    let mut zip = ZipWriter::new(File::create(&archive_path)?);
    for (format, path) in files {
        zip.start_file(
            format!("{}.{}", name, format.extension()),
            SimpleFileOptions::default(),
        )?;
        let mut source = File::open(path)?;
        std::io::copy(&mut source, &mut zip)?;
    }

    zip.finish()?;
    Ok(archive_path)
}

/// Replaces characters that aren't allowed in file names.
fn sanitize_filename(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = cleaned.trim().trim_matches('.');
    if trimmed.is_empty() {
        "book".to_string()
    } else {
        trimmed.to_string()
    }
}
