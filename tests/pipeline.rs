use async_trait::async_trait;
use grabpackt::config::{BookFormat, Config, EmailConfig, SmtpSecurity};
use grabpackt::notify::{Notifier, SmtpNotifier};
use grabpackt::{
    Console, NotificationStatus, NotifyError, Outcome, Report, SiteError, Stage, grabber,
};
use httpmock::prelude::*;
use std::sync::Mutex;
use tempfile::TempDir;

const FORM_BUILD_ID: &str = "form-test-token";
const CLAIM_PATH: &str = "/freelearning-claim/17276/21478";

const LOGIN_PAGE: &str = r#"
<html><body>
<form id="packt-user-login-form" action="/" method="post">
  <input type="text" name="email">
  <input type="password" name="password">
  <input type="hidden" name="form_build_id" value="form-test-token">
  <input type="hidden" name="form_id" value="packt_user_login_form">
</form>
</body></html>
"#;

const OFFER_PAGE: &str = r#"
<html><body>
  <div class="dotd-title"><h2>Mastering Rust</h2></div>
  <div class="float-left free-ebook">
    <a href="/freelearning-claim/17276/21478"><input type="button" value="Claim"></a>
  </div>
</body></html>
"#;

const EMPTY_LIBRARY: &str = r#"
<html><body><div id="product-account-list"></div></body></html>
"#;

const OWNED_LIBRARY: &str = r#"
<html><body>
<div id="product-account-list">
  <div class="product-line" nid="17276" title="Mastering Rust">
    <a href="/ebook_download/17276/pdf">PDF</a>
    <a href="/ebook_download/17276/epub">ePub</a>
  </div>
</div>
</body></html>
"#;

fn config_for(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.account.email = "reader@example.com".to_string();
    config.account.password = "hunter2".to_string();
    config.site.base_url = server.url("/");
    config.site.delay_between_requests_sec = 0.0;
    config.site.timeout_sec = 5;
    config
}

fn console() -> Console {
    Console::with_colors(false)
}

/// Mocks the login page and a successful login post.
async fn mock_login(server: &MockServer) {
    server
        .mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(200)
                .header("content-type", "text/html")
                .body(LOGIN_PAGE);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/")
                .body_contains(format!("form_build_id={}", FORM_BUILD_ID))
                .body_contains("form_id=packt_user_login_form")
                .body_contains("op=Login");
            then.status(200)
                .header("content-type", "text/html")
                .body("<html><body>Welcome back</body></html>");
        })
        .await;
}

async fn mock_page<'a>(server: &'a MockServer, path: &str, body: &str) -> httpmock::Mock<'a> {
    let (path, body) = (path.to_string(), body.to_string());
    server
        .mock_async(move |when, then| {
            when.method(GET).path(path);
            then.status(200).header("content-type", "text/html").body(body);
        })
        .await
}

/// Records subjects of the reports it is asked to deliver.
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, report: &Report) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push(grabpackt::notify::subject(report));
        Ok(())
    }
}

/// SMTP settings pointing at a port nobody listens on.
fn unreachable_smtp() -> EmailConfig {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    EmailConfig {
        enabled: true,
        smtp_host: "127.0.0.1".to_string(),
        smtp_port: port,
        security: SmtpSecurity::None,
        to: vec!["reader@example.com".to_string()],
        ..EmailConfig::default()
    }
}

#[tokio::test]
async fn test_claims_offer_missing_from_library() {
    let server = MockServer::start_async().await;
    mock_login(&server).await;
    mock_page(&server, "/packt/offers/free-learning", OFFER_PAGE).await;
    mock_page(&server, "/account/my-ebooks", EMPTY_LIBRARY).await;
    let claim = server
        .mock_async(|when, then| {
            when.method(GET)
                .path(CLAIM_PATH)
                .header("referer", server.url("/packt/offers/free-learning").as_str());
            then.status(200)
                .header("content-type", "text/html")
                .body(OWNED_LIBRARY);
        })
        .await;

    let config = config_for(&server);
    let notifier = RecordingNotifier::default();
    let report = grabber::run(&config, Some(&notifier), &console()).await;

    match &report.outcome {
        Outcome::Claimed(offer) => {
            assert_eq!(offer.id, "17276");
            assert_eq!(offer.title, "Mastering Rust");
        }
        other => panic!("expected a claim, got {:?}", other),
    }
    claim.assert_async().await;
    assert_eq!(report.exit_status(), 0);
    assert_eq!(report.notification, NotificationStatus::Sent);
    assert_eq!(
        notifier.sent.lock().unwrap().as_slice(),
        ["[grabpackt] Claimed: Mastering Rust"]
    );
}

#[tokio::test]
async fn test_owned_offer_is_not_claimed() {
    let server = MockServer::start_async().await;
    mock_login(&server).await;
    mock_page(&server, "/packt/offers/free-learning", OFFER_PAGE).await;
    mock_page(&server, "/account/my-ebooks", OWNED_LIBRARY).await;
    let claim = mock_page(&server, CLAIM_PATH, OWNED_LIBRARY).await;

    let report = grabber::run(&config_for(&server), None, &console()).await;

    assert!(matches!(report.outcome, Outcome::AlreadyOwned(_)));
    assert_eq!(claim.hits_async().await, 0);
    assert_eq!(report.exit_status(), 0);
    assert_eq!(report.notification, NotificationStatus::Skipped);
}

#[tokio::test]
async fn test_rejected_login_stops_run() {
    for status in [401, 403] {
        let server = MockServer::start_async().await;
        mock_page(&server, "/", LOGIN_PAGE).await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/");
                then.status(status);
            })
            .await;
        let offer = mock_page(&server, "/packt/offers/free-learning", OFFER_PAGE).await;
        let claim = mock_page(&server, CLAIM_PATH, OWNED_LIBRARY).await;

        let notifier = RecordingNotifier::default();
        let report = grabber::run(&config_for(&server), Some(&notifier), &console()).await;

        assert!(
            matches!(
                report.outcome,
                Outcome::Failed {
                    stage: Stage::Login,
                    error: SiteError::LoginRejected(_)
                }
            ),
            "status {}: {:?}",
            status,
            report.outcome
        );
        assert_ne!(report.exit_status(), 0);
        assert_eq!(offer.hits_async().await, 0);
        assert_eq!(claim.hits_async().await, 0);
        assert_eq!(
            notifier.sent.lock().unwrap().as_slice(),
            ["[grabpackt] Failed at login"]
        );
    }
}

#[tokio::test]
async fn test_login_error_banner_is_rejection() {
    let server = MockServer::start_async().await;
    mock_page(&server, "/", LOGIN_PAGE).await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/");
            then.status(200).body(
                r#"<div class="messages error">Sorry, unrecognized username or password.</div>"#,
            );
        })
        .await;

    let report = grabber::grab(&config_for(&server), &console()).await;

    match report.outcome {
        Outcome::Failed {
            stage: Stage::Login,
            error: SiteError::LoginRejected(message),
        } => assert!(message.contains("unrecognized username")),
        other => panic!("expected login rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_offer_page_fails() {
    let server = MockServer::start_async().await;
    mock_login(&server).await;
    mock_page(
        &server,
        "/packt/offers/free-learning",
        "<html><body><h1>We'll be back soon</h1></body></html>",
    )
    .await;
    let library = mock_page(&server, "/account/my-ebooks", EMPTY_LIBRARY).await;

    let report = grabber::run(&config_for(&server), None, &console()).await;

    assert!(matches!(
        report.outcome,
        Outcome::Failed {
            stage: Stage::Offer,
            error: SiteError::ElementNotFound(_)
        }
    ));
    assert_ne!(report.exit_status(), 0);
    assert_eq!(library.hits_async().await, 0);
}

#[tokio::test]
async fn test_claim_not_reflected_in_library_is_rejected() {
    let server = MockServer::start_async().await;
    mock_login(&server).await;
    mock_page(&server, "/packt/offers/free-learning", OFFER_PAGE).await;
    mock_page(&server, "/account/my-ebooks", EMPTY_LIBRARY).await;
    mock_page(&server, CLAIM_PATH, EMPTY_LIBRARY).await;

    let report = grabber::grab(&config_for(&server), &console()).await;

    assert!(matches!(
        report.outcome,
        Outcome::Failed {
            stage: Stage::Claim,
            error: SiteError::ClaimRejected(_)
        }
    ));
    assert_eq!(report.exit_status(), 1);
}

#[tokio::test]
async fn test_mail_failure_keeps_successful_exit() {
    let server = MockServer::start_async().await;
    mock_login(&server).await;
    mock_page(&server, "/packt/offers/free-learning", OFFER_PAGE).await;
    mock_page(&server, "/account/my-ebooks", EMPTY_LIBRARY).await;
    mock_page(&server, CLAIM_PATH, OWNED_LIBRARY).await;

    let mut config = config_for(&server);
    config.email = unreachable_smtp();
    config.validate().unwrap();
    let smtp = SmtpNotifier::new(&config.email).unwrap();

    let report = grabber::run(&config, Some(&smtp), &console()).await;

    assert!(matches!(report.outcome, Outcome::Claimed(_)));
    assert!(matches!(report.notification, NotificationStatus::Failed(_)));
    assert_eq!(report.exit_status(), 0);
}

#[tokio::test]
async fn test_second_run_same_day_is_idempotent() {
    let server = MockServer::start_async().await;
    mock_login(&server).await;
    mock_page(&server, "/packt/offers/free-learning", OFFER_PAGE).await;
    let mut empty = mock_page(&server, "/account/my-ebooks", EMPTY_LIBRARY).await;
    let claim = mock_page(&server, CLAIM_PATH, OWNED_LIBRARY).await;
    let config = config_for(&server);

    let first = grabber::grab(&config, &console()).await;
    assert!(matches!(first.outcome, Outcome::Claimed(_)));
    claim.assert_async().await;

    // The site now lists the claimed book
    empty.delete_async().await;
    mock_page(&server, "/account/my-ebooks", OWNED_LIBRARY).await;

    let second = grabber::grab(&config, &console()).await;
    assert!(matches!(second.outcome, Outcome::AlreadyOwned(_)));
    assert_eq!(second.exit_status(), 0);
    claim.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_downloads_requested_formats() {
    let server = MockServer::start_async().await;
    let dir = TempDir::new().unwrap();
    mock_login(&server).await;
    mock_page(&server, "/packt/offers/free-learning", OFFER_PAGE).await;
    mock_page(&server, "/account/my-ebooks", OWNED_LIBRARY).await;
    let pdf = server
        .mock_async(|when, then| {
            when.method(GET).path("/ebook_download/17276/pdf");
            then.status(200).body("%PDF-1.4 fake");
        })
        .await;
    let epub = server
        .mock_async(|when, then| {
            when.method(GET).path("/ebook_download/17276/epub");
            then.status(200).body("PK fake epub");
        })
        .await;

    let mut config = config_for(&server);
    config.download.enabled = true;
    config.download.links_only = false;
    config.download.zip = true;
    config.download.formats = vec![BookFormat::Pdf, BookFormat::Mobi, BookFormat::Epub];
    config.download.directory = dir.path().to_path_buf();

    let report = grabber::grab(&config, &console()).await;
    assert!(matches!(report.outcome, Outcome::AlreadyOwned(_)));

    let downloads = report.downloads.expect("downloads enabled");
    assert!(downloads.errors.is_empty(), "{:?}", downloads.errors);
    assert_eq!(downloads.links.len(), 2);
    assert_eq!(downloads.files.len(), 2);
    pdf.assert_async().await;
    epub.assert_async().await;

    let pdf_path = dir.path().join("17276").join("17276.pdf");
    assert_eq!(std::fs::read_to_string(&pdf_path).unwrap(), "%PDF-1.4 fake");

    let archive = downloads.archive.expect("two files get zipped");
    assert_eq!(archive, dir.path().join("Mastering Rust.zip"));
    let zip = zip::ZipArchive::new(std::fs::File::open(&archive).unwrap()).unwrap();
    assert_eq!(zip.len(), 2);

    // Files already on disk are not fetched again
    let again = grabber::grab(&config, &console()).await;
    assert_eq!(again.downloads.unwrap().files.len(), 2);
    pdf.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_links_only_downloads_nothing() {
    let server = MockServer::start_async().await;
    mock_login(&server).await;
    mock_page(&server, "/packt/offers/free-learning", OFFER_PAGE).await;
    mock_page(&server, "/account/my-ebooks", OWNED_LIBRARY).await;
    let pdf = mock_page(&server, "/ebook_download/17276/pdf", "%PDF").await;

    let mut config = config_for(&server);
    config.download.enabled = true;
    config.download.formats = vec![BookFormat::Pdf];

    let report = grabber::grab(&config, &console()).await;
    let downloads = report.downloads.unwrap();

    assert_eq!(downloads.links.len(), 1);
    assert_eq!(
        downloads.links[0].url.as_str(),
        server.url("/ebook_download/17276/pdf")
    );
    assert!(downloads.files.is_empty());
    assert_eq!(pdf.hits_async().await, 0);
}

#[tokio::test]
async fn test_failed_download_keeps_successful_outcome() {
    let server = MockServer::start_async().await;
    let dir = TempDir::new().unwrap();
    mock_login(&server).await;
    mock_page(&server, "/packt/offers/free-learning", OFFER_PAGE).await;
    mock_page(&server, "/account/my-ebooks", OWNED_LIBRARY).await;
    let pdf = mock_page(&server, "/ebook_download/17276/pdf", "%PDF-1.4 fake").await;
    let epub = server
        .mock_async(|when, then| {
            when.method(GET).path("/ebook_download/17276/epub");
            then.status(404);
        })
        .await;

    let mut config = config_for(&server);
    config.download.enabled = true;
    config.download.links_only = false;
    config.download.zip = true;
    config.download.formats = vec![BookFormat::Pdf, BookFormat::Epub];
    config.download.directory = dir.path().to_path_buf();

    let notifier = RecordingNotifier::default();
    let report = grabber::run(&config, Some(&notifier), &console()).await;

    assert!(matches!(report.outcome, Outcome::AlreadyOwned(_)));
    assert_eq!(report.exit_status(), 0);
    assert_eq!(report.notification, NotificationStatus::Sent);
    pdf.assert_async().await;
    epub.assert_async().await;

    let downloads = report.downloads.expect("downloads enabled");
    assert_eq!(downloads.files, [dir.path().join("17276").join("17276.pdf")]);
    assert_eq!(downloads.errors.len(), 1);
    assert!(downloads.errors[0].starts_with("epub"), "{:?}", downloads.errors);
    // One file and no force_zip: nothing to bundle
    assert!(downloads.archive.is_none());
    assert!(!dir.path().join("17276").join("17276.epub").exists());
    assert!(!dir.path().join("17276").join("17276.epub.part").exists());
}

#[tokio::test]
async fn test_force_zip_bundles_single_file() {
    let server = MockServer::start_async().await;
    let dir = TempDir::new().unwrap();
    mock_login(&server).await;
    mock_page(&server, "/packt/offers/free-learning", OFFER_PAGE).await;
    mock_page(&server, "/account/my-ebooks", OWNED_LIBRARY).await;
    mock_page(&server, "/ebook_download/17276/pdf", "%PDF-1.4 fake").await;

    let mut config = config_for(&server);
    config.download.enabled = true;
    config.download.links_only = false;
    config.download.zip = true;
    config.download.force_zip = true;
    config.download.formats = vec![BookFormat::Pdf];
    config.download.directory = dir.path().to_path_buf();

    let report = grabber::grab(&config, &console()).await;
    let downloads = report.downloads.expect("downloads enabled");

    assert!(downloads.errors.is_empty(), "{:?}", downloads.errors);
    assert_eq!(downloads.files.len(), 1);
    let archive = downloads.archive.clone().expect("force_zip bundles one file");
    assert_eq!(downloads.attachments(), [archive.as_path()]);

    let mut zip = zip::ZipArchive::new(std::fs::File::open(&archive).unwrap()).unwrap();
    assert_eq!(zip.len(), 1);
    assert!(zip.by_name("Mastering Rust.pdf").is_ok());
}
