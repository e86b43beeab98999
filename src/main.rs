//! grabpackt CLI - claim the daily free Packt ebook.

use anyhow::{Context, Result};
use clap::Parser;
use grabpackt::config::Config;
use grabpackt::console::Console;
use grabpackt::notify::{Notifier, SmtpNotifier};
use grabpackt::{grabber, logging};
use std::path::PathBuf;
use std::process::ExitCode;

/// Claims today's free ebook from Packt Publishing.
#[derive(Parser, Debug)]
#[command(name = "grabpackt")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file to use instead of the default one.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    logging::init_logger();
    let console = Console::new();

    console.section("grabpackt - Free Learning");

    // Load configuration
    console.step("Loading configuration...");
    let config_path = match args.config {
        Some(path) => path,
        None => {
            let path = Config::config_path()?;
            if Config::write_template_if_missing(&path)
                .context("Failed to write config template")?
            {
                console.warning(&format!(
                    "No configuration found. A template was written to: {}",
                    path.display()
                ));
                console.info("Fill in your Packt login (and email settings) and run again.");
                return Ok(ExitCode::from(2));
            }
            path
        }
    };

    let config = Config::load_from(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    config.validate().context("Invalid configuration")?;
    console.success("Configuration loaded");

    let smtp = if config.email.enabled {
        Some(SmtpNotifier::new(&config.email).context("Invalid SMTP settings")?)
    } else {
        console.info("Email notification disabled");
        None
    };
    let notifier = smtp.as_ref().map(|n| n as &dyn Notifier);

    let report = grabber::run(&config, notifier, &console).await;

    console.report(&report);

    Ok(ExitCode::from(report.exit_status()))
}
