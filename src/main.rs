use clap::Parser;
use report_harvester::{CrawlOutcome, Harvest};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

mod args;
use args::Args;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    env_logger::init();

    let args = Args::parse();
    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("report-harvester: {e}");
            return ExitCode::FAILURE;
        }
    };

    ::log::info!("Starting report harvest for feed: {}", config.base_url);
    println!("Note: harvesting requires a WebDriver server (e.g., ChromeDriver).");
    println!(
        "Set WEBDRIVER_URL environment variable if not using {}",
        config.browser.webdriver_url
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ::log::warn!("Interrupt received, stopping after the current step");
            on_signal.cancel();
        }
    });

    let start_time = std::time::Instant::now();
    match Harvest::new(config).with_cancellation(cancel).run().await {
        Ok(report) => {
            ::log::info!(
                "Harvest {} - {} links ({} new) over {} pages in {:.2} seconds",
                match report.outcome {
                    CrawlOutcome::Completed => "complete",
                    CrawlOutcome::Interrupted => "interrupted",
                },
                report.total_links,
                report.new_links,
                report.pages_processed,
                start_time.elapsed().as_secs_f64()
            );
            if report.challenges > 0 {
                ::log::info!("Waited out {} bot challenge(s)", report.challenges);
            }
            ExitCode::SUCCESS
        }
        Err(failure) => {
            ::log::error!("Harvest failed: {}", failure);
            eprintln!("report-harvester: {failure}");
            ExitCode::FAILURE
        }
    }
}
