use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;
use kindexport::cli::{Cli, Command};
use kindexport::store::{ArticleRecord, ArticleStore as _, LocalFsArticleStore, dedup_key};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    kindexport::logging::init(&cli.global.log_level).context("init logging")?;
    tracing::debug!(command = ?cli.command, "parsed cli");

    let scraper = kindexport::Scraper::new(cli.global.scrape_options());
    let session = cli.global.session_token();

    match cli.command {
        Command::Scrape(args) => {
            let store = LocalFsArticleStore::new(&cli.global.store);
            let key = dedup_key(&args.url);
            if let Some(record) = store.find(&key).await.context("look up article")? {
                tracing::info!(%key, path = %record.file_path.display(), "already exported");
                println!("{}", record.file_path.display());
                return Ok(());
            }

            let result = scraper.scrape(&args.url, session).await.context("scrape")?;
            for skipped in &result.skipped {
                tracing::debug!(element = %skipped.element, reason = %skipped.reason, "skipped");
            }
            store
                .insert(&ArticleRecord::from_result(&args.url, &result))
                .await
                .context("record article")?;
            println!("{}", result.file_path.display());
        }
        Command::CheckPaywall(args) => {
            let accessible = scraper
                .check_paywall_accessible(&args.url, session)
                .await
                .context("check paywall")?;
            println!("{}", if accessible { "accessible" } else { "paywalled" });
        }
    }

    Ok(())
}
