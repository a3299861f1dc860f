use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::fetch::DEFAULT_USER_AGENT;
use crate::scrape::ScrapeOptions;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Export an article to EPUB and print the package path.
    Scrape(ScrapeArgs),
    /// Report whether the current session can read an article.
    CheckPaywall(CheckPaywallArgs),
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Directory receiving generated packages.
    #[arg(long, global = true, env = "OUTPUT_DIRECTORY", default_value = "output")]
    pub output_dir: PathBuf,

    /// JSON lines file recording exported articles.
    #[arg(long, global = true, env = "ARTICLE_STORE_PATH", default_value = "articles.jsonl")]
    pub store: PathBuf,

    /// Value of the newsletter session cookie, for paid articles.
    #[arg(long, global = true, env = "SUBSTACK_SESSION", hide_env_values = true)]
    pub session: Option<String>,

    /// Deadline for a whole scrape, in seconds.
    #[arg(long, global = true, default_value_t = 60)]
    pub timeout_secs: u64,

    /// User-Agent header sent with every request.
    #[arg(long, global = true, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
}

impl GlobalArgs {
    pub fn session_token(&self) -> Option<&str> {
        self.session
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    pub fn scrape_options(&self) -> ScrapeOptions {
        let deadline = Duration::from_secs(self.timeout_secs.max(1));
        ScrapeOptions {
            output_dir: self.output_dir.clone(),
            user_agent: self.user_agent.clone(),
            request_timeout: deadline,
            deadline,
            ..ScrapeOptions::default()
        }
    }
}

#[derive(Debug, Args)]
pub struct ScrapeArgs {
    /// Article URL (must be http/https).
    #[arg(long)]
    pub url: String,
}

#[derive(Debug, Args)]
pub struct CheckPaywallArgs {
    /// Article URL (must be http/https).
    #[arg(long)]
    pub url: String,
}
