#![forbid(unsafe_code)]

pub mod cli;
pub mod content;
pub mod epub;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod metadata;
pub mod normalize;
pub mod page;
pub mod paywall;
pub mod scrape;
pub mod session;
pub mod store;

pub use error::ScrapeError;
pub use scrape::{ScrapeOptions, ScrapeResult, Scraper};
