//! Markets expiring today.
//!
//! Loads a prediction-market snapshot document once per session, keeps the
//! markets whose end date falls on the current UTC calendar day, and exposes
//! the result as a loading/error/ready view served over HTTP.

mod dashboard;
mod document;
mod filter;
mod loader;
mod market;
mod observability;
mod view;

pub use dashboard::{
    dashboard_router, format_expiry, render_page, MarketCard, StateView, EMPTY_TEXT,
    LOADING_TEXT, PAGE_SUBTITLE, PAGE_TITLE,
};
pub use document::{navigate, navigate_or_default, MARKETS_PATH};
pub use filter::{filter_expiring_today, is_expiring_on_day, parse_end_date};
pub use loader::{
    loader_config_from_env, ConfigError, DataLoader, DocumentFetcher, DocumentSource,
    FetchedDocument, FileFetcher, HttpFetcher, LoadError, LoaderConfig, SourceFetcher,
    DEFAULT_DATA_SOURCE, DEFAULT_LOAD_TIMEOUT_MS,
};
pub use market::{extract_markets, Market, MarketCollection};
pub use observability::{
    init_logging, log_app_bind, log_app_start, log_source_selected, logging_config_from_env,
    LogFormat, LoggingConfig, LoggingInitError,
};
pub use view::{
    system_clock, Clock, InMemoryViewStateSource, ViewController, ViewState, ViewStateSource,
};
