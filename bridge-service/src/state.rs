//! Application state for the bridge service.

use common::config::AppConfig;
use common::errors::AppResult;

use crate::dispatcher::Dispatcher;
use crate::http_client::EnvelopeClient;
use crate::pg_driver::PgDriver;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub dispatcher: Dispatcher<PgDriver>,
}

impl AppState {
    /// Creates the state with a fresh HTTP client and no database session.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let http = EnvelopeClient::new(&config)?;
        let driver = PgDriver::new(&config);
        Ok(Self {
            dispatcher: Dispatcher::new(http, driver),
            config,
        })
    }
}
