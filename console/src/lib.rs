pub mod backend;
pub mod command;
pub mod config;
pub mod dres;
pub mod grouping;
pub mod notify;
pub mod query;
pub mod results;
pub mod search;
pub mod session;
pub mod settings;
pub mod vocabulary;

use std::sync::Arc;

use backend::{BackendError, HttpRetrievalBackend};
use config::ConsoleConfig;
use dres::{DresClient, DresError};
use notify::Notifier;
use results::ResultStore;
use search::SearchController;
use session::SessionManager;
use settings::{SettingsError, SettingsStore};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("HTTP client setup failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Retrieval backend setup failed: {0}")]
    Backend(#[from] BackendError),
    #[error("DRES client setup failed: {0}")]
    Dres(#[from] DresError),
}

/// Every store and service of the console, wired together. Cloning shares
/// the same underlying state.
#[derive(Clone)]
pub struct SearchConsole {
    pub settings: SettingsStore,
    pub results: ResultStore,
    pub notifier: Notifier,
    pub search: SearchController,
    pub session: SessionManager,
    pub backend: HttpRetrievalBackend,
}

impl SearchConsole {
    pub fn from_config(config: &ConsoleConfig) -> Result<Self, StartupError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        let backend = HttpRetrievalBackend::new(http_client.clone(), &config.backend_url)?;
        let dres = DresClient::new(
            http_client,
            &config.dres.url,
            config.dres.username.clone(),
            config.dres.password.clone(),
        )?;

        let settings = SettingsStore::new(config.search.clone())?;
        let results = ResultStore::new();
        let notifier = Notifier::new();

        let search = SearchController::new(
            Arc::new(backend.clone()),
            settings.clone(),
            results.clone(),
            notifier.clone(),
        );
        let session = SessionManager::new(Arc::new(dres), notifier.clone());

        Ok(Self {
            settings,
            results,
            notifier,
            search,
            session,
            backend,
        })
    }
}
