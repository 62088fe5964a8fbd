pub mod ai;
pub mod config;
pub mod discovery;
pub mod extract;
pub mod filter;
pub mod marker;
pub mod models;
pub mod reconcile;
pub mod session;
pub mod store;
mod utils;

use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use ai::{AiClient, AiError, AiSettings, TextCompletion};
use config::ConfigStore;
use extract::ExtractError;
use filter::FilterCriteria;
use marker::MarkerLayer;
use models::{DateChange, DiscoveryCandidate, Festival};
use session::{SessionContext, SessionError};
use store::{FestivalStore, StoreError};

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Ai(#[from] AiError),
    #[error(transparent)]
    Malformed(#[from] ExtractError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterOptions {
    pub genres: Vec<String>,
    pub countries: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingCandidate {
    pub candidate: DiscoveryCandidate,
    pub country: String,
    pub added_as: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChange {
    pub change: DateChange,
    pub applied: bool,
}

/// The map page: festival list, operator session and the two review queues
/// filled by AI discovery and AI date checks.
///
/// The AI actions take `&mut self`, so a second request of the same kind
/// cannot start while one is outstanding.
pub struct FestiMap {
    store: FestivalStore,
    config: ConfigStore,
    session: SessionContext,
    discovered: Vec<PendingCandidate>,
    date_changes: Vec<PendingChange>,
}

impl FestiMap {
    /// Loads the festival document named by the config. Without one, the
    /// document in the data root is used if present, otherwise the bundled
    /// sample. A failed load is logged and the map starts empty.
    pub fn start(config: ConfigStore) -> Self {
        if let Some(path) = config.read().festivals_path() {
            return Self::start_from(&path, config);
        }
        let default_path = utils::default_festivals_path();
        if default_path.exists() {
            return Self::start_from(&default_path, config);
        }

        log::info!(
            "no festival document at {}, using the bundled sample",
            default_path.display()
        );
        let mut store = FestivalStore::new();
        if let Err(err) = store.load_str(store::BUNDLED_DOCUMENT) {
            log::error!("{err}; continuing with an empty festival list");
        }
        Self::with_store(store, config)
    }

    pub fn start_from(path: &Path, config: ConfigStore) -> Self {
        let mut store = FestivalStore::new();
        if let Err(err) = store.load_path(path) {
            log::error!("{err}; continuing with an empty festival list");
        }
        Self::with_store(store, config)
    }

    pub fn with_store(store: FestivalStore, config: ConfigStore) -> Self {
        let session = SessionContext::init(&config.read());
        Self {
            store,
            config,
            session,
            discovered: Vec::new(),
            date_changes: Vec::new(),
        }
    }

    pub fn store(&self) -> &FestivalStore {
        &self.store
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn filter_options(&self) -> FilterOptions {
        FilterOptions {
            genres: self.store.distinct_genres(),
            countries: self.store.distinct_countries(),
        }
    }

    pub fn visible(&self, criteria: &FilterCriteria) -> Vec<&Festival> {
        filter::filter(self.store.festivals(), criteria)
    }

    pub fn render(&self, criteria: &FilterCriteria) -> MarkerLayer {
        marker::render_markers(self.store.festivals(), criteria)
    }

    pub fn login(&mut self, password: &str) -> Result<(), ActionError> {
        Ok(self.session.login(password, &self.config)?)
    }

    pub fn logout(&mut self) -> Result<(), ActionError> {
        self.discovered.clear();
        self.date_changes.clear();
        Ok(self.session.logout(&self.config)?)
    }

    pub fn set_api_key(&mut self, key: &str) -> Result<(), ActionError> {
        Ok(self.session.set_api_key(key, &self.config)?)
    }

    pub fn set_password(&mut self, password: &str) -> Result<(), ActionError> {
        Ok(self.session.set_password(password, &self.config)?)
    }

    /// Client for the configured AI service, using the session's key.
    pub fn ai_client(&self) -> Result<AiClient, ActionError> {
        let key = self.require_ai_access()?;
        Ok(AiClient::new(AiSettings::from_config(&self.config.read()), key)?)
    }

    /// Asks the AI for festivals in `country` that the store does not know
    /// yet. Replaces the previous discovery queue.
    pub async fn discover(
        &mut self,
        ai: &dyn TextCompletion,
        country: &str,
    ) -> Result<&[PendingCandidate], ActionError> {
        self.require_ai_access()?;
        let country = require_country(country)?;
        self.discovered.clear();

        let known_here: Vec<&str> = self
            .store
            .in_country(&country)
            .map(|f| f.name.as_str())
            .collect();
        let prompt = discovery::build_discovery_prompt(&country, &known_here);

        log::info!("discovering festivals in {country}");
        let raw = ai.complete(&prompt).await?;
        let candidates = discovery::ingest(&raw, self.store.existing_names())?;

        self.discovered = candidates
            .into_iter()
            .map(|candidate| PendingCandidate {
                candidate,
                country: country.clone(),
                added_as: None,
            })
            .collect();
        Ok(&self.discovered)
    }

    pub fn discovered(&self) -> &[PendingCandidate] {
        &self.discovered
    }

    /// Adds a reviewed candidate to the store. Accepting the same candidate
    /// again returns the id it was stored under.
    pub fn accept_candidate(&mut self, index: usize) -> Result<u64, ActionError> {
        let pending = self
            .discovered
            .get_mut(index)
            .ok_or_else(|| ActionError::Validation(format!("no discovered festival #{index}")))?;
        if let Some(id) = pending.added_as {
            return Ok(id);
        }
        let id = self.store.add(&pending.candidate, &pending.country)?;
        pending.added_as = Some(id);
        Ok(id)
    }

    /// Asks the AI to check the dates of every stored festival in `country`.
    /// Replaces the previous change queue; nothing is applied yet.
    pub async fn check_dates(
        &mut self,
        ai: &dyn TextCompletion,
        country: &str,
    ) -> Result<&[PendingChange], ActionError> {
        self.require_ai_access()?;
        let country = require_country(country)?;
        self.date_changes.clear();

        let checked: Vec<Festival> = self.store.in_country(&country).cloned().collect();
        if checked.is_empty() {
            return Err(ActionError::Validation(format!(
                "no festivals stored for {country}"
            )));
        }
        let prompt = reconcile::build_date_check_prompt(&checked);

        log::info!("checking dates of {} festivals in {country}", checked.len());
        let raw = ai.complete(&prompt).await?;
        let changes = reconcile::reconcile(&raw, &checked)?;

        self.date_changes = changes
            .into_iter()
            .map(|change| PendingChange {
                change,
                applied: false,
            })
            .collect();
        Ok(&self.date_changes)
    }

    pub fn pending_changes(&self) -> &[PendingChange] {
        &self.date_changes
    }

    /// Applies one approved change. Returns `false` if it was already applied.
    pub fn apply_change(&mut self, index: usize) -> Result<bool, ActionError> {
        let pending = self
            .date_changes
            .get_mut(index)
            .ok_or_else(|| ActionError::Validation(format!("no date change #{index}")))?;
        if pending.applied {
            return Ok(false);
        }
        let change = &pending.change;
        self.store
            .apply_date_update(change.festival_id, change.new_start, change.new_end)?;
        pending.applied = true;
        Ok(true)
    }

    pub fn export(&self, path: &Path) -> Result<(), ActionError> {
        Ok(self.store.export_to(path)?)
    }

    fn require_ai_access(&self) -> Result<&str, ActionError> {
        if !self.session.is_admin() {
            return Err(ActionError::Validation("admin login required".into()));
        }
        self.session
            .api_key()
            .ok_or_else(|| ActionError::Validation("set an AI API key first".into()))
    }
}

fn require_country(country: &str) -> Result<String, ActionError> {
    let country = country.trim();
    if country.is_empty() {
        return Err(ActionError::Validation("select a country first".into()));
    }
    Ok(country.to_string())
}
