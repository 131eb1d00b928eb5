/*!
Command handlers for the CLI

- `track`: run the session tracker against a browser event feed
- `settings`: show and edit the dispatch settings in the config store
- `auth`: sign the login-mode identity in or out

Handlers are small; the work happens in the library components.
*/

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::store::{ConfigStore, JsonFileStore};

pub mod auth;
pub mod settings;
pub mod track;

/// Open the config store configured in `config`
pub fn open_store(config: &Config) -> Result<Arc<dyn ConfigStore>> {
    let store = JsonFileStore::from_config(&config.store)?;
    tracing::debug!(path = %store.path().display(), "Using dispatch settings file");
    Ok(Arc::new(store))
}
