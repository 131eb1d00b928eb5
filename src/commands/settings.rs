//! `config show` and `config set`

use prettytable::{cell, row, Table};

use crate::error::{Result, TrackerError};
use crate::store::{ConfigKey, ConfigStore, DispatchConfig};

/// Print the current dispatch settings as a table or as JSON
pub async fn show(store: &dyn ConfigStore, json: bool) -> Result<()> {
    let config = store.load().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        render_table(&config).printstd();
    }
    Ok(())
}

/// Merge `patch` into the stored settings
///
/// # Errors
///
/// Returns `TrackerError::Config` when `patch` sets nothing
pub async fn set(store: &dyn ConfigStore, patch: DispatchConfig) -> Result<()> {
    if patch.is_empty() {
        return Err(TrackerError::Config(
            "Nothing to set: pass --mode, --team-id or --member-id".to_string(),
        )
        .into());
    }

    store.set(patch).await?;
    let config = store.load().await?;
    println!("Dispatch settings updated");
    render_table(&config).printstd();
    Ok(())
}

/// Key/value table of the dispatch settings
pub fn render_table(config: &DispatchConfig) -> Table {
    let mut table = Table::new();
    table.add_row(row!["Key", "Value"]);
    for key in ConfigKey::ALL {
        let value = match key {
            ConfigKey::Mode => config.mode.as_ref().map(|m| m.to_string()),
            ConfigKey::TeamId => config.team_id.clone(),
            ConfigKey::MemberId => config.member_id.clone(),
        }
        .unwrap_or_else(|| "(unset)".to_string());
        table.add_row(row![key.as_str(), value]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_render_table_marks_unset_keys() {
        let table = render_table(&DispatchConfig::login());
        let text = table.to_string();
        assert!(text.contains("mode"));
        assert!(text.contains("login"));
        assert!(text.contains("(unset)"));
        assert_eq!(table.len(), 4);
    }

    #[tokio::test]
    async fn test_set_rejects_empty_patch() {
        let store = MemoryStore::default();
        let err = set(&store, DispatchConfig::default()).await.unwrap_err();
        assert!(err.to_string().contains("Nothing to set"));
    }

    #[tokio::test]
    async fn test_set_merges_into_store() {
        let store = MemoryStore::new(DispatchConfig::token("t-1", "m-2"));
        set(
            &store,
            DispatchConfig {
                member_id: Some("m-9".to_string()),
                ..DispatchConfig::default()
            },
        )
        .await
        .unwrap();
        let config = store.load().await.unwrap();
        assert_eq!(config.team_id.as_deref(), Some("t-1"));
        assert_eq!(config.member_id.as_deref(), Some("m-9"));
    }
}
