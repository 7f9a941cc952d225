// Due-item selection for one content kind and process

use super::registry::SchedulerPlugin;
use crate::config::SchedulerSettings;
use crate::errors::StorageError;
use crate::models::{ItemId, Process, Timestamp};
use crate::storage::DueQuery;
use std::collections::HashSet;
use tracing::{debug, instrument};

/// Bundles of the plugin's content kind enabled for `process`
pub async fn enabled_bundles(
    plugin: &dyn SchedulerPlugin,
    settings: &SchedulerSettings,
    process: Process,
) -> Result<Vec<String>, StorageError> {
    let entity_type = plugin.entity_type();
    Ok(plugin
        .bundles()
        .await?
        .into_iter()
        .filter(|b| settings.bundle(entity_type, &b.id).enabled(process))
        .map(|b| b.id)
        .collect())
}

/// Ids whose scheduling field for `process` is due at `as_of`
///
/// Earliest due first. Empty when no bundle is enabled for the process.
#[instrument(skip(plugin, settings), fields(entity_type = %plugin.entity_type()))]
pub async fn select_due(
    plugin: &dyn SchedulerPlugin,
    settings: &SchedulerSettings,
    process: Process,
    as_of: Timestamp,
) -> Result<Vec<ItemId>, StorageError> {
    let bundles = enabled_bundles(plugin, settings, process).await?;
    if bundles.is_empty() {
        debug!("No bundle enabled for {}", process.progressive());
        return Ok(Vec::new());
    }

    let storage = plugin.storage();
    let query = DueQuery {
        field: process.field(),
        as_of,
        bundles,
        latest_revision: storage.is_revisionable(),
    };
    let ids = storage.query_due(&query).await?;
    debug!(count = ids.len(), "Due items selected");
    Ok(ids)
}

/// Drop repeated ids, keeping the first occurrence
pub fn dedupe(ids: Vec<ItemId>) -> Vec<ItemId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerSettings;
    use crate::models::{Bundle, SchedulingField};
    use crate::scheduler::registry::NodeScheduler;
    use crate::storage::MockEntityStorage;
    use std::sync::Arc;

    fn settings_with_article_enabled() -> SchedulerSettings {
        let mut settings = SchedulerSettings::default();
        settings.set_bundle("node", "article", |o| o.unpublish_enable = Some(true));
        settings
    }

    fn mock_with_bundles() -> MockEntityStorage {
        let mut storage = MockEntityStorage::new();
        storage.expect_bundles().returning(|| {
            Ok(vec![
                Bundle::new("article", "Article"),
                Bundle::new("page", "Basic page"),
            ])
        });
        storage
    }

    #[tokio::test]
    async fn test_select_due_queries_enabled_bundles() {
        let mut storage = mock_with_bundles();
        storage.expect_is_revisionable().return_const(true);
        storage
            .expect_query_due()
            .withf(|q| {
                q.field == SchedulingField::UnpublishOn
                    && q.bundles == vec!["article".to_string()]
                    && q.as_of == 1_000
                    && q.latest_revision
            })
            .times(1)
            .returning(|_| Ok(vec![4, 2]));

        let plugin = NodeScheduler::new(Arc::new(storage));
        let ids = select_due(
            &plugin,
            &settings_with_article_enabled(),
            Process::Unpublish,
            1_000,
        )
        .await
        .unwrap();
        assert_eq!(ids, vec![4, 2]);
    }

    #[tokio::test]
    async fn test_select_due_without_enabled_bundle() {
        let mut storage = mock_with_bundles();
        storage.expect_query_due().never();

        let plugin = NodeScheduler::new(Arc::new(storage));
        let ids = select_due(
            &plugin,
            &settings_with_article_enabled(),
            Process::Publish,
            1_000,
        )
        .await
        .unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        assert_eq!(dedupe(vec![3, 1, 3, 2, 1]), vec![3, 1, 2]);
    }
}
