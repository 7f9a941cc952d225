// Schedule validation and save-time scheduling behavior
//
// Runs before an item ever reaches the engine; the engine trusts that
// stored dates passed these checks.

use crate::config::{BundleSettings, PastDatePolicy};
use crate::errors::ValidationError;
use crate::models::{SchedulableItem, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Scheduling values submitted for one translation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleInput {
    pub publish_on: Option<Timestamp>,
    pub unpublish_on: Option<Timestamp>,
    /// Requested published state
    pub published: bool,
}

impl ScheduleInput {
    pub fn from_item(item: &SchedulableItem) -> Self {
        Self {
            publish_on: item.publish_on(),
            unpublish_on: item.unpublish_on(),
            published: item.is_published(),
        }
    }
}

/// Every violation of the bundle's scheduling rules
pub fn validate_schedule(
    input: &ScheduleInput,
    bundle: &BundleSettings,
    now: Timestamp,
) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(publish_on) = input.publish_on {
        if publish_on <= now && bundle.publish_past_date == PastDatePolicy::Error {
            errors.push(ValidationError::PublishOnInPast);
        }
    }

    if let Some(unpublish_on) = input.unpublish_on {
        if unpublish_on < now {
            errors.push(ValidationError::UnpublishOnInPast);
        }
    }

    if let (Some(publish_on), Some(unpublish_on)) = (input.publish_on, input.unpublish_on) {
        if unpublish_on <= publish_on {
            errors.push(ValidationError::UnpublishBeforePublish);
        }
    }

    if bundle.publish_required && input.publish_on.is_none() && !input.published {
        errors.push(ValidationError::PublishOnRequired);
    }

    if bundle.unpublish_required && input.unpublish_on.is_none() {
        if input.publish_on.is_some() {
            errors.push(ValidationError::UnpublishOnRequired);
        } else if input.published {
            errors.push(ValidationError::UnpublishOnRequiredWhenPublished);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// What `apply_on_save` did to the item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveAction {
    Unchanged,
    /// Saved unpublished, left for the cron run
    Scheduled,
    /// Past date with the `publish` policy
    PublishedImmediately,
}

/// Save-time handling of a `publish_on` date
pub fn apply_on_save(
    item: &mut SchedulableItem,
    bundle: &BundleSettings,
    now: Timestamp,
) -> SaveAction {
    let Some(publish_on) = item.publish_on() else {
        return SaveAction::Unchanged;
    };

    if publish_on > now || bundle.publish_past_date == PastDatePolicy::Schedule {
        item.set_published(false);
        debug!(id = item.id(), publish_on, "Item saved as scheduled");
        return SaveAction::Scheduled;
    }

    if bundle.publish_past_date != PastDatePolicy::Publish {
        return SaveAction::Unchanged;
    }

    item.set_published(true);
    item.set_changed(publish_on);
    if bundle.publish_past_date_created && item.created() > publish_on {
        item.set_created(publish_on);
    }
    item.set_publish_on(None);
    debug!(id = item.id(), publish_on, "Past publish date, published on save");
    SaveAction::PublishedImmediately
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentEntity, ContentTranslation};

    const NOW: i64 = 1_700_000_000;

    fn input(publish_on: Option<i64>, unpublish_on: Option<i64>, published: bool) -> ScheduleInput {
        ScheduleInput {
            publish_on,
            unpublish_on,
            published,
        }
    }

    fn item(publish_on: Option<i64>, created: i64) -> SchedulableItem {
        let mut t = ContentTranslation::new("en", "Page", created);
        t.publish_on = publish_on;
        t.published = true;
        SchedulableItem::default_translation(ContentEntity::new(1, "node", "page", t)).unwrap()
    }

    #[test]
    fn test_past_publish_date_rejected_by_default() {
        let errors = validate_schedule(
            &input(Some(NOW - 86_400), None, true),
            &BundleSettings::default(),
            NOW,
        )
        .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].to_string(),
            "The 'publish on' date must be in the future."
        );
    }

    #[test]
    fn test_past_publish_date_accepted_with_policy() {
        let bundle = BundleSettings {
            publish_past_date: PastDatePolicy::Schedule,
            ..Default::default()
        };
        assert!(validate_schedule(&input(Some(NOW - 86_400), None, false), &bundle, NOW).is_ok());
    }

    #[test]
    fn test_unpublish_ordering_and_past() {
        let errors = validate_schedule(
            &input(Some(NOW + 100), Some(NOW - 3_600), false),
            &BundleSettings::default(),
            NOW,
        )
        .unwrap_err();
        assert_eq!(
            errors.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
            vec![
                "The 'unpublish on' date must be in the future.".to_string(),
                "The 'unpublish on' date must be later than the 'publish on' date.".to_string(),
            ]
        );
    }

    #[test]
    fn test_required_dates() {
        let bundle = BundleSettings {
            publish_required: true,
            unpublish_required: true,
            ..Default::default()
        };

        let errors = validate_schedule(&input(None, None, false), &bundle, NOW).unwrap_err();
        assert!(matches!(errors[..], [ValidationError::PublishOnRequired]));

        let errors =
            validate_schedule(&input(Some(NOW + 10), None, false), &bundle, NOW).unwrap_err();
        assert!(matches!(errors[..], [ValidationError::UnpublishOnRequired]));

        let errors = validate_schedule(&input(None, None, true), &bundle, NOW).unwrap_err();
        assert!(matches!(
            errors[..],
            [ValidationError::UnpublishOnRequiredWhenPublished]
        ));

        let both = input(Some(NOW + 10), Some(NOW + 20), false);
        assert!(validate_schedule(&both, &bundle, NOW).is_ok());
    }

    #[test]
    fn test_future_date_saved_unpublished() {
        let mut item = item(Some(NOW + 60), NOW - 10);
        assert_eq!(
            apply_on_save(&mut item, &BundleSettings::default(), NOW),
            SaveAction::Scheduled
        );
        assert!(!item.is_published());
        assert_eq!(item.publish_on(), Some(NOW + 60));
    }

    #[test]
    fn test_past_date_published_immediately() {
        let bundle = BundleSettings {
            publish_past_date: PastDatePolicy::Publish,
            publish_past_date_created: true,
            ..Default::default()
        };
        let mut item = item(Some(NOW - 86_400), NOW - 10);
        item.set_published(false);

        assert_eq!(apply_on_save(&mut item, &bundle, NOW), SaveAction::PublishedImmediately);
        assert!(item.is_published());
        assert_eq!(item.publish_on(), None);
        assert_eq!(item.changed(), NOW - 86_400);
        assert_eq!(item.created(), NOW - 86_400);
    }

    #[test]
    fn test_no_date_unchanged() {
        let mut item = item(None, NOW);
        assert_eq!(
            apply_on_save(&mut item, &BundleSettings::default(), NOW),
            SaveAction::Unchanged
        );
        assert!(item.is_published());
    }
}
