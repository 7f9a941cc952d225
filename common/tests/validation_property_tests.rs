// Property-based tests for schedule validation and save-time handling

use common::config::{PastDatePolicy, SchedulerSettings};
use common::errors::ValidationError;
use common::models::{ContentEntity, ContentTranslation, SchedulableItem};
use common::validation::{apply_on_save, validate_schedule, SaveAction, ScheduleInput};
use proptest::prelude::*;

const NOW: i64 = 1_700_000_000;

fn policy_strategy() -> impl Strategy<Value = PastDatePolicy> {
    prop_oneof![
        Just(PastDatePolicy::Error),
        Just(PastDatePolicy::Publish),
        Just(PastDatePolicy::Schedule),
    ]
}

fn item(publish_on: Option<i64>, created: i64) -> SchedulableItem {
    let mut t = ContentTranslation::new("en", "Draft", created);
    t.publish_on = publish_on;
    SchedulableItem::default_translation(ContentEntity::new(1, "node", "article", t)).unwrap()
}

/// An unpublish date at or before the publish date is always rejected
#[test]
fn property_unpublish_must_follow_publish() {
    proptest!(|(
        publish_offset in 1i64..100_000i64,
        gap in 0i64..100_000i64
    )| {
        let bundle = SchedulerSettings::default().bundle("node", "article");
        let input = ScheduleInput {
            publish_on: Some(NOW + publish_offset),
            unpublish_on: Some(NOW + publish_offset - gap),
            published: false,
        };

        let result = validate_schedule(&input, &bundle, NOW);
        let rejected = matches!(
            &result,
            Err(errors) if errors
                .iter()
                .any(|e| matches!(e, ValidationError::UnpublishBeforePublish))
        );
        prop_assert!(rejected);
    });
}

/// Future dates in the right order always pass without required rules
#[test]
fn property_future_ordered_dates_accepted() {
    proptest!(|(
        publish_offset in 1i64..100_000i64,
        gap in 1i64..100_000i64,
        published in any::<bool>(),
        policy in policy_strategy()
    )| {
        let mut bundle = SchedulerSettings::default().bundle("node", "article");
        bundle.publish_past_date = policy;
        let input = ScheduleInput {
            publish_on: Some(NOW + publish_offset),
            unpublish_on: Some(NOW + publish_offset + gap),
            published,
        };

        prop_assert!(validate_schedule(&input, &bundle, NOW).is_ok());
    });
}

/// A past publish date is rejected only under the error policy
#[test]
fn property_past_publish_date_policy() {
    proptest!(|(
        past in 0i64..100_000i64,
        policy in policy_strategy()
    )| {
        let mut bundle = SchedulerSettings::default().bundle("node", "article");
        bundle.publish_past_date = policy;
        let input = ScheduleInput {
            publish_on: Some(NOW - past),
            unpublish_on: None,
            published: false,
        };

        let result = validate_schedule(&input, &bundle, NOW);
        prop_assert_eq!(result.is_err(), policy == PastDatePolicy::Error);
    });
}

/// Saving with a future date always leaves the item unpublished and scheduled
#[test]
fn property_future_date_saved_unpublished() {
    proptest!(|(
        offset in 1i64..100_000i64,
        policy in policy_strategy()
    )| {
        let mut bundle = SchedulerSettings::default().bundle("node", "article");
        bundle.publish_past_date = policy;
        let mut item = item(Some(NOW + offset), NOW - 500);
        item.set_published(true);

        prop_assert_eq!(apply_on_save(&mut item, &bundle, NOW), SaveAction::Scheduled);
        prop_assert!(!item.is_published());
        prop_assert_eq!(item.publish_on(), Some(NOW + offset));
    });
}

/// The publish policy publishes past dates at once and clears the date
#[test]
fn property_past_date_published_on_save() {
    proptest!(|(
        past in 0i64..100_000i64,
        created_offset in -100_000i64..100_000i64,
        past_date_created in any::<bool>()
    )| {
        let mut bundle = SchedulerSettings::default().bundle("node", "article");
        bundle.publish_past_date = PastDatePolicy::Publish;
        bundle.publish_past_date_created = past_date_created;
        let publish_on = NOW - past;
        let created = publish_on + created_offset;
        let mut item = item(Some(publish_on), created);

        prop_assert_eq!(apply_on_save(&mut item, &bundle, NOW), SaveAction::PublishedImmediately);
        prop_assert!(item.is_published());
        prop_assert_eq!(item.publish_on(), None);
        prop_assert_eq!(item.changed(), publish_on);

        let expected_created = if past_date_created && created > publish_on {
            publish_on
        } else {
            created
        };
        prop_assert_eq!(item.created(), expected_created);
    });
}
