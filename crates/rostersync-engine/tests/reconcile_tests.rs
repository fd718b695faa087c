//! End-to-end reconciliation flows against an in-memory directory.

mod helpers;

use std::sync::atomic::Ordering;

use helpers::{
    active_driver, date, driver_with_external_id, hire_record, permanent_error,
    termination_record, transient_error, InMemoryDirectory,
};
use rostersync_engine::external_id::EXTERNAL_ID_KEY;
use rostersync_engine::mappings::TagMappings;
use rostersync_engine::model::ActivationStatus;
use rostersync_engine::reconcile::{
    DriverDefaults, ReconcileOptions, Reconciler, RecordAction, RunMode,
};
use rostersync_engine::retry::RetryPolicy;
use rostersync_engine::username::UsernameRegistry;

fn execute_options() -> ReconcileOptions {
    ReconcileOptions {
        mode: RunMode::Execute,
        update_existing: false,
        allow_name_fallback: true,
    }
}

fn dry_run_options() -> ReconcileOptions {
    ReconcileOptions {
        mode: RunMode::DryRun,
        ..execute_options()
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(2, 0)
}

#[tokio::test]
async fn new_hire_is_created_with_identifier_and_username() {
    let directory = InMemoryDirectory::new();
    let mut registry = UsernameRegistry::new();
    let records = vec![hire_record("John", "Smith", date(2024, 1, 15))];

    let summary = Reconciler::new(&directory, execute_options())
        .run_additions(
            &records,
            &mut registry,
            &TagMappings::new(),
            &DriverDefaults::new("hunter2"),
        )
        .await;

    assert_eq!(summary.created, 1);
    assert_eq!(summary.failed, 0);

    let created = directory.driver_named("John Smith");
    assert_eq!(
        created.external_id(EXTERNAL_ID_KEY),
        Some("John-Smith_01-15-2024")
    );
    assert_eq!(created.username.as_deref(), Some("jsmith"));
    assert_eq!(created.notes.as_deref(), Some("Hire Date: 01-15-2024"));
    assert!(registry.contains("jsmith"));
}

#[tokio::test]
async fn add_flow_is_idempotent_with_updates_disabled() {
    let directory = InMemoryDirectory::new();
    let mut registry = UsernameRegistry::new();
    let records = vec![hire_record("John", "Smith", date(2024, 1, 15))];
    let reconciler = Reconciler::new(&directory, execute_options());
    let mappings = TagMappings::new();
    let defaults = DriverDefaults::new("hunter2");

    let first = reconciler
        .run_additions(&records, &mut registry, &mappings, &defaults)
        .await;
    let second = reconciler
        .run_additions(&records, &mut registry, &mappings, &defaults)
        .await;

    assert_eq!(first.created, 1);
    assert_eq!(second.created, 0);
    assert_eq!(second.skipped, 1);
    assert_eq!(directory.create_calls.load(Ordering::SeqCst), 1);
    assert_eq!(directory.driver_count(), 1);
}

#[tokio::test]
async fn second_smith_gets_a_suffixed_username() {
    let directory = InMemoryDirectory::new();
    let mut registry = UsernameRegistry::new();
    let records = vec![
        hire_record("John", "Smith", date(2024, 1, 15)),
        hire_record("Jane", "Smith", date(2024, 2, 1)),
    ];

    let summary = Reconciler::new(&directory, execute_options())
        .run_additions(
            &records,
            &mut registry,
            &TagMappings::new(),
            &DriverDefaults::new("hunter2"),
        )
        .await;

    assert_eq!(summary.created, 2);
    assert_eq!(
        directory.driver_named("John Smith").username.as_deref(),
        Some("jsmith")
    );
    assert_eq!(
        directory.driver_named("Jane Smith").username.as_deref(),
        Some("jsmith2")
    );
}

#[tokio::test]
async fn dry_run_decides_but_mutates_nothing() {
    let directory = InMemoryDirectory::new();
    directory.seed({
        let mut driver = driver_with_external_id("d1", "Old Hand", "Old-Hand_03-01-2020");
        driver.driver_activation_status = ActivationStatus::Deactivated;
        driver
    });
    let mut registry = UsernameRegistry::new();
    let hires = vec![hire_record("John", "Smith", date(2024, 1, 15))];
    let terminations = vec![termination_record(
        "Old",
        "Hand",
        date(2024, 12, 31),
        Some(date(2020, 3, 1)),
    )];

    let reconciler = Reconciler::new(&directory, dry_run_options());
    let hire_summary = reconciler
        .run_additions(
            &hires,
            &mut registry,
            &TagMappings::new(),
            &DriverDefaults::new("hunter2"),
        )
        .await;
    let termination_summary = reconciler.run_terminations(&terminations).await;

    assert_eq!(hire_summary.created, 1);
    assert_eq!(termination_summary.already_inactive, 1);
    assert_eq!(directory.mutation_count(), 0);
    assert_eq!(directory.driver_count(), 1);
}

#[tokio::test]
async fn dry_run_still_surfaces_ambiguity_and_invalid_input() {
    let directory = InMemoryDirectory::new();
    directory.seed(active_driver("d1", "John Smith"));
    directory.seed(active_driver("d2", "Smith, John"));
    let mut registry = UsernameRegistry::new();

    // A preview has to show the same problems an execute run would hit.
    let reconciler = Reconciler::new(&directory, dry_run_options());
    let termination_summary = reconciler
        .run_terminations(&[termination_record("John", "Smith", date(2024, 12, 31), None)])
        .await;
    let hire_summary = reconciler
        .run_additions(
            &[hire_record("???", "!!!", date(2024, 1, 15))],
            &mut registry,
            &TagMappings::new(),
            &DriverDefaults::new("hunter2"),
        )
        .await;

    assert_eq!(termination_summary.manual_review, 1);
    assert_eq!(termination_summary.deactivated, 0);
    assert_eq!(hire_summary.failed, 1);
    assert_eq!(hire_summary.created, 0);
    assert!(hire_summary.has_failures());
    assert_eq!(directory.mutation_count(), 0);
}

#[tokio::test]
async fn fallback_termination_deactivates_and_upgrades_identifier() {
    let directory = InMemoryDirectory::new();
    let mut driver = active_driver("d1", "Smith, John");
    driver.notes = Some("Hire Date: 06-01-2023".to_string());
    directory.seed(driver);

    // No hire date on the termination row, so resolution has to go
    // through the name fallback.
    let records = vec![termination_record("John", "Smith", date(2024, 12, 31), None)];
    let summary = Reconciler::new(&directory, execute_options())
        .run_terminations(&records)
        .await;

    assert_eq!(summary.deactivated, 1);
    assert_eq!(summary.fallback_matches, 1);

    let stored = directory.driver("d1").expect("driver kept");
    assert!(!stored.is_active());
    assert_eq!(stored.notes.as_deref(), Some("Terminated: 12-31-2024"));
    // The hire date recovered from the old notes becomes the stable id.
    assert_eq!(
        stored.external_id(EXTERNAL_ID_KEY),
        Some("John-Smith_06-01-2023")
    );
    assert_eq!(directory.add_external_id_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fallback_termination_without_recoverable_hire_date_still_succeeds() {
    let directory = InMemoryDirectory::new();
    directory.seed(active_driver("d1", "John Smith"));

    let records = vec![termination_record("John", "Smith", date(2024, 12, 31), None)];
    let summary = Reconciler::new(&directory, execute_options())
        .run_terminations(&records)
        .await;

    assert_eq!(summary.deactivated, 1);
    assert_eq!(directory.add_external_id_calls.load(Ordering::SeqCst), 0);
    assert!(!directory.driver("d1").expect("driver kept").is_active());
}

#[tokio::test]
async fn ambiguous_name_goes_to_manual_review_without_mutation() {
    let directory = InMemoryDirectory::new();
    directory.seed(active_driver("d1", "John Smith"));
    directory.seed(active_driver("d2", "Smith, John"));

    let records = vec![termination_record("John", "Smith", date(2024, 12, 31), None)];
    let summary = Reconciler::new(&directory, execute_options())
        .run_terminations(&records)
        .await;

    assert_eq!(summary.manual_review, 1);
    assert_eq!(summary.deactivated, 0);
    assert_eq!(directory.mutation_count(), 0);
    assert!(directory.driver("d1").expect("kept").is_active());
    assert!(directory.driver("d2").expect("kept").is_active());
}

#[tokio::test]
async fn name_fallback_counts_deactivated_drivers_as_ambiguity() {
    let directory = InMemoryDirectory::new();
    directory.seed(active_driver("d1", "John Smith"));
    let mut retired = active_driver("d2", "Smith, John");
    retired.driver_activation_status = ActivationStatus::Deactivated;
    directory.seed(retired);

    // The engine never assumes the active namesake is the right one.
    let records = vec![termination_record("John", "Smith", date(2024, 12, 31), None)];
    let summary = Reconciler::new(&directory, execute_options())
        .run_terminations(&records)
        .await;

    assert_eq!(summary.manual_review, 1);
    assert_eq!(summary.deactivated, 0);
    assert_eq!(directory.mutation_count(), 0);
    assert!(directory.driver("d1").expect("kept").is_active());
}

#[tokio::test]
async fn termination_by_identifier_skips_the_name_search() {
    let directory = InMemoryDirectory::new();
    directory.seed(driver_with_external_id(
        "d1",
        "John Smith",
        "John-Smith_01-15-2024",
    ));

    let records = vec![termination_record(
        "John",
        "Smith",
        date(2024, 12, 31),
        Some(date(2024, 1, 15)),
    )];
    let summary = Reconciler::new(&directory, execute_options())
        .run_terminations(&records)
        .await;

    assert_eq!(summary.deactivated, 1);
    assert_eq!(summary.fallback_matches, 0);
    assert_eq!(directory.name_lookups.load(Ordering::SeqCst), 0);
    // Identifier matches never need the upgrade call.
    assert_eq!(directory.add_external_id_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn transient_failures_are_retried_to_success() {
    let directory = InMemoryDirectory::new();
    directory.fail_next_create(transient_error());
    directory.fail_next_create(transient_error());
    let mut registry = UsernameRegistry::new();
    let records = vec![hire_record("John", "Smith", date(2024, 1, 15))];

    let summary = Reconciler::new(&directory, execute_options())
        .with_retry_policy(fast_retry())
        .run_additions(
            &records,
            &mut registry,
            &TagMappings::new(),
            &DriverDefaults::new("hunter2"),
        )
        .await;

    assert_eq!(summary.created, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(directory.create_calls.load(Ordering::SeqCst), 3);
    assert_eq!(directory.driver_count(), 1);
}

#[tokio::test]
async fn permanent_failure_isolates_the_record_and_frees_its_username() {
    let directory = InMemoryDirectory::new();
    directory.fail_next_create(permanent_error());
    let mut registry = UsernameRegistry::new();
    let records = vec![
        hire_record("John", "Smith", date(2024, 1, 15)),
        hire_record("Jane", "Smith", date(2024, 2, 1)),
    ];

    let summary = Reconciler::new(&directory, execute_options())
        .with_retry_policy(fast_retry())
        .run_additions(
            &records,
            &mut registry,
            &TagMappings::new(),
            &DriverDefaults::new("hunter2"),
        )
        .await;

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.created, 1);
    // One permanent failure, no retries for it.
    assert_eq!(directory.create_calls.load(Ordering::SeqCst), 2);
    // John's allocation was released, so Jane gets the base username.
    assert_eq!(
        directory.driver_named("Jane Smith").username.as_deref(),
        Some("jsmith")
    );
    assert_eq!(registry.len(), 1);

    let failed: Vec<_> = summary
        .outcomes
        .iter()
        .filter(|outcome| outcome.action == RecordAction::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].name, "John Smith");
}

#[tokio::test]
async fn exhausted_retries_fail_the_record_but_not_the_batch() {
    let directory = InMemoryDirectory::new();
    for _ in 0..3 {
        directory.fail_next_deactivate(transient_error());
    }
    directory.seed(driver_with_external_id(
        "d1",
        "John Smith",
        "John-Smith_01-15-2024",
    ));
    directory.seed(driver_with_external_id(
        "d2",
        "Alice Doe",
        "Alice-Doe_02-01-2024",
    ));

    let records = vec![
        termination_record("John", "Smith", date(2024, 12, 31), Some(date(2024, 1, 15))),
        termination_record("Alice", "Doe", date(2024, 12, 31), Some(date(2024, 2, 1))),
    ];
    let summary = Reconciler::new(&directory, execute_options())
        .with_retry_policy(fast_retry())
        .run_terminations(&records)
        .await;

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.deactivated, 1);
    assert!(directory.driver("d1").expect("kept").is_active());
    assert!(!directory.driver("d2").expect("kept").is_active());
}

#[tokio::test]
async fn existing_deactivated_driver_is_reactivated_in_update_mode() {
    let directory = InMemoryDirectory::new();
    let mut driver = driver_with_external_id("d1", "John Smith", "John-Smith_01-15-2024");
    driver.driver_activation_status = ActivationStatus::Deactivated;
    directory.seed(driver);

    let mut registry = UsernameRegistry::new();
    let records = vec![hire_record("John", "Smith", date(2024, 1, 15))];
    let options = ReconcileOptions {
        update_existing: true,
        ..execute_options()
    };

    let summary = Reconciler::new(&directory, options)
        .run_additions(
            &records,
            &mut registry,
            &TagMappings::new(),
            &DriverDefaults::new("hunter2"),
        )
        .await;

    assert_eq!(summary.reactivated, 1);
    assert_eq!(summary.created, 0);
    let stored = directory.driver("d1").expect("kept");
    assert!(stored.is_active());
    assert_eq!(stored.notes.as_deref(), Some("Reactivated: 01-15-2024"));
    // Reactivation reuses the existing record, so no username is burned.
    assert!(registry.is_empty());
}
