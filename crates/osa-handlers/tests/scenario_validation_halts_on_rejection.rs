//! Scenario: hook rejection fails the validation run.
//!
//! A hook whose container declares `{"status":"rejected","message":
//! "missing coordinates"}` and exits 0 yields a rejected `HookResult`; the
//! run ends `failed`, later hooks never execute, and `ValidationFailed`
//! carries the rejection reason downstream.

use std::sync::Arc;

use osa_handlers::ports::{Convention, DepositionStore, ValidationRunStore, SYSTEM_USER_ID};
use osa_handlers::{BeginValidation, ExecuteValidation};
use osa_pipeline::{EventHandler, SubscriptionRegistry};
use osa_testkit::{
    FakeConventionStore, FakeDepositionStore, FakeHookRunner, FakeValidationRunStore,
    LocalFileStorage, MemOutbox,
};
use osa_types::{Event, EventPayload, HookResult, HookStatus, ProgressEntry, RunStatus};
use serde_json::json;

fn hook_def(name: &str) -> osa_types::HookDefinition {
    serde_json::from_value(json!({
        "image": format!("ghcr.io/osa/{name}"),
        "digest": "sha256:abc",
        "manifest": {
            "name": name,
            "record_schema": "urn:osa:test:schema:s@1.0.0",
            "cardinality": "one",
            "feature_schema": {"columns": []}
        }
    }))
    .unwrap()
}

struct Setup {
    depositions: Arc<FakeDepositionStore>,
    runs: Arc<FakeValidationRunStore>,
    hook_runner: Arc<FakeHookRunner>,
    outbox: Arc<MemOutbox>,
    begin: BeginValidation,
    execute: ExecuteValidation,
}

fn setup(tmp: &tempfile::TempDir) -> Setup {
    let depositions = Arc::new(FakeDepositionStore::new("test"));
    let runs = Arc::new(FakeValidationRunStore::new());
    let conventions = Arc::new(FakeConventionStore::new());
    let hook_runner = Arc::new(FakeHookRunner::new());
    let storage = Arc::new(LocalFileStorage::new(tmp.path()));
    let outbox = Arc::new(MemOutbox::new(SubscriptionRegistry::default()));

    conventions.insert(Convention {
        srn: "urn:osa:test:conv:geo@1.0.0".parse().unwrap(),
        hooks: vec![hook_def("coordinate_check"), hook_def("pocket_detect")],
    });

    let begin = BeginValidation::new(
        runs.clone(),
        conventions.clone(),
        outbox.clone(),
        "test",
    );
    let execute = ExecuteValidation::new(
        runs.clone(),
        depositions.clone(),
        hook_runner.clone(),
        storage,
        outbox.clone(),
    );

    Setup {
        depositions,
        runs,
        hook_runner,
        outbox,
        begin,
        execute,
    }
}

async fn submitted_deposition(setup: &Setup) -> osa_handlers::ports::Deposition {
    let dep = setup
        .depositions
        .create(&"urn:osa:test:conv:geo@1.0.0".parse().unwrap(), SYSTEM_USER_ID)
        .await
        .unwrap();
    setup.depositions.submit(&dep.srn).await.unwrap();
    dep
}

#[tokio::test]
async fn rejection_halts_and_emits_validation_failed() {
    let tmp = tempfile::tempdir().unwrap();
    let setup = setup(&tmp);
    let dep = submitted_deposition(&setup).await;

    setup.hook_runner.script(
        "coordinate_check",
        HookResult {
            hook_name: "coordinate_check".into(),
            status: HookStatus::Rejected,
            rejection_reason: Some("missing coordinates".into()),
            error_message: None,
            progress: vec![ProgressEntry {
                step: None,
                status: "rejected".into(),
                message: Some("missing coordinates".into()),
            }],
            duration_seconds: 0.2,
        },
    );

    // BeginValidation reacts to the submission.
    setup
        .begin
        .handle(&Event::new(EventPayload::DepositionSubmitted {
            deposition_srn: dep.srn.clone(),
            convention_srn: dep.convention_srn.clone(),
        }))
        .await
        .unwrap();

    let requested = setup.outbox.events_of_type("ValidationRequested");
    assert_eq!(requested.len(), 1);
    let EventPayload::ValidationRequested {
        validation_run_srn,
        hooks,
        ..
    } = &requested[0].payload
    else {
        panic!("expected ValidationRequested");
    };
    assert_eq!(hooks.len(), 2, "one snapshot per configured hook");

    // ExecuteValidation runs the hooks.
    setup.execute.handle(&requested[0]).await.unwrap();

    let run = setup.runs.get(validation_run_srn).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.results.len(), 1, "halt on first rejection");
    assert_eq!(run.results[0].status, HookStatus::Rejected);
    assert_eq!(
        run.results[0].rejection_reason.as_deref(),
        Some("missing coordinates")
    );
    assert!(run.started_at.is_some() && run.completed_at.is_some());

    assert_eq!(
        setup.hook_runner.invocations(),
        vec!["coordinate_check"],
        "the second hook must never run"
    );

    let failed = setup.outbox.events_of_type("ValidationFailed");
    assert_eq!(failed.len(), 1);
    match &failed[0].payload {
        EventPayload::ValidationFailed { reasons, .. } => {
            assert_eq!(reasons, &vec!["missing coordinates".to_string()]);
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[tokio::test]
async fn all_hooks_passing_completes_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let setup = setup(&tmp);
    let dep = submitted_deposition(&setup).await;

    setup
        .begin
        .handle(&Event::new(EventPayload::DepositionSubmitted {
            deposition_srn: dep.srn.clone(),
            convention_srn: dep.convention_srn.clone(),
        }))
        .await
        .unwrap();
    let requested = setup.outbox.events_of_type("ValidationRequested");
    setup.execute.handle(&requested[0]).await.unwrap();

    let runs = setup.runs.all();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Completed);
    assert_eq!(runs[0].results.len(), 2);
    assert_eq!(runs[0].summary(), Some(HookStatus::Passed));

    assert_eq!(setup.outbox.events_of_type("ValidationSucceeded").len(), 1);
    assert!(setup.outbox.events_of_type("ValidationFailed").is_empty());
}

#[tokio::test]
async fn terminal_run_is_not_re_executed() {
    let tmp = tempfile::tempdir().unwrap();
    let setup = setup(&tmp);
    let dep = submitted_deposition(&setup).await;

    setup
        .begin
        .handle(&Event::new(EventPayload::DepositionSubmitted {
            deposition_srn: dep.srn.clone(),
            convention_srn: dep.convention_srn.clone(),
        }))
        .await
        .unwrap();
    let requested = setup.outbox.events_of_type("ValidationRequested");

    setup.execute.handle(&requested[0]).await.unwrap();
    assert_eq!(setup.hook_runner.invocations().len(), 2);

    // Re-delivery of the same request must not run the hooks again.
    setup.execute.handle(&requested[0]).await.unwrap();
    assert_eq!(setup.hook_runner.invocations().len(), 2);
    assert_eq!(setup.outbox.events_of_type("ValidationSucceeded").len(), 1);
}
