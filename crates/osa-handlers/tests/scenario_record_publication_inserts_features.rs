//! Scenario: publication inserts the features each hook left behind.
//!
//! The handler reads `features.json` from the durable workspace for every
//! hook of the record's convention and inserts rows keyed by `record_srn`;
//! hooks that produced nothing are skipped, and re-delivery replaces
//! instead of duplicating.

use std::fs;
use std::sync::Arc;

use osa_handlers::ports::{Convention, DepositionStore, FileStorage, SYSTEM_USER_ID};
use osa_handlers::{InsertRecordFeatures, ReturnToDraft};
use osa_pipeline::EventHandler;
use osa_testkit::{
    FakeConventionStore, FakeDepositionStore, LocalFileStorage, RecordingFeatureStore,
};
use osa_types::{Event, EventPayload};
use serde_json::json;

fn hook_def(name: &str) -> osa_types::HookDefinition {
    serde_json::from_value(json!({
        "image": format!("ghcr.io/osa/{name}"),
        "digest": "sha256:abc",
        "manifest": {
            "name": name,
            "record_schema": "urn:osa:test:schema:s@1.0.0",
            "cardinality": "many",
            "feature_schema": {"columns": [
                {"name": "pocket_id", "json_type": "integer", "required": true}
            ]}
        }
    }))
    .unwrap()
}

#[tokio::test]
async fn inserts_rows_for_hooks_with_output() {
    let tmp = tempfile::tempdir().unwrap();
    let storage = Arc::new(LocalFileStorage::new(tmp.path()));
    let depositions = Arc::new(FakeDepositionStore::new("test"));
    let conventions = Arc::new(FakeConventionStore::new());
    let features = Arc::new(RecordingFeatureStore::new());

    let convention_srn: osa_types::Srn = "urn:osa:test:conv:geo@1.0.0".parse().unwrap();
    conventions.insert(Convention {
        srn: convention_srn.clone(),
        hooks: vec![hook_def("pocket_detect"), hook_def("surface_area")],
    });

    let dep = depositions
        .create(&convention_srn, SYSTEM_USER_ID)
        .await
        .unwrap();

    // Only pocket_detect produced features.
    let out = storage.hook_output_dir(&dep.srn, "pocket_detect").join("out");
    fs::create_dir_all(&out).unwrap();
    fs::write(
        out.join("features.json"),
        r#"[{"pocket_id": 1}, {"pocket_id": 2}]"#,
    )
    .unwrap();

    let handler = InsertRecordFeatures::new(
        depositions.clone(),
        conventions.clone(),
        storage.clone(),
        features.clone(),
    );

    let record_srn: osa_types::Srn = "urn:osa:test:rec:r1@1".parse().unwrap();
    let event = Event::new(EventPayload::RecordPublished {
        record_srn: record_srn.clone(),
        deposition_srn: dep.srn.clone(),
        convention_srn: convention_srn.clone(),
    });
    handler.handle(&event).await.unwrap();

    let inserts = features.inserts();
    assert_eq!(inserts.len(), 1, "only the hook with output inserts");
    let (hook, record, rows) = &inserts[0];
    assert_eq!(hook, "pocket_detect");
    assert_eq!(record, &record_srn.to_string());
    assert_eq!(rows.len(), 2);

    // Re-delivery replaces rather than duplicates.
    handler.handle(&event).await.unwrap();
    assert_eq!(features.inserts().len(), 1);
}

#[tokio::test]
async fn missing_deposition_is_logged_not_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let handler = InsertRecordFeatures::new(
        Arc::new(FakeDepositionStore::new("test")),
        Arc::new(FakeConventionStore::new()),
        Arc::new(LocalFileStorage::new(tmp.path())),
        Arc::new(RecordingFeatureStore::new()),
    );

    let event = Event::new(EventPayload::RecordPublished {
        record_srn: "urn:osa:test:rec:r1@1".parse().unwrap(),
        deposition_srn: "urn:osa:test:dep:gone".parse().unwrap(),
        convention_srn: "urn:osa:test:conv:geo@1.0.0".parse().unwrap(),
    });
    // The record is already public; a vanished deposition must not park the
    // delivery in an endless retry loop.
    handler.handle(&event).await.unwrap();
}

#[tokio::test]
async fn return_to_draft_rolls_back_and_tolerates_missing() {
    let depositions = Arc::new(FakeDepositionStore::new("test"));
    let convention_srn: osa_types::Srn = "urn:osa:test:conv:geo@1.0.0".parse().unwrap();
    let dep = depositions
        .create(&convention_srn, SYSTEM_USER_ID)
        .await
        .unwrap();
    depositions.submit(&dep.srn).await.unwrap();

    let handler = ReturnToDraft::new(depositions.clone());

    let event = Event::new(EventPayload::ValidationFailed {
        deposition_srn: dep.srn.clone(),
        validation_run_srn: "urn:osa:test:val:v1".parse().unwrap(),
        reasons: vec!["missing coordinates".into()],
    });
    handler.handle(&event).await.unwrap();
    assert_eq!(
        depositions.status_of(&dep.srn),
        Some(osa_handlers::ports::DepositionStatus::Draft)
    );

    // Deleted deposition: warn and ack, never retry.
    let gone = Event::new(EventPayload::ValidationFailed {
        deposition_srn: "urn:osa:test:dep:gone".parse().unwrap(),
        validation_run_srn: "urn:osa:test:val:v2".parse().unwrap(),
        reasons: vec![],
    });
    handler.handle(&gone).await.unwrap();
}
