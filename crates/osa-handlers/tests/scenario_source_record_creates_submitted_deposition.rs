//! Scenario: a ready source record becomes a submitted deposition.
//!
//! The handler must create the deposition, copy the record metadata, move
//! the staged files into the deposition's files directory, submit it, and
//! emit `DepositionSubmitted` for the validation side.

use std::fs;
use std::sync::Arc;

use osa_handlers::ports::{DepositionStatus, FileStorage};
use osa_handlers::CreateDepositionFromSource;
use osa_pipeline::{EventHandler, SubscriptionRegistry};
use osa_testkit::{FakeDepositionStore, LocalFileStorage, MemOutbox};
use osa_types::{Event, EventPayload};
use serde_json::json;

#[tokio::test]
async fn creates_moves_files_and_submits() {
    let tmp = tempfile::tempdir().unwrap();
    let storage = Arc::new(LocalFileStorage::new(tmp.path()));
    let depositions = Arc::new(FakeDepositionStore::new("test"));
    let outbox = Arc::new(MemOutbox::new(SubscriptionRegistry::default()));

    // Stage one record's files the way a source run leaves them.
    let staging = storage.source_files_dir("geo");
    fs::create_dir_all(staging.join("gse1")).unwrap();
    fs::write(staging.join("gse1").join("matrix.tsv"), "a\tb\n").unwrap();

    let handler = CreateDepositionFromSource::new(
        depositions.clone(),
        storage.clone(),
        outbox.clone(),
    );

    let event = Event::new(EventPayload::SourceRecordReady {
        source_name: "geo".into(),
        source_record_id: "gse1".into(),
        convention_srn: "urn:osa:test:conv:geo@1.0.0".parse().unwrap(),
        metadata: json!({"title": "expression series 1"}),
        staging_dir: staging.to_string_lossy().into_owned(),
    });
    handler.handle(&event).await.unwrap();

    let deps = depositions.all();
    assert_eq!(deps.len(), 1);
    let dep = &deps[0];
    assert_eq!(dep.status, DepositionStatus::Submitted);
    assert_eq!(dep.metadata["title"], "expression series 1");
    assert_eq!(dep.owner_id, osa_handlers::ports::SYSTEM_USER_ID);

    assert!(
        storage
            .deposition_files_dir(&dep.srn)
            .join("matrix.tsv")
            .exists(),
        "staged files must move into the deposition"
    );

    let submitted = outbox.events_of_type("DepositionSubmitted");
    assert_eq!(submitted.len(), 1);
    match &submitted[0].payload {
        EventPayload::DepositionSubmitted {
            deposition_srn,
            convention_srn,
        } => {
            assert_eq!(deposition_srn, &dep.srn);
            assert_eq!(convention_srn.to_string(), "urn:osa:test:conv:geo@1.0.0");
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[tokio::test]
async fn wrong_payload_type_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let handler = CreateDepositionFromSource::new(
        Arc::new(FakeDepositionStore::new("test")),
        Arc::new(LocalFileStorage::new(tmp.path())),
        Arc::new(MemOutbox::new(SubscriptionRegistry::default())),
    );

    let event = Event::new(EventPayload::ServerStarted {});
    assert!(handler.handle(&event).await.is_err());
}
