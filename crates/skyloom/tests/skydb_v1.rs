mod mock_portal;

use mock_portal::MockPortal;
use serde_json::json;
use skyloom::error::SkyDbError;
use skyloom::registry::{GetEntryOptions, SetEntryOptions};
use skyloom::skydb::{GetJsonOptions, JsonData, MutableRecordStore, SetJsonOptions, SkyDb};
use skyloom::types::crypto::{KeyPair, gen_key_pair_from_seed};
use skyloom::types::registry::{MAX_REVISION, RegistryEntry};

fn keys() -> KeyPair {
    gen_key_pair_from_seed("insecure test seed")
}

#[tokio::test]
async fn first_write_uses_revision_zero() {
    let portal = MockPortal::default();
    let db = SkyDb::new(portal.client());
    let keys = keys();

    let written = db
        .set_json(&keys.private_key, "fresh", json!({"a": 1}), SetJsonOptions::default())
        .await
        .unwrap();
    assert_eq!(portal.entry(&keys.public_key, "fresh").await.unwrap().revision, 0);

    let read = db
        .get_json(&keys.public_key, "fresh", GetJsonOptions::default())
        .await
        .unwrap();
    assert_eq!(read, written);
}

#[tokio::test]
async fn write_follows_portal_revision() {
    let portal = MockPortal::default();
    let db = SkyDb::new(portal.client());
    let keys = keys();

    let skylink = portal.put_blob("application/json", br#"{"_data":0,"_v":2}"#).await;
    let existing = RegistryEntry::new("app", skylink.as_bytes().to_vec(), 11)
        .sign(&keys.private_key, false)
        .unwrap();
    portal.put_entry(&keys.public_key, &existing).await;

    db.set_json(&keys.private_key, "app", json!(1), SetJsonOptions::default())
        .await
        .unwrap();
    assert_eq!(portal.entry(&keys.public_key, "app").await.unwrap().revision, 12);
}

#[tokio::test]
async fn overflow_stops_before_upload() {
    let portal = MockPortal::default();
    let db = SkyDb::new(portal.client());
    let keys = keys();

    let maxed = RegistryEntry::new("maxed", Vec::new(), MAX_REVISION)
        .sign(&keys.private_key, false)
        .unwrap();
    portal.put_entry(&keys.public_key, &maxed).await;

    let err = db
        .set_json(&keys.private_key, "maxed", json!(1), SetJsonOptions::default())
        .await
        .unwrap_err();
    assert!(
        matches!(&err, SkyDbError::RevisionOverflow { data_key } if data_key == "maxed"),
        "{err:?}"
    );
    assert_eq!(portal.uploads().await, 0);
}

#[tokio::test]
async fn racing_writers_are_arbitrated_by_portal() {
    let portal = MockPortal::default();
    let db = SkyDb::new(portal.client());
    let keys = keys();

    let (a, b) = tokio::join!(
        db.set_json(&keys.private_key, "race", json!("a"), SetJsonOptions::default()),
        db.set_json(&keys.private_key, "race", json!("b"), SetJsonOptions::default()),
    );
    // Both read "no entry" and pick revision 0; only one lands.
    let failures: Vec<_> = [a, b].into_iter().filter_map(Result::err).collect();
    assert_eq!(failures.len(), 1);
    assert!(
        matches!(failures[0], SkyDbError::RegistryRejected { .. }),
        "{:?}",
        failures[0]
    );
    assert_eq!(portal.entry(&keys.public_key, "race").await.unwrap().revision, 0);
}

#[tokio::test]
async fn missing_and_deleted_read_as_empty() {
    let portal = MockPortal::default();
    let db = SkyDb::new(portal.client());
    let keys = keys();

    assert_eq!(
        db.get_json(&keys.public_key, "nothing", GetJsonOptions::default())
            .await
            .unwrap(),
        JsonData::default()
    );

    db.set_json(&keys.private_key, "doomed", json!(1), SetJsonOptions::default())
        .await
        .unwrap();
    db.delete_json(&keys.private_key, "doomed", SetJsonOptions::default())
        .await
        .unwrap();
    assert_eq!(
        db.get_json(&keys.public_key, "doomed", GetJsonOptions::default())
            .await
            .unwrap(),
        JsonData::default()
    );
    assert_eq!(portal.entry(&keys.public_key, "doomed").await.unwrap().revision, 1);
}

#[tokio::test]
async fn entry_text_skylink_is_followed() {
    let portal = MockPortal::default();
    let db = SkyDb::new(portal.client());
    let keys = keys();

    // Some writers store the base64 text of the skylink instead of its bytes.
    let skylink = portal.put_blob("application/json", br#"{"_data":"text","_v":2}"#).await;
    let entry = RegistryEntry::new("legacy", skylink.to_base64().into_bytes(), 0)
        .sign(&keys.private_key, false)
        .unwrap();
    portal.put_entry(&keys.public_key, &entry).await;

    let read = db
        .get_json(&keys.public_key, "legacy", GetJsonOptions::default())
        .await
        .unwrap();
    assert_eq!(read.data, Some(json!("text")));
    assert_eq!(read.data_link, Some(skylink.to_uri()));
}

#[tokio::test]
async fn forged_entry_is_rejected() {
    let portal = MockPortal::default();
    let db = SkyDb::new(portal.client());
    let keys = keys();
    let intruder = gen_key_pair_from_seed("someone else entirely");

    let skylink = portal.put_blob("application/json", br#"{"_data":1,"_v":2}"#).await;
    let forged = RegistryEntry::new("app", skylink.as_bytes().to_vec(), 3)
        .sign(&intruder.private_key, false)
        .unwrap();
    portal.put_entry(&keys.public_key, &forged).await;

    let err = db
        .get_json(&keys.public_key, "app", GetJsonOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SkyDbError::InvalidSignature), "{err:?}");
    assert_eq!(portal.downloads().await, 0);
}

#[tokio::test]
async fn entry_data_link_and_raw_bytes() {
    let portal = MockPortal::default();
    let db = SkyDb::new(portal.client());
    let keys = keys();

    db.set_entry_data(&keys.private_key, "raw", b"v1".to_vec(), SetEntryOptions::default())
        .await
        .unwrap();
    assert_eq!(
        db.get_entry_data(&keys.public_key, "raw", GetEntryOptions::default())
            .await
            .unwrap(),
        Some(b"v1".to_vec())
    );
    db.delete_entry_data(&keys.private_key, "raw", SetEntryOptions::default())
        .await
        .unwrap();
    assert_eq!(
        db.get_entry_data(&keys.public_key, "raw", GetEntryOptions::default())
            .await
            .unwrap(),
        None
    );
    assert_eq!(portal.entry(&keys.public_key, "raw").await.unwrap().revision, 1);

    let blob = portal.put_blob("application/octet-stream", &[1, 2, 3]).await;
    db.set_data_link(&keys.private_key, "bin", &blob.to_base32(), SetJsonOptions::default())
        .await
        .unwrap();
    let raw = db
        .get_raw_bytes(&keys.public_key, "bin", GetJsonOptions::default())
        .await
        .unwrap();
    assert_eq!(raw.data, Some(vec![1, 2, 3]));
    assert_eq!(raw.data_link, Some(blob.to_uri()));
}
