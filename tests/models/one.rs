use serde_json::json;
use typed_model::{Filter, ModelError, RecordId};

use crate::support::{comment, derived, record, records, store, users, users2, users3, wdefault};

#[tokio::test]
async fn store_and_load_by_id() {
    let (_, store) = store();
    let model = users();

    let mut user = model.one(store.clone(), Some(record(json!({ "test": 7 }))));
    user.store().await.unwrap();
    assert_eq!(user.content().unwrap(), &record(json!({ "id": 1, "test": 7, "a": null })));

    let mut loaded = model.one(store.clone(), None);
    loaded.load_by_id(1).await.unwrap();
    assert_eq!(loaded.content().unwrap(), user.content().unwrap());

    let mut by_string = model.one(store, None);
    by_string.load_by_id("1").await.unwrap();
    assert_eq!(by_string.content().unwrap()["test"], json!(7));
}

#[tokio::test]
async fn scalar_id_on_multi_key_schema_is_rejected() {
    let (_, store) = store();
    let model = users2();
    model
        .many(store.clone(), records(json!([{ "test": 4 }])))
        .store()
        .await
        .unwrap();

    let err = model.one(store.clone(), None).load_by_id(1).await.err().unwrap();
    assert!(matches!(err, ModelError::NotAllKeysGiven { .. }));

    let mut found = model.one(store, None);
    found
        .load_by_id(RecordId::from(json!({ "id": 1, "test": 4 })))
        .await
        .unwrap();
    assert_eq!(found.content().unwrap()["test"], json!(4));
}

#[tokio::test]
async fn load_needs_exactly_one_match() {
    let (_, store) = store();
    let model = users();
    let err = model
        .one(store.clone(), None)
        .load(Filter::new().eq("test", 1))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ModelError::NotFound { .. }));

    model
        .many(store.clone(), records(json!([{ "test": 1 }, { "test": 1 }])))
        .store()
        .await
        .unwrap();
    let err = model
        .one(store, None)
        .load(Filter::new().eq("test", 1))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ModelError::NotUnique { .. }));
}

#[tokio::test]
async fn storing_an_existing_identity_does_exist() {
    let (rows, store) = store();
    let model = users3();
    let fritz = record(json!({ "email": "fritz@example.com", "name": "Fritz", "age": 30 }));

    model.one(store.clone(), Some(fritz.clone())).store().await.unwrap();
    let err = model.one(store, Some(fritz)).store().await.err().unwrap();
    assert!(matches!(err, ModelError::DoesExist { .. }));
    assert_eq!(rows.rows("users3").unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_email_is_a_type_mismatch() {
    let (_, store) = store();
    let err = users3()
        .one(store, Some(record(json!({ "email": "not-an-email", "name": "Fritz" }))))
        .store()
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ModelError::TypeMismatch { ref field, .. } if field == "email"));
}

#[tokio::test]
async fn set_then_update_persists() {
    let (rows, store) = store();
    let model = users3();
    model
        .one(
            store.clone(),
            Some(record(json!({ "email": "fritz@example.com", "name": "Fritz" }))),
        )
        .store()
        .await
        .unwrap();

    let mut fritz = model.one(store, None);
    fritz
        .load_by_keys(Filter::new().eq("email", "fritz@example.com").eq("name", "Fritz"))
        .await
        .unwrap();
    fritz.set("age", 31).unwrap();
    fritz.update().await.unwrap();

    assert_eq!(rows.rows("users3").unwrap()[0]["age"], json!(31));
}

#[tokio::test]
async fn renaming_a_key_breaks_update() {
    let (rows, store) = store();
    let model = users3();
    model
        .one(
            store.clone(),
            Some(record(json!({ "email": "fritz@example.com", "name": "Fritz" }))),
        )
        .store()
        .await
        .unwrap();

    let mut fritz = model.one(store, None);
    fritz.load(Filter::new().eq("name", "Fritz")).await.unwrap();
    fritz.set("name", "Franz").unwrap();
    let err = fritz.update().await.err().unwrap();
    assert!(matches!(err, ModelError::Unexpected { .. }));
    assert_eq!(rows.rows("users3").unwrap()[0]["name"], json!("Fritz"));
}

#[tokio::test]
async fn delete_removes_the_record() {
    let (_, store) = store();
    let model = users();
    let mut user = model.one(store.clone(), Some(record(json!({ "test": 1 }))));
    user.store().await.unwrap();
    user.delete().await.unwrap();

    let err = model.one(store, None).load_by_id(1).await.err().unwrap();
    assert!(matches!(err, ModelError::NotFound { .. }));
}

#[tokio::test]
async fn delete_of_referenced_record_is_rejected() {
    let (rows, store) = store();
    let mut user = users().one(store.clone(), Some(record(json!({ "test": 1 }))));
    user.store().await.unwrap();
    comment()
        .one(store, Some(record(json!({ "userid": 1 }))))
        .store()
        .await
        .unwrap();

    let err = user.delete().await.err().unwrap();
    assert!(matches!(err, ModelError::IsReference { .. }));
    assert_eq!(rows.rows("users").unwrap().len(), 1);
}

#[tokio::test]
async fn empty_handle_has_no_content() {
    let (_, store) = store();
    let empty = users().one(store, None);
    assert!(matches!(empty.content(), Err(ModelError::NotUnique { .. })));
    assert!(empty.get_public().await.is_err());
}

#[tokio::test]
async fn empty_handle_store_writes_nothing() {
    let (rows, store) = store();
    let mut empty = users().one(store, None);
    let err = empty.store().await.err().unwrap();
    assert!(matches!(err, ModelError::NotUnique { .. }));
    let err = empty.update().await.err().unwrap();
    assert!(matches!(err, ModelError::NotUnique { .. }));
    assert!(rows.rows("users").unwrap().is_empty());
}

#[tokio::test]
async fn store_with_dangling_reference_fails_constraint() {
    let (rows, store) = store();
    let mut orphan = comment().one(store, Some(record(json!({ "userid": 404, "text": "orphan" }))));
    let err = orphan.store().await.err().unwrap();
    match err {
        ModelError::ConstraintFailed { records, .. } => assert_eq!(records[0]["userid"], json!(404)),
        other => panic!("unexpected error: {}", other),
    }
    assert!(rows.rows("comment").unwrap().is_empty());
}

#[tokio::test]
async fn load_none_keeps_the_handle_empty() {
    let (_, store) = store();
    let model = users();

    let mut absent = model.one(store.clone(), None);
    absent.load_none(Filter::new().eq("test", 5)).await.unwrap();
    assert!(absent.content().is_err());
    let err = absent.load(Filter::new().eq("test", 5)).await.err().unwrap();
    assert!(matches!(err, ModelError::AlreadyLoaded { .. }));

    model
        .one(store.clone(), Some(record(json!({ "test": 5 }))))
        .store()
        .await
        .unwrap();
    let err = model
        .one(store.clone(), None)
        .load_none(Filter::new().eq("test", 5))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ModelError::DoesExist { .. }));

    let err = model
        .one(store, None)
        .load_none_by_keys(Filter::new().eq("id", 1))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ModelError::DoesExist { .. }));
}

#[tokio::test]
async fn defaults_are_filled_and_published() {
    let (_, store) = store();
    let mut handle = wdefault().one(store, Some(record(json!({}))));
    handle.store().await.unwrap();

    let public = handle.get_public().await.unwrap();
    assert_eq!(
        public,
        record(json!({
            "id": 1,
            "hasDefault": 3,
            "hasDefaultFn": 4,
            "obj": { "deep": "inner", "deepFn": "inner fn" },
        }))
    );
}

#[tokio::test]
async fn public_projection_includes_derived_values() {
    let (_, store) = store();
    let model = derived();
    model
        .one(store.clone(), Some(record(json!({ "test": 3 }))))
        .store()
        .await
        .unwrap();

    let mut loaded = model.one(store, None);
    loaded.load_by_id(1).await.unwrap();
    let public = loaded.get_public().await.unwrap();
    assert_eq!(
        public,
        record(json!({
            "id": 1,
            "test": 3,
            "derivedId": "derived-1",
            "derivedAsync": "test",
            "siblings": 1,
        }))
    );
}
