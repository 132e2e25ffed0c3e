use std::error::Error;

use serde_json::json;
use typed_model::{Filter, ModelError, Order, Query, StoreError, StoreErrorKind};

use crate::support::{accounts, comment, derived, ghost, record, records, store, users, users2, users3};

#[tokio::test]
async fn store_then_reload_normalizes_omitted_fields() {
    let (_, store) = store();
    let model = users();

    let mut stored = model.many(store.clone(), records(json!([{ "test": 1 }, { "test": 2, "a": 3 }])));
    stored.store().await.unwrap();
    assert_eq!(
        stored.contents(),
        records(json!([
            { "id": 1, "test": 1, "a": null },
            { "id": 2, "test": 2, "a": 3 },
        ]))
    );

    let mut loaded = model.many(store, Vec::new());
    loaded.load_query(Filter::new()).await.unwrap();
    assert_eq!(
        loaded.contents(),
        records(json!([
            { "id": 1, "test": 1, "a": null },
            { "id": 2, "test": 2, "a": 3 },
        ]))
    );
}

#[tokio::test]
async fn store_then_load_by_keys_round_trips() {
    let (_, store) = store();
    let model = users2();

    let mut stored = model.many(store.clone(), records(json!([{ "test": 5 }, { "test": 6, "a": 1 }])));
    stored.store().await.unwrap();
    let expected = stored.contents().to_vec();

    let mut loaded = model.many(store, Vec::new());
    loaded
        .load_by_keys(
            Filter::new().one_of("id", [json!(1), json!(2)]).one_of("test", [json!(5), json!(6)]),
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(loaded.contents(), expected);
}

#[tokio::test]
async fn string_ids_are_marshaled_for_key_lookups() {
    let (_, store) = store();
    let model = users();
    model
        .many(store.clone(), records(json!([{ "test": 1 }])))
        .store()
        .await
        .unwrap();

    let mut loaded = model.many(store, Vec::new());
    loaded
        .load_by_keys(Filter::new().one_of("id", [json!("1")]), None, None)
        .await
        .unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded.contents()[0]["id"], json!(1));
}

#[tokio::test]
async fn loading_twice_fails() {
    let (_, store) = store();
    let mut handle = users().many(store, Vec::new());
    handle.load_query(Filter::new()).await.unwrap();

    let again = handle.load_query(Filter::new().eq("test", 1)).await;
    assert!(matches!(again, Err(ModelError::AlreadyLoaded { .. })));
    let again = handle.load_one(Filter::new()).await;
    assert!(matches!(again, Err(ModelError::AlreadyLoaded { .. })));
    let again = handle
        .load_by_keys(Filter::new().eq("id", 1), None, None)
        .await;
    assert!(matches!(again, Err(ModelError::AlreadyLoaded { .. })));
}

#[tokio::test]
async fn load_orders_and_pages() {
    let (_, store) = store();
    let model = users();
    model
        .many(store.clone(), records(json!([{ "test": 3 }, { "test": 1 }, { "test": 2 }])))
        .store()
        .await
        .unwrap();

    let mut page = model.many(store.clone(), Vec::new());
    page.load(Filter::new(), Some(2), Some(1), vec![Order::desc("test")])
        .await
        .unwrap();
    let tests: Vec<_> = page.contents().iter().map(|r| r["test"].clone()).collect();
    assert_eq!(tests, vec![json!(2), json!(1)]);

    let mut filtered = model.many(store, Vec::new());
    filtered
        .load_query(Query::new(Filter::new().gte("test", 2)).order_by(Order::asc("test")))
        .await
        .unwrap();
    assert_eq!(filtered.len(), 2);
    assert_eq!(filtered.contents()[0]["test"], json!(2));
}

#[tokio::test]
async fn load_one_requires_exactly_one_match() {
    let (_, store) = store();
    let model = users();
    model
        .many(store.clone(), records(json!([{ "test": 1 }, { "test": 1 }, { "test": 2 }])))
        .store()
        .await
        .unwrap();

    let err = model
        .many(store.clone(), Vec::new())
        .load_one(Filter::new().eq("test", 9))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ModelError::NotFound { .. }));

    let err = model
        .many(store.clone(), Vec::new())
        .load_one(Filter::new().eq("test", 1))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ModelError::NotUnique { .. }));

    let mut one = model.many(store, Vec::new());
    one.load_one(Filter::new().eq("test", 2)).await.unwrap();
    assert_eq!(one.content().unwrap()["id"], json!(3));
}

#[tokio::test]
async fn update_persists_in_place_changes() {
    let (rows, store) = store();
    let model = users();
    model
        .many(store.clone(), records(json!([{ "test": 1 }, { "test": 2 }])))
        .store()
        .await
        .unwrap();

    let mut loaded = model.many(store, Vec::new());
    loaded.load_query(Filter::new()).await.unwrap();
    for record in loaded.contents_mut() {
        record.insert("a".into(), json!(42));
    }
    loaded.update().await.unwrap();

    let stored = rows.rows("users").unwrap();
    assert!(stored.iter().all(|r| r["a"] == json!(42)));
}

#[tokio::test]
async fn update_after_key_change_fails_and_leaves_storage() {
    let (rows, store) = store();
    let model = users2();
    model
        .many(store.clone(), records(json!([{ "test": 1 }])))
        .store()
        .await
        .unwrap();
    let before = rows.rows("users2").unwrap();

    let mut loaded = model.many(store, Vec::new());
    loaded.load_query(Filter::new()).await.unwrap();
    loaded.contents_mut()[0].insert("test".into(), json!(99));
    loaded.contents_mut()[0].insert("a".into(), json!(5));

    let err = loaded.update().await.err().unwrap();
    assert!(matches!(err, ModelError::Unexpected { .. }));
    assert_eq!(rows.rows("users2").unwrap(), before);
}

#[tokio::test]
async fn update_after_length_change_fails() {
    let (_, store) = store();
    let model = users();
    model
        .many(store.clone(), records(json!([{ "test": 1 }, { "test": 2 }])))
        .store()
        .await
        .unwrap();

    let mut loaded = model.many(store.clone(), Vec::new());
    loaded.load_query(Filter::new()).await.unwrap();
    loaded.contents_mut().pop();
    let err = loaded.update().await.err().unwrap();
    assert!(matches!(err, ModelError::Unexpected { .. }));

    let mut grown = model.many(store, Vec::new());
    grown.load_query(Filter::new()).await.unwrap();
    grown.contents_mut().push(record(json!({ "id": 7, "test": 7 })));
    let err = grown.update().await.err().unwrap();
    assert!(matches!(err, ModelError::Unexpected { .. }));
}

#[tokio::test]
async fn update_without_load_fails() {
    let (_, store) = store();
    let mut handle = users().many(store, records(json!([{ "id": 1, "test": 1 }])));
    let err = handle.update().await.err().unwrap();
    assert!(matches!(err, ModelError::Unexpected { .. }));
}

#[tokio::test]
async fn key_lookups_need_exactly_the_key_fields() {
    let (_, store) = store();
    let model = users2();

    let subset = model
        .many(store.clone(), Vec::new())
        .load_by_keys(Filter::new().one_of("id", [json!(1)]), None, None)
        .await
        .err()
        .unwrap();
    assert!(matches!(subset, ModelError::NotAllKeysGiven { .. }));

    let superset = model
        .many(store.clone(), Vec::new())
        .load_one_by_keys(Filter::new().eq("id", 1).eq("test", 1).eq("a", 1))
        .await
        .err()
        .unwrap();
    assert!(matches!(superset, ModelError::NotAllKeysGiven { .. }));

    let other = model
        .many(store, Vec::new())
        .load_none_by_keys(Filter::new().eq("a", 1))
        .await
        .err()
        .unwrap();
    assert!(matches!(other, ModelError::NotAllKeysGiven { .. }));
}

#[tokio::test]
async fn store_rejects_wrong_types_before_writing() {
    let (rows, store) = store();
    let mut handle = users().many(store, records(json!([{ "test": 1 }, { "test": "two" }])));
    let err = handle.store().await.err().unwrap();
    match err {
        ModelError::TypeMismatch { field, value, .. } => {
            assert_eq!(field, "test");
            assert_eq!(value, json!("two"));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(rows.rows("users").unwrap().is_empty());
}

#[tokio::test]
async fn store_of_duplicates_is_not_unique() {
    let (rows, store) = store();
    let model = users3();
    let user = json!({ "email": "fritz@example.com", "name": "Fritz" });
    model
        .many(store.clone(), records(json!([user])))
        .store()
        .await
        .unwrap();

    let err = model
        .many(store, records(json!([{ "email": "hans@example.com", "name": "Hans" }, user])))
        .store()
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ModelError::NotUnique { .. }));
    assert_eq!(rows.rows("users3").unwrap().len(), 1);
}

#[tokio::test]
async fn store_with_dangling_reference_fails_constraint() {
    let (_, store) = store();
    let err = comment()
        .many(store, records(json!([{ "userid": 404, "text": "orphan" }])))
        .store()
        .await
        .err()
        .unwrap();
    match err {
        ModelError::ConstraintFailed { records, .. } => assert_eq!(records.len(), 1),
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn delete_all_removes_buffered_rows() {
    let (rows, store) = store();
    let model = users();
    model
        .many(store.clone(), records(json!([{ "test": 1 }, { "test": 2 }, { "test": 3 }])))
        .store()
        .await
        .unwrap();

    let mut doomed = model.many(store, Vec::new());
    doomed.load_query(Filter::new().lt("test", 3)).await.unwrap();
    doomed.delete_all().await.unwrap();

    let left = rows.rows("users").unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0]["test"], json!(3));
}

#[tokio::test]
async fn delete_all_of_referenced_rows_is_rejected() {
    let (rows, store) = store();
    let mut people = users().many(store.clone(), records(json!([{ "test": 1 }, { "test": 2 }])));
    people.store().await.unwrap();
    comment()
        .many(store.clone(), records(json!([{ "userid": 2, "text": "hi" }])))
        .store()
        .await
        .unwrap();
    let users_before = rows.rows("users").unwrap();
    let comments_before = rows.rows("comment").unwrap();

    let mut loaded = users().many(store, Vec::new());
    loaded.load_query(Filter::new()).await.unwrap();
    let err = loaded.delete_all().await.err().unwrap();
    match err {
        ModelError::IsReference { records, .. } => assert_eq!(records.len(), 2),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(rows.rows("users").unwrap(), users_before);
    assert_eq!(rows.rows("comment").unwrap(), comments_before);
}

#[tokio::test]
async fn derived_values_are_computed_once() {
    let (_, store) = store();
    let model = derived();
    let mut handle = model.many(store, records(json!([{ "test": 1 }, { "test": 2 }])));
    handle.store().await.unwrap();

    let first = handle.get_with_derived().await.unwrap();
    assert_eq!(first[0]["derivedId"], json!("derived-1"));
    assert_eq!(first[1]["derivedAsync"], json!("test"));
    assert_eq!(first[1]["siblings"], json!(2));

    handle.contents_mut()[0].insert("id".into(), json!(100));
    let second = handle.get_with_derived().await.unwrap();
    assert_eq!(second, first);
}

#[tokio::test]
async fn public_projection_uses_mapped_names_and_drops_nulls() {
    let (_, store) = store();
    let mut handle = users().many(store, records(json!([{ "test": 1 }, { "test": 2, "a": 3 }])));
    handle.store().await.unwrap();

    let public = handle.get_public().await.unwrap();
    assert_eq!(
        public,
        records(json!([
            { "id": 1, "test": 1 },
            { "id": 2, "test": 2, "alpha": 3 },
        ]))
    );
}

#[tokio::test]
async fn set_contents_resets_derived_values() {
    let (_, store) = store();
    let mut handle = derived().many(store, records(json!([{ "id": 1, "test": 1 }])));
    let first = handle.get_with_derived().await.unwrap();
    assert_eq!(first[0]["derivedId"], json!("derived-1"));

    handle.set_contents(records(json!([{ "id": 5, "test": 1 }])));
    let second = handle.get_with_derived().await.unwrap();
    assert_eq!(second[0]["derivedId"], json!("derived-5"));
    assert!(handle.content().is_ok());
}

#[tokio::test]
async fn update_clashing_with_a_unique_column_is_unexpected() {
    let (rows, store) = store();
    let model = accounts();
    model
        .many(store.clone(), records(json!([{ "nick": "ada" }, { "nick": "bob" }])))
        .store()
        .await
        .unwrap();

    let mut loaded = model.many(store, Vec::new());
    loaded
        .load_query(Query::new(Filter::new()).order_by(Order::asc("id")))
        .await
        .unwrap();
    for record in loaded.contents_mut() {
        record.insert("nick".to_string(), json!("eve"));
    }

    let err = loaded.update().await.err().unwrap();
    assert!(matches!(err, ModelError::Unexpected { .. }));
    let cause = err.source().and_then(|e| e.downcast_ref::<StoreError>()).unwrap();
    assert_eq!(cause.kind, StoreErrorKind::UniqueViolation);
    let nicks: Vec<_> = rows
        .rows("accounts")
        .unwrap()
        .into_iter()
        .map(|row| row["nick"].clone())
        .collect();
    assert!(nicks.contains(&json!("eve")));
    assert_eq!(nicks.len(), 2);
}

#[tokio::test]
async fn undeclared_collection_failures_keep_their_cause() {
    let (_, store) = store();
    let model = ghost();

    let err = model
        .many(store.clone(), records(json!([{ "test": 1 }])))
        .store()
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ModelError::Unexpected { .. }));
    let cause = err.source().and_then(|e| e.downcast_ref::<StoreError>()).unwrap();
    assert_eq!(cause.kind, StoreErrorKind::Other);

    let err = model
        .many(store.clone(), records(json!([{ "id": 1, "test": 1 }])))
        .delete_all()
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ModelError::Unexpected { .. }));
    assert!(err.source().is_some());

    let err = model
        .many(store, Vec::new())
        .load_query(Filter::new())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ModelError::Unexpected { .. }));
    assert!(err.source().is_some());
}
