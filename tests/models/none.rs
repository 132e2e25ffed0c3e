use serde_json::json;
use typed_model::{Filter, ModelError};

use crate::support::{records, store, users, users2};

#[tokio::test]
async fn load_none_resolves_until_a_match_exists() {
    let (_, store) = store();
    let model = users();

    model
        .none(store.clone())
        .load_none(Filter::new().eq("test", 777))
        .await
        .unwrap();

    model
        .many(store.clone(), records(json!([{ "test": 777 }])))
        .store()
        .await
        .unwrap();

    let err = model
        .none(store)
        .load_none(Filter::new().eq("test", 777))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ModelError::DoesExist { .. }));
}

#[tokio::test]
async fn load_none_by_keys_checks_key_fields() {
    let (_, store) = store();
    let model = users2();
    model
        .many(store.clone(), records(json!([{ "test": 1 }])))
        .store()
        .await
        .unwrap();

    let err = model
        .none(store.clone())
        .load_none_by_keys(Filter::new().eq("id", 1))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ModelError::NotAllKeysGiven { .. }));

    model
        .none(store.clone())
        .load_none_by_keys(Filter::new().eq("id", 1).eq("test", 2))
        .await
        .unwrap();

    let err = model
        .none(store)
        .load_none_by_keys(Filter::new().eq("id", "1").eq("test", 1))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ModelError::DoesExist { .. }));
}

#[tokio::test]
async fn absence_handle_loads_only_once() {
    let (_, store) = store();
    let mut none = users().none(store);
    none.load_none(Filter::new().eq("test", 1)).await.unwrap();
    let err = none
        .load_none(Filter::new().eq("test", 2))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ModelError::AlreadyLoaded { .. }));
}

#[tokio::test]
async fn absence_by_keys_loads_only_once() {
    let (_, store) = store();
    let mut none = users2().none(store);
    none.load_none_by_keys(Filter::new().eq("id", 1).eq("test", 1))
        .await
        .unwrap();
    let err = none
        .load_none_by_keys(Filter::new().eq("id", 2).eq("test", 2))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ModelError::AlreadyLoaded { .. }));
}
