//! User service: cached reads, writes, nested lists, cascade delete

use rolnodb::core::types::{into_record, record_id};
use rolnodb::{
    CascadeTarget, DatabaseManager, NewUser, Record, StoreConfig, UserStore, cascade_delete,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;

fn record(value: Value) -> Record {
    into_record(value).unwrap()
}

fn new_user(email: &str) -> NewUser {
    NewUser {
        displayed_name: email.split('@').next().unwrap().to_string(),
        email: email.to_string(),
        password: "hashed".to_string(),
        ..NewUser::default()
    }
}

async fn setup() -> (TempDir, UserStore) {
    let temp_dir = TempDir::new().unwrap();
    let manager = Arc::new(DatabaseManager::new(StoreConfig::new(temp_dir.path())));
    let store = UserStore::open(manager).await.unwrap();
    (temp_dir, store)
}

#[tokio::test]
async fn test_create_user_defaults_and_account() {
    let (_temp_dir, store) = setup().await;

    let mut input = new_user("a@test.com");
    input.username = Some("anna".into());
    input.additional.insert("role".into(), json!("farmer"));
    let user = store.create_user(input).await.unwrap();

    assert_eq!(record_id(&user), Some(1));
    assert_eq!(user["isActive"], true);
    assert_eq!(user["lastLogin"], Value::Null);
    assert_eq!(user["role"], "farmer");
    assert!(user["createdAt"].is_string());
    assert_eq!(user.keys().next().map(String::as_str), Some("id"));

    let accounts = store
        .manager()
        .financial()
        .await
        .unwrap()
        .section("accounts")
        .unwrap();
    assert_eq!(accounts[0]["userId"], 1);
    assert_eq!(accounts[0]["currency"], "ROL");

    assert!(store.user_exists_by_email("a@test.com").await.unwrap());
    assert!(store.user_exists_by_username("anna").await.unwrap());
    assert!(!store.user_exists_by_id(2).await.unwrap());
}

#[tokio::test]
async fn test_cached_list_reflects_own_update() {
    let (_temp_dir, store) = setup().await;
    store.create_user(new_user("a@test.com")).await.unwrap();

    let before = store.get_users().await.unwrap();
    assert_eq!(before[0]["isActive"], true);
    assert!(store.cache_status().await.is_valid);

    store
        .update_user(1, record(json!({"isActive": false})))
        .await
        .unwrap();
    assert!(!store.cache_status().await.has_cached_data);

    let after = store.get_users().await.unwrap();
    assert_eq!(after[0]["isActive"], false);
    assert!(after[0]["updatedAt"].is_string());
    // the old snapshot is untouched
    assert_eq!(before[0]["isActive"], true);
}

#[tokio::test]
async fn test_delete_user_cascades() {
    let (_temp_dir, store) = setup().await;
    let manager = Arc::clone(store.manager());
    store.create_user(new_user("a@test.com")).await.unwrap();
    store.create_user(new_user("b@test.com")).await.unwrap();

    let fields = manager.fields().await.unwrap();
    fields.add(record(json!({"userId": 1, "name": "north"}))).await.unwrap();
    fields.add(record(json!({"userId": 1, "name": "south"}))).await.unwrap();
    fields.add(record(json!({"userId": 2, "name": "east"}))).await.unwrap();
    let assignments = manager.assignments().await.unwrap();
    assignments
        .add(record(json!({"userId": 1, "fieldId": 1, "staffId": 1})))
        .await
        .unwrap();

    let deleted = store.delete_user(1).await.unwrap();
    assert_eq!(deleted["email"], "a@test.com");

    assert!(store.find_user(1).await.unwrap().is_none());
    assert!(fields.find(|f| f.get("userId") == Some(&json!(1))).unwrap().is_empty());
    assert_eq!(fields.count().unwrap(), 1);
    assert_eq!(assignments.count().unwrap(), 0);
    assert_eq!(store.user_count().await.unwrap(), 1);

    let err = store.delete_user(1).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_cascade_field_staff_and_animal() {
    let (_temp_dir, store) = setup().await;
    let manager = store.manager();
    let assignments = manager.assignments().await.unwrap();
    for (field, staff) in [(1, 1), (1, 2), (2, 2)] {
        assignments
            .add(record(json!({"userId": 1, "fieldId": field, "staffId": staff})))
            .await
            .unwrap();
    }
    let animals = manager.animals().await.unwrap();
    animals
        .add(record(json!({"userId": 1, "kind": "cow", "fieldId": 2})))
        .await
        .unwrap();

    cascade_delete(manager, CascadeTarget::Field(1)).await.unwrap();
    assert_eq!(assignments.count().unwrap(), 1);

    cascade_delete(manager, CascadeTarget::Staff(2)).await.unwrap();
    assert_eq!(assignments.count().unwrap(), 0);

    cascade_delete(manager, CascadeTarget::Animal(1)).await.unwrap();
    let cow = animals.find_by_id(1).unwrap().unwrap();
    assert!(!cow.contains_key("fieldId"));
    assert_eq!(cow["kind"], "cow");

    let err = cascade_delete(manager, CascadeTarget::User(0)).await.unwrap_err();
    assert_eq!(err.to_string(), "Validation error: Invalid user ID format");
}

#[tokio::test]
async fn test_nested_fields_and_staff() {
    let (_temp_dir, store) = setup().await;
    store.create_user(new_user("a@test.com")).await.unwrap();

    let north = store
        .add_field(1, record(json!({"id": 50, "name": "north"})))
        .await
        .unwrap();
    let south = store.add_field(1, record(json!({"name": "south"}))).await.unwrap();
    assert_eq!(north["id"], 1);
    assert_eq!(south["id"], 2);
    assert_eq!(store.list_fields(1).await.unwrap().len(), 2);

    assert!(store.delete_field(1, 1).await.unwrap());
    assert!(!store.delete_field(1, 1).await.unwrap());
    assert_eq!(store.list_fields(1).await.unwrap(), vec![json!({"id": 2, "name": "south"})]);

    let ola = store.add_staff(1, record(json!({"name": "Ola"}))).await.unwrap();
    assert_eq!(ola["id"], 1);
    assert_eq!(store.list_staff(1).await.unwrap().len(), 1);
    assert!(store.delete_staff(1, 1).await.unwrap());
    assert!(store.list_staff(1).await.unwrap().is_empty());

    let user = store.find_user(1).await.unwrap().unwrap();
    assert!(user["updatedAt"].is_string());

    assert!(store.list_fields(9).await.unwrap().is_empty());
    assert!(store.add_staff(9, Record::new()).await.unwrap_err().is_not_found());
    assert!(store.delete_field(9, 1).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_nested_writes_invalidate_cache() {
    let (_temp_dir, store) = setup().await;
    store.create_user(new_user("a@test.com")).await.unwrap();

    store.get_users().await.unwrap();
    store.add_field(1, record(json!({"name": "north"}))).await.unwrap();
    assert!(!store.cache_status().await.has_cached_data);
    assert_eq!(store.get_users().await.unwrap()[0]["fields"][0]["name"], "north");

    store.delete_field(1, 1).await.unwrap();
    assert!(!store.cache_status().await.has_cached_data);
    assert_eq!(store.get_users().await.unwrap()[0]["fields"], json!([]));

    store.add_staff(1, record(json!({"name": "Ola"}))).await.unwrap();
    assert!(!store.cache_status().await.has_cached_data);
    assert_eq!(store.get_users().await.unwrap()[0]["staff"][0]["name"], "Ola");

    store.delete_staff(1, 1).await.unwrap();
    assert!(!store.cache_status().await.has_cached_data);
    assert_eq!(store.get_users().await.unwrap()[0]["staff"], json!([]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_nested_adds_keep_every_entry() {
    let (_temp_dir, store) = setup().await;
    let store = Arc::new(store);
    store.create_user(new_user("a@test.com")).await.unwrap();

    let mut handles = vec![];
    for i in 0..10 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store.add_field(1, record(json!({"n": i}))).await.unwrap()
        }));
    }

    let mut ids: Vec<u64> = vec![];
    for handle in handles {
        ids.push(handle.await.unwrap()["id"].as_u64().unwrap());
    }
    ids.sort_unstable();
    assert_eq!(ids, (1..=10).collect::<Vec<_>>());

    let stored = store.list_fields(1).await.unwrap();
    assert_eq!(stored.len(), 10);
}

#[tokio::test]
async fn test_clearing_locks_keeps_one_engine_per_file() {
    let (temp_dir, store) = setup().await;
    let manager = Arc::clone(store.manager());
    store.create_user(new_user("a@test.com")).await.unwrap();

    manager.clear_all().await.unwrap();

    let b = manager
        .users()
        .await
        .unwrap()
        .add(record(json!({"email": "b@test.com"})))
        .await
        .unwrap();
    let c = store.create_user(new_user("c@test.com")).await.unwrap();
    assert_eq!(b["id"], 2);
    assert_eq!(c["id"], 3);

    let on_disk: Value =
        serde_json::from_slice(&std::fs::read(temp_dir.path().join("users.json")).unwrap())
            .unwrap();
    let emails: Vec<&str> = on_disk
        .as_array()
        .unwrap()
        .iter()
        .map(|user| user["email"].as_str().unwrap())
        .collect();
    assert_eq!(emails, vec!["a@test.com", "b@test.com", "c@test.com"]);
}

#[tokio::test]
async fn test_login_and_deactivation() {
    let (_temp_dir, store) = setup().await;
    store.create_user(new_user("a@test.com")).await.unwrap();
    store.create_user(new_user("b@test.com")).await.unwrap();

    let logged_in = store.update_last_login(2).await.unwrap();
    assert!(logged_in["lastLogin"].is_string());

    store.deactivate_user(1).await.unwrap();
    let active = store.active_users().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["email"], "b@test.com");

    let err = store.update_user(5, Record::new()).await.unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_invalid_ids_rejected() {
    let (_temp_dir, store) = setup().await;

    let err = store.find_user(0).await.unwrap_err();
    assert_eq!(err.code(), "VALIDATION");
    assert!(err.to_string().contains("Invalid user ID format"));
    assert_eq!(store.update_user(0, Record::new()).await.unwrap_err().code(), "VALIDATION");
    assert_eq!(store.delete_user(0).await.unwrap_err().code(), "VALIDATION");
}

#[tokio::test]
async fn test_force_refresh_and_shutdown() {
    let (_temp_dir, store) = setup().await;
    store.create_user(new_user("a@test.com")).await.unwrap();

    let fresh = store.force_refresh_cache().await.unwrap();
    assert_eq!(fresh.as_array().unwrap().len(), 1);
    assert_eq!(store.cache_status().await.cached_count, 1);

    store.shutdown().await.unwrap();
    assert!(!store.cache_status().await.has_cached_data);
    assert_eq!(store.manager().instance_count().await, 0);
}
