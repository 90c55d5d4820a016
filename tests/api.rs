//! End-to-end service behavior against a real SQLite database.

use restdb::config::parse_file_columns;
use restdb::{ContentStore, Db, Envelope, ResourceService, SchemaCatalog};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

struct Harness {
    db: Db,
    catalog: SchemaCatalog,
    store: ContentStore,
    file_columns: HashSet<String>,
    tmp: tempfile::TempDir,
}

impl Harness {
    async fn new() -> Harness {
        let tmp = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", tmp.path().join("test.db").display());
        let db = Db::connect(&url).await.unwrap();
        for sql in [
            "CREATE TABLE todos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created TEXT DEFAULT CURRENT_TIMESTAMP,
                updated TEXT,
                user_id TEXT,
                category TEXT NOT NULL DEFAULT 'inbox',
                description TEXT NOT NULL,
                file TEXT,
                done INTEGER NOT NULL DEFAULT 0,
                urgency INTEGER
            )",
            "CREATE TABLE categories (name TEXT NOT NULL)",
            "CREATE TABLE link (a INTEGER NOT NULL, b INTEGER NOT NULL, PRIMARY KEY (a, b))",
            "CREATE TABLE _private_meta (k TEXT PRIMARY KEY, v TEXT)",
        ] {
            db.execute(sql, &[]).await.unwrap();
        }
        let catalog = SchemaCatalog::new(&db);
        let store = ContentStore::new(tmp.path().join("blobs"));
        Harness { db, catalog, store, file_columns: parse_file_columns("file,receipt"), tmp }
    }

    fn service(&self, user: Option<&str>) -> ResourceService<'_> {
        ResourceService::new(
            &self.db,
            &self.catalog,
            &self.store,
            &self.file_columns,
            user.map(String::from),
        )
    }

    async fn create_todo(&self, user: Option<&str>, payload: Value) -> Envelope {
        self.service(user)
            .create_resource("todos", payload.as_object().cloned().unwrap(), &HashMap::new())
            .await
    }
}

fn params(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn message(envelope: &Envelope) -> &str {
    envelope.body["message"].as_str().unwrap()
}

#[tokio::test]
async fn list_resources_excludes_internal_tables() {
    let h = Harness::new().await;
    let env = h.service(None).list_resources().await;
    assert_eq!(env.code, 200);
    assert_eq!(env.body, json!(["categories", "link", "todos"]));
}

#[tokio::test]
async fn empty_collection_envelope() {
    let h = Harness::new().await;
    let env = h.service(None).read_collection("todos", &Map::new()).await;
    assert_eq!(env.code, 200);
    assert_eq!(env.body, json!([]));
    assert_eq!(env.headers["X-Pagination-Limit"], "25");
    assert_eq!(env.headers["X-Pagination-Offset"], "0");
    assert_eq!(env.headers["X-Pagination-Total"], "0");
    assert!(env.headers.contains_key("X-Query"));
    assert!(env.headers["X-Query-Time"].ends_with('s'), "timing carries its unit");
}

#[tokio::test]
async fn unknown_resource_is_rejected() {
    let h = Harness::new().await;
    let env = h.service(None).read_collection("nope", &Map::new()).await;
    assert_eq!(env.code, 400);
    assert_eq!(message(&env), "Resource nope does not exist");
}

#[tokio::test]
async fn create_and_read_round_trip() {
    let h = Harness::new().await;
    let env = h
        .create_todo(Some("alice"), json!({"description": "buy milk", "urgency": 3}))
        .await;
    assert_eq!(env.code, 200, "{:?}", env.body);
    assert_eq!(env.body["description"], json!("buy milk"));
    assert_eq!(env.body["urgency"], json!(3));
    assert_eq!(env.body["user_id"], json!("alice"));
    // Server-assigned defaults come back with the row.
    assert_eq!(env.body["category"], json!("inbox"));
    assert_eq!(env.body["done"], json!(0));
    let id = env.body["id"].as_i64().unwrap().to_string();

    let env = h.service(Some("alice")).read_resource("todos", &id, &Map::new()).await;
    assert_eq!(env.code, 200);
    assert_eq!(env.body["description"], json!("buy milk"));
}

#[tokio::test]
async fn search_matches_description() {
    let h = Harness::new().await;
    for description in ["buy milk", "take out the trash", "water plants"] {
        let env = h.create_todo(None, json!({"description": description})).await;
        assert_eq!(env.code, 200, "{:?}", env.body);
    }
    let env = h
        .service(None)
        .read_collection("todos", &params(json!({"_search": "trash"})))
        .await;
    assert_eq!(env.code, 200);
    assert_eq!(env.body.as_array().unwrap().len(), 1);
    assert_eq!(env.body[0]["description"], json!("take out the trash"));
    assert_eq!(env.headers["X-Pagination-Total"], "1");
}

#[tokio::test]
async fn pagination_invariant() {
    let h = Harness::new().await;
    for i in 0..5 {
        h.create_todo(None, json!({"description": format!("todo {i}")})).await;
    }
    // rows == min(limit, max(0, total - offset)); total independent of paging.
    for (limit, offset, expected) in [(2, 0, 2), (2, 4, 1), (25, 5, 0), (3, 1, 3)] {
        let env = h
            .service(None)
            .read_collection(
                "todos",
                &params(json!({"_limit": limit.to_string(), "_offset": offset.to_string()})),
            )
            .await;
        assert_eq!(env.code, 200);
        assert_eq!(env.body.as_array().unwrap().len(), expected);
        assert_eq!(env.headers["X-Pagination-Total"], "5");
        assert_eq!(env.headers["X-Pagination-Limit"], limit.to_string());
        assert_eq!(env.headers["X-Pagination-Offset"], offset.to_string());
    }
}

#[tokio::test]
async fn sorting_and_projection() {
    let h = Harness::new().await;
    for (description, urgency) in [("low", 1), ("high", 9), ("mid", 5)] {
        h.create_todo(None, json!({"description": description, "urgency": urgency})).await;
    }
    let env = h
        .service(None)
        .read_collection(
            "todos",
            &params(json!({"_sort": "urgency", "_order": "DESC", "_fields": "id,description"})),
        )
        .await;
    assert_eq!(env.code, 200);
    let rows = env.body.as_array().unwrap();
    assert_eq!(rows[0]["description"], json!("high"));
    assert_eq!(rows[2]["description"], json!("low"));
    assert_eq!(rows[0].as_object().unwrap().len(), 2, "projection limits columns");
}

#[tokio::test]
async fn filters_and_lookups() {
    let h = Harness::new().await;
    for (description, urgency) in [("a", 2), ("b", 7), ("c", 9)] {
        h.create_todo(None, json!({"description": description, "urgency": urgency})).await;
    }
    let env = h
        .service(None)
        .read_collection("todos", &params(json!({"urgency__gt": "5"})))
        .await;
    assert_eq!(env.headers["X-Pagination-Total"], "2");

    // isnull matches regardless of the supplied value.
    let env = h
        .service(None)
        .read_collection("todos", &params(json!({"file__isnull": "anything"})))
        .await;
    assert_eq!(env.headers["X-Pagination-Total"], "3");

    let env = h
        .service(None)
        .read_collection("todos", &params(json!({"description__icontains": "B"})))
        .await;
    assert_eq!(env.headers["X-Pagination-Total"], "1");
}

#[tokio::test]
async fn collection_validation_errors() {
    let h = Harness::new().await;
    let cases = [
        (json!({"_fields": "id,foobar"}), "Unknown _field foobar detected."),
        (json!({"_sort": "foobar"}), "Cannot sort on unknown property: foobar"),
        (json!({"_order": "BLAAT"}), "Invalid value for _order: BLAAT"),
        (json!({"_limit": "BLAAT"}), "Invalid value for _limit: BLAAT"),
        (json!({"_offset": "-1"}), "Invalid value for _offset: -1"),
        (json!({"foo": "bar"}), "Cannot filter on unknown property: foo"),
        (json!({"description__foo": "bar"}), "Lookup type `foo` does not exist."),
    ];
    for (query, expected) in cases {
        let env = h.service(None).read_collection("todos", &params(query)).await;
        assert_eq!(env.code, 400);
        assert_eq!(message(&env), expected);
    }
}

#[tokio::test]
async fn create_payload_validation() {
    let h = Harness::new().await;
    let cases = [
        (json!({"id": 45, "description": "x"}), "Not allowed to POST a primary key"),
        (json!({"user_id": "mallory", "description": "x"}), "Not allowed to POST a user_id"),
        (json!({"description": "x", "blaat": 1}), "Unrecognized fields detected: blaat"),
        (
            json!({}),
            "Missing fields: created, updated, user_id, category, description, file, done, urgency",
        ),
    ];
    for (payload, expected) in cases {
        let env = h.create_todo(None, payload).await;
        assert_eq!(env.code, 400);
        assert_eq!(message(&env), expected);
    }
}

#[tokio::test]
async fn not_null_violation_is_translated() {
    let h = Harness::new().await;
    let env = h.create_todo(None, json!({"done": 1})).await;
    assert_eq!(env.code, 400);
    assert_eq!(message(&env), "Required parameters missing.");
}

#[tokio::test]
async fn update_changes_subset_and_rejects_forbidden_fields() {
    let h = Harness::new().await;
    let created = h.create_todo(None, json!({"description": "original", "urgency": 1})).await;
    let id = created.body["id"].as_i64().unwrap().to_string();
    let svc = h.service(None);

    let env = svc
        .update_resource("todos", &id, params(json!({"done": 1})), &HashMap::new())
        .await;
    assert_eq!(env.code, 200, "{:?}", env.body);
    assert_eq!(env.body["done"], json!(1));
    assert_eq!(env.body["description"], json!("original"), "other fields untouched");

    let cases = [
        (json!({"id": 99}), "Not allowed to change the primary key of this resource"),
        (json!({"user_id": "bob"}), "Not allowed to change the user of this resource"),
        (json!({}), "Empty request not allowed"),
        (json!({"file": "non-existent-hash"}), "file non-existent-hash does not exist"),
    ];
    for (payload, expected) in cases {
        let env = svc
            .update_resource("todos", &id, params(payload), &HashMap::new())
            .await;
        assert_eq!(env.code, 400);
        assert_eq!(message(&env), expected);
    }
}

#[tokio::test]
async fn delete_then_read_is_404() {
    let h = Harness::new().await;
    let created = h.create_todo(None, json!({"description": "bye"})).await;
    let id = created.body["id"].as_i64().unwrap().to_string();
    let svc = h.service(None);

    let env = svc.delete_resource("todos", &id).await;
    assert_eq!(env.code, 204);
    assert_eq!(env.body, Value::Null);

    let env = svc.read_resource("todos", &id, &Map::new()).await;
    assert_eq!(env.code, 404);
    assert_eq!(message(&env), "Resource not found");

    let env = svc.delete_resource("todos", &id).await;
    assert_eq!(env.code, 404);
}

#[tokio::test]
async fn rows_are_invisible_across_users() {
    let h = Harness::new().await;
    let created = h.create_todo(Some("alice"), json!({"description": "private"})).await;
    let id = created.body["id"].as_i64().unwrap().to_string();

    for other in [Some("bob"), None] {
        let svc = h.service(other);
        let env = svc.read_resource("todos", &id, &Map::new()).await;
        assert_eq!(env.code, 404);
        let env = svc
            .update_resource("todos", &id, params(json!({"done": 1})), &HashMap::new())
            .await;
        assert_eq!(env.code, 404);
        let env = svc.delete_resource("todos", &id).await;
        assert_eq!(env.code, 404);
        let env = svc.read_collection("todos", &Map::new()).await;
        assert_eq!(env.headers["X-Pagination-Total"], "0");
    }

    let env = h.service(Some("alice")).read_resource("todos", &id, &Map::new()).await;
    assert_eq!(env.code, 200);
}

#[tokio::test]
async fn composite_and_missing_primary_keys_are_rejected() {
    let h = Harness::new().await;
    let svc = h.service(None);

    let env = svc.read_resource("link", "1", &Map::new()).await;
    assert_eq!(env.code, 400);
    assert_eq!(
        message(&env),
        "Resource link uses a composite primary key which is not supported"
    );

    let env = svc.read_resource("categories", "1", &Map::new()).await;
    assert_eq!(env.code, 400);
    assert_eq!(message(&env), "This operation is not supported on this resource");

    // Keyless tables still list fine; the default sort is the first column.
    let env = svc.read_collection("categories", &Map::new()).await;
    assert_eq!(env.code, 200);
}

#[tokio::test]
async fn file_columns_round_trip_through_the_store() {
    let h = Harness::new().await;
    let upload = h.tmp.path().join("receipt.txt");
    std::fs::write(&upload, b"file content").unwrap();
    let files: HashMap<String, PathBuf> = [("file".to_string(), upload)].into();

    let env = h
        .service(None)
        .create_resource(
            "todos",
            params(json!({"description": "with attachment"})),
            &files,
        )
        .await;
    assert_eq!(env.code, 200, "{:?}", env.body);
    let hash = env.body["file"].as_str().unwrap().to_string();
    assert_eq!(hash.len(), 64);
    assert!(h.store.exists(&hash));

    // A second row may reference the stored blob by hash.
    let env = h
        .create_todo(None, json!({"description": "same attachment", "file": hash}))
        .await;
    assert_eq!(env.code, 200, "{:?}", env.body);

    let env = h.service(None).fetch_file(&hash).await;
    assert_eq!(env.code, 200);
    assert!(PathBuf::from(env.body.as_str().unwrap()).exists());

    let env = h.service(None).fetch_file("0".repeat(64).as_str()).await;
    assert_eq!(env.code, 404);
    let env = h.service(None).fetch_file("../../etc/passwd").await;
    assert_eq!(env.code, 404);
}

#[tokio::test]
async fn rejected_requests_discard_spooled_uploads() {
    let h = Harness::new().await;
    let spooled = h.tmp.path().join("spooled-upload");
    std::fs::write(&spooled, b"pending content").unwrap();
    let files: HashMap<String, PathBuf> = [("file".to_string(), spooled.clone())].into();

    // Validation fails before the store ever sees the upload.
    let env = h
        .service(None)
        .create_resource("todos", params(json!({"description": "x", "blaat": 1})), &files)
        .await;
    assert_eq!(env.code, 400);
    assert_eq!(message(&env), "Unrecognized fields detected: blaat");
    assert!(!spooled.exists(), "rejected create must not leave the upload behind");

    let created = h.create_todo(None, json!({"description": "keep"})).await;
    let id = created.body["id"].as_i64().unwrap().to_string();
    std::fs::write(&spooled, b"pending content").unwrap();
    let env = h
        .service(None)
        .update_resource("todos", &id, params(json!({"id": 9})), &files)
        .await;
    assert_eq!(env.code, 400);
    assert!(!spooled.exists(), "rejected update must not leave the upload behind");

    let env = h.service(None).read_resource("todos", &id, &Map::new()).await;
    assert_eq!(env.body["description"], json!("keep"), "row untouched by the rejections");
}

#[tokio::test]
async fn persistent_catalog_cache_survives_reconnect() {
    let h = Harness::new().await;
    let cache = h.tmp.path().join("schema.cache");

    let catalog = SchemaCatalog::with_cache_file(&h.db, Some(cache.clone()));
    let first = catalog.list_resources().await.unwrap();
    assert!(cache.exists());
    let bytes = std::fs::read(&cache).unwrap();

    // A fresh catalog reads the persisted file and agrees byte for byte.
    let catalog = SchemaCatalog::with_cache_file(&h.db, Some(cache.clone()));
    let second = catalog.list_resources().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(std::fs::read(&cache).unwrap(), bytes);
}
