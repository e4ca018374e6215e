//! End-to-end exercises of the collection lifecycle, ownership, grants, and
//! the spatial query engine against a real on-disk store.

use std::collections::BTreeMap;

use cadastre::catalog::{collections, grants, ownership, rows};
use cadastre::error::Error;
use cadastre::query::engine;
use cadastre::roles;
use cadastre::store::{SqliteStore, Store};
use cadastre::types::{CombineOp, ComparisonMode, Session};
use tempfile::TempDir;

fn open_store() -> (TempDir, SqliteStore) {
    let temp = TempDir::new().expect("create temp dir");
    let store = SqliteStore::new(temp.path().join("cadastre.db")).expect("open store");
    store.initialize().expect("initialize store");
    (temp, store)
}

fn register(store: &SqliteStore, name: &str) -> Session {
    roles::register_user(store, &Session::admin("admin"), name, "secret").expect("register user");
    Session::user(name)
}

fn float_properties() -> BTreeMap<String, String> {
    let mut properties = BTreeMap::new();
    properties.insert("area".to_string(), "float".to_string());
    properties
}

fn parcel(geometry: &str, area: f64) -> serde_json::Value {
    serde_json::json!({ "geometry": geometry, "area": area })
}

fn seed_parcels(store: &SqliteStore, collection: &str) {
    rows::insert_rows(
        store,
        collection,
        &[
            parcel("POLYGON((1 1, 3 1, 3 3, 1 3, 1 1))", 4.0),
            parcel("POLYGON((5 5, 8 5, 8 8, 5 8, 5 5))", 9.0),
            parcel("POLYGON((20 20, 24 20, 24 24, 20 24, 20 20))", 16.0),
        ],
    )
    .expect("insert parcels");
}

#[test]
fn test_create_collection_scenario() {
    let (_temp, store) = open_store();
    let alice = register(&store, "alice");
    let bob = register(&store, "bob");

    collections::create_collection(&store, &alice, "alice_parcels", &float_properties(), 4326)
        .expect("alice creates in her namespace");

    // bob cannot create under alice's namespace
    let err =
        collections::create_collection(&store, &bob, "alice_parcels2", &float_properties(), 4326)
            .unwrap_err();
    match err {
        Error::PermissionDenied { principal, target } => {
            assert_eq!(principal, "bob");
            assert_eq!(target, "alice_parcels2");
        }
        other => panic!("expected PermissionDenied, got {other:?}"),
    }

    // duplicate creation surfaces the engine's duplicate-object condition
    let err =
        collections::create_collection(&store, &alice, "alice_parcels", &float_properties(), 4326)
            .unwrap_err();
    assert!(matches!(err, Error::AlreadyExists { .. }));
}

#[test]
fn test_grant_independence() {
    let (_temp, store) = open_store();
    let alice = register(&store, "alice");
    let bob = register(&store, "bob");

    collections::create_collection(&store, &alice, "alice_parcels", &float_properties(), 4326)
        .unwrap();
    seed_parcels(&store, "alice_parcels");

    assert!(!grants::can_read(&store, "alice_parcels", "bob").unwrap());
    grants::grant_access(&store, &alice, "alice_parcels", "bob").unwrap();
    assert!(grants::can_read(&store, "alice_parcels", "bob").unwrap());

    // bob can now query
    let rows = engine::filter(&store, "alice_parcels", None, None, None, None, None, None)
        .expect("bob reads granted collection");
    assert_eq!(rows.len(), 3);

    // but reading confers no schema rights
    let err = collections::drop_properties(
        &store,
        &bob,
        "alice_parcels",
        &["area".to_string()],
    )
    .unwrap_err();
    assert!(matches!(err, Error::PermissionDenied { .. }));

    grants::revoke_access(&store, &alice, "alice_parcels", "bob").unwrap();
    assert!(!grants::can_read(&store, "alice_parcels", "bob").unwrap());
}

#[test]
fn test_ownership_transitivity_through_groups() {
    let (_temp, store) = open_store();
    let admin = Session::admin("admin");
    let member = register(&store, "member");
    roles::register_user(&store, &admin, "member_2", "pw").unwrap();
    roles::create_group(&store, &admin, "team").unwrap();

    roles::add_user_to_group(&store, &admin, "team", "member").unwrap();

    collections::create_collection(&store, &member, "member_sites", &BTreeMap::new(), 4326)
        .unwrap();

    // publishing the database to the group makes member_2 a transitive owner
    let member2 = Session::user("member_2");
    let err = collections::create_collection(
        &store,
        &member2,
        "member_sites2",
        &BTreeMap::new(),
        4326,
    )
    .unwrap_err();
    assert!(matches!(err, Error::PermissionDenied { .. }));

    grants::group_publish_database(&store, &member, "member", "team").unwrap();
    roles::add_user_to_group(&store, &admin, "team", "member_2").unwrap();

    assert!(ownership::is_allowed(&store, "member_sites", "member_2").unwrap());
    collections::create_collection(&store, &member2, "member_sites2", &BTreeMap::new(), 4326)
        .expect("group member creates inside published database");

    grants::group_unpublish_database(&store, &member, "member", "team").unwrap();
    assert!(!ownership::is_allowed(&store, "member_sites", "member_2").unwrap());
}

#[test]
fn test_rename_is_destination_gated() {
    let (_temp, store) = open_store();
    let alice = register(&store, "alice");
    let bob = register(&store, "bob");

    collections::create_collection(&store, &alice, "alice_parcels", &float_properties(), 4326)
        .unwrap();

    // alice cannot rename into bob's namespace
    let err = collections::rename_collection(&store, &alice, "alice_parcels", "bob_parcels")
        .unwrap_err();
    assert!(matches!(err, Error::PermissionDenied { .. }));

    // bob owns the destination, regardless of who owns the source
    collections::rename_collection(&store, &bob, "alice_parcels", "bob_parcels")
        .expect("rename donates the collection to bob's namespace");

    assert!(store.table_exists("bob_parcels").unwrap());
    assert!(!store.table_exists("alice_parcels").unwrap());
}

#[test]
fn test_copy_collection_clones_rows_and_structure() {
    let (_temp, store) = open_store();
    let alice = register(&store, "alice");

    collections::create_collection(&store, &alice, "alice_parcels", &float_properties(), 4326)
        .unwrap();
    seed_parcels(&store, "alice_parcels");
    collections::create_index(&store, "alice_parcels", "area").unwrap();

    collections::copy_collection(&store, &alice, "alice_parcels", "alice_parcels_v2").unwrap();

    assert_eq!(
        engine::count_collection(&store, "alice_parcels_v2").unwrap(),
        3
    );
    let properties = collections::get_properties(&store, "alice_parcels_v2").unwrap();
    assert!(properties.iter().any(|p| p.name == "area"));

    let indexes = collections::show_indexes(&store, "alice_parcels_v2").unwrap();
    assert!(indexes.iter().any(|i| i.contains("area")));

    // the copy maintains its own modification trigger
    let touched = rows::update_rows(
        &store,
        "alice_parcels_v2",
        serde_json::json!({ "area": 5.0 }).as_object().unwrap(),
        "id = 1",
    )
    .unwrap();
    assert_eq!(touched, 1);
    let row = &engine::filter(
        &store,
        "alice_parcels_v2",
        None,
        Some("id = 1"),
        None,
        None,
        None,
        None,
    )
    .unwrap()[0];
    assert!(!row["modified_at"].is_null());
}

#[test]
fn test_filter_by_bbox_within() {
    let (_temp, store) = open_store();
    let alice = register(&store, "alice");

    collections::create_collection(&store, &alice, "alice_parcels", &float_properties(), 4326)
        .unwrap();
    seed_parcels(&store, "alice_parcels");

    let rows = engine::filter_by_bbox(
        &store,
        "alice_parcels",
        (0.0, 0.0, 10.0, 10.0),
        ComparisonMode::Within,
        4326,
        None,
        CombineOp::And,
        None,
        None,
    )
    .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["id"], 1);
    assert_eq!(rows[1]["id"], 2);

    // combining with an extra filter under AND narrows the result
    let rows = engine::filter_by_bbox(
        &store,
        "alice_parcels",
        (0.0, 0.0, 10.0, 10.0),
        ComparisonMode::Within,
        4326,
        Some("area > 5"),
        CombineOp::And,
        None,
        None,
    )
    .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], 2);

    // OR keeps rows matching either predicate
    let rows = engine::filter_by_bbox(
        &store,
        "alice_parcels",
        (0.0, 0.0, 10.0, 10.0),
        ComparisonMode::Within,
        4326,
        Some("area > 10"),
        CombineOp::Or,
        None,
        None,
    )
    .unwrap();
    assert_eq!(rows.len(), 3);
}

#[test]
fn test_empty_bbox_result_is_error() {
    let (_temp, store) = open_store();
    let alice = register(&store, "alice");

    collections::create_collection(&store, &alice, "alice_parcels", &float_properties(), 4326)
        .unwrap();
    seed_parcels(&store, "alice_parcels");

    let err = engine::filter_by_bbox(
        &store,
        "alice_parcels",
        (100.0, 100.0, 110.0, 110.0),
        ComparisonMode::Within,
        4326,
        None,
        CombineOp::And,
        None,
        None,
    )
    .unwrap_err();
    assert!(matches!(err, Error::EmptyResult));

    let err = engine::count_by_bbox(
        &store,
        "alice_parcels",
        (100.0, 100.0, 110.0, 110.0),
        ComparisonMode::Within,
        4326,
        None,
        CombineOp::And,
    )
    .unwrap_err();
    assert!(matches!(err, Error::EmptyResult));
}

#[test]
fn test_unknown_comparison_mode_is_invalid_argument() {
    let err = "bogus".parse::<ComparisonMode>().unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[test]
fn test_mismatched_bbox_crs_is_invalid_argument() {
    let (_temp, store) = open_store();
    let alice = register(&store, "alice");

    collections::create_collection(&store, &alice, "alice_parcels", &float_properties(), 4326)
        .unwrap();
    seed_parcels(&store, "alice_parcels");

    let err = engine::filter_by_bbox(
        &store,
        "alice_parcels",
        (0.0, 0.0, 10.0, 10.0),
        ComparisonMode::Within,
        3794,
        None,
        CombineOp::And,
        None,
        None,
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[test]
fn test_estimate_count_falls_back_before_analyze() {
    let (_temp, store) = open_store();
    let alice = register(&store, "alice");

    collections::create_collection(&store, &alice, "alice_parcels", &float_properties(), 4326)
        .unwrap();
    seed_parcels(&store, "alice_parcels");

    // never analyzed: the fallback path still yields a non-negative integer
    let estimate = engine::estimate_collection_count(&store, "alice_parcels").unwrap();
    assert!(estimate >= 0);

    store.connection().execute_batch("ANALYZE").unwrap();

    let estimate = engine::estimate_collection_count(&store, "alice_parcels").unwrap();
    assert_eq!(estimate, 3);
    assert_eq!(engine::count_collection(&store, "alice_parcels").unwrap(), 3);
}

#[test]
fn test_nearest_orders_by_distance() {
    let (_temp, store) = open_store();
    let alice = register(&store, "alice");

    collections::create_collection(&store, &alice, "alice_parcels", &float_properties(), 4326)
        .unwrap();
    seed_parcels(&store, "alice_parcels");

    let rows = engine::nearest(&store, "alice_parcels", 21.0, 21.0, 4326, Some(2)).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["id"], 3);
    assert_eq!(rows[0]["distance"], 0.0);
    assert!(rows[0]["geometry"].as_str().unwrap().starts_with("POLYGON"));
    assert_eq!(rows[1]["id"], 2);
}

#[test]
fn test_geometry_types_aggregate_and_per_row() {
    let (_temp, store) = open_store();
    let alice = register(&store, "alice");

    collections::create_collection(&store, &alice, "alice_parcels", &BTreeMap::new(), 4326)
        .unwrap();
    rows::insert_rows(
        &store,
        "alice_parcels",
        &[
            serde_json::json!({ "geometry": "POLYGON((-5 10, -5 11, 5 11, 5 10, -5 10))" }),
            serde_json::json!({ "geometry": "POLYGON((-6 9, -6 10, 3 10, 3 9, -6 9))" }),
            serde_json::json!({ "geometry": "POINT(-6 9)" }),
        ],
    )
    .unwrap();

    let per_row = engine::geometry_types(&store, "alice_parcels", false).unwrap();
    assert_eq!(per_row, vec!["POLYGON", "POLYGON", "POINT"]);

    let aggregated = engine::geometry_types(&store, "alice_parcels", true).unwrap();
    assert_eq!(aggregated, vec!["POINT", "POLYGON"]);
}

#[test]
fn test_collection_bbox_aggregates_bounds() {
    let (_temp, store) = open_store();
    let alice = register(&store, "alice");

    collections::create_collection(&store, &alice, "alice_parcels", &BTreeMap::new(), 4326)
        .unwrap();
    rows::insert_rows(
        &store,
        "alice_parcels",
        &[
            serde_json::json!({ "geometry": "POLYGON((-5 10, -5 11, 5 11, 5 10, -5 10))" }),
            serde_json::json!({ "geometry": "POLYGON((-6 9, -6 10, 3 10, 3 9, -6 9))" }),
        ],
    )
    .unwrap();

    let bounds = engine::collection_bbox(&store, "alice_parcels").unwrap();
    assert_eq!(bounds, (-6.0, 9.0, 5.0, 11.0));

    // the estimate agrees once a spatial index exists
    collections::create_index(&store, "alice_parcels", "geometry").unwrap();
    let estimated = engine::estimate_collection_bbox(&store, "alice_parcels").unwrap();
    assert_eq!(estimated, bounds);
}

#[test]
fn test_spatial_index_lifecycle() {
    let (_temp, store) = open_store();
    let alice = register(&store, "alice");

    collections::create_collection(&store, &alice, "alice_parcels", &float_properties(), 4326)
        .unwrap();
    seed_parcels(&store, "alice_parcels");

    collections::create_index(&store, "alice_parcels", "geometry").unwrap();

    // duplicate creation surfaces as a normal failure
    let err = collections::create_index(&store, "alice_parcels", "geometry").unwrap_err();
    assert!(matches!(err, Error::AlreadyExists { .. }));

    let indexes = collections::show_indexes(&store, "alice_parcels").unwrap();
    assert!(
        indexes
            .iter()
            .any(|i| i == "idx_geometry_alice_parcels")
    );

    // rows inserted after index creation are reflected in the estimate
    rows::insert_rows(
        &store,
        "alice_parcels",
        &[parcel("POLYGON((30 30, 31 30, 31 31, 30 31, 30 30))", 1.0)],
    )
    .unwrap();
    let bounds = engine::estimate_collection_bbox(&store, "alice_parcels").unwrap();
    assert_eq!(bounds.2, 31.0);

    collections::drop_index(&store, "alice_parcels", "geometry").unwrap();
    let err = collections::drop_index(&store, "alice_parcels", "geometry").unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));

    // and the cycle restarts cleanly under the same deterministic name
    collections::create_index(&store, "alice_parcels", "geometry").unwrap();
}

#[test]
fn test_truncate_database_leaves_tables_behind() {
    let (_temp, store) = open_store();
    let alice = register(&store, "alice");

    collections::create_collection(&store, &alice, "alice_parcels", &float_properties(), 4326)
        .unwrap();

    ownership::truncate_database(&store, &alice, "alice").unwrap();

    // the bookkeeping row is gone but the physical table survives,
    // unreachable for collection management
    assert!(store.table_exists("alice_parcels").unwrap());
    assert!(!ownership::is_allowed(&store, "alice_parcels", "alice").unwrap());
    let collections_listed = ownership::list_collections_for(&store, "alice", None).unwrap();
    assert!(collections_listed.is_empty());
}

#[test]
fn test_batch_create_is_not_atomic() {
    let (_temp, store) = open_store();
    let alice = register(&store, "alice");

    let mut batch = BTreeMap::new();
    batch.insert(
        "alice_one".to_string(),
        cadastre::catalog::CollectionSpec {
            properties: BTreeMap::new(),
            crs: 4326,
        },
    );
    // sorts after alice_one, and fails: bob owns the prefix
    batch.insert(
        "bob_two".to_string(),
        cadastre::catalog::CollectionSpec {
            properties: BTreeMap::new(),
            crs: 4326,
        },
    );

    let err = collections::create_collections(&store, &alice, &batch).unwrap_err();
    assert!(matches!(err, Error::PermissionDenied { .. }));

    // partial progress is the accepted contract
    assert!(store.table_exists("alice_one").unwrap());
    assert!(!store.table_exists("bob_two").unwrap());
}

#[test]
fn test_list_collections_longest_prefix_wins() {
    let (_temp, store) = open_store();
    let admin = Session::admin("admin");
    let alice = register(&store, "alice");
    roles::register_user(&store, &admin, "alice_projects", "pw").unwrap();
    let alice_projects = Session::user("alice_projects");

    collections::create_collection(&store, &alice, "alice_parcels", &BTreeMap::new(), 4326)
        .unwrap();
    collections::create_collection(
        &store,
        &alice_projects,
        "alice_projects_sites",
        &BTreeMap::new(),
        4326,
    )
    .unwrap();

    // alice sees only her own collection; the more specific database wins
    // the prefix match for alice_projects_sites
    let mine = ownership::list_collections_for(&store, "alice", None).unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].collection, "parcels");

    let theirs = ownership::list_collections_for(&store, "alice_projects", None).unwrap();
    assert_eq!(theirs.len(), 1);
    assert_eq!(theirs[0].collection, "sites");
    assert_eq!(theirs[0].database, "alice_projects");
}

#[test]
fn test_usage_reports_own_tables_only() {
    let (_temp, store) = open_store();
    let alice = register(&store, "alice");
    let bob = register(&store, "bob");

    collections::create_collection(&store, &alice, "alice_parcels", &float_properties(), 4326)
        .unwrap();
    seed_parcels(&store, "alice_parcels");
    collections::create_collection(&store, &bob, "bob_parcels", &float_properties(), 4326)
        .unwrap();

    let usage = cadastre::usage::get_my_usage(&store, &alice, true).unwrap();
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].table, "alice_parcels");
    assert!(usage[0].bytes >= 0);
    assert!(usage[0].pretty.is_some());
}

#[test]
fn test_row_deletes_shrink_counts() {
    let (_temp, store) = open_store();
    let alice = register(&store, "alice");

    collections::create_collection(&store, &alice, "alice_parcels", &float_properties(), 4326)
        .unwrap();
    seed_parcels(&store, "alice_parcels");

    let removed = rows::delete_rows(&store, "alice_parcels", "area > 5").unwrap();
    assert_eq!(removed, 2);
    assert_eq!(engine::count_collection(&store, "alice_parcels").unwrap(), 1);
}

#[test]
fn test_drop_collections_requires_cascade_for_spatial_indexes() {
    let (_temp, store) = open_store();
    let alice = register(&store, "alice");

    collections::create_collection(&store, &alice, "alice_parcels", &float_properties(), 4326)
        .unwrap();
    collections::create_index(&store, "alice_parcels", "geometry").unwrap();

    let err = collections::drop_collections(
        &store,
        &alice,
        &["alice_parcels".to_string()],
        false,
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));

    collections::drop_collections(&store, &alice, &["alice_parcels".to_string()], true).unwrap();
    assert!(!store.table_exists("alice_parcels").unwrap());
}
