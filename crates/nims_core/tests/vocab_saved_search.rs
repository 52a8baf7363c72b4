use std::collections::BTreeMap;

use pretty_assertions::assert_eq;
use rusqlite::Connection;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

use nims_core::db;
use nims_core::domain::NetworkDomain;
use nims_core::search::saved::{
    delete_search, get_search, list_searches, load_search, save_search,
};
use nims_core::search::SearchParams;
use nims_core::vocab::{
    list_entries, seed_defaults, set_active, upsert_entry, SqliteVocabulary, UpsertOutcome,
    VocabularyProvider,
};

const NOW: OffsetDateTime = datetime!(2026-03-02 12:00:00 UTC);

fn test_conn() -> Connection {
    let mut conn = db::open_in_memory().expect("open");
    db::migrate(&mut conn).expect("migrate");
    conn
}

#[test]
fn seeding_is_idempotent() {
    let conn = test_conn();
    let first = seed_defaults(&conn, NOW).expect("seed");
    assert!(first.created > 100, "created={}", first.created);
    assert_eq!(first.updated, 0);

    let second = seed_defaults(&conn, NOW).expect("reseed");
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 0);
}

#[test]
fn options_are_active_only_in_admin_order() {
    let conn = test_conn();
    seed_defaults(&conn, NOW).expect("seed");
    let vocab = SqliteVocabulary::new(&conn);

    let causes = vocab.options("cause").expect("options");
    assert_eq!(causes.first().map(String::as_str), Some("Power Failure"));
    // "Other" carries sort order 99 so it always lands last.
    assert_eq!(causes.last().map(String::as_str), Some("Other"));

    set_active(&conn, "cause", "Security Breach", false, NOW).expect("deactivate");
    let causes = vocab.options("cause").expect("options");
    assert!(!causes.iter().any(|c| c == "Security Breach"));
    // The row survives for historical records.
    let entries = list_entries(&conn, "cause").expect("entries");
    assert!(entries.iter().any(|e| e.value == "Security Breach" && !e.is_active));
}

#[test]
fn upsert_realigns_sort_order_without_duplicating() {
    let conn = test_conn();
    assert_eq!(
        upsert_entry(&conn, "cause", "Sandstorm", 12, NOW).expect("insert"),
        UpsertOutcome::Created
    );
    assert_eq!(
        upsert_entry(&conn, "cause", "Sandstorm", 12, NOW).expect("noop"),
        UpsertOutcome::Unchanged
    );
    assert_eq!(
        upsert_entry(&conn, "cause", "Sandstorm", 3, NOW).expect("reorder"),
        UpsertOutcome::Updated
    );
    let entries = list_entries(&conn, "cause").expect("entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].sort_order, 3);
}

#[test]
fn unknown_category_yields_no_options() {
    let conn = test_conn();
    seed_defaults(&conn, NOW).expect("seed");
    let vocab = SqliteVocabulary::new(&conn);
    assert_eq!(vocab.options("no_such_category").expect("options"), Vec::<String>::new());
}

fn sample_params() -> SearchParams {
    let mut filters = BTreeMap::new();
    filters.insert("do_wilaya".to_string(), "Oran".to_string());
    SearchParams {
        query: Some("fiber".to_string()),
        status: Some("critical".to_string()),
        archived: Some(false),
        filters,
        sort_by: Some("-occurred_at".to_string()),
        ..SearchParams::default()
    }
}

#[test]
fn saved_search_round_trips_its_parameter_bag() {
    let conn = test_conn();
    let saved = save_search(
        &conn,
        "operator1",
        "Critical fiber",
        NetworkDomain::RadioAccess,
        &sample_params(),
        false,
        NOW,
    )
    .expect("save");
    assert_eq!(saved.use_count, 0);

    let loaded = get_search(&conn, &saved.id).expect("get");
    assert_eq!(loaded.search_params().expect("decode"), sample_params());
}

#[test]
fn loading_a_search_bumps_its_usage_counter() {
    let conn = test_conn();
    let saved = save_search(
        &conn,
        "operator1",
        "Critical fiber",
        NetworkDomain::RadioAccess,
        &sample_params(),
        false,
        NOW,
    )
    .expect("save");

    let loaded = load_search(&conn, &saved.id, NOW + Duration::minutes(5)).expect("load");
    assert_eq!(loaded.use_count, 1);
    let loaded = load_search(&conn, &saved.id, NOW + Duration::minutes(10)).expect("load");
    assert_eq!(loaded.use_count, 2);
}

#[test]
fn default_flag_moves_between_searches() {
    let conn = test_conn();
    let first = save_search(
        &conn,
        "operator1",
        "First",
        NetworkDomain::Core,
        &SearchParams::default(),
        true,
        NOW,
    )
    .expect("save");
    let second = save_search(
        &conn,
        "operator1",
        "Second",
        NetworkDomain::Core,
        &SearchParams::default(),
        true,
        NOW + Duration::minutes(1),
    )
    .expect("save");

    let listed = list_searches(&conn, "operator1", NetworkDomain::Core).expect("list");
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, second.id);
    assert!(listed[0].is_default);
    let first_again = get_search(&conn, &first.id).expect("get");
    assert!(!first_again.is_default);
}

#[test]
fn saving_under_the_same_name_updates_in_place() {
    let conn = test_conn();
    let original = save_search(
        &conn,
        "operator1",
        "Mine",
        NetworkDomain::Core,
        &SearchParams::default(),
        false,
        NOW,
    )
    .expect("save");
    let replaced = save_search(
        &conn,
        "operator1",
        "Mine",
        NetworkDomain::Core,
        &sample_params(),
        false,
        NOW + Duration::minutes(1),
    )
    .expect("resave");
    assert_eq!(original.id, replaced.id);
    assert_eq!(replaced.search_params().expect("decode"), sample_params());
}

#[test]
fn deleting_requires_ownership() {
    let conn = test_conn();
    let saved = save_search(
        &conn,
        "operator1",
        "Mine",
        NetworkDomain::Core,
        &SearchParams::default(),
        false,
        NOW,
    )
    .expect("save");

    let err = delete_search(&conn, "operator2", &saved.id).expect_err("not owner");
    assert_eq!(err.code, "DB_NOT_FOUND");

    delete_search(&conn, "operator1", &saved.id).expect("owner deletes");
    assert!(get_search(&conn, &saved.id).is_err());
}

#[test]
fn searches_are_scoped_per_owner_and_domain() {
    let conn = test_conn();
    save_search(&conn, "operator1", "Mine", NetworkDomain::Core, &SearchParams::default(), false, NOW)
        .expect("save");
    save_search(&conn, "operator2", "Theirs", NetworkDomain::Core, &SearchParams::default(), false, NOW)
        .expect("save");
    save_search(&conn, "operator1", "Other domain", NetworkDomain::Transport, &SearchParams::default(), false, NOW)
        .expect("save");

    let listed = list_searches(&conn, "operator1", NetworkDomain::Core).expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "Mine");
}
