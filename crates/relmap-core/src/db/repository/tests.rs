use super::*;
use crate::{
    db::{
        engine::{MemoryEngine, QueryEngine},
        query::{OrderDirection, UpdateQuery},
    },
    entity::access::EntityMethods,
    obs::StatementKind,
    test_fixtures::{self, manager, row, seeded_engine},
    value::parse_timestamp,
};
use proptest::prelude::*;

fn ts(text: &str) -> Value {
    Value::Timestamp(parse_timestamp(text).unwrap())
}

fn last_select(engine: &MemoryEngine) -> SelectQuery {
    engine
        .statements()
        .into_iter()
        .rev()
        .find_map(|query| match query {
            Query::Select(select) => Some(select),
            _ => None,
        })
        .unwrap()
}

fn last_select_with_columns(engine: &MemoryEngine, columns: usize) -> SelectQuery {
    engine
        .statements()
        .into_iter()
        .rev()
        .find_map(|query| match query {
            Query::Select(select) if select.columns.len() == columns => Some(select),
            _ => None,
        })
        .unwrap()
}

///
/// GET
///

#[test]
fn get_decodes_locals_and_every_relation() {
    let engine = seeded_engine();
    let em = manager(&engine);

    let user = em.repository("User").unwrap().get(1).unwrap().unwrap();

    assert_eq!(user.value("name"), Value::from("ada"));
    assert_eq!(user.value("email"), Value::from("ada@example.com"));
    assert_eq!(user.value("createdAt"), ts("2024-03-01 09:30:00"));
    assert_eq!(
        user.value("tags"),
        Value::List(vec!["admin".into(), "author".into()])
    );
    assert_eq!(
        user.related("profile").map(|p| p.value("bio")),
        Some(Value::from("mathematician"))
    );

    let titles: Vec<_> = user
        .related_many("posts")
        .iter()
        .map(|post| post.value("title"))
        .collect();
    assert_eq!(titles, [Value::from("notes"), Value::from("drafts")]);

    let roles = user.value("roles");
    let roles: Vec<_> = roles
        .as_list()
        .unwrap()
        .iter()
        .map(|role| role.as_map().unwrap()["role"].clone())
        .collect();
    assert_eq!(roles, [Value::from("editor"), Value::from("admin")]);
}

#[test]
fn second_get_is_served_from_the_identity_cache() {
    let engine = seeded_engine();
    let em = manager(&engine);
    let users = em.repository("User").unwrap();

    let first = users.get(1).unwrap().unwrap();
    let selects = engine.statement_count(StatementKind::Select);
    let second = users.get(1).unwrap().unwrap();

    assert_eq!(engine.statement_count(StatementKind::Select), selects);
    assert_eq!(first, second);
}

#[test]
fn returned_entities_are_copies() {
    let engine = seeded_engine();
    let em = manager(&engine);
    let users = em.repository("User").unwrap();

    let mut first = users.get(1).unwrap().unwrap();
    first.set("name", "changed");

    let second = users.get(1).unwrap().unwrap();
    assert_eq!(second.value("name"), Value::from("ada"));
}

#[test]
fn missing_rows_leave_no_identity_entry() {
    let engine = seeded_engine();
    let em = manager(&engine);

    assert!(em.repository("User").unwrap().get(99).unwrap().is_none());
    assert!(em.identity_cache().is_empty());
}

#[test]
fn get_filters_on_the_root_alias() {
    let engine = seeded_engine();
    let em = manager(&engine);
    em.repository("Profile").unwrap().get(1).unwrap();

    let select = last_select(&engine);
    assert_eq!(
        select.filter,
        Some(Predicate::compare(ColumnRef::new("p", "id"), CompareOp::Eq, "id"))
    );
    assert_eq!(select.binds.get("id"), Some(&Value::Int(1)));
}

#[test]
fn cyclic_relations_terminate_with_the_partial_instance() {
    let engine = seeded_engine();
    let em = manager(&engine);

    let post = em.repository("Post").unwrap().get(1).unwrap().unwrap();
    let author = post.related("author").unwrap();

    assert_eq!(author.value("name"), Value::from("ada"));
    // the author's own posts point back at the post under construction
    assert_eq!(author.related_many("posts").len(), 2);
}

#[test]
fn composite_keys_need_every_field() {
    let engine = seeded_engine();
    let em = manager(&engine);
    let memberships = em.repository("Membership").unwrap();

    let err = memberships.get(1).unwrap_err();
    assert!(matches!(
        err,
        OrmError::Repository(RepositoryError::CompositeKeyRequiresMap { .. })
    ));

    let err = memberships.get(Lookup::params([("userId", 1)])).unwrap_err();
    match err {
        OrmError::Repository(RepositoryError::MissingPrimaryKey { keys, .. }) => {
            assert_eq!(keys, ["groupId"]);
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(engine.statements().is_empty());
}

#[test]
fn unregistered_mutators_fail_on_decode() {
    let engine = seeded_engine();
    engine
        .insert_row(
            "settings",
            row(&[("code", "theme".into()), ("enabled", true.into())]),
        )
        .unwrap();

    let mut em = manager(&engine);
    em.register_methods(
        "Setting",
        EntityMethods::new()
            .getter("getCode", |e| e.value("code"))
            .setter("setCode", |e, v| e.set("code", v)),
    )
    .unwrap();

    let err = em.repository("Setting").unwrap().get("theme").unwrap_err();
    assert!(matches!(err, OrmError::Access(_)));
    assert!(em.identity_cache().is_empty());
}

///
/// FIND
///

#[test]
fn find_matches_by_equality_and_negation() {
    let engine = seeded_engine();
    let em = manager(&engine);
    let users = em.repository("User").unwrap();

    let active = users
        .find(&Criteria::new().field("status", "active"), &FindOptions::new())
        .unwrap();
    let others = users
        .find(&Criteria::new().field("status", "!active"), &FindOptions::new())
        .unwrap();

    assert_eq!(active.len(), 1);
    assert_eq!(active[0].value("name"), Value::from("ada"));
    assert_eq!(others.len(), 1);
    assert_eq!(others[0].value("name"), Value::from("bob"));
}

#[test]
fn find_binds_are_named_after_column_and_position() {
    let engine = seeded_engine();
    let em = manager(&engine);

    let criteria = Criteria::new()
        .field("email", vec![Value::from("a@x"), Value::from("b@x")])
        .field("status", ">= b");
    em.repository("User")
        .unwrap()
        .find(&criteria, &FindOptions::new())
        .unwrap();

    let select = engine
        .statements()
        .into_iter()
        .find_map(|query| match query {
            Query::Select(select) if select.columns.len() == 1 => Some(select),
            _ => None,
        })
        .unwrap();

    let names: Vec<_> = select.binds.keys().map(String::as_str).collect();
    assert_eq!(names, ["email_address_0", "email_address_1", "status_0"]);
    assert_eq!(select.binds["status_0"], Value::from("b"));
    assert_eq!(select.columns[0].label, "id");
}

#[test]
fn repeated_field_conditions_keep_their_own_binds() {
    let engine = seeded_engine();
    let em = manager(&engine);

    let found = em
        .repository("User")
        .unwrap()
        .find(
            &Criteria::new()
                .field("status", "!active")
                .field("status", "!banned"),
            &FindOptions::new(),
        )
        .unwrap();

    assert!(found.is_empty());
    let select = last_select_with_columns(&engine, 1);
    assert_eq!(select.binds["status_0"], Value::from("active"));
    assert_eq!(select.binds["status_1"], Value::from("banned"));
}

#[test]
fn structured_predicates_are_anded_after_fields() {
    let engine = seeded_engine();
    let em = manager(&engine);

    let criteria = Criteria::new()
        .field("status", vec![Value::from("active"), Value::from("banned")])
        .predicate(Predicate::IsNull {
            column: ColumnRef::new("u", "profile_id"),
            negated: false,
        });
    let found = em
        .repository("User")
        .unwrap()
        .find(&criteria, &FindOptions::new())
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].value("name"), Value::from("bob"));
    assert_eq!(criteria.conditions().count(), 1);
    assert_eq!(criteria.predicates().count(), 1);
}

#[test]
fn find_orders_limits_and_offsets() {
    let engine = seeded_engine();
    let em = manager(&engine);
    let users = em.repository("User").unwrap();

    let names = |options: &FindOptions| -> Vec<Value> {
        users
            .find(&Criteria::new(), options)
            .unwrap()
            .iter()
            .map(|user| user.value("name"))
            .collect()
    };

    assert_eq!(
        names(&FindOptions::new().order_by("name", OrderDirection::Desc)),
        [Value::from("bob"), Value::from("ada")]
    );
    assert_eq!(
        names(
            &FindOptions::new()
                .order_by("name", OrderDirection::Asc)
                .limit(1)
                .offset(1)
        ),
        [Value::from("bob")]
    );
}

#[test]
fn find_tests_booleans_by_truth() {
    let engine = seeded_engine();
    let em = manager(&engine);

    let published = em
        .repository("Post")
        .unwrap()
        .find_one(&Criteria::new().field("published", true), &FindOptions::new())
        .unwrap()
        .unwrap();

    assert_eq!(published.value("title"), Value::from("notes"));
    match &engine.statements()[0] {
        Query::Select(select) => assert_eq!(select.limit, Some(1)),
        other => panic!("unexpected statement {other}"),
    }
}

#[test]
fn find_rejects_unknown_fields() {
    let engine = seeded_engine();
    let em = manager(&engine);

    let err = em
        .repository("User")
        .unwrap()
        .find(&Criteria::new().field("nickname", "x"), &FindOptions::new())
        .unwrap_err();

    assert!(matches!(err, OrmError::Definition(_)));
}

#[test]
fn empty_any_of_matches_nothing() {
    let engine = seeded_engine();
    let em = manager(&engine);

    let found = em
        .repository("User")
        .unwrap()
        .find(&Criteria::new().field("name", Vec::<Value>::new()), &FindOptions::new())
        .unwrap();

    assert!(found.is_empty());
}

///
/// PERSIST
///

#[test]
fn insert_writes_back_generated_keys_and_dependents() {
    let engine = test_fixtures::engine();
    let em = manager(&engine);
    let users = em.repository("User").unwrap();

    let mut user = Entity::new("User")
        .with("name", "grace")
        .with("createdAt", ts("2024-05-06 07:08:09"))
        .with("tags", vec![Value::from("navy")])
        .with("profile", Entity::new("Profile").with("bio", "admiral"))
        .with("posts", vec![Value::from(Entity::new("Post").with("title", "cobol"))]);

    let saved = users.persist(&mut user).unwrap();

    assert_eq!(saved, user);
    assert_eq!(user.value("id"), Value::Int(1));
    assert_eq!(user.related("profile").unwrap().value("id"), Value::Int(1));
    assert_eq!(user.related_many("posts")[0].value("authorId"), Value::Int(1));

    let stored = &engine.rows("users")[0];
    assert_eq!(stored["profile_id"], Value::Int(1));
    assert_eq!(stored["tags"], Value::from("{navy}"));
    assert_eq!(stored["created_at"], Value::from("2024-05-06 07:08:09"));
    assert_eq!(engine.rows("posts")[0]["author_id"], Value::Int(1));
}

#[test]
fn null_generated_key_skips_the_existence_check() {
    let engine = test_fixtures::engine();
    let em = manager(&engine);

    em.repository("Profile")
        .unwrap()
        .persist(&mut Entity::new("Profile").with("bio", "x"))
        .unwrap();

    assert_eq!(engine.statement_count(StatementKind::Select), 0);
    assert_eq!(engine.statement_count(StatementKind::Insert), 1);
}

#[test]
fn null_natural_key_is_rejected_before_any_write() {
    let engine = test_fixtures::engine();
    let em = manager(&engine);

    let err = em
        .repository("Membership")
        .unwrap()
        .persist(&mut Entity::new("Membership").with("groupId", 2).with("role", "owner"))
        .unwrap_err();

    match err {
        OrmError::Repository(RepositoryError::NonGeneratedKeyNull { field, ty, .. }) => {
            assert_eq!(field, "userId");
            assert_eq!(ty, "untyped");
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(engine.statements().is_empty());
}

#[test]
fn natural_keys_insert_then_update() {
    let engine = test_fixtures::engine();
    let em = manager(&engine);
    let memberships = em.repository("Membership").unwrap();

    let mut membership = Entity::new("Membership")
        .with("userId", 1)
        .with("groupId", 2)
        .with("role", "member");
    memberships.persist(&mut membership).unwrap();

    membership.set("role", "owner");
    memberships.persist(&mut membership).unwrap();

    assert_eq!(engine.statement_count(StatementKind::Insert), 1);
    assert_eq!(engine.statement_count(StatementKind::Update), 1);
    assert_eq!(engine.rows("memberships")[0]["role"], Value::from("owner"));
}

#[test]
fn update_sets_only_changed_columns() {
    let engine = seeded_engine();
    let em = manager(&engine);
    let users = em.repository("User").unwrap();

    let mut user = users.get(1).unwrap().unwrap();
    user.set("name", "ada lovelace");
    users.persist(&mut user).unwrap();

    let update = engine
        .statements()
        .into_iter()
        .find_map(|query| match query {
            Query::Update(update) => Some(update),
            _ => None,
        })
        .unwrap();
    assert_eq!(update.set, [("name".to_string(), Value::from("ada lovelace"))]);
    assert_eq!(engine.rows("users")[0]["name"], Value::from("ada lovelace"));
}

#[test]
fn unchanged_entities_issue_no_update() {
    let engine = seeded_engine();
    let em = manager(&engine);
    let users = em.repository("User").unwrap();

    let mut user = users.get(2).unwrap().unwrap();
    users.persist(&mut user).unwrap();

    assert_eq!(engine.statement_count(StatementKind::Update), 0);
}

#[test]
fn compute_changes_without_a_cached_copy_reports_everything_writable() {
    let engine = seeded_engine();
    let em = manager(&engine);
    let users = em.repository("User").unwrap();

    let changes = users
        .compute_changes(&Entity::new("User").with("id", 5))
        .unwrap();

    assert_eq!(
        changes,
        ["id", "name", "email", "status", "createdAt", "tags", "profile"]
    );
}

#[test]
fn persist_invalidates_both_caches() {
    let engine = seeded_engine();
    let em = manager(&engine);
    let users = em.repository("User").unwrap();

    let mut user = users.get(2).unwrap().unwrap();
    let key = users.cache_key(&user).unwrap().unwrap();
    assert!(em.result_cache().is_cached(&key));

    user.set("status", "active");
    users.persist(&mut user).unwrap();

    assert!(!em.identity_cache().contains(&key));
    assert!(!em.result_cache().is_cached(&key));
    assert_eq!(
        users.get(2).unwrap().unwrap().value("status"),
        Value::from("active")
    );
}

#[test]
fn mutations_evict_owner_side_related_entities() {
    let engine = seeded_engine();
    let em = manager(&engine);
    let users = em.repository("User").unwrap();

    let mut user = users.get(1).unwrap().unwrap();
    let profile = user.related("profile").unwrap().clone();
    let profile_key = em
        .repository("Profile")
        .unwrap()
        .cache_key(&profile)
        .unwrap()
        .unwrap();
    assert!(em.identity_cache().contains(&profile_key));
    assert!(em.result_cache().is_cached(&profile_key));

    user.set("status", "inactive");
    users.persist(&mut user).unwrap();

    assert!(!em.identity_cache().contains(&profile_key));
    assert!(!em.result_cache().is_cached(&profile_key));

    let user = users.get(1).unwrap().unwrap();
    assert!(em.result_cache().is_cached(&profile_key));
    users.delete(&user).unwrap();

    assert!(!em.identity_cache().contains(&profile_key));
    assert!(!em.result_cache().is_cached(&profile_key));
}

#[test]
fn method_access_entities_round_trip() {
    let engine = test_fixtures::engine();
    let em = manager(&engine);
    let settings = em.repository("Setting").unwrap();

    settings
        .persist(&mut Entity::new("Setting").with("code", "theme").with("enabled", true))
        .unwrap();
    let loaded = settings.get("theme").unwrap().unwrap();

    assert_eq!(loaded.value("enabled"), Value::Bool(true));
}

///
/// DELETE / REFRESH
///

#[test]
fn delete_removes_the_row_and_cached_copies() {
    let engine = seeded_engine();
    let em = manager(&engine);
    let users = em.repository("User").unwrap();

    let user = users.get(2).unwrap().unwrap();
    let key = users.cache_key(&user).unwrap().unwrap();
    users.delete(&user).unwrap();

    assert_eq!(engine.rows("users").len(), 1);
    assert!(!em.identity_cache().contains(&key));
    assert!(!em.result_cache().is_cached(&key));
    assert!(users.get(2).unwrap().is_none());
}

#[test]
fn delete_requires_keys() {
    let engine = seeded_engine();
    let em = manager(&engine);

    let err = em
        .repository("User")
        .unwrap()
        .delete(&Entity::new("User"))
        .unwrap_err();

    assert!(matches!(
        err,
        OrmError::Repository(RepositoryError::MissingPrimaryKey { .. })
    ));
}

#[test]
fn refresh_bypasses_stale_cached_copies() {
    let engine = seeded_engine();
    let em = manager(&engine);
    let users = em.repository("User").unwrap();
    let user = users.get(2).unwrap().unwrap();

    let mut raw = engine.clone();
    raw.execute(&Query::Update(UpdateQuery {
        table: "users".to_string(),
        set: vec![("name".to_string(), "robert".into())],
        filter: Predicate::compare(ColumnRef::bare("id"), CompareOp::Eq, "id"),
        binds: Binds::from([("id".to_string(), Value::Int(2))]),
    }))
    .unwrap();

    assert_eq!(users.get(2).unwrap().unwrap().value("name"), Value::from("bob"));
    assert_eq!(users.refresh(&user).unwrap().value("name"), Value::from("robert"));
}

#[test]
fn refresh_of_a_deleted_row_is_not_found() {
    let engine = seeded_engine();
    let em = manager(&engine);
    let users = em.repository("User").unwrap();

    let user = users.get(2).unwrap().unwrap();
    users.delete(&user).unwrap();

    assert!(users.refresh(&user).unwrap_err().is_not_found());
}

///
/// HELPERS
///

#[test]
fn operator_prefixes_prefer_two_character_forms() {
    assert_eq!(parse_operator(">= 10"), Some((CompareOp::Gte, "10")));
    assert_eq!(parse_operator("<=3"), Some((CompareOp::Lte, "3")));
    assert_eq!(parse_operator("!draft"), Some((CompareOp::Ne, "draft")));
    assert_eq!(parse_operator("> 1"), Some((CompareOp::Gt, "1")));
    assert_eq!(parse_operator(">="), Some((CompareOp::Gt, "=")));
    assert_eq!(parse_operator("!"), None);
    assert_eq!(parse_operator("plain"), None);
}

#[test]
fn build_applies_memory_transforms() {
    let engine = test_fixtures::engine();
    let em = manager(&engine);

    let user = em
        .repository("User")
        .unwrap()
        .build(&BTreeMap::from([
            ("createdAt".to_string(), Value::from("2024-01-02 03:04:05")),
            ("tags".to_string(), Value::from("{a}")),
        ]))
        .unwrap();

    assert_eq!(user.value("createdAt"), ts("2024-01-02 03:04:05"));
    assert_eq!(user.value("tags"), Value::List(vec!["a".into()]));
}

fn labelled(pairs: &[(&str, Option<i64>)]) -> crate::db::engine::Row {
    pairs
        .iter()
        .map(|(label, value)| ((*label).to_string(), Value::from(*value)))
        .collect()
}

#[test]
fn distinct_rows_drop_null_keys() {
    let rows = [
        labelled(&[("k", Some(1))]),
        labelled(&[("k", None)]),
        labelled(&[("k", Some(1))]),
        labelled(&[("k", Some(2))]),
    ];

    let kept: Vec<_> = distinct_rows(&rows, &["k"])
        .into_iter()
        .map(|row| row["k"].clone())
        .collect();
    assert_eq!(kept, [Value::Int(1), Value::Int(2)]);
}

proptest! {
    #[test]
    fn distinct_rows_keep_first_occurrences(keys in proptest::collection::vec(proptest::option::of(0i64..5), 0..40)) {
        let rows: Vec<_> = keys.iter().map(|k| labelled(&[("k", *k)])).collect();
        let kept: Vec<i64> = distinct_rows(&rows, &["k"])
            .into_iter()
            .filter_map(|row| row["k"].as_int())
            .collect();

        let mut expected = Vec::new();
        for key in keys.iter().flatten() {
            if !expected.contains(key) {
                expected.push(*key);
            }
        }
        prop_assert_eq!(kept, expected);
    }
}
