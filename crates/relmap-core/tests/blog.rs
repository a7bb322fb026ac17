mod common;

use common::{engine, manager, row};
use relmap_core::{
    cache::IdentityCache,
    db::{
        query::OrderDirection,
        repository::{Criteria, FindOptions, RepositoryError},
    },
    entity::Entity,
    obs::StatementKind,
    value::{Value, parse_timestamp},
    OrmError,
};

fn ts(text: &str) -> Value {
    Value::Timestamp(parse_timestamp(text).unwrap())
}

#[test]
fn repeated_gets_share_one_query_and_return_independent_copies() {
    let engine = engine();
    engine
        .insert_row("users", row(&[("name", "ada".into())]))
        .unwrap();
    let em = manager(&engine);
    let users = em.repository("User").unwrap();

    let mut first = users.get(1).unwrap().unwrap();
    let second = users.get(1).unwrap().unwrap();
    first.set("name", "mutated");

    assert_eq!(engine.statement_count(StatementKind::Select), 1);
    assert_eq!(second.value("name"), Value::from("ada"));
}

#[test]
fn persisted_values_round_trip_at_second_precision() {
    let engine = engine();
    let em = manager(&engine);

    let created = parse_timestamp("2024-07-01 12:00:05")
        .unwrap()
        .checked_add_signed(chrono::TimeDelta::milliseconds(750))
        .unwrap();
    let mut user = Entity::new("User")
        .with("name", "grace")
        .with("email", "grace@example.com")
        .with("createdAt", created)
        .with("tags", vec![Value::from("navy"), Value::from("cobol")]);
    em.persist(&mut user).unwrap();

    em.begin_request(IdentityCache::new());
    let loaded = em
        .repository("User")
        .unwrap()
        .get(user.value("id"))
        .unwrap()
        .unwrap();

    assert_eq!(loaded.value("name"), Value::from("grace"));
    assert_eq!(loaded.value("email"), Value::from("grace@example.com"));
    assert_eq!(loaded.value("createdAt"), ts("2024-07-01 12:00:05"));
    assert_eq!(loaded.value("tags"), user.value("tags"));
}

#[test]
fn fan_out_rows_collapse_into_distinct_relations() {
    let engine = engine();
    engine
        .insert_row("users", row(&[("name", "ada".into())]))
        .unwrap();
    engine
        .insert_row("users", row(&[("name", "bob".into())]))
        .unwrap();
    for title in ["a", "b", "c"] {
        engine
            .insert_row("posts", row(&[("title", title.into()), ("author_id", 1.into())]))
            .unwrap();
    }
    for role in ["editor", "admin"] {
        engine
            .insert_row("user_roles", row(&[("user_id", 1.into()), ("role", role.into())]))
            .unwrap();
    }
    let em = manager(&engine);
    let users = em.repository("User").unwrap();

    let ada = users.get(1).unwrap().unwrap();
    assert_eq!(ada.related_many("posts").len(), 3);
    assert_eq!(ada.value("roles").as_list().map(<[Value]>::len), Some(2));

    let bob = users.get(2).unwrap().unwrap();
    assert_eq!(bob.value("posts"), Value::List(Vec::new()));
    assert_eq!(bob.value("roles"), Value::List(Vec::new()));
    assert_eq!(bob.value("profile"), Value::Null);
}

#[test]
fn find_limits_and_orders_matches() {
    let engine = engine();
    for day in 1..=14 {
        let status = if day % 7 == 0 { "inactive" } else { "active" };
        engine
            .insert_row(
                "users",
                row(&[
                    ("name", format!("user{day}").into()),
                    ("status", status.into()),
                    ("created_at", format!("2024-01-{day:02} 08:00:00").into()),
                ]),
            )
            .unwrap();
    }
    let em = manager(&engine);

    let found = em
        .repository("User")
        .unwrap()
        .find(
            &Criteria::new().field("status", "active"),
            &FindOptions::new()
                .limit(10)
                .order_by("createdAt", OrderDirection::Desc),
        )
        .unwrap();

    assert_eq!(found.len(), 10);
    assert!(found.iter().all(|u| u.value("status") == Value::from("active")));
    assert_eq!(found[0].value("createdAt"), ts("2024-01-13 08:00:00"));
    for pair in found.windows(2) {
        let (newer, older) = (pair[0].value("createdAt"), pair[1].value("createdAt"));
        assert_eq!(newer.loose_cmp(&older), Some(std::cmp::Ordering::Greater));
    }
}

#[test]
fn null_natural_key_fails_without_writing() {
    let engine = engine();
    let em = manager(&engine);

    let mut membership = Entity::new("Membership")
        .with("groupId", 4)
        .with("role", "owner");
    let err = em.persist(&mut membership).unwrap_err();

    assert!(matches!(
        err,
        OrmError::Repository(RepositoryError::NonGeneratedKeyNull { .. })
    ));
    assert!(engine.rows("memberships").is_empty());
    assert_eq!(engine.statement_count(StatementKind::Insert), 0);
    assert!(!engine.in_transaction());
}

#[test]
fn delete_evicts_both_caches() {
    let engine = engine();
    engine
        .insert_row("profiles", row(&[("bio", "gone soon".into())]))
        .unwrap();
    let em = manager(&engine);
    let profiles = em.repository("Profile").unwrap();

    let profile = profiles.get(1).unwrap().unwrap();
    let key = profiles.cache_key(&profile).unwrap().unwrap();
    em.delete(&profile).unwrap();

    assert!(!em.identity_cache().contains(&key));
    assert!(!em.result_cache().is_cached(&key));
    assert!(profiles.get(1).unwrap().is_none());
}

#[test]
fn failing_dependents_roll_back_the_owner() {
    let engine = engine();
    engine.fail_on(StatementKind::Insert, "posts");
    let em = manager(&engine);

    let mut user = Entity::new("User").with("name", "ada").with(
        "posts",
        vec![Value::from(Entity::new("Post").with("title", "draft"))],
    );

    assert!(em.persist(&mut user).is_err());
    assert!(engine.rows("users").is_empty());

    engine.clear_failures();
    let mut retry = Entity::new("User").with("name", "ada");
    em.persist(&mut retry).unwrap();
    assert_eq!(retry.value("id"), Value::Int(1));
}
