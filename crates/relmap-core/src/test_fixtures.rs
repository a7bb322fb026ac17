use crate::{
    db::{
        EntityManager,
        engine::{MemoryEngine, Row},
    },
    entity::access::EntityMethods,
    model::DefinitionStore,
    value::Value,
};

pub(crate) const BLOG_YAML: &str = include_str!("../tests/fixtures/blog.yml");

pub(crate) fn store() -> DefinitionStore {
    DefinitionStore::from_yaml_str(BLOG_YAML).unwrap()
}

pub(crate) fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(column, value)| ((*column).to_string(), value.clone()))
        .collect()
}

/// Empty blog tables.
pub(crate) fn engine() -> MemoryEngine {
    let engine = MemoryEngine::new();
    for table in ["users", "profiles", "posts"] {
        engine.create_table(table, Some("id"));
    }
    for table in ["user_roles", "memberships", "settings"] {
        engine.create_table(table, None);
    }

    engine
}

/// Blog tables holding one user (id 1) with a profile, two posts and two
/// roles, plus a second user (id 2) with nothing attached.
pub(crate) fn seeded_engine() -> MemoryEngine {
    let engine = engine();

    engine
        .insert_row("profiles", row(&[("bio", "mathematician".into())]))
        .unwrap();
    engine
        .insert_row(
            "users",
            row(&[
                ("name", "ada".into()),
                ("email_address", "ada@example.com".into()),
                ("status", "active".into()),
                ("created_at", "2024-03-01 09:30:00".into()),
                ("tags", "{admin,author}".into()),
                ("profile_id", 1.into()),
            ]),
        )
        .unwrap();
    engine
        .insert_row(
            "users",
            row(&[("name", "bob".into()), ("status", "banned".into())]),
        )
        .unwrap();

    for (title, published) in [("notes", true), ("drafts", false)] {
        engine
            .insert_row(
                "posts",
                row(&[
                    ("title", title.into()),
                    ("author_id", 1.into()),
                    ("published", published.into()),
                ]),
            )
            .unwrap();
    }
    for role in ["editor", "admin"] {
        engine
            .insert_row(
                "user_roles",
                row(&[
                    ("user_id", 1.into()),
                    ("role", role.into()),
                    ("granted_at", "2024-01-01 00:00:00".into()),
                ]),
            )
            .unwrap();
    }

    engine
}

pub(crate) fn setting_methods() -> EntityMethods {
    EntityMethods::new()
        .getter("getCode", |e| e.value("code"))
        .getter("isEnabled", |e| e.value("enabled"))
        .setter("setCode", |e, v| e.set("code", v))
        .setter("setEnabled", |e, v| e.set("enabled", v))
}

/// Manager over `engine`; the engine handle stays usable for inspection.
pub(crate) fn manager(engine: &MemoryEngine) -> EntityManager {
    EntityManager::builder(store(), engine.clone())
        .methods("Setting", setting_methods())
        .build()
        .unwrap()
}
