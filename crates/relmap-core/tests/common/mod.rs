use relmap_core::{
    db::{
        EntityManager,
        engine::{MemoryEngine, Row},
    },
    model::DefinitionStore,
    value::Value,
};

pub const BLOG_YAML: &str = include_str!("../fixtures/blog.yml");

pub fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(column, value)| ((*column).to_string(), value.clone()))
        .collect()
}

pub fn engine() -> MemoryEngine {
    let engine = MemoryEngine::new();
    for table in ["users", "profiles", "posts"] {
        engine.create_table(table, Some("id"));
    }
    for table in ["user_roles", "memberships", "settings"] {
        engine.create_table(table, None);
    }

    engine
}

pub fn manager(engine: &MemoryEngine) -> EntityManager {
    EntityManager::builder(
        DefinitionStore::from_yaml_str(BLOG_YAML).unwrap(),
        engine.clone(),
    )
    .build()
    .unwrap()
}
