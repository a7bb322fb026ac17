use super::*;
use crate::{
    cache::{EncodedCache, NoCache},
    db::{
        config::{ConfigError, RepositoryConfig},
        engine::MemoryEngine,
    },
    obs::{CounterSink, StatementKind},
    test_fixtures::{self, BLOG_YAML, manager, seeded_engine},
};

fn new_user(name: &str) -> Entity {
    let post = Entity::new("Post").with("title", "first");

    Entity::new("User")
        .with("name", name)
        .with("posts", vec![Value::from(post)])
}

#[test]
fn persist_commits_the_whole_graph() {
    let engine = test_fixtures::engine();
    let em = manager(&engine);

    let mut user = new_user("grace");
    em.persist(&mut user).unwrap();

    assert!(!engine.in_transaction());
    assert_eq!(engine.rows("users").len(), 1);
    assert_eq!(engine.rows("posts").len(), 1);
}

#[test]
fn failed_persist_rolls_back_every_write() {
    let engine = test_fixtures::engine();
    let sink = Arc::new(CounterSink::new());
    let em = EntityManager::builder(test_fixtures::store(), engine.clone())
        .metrics(sink.clone())
        .build()
        .unwrap();
    engine.fail_on(StatementKind::Insert, "posts");

    let err = em.persist(&mut new_user("grace")).unwrap_err();

    assert_eq!(err.class(), crate::ErrorClass::Engine);
    assert!(!engine.in_transaction());
    assert!(engine.rows("users").is_empty());
    assert!(em.identity_cache().is_empty());
    assert_eq!(sink.snapshot().ops.rollbacks, 1);
}

#[test]
fn rollback_discards_result_cache_writes() {
    let engine = seeded_engine();
    let em = manager(&engine);
    engine.fail_on(StatementKind::Update, "users");

    let users = em.repository("User").unwrap();
    let mut user = Entity::new("User").with("id", 2).with("name", "robert");
    assert!(em.persist(&mut user).is_err());

    // the existence check cached user 2 inside the failed transaction
    let key = users.cache_key(&user).unwrap().unwrap();
    assert!(!em.result_cache().is_cached(&key));
}

#[test]
fn delete_runs_in_a_transaction() {
    let engine = seeded_engine();
    let em = manager(&engine);

    let user = em.repository("User").unwrap().get(2).unwrap().unwrap();
    em.delete(&user).unwrap();

    assert!(!engine.in_transaction());
    assert_eq!(engine.rows("users").len(), 1);
}

#[test]
fn result_cache_is_shared_between_managers() {
    let engine = seeded_engine();
    let cache: Arc<dyn CacheBackend> = Arc::new(MemoryCache::new());
    let build = || {
        EntityManager::builder(test_fixtures::store(), engine.clone())
            .cache(cache.clone())
            .build()
            .unwrap()
    };

    build().repository("Profile").unwrap().get(1).unwrap();
    let selects = engine.statement_count(StatementKind::Select);

    let profile = build().repository("Profile").unwrap().get(1).unwrap().unwrap();
    assert_eq!(engine.statement_count(StatementKind::Select), selects);
    assert_eq!(profile.value("bio"), Value::from("mathematician"));
}

#[test]
fn encoded_cache_round_trips_entities() {
    let engine = seeded_engine();
    let em = EntityManager::builder(test_fixtures::store(), engine.clone())
        .cache(Arc::new(EncodedCache::new()))
        .build()
        .unwrap();

    let loaded = em.repository("User").unwrap().get(1).unwrap().unwrap();
    em.begin_request(IdentityCache::new());
    let cached = em.repository("User").unwrap().get(1).unwrap().unwrap();

    assert_eq!(loaded, cached);
}

#[test]
fn no_cache_always_queries() {
    let engine = seeded_engine();
    let em = EntityManager::builder(test_fixtures::store(), engine.clone())
        .cache(Arc::new(NoCache))
        .build()
        .unwrap();

    em.repository("Profile").unwrap().get(1).unwrap();
    em.begin_request(IdentityCache::new());
    em.repository("Profile").unwrap().get(1).unwrap();

    assert_eq!(engine.statement_count(StatementKind::Select), 2);
}

#[test]
fn begin_request_swaps_the_identity_cache() {
    let engine = seeded_engine();
    let em = manager(&engine);
    em.repository("Profile").unwrap().get(1).unwrap();

    let previous = em.begin_request(IdentityCache::new());

    assert_eq!(previous.len(), 1);
    assert!(em.identity_cache().is_empty());
}

#[test]
fn resolve_loads_by_named_parameter() {
    let engine = seeded_engine();
    let em = manager(&engine);
    let params = BTreeMap::from([("user".to_string(), Value::from(2))]);

    let user = em.resolve("User", &params, "user").unwrap().unwrap();
    assert_eq!(user.value("name"), Value::from("bob"));
    assert!(em.resolve("User", &params, "author").unwrap().is_none());

    let hashed: HashMap<String, Value> = HashMap::from([("user".to_string(), Value::from(1))]);
    assert!(em.resolve("User", &hashed, "user").unwrap().is_some());
}

#[test]
fn repository_profiles_must_be_registered() {
    let yaml = r"
Page:
  table: pages
  keys: [slug]
  repository: audited
  fields:
    slug: ~
    body: ~
    changedAt: { column: changed_at, type: timestamp }
";
    let engine = MemoryEngine::new();
    engine.create_table("pages", None);
    let mut em = EntityManager::builder(DefinitionStore::from_yaml_str(yaml).unwrap(), engine.clone())
        .build()
        .unwrap();

    let err = em.repository("Page").err().unwrap();
    assert!(matches!(
        err,
        OrmError::Repository(RepositoryError::RepositoryNotFound { name }) if name == "audited"
    ));

    em.register_repository(
        "audited",
        RepositoryConfig {
            modified_at_field: Some("changedAt".to_string()),
        },
    );
    let mut page = Entity::new("Page").with("slug", "home").with("body", "v1");
    em.persist(&mut page).unwrap();
    page.set("body", "v2");
    em.persist(&mut page).unwrap();

    let stored = &engine.rows("pages")[0];
    assert_eq!(stored["body"], Value::from("v2"));
    assert!(stored["changed_at"].as_text().is_some());
}

#[test]
fn unknown_entities_have_no_repository() {
    let em = manager(&test_fixtures::engine());

    assert!(matches!(
        em.repository("Ghost").err().unwrap(),
        OrmError::Definition(_)
    ));
}

#[test]
fn from_config_loads_the_definition_document() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("blog.yml"), BLOG_YAML).unwrap();
    std::fs::write(dir.path().join("orm.yml"), "definitions: blog.yml\n").unwrap();

    let config = OrmConfig::from_path(dir.path().join("orm.yml")).unwrap();
    let em = EntityManager::from_config(config, seeded_engine())
        .unwrap()
        .build()
        .unwrap();

    assert!(em.definitions().contains("Post"));
    assert_eq!(em.plan("User").unwrap().aliases().root(), "u");
}

#[test]
fn from_config_requires_definitions() {
    let err = EntityManager::from_config(OrmConfig::default(), MemoryEngine::new())
        .err()
        .unwrap();

    assert!(matches!(
        err,
        OrmError::Config(ConfigError::MissingDefinitions)
    ));
}

#[test]
fn build_rejects_defective_plans() {
    let yaml = r"
A:
  table: a
  keys: [id]
  fields:
    id: ~
    tags:
      join: { table: a_tags, foreignColumn: a_id }
";
    let err = EntityManager::builder(DefinitionStore::from_yaml_str(yaml).unwrap(), MemoryEngine::new())
        .build()
        .err()
        .unwrap();

    assert!(matches!(err, OrmError::Plan(_)));
}

#[test]
fn custom_transformers_apply_after_registration() {
    struct Upper;

    impl Transformer for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn transform(&self, value: Value) -> Result<Value, crate::transform::TransformError> {
            Ok(match value {
                Value::Text(text) => Value::Text(text.to_uppercase()),
                other => other,
            })
        }

        fn reverse_transform(&self, value: Value) -> Result<Value, crate::transform::TransformError> {
            Ok(value)
        }
    }

    let yaml = r"
Tag:
  table: tags
  keys: [code]
  fields:
    code: { transformer: upper }
";
    let engine = MemoryEngine::new();
    engine.create_table("tags", None);
    let mut em = EntityManager::builder(DefinitionStore::from_yaml_str(yaml).unwrap(), engine)
        .build()
        .unwrap();

    let tags = em.repository("Tag").unwrap();
    assert!(tags.build(&BTreeMap::from([("code".to_string(), Value::from("a"))])).is_err());

    em.register_transformer(Upper);
    let tag = em
        .repository("Tag")
        .unwrap()
        .build(&BTreeMap::from([("code".to_string(), Value::from("a"))]))
        .unwrap();
    assert_eq!(tag.value("code"), Value::from("A"));
}
