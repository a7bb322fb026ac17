//! Module: cache
//! Responsibility: entity identity keys, the request-scoped identity cache
//! and the cross-request result cache backends.
//! Does not own: deciding when entries are invalidated (repositories do).

mod identity;
mod memory;


pub use identity::IdentityCache;
pub use memory::{EncodedCache, MemoryCache, NoCache};

use crate::{entity::Entity, value::Value};
use derive_more::{Deref, Display};
use sha2::{Digest, Sha256};

///
/// CacheKey
///
/// `{entity}#{sha256}` over the canonical text of each primary key value.
/// Shared by the identity cache and the result cache.
///

#[derive(Clone, Debug, Deref, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for one entity row; `None` when any key value is null.
    #[must_use]
    pub fn for_entity(entity: &str, keys: &[Value]) -> Option<Self> {
        let mut hasher = Sha256::new();
        hasher.update(b"cachekey:v1");
        write_str(&mut hasher, entity);

        for key in keys {
            write_str(&mut hasher, &key.canonical_text()?);
        }

        let digest = hasher.finalize();
        let mut out = String::with_capacity(entity.len() + 65);
        out.push_str(entity);
        out.push('#');
        for byte in digest {
            use std::fmt::Write as _;
            let _ = write!(out, "{byte:02x}");
        }

        Some(Self(out))
    }

    /// Entity name encoded in the key.
    #[must_use]
    pub fn entity(&self) -> &str {
        self.0.split_once('#').map_or(self.0.as_str(), |(entity, _)| entity)
    }
}

#[expect(clippy::cast_possible_truncation)]
fn write_str(hasher: &mut Sha256, text: &str) {
    hasher.update((text.len() as u32).to_be_bytes());
    hasher.update(text.as_bytes());
}

///
/// CacheBackend
///
/// Cross-request result cache. Shared between workers, so implementations
/// must be `Send + Sync`; concurrent writers resolve as last write wins.
///

pub trait CacheBackend: Send + Sync {
    fn is_cached(&self, key: &CacheKey) -> bool;

    fn load(&self, key: &CacheKey) -> Option<Entity>;

    fn cache(&self, key: &CacheKey, entity: &Entity);

    fn invalidate(&self, key: &CacheKey);

    fn clear(&self);
}
