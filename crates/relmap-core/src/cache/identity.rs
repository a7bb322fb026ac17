use crate::{cache::CacheKey, entity::Entity};
use std::collections::HashMap;

///
/// Slot
///
/// Constructing → registered before decode; reads return the partial
///                instance, which is how relation cycles terminate
/// Ready        → fully decoded
///

#[derive(Clone, Debug)]
enum Slot {
    Constructing(Entity),
    Ready(Entity),
}

impl Slot {
    const fn entity(&self) -> &Entity {
        match self {
            Self::Constructing(entity) | Self::Ready(entity) => entity,
        }
    }
}

///
/// IdentityCache
///
/// Request-scoped map from entity identity to its one in-memory instance.
/// Never global: the entity manager holds the cache of the current request.
///

#[derive(Clone, Debug, Default)]
pub struct IdentityCache {
    slots: HashMap<CacheKey, Slot>,
}

impl IdentityCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.slots.contains_key(key)
    }

    /// The in-flight or finished instance.
    #[must_use]
    pub fn load(&self, key: &CacheKey) -> Option<&Entity> {
        self.slots.get(key).map(Slot::entity)
    }

    #[must_use]
    pub fn is_constructing(&self, key: &CacheKey) -> bool {
        matches!(self.slots.get(key), Some(Slot::Constructing(_)))
    }

    /// Register a skeleton as under construction.
    pub fn begin(&mut self, key: CacheKey, skeleton: Entity) {
        self.slots.insert(key, Slot::Constructing(skeleton));
    }

    /// Replace the in-flight instance, keeping the slot state.
    pub fn update(&mut self, key: &CacheKey, entity: Entity) {
        if let Some(slot) = self.slots.get_mut(key) {
            *slot = match slot {
                Slot::Constructing(_) => Slot::Constructing(entity),
                Slot::Ready(_) => Slot::Ready(entity),
            };
        }
    }

    pub fn finish(&mut self, key: CacheKey, entity: Entity) {
        self.slots.insert(key, Slot::Ready(entity));
    }

    pub fn invalidate(&mut self, key: &CacheKey) {
        self.slots.remove(key);
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
