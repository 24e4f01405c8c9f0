//! Object reference registry
//!
//! Provides [`ObjectRegistry`], which owns every [`ObjectRef`] of one graph
//! and deduplicates them by [`ObjectKey`]. References are never removed
//! individually; they live until the registry is cleared.

use crate::error::ModelError;
use crate::ids::{IdAllocator, ObjectId};
use crate::object::{ObjectInput, ObjectKey, ObjectProxy, ObjectRef, ValueSlot};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct Tables {
    /// Registration order is preserved for listing and persistence
    by_id: IndexMap<ObjectId, ObjectRef>,
    by_key: HashMap<ObjectKey, ObjectId>,
}

/// Registry of object references, keyed by `(category, name, hash)`
#[derive(Debug)]
pub struct ObjectRegistry {
    ids: IdAllocator,
    tables: RwLock<Tables>,
}

impl ObjectRegistry {
    /// Empty registry drawing ids from `ids`
    #[inline]
    #[must_use]
    pub fn new(ids: IdAllocator) -> Self {
        Self {
            ids,
            tables: RwLock::new(Tables::default()),
        }
    }

    /// Return the existing reference for the proxy's key, or register it.
    ///
    /// When an existing reference has no value and the proxy carries one,
    /// the value is attached. This is how objects are re-established after
    /// a restore.
    pub fn find_or_add(&self, proxy: ObjectProxy) -> ObjectRef {
        let key = proxy.key();
        if let Some(existing) = self.find_by_key(&key) {
            if existing.is_detached() && !proxy.value.is_detached() {
                existing.set_slot(proxy.value);
            }
            return existing;
        }

        let mut tables = self.tables.write();
        // Re-check under the write lock
        if let Some(id) = tables.by_key.get(&key) {
            return tables.by_id[id].clone();
        }
        let r = ObjectRef::new(self.ids.next(), proxy);
        tables.by_key.insert(key, r.id());
        tables.by_id.insert(r.id(), r.clone());
        r
    }

    /// Resolve an action input to a registered reference.
    ///
    /// A reference that belongs to this registry is returned as is. A
    /// reference from elsewhere is treated like a proxy of itself.
    pub fn resolve_input(&self, input: &ObjectInput) -> ObjectRef {
        match input {
            ObjectInput::Ref(r) => {
                if self.get(r.id()).is_some_and(|own| own.key() == r.key()) {
                    r.clone()
                } else {
                    self.find_or_add(r.to_proxy())
                }
            }
            ObjectInput::Proxy(p) => self.find_or_add(p.clone()),
        }
    }

    /// Resolve several inputs, preserving order
    pub fn resolve_inputs(&self, inputs: &[ObjectInput]) -> Vec<ObjectRef> {
        inputs.iter().map(|i| self.resolve_input(i)).collect()
    }

    /// Register a reference with a fixed id, as read from a persisted dump.
    /// The value starts detached.
    ///
    /// # Errors
    /// Returns error if the id or the key is already taken
    pub fn insert_restored(&self, id: ObjectId, proxy: ObjectProxy) -> Result<ObjectRef, ModelError> {
        let key = proxy.key();
        let mut tables = self.tables.write();
        if tables.by_id.contains_key(&id) {
            return Err(ModelError::DuplicateObjectId(id));
        }
        if tables.by_key.contains_key(&key) {
            return Err(ModelError::DuplicateObjectKey {
                name: key.name,
                category: key.category,
            });
        }
        self.ids.observe(id.get())?;
        let r = ObjectRef::new(
            id,
            ObjectProxy {
                value: ValueSlot::Detached,
                ..proxy
            },
        );
        tables.by_key.insert(key, id);
        tables.by_id.insert(id, r.clone());
        Ok(r)
    }

    /// Replace all references with the restored `entries`, as one step.
    ///
    /// Nothing changes if any entry collides with another.
    ///
    /// # Errors
    /// Returns error if an id or a key occurs twice
    pub fn replace_restored<I>(&self, entries: I) -> Result<Vec<ObjectRef>, ModelError>
    where
        I: IntoIterator<Item = (ObjectId, ObjectProxy)>,
    {
        let staged = ObjectRegistry::new(IdAllocator::new());
        let refs = entries
            .into_iter()
            .map(|(id, proxy)| staged.insert_restored(id, proxy))
            .collect::<Result<Vec<_>, _>>()?;

        for r in &refs {
            self.ids.observe(r.id().get())?;
        }
        let staged = staged.tables.into_inner();
        *self.tables.write() = staged;
        Ok(refs)
    }

    /// Look up by id
    #[must_use]
    pub fn get(&self, id: ObjectId) -> Option<ObjectRef> {
        self.tables.read().by_id.get(&id).cloned()
    }

    /// Look up by identity key
    #[must_use]
    pub fn find_by_key(&self, key: &ObjectKey) -> Option<ObjectRef> {
        let tables = self.tables.read();
        tables.by_key.get(key).map(|id| tables.by_id[id].clone())
    }

    /// All references in registration order
    #[must_use]
    pub fn all(&self) -> Vec<ObjectRef> {
        self.tables.read().by_id.values().cloned().collect()
    }

    /// Number of registered references
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.read().by_id.len()
    }

    /// True if nothing is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every reference
    pub fn clear(&self) {
        let mut tables = self.tables.write();
        tables.by_id.clear();
        tables.by_key.clear();
    }
}
