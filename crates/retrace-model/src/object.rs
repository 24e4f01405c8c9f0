//! Object references
//!
//! Provides [`ObjectRef`], the stable handle through which actions reach
//! application objects, and [`ObjectProxy`], the unregistered form callers
//! hand to the graph before an object has an id.
//!
//! Identity inside one graph is the [`ObjectKey`] triple
//! `(category, name, hash)`. Values are type-erased and may still be in
//! flight when the reference is created.

use crate::ids::ObjectId;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Type-erased application object
pub type AnyValue = Arc<dyn Any + Send + Sync>;

/// Future resolving to an application object (or to nothing)
pub type PendingValue = Shared<BoxFuture<'static, Option<AnyValue>>>;

/// Category of an object participating in provenance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ObjectCategory {
    /// Datasets and other data sources
    #[default]
    Data,
    /// Views and visual elements
    Visual,
    /// Selection state
    Selection,
    /// Anything else
    Custom,
}

impl ObjectCategory {
    /// Lowercase name, as used in default hashes and dumps
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Visual => "visual",
            Self::Selection => "selection",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for ObjectCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of an object within one graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    /// Object category
    pub category: ObjectCategory,
    /// Human label
    pub name: String,
    /// Content hash
    pub hash: String,
}

impl ObjectKey {
    /// Build a key
    #[inline]
    #[must_use]
    pub fn new(category: ObjectCategory, name: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            category,
            name: name.into(),
            hash: hash.into(),
        }
    }
}

/// Hash used when the caller does not supply one
#[must_use]
pub fn default_hash(name: &str, category: ObjectCategory) -> String {
    format!("{name}_{category}")
}

/// Current value of an object reference
#[derive(Clone, Default)]
pub enum ValueSlot {
    /// No value: the object was removed, or the graph was restored and
    /// nothing has touched the object yet
    #[default]
    Detached,
    /// Value available
    Ready(AnyValue),
    /// Value still being produced
    Pending(PendingValue),
}

impl ValueSlot {
    /// Wrap a concrete value
    #[must_use]
    pub fn ready<T: Any + Send + Sync>(value: T) -> Self {
        Self::Ready(Arc::new(value))
    }

    /// Wrap a future producing the value
    #[must_use]
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Option<AnyValue>> + Send + 'static,
    {
        Self::Pending(future.boxed().shared())
    }

    /// True when there is no value at all
    #[inline]
    #[must_use]
    pub fn is_detached(&self) -> bool {
        matches!(self, Self::Detached)
    }
}

impl fmt::Debug for ValueSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detached => f.write_str("Detached"),
            Self::Ready(_) => f.write_str("Ready(..)"),
            Self::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// An object that is not registered with a graph yet
#[derive(Debug, Clone)]
pub struct ObjectProxy {
    /// Human label
    pub name: String,
    /// Object category
    pub category: ObjectCategory,
    /// Content hash
    pub hash: String,
    /// Free-form description
    pub description: String,
    /// Value carried to the registry
    pub value: ValueSlot,
}

impl ObjectProxy {
    /// Proxy for an already available value
    #[must_use]
    pub fn new<T: Any + Send + Sync>(value: T, name: impl Into<String>, category: ObjectCategory) -> Self {
        Self::from_slot(ValueSlot::ready(value), name, category)
    }

    /// Proxy for a shared value
    #[must_use]
    pub fn from_arc(value: AnyValue, name: impl Into<String>, category: ObjectCategory) -> Self {
        Self::from_slot(ValueSlot::Ready(value), name, category)
    }

    /// Proxy whose value arrives later
    #[must_use]
    pub fn pending<F>(future: F, name: impl Into<String>, category: ObjectCategory) -> Self
    where
        F: Future<Output = Option<AnyValue>> + Send + 'static,
    {
        Self::from_slot(ValueSlot::pending(future), name, category)
    }

    /// Proxy that only names an object
    #[must_use]
    pub fn named(name: impl Into<String>, category: ObjectCategory) -> Self {
        Self::from_slot(ValueSlot::Detached, name, category)
    }

    fn from_slot(value: ValueSlot, name: impl Into<String>, category: ObjectCategory) -> Self {
        let name = name.into();
        let hash = default_hash(&name, category);
        Self {
            name,
            category,
            hash,
            description: String::new(),
            value,
        }
    }

    /// Override the content hash
    #[inline]
    #[must_use]
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = hash.into();
        self
    }

    /// Attach a description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Identity key
    #[must_use]
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.category, self.name.clone(), self.hash.clone())
    }
}

struct ObjectEntry {
    id: ObjectId,
    name: String,
    category: ObjectCategory,
    hash: String,
    description: String,
    slot: RwLock<ValueSlot>,
}

/// Registered, graph-unique handle to an application object
///
/// Cloning is cheap and every clone observes the same value slot.
#[derive(Clone)]
pub struct ObjectRef {
    inner: Arc<ObjectEntry>,
}

impl ObjectRef {
    /// Create a registered reference. Only registries should call this.
    #[must_use]
    pub fn new(id: ObjectId, proxy: ObjectProxy) -> Self {
        Self {
            inner: Arc::new(ObjectEntry {
                id,
                name: proxy.name,
                category: proxy.category,
                hash: proxy.hash,
                description: proxy.description,
                slot: RwLock::new(proxy.value),
            }),
        }
    }

    /// Graph-unique id
    #[inline]
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    /// Human label
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Category
    #[inline]
    #[must_use]
    pub fn category(&self) -> ObjectCategory {
        self.inner.category
    }

    /// Content hash
    #[inline]
    #[must_use]
    pub fn hash(&self) -> &str {
        &self.inner.hash
    }

    /// Description
    #[inline]
    #[must_use]
    pub fn description(&self) -> &str {
        &self.inner.description
    }

    /// Identity key
    #[must_use]
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.inner.category, self.inner.name.clone(), self.inner.hash.clone())
    }

    /// Value if it is already available
    #[must_use]
    pub fn value(&self) -> Option<AnyValue> {
        match &*self.inner.slot.read() {
            ValueSlot::Ready(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// True if no value is attached
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.inner.slot.read().is_detached()
    }

    /// True if the value is still being produced
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(&*self.inner.slot.read(), ValueSlot::Pending(_))
    }

    /// Wait for the value, caching the outcome of a pending future
    pub async fn resolve(&self) -> Option<AnyValue> {
        let pending = match &*self.inner.slot.read() {
            ValueSlot::Detached => return None,
            ValueSlot::Ready(v) => return Some(v.clone()),
            ValueSlot::Pending(p) => p.clone(),
        };

        let value = pending.clone().await;

        let mut slot = self.inner.slot.write();
        // Another writer may have replaced the slot while we were waiting
        if let ValueSlot::Pending(current) = &*slot {
            if current.ptr_eq(&pending) {
                *slot = match &value {
                    Some(v) => ValueSlot::Ready(v.clone()),
                    None => ValueSlot::Detached,
                };
            }
        }
        value
    }

    /// Wait for the value and downcast it
    pub async fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.resolve().await.and_then(|v| v.downcast::<T>().ok())
    }

    /// Replace the value
    pub fn set_slot(&self, slot: ValueSlot) {
        *self.inner.slot.write() = slot;
    }

    /// Attach a concrete value
    pub fn set_value(&self, value: AnyValue) {
        self.set_slot(ValueSlot::Ready(value));
    }

    /// Drop the value, keeping the reference itself
    pub fn detach(&self) {
        self.set_slot(ValueSlot::Detached);
    }

    /// Copy of the current slot
    #[must_use]
    pub fn slot(&self) -> ValueSlot {
        self.inner.slot.read().clone()
    }

    /// Proxy describing this object, sharing its current value
    #[must_use]
    pub fn to_proxy(&self) -> ObjectProxy {
        ObjectProxy {
            name: self.inner.name.clone(),
            category: self.inner.category,
            hash: self.inner.hash.clone(),
            description: self.inner.description.clone(),
            value: self.slot(),
        }
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for ObjectRef {}

impl std::hash::Hash for ObjectRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("category", &self.inner.category)
            .field("hash", &self.inner.hash)
            .field("value", &*self.inner.slot.read())
            .finish()
    }
}

/// Input of an action: either already registered, or still a proxy
#[derive(Debug, Clone)]
pub enum ObjectInput {
    /// Registered reference
    Ref(ObjectRef),
    /// Unregistered object, resolved through `find_or_add`
    Proxy(ObjectProxy),
}

impl ObjectInput {
    /// Identity key
    #[must_use]
    pub fn key(&self) -> ObjectKey {
        match self {
            Self::Ref(r) => r.key(),
            Self::Proxy(p) => p.key(),
        }
    }
}

impl From<ObjectRef> for ObjectInput {
    fn from(value: ObjectRef) -> Self {
        Self::Ref(value)
    }
}

impl From<&ObjectRef> for ObjectInput {
    fn from(value: &ObjectRef) -> Self {
        Self::Ref(value.clone())
    }
}

impl From<ObjectProxy> for ObjectInput {
    fn from(value: ObjectProxy) -> Self {
        Self::Proxy(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_hash_combines_name_and_category() {
        let proxy = ObjectProxy::new(1u32, "view", ObjectCategory::Visual);
        assert_eq!(proxy.hash, "view_visual");
        assert_eq!(proxy.key(), ObjectKey::new(ObjectCategory::Visual, "view", "view_visual"));
    }

    #[tokio::test]
    async fn resolve_ready_value() {
        let r = ObjectRef::new(ObjectId(1), ObjectProxy::new(7u32, "n", ObjectCategory::Data));
        assert_eq!(*r.downcast::<u32>().await.unwrap(), 7);
        assert!(r.downcast::<String>().await.is_none());
    }

    #[tokio::test]
    async fn resolve_pending_value_caches_result() {
        let proxy = ObjectProxy::pending(
            async { Some(Arc::new(String::from("late")) as AnyValue) },
            "late",
            ObjectCategory::Data,
        );
        let r = ObjectRef::new(ObjectId(2), proxy);
        assert!(r.is_pending());
        assert!(r.value().is_none());

        let v = r.downcast::<String>().await.unwrap();
        assert_eq!(v.as_str(), "late");
        assert!(!r.is_pending());
        assert!(r.value().is_some());
    }

    #[tokio::test]
    async fn pending_none_becomes_detached() {
        let proxy = ObjectProxy::pending(async { None }, "gone", ObjectCategory::Data);
        let r = ObjectRef::new(ObjectId(3), proxy);
        assert!(r.resolve().await.is_none());
        assert!(r.is_detached());
    }

    #[test]
    fn clones_share_slot() {
        let r = ObjectRef::new(ObjectId(4), ObjectProxy::new(1i64, "x", ObjectCategory::Custom));
        let c = r.clone();
        r.detach();
        assert!(c.is_detached());
        assert_eq!(r, c);
    }
}
