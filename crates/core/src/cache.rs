//! Process-wide, append-only caches keyed by concrete type.
//!
//! Types declared through [`value_object!`](crate::value_object) own their
//! slots as statics ([`TypeSlots`]), so a published entry is read with a single
//! atomic load. Hand-declared types without slots fall back to a shared
//! [`SynthesisCache`], where each key owns a once-only slot. The map lock is held just long enough to
//! find or insert the slot; initialization runs under the slot's own guard,
//! so concurrent first requests for one type block on a single initializer
//! while other types proceed. A failed initialization leaves the slot empty
//! and the next request tries again.

use core::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::OnceCell;

use crate::descriptor::TypeDescriptor;
use crate::equality::EqualsFn;
use crate::error::{ValueObjectError, ValueResult};
use crate::evolve::EvolvePlan;
use crate::hash::HashFnOf;

/// Per-type storage for everything synthesized for `T`.
///
/// Returned from [`Structural::slots`](crate::Structural::slots) as a
/// `static` owned by the type.
pub struct TypeSlots<T> {
    pub(crate) descriptor: OnceCell<Arc<TypeDescriptor<T>>>,
    pub(crate) equality: OnceCell<Arc<EqualsFn<T>>>,
    pub(crate) hash: OnceCell<Arc<HashFnOf<T>>>,
    pub(crate) evolve: OnceCell<Arc<EvolvePlan<T>>>,
}

impl<T> TypeSlots<T> {
    pub const fn new() -> Self {
        Self {
            descriptor: OnceCell::new(),
            equality: OnceCell::new(),
            hash: OnceCell::new(),
            evolve: OnceCell::new(),
        }
    }
}

impl<T> Default for TypeSlots<T> {
    fn default() -> Self {
        Self::new()
    }
}

type Entry = Arc<dyn Any + Send + Sync>;
type Slot = Arc<OnceCell<Entry>>;

pub(crate) struct SynthesisCache {
    name: &'static str,
    slots: RwLock<HashMap<TypeId, Slot>>,
}

impl SynthesisCache {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch the entry for `T`, building it with `init` if this is the first request.
    pub(crate) fn get_or_try_init<T, V, F>(&self, init: F) -> ValueResult<Arc<V>>
    where
        T: 'static,
        V: Any + Send + Sync,
        F: FnOnce() -> ValueResult<V>,
    {
        let slot = self.slot(TypeId::of::<T>())?;
        let entry = slot.get_or_try_init(|| init().map(|value| Arc::new(value) as Entry))?;

        Arc::clone(entry)
            .downcast::<V>()
            .map_err(|_| self.failure("entry has an unexpected type"))
    }

    /// Like [`get_or_try_init`](Self::get_or_try_init), but through the type's
    /// own slot when it has one.
    pub(crate) fn get_or_try_init_in<T, V, F>(
        &self,
        slot: Option<&'static OnceCell<Arc<V>>>,
        init: F,
    ) -> ValueResult<Arc<V>>
    where
        T: 'static,
        V: Any + Send + Sync,
        F: FnOnce() -> ValueResult<V>,
    {
        match slot {
            Some(slot) => slot.get_or_try_init(|| init().map(Arc::new)).map(Arc::clone),
            None => self.get_or_try_init::<T, V, F>(init),
        }
    }

    /// Whether an entry for `T` has been published.
    pub(crate) fn contains<T: 'static>(&self) -> bool {
        self.slots
            .read()
            .ok()
            .and_then(|slots| slots.get(&TypeId::of::<T>()).map(|slot| slot.get().is_some()))
            .unwrap_or(false)
    }

    fn slot(&self, key: TypeId) -> ValueResult<Slot> {
        {
            let slots = self.slots.read().map_err(|_| self.failure("lock poisoned"))?;
            if let Some(slot) = slots.get(&key) {
                return Ok(Arc::clone(slot));
            }
        }

        let mut slots = self.slots.write().map_err(|_| self.failure("lock poisoned"))?;
        Ok(Arc::clone(slots.entry(key).or_default()))
    }

    fn failure(&self, reason: &'static str) -> ValueObjectError {
        ValueObjectError::Cache {
            cache: self.name,
            reason,
        }
    }
}
