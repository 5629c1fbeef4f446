//! Generational slot registries: one per component kind.
//!
//! Handles are `(index, generation)` pairs. Removing an entry bumps the slot's
//! generation, so a stale handle never resolves to a newer occupant. Insert and
//! removal are O(1); iteration walks the slot vector once.

use std::fmt;
use std::marker::PhantomData;

/// Raw slot address shared by every typed handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot {
    index: u32,
    generation: u32,
}

impl Slot {
    /// Packs the slot into 64 bits (generation high, index low).
    pub fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    /// Inverse of [`to_bits`](Self::to_bits).
    pub fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }

    /// Slot index.
    pub fn index(self) -> u32 {
        self.index
    }

    /// Slot generation. Live slots never have generation 0.
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// A typed handle usable as a registry key.
pub trait RegistryKey: Copy {
    /// Wraps a raw slot.
    fn from_slot(slot: Slot) -> Self;
    /// The raw slot behind this handle.
    fn slot(self) -> Slot;
}

macro_rules! registry_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Slot);

        impl RegistryKey for $name {
            fn from_slot(slot: Slot) -> Self {
                Self(slot)
            }

            fn slot(self) -> Slot {
                self.0
            }
        }

        impl $name {
            /// Packs the handle into the `user_data` word of a Rapier object.
            pub fn to_user_data(self) -> u128 {
                self.0.to_bits() as u128
            }

            /// Recovers a handle from Rapier `user_data`.
            pub fn from_user_data(data: u128) -> Self {
                Self(Slot::from_bits(data as u64))
            }
        }
    };
}

registry_key!(
    /// Handle to a scene [`Object`](crate::Object).
    ObjectId
);
registry_key!(
    /// Handle to a [`Body`](crate::Body).
    BodyId
);
registry_key!(
    /// Handle to a [`Geom`](crate::Geom).
    GeomId
);
registry_key!(
    /// Handle to a [`Joint`](crate::Joint).
    JointId
);

struct Entry<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot registry keyed by a typed handle.
pub struct Registry<K, T> {
    entries: Vec<Entry<T>>,
    free: Vec<u32>,
    len: usize,
    _key: PhantomData<K>,
}

impl<K: RegistryKey, T> Registry<K, T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            len: 0,
            _key: PhantomData,
        }
    }

    /// Inserts a value and returns its handle.
    pub fn insert(&mut self, value: T) -> K {
        self.insert_with(|_| value)
    }

    /// Inserts a value built from its own handle.
    pub fn insert_with(&mut self, build: impl FnOnce(K) -> T) -> K {
        let slot = match self.free.pop() {
            Some(index) => {
                let entry = &self.entries[index as usize];
                Slot {
                    index,
                    generation: entry.generation,
                }
            }
            None => {
                let index = self.entries.len() as u32;
                self.entries.push(Entry {
                    generation: 1,
                    value: None,
                });
                Slot {
                    index,
                    generation: 1,
                }
            }
        };
        let key = K::from_slot(slot);
        self.entries[slot.index as usize].value = Some(build(key));
        self.len += 1;
        key
    }

    /// Removes the value behind `key`, invalidating the handle.
    pub fn remove(&mut self, key: K) -> Option<T> {
        let slot = key.slot();
        let entry = self.entries.get_mut(slot.index as usize)?;
        if entry.generation != slot.generation {
            return None;
        }
        let value = entry.value.take()?;
        entry.generation = entry.generation.wrapping_add(1).max(1);
        self.free.push(slot.index);
        self.len -= 1;
        Some(value)
    }

    /// Shared access to a live entry.
    pub fn get(&self, key: K) -> Option<&T> {
        let slot = key.slot();
        let entry = self.entries.get(slot.index as usize)?;
        if entry.generation != slot.generation {
            return None;
        }
        entry.value.as_ref()
    }

    /// Mutable access to a live entry.
    pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
        let slot = key.slot();
        let entry = self.entries.get_mut(slot.index as usize)?;
        if entry.generation != slot.generation {
            return None;
        }
        entry.value.as_mut()
    }

    /// Returns `true` if `key` refers to a live entry.
    pub fn contains(&self, key: K) -> bool {
        self.get(key).is_some()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no entries are live.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterates over live entries.
    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> {
        self.entries.iter().enumerate().filter_map(|(index, entry)| {
            entry.value.as_ref().map(|value| {
                (
                    K::from_slot(Slot {
                        index: index as u32,
                        generation: entry.generation,
                    }),
                    value,
                )
            })
        })
    }

    /// Iterates mutably over live entries.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (K, &mut T)> {
        self.entries
            .iter_mut()
            .enumerate()
            .filter_map(|(index, entry)| {
                let generation = entry.generation;
                entry.value.as_mut().map(|value| {
                    (
                        K::from_slot(Slot {
                            index: index as u32,
                            generation,
                        }),
                        value,
                    )
                })
            })
    }

    /// Snapshot of all live handles.
    pub fn keys(&self) -> Vec<K> {
        self.iter().map(|(key, _)| key).collect()
    }
}

impl<K: RegistryKey, T> Default for Registry<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut reg: Registry<BodyId, &str> = Registry::new();
        let a = reg.insert("a");
        let b = reg.insert("b");
        assert_eq!(reg.get(a), Some(&"a"));
        assert_eq!(reg.get(b), Some(&"b"));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn test_stale_handle_does_not_resolve() {
        let mut reg: Registry<GeomId, u32> = Registry::new();
        let first = reg.insert(1);
        assert_eq!(reg.remove(first), Some(1));
        let second = reg.insert(2);

        // Same slot reused, different generation.
        assert_eq!(first.slot().index(), second.slot().index());
        assert_ne!(first, second);
        assert!(reg.get(first).is_none());
        assert_eq!(reg.get(second), Some(&2));
        assert!(reg.remove(first).is_none());
    }

    #[test]
    fn test_iteration_skips_removed() {
        let mut reg: Registry<ObjectId, u32> = Registry::new();
        let keys: Vec<_> = (0..5).map(|i| reg.insert(i)).collect();
        reg.remove(keys[1]);
        reg.remove(keys[3]);

        let values: Vec<u32> = reg.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![0, 2, 4]);
        assert_eq!(reg.keys(), vec![keys[0], keys[2], keys[4]]);
    }

    #[test]
    fn test_insert_with_sees_own_handle() {
        let mut reg: Registry<JointId, JointId> = Registry::new();
        let key = reg.insert_with(|k| k);
        assert_eq!(reg.get(key), Some(&key));
    }

    #[test]
    fn test_user_data_roundtrip() {
        let mut reg: Registry<GeomId, ()> = Registry::new();
        for _ in 0..3 {
            let k = reg.insert(());
            reg.remove(k);
        }
        let key = reg.insert(());
        assert_eq!(GeomId::from_user_data(key.to_user_data()), key);
    }

    #[test]
    fn test_zero_user_data_never_resolves() {
        let mut reg: Registry<GeomId, ()> = Registry::new();
        reg.insert(());
        assert!(reg.get(GeomId::from_user_data(0)).is_none());
    }
}
