//! Ordered collection with key lookup.

use std::fmt;
use std::hash::Hash;

use indexmap::map::Entry;
use indexmap::{Equivalent, IndexMap};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An entity carrying its own natural key (hostname, tag, client id...).
pub trait Keyed {
    type Key: Hash + Eq + Clone + fmt::Debug;

    fn key(&self) -> Self::Key;
}

/// Insertion-ordered list of [`Keyed`] entities, unique by key.
///
/// Serialized as a plain sequence. Decoding rebuilds the index; a repeated
/// key keeps the position of its first occurrence and the value of its last.
pub struct KeyedList<V: Keyed> {
    entries: IndexMap<V::Key, V>,
}

impl<V: Keyed> KeyedList<V> {
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Return the entity for `key`, appending `make()` if there is none.
    pub fn ensure_with(&mut self, key: V::Key, make: impl FnOnce() -> V) -> &mut V {
        self.entries.entry(key).or_insert_with(make)
    }

    /// Insert `value`, overwriting an existing entity with the same key in place.
    pub fn upsert(&mut self, value: V) -> &mut V {
        match self.entries.entry(value.key()) {
            Entry::Occupied(occupied) => {
                let slot = occupied.into_mut();
                *slot = value;
                slot
            }
            Entry::Vacant(vacant) => vacant.insert(value),
        }
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        Q: ?Sized + Hash + Equivalent<V::Key>,
    {
        self.entries.get(key)
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        Q: ?Sized + Hash + Equivalent<V::Key>,
    {
        self.entries.get_mut(key)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        Q: ?Sized + Hash + Equivalent<V::Key>,
    {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &V> {
        self.entries.values()
    }

    pub fn first(&self) -> Option<&V> {
        self.entries.first().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Keyed> Default for KeyedList<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Keyed + Clone> Clone for KeyedList<V> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<V: Keyed + fmt::Debug> fmt::Debug for KeyedList<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.values()).finish()
    }
}

impl<V: Keyed + PartialEq> PartialEq for KeyedList<V> {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self.entries.values().eq(other.entries.values())
    }
}

impl<V: Keyed> FromIterator<V> for KeyedList<V> {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        let mut list = Self::new();
        for value in iter {
            list.upsert(value);
        }
        list
    }
}

impl<V: Keyed + Serialize> Serialize for KeyedList<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.entries.values())
    }
}

impl<'de, V: Keyed + Deserialize<'de>> Deserialize<'de> for KeyedList<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<V>::deserialize(deserializer).map(|items| items.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Tagged {
        tag: String,
        value: u32,
    }

    impl Keyed for Tagged {
        type Key = String;

        fn key(&self) -> String {
            self.tag.clone()
        }
    }

    fn tagged(tag: &str, value: u32) -> Tagged {
        Tagged {
            tag: tag.to_string(),
            value,
        }
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let mut list = KeyedList::new();
        list.ensure_with("a".to_string(), || tagged("a", 1)).value = 7;
        let again = list.ensure_with("a".to_string(), || tagged("a", 2));
        assert_eq!(again.value, 7);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_upsert_overwrites_in_place() {
        let mut list: KeyedList<Tagged> = [tagged("a", 1), tagged("b", 2)].into_iter().collect();
        list.upsert(tagged("a", 3));
        let order: Vec<_> = list.iter().map(|t| (t.tag.as_str(), t.value)).collect();
        assert_eq!(order, vec![("a", 3), ("b", 2)]);
    }

    #[test]
    fn test_decoding_rebuilds_index() {
        let list: KeyedList<Tagged> = serde_json::from_str(
            r#"[{"tag":"x","value":1},{"tag":"y","value":2},{"tag":"x","value":5}]"#,
        )
        .unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.get("x").map(|t| t.value), Some(5));
        assert_eq!(list.first().map(|t| t.tag.as_str()), Some("x"));

        let json = serde_json::to_string(&list).unwrap();
        assert_eq!(json, r#"[{"tag":"x","value":5},{"tag":"y","value":2}]"#);
    }
}
