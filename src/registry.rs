//! Dense 1-based id allocation for shapes, materials and files.

use std::collections::HashMap;
use std::hash::Hash;

/// Ordered id table. Ids start at 1 and follow first registration.
#[derive(Debug, Clone)]
pub struct Registry<K> {
    entries: Vec<K>,
    ids: HashMap<K, u32>,
}

impl<K> Default for Registry<K> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            ids: HashMap::new(),
        }
    }
}

impl<K: Clone + Eq + Hash> Registry<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id of `key`, allocating the next one on first sight.
    pub fn assign(&mut self, key: K) -> u32 {
        if let Some(&id) = self.ids.get(&key) {
            return id;
        }
        self.entries.push(key.clone());
        let id = self.entries.len() as u32;
        self.ids.insert(key, id);
        id
    }

    pub fn id(&self, key: &K) -> Option<u32> {
        self.ids.get(key).copied()
    }

    pub fn get(&self, id: u32) -> Option<&K> {
        id.checked_sub(1).and_then(|i| self.entries.get(i as usize))
    }

    /// Entries with their ids, in id order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &K)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, key)| (i as u32 + 1, key))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_follow_first_registration() {
        let mut registry = Registry::new();
        assert_eq!(registry.assign("wood"), 1);
        assert_eq!(registry.assign("metal"), 2);
        assert_eq!(registry.assign("wood"), 1);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.id(&"metal"), Some(2));
        assert_eq!(registry.get(1), Some(&"wood"));
        assert_eq!(registry.get(0), None);

        let order: Vec<_> = registry.iter().collect();
        assert_eq!(order, vec![(1, &"wood"), (2, &"metal")]);
    }
}
