use rustc_hash::FxHashMap;

use crate::InternKey;

/// Append-only table assigning a stable key to each distinct item.
#[derive(Clone, Debug)]
pub struct InternTable<T: Clone + Eq + std::hash::Hash, Key: InternKey = usize> {
    items: Vec<T>,
    item_map: FxHashMap<T, Key>,
}

impl<T, K> Default for InternTable<T, K>
where
    T: Clone + Eq + std::hash::Hash,
    K: InternKey,
{
    fn default() -> Self {
        Self {
            items: Vec::new(),
            item_map: FxHashMap::default(),
        }
    }
}

impl<T: Clone + Eq + std::hash::Hash, Key: InternKey> InternTable<T, Key> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, item: T) -> Key {
        if let Some(&idx) = self.item_map.get(&item) {
            return idx;
        }
        let idx = Key::from(self.items.len());
        self.items.push(item.clone());
        self.item_map.insert(item, idx);
        idx
    }

    /// Find the key of an already interned item without inserting it.
    pub fn lookup(&self, item: &T) -> Option<Key> {
        self.item_map.get(item).copied()
    }

    pub fn resolve(&self, idx: Key) -> Option<&T> {
        self.items.get(idx.into())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Key, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(|(idx, item)| (Key::from(idx), item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_returns_stable_keys() {
        let mut table: InternTable<&str> = InternTable::new();
        let a = table.intern("a");
        let b = table.intern("b");
        assert_ne!(a, b);
        assert_eq!(table.intern("a"), a);
        assert_eq!(table.len(), 2);
        assert_eq!(table.resolve(b), Some(&"b"));
        assert_eq!(table.lookup(&"c"), None);
    }
}
