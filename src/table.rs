use std::mem;

use crate::memory::grow_capacity;
use crate::objects::object_string::ObjectString;
use crate::value::{is_none, make_bool_value, make_none_value, Value};

const TABLE_MAX_LOAD: f64 = 0.75;

// Keys are interned string pointers, so identity comparison is content
// comparison. A tombstone is key == null with value Bool(true); a slot is
// only truly empty when key == null *and* value is none.
#[derive(Clone, Copy)]
struct Node {
    key: *mut ObjectString,
    value: Value,
}

impl Node {
    fn empty() -> Node {
        Node {
            key: std::ptr::null_mut(),
            value: make_none_value(),
        }
    }
}

/// Open-addressed hash table with linear probing, shared by the string
/// intern set, globals, class method tables, and instance fields.
pub struct Table {
    num_elems: usize,
    nodes: Vec<Node>,
}

fn find_insertion_slot(nodes: &[Node], key: *mut ObjectString) -> Option<usize> {
    let capacity = nodes.len();
    let mut index = unsafe { (*key).hash } as usize % capacity;
    let mut tombstone: Option<usize> = None;
    for _ in 0..capacity {
        let node = &nodes[index];
        if node.key == key {
            return Some(index);
        }
        if node.key.is_null() {
            if is_none(&node.value) {
                return Some(tombstone.unwrap_or(index));
            }
            if tombstone.is_none() {
                tombstone = Some(index);
            }
        }
        index = (index + 1) % capacity;
    }
    tombstone
}

impl Table {
    pub fn new() -> Table {
        Table {
            num_elems: 0,
            nodes: vec![],
        }
    }

    pub fn len(&self) -> usize {
        self.num_elems
    }

    pub fn is_empty(&self) -> bool {
        self.num_elems == 0
    }

    fn resize(&mut self, new_capacity: usize) {
        let mut new_nodes = vec![Node::empty(); new_capacity];
        self.num_elems = 0;
        for node in &self.nodes {
            if node.key.is_null() {
                continue;
            }
            if let Some(slot) = find_insertion_slot(&new_nodes, node.key) {
                new_nodes[slot] = *node;
                self.num_elems += 1;
            }
        }
        self.nodes = new_nodes;
    }

    /// Returns true iff the key was not present before.
    pub fn insert(&mut self, key: *mut ObjectString, value: Value) -> bool {
        if (self.num_elems + 1) as f64 > self.nodes.len() as f64 * TABLE_MAX_LOAD {
            let new_capacity = grow_capacity(self.nodes.len());
            self.resize(new_capacity);
        }

        let Some(slot) = find_insertion_slot(&self.nodes, key) else {
            return false;
        };
        let node = &mut self.nodes[slot];
        let is_new_key = node.key.is_null();
        // Reusing a tombstone does not change the element count.
        if is_new_key && is_none(&node.value) {
            self.num_elems += 1;
        }

        node.key = key;
        node.value = value;
        is_new_key
    }

    pub fn get(&self, key: *mut ObjectString) -> Option<Value> {
        if self.nodes.is_empty() {
            return None;
        }
        let slot = find_insertion_slot(&self.nodes, key)?;
        let node = &self.nodes[slot];
        if node.key.is_null() {
            return None;
        }
        Some(node.value)
    }

    /// Tombstones the entry so probe chains stay intact. Returns whether the
    /// key was present.
    pub fn delete(&mut self, key: *mut ObjectString) -> bool {
        if self.nodes.is_empty() {
            return false;
        }
        let Some(slot) = find_insertion_slot(&self.nodes, key) else {
            return false;
        };
        let node = &mut self.nodes[slot];
        if node.key.is_null() {
            return false;
        }
        node.key = std::ptr::null_mut();
        node.value = make_bool_value(true);
        true
    }

    /// Content lookup for the intern set: resolves hash collisions by
    /// comparing length, hash, and bytes.
    pub fn find_str(&self, content: &str, hash: u32) -> Option<*mut ObjectString> {
        if self.nodes.is_empty() {
            return None;
        }
        let capacity = self.nodes.len();
        let mut index = hash as usize % capacity;
        for _ in 0..capacity {
            let node = &self.nodes[index];
            if node.key.is_null() {
                if is_none(&node.value) {
                    return None;
                }
            } else {
                let key = unsafe { &*node.key };
                if key.content.len() == content.len()
                    && key.hash == hash
                    && key.content == content
                {
                    return Some(node.key);
                }
            }
            index = (index + 1) % capacity;
        }
        None
    }

    /// Copies every live entry into `to`; later inserts there may override.
    pub fn add_all(&self, to: &mut Table) {
        for (key, value) in self.iter() {
            to.insert(key, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (*mut ObjectString, Value)> + '_ {
        self.nodes
            .iter()
            .filter(|node| !node.key.is_null())
            .map(|node| (node.key, node.value))
    }

    /// Drops entries whose key did not survive marking. Run on the intern
    /// set right before the sweep so it never keeps a string alive.
    pub fn remove_white(&mut self) {
        for node in &mut self.nodes {
            if node.key.is_null() {
                continue;
            }
            if !unsafe { (*node.key).object.is_marked } {
                node.key = std::ptr::null_mut();
                node.value = make_bool_value(true);
            }
        }
    }

    pub fn byte_size(&self) -> usize {
        self.nodes.capacity() * mem::size_of::<Node>()
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::object_manager::ObjectManager;
    use crate::objects::object_string::hash_string;
    use crate::value::{as_number, make_number_value};

    fn alloc_key(manager: &mut ObjectManager, content: &str) -> *mut ObjectString {
        manager.alloc_string(content, hash_string(content))
    }

    #[test]
    fn insert_reports_new_keys_and_updates() {
        let mut manager = ObjectManager::new();
        let mut table = Table::new();
        let key = alloc_key(&mut manager, "answer");

        assert!(table.insert(key, make_number_value(41.0)));
        assert!(!table.insert(key, make_number_value(42.0)));
        assert_eq!(table.len(), 1);

        let value = table.get(key).expect("key should be present");
        assert_eq!(as_number(&value), 42.0);
    }

    #[test]
    fn get_on_missing_and_empty_tables() {
        let mut manager = ObjectManager::new();
        let mut table = Table::new();
        let present = alloc_key(&mut manager, "present");
        let missing = alloc_key(&mut manager, "missing");

        assert!(table.get(present).is_none());
        table.insert(present, make_number_value(1.0));
        assert!(table.get(present).is_some());
        assert!(table.get(missing).is_none());
    }

    #[test]
    fn delete_leaves_probe_chains_usable() {
        let mut manager = ObjectManager::new();
        let mut table = Table::new();
        let keys: Vec<_> = (0..32)
            .map(|index| alloc_key(&mut manager, &format!("key{}", index)))
            .collect();
        for (index, key) in keys.iter().enumerate() {
            table.insert(*key, make_number_value(index as f64));
        }

        assert!(table.delete(keys[5]));
        assert!(!table.delete(keys[5]));
        assert!(table.get(keys[5]).is_none());

        // Every other key is still reachable through any tombstones.
        for (index, key) in keys.iter().enumerate() {
            if index == 5 {
                continue;
            }
            let value = table.get(*key).expect("survivor lost");
            assert_eq!(as_number(&value), index as f64);
        }

        // Reinsert lands back in the table and counts as a new key.
        assert!(table.insert(keys[5], make_number_value(99.0)));
        assert_eq!(as_number(&table.get(keys[5]).unwrap()), 99.0);
    }

    #[test]
    fn find_str_matches_content_not_pointer() {
        let mut manager = ObjectManager::new();
        let mut table = Table::new();
        let key = alloc_key(&mut manager, "needle");
        table.insert(key, make_none_value());

        let found = table.find_str("needle", hash_string("needle"));
        assert_eq!(found, Some(key));
        assert!(table.find_str("nadel", hash_string("nadel")).is_none());
    }

    #[test]
    fn add_all_copies_entries() {
        let mut manager = ObjectManager::new();
        let mut from = Table::new();
        let mut to = Table::new();
        let inherited = alloc_key(&mut manager, "inherited");
        let overridden = alloc_key(&mut manager, "overridden");

        from.insert(inherited, make_number_value(1.0));
        from.insert(overridden, make_number_value(1.0));
        from.add_all(&mut to);
        to.insert(overridden, make_number_value(2.0));

        assert_eq!(as_number(&to.get(inherited).unwrap()), 1.0);
        assert_eq!(as_number(&to.get(overridden).unwrap()), 2.0);
    }

    #[test]
    fn remove_white_drops_unmarked_keys() {
        let mut manager = ObjectManager::new();
        let mut table = Table::new();
        let kept = alloc_key(&mut manager, "kept");
        let dropped = alloc_key(&mut manager, "dropped");
        table.insert(kept, make_none_value());
        table.insert(dropped, make_none_value());

        unsafe {
            (*kept).object.is_marked = true;
        }
        table.remove_white();

        assert_eq!(table.find_str("kept", hash_string("kept")), Some(kept));
        assert!(table
            .find_str("dropped", hash_string("dropped"))
            .is_none());
    }
}
