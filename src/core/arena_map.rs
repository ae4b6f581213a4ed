//! Ordered key→payload map whose storage is drawn from a [`Pool`].
//!
//! The tree is a B-tree in the style of klib's kbtree: fixed-capacity nodes,
//! keys kept contiguous inside each node, top-down preemptive splitting so an
//! insert never has to walk back up. Differences from a heap-allocated tree:
//!
//! - Nodes live in a [`PagedList`], addressed by `u32` index, so the whole
//!   tree disappears with one `clear` of the owning pool.
//! - Payloads live in a second paged list. The tree stores only the payload
//!   slot, so a slot stays valid when its key moves between nodes on a split.
//! - Node space for the worst-case split chain is reserved before the tree is
//!   touched, so running out of pool memory never leaves a half-split tree.
//!
//! # Usage
//! ```ignore
//! let mut pool = Pool::new(1 << 20, CACHE_PAGE_SIZE);
//! let mut map: ArenaMap<u64, u32> = ArenaMap::new(CACHE_PAGE_SIZE);
//! let (slot, added) = map.add(&mut pool, 42, 0)?;
//! *map.payload_mut(slot) += 1;
//! assert_eq!(map.lookup(&42), Some(slot));
//! ```

use super::plist::PagedList;
use super::pool::Pool;
use crate::error::CacheResult;

/// Minimum degree of the tree (t >= 2 for a valid B-tree).
const MIN_DEGREE: usize = 8;

/// Maximum keys per node (2t - 1)
const MAX_KEYS: usize = 2 * MIN_DEGREE - 1;

#[derive(Clone, Copy)]
struct Node<K: Copy> {
    n: u16,
    internal: bool,
    keys: [K; MAX_KEYS],
    slots: [u32; MAX_KEYS],
    children: [u32; MAX_KEYS + 1],
}

impl<K: Copy + Ord + Default> Node<K> {
    fn new(internal: bool) -> Self {
        Self {
            n: 0,
            internal,
            keys: [K::default(); MAX_KEYS],
            slots: [0; MAX_KEYS],
            children: [0; MAX_KEYS + 1],
        }
    }

    #[inline(always)]
    fn len(&self) -> usize {
        self.n as usize
    }

    #[inline(always)]
    fn is_full(&self) -> bool {
        self.len() == MAX_KEYS
    }

    /// `Ok(i)` if `keys[i] == key`, otherwise `Err(i)` with `i` the insertion point.
    #[inline(always)]
    fn search(&self, key: &K) -> Result<usize, usize> {
        self.keys[..self.len()].binary_search(key)
    }

    /// Insert at position `i` of a non-full node.
    fn insert_at(&mut self, i: usize, key: K, slot: u32) {
        let n = self.len();
        debug_assert!(n < MAX_KEYS);
        self.keys.copy_within(i..n, i + 1);
        self.slots.copy_within(i..n, i + 1);
        self.keys[i] = key;
        self.slots[i] = slot;
        self.n += 1;
    }
}

pub struct ArenaMap<K: Copy, V: Copy> {
    nodes: PagedList<Node<K>>,
    payloads: PagedList<V>,
    root: Option<u32>,
    /// Number of levels (0 for an empty tree)
    height: usize,
    n_keys: usize,
}

impl<K, V> ArenaMap<K, V>
where
    K: Ord + Copy + Default,
    V: Copy,
{
    pub fn new(page_size: usize) -> Self {
        Self {
            nodes: PagedList::new(page_size),
            payloads: PagedList::new(page_size),
            root: None,
            height: 0,
            n_keys: 0,
        }
    }

    /// Returns the number of keys in the map.
    #[inline]
    pub fn len(&self) -> usize {
        self.n_keys
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n_keys == 0
    }

    /// Payload slot stored under `key`, if present.
    pub fn lookup(&self, key: &K) -> Option<u32> {
        let mut x = self.root?;
        loop {
            let node = self.nodes.get_ref(x as usize);
            match node.search(key) {
                Ok(i) => return Some(node.slots[i]),
                Err(i) => {
                    if !node.internal {
                        return None;
                    }
                    x = node.children[i];
                }
            }
        }
    }

    /// Find `key`, or insert it with payload `value`.
    ///
    /// Returns the payload slot and whether a new entry was created. Fails
    /// only when the pool cannot supply the pages needed, in which case the
    /// map is unchanged.
    pub fn add(&mut self, pool: &mut Pool, key: K, value: V) -> CacheResult<(u32, bool)> {
        if let Some(slot) = self.lookup(&key) {
            return Ok((slot, false));
        }
        // Worst case: one split per level plus a new root.
        self.nodes.reserve(pool, self.height + 2)?;
        let slot = self.payloads.add(pool, value)? as u32;
        self.insert(key, slot);
        self.n_keys += 1;
        Ok((slot, true))
    }

    #[inline]
    pub fn payload(&self, slot: u32) -> V {
        self.payloads.get(slot as usize)
    }

    #[inline]
    pub fn payload_mut(&mut self, slot: u32) -> &mut V {
        self.payloads.get_mut(slot as usize)
    }

    /// Number of payload slots handed out since the last clear.
    #[inline]
    pub fn num_slots(&self) -> usize {
        self.payloads.len()
    }

    /// Forget every entry. The pool must be reset alongside.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.payloads.clear();
        self.root = None;
        self.height = 0;
        self.n_keys = 0;
    }

    fn alloc_node(&mut self, node: Node<K>) -> u32 {
        self.nodes.add_reserved(node) as u32
    }

    fn insert(&mut self, key: K, slot: u32) {
        let root = match self.root {
            Some(r) => r,
            None => {
                let r = self.alloc_node(Node::new(false));
                self.root = Some(r);
                self.height = 1;
                r
            }
        };

        if self.nodes.get_ref(root as usize).is_full() {
            // Root is full, grow the tree by one level
            let mut new_root = Node::new(true);
            new_root.children[0] = root;
            let new_root = self.alloc_node(new_root);
            self.split_child(new_root, 0);
            self.root = Some(new_root);
            self.height += 1;
            self.insert_nonfull(new_root, key, slot);
        } else {
            self.insert_nonfull(root, key, slot);
        }
    }

    /// Split the full child `i` of node `x`, moving its median up into `x`.
    fn split_child(&mut self, x: u32, i: usize) {
        let t = MIN_DEGREE;
        let y = self.nodes.get_ref(x as usize).children[i];
        let y_node = *self.nodes.get_ref(y as usize);

        // Upper half of y goes to z
        let mut z_node = Node::new(y_node.internal);
        z_node.keys[..t - 1].copy_from_slice(&y_node.keys[t..]);
        z_node.slots[..t - 1].copy_from_slice(&y_node.slots[t..]);
        if y_node.internal {
            z_node.children[..t].copy_from_slice(&y_node.children[t..]);
        }
        z_node.n = (t - 1) as u16;
        let z = self.alloc_node(z_node);

        self.nodes.get_mut(y as usize).n = (t - 1) as u16;

        let x_node = self.nodes.get_mut(x as usize);
        let n_x = x_node.len();
        x_node.children.copy_within(i + 1..n_x + 1, i + 2);
        x_node.children[i + 1] = z;
        x_node.keys.copy_within(i..n_x, i + 1);
        x_node.slots.copy_within(i..n_x, i + 1);
        x_node.keys[i] = y_node.keys[t - 1];
        x_node.slots[i] = y_node.slots[t - 1];
        x_node.n += 1;
    }

    fn insert_nonfull(&mut self, mut x: u32, key: K, slot: u32) {
        loop {
            let node = self.nodes.get_ref(x as usize);
            let i = match node.search(&key) {
                Ok(i) | Err(i) => i,
            };

            if !node.internal {
                self.nodes.get_mut(x as usize).insert_at(i, key, slot);
                return;
            }

            let child = node.children[i];
            if self.nodes.get_ref(child as usize).is_full() {
                self.split_child(x, i);
                let parent = self.nodes.get_ref(x as usize);
                x = if parent.keys[i] < key {
                    parent.children[i + 1]
                } else {
                    parent.children[i]
                };
            } else {
                x = child;
            }
        }
    }

    /// Visit every entry in key order.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&K, u32),
    {
        if let Some(root) = self.root {
            self.traverse_node(root, &mut f);
        }
    }

    fn traverse_node<F>(&self, x: u32, f: &mut F)
    where
        F: FnMut(&K, u32),
    {
        let node = self.nodes.get_ref(x as usize);
        for i in 0..node.len() {
            if node.internal {
                self.traverse_node(node.children[i], f);
            }
            f(&node.keys[i], node.slots[i]);
        }
        if node.internal {
            self.traverse_node(node.children[node.len()], f);
        }
    }

    /// Collect `(key, payload)` pairs in key order.
    pub fn to_vec(&self) -> Vec<(K, V)> {
        let mut result = Vec::with_capacity(self.n_keys);
        self.for_each(|k, slot| result.push((*k, self.payload(slot))));
        result
    }
}
