//! One rotation of the triple index: a three-level clone-on-write map.
//!
//! The second and third levels are shared through `Arc`; an update
//! copies only the path from the root to the touched leaf, so sibling
//! sub-trees are shared between index versions by reference count.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use umbra_types::Value;

/// Per-leaf statement metadata.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StmtMeta {
    /// Number of asserted copies of this triple.
    pub count: u64,
    /// Transaction id at which the leaf was created.
    pub t: u64,
    /// Per-graph statement id assigned at first assertion.
    pub id: u64,
}

pub type Leaves = HashMap<Value, StmtMeta>;
pub type Middle = HashMap<Value, Arc<Leaves>>;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Index {
    root: HashMap<Value, Arc<Middle>>,
}

impl Index {
    pub fn get(&self, a: &Value, b: &Value, c: &Value) -> Option<&StmtMeta> {
        self.root.get(a)?.get(b)?.get(c)
    }

    pub fn submap(&self, a: &Value) -> Option<&Arc<Middle>> {
        self.root.get(a)
    }

    pub fn get2(&self, a: &Value, b: &Value) -> Option<&Leaves> {
        Some(self.root.get(a)?.get(b)?.as_ref())
    }

    pub fn top(&self) -> impl Iterator<Item = (&Value, &Arc<Middle>)> {
        self.root.iter()
    }

    /// Number of distinct first-level keys.
    pub fn len(&self) -> usize {
        self.root.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Distinct leaves under `a`, ignoring multiplicity.
    pub fn count1(&self, a: &Value) -> u64 {
        self.root
            .get(a)
            .map(|mid| mid.values().map(|leaves| leaves.len() as u64).sum())
            .unwrap_or(0)
    }

    /// Distinct leaves under `a`/`b`, ignoring multiplicity.
    pub fn count2(&self, a: &Value, b: &Value) -> u64 {
        self.get2(a, b).map(|leaves| leaves.len() as u64).unwrap_or(0)
    }

    /// Adds one copy of `(a, b, c)`. Returns the new index and whether
    /// the leaf was freshly inserted (`false` means the count was
    /// incremented on an existing leaf, keeping its original `t`/`id`).
    pub fn add(&self, a: &Value, b: &Value, c: &Value, tx: u64, id: u64) -> (Index, bool) {
        let mut root = self.root.clone();
        let middle = Arc::make_mut(root.entry(a.clone()).or_default());
        let leaves = Arc::make_mut(middle.entry(b.clone()).or_default());
        let fresh = match leaves.entry(c.clone()) {
            Entry::Occupied(mut leaf) => {
                leaf.get_mut().count += 1;
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(StmtMeta { count: 1, t: tx, id });
                true
            }
        };
        (Index { root }, fresh)
    }

    /// Removes one copy of `(a, b, c)`. `None` means the leaf is absent
    /// and the index is unchanged. The boolean is true when the leaf
    /// itself was removed (count reached zero); empty interior maps are
    /// pruned all the way up.
    pub fn delete(&self, a: &Value, b: &Value, c: &Value) -> Option<(Index, bool)> {
        let meta = *self.get(a, b, c)?;
        let mut root = self.root.clone();
        let Some(middle_arc) = root.get_mut(a) else {
            return None;
        };
        let middle = Arc::make_mut(middle_arc);
        if meta.count > 1 {
            if let Some(leaves_arc) = middle.get_mut(b) {
                if let Some(leaf) = Arc::make_mut(leaves_arc).get_mut(c) {
                    leaf.count -= 1;
                }
            }
            return Some((Index { root }, false));
        }
        let prune_middle = match middle.get_mut(b) {
            Some(leaves_arc) => {
                let leaves = Arc::make_mut(leaves_arc);
                leaves.remove(c);
                leaves.is_empty()
            }
            None => false,
        };
        if prune_middle {
            middle.remove(b);
        }
        if middle.is_empty() {
            root.remove(a);
        }
        Some((Index { root }, true))
    }
}
