use std::sync::atomic::{AtomicU32, Ordering};

use rayon::prelude::*;

/// Concurrent union-find over dense `u32` vertex ids.
///
/// The core clustering phases union ε-similar core pairs from many worker
/// tasks at once, so every slot is an atomic parent pointer and all
/// updates go through compare-and-swap. Unions link the larger of two
/// roots under the smaller one, which means the root of a finished core
/// component is its minimum member, exactly the id the labeling phase
/// wants to propagate.
pub struct DisjointSetStruct {
    parents: Box<[AtomicU32]>,
}

impl DisjointSetStruct {
    /// Creates `size` singleton sets.
    ///
    /// # Examples
    ///
    /// ```
    /// use pscan::dss::DisjointSetStruct;
    ///
    /// let sets = DisjointSetStruct::new(8);
    /// sets.union(5, 3);
    /// assert_eq!(sets.find(5), 3);
    /// assert_eq!(sets.find(3), 3);
    /// ```
    pub fn new(size: usize) -> Self {
        let mut parents = Vec::with_capacity(size);

        (0..size)
            .into_par_iter()
            .map(|i| AtomicU32::new(i as u32))
            .collect_into_vec(&mut parents);

        Self {
            parents: parents.into_boxed_slice(),
        }
    }

    /// Merges the sets containing `u` and `v`.
    pub fn union(&self, u: u32, v: u32) {
        loop {
            let root_u = self.find(u);
            let root_v = self.find(v);
            if root_u == root_v {
                return;
            }

            let low = root_u.min(root_v);
            let high = root_u.max(root_v);

            // a root points to itself, so this CAS fails exactly when a
            // concurrent union re-parented `high` first; start over from
            // the then-current roots
            if self.try_set_parent(high, high, low) {
                return;
            }
        }
    }

    /// Returns the current root of `u`'s set.
    ///
    /// The walk halves the path as it goes by re-pointing every visited
    /// slot to its grandparent. Such a write may lose its CAS against a
    /// concurrent union or another find; a lost halving only means a
    /// longer walk next time, it never moves a vertex between sets.
    pub fn find(&self, u: u32) -> u32 {
        let mut current = u;
        loop {
            let parent = self.parent(current);
            if parent == current {
                return current;
            }
            let grand_parent = self.parent(parent);
            if grand_parent != parent {
                self.try_set_parent(current, parent, grand_parent);
            }
            current = grand_parent;
        }
    }

    /// True if `u` and `v` are currently in the same set.
    ///
    /// With unions still in flight the answer can be stale: two sets may
    /// merge right after they were observed as distinct. The cluster
    /// phases use this as a shortcut only, so a stale `false` costs
    /// nothing but a redundant union or similarity check.
    pub fn is_same_set(&self, u: u32, v: u32) -> bool {
        self.find(u) == self.find(v)
    }

    /// The number of elements across all sets.
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    fn parent(&self, id: u32) -> u32 {
        self.parents[id as usize].load(Ordering::Acquire)
    }

    fn try_set_parent(&self, id: u32, expected: u32, new: u32) -> bool {
        self.parents[id as usize]
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
