//! A Bounding Volume Hierarchy of proxies with stable ids,
//! used by the broad phase to find overlapping shapes.

use crate::math::Aabb;

use std::cmp::Ordering;

//
// Internal types
//

#[derive(Clone, Copy, Debug)]
struct Node {
    aabb: Aabb,
    parent: Option<usize>,
    kind: NodeKind,
}

#[derive(Clone, Copy, Debug)]
enum NodeKind {
    Branch { left: usize, right: usize },
    Leaf { proxy_id: u32 },
}

#[derive(Clone, Copy, Debug)]
struct Proxy {
    aabb: Aabb,
    category_bits: u64,
    user_data: u64,
    // node holding this proxy, None until the proxy has been inserted
    leaf: Option<usize>,
}

const DEAD_PROXY_ERR: &str = "Accessed a proxy that was destroyed or never created";

//
// Tree itself
//

/// A binary AABB tree over proxies addressed by stable integer ids.
///
/// Proxies are inserted incrementally, moves refit the ancestors of the moved leaf,
/// and removals mark the tree for a full rebuild which happens on the next call to
/// [`rebuild_if_needed`][Self::rebuild_if_needed] or [`rebuild`][Self::rebuild].
/// Queries must not be made while a rebuild is pending.
///
/// Inserts and refits keep queries correct but degrade the hierarchy over time.
/// [`is_dirty`][Self::is_dirty] reports whether anything changed since the last build.
#[derive(Clone, Debug, Default)]
pub struct DynamicTree {
    nodes: Vec<Node>,
    proxies: Vec<Option<Proxy>>,
    free_proxies: Vec<u32>,
    proxy_count: usize,
    needs_rebuild: bool,
    dirty: bool,
}

impl DynamicTree {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn proxy_count(&self) -> usize {
        self.proxy_count
    }

    #[inline]
    pub fn needs_rebuild(&self) -> bool {
        self.needs_rebuild
    }

    /// Whether any proxy was created, moved, enlarged or destroyed since the last build.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Add a proxy to the tree, returning its id.
    /// Ids of destroyed proxies are reused.
    pub fn create_proxy(&mut self, aabb: Aabb, category_bits: u64, user_data: u64) -> u32 {
        debug_assert!(aabb.is_valid(), "invalid proxy AABB {aabb:?}");
        let proxy = Proxy {
            aabb,
            category_bits,
            user_data,
            leaf: None,
        };
        let proxy_id = match self.free_proxies.pop() {
            Some(id) => {
                self.proxies[id as usize] = Some(proxy);
                id
            }
            None => {
                self.proxies.push(Some(proxy));
                (self.proxies.len() - 1) as u32
            }
        };
        self.proxy_count += 1;
        self.dirty = true;

        if !self.needs_rebuild {
            self.insert_leaf(proxy_id);
        }
        proxy_id
    }

    pub fn destroy_proxy(&mut self, proxy_id: u32) {
        let slot = &mut self.proxies[proxy_id as usize];
        assert!(slot.is_some(), "{}", DEAD_PROXY_ERR);
        *slot = None;
        self.free_proxies.push(proxy_id);
        self.proxy_count -= 1;
        self.needs_rebuild = true;
        self.dirty = true;
    }

    /// Replace a proxy's AABB, refitting every ancestor to the new bounds.
    pub fn move_proxy(&mut self, proxy_id: u32, aabb: Aabb) {
        debug_assert!(aabb.is_valid(), "invalid proxy AABB {aabb:?}");
        let proxy = self.proxy_mut(proxy_id);
        proxy.aabb = aabb;
        let leaf = proxy.leaf;
        self.dirty = true;
        if self.needs_rebuild {
            return;
        }
        if let Some(leaf) = leaf {
            self.nodes[leaf].aabb = aabb;
            let mut curr = self.nodes[leaf].parent;
            while let Some(idx) = curr {
                if let NodeKind::Branch { left, right } = self.nodes[idx].kind {
                    self.nodes[idx].aabb = self.nodes[left].aabb.union(&self.nodes[right].aabb);
                }
                curr = self.nodes[idx].parent;
            }
        }
    }

    /// Grow a proxy's AABB. Ancestors are only enlarged, never shrunk,
    /// so the walk stops at the first ancestor that already contains the new bounds.
    pub fn enlarge_proxy(&mut self, proxy_id: u32, aabb: Aabb) {
        debug_assert!(aabb.is_valid(), "invalid proxy AABB {aabb:?}");
        let proxy = self.proxy_mut(proxy_id);
        proxy.aabb = aabb;
        let leaf = proxy.leaf;
        self.dirty = true;
        if self.needs_rebuild {
            return;
        }
        if let Some(leaf) = leaf {
            self.nodes[leaf].aabb = aabb;
            let mut curr = self.nodes[leaf].parent;
            while let Some(idx) = curr {
                if self.nodes[idx].aabb.contains(&aabb) {
                    break;
                }
                self.nodes[idx].aabb = self.nodes[idx].aabb.union(&aabb);
                curr = self.nodes[idx].parent;
            }
        }
    }

    #[inline]
    pub fn get_aabb(&self, proxy_id: u32) -> Aabb {
        self.proxy(proxy_id).aabb
    }

    #[inline]
    pub fn get_user_data(&self, proxy_id: u32) -> u64 {
        self.proxy(proxy_id).user_data
    }

    #[inline]
    pub fn contains_proxy(&self, proxy_id: u32) -> bool {
        matches!(self.proxies.get(proxy_id as usize), Some(Some(_)))
    }

    #[inline]
    fn proxy(&self, proxy_id: u32) -> &Proxy {
        self.proxies[proxy_id as usize]
            .as_ref()
            .expect(DEAD_PROXY_ERR)
    }

    #[inline]
    fn proxy_mut(&mut self, proxy_id: u32) -> &mut Proxy {
        self.proxies[proxy_id as usize]
            .as_mut()
            .expect(DEAD_PROXY_ERR)
    }

    /// Call `callback` with the id and user data of every proxy whose AABB overlaps `aabb`
    /// and whose category bits intersect `mask_bits`.
    /// The traversal stops early if the callback returns `false`.
    ///
    /// Takes `&self` and uses no shared scratch space,
    /// so any number of threads can query the same tree at once.
    pub fn query(&self, aabb: Aabb, mask_bits: u64, mut callback: impl FnMut(u32, u64) -> bool) {
        debug_assert!(
            !self.needs_rebuild,
            "tree queried while a rebuild is pending"
        );
        if self.nodes.is_empty() {
            return;
        }

        let mut stack: Vec<usize> = Vec::with_capacity(32);
        stack.push(0);
        while let Some(node_idx) = stack.pop() {
            let node = &self.nodes[node_idx];
            if !node.aabb.overlaps(&aabb) {
                continue;
            }
            match node.kind {
                NodeKind::Branch { left, right } => {
                    // push right first so that the left subtree is visited first
                    stack.push(right);
                    stack.push(left);
                }
                NodeKind::Leaf { proxy_id } => {
                    let proxy = self.proxy(proxy_id);
                    if proxy.category_bits & mask_bits != 0 && !callback(proxy_id, proxy.user_data)
                    {
                        return;
                    }
                }
            }
        }
    }

    /// Rebuild the hierarchy if proxies were removed since the last build.
    pub fn rebuild_if_needed(&mut self) {
        if self.needs_rebuild {
            self.rebuild();
        }
    }

    /// Rebuild the whole hierarchy top-down from the live proxies,
    /// splitting each range at the median along its longest axis.
    ///
    /// The result only depends on the proxies' ids and bounds.
    pub fn rebuild(&mut self) {
        let _span = tracy_span!("rebuild tree", "rebuild");

        self.nodes.clear();
        let mut ids: Vec<u32> = Vec::with_capacity(self.proxy_count);
        for (id, proxy) in self.proxies.iter_mut().enumerate() {
            if let Some(proxy) = proxy {
                proxy.leaf = None;
                ids.push(id as u32);
            }
        }
        if !ids.is_empty() {
            self.build_range(&mut ids, None);
        }
        self.needs_rebuild = false;
        self.dirty = false;
    }

    fn build_range(&mut self, ids: &mut [u32], parent: Option<usize>) -> usize {
        let node_idx = self.nodes.len();
        if let [proxy_id] = ids {
            let proxy = self.proxy_mut(*proxy_id);
            proxy.leaf = Some(node_idx);
            let aabb = proxy.aabb;
            self.nodes.push(Node {
                aabb,
                parent,
                kind: NodeKind::Leaf {
                    proxy_id: *proxy_id,
                },
            });
            return node_idx;
        }

        // placeholder, children are filled in after recursing
        self.nodes.push(Node {
            aabb: Aabb::zero(),
            parent,
            kind: NodeKind::Branch { left: 0, right: 0 },
        });

        let proxies = &self.proxies;
        let center = |id: u32| match &proxies[id as usize] {
            Some(p) => p.aabb.center(),
            None => unreachable!("{}", DEAD_PROXY_ERR),
        };
        let first = center(ids[0]);
        let (c_min, c_max) = ids.iter().fold((first, first), |(lo, hi), &id| {
            let c = center(id);
            (lo.min_by_component(c), hi.max_by_component(c))
        });
        let split_x = (c_max.x - c_min.x) >= (c_max.y - c_min.y);
        let mid = ids.len() / 2;
        ids.select_nth_unstable_by(mid, |&a, &b| {
            let (ca, cb) = (center(a), center(b));
            let ord = if split_x {
                ca.x.partial_cmp(&cb.x)
            } else {
                ca.y.partial_cmp(&cb.y)
            };
            ord.unwrap_or(Ordering::Equal).then(a.cmp(&b))
        });

        let (left_ids, right_ids) = ids.split_at_mut(mid);
        let left = self.build_range(left_ids, Some(node_idx));
        let right = self.build_range(right_ids, Some(node_idx));
        self.nodes[node_idx].aabb = self.nodes[left].aabb.union(&self.nodes[right].aabb);
        self.nodes[node_idx].kind = NodeKind::Branch { left, right };
        node_idx
    }

    fn insert_leaf(&mut self, proxy_id: u32) {
        let aabb = self.proxy(proxy_id).aabb;
        let new_node = Node {
            aabb,
            parent: None,
            kind: NodeKind::Leaf { proxy_id },
        };

        if self.nodes.is_empty() {
            self.nodes.push(new_node);
            self.proxy_mut(proxy_id).leaf = Some(0);
            return;
        }

        // traverse the tree and find a nice spot to put the new thing
        let mut curr_node_idx = 0;
        loop {
            let curr_node = self.nodes[curr_node_idx];
            match curr_node.kind {
                NodeKind::Branch { left, right } => {
                    // every branch on the way down will contain the new leaf
                    self.nodes[curr_node_idx].aabb = curr_node.aabb.union(&aabb);

                    // recurse down whichever path would create the smaller box
                    let left_union = aabb.union(&self.nodes[left].aabb);
                    let right_union = aabb.union(&self.nodes[right].aabb);
                    curr_node_idx = if left_union.perimeter() <= right_union.perimeter() {
                        left
                    } else {
                        right
                    };
                }
                NodeKind::Leaf {
                    proxy_id: old_proxy,
                } => {
                    // add a branch where this leaf was and push the leaf to the end,
                    // paired with the new leaf we're currently adding
                    let old_idx = self.nodes.len();
                    self.nodes.push(Node {
                        parent: Some(curr_node_idx),
                        ..curr_node
                    });
                    let new_idx = self.nodes.len();
                    self.nodes.push(Node {
                        parent: Some(curr_node_idx),
                        ..new_node
                    });
                    self.nodes[curr_node_idx] = Node {
                        aabb: curr_node.aabb.union(&aabb),
                        parent: curr_node.parent,
                        kind: NodeKind::Branch {
                            left: old_idx,
                            right: new_idx,
                        },
                    };
                    self.proxy_mut(old_proxy).leaf = Some(old_idx);
                    self.proxy_mut(proxy_id).leaf = Some(new_idx);
                    return;
                }
            }
        }
    }

    /// Number of nodes whose bounds overlap `aabb`, which is what a query has to visit.
    #[cfg(test)]
    fn overlapping_node_count(&self, aabb: Aabb) -> usize {
        self.nodes.iter().filter(|n| n.aabb.overlaps(&aabb)).count()
    }

    /// Height of the tree, zero for a single leaf.
    pub fn height(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }
        let mut max_depth = 0;
        let mut stack = vec![(0_usize, 0_usize)];
        while let Some((idx, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            if let NodeKind::Branch { left, right } = self.nodes[idx].kind {
                stack.push((left, depth + 1));
                stack.push((right, depth + 1));
            }
        }
        max_depth
    }

    /// Check structural invariants, panicking on the first violation.
    /// Skipped when a rebuild is pending since the structure is stale by definition.
    pub fn validate(&self) {
        if self.needs_rebuild || self.nodes.is_empty() {
            return;
        }
        assert!(self.nodes[0].parent.is_none(), "root has a parent");
        let mut leaf_count = 0;
        let mut stack = vec![0_usize];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            match node.kind {
                NodeKind::Branch { left, right } => {
                    for child in [left, right] {
                        assert_eq!(self.nodes[child].parent, Some(idx), "broken parent link");
                        assert!(
                            node.aabb.contains(&self.nodes[child].aabb),
                            "branch does not contain its child"
                        );
                        stack.push(child);
                    }
                }
                NodeKind::Leaf { proxy_id } => {
                    assert_eq!(self.proxy(proxy_id).leaf, Some(idx), "stale leaf index");
                    assert_eq!(self.proxy(proxy_id).aabb, node.aabb, "stale leaf bounds");
                    leaf_count += 1;
                }
            }
        }
        assert_eq!(leaf_count, self.proxy_count, "leaf count mismatch");
    }
}

//
// tests
//
