//! The broad phase turns proxies that moved since the last step into candidate shape pairs.
//!
//! Proxies live in one [`DynamicTree`] per body type.
//! Every proxy that is created, moved or enlarged is buffered in the move set,
//! and each pair update queries the trees with the buffered proxies in parallel.
//! Results are written into one slot per moved proxy and read back in move order,
//! so the order of the returned pairs does not depend on thread scheduling.

use super::{BodyType, DynamicTree, ProxyKey};
use crate::{key_set::KeySet, keys::ShapeKey, math::Aabb, task::TaskScheduler};

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    OnceLock,
};
use thunderdome as td;

/// Key of an unordered shape pair in the pair set.
#[inline]
pub fn shape_pair_key(a: ShapeKey, b: ShapeKey) -> u64 {
    let (a, b) = (a.slot() as u64, b.slot() as u64);
    if a < b {
        a << 32 | b
    } else {
        b << 32 | a
    }
}

/// Decides whether a pair that passed the broad phase's own checks should get a contact.
///
/// Called concurrently from worker threads during [`BroadPhase::find_new_pairs`].
pub trait PairQuery: Sync {
    fn should_create_pair(&self, shape_a: ShapeKey, shape_b: ShapeKey) -> bool;
}

impl<F> PairQuery for F
where
    F: Fn(ShapeKey, ShapeKey) -> bool + Sync,
{
    fn should_create_pair(&self, shape_a: ShapeKey, shape_b: ShapeKey) -> bool {
        self(shape_a, shape_b)
    }
}

/// A new pair of shapes whose fat AABBs overlap.
/// `shape_a` belongs to the proxy with the smaller key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MovePair {
    pub shape_a: ShapeKey,
    pub shape_b: ShapeKey,
}

/// Parameters of a pair search.
#[derive(Clone, Copy, Debug)]
pub struct PairSearch {
    /// Number of pooled pair records per moved proxy.
    pub pool_factor: usize,
    /// Minimum number of moved proxies given to one task.
    pub min_range: usize,
}

//
// Candidate pair storage
//

// Pairs found by the query of one moved proxy form a singly linked list.
// Most nodes are claimed from a shared pool with an atomic cursor,
// the rest are boxed individually once the pool runs out.
struct PairNode {
    pair: MovePair,
    next: Option<PairLink>,
}

enum PairLink {
    Pool(usize),
    Heap(Box<PairNode>),
}

struct PairPool {
    nodes: Vec<OnceLock<PairNode>>,
    cursor: AtomicUsize,
    heap_count: AtomicUsize,
}

impl PairPool {
    fn new(capacity: usize) -> Self {
        Self {
            nodes: (0..capacity).map(|_| OnceLock::new()).collect(),
            cursor: AtomicUsize::new(0),
            heap_count: AtomicUsize::new(0),
        }
    }

    fn alloc(&self, node: PairNode) -> PairLink {
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed);
        match self.nodes.get(idx) {
            Some(slot) => {
                if slot.set(node).is_err() {
                    unreachable!("pair pool slot {idx} claimed twice");
                }
                PairLink::Pool(idx)
            }
            None => {
                self.heap_count.fetch_add(1, Ordering::Relaxed);
                PairLink::Heap(Box::new(node))
            }
        }
    }
}

//
// Broad phase itself
//

#[derive(Clone, Debug, Default)]
pub struct BroadPhase {
    trees: [DynamicTree; BodyType::COUNT],
    move_set: KeySet,
    // same keys as move_set in insertion order
    move_array: Vec<ProxyKey>,
    // pairs of shapes that currently have a contact
    pair_set: KeySet,
}

impl BroadPhase {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn tree(&self, body_type: BodyType) -> &DynamicTree {
        &self.trees[body_type as usize]
    }

    pub fn proxy_count(&self) -> usize {
        self.trees.iter().map(|t| t.proxy_count()).sum()
    }

    /// Number of proxies buffered for the next pair update.
    #[inline]
    pub fn move_count(&self) -> usize {
        self.move_array.len()
    }

    #[inline]
    pub fn is_moved(&self, key: ProxyKey) -> bool {
        self.move_set.contains(key.move_set_key())
    }

    /// Create a proxy for a shape.
    ///
    /// Proxies of non-static bodies are buffered right away so they get paired on the next update.
    /// Static proxies only are if `force_pair_creation` is set.
    pub fn create_proxy(
        &mut self,
        aabb: Aabb,
        body_type: BodyType,
        category_bits: u64,
        shape: ShapeKey,
        force_pair_creation: bool,
    ) -> ProxyKey {
        let proxy_id = self.trees[body_type as usize].create_proxy(
            aabb,
            category_bits,
            shape.index().to_bits(),
        );
        let key = ProxyKey::new(proxy_id, body_type);
        if body_type != BodyType::Static || force_pair_creation {
            self.buffer_move(key);
        }
        key
    }

    pub fn destroy_proxy(&mut self, key: ProxyKey) {
        self.unbuffer_move(key);
        self.trees[key.body_type() as usize].destroy_proxy(key.proxy_id());
    }

    /// Replace a proxy's bounds and buffer it.
    pub fn move_proxy(&mut self, key: ProxyKey, aabb: Aabb) {
        self.trees[key.body_type() as usize].move_proxy(key.proxy_id(), aabb);
        self.buffer_move(key);
    }

    /// Grow a proxy's bounds and buffer it.
    pub fn enlarge_proxy(&mut self, key: ProxyKey, aabb: Aabb) {
        self.trees[key.body_type() as usize].enlarge_proxy(key.proxy_id(), aabb);
        self.buffer_move(key);
    }

    #[inline]
    pub fn fat_aabb(&self, key: ProxyKey) -> Aabb {
        self.trees[key.body_type() as usize].get_aabb(key.proxy_id())
    }

    /// Check whether the stored bounds of two proxies overlap.
    pub fn test_overlap(&self, a: ProxyKey, b: ProxyKey) -> bool {
        self.fat_aabb(a).overlaps(&self.fat_aabb(b))
    }

    pub fn buffer_move(&mut self, key: ProxyKey) {
        let already_buffered = self.move_set.add(key.move_set_key());
        if !already_buffered {
            self.move_array.push(key);
        }
    }

    fn unbuffer_move(&mut self, key: ProxyKey) {
        if self.move_set.remove(key.move_set_key()) {
            let idx = self
                .move_array
                .iter()
                .position(|k| *k == key)
                .expect("move set and move array out of sync");
            self.move_array.swap_remove(idx);
        }
    }

    /// Forget every buffered move. Called after the new pairs have been consumed.
    pub fn clear_moves(&mut self) {
        self.move_set.clear();
        self.move_array.clear();
    }

    /// Rebuild the dynamic and kinematic trees if anything in them changed since
    /// their last build. The static tree is only rebuilt after removals.
    pub fn rebuild_trees(&mut self) {
        let _span = tracy_span!("rebuild trees", "rebuild_trees");
        for (idx, tree) in self.trees.iter_mut().enumerate() {
            if idx == BodyType::Static as usize {
                tree.rebuild_if_needed();
            } else if tree.is_dirty() {
                tree.rebuild();
            }
        }
    }

    //
    // pair set
    //

    #[inline]
    pub fn contains_pair(&self, a: ShapeKey, b: ShapeKey) -> bool {
        self.pair_set.contains(shape_pair_key(a, b))
    }

    /// Returns `true` if the pair was already present.
    pub(crate) fn add_pair(&mut self, a: ShapeKey, b: ShapeKey) -> bool {
        self.pair_set.add(shape_pair_key(a, b))
    }

    /// Returns `true` if the pair was present.
    pub(crate) fn remove_pair(&mut self, a: ShapeKey, b: ShapeKey) -> bool {
        self.pair_set.remove(shape_pair_key(a, b))
    }

    #[inline]
    pub fn pair_count(&self) -> usize {
        self.pair_set.len()
    }

    //
    // pair search
    //

    /// Find all new pairs involving the proxies buffered since the last update.
    ///
    /// The queries run through `scheduler`. Returned pairs are ordered by the position
    /// of their moved proxy in the move buffer, which makes the order independent of the
    /// number of workers. The move buffer is left untouched;
    /// call [`clear_moves`][Self::clear_moves] once the pairs have been consumed.
    pub fn find_new_pairs(
        &self,
        query: &impl PairQuery,
        scheduler: &dyn TaskScheduler,
        params: PairSearch,
    ) -> Vec<MovePair> {
        let move_count = self.move_array.len();
        if move_count == 0 {
            return Vec::new();
        }
        let _span = tracy_span!("find new pairs", "find_new_pairs");
        debug_assert!(
            self.trees.iter().all(|t| !t.needs_rebuild()),
            "pair search requires rebuilt trees"
        );

        let pool = PairPool::new(params.pool_factor * move_count);
        let results: Vec<OnceLock<Option<PairLink>>> =
            (0..move_count).map(|_| OnceLock::new()).collect();

        scheduler.parallel_for(move_count, params.min_range, &|range, _worker| {
            for move_idx in range {
                let head = self.query_moved_proxy(self.move_array[move_idx], query, &pool);
                if results[move_idx].set(head).is_err() {
                    unreachable!("moved proxy {move_idx} queried twice");
                }
            }
        });

        let heap_count = pool.heap_count.load(Ordering::Relaxed);
        if heap_count > 0 {
            log::warn!(
                "pair pool of {} exhausted, {heap_count} pairs allocated individually",
                pool.nodes.len()
            );
        }

        let mut pool_nodes: Vec<Option<PairNode>> =
            pool.nodes.into_iter().map(OnceLock::into_inner).collect();
        let mut pairs = Vec::new();
        for result in results {
            let mut link = result.into_inner().flatten();
            while let Some(curr) = link {
                let node = match curr {
                    PairLink::Pool(idx) => pool_nodes[idx]
                        .take()
                        .expect("linked pair missing from the pool"),
                    PairLink::Heap(node) => *node,
                };
                pairs.push(node.pair);
                link = node.next;
            }
        }
        pairs
    }

    fn query_moved_proxy(
        &self,
        query_key: ProxyKey,
        query: &impl PairQuery,
        pool: &PairPool,
    ) -> Option<PairLink> {
        let query_type = query_key.body_type();
        let query_tree = &self.trees[query_type as usize];
        let fat_aabb = query_tree.get_aabb(query_key.proxy_id());
        let query_shape = shape_from_user_data(query_tree.get_user_data(query_key.proxy_id()));

        let mut head: Option<PairLink> = None;
        let mut visit_tree = |tree_type: BodyType| {
            self.trees[tree_type as usize].query(fat_aabb, u64::MAX, |proxy_id, user_data| {
                let proxy_key = ProxyKey::new(proxy_id, tree_type);
                if proxy_key == query_key {
                    return true;
                }
                // when both proxies moved, both queries find the pair.
                // only the one from the higher key keeps it
                if query_key < proxy_key && self.is_moved(proxy_key) {
                    return true;
                }
                let shape = shape_from_user_data(user_data);
                if self.contains_pair(shape, query_shape) {
                    return true;
                }
                let pair = if proxy_key < query_key {
                    MovePair {
                        shape_a: shape,
                        shape_b: query_shape,
                    }
                } else {
                    MovePair {
                        shape_a: query_shape,
                        shape_b: shape,
                    }
                };
                if !query.should_create_pair(pair.shape_a, pair.shape_b) {
                    return true;
                }
                head = Some(pool.alloc(PairNode {
                    pair,
                    next: head.take(),
                }));
                true
            });
        };

        // non-dynamic proxies only pair with dynamic ones
        visit_tree(BodyType::Dynamic);
        if query_type == BodyType::Dynamic {
            visit_tree(BodyType::Kinematic);
            visit_tree(BodyType::Static);
        }
        head
    }

    /// Check the move buffer and every tree. Does nothing without debug assertions.
    pub fn validate(&self) {
        if !cfg!(debug_assertions) {
            return;
        }
        assert_eq!(self.move_set.len(), self.move_array.len());
        for key in &self.move_array {
            assert!(self.move_set.contains(key.move_set_key()));
            assert!(self.trees[key.body_type() as usize].contains_proxy(key.proxy_id()));
        }
        for tree in &self.trees {
            tree.validate();
        }
    }
}

#[inline]
fn shape_from_user_data(user_data: u64) -> ShapeKey {
    match td::Index::from_bits(user_data) {
        Some(idx) => ShapeKey(idx),
        None => unreachable!("proxy user data {user_data:#x} is not a shape key"),
    }
}
