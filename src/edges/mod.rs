//! Typed adjacency over flow edges.
//!
//! `forward[(source, handle)] → targets` drives the runner's successor
//! choice; `reverse[target] → sources` and [`EdgeMap::reachable_before`]
//! serve the reference resolver.

use std::collections::{HashMap, HashSet, VecDeque};

use parking_lot::Mutex;
use std::sync::Arc;

use crate::ident::Id;
use crate::model::{Edge, EdgeKind, Handle};

#[derive(Debug, Default)]
pub struct EdgeMap {
    forward: HashMap<Id, HashMap<Handle, Vec<Id>>>,
    reverse: HashMap<Id, Vec<Id>>,
    loop_targets: HashSet<(Id, Id)>,
    reachable_cache: Mutex<HashMap<Id, Arc<HashSet<Id>>>>,
}

impl EdgeMap {
    /// Build both indices in one pass over the edges.
    pub fn build(edges: &[Edge]) -> Self {
        let mut map = EdgeMap::default();
        for edge in edges {
            map.forward
                .entry(edge.source_id)
                .or_default()
                .entry(edge.source_handle)
                .or_default()
                .push(edge.target_id);
            map.reverse.entry(edge.target_id).or_default().push(edge.source_id);
            if edge.kind == EdgeKind::Loop || edge.source_handle == Handle::Loop {
                map.loop_targets.insert((edge.source_id, edge.target_id));
            }
        }
        map
    }

    /// Targets reachable from `node` over edges labelled `handle`.
    pub fn successors(&self, node: Id, handle: Handle) -> &[Id] {
        self.forward
            .get(&node)
            .and_then(|handles| handles.get(&handle))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All direct predecessors of `node`.
    pub fn predecessors(&self, node: Id) -> &[Id] {
        self.reverse.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether the edge `source → target` is a loop-body edge.
    pub fn is_loop_edge(&self, source: Id, target: Id) -> bool {
        self.loop_targets.contains(&(source, target))
    }

    /// Every node from which `target` is reachable along any path, strictly
    /// before and excluding `target` itself. Memoised per target.
    pub fn reachable_before(&self, target: Id) -> Arc<HashSet<Id>> {
        if let Some(cached) = self.reachable_cache.lock().get(&target) {
            return Arc::clone(cached);
        }

        let mut seen = HashSet::new();
        let mut queue: VecDeque<Id> = self.predecessors(target).iter().copied().collect();
        while let Some(node) = queue.pop_front() {
            if node == target || !seen.insert(node) {
                continue;
            }
            for &pred in self.predecessors(node) {
                if !seen.contains(&pred) {
                    queue.push_back(pred);
                }
            }
        }

        let result = Arc::new(seen);
        self.reachable_cache
            .lock()
            .insert(target, Arc::clone(&result));
        result
    }
}
