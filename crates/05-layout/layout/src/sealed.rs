use std::collections::{HashMap, HashSet};

use crate::builder::LayoutNode;
use crate::error::{LayoutError, LayoutResult};
use crate::index::{LayoutIndex, LayoutTest};
use crate::jit::TypeTag;
use crate::vtable::{VTable, VTableRegistry};

/// Opaque handle into a [`SealedLayouts`]; stable for the sealed lattice's
/// lifetime.
pub type LayoutId = usize;

/// A frozen layout lattice: topological order, ancestor/descendant sets,
/// and minimal membership tests are all precomputed at seal time. There is
/// no path back to [`crate::builder::LayoutBuilder`] from here — construction
/// after sealing is a type error, not a runtime check.
pub struct SealedLayouts {
    nodes: Vec<LayoutNode>,
    by_index: HashMap<LayoutIndex, LayoutId>,
    ancestors: Vec<HashSet<LayoutId>>,
    descendants: Vec<HashSet<LayoutId>>,
    tests: Vec<LayoutTest>,
    vtables: VTableRegistry,
}

impl SealedLayouts {
    pub(crate) fn build(nodes: Vec<LayoutNode>, by_index: HashMap<LayoutIndex, LayoutId>) -> Self {
        let n = nodes.len();

        // Node ids are already in topological order: a parent's id is
        // always smaller than any of its children's, since a layout's
        // parents must exist (and therefore already have ids) before it
        // can be created.
        let mut ancestors: Vec<HashSet<LayoutId>> = vec![HashSet::new(); n];
        for id in 0..n {
            ancestors[id].insert(id);
            for &parent in &nodes[id].parents {
                let parent_ancestors = ancestors[parent].clone();
                ancestors[id].extend(parent_ancestors);
            }
        }

        let mut descendants: Vec<HashSet<LayoutId>> = vec![HashSet::new(); n];
        for id in (0..n).rev() {
            descendants[id].insert(id);
            for &child in &nodes[id].children {
                let child_descendants = descendants[child].clone();
                descendants[id].extend(child_descendants);
            }
        }

        let all_indices: Vec<u16> = nodes.iter().map(|node| node.index.as_u16()).collect();
        let tests: Vec<LayoutTest> = (0..n)
            .map(|id| compute_test(&descendants[id], &nodes, &all_indices))
            .collect();

        let mut vtables = VTableRegistry::new();
        for node in &nodes {
            if let Some(vtable) = node.vtable {
                vtables.set(node.index.family(), vtable);
            }
        }

        Self {
            nodes,
            by_index,
            ancestors,
            descendants,
            tests,
            vtables,
        }
    }

    pub fn top(&self) -> LayoutId {
        0
    }

    pub fn id_of(&self, index: LayoutIndex) -> Option<LayoutId> {
        self.by_index.get(&index).copied()
    }

    pub fn index_of(&self, id: LayoutId) -> LayoutIndex {
        self.nodes[id].index
    }

    pub fn description(&self, id: LayoutId) -> &str {
        &self.nodes[id].description
    }

    pub fn is_concrete(&self, id: LayoutId) -> bool {
        self.nodes[id].vtable.is_some()
    }

    /// The concrete vtable for `id`'s family tag.
    ///
    /// # Errors
    /// Returns [`LayoutError::AbstractLayoutHasNoVtable`] for abstract
    /// layouts (including `Top`), which exist solely for join/meet.
    pub fn vtable(&self, id: LayoutId) -> LayoutResult<&VTable> {
        if !self.is_concrete(id) {
            let index = self.index_of(id);
            return Err(LayoutError::AbstractLayoutHasNoVtable {
                family: index.family(),
                instance: index.instance(),
            });
        }
        Ok(self.vtables.get(self.index_of(id).family()).expect("is_concrete implies a registered vtable"))
    }

    pub fn test(&self, id: LayoutId) -> LayoutTest {
        self.tests[id]
    }

    /// `a ≤ b` iff `a` is a descendant of (or equal to) `b`.
    pub fn le(&self, a: LayoutId, b: LayoutId) -> bool {
        self.descendants[b].contains(&a)
    }

    /// Least common ancestor of `a` and `b`. Always exists — `Top` is a
    /// common ancestor of everything by construction.
    pub fn join(&self, a: LayoutId, b: LayoutId) -> LayoutId {
        let inter: HashSet<LayoutId> = self.ancestors[a].intersection(&self.ancestors[b]).copied().collect();
        pick_unique_extreme(&inter, &self.ancestors)
            .expect("join: lattice construction did not yield a unique least common ancestor")
    }

    /// Greatest common descendant of `a` and `b`, or `None` if they share
    /// none (the "bottom"/null layout case).
    pub fn meet(&self, a: LayoutId, b: LayoutId) -> Option<LayoutId> {
        let inter: HashSet<LayoutId> = self.descendants[a].intersection(&self.descendants[b]).copied().collect();
        if inter.is_empty() {
            return None;
        }
        Some(
            pick_unique_extreme(&inter, &self.descendants)
                .expect("meet: lattice construction did not yield a unique greatest common descendant"),
        )
    }

    pub fn append_type(&self, id: LayoutId, val_type: TypeTag) -> LayoutIndex {
        self.nodes[id].jit_hooks.append_type(self.index_of(self.top()), val_type)
    }

    pub fn remove_type(&self, id: LayoutId, key_type: TypeTag) -> LayoutIndex {
        self.nodes[id].jit_hooks.remove_type(self.index_of(self.top()), key_type)
    }

    pub fn set_type(&self, id: LayoutId, key_type: TypeTag, val_type: TypeTag) -> LayoutIndex {
        self.nodes[id].jit_hooks.set_type(self.index_of(self.top()), key_type, val_type)
    }

    pub fn elem_type(&self, id: LayoutId, key_type: TypeTag) -> (TypeTag, bool) {
        self.nodes[id].jit_hooks.elem_type(key_type)
    }

    pub fn first_last_type(&self, id: LayoutId, is_first: bool, is_key: bool) -> (TypeTag, bool) {
        self.nodes[id].jit_hooks.first_last_type(is_first, is_key)
    }

    pub fn iter_pos_type(&self, id: LayoutId, pos_type: TypeTag, is_key: bool) -> TypeTag {
        self.nodes[id].jit_hooks.iter_pos_type(pos_type, is_key)
    }
}

/// Finds the element of `candidates` whose own closure (ancestors for
/// `join`, descendants for `meet`) contains every other candidate — the
/// unique most-specific member of the intersection.
fn pick_unique_extreme(candidates: &HashSet<LayoutId>, closures: &[HashSet<LayoutId>]) -> Option<LayoutId> {
    candidates
        .iter()
        .copied()
        .find(|&x| candidates.iter().all(|y| closures[x].contains(y)))
}

fn compute_test(descendants: &HashSet<LayoutId>, nodes: &[LayoutNode], all_indices: &[u16]) -> LayoutTest {
    let descendant_indices: HashSet<u16> = descendants.iter().map(|&id| nodes[id].index.as_u16()).collect();
    let eq_base = *descendant_indices.iter().next().expect("a layout is always its own descendant");

    let mut mask: u16 = 0xFFFF;
    for bit in (0..16).rev() {
        let bitmask = 1u16 << bit;
        let candidate_mask = mask & !bitmask;
        let candidate_eq = eq_base & candidate_mask;
        let exact = all_indices
            .iter()
            .all(|&idx| (idx & candidate_mask == candidate_eq) == descendant_indices.contains(&idx));
        if exact {
            mask = candidate_mask;
        }
    }
    LayoutTest {
        mask,
        eq: eq_base & mask,
    }
}
