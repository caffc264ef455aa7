use std::collections::HashMap;

use crate::error::{LayoutError, LayoutResult};
use crate::index::LayoutIndex;
use crate::jit::JitHooks;
use crate::sealed::SealedLayouts;
use crate::vtable::VTable;

pub(crate) struct LayoutNode {
    pub(crate) index: LayoutIndex,
    pub(crate) description: String,
    pub(crate) parents: Vec<usize>,
    pub(crate) children: Vec<usize>,
    pub(crate) vtable: Option<VTable>,
    pub(crate) jit_hooks: JitHooks,
}

/// Unsealed construction surface for a layout lattice.
///
/// Seeds a single root `Top` layout (index `0:0`, abstract, no vtable) on
/// construction — every other layout's parent chain must eventually reach
/// it, since join always needs a common ancestor to exist.
pub struct LayoutBuilder {
    nodes: Vec<LayoutNode>,
    by_index: HashMap<LayoutIndex, usize>,
}

impl LayoutBuilder {
    pub fn new() -> Self {
        let top = LayoutIndex::new(0, 0);
        let mut by_index = HashMap::new();
        by_index.insert(top, 0);
        Self {
            nodes: vec![LayoutNode {
                index: top,
                description: "Top".to_string(),
                parents: Vec::new(),
                children: Vec::new(),
                vtable: None,
                jit_hooks: JitHooks::default(),
            }],
            by_index,
        }
    }

    pub fn top(&self) -> LayoutIndex {
        self.nodes[0].index
    }

    /// Registers a new layout. Every entry in `parents` must already exist;
    /// `vtable` is `None` for abstract layouts.
    pub fn create(
        &mut self,
        index: LayoutIndex,
        description: impl Into<String>,
        parents: &[LayoutIndex],
        vtable: Option<VTable>,
    ) -> LayoutResult<()> {
        self.create_with_hooks(index, description, parents, vtable, JitHooks::default())
    }

    /// As [`Self::create`], additionally registering JIT refinement hooks.
    pub fn create_with_hooks(
        &mut self,
        index: LayoutIndex,
        description: impl Into<String>,
        parents: &[LayoutIndex],
        vtable: Option<VTable>,
        jit_hooks: JitHooks,
    ) -> LayoutResult<()> {
        if self.by_index.contains_key(&index) {
            return Err(LayoutError::DuplicateIndex {
                family: index.family(),
                instance: index.instance(),
            });
        }
        let mut parent_ids = Vec::with_capacity(parents.len());
        for parent in parents {
            let id = self.by_index.get(parent).copied().ok_or(LayoutError::MissingParent {
                family: parent.family(),
                instance: parent.instance(),
            })?;
            parent_ids.push(id);
        }

        let new_id = self.nodes.len();
        for &parent_id in &parent_ids {
            self.nodes[parent_id].children.push(new_id);
        }
        self.nodes.push(LayoutNode {
            index,
            description: description.into(),
            parents: parent_ids,
            children: Vec::new(),
            vtable,
            jit_hooks,
        });
        self.by_index.insert(index, new_id);
        Ok(())
    }

    /// Computes topological order, ancestor/descendant sets, and minimal
    /// layout tests, then freezes the lattice against further creation.
    pub fn seal(self) -> SealedLayouts {
        SealedLayouts::build(self.nodes, self.by_index)
    }
}

impl Default for LayoutBuilder {
    fn default() -> Self {
        Self::new()
    }
}
