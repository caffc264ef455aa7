//! Overlay stack: a per-key speculative-change state machine layered over
//! the shared arena.
//!
//! Frames form an arena-of-frames (`Vec<Frame>` with parent indices) rather
//! than a linked list of boxed nodes, so popping a frame never needs to
//! walk or drop a chain — the popped frame's slot simply becomes
//! unreachable once `top` moves to its parent.

pub mod error;

use std::collections::HashMap;
use std::sync::Arc;

use arena::Arena;

pub use error::{OverlayError, OverlayResult};

/// The recorded action for one digest within a single frame.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Action {
    Add(Vec<u8>),
    Replace(Vec<u8>),
    Remove,
}

struct Frame {
    actions: HashMap<[u8; 16], Action>,
    parent: Option<usize>,
}

/// A stack of speculative change frames over one shared arena.
///
/// Never shared across processes (`spec.md` §4.D): each `OverlayStack`
/// value is owned by exactly one process's in-memory state, even though
/// the arena it eventually commits into is itself shared.
pub struct OverlayStack {
    arena: Arc<Arena>,
    frames: Vec<Frame>,
    top: Option<usize>,
}

impl OverlayStack {
    /// Builds an overlay stack with no frames pushed; reads and writes at
    /// this point must go through the arena directly via `push_stack`. A
    /// caller that wants an always-usable store without managing frames
    /// itself (e.g. `CachedStore`) should push one base frame immediately
    /// after construction.
    pub fn new(arena: Arc<Arena>) -> Self {
        Self {
            arena,
            frames: Vec::new(),
            top: None,
        }
    }

    fn require_top(&self) -> usize {
        self.top.expect("overlay operation attempted with no frame pushed")
    }

    /// Pushes a new, empty frame on top of the current one.
    pub fn push_stack(&mut self) {
        let parent = self.top;
        self.frames.push(Frame {
            actions: HashMap::new(),
            parent,
        });
        self.top = Some(self.frames.len() - 1);
        // Cache entries are not stack-qualified (`spec.md` §4.F); any cached
        // read could now be shadowed by this new frame.
        telemetry::invalidate_all();
    }

    /// Pops the current frame, discarding any uncommitted actions it held.
    ///
    /// # Panics
    /// Panics if there is no frame to pop — `spec.md` §4.D: "`pop_stack` on
    /// an empty stack is fatal."
    pub fn pop_stack(&mut self) {
        let top = self.require_top();
        self.top = self.frames[top].parent;
        telemetry::invalidate_all();
    }

    fn visible_below(&self, digest: &[u8; 16], frame_idx: usize) -> OverlayResult<bool> {
        let mut cursor = self.frames[frame_idx].parent;
        while let Some(idx) = cursor {
            match self.frames[idx].actions.get(digest) {
                Some(Action::Add(_)) | Some(Action::Replace(_)) => return Ok(true),
                Some(Action::Remove) => return Ok(false),
                None => cursor = self.frames[idx].parent,
            }
        }
        Ok(self.arena.mem(digest))
    }

    fn add_at(&mut self, frame_idx: usize, digest: [u8; 16], value: Vec<u8>) -> OverlayResult<()> {
        let next = match self.frames[frame_idx].actions.get(&digest) {
            None => {
                if self.visible_below(&digest, frame_idx)? {
                    Action::Replace(value)
                } else {
                    Action::Add(value)
                }
            }
            Some(Action::Add(_)) => Action::Add(value),
            Some(Action::Replace(_)) => Action::Replace(value),
            Some(Action::Remove) => Action::Replace(value),
        };
        self.frames[frame_idx].actions.insert(digest, next);
        Ok(())
    }

    fn remove_at(&mut self, frame_idx: usize, digest: &[u8; 16]) -> OverlayResult<()> {
        match self.frames[frame_idx].actions.get(digest) {
            None => {
                if self.visible_below(digest, frame_idx)? {
                    self.frames[frame_idx].actions.insert(*digest, Action::Remove);
                    Ok(())
                } else {
                    Err(OverlayError::RemoveOfAbsent { digest: *digest })
                }
            }
            Some(Action::Add(_)) => {
                self.frames[frame_idx].actions.remove(digest);
                Ok(())
            }
            Some(Action::Replace(_)) => {
                self.frames[frame_idx].actions.insert(*digest, Action::Remove);
                Ok(())
            }
            Some(Action::Remove) => Err(OverlayError::DoubleRemove { digest: *digest }),
        }
    }

    /// Records an add/replace for `digest` in the current frame, following
    /// the per-key state machine in `spec.md` §4.D.
    pub fn add(&mut self, digest: [u8; 16], value: Vec<u8>) -> OverlayResult<()> {
        let top = self.require_top();
        self.add_at(top, digest, value)
    }

    /// Records a remove for `digest` in the current frame.
    pub fn remove(&mut self, digest: &[u8; 16]) -> OverlayResult<()> {
        let top = self.require_top();
        self.remove_at(top, digest)
    }

    /// Reads `digest`, walking from the top frame down through parents and
    /// finally the arena itself.
    pub fn get(&self, digest: &[u8; 16]) -> OverlayResult<Option<Vec<u8>>> {
        let mut cursor = self.top;
        while let Some(idx) = cursor {
            match self.frames[idx].actions.get(digest) {
                Some(Action::Add(v)) | Some(Action::Replace(v)) => return Ok(Some(v.clone())),
                Some(Action::Remove) => return Ok(None),
                None => cursor = self.frames[idx].parent,
            }
        }
        Ok(self.arena.get(digest)?)
    }

    /// Membership check through the same walk as [`Self::get`].
    pub fn mem(&self, digest: &[u8; 16]) -> OverlayResult<bool> {
        Ok(self.get(digest)?.is_some())
    }

    /// Drops the top frame's action on a single key, leaving lower frames
    /// and the arena untouched.
    pub fn revert(&mut self, digest: &[u8; 16]) {
        let top = self.require_top();
        self.frames[top].actions.remove(digest);
    }

    /// Applies the top frame's action on `digest` to the frame beneath (or
    /// the arena, if this is the bottom frame), then clears it here.
    ///
    /// `commit(Add v)` is `add v` one level down; `commit(Replace v)` is
    /// `remove; add v` one level down; `commit(Remove)` is `remove` one
    /// level down. Because this runs synchronously with no yield point
    /// between the remove and add halves of a `Replace` commit, the action
    /// table is never observed in the gap `spec.md` §4.D requires be
    /// invisible.
    pub fn commit(&mut self, digest: [u8; 16]) -> OverlayResult<()> {
        let top = self.require_top();
        let action = self.frames[top].actions.remove(&digest);
        match action {
            None => Ok(()),
            Some(Action::Add(value)) => self.commit_add(top, digest, value),
            Some(Action::Replace(value)) => {
                self.commit_remove(top, digest)?;
                self.commit_add(top, digest, value)
            }
            Some(Action::Remove) => self.commit_remove(top, digest),
        }
    }

    fn commit_add(&mut self, top: usize, digest: [u8; 16], value: Vec<u8>) -> OverlayResult<()> {
        match self.frames[top].parent {
            Some(parent) => self.add_at(parent, digest, value),
            None => {
                self.arena.add(digest, &value)?;
                Ok(())
            }
        }
    }

    fn commit_remove(&mut self, top: usize, digest: [u8; 16]) -> OverlayResult<()> {
        match self.frames[top].parent {
            Some(parent) => self.remove_at(parent, &digest),
            None => {
                self.arena.remove(&digest)?;
                Ok(())
            }
        }
    }

    /// Drops every action recorded in the current frame.
    pub fn revert_all(&mut self) {
        let top = self.require_top();
        self.frames[top].actions.clear();
    }

    /// Commits every action recorded in the current frame, one key at a time.
    pub fn commit_all(&mut self) -> OverlayResult<()> {
        let top = self.require_top();
        let digests: Vec<[u8; 16]> = self.frames[top].actions.keys().copied().collect();
        for digest in digests {
            self.commit(digest)?;
        }
        Ok(())
    }

    /// Moves the value at `src` to `dst` at the current overlay view:
    /// requires `mem(src) ∧ ¬mem(dst)`, then fetches, removes, and re-adds.
    pub fn move_key(&mut self, src: &[u8; 16], dst: [u8; 16]) -> OverlayResult<()> {
        let src_present = self.mem(src)?;
        let dst_present = self.mem(&dst)?;
        if !src_present || dst_present {
            return Err(OverlayError::MovePrecondition {
                src_present,
                dst_present,
            });
        }
        let value = self.get(src)?.expect("mem(src) just confirmed presence");
        self.remove(src)?;
        self.add(dst, value)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena::config::ArenaConfig;

    fn test_arena() -> Arc<Arena> {
        let config = ArenaConfig::builder()
            .global_size(1 << 16)
            .heap_size(1 << 14)
            .hash_table_pow(6)
            .dep_table_pow(6)
            .build();
        Arc::new(Arena::init(config).unwrap())
    }

    fn d(byte: u8) -> [u8; 16] {
        [byte; 16]
    }

    #[test]
    fn add_then_get_is_visible_within_frame() {
        let mut stack = OverlayStack::new(test_arena());
        stack.push_stack();
        stack.add(d(1), b"v1".to_vec()).unwrap();
        assert_eq!(stack.get(&d(1)).unwrap(), Some(b"v1".to_vec()));
    }

    #[test]
    fn remove_of_add_erases_the_entry() {
        let mut stack = OverlayStack::new(test_arena());
        stack.push_stack();
        stack.add(d(1), b"v1".to_vec()).unwrap();
        stack.remove(&d(1)).unwrap();
        assert_eq!(stack.get(&d(1)).unwrap(), None);
        // Reads from the arena below, not a shadowed Remove.
        assert!(!stack.arena.mem(&d(1)));
    }

    #[test]
    fn remove_over_arena_value_then_double_remove_errors() {
        let arena = test_arena();
        arena.add(d(2), b"from arena").unwrap();
        let mut stack = OverlayStack::new(arena);
        stack.push_stack();
        stack.remove(&d(2)).unwrap();
        assert_eq!(stack.get(&d(2)).unwrap(), None);
        assert!(matches!(stack.remove(&d(2)), Err(OverlayError::DoubleRemove { .. })));
    }

    #[test]
    fn remove_of_absent_key_errors() {
        let mut stack = OverlayStack::new(test_arena());
        stack.push_stack();
        assert!(matches!(stack.remove(&d(9)), Err(OverlayError::RemoveOfAbsent { .. })));
    }

    #[test]
    fn push_then_add_then_add_in_child_becomes_replace() {
        let arena = test_arena();
        arena.add(d(3), b"below").unwrap();
        let mut stack = OverlayStack::new(arena);
        stack.push_stack();
        // No action yet for d(3) in this frame, but it's visible below, so
        // `add` here must produce Replace rather than Add.
        stack.add(d(3), b"top".to_vec()).unwrap();
        assert_eq!(stack.get(&d(3)).unwrap(), Some(b"top".to_vec()));
    }

    #[test]
    fn commit_add_applies_to_arena_from_bottom_frame() {
        let arena = test_arena();
        let mut stack = OverlayStack::new(arena.clone());
        stack.push_stack();
        stack.add(d(4), b"committed".to_vec()).unwrap();
        stack.commit(d(4)).unwrap();
        assert_eq!(arena.get(&d(4)).unwrap(), Some(b"committed".to_vec()));
        assert_eq!(stack.get(&d(4)).unwrap(), Some(b"committed".to_vec()));
    }

    #[test]
    fn commit_replace_removes_then_adds_at_parent() {
        let arena = test_arena();
        arena.add(d(5), b"original").unwrap();
        let mut stack = OverlayStack::new(arena.clone());
        stack.push_stack();
        stack.add(d(5), b"replacement".to_vec()).unwrap();
        stack.commit(d(5)).unwrap();
        assert_eq!(arena.get(&d(5)).unwrap(), Some(b"replacement".to_vec()));
    }

    #[test]
    fn pop_stack_discards_uncommitted_actions() {
        let mut stack = OverlayStack::new(test_arena());
        stack.push_stack();
        stack.add(d(6), b"scratch".to_vec()).unwrap();
        stack.pop_stack();
        assert!(stack.top.is_none());
    }

    #[test]
    #[should_panic(expected = "pop_stack")]
    fn pop_stack_on_empty_stack_panics() {
        let mut stack = OverlayStack::new(test_arena());
        stack.pop_stack();
    }

    #[test]
    fn move_key_requires_source_present_and_destination_absent() {
        let mut stack = OverlayStack::new(test_arena());
        stack.push_stack();
        stack.add(d(7), b"payload".to_vec()).unwrap();
        stack.move_key(&d(7), d(8)).unwrap();
        assert!(!stack.mem(&d(7)).unwrap());
        assert_eq!(stack.get(&d(8)).unwrap(), Some(b"payload".to_vec()));

        assert!(matches!(
            stack.move_key(&d(8), d(8)),
            Err(OverlayError::MovePrecondition { .. })
        ));
    }

    #[test]
    fn commit_all_applies_every_action_in_the_frame() {
        let arena = test_arena();
        let mut stack = OverlayStack::new(arena.clone());
        stack.push_stack();
        stack.add(d(10), b"one".to_vec()).unwrap();
        stack.add(d(11), b"two".to_vec()).unwrap();
        stack.commit_all().unwrap();
        assert_eq!(arena.get(&d(10)).unwrap(), Some(b"one".to_vec()));
        assert_eq!(arena.get(&d(11)).unwrap(), Some(b"two".to_vec()));
    }

    #[test]
    fn revert_all_drops_every_action_without_touching_arena() {
        let arena = test_arena();
        let mut stack = OverlayStack::new(arena.clone());
        stack.push_stack();
        stack.add(d(12), b"ghost".to_vec()).unwrap();
        stack.revert_all();
        assert!(!arena.mem(&d(12)));
        assert!(!stack.mem(&d(12)).unwrap());
    }
}
