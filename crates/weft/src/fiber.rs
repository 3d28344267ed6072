use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;

use crate::element::{ElementKind, Props};
use crate::hooks::Hook;
use crate::host::HostHandle;

new_key_type! {
    /// Stable arena key for one fiber. Keys are inherently weak: looking up
    /// a removed fiber returns `None`, which is what makes `alternate`
    /// back-references safe to leave dangling on a superseded tree.
    pub struct FiberId;
}

/// Commit action recorded on a fiber during reconciliation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EffectTag {
    #[default]
    None,
    /// Fresh fiber; its host instance must be attached under the nearest
    /// host ancestor.
    Placement,
    /// Same slot kind as the previous render; host instance reused, props
    /// diffed at commit.
    Update,
    /// Previous-tree fiber with no counterpart in the new tree. Collected on
    /// the root deletion list because it is unreachable from the new tree.
    Deletion,
}

/// Mutable work unit for one tree slot.
///
/// The tree is stored as leftmost-child + right-sibling links. `alternate`
/// points at the previous-version fiber occupying the same slot; it is set
/// during reconciliation and cleared at commit, never an ownership edge.
pub struct Fiber {
    pub kind: ElementKind,
    pub props: Props,
    pub host: Option<HostHandle>,
    pub parent: Option<FiberId>,
    pub child: Option<FiberId>,
    pub sibling: Option<FiberId>,
    pub alternate: Option<FiberId>,
    pub effect_tag: EffectTag,
    pub hooks: Vec<Hook>,
}

impl Fiber {
    pub fn new(kind: ElementKind, props: Props) -> Self {
        Fiber {
            kind,
            props,
            host: None,
            parent: None,
            child: None,
            sibling: None,
            alternate: None,
            effect_tag: EffectTag::None,
            hooks: Vec::new(),
        }
    }

    pub fn is_component(&self) -> bool {
        matches!(self.kind, ElementKind::Component(_))
    }
}

/// Arena holding every live fiber — both the current tree and, while a
/// render is in flight, the work-in-progress tree.
#[derive(Default)]
pub struct FiberArena {
    fibers: SlotMap<FiberId, Fiber>,
}

impl FiberArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, fiber: Fiber) -> FiberId {
        self.fibers.insert(fiber)
    }

    pub fn get(&self, id: FiberId) -> Option<&Fiber> {
        self.fibers.get(id)
    }

    pub fn get_mut(&mut self, id: FiberId) -> Option<&mut Fiber> {
        self.fibers.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.fibers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fibers.is_empty()
    }

    /// Next fiber in resumable depth-first order: child first, then sibling,
    /// then the nearest ancestor sibling, stopping at `root`. This is the
    /// "next unit" cursor of the work loop — all traversal state lives in
    /// the links, so a render can be suspended after any single unit.
    pub fn next_unit(&self, id: FiberId, root: FiberId) -> Option<FiberId> {
        if let Some(child) = self.fibers.get(id).and_then(|fiber| fiber.child) {
            return Some(child);
        }
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == root {
                return None;
            }
            let fiber = self.fibers.get(current)?;
            if let Some(sibling) = fiber.sibling {
                return Some(sibling);
            }
            cursor = fiber.parent;
        }
        None
    }

    /// Handle of the nearest ancestor that owns a host instance. Component
    /// fibers are transparent to the host tree.
    pub fn host_ancestor(&self, id: FiberId) -> Option<HostHandle> {
        let mut cursor = self.fibers.get(id).and_then(|fiber| fiber.parent);
        while let Some(current) = cursor {
            let fiber = self.fibers.get(current)?;
            if let Some(handle) = fiber.host {
                return Some(handle);
            }
            cursor = fiber.parent;
        }
        None
    }

    /// Collect the nearest host-owning descendants of `id`, including `id`
    /// itself if it owns an instance. These are the handles that must be
    /// detached when the subtree is deleted.
    pub fn host_roots(&self, id: FiberId, out: &mut SmallVec<[HostHandle; 4]>) {
        let mut stack: SmallVec<[FiberId; 8]> = SmallVec::new();
        stack.push(id);
        while let Some(current) = stack.pop() {
            let Some(fiber) = self.fibers.get(current) else {
                continue;
            };
            if let Some(handle) = fiber.host {
                out.push(handle);
                continue;
            }
            let mut next = fiber.child;
            while let Some(child) = next {
                stack.push(child);
                next = self.fibers.get(child).and_then(|fiber| fiber.sibling);
            }
        }
    }

    /// Walk `id` and everything below it, in no particular order.
    pub fn for_each_in_subtree(&self, id: FiberId, mut visit: impl FnMut(FiberId, &Fiber)) {
        let mut stack: SmallVec<[FiberId; 8]> = SmallVec::new();
        stack.push(id);
        while let Some(current) = stack.pop() {
            let Some(fiber) = self.fibers.get(current) else {
                continue;
            };
            let mut next = fiber.child;
            while let Some(child) = next {
                stack.push(child);
                next = self.fibers.get(child).and_then(|fiber| fiber.sibling);
            }
            visit(current, fiber);
        }
    }

    /// Free `root` and every fiber below it. Siblings of `root` survive.
    /// Host instances are untouched; detaching them is commit's job.
    pub fn remove_subtree(&mut self, root: FiberId) {
        let mut stack: SmallVec<[FiberId; 8]> = SmallVec::new();
        stack.push(root);
        let mut removed = 0usize;
        while let Some(current) = stack.pop() {
            let Some(fiber) = self.fibers.remove(current) else {
                continue;
            };
            removed += 1;
            let mut next = fiber.child;
            while let Some(child) = next {
                stack.push(child);
                next = self.fibers.get(child).and_then(|fiber| fiber.sibling);
            }
        }
        log::trace!("[FIBER] remove_subtree: freed {removed} fibers under {root:?}");
    }
}

#[cfg(test)]
mod tests;
