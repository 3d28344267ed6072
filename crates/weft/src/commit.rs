//! Commit phase: applies a finished work-in-progress tree to the host in one
//! uninterrupted pass, then promotes it to current.
//!
//! Deletions go first so replaced slots are vacated before their successors
//! attach. Placements and updates follow in post-order, so a subtree is fully
//! assembled before it joins an already-attached ancestor.

use smallvec::SmallVec;

use crate::element::diff_props;
use crate::error::HostError;
use crate::fiber::{EffectTag, FiberId};
use crate::hooks::{CleanupFn, Hook};
use crate::host::HostHandle;
use crate::runtime::{Engine, RootId};

impl Engine {
    pub(crate) fn commit_root(&mut self, root_id: RootId) -> Result<(), HostError> {
        let Some(root) = self.roots.get(root_id) else {
            return Ok(());
        };
        let Some(wip) = root.wip else {
            return Ok(());
        };
        let deletions = root.deletions.clone();

        log::trace!(
            "[COMMIT] {root_id:?}: {} deletions, applying tree",
            deletions.len()
        );
        for deleted in deletions {
            self.commit_deletion(deleted)?;
        }
        self.commit_tree(wip)?;

        // Promotion is a pointer swap; the superseded tree is garbage, not
        // merged.
        let Some(root) = self.roots.get_mut(root_id) else {
            return Ok(());
        };
        root.deletions.clear();
        root.wip = None;
        root.next_unit = None;
        let effects = std::mem::take(&mut root.render_effects);
        root.pending_effects.extend(effects);
        let superseded = root.current.replace(wip);

        if let Some(old_root) = superseded {
            self.arena.remove_subtree(old_root);
        }

        // Alternate cross-references only mean something while both trees
        // exist; drop them along with the consumed effect tags. State
        // updates folded by this pass are popped now that it is visible;
        // anything queued since stays for the next render.
        let mut cursor = Some(wip);
        while let Some(id) = cursor {
            cursor = self.arena.next_unit(id, wip);
            if let Some(fiber) = self.arena.get_mut(id) {
                fiber.alternate = None;
                fiber.effect_tag = EffectTag::None;
                for hook in &mut fiber.hooks {
                    if let Hook::State { queue, consumed, .. } = hook {
                        let take = (*consumed).min(queue.borrow().len());
                        queue.borrow_mut().drain(..take);
                        *consumed = 0;
                    }
                }
            }
        }
        Ok(())
    }

    /// Post-order walk applying placements and updates. Children are visited
    /// left to right and complete before their parent, so a placed subtree
    /// attaches bottom-up.
    fn commit_tree(&mut self, wip_root: FiberId) -> Result<(), HostError> {
        let mut stack: Vec<(FiberId, bool)> = vec![(wip_root, false)];
        while let Some((id, visited)) = stack.pop() {
            if visited {
                self.apply_host_effect(id)?;
                continue;
            }
            stack.push((id, true));
            let mut children: SmallVec<[FiberId; 8]> = SmallVec::new();
            let mut next = self.arena.get(id).and_then(|fiber| fiber.child);
            while let Some(child) = next {
                children.push(child);
                next = self.arena.get(child).and_then(|fiber| fiber.sibling);
            }
            for &child in children.iter().rev() {
                stack.push((child, false));
            }
        }
        Ok(())
    }

    fn apply_host_effect(&mut self, id: FiberId) -> Result<(), HostError> {
        let Some(fiber) = self.arena.get(id) else {
            return Ok(());
        };
        match fiber.effect_tag {
            EffectTag::Placement => {
                if let Some(handle) = fiber.host {
                    if let Some(parent) = self.arena.host_ancestor(id) {
                        self.adapter.borrow_mut().append_child(parent, handle)?;
                    }
                }
            }
            EffectTag::Update => {
                // Reused instance; touch the host only if the props actually
                // differ.
                if let (Some(handle), Some(alternate)) = (fiber.host, fiber.alternate) {
                    if let Some(old) = self.arena.get(alternate) {
                        if !diff_props(&old.props, &fiber.props).is_empty() {
                            self.adapter
                                .borrow_mut()
                                .update_instance(handle, &old.props, &fiber.props)?;
                        }
                    }
                }
            }
            EffectTag::None | EffectTag::Deletion => {}
        }
        Ok(())
    }

    /// Detach a deleted subtree from the host and run its unmount cleanups.
    /// Component fibers own no instance, so the detach targets the nearest
    /// host-owning descendants.
    fn commit_deletion(&mut self, deleted: FiberId) -> Result<(), HostError> {
        let parent = self.arena.host_ancestor(deleted);
        let mut handles: SmallVec<[HostHandle; 4]> = SmallVec::new();
        self.arena.host_roots(deleted, &mut handles);
        if let Some(parent) = parent {
            for handle in handles {
                self.adapter.borrow_mut().remove_child(parent, handle)?;
            }
        }
        self.run_unmount_cleanups(deleted);
        Ok(())
    }

    fn run_unmount_cleanups(&mut self, deleted: FiberId) {
        let mut cleanups: Vec<CleanupFn> = Vec::new();
        self.arena.for_each_in_subtree(deleted, |_, fiber| {
            for hook in &fiber.hooks {
                if let Hook::Effect {
                    cleanup: Some(cleanup),
                    ..
                } = hook
                {
                    cleanups.push(cleanup.clone());
                }
            }
        });
        for cleanup in cleanups {
            if let Err(error) = cleanup() {
                log::error!("[COMMIT] unmount cleanup failed: {error}");
            }
        }
    }

    /// Run effects recorded by the last commit, oldest first. Each effect is
    /// isolated: a failure is logged and its neighbors still run. The cleanup
    /// an effect returns is written back into the committed fiber's slot so
    /// the next firing (or unmount) can run it.
    pub(crate) fn flush_effects(&mut self, root_id: RootId) {
        let pending = match self.roots.get_mut(root_id) {
            Some(root) => std::mem::take(&mut root.pending_effects),
            None => return,
        };
        log::trace!("[COMMIT] {root_id:?}: flushing {} effects", pending.len());

        for entry in pending {
            if let Some(cleanup) = entry.cleanup {
                if let Err(error) = cleanup() {
                    log::error!("[COMMIT] effect cleanup failed: {error}");
                }
            }
            match (entry.effect)() {
                Ok(next_cleanup) => {
                    if let Some(fiber) = self.arena.get_mut(entry.fiber) {
                        if let Some(Hook::Effect { cleanup, .. }) = fiber.hooks.get_mut(entry.slot)
                        {
                            *cleanup = next_cleanup;
                        }
                    }
                }
                Err(error) => log::error!("[COMMIT] effect failed: {error}"),
            }
        }
    }
}
