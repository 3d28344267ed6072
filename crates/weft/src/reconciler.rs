//! Render phase: builds the work-in-progress tree one fiber at a time.
//!
//! Everything here mutates only fibers and per-root bookkeeping. The single
//! host-facing action is instance creation; attaching, updating, and
//! detaching instances is deferred to the commit phase so an interrupted or
//! discarded pass leaves the host surface untouched.

use std::slice;

use crate::element::{Element, ElementKind, Props};
use crate::error::{HostError, RenderError};
use crate::fiber::{EffectTag, Fiber, FiberId};
use crate::hooks::{PendingEffect, Scope};
use crate::host::{HostAdapter, HostHandle};
use crate::runtime::{Engine, RootId, StepOutcome};

impl Engine {
    /// Perform one unit of work for `root_id`. Each call does at most one of:
    /// flush pending effects, start a render pass, process one fiber, or
    /// commit a finished pass. The driver task yields between calls, which is
    /// where slicing happens.
    pub(crate) fn step_root(&mut self, root_id: RootId) -> StepOutcome {
        let Some(root) = self.roots.get(root_id) else {
            return StepOutcome::Idle;
        };
        if root.failed.is_some() {
            return StepOutcome::Idle;
        }

        if !root.pending_effects.is_empty() {
            self.flush_effects(root_id);
            return StepOutcome::Continue;
        }

        // A fresh render request supersedes any in-flight pass. Checking the
        // signal before the work cursor is what makes a mid-render setter
        // call restart reconciliation against the latest state.
        if root.pending_element.is_some() || root.signal.peek() {
            self.begin_render(root_id);
            return StepOutcome::Continue;
        }

        if let Some(unit) = root.next_unit {
            let wip = root.wip;
            match self.perform_unit(root_id, unit) {
                Ok(()) => {
                    let next = wip.and_then(|wip| self.arena.next_unit(unit, wip));
                    if let Some(root) = self.roots.get_mut(root_id) {
                        root.next_unit = next;
                    }
                }
                Err(error) => self.abort_render(root_id, error),
            }
            return StepOutcome::Continue;
        }

        if root.wip.is_some() {
            if let Err(error) = self.commit_root(root_id) {
                log::error!("[COMMIT] host mutation failed for {root_id:?}: {error}");
                // No re-drive: the mutations already applied must not run
                // again. The pass is discarded and the root parks until the
                // caller renders again.
                self.abort_render(root_id, RenderError::Host(error));
            }
            return StepOutcome::Continue;
        }

        StepOutcome::Idle
    }

    /// Set up a work-in-progress tree rooted at a pseudo-fiber wrapping the
    /// host container. Discards any superseded in-flight pass wholesale.
    fn begin_render(&mut self, root_id: RootId) {
        let Some(root) = self.roots.get_mut(root_id) else {
            return;
        };
        root.signal.take();
        let element = root.pending_element.take();
        let stale_wip = root.wip.take();
        root.next_unit = None;
        root.render_effects.clear();
        let stale_deletions: Vec<FiberId> = root.deletions.drain(..).collect();
        let current = root.current;
        let container = root.container;

        // Deletions collected by the superseded pass point into the current
        // tree; clear their tags so the restarted diff sees a clean slate.
        for id in stale_deletions {
            if let Some(fiber) = self.arena.get_mut(id) {
                fiber.effect_tag = EffectTag::None;
            }
        }
        if let Some(stale) = stale_wip {
            log::trace!("[RECONCILE] {root_id:?}: discarding superseded in-flight pass");
            self.arena.remove_subtree(stale);
        }

        let children = match element {
            Some(element) => vec![element],
            // State-driven re-render: same top-level descriptor as the
            // committed tree.
            None => match current.and_then(|id| self.arena.get(id)) {
                Some(fiber) => fiber.props.children.clone(),
                None => return,
            },
        };

        log::trace!("[RECONCILE] {root_id:?}: starting render pass");
        let mut fiber = Fiber::new(
            ElementKind::Host("#container".into()),
            Props {
                children,
                ..Props::default()
            },
        );
        // The pseudo-root's handle is preset, so the tag never reaches the
        // adapter.
        fiber.host = Some(container);
        fiber.alternate = current;
        let wip = self.arena.insert(fiber);

        if let Some(root) = self.roots.get_mut(root_id) {
            root.wip = Some(wip);
            root.next_unit = Some(wip);
        }
    }

    /// Process one fiber: materialize its host instance or run its component
    /// body, then diff its children into new fibers.
    fn perform_unit(&mut self, root_id: RootId, unit: FiberId) -> Result<(), RenderError> {
        let Some(fiber) = self.arena.get(unit) else {
            return Ok(());
        };
        let kind = fiber.kind.clone();
        let props = fiber.props.clone();
        let alternate = fiber.alternate;

        match kind {
            ElementKind::Component(func) => {
                let prev_hooks = alternate
                    .and_then(|alt| self.arena.get(alt))
                    .map(|alt| alt.hooks.clone());
                let signal = match self.roots.get(root_id) {
                    Some(root) => root.signal.clone(),
                    None => return Ok(()),
                };

                let mut scope = Scope::new(prev_hooks, signal);
                let child = func(&mut scope, &props)?;
                let (hooks, effects) = scope.finish();

                if let Some(fiber) = self.arena.get_mut(unit) {
                    fiber.hooks = hooks;
                }
                if let Some(root) = self.roots.get_mut(root_id) {
                    root.render_effects
                        .extend(effects.into_iter().map(|slot_effect| PendingEffect {
                            fiber: unit,
                            slot: slot_effect.slot,
                            cleanup: slot_effect.cleanup,
                            effect: slot_effect.effect,
                        }));
                }
                self.reconcile_children(root_id, unit, slice::from_ref(&child));
            }
            ElementKind::Host(tag) => {
                self.ensure_host_instance(unit, |adapter| adapter.create_instance(&tag))?;
                self.reconcile_children(root_id, unit, &props.children);
            }
            ElementKind::Text => {
                let value = props.text_value().to_string();
                self.ensure_host_instance(unit, |adapter| adapter.create_text_instance(&value))?;
            }
        }
        Ok(())
    }

    fn ensure_host_instance(
        &mut self,
        unit: FiberId,
        create: impl FnOnce(&mut dyn HostAdapter) -> Result<HostHandle, HostError>,
    ) -> Result<(), RenderError> {
        // Fibers reusing an instance from their alternate already carry the
        // handle.
        if self.arena.get(unit).is_some_and(|fiber| fiber.host.is_some()) {
            return Ok(());
        }
        let handle = create(&mut *self.adapter.borrow_mut())?;
        if let Some(fiber) = self.arena.get_mut(unit) {
            fiber.host = Some(handle);
        }
        Ok(())
    }

    /// Positional diff of `elements` against the previous-render children of
    /// `parent`'s alternate. Walks both sequences index-aligned: a slot-kind
    /// match reuses the old fiber's host instance, a mismatch replaces the
    /// occupant, old-only tail entries become deletions.
    fn reconcile_children(&mut self, root_id: RootId, parent: FiberId, elements: &[Element]) {
        let alternate = self.arena.get(parent).and_then(|fiber| fiber.alternate);
        let mut old_id = alternate
            .and_then(|alt| self.arena.get(alt))
            .and_then(|alt| alt.child);
        let mut prev_sibling: Option<FiberId> = None;
        let mut index = 0usize;

        while index < elements.len() || old_id.is_some() {
            let element = elements.get(index);
            let (reusable, old_host, old_sibling) = match old_id.and_then(|id| self.arena.get(id)) {
                Some(old) => (
                    element.is_some_and(|element| element.kind.same_slot(&old.kind)),
                    old.host,
                    old.sibling,
                ),
                None => (false, None, None),
            };

            let mut new_id = None;
            if let Some(element) = element {
                let mut fiber = Fiber::new(element.kind.clone(), element.props.clone());
                fiber.parent = Some(parent);
                if reusable {
                    fiber.host = old_host;
                    fiber.alternate = old_id;
                    fiber.effect_tag = EffectTag::Update;
                } else {
                    fiber.effect_tag = EffectTag::Placement;
                }
                new_id = Some(self.arena.insert(fiber));
            }

            if let Some(old) = old_id {
                if !reusable {
                    log::trace!("[RECONCILE] slot {index} under {parent:?}: {old:?} leaves the tree");
                    if let Some(old_fiber) = self.arena.get_mut(old) {
                        old_fiber.effect_tag = EffectTag::Deletion;
                    }
                    if let Some(root) = self.roots.get_mut(root_id) {
                        root.deletions.push(old);
                    }
                }
            }

            if let Some(new_id) = new_id {
                match prev_sibling {
                    None => {
                        if let Some(parent_fiber) = self.arena.get_mut(parent) {
                            parent_fiber.child = Some(new_id);
                        }
                    }
                    Some(prev) => {
                        if let Some(prev_fiber) = self.arena.get_mut(prev) {
                            prev_fiber.sibling = Some(new_id);
                        }
                    }
                }
                prev_sibling = Some(new_id);
            }

            old_id = old_sibling;
            index += 1;
        }
    }

    /// Abandon the in-flight pass after a component body or a commit-phase
    /// host call failed. The work-in-progress tree, deletion list, and
    /// queued effects are dropped; the committed tree is left as it was.
    fn abort_render(&mut self, root_id: RootId, error: RenderError) {
        log::warn!("[RECONCILE] {root_id:?}: pass abandoned: {error}");
        let Some(root) = self.roots.get_mut(root_id) else {
            return;
        };
        let stale_wip = root.wip.take();
        root.next_unit = None;
        root.render_effects.clear();
        let stale_deletions: Vec<FiberId> = root.deletions.drain(..).collect();
        root.failed = Some(error);

        for id in stale_deletions {
            if let Some(fiber) = self.arena.get_mut(id) {
                fiber.effect_tag = EffectTag::None;
            }
        }
        if let Some(stale) = stale_wip {
            self.arena.remove_subtree(stale);
        }
    }
}
