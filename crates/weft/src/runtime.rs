use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use slotmap::{SlotMap, new_key_type};

use crate::element::Element;
use crate::error::RenderError;
use crate::fiber::{FiberArena, FiberId};
use crate::hooks::{PendingEffect, RenderSignal};
use crate::host::{HostAdapter, HostHandle};
use crate::scheduler::{DEFAULT_SLICE, PRIORITY_NORMAL, Scheduler, TaskStatus};

new_key_type! {
    /// Handle for one mounted render root.
    pub struct RootId;
}

/// Per-root double-buffer state. Exactly one work-in-progress tree exists
/// per root at a time; `current` is what the host surface reflects.
pub(crate) struct Root {
    pub container: HostHandle,
    pub current: Option<FiberId>,
    pub wip: Option<FiberId>,
    /// Resumable work-loop cursor; `None` means the render phase is done
    /// (or no render is in flight).
    pub next_unit: Option<FiberId>,
    /// Previous-tree fibers with no counterpart in the new tree, collected
    /// here because they are unreachable from the work-in-progress tree.
    pub deletions: Vec<FiberId>,
    /// Effects captured during the in-flight render pass. Discarded with
    /// the pass; moved to `pending_effects` only when the pass commits.
    pub render_effects: Vec<PendingEffect>,
    /// Effects from the last commit, waiting for their flush turn.
    pub pending_effects: Vec<PendingEffect>,
    pub pending_element: Option<Element>,
    pub signal: RenderSignal,
    pub failed: Option<RenderError>,
    pub scheduled: bool,
}

impl Root {
    fn new(container: HostHandle) -> Self {
        Root {
            container,
            current: None,
            wip: None,
            next_unit: None,
            deletions: Vec::new(),
            render_effects: Vec::new(),
            pending_effects: Vec::new(),
            pending_element: None,
            signal: RenderSignal::default(),
            failed: None,
            scheduled: false,
        }
    }
}

/// Outcome of one engine step, used by the driver task to decide whether to
/// re-enqueue itself.
pub(crate) enum StepOutcome {
    Continue,
    Idle,
}

/// All tree state for every root, exclusively mutated from the scheduler's
/// loop. Render-phase logic lives in `reconciler`, commit logic in `commit`.
pub(crate) struct Engine {
    pub arena: FiberArena,
    pub adapter: Rc<RefCell<dyn HostAdapter>>,
    pub roots: SlotMap<RootId, Root>,
}

impl Engine {
    pub(crate) fn root_needs_work(root: &Root) -> bool {
        root.failed.is_none()
            && (root.signal.peek()
                || root.pending_element.is_some()
                || root.next_unit.is_some()
                || root.wip.is_some()
                || !root.pending_effects.is_empty())
    }

    /// Driver task body: performs one step, then yields a continuation while
    /// work remains so the scheduler can slice between units.
    pub(crate) fn drive(&mut self, root_id: RootId) -> TaskStatus<Engine> {
        match self.step_root(root_id) {
            StepOutcome::Continue => {
                TaskStatus::Yielded(Box::new(move |engine: &mut Engine| Ok(engine.drive(root_id))))
            }
            StepOutcome::Idle => {
                if let Some(root) = self.roots.get_mut(root_id) {
                    root.scheduled = false;
                }
                TaskStatus::Done
            }
        }
    }

    pub(crate) fn take_failure(&mut self) -> Option<RenderError> {
        self.roots.values_mut().find_map(|root| root.failed.take())
    }
}

/// The engine behind one set of render roots: owns the fiber arena, the
/// cooperative scheduler, and the host adapter. An explicit handle rather
/// than ambient globals, so multiple runtimes (and test harnesses) never
/// interfere.
pub struct Runtime {
    engine: Engine,
    scheduler: Scheduler<Engine>,
}

impl Runtime {
    pub fn new(adapter: Rc<RefCell<dyn HostAdapter>>) -> Self {
        Self::with_slice(adapter, DEFAULT_SLICE)
    }

    /// Override the scheduler slice budget. A zero budget yields after every
    /// render unit, which makes interruption points observable in tests.
    pub fn with_slice(adapter: Rc<RefCell<dyn HostAdapter>>, slice: Duration) -> Self {
        Runtime {
            engine: Engine {
                arena: FiberArena::new(),
                adapter,
                roots: SlotMap::with_key(),
            },
            scheduler: Scheduler::with_slice(slice),
        }
    }

    /// Schedule the initial mount (or replacement) of `element` into
    /// `container` and return immediately; host mutation happens on later
    /// [`tick`] turns. Rendering into a container that already has a root
    /// restarts that root from its committed tree.
    ///
    /// [`tick`]: Runtime::tick
    pub fn render(&mut self, element: Element, container: HostHandle) -> RootId {
        let existing = self
            .engine
            .roots
            .iter()
            .find(|(_, root)| root.container == container)
            .map(|(id, _)| id);
        let root_id = existing.unwrap_or_else(|| self.engine.roots.insert(Root::new(container)));

        if let Some(root) = self.engine.roots.get_mut(root_id) {
            root.pending_element = Some(element);
        }
        self.ensure_scheduled(root_id);
        root_id
    }

    fn ensure_scheduled(&mut self, root_id: RootId) {
        let Some(root) = self.engine.roots.get_mut(root_id) else {
            return;
        };
        if root.scheduled {
            return;
        }
        root.scheduled = true;
        self.scheduler.schedule(
            PRIORITY_NORMAL,
            Box::new(move |engine: &mut Engine| Ok(engine.drive(root_id))),
        );
    }

    /// Run one scheduler slice. Returns whether work remains; surfaces a
    /// failed render pass to the caller.
    pub fn tick(&mut self) -> Result<bool, RenderError> {
        let dirty: Vec<RootId> = self
            .engine
            .roots
            .iter()
            .filter(|(_, root)| Engine::root_needs_work(root))
            .map(|(id, _)| id)
            .collect();
        for root_id in dirty {
            self.ensure_scheduled(root_id);
        }

        self.scheduler.run_slice(&mut self.engine);

        if let Some(error) = self.engine.take_failure() {
            return Err(error);
        }
        let busy = !self.scheduler.is_idle()
            || self.engine.roots.values().any(Engine::root_needs_work);
        Ok(busy)
    }

    /// Drive until every root is idle. Test and demo convenience; an
    /// embedder with its own event loop calls [`tick`] instead.
    ///
    /// [`tick`]: Runtime::tick
    pub fn flush(&mut self) -> Result<(), RenderError> {
        while self.tick()? {}
        Ok(())
    }
}
