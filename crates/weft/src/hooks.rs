use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::element::Listener;
use crate::error::EffectError;
use crate::fiber::FiberId;

/// Post-commit effect body. Returns an optional cleanup that runs before the
/// effect fires again and when the owning fiber unmounts.
pub type EffectFn = Rc<dyn Fn() -> Result<Option<CleanupFn>, EffectError>>;

/// Cleanup produced by an effect.
pub type CleanupFn = Rc<dyn Fn() -> Result<(), EffectError>>;

type MapFn = Rc<dyn Fn(&dyn Any) -> Option<Rc<dyn Any>>>;

/// One queued state transition: a replacement value or a pure old -> new
/// function. Applied in enqueue order when the slot is next read.
#[derive(Clone)]
pub enum StateUpdate {
    Set(Rc<dyn Any>),
    Map(MapFn),
}

/// Shared per-slot update queue. The queue outlives any single render, which
/// is what lets a setter captured by an old listener keep working.
pub type UpdateQueue = Rc<RefCell<Vec<StateUpdate>>>;

/// Dependency value for effect/memo hooks. Compared element-wise with `==`;
/// floats are compared by bit pattern so NaN deps stay stable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dep {
    Int(i64),
    Uint(u64),
    Float(u64),
    Bool(bool),
    Str(String),
    Ptr(usize),
}

impl Dep {
    /// Identity of a shared value, for deps that should compare by pointer.
    pub fn identity<T: ?Sized>(value: &Rc<T>) -> Dep {
        Dep::Ptr(Rc::as_ptr(value) as *const u8 as usize)
    }
}

impl From<i64> for Dep {
    fn from(value: i64) -> Self {
        Dep::Int(value)
    }
}

impl From<i32> for Dep {
    fn from(value: i32) -> Self {
        Dep::Int(value as i64)
    }
}

impl From<u64> for Dep {
    fn from(value: u64) -> Self {
        Dep::Uint(value)
    }
}

impl From<usize> for Dep {
    fn from(value: usize) -> Self {
        Dep::Uint(value as u64)
    }
}

impl From<f64> for Dep {
    fn from(value: f64) -> Self {
        Dep::Float(value.to_bits())
    }
}

impl From<bool> for Dep {
    fn from(value: bool) -> Self {
        Dep::Bool(value)
    }
}

impl From<&str> for Dep {
    fn from(value: &str) -> Self {
        Dep::Str(value.to_string())
    }
}

impl From<String> for Dep {
    fn from(value: String) -> Self {
        Dep::Str(value)
    }
}

/// One positional storage slot on a fiber. Slots are appended lazily, one
/// per hook call, and addressed purely by call order — there is no
/// name-based fallback.
#[derive(Clone)]
pub enum Hook {
    State {
        value: Rc<dyn Any>,
        queue: UpdateQueue,
        /// How many queue entries `value` has folded in. They are popped
        /// when the pass that produced this slot commits; a discarded pass
        /// leaves the queue intact for the next one.
        consumed: usize,
    },
    Effect {
        deps: Option<Vec<Dep>>,
        cleanup: Option<CleanupFn>,
    },
    Memo {
        value: Rc<dyn Any>,
        deps: Option<Vec<Dep>>,
    },
    Ref {
        cell: Rc<RefCell<Rc<dyn Any>>>,
    },
}

impl Hook {
    fn variant_name(&self) -> &'static str {
        match self {
            Hook::State { .. } => "state",
            Hook::Effect { .. } => "effect",
            Hook::Memo { .. } => "memo",
            Hook::Ref { .. } => "ref",
        }
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.variant_name())
    }
}

/// Dirty flag shared between state setters and the runtime. Setters only
/// flip it; the runtime drains it into a scheduled re-render, so setters
/// never need to borrow engine state.
#[derive(Clone, Default)]
pub struct RenderSignal {
    dirty: Rc<Cell<bool>>,
}

impl RenderSignal {
    pub(crate) fn request(&self) {
        self.dirty.set(true);
    }

    pub(crate) fn peek(&self) -> bool {
        self.dirty.get()
    }

    pub(crate) fn take(&self) -> bool {
        self.dirty.replace(false)
    }
}

/// Setter half of a state hook. Cloneable and usable from listeners and
/// effects; each call enqueues an update on the slot and requests a fresh
/// reconciliation of the owning root.
pub struct StateSetter<T> {
    queue: UpdateQueue,
    signal: RenderSignal,
    _marker: PhantomData<fn(T)>,
}

impl<T> Clone for StateSetter<T> {
    fn clone(&self) -> Self {
        StateSetter {
            queue: self.queue.clone(),
            signal: self.signal.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: 'static> StateSetter<T> {
    pub fn set(&self, value: T) {
        self.queue.borrow_mut().push(StateUpdate::Set(Rc::new(value)));
        self.signal.request();
    }

    pub fn update(&self, func: impl Fn(&T) -> T + 'static) {
        let map: MapFn = Rc::new(move |old| {
            old.downcast_ref::<T>()
                .map(|value| Rc::new(func(value)) as Rc<dyn Any>)
        });
        self.queue.borrow_mut().push(StateUpdate::Map(map));
        self.signal.request();
    }
}

/// Identity-stable mutable box returned by the ref hook.
pub struct RefBox<T> {
    cell: Rc<RefCell<Rc<dyn Any>>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for RefBox<T> {
    fn clone(&self) -> Self {
        RefBox {
            cell: self.cell.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: 'static> RefBox<T> {
    pub fn get(&self) -> Option<T>
    where
        T: Clone,
    {
        self.cell.borrow().downcast_ref::<T>().cloned()
    }

    pub fn set(&self, value: T) {
        *self.cell.borrow_mut() = Rc::new(value);
    }

    pub fn with<R>(&self, func: impl FnOnce(&T) -> R) -> Option<R> {
        self.cell.borrow().downcast_ref::<T>().map(func)
    }
}

/// Effect work captured during render, flushed after the commit that made
/// the render visible. `slot` lets the flush write the produced cleanup back
/// into the committed fiber.
pub(crate) struct SlotEffect {
    pub slot: usize,
    pub cleanup: Option<CleanupFn>,
    pub effect: EffectFn,
}

/// A [`SlotEffect`] bound to the fiber it was rendered for.
pub(crate) struct PendingEffect {
    pub fiber: FiberId,
    pub slot: usize,
    pub cleanup: Option<CleanupFn>,
    pub effect: EffectFn,
}

/// Hook context threaded through one component invocation.
///
/// The cursor starts at zero and advances one slot per hook call. Prior
/// slots are read from the `alternate` fiber's store; the contract is that a
/// component calls the same hooks in the same order on every render. That
/// contract is checked with debug assertions, not enforced — violating it in
/// release silently misattributes state.
pub struct Scope {
    prev: Option<Vec<Hook>>,
    next: Vec<Hook>,
    cursor: usize,
    pending: Vec<SlotEffect>,
    signal: RenderSignal,
}

impl Scope {
    pub(crate) fn new(prev: Option<Vec<Hook>>, signal: RenderSignal) -> Self {
        Scope {
            prev,
            next: Vec::new(),
            cursor: 0,
            pending: Vec::new(),
            signal,
        }
    }

    fn advance(&mut self) -> usize {
        let slot = self.cursor;
        self.cursor += 1;
        slot
    }

    fn prev_slot(&self, slot: usize) -> Option<&Hook> {
        self.prev.as_ref().and_then(|hooks| hooks.get(slot))
    }

    fn warn_variant_mismatch(slot: usize, expected: &str, found: &Hook) {
        log::warn!(
            "hook slot {slot} changed variant between renders: expected {expected}, found {}",
            found.variant_name()
        );
        debug_assert!(
            false,
            "hook slot {slot} changed variant between renders (call order must be stable)"
        );
    }

    /// State hook. Reads the slot at the cursor from the previous render if
    /// present (else `initial`) and folds queued updates in enqueue order
    /// into the effective value. The fold leaves the queue untouched; the
    /// consumed entries are popped at commit.
    pub fn use_state<T: Clone + 'static>(&mut self, initial: T) -> (T, StateSetter<T>) {
        let slot = self.advance();

        let (stored, queue): (Option<Rc<dyn Any>>, UpdateQueue) = match self.prev_slot(slot) {
            Some(Hook::State { value, queue, .. }) => (Some(value.clone()), queue.clone()),
            Some(other) => {
                Self::warn_variant_mismatch(slot, "state", other);
                (None, Rc::new(RefCell::new(Vec::new())))
            }
            None => (None, Rc::new(RefCell::new(Vec::new()))),
        };
        let mut value: Rc<dyn Any> =
            stored.unwrap_or_else(|| Rc::new(initial.clone()) as Rc<dyn Any>);

        // Fold without draining: the pass reading this slot may yet be
        // discarded, and lost queue entries would break the fold law.
        let pending: Vec<StateUpdate> = queue.borrow().iter().cloned().collect();
        let consumed = pending.len();
        for update in pending {
            match update {
                StateUpdate::Set(next) => value = next,
                StateUpdate::Map(map) => match map(value.as_ref()) {
                    Some(next) => value = next,
                    None => log::warn!("state update skipped: stored value has unexpected type"),
                },
            }
        }

        let typed = match value.downcast_ref::<T>() {
            Some(current) => current.clone(),
            None => {
                log::warn!("state slot {slot} holds a value of unexpected type; reinitializing");
                debug_assert!(false, "state slot type changed between renders");
                value = Rc::new(initial.clone());
                initial
            }
        };

        self.next.push(Hook::State {
            value,
            queue: queue.clone(),
            consumed,
        });

        let setter = StateSetter {
            queue,
            signal: self.signal.clone(),
            _marker: PhantomData,
        };
        (typed, setter)
    }

    /// Effect hook. `deps == None` fires on every render; otherwise the
    /// effect fires when any dependency differs from the previous render or
    /// on the fiber's first render. When it fires, the previous cleanup is
    /// queued to run first; otherwise the previous cleanup is carried
    /// forward untouched.
    pub fn use_effect(
        &mut self,
        deps: Option<&[Dep]>,
        effect: impl Fn() -> Result<Option<CleanupFn>, EffectError> + 'static,
    ) {
        let slot = self.advance();
        let (prev_deps, prev_cleanup, had_slot) = match self.prev_slot(slot) {
            Some(Hook::Effect { deps, cleanup }) => (deps.clone(), cleanup.clone(), true),
            Some(other) => {
                Self::warn_variant_mismatch(slot, "effect", other);
                (None, None, false)
            }
            None => (None, None, false),
        };

        let changed = !had_slot || deps.is_none() || prev_deps.as_deref() != deps;
        if changed {
            self.pending.push(SlotEffect {
                slot,
                cleanup: prev_cleanup,
                effect: Rc::new(effect),
            });
            self.next.push(Hook::Effect {
                deps: deps.map(<[Dep]>::to_vec),
                cleanup: None,
            });
        } else {
            self.next.push(Hook::Effect {
                deps: prev_deps,
                cleanup: prev_cleanup,
            });
        }
    }

    /// Memo hook: same dependency contract as [`use_effect`], but the value
    /// is recomputed synchronously at render time.
    ///
    /// [`use_effect`]: Scope::use_effect
    pub fn use_memo<T: Clone + 'static>(
        &mut self,
        deps: Option<&[Dep]>,
        compute: impl FnOnce() -> T,
    ) -> T {
        let slot = self.advance();

        let (prev_value, prev_deps) = match self.prev_slot(slot) {
            Some(Hook::Memo { value, deps }) => (Some(value.clone()), deps.clone()),
            Some(other) => {
                Self::warn_variant_mismatch(slot, "memo", other);
                (None, None)
            }
            None => (None, None),
        };

        let changed = prev_value.is_none() || deps.is_none() || prev_deps.as_deref() != deps;
        let stored = if changed {
            None
        } else {
            prev_value
                .as_ref()
                .and_then(|value| value.downcast_ref::<T>().cloned())
        };
        let typed: T = match stored {
            Some(value) => value,
            None => {
                if !changed {
                    log::warn!("memo slot {slot} holds a value of unexpected type; recomputing");
                }
                compute()
            }
        };

        self.next.push(Hook::Memo {
            value: Rc::new(typed.clone()),
            deps: deps.map(<[Dep]>::to_vec),
        });
        typed
    }

    /// Callback hook: memoizes a shared closure so listener identity stays
    /// stable while deps are unchanged.
    pub fn use_callback(&mut self, deps: Option<&[Dep]>, callback: Listener) -> Listener {
        self.use_memo(deps, move || callback)
    }

    /// Ref hook: one mutable box, allocated on first render and
    /// identity-stable across all future renders regardless of anything.
    pub fn use_ref<T: 'static>(&mut self, init: impl FnOnce() -> T) -> RefBox<T> {
        let slot = self.advance();
        let cell = match self.prev_slot(slot) {
            Some(Hook::Ref { cell }) => cell.clone(),
            Some(other) => {
                Self::warn_variant_mismatch(slot, "ref", other);
                Rc::new(RefCell::new(Rc::new(init()) as Rc<dyn Any>))
            }
            None => Rc::new(RefCell::new(Rc::new(init()) as Rc<dyn Any>)),
        };
        self.next.push(Hook::Ref { cell: cell.clone() });
        RefBox {
            cell,
            _marker: PhantomData,
        }
    }

    /// Consume the scope, yielding the new slot list and the effects queued
    /// during this invocation. Checks the slot-count half of the hook-order
    /// contract.
    pub(crate) fn finish(self) -> (Vec<Hook>, Vec<SlotEffect>) {
        if let Some(prev) = &self.prev {
            if prev.len() != self.next.len() {
                log::warn!(
                    "hook count changed between renders: {} -> {}",
                    prev.len(),
                    self.next.len()
                );
                debug_assert_eq!(
                    prev.len(),
                    self.next.len(),
                    "hook call count must be stable across renders"
                );
            }
        }
        (self.next, self.pending)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::{CleanupFn, Dep, Hook, RenderSignal, Scope};

    fn render_once(prev: Option<Vec<Hook>>, signal: &RenderSignal) -> Scope {
        Scope::new(prev, signal.clone())
    }

    #[test]
    fn state_folds_queued_updates_in_enqueue_order() {
        let signal = RenderSignal::default();
        let mut scope = render_once(None, &signal);
        let (value, setter) = scope.use_state(0i64);
        assert_eq!(value, 0);
        let (hooks, _) = scope.finish();

        setter.set(5);
        setter.update(|n| n + 1);
        setter.update(|n| n * 2);
        assert!(signal.peek());

        let mut scope = render_once(Some(hooks), &signal);
        let (value, _) = scope.use_state(0i64);
        assert_eq!(value, 12, "left-fold of [set 5, +1, *2] over 0");
    }

    #[test]
    fn state_survives_renders_with_no_updates() {
        let signal = RenderSignal::default();
        let mut scope = render_once(None, &signal);
        let (_, setter) = scope.use_state(1i64);
        let (mut hooks, _) = scope.finish();
        setter.set(41);

        for _ in 0..5 {
            let mut scope = render_once(Some(hooks), &signal);
            let (value, _) = scope.use_state(0i64);
            assert_eq!(value, 41);
            hooks = scope.finish().0;
        }
    }

    #[test]
    fn setter_from_an_old_render_still_reaches_the_slot() {
        let signal = RenderSignal::default();
        let mut scope = render_once(None, &signal);
        let (_, old_setter) = scope.use_state(0i64);
        let (hooks, _) = scope.finish();

        // Second render produces a fresh slot list; the original setter must
        // keep feeding the same queue.
        let mut scope = render_once(Some(hooks), &signal);
        let (_, _) = scope.use_state(0i64);
        let (hooks, _) = scope.finish();

        old_setter.update(|n| n + 3);
        let mut scope = render_once(Some(hooks), &signal);
        let (value, _) = scope.use_state(0i64);
        assert_eq!(value, 3);
    }

    #[test]
    fn fold_preserves_the_queue_until_commit_pops_it() {
        let signal = RenderSignal::default();
        let mut scope = render_once(None, &signal);
        let (_, setter) = scope.use_state(0i64);
        let (hooks, _) = scope.finish();
        setter.update(|n| n + 1);

        // A pass that folds the update and is then thrown away must leave
        // the queue behind for the pass that replaces it.
        let mut scope = render_once(Some(hooks.clone()), &signal);
        let (value, _) = scope.use_state(0i64);
        assert_eq!(value, 1);
        scope.finish();

        let mut scope = render_once(Some(hooks), &signal);
        let (value, _) = scope.use_state(0i64);
        let (hooks, _) = scope.finish();
        assert_eq!(value, 1, "the replacement pass folds the same updates");
        match &hooks[0] {
            Hook::State { queue, consumed, .. } => {
                assert_eq!(queue.borrow().len(), 1);
                assert_eq!(*consumed, 1);
            }
            other => panic!("expected state slot, got {other:?}"),
        }
    }

    #[test]
    fn effect_fires_on_first_render_and_on_dep_change() {
        let signal = RenderSignal::default();
        let runs = Rc::new(Cell::new(0usize));

        let make_effect = |runs: &Rc<Cell<usize>>| {
            let runs = runs.clone();
            move || {
                runs.set(runs.get() + 1);
                Ok(None)
            }
        };

        let mut scope = render_once(None, &signal);
        scope.use_effect(Some(&[Dep::from(1i64)]), make_effect(&runs));
        let (hooks, pending) = scope.finish();
        assert_eq!(pending.len(), 1, "first render always fires");

        let mut scope = render_once(Some(hooks), &signal);
        scope.use_effect(Some(&[Dep::from(1i64)]), make_effect(&runs));
        let (hooks, pending) = scope.finish();
        assert!(pending.is_empty(), "unchanged deps must not fire");

        let mut scope = render_once(Some(hooks), &signal);
        scope.use_effect(Some(&[Dep::from(2i64)]), make_effect(&runs));
        let (_, pending) = scope.finish();
        assert_eq!(pending.len(), 1, "changed deps fire");
    }

    #[test]
    fn effect_without_deps_fires_every_render() {
        let signal = RenderSignal::default();
        let mut scope = render_once(None, &signal);
        scope.use_effect(None, || Ok(None));
        let (hooks, pending) = scope.finish();
        assert_eq!(pending.len(), 1);

        let mut scope = render_once(Some(hooks), &signal);
        scope.use_effect(None, || Ok(None));
        let (_, pending) = scope.finish();
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn unchanged_effect_carries_prior_cleanup_forward() {
        let signal = RenderSignal::default();
        let cleanup: CleanupFn = Rc::new(|| Ok(()));

        let prev = vec![Hook::Effect {
            deps: Some(vec![Dep::from(7i64)]),
            cleanup: Some(cleanup.clone()),
        }];
        let mut scope = render_once(Some(prev), &signal);
        scope.use_effect(Some(&[Dep::from(7i64)]), || Ok(None));
        let (hooks, pending) = scope.finish();

        assert!(pending.is_empty());
        match &hooks[0] {
            Hook::Effect { cleanup: Some(kept), .. } => assert!(Rc::ptr_eq(kept, &cleanup)),
            other => panic!("expected effect slot with cleanup, got {other:?}"),
        }
    }

    #[test]
    fn memo_recomputes_only_when_deps_change() {
        let signal = RenderSignal::default();
        let computes = Rc::new(Cell::new(0usize));

        let compute = |computes: &Rc<Cell<usize>>| {
            let computes = computes.clone();
            move || {
                computes.set(computes.get() + 1);
                99i64
            }
        };

        let mut scope = render_once(None, &signal);
        let value = scope.use_memo(Some(&[Dep::from("a")]), compute(&computes));
        assert_eq!(value, 99);
        let (hooks, _) = scope.finish();
        assert_eq!(computes.get(), 1);

        let mut scope = render_once(Some(hooks), &signal);
        let value = scope.use_memo(Some(&[Dep::from("a")]), compute(&computes));
        assert_eq!(value, 99);
        let (hooks, _) = scope.finish();
        assert_eq!(computes.get(), 1, "unchanged deps reuse the stored value");

        let mut scope = render_once(Some(hooks), &signal);
        scope.use_memo(Some(&[Dep::from("b")]), compute(&computes));
        scope.finish();
        assert_eq!(computes.get(), 2);
    }

    #[test]
    fn ref_box_is_identity_stable_across_renders() {
        let signal = RenderSignal::default();
        let mut scope = render_once(None, &signal);
        let slot = scope.use_ref(|| 10i64);
        let (hooks, _) = scope.finish();

        slot.set(20);

        let mut scope = render_once(Some(hooks), &signal);
        let again = scope.use_ref(|| 10i64);
        scope.finish();
        assert_eq!(again.get(), Some(20), "same box, mutation visible");
    }

    #[test]
    fn callback_identity_is_stable_while_deps_match() {
        let signal = RenderSignal::default();
        let callback: crate::element::Listener = Rc::new(|| {});

        let mut scope = render_once(None, &signal);
        let first = scope.use_callback(Some(&[]), callback.clone());
        let (hooks, _) = scope.finish();

        let fresh: crate::element::Listener = Rc::new(|| {});
        let mut scope = render_once(Some(hooks), &signal);
        let second = scope.use_callback(Some(&[]), fresh);
        scope.finish();

        assert!(Rc::ptr_eq(&first, &second));
    }
}
