use std::rc::Rc;

use smallvec::SmallVec;

use super::{EffectTag, Fiber, FiberArena, FiberId};
use crate::element::{ComponentFn, Element, ElementKind, Props};
use crate::host::HostHandle;

fn host_fiber(arena: &mut FiberArena, tag: &str) -> FiberId {
    arena.insert(Fiber::new(ElementKind::Host(tag.into()), Props::default()))
}

fn component_fiber(arena: &mut FiberArena) -> FiberId {
    let func: ComponentFn = Rc::new(|_, _| Ok(Element::host("div")));
    arena.insert(Fiber::new(ElementKind::Component(func), Props::default()))
}

fn link_children(arena: &mut FiberArena, parent: FiberId, children: &[FiberId]) {
    let mut prev: Option<FiberId> = None;
    for &child in children {
        if let Some(fiber) = arena.get_mut(child) {
            fiber.parent = Some(parent);
        }
        match prev {
            None => arena.get_mut(parent).unwrap().child = Some(child),
            Some(prev) => arena.get_mut(prev).unwrap().sibling = Some(child),
        }
        prev = Some(child);
    }
}

#[test]
fn next_unit_walks_child_then_sibling_then_ancestor_sibling() {
    let mut arena = FiberArena::new();
    let root = host_fiber(&mut arena, "root");
    let a = host_fiber(&mut arena, "a");
    let b = host_fiber(&mut arena, "b");
    let c = host_fiber(&mut arena, "c");
    link_children(&mut arena, root, &[a, c]);
    link_children(&mut arena, a, &[b]);

    assert_eq!(arena.next_unit(root, root), Some(a));
    assert_eq!(arena.next_unit(a, root), Some(b));
    assert_eq!(arena.next_unit(b, root), Some(c));
    assert_eq!(arena.next_unit(c, root), None);
}

#[test]
fn next_unit_stops_at_the_render_root() {
    let mut arena = FiberArena::new();
    let outer = host_fiber(&mut arena, "outer");
    let root = host_fiber(&mut arena, "root");
    let sibling = host_fiber(&mut arena, "sibling");
    let child = host_fiber(&mut arena, "child");
    link_children(&mut arena, outer, &[root, sibling]);
    link_children(&mut arena, root, &[child]);

    // The walk must not escape past `root` into its sibling.
    assert_eq!(arena.next_unit(child, root), None);
}

#[test]
fn remove_subtree_frees_descendants_and_spares_siblings() {
    let mut arena = FiberArena::new();
    let root = host_fiber(&mut arena, "root");
    let a = host_fiber(&mut arena, "a");
    let b = host_fiber(&mut arena, "b");
    let a_child = host_fiber(&mut arena, "a-child");
    link_children(&mut arena, root, &[a, b]);
    link_children(&mut arena, a, &[a_child]);

    arena.remove_subtree(a);

    assert!(arena.get(a).is_none());
    assert!(arena.get(a_child).is_none());
    assert!(arena.get(b).is_some());
    assert!(arena.get(root).is_some());
}

#[test]
fn stale_alternate_lookups_resolve_to_none() {
    let mut arena = FiberArena::new();
    let old = host_fiber(&mut arena, "old");
    let new = host_fiber(&mut arena, "new");
    arena.get_mut(new).unwrap().alternate = Some(old);

    arena.remove_subtree(old);

    let alternate = arena.get(new).unwrap().alternate.unwrap();
    assert!(arena.get(alternate).is_none());
}

#[test]
fn host_ancestor_skips_component_fibers() {
    let mut arena = FiberArena::new();
    let root = host_fiber(&mut arena, "root");
    arena.get_mut(root).unwrap().host = Some(HostHandle(7));
    let wrapper = component_fiber(&mut arena);
    let leaf = host_fiber(&mut arena, "leaf");
    link_children(&mut arena, root, &[wrapper]);
    link_children(&mut arena, wrapper, &[leaf]);

    assert_eq!(arena.host_ancestor(leaf), Some(HostHandle(7)));
    assert_eq!(arena.host_ancestor(wrapper), Some(HostHandle(7)));
    assert_eq!(arena.host_ancestor(root), None);
}

#[test]
fn host_roots_looks_through_component_wrappers() {
    let mut arena = FiberArena::new();
    let wrapper = component_fiber(&mut arena);
    let first = host_fiber(&mut arena, "first");
    let second = host_fiber(&mut arena, "second");
    let nested = host_fiber(&mut arena, "nested");
    arena.get_mut(first).unwrap().host = Some(HostHandle(1));
    arena.get_mut(second).unwrap().host = Some(HostHandle(2));
    arena.get_mut(nested).unwrap().host = Some(HostHandle(3));
    link_children(&mut arena, wrapper, &[first, second]);
    link_children(&mut arena, first, &[nested]);

    let mut out: SmallVec<[HostHandle; 4]> = SmallVec::new();
    arena.host_roots(wrapper, &mut out);
    let mut handles: Vec<_> = out.into_iter().collect();
    handles.sort_by_key(|handle| handle.0);

    // `nested` sits below a host-owning fiber, so it is not a host root.
    assert_eq!(handles, vec![HostHandle(1), HostHandle(2)]);
}

#[test]
fn effect_tag_defaults_to_none() {
    let fiber = Fiber::new(ElementKind::Text, Props::default());
    assert_eq!(fiber.effect_tag, EffectTag::None);
    assert!(fiber.host.is_none());
    assert!(fiber.alternate.is_none());
}
