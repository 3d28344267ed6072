use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use crate::error::RenderError;
use crate::hooks::Scope;

/// Attribute name under which a text node's content is stored, so text
/// updates flow through the same prop-diff path as every other attribute.
pub const TEXT_VALUE_ATTR: &str = "nodeValue";

/// A function component. Invoked during render with a hook [`Scope`] and its
/// current props; returns the child descriptor for this slot.
pub type ComponentFn = Rc<dyn Fn(&mut Scope, &Props) -> Result<Element, RenderError>>;

/// Event listener attached to a host node. Listeners are compared by
/// identity during prop diffs, never by value.
pub type Listener = Rc<dyn Fn()>;

/// What occupies one slot of the declarative tree.
#[derive(Clone)]
pub enum ElementKind {
    /// Plain host node addressed by tag name.
    Host(Rc<str>),
    /// Leaf text node; its content lives in the [`TEXT_VALUE_ATTR`] prop.
    Text,
    /// Function component expanded during render.
    Component(ComponentFn),
}

impl ElementKind {
    /// Whether a fiber built for `self` can be reused for `other` at the
    /// same tree position. Matching is positional: host tags must be equal,
    /// text matches text, components match by function identity.
    pub(crate) fn same_slot(&self, other: &ElementKind) -> bool {
        match (self, other) {
            (ElementKind::Host(a), ElementKind::Host(b)) => a == b,
            (ElementKind::Text, ElementKind::Text) => true,
            (ElementKind::Component(a), ElementKind::Component(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn tag(&self) -> Option<&str> {
        match self {
            ElementKind::Host(tag) => Some(tag),
            _ => None,
        }
    }
}

impl fmt::Debug for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::Host(tag) => write!(f, "Host({tag})"),
            ElementKind::Text => write!(f, "Text"),
            ElementKind::Component(func) => {
                write!(f, "Component({:p})", Rc::as_ptr(func))
            }
        }
    }
}

/// Scalar attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum PropValue {
    Str(Rc<str>),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl PropValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Str(value.into())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Str(value.into())
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Int(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        PropValue::Int(value as i64)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Float(value)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

/// Ordered property bag for one descriptor: attributes, listeners, and the
/// child descriptor list.
#[derive(Clone, Default)]
pub struct Props {
    pub attrs: IndexMap<String, PropValue>,
    pub listeners: FxHashMap<String, Listener>,
    pub children: Vec<Element>,
}

impl Props {
    pub fn text_value(&self) -> &str {
        self.attrs
            .get(TEXT_VALUE_ATTR)
            .and_then(PropValue::as_str)
            .unwrap_or("")
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Props")
            .field("attrs", &self.attrs)
            .field("listeners", &self.listeners.keys().collect::<Vec<_>>())
            .field("children", &self.children.len())
            .finish()
    }
}

/// Immutable node descriptor, created fresh by the caller on every render.
///
/// The `key` field is carried for callers that set it, but the diff never
/// consults it: child matching is strictly positional, so reordering keyed
/// children still produces update/delete/place churn instead of moves.
#[derive(Clone, Debug)]
pub struct Element {
    pub kind: ElementKind,
    pub props: Props,
    pub key: Option<Rc<str>>,
}

impl Element {
    pub fn host(tag: impl Into<Rc<str>>) -> Self {
        Element {
            kind: ElementKind::Host(tag.into()),
            props: Props::default(),
            key: None,
        }
    }

    pub fn text(value: impl Into<Rc<str>>) -> Self {
        let mut props = Props::default();
        props
            .attrs
            .insert(TEXT_VALUE_ATTR.to_string(), PropValue::Str(value.into()));
        Element {
            kind: ElementKind::Text,
            props,
            key: None,
        }
    }

    pub fn component(func: ComponentFn) -> Self {
        Element {
            kind: ElementKind::Component(func),
            props: Props::default(),
            key: None,
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.props.attrs.insert(name.into(), value.into());
        self
    }

    pub fn on(mut self, event: impl Into<String>, listener: Listener) -> Self {
        self.props.listeners.insert(event.into(), listener);
        self
    }

    pub fn child(mut self, child: Element) -> Self {
        self.props.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.props.children.extend(children);
        self
    }

    pub fn key(mut self, key: impl Into<Rc<str>>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// Attribute/listener delta between two prop bags. Children are structural
/// and handled by reconciliation, so they are excluded here.
#[derive(Debug, Default)]
pub struct PropDiff {
    pub removed_attrs: Vec<String>,
    pub set_attrs: Vec<(String, PropValue)>,
    pub removed_listeners: Vec<String>,
    pub set_listeners: Vec<String>,
}

impl PropDiff {
    pub fn is_empty(&self) -> bool {
        self.removed_attrs.is_empty()
            && self.set_attrs.is_empty()
            && self.removed_listeners.is_empty()
            && self.set_listeners.is_empty()
    }
}

/// Compute the delta the commit phase must apply to take a host instance
/// from `old` to `new`. Listeners are compared by identity.
pub fn diff_props(old: &Props, new: &Props) -> PropDiff {
    let mut diff = PropDiff::default();

    for name in old.attrs.keys() {
        if !new.attrs.contains_key(name) {
            diff.removed_attrs.push(name.clone());
        }
    }
    for (name, value) in &new.attrs {
        if old.attrs.get(name) != Some(value) {
            diff.set_attrs.push((name.clone(), value.clone()));
        }
    }

    for name in old.listeners.keys() {
        if !new.listeners.contains_key(name) {
            diff.removed_listeners.push(name.clone());
        }
    }
    for (name, listener) in &new.listeners {
        let same = old
            .listeners
            .get(name)
            .is_some_and(|old_listener| Rc::ptr_eq(old_listener, listener));
        if !same {
            diff.set_listeners.push(name.clone());
        }
    }

    diff
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_slot_matches_host_tags() {
        let a = Element::host("div");
        let b = Element::host("div");
        let c = Element::host("span");
        assert!(a.kind.same_slot(&b.kind));
        assert!(!a.kind.same_slot(&c.kind));
    }

    #[test]
    fn same_slot_matches_components_by_identity() {
        let func: ComponentFn = Rc::new(|_, _| Ok(Element::host("div")));
        let a = Element::component(func.clone());
        let b = Element::component(func);
        let other: ComponentFn = Rc::new(|_, _| Ok(Element::host("div")));
        let c = Element::component(other);
        assert!(a.kind.same_slot(&b.kind));
        assert!(!a.kind.same_slot(&c.kind));
    }

    #[test]
    fn diff_props_reports_attr_changes() {
        let old = Element::host("div").attr("id", "a").attr("title", "x").props;
        let new = Element::host("div").attr("id", "b").props;

        let diff = diff_props(&old, &new);
        assert_eq!(diff.removed_attrs, vec!["title".to_string()]);
        assert_eq!(diff.set_attrs.len(), 1);
        assert_eq!(diff.set_attrs[0].0, "id");
    }

    #[test]
    fn diff_props_compares_listeners_by_identity() {
        let listener: Listener = Rc::new(|| {});
        let old = Element::host("button").on("click", listener.clone()).props;
        let same = Element::host("button").on("click", listener).props;
        let replaced: Listener = Rc::new(|| {});
        let new = Element::host("button").on("click", replaced).props;

        assert!(diff_props(&old, &same).is_empty());
        let diff = diff_props(&old, &new);
        assert_eq!(diff.set_listeners, vec!["click".to_string()]);
    }

    #[test]
    fn identical_props_produce_empty_diff() {
        let a = Element::host("div").attr("id", "a").props;
        let b = Element::host("div").attr("id", "a").props;
        assert!(diff_props(&a, &b).is_empty());
    }

    #[test]
    fn text_element_stores_value_as_prop() {
        let el = Element::text("hello");
        assert_eq!(el.props.text_value(), "hello");
    }
}
