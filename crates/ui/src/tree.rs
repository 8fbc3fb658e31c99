//! Widget arena - ownership, parent links, bounds and redraw lock
//!
//! The tree owns every widget. Parents, children and focus links are
//! [`WidgetId`]s, so nothing but the arena keeps a widget alive and a
//! stale id simply fails to resolve. Calls with ids that do not resolve,
//! or that would break the tree shape, are ignored.

use std::collections::{HashMap, VecDeque};

use crate::screen::Screen;
use crate::widget::{Rect, Widget, WidgetId, WidgetKind};

/// Child slot; `tab_order` is fixed at insertion and never reused
#[derive(Debug, Clone, Copy)]
pub(crate) struct Child {
    pub id: WidgetId,
    pub tab_order: u32,
}

pub(crate) struct Node {
    pub widget: Box<dyn Widget>,
    pub kind: WidgetKind,
    pub parent: Option<WidgetId>,
    /// Drawing order
    pub children: Vec<Child>,
    pub next_tab: u32,
    /// Descendant (or self) that holds or last held focus in this subtree
    pub focused_widget: Option<WidgetId>,
    pub focused: bool,
    pub focusable: bool,
    pub redraw_locked: bool,
    pub area: Rect,
}

/// Widget tree plus the root-window stack
pub struct WidgetTree<S: Screen> {
    pub(crate) nodes: HashMap<WidgetId, Node>,
    next_id: u64,
    /// Head receives keyboard input
    pub(crate) roots: VecDeque<WidgetId>,
    /// Input contexts pushed by focused widgets, innermost last
    pub(crate) contexts: Vec<(WidgetId, String)>,
    pub(crate) screen: S,
}

impl<S: Screen + Default> Default for WidgetTree<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

impl<S: Screen> WidgetTree<S> {
    pub fn new(screen: S) -> Self {
        Self {
            nodes: HashMap::new(),
            next_id: 0,
            roots: VecDeque::new(),
            contexts: Vec::new(),
            screen,
        }
    }

    pub const fn screen(&self) -> &S {
        &self.screen
    }

    pub fn screen_mut(&mut self) -> &mut S {
        &mut self.screen
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Nodes
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a detached widget to the arena
    pub fn create(&mut self, widget: Box<dyn Widget>, kind: WidgetKind) -> WidgetId {
        self.next_id += 1;
        let id = WidgetId(self.next_id);
        self.nodes.insert(
            id,
            Node {
                widget,
                kind,
                parent: None,
                children: Vec::new(),
                next_tab: 0,
                focused_widget: None,
                focused: false,
                focusable: true,
                redraw_locked: false,
                area: Rect::default(),
            },
        );
        id
    }

    pub fn contains(&self, id: WidgetId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn kind(&self, id: WidgetId) -> Option<WidgetKind> {
        self.nodes.get(&id).map(|n| n.kind)
    }

    pub fn parent(&self, id: WidgetId) -> Option<WidgetId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    /// Children in drawing order
    pub fn children(&self, id: WidgetId) -> Vec<WidgetId> {
        self.nodes
            .get(&id)
            .map(|n| n.children.iter().map(|c| c.id).collect())
            .unwrap_or_default()
    }

    /// Number of children (0 for unknown ids)
    pub fn len(&self, container: WidgetId) -> usize {
        self.nodes.get(&container).map_or(0, |n| n.children.len())
    }

    pub fn is_empty(&self, container: WidgetId) -> bool {
        self.len(container) == 0
    }

    /// Tab order `child` was given when inserted into `container`
    pub fn tab_order(&self, container: WidgetId, child: WidgetId) -> Option<u32> {
        self.nodes
            .get(&container)?
            .children
            .iter()
            .find(|c| c.id == child)
            .map(|c| c.tab_order)
    }

    pub fn widget(&self, id: WidgetId) -> Option<&dyn Widget> {
        self.nodes.get(&id).map(|n| n.widget.as_ref())
    }

    /// Run `f` against a widget, if it exists
    pub fn with_widget_mut<R>(&mut self, id: WidgetId, f: impl FnOnce(&mut dyn Widget) -> R) -> Option<R> {
        self.nodes.get_mut(&id).map(|n| f(n.widget.as_mut()))
    }

    pub fn is_focusable(&self, id: WidgetId) -> bool {
        self.nodes.get(&id).is_some_and(|n| n.focusable)
    }

    /// Exclude a widget (and, for containers, its subtree) from tab order
    pub fn set_focusable(&mut self, id: WidgetId, focusable: bool) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.focusable = focusable;
        }
    }

    /// `id` followed by each ancestor up to its toplevel
    pub(crate) fn chain(&self, id: WidgetId) -> Vec<WidgetId> {
        let mut chain = Vec::new();
        let mut current = self.nodes.contains_key(&id).then_some(id);
        while let Some(cur) = current {
            chain.push(cur);
            current = self.nodes.get(&cur).and_then(|n| n.parent);
        }
        chain
    }

    /// Outermost ancestor of `id` (or `id` itself when detached)
    pub fn toplevel(&self, id: WidgetId) -> WidgetId {
        self.chain(id).last().copied().unwrap_or(id)
    }

    /// `id` and all of its descendants, parents before children
    fn subtree(&self, id: WidgetId) -> Vec<WidgetId> {
        let mut out = Vec::new();
        let mut pending = vec![id];
        while let Some(cur) = pending.pop() {
            if let Some(node) = self.nodes.get(&cur) {
                out.push(cur);
                pending.extend(node.children.iter().rev().map(|c| c.id));
            }
        }
        out
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Structure
    // ─────────────────────────────────────────────────────────────────────────

    fn can_adopt(&self, container: WidgetId, widget: WidgetId) -> bool {
        let Some(parent) = self.nodes.get(&container) else {
            return false;
        };
        let Some(child) = self.nodes.get(&widget) else {
            return false;
        };
        parent.kind.holds_children()
            && child.parent.is_none()
            && !self.chain(container).contains(&widget)
    }

    /// Insert `widget` into `container` at `pos` (end when `None`)
    ///
    /// With no container the widget becomes a root window instead.
    pub fn insert_child(&mut self, container: Option<WidgetId>, widget: WidgetId, pos: Option<usize>) {
        let Some(container) = container else {
            self.add_root(widget);
            return;
        };
        if !self.can_adopt(container, widget) {
            tracing::debug!("Ignoring insert of {} into {}", widget, container);
            return;
        }
        // A root window that gets a parent leaves the stack
        self.delete_root(widget);

        let Some(parent) = self.nodes.get_mut(&container) else {
            return;
        };
        let tab_order = parent.next_tab;
        parent.next_tab += 1;
        let pos = pos.map_or(parent.children.len(), |p| p.min(parent.children.len()));
        parent.children.insert(pos, Child { id: widget, tab_order });
        let fill = (parent.kind == WidgetKind::Layout).then_some(parent.area);

        if let Some(child) = self.nodes.get_mut(&widget) {
            child.parent = Some(container);
        }
        if let Some(area) = fill {
            self.set_area(widget, area);
        }
    }

    /// Remove `widget` from `container`, destroying it or leaving it detached
    pub fn delete_child(&mut self, container: WidgetId, widget: WidgetId, destroy: bool) {
        let Some(pos) = self
            .nodes
            .get(&container)
            .and_then(|n| n.children.iter().position(|c| c.id == widget))
        else {
            return;
        };

        self.release_focus(widget);
        if let Some(parent) = self.nodes.get_mut(&container) {
            parent.children.remove(pos);
        }
        if let Some(child) = self.nodes.get_mut(&widget) {
            child.parent = None;
        }
        if destroy {
            self.destroy_subtree(widget);
        }
    }

    /// Destroy `widget` and everything below it
    pub fn destroy(&mut self, widget: WidgetId) {
        let Some(node) = self.nodes.get(&widget) else {
            return;
        };
        match node.parent {
            Some(parent) => self.delete_child(parent, widget, true),
            None => {
                self.release_focus(widget);
                self.delete_root(widget);
                self.destroy_subtree(widget);
            }
        }
    }

    fn destroy_subtree(&mut self, id: WidgetId) {
        let children = self.children(id);
        for child in children {
            self.destroy_subtree(child);
        }
        if let Some(mut node) = self.nodes.remove(&id) {
            self.contexts.retain(|(owner, _)| *owner != id);
            node.widget.on_destroy();
            tracing::debug!("Destroyed {}", id);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Geometry and drawing
    // ─────────────────────────────────────────────────────────────────────────

    pub fn area(&self, id: WidgetId) -> Option<Rect> {
        self.nodes.get(&id).map(|n| n.area)
    }

    /// Move/resize a widget; layout containers pass their bounds down
    pub fn set_area(&mut self, id: WidgetId, area: Rect) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        node.area = area;
        node.widget.on_resize(area);
        if node.kind == WidgetKind::Layout {
            for child in self.children(id) {
                self.set_area(child, area);
            }
        }
    }

    /// Suppress drawing for `id` and its descendants
    pub fn lock_redraw(&mut self, id: WidgetId) {
        self.set_redraw_lock(id, true);
    }

    pub fn unlock_redraw(&mut self, id: WidgetId) {
        self.set_redraw_lock(id, false);
    }

    fn set_redraw_lock(&mut self, id: WidgetId, locked: bool) {
        for cur in self.subtree(id) {
            if let Some(node) = self.nodes.get_mut(&cur) {
                node.redraw_locked = locked;
            }
        }
    }

    pub fn is_redraw_locked(&self, id: WidgetId) -> bool {
        self.nodes.get(&id).is_some_and(|n| n.redraw_locked)
    }

    /// Draw `id` and its descendants, then refresh the screen
    ///
    /// A locked widget draws nothing and does not refresh.
    pub fn redraw(&mut self, id: WidgetId) {
        if !self.nodes.get(&id).is_some_and(|n| !n.redraw_locked) {
            return;
        }
        self.draw_subtree(id);
        self.screen.refresh();
    }

    fn draw_subtree(&mut self, id: WidgetId) {
        let children = {
            let Some(node) = self.nodes.get_mut(&id) else {
                return;
            };
            if node.redraw_locked {
                return;
            }
            node.widget.draw(&mut self.screen, node.area, node.focused);
            node.children.iter().map(|c| c.id).collect::<Vec<_>>()
        };
        for child in children {
            self.draw_subtree(child);
        }
    }
}
