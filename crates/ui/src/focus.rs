//! Focus state, tab-order traversal and the root-window stack
//!
//! At most one widget per toplevel is focused. Every node on the path from
//! the focused widget up to its toplevel records it in `focused_widget`,
//! so any ancestor can name the focused leaf without a search. Blurring a
//! whole root window (when another window is stacked on top) keeps those
//! links, which is how the window gets the same widget back later.

use crate::screen::Screen;
use crate::tree::WidgetTree;
use crate::widget::WidgetId;

impl<S: Screen> WidgetTree<S> {
    pub fn is_focused(&self, id: WidgetId) -> bool {
        self.nodes.get(&id).is_some_and(|n| n.focused)
    }

    /// Widget holding (or last holding) focus below `id`
    pub fn focused_widget(&self, id: WidgetId) -> Option<WidgetId> {
        self.nodes.get(&id).and_then(|n| n.focused_widget)
    }

    /// Innermost active input context
    pub fn input_context(&self) -> Option<&str> {
        self.contexts.last().map(|(_, name)| name.as_str())
    }

    /// Give `widget` focus within its toplevel
    ///
    /// Does nothing if the widget is already focused or cannot take focus.
    pub fn set_focus(&mut self, widget: WidgetId) {
        if !self.nodes.get(&widget).is_some_and(|n| n.focusable && !n.focused) {
            return;
        }

        let top = self.toplevel(widget);
        if let Some(old) = self.focused_widget(top).filter(|old| *old != widget) {
            self.clear_focus_chain(old);
            self.blur(old);
        }

        for id in self.chain(widget) {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.focused_widget = Some(widget);
            }
        }

        let Some(node) = self.nodes.get_mut(&widget) else {
            return;
        };
        node.focused = true;
        if let Some(context) = node.widget.input_context() {
            self.contexts.push((widget, context.to_string()));
        }
        let handled = node.widget.on_focus();
        tracing::debug!("Focus moved to {}", widget);
        if !handled {
            self.redraw(widget);
        }
    }

    /// Drop `focused` from the focus links on its path
    fn clear_focus_chain(&mut self, focused: WidgetId) {
        for id in self.chain(focused) {
            if let Some(node) = self.nodes.get_mut(&id) {
                if node.focused_widget == Some(focused) {
                    node.focused_widget = None;
                }
            }
        }
    }

    /// Mark `id` unfocused without touching the focus links
    fn blur(&mut self, id: WidgetId) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        if !node.focused {
            return;
        }
        node.focused = false;
        node.widget.on_blur();
        if let Some(pos) = self.contexts.iter().rposition(|(owner, _)| *owner == id) {
            self.contexts.remove(pos);
        }
        self.redraw(id);
    }

    /// Blur and unlink focus if it sits at or below `widget`
    pub(crate) fn release_focus(&mut self, widget: WidgetId) {
        let top = self.toplevel(widget);
        let Some(focused) = self.focused_widget(top) else {
            return;
        };
        if self.chain(focused).contains(&widget) {
            self.clear_focus_chain(focused);
            self.blur(focused);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tab order
    // ─────────────────────────────────────────────────────────────────────────

    /// Children of `id` by tab order, reversed for backward traversal
    fn tab_sequence(&self, id: WidgetId, forward: bool) -> Vec<WidgetId> {
        let Some(node) = self.nodes.get(&id) else {
            return Vec::new();
        };
        let mut children = node.children.clone();
        children.sort_by_key(|c| c.tab_order);
        if !forward {
            children.reverse();
        }
        children.into_iter().map(|c| c.id).collect()
    }

    /// First focusable leaf of the subtree at `id` (last when going backward)
    fn first_leaf(&self, id: WidgetId, forward: bool) -> Option<WidgetId> {
        let node = self.nodes.get(&id)?;
        if !node.focusable {
            return None;
        }
        if !node.kind.holds_children() {
            return Some(id);
        }
        self.tab_sequence(id, forward)
            .into_iter()
            .find_map(|child| self.first_leaf(child, forward))
    }

    fn step(&self, widget: WidgetId, forward: bool) -> Option<WidgetId> {
        if !self.contains(widget) {
            return None;
        }
        let mut current = widget;
        while let Some(parent) = self.parent(current) {
            let siblings = self.tab_sequence(parent, forward);
            let after = siblings.iter().position(|s| *s == current).map_or(0, |i| i + 1);
            if let Some(found) = siblings[after..]
                .iter()
                .find_map(|sibling| self.first_leaf(*sibling, forward))
            {
                return Some(found);
            }
            current = parent;
        }
        // Wrap around within the toplevel
        self.first_leaf(current, forward)
    }

    /// Next focusable widget after `widget` in tab order, wrapping
    pub fn next_focused(&self, widget: WidgetId) -> Option<WidgetId> {
        self.step(widget, true)
    }

    /// Previous focusable widget before `widget` in tab order, wrapping
    pub fn prev_focused(&self, widget: WidgetId) -> Option<WidgetId> {
        self.step(widget, false)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Root windows
    // ─────────────────────────────────────────────────────────────────────────

    /// Window currently receiving keyboard input
    pub fn head_root(&self) -> Option<WidgetId> {
        self.roots.front().copied()
    }

    /// Root windows, head first
    pub fn roots(&self) -> impl Iterator<Item = WidgetId> + '_ {
        self.roots.iter().copied()
    }

    fn blur_root(&mut self, root: WidgetId) {
        if let Some(focused) = self.focused_widget(root) {
            self.blur(focused);
        }
    }

    fn focus_root(&mut self, root: WidgetId) {
        let target = self
            .focused_widget(root)
            .or_else(|| self.first_leaf(root, true));
        if let Some(target) = target {
            self.set_focus(target);
        }
    }

    /// Put `widget` on top of the root stack and focus it
    ///
    /// A widget already on the stack is promoted, not duplicated. Widgets
    /// with a parent cannot become roots.
    pub fn add_root(&mut self, widget: WidgetId) {
        if !self.nodes.get(&widget).is_some_and(|n| n.parent.is_none()) {
            return;
        }
        if self.head_root() == Some(widget) {
            return;
        }
        if let Some(head) = self.head_root() {
            self.blur_root(head);
        }
        self.roots.retain(|r| *r != widget);
        self.roots.push_front(widget);
        tracing::debug!("Root window {} on top ({} stacked)", widget, self.roots.len());
        self.focus_root(widget);
    }

    /// Remove `widget` from the root stack, refocusing the new head
    pub fn delete_root(&mut self, widget: WidgetId) {
        let Some(pos) = self.roots.iter().position(|r| *r == widget) else {
            return;
        };
        self.roots.remove(pos);
        self.blur_root(widget);
        if pos == 0 {
            if let Some(head) = self.head_root() {
                self.focus_root(head);
            }
        }
    }

    /// Move the head window one place down the stack
    pub fn sink_root(&mut self) {
        if self.roots.len() < 2 {
            return;
        }
        let Some(head) = self.roots.pop_front() else {
            return;
        };
        self.blur_root(head);
        self.roots.insert(1, head);
        if let Some(new_head) = self.head_root() {
            self.focus_root(new_head);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::screen::BufferScreen;
    use crate::widget::{Blank, Widget, WidgetKind};

    type Log = Rc<RefCell<Vec<String>>>;

    struct Probe {
        name: &'static str,
        log: Log,
        context: Option<&'static str>,
        self_drawing: bool,
    }

    impl Widget for Probe {
        fn draw(&mut self, screen: &mut dyn Screen, _area: crate::Rect, focused: bool) {
            screen.put_str(0, 0, &format!("{}{}", self.name, if focused { "*" } else { "" }));
        }

        fn on_focus(&mut self) -> bool {
            self.log.borrow_mut().push(format!("focus {}", self.name));
            self.self_drawing
        }

        fn on_blur(&mut self) {
            self.log.borrow_mut().push(format!("blur {}", self.name));
        }

        fn input_context(&self) -> Option<&str> {
            self.context
        }
    }

    fn probe(tree: &mut WidgetTree<BufferScreen>, name: &'static str, log: &Log) -> WidgetId {
        tree.create(
            Box::new(Probe {
                name,
                log: log.clone(),
                context: None,
                self_drawing: false,
            }),
            WidgetKind::Leaf,
        )
    }

    fn container(tree: &mut WidgetTree<BufferScreen>, children: &[WidgetId]) -> WidgetId {
        let id = tree.create(Box::new(Blank), WidgetKind::Container);
        for child in children {
            tree.insert_child(Some(id), *child, None);
        }
        id
    }

    #[test]
    fn test_set_focus_twice_is_idempotent() {
        let log = Log::default();
        let mut tree = WidgetTree::<BufferScreen>::default();
        let a = probe(&mut tree, "a", &log);
        let b = probe(&mut tree, "b", &log);
        let window = container(&mut tree, &[a, b]);

        tree.set_focus(a);
        tree.set_focus(a);
        assert_eq!(*log.borrow(), vec!["focus a"]);

        tree.set_focus(b);
        assert_eq!(*log.borrow(), vec!["focus a", "blur a", "focus b"]);
        assert!(!tree.is_focused(a));
        assert!(tree.is_focused(b));
        assert_eq!(tree.focused_widget(window), Some(b));
    }

    #[test]
    fn test_focus_links_reach_every_ancestor() {
        let log = Log::default();
        let mut tree = WidgetTree::<BufferScreen>::default();
        let leaf = probe(&mut tree, "leaf", &log);
        let inner = container(&mut tree, &[leaf]);
        let outer = container(&mut tree, &[inner]);

        tree.set_focus(leaf);
        assert_eq!(tree.focused_widget(inner), Some(leaf));
        assert_eq!(tree.focused_widget(outer), Some(leaf));

        tree.delete_child(outer, inner, false);
        assert_eq!(tree.focused_widget(outer), None);
        assert!(!tree.is_focused(leaf));
    }

    #[test]
    fn test_focus_redraw_unless_handled() {
        let log = Log::default();
        let mut tree = WidgetTree::<BufferScreen>::default();
        let plain = probe(&mut tree, "plain", &log);
        let custom = tree.create(
            Box::new(Probe {
                name: "custom",
                log: log.clone(),
                context: None,
                self_drawing: true,
            }),
            WidgetKind::Leaf,
        );
        container(&mut tree, &[plain, custom]);

        tree.set_focus(plain);
        assert_eq!(tree.screen().texts(), vec!["plain*"]);

        tree.screen_mut().clear();
        tree.set_focus(custom);
        // only the blurred widget repaints
        assert_eq!(tree.screen().texts(), vec!["plain"]);
    }

    #[test]
    fn test_input_context_follows_focus() {
        let log = Log::default();
        let mut tree = WidgetTree::<BufferScreen>::default();
        let input = tree.create(
            Box::new(Probe {
                name: "input",
                log: log.clone(),
                context: Some("input"),
                self_drawing: false,
            }),
            WidgetKind::Leaf,
        );
        let button = probe(&mut tree, "button", &log);
        container(&mut tree, &[input, button]);

        tree.set_focus(input);
        assert_eq!(tree.input_context(), Some("input"));
        tree.set_focus(button);
        assert_eq!(tree.input_context(), None);
    }

    #[test]
    fn test_next_wraps_within_toplevel() {
        let log = Log::default();
        let mut tree = WidgetTree::<BufferScreen>::default();
        let a = probe(&mut tree, "a", &log);
        let b = probe(&mut tree, "b", &log);
        let c = probe(&mut tree, "c", &log);
        let d = probe(&mut tree, "d", &log);
        let left = container(&mut tree, &[a, b]);
        let right = container(&mut tree, &[c, d]);
        container(&mut tree, &[left, right]);

        assert_eq!(tree.next_focused(a), Some(b));
        assert_eq!(tree.next_focused(b), Some(c));
        assert_eq!(tree.next_focused(d), Some(a));
        assert_eq!(tree.prev_focused(c), Some(b));
        assert_eq!(tree.prev_focused(a), Some(d));
    }

    #[test]
    fn test_traversal_skips_unfocusable() {
        let log = Log::default();
        let mut tree = WidgetTree::<BufferScreen>::default();
        let a = probe(&mut tree, "a", &log);
        let label = probe(&mut tree, "label", &log);
        let b = probe(&mut tree, "b", &log);
        let hidden = probe(&mut tree, "hidden", &log);
        let group = container(&mut tree, &[hidden]);
        container(&mut tree, &[a, label, group, b]);
        tree.set_focusable(label, false);
        tree.set_focusable(group, false);

        assert_eq!(tree.next_focused(a), Some(b));
        assert_eq!(tree.prev_focused(b), Some(a));

        tree.set_focus(label);
        assert!(!tree.is_focused(label));
    }

    #[test]
    fn test_traversal_follows_tab_order_not_position() {
        let log = Log::default();
        let mut tree = WidgetTree::<BufferScreen>::default();
        let first = probe(&mut tree, "first", &log);
        let second = probe(&mut tree, "second", &log);
        let window = container(&mut tree, &[first]);
        tree.insert_child(Some(window), second, Some(0));

        assert_eq!(tree.children(window), vec![second, first]);
        assert_eq!(tree.next_focused(first), Some(second));
        assert_eq!(tree.next_focused(second), Some(first));
    }

    #[test]
    fn test_root_stack() {
        let log = Log::default();
        let mut tree = WidgetTree::<BufferScreen>::default();
        let a_leaf = probe(&mut tree, "a", &log);
        let b_leaf = probe(&mut tree, "b", &log);
        let a = container(&mut tree, &[a_leaf]);
        let b = container(&mut tree, &[b_leaf]);

        tree.add_root(a);
        tree.add_root(b);
        assert_eq!(tree.head_root(), Some(b));
        assert!(!tree.is_focused(a_leaf));
        assert!(tree.is_focused(b_leaf));

        tree.delete_root(b);
        assert_eq!(tree.head_root(), Some(a));
        assert!(tree.is_focused(a_leaf));
        assert_eq!(
            *log.borrow(),
            vec!["focus a", "blur a", "focus b", "blur b", "focus a"]
        );
    }

    #[test]
    fn test_add_root_promotes_existing() {
        let log = Log::default();
        let mut tree = WidgetTree::<BufferScreen>::default();
        let a = probe(&mut tree, "a", &log);
        let b = probe(&mut tree, "b", &log);
        let c = probe(&mut tree, "c", &log);
        tree.insert_child(None, a, None);
        tree.add_root(b);
        tree.add_root(c);
        tree.add_root(a);

        assert_eq!(tree.roots().collect::<Vec<_>>(), vec![a, c, b]);
        assert!(tree.is_focused(a));
        assert!(!tree.is_focused(c));
    }

    #[test]
    fn test_sink_root() {
        let log = Log::default();
        let mut tree = WidgetTree::<BufferScreen>::default();
        let a = probe(&mut tree, "a", &log);
        let b = probe(&mut tree, "b", &log);
        let c = probe(&mut tree, "c", &log);
        tree.add_root(a);
        tree.add_root(b);
        tree.add_root(c);

        tree.sink_root();
        assert_eq!(tree.roots().collect::<Vec<_>>(), vec![b, c, a]);
        assert!(tree.is_focused(b));
        assert!(!tree.is_focused(c));
    }

    #[test]
    fn test_destroying_head_refocuses_next() {
        let log = Log::default();
        let mut tree = WidgetTree::<BufferScreen>::default();
        let main = probe(&mut tree, "main", &log);
        let dialog_button = probe(&mut tree, "ok", &log);
        let dialog = container(&mut tree, &[dialog_button]);
        tree.add_root(main);
        tree.add_root(dialog);

        tree.destroy(dialog);
        assert!(!tree.contains(dialog_button));
        assert_eq!(tree.head_root(), Some(main));
        assert!(tree.is_focused(main));
    }
}
