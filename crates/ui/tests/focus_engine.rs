//! Focus engine behaviour through the public API
//!
//! Builds a small file-manager layout: a main window with two panels and
//! a command line, plus a modal confirmation dialog.

use std::cell::RefCell;
use std::rc::Rc;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tfm_ui::{Blank, BufferScreen, Rect, Screen, Widget, WidgetId, WidgetKind, WidgetTree};

type Events = Rc<RefCell<Vec<String>>>;

struct Named {
    name: &'static str,
    events: Events,
}

impl Widget for Named {
    fn draw(&mut self, screen: &mut dyn Screen, area: Rect, focused: bool) {
        let marker = if focused { ">" } else { " " };
        screen.put_str(area.x, area.y, &format!("{marker}{}", self.name));
    }

    fn on_focus(&mut self) -> bool {
        self.events.borrow_mut().push(format!("+{}", self.name));
        false
    }

    fn on_blur(&mut self) {
        self.events.borrow_mut().push(format!("-{}", self.name));
    }
}

struct Layout {
    tree: WidgetTree<BufferScreen>,
    events: Events,
    main: WidgetId,
    left: WidgetId,
    right: WidgetId,
    cmdline: WidgetId,
}

fn named(tree: &mut WidgetTree<BufferScreen>, name: &'static str, events: &Events) -> WidgetId {
    tree.create(
        Box::new(Named {
            name,
            events: events.clone(),
        }),
        WidgetKind::Leaf,
    )
}

fn layout() -> Layout {
    let events = Events::default();
    let mut tree = WidgetTree::new(BufferScreen::default());
    let main = tree.create(Box::new(Blank), WidgetKind::Container);
    let panels = tree.create(Box::new(Blank), WidgetKind::Layout);
    let left = named(&mut tree, "left", &events);
    let right = named(&mut tree, "right", &events);
    let cmdline = named(&mut tree, "cmdline", &events);

    tree.set_area(main, Rect::new(0, 0, 80, 24));
    tree.set_area(panels, Rect::new(0, 0, 80, 23));
    tree.insert_child(Some(panels), left, None);
    tree.insert_child(Some(panels), right, None);
    tree.insert_child(Some(main), panels, None);
    tree.insert_child(Some(main), cmdline, None);
    tree.insert_child(None, main, None);

    Layout {
        tree,
        events,
        main,
        left,
        right,
        cmdline,
    }
}

#[test]
fn new_root_focuses_first_leaf() {
    let l = layout();
    assert_eq!(l.tree.head_root(), Some(l.main));
    assert!(l.tree.is_focused(l.left));
    assert_eq!(l.tree.area(l.right), Some(Rect::new(0, 0, 80, 23)));
}

#[test]
fn tab_cycles_through_the_window() {
    let mut l = layout();
    let tab = KeyEvent::new(KeyCode::Tab, KeyModifiers::NONE);

    let mut order = Vec::new();
    for _ in 0..4 {
        l.tree.dispatch_key(tab);
        order.push(l.tree.focused_widget(l.main));
    }
    assert_eq!(
        order,
        vec![Some(l.right), Some(l.cmdline), Some(l.left), Some(l.right)]
    );
}

#[test]
fn modal_dialog_returns_focus() {
    let mut l = layout();
    l.tree.set_focus(l.cmdline);

    let dialog = l.tree.create(Box::new(Blank), WidgetKind::Container);
    let yes = named(&mut l.tree, "yes", &l.events);
    let no = named(&mut l.tree, "no", &l.events);
    l.tree.insert_child(Some(dialog), yes, None);
    l.tree.insert_child(Some(dialog), no, None);

    l.tree.add_root(dialog);
    assert!(l.tree.is_focused(yes));
    assert!(!l.tree.is_focused(l.cmdline));

    l.tree.delete_root(dialog);
    assert_eq!(l.tree.head_root(), Some(l.main));
    assert!(l.tree.is_focused(l.cmdline));

    assert_eq!(
        *l.events.borrow(),
        vec!["+left", "-left", "+cmdline", "-cmdline", "+yes", "-yes", "+cmdline"]
    );
}

#[test]
fn reparenting_keeps_the_widget() {
    let mut l = layout();
    let panels = l.tree.parent(l.left).unwrap();
    let before = l.tree.len(panels);

    l.tree.delete_child(panels, l.left, false);
    assert_eq!(l.tree.parent(l.left), None);
    assert!(!l.tree.is_focused(l.left));
    assert_eq!(l.tree.len(panels), before - 1);

    l.tree.insert_child(Some(l.main), l.left, Some(0));
    assert_eq!(l.tree.parent(l.left), Some(l.main));
    assert_eq!(l.tree.children(l.main)[0], l.left);
}

#[test]
fn locked_window_draws_nothing() {
    let mut l = layout();
    l.tree.screen_mut().clear();
    l.tree.lock_redraw(l.main);
    l.tree.dispatch_key(KeyEvent::new(KeyCode::Tab, KeyModifiers::NONE));
    assert!(l.tree.is_focused(l.right));
    assert!(l.tree.screen().writes.is_empty());

    l.tree.unlock_redraw(l.main);
    l.tree.redraw(l.main);
    assert_eq!(l.tree.screen().texts(), vec![" left", ">right", " cmdline"]);
}
