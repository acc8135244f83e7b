#![forbid(unsafe_code)]

//! Event boundary to the application layer.
//!
//! The decoder produces [`Event`] values; hosts implement [`EventHandler`]
//! and route a decoded batch through [`dispatch`]. Every callback has a
//! no-op default so handlers register only what they consume.

use crate::event::{Event, KeyEvent, KeyEventKind, MouseEvent};

/// Caller-registered callbacks for decoded events.
pub trait EventHandler {
    /// A key was pressed.
    fn on_key_press(&mut self, _event: KeyEvent) {}

    /// A key was released (synthesized; terminals do not report key-up).
    fn on_key_release(&mut self, _event: KeyEvent) {}

    /// The Escape key, resolved after the ambiguity timeout.
    fn on_escape(&mut self) {}

    /// A mouse event.
    fn on_mouse(&mut self, _event: MouseEvent) {}
}

/// Route a batch of decoded events to a handler, in order.
pub fn dispatch<I>(handler: &mut dyn EventHandler, events: I)
where
    I: IntoIterator<Item = Event>,
{
    for event in events {
        match event {
            Event::Key(key) => match key.kind {
                KeyEventKind::Press => handler.on_key_press(key),
                KeyEventKind::Release => handler.on_key_release(key),
            },
            Event::Escape => handler.on_escape(),
            Event::Mouse(mouse) => handler.on_mouse(mouse),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{KeyCode, MouseButton, MouseEventKind};

    #[derive(Debug, Default)]
    struct Recorder {
        presses: Vec<KeyCode>,
        releases: Vec<KeyCode>,
        escapes: usize,
        mice: Vec<MouseEvent>,
    }

    impl EventHandler for Recorder {
        fn on_key_press(&mut self, event: KeyEvent) {
            self.presses.push(event.code);
        }

        fn on_key_release(&mut self, event: KeyEvent) {
            self.releases.push(event.code);
        }

        fn on_escape(&mut self) {
            self.escapes += 1;
        }

        fn on_mouse(&mut self, event: MouseEvent) {
            self.mice.push(event);
        }
    }

    #[test]
    fn routes_each_variant_to_its_callback() {
        let mut rec = Recorder::default();
        let mouse = MouseEvent::new(MouseEventKind::Press(MouseButton::Left), 3, 4);
        dispatch(
            &mut rec,
            [
                Event::Key(KeyEvent::new(KeyCode::Char('a'))),
                Event::Key(KeyEvent::new(KeyCode::Char('a')).with_kind(KeyEventKind::Release)),
                Event::Escape,
                Event::Mouse(mouse),
            ],
        );
        assert_eq!(rec.presses, [KeyCode::Char('a')]);
        assert_eq!(rec.releases, [KeyCode::Char('a')]);
        assert_eq!(rec.escapes, 1);
        assert_eq!(rec.mice, [mouse]);
    }

    #[test]
    fn unimplemented_callbacks_default_to_no_op() {
        struct OnlyKeys(usize);
        impl EventHandler for OnlyKeys {
            fn on_key_press(&mut self, _event: KeyEvent) {
                self.0 += 1;
            }
        }
        let mut h = OnlyKeys(0);
        dispatch(
            &mut h,
            [
                Event::Escape,
                Event::Key(KeyEvent::new(KeyCode::Enter)),
                Event::Mouse(MouseEvent::new(MouseEventKind::Moved, 1, 1)),
            ],
        );
        assert_eq!(h.0, 1);
    }
}
