//! Desktop pointer synthesis.
//!
//! One controller at a time drives a single 2D pointer: its hover point
//! becomes cursor motion, three digital actions become mouse buttons and
//! analog scroll becomes wheel clicks (buttons 4/5 vertical, 6/7
//! horizontal).

use tracing::{debug, info};

use crate::controller::ControllerHandle;
use crate::math::Vec2;
use crate::window::{Window, WindowId};

/// Digital actions mapped onto mouse buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SynthAction {
    LeftClick,
    RightClick,
    MiddleClick,
}

impl SynthAction {
    pub fn button(self) -> u32 {
        match self {
            Self::LeftClick => 1,
            Self::MiddleClick => 2,
            Self::RightClick => 3,
        }
    }

    fn slot(self) -> usize {
        match self {
            Self::LeftClick => 0,
            Self::RightClick => 1,
            Self::MiddleClick => 2,
        }
    }
}

const SCROLL_UP: u32 = 4;
const SCROLL_DOWN: u32 = 5;
const SCROLL_LEFT: u32 = 6;
const SCROLL_RIGHT: u32 = 7;

#[derive(Debug, Clone, PartialEq)]
pub enum SynthEvent {
    Click {
        controller: ControllerHandle,
        window: WindowId,
        /// Pixel position on the window texture.
        position: Vec2,
        button: u32,
        state: bool,
    },
    MoveCursor {
        controller: ControllerHandle,
        window: WindowId,
        position: Vec2,
    },
}

/// Window-local point (current meters, centered, +Y up) to texture pixels
/// (origin top-left, +Y down).
pub fn local_to_pixels(window: &Window, local: Vec2) -> Vec2 {
    let size = window.current_size();
    let ppm = window.pixels_per_meter();
    Vec2::new(
        (local.x + size.x / 2.0) * ppm,
        (size.y / 2.0 - local.y) * ppm,
    )
}

#[derive(Debug, Default)]
pub struct InputSynth {
    synthing: Option<ControllerHandle>,
    scroll_accumulator: Vec2,
    scroll_threshold: f32,
    pressed: [bool; 3],
    last_cursor: Option<(WindowId, i64, i64)>,
}

impl InputSynth {
    pub fn new(scroll_threshold: f32) -> Self {
        Self {
            scroll_threshold,
            ..Self::default()
        }
    }

    pub fn set_scroll_threshold(&mut self, threshold: f32) {
        self.scroll_threshold = threshold;
    }

    pub fn synthing_controller(&self) -> Option<ControllerHandle> {
        self.synthing
    }

    pub fn is_synthing(&self, controller: ControllerHandle) -> bool {
        self.synthing == Some(controller)
    }

    pub fn hand_off_to_controller(&mut self, controller: ControllerHandle) {
        if self.synthing != Some(controller) {
            info!("input synth handed off to controller {}", controller);
        }
        self.synthing = Some(controller);
        self.reset_press_state();
        self.reset_scroll();
    }

    /// Forget the synthing controller, e.g. when the last one is gone.
    pub fn clear_controller(&mut self) {
        self.synthing = None;
        self.reset_press_state();
        self.reset_scroll();
    }

    pub fn reset_scroll(&mut self) {
        self.scroll_accumulator = Vec2::ZERO;
    }

    /// Drop held buttons and the last cursor position, so the next move
    /// is always reported.
    pub fn reset_press_state(&mut self) {
        self.pressed = [false; 3];
        self.last_cursor = None;
    }

    /// Cursor motion for the synthing controller. Repeated positions are
    /// dropped.
    pub fn move_cursor(
        &mut self,
        controller: ControllerHandle,
        id: WindowId,
        window: &Window,
        local: Vec2,
    ) -> Option<SynthEvent> {
        if !self.is_synthing(controller) {
            return None;
        }
        let position = local_to_pixels(window, local);
        let key = (id, position.x.round() as i64, position.y.round() as i64);
        if self.last_cursor == Some(key) {
            return None;
        }
        self.last_cursor = Some(key);
        Some(SynthEvent::MoveCursor {
            controller,
            window: id,
            position,
        })
    }

    /// Button press/release while hovering `window` at `local`.
    pub fn digital(
        &mut self,
        controller: ControllerHandle,
        action: SynthAction,
        state: bool,
        changed: bool,
        id: WindowId,
        window: &Window,
        local: Vec2,
    ) -> Option<SynthEvent> {
        if !changed || !self.is_synthing(controller) {
            return None;
        }
        let slot = action.slot();
        if !state && !self.pressed[slot] {
            // press was reset by a hover change; don't leak the release
            return None;
        }
        self.pressed[slot] = state;
        debug!("synth button {} {}", action.button(), if state { "down" } else { "up" });
        Some(SynthEvent::Click {
            controller,
            window: id,
            position: local_to_pixels(window, local),
            button: action.button(),
            state,
        })
    }

    /// Accumulate analog scroll and emit a press/release pair per threshold
    /// crossed.
    pub fn scroll(
        &mut self,
        controller: ControllerHandle,
        delta: Vec2,
        id: WindowId,
        window: &Window,
        local: Vec2,
    ) -> Vec<SynthEvent> {
        let mut events = Vec::new();
        if !self.is_synthing(controller) || self.scroll_threshold <= 0.0 {
            return events;
        }
        self.scroll_accumulator = self.scroll_accumulator + delta;
        let position = local_to_pixels(window, local);
        let threshold = self.scroll_threshold;

        let mut emit = |button: u32| {
            for state in [true, false] {
                events.push(SynthEvent::Click {
                    controller,
                    window: id,
                    position,
                    button,
                    state,
                });
            }
        };

        while self.scroll_accumulator.y.abs() >= threshold {
            if self.scroll_accumulator.y > 0.0 {
                emit(SCROLL_UP);
                self.scroll_accumulator.y -= threshold;
            } else {
                emit(SCROLL_DOWN);
                self.scroll_accumulator.y += threshold;
            }
        }
        while self.scroll_accumulator.x.abs() >= threshold {
            if self.scroll_accumulator.x > 0.0 {
                emit(SCROLL_RIGHT);
                self.scroll_accumulator.x -= threshold;
            } else {
                emit(SCROLL_LEFT);
                self.scroll_accumulator.x += threshold;
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::OverlaySurface;
    use crate::math::Mat4;
    use crate::window::{tests_support, WindowDesc};

    /// 2x1 m window with a 900x450 texture.
    fn window() -> Window {
        let desc = WindowDesc::from_pixels("term", 900, 450, 450.0).at(Mat4::IDENTITY);
        Window::new(&desc, Box::new(OverlaySurface::new(2.0, 1.0)))
    }

    fn synth() -> InputSynth {
        let mut s = InputSynth::new(0.1);
        s.hand_off_to_controller(1);
        s
    }

    #[test]
    fn test_local_to_pixels() {
        let w = window();
        let center = local_to_pixels(&w, Vec2::ZERO);
        assert!((center.x - 450.0).abs() < 1e-3 && (center.y - 225.0).abs() < 1e-3);
        let top_left = local_to_pixels(&w, Vec2::new(-1.0, 0.5));
        assert!(top_left.x.abs() < 1e-3 && top_left.y.abs() < 1e-3);
    }

    #[test]
    fn test_move_cursor_dedup_and_synth_only() {
        let w = window();
        let id = tests_support::id(0);
        let mut s = synth();
        assert!(s.move_cursor(1, id, &w, Vec2::ZERO).is_some());
        assert!(s.move_cursor(1, id, &w, Vec2::ZERO).is_none());
        assert!(s.move_cursor(1, id, &w, Vec2::new(0.1, 0.0)).is_some());
        assert!(s.move_cursor(2, id, &w, Vec2::new(0.3, 0.0)).is_none());
    }

    #[test]
    fn test_move_cursor_repeats_after_reset() {
        let w = window();
        let id = tests_support::id(0);
        let mut s = synth();
        assert!(s.move_cursor(1, id, &w, Vec2::ZERO).is_some());
        s.reset_press_state();
        assert!(s.move_cursor(1, id, &w, Vec2::ZERO).is_some());
    }

    #[test]
    fn test_click_buttons() {
        let w = window();
        let id = tests_support::id(0);
        let mut s = synth();
        let ev = s.digital(1, SynthAction::RightClick, true, true, id, &w, Vec2::ZERO);
        assert!(matches!(ev, Some(SynthEvent::Click { button: 3, state: true, .. })));
        let ev = s.digital(1, SynthAction::RightClick, false, true, id, &w, Vec2::ZERO);
        assert!(matches!(ev, Some(SynthEvent::Click { button: 3, state: false, .. })));
        // unchanged state is ignored
        assert!(s.digital(1, SynthAction::LeftClick, true, false, id, &w, Vec2::ZERO).is_none());
    }

    #[test]
    fn test_reset_press_state_swallows_release() {
        let w = window();
        let id = tests_support::id(0);
        let mut s = synth();
        s.digital(1, SynthAction::LeftClick, true, true, id, &w, Vec2::ZERO);
        s.reset_press_state();
        assert!(s.digital(1, SynthAction::LeftClick, false, true, id, &w, Vec2::ZERO).is_none());
    }

    #[test]
    fn test_scroll_accumulates_past_threshold() {
        let w = window();
        let id = tests_support::id(0);
        let mut s = synth();
        assert!(s.scroll(1, Vec2::new(0.0, 0.06), id, &w, Vec2::ZERO).is_empty());
        let events = s.scroll(1, Vec2::new(0.0, 0.06), id, &w, Vec2::ZERO);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], SynthEvent::Click { button: 4, state: true, .. }));
        assert!(matches!(events[1], SynthEvent::Click { button: 4, state: false, .. }));

        let events = s.scroll(1, Vec2::new(-0.25, -0.02), id, &w, Vec2::ZERO);
        let buttons: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                SynthEvent::Click { button, state: true, .. } => Some(*button),
                _ => None,
            })
            .collect();
        assert_eq!(buttons, vec![6, 6]);
    }

    #[test]
    fn test_reset_scroll_drops_partial_accumulation() {
        let w = window();
        let id = tests_support::id(0);
        let mut s = synth();
        s.scroll(1, Vec2::new(0.0, -0.08), id, &w, Vec2::ZERO);
        s.reset_scroll();
        assert!(s.scroll(1, Vec2::new(0.0, -0.05), id, &w, Vec2::ZERO).is_empty());
    }

    #[test]
    fn test_hand_off() {
        let mut s = InputSynth::new(0.1);
        assert_eq!(s.synthing_controller(), None);
        s.hand_off_to_controller(5);
        assert!(s.is_synthing(5));
        s.clear_controller();
        assert_eq!(s.synthing_controller(), None);
    }
}
