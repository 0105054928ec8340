//! Desktop cursor drawn on the window the synth controller points at.

use crate::math::{Mat4, Vec2, Vec3};
use crate::window::{Window, WindowId};

/// Distance in front of the window plane, avoids z-fighting.
const SURFACE_OFFSET: f32 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DesktopCursor {
    pub visible: bool,
    pub window: Option<WindowId>,
    /// Window-local position, current meters, centered.
    pub position: Vec2,
    pub transform: Mat4,
}

impl Default for DesktopCursor {
    fn default() -> Self {
        Self {
            visible: false,
            window: None,
            position: Vec2::ZERO,
            transform: Mat4::IDENTITY,
        }
    }
}

impl DesktopCursor {
    pub fn show(&mut self) {
        self.visible = true;
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    /// Follow the hover point on `window`.
    pub fn update(&mut self, id: WindowId, window: &Window, local: Vec2) {
        self.window = Some(id);
        self.position = local;
        self.transform = window
            .transform_no_scale()
            .mul(&Mat4::translation(Vec3::new(local.x, local.y, SURFACE_OFFSET)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::OverlaySurface;
    use crate::window::{tests_support, WindowDesc};

    #[test]
    fn test_cursor_follows_hover_point() {
        let desc = WindowDesc::from_pixels("term", 450, 450, 450.0)
            .at(Mat4::translation(Vec3::new(0.0, 1.0, -2.0)));
        let window = Window::new(&desc, Box::new(OverlaySurface::new(1.0, 1.0)));
        let mut cursor = DesktopCursor::default();
        assert!(!cursor.visible);

        cursor.show();
        cursor.update(tests_support::id(0), &window, Vec2::new(0.25, -0.1));
        let p = cursor.transform.get_translation();
        assert!(p.distance(Vec3::new(0.25, 0.9, -1.999)) < 1e-5, "p={:?}", p);
        assert!(cursor.visible);

        cursor.hide();
        assert!(!cursor.visible);
        assert_eq!(cursor.window, Some(tests_support::id(0)));
    }
}
