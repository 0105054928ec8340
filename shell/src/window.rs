//! Window entities and the generational arena that owns them.
//!
//! Hover and grab state refer to windows by `WindowId`. Once a window is
//! removed its slot generation is bumped, so stale ids resolve to `None`.

use std::fmt;
use std::ops::BitOr;

use crate::backend::{SurfaceHit, WindowSurface};
use crate::math::{Mat4, Vec2, Vec3};
use crate::spatial::Ray;

/// Stable handle to a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId {
    index: u32,
    generation: u32,
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Window management flags, assigned when a window is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowFlags(u8);

impl WindowFlags {
    pub const NONE: Self = Self(0);
    pub const HOVERABLE: Self = Self(1 << 0);
    pub const DRAGGABLE: Self = Self(1 << 1);
    /// Positioned by arrange operations.
    pub const MANAGED: Self = Self(1 << 2);
    pub const DESTROY_WITH_PARENT: Self = Self(1 << 3);
    pub const MANAGER_BUTTON: Self = Self(1 << 4);

    /// Flags of a regular desktop window.
    pub fn desktop(draggable: bool) -> Self {
        let base = Self::HOVERABLE | Self::DESTROY_WITH_PARENT;
        if draggable {
            base | Self::DRAGGABLE | Self::MANAGED
        } else {
            base
        }
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for WindowFlags {
    type Output = Self;
    fn bitor(self, o: Self) -> Self {
        Self(self.0 | o.0)
    }
}

/// Everything needed to create a window.
#[derive(Debug, Clone)]
pub struct WindowDesc {
    pub title: String,
    pub width_meters: f32,
    pub height_meters: f32,
    pub texture_width: u32,
    pub texture_height: u32,
    pub native: u64,
    pub transform: Mat4,
}

impl WindowDesc {
    /// Window sized from its texture at `ppm` pixels per meter.
    pub fn from_pixels(title: &str, texture_width: u32, texture_height: u32, ppm: f32) -> Self {
        Self {
            title: title.to_string(),
            width_meters: texture_width as f32 / ppm,
            height_meters: texture_height as f32 / ppm,
            texture_width,
            texture_height,
            native: 0,
            transform: Mat4::IDENTITY,
        }
    }

    /// Window with a fixed metric size and a texture to match.
    pub fn from_meters(title: &str, width: f32, height: f32, ppm: f32) -> Self {
        Self {
            title: title.to_string(),
            width_meters: width,
            height_meters: height,
            texture_width: (width * ppm).round().max(1.0) as u32,
            texture_height: (height * ppm).round().max(1.0) as u32,
            native: 0,
            transform: Mat4::IDENTITY,
        }
    }

    /// Rebuild the description of a snapshotted window.
    pub fn from_state(state: &WindowState) -> Self {
        Self {
            title: state.title.clone(),
            width_meters: state.initial_size.x,
            height_meters: state.initial_size.y,
            texture_width: state.texture_width,
            texture_height: state.texture_height,
            native: state.native,
            transform: state.transform,
        }
    }

    pub fn with_native(mut self, native: u64) -> Self {
        self.native = native;
        self
    }

    pub fn at(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }
}

/// Value snapshot of a window, used to rebuild it on another backend.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowState {
    pub title: String,
    pub native: u64,
    pub transform: Mat4,
    pub reset_transform: Option<Mat4>,
    pub scale: f32,
    pub initial_size: Vec2,
    pub current_size: Vec2,
    pub texture_width: u32,
    pub texture_height: u32,
    pub pinned: bool,
    pub draggable: bool,
    /// Index of the child window within the same snapshot.
    pub child_index: Option<usize>,
    pub child_offset: Vec2,
}

/// A 2D surface placed in 3D space.
#[derive(Debug)]
pub struct Window {
    pub title: String,
    pub native: u64,
    pub flags: WindowFlags,
    pub texture_width: u32,
    pub texture_height: u32,
    pub pinned: bool,
    pub visible: bool,
    /// Selection-mode or button highlight.
    pub selected: bool,
    pub reset_transform: Option<Mat4>,
    pub(crate) parent: Option<WindowId>,
    pub(crate) child: Option<WindowId>,
    pub(crate) child_offset: Vec2,
    surface: Box<dyn WindowSurface>,
}

impl Window {
    pub fn new(desc: &WindowDesc, surface: Box<dyn WindowSurface>) -> Self {
        let mut window = Self {
            title: desc.title.clone(),
            native: desc.native,
            flags: WindowFlags::NONE,
            texture_width: desc.texture_width,
            texture_height: desc.texture_height,
            pinned: false,
            visible: true,
            selected: false,
            reset_transform: None,
            parent: None,
            child: None,
            child_offset: Vec2::ZERO,
            surface,
        };
        window.set_transform(desc.transform);
        window
    }

    pub fn surface(&self) -> &dyn WindowSurface {
        self.surface.as_ref()
    }

    pub fn transform(&self) -> Mat4 {
        self.surface.transform()
    }

    /// Transform without scale, where pointer tips and cursors are placed.
    pub fn transform_no_scale(&self) -> Mat4 {
        self.surface.transform().without_scale()
    }

    pub fn set_transform(&mut self, transform: Mat4) {
        self.surface.set_transform(transform);
    }

    pub fn position(&self) -> Vec3 {
        self.transform().get_translation()
    }

    /// Uniform scale factor carried by the transform.
    pub fn scale(&self) -> f32 {
        self.transform().get_scale().x
    }

    /// Rescale about the window center. Non-positive scales are rejected.
    pub fn set_scale(&mut self, scale: f32) -> bool {
        if !(scale.is_finite() && scale > 0.0) {
            return false;
        }
        let rigid = self.transform().without_scale();
        self.set_transform(rigid.mul(&Mat4::scale(scale, scale, scale)));
        true
    }

    pub fn initial_size(&self) -> Vec2 {
        self.surface.local_size()
    }

    pub fn current_size(&self) -> Vec2 {
        self.initial_size() * self.scale()
    }

    /// Texture pixels per current meter, horizontally.
    pub fn pixels_per_meter(&self) -> f32 {
        let width = self.current_size().x;
        if width <= 0.0 {
            return 0.0;
        }
        self.texture_width as f32 / width
    }

    pub fn intersect(&self, ray: &Ray) -> Option<SurfaceHit> {
        self.surface.intersect_ray(ray)
    }

    pub fn parent(&self) -> Option<WindowId> {
        self.parent
    }

    pub fn child(&self) -> Option<WindowId> {
        self.child
    }

    pub fn child_offset(&self) -> Vec2 {
        self.child_offset
    }

    pub fn is_button(&self) -> bool {
        self.flags.contains(WindowFlags::MANAGER_BUTTON)
    }

    pub fn is_draggable(&self) -> bool {
        self.flags.contains(WindowFlags::DRAGGABLE)
    }
}

struct Slot {
    generation: u32,
    window: Option<Window>,
}

/// Generational arena of windows.
#[derive(Default)]
pub struct WindowArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl WindowArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, window: Window) -> WindowId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.window = Some(window);
            return WindowId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            window: Some(window),
        });
        WindowId {
            index,
            generation: 0,
        }
    }

    pub fn remove(&mut self, id: WindowId) -> Option<Window> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let window = slot.window.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(window)
    }

    pub fn get(&self, id: WindowId) -> Option<&Window> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.window.as_ref()
    }

    pub fn get_mut(&mut self, id: WindowId) -> Option<&mut Window> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.window.as_mut()
    }

    pub fn contains(&self, id: WindowId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.window.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::OverlaySurface;

    fn test_window(title: &str) -> Window {
        let desc = WindowDesc::from_pixels(title, 900, 450, 450.0);
        Window::new(&desc, Box::new(OverlaySurface::new(desc.width_meters, desc.height_meters)))
    }

    #[test]
    fn test_stale_id_is_not_found() {
        let mut arena = WindowArena::new();
        let a = arena.insert(test_window("a"));
        assert!(arena.remove(a).is_some());
        let b = arena.insert(test_window("b"));

        // slot reused, old id stays dead
        assert!(arena.get(a).is_none());
        assert!(arena.remove(a).is_none());
        assert_eq!(arena.get(b).map(|w| w.title.as_str()), Some("b"));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_flags() {
        let flags = WindowFlags::HOVERABLE | WindowFlags::DRAGGABLE;
        assert!(flags.contains(WindowFlags::HOVERABLE));
        assert!(!flags.contains(WindowFlags::MANAGER_BUTTON));
        assert!(flags.contains(WindowFlags::NONE));
    }

    #[test]
    fn test_scale_and_sizes() {
        let mut w = test_window("w");
        assert!((w.initial_size().x - 2.0).abs() < 1e-6);
        assert!((w.pixels_per_meter() - 450.0).abs() < 1e-3);

        assert!(w.set_scale(2.0));
        assert!((w.scale() - 2.0).abs() < 1e-5);
        assert!((w.current_size().y - 2.0).abs() < 1e-5);
        assert!((w.pixels_per_meter() - 225.0).abs() < 1e-2);

        assert!(!w.set_scale(0.0));
        assert!(!w.set_scale(-1.0));
        assert!((w.scale() - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_set_scale_keeps_pose() {
        let mut w = test_window("w");
        w.set_transform(Mat4::translation(Vec3::new(1.0, 2.0, -3.0)));
        w.set_scale(0.5);
        assert!(w.position().distance(Vec3::new(1.0, 2.0, -3.0)) < 1e-6);
    }
}
