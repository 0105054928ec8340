//! Per-controller pointer, hover and grab state.

use crate::math::{Mat4, Quat, Vec2, Vec3};
use crate::spatial::hmd_window_distance;
use crate::window::WindowId;

/// Opaque controller handle from the tracking runtime.
pub type ControllerHandle = u64;

/// Pointer tip width at one meter from the head.
const TIP_WIDTH_PER_METER: f32 = 0.05;

/// What a controller currently points at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoverState {
    pub window: Option<WindowId>,
    /// World-space intersection point.
    pub point: Vec3,
    /// Window-local point (current meters, centered).
    pub local: Vec2,
    pub distance: f32,
    pub pose: Mat4,
}

impl Default for HoverState {
    fn default() -> Self {
        Self {
            window: None,
            point: Vec3::ZERO,
            local: Vec2::ZERO,
            distance: 0.0,
            pose: Mat4::IDENTITY,
        }
    }
}

/// Which analog gesture a grab is locked into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScaleLock {
    #[default]
    None,
    Scale,
    PushPull,
}

/// In-flight animation of a grabbed window's orientation back to identity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationReset {
    pub from: Quat,
    pub from_neg: Quat,
    pub progress: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrabState {
    pub window: Option<WindowId>,
    /// Hover point in window-local (unscaled) coordinates at grab start.
    pub offset: Vec3,
    pub window_rotation: Quat,
    /// Undoes the controller rotation at grab start.
    pub rotation_neg: Quat,
    pub lock: ScaleLock,
    pub reset: Option<OrientationReset>,
}

impl Default for GrabState {
    fn default() -> Self {
        Self {
            window: None,
            offset: Vec3::ZERO,
            window_rotation: Quat::IDENTITY,
            rotation_neg: Quat::IDENTITY,
            lock: ScaleLock::None,
            reset: None,
        }
    }
}

/// Visible pointer ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerRay {
    pub transform: Mat4,
    pub length: f32,
    pub default_length: f32,
}

impl PointerRay {
    pub fn new(default_length: f32) -> Self {
        Self {
            transform: Mat4::IDENTITY,
            length: default_length,
            default_length,
        }
    }

    pub fn move_to(&mut self, pose: &Mat4) {
        self.transform = *pose;
    }

    pub fn set_length(&mut self, length: f32) {
        self.length = length;
    }

    pub fn reset_length(&mut self) {
        self.length = self.default_length;
    }
}

/// Marker drawn where the pointer ray ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerTip {
    pub transform: Mat4,
    pub active: bool,
    /// Distance-compensated width in meters.
    pub apparent_size: f32,
    pulse: bool,
}

impl Default for PointerTip {
    fn default() -> Self {
        Self {
            transform: Mat4::IDENTITY,
            active: false,
            apparent_size: TIP_WIDTH_PER_METER,
            pulse: false,
        }
    }
}

impl PointerTip {
    /// Place the tip on a window surface, oriented like the window.
    pub fn update(&mut self, window_pose: &Mat4, point: Vec3) {
        let mut transform = window_pose.without_scale();
        transform.set_translation(point);
        self.transform = transform;
    }

    pub fn set_transformation(&mut self, transform: Mat4) {
        self.transform = transform;
    }

    /// Keep the apparent size constant regardless of distance to the head.
    pub fn update_apparent_size(&mut self, hmd: &Mat4) {
        let distance = hmd_window_distance(hmd, &self.transform);
        self.apparent_size = TIP_WIDTH_PER_METER * distance.max(0.01);
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn animate_pulse(&mut self) {
        self.pulse = true;
    }

    /// Consume a pending pulse trigger.
    pub fn take_pulse(&mut self) -> bool {
        std::mem::take(&mut self.pulse)
    }

    pub fn pulse_pending(&self) -> bool {
        self.pulse
    }
}

/// One tracked physical controller.
#[derive(Debug, Clone)]
pub struct Controller {
    handle: ControllerHandle,
    pub pose: Mat4,
    pub hand_grip_pose: Mat4,
    pub hover: HoverState,
    pub grab: GrabState,
    pub pointer: PointerRay,
    pub tip: PointerTip,
}

impl Controller {
    pub fn new(handle: ControllerHandle, pointer_length: f32) -> Self {
        Self {
            handle,
            pose: Mat4::IDENTITY,
            hand_grip_pose: Mat4::IDENTITY,
            hover: HoverState::default(),
            grab: GrabState::default(),
            pointer: PointerRay::new(pointer_length),
            tip: PointerTip::default(),
        }
    }

    pub fn handle(&self) -> ControllerHandle {
        self.handle
    }

    pub fn hovered(&self) -> Option<WindowId> {
        self.hover.window
    }

    pub fn grabbed(&self) -> Option<WindowId> {
        self.grab.window
    }

    pub fn reset_hover_state(&mut self) {
        self.hover = HoverState::default();
    }

    pub fn reset_grab_state(&mut self) {
        self.grab = GrabState::default();
    }

    pub fn update_pose_hand_grip(&mut self, pose: &Mat4) {
        self.hand_grip_pose = *pose;
    }

    /// Drop every reference to `window`. Returns true if any was held.
    pub fn forget_window(&mut self, window: WindowId) -> bool {
        let mut cleared = false;
        if self.hover.window == Some(window) {
            self.reset_hover_state();
            self.pointer.reset_length();
            self.tip.set_active(false);
            cleared = true;
        }
        if self.grab.window == Some(window) {
            self.reset_grab_state();
            cleared = true;
        }
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::tests_support;

    #[test]
    fn test_forget_window_clears_both_states() {
        let id = tests_support::id(4);
        let mut c = Controller::new(7, 5.0);
        c.hover.window = Some(id);
        c.hover.distance = 2.0;
        c.pointer.set_length(2.0);
        c.grab.window = Some(id);
        c.grab.lock = ScaleLock::Scale;

        assert!(c.forget_window(id));
        assert_eq!(c.hovered(), None);
        assert_eq!(c.grabbed(), None);
        assert_eq!(c.grab.lock, ScaleLock::None);
        assert!((c.pointer.length - 5.0).abs() < 1e-6);
        assert!(!c.forget_window(id));
    }

    #[test]
    fn test_pulse_is_one_shot() {
        let mut tip = PointerTip::default();
        tip.animate_pulse();
        assert!(tip.take_pulse());
        assert!(!tip.take_pulse());
    }

    #[test]
    fn test_apparent_size_grows_with_distance() {
        let mut tip = PointerTip::default();
        tip.set_transformation(Mat4::translation(Vec3::new(0.0, 0.0, -1.0)));
        tip.update_apparent_size(&Mat4::IDENTITY);
        let near = tip.apparent_size;
        tip.set_transformation(Mat4::translation(Vec3::new(0.0, 0.0, -4.0)));
        tip.update_apparent_size(&Mat4::IDENTITY);
        assert!((tip.apparent_size / near - 4.0).abs() < 1e-4);
    }

    #[test]
    fn test_tip_update_uses_point() {
        let mut tip = PointerTip::default();
        let pose = Mat4::translation(Vec3::new(0.0, 0.0, -2.0)).mul(&Mat4::scale(3.0, 3.0, 3.0));
        tip.update(&pose, Vec3::new(0.5, 0.25, -2.0));
        assert!(tip.transform.get_translation().distance(Vec3::new(0.5, 0.25, -2.0)) < 1e-6);
        assert!((tip.transform.get_scale().x - 1.0).abs() < 1e-5);
    }
}
