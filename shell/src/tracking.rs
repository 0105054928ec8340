//! Tracking runtime seam.
//!
//! The client talks to the XR runtime only through [`TrackingContext`]:
//! runtime events (devices appearing, quit requests, system keyboard) and
//! per-tick action events (poses, buttons, analog sticks). A scripted
//! context lets tests and the headless binary drive whole sessions.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::controller::ControllerHandle;
use crate::math::{Mat4, Vec3};
use crate::spatial::FrustumTangents;

#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    DeviceActivate { controller: ControllerHandle },
    DeviceDeactivate { controller: ControllerHandle },
    Quit { reason: String },
    KeyboardPress { text: String },
    KeyboardClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseSource {
    /// Aim pose; drives the pointer ray.
    Pointer,
    /// Grip pose; anchors hand-attached containers.
    HandGrip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigitalAction {
    Grab,
    Menu,
    ResetOrientation,
    ShowKeyboard,
    LeftClick,
    RightClick,
    MiddleClick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalogAction {
    PushPull,
    PushPullScale,
    Scroll,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionEvent {
    Pose {
        source: PoseSource,
        controller: ControllerHandle,
        pose: Mat4,
        valid: bool,
        active: bool,
        device_connected: bool,
    },
    Digital {
        action: DigitalAction,
        controller: ControllerHandle,
        state: bool,
        changed: bool,
    },
    Analog {
        action: AnalogAction,
        controller: ControllerHandle,
        state: Vec3,
    },
}

impl ActionEvent {
    /// A valid, connected aim pose.
    pub fn pointer(controller: ControllerHandle, pose: Mat4) -> Self {
        Self::Pose {
            source: PoseSource::Pointer,
            controller,
            pose,
            valid: true,
            active: true,
            device_connected: true,
        }
    }

    pub fn hand_grip(controller: ControllerHandle, pose: Mat4) -> Self {
        Self::Pose {
            source: PoseSource::HandGrip,
            controller,
            pose,
            valid: true,
            active: true,
            device_connected: true,
        }
    }

    pub fn press(controller: ControllerHandle, action: DigitalAction) -> Self {
        Self::Digital {
            action,
            controller,
            state: true,
            changed: true,
        }
    }

    pub fn release(controller: ControllerHandle, action: DigitalAction) -> Self {
        Self::Digital {
            action,
            controller,
            state: false,
            changed: true,
        }
    }

    pub fn analog(controller: ControllerHandle, action: AnalogAction, x: f32, y: f32) -> Self {
        Self::Analog {
            action,
            controller,
            state: Vec3::new(x, y, 0.0),
        }
    }

    pub fn controller(&self) -> ControllerHandle {
        match self {
            Self::Pose { controller, .. }
            | Self::Digital { controller, .. }
            | Self::Analog { controller, .. } => *controller,
        }
    }
}

/// Everything the client needs from the XR runtime.
pub trait TrackingContext {
    /// Drain pending runtime events.
    fn poll_runtime(&mut self) -> Vec<RuntimeEvent>;
    /// Action events for one input tick.
    fn poll_actions(&mut self) -> Vec<ActionEvent>;
    fn acknowledge_quit(&mut self);
    /// Ask the runtime to open its system keyboard. Returns false when it
    /// has none.
    fn show_system_keyboard(&mut self) -> bool;
    fn hmd_pose(&self) -> Mat4;
    fn hmd_frustum(&self) -> FrustumTangents;
}

// ── ScriptedTracking ────────────────────────────────────────

#[derive(Debug)]
struct Script {
    runtime: VecDeque<RuntimeEvent>,
    ticks: VecDeque<Vec<ActionEvent>>,
    hmd: Mat4,
    frustum: FrustumTangents,
    quit_acks: usize,
    keyboard_requests: usize,
    keyboard_available: bool,
}

/// A tracking context fed from pre-defined queues.
///
/// Clones share the same script, so a test can keep one handle and push
/// events after handing another to the client.
#[derive(Debug, Clone)]
pub struct ScriptedTracking {
    script: Rc<RefCell<Script>>,
}

impl Default for ScriptedTracking {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTracking {
    pub fn new() -> Self {
        Self {
            script: Rc::new(RefCell::new(Script {
                runtime: VecDeque::new(),
                ticks: VecDeque::new(),
                hmd: Mat4::IDENTITY,
                frustum: FrustumTangents::default(),
                quit_acks: 0,
                keyboard_requests: 0,
                keyboard_available: true,
            })),
        }
    }

    pub fn push_runtime(&self, event: RuntimeEvent) {
        self.script.borrow_mut().runtime.push_back(event);
    }

    /// Queue the action events delivered by one input tick.
    pub fn push_tick(&self, events: Vec<ActionEvent>) {
        self.script.borrow_mut().ticks.push_back(events);
    }

    pub fn set_hmd_pose(&self, pose: Mat4) {
        self.script.borrow_mut().hmd = pose;
    }

    pub fn set_frustum(&self, frustum: FrustumTangents) {
        self.script.borrow_mut().frustum = frustum;
    }

    pub fn set_keyboard_available(&self, available: bool) {
        self.script.borrow_mut().keyboard_available = available;
    }

    /// Queued ticks not yet polled.
    pub fn remaining_ticks(&self) -> usize {
        self.script.borrow().ticks.len()
    }

    pub fn quit_acks(&self) -> usize {
        self.script.borrow().quit_acks
    }

    pub fn keyboard_requests(&self) -> usize {
        self.script.borrow().keyboard_requests
    }
}

impl TrackingContext for ScriptedTracking {
    fn poll_runtime(&mut self) -> Vec<RuntimeEvent> {
        self.script.borrow_mut().runtime.drain(..).collect()
    }

    fn poll_actions(&mut self) -> Vec<ActionEvent> {
        self.script.borrow_mut().ticks.pop_front().unwrap_or_default()
    }

    fn acknowledge_quit(&mut self) {
        self.script.borrow_mut().quit_acks += 1;
    }

    fn show_system_keyboard(&mut self) -> bool {
        let mut script = self.script.borrow_mut();
        script.keyboard_requests += 1;
        script.keyboard_available
    }

    fn hmd_pose(&self) -> Mat4 {
        self.script.borrow().hmd
    }

    fn hmd_frustum(&self) -> FrustumTangents {
        self.script.borrow().frustum
    }
}

// ── RecordingTracking ───────────────────────────────────────

/// Records every action event delivered by an inner context.
pub struct RecordingTracking<T: TrackingContext> {
    inner: T,
    recorded: Vec<ActionEvent>,
}

impl<T: TrackingContext> RecordingTracking<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            recorded: Vec::new(),
        }
    }

    pub fn recorded(&self) -> &[ActionEvent] {
        &self.recorded
    }

    pub fn into_recorded(self) -> Vec<ActionEvent> {
        self.recorded
    }
}

impl<T: TrackingContext> TrackingContext for RecordingTracking<T> {
    fn poll_runtime(&mut self) -> Vec<RuntimeEvent> {
        self.inner.poll_runtime()
    }

    fn poll_actions(&mut self) -> Vec<ActionEvent> {
        let events = self.inner.poll_actions();
        self.recorded.extend(events.iter().cloned());
        events
    }

    fn acknowledge_quit(&mut self) {
        self.inner.acknowledge_quit();
    }

    fn show_system_keyboard(&mut self) -> bool {
        self.inner.show_system_keyboard()
    }

    fn hmd_pose(&self) -> Mat4 {
        self.inner.hmd_pose()
    }

    fn hmd_frustum(&self) -> FrustumTangents {
        self.inner.hmd_frustum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_ticks_in_order() {
        let mut tracking = ScriptedTracking::new();
        tracking.push_tick(vec![ActionEvent::pointer(1, Mat4::IDENTITY)]);
        tracking.push_tick(vec![
            ActionEvent::press(1, DigitalAction::Grab),
            ActionEvent::analog(1, AnalogAction::Scroll, 0.0, 0.5),
        ]);
        assert_eq!(tracking.remaining_ticks(), 2);

        let first = tracking.poll_actions();
        assert!(matches!(first[0], ActionEvent::Pose { source: PoseSource::Pointer, .. }));
        let second = tracking.poll_actions();
        assert_eq!(second.len(), 2);
        assert!(tracking.poll_actions().is_empty());
    }

    #[test]
    fn test_clones_share_script() {
        let handle = ScriptedTracking::new();
        let mut ctx: Box<dyn TrackingContext> = Box::new(handle.clone());

        handle.push_runtime(RuntimeEvent::DeviceActivate { controller: 3 });
        handle.push_runtime(RuntimeEvent::Quit {
            reason: "user".to_string(),
        });
        let events = ctx.poll_runtime();
        assert_eq!(events.len(), 2);
        assert!(ctx.poll_runtime().is_empty());

        ctx.acknowledge_quit();
        assert_eq!(handle.quit_acks(), 1);

        handle.set_keyboard_available(false);
        assert!(!ctx.show_system_keyboard());
        assert_eq!(handle.keyboard_requests(), 1);
    }

    #[test]
    fn test_recording_tracking() {
        let scripted = ScriptedTracking::new();
        scripted.push_tick(vec![ActionEvent::hand_grip(2, Mat4::IDENTITY)]);
        scripted.push_tick(vec![ActionEvent::release(2, DigitalAction::Menu)]);

        let mut recording = RecordingTracking::new(scripted);
        recording.poll_actions();
        recording.poll_actions();
        recording.poll_actions();
        assert_eq!(recording.recorded().len(), 2);
        assert_eq!(recording.recorded()[1].controller(), 2);
        assert_eq!(recording.into_recorded().len(), 2);
    }

    #[test]
    fn test_hmd_pose_is_settable() {
        let tracking = ScriptedTracking::new();
        let pose = Mat4::translation(Vec3::new(0.0, 1.6, 0.0));
        tracking.set_hmd_pose(pose);
        assert_eq!(tracking.hmd_pose(), pose);
    }
}
