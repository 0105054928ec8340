//! Window manager: owns windows and containers and drives the per-controller
//! hover/grab state machine.
//!
//! Every entry point that can change interaction state returns the resulting
//! `WmEvent`s in order. A hover change always yields `HoverEnd` for the old
//! window before `HoverStart` for the new one.
//!
//! Manager operations never hold controllers; callers pass them in. Window
//! references inside controllers are `WindowId`s, and every lookup of a
//! removed window resolves to `None` and turns the operation into a no-op.

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::backend::{BackendKind, SurfaceFactory, SurfaceHit};
use crate::config::ShellConfig;
use crate::container::{Attachment, Container, ContainerId};
use crate::controller::{Controller, ControllerHandle, GrabState, OrientationReset, ScaleLock};
use crate::math::{Mat4, Quat, Vec2, Vec3};
use crate::spatial::{frustum_angles, sphere_to_3d_coords, FrustumTangents, Ray};
use crate::window::{Window, WindowArena, WindowDesc, WindowFlags, WindowId, WindowState};

const UP: Vec3 = Vec3 {
    x: 0.0,
    y: 1.0,
    z: 0.0,
};

/// Interaction events, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum WmEvent {
    HoverStart {
        controller: ControllerHandle,
        window: WindowId,
    },
    Hover {
        controller: ControllerHandle,
        window: WindowId,
        point: Vec3,
        local: Vec2,
        distance: f32,
        pose: Mat4,
    },
    HoverEnd {
        controller: ControllerHandle,
        window: WindowId,
    },
    /// Nothing is hovered by this controller. Emitted every such update.
    NoHover {
        controller: ControllerHandle,
        pose: Mat4,
    },
    GrabStart {
        controller: ControllerHandle,
        window: WindowId,
    },
    /// Drag update. `pose` is the grab point, oriented like the window.
    Grab {
        controller: ControllerHandle,
        window: WindowId,
        pose: Mat4,
    },
    Release {
        controller: ControllerHandle,
        window: WindowId,
    },
}

pub struct WindowManager {
    config: ShellConfig,
    factory: Box<dyn SurfaceFactory>,
    windows: WindowArena,
    /// Insertion order.
    order: Vec<WindowId>,
    containers: Vec<(ContainerId, Container)>,
    next_container: u32,
    pinned_only: bool,
}

impl WindowManager {
    pub fn new(config: ShellConfig, factory: Box<dyn SurfaceFactory>) -> Self {
        info!("window manager created for {} backend", factory.kind());
        Self {
            config,
            factory,
            windows: WindowArena::new(),
            order: Vec::new(),
            containers: Vec::new(),
            next_container: 0,
            pinned_only: false,
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.factory.kind()
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ShellConfig) {
        self.config = config;
    }

    /// Tear down, handing back the surface factory.
    pub fn into_factory(self) -> Box<dyn SurfaceFactory> {
        self.factory
    }

    // ── Windows ──────────────────────────────────────────────

    /// Create a surface for `desc` and register the window.
    /// The initial transform is kept as the window's reset transform.
    pub fn add_window(&mut self, desc: &WindowDesc, flags: WindowFlags) -> anyhow::Result<WindowId> {
        let surface = self
            .factory
            .create(&desc.title, desc.width_meters, desc.height_meters)
            .with_context(|| format!("creating {} surface for '{}'", self.kind(), desc.title))?;

        let mut window = Window::new(desc, surface);
        window.flags = flags;
        window.reset_transform = Some(desc.transform);
        if self.pinned_only && !window.is_button() && !window.pinned {
            window.visible = false;
        }

        let id = self.windows.insert(window);
        self.order.push(id);
        info!("window {} '{}' added ({} total)", id, desc.title, self.order.len());
        Ok(id)
    }

    /// Remove a window and, transitively, children flagged destroy-with-parent.
    /// Returns every removed id so callers can clear controller references.
    pub fn remove_window(&mut self, id: WindowId) -> Vec<WindowId> {
        let mut removed = Vec::new();
        let mut pending = vec![id];

        while let Some(current) = pending.pop() {
            let Some(window) = self.windows.remove(current) else {
                continue;
            };
            self.order.retain(|w| *w != current);
            for (_, container) in &mut self.containers {
                container.remove_window(current);
            }

            if let Some(parent) = window.parent {
                if let Some(p) = self.windows.get_mut(parent) {
                    p.child = None;
                }
            }
            if let Some(child) = window.child {
                let destroy = self
                    .windows
                    .get(child)
                    .map(|c| c.flags.contains(WindowFlags::DESTROY_WITH_PARENT))
                    .unwrap_or(false);
                if destroy {
                    pending.push(child);
                } else if let Some(c) = self.windows.get_mut(child) {
                    c.parent = None;
                }
            }

            info!("window {} '{}' removed", current, window.title);
            removed.push(current);
        }
        removed
    }

    pub fn window(&self, id: WindowId) -> Option<&Window> {
        self.windows.get(id)
    }

    pub fn window_mut(&mut self, id: WindowId) -> Option<&mut Window> {
        self.windows.get_mut(id)
    }

    /// Window ids in insertion order.
    pub fn window_ids(&self) -> &[WindowId] {
        &self.order
    }

    pub fn windows(&self) -> impl Iterator<Item = (WindowId, &Window)> + '_ {
        self.order
            .iter()
            .filter_map(|id| self.windows.get(*id).map(|w| (*id, w)))
    }

    pub fn buttons(&self) -> impl Iterator<Item = WindowId> + '_ {
        self.windows()
            .filter(|(_, w)| w.is_button())
            .map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Set a window transform and carry its child along.
    pub fn set_transform(&mut self, id: WindowId, transform: Mat4) -> bool {
        let Some(window) = self.windows.get_mut(id) else {
            return false;
        };
        window.set_transform(transform);
        self.update_child(id);
        true
    }

    pub fn set_scale(&mut self, id: WindowId, scale: f32) -> bool {
        let Some(window) = self.windows.get_mut(id) else {
            return false;
        };
        if !window.set_scale(scale) {
            return false;
        }
        self.update_child(id);
        true
    }

    /// Attach `child` to `parent`, `offset` meters from the parent's center.
    pub fn add_child(&mut self, parent: WindowId, child: WindowId, offset: Vec2) -> bool {
        if parent == child || !self.windows.contains(parent) || !self.windows.contains(child) {
            return false;
        }
        if let Some(p) = self.windows.get_mut(parent) {
            p.child = Some(child);
            p.child_offset = offset;
        }
        if let Some(c) = self.windows.get_mut(child) {
            c.parent = Some(parent);
        }
        self.update_child(parent);
        debug!("window {} parented to {}", child, parent);
        true
    }

    /// Child transform = parent transform translated by the child offset.
    fn update_child(&mut self, parent: WindowId) {
        let mut current = parent;
        // bounded walk; a cycle can never outlast the window count
        for _ in 0..self.order.len() {
            let Some(p) = self.windows.get(current) else {
                return;
            };
            let Some(child) = p.child else {
                return;
            };
            let offset = p.child_offset;
            let transform = p
                .transform()
                .mul(&Mat4::translation(Vec3::new(offset.x, offset.y, 0.0)));
            match self.windows.get_mut(child) {
                Some(c) => c.set_transform(transform),
                None => return,
            }
            current = child;
        }
    }

    // ── Hover / grab ─────────────────────────────────────────

    /// Nearest hoverable, visible window hit by `ray`.
    fn pick(&self, ray: &Ray) -> Option<(WindowId, SurfaceHit)> {
        let mut best: Option<(WindowId, SurfaceHit)> = None;
        for (id, window) in self.windows() {
            if !window.visible || !window.flags.contains(WindowFlags::HOVERABLE) {
                continue;
            }
            if let Some(hit) = window.intersect(ray) {
                if best.map_or(true, |(_, b)| hit.distance < b.distance) {
                    best = Some((id, hit));
                }
            }
        }
        best
    }

    /// Feed a new pointer pose. Grabbing controllers drag their window,
    /// all others are hover-tested.
    pub fn update_pose(&mut self, controller: &mut Controller, pose: &Mat4) -> Vec<WmEvent> {
        controller.pose = *pose;
        controller.pointer.move_to(pose);

        if controller.grab.window.is_some() {
            controller.hover.pose = *pose;
            return self.drag_update(controller, pose);
        }

        let handle = controller.handle();
        let mut events = Vec::new();
        let hit = Ray::from_pose(pose).and_then(|ray| self.pick(&ray));

        match hit {
            Some((id, hit)) => {
                if controller.hover.window != Some(id) {
                    if let Some(old) = controller.hover.window {
                        events.push(WmEvent::HoverEnd {
                            controller: handle,
                            window: old,
                        });
                    }
                    events.push(WmEvent::HoverStart {
                        controller: handle,
                        window: id,
                    });
                }
                controller.hover.window = Some(id);
                controller.hover.point = hit.point;
                controller.hover.local = hit.local;
                controller.hover.distance = hit.distance;
                controller.hover.pose = *pose;
                events.push(WmEvent::Hover {
                    controller: handle,
                    window: id,
                    point: hit.point,
                    local: hit.local,
                    distance: hit.distance,
                    pose: *pose,
                });
            }
            None => {
                if let Some(old) = controller.hover.window {
                    events.push(WmEvent::HoverEnd {
                        controller: handle,
                        window: old,
                    });
                }
                controller.reset_hover_state();
                controller.hover.pose = *pose;
                events.push(WmEvent::NoHover {
                    controller: handle,
                    pose: *pose,
                });
            }
        }
        events
    }

    fn drag_update(&mut self, controller: &mut Controller, pose: &Mat4) -> Vec<WmEvent> {
        let Some(id) = controller.grab.window else {
            return Vec::new();
        };
        let Some(window) = self.windows.get(id) else {
            controller.reset_grab_state();
            return Vec::new();
        };

        let grab = &controller.grab;
        let controller_rotation = pose.get_rotation();
        let anchor = pose.get_translation()
            + controller_rotation.rotate(Vec3::FORWARD * controller.hover.distance);
        let rotation = controller_rotation
            .mul(grab.rotation_neg)
            .mul(grab.window_rotation)
            .normalize();
        let scale = window.scale();
        let position = anchor - rotation.rotate(grab.offset * scale);

        let transform =
            Mat4::from_rotation_translation(rotation, position).mul(&Mat4::scale(scale, scale, scale));
        self.set_transform(id, transform);
        controller.hover.point = anchor;

        vec![WmEvent::Grab {
            controller: controller.handle(),
            window: id,
            pose: Mat4::from_rotation_translation(rotation, anchor),
        }]
    }

    /// Grab action pressed. The caller decides what a grab start means.
    pub fn check_grab(&self, controller: &Controller) -> Vec<WmEvent> {
        if controller.grab.window.is_some() {
            return Vec::new();
        }
        match controller.hover.window {
            Some(id) if self.windows.contains(id) => vec![WmEvent::GrabStart {
                controller: controller.handle(),
                window: id,
            }],
            _ => Vec::new(),
        }
    }

    /// Start dragging the hovered window. Only draggable windows qualify.
    pub fn drag_start(&mut self, controller: &mut Controller) -> bool {
        let Some(id) = controller.hover.window else {
            return false;
        };
        let Some(window) = self.windows.get(id) else {
            return false;
        };
        if !window.is_draggable() {
            return false;
        }
        let transform = window.transform();
        let Some(inverse) = transform.inverse() else {
            return false;
        };

        let pose = controller.hover.pose;
        let controller_rotation = pose.get_rotation();
        let grab_point = pose.get_translation()
            + controller_rotation.rotate(Vec3::FORWARD * controller.hover.distance);

        controller.grab = GrabState {
            window: Some(id),
            offset: inverse.transform_point(grab_point),
            window_rotation: transform.get_rotation(),
            rotation_neg: controller_rotation.conjugate(),
            lock: ScaleLock::None,
            reset: None,
        };
        info!("controller {} grabbed window {}", controller.handle(), id);
        true
    }

    /// Grab action released. The window keeps its last transform.
    pub fn check_release(&mut self, controller: &mut Controller) -> Vec<WmEvent> {
        let Some(id) = controller.grab.window else {
            return Vec::new();
        };
        controller.reset_grab_state();
        debug!("controller {} released window {}", controller.handle(), id);
        vec![WmEvent::Release {
            controller: controller.handle(),
            window: id,
        }]
    }

    /// Move the hovered or grabbed window along the ray.
    /// Out-of-range results are discarded, not clamped.
    pub fn push_pull(&self, controller: &mut Controller, strength: f32) -> bool {
        if controller.hover.window.is_none() && controller.grab.window.is_none() {
            return false;
        }
        let d = controller.hover.distance;
        let new_distance =
            d + self.config.scroll_to_push_ratio * d * strength * self.config.input_tick_secs();
        if !new_distance.is_finite()
            || new_distance < self.config.min_window_distance
            || new_distance > self.config.max_window_distance
        {
            return false;
        }
        controller.hover.distance = new_distance;
        controller.pointer.set_length(new_distance);
        true
    }

    /// Two-axis gesture on a grabbed window: x scales, y pushes/pulls.
    /// The first axis over threshold wins until both drop under it.
    pub fn push_pull_scale(&mut self, controller: &mut Controller, x: f32, y: f32) -> bool {
        if controller.grab.window.is_none() {
            return false;
        }
        let threshold = self.config.analog_threshold;
        if x.abs() < threshold && y.abs() < threshold {
            controller.grab.lock = ScaleLock::None;
            return false;
        }

        if controller.grab.lock == ScaleLock::None {
            if x.abs() > y.abs() && x.abs() > threshold {
                controller.grab.lock = ScaleLock::Scale;
            } else if y.abs() > x.abs() && y.abs() > threshold {
                controller.grab.lock = ScaleLock::PushPull;
            }
            if controller.grab.lock != ScaleLock::None {
                debug!("controller {} locked to {:?}", controller.handle(), controller.grab.lock);
            }
        }

        match controller.grab.lock {
            ScaleLock::Scale => {
                let factor = x * self.config.scroll_to_scale_ratio;
                self.scale(&controller.grab, factor)
            }
            ScaleLock::PushPull => self.push_pull(controller, y),
            ScaleLock::None => false,
        }
    }

    /// Multiply the grabbed window's scale by `1 + factor`.
    pub fn scale(&mut self, grab: &GrabState, factor: f32) -> bool {
        let Some(id) = grab.window else {
            return false;
        };
        let Some(window) = self.windows.get(id) else {
            return false;
        };
        let new_scale = window.scale() * (1.0 + factor);
        if !new_scale.is_finite() || new_scale <= self.config.min_scale {
            return false;
        }
        self.set_scale(id, new_scale)
    }

    /// Begin animating the grabbed window's orientation back to identity.
    /// A running animation is replaced.
    pub fn start_orientation_reset(&self, controller: &mut Controller) -> bool {
        match controller.grab.window {
            Some(id) if self.windows.contains(id) => {
                controller.grab.reset = Some(OrientationReset {
                    from: controller.grab.window_rotation,
                    from_neg: controller.grab.rotation_neg,
                    progress: 0.0,
                });
                true
            }
            _ => false,
        }
    }

    /// Advance the orientation reset by one tick. Returns false when idle.
    pub fn advance_orientation_reset(&self, controller: &mut Controller) -> bool {
        let Some(mut reset) = controller.grab.reset else {
            return false;
        };
        let grab = &mut controller.grab;
        grab.window_rotation = reset.from.slerp(Quat::IDENTITY, reset.progress);
        grab.rotation_neg = reset.from_neg.slerp(Quat::IDENTITY, reset.progress);

        reset.progress += self.config.orientation_reset_step;
        if reset.progress > 1.0 {
            grab.window_rotation = Quat::IDENTITY;
            grab.rotation_neg = Quat::IDENTITY;
            grab.reset = None;
        } else {
            grab.reset = Some(reset);
        }
        true
    }

    // ── Pins and layout ──────────────────────────────────────

    pub fn set_pin(&mut self, id: WindowId, pinned: bool) -> bool {
        let pinned_only = self.pinned_only;
        let Some(window) = self.windows.get_mut(id) else {
            return false;
        };
        window.pinned = pinned;
        if pinned_only && !window.is_button() {
            window.visible = pinned;
        }
        true
    }

    pub fn is_pinned(&self, id: WindowId) -> bool {
        self.windows.get(id).map(|w| w.pinned).unwrap_or(false)
    }

    /// Hide every non-pinned, non-button window, or show all again.
    pub fn show_pinned_only(&mut self, pinned_only: bool) {
        self.pinned_only = pinned_only;
        for id in &self.order {
            if let Some(window) = self.windows.get_mut(*id) {
                if !window.is_button() {
                    window.visible = !pinned_only || window.pinned;
                }
            }
        }
        info!("pinned-only view {}", if pinned_only { "on" } else { "off" });
    }

    pub fn pinned_only(&self) -> bool {
        self.pinned_only
    }

    /// Place managed windows on a ring of the sphere around the origin,
    /// facing the origin.
    pub fn arrange_sphere(&mut self) {
        let managed: Vec<WindowId> = self
            .windows()
            .filter(|(_, w)| w.flags.contains(WindowFlags::MANAGED))
            .map(|(id, _)| id)
            .collect();
        if managed.is_empty() {
            return;
        }

        let step = 360.0 / managed.len() as f32;
        let radius = self.config.sphere_radius;
        for (i, id) in managed.iter().enumerate() {
            let position = sphere_to_3d_coords(i as f32 * step, 0.0, radius);
            let Some(facing) = Mat4::look_at(position, position * 2.0, UP) else {
                warn!("arrange-sphere: degenerate position for window {}", id);
                continue;
            };
            let scale = self.windows.get(*id).map(|w| w.scale()).unwrap_or(1.0);
            self.set_transform(*id, facing.mul(&Mat4::scale(scale, scale, scale)));
        }
        info!("arranged {} window(s) on sphere r={}", managed.len(), radius);
    }

    /// Restore every window's reset transform.
    pub fn arrange_reset(&mut self) {
        let resets: Vec<(WindowId, Mat4)> = self
            .windows()
            .filter_map(|(id, w)| w.reset_transform.map(|t| (id, t)))
            .collect();
        for (id, transform) in resets {
            self.set_transform(id, transform);
        }
    }

    // ── Containers ───────────────────────────────────────────

    pub fn add_container(&mut self, container: Container) -> ContainerId {
        let id = ContainerId(self.next_container);
        self.next_container += 1;
        self.containers.push((id, container));
        id
    }

    pub fn remove_container(&mut self, id: ContainerId) -> Option<Container> {
        let index = self.containers.iter().position(|(cid, _)| *cid == id)?;
        Some(self.containers.remove(index).1)
    }

    pub fn container(&self, id: ContainerId) -> Option<&Container> {
        self.containers
            .iter()
            .find(|(cid, _)| *cid == id)
            .map(|(_, c)| c)
    }

    pub fn container_mut(&mut self, id: ContainerId) -> Option<&mut Container> {
        self.containers
            .iter_mut()
            .find(|(cid, _)| *cid == id)
            .map(|(_, c)| c)
    }

    /// Let containers follow head or hand, then lay out their windows.
    pub fn update_containers(
        &mut self,
        hmd: &Mat4,
        tangents: &FrustumTangents,
        hand_pose: impl Fn(ControllerHandle) -> Option<Mat4>,
    ) {
        let angles = frustum_angles(tangents);
        let mut placements = Vec::new();
        for (_, container) in &mut self.containers {
            let hand = match container.attachment() {
                Attachment::Hand(handle) => hand_pose(handle),
                _ => None,
            };
            container.step(hmd, &angles, hand.as_ref());
            placements.extend(container.layout_transforms());
        }
        for (id, transform) in placements {
            let Some(scale) = self.windows.get(id).map(|w| w.scale()) else {
                continue;
            };
            self.set_transform(id, transform.mul(&Mat4::scale(scale, scale, scale)));
        }
    }

    // ── Migration ────────────────────────────────────────────

    /// Snapshot every non-button window in insertion order.
    pub fn save_state(&self) -> Vec<WindowState> {
        let ids: Vec<WindowId> = self
            .windows()
            .filter(|(_, w)| !w.is_button())
            .map(|(id, _)| id)
            .collect();

        ids.iter()
            .filter_map(|id| self.windows.get(*id))
            .map(|w| WindowState {
                title: w.title.clone(),
                native: w.native,
                transform: w.transform(),
                reset_transform: w.reset_transform,
                scale: w.scale(),
                initial_size: w.initial_size(),
                current_size: w.current_size(),
                texture_width: w.texture_width,
                texture_height: w.texture_height,
                pinned: w.pinned,
                draggable: w.is_draggable(),
                child_index: w.child.and_then(|c| ids.iter().position(|id| *id == c)),
                child_offset: w.child_offset,
            })
            .collect()
    }

    /// Recreate a snapshot on this manager's backend. Windows are created
    /// first, then children are linked by snapshot index. The first surface
    /// failure aborts and is returned; the caller discards this manager.
    pub fn restore_state(&mut self, states: &[WindowState]) -> anyhow::Result<Vec<WindowId>> {
        let mut ids = Vec::with_capacity(states.len());
        for state in states {
            let desc = WindowDesc::from_state(state);
            let id = self.add_window(&desc, WindowFlags::desktop(state.draggable))?;
            if let Some(window) = self.windows.get_mut(id) {
                window.reset_transform = state.reset_transform;
            }
            self.set_transform(id, state.transform);
            self.set_pin(id, state.pinned);
            ids.push(id);
        }

        for (state, id) in states.iter().zip(&ids) {
            let Some(child) = state.child_index.and_then(|i| ids.get(i)) else {
                continue;
            };
            self.add_child(*id, *child, state.child_offset);
        }

        // linking snaps children onto their parent; put back their own transforms
        for index in states.iter().filter_map(|s| s.child_index) {
            let (Some(child), Some(saved)) = (ids.get(index), states.get(index)) else {
                continue;
            };
            if let Some(window) = self.windows.get_mut(*child) {
                window.set_transform(saved.transform);
            }
        }
        info!("restored {} window(s) on {} backend", ids.len(), self.kind());
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{OverlayFactory, SceneFactory};
    use crate::container::ContainerLayout;
    use std::f32::consts::PI;

    fn wm() -> WindowManager {
        WindowManager::new(ShellConfig::default(), Box::new(OverlayFactory::new()))
    }

    fn desktop_flags() -> WindowFlags {
        WindowFlags::HOVERABLE
            | WindowFlags::DESTROY_WITH_PARENT
            | WindowFlags::DRAGGABLE
            | WindowFlags::MANAGED
    }

    /// 1x1 m window centered at `pos`.
    fn add(wm: &mut WindowManager, title: &str, pos: Vec3) -> WindowId {
        let desc = WindowDesc::from_pixels(title, 450, 450, 450.0).at(Mat4::translation(pos));
        wm.add_window(&desc, desktop_flags()).unwrap()
    }

    fn pose_at(x: f32, y: f32, z: f32) -> Mat4 {
        Mat4::translation(Vec3::new(x, y, z))
    }

    #[test]
    fn test_hover_start_then_hover() {
        let mut wm = wm();
        let a = add(&mut wm, "a", Vec3::new(0.0, 0.0, -2.0));
        let mut c = Controller::new(1, 5.0);

        let events = wm.update_pose(&mut c, &Mat4::IDENTITY);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], WmEvent::HoverStart { window, .. } if window == a));
        match &events[1] {
            WmEvent::Hover { distance, .. } => assert!((distance - 2.0).abs() < 1e-5),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(c.hovered(), Some(a));

        // same window again: only Hover
        let events = wm.update_pose(&mut c, &Mat4::IDENTITY);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], WmEvent::Hover { .. }));
    }

    #[test]
    fn test_hover_end_precedes_hover_start() {
        let mut wm = wm();
        let a = add(&mut wm, "a", Vec3::new(0.0, 0.0, -2.0));
        let b = add(&mut wm, "b", Vec3::new(5.0, 0.0, -2.0));
        let mut c = Controller::new(1, 5.0);

        wm.update_pose(&mut c, &Mat4::IDENTITY);
        let events = wm.update_pose(&mut c, &pose_at(5.0, 0.0, 0.0));
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], WmEvent::HoverEnd { window, .. } if window == a));
        assert!(matches!(events[1], WmEvent::HoverStart { window, .. } if window == b));
        assert!(matches!(events[2], WmEvent::Hover { window, .. } if window == b));
    }

    #[test]
    fn test_hover_lost_emits_end_then_no_hover() {
        let mut wm = wm();
        add(&mut wm, "a", Vec3::new(0.0, 0.0, -2.0));
        let mut c = Controller::new(1, 5.0);
        wm.update_pose(&mut c, &Mat4::IDENTITY);

        let events = wm.update_pose(&mut c, &pose_at(10.0, 0.0, 0.0));
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], WmEvent::HoverEnd { .. }));
        assert!(matches!(events[1], WmEvent::NoHover { .. }));
        assert_eq!(c.hovered(), None);

        let events = wm.update_pose(&mut c, &pose_at(10.0, 0.0, 0.0));
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], WmEvent::NoHover { .. }));
    }

    #[test]
    fn test_nearest_window_wins() {
        let mut wm = wm();
        let _far = add(&mut wm, "far", Vec3::new(0.0, 0.0, -4.0));
        let near = add(&mut wm, "near", Vec3::new(0.0, 0.0, -2.0));
        let mut c = Controller::new(1, 5.0);
        wm.update_pose(&mut c, &Mat4::IDENTITY);
        assert_eq!(c.hovered(), Some(near));
    }

    #[test]
    fn test_hidden_and_unhoverable_windows_are_skipped() {
        let mut wm = wm();
        let a = add(&mut wm, "a", Vec3::new(0.0, 0.0, -2.0));
        wm.window_mut(a).unwrap().visible = false;
        let desc = WindowDesc::from_pixels("b", 450, 450, 450.0).at(pose_at(0.0, 0.0, -3.0));
        wm.add_window(&desc, WindowFlags::DRAGGABLE).unwrap();

        let mut c = Controller::new(1, 5.0);
        wm.update_pose(&mut c, &Mat4::IDENTITY);
        assert_eq!(c.hovered(), None);
    }

    fn grabbed_setup() -> (WindowManager, WindowId, Controller) {
        let mut wm = wm();
        let a = add(&mut wm, "a", Vec3::new(0.2, 0.1, -2.0));
        let mut c = Controller::new(1, 5.0);
        wm.update_pose(&mut c, &Mat4::IDENTITY);
        assert_eq!(wm.check_grab(&c).len(), 1);
        assert!(wm.drag_start(&mut c));
        (wm, a, c)
    }

    #[test]
    fn test_drag_keeps_transform_at_grab_pose() {
        let (mut wm, a, mut c) = grabbed_setup();
        let before = wm.window(a).unwrap().transform();
        let events = wm.update_pose(&mut c, &Mat4::IDENTITY);
        assert!(matches!(events[0], WmEvent::Grab { .. }));
        assert!(wm.window(a).unwrap().transform().approx_eq(&before, 1e-4));
    }

    #[test]
    fn test_drag_follows_controller() {
        let (mut wm, a, mut c) = grabbed_setup();
        wm.update_pose(&mut c, &pose_at(1.0, 0.5, 0.0));
        let p = wm.window(a).unwrap().position();
        assert!(p.distance(Vec3::new(1.2, 0.6, -2.0)) < 1e-4, "p={:?}", p);

        // turning the controller 90 degrees swings the window around it
        let turn = Mat4::from_quat(&Quat::from_euler(PI / 2.0, 0.0, 0.0));
        wm.update_pose(&mut c, &turn);
        let w = wm.window(a).unwrap();
        let to_hover = c.hover.point;
        assert!(to_hover.distance(Vec3::new(-2.0, 0.0, 0.0)) < 1e-4, "anchor={:?}", to_hover);
        assert!((w.scale() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_drag_start_requires_draggable() {
        let mut wm = wm();
        let desc = WindowDesc::from_pixels("btn", 450, 450, 450.0).at(pose_at(0.0, 0.0, -2.0));
        wm.add_window(&desc, WindowFlags::HOVERABLE | WindowFlags::MANAGER_BUTTON)
            .unwrap();
        let mut c = Controller::new(1, 5.0);
        wm.update_pose(&mut c, &Mat4::IDENTITY);
        assert_eq!(wm.check_grab(&c).len(), 1);
        assert!(!wm.drag_start(&mut c));
        assert_eq!(c.grabbed(), None);
    }

    #[test]
    fn test_release_keeps_transform() {
        let (mut wm, a, mut c) = grabbed_setup();
        wm.update_pose(&mut c, &pose_at(0.5, 0.0, 0.0));
        let moved = wm.window(a).unwrap().transform();
        let events = wm.check_release(&mut c);
        assert!(matches!(events[0], WmEvent::Release { window, .. } if window == a));
        assert_eq!(c.grabbed(), None);
        assert_eq!(c.grab.window_rotation, Quat::IDENTITY);
        assert!(wm.window(a).unwrap().transform().approx_eq(&moved, 1e-6));
        assert!(wm.check_release(&mut c).is_empty());
    }

    #[test]
    fn test_push_pull_bounds() {
        let (wm, _a, mut c) = grabbed_setup();
        let start = c.hover.distance;
        assert!(wm.push_pull(&mut c, 1.0));
        assert!(c.hover.distance > start);

        c.hover.distance = 14.99;
        assert!(!wm.push_pull(&mut c, 1.0));
        assert!((c.hover.distance - 14.99).abs() < 1e-6);

        c.hover.distance = 0.0505;
        assert!(!wm.push_pull(&mut c, -1.0));
        assert!((c.hover.distance - 0.0505).abs() < 1e-6);

        for _ in 0..10_000 {
            wm.push_pull(&mut c, 1.0);
            assert!(c.hover.distance >= 0.05 && c.hover.distance <= 15.0);
        }
    }

    #[test]
    fn test_scale_lock_sticks_until_both_axes_drop() {
        let (mut wm, a, mut c) = grabbed_setup();
        let s0 = wm.window(a).unwrap().scale();

        assert!(wm.push_pull_scale(&mut c, 0.6, 0.3));
        assert_eq!(c.grab.lock, ScaleLock::Scale);
        assert!(wm.window(a).unwrap().scale() > s0);

        let d0 = c.hover.distance;
        wm.push_pull_scale(&mut c, 0.1, 0.6);
        assert_eq!(c.grab.lock, ScaleLock::Scale);
        assert!((c.hover.distance - d0).abs() < 1e-6);

        assert!(!wm.push_pull_scale(&mut c, 0.1, 0.2));
        assert_eq!(c.grab.lock, ScaleLock::None);

        assert!(wm.push_pull_scale(&mut c, 0.1, 0.6));
        assert_eq!(c.grab.lock, ScaleLock::PushPull);
    }

    #[test]
    fn test_scale_floor() {
        let (mut wm, a, c) = grabbed_setup();
        assert!(wm.set_scale(a, 0.105));
        assert!(!wm.scale(&c.grab, -0.1));
        assert!((wm.window(a).unwrap().scale() - 0.105).abs() < 1e-5);
        assert!(!wm.scale(&c.grab, -2.0));
    }

    #[test]
    fn test_orientation_reset_steps_to_identity() {
        let (wm, _a, mut c) = grabbed_setup();
        c.grab.window_rotation = Quat::from_euler(1.0, 0.0, 0.0);
        c.grab.rotation_neg = Quat::from_euler(-0.5, 0.2, 0.0);
        assert!(wm.start_orientation_reset(&mut c));

        let mut ticks = 0;
        while wm.advance_orientation_reset(&mut c) {
            ticks += 1;
            assert!(ticks < 100);
        }
        assert_eq!(ticks, 15);
        assert_eq!(c.grab.window_rotation, Quat::IDENTITY);
        assert_eq!(c.grab.rotation_neg, Quat::IDENTITY);
    }

    #[test]
    fn test_orientation_reset_retrigger_overwrites() {
        let (wm, _a, mut c) = grabbed_setup();
        c.grab.window_rotation = Quat::from_euler(1.0, 0.0, 0.0);
        wm.start_orientation_reset(&mut c);
        for _ in 0..5 {
            wm.advance_orientation_reset(&mut c);
        }
        wm.start_orientation_reset(&mut c);
        let reset = c.grab.reset.unwrap();
        assert_eq!(reset.progress, 0.0);
        assert_eq!(reset.from, c.grab.window_rotation);
    }

    #[test]
    fn test_orientation_reset_needs_grab() {
        let wm = wm();
        let mut c = Controller::new(1, 5.0);
        assert!(!wm.start_orientation_reset(&mut c));
        assert!(!wm.advance_orientation_reset(&mut c));
    }

    #[test]
    fn test_remove_grabbed_window_makes_gestures_noops() {
        let (mut wm, a, mut c) = grabbed_setup();
        let removed = wm.remove_window(a);
        assert_eq!(removed, vec![a]);
        for id in &removed {
            c.forget_window(*id);
        }
        assert_eq!(c.grabbed(), None);
        assert!(!wm.push_pull(&mut c, 1.0));
        assert!(!wm.push_pull_scale(&mut c, 0.9, 0.0));
        assert!(!wm.scale(&c.grab, 0.5));
        assert!(wm.window(a).is_none());
    }

    #[test]
    fn test_stale_grab_reference_is_dropped() {
        let (mut wm, a, mut c) = grabbed_setup();
        wm.remove_window(a);
        // caller forgot to clear: the next update drops the dangling grab
        let events = wm.update_pose(&mut c, &Mat4::IDENTITY);
        assert!(events.is_empty());
        assert_eq!(c.grabbed(), None);
    }

    #[test]
    fn test_child_follows_parent_and_dies_with_it() {
        let mut wm = wm();
        let parent = add(&mut wm, "parent", Vec3::new(0.0, 0.0, -2.0));
        let child = add(&mut wm, "child", Vec3::ZERO);
        assert!(wm.add_child(parent, child, Vec2::new(0.25, 0.1)));
        let p = wm.window(child).unwrap().position();
        assert!(p.distance(Vec3::new(0.25, 0.1, -2.0)) < 1e-5);

        wm.set_transform(parent, Mat4::translation(Vec3::new(1.0, 0.0, -3.0)));
        let p = wm.window(child).unwrap().position();
        assert!(p.distance(Vec3::new(1.25, 0.1, -3.0)) < 1e-5);

        let removed = wm.remove_window(parent);
        assert_eq!(removed.len(), 2);
        assert!(wm.is_empty());
    }

    #[test]
    fn test_pinned_only_visibility() {
        let mut wm = wm();
        let a = add(&mut wm, "a", Vec3::new(0.0, 0.0, -2.0));
        let b = add(&mut wm, "b", Vec3::new(2.0, 0.0, -2.0));
        wm.set_pin(a, true);
        wm.show_pinned_only(true);
        assert!(wm.window(a).unwrap().visible);
        assert!(!wm.window(b).unwrap().visible);

        // new unpinned windows start hidden in pinned-only mode
        let c = add(&mut wm, "c", Vec3::new(4.0, 0.0, -2.0));
        assert!(!wm.window(c).unwrap().visible);

        wm.set_pin(b, true);
        assert!(wm.window(b).unwrap().visible);
        wm.show_pinned_only(false);
        assert!(wm.window(c).unwrap().visible);
    }

    #[test]
    fn test_arrange_sphere_ring() {
        let mut wm = wm();
        let ids: Vec<WindowId> = (0..5)
            .map(|i| add(&mut wm, &format!("w{}", i), Vec3::new(i as f32, 0.0, -2.0)))
            .collect();
        wm.arrange_sphere();

        let positions: Vec<Vec3> = ids.iter().map(|id| wm.window(*id).unwrap().position()).collect();
        for p in &positions {
            assert!((p.length() - 3.0).abs() < 1e-4);
        }
        let min_sep = 2.0 * PI / 5.0 - 1e-3;
        for i in 0..positions.len() {
            for j in (i + 1)..positions.len() {
                let cos = positions[i].dot(positions[j]) / 9.0;
                assert!(cos.clamp(-1.0, 1.0).acos() >= min_sep);
            }
        }
        // each window faces the origin
        for id in &ids {
            let w = wm.window(*id).unwrap();
            let normal = w.transform().transform_vector(Vec3::new(0.0, 0.0, 1.0)).normalize();
            let to_origin = (-w.position()).normalize();
            assert!(normal.dot(to_origin) > 0.999);
        }
    }

    #[test]
    fn test_arrange_reset_restores_initial_transforms() {
        let mut wm = wm();
        let a = add(&mut wm, "a", Vec3::new(0.5, 0.0, -2.0));
        wm.arrange_sphere();
        wm.arrange_reset();
        assert!(wm.window(a).unwrap().position().distance(Vec3::new(0.5, 0.0, -2.0)) < 1e-6);
    }

    #[test]
    fn test_save_state_skips_buttons_and_indexes_children() {
        let mut wm = wm();
        let desc = WindowDesc::from_pixels("btn", 45, 45, 450.0);
        wm.add_window(&desc, WindowFlags::HOVERABLE | WindowFlags::MANAGER_BUTTON)
            .unwrap();
        let parent = add(&mut wm, "parent", Vec3::new(0.0, 0.0, -2.0));
        let child = add(&mut wm, "child", Vec3::ZERO);
        wm.add_child(parent, child, Vec2::new(0.1, 0.0));
        wm.set_pin(parent, true);

        let state = wm.save_state();
        assert_eq!(state.len(), 2);
        assert_eq!(state[0].title, "parent");
        assert_eq!(state[0].child_index, Some(1));
        assert!(state[0].pinned);
        assert_eq!(state[1].child_index, None);
    }

    #[test]
    fn test_restore_state_on_scene_backend() {
        let mut wm = wm();
        let parent = add(&mut wm, "parent", Vec3::new(0.0, 0.0, -2.0));
        let child = add(&mut wm, "child", Vec3::ZERO);
        wm.add_child(parent, child, Vec2::new(0.3, 0.0));
        wm.set_scale(parent, 1.5);
        wm.set_pin(child, true);
        let state = wm.save_state();

        let mut scene = WindowManager::new(ShellConfig::default(), Box::new(SceneFactory));
        let ids = scene.restore_state(&state).unwrap();
        assert_eq!(ids.len(), 2);
        let p = scene.window(ids[0]).unwrap();
        assert!((p.scale() - 1.5).abs() < 1e-5);
        assert_eq!(p.child(), Some(ids[1]));
        assert!(scene.is_pinned(ids[1]));
        assert_eq!(scene.window(ids[1]).unwrap().parent(), Some(ids[0]));
        assert!(scene
            .window(ids[1])
            .unwrap()
            .transform()
            .approx_eq(&wm.window(child).unwrap().transform(), 1e-5));
        assert_eq!(scene.window(ids[0]).unwrap().reset_transform, state[0].reset_transform);
    }

    #[test]
    fn test_restore_keeps_child_own_transforms() {
        let mut wm = wm();
        // chain top -> middle -> leaf, added leaf first so links run backwards
        let leaf = add(&mut wm, "leaf", Vec3::ZERO);
        let middle = add(&mut wm, "middle", Vec3::ZERO);
        let top = add(&mut wm, "top", Vec3::new(0.0, 0.0, -2.0));
        wm.add_child(top, middle, Vec2::new(0.5, 0.0));
        wm.add_child(middle, leaf, Vec2::new(0.0, 0.5));

        let own_middle = Mat4::translation(Vec3::new(2.0, 0.5, -3.0)).mul(&Mat4::scale(0.5, 0.5, 0.5));
        let own_leaf = Mat4::translation(Vec3::new(-1.0, 1.0, -4.0));
        wm.window_mut(middle).unwrap().set_transform(own_middle);
        wm.window_mut(leaf).unwrap().set_transform(own_leaf);
        let state = wm.save_state();

        let mut scene = WindowManager::new(ShellConfig::default(), Box::new(SceneFactory));
        let ids = scene.restore_state(&state).unwrap();
        let (new_leaf, new_middle, new_top) = (ids[0], ids[1], ids[2]);
        assert_eq!(scene.window(new_top).unwrap().child(), Some(new_middle));
        assert_eq!(scene.window(new_middle).unwrap().child(), Some(new_leaf));
        assert!(scene.window(new_middle).unwrap().transform().approx_eq(&own_middle, 1e-5));
        assert!((scene.window(new_middle).unwrap().scale() - 0.5).abs() < 1e-5);
        assert!(scene.window(new_leaf).unwrap().transform().approx_eq(&own_leaf, 1e-5));
    }

    #[test]
    fn test_factory_failure_is_reported() {
        let mut wm = WindowManager::new(ShellConfig::default(), Box::new(OverlayFactory::with_limit(1)));
        add(&mut wm, "ok", Vec3::ZERO);
        let desc = WindowDesc::from_pixels("too-many", 450, 450, 450.0);
        let err = wm.add_window(&desc, desktop_flags()).unwrap_err();
        assert!(format!("{:#}", err).contains("overlay limit"));
        assert_eq!(wm.len(), 1);
    }

    #[test]
    fn test_scene_backend_hover_matches_overlay() {
        let mut overlay = wm();
        let mut scene = WindowManager::new(ShellConfig::default(), Box::new(SceneFactory));
        let a = add(&mut overlay, "a", Vec3::new(0.1, 0.0, -2.0));
        let b = add(&mut scene, "a", Vec3::new(0.1, 0.0, -2.0));

        let mut c1 = Controller::new(1, 5.0);
        let mut c2 = Controller::new(1, 5.0);
        overlay.update_pose(&mut c1, &Mat4::IDENTITY);
        scene.update_pose(&mut c2, &Mat4::IDENTITY);
        assert_eq!(c1.hovered(), Some(a));
        assert_eq!(c2.hovered(), Some(b));
        assert!((c1.hover.local.x - c2.hover.local.x).abs() < 1e-5);
        assert!((c1.hover.distance - c2.hover.distance).abs() < 1e-5);
    }

    #[test]
    fn test_relative_container_places_windows() {
        let mut wm = wm();
        let a = add(&mut wm, "a", Vec3::ZERO);
        let mut container = Container::new();
        container.add_window(a, Mat4::translation(Vec3::new(0.1, 0.0, 0.0)));
        container.set_attachment(Attachment::Head);
        container.set_layout(ContainerLayout::Relative);
        container.set_distance(2.0);
        let cid = wm.add_container(container);

        // anchor starts at the origin, i.e. out of view, so it recenters
        wm.update_containers(&Mat4::IDENTITY, &FrustumTangents::default(), |_| None);
        let p = wm.window(a).unwrap().position();
        assert!(p.distance(Vec3::new(0.1, 0.0, -2.0)) < 1e-5, "p={:?}", p);

        wm.remove_window(a);
        assert!(!wm.container(cid).unwrap().contains(a));
        assert!(wm.remove_container(cid).is_some());
    }
}
