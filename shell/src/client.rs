//! The shell client: wires the tracking runtime to the window manager.
//!
//! The client owns the controllers, the input synthesizer, the desktop
//! cursor and the control menu, and turns window manager events into
//! visual state updates plus a queue of [`ClientEvent`]s for the
//! application. It is the single writer of all interaction state.

use std::collections::{BTreeMap, HashMap, VecDeque};

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::backend::{default_factory, BackendKind, SurfaceFactory};
use crate::config::ShellConfig;
use crate::container::{Attachment, Container, ContainerId, ContainerLayout};
use crate::controller::{Controller, ControllerHandle};
use crate::cursor::DesktopCursor;
use crate::input_synth::{InputSynth, SynthAction, SynthEvent};
use crate::math::{Mat4, Vec2, Vec3};
use crate::tracking::{
    ActionEvent, AnalogAction, DigitalAction, PoseSource, RuntimeEvent, TrackingContext,
};
use crate::window::{WindowDesc, WindowFlags, WindowId};
use crate::window_manager::{WindowManager, WmEvent};

/// Menu button edge length when attached to a hand.
const HAND_BUTTON_SIZE: f32 = 0.07;
/// Menu button edge length when attached to the head.
const HEAD_BUTTON_SIZE: f32 = 0.25;

/// Events for the application, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
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
    },
    HoverEnd {
        controller: ControllerHandle,
        window: WindowId,
    },
    GrabStart {
        controller: ControllerHandle,
        window: WindowId,
    },
    Grab {
        controller: ControllerHandle,
        window: WindowId,
        pose: Mat4,
    },
    Release {
        controller: ControllerHandle,
        window: WindowId,
    },
    Click {
        controller: ControllerHandle,
        window: WindowId,
        position: Vec2,
        button: u32,
        state: bool,
    },
    MoveCursor {
        controller: ControllerHandle,
        window: WindowId,
        position: Vec2,
    },
    /// An application button was pressed.
    ButtonPress {
        controller: ControllerHandle,
        window: WindowId,
    },
    RequestQuit {
        reason: String,
    },
    KeyboardPress {
        window: WindowId,
        text: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    ArrangeSphere,
    ArrangeReset,
    SelectPinned,
    PinnedOnly,
}

impl MenuAction {
    fn title(self) -> &'static str {
        match self {
            Self::ArrangeSphere => "menu-arrange-sphere",
            Self::ArrangeReset => "menu-arrange-reset",
            Self::SelectPinned => "menu-select-pinned",
            Self::PinnedOnly => "menu-pinned-only",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ButtonAction {
    Menu(MenuAction),
    App,
}

#[derive(Debug)]
struct Menu {
    container: ContainerId,
    buttons: Vec<WindowId>,
}

pub struct Client {
    config: ShellConfig,
    tracking: Box<dyn TrackingContext>,
    manager: WindowManager,
    /// Factory for the backend not currently in use.
    spare_factory: Option<Box<dyn SurfaceFactory>>,
    controllers: BTreeMap<ControllerHandle, Controller>,
    input_synth: InputSynth,
    cursor: DesktopCursor,
    selection_mode: bool,
    buttons: HashMap<WindowId, ButtonAction>,
    menu: Option<Menu>,
    keyboard_window: Option<WindowId>,
    events: VecDeque<ClientEvent>,
}

fn is_synth_action(event: &ActionEvent) -> bool {
    matches!(
        event,
        ActionEvent::Digital {
            action: DigitalAction::LeftClick | DigitalAction::RightClick | DigitalAction::MiddleClick,
            ..
        } | ActionEvent::Analog {
            action: AnalogAction::Scroll,
            ..
        }
    )
}

impl Client {
    pub fn new(config: ShellConfig, tracking: Box<dyn TrackingContext>, kind: BackendKind) -> Self {
        Self::with_factories(config, tracking, default_factory(kind), default_factory(kind.other()))
    }

    pub fn with_factories(
        config: ShellConfig,
        tracking: Box<dyn TrackingContext>,
        primary: Box<dyn SurfaceFactory>,
        spare: Box<dyn SurfaceFactory>,
    ) -> Self {
        info!("client starting on {} backend", primary.kind());
        Self {
            input_synth: InputSynth::new(config.scroll_threshold),
            manager: WindowManager::new(config.clone(), primary),
            config,
            tracking,
            spare_factory: Some(spare),
            controllers: BTreeMap::new(),
            cursor: DesktopCursor::default(),
            selection_mode: false,
            buttons: HashMap::new(),
            menu: None,
            keyboard_window: None,
            events: VecDeque::new(),
        }
    }

    // ── Accessors ────────────────────────────────────────────

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    pub fn kind(&self) -> BackendKind {
        self.manager.kind()
    }

    pub fn manager(&self) -> &WindowManager {
        &self.manager
    }

    pub fn controller(&self, handle: ControllerHandle) -> Option<&Controller> {
        self.controllers.get(&handle)
    }

    pub fn controller_handles(&self) -> impl Iterator<Item = ControllerHandle> + '_ {
        self.controllers.keys().copied()
    }

    pub fn cursor(&self) -> &DesktopCursor {
        &self.cursor
    }

    pub fn input_synth(&self) -> &InputSynth {
        &self.input_synth
    }

    pub fn selection_mode(&self) -> bool {
        self.selection_mode
    }

    pub fn pinned_only(&self) -> bool {
        self.manager.pinned_only()
    }

    pub fn menu_open(&self) -> bool {
        self.menu.is_some()
    }

    pub fn menu_buttons(&self) -> Vec<WindowId> {
        self.menu.as_ref().map(|m| m.buttons.clone()).unwrap_or_default()
    }

    pub fn keyboard_window(&self) -> Option<WindowId> {
        self.keyboard_window
    }

    pub fn windows(&self) -> &[WindowId] {
        self.manager.window_ids()
    }

    /// Take every queued application event.
    pub fn drain_events(&mut self) -> Vec<ClientEvent> {
        self.events.drain(..).collect()
    }

    // ── Queries ──────────────────────────────────────────────

    pub fn is_hovering(&self) -> bool {
        self.controllers.values().any(|c| c.hovered().is_some())
    }

    pub fn is_grabbing(&self) -> bool {
        self.controllers.values().any(|c| c.grabbed().is_some())
    }

    pub fn is_grabbed(&self, window: WindowId) -> bool {
        self.controllers.values().any(|c| c.grabbed() == Some(window))
    }

    pub fn is_hovered(&self, window: WindowId) -> bool {
        self.controllers.values().any(|c| c.hovered() == Some(window))
    }

    /// Window hovered by the synthing controller.
    pub fn synth_hovered(&self) -> Option<WindowId> {
        let handle = self.input_synth.synthing_controller()?;
        self.controllers.get(&handle)?.hovered()
    }

    // ── Windows ──────────────────────────────────────────────

    pub fn add_window(&mut self, desc: &WindowDesc, draggable: bool) -> anyhow::Result<WindowId> {
        let id = self.manager.add_window(desc, WindowFlags::desktop(draggable))?;
        if self.selection_mode {
            self.mark_windows_for_selection_mode();
        }
        Ok(id)
    }

    /// Add an application button. Pressing it queues `ButtonPress`.
    pub fn add_button(&mut self, title: &str, width: f32, height: f32, position: Vec3) -> anyhow::Result<WindowId> {
        self.create_button(title, width, height, Mat4::translation(position), ButtonAction::App)
    }

    fn create_button(
        &mut self,
        title: &str,
        width: f32,
        height: f32,
        transform: Mat4,
        action: ButtonAction,
    ) -> anyhow::Result<WindowId> {
        let desc = WindowDesc::from_meters(title, width, height, self.config.pixels_per_meter).at(transform);
        let id = self
            .manager
            .add_window(&desc, WindowFlags::HOVERABLE | WindowFlags::MANAGER_BUTTON)
            .with_context(|| format!("creating button '{}'", title))?;
        self.buttons.insert(id, action);
        Ok(id)
    }

    /// Remove a window (and destroy-with-parent children) and drop every
    /// controller reference to it.
    pub fn remove_window(&mut self, id: WindowId) -> bool {
        let removed = self.manager.remove_window(id);
        for window in &removed {
            for controller in self.controllers.values_mut() {
                if controller.forget_window(*window) && self.input_synth.is_synthing(controller.handle()) {
                    self.input_synth.reset_press_state();
                    self.input_synth.reset_scroll();
                }
            }
            self.buttons.remove(window);
            if let Some(menu) = &mut self.menu {
                menu.buttons.retain(|b| b != window);
            }
            if self.keyboard_window == Some(*window) {
                self.keyboard_window = None;
            }
            if self.cursor.window == Some(*window) {
                self.cursor.hide();
                self.cursor.window = None;
            }
        }
        !removed.is_empty()
    }

    pub fn set_transform(&mut self, id: WindowId, transform: Mat4) -> bool {
        self.manager.set_transform(id, transform)
    }

    pub fn add_child(&mut self, parent: WindowId, child: WindowId, offset: Vec2) -> bool {
        self.manager.add_child(parent, child, offset)
    }

    pub fn set_pin(&mut self, id: WindowId, pinned: bool) -> bool {
        let ok = self.manager.set_pin(id, pinned);
        if ok && self.selection_mode {
            self.mark_windows_for_selection_mode();
        }
        ok
    }

    pub fn show_pinned_only(&mut self, pinned_only: bool) {
        self.manager.show_pinned_only(pinned_only);
        if self.selection_mode {
            self.mark_windows_for_selection_mode();
        }
    }

    pub fn arrange_sphere(&mut self) {
        self.manager.arrange_sphere();
    }

    pub fn arrange_reset(&mut self) {
        self.manager.arrange_reset();
    }

    /// Selection mode shows every window and highlights the pinned ones.
    /// Leaving it clears highlights and re-applies pinned-only.
    pub fn set_selection_mode(&mut self, enabled: bool) {
        self.selection_mode = enabled;
        self.mark_windows_for_selection_mode();
        info!("selection mode {}", if enabled { "on" } else { "off" });
    }

    fn mark_windows_for_selection_mode(&mut self) {
        let pinned_only = self.manager.pinned_only();
        let ids = self.manager.window_ids().to_vec();
        for id in ids {
            let Some(window) = self.manager.window_mut(id) else {
                continue;
            };
            if window.is_button() {
                continue;
            }
            if self.selection_mode {
                window.selected = window.pinned;
                window.visible = true;
            } else {
                window.selected = false;
                window.visible = !pinned_only || window.pinned;
            }
        }
    }

    // ── Controllers ──────────────────────────────────────────

    pub fn activate_controller(&mut self, handle: ControllerHandle) {
        if self.controllers.contains_key(&handle) {
            debug!("controller {} already active", handle);
            return;
        }
        self.controllers
            .insert(handle, Controller::new(handle, self.config.pointer_default_length));
        info!("controller {} activated ({} active)", handle, self.controllers.len());
        if self.controllers.len() == 1 {
            self.input_synth.hand_off_to_controller(handle);
        }
    }

    pub fn deactivate_controller(&mut self, handle: ControllerHandle) {
        let Some(controller) = self.controllers.remove(&handle) else {
            return;
        };
        info!("controller {} deactivated", handle);

        if let Some(hovered) = controller.hovered() {
            if self.buttons.contains_key(&hovered) && !self.is_hovered(hovered) {
                if let Some(w) = self.manager.window_mut(hovered) {
                    w.selected = false;
                }
            }
        }

        if self.input_synth.is_synthing(handle) {
            self.cursor.hide();
            match self.controllers.keys().next().copied() {
                Some(next) => self.input_synth.hand_off_to_controller(next),
                None => self.input_synth.clear_controller(),
            }
        }

        let attached_here = self
            .menu
            .as_ref()
            .and_then(|m| self.manager.container(m.container))
            .map(|c| c.attachment() == Attachment::Hand(handle))
            .unwrap_or(false);
        if attached_here {
            self.close_menu();
        }
    }

    pub fn hand_off_to_controller(&mut self, handle: ControllerHandle) -> bool {
        if !self.controllers.contains_key(&handle) {
            return false;
        }
        if let Some(previous) = self.input_synth.synthing_controller() {
            if previous != handle {
                self.cursor.hide();
            }
        }
        self.input_synth.hand_off_to_controller(handle);
        true
    }

    // ── Settings ─────────────────────────────────────────────

    /// Apply one setting by key, e.g. from a settings store watcher.
    pub fn update_setting(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.config.set(key, value)?;
        self.manager.set_config(self.config.clone());
        self.input_synth.set_scroll_threshold(self.config.scroll_threshold);
        if key == "pointer-length" {
            for controller in self.controllers.values_mut() {
                controller.pointer.default_length = self.config.pointer_default_length;
                if controller.hovered().is_none() {
                    controller.pointer.reset_length();
                }
            }
        }
        Ok(())
    }

    // ── Polling ──────────────────────────────────────────────

    /// Handle pending runtime events.
    pub fn poll_runtime(&mut self) {
        for event in self.tracking.poll_runtime() {
            match event {
                RuntimeEvent::DeviceActivate { controller } => self.activate_controller(controller),
                RuntimeEvent::DeviceDeactivate { controller } => self.deactivate_controller(controller),
                RuntimeEvent::Quit { reason } => {
                    self.tracking.acknowledge_quit();
                    info!("runtime requested quit: {}", reason);
                    self.events.push_back(ClientEvent::RequestQuit { reason });
                }
                RuntimeEvent::KeyboardPress { text } => match self.keyboard_window {
                    Some(window) if self.manager.window(window).is_some() => {
                        self.events.push_back(ClientEvent::KeyboardPress { window, text });
                    }
                    _ => debug!("keyboard input with no target window dropped"),
                },
                RuntimeEvent::KeyboardClosed => {
                    if self.keyboard_window.take().is_some() {
                        info!("system keyboard closed");
                    }
                }
            }
        }
    }

    /// One input tick: window manager actions first, then synth actions
    /// while something is hovered and nothing is grabbed.
    pub fn poll_input(&mut self) {
        let (synth, actions): (Vec<ActionEvent>, Vec<ActionEvent>) = self
            .tracking
            .poll_actions()
            .into_iter()
            .partition(is_synth_action);

        for action in actions {
            self.handle_action(action);
        }
        if self.is_hovering() && !self.is_grabbing() {
            for action in synth {
                self.handle_synth_action(action);
            }
        }

        for controller in self.controllers.values_mut() {
            self.manager.advance_orientation_reset(controller);
        }

        let hmd = self.tracking.hmd_pose();
        let tangents = self.tracking.hmd_frustum();
        let grips: BTreeMap<ControllerHandle, Mat4> = self
            .controllers
            .iter()
            .map(|(h, c)| (*h, c.hand_grip_pose))
            .collect();
        self.manager
            .update_containers(&hmd, &tangents, |handle| grips.get(&handle).copied());

        for controller in self.controllers.values_mut() {
            controller.tip.update_apparent_size(&hmd);
        }
    }

    fn handle_action(&mut self, event: ActionEvent) {
        match event {
            ActionEvent::Pose {
                source,
                controller,
                pose,
                valid,
                active,
                device_connected,
            } => {
                if !(valid && active && device_connected) {
                    return;
                }
                match source {
                    PoseSource::Pointer => self.handle_pointer_pose(controller, &pose),
                    PoseSource::HandGrip => {
                        if let Some(c) = self.controllers.get_mut(&controller) {
                            c.update_pose_hand_grip(&pose);
                        }
                    }
                }
            }
            ActionEvent::Digital {
                action,
                controller,
                state,
                changed,
            } => self.handle_digital(action, controller, state, changed),
            ActionEvent::Analog {
                action,
                controller,
                state,
            } => self.handle_analog(action, controller, state),
        }
    }

    fn handle_pointer_pose(&mut self, handle: ControllerHandle, pose: &Mat4) {
        if !self.controllers.contains_key(&handle) {
            info!("pose from unknown controller {}, activating", handle);
            self.activate_controller(handle);
        }
        let Some(controller) = self.controllers.get_mut(&handle) else {
            return;
        };
        let events = self.manager.update_pose(controller, pose);
        self.dispatch(events);

        // cursor shows while the synth controller hovers a desktop window
        let Some(controller) = self.controllers.get(&handle) else {
            return;
        };
        if !self.input_synth.is_synthing(handle) || controller.grabbed().is_some() {
            return;
        }
        let hovering_desktop = controller
            .hovered()
            .and_then(|id| self.manager.window(id))
            .map(|w| !w.is_button())
            .unwrap_or(false);
        if hovering_desktop {
            self.cursor.show();
        }
    }

    fn handle_digital(&mut self, action: DigitalAction, handle: ControllerHandle, state: bool, changed: bool) {
        if !changed {
            return;
        }
        let Some(controller) = self.controllers.get_mut(&handle) else {
            return;
        };
        match action {
            DigitalAction::Grab => {
                let events = if state {
                    self.manager.check_grab(controller)
                } else {
                    self.manager.check_release(controller)
                };
                self.dispatch(events);
            }
            DigitalAction::Menu => {
                if state && controller.hovered().is_none() {
                    self.toggle_menu(handle);
                }
            }
            DigitalAction::ResetOrientation => {
                if state {
                    self.manager.start_orientation_reset(controller);
                }
            }
            DigitalAction::ShowKeyboard => {
                if !state {
                    self.open_keyboard();
                }
            }
            DigitalAction::LeftClick | DigitalAction::RightClick | DigitalAction::MiddleClick => {}
        }
    }

    fn handle_analog(&mut self, action: AnalogAction, handle: ControllerHandle, state: Vec3) {
        let threshold = self.config.analog_threshold;
        let Some(controller) = self.controllers.get_mut(&handle) else {
            return;
        };
        match action {
            AnalogAction::PushPullScale => {
                self.manager.push_pull_scale(controller, state.x, state.y);
            }
            AnalogAction::PushPull => {
                if controller.grabbed().is_some() && state.y.abs() > threshold {
                    self.manager.push_pull(controller, state.y);
                }
            }
            AnalogAction::Scroll => {}
        }
    }

    fn handle_synth_action(&mut self, event: ActionEvent) {
        let handle = event.controller();
        if !self.input_synth.is_synthing(handle) {
            return;
        }
        let Some(controller) = self.controllers.get_mut(&handle) else {
            return;
        };
        let Some(id) = controller.hovered() else {
            return;
        };
        let Some(window) = self.manager.window(id) else {
            return;
        };
        if window.is_button() {
            return;
        }
        let local = controller.hover.local;

        let synthesized: Vec<SynthEvent> = match event {
            ActionEvent::Digital {
                action,
                state,
                changed,
                ..
            } => {
                let synth_action = match action {
                    DigitalAction::LeftClick => SynthAction::LeftClick,
                    DigitalAction::RightClick => SynthAction::RightClick,
                    DigitalAction::MiddleClick => SynthAction::MiddleClick,
                    _ => return,
                };
                let click = self
                    .input_synth
                    .digital(handle, synth_action, state, changed, id, window, local);
                if synth_action == SynthAction::LeftClick && state && changed {
                    controller.tip.animate_pulse();
                }
                click.into_iter().collect()
            }
            ActionEvent::Analog { state, .. } => {
                self.input_synth
                    .scroll(handle, Vec2::new(state.x, state.y), id, window, local)
            }
            ActionEvent::Pose { .. } => Vec::new(),
        };

        if self.selection_mode {
            return;
        }
        for event in synthesized {
            self.push_synth_event(event);
        }
    }

    fn push_synth_event(&mut self, event: SynthEvent) {
        let event = match event {
            SynthEvent::Click {
                controller,
                window,
                position,
                button,
                state,
            } => ClientEvent::Click {
                controller,
                window,
                position,
                button,
                state,
            },
            SynthEvent::MoveCursor {
                controller,
                window,
                position,
            } => ClientEvent::MoveCursor {
                controller,
                window,
                position,
            },
        };
        self.events.push_back(event);
    }

    // ── Window manager events ────────────────────────────────

    fn dispatch(&mut self, events: Vec<WmEvent>) {
        for event in events {
            match event {
                WmEvent::HoverStart { controller, window } => self.on_hover_start(controller, window),
                WmEvent::Hover {
                    controller,
                    window,
                    point,
                    local,
                    distance,
                    ..
                } => self.on_hover(controller, window, point, local, distance),
                WmEvent::HoverEnd { controller, window } => self.on_hover_end(controller, window),
                WmEvent::NoHover { controller, pose } => self.on_no_hover(controller, &pose),
                WmEvent::GrabStart { controller, window } => self.on_grab_start(controller, window),
                WmEvent::Grab {
                    controller,
                    window,
                    pose,
                } => {
                    if let Some(c) = self.controllers.get_mut(&controller) {
                        c.tip.set_transformation(pose);
                    }
                    self.events.push_back(ClientEvent::Grab {
                        controller,
                        window,
                        pose,
                    });
                }
                WmEvent::Release { controller, window } => {
                    self.events.push_back(ClientEvent::Release { controller, window });
                }
            }
        }
    }

    fn on_hover_start(&mut self, handle: ControllerHandle, id: WindowId) {
        if let Some(c) = self.controllers.get_mut(&handle) {
            c.tip.set_active(true);
        }
        if self.input_synth.is_synthing(handle) {
            self.input_synth.reset_press_state();
            self.input_synth.reset_scroll();
        }
        let Some(window) = self.manager.window_mut(id) else {
            return;
        };
        if window.is_button() {
            window.selected = true;
        } else {
            self.events.push_back(ClientEvent::HoverStart {
                controller: handle,
                window: id,
            });
        }
    }

    fn on_hover(&mut self, handle: ControllerHandle, id: WindowId, point: Vec3, local: Vec2, distance: f32) {
        let Some(window) = self.manager.window(id) else {
            return;
        };
        if let Some(c) = self.controllers.get_mut(&handle) {
            c.tip.update(&window.transform_no_scale(), point);
            c.pointer.set_length(distance);
        }
        if window.is_button() {
            return;
        }

        let mut moved = None;
        if self.input_synth.is_synthing(handle) {
            moved = self.input_synth.move_cursor(handle, id, window, local);
            self.cursor.update(id, window, local);
        }
        if let Some(moved) = moved {
            if !self.selection_mode {
                self.push_synth_event(moved);
            }
        }
        self.events.push_back(ClientEvent::Hover {
            controller: handle,
            window: id,
            point,
            local,
            distance,
        });
    }

    fn on_hover_end(&mut self, handle: ControllerHandle, id: WindowId) {
        if let Some(c) = self.controllers.get_mut(&handle) {
            c.pointer.reset_length();
            // still active when the pointer moved straight onto another window
            let active = c.hovered().is_some();
            c.tip.set_active(active);
        }
        self.input_synth.reset_press_state();
        if self.input_synth.is_synthing(handle) {
            self.cursor.hide();
        }

        let still_hovered = self.is_hovered(id);
        let Some(window) = self.manager.window_mut(id) else {
            return;
        };
        if window.is_button() {
            if !still_hovered {
                window.selected = false;
            }
        } else {
            self.events.push_back(ClientEvent::HoverEnd {
                controller: handle,
                window: id,
            });
        }
    }

    fn on_no_hover(&mut self, handle: ControllerHandle, pose: &Mat4) {
        if let Some(c) = self.controllers.get_mut(&handle) {
            let tip = Mat4::from_rotation_translation(pose.get_rotation(), pose.get_translation())
                .mul(&Mat4::translation(Vec3::new(0.0, 0.0, -c.pointer.default_length)));
            c.tip.set_transformation(tip);
            c.tip.set_active(false);
        }
        if self.input_synth.is_synthing(handle) {
            self.input_synth.reset_scroll();
        }
    }

    fn on_grab_start(&mut self, handle: ControllerHandle, id: WindowId) {
        if let Some(action) = self.buttons.get(&id).copied() {
            self.press_button(handle, id, action);
            return;
        }

        if self.selection_mode {
            let pinned = self.manager.is_pinned(id);
            self.manager.set_pin(id, !pinned);
            self.mark_windows_for_selection_mode();
            return;
        }

        if self.is_grabbed(id) {
            debug!("window {} already grabbed", id);
            return;
        }

        let Some(controller) = self.controllers.get_mut(&handle) else {
            return;
        };
        self.manager.drag_start(controller);
        if self.input_synth.is_synthing(handle) {
            self.cursor.hide();
        }
        self.events.push_back(ClientEvent::GrabStart {
            controller: handle,
            window: id,
        });
    }

    fn press_button(&mut self, handle: ControllerHandle, id: WindowId, action: ButtonAction) {
        match action {
            ButtonAction::App => self.events.push_back(ClientEvent::ButtonPress {
                controller: handle,
                window: id,
            }),
            ButtonAction::Menu(MenuAction::ArrangeSphere) => self.manager.arrange_sphere(),
            ButtonAction::Menu(MenuAction::ArrangeReset) => self.manager.arrange_reset(),
            ButtonAction::Menu(MenuAction::SelectPinned) => {
                let enabled = !self.selection_mode;
                self.set_selection_mode(enabled);
            }
            ButtonAction::Menu(MenuAction::PinnedOnly) => {
                if !self.selection_mode {
                    let pinned_only = !self.manager.pinned_only();
                    self.show_pinned_only(pinned_only);
                }
            }
        }
    }

    // ── Menu ─────────────────────────────────────────────────

    pub fn toggle_menu(&mut self, handle: ControllerHandle) {
        if self.menu.is_some() {
            self.close_menu();
            return;
        }
        if let Err(e) = self.open_menu(handle) {
            warn!("control menu unavailable: {:#}", e);
        }
    }

    /// Four buttons in a 2x2 grid. With more than one controller the menu
    /// rides on the summoning hand, otherwise it floats in front of the head.
    fn open_menu(&mut self, handle: ControllerHandle) -> anyhow::Result<()> {
        let attach_hand = self.controllers.len() > 1;
        let size = if attach_hand { HAND_BUTTON_SIZE } else { HEAD_BUTTON_SIZE };
        let half = size / 2.0;
        let grid = [
            (MenuAction::ArrangeSphere, -half, half),
            (MenuAction::ArrangeReset, half, half),
            (MenuAction::SelectPinned, -half, -half),
            (MenuAction::PinnedOnly, half, -half),
        ];

        let mut container = Container::new();
        container.set_attachment(if attach_hand {
            Attachment::Hand(handle)
        } else {
            Attachment::Head
        });
        container.set_layout(ContainerLayout::Relative);

        let mut buttons = Vec::with_capacity(grid.len());
        for (action, x, y) in grid {
            match self.create_button(action.title(), size, size, Mat4::IDENTITY, ButtonAction::Menu(action)) {
                Ok(id) => {
                    container.add_window(id, Mat4::translation(Vec3::new(x, y, 0.0)));
                    buttons.push(id);
                }
                Err(e) => {
                    for id in buttons {
                        self.remove_window(id);
                    }
                    return Err(e);
                }
            }
        }

        if !attach_hand {
            let distance = self.config.menu_distance;
            container.center_view(&self.tracking.hmd_pose(), distance);
            container.set_distance(distance);
        }
        let container = self.manager.add_container(container);
        self.menu = Some(Menu { container, buttons });
        info!(
            "control menu opened ({})",
            if attach_hand { "hand" } else { "head" }
        );
        Ok(())
    }

    pub fn close_menu(&mut self) {
        let Some(menu) = self.menu.take() else {
            return;
        };
        for id in menu.buttons {
            self.remove_window(id);
        }
        self.manager.remove_container(menu.container);
        info!("control menu closed");
    }

    // ── Keyboard ─────────────────────────────────────────────

    /// Open the system keyboard; presses go to the window the synth
    /// controller hovers right now.
    fn open_keyboard(&mut self) {
        if !self.tracking.show_system_keyboard() {
            warn!("runtime has no system keyboard");
            return;
        }
        self.keyboard_window = self.synth_hovered();
        match self.keyboard_window {
            Some(id) => info!("system keyboard opened for window {}", id),
            None => info!("system keyboard opened with no target window"),
        }
    }

    // ── Mode switch ──────────────────────────────────────────

    /// Move every desktop window to the other backend.
    ///
    /// Returns the mapping from old to new window ids. If any surface
    /// cannot be created the switch is abandoned and nothing changes.
    pub fn switch_mode(&mut self) -> anyhow::Result<Vec<(WindowId, WindowId)>> {
        let from = self.manager.kind();
        let to = from.other();
        let factory = self
            .spare_factory
            .take()
            .with_context(|| format!("no {} backend available", to))?;

        let old_ids: Vec<WindowId> = self
            .manager
            .windows()
            .filter(|(_, w)| !w.is_button())
            .map(|(id, _)| id)
            .collect();
        let states = self.manager.save_state();
        let pinned_only = self.manager.pinned_only();

        let mut next = WindowManager::new(self.config.clone(), factory);
        let new_ids = match next.restore_state(&states) {
            Ok(ids) => ids,
            Err(e) => {
                self.spare_factory = Some(next.into_factory());
                warn!("mode switch to {} aborted: {:#}", to, e);
                return Err(e.context(format!("switching from {} to {} backend", from, to)));
            }
        };
        next.show_pinned_only(pinned_only);

        let old = std::mem::replace(&mut self.manager, next);
        self.spare_factory = Some(old.into_factory());

        self.menu = None;
        self.buttons.clear();
        self.keyboard_window = None;
        for controller in self.controllers.values_mut() {
            controller.reset_hover_state();
            controller.reset_grab_state();
            controller.pointer.reset_length();
            controller.tip.set_active(false);
        }
        self.input_synth.reset_press_state();
        self.input_synth.reset_scroll();
        self.cursor.hide();
        self.cursor.window = None;
        if self.selection_mode {
            self.mark_windows_for_selection_mode();
        }

        info!("switched from {} to {} backend ({} window(s))", from, to, new_ids.len());
        Ok(old_ids.into_iter().zip(new_ids).collect())
    }
}
