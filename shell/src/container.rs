//! Rigid window groups attached to the head or a hand.

use crate::controller::ControllerHandle;
use crate::math::{Mat4, Vec3};
use crate::spatial::{rotation_angles, FrustumAngles};
use crate::window::WindowId;

/// Distance used when a head container has no fixed distance.
const DEFAULT_VIEW_DISTANCE: f32 = 2.0;

/// Offset of hand-attached containers from the grip pose.
const HAND_OFFSET: Vec3 = Vec3 {
    x: 0.0,
    y: 0.05,
    z: -0.05,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Attachment {
    #[default]
    None,
    Head,
    Hand(ControllerHandle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContainerLayout {
    /// Windows keep their own transforms.
    #[default]
    None,
    /// Windows follow the anchor at their relative transforms.
    Relative,
}

#[derive(Debug, Clone, Default)]
pub struct Container {
    windows: Vec<(WindowId, Mat4)>,
    attachment: Attachment,
    layout: ContainerLayout,
    distance: Option<f32>,
    anchor: Mat4,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_window(&mut self, window: WindowId, relative: Mat4) {
        self.windows.push((window, relative));
    }

    pub fn remove_window(&mut self, window: WindowId) -> bool {
        let before = self.windows.len();
        self.windows.retain(|(id, _)| *id != window);
        self.windows.len() != before
    }

    pub fn contains(&self, window: WindowId) -> bool {
        self.windows.iter().any(|(id, _)| *id == window)
    }

    pub fn windows(&self) -> impl Iterator<Item = WindowId> + '_ {
        self.windows.iter().map(|(id, _)| *id)
    }

    pub fn set_attachment(&mut self, attachment: Attachment) {
        self.attachment = attachment;
    }

    pub fn attachment(&self) -> Attachment {
        self.attachment
    }

    pub fn set_layout(&mut self, layout: ContainerLayout) {
        self.layout = layout;
    }

    pub fn set_distance(&mut self, distance: f32) {
        self.distance = Some(distance);
    }

    pub fn anchor(&self) -> Mat4 {
        self.anchor
    }

    /// Put the anchor `distance` in front of the head, facing it.
    pub fn center_view(&mut self, hmd: &Mat4, distance: f32) {
        self.anchor = hmd
            .without_scale()
            .mul(&Mat4::translation(Vec3::new(0.0, 0.0, -distance)));
    }

    /// Whether the anchor lies inside the view frustum. An anchor sitting
    /// on the head itself counts as out of view.
    pub fn is_in_view(&self, hmd: &Mat4, angles: &FrustumAngles) -> bool {
        let Some(head_inv) = hmd.without_scale().inverse() else {
            return true;
        };
        let dir = head_inv.transform_point(self.anchor.get_translation());
        match rotation_angles(dir) {
            Some((azimuth, inclination)) => angles.contains(azimuth, inclination),
            None => false,
        }
    }

    /// Follow the attachment target. Returns true when the anchor moved.
    ///
    /// Head containers only re-center once they leave the frustum.
    pub fn step(&mut self, hmd: &Mat4, angles: &FrustumAngles, hand: Option<&Mat4>) -> bool {
        match self.attachment {
            Attachment::None => false,
            Attachment::Head => {
                if self.is_in_view(hmd, angles) {
                    return false;
                }
                self.center_view(hmd, self.distance.unwrap_or(DEFAULT_VIEW_DISTANCE));
                true
            }
            Attachment::Hand(_) => {
                let Some(grip) = hand else {
                    return false;
                };
                self.anchor = grip
                    .without_scale()
                    .mul(&Mat4::translation(HAND_OFFSET));
                true
            }
        }
    }

    /// World transforms for laid-out windows.
    pub fn layout_transforms(&self) -> Vec<(WindowId, Mat4)> {
        match self.layout {
            ContainerLayout::None => Vec::new(),
            ContainerLayout::Relative => self
                .windows
                .iter()
                .map(|(id, relative)| (*id, self.anchor.mul(relative)))
                .collect(),
        }
    }
}
