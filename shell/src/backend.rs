//! Rendering backend surfaces.
//!
//! A window's geometry lives in a backend surface. Two variants exist:
//!
//! - `OverlaySurface`: a compositor overlay quad, centered on its transform
//! - `SceneSurface`: a mesh in our own scene graph, drawn from a unit square
//!
//! The window manager only talks to `dyn WindowSurface`, which is what lets
//! a session migrate between the two.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::math::{Mat4, Vec2, Vec3};
use crate::spatial::{point_in_unit_square, ray_plane_intersect, Plane, Ray};

/// Which rendering backend a surface (and a window manager) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Overlay,
    Scene,
}

impl BackendKind {
    /// The backend a mode switch migrates to.
    pub fn other(self) -> Self {
        match self {
            Self::Overlay => Self::Scene,
            Self::Scene => Self::Overlay,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "overlay" => Some(Self::Overlay),
            "scene" => Some(Self::Scene),
            _ => None,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overlay => write!(f, "overlay"),
            Self::Scene => write!(f, "scene"),
        }
    }
}

/// A valid ray hit on a surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceHit {
    /// Distance along the ray.
    pub distance: f32,
    /// World-space intersection point.
    pub point: Vec3,
    /// Window-local point in current meters, origin at the window center,
    /// +Y up.
    pub local: Vec2,
}

/// Geometry capability set every backend surface provides.
pub trait WindowSurface: fmt::Debug {
    fn kind(&self) -> BackendKind;

    /// Full transform including scale.
    fn transform(&self) -> Mat4;

    fn set_transform(&mut self, transform: Mat4);

    /// Unscaled size in meters.
    fn local_size(&self) -> Vec2;

    /// Intersect a ray with the surface. `None` for misses and degenerate
    /// geometry.
    fn intersect_ray(&self, ray: &Ray) -> Option<SurfaceHit>;
}

/// Creates surfaces for one backend.
pub trait SurfaceFactory {
    fn kind(&self) -> BackendKind;

    fn create(
        &mut self,
        title: &str,
        width_meters: f32,
        height_meters: f32,
    ) -> anyhow::Result<Box<dyn WindowSurface>>;
}

fn current_local(transform: &Mat4, unscaled: Vec3) -> Vec2 {
    let s = transform.get_scale();
    Vec2::new(unscaled.x * s.x, unscaled.y * s.y)
}

// ── Overlay ──────────────────────────────────────────────────

/// One counted overlay. Dropping it frees the slot in its factory.
#[derive(Debug)]
struct OverlaySlot(Rc<Cell<usize>>);

impl Drop for OverlaySlot {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

/// Compositor overlay quad. Its transform sits at the quad center.
#[derive(Debug)]
pub struct OverlaySurface {
    transform: Mat4,
    size: Vec2,
    _slot: Option<OverlaySlot>,
}

impl OverlaySurface {
    pub fn new(width_meters: f32, height_meters: f32) -> Self {
        Self {
            transform: Mat4::IDENTITY,
            size: Vec2::new(width_meters, height_meters),
            _slot: None,
        }
    }
}

impl WindowSurface for OverlaySurface {
    fn kind(&self) -> BackendKind {
        BackendKind::Overlay
    }

    fn transform(&self) -> Mat4 {
        self.transform
    }

    fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
    }

    fn local_size(&self) -> Vec2 {
        self.size
    }

    fn intersect_ray(&self, ray: &Ray) -> Option<SurfaceHit> {
        let plane = Plane::from_transform(&self.transform)?;
        let distance = ray_plane_intersect(ray, &plane)?;
        let point = ray.point_at(distance);

        let local = self.transform.inverse()?.transform_point(point);
        let unit = Vec2::new(local.x / self.size.x + 0.5, local.y / self.size.y + 0.5);
        if !point_in_unit_square(unit) {
            return None;
        }

        Some(SurfaceHit {
            distance,
            point,
            local: current_local(&self.transform, local),
        })
    }
}

/// Overlay runtimes cap the number of live overlays.
#[derive(Debug)]
pub struct OverlayFactory {
    limit: Option<usize>,
    live: Rc<Cell<usize>>,
}

impl OverlayFactory {
    pub fn new() -> Self {
        Self {
            limit: None,
            live: Rc::new(Cell::new(0)),
        }
    }

    /// Fail creation while `limit` surfaces from this factory are alive.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            live: Rc::new(Cell::new(0)),
        }
    }

    /// Overlays created here and not yet dropped.
    pub fn live(&self) -> usize {
        self.live.get()
    }
}

impl Default for OverlayFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl SurfaceFactory for OverlayFactory {
    fn kind(&self) -> BackendKind {
        BackendKind::Overlay
    }

    fn create(
        &mut self,
        title: &str,
        width_meters: f32,
        height_meters: f32,
    ) -> anyhow::Result<Box<dyn WindowSurface>> {
        if let Some(limit) = self.limit {
            if self.live.get() >= limit {
                anyhow::bail!("overlay limit of {} reached creating '{}'", limit, title);
            }
        }
        check_size(title, width_meters, height_meters)?;
        self.live.set(self.live.get() + 1);
        debug!(
            "overlay surface '{}' {}x{}m ({} live)",
            title,
            width_meters,
            height_meters,
            self.live.get()
        );
        let mut surface = OverlaySurface::new(width_meters, height_meters);
        surface._slot = Some(OverlaySlot(Rc::clone(&self.live)));
        Ok(Box::new(surface))
    }
}

// ── Scene ────────────────────────────────────────────────────

/// Scene-graph window mesh. The mesh is the unit square [0,1]x[0,1], so
/// its model matrix maps unit coordinates straight onto the window.
#[derive(Debug, Clone)]
pub struct SceneSurface {
    transform: Mat4,
    size: Vec2,
}

impl SceneSurface {
    pub fn new(width_meters: f32, height_meters: f32) -> Self {
        Self {
            transform: Mat4::IDENTITY,
            size: Vec2::new(width_meters, height_meters),
        }
    }

    /// Model matrix of the unit-square mesh.
    pub fn model_matrix(&self) -> Mat4 {
        self.transform
            .mul(&Mat4::scale(self.size.x, self.size.y, 1.0))
            .mul(&Mat4::translation(Vec3::new(-0.5, -0.5, 0.0)))
    }
}

impl WindowSurface for SceneSurface {
    fn kind(&self) -> BackendKind {
        BackendKind::Scene
    }

    fn transform(&self) -> Mat4 {
        self.transform
    }

    fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
    }

    fn local_size(&self) -> Vec2 {
        self.size
    }

    fn intersect_ray(&self, ray: &Ray) -> Option<SurfaceHit> {
        let model = self.model_matrix();
        let plane = Plane::from_transform(&model)?;
        let distance = ray_plane_intersect(ray, &plane)?;
        let point = ray.point_at(distance);

        let unit = model.inverse()?.transform_point(point);
        if !point_in_unit_square(Vec2::new(unit.x, unit.y)) {
            return None;
        }

        let unscaled = Vec3::new(
            (unit.x - 0.5) * self.size.x,
            (unit.y - 0.5) * self.size.y,
            0.0,
        );
        Some(SurfaceHit {
            distance,
            point,
            local: current_local(&self.transform, unscaled),
        })
    }
}

#[derive(Debug, Default)]
pub struct SceneFactory;

impl SurfaceFactory for SceneFactory {
    fn kind(&self) -> BackendKind {
        BackendKind::Scene
    }

    fn create(
        &mut self,
        title: &str,
        width_meters: f32,
        height_meters: f32,
    ) -> anyhow::Result<Box<dyn WindowSurface>> {
        check_size(title, width_meters, height_meters)?;
        debug!("scene mesh '{}' {}x{}m", title, width_meters, height_meters);
        Ok(Box::new(SceneSurface::new(width_meters, height_meters)))
    }
}

fn check_size(title: &str, width: f32, height: f32) -> anyhow::Result<()> {
    if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
        anyhow::bail!("invalid size {}x{}m for '{}'", width, height, title);
    }
    Ok(())
}

/// Factory for `kind` with default settings.
pub fn default_factory(kind: BackendKind) -> Box<dyn SurfaceFactory> {
    match kind {
        BackendKind::Overlay => Box::new(OverlayFactory::new()),
        BackendKind::Scene => Box::new(SceneFactory),
    }
}
