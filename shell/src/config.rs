//! Tunables for the interaction core.
//!
//! Keys accepted by [`ShellConfig::set`] match the settings store
//! (`scroll-to-push-ratio`, `input-poll-rate-ms`, ...), so a settings
//! watcher can forward changes verbatim.

use anyhow::Context;
use tracing::info;

// ── ShellConfig ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ShellConfig {
    /// Push/pull speed relative to the current distance.
    pub scroll_to_push_ratio: f32,
    /// Scale change per unit of analog input.
    pub scroll_to_scale_ratio: f32,
    /// Analog deadzone for push/pull and scale.
    pub analog_threshold: f32,
    /// Input poll interval, also the push/pull time step.
    pub input_poll_rate_ms: u64,
    /// Runtime (device/quit) poll interval.
    pub runtime_poll_ms: u64,
    /// Pixels per meter for windows created from pixel sizes.
    pub pixels_per_meter: f32,
    pub min_window_distance: f32,
    pub max_window_distance: f32,
    /// Scales at or below this are rejected.
    pub min_scale: f32,
    pub pointer_default_length: f32,
    /// Slerp progress per tick of the orientation reset animation.
    pub orientation_reset_step: f32,
    /// Radius of the arrange-sphere ring.
    pub sphere_radius: f32,
    /// Distance of the head-attached control menu.
    pub menu_distance: f32,
    /// Accumulated scroll before one scroll click is emitted.
    pub scroll_threshold: f32,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            scroll_to_push_ratio: 0.5,
            scroll_to_scale_ratio: 0.1,
            analog_threshold: 0.5,
            input_poll_rate_ms: 20,
            runtime_poll_ms: 20,
            pixels_per_meter: 450.0,
            min_window_distance: 0.05,
            max_window_distance: 15.0,
            min_scale: 0.1,
            pointer_default_length: 5.0,
            orientation_reset_step: 0.07,
            sphere_radius: 3.0,
            menu_distance: 2.0,
            scroll_threshold: 0.1,
        }
    }
}

fn parse_f32(key: &str, value: &str) -> anyhow::Result<f32> {
    let v: f32 = value
        .trim()
        .parse()
        .with_context(|| format!("invalid value '{}' for {}", value, key))?;
    if !v.is_finite() {
        anyhow::bail!("{} must be finite, got {}", key, value);
    }
    Ok(v)
}

fn parse_positive(key: &str, value: &str) -> anyhow::Result<f32> {
    let v = parse_f32(key, value)?;
    if v <= 0.0 {
        anyhow::bail!("{} must be positive, got {}", key, v);
    }
    Ok(v)
}

impl ShellConfig {
    /// Update one setting by its store key.
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "scroll-to-push-ratio" => self.scroll_to_push_ratio = parse_f32(key, value)?,
            "scroll-to-scale-ratio" => self.scroll_to_scale_ratio = parse_f32(key, value)?,
            "analog-threshold" => {
                let v = parse_f32(key, value)?;
                if !(0.0..1.0).contains(&v) {
                    anyhow::bail!("analog-threshold must be in [0, 1), got {}", v);
                }
                self.analog_threshold = v;
            }
            "input-poll-rate-ms" => {
                let v: u64 = value
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid value '{}' for {}", value, key))?;
                if v == 0 {
                    anyhow::bail!("input-poll-rate-ms must be at least 1");
                }
                self.input_poll_rate_ms = v;
            }
            "pixels-per-meter" => self.pixels_per_meter = parse_positive(key, value)?,
            "pointer-length" => self.pointer_default_length = parse_positive(key, value)?,
            "sphere-radius" => self.sphere_radius = parse_positive(key, value)?,
            "menu-distance" => self.menu_distance = parse_positive(key, value)?,
            "scroll-threshold" => self.scroll_threshold = parse_positive(key, value)?,
            other => anyhow::bail!("unknown setting '{}'", other),
        }
        info!("setting {} = {}", key, value.trim());
        Ok(())
    }

    /// Elapsed seconds per input tick.
    pub fn input_tick_secs(&self) -> f32 {
        self.input_poll_rate_ms as f32 / 1000.0
    }

    pub fn status_sexp(&self) -> String {
        format!(
            "(:scroll-to-push-ratio {:.3} :scroll-to-scale-ratio {:.3} :analog-threshold {:.3} :input-poll-rate-ms {} :runtime-poll-ms {} :pixels-per-meter {:.1} :window-distance ({:.2} {:.2}) :min-scale {:.2} :pointer-length {:.2} :sphere-radius {:.2})",
            self.scroll_to_push_ratio,
            self.scroll_to_scale_ratio,
            self.analog_threshold,
            self.input_poll_rate_ms,
            self.runtime_poll_ms,
            self.pixels_per_meter,
            self.min_window_distance,
            self.max_window_distance,
            self.min_scale,
            self.pointer_default_length,
            self.sphere_radius,
        )
    }
}
