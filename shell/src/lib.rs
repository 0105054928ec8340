//! xrd-shell: interaction core of an XR desktop shell.
//!
//! Windows float in 3D space; controllers point, hover, grab, push/pull and
//! scale them, and a single controller drives a synthesized desktop pointer.
//! Windows render either as runtime overlays or as scene-graph meshes, and
//! can be migrated between the two at runtime. The binary entry point lives
//! in `main.rs`.

pub mod backend;
pub mod client;
pub mod clock;
pub mod config;
pub mod container;
pub mod controller;
pub mod cursor;
pub mod driver;
pub mod input_synth;
pub mod math;
pub mod spatial;
pub mod tracking;
pub mod window;
pub mod window_manager;
