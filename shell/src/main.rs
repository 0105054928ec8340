//! xrd-shell: runs a scripted headless session of the XR desktop shell.

use std::rc::Rc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use xrd_shell::backend::BackendKind;
use xrd_shell::client::Client;
use xrd_shell::clock::SystemClock;
use xrd_shell::config::ShellConfig;
use xrd_shell::driver::{self, DriverOptions, Session};
use xrd_shell::math::{Mat4, Quat, Vec3};
use xrd_shell::tracking::{ActionEvent, AnalogAction, DigitalAction, RuntimeEvent, ScriptedTracking};
use xrd_shell::window::WindowDesc;

#[derive(Parser, Debug)]
#[command(name = "xrd-shell", about = "XR desktop shell interaction core")]
struct Cli {
    /// Backend to start on: overlay or scene
    #[arg(long, default_value = "overlay")]
    backend: String,

    /// Input poll interval in milliseconds
    #[arg(long, default_value = "20")]
    input_poll_rate_ms: u64,

    /// Exit after N seconds
    #[arg(long)]
    exit_after: Option<u64>,

    /// Number of desktop windows to create
    #[arg(long, default_value = "3")]
    windows: u32,

    /// Switch to the other backend after N seconds
    #[arg(long)]
    switch_after: Option<u64>,

    /// Show version and exit
    #[arg(long)]
    version: bool,
}

/// Sweep the pointer across the window row, grab the middle window, pull
/// it closer and let go.
fn script_session(tracking: &ScriptedTracking, windows: u32) {
    const CONTROLLER: u64 = 1;
    tracking.push_runtime(RuntimeEvent::DeviceActivate {
        controller: CONTROLLER,
    });

    let sweep = windows.max(1) as f32 * 0.6;
    for step in 0..=40 {
        let yaw = sweep / 2.0 - sweep * step as f32 / 40.0;
        let pose = Mat4::from_quat(&Quat::from_euler(yaw, 0.0, 0.0));
        tracking.push_tick(vec![ActionEvent::pointer(CONTROLLER, pose)]);
    }

    let center = Mat4::IDENTITY;
    tracking.push_tick(vec![
        ActionEvent::pointer(CONTROLLER, center),
        ActionEvent::press(CONTROLLER, DigitalAction::Grab),
    ]);
    for _ in 0..25 {
        tracking.push_tick(vec![
            ActionEvent::pointer(CONTROLLER, center),
            ActionEvent::analog(CONTROLLER, AnalogAction::PushPullScale, 0.0, -0.8),
        ]);
    }
    tracking.push_tick(vec![ActionEvent::release(CONTROLLER, DigitalAction::Grab)]);
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("xrd-shell {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "xrd_shell=info".into()),
        )
        .init();

    info!("xrd-shell v{} starting", env!("CARGO_PKG_VERSION"));

    let Some(kind) = BackendKind::parse(&cli.backend) else {
        anyhow::bail!("unknown backend '{}', use overlay or scene", cli.backend);
    };
    info!("backend: {}", kind);

    let mut config = ShellConfig::default();
    config.set("input-poll-rate-ms", &cli.input_poll_rate_ms.to_string())?;

    let tracking = ScriptedTracking::new();
    let mut client = Client::new(config, Box::new(tracking.clone()), kind);

    let ppm = client.config().pixels_per_meter;
    let count = cli.windows;
    for i in 0..count {
        let x = (i as f32 - (count as f32 - 1.0) / 2.0) * 1.2;
        let desc = WindowDesc::from_pixels(&format!("window-{}", i), 720, 450, ppm)
            .with_native(u64::from(i) + 1)
            .at(Mat4::translation(Vec3::new(x, 0.0, -2.5)));
        client.add_window(&desc, true)?;
    }
    script_session(&tracking, count);

    let options = DriverOptions {
        exit_after: Some(Duration::from_secs(cli.exit_after.unwrap_or(5))),
        switch_after: cli.switch_after.map(Duration::from_secs),
        ..DriverOptions::default()
    };
    let session = driver::run(Session::new(client, Rc::new(SystemClock)), &options)?;

    info!(
        "xrd-shell exiting after {} input tick(s) on {} backend",
        session.input_ticks(),
        session.client().kind()
    );
    Ok(())
}
