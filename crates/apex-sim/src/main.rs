//! Headless Apex simulator: loads the configuration, builds the demo track,
//! runs the simulation thread for the requested simulated time and logs what
//! the scripts report.

mod scene;

use std::time::Duration;

use apex_config::{CliArgs, Config, ConfigError};
use apex_physics::{PhysicsError, ScriptCall, Simulation, SimulationThread};
use clap::Parser;
use crossbeam_channel::unbounded;
use tracing::{debug, info};

use crate::scene::DemoScene;

/// How long the interface thread waits for a frame before checking messages.
const FRAME_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Physics(#[from] PhysicsError),
    #[error("simulation thread exited after {time:.2} s of {duration} s")]
    SimulationStopped { time: f64, duration: f32 },
}

fn main() {
    let args = CliArgs::parse();

    let config_dir = args
        .config
        .clone()
        .or_else(Config::default_dir)
        .unwrap_or_else(|| std::path::PathBuf::from(".apex"));

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    apex_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    if let Err(e) = run(config, args.duration) {
        tracing::error!(error = %e, "simulation failed");
        eprintln!("apex-sim: {e}");
        std::process::exit(1);
    }
}

fn run(mut config: Config, duration: f32) -> Result<(), AppError> {
    config.validate()?;

    let mut sim = Simulation::new(&config.physics, &config.environment)?;
    let (tx, rx) = unbounded::<ScriptCall>();
    let mut scene = DemoScene::build(&mut sim, &tx)?;
    drop(tx);

    let mut thread = SimulationThread::start(sim)?;
    let handle = thread.handle();
    let render = handle.render_list();
    handle.set_running(true);
    info!(duration, "simulation running");

    let mut seen = 0;
    loop {
        if thread.is_finished() {
            return Err(AppError::SimulationStopped {
                time: render.latest().time,
                duration,
            });
        }
        if let Some(frame) = render.wait_for_frame(seen, FRAME_TIMEOUT) {
            seen = frame.sequence;
            debug!(
                sequence = frame.sequence,
                time = frame.time,
                models = frame.entries.len(),
                "frame"
            );
            if frame.time >= f64::from(duration) {
                break;
            }
        }
        for call in rx.try_iter() {
            handle.with_simulation(|sim| scene.handle_call(&call, sim));
        }
    }

    thread.stop();
    let (steps, time) = handle.with_simulation(|sim| {
        let summary = (sim.steps(), sim.time());
        sim.teardown();
        summary
    });
    info!(
        steps,
        time,
        lag = handle.lag(),
        laps = scene.laps(),
        crates_left = scene.crates_left(),
        "simulation finished"
    );
    Ok(())
}
