//! The simulation loop on its own thread.
//!
//! The thread owns nothing but a shared handle: the [`Simulation`] sits behind
//! a mutex so the interface thread can build and edit the scene between
//! steps. Render output goes through the [`RenderList`], never through the
//! mutex.
//!
//! Scripts run on the simulation thread while the lock is held. They must not
//! call back into [`SimulationHandle`]; send a message instead.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use apex_config::RealtimeSync;
use tracing::{debug, info, warn};

use crate::error::PhysicsError;
use crate::render_list::RenderList;
use crate::simulation::Simulation;

/// Whether the loop steps, idles or exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunLevel {
    /// Keeps publishing render frames but does not step.
    Paused = 0,
    /// Steps at the configured pace.
    Running = 1,
    /// Exits at the next iteration. Final.
    Done = 2,
}

impl RunLevel {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => RunLevel::Paused,
            1 => RunLevel::Running,
            _ => RunLevel::Done,
        }
    }
}

struct Shared {
    sim: Mutex<Simulation>,
    run_level: AtomicU8,
    render: Arc<RenderList>,
    steps: AtomicU64,
    lag: AtomicU64,
}

/// Cloneable access to a simulation driven by a [`SimulationThread`].
#[derive(Clone)]
pub struct SimulationHandle {
    shared: Arc<Shared>,
}

impl SimulationHandle {
    fn new(sim: Simulation) -> Self {
        let render = sim.render_list();
        Self {
            shared: Arc::new(Shared {
                sim: Mutex::new(sim),
                run_level: AtomicU8::new(RunLevel::Paused as u8),
                render,
                steps: AtomicU64::new(0),
                lag: AtomicU64::new(0),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Simulation> {
        self.shared
            .sim
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` with exclusive access to the simulation, between steps.
    pub fn with_simulation<R>(&self, f: impl FnOnce(&mut Simulation) -> R) -> R {
        f(&mut self.lock())
    }

    /// Current run level.
    pub fn run_level(&self) -> RunLevel {
        RunLevel::from_u8(self.shared.run_level.load(Ordering::Acquire))
    }

    /// Starts or pauses stepping. Has no effect once the loop is done.
    pub fn set_running(&self, running: bool) {
        let level = if running {
            RunLevel::Running
        } else {
            RunLevel::Paused
        };
        let _ = self
            .shared
            .run_level
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != RunLevel::Done as u8).then_some(level as u8)
            });
    }

    fn finish(&self) {
        self.shared
            .run_level
            .store(RunLevel::Done as u8, Ordering::Release);
    }

    /// Macro steps run so far.
    pub fn steps(&self) -> u64 {
        self.shared.steps.load(Ordering::Relaxed)
    }

    /// Iterations that finished after their wall-clock deadline.
    pub fn lag(&self) -> u64 {
        self.shared.lag.load(Ordering::Relaxed)
    }

    /// Render snapshots published by the loop.
    pub fn render_list(&self) -> Arc<RenderList> {
        Arc::clone(&self.shared.render)
    }
}

/// What the loop should do after an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pace {
    /// Ahead of the wall clock by this much.
    Wait(Duration),
    /// Behind the wall clock.
    Lag,
}

/// Compares the simulated deadline with elapsed wall time.
pub(crate) fn pace(deadline: Duration, elapsed: Duration) -> Pace {
    match deadline.checked_sub(elapsed) {
        Some(ahead) if !ahead.is_zero() => Pace::Wait(ahead),
        _ => Pace::Lag,
    }
}

/// Owns the loop thread. Dropping it stops the loop.
pub struct SimulationThread {
    handle: SimulationHandle,
    join: Option<JoinHandle<()>>,
}

impl SimulationThread {
    /// Moves `sim` onto a new thread. The loop starts paused.
    pub fn start(sim: Simulation) -> Result<Self, PhysicsError> {
        let handle = SimulationHandle::new(sim);
        let worker = handle.clone();
        let join = std::thread::Builder::new()
            .name("simulation".into())
            .spawn(move || run(worker))
            .map_err(PhysicsError::ThreadSpawn)?;
        info!("simulation thread started");
        Ok(Self {
            handle,
            join: Some(join),
        })
    }

    /// Shared handle to the simulation.
    pub fn handle(&self) -> SimulationHandle {
        self.handle.clone()
    }

    /// Whether the loop has exited, on request or because it panicked.
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Tells the loop to exit and waits for it.
    pub fn stop(&mut self) {
        self.handle.finish();
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                warn!("simulation thread panicked");
            }
            info!(
                steps = self.handle.steps(),
                lag = self.handle.lag(),
                "simulation thread stopped"
            );
        }
    }
}

impl Drop for SimulationThread {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Marks the loop done however it exits, panics included.
struct FinishOnExit<'a>(&'a SimulationHandle);

impl Drop for FinishOnExit<'_> {
    fn drop(&mut self) {
        self.0.finish();
    }
}

fn run(handle: SimulationHandle) {
    let _finish = FinishOnExit(&handle);
    let (stepsize, sync, notify) = handle.with_simulation(|sim| {
        let config = sim.config();
        (config.stepsize, config.realtime_sync, config.sync_interface)
    });
    let step = Duration::from_secs_f32(stepsize);
    let start = Instant::now();
    let mut deadline = Duration::ZERO;

    while handle.run_level() != RunLevel::Done {
        let stepped = {
            let mut sim = handle.lock();
            let running = handle.run_level() == RunLevel::Running;
            if running {
                sim.macro_step();
                handle.shared.steps.store(sim.steps(), Ordering::Relaxed);
            }
            sim.publish_render_state();
            running
        };
        if notify {
            handle.shared.render.notify();
        }

        deadline += step;
        if sync == RealtimeSync::Off {
            // Unpaced, but a paused loop still idles one step per frame.
            if !stepped {
                std::thread::sleep(step);
            }
            continue;
        }
        match pace(deadline, start.elapsed()) {
            Pace::Wait(ahead) => match sync {
                RealtimeSync::Spin => {
                    while start.elapsed() < deadline {
                        std::hint::spin_loop();
                    }
                }
                _ => std::thread::sleep(ahead),
            },
            Pace::Lag => {
                handle.shared.lag.fetch_add(1, Ordering::Relaxed);
                // Drop the backlog instead of stepping back to back to catch up.
                let elapsed = start.elapsed();
                if elapsed > deadline + step {
                    debug!(behind = ?(elapsed - deadline), "simulation behind wall clock");
                    deadline = elapsed;
                }
            }
        }
    }
    debug!("simulation loop exited");
}

#[cfg(test)]
mod tests {
    use apex_config::{EnvironmentConfig, PhysicsConfig};

    use super::*;
    use crate::PhysicsWorld;
    use crate::simulation::Controller;

    struct Explode;

    impl Controller for Explode {
        fn physics_step(&mut self, _world: &mut PhysicsWorld, _step: f32) {
            panic!("controller failed");
        }
    }

    fn config(sync: RealtimeSync) -> PhysicsConfig {
        PhysicsConfig {
            realtime_sync: sync,
            ..PhysicsConfig::default()
        }
    }

    fn simulation(sync: RealtimeSync) -> Simulation {
        Simulation::new(&config(sync), &EnvironmentConfig::default()).unwrap()
    }

    #[test]
    fn test_pace_waits_when_ahead() {
        let pace = pace(Duration::from_millis(10), Duration::from_millis(4));
        assert_eq!(pace, Pace::Wait(Duration::from_millis(6)));
    }

    #[test]
    fn test_pace_lags_when_behind() {
        assert_eq!(
            pace(Duration::from_millis(10), Duration::from_millis(12)),
            Pace::Lag
        );
        assert_eq!(
            pace(Duration::from_millis(10), Duration::from_millis(10)),
            Pace::Lag
        );
    }

    #[test]
    fn test_done_is_final() {
        let handle = SimulationHandle::new(simulation(RealtimeSync::Off));
        assert_eq!(handle.run_level(), RunLevel::Paused);
        handle.set_running(true);
        assert_eq!(handle.run_level(), RunLevel::Running);
        handle.finish();
        handle.set_running(true);
        assert_eq!(handle.run_level(), RunLevel::Done);
    }

    #[test]
    fn test_paused_thread_publishes_without_stepping() {
        let mut thread = SimulationThread::start(simulation(RealtimeSync::Sleep)).unwrap();
        let handle = thread.handle();
        let frame = handle
            .render_list()
            .wait_for_frame(0, Duration::from_secs(5));
        assert!(frame.is_some());
        thread.stop();
        assert_eq!(handle.steps(), 0);
        assert_eq!(handle.with_simulation(|sim| sim.steps()), 0);
    }

    #[test]
    fn test_running_thread_steps_until_stopped() {
        let mut thread = SimulationThread::start(simulation(RealtimeSync::Off)).unwrap();
        let handle = thread.handle();
        handle.set_running(true);

        let list = handle.render_list();
        let mut seen = 0;
        for _ in 0..3 {
            let frame = list.wait_for_frame(seen, Duration::from_secs(5)).unwrap();
            seen = frame.sequence;
        }
        thread.stop();

        let steps = handle.steps();
        assert!(steps > 0);
        assert_eq!(handle.run_level(), RunLevel::Done);
        // Stopped: nothing moves any more.
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(handle.steps(), steps);
    }

    #[test]
    fn test_paused_unpaced_loop_idles() {
        let mut thread = SimulationThread::start(simulation(RealtimeSync::Off)).unwrap();
        let handle = thread.handle();
        std::thread::sleep(Duration::from_millis(100));
        let published = handle.render_list().sequence();
        thread.stop();
        // One frame per 10 ms step while paused, not one per loop spin.
        assert!(published > 0);
        assert!(published <= 30, "{published} frames in 100 ms");
    }

    #[test]
    fn test_panicking_loop_reports_finished() {
        let mut sim = simulation(RealtimeSync::Off);
        sim.add_controller(Box::new(Explode));
        let mut thread = SimulationThread::start(sim).unwrap();
        let handle = thread.handle();
        assert!(!thread.is_finished());
        handle.set_running(true);

        let deadline = Instant::now() + Duration::from_secs(5);
        while !thread.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(thread.is_finished());
        assert_eq!(handle.run_level(), RunLevel::Done);
        // The poisoned lock is still usable for teardown.
        assert_eq!(handle.with_simulation(|sim| sim.steps()), 0);
        thread.stop();
    }
}
