//! # Ramping VU executor
//!
//! A controller ticks at a fixed interval, interpolates the VU target from the
//! ramp profile and publishes it on a `watch` channel. VUs are spawned lazily
//! the first time the target reaches their index and then loop:
//!
//! ```text
//! target > id  ──► run iteration ──► record iterations / iteration_duration
//! target <= id ──► park until the target changes
//! Stop         ──► exit
//! ```
//!
//! When the schedule ends every VU is told to stop. VUs get the graceful-stop
//! window to finish their current iteration; whatever is still running after
//! that is aborted.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use loadcheck_core::{BuiltinMetrics, RampProfile, TrendRecorder};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::RuntimeConfig;
use crate::scenario::Scenario;
use crate::vu::Vu;

/// Instruction broadcast to every VU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    /// VUs with an index below the target iterate
    Run(u32),
    Stop,
}

/// Drives one scenario along a ramp profile
pub struct RampingExecutor {
    profile: RampProfile,
    tick: Duration,
    graceful_stop: Duration,
    think_time_scale: f64,
    seed: u64,
}

impl RampingExecutor {
    pub fn new(profile: RampProfile, runtime: &RuntimeConfig, seed: u64) -> Self {
        Self {
            profile,
            tick: runtime.tick,
            graceful_stop: runtime.graceful_stop,
            think_time_scale: runtime.think_time_scale,
            seed,
        }
    }

    pub fn profile(&self) -> &RampProfile {
        &self.profile
    }

    /// Run the full schedule and return the elapsed run time
    pub async fn run(
        &self,
        scenario: Arc<dyn Scenario>,
        client: reqwest::Client,
        builtins: Arc<BuiltinMetrics>,
    ) -> Duration {
        let total = self.profile.total_duration();
        info!(
            scenario = scenario.name(),
            duration_secs = total.as_secs_f64(),
            max_vus = self.profile.max_target(),
            "Starting ramping executor"
        );

        let start = Instant::now();
        let (control, _) = watch::channel(Control::Run(self.profile.target_at(Duration::ZERO)));
        let mut tasks: FuturesUnordered<JoinHandle<()>> = FuturesUnordered::new();
        let mut spawned = 0u32;
        let mut current_stage = None;

        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let elapsed = start.elapsed();
            if elapsed >= total {
                break;
            }

            let stage = self.profile.stage_index_at(elapsed);
            if stage != current_stage {
                if let Some(index) = stage {
                    let s = self.profile.stages()[index];
                    info!(
                        stage = index + 1,
                        target = s.target,
                        duration_secs = s.duration.as_secs_f64(),
                        "Entering stage"
                    );
                }
                current_stage = stage;
            }

            let target = self.profile.target_at(elapsed);
            while spawned < target {
                let vu = Vu::new(
                    spawned,
                    client.clone(),
                    builtins.clone(),
                    self.seed,
                    self.think_time_scale,
                );
                tasks.push(tokio::spawn(vu_loop(
                    vu,
                    scenario.clone(),
                    builtins.clone(),
                    control.subscribe(),
                )));
                spawned += 1;
            }

            builtins.vus_max.set(spawned as u64);
            builtins.vus.set(target.min(spawned) as u64);
            control.send_if_modified(|current| {
                let next = Control::Run(target);
                let changed = *current != next;
                *current = next;
                changed
            });

            // Drain finished tasks so panics surface during the run
            while let Some(Some(joined)) = tasks.next().now_or_never() {
                if let Err(e) = joined {
                    warn!("VU task ended abnormally: {}", e);
                }
            }
        }

        info!(
            graceful_stop_secs = self.graceful_stop.as_secs_f64(),
            "Schedule complete, stopping VUs"
        );
        control.send_replace(Control::Stop);

        let drained = tokio::time::timeout(self.graceful_stop, async {
            while let Some(joined) = tasks.next().await {
                if let Err(e) = joined {
                    warn!("VU task ended abnormally: {}", e);
                }
            }
        })
        .await;

        if drained.is_err() {
            let remaining = tasks.len();
            warn!(remaining, "Graceful stop expired, aborting VUs");
            for task in tasks.iter() {
                task.abort();
            }
            while tasks.next().await.is_some() {}
        }

        let elapsed = start.elapsed();
        info!(elapsed_secs = elapsed.as_secs_f64(), vus_max = spawned, "Executor finished");
        elapsed
    }
}

async fn vu_loop(
    mut vu: Vu,
    scenario: Arc<dyn Scenario>,
    builtins: Arc<BuiltinMetrics>,
    mut control: watch::Receiver<Control>,
) {
    debug!(vu = vu.id(), "VU started");
    let mut iteration_duration = TrendRecorder::new(builtins.iteration_duration.clone());

    loop {
        let state = *control.borrow_and_update();
        match state {
            Control::Stop => break,
            Control::Run(target) if vu.id() < target => {
                vu.begin_iteration();
                let start = Instant::now();
                scenario.iteration(&mut vu).await;

                builtins.iterations.inc();
                iteration_duration.add(start.elapsed());
                iteration_duration.flush();
                vu.flush();
            }
            Control::Run(_) => {
                debug!(vu = vu.id(), "VU parked");
                if control.changed().await.is_err() {
                    break;
                }
            }
        }
    }

    debug!(vu = vu.id(), iterations = vu.iteration(), "VU stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use loadcheck_core::{Registry, Stage};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Sleeps for a fixed time and tracks how many VUs are inside an iteration
    struct SleepScenario {
        pause: Duration,
        active: AtomicU32,
        peak: AtomicU32,
    }

    impl SleepScenario {
        fn new(pause: Duration) -> Self {
            Self {
                pause,
                active: AtomicU32::new(0),
                peak: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Scenario for SleepScenario {
        fn name(&self) -> &str {
            "sleep"
        }

        async fn iteration(&self, _vu: &mut Vu) {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(active, Ordering::SeqCst);
            tokio::time::sleep(self.pause).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn runtime(graceful_stop: Duration) -> RuntimeConfig {
        RuntimeConfig {
            graceful_stop,
            ..Default::default()
        }
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ramp_up_and_down() {
        let mut registry = Registry::new();
        let builtins = Arc::new(BuiltinMetrics::register(&mut registry).unwrap());
        let profile = RampProfile::new(vec![
            Stage::new(secs(2), 3),
            Stage::new(secs(4), 3),
            Stage::new(secs(2), 0),
        ])
        .unwrap();

        let scenario = Arc::new(SleepScenario::new(Duration::from_millis(500)));
        let executor = RampingExecutor::new(profile, &runtime(secs(5)), 7);
        let elapsed = executor
            .run(scenario.clone(), reqwest::Client::new(), builtins.clone())
            .await;

        assert!(elapsed >= secs(8));
        assert!(elapsed < secs(9));
        assert_eq!(builtins.vus_max.max(), 3);
        assert_eq!(scenario.peak.load(Ordering::SeqCst), 3);
        assert_eq!(scenario.active.load(Ordering::SeqCst), 0);

        // 3 VUs for 4s at 2 iterations per second, plus the ramps
        let iterations = builtins.iterations.count();
        assert!(iterations >= 24, "only {} iterations", iterations);
        assert!(iterations <= 40, "{} iterations", iterations);
        assert_eq!(builtins.iteration_duration.count(), iterations);
    }

    #[tokio::test(start_paused = true)]
    async fn test_graceful_stop_aborts_long_iterations() {
        let mut registry = Registry::new();
        let builtins = Arc::new(BuiltinMetrics::register(&mut registry).unwrap());
        let profile = RampProfile::new(vec![Stage::new(secs(1), 2)]).unwrap();

        let scenario = Arc::new(SleepScenario::new(secs(600)));
        let executor = RampingExecutor::new(profile, &runtime(secs(2)), 7);
        let elapsed = executor
            .run(scenario, reqwest::Client::new(), builtins.clone())
            .await;

        assert!(elapsed >= secs(3));
        assert!(elapsed < secs(4));
        assert_eq!(builtins.iterations.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_vus_above_target_park() {
        let mut registry = Registry::new();
        let builtins = Arc::new(BuiltinMetrics::register(&mut registry).unwrap());
        // Up to 2 VUs, then down to 1 for a long hold
        let profile = RampProfile::new(vec![
            Stage::new(Duration::from_millis(200), 2),
            Stage::new(Duration::from_millis(200), 1),
            Stage::new(secs(5), 1),
        ])
        .unwrap();

        let scenario = Arc::new(SleepScenario::new(Duration::from_millis(100)));
        let executor = RampingExecutor::new(profile, &runtime(secs(1)), 7);
        executor
            .run(scenario, reqwest::Client::new(), builtins.clone())
            .await;

        // One VU iterating at 10/s through the hold, the second parked
        let iterations = builtins.iterations.count();
        assert!(iterations >= 45, "only {} iterations", iterations);
        assert!(iterations <= 60, "{} iterations", iterations);
        assert_eq!(builtins.vus_max.max(), 2);
    }
}
