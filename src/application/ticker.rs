use crate::application::timer::{PomodoroTimer, TickOutcome};
use crate::infrastructure::alarm::AlarmPlayer;
use crate::infrastructure::api_client::PomodoroApi;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

pub type TickListener = Arc<dyn Fn(&TickOutcome) + Send + Sync>;

/// Background task that ticks a [`PomodoroTimer`] once per period.
///
/// The loop ends on its own once the session completes, closes or expires
/// without confirmation. Dropping the ticker aborts it.
pub struct CountdownTicker {
    handle: Option<JoinHandle<Option<TickOutcome>>>,
}

impl CountdownTicker {
    pub fn spawn<A, L>(
        timer: Arc<PomodoroTimer<A, L>>,
        period: Duration,
        on_tick: TickListener,
    ) -> Self
    where
        A: PomodoroApi + ?Sized + 'static,
        L: AlarmPlayer + ?Sized + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;

                let outcome = match timer.tick(Utc::now()).await {
                    Ok(outcome) => outcome,
                    Err(error) => {
                        log::error!("countdown tick failed: {error}");
                        continue;
                    }
                };
                on_tick(&outcome);

                match outcome {
                    TickOutcome::Running(_) | TickOutcome::Paused(_) => {}
                    TickOutcome::Idle | TickOutcome::Expired(_) | TickOutcome::Completed(_) => {
                        return Some(outcome);
                    }
                }
            }
        });
        Self {
            handle: Some(handle),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Waits for the loop to end by itself. `None` when it was aborted.
    ///
    /// The handle stays owned by the ticker while waiting, so dropping this
    /// future (or the ticker) still aborts the loop.
    pub async fn join(&mut self) -> Option<TickOutcome> {
        let handle = self.handle.as_mut()?;
        let result = handle.await;
        self.handle = None;
        match result {
            Ok(outcome) => outcome,
            Err(error) => {
                if !error.is_cancelled() {
                    log::error!("countdown ticker panicked: {error}");
                }
                None
            }
        }
    }
}

impl Drop for CountdownTicker {
    fn drop(&mut self) {
        self.stop();
    }
}
