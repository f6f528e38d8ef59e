use crate::domain::projection::Projection;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

const CELEBRATION_DWELL: Duration = Duration::from_secs(10);
const PANIC_HOLD: Duration = Duration::from_secs(5);
const PANIC_CYCLE: Duration = Duration::from_secs(30 * 60);

/// Explicitly owned set of timer tasks. Every timer the mood engine starts
/// lives in one of these, so a teardown cannot leave an orphaned timer
/// firing against discarded state.
#[derive(Debug, Default)]
pub struct TimerGroup {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TimerGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        if let Ok(mut handles) = self.handles.lock() {
            handles.retain(|existing| !existing.is_finished());
            handles.push(handle);
        }
    }

    pub fn cancel_all(&self) {
        if let Ok(mut handles) = self.handles.lock() {
            for handle in handles.drain(..) {
                handle.abort();
            }
        }
    }
}

impl Drop for TimerGroup {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mood {
    Neutral,
    Celebration,
    Panic,
}

/// The two booleans the mood machine runs on, derived from a projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoodSignals {
    pub all_today_completed: bool,
    pub has_overdue: bool,
}

impl From<&Projection> for MoodSignals {
    fn from(projection: &Projection) -> Self {
        Self {
            all_today_completed: projection.all_today_completed(),
            has_overdue: projection.has_overdue(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoodTimings {
    pub celebration_dwell: Duration,
    pub panic_hold: Duration,
    pub panic_cycle: Duration,
}

impl Default for MoodTimings {
    fn default() -> Self {
        Self {
            celebration_dwell: CELEBRATION_DWELL,
            panic_hold: PANIC_HOLD,
            panic_cycle: PANIC_CYCLE,
        }
    }
}

#[derive(Debug)]
struct MoodState {
    current: Mood,
    prev_all_completed: bool,
    has_overdue: bool,
}

/// Three-state mood machine. Celebration fires only on the rising edge of
/// "everything due today is done" and pre-empts panic; overdue work drives
/// a repeating panic/neutral cycle until the overdue set empties.
pub struct MoodEngine {
    inner: Arc<Mutex<MoodState>>,
    celebration_timers: Arc<TimerGroup>,
    panic_timers: Arc<TimerGroup>,
    timings: MoodTimings,
}

impl MoodEngine {
    pub fn new(timings: MoodTimings) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MoodState {
                current: Mood::Neutral,
                prev_all_completed: false,
                has_overdue: false,
            })),
            celebration_timers: Arc::new(TimerGroup::new()),
            panic_timers: Arc::new(TimerGroup::new()),
            timings,
        }
    }

    pub fn current(&self) -> Mood {
        self.inner
            .lock()
            .map(|state| state.current)
            .unwrap_or(Mood::Neutral)
    }

    /// Re-evaluates the machine against fresh signals. Timers owned by a
    /// changed input are torn down and restarted; unchanged inputs leave
    /// their running cycle alone.
    pub fn observe(&self, signals: MoodSignals) {
        let (celebrate, overdue_changed) = {
            let Ok(mut state) = self.inner.lock() else {
                log::warn!("mood state lock poisoned; dropping signal update");
                return;
            };

            let celebrate = signals.all_today_completed && !state.prev_all_completed;
            if celebrate {
                state.prev_all_completed = true;
                state.current = Mood::Celebration;
            } else if !signals.all_today_completed {
                state.prev_all_completed = false;
            }

            let overdue_changed = signals.has_overdue != state.has_overdue;
            if overdue_changed {
                state.has_overdue = signals.has_overdue;
                if !signals.has_overdue && state.current == Mood::Panic {
                    state.current = Mood::Neutral;
                }
            }

            (celebrate, overdue_changed)
        };

        if celebrate {
            self.celebration_timers.cancel_all();
            self.spawn_celebration_dwell();
        }
        if overdue_changed {
            self.panic_timers.cancel_all();
            if signals.has_overdue {
                spawn_panic_cycle(
                    Arc::clone(&self.inner),
                    Arc::clone(&self.panic_timers),
                    self.timings,
                );
            }
        }
    }

    /// Tears down every pending timer. The mood freezes at its current
    /// value; call `observe` again to resume.
    pub fn shutdown(&self) {
        self.celebration_timers.cancel_all();
        self.panic_timers.cancel_all();
    }

    fn spawn_celebration_dwell(&self) {
        let inner = Arc::clone(&self.inner);
        let panic_timers = Arc::clone(&self.panic_timers);
        let timings = self.timings;

        self.celebration_timers.spawn(async move {
            sleep(timings.celebration_dwell).await;
            let resume_panic = {
                let Ok(mut state) = inner.lock() else {
                    return;
                };
                if state.current == Mood::Celebration {
                    state.current = Mood::Neutral;
                }
                state.has_overdue
            };
            if resume_panic {
                panic_timers.cancel_all();
                spawn_panic_cycle(inner, panic_timers, timings);
            }
        });
    }
}

impl Default for MoodEngine {
    fn default() -> Self {
        Self::new(MoodTimings::default())
    }
}

impl Drop for MoodEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_panic_cycle(inner: Arc<Mutex<MoodState>>, timers: Arc<TimerGroup>, timings: MoodTimings) {
    timers.spawn(async move {
        loop {
            set_unless_celebrating(&inner, Mood::Panic);
            sleep(timings.panic_hold).await;
            set_unless_celebrating(&inner, Mood::Neutral);
            sleep(timings.panic_cycle.saturating_sub(timings.panic_hold)).await;
        }
    });
}

// Celebration pre-empts panic: while it is showing, the cycle keeps its
// cadence but its transitions are suppressed.
fn set_unless_celebrating(inner: &Mutex<MoodState>, mood: Mood) {
    if let Ok(mut state) = inner.lock() {
        if state.current != Mood::Celebration {
            state.current = mood;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(all_today_completed: bool, has_overdue: bool) -> MoodSignals {
        MoodSignals {
            all_today_completed,
            has_overdue,
        }
    }

    // Lets freshly spawned timer tasks reach their first await point.
    async fn settle() {
        sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn celebration_fires_on_rising_edge_and_reverts_after_dwell() {
        let engine = MoodEngine::default();
        assert_eq!(engine.current(), Mood::Neutral);

        engine.observe(signals(true, false));
        assert_eq!(engine.current(), Mood::Celebration);

        sleep(Duration::from_secs(11)).await;
        assert_eq!(engine.current(), Mood::Neutral);
    }

    #[tokio::test(start_paused = true)]
    async fn already_complete_state_does_not_retrigger_celebration() {
        let engine = MoodEngine::default();
        engine.observe(signals(true, false));
        sleep(Duration::from_secs(11)).await;
        assert_eq!(engine.current(), Mood::Neutral);

        engine.observe(signals(true, false));
        assert_eq!(engine.current(), Mood::Neutral);
    }

    #[tokio::test(start_paused = true)]
    async fn each_rising_edge_celebrates_again() {
        let engine = MoodEngine::default();

        engine.observe(signals(true, false));
        assert_eq!(engine.current(), Mood::Celebration);
        sleep(Duration::from_secs(11)).await;

        engine.observe(signals(false, false));
        assert_eq!(engine.current(), Mood::Neutral);

        engine.observe(signals(true, false));
        assert_eq!(engine.current(), Mood::Celebration);
    }

    #[tokio::test(start_paused = true)]
    async fn panic_cycles_between_hold_and_neutral() {
        let engine = MoodEngine::default();

        engine.observe(signals(false, true));
        settle().await;
        assert_eq!(engine.current(), Mood::Panic);

        // Past the 5 s hold, back to neutral for the rest of the cycle.
        sleep(Duration::from_secs(6)).await;
        assert_eq!(engine.current(), Mood::Neutral);

        sleep(Duration::from_secs(10 * 60)).await;
        assert_eq!(engine.current(), Mood::Neutral);

        // The 30-minute mark starts the next hold.
        sleep(Duration::from_secs(20 * 60 - 5)).await;
        assert_eq!(engine.current(), Mood::Panic);
    }

    #[tokio::test(start_paused = true)]
    async fn clearing_overdue_collapses_to_neutral_and_stops_the_cycle() {
        let engine = MoodEngine::default();

        engine.observe(signals(false, true));
        settle().await;
        assert_eq!(engine.current(), Mood::Panic);

        engine.observe(signals(false, false));
        assert_eq!(engine.current(), Mood::Neutral);

        sleep(Duration::from_secs(31 * 60)).await;
        assert_eq!(engine.current(), Mood::Neutral);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_overdue_signal_does_not_restart_the_cycle() {
        let engine = MoodEngine::default();

        engine.observe(signals(false, true));
        settle().await;
        sleep(Duration::from_secs(6)).await;
        assert_eq!(engine.current(), Mood::Neutral);

        // Re-observing the same overdue state must not re-enter the hold.
        engine.observe(signals(false, true));
        settle().await;
        assert_eq!(engine.current(), Mood::Neutral);
    }

    #[tokio::test(start_paused = true)]
    async fn celebration_preempts_panic_and_cycle_resumes_after_dwell() {
        let engine = MoodEngine::default();

        engine.observe(signals(false, true));
        settle().await;
        assert_eq!(engine.current(), Mood::Panic);

        engine.observe(signals(true, true));
        assert_eq!(engine.current(), Mood::Celebration);

        // The running cycle's transitions are suppressed while celebrating.
        sleep(Duration::from_secs(6)).await;
        assert_eq!(engine.current(), Mood::Celebration);

        // Dwell over; overdue work is still there, so panic resumes.
        sleep(Duration::from_secs(5)).await;
        assert_eq!(engine.current(), Mood::Panic);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_pending_timers() {
        let engine = MoodEngine::default();

        engine.observe(signals(false, true));
        settle().await;
        assert_eq!(engine.current(), Mood::Panic);

        engine.shutdown();
        sleep(Duration::from_secs(31 * 60)).await;
        assert_eq!(engine.current(), Mood::Panic);
    }
}
