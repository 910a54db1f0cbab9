use std::time::Duration;

use chrono::Utc;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

use crate::error::Result;

use super::{validate_duration, CountdownState, Phase};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(1000);

/// Emitted by a running countdown. `generation` identifies the `start` call
/// that produced it so consumers can drop events from a superseded countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    Tick {
        generation: u64,
        state: CountdownState,
    },
    Expired {
        generation: u64,
        phase: Phase,
    },
}

impl ClockEvent {
    pub fn generation(&self) -> u64 {
        match self {
            ClockEvent::Tick { generation, .. } | ClockEvent::Expired { generation, .. } => {
                *generation
            }
        }
    }
}

/// Drives one WORK or BREAK countdown at a time and reports into the owner's queue.
pub struct PhaseClock<M> {
    events: mpsc::UnboundedSender<M>,
    ticker: Option<JoinHandle<()>>,
    tick_interval: Duration,
    generation: u64,
    current: Option<(CountdownState, Instant)>,
    verbose: bool,
}

impl<M> PhaseClock<M>
where
    M: From<ClockEvent> + Send + 'static,
{
    pub fn new(events: mpsc::UnboundedSender<M>, tick_interval: Duration) -> Self {
        Self {
            events,
            ticker: None,
            tick_interval,
            generation: 0,
            current: None,
            verbose: false,
        }
    }

    pub fn with_verbose_ticks(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Starts a countdown, cancelling any previous one. Returns the new generation.
    pub fn start(&mut self, phase: Phase, duration_ms: u64) -> Result<u64> {
        validate_duration(phase.as_str(), duration_ms)?;
        self.cancel();

        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        let anchor = Instant::now();
        let state = CountdownState::begin(phase, duration_ms, Utc::now().timestamp_millis());
        self.current = Some((state, anchor));

        log_debug!(
            "countdown #{} started: {} for {}ms",
            generation,
            phase.as_str(),
            duration_ms
        );

        let handle = tokio::spawn(run_countdown(
            self.events.clone(),
            generation,
            state,
            anchor,
            self.tick_interval,
            self.verbose,
        ));
        self.ticker = Some(handle);
        Ok(generation)
    }

    /// Stops ticking without emitting expiry. Returns whether a countdown was running.
    pub fn cancel(&mut self) -> bool {
        self.current = None;
        match self.ticker.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current.is_some() && generation == self.generation
    }

    /// Countdown state as of now, recomputed from the anchor.
    pub fn snapshot(&self) -> Option<CountdownState> {
        self.current.map(|(mut state, anchor)| {
            state.sync_from_elapsed(anchor.elapsed());
            state
        })
    }

    /// Marks the countdown as finished once its expiry has been consumed.
    pub fn finish(&mut self, generation: u64) {
        if generation == self.generation {
            self.current = None;
            self.ticker = None;
        }
    }
}

impl<M> Drop for PhaseClock<M> {
    fn drop(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
    }
}

async fn run_countdown<M>(
    events: mpsc::UnboundedSender<M>,
    generation: u64,
    mut state: CountdownState,
    anchor: Instant,
    tick_interval: Duration,
    verbose: bool,
) where
    M: From<ClockEvent> + Send + 'static,
{
    let mut ticker = time::interval_at(anchor + tick_interval, tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let expiry = time::sleep_until(anchor + Duration::from_millis(state.duration_ms));
    tokio::pin!(expiry);

    loop {
        let at_expiry = tokio::select! {
            biased;
            _ = &mut expiry => true,
            _ = ticker.tick() => false,
        };

        state.sync_from_elapsed(anchor.elapsed());
        if at_expiry {
            state.remaining_ms = 0;
        }

        if verbose {
            log_info!(
                "{} tick #{}: {}ms remaining",
                state.phase.as_str(),
                generation,
                state.remaining_ms
            );
        }

        if events
            .send(M::from(ClockEvent::Tick { generation, state }))
            .is_err()
        {
            break;
        }

        if state.is_expired() {
            let _ = events.send(M::from(ClockEvent::Expired {
                generation,
                phase: state.phase,
            }));
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn drain_until_expired(
        rx: &mut mpsc::UnboundedReceiver<ClockEvent>,
    ) -> (Vec<u64>, usize) {
        let mut remaining = Vec::new();
        let mut expiries = 0;
        while let Some(event) = rx.recv().await {
            match event {
                ClockEvent::Tick { state, .. } => remaining.push(state.remaining_ms),
                ClockEvent::Expired { .. } => {
                    expiries += 1;
                    break;
                }
            }
        }
        (remaining, expiries)
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_every_second_and_expires_once() {
        let (tx, mut rx) = mpsc::unbounded_channel::<ClockEvent>();
        let mut clock = PhaseClock::new(tx, DEFAULT_TICK_INTERVAL);
        clock.start(Phase::Work, 3000).unwrap();

        let (remaining, expiries) = drain_until_expired(&mut rx).await;
        assert_eq!(remaining, vec![2000, 1000, 0]);
        assert_eq!(expiries, 1);

        // Nothing else arrives after expiry.
        time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn final_tick_lands_on_expiry_for_fractional_durations() {
        let (tx, mut rx) = mpsc::unbounded_channel::<ClockEvent>();
        let mut clock = PhaseClock::new(tx, DEFAULT_TICK_INTERVAL);
        let started = Instant::now();
        clock.start(Phase::Break, 1500).unwrap();

        let (remaining, expiries) = drain_until_expired(&mut rx).await;
        assert_eq!(remaining, vec![500, 0]);
        assert_eq!(expiries, 1);
        assert_eq!(started.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn restart_supersedes_previous_countdown() {
        let (tx, mut rx) = mpsc::unbounded_channel::<ClockEvent>();
        let mut clock = PhaseClock::new(tx, DEFAULT_TICK_INTERVAL);
        let first = clock.start(Phase::Work, 1000).unwrap();
        let second = clock.start(Phase::Work, 2000).unwrap();
        assert_ne!(first, second);
        assert!(!clock.is_current(first));

        let mut expiries = Vec::new();
        while let Some(event) = rx.recv().await {
            if let ClockEvent::Expired { generation, .. } = event {
                expiries.push(generation);
                break;
            }
        }
        time::sleep(Duration::from_secs(3)).await;
        while let Ok(event) = rx.try_recv() {
            if let ClockEvent::Expired { generation, .. } = event {
                expiries.push(generation);
            }
        }
        assert_eq!(expiries, vec![second]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_without_expiry() {
        let (tx, mut rx) = mpsc::unbounded_channel::<ClockEvent>();
        let mut clock = PhaseClock::new(tx, DEFAULT_TICK_INTERVAL);
        clock.start(Phase::Work, 2000).unwrap();
        time::sleep(Duration::from_millis(1100)).await;
        assert!(clock.cancel());
        assert!(clock.snapshot().is_none());

        time::sleep(Duration::from_secs(3)).await;
        let mut saw_expiry = false;
        while let Ok(event) = rx.try_recv() {
            saw_expiry |= matches!(event, ClockEvent::Expired { .. });
        }
        assert!(!saw_expiry);
        assert!(!clock.cancel());
    }

    #[tokio::test]
    async fn rejects_sub_second_countdown() {
        let (tx, _rx) = mpsc::unbounded_channel::<ClockEvent>();
        let mut clock = PhaseClock::new(tx, DEFAULT_TICK_INTERVAL);
        assert!(clock.start(Phase::Work, 999).is_err());
        assert!(clock.snapshot().is_none());
    }

    #[test]
    fn single_expiry_for_any_valid_duration() {
        use proptest::prelude::*;

        let config = ProptestConfig::with_cases(24);
        proptest!(config, |(duration_ms in 1000u64..12_000)| {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();
            let (remaining, expiries) = runtime.block_on(async {
                let (tx, mut rx) = mpsc::unbounded_channel::<ClockEvent>();
                let mut clock = PhaseClock::new(tx, DEFAULT_TICK_INTERVAL);
                clock.start(Phase::Work, duration_ms).unwrap();
                let drained = drain_until_expired(&mut rx).await;
                time::sleep(Duration::from_secs(2)).await;
                let late = std::iter::from_fn(|| rx.try_recv().ok()).count();
                (drained.0, drained.1 + late)
            });
            prop_assert_eq!(expiries, 1);
            prop_assert_eq!(remaining.last().copied(), Some(0));
            prop_assert!(remaining.windows(2).all(|w| w[0] >= w[1]));
        });
    }
}
