//! Poll, select and display on a fixed delay.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::fetch::{HttpClient, RouteSubscription, VehicleFetcher};
use crate::output::{DisplaySink, render};
use crate::position::{PositionFix, PositionSource};
use crate::selector::{AnnotatedVehicle, annotate, select};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(10_000);
pub const DEFAULT_MAX_RESULTS: usize = 5;

/// What to poll and how often.
#[derive(Debug, Clone)]
pub struct RefreshSettings {
    pub subscriptions: Vec<RouteSubscription>,
    /// Delay between the end of one cycle and the start of the next.
    pub interval: Duration,
    pub max_results: usize,
}

impl RefreshSettings {
    pub fn new(subscriptions: Vec<RouteSubscription>) -> Self {
        Self {
            subscriptions,
            interval: DEFAULT_REFRESH_INTERVAL,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Waiting for the timer.
    Idle,
    /// A fetch, select and render cycle is in flight.
    Fetching,
}

/// Inputs of a single cycle.
#[derive(Debug, Clone)]
pub struct CycleContext {
    /// When the cycle started.
    pub now: DateTime<Utc>,
    pub position: PositionFix,
    /// Selection shown by the previous cycle, reused if this one fails.
    pub previous: Vec<AnnotatedVehicle>,
}

/// Result of a single cycle. Failures are already folded into `text`.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub selection: Vec<AnnotatedVehicle>,
    pub text: String,
    pub rendered_at: DateTime<Utc>,
    pub succeeded: bool,
    /// The position fix was older than the source allows. It is used anyway.
    pub position_stale: bool,
}

pub struct RefreshLoop<C, P, D> {
    fetcher: VehicleFetcher<C>,
    position: P,
    display: D,
    clock: Arc<dyn Clock>,
    settings: RefreshSettings,
    state: watch::Sender<LoopState>,
    last_selection: Vec<AnnotatedVehicle>,
}

impl<C, P, D> RefreshLoop<C, P, D>
where
    C: HttpClient + 'static,
    P: PositionSource,
    D: DisplaySink,
{
    pub fn new(fetcher: VehicleFetcher<C>, position: P, display: D, settings: RefreshSettings) -> Self {
        Self {
            fetcher,
            position,
            display,
            clock: Arc::new(SystemClock),
            settings,
            state: watch::Sender::new(LoopState::Idle),
            last_selection: Vec::new(),
        }
    }

    /// Clock used for render-time ages and position staleness.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    /// Follows state changes while the loop is running.
    pub fn subscribe_state(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    pub fn settings(&self) -> &RefreshSettings {
        &self.settings
    }

    pub fn last_selection(&self) -> &[AnnotatedVehicle] {
        &self.last_selection
    }

    /// Runs one fetch, select and render pass without touching the display.
    ///
    /// A failed fetch is logged and the previous selection is rendered
    /// again, which is `"(no vehicles)"` if nothing has succeeded yet.
    #[tracing::instrument(skip_all, fields(
        lat = ctx.position.position.latitude,
        lon = ctx.position.position.longitude,
    ))]
    pub async fn run_cycle(&self, ctx: CycleContext) -> CycleOutcome {
        let started = Instant::now();
        let position_stale = ctx
            .position
            .is_stale(ctx.now, self.position.max_staleness());
        if position_stale {
            warn!(
                age_ms = ctx.position.age(ctx.now).as_millis() as u64,
                "Reference position is stale, using it anyway"
            );
        }

        let (selection, succeeded) = match self.fetcher.fetch(&self.settings.subscriptions).await {
            Ok(vehicles) => {
                let fetched = vehicles.len();
                let annotated = annotate(vehicles, ctx.position.position);
                let selection = select(annotated, self.settings.max_results);
                info!(
                    fetched,
                    selected = selection.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Cycle complete"
                );
                (selection, true)
            }
            Err(e) => {
                warn!(error = %e, "Vehicle fetch failed, showing previous results");
                (ctx.previous, false)
            }
        };

        let rendered_at = self.clock.now();
        let text = render(&selection, rendered_at);

        CycleOutcome {
            selection,
            text,
            rendered_at,
            succeeded,
            position_stale,
        }
    }

    /// Performs one cycle and hands the text to the display.
    pub async fn tick(&mut self) -> CycleOutcome {
        self.state.send_replace(LoopState::Fetching);

        let ctx = CycleContext {
            now: self.clock.now(),
            position: self.position.latest(),
            previous: std::mem::take(&mut self.last_selection),
        };
        let outcome = self.run_cycle(ctx).await;
        self.display.show(&outcome.text);
        self.last_selection = outcome.selection.clone();

        self.state.send_replace(LoopState::Idle);
        outcome
    }

    /// Cycles until `max_cycles` is reached, or forever when `None`.
    ///
    /// The first cycle starts immediately. Each later one starts
    /// `interval` after the previous render, so the period is the interval
    /// plus however long the cycle took.
    pub async fn run(&mut self, max_cycles: Option<usize>) {
        info!(
            routes = self.settings.subscriptions.len(),
            interval_ms = self.settings.interval.as_millis() as u64,
            "Starting refresh loop"
        );

        let mut cycles = 0usize;
        loop {
            self.tick().await;
            cycles += 1;

            if max_cycles.is_some_and(|max| cycles >= max) {
                break;
            }

            debug!(interval_ms = self.settings.interval.as_millis() as u64, "Waiting for next cycle");
            tokio::time::sleep(self.settings.interval).await;
        }

        info!(cycles, "Refresh loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::fetch::FetchError;
    use crate::geo::Position;
    use crate::output::MemoryDisplay;
    use crate::position::FixedPosition;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use reqwest::Url;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ONE_NORTH: &str = r#"<body><vehicle id="7" routeTag="E" lat="37.8817" lon="-122.2728" secsSinceReport="30"/></body>"#;

    /// Serves queued replies in order, then fails.
    struct ScriptedClient {
        replies: Mutex<Vec<Result<&'static str, &'static str>>>,
        calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn new(mut replies: Vec<Result<&'static str, &'static str>>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedClient {
        async fn get_text(&self, url: &Url) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = self.replies.lock().unwrap().pop();
            match reply {
                Some(Ok(body)) => Ok(body.to_string()),
                Some(Err(msg)) => Err(FetchError::transport(url, msg)),
                None => Err(FetchError::transport(url, "no scripted reply")),
            }
        }
    }

    /// Answers every request after a fixed delay and records when each
    /// request started.
    struct SlowClient {
        latency: Duration,
        started: Mutex<Vec<tokio::time::Instant>>,
    }

    #[async_trait]
    impl HttpClient for SlowClient {
        async fn get_text(&self, _url: &Url) -> Result<String, FetchError> {
            self.started.lock().unwrap().push(tokio::time::Instant::now());
            tokio::time::sleep(self.latency).await;
            Ok(ONE_NORTH.to_string())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
    }

    fn reference() -> Position {
        Position::new(37.8717, -122.2728)
    }

    fn build<C: HttpClient + 'static>(
        client: C,
        position: FixedPosition,
        interval: Duration,
    ) -> RefreshLoop<C, FixedPosition, Arc<MemoryDisplay>> {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(now()));
        let fetcher = VehicleFetcher::new(client).with_clock(clock.clone());
        let mut settings = RefreshSettings::new(vec![RouteSubscription::new("actransit", "E")]);
        settings.interval = interval;
        RefreshLoop::new(fetcher, position, Arc::new(MemoryDisplay::new()), settings).with_clock(clock)
    }

    fn refresh_loop(
        replies: Vec<Result<&'static str, &'static str>>,
    ) -> RefreshLoop<ScriptedClient, FixedPosition, Arc<MemoryDisplay>> {
        build(
            ScriptedClient::new(replies),
            FixedPosition::new(reference(), now()),
            Duration::from_millis(10),
        )
    }

    #[tokio::test]
    async fn test_successful_cycle_renders_selection() {
        let mut refresh = refresh_loop(vec![Ok(ONE_NORTH)]);

        let outcome = refresh.tick().await;
        assert!(outcome.succeeded);
        assert!(!outcome.position_stale);
        assert_eq!(outcome.text, "E: 0.69 mi N (30 sec)\n");
        assert_eq!(refresh.display.last().as_deref(), Some("E: 0.69 mi N (30 sec)\n"));
        assert_eq!(refresh.last_selection().len(), 1);
        assert_eq!(refresh.state(), LoopState::Idle);
    }

    #[tokio::test]
    async fn test_first_failure_shows_placeholder() {
        let mut refresh = refresh_loop(vec![Err("down")]);

        let outcome = refresh.tick().await;
        assert!(!outcome.succeeded);
        assert_eq!(outcome.text, "(no vehicles)");
        assert_eq!(refresh.display.last().as_deref(), Some("(no vehicles)"));
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_selection() {
        let mut refresh = refresh_loop(vec![Ok(ONE_NORTH), Err("down")]);

        refresh.tick().await;
        let outcome = refresh.tick().await;

        assert!(!outcome.succeeded);
        assert_eq!(outcome.text, "E: 0.69 mi N (30 sec)\n");
        assert_eq!(refresh.last_selection().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_feed_clears_display() {
        let mut refresh = refresh_loop(vec![Ok(ONE_NORTH), Ok("<body/>")]);

        refresh.tick().await;
        let outcome = refresh.tick().await;

        assert!(outcome.succeeded);
        assert_eq!(outcome.text, "(no vehicles)");
    }

    #[tokio::test]
    async fn test_stale_position_is_still_used() {
        let recorded = now() - chrono::Duration::seconds(60);
        let mut refresh = build(
            ScriptedClient::new(vec![Ok(ONE_NORTH)]),
            FixedPosition::new(reference(), recorded),
            Duration::from_millis(10),
        );

        let outcome = refresh.tick().await;
        assert!(outcome.position_stale);
        assert!(outcome.succeeded);
        assert_eq!(outcome.text, "E: 0.69 mi N (30 sec)\n");
    }

    #[tokio::test]
    async fn test_staleness_is_judged_at_cycle_start() {
        let refresh = refresh_loop(vec![Ok(ONE_NORTH), Ok(ONE_NORTH)]);
        let fix = PositionFix::new(reference(), now());

        let fresh = refresh
            .run_cycle(CycleContext {
                now: now() + chrono::Duration::seconds(10),
                position: fix,
                previous: Vec::new(),
            })
            .await;
        let stale = refresh
            .run_cycle(CycleContext {
                now: now() + chrono::Duration::seconds(11),
                position: fix,
                previous: Vec::new(),
            })
            .await;

        assert!(!fresh.position_stale);
        assert!(stale.position_stale);
    }

    #[tokio::test]
    async fn test_run_stops_after_max_cycles() {
        let mut refresh = refresh_loop(vec![Ok(ONE_NORTH), Err("down"), Ok("<body/>")]);

        refresh.run(Some(3)).await;

        let shown = refresh.display.shown();
        assert_eq!(
            shown,
            [
                "E: 0.69 mi N (30 sec)\n",
                "E: 0.69 mi N (30 sec)\n",
                "(no vehicles)",
            ]
        );
        assert_eq!(refresh.fetcher.client().calls.load(Ordering::SeqCst), 3);
        assert_eq!(refresh.state(), LoopState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_cycle_waits_for_previous_to_finish() {
        let latency = Duration::from_secs(3);
        let interval = Duration::from_secs(10);
        let client = SlowClient {
            latency,
            started: Mutex::new(Vec::new()),
        };
        let mut refresh = build(client, FixedPosition::new(reference(), now()), interval);
        let state = refresh.subscribe_state();

        let observe = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let during_fetch = *state.borrow();
            tokio::time::sleep(Duration::from_secs(3)).await;
            let between_cycles = *state.borrow();
            (during_fetch, between_cycles)
        };
        let ((), (during_fetch, between_cycles)) = tokio::join!(refresh.run(Some(2)), observe);

        assert_eq!(during_fetch, LoopState::Fetching);
        assert_eq!(between_cycles, LoopState::Idle);

        let started = refresh.fetcher.client().started.lock().unwrap().clone();
        assert_eq!(started.len(), 2);
        assert_eq!(started[1] - started[0], latency + interval);
        assert_eq!(refresh.display.shown().len(), 2);
        assert_eq!(refresh.state(), LoopState::Idle);
    }
}
