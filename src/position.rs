//! Latest known reference position, shared between a location source and
//! the refresh loop.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::geo::Position;

pub const DEFAULT_MAX_STALENESS: Duration = Duration::from_millis(10_000);
pub const DEFAULT_POSITION_TIMEOUT: Duration = Duration::from_millis(10_000);

/// A position and when it was recorded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionFix {
    pub position: Position,
    pub recorded_at: DateTime<Utc>,
}

impl PositionFix {
    pub fn new(position: Position, recorded_at: DateTime<Utc>) -> Self {
        Self {
            position,
            recorded_at,
        }
    }

    /// Zero for fixes stamped after `now`.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.recorded_at).to_std().unwrap_or_default()
    }

    pub fn is_stale(&self, now: DateTime<Utc>, max_staleness: Duration) -> bool {
        self.age(now) > max_staleness
    }
}

/// Read side of a location provider.
pub trait PositionSource: Send + Sync {
    fn latest(&self) -> PositionFix;

    /// Age beyond which [`latest`](Self::latest) is considered stale.
    fn max_staleness(&self) -> Duration {
        DEFAULT_MAX_STALENESS
    }
}

/// Write side of a location provider. Errors are logged and otherwise
/// ignored, so readers keep seeing the last good fix.
#[derive(Debug)]
pub struct PositionFeed {
    tx: watch::Sender<PositionFix>,
    max_staleness: Duration,
    timeout: Duration,
}

impl PositionFeed {
    pub fn new(initial: PositionFix) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            tx,
            max_staleness: DEFAULT_MAX_STALENESS,
            timeout: DEFAULT_POSITION_TIMEOUT,
        }
    }

    /// Age beyond which readers treat the current fix as stale.
    pub fn with_max_staleness(mut self, max_staleness: Duration) -> Self {
        self.max_staleness = max_staleness;
        self
    }

    /// How long [`refresh_from`](Self::refresh_from) waits for a fix.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn update(&self, position: Position, recorded_at: DateTime<Utc>) {
        debug!(
            lat = position.latitude,
            lon = position.longitude,
            "Position updated"
        );
        self.tx.send_replace(PositionFix::new(position, recorded_at));
    }

    pub fn report_error(&self, error: &dyn Display) {
        warn!(%error, "Position unavailable, keeping last known fix");
    }

    /// Waits for one reading from a location sensor and publishes it,
    /// stamped with `clock`. A sensor error or a reading that misses the
    /// timeout is reported and leaves the previous fix in place.
    ///
    /// Returns whether a new fix was published.
    pub async fn refresh_from<F, E>(&self, reading: F, clock: &dyn Clock) -> bool
    where
        F: Future<Output = Result<Position, E>>,
        E: Display,
    {
        match tokio::time::timeout(self.timeout, reading).await {
            Ok(Ok(position)) => {
                self.update(position, clock.now());
                true
            }
            Ok(Err(e)) => {
                self.report_error(&e);
                false
            }
            Err(_) => {
                let msg = format!("no fix within {}ms", self.timeout.as_millis());
                self.report_error(&msg);
                false
            }
        }
    }

    pub fn reader(&self) -> PositionReader {
        PositionReader {
            rx: self.tx.subscribe(),
            max_staleness: self.max_staleness,
        }
    }
}

/// Cheap cloneable handle onto a [`PositionFeed`].
#[derive(Debug, Clone)]
pub struct PositionReader {
    rx: watch::Receiver<PositionFix>,
    max_staleness: Duration,
}

impl PositionSource for PositionReader {
    fn latest(&self) -> PositionFix {
        *self.rx.borrow()
    }

    fn max_staleness(&self) -> Duration {
        self.max_staleness
    }
}

/// A position that never moves, recorded once.
#[derive(Debug, Clone, Copy)]
pub struct FixedPosition(pub PositionFix);

impl FixedPosition {
    pub fn new(position: Position, recorded_at: DateTime<Utc>) -> Self {
        Self(PositionFix::new(position, recorded_at))
    }
}

impl PositionSource for FixedPosition {
    fn latest(&self) -> PositionFix {
        self.0
    }
}
