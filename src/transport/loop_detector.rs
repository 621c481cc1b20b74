//! Reconnect storm detection.
//!
//! If the coordinating process keeps dropping connections (for example it
//! throws while handling `onConnect`), a connector would otherwise reconnect
//! forever. The detector counts reconnects in a rolling window and trips once
//! the count exceeds a threshold after a short grace period.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::time::Instant;

// ============================================================================
// Constants
// ============================================================================

/// Reconnects tolerated per window before tripping.
const DEFAULT_MAX_ITERATIONS_PER_WINDOW: u32 = 200;

/// Grace period before a window can trip, lets the peer start up.
const DEFAULT_MIN_WINDOW_DURATION: Duration = Duration::from_millis(100);

/// Window age after which counting restarts.
const DEFAULT_WINDOW_RESET: Duration = Duration::from_millis(1000);

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// Loop protection settings for a connector.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use websocket_devtools::transport::ReconnectPolicy;
///
/// let policy = ReconnectPolicy::new()
///     .with_max_iterations_per_window(50)
///     .with_min_window_duration(Duration::from_millis(20));
/// assert_eq!(policy.max_iterations_per_window, 50);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Reconnects allowed within one window.
    pub max_iterations_per_window: u32,
    /// Minimum window age before the detector may trip.
    pub min_window_duration: Duration,
    /// Window age after which counting restarts.
    pub window_reset: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconnectPolicy {
    /// Creates the default policy (200 per window, 100 ms grace, 1 s reset).
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_iterations_per_window: DEFAULT_MAX_ITERATIONS_PER_WINDOW,
            min_window_duration: DEFAULT_MIN_WINDOW_DURATION,
            window_reset: DEFAULT_WINDOW_RESET,
        }
    }

    /// Sets the reconnect threshold.
    #[inline]
    #[must_use]
    pub const fn with_max_iterations_per_window(mut self, max: u32) -> Self {
        self.max_iterations_per_window = max;
        self
    }

    /// Sets the grace period.
    #[inline]
    #[must_use]
    pub const fn with_min_window_duration(mut self, duration: Duration) -> Self {
        self.min_window_duration = duration;
        self
    }

    /// Sets the window reset interval.
    #[inline]
    #[must_use]
    pub const fn with_window_reset(mut self, duration: Duration) -> Self {
        self.window_reset = duration;
        self
    }
}

// ============================================================================
// LoopDetector
// ============================================================================

/// Rolling-window reconnect counter.
#[derive(Debug, Clone)]
pub struct LoopDetector {
    policy: ReconnectPolicy,
    window_start: Option<Instant>,
    iterations: u32,
}

impl LoopDetector {
    /// Creates a detector with an empty window.
    #[inline]
    #[must_use]
    pub const fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            window_start: None,
            iterations: 0,
        }
    }

    /// Records one reconnect attempt; returns `true` if a loop is detected.
    pub fn track_iteration(&mut self) -> bool {
        let now = Instant::now();

        let start = match self.window_start {
            Some(start) if now.duration_since(start) <= self.policy.window_reset => start,
            _ => {
                self.window_start = Some(now);
                self.iterations = 1;
                return false;
            }
        };

        self.iterations += 1;

        self.iterations > self.policy.max_iterations_per_window
            && now.duration_since(start) >= self.policy.min_window_duration
    }

    /// Returns the number of attempts in the current window.
    #[inline]
    #[must_use]
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Returns the current window's age.
    #[must_use]
    pub fn window_duration(&self) -> Duration {
        self.window_start
            .map_or(Duration::ZERO, |start| Instant::now().duration_since(start))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::time::advance;

    #[test]
    fn test_default_policy() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.max_iterations_per_window, 200);
        assert_eq!(policy.min_window_duration, Duration::from_millis(100));
        assert_eq!(policy.window_reset, Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_trip_during_grace_period() {
        let mut detector = LoopDetector::new(ReconnectPolicy::new());

        for _ in 0..500 {
            assert!(!detector.track_iteration());
        }
        assert_eq!(detector.iterations(), 500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trips_after_grace_period() {
        let mut detector = LoopDetector::new(ReconnectPolicy::new());

        for _ in 0..200 {
            assert!(!detector.track_iteration());
        }
        advance(Duration::from_millis(150)).await;

        assert!(detector.track_iteration());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_on_age_despite_activity() {
        let policy = ReconnectPolicy::new()
            .with_max_iterations_per_window(100)
            .with_min_window_duration(Duration::ZERO);
        let mut detector = LoopDetector::new(policy);

        // Steady attempts every 300 ms never leave a 1000 ms gap.
        for _ in 0..4 {
            assert!(!detector.track_iteration());
            advance(Duration::from_millis(300)).await;
        }
        assert!(!detector.track_iteration());

        assert_eq!(detector.iterations(), 1);
        assert_eq!(detector.window_duration(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_after_inactivity() {
        let policy = ReconnectPolicy::new()
            .with_max_iterations_per_window(3)
            .with_min_window_duration(Duration::ZERO);
        let mut detector = LoopDetector::new(policy);

        for _ in 0..3 {
            assert!(!detector.track_iteration());
        }
        advance(Duration::from_millis(1001)).await;

        assert!(!detector.track_iteration());
        assert_eq!(detector.iterations(), 1);
        assert_eq!(detector.window_duration(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trips_above_threshold() {
        let policy = ReconnectPolicy::new()
            .with_max_iterations_per_window(3)
            .with_min_window_duration(Duration::ZERO);
        let mut detector = LoopDetector::new(policy);

        assert!(!detector.track_iteration());
        assert!(!detector.track_iteration());
        assert!(!detector.track_iteration());
        assert!(detector.track_iteration());
    }
}
