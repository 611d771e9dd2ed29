//! Adaptive poll interval.
//!
//! Polls at the base interval while something happens and backs off to the
//! idle interval after a run of uneventful ticks.

use core_runtime::config::MonitorSettings;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdaptiveInterval {
    base: Duration,
    idle: Duration,
    threshold: u32,
    quiet_ticks: u32,
}

impl AdaptiveInterval {
    pub fn new(base: Duration, idle: Duration, threshold: u32) -> Self {
        Self {
            base,
            idle,
            threshold,
            quiet_ticks: 0,
        }
    }

    pub fn from_settings(settings: &MonitorSettings) -> Self {
        Self::new(
            settings.poll_interval,
            settings.idle_poll_interval,
            settings.idle_tick_threshold,
        )
    }

    /// Record one tick. Playing or a state change resets the quiet run.
    pub fn record_tick(&mut self, playing: bool, changed: bool) {
        if playing || changed {
            self.quiet_ticks = 0;
        } else {
            self.quiet_ticks = self.quiet_ticks.saturating_add(1);
        }
    }

    pub fn is_idle(&self) -> bool {
        self.quiet_ticks >= self.threshold
    }

    /// Delay before the next tick.
    pub fn current(&self) -> Duration {
        if self.is_idle() {
            self.idle
        } else {
            self.base
        }
    }

    pub fn quiet_ticks(&self) -> u32 {
        self.quiet_ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backs_off_after_threshold() {
        let mut interval =
            AdaptiveInterval::new(Duration::from_secs(3), Duration::from_secs(60), 3);

        for _ in 0..2 {
            interval.record_tick(false, false);
            assert_eq!(interval.current(), Duration::from_secs(3));
        }
        interval.record_tick(false, false);
        assert!(interval.is_idle());
        assert_eq!(interval.current(), Duration::from_secs(60));
    }

    #[test]
    fn test_playing_restores_base() {
        let mut interval =
            AdaptiveInterval::new(Duration::from_secs(3), Duration::from_secs(60), 1);
        interval.record_tick(false, false);
        assert_eq!(interval.current(), Duration::from_secs(60));

        interval.record_tick(true, false);
        assert_eq!(interval.quiet_ticks(), 0);
        assert_eq!(interval.current(), Duration::from_secs(3));
    }

    #[test]
    fn test_state_change_resets_quiet_run() {
        let mut interval =
            AdaptiveInterval::new(Duration::from_secs(3), Duration::from_secs(60), 2);
        interval.record_tick(false, false);
        interval.record_tick(false, true);
        interval.record_tick(false, false);
        assert!(!interval.is_idle());
    }
}
