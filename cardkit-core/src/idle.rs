use std::time::Duration;

use crate::config::WorkerSettings;

/// Idle window for a worker that has served `request_count` requests.
///
/// Grows linearly from the minimum to the maximum and saturates once the
/// count reaches the high-load threshold. A threshold of zero means the
/// worker is always considered under high load.
pub fn idle_timeout(request_count: u64, settings: &WorkerSettings) -> Duration {
    let min = settings.min_idle_timeout_ms.min(settings.max_idle_timeout_ms);
    let max = settings.max_idle_timeout_ms.max(min);
    let threshold = settings.high_load_threshold;

    if threshold == 0 || request_count >= threshold {
        return Duration::from_millis(max);
    }

    let span = max - min;
    let ms = min + span * request_count / threshold;
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_timeout_monotonic_and_bounded() {
        let settings = WorkerSettings::default();
        let min = settings.min_idle_timeout();
        let max = settings.max_idle_timeout();
        let threshold = settings.high_load_threshold;

        let mut previous = Duration::ZERO;
        for count in 0..=(threshold + 10) {
            let timeout = idle_timeout(count, &settings);
            assert!(timeout >= previous, "count {count} decreased");
            assert!(timeout >= min && timeout <= max, "count {count} out of bounds");
            if count >= threshold {
                assert_eq!(timeout, max);
            }
            previous = timeout;
        }
        assert_eq!(idle_timeout(0, &settings), min);
    }

    #[test]
    fn test_idle_timeout_linear_steps() {
        let settings = WorkerSettings {
            min_idle_timeout_ms: 1_000,
            max_idle_timeout_ms: 2_000,
            high_load_threshold: 4,
            ..WorkerSettings::default()
        };
        assert_eq!(idle_timeout(1, &settings), Duration::from_millis(1_250));
        assert_eq!(idle_timeout(2, &settings), Duration::from_millis(1_500));
        assert_eq!(idle_timeout(3, &settings), Duration::from_millis(1_750));
    }

    #[test]
    fn test_zero_threshold_saturates_immediately() {
        let settings = WorkerSettings {
            high_load_threshold: 0,
            ..WorkerSettings::default()
        };
        assert_eq!(idle_timeout(0, &settings), settings.max_idle_timeout());
    }
}
