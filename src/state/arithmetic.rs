//! Pure time computations over a timer's persisted fields.
//!
//! Nothing here keeps a counter: every value is derived from absolute
//! timestamps and the supplied `now`, so the same inputs always give the same
//! answer, before or after a restart.

use std::time::SystemTime;

use crate::dao::models::{TimerEntity, TimerStatus};

const MILLIS_PER_SEC: u64 = 1_000;

/// Milliseconds from `earlier` to `later`, zero when the clock went backwards.
pub fn millis_between(later: SystemTime, earlier: SystemTime) -> u64 {
    later
        .duration_since(earlier)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Active (non-paused) milliseconds the timer has run for as of `now`.
///
/// Paused timers freeze at `paused_at` and finished ones at `completed_at`.
pub fn elapsed_active_ms(timer: &TimerEntity, now: SystemTime) -> u64 {
    let Some(started_at) = timer.started_at else {
        return 0;
    };

    let reference = match timer.status {
        TimerStatus::Paused => timer.paused_at.unwrap_or(now),
        status if status.is_terminal() => timer.completed_at.unwrap_or(now),
        _ => now,
    };

    millis_between(reference, started_at).saturating_sub(timer.total_paused_ms)
}

/// Remaining seconds for a countdown, elapsed seconds for a count-up.
///
/// Countdowns round up so a display only reads zero once the time is really
/// gone. Terminal timers report the value frozen when they finished.
pub fn remaining_secs(timer: &TimerEntity, now: SystemTime) -> u64 {
    match timer.status {
        status if status.is_terminal() => timer.remaining_time,
        TimerStatus::Created if timer.count_down => timer.total_duration,
        TimerStatus::Created => 0,
        _ => {
            let elapsed = elapsed_active_ms(timer, now);
            if timer.count_down {
                let total_ms = timer.total_duration.saturating_mul(MILLIS_PER_SEC);
                total_ms.saturating_sub(elapsed).div_ceil(MILLIS_PER_SEC)
            } else {
                elapsed / MILLIS_PER_SEC
            }
        }
    }
}

/// A running countdown with nothing left on it.
pub fn is_expired(timer: &TimerEntity, now: SystemTime) -> bool {
    timer.count_down && timer.status == TimerStatus::Running && remaining_secs(timer, now) == 0
}

/// Share of the configured duration already consumed, in `[0, 100]` with one decimal.
pub fn progress_percentage(timer: &TimerEntity, now: SystemTime) -> f64 {
    if timer.total_duration == 0 {
        return 0.0;
    }
    if matches!(timer.status, TimerStatus::Completed | TimerStatus::Expired) && timer.count_down {
        return 100.0;
    }

    let total_ms = timer.total_duration.saturating_mul(MILLIS_PER_SEC) as f64;
    let ratio = elapsed_active_ms(timer, now) as f64 / total_ms * 100.0;
    (ratio.clamp(0.0, 100.0) * 10.0).round() / 10.0
}

/// Thresholds crossed at `remaining` that have not fired yet, largest first.
///
/// Membership in `fired_warnings` is what makes each warning fire once, no
/// matter how irregular the sweeps are.
pub fn pending_warnings(timer: &TimerEntity, remaining: u64) -> Vec<u64> {
    if !timer.count_down {
        return Vec::new();
    }

    timer
        .warning_times
        .iter()
        .copied()
        .filter(|threshold| remaining <= *threshold && !timer.fired_warnings.contains(threshold))
        .collect()
}

/// Sort thresholds in descending order and drop duplicates.
pub fn normalize_warning_times(mut thresholds: Vec<u64>) -> Vec<u64> {
    thresholds.sort_unstable_by(|a, b| b.cmp(a));
    thresholds.dedup();
    thresholds
}

/// `MM:SS`, or `H:MM:SS` past the hour.
pub fn display_time(secs: u64) -> String {
    let hours = secs / 3_600;
    let minutes = (secs % 3_600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::BTreeSet,
        time::{Duration, SystemTime},
    };

    use uuid::Uuid;

    use super::*;
    use crate::dao::models::TimerType;

    fn epoch() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    fn at(secs: u64) -> SystemTime {
        epoch() + Duration::from_secs(secs)
    }

    fn running(total: u64) -> TimerEntity {
        TimerEntity {
            id: Uuid::new_v4(),
            committee_id: "c1".into(),
            session_id: "s1".into(),
            timer_type: TimerType::Speaker,
            name: "Speaker".into(),
            total_duration: total,
            remaining_time: total,
            count_down: true,
            status: TimerStatus::Running,
            started_at: Some(epoch()),
            paused_at: None,
            completed_at: None,
            total_paused_ms: 0,
            pause_history: Vec::new(),
            extensions: Vec::new(),
            warning_times: vec![30, 10],
            fired_warnings: BTreeSet::new(),
            controllable_by: Vec::new(),
            priority: 0,
            events: Vec::new(),
            created_at: epoch(),
            updated_at: epoch(),
        }
    }

    #[test]
    fn remaining_is_idempotent_for_fixed_inputs() {
        let timer = running(60);
        let now = at(17);
        let first = remaining_secs(&timer, now);
        for _ in 0..10 {
            assert_eq!(remaining_secs(&timer, now), first);
        }
        assert_eq!(first, 43);
    }

    #[test]
    fn countdown_rounds_partial_seconds_up() {
        let timer = running(60);
        let now = epoch() + Duration::from_millis(59_500);
        assert_eq!(remaining_secs(&timer, now), 1);
        assert!(!is_expired(&timer, now));
        assert!(is_expired(&timer, at(60)));
        assert_eq!(remaining_secs(&timer, at(90)), 0);
    }

    #[test]
    fn paused_timer_freezes_at_pause_instant() {
        let mut timer = running(60);
        timer.status = TimerStatus::Paused;
        timer.paused_at = Some(at(10));

        assert_eq!(remaining_secs(&timer, at(10)), 50);
        assert_eq!(remaining_secs(&timer, at(40)), 50);
        assert!(!is_expired(&timer, at(500)));
    }

    #[test]
    fn accumulated_pause_time_is_subtracted() {
        let mut timer = running(60);
        timer.total_paused_ms = 30_000;
        assert_eq!(remaining_secs(&timer, at(40)), 50);
        assert_eq!(elapsed_active_ms(&timer, at(40)), 10_000);
    }

    #[test]
    fn count_up_reports_elapsed_and_never_expires() {
        let mut timer = running(60);
        timer.count_down = false;
        assert_eq!(remaining_secs(&timer, at(75)), 75);
        assert!(!is_expired(&timer, at(75)));
        assert!(pending_warnings(&timer, 0).is_empty());
    }

    #[test]
    fn created_timer_reports_its_full_duration() {
        let mut timer = running(90);
        timer.status = TimerStatus::Created;
        timer.started_at = None;
        assert_eq!(remaining_secs(&timer, at(1_000)), 90);
        assert_eq!(progress_percentage(&timer, at(1_000)), 0.0);
    }

    #[test]
    fn pending_warnings_skip_fired_thresholds() {
        let mut timer = running(40);
        assert_eq!(pending_warnings(&timer, 35), Vec::<u64>::new());
        assert_eq!(pending_warnings(&timer, 8), vec![30, 10]);

        timer.fired_warnings.insert(30);
        assert_eq!(pending_warnings(&timer, 8), vec![10]);
        timer.fired_warnings.insert(10);
        assert!(pending_warnings(&timer, 0).is_empty());
    }

    #[test]
    fn progress_is_clamped_and_rounded() {
        let timer = running(60);
        assert_eq!(progress_percentage(&timer, at(0)), 0.0);
        assert_eq!(progress_percentage(&timer, at(20)), 33.3);
        assert_eq!(progress_percentage(&timer, at(600)), 100.0);
    }

    #[test]
    fn warning_times_are_sorted_descending_without_duplicates() {
        assert_eq!(normalize_warning_times(vec![10, 30, 10, 60]), vec![60, 30, 10]);
    }

    #[test]
    fn display_time_formats_minutes_and_hours() {
        assert_eq!(display_time(0), "00:00");
        assert_eq!(display_time(65), "01:05");
        assert_eq!(display_time(3_725), "1:02:05");
    }

    #[test]
    fn clock_going_backwards_counts_as_zero() {
        assert_eq!(millis_between(at(1), at(5)), 0);
        assert_eq!(millis_between(at(5), at(1)), 4_000);
    }
}
