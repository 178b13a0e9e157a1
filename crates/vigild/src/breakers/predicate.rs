//! Trigger predicate evaluation.
//!
//! Each function answers one question: given this breaker's tracked signals
//! and the clock, should it trip? The set is closed on purpose: a safety
//! component wants an auditable list, not pluggable callbacks.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Beliefs tracked per contradiction-loop breaker. Bounds memory when an
/// agent contradicts many distinct beliefs at once.
const MAX_TRACKED_BELIEFS: usize = 128;

/// Drop timestamps that fell out of the sliding window.
pub fn prune_window(times: &mut Vec<Instant>, window: Duration, now: Instant) {
    times.retain(|t| now.duration_since(*t) <= window);
}

/// Windowed count without mutation, for snapshots.
pub fn count_in_window(times: &[Instant], window: Duration, now: Instant) -> u32 {
    times
        .iter()
        .filter(|t| now.duration_since(**t) <= window)
        .count() as u32
}

/// Record one failure and evaluate the failure-count predicate.
pub fn failure_trip(
    times: &mut Vec<Instant>,
    threshold: u32,
    window_secs: u64,
    now: Instant,
) -> bool {
    times.push(now);
    prune_window(times, Duration::from_secs(window_secs), now);
    times.len() as u32 >= threshold
}

/// Record one contradiction of `belief_key` and evaluate the loop
/// predicate: has the *same* belief been contradicted `max_repeats` times
/// within the window?
pub fn contradiction_trip(
    beliefs: &mut HashMap<String, Vec<Instant>>,
    belief_key: &str,
    max_repeats: u32,
    window_secs: u64,
    now: Instant,
) -> bool {
    let window = Duration::from_secs(window_secs);
    let times = beliefs.entry(belief_key.to_string()).or_default();
    times.push(now);
    prune_window(times, window, now);
    let tripped = times.len() as u32 >= max_repeats;

    // Housekeeping: drop cold beliefs, then cap the map.
    beliefs.retain(|_, t| {
        prune_window(t, window, now);
        !t.is_empty()
    });
    while beliefs.len() > MAX_TRACKED_BELIEFS {
        let coldest = beliefs
            .iter()
            .min_by_key(|(_, t)| t.last().copied())
            .map(|(k, _)| k.clone());
        match coldest {
            Some(key) => {
                beliefs.remove(&key);
            }
            None => break,
        }
    }

    tripped
}

/// Cost-ratio predicate: spend-to-date / period-budget at or past the line.
pub fn cost_trip(ratio: f64, threshold: f64) -> bool {
    ratio >= threshold
}

/// Monotone signal-counter predicate.
pub fn signal_trip(count: u64, threshold: u64) -> bool {
    count >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prune_drops_only_stale_entries() {
        let now = Instant::now();
        let mut times = vec![
            now - Duration::from_secs(45),
            now - Duration::from_secs(20),
            now,
        ];
        prune_window(&mut times, Duration::from_secs(30), now);
        assert_eq!(times.len(), 2);
    }

    #[test]
    fn test_failure_trip_needs_threshold_inside_window() {
        let now = Instant::now();
        let mut times = vec![now - Duration::from_secs(120), now - Duration::from_secs(90)];
        // Two stale failures plus one fresh one: window count is 1 of 3.
        assert!(!failure_trip(&mut times, 3, 30, now));
        assert_eq!(times.len(), 1);
        assert!(!failure_trip(&mut times, 3, 30, now));
        assert!(failure_trip(&mut times, 3, 30, now));
    }

    #[test]
    fn test_contradiction_trip_keys_on_same_belief() {
        let now = Instant::now();
        let mut beliefs = HashMap::new();
        assert!(!contradiction_trip(&mut beliefs, "sky_color", 3, 600, now));
        assert!(!contradiction_trip(&mut beliefs, "water_temp", 3, 600, now));
        assert!(!contradiction_trip(&mut beliefs, "sky_color", 3, 600, now));
        // Third strike against the same belief trips; other beliefs don't
        // contribute.
        assert!(contradiction_trip(&mut beliefs, "sky_color", 3, 600, now));
    }

    #[test]
    fn test_contradiction_map_stays_bounded() {
        let now = Instant::now();
        let mut beliefs = HashMap::new();
        for i in 0..(MAX_TRACKED_BELIEFS + 40) {
            contradiction_trip(&mut beliefs, &format!("belief_{}", i), 99, 600, now);
        }
        assert!(beliefs.len() <= MAX_TRACKED_BELIEFS);
    }

    #[test]
    fn test_cost_and_signal_trips_are_inclusive() {
        assert!(cost_trip(1.0, 1.0));
        assert!(!cost_trip(0.999, 1.0));
        assert!(signal_trip(1, 1));
        assert!(!signal_trip(0, 1));
    }
}
