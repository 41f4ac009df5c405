//! Pure scoring policy converting correctness and response latency into
//! awarded points.

/// Multiplier applied when the answer arrives within the first quarter of the
/// time limit.
const FAST_MULTIPLIER: f64 = 1.2;
/// Multiplier applied when the answer arrives within the first half of the
/// time limit.
const QUICK_MULTIPLIER: f64 = 1.1;

/// Whether a response latency exceeds the question's time limit.
///
/// A late answer is a timeout even when the deadline broadcast has not fired
/// yet; this defends against network delay on the end signal.
pub fn is_timeout(response_ms: u64, time_limit_secs: u32) -> bool {
    response_ms > u64::from(time_limit_secs) * 1_000
}

/// Points awarded for one answer.
///
/// Incorrect or timed-out answers earn 0. Correct answers earn the base
/// points multiplied by the speed bonus, truncated to an integer.
pub fn points(correct: bool, base_points: u32, response_ms: u64, time_limit_secs: u32) -> u32 {
    if !correct || is_timeout(response_ms, time_limit_secs) {
        return 0;
    }

    let limit_ms = u64::from(time_limit_secs) * 1_000;
    let multiplier = if response_ms * 4 < limit_ms {
        FAST_MULTIPLIER
    } else if response_ms * 2 < limit_ms {
        QUICK_MULTIPLIER
    } else {
        1.0
    };

    (f64::from(base_points) * multiplier) as u32
}

/// Maximum points achievable on a question, including the speed bonus.
pub fn max_points(base_points: u32) -> u32 {
    (f64::from(base_points) * FAST_MULTIPLIER) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_answers_earn_the_full_bonus() {
        assert_eq!(points(true, 1000, 5_000, 30), 1200);
    }

    #[test]
    fn quick_answers_earn_the_small_bonus() {
        assert_eq!(points(true, 1000, 10_000, 30), 1100);
    }

    #[test]
    fn slow_answers_earn_base_points() {
        assert_eq!(points(true, 1000, 16_000, 30), 1000);
    }

    #[test]
    fn incorrect_answers_earn_nothing() {
        assert_eq!(points(false, 1000, 1_000, 30), 0);
    }

    #[test]
    fn late_answers_earn_nothing_even_when_correct() {
        assert_eq!(points(true, 1000, 31_000, 30), 0);
        assert!(is_timeout(31_000, 30));
        assert!(!is_timeout(30_000, 30));
    }

    #[test]
    fn bonus_boundaries_are_exclusive() {
        // Exactly 25% of the limit gets the 1.1x bonus, not 1.2x.
        assert_eq!(points(true, 1000, 7_500, 30), 1100);
        // Exactly 50% of the limit gets no bonus.
        assert_eq!(points(true, 1000, 15_000, 30), 1000);
    }

    #[test]
    fn awarded_points_stay_within_bounds() {
        for response_ms in [0, 1, 7_499, 7_500, 15_000, 29_999, 30_000] {
            let earned = points(true, 777, response_ms, 30);
            assert!(earned <= max_points(777));
        }
    }
}
