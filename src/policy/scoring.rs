//! Per-candidate threshold and scoring arithmetic.

use crate::types::SegmentId;

/// Additive smoothing on the covered side of the match score.
pub const SCORE_NUMERATOR_SMOOTHING: f64 = 1000.0;

/// Additive smoothing on the footprint side of the match score.
pub const SCORE_DENOMINATOR_SMOOTHING: f64 = 2000.0;

/// Voxels a candidate's selected supports must reach to qualify.
pub fn required_size(match_ratio: f64, overlap_size: u64) -> f64 {
    match_ratio * overlap_size as f64
}

/// Whether the accumulated support reaches the threshold (inclusive).
pub fn clears_threshold(accum_size: u64, match_ratio: f64, overlap_size: u64) -> bool {
    accum_size as f64 >= required_size(match_ratio, overlap_size)
}

/// Smoothed coverage score used to pick a fallback candidate.
///
/// Formula:
/// ```text
/// score = (accum + 1000) / (overlap + 2000)
/// ```
///
/// Never divides by zero and pulls small segments towards 0.5.
pub fn match_score(accum_size: u64, overlap_size: u64) -> f64 {
    (accum_size as f64 + SCORE_NUMERATOR_SMOOTHING)
        / (overlap_size as f64 + SCORE_DENOMINATOR_SMOOTHING)
}

/// The best spawnable candidate seen so far in a group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestMatch {
    /// Post-side segment.
    pub id: SegmentId,
    /// Its match score.
    pub score: f64,
    /// Its overlap size.
    pub overlap_size: u64,
    /// Selected support it accumulated.
    pub accum_size: u64,
}

/// Tracks the fallback pick while a group is scanned.
///
/// Replacement requires a strictly greater score, so on equal scores the
/// candidate offered first is kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct BestMatchTracker {
    best: Option<BestMatch>,
}

impl BestMatchTracker {
    /// Start with no pick.
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a spawnable candidate.
    pub fn offer(&mut self, id: SegmentId, overlap_size: u64, accum_size: u64) {
        let score = match_score(accum_size, overlap_size);
        let replace = match &self.best {
            None => true,
            Some(current) => score > current.score,
        };
        if replace {
            self.best = Some(BestMatch {
                id,
                score,
                overlap_size,
                accum_size,
            });
        }
    }

    /// The current pick.
    pub fn best(&self) -> Option<BestMatch> {
        self.best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_inclusive() {
        assert!(clears_threshold(600, 0.6, 1000));
        assert!(!clears_threshold(599, 0.6, 1000));
        assert!(clears_threshold(0, 0.6, 0));
    }

    #[test]
    fn test_match_score_smoothing() {
        assert_eq!(match_score(0, 0), 0.5);
        assert_eq!(match_score(1000, 0), 1.0);
        assert!((match_score(700, 1000) - 1700.0 / 3000.0).abs() < 1e-12);
    }

    #[test]
    fn test_small_segments_score_towards_half() {
        // 10 of 10 voxels covered scores lower than 900 of 1000.
        assert!(match_score(10, 10) < match_score(900, 1000));
    }

    #[test]
    fn test_tracker_first_wins_on_tie() {
        let mut tracker = BestMatchTracker::new();
        tracker.offer(SegmentId::new(5), 100, 0);
        tracker.offer(SegmentId::new(6), 100, 0);
        assert_eq!(tracker.best().unwrap().id, SegmentId::new(5));

        tracker.offer(SegmentId::new(7), 100, 1);
        assert_eq!(tracker.best().unwrap().id, SegmentId::new(7));
    }

    #[test]
    fn test_tracker_starts_empty() {
        assert!(BestMatchTracker::new().best().is_none());
    }
}
