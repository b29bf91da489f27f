use chrono::{DateTime, Utc};

/// Ranking score: unix time in seconds plus log-damped engagement.
///
/// `score = t + like_weight * ln(1 + likes) + view_weight * ln(1 + views)`
///
/// The timestamp term keeps recency dominant for typical counts; with no
/// engagement the score is exactly the post time. Time keeps its sub-second part
/// so two posts in the same second still rank by recency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scorer {
    pub like_weight: f64,
    pub view_weight: f64,
}

impl Default for Scorer {
    fn default() -> Self {
        Self {
            like_weight: 3600.0,
            view_weight: 60.0,
        }
    }
}

impl Scorer {
    pub fn new(like_weight: f64, view_weight: f64) -> Self {
        Self {
            like_weight,
            view_weight,
        }
    }

    pub fn score(&self, created_at: DateTime<Utc>, likes: u64, views: u64) -> f64 {
        let seconds = created_at.timestamp_micros() as f64 / 1_000_000.0;
        seconds
            + self.like_weight * (likes as f64).ln_1p()
            + self.view_weight * (views as f64).ln_1p()
    }

    /// Score for posts whose engagement counters are unknown.
    pub fn recency(&self, created_at: DateTime<Utc>) -> f64 {
        self.score(created_at, 0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn no_engagement_scores_the_timestamp() {
        let scorer = Scorer::default();
        assert_eq!(scorer.score(t0(), 0, 0), t0().timestamp() as f64);
        assert_eq!(scorer.recency(t0()), scorer.score(t0(), 0, 0));
    }

    #[test]
    fn strictly_increasing_in_time() {
        let scorer = Scorer::default();
        for (likes, views) in [(0, 0), (10, 0), (0, 1000), (500, 90_000)] {
            let earlier = scorer.score(t0(), likes, views);
            let later = scorer.score(t0() + Duration::seconds(1), likes, views);
            let slightly_later = scorer.score(t0() + Duration::milliseconds(1), likes, views);
            assert!(later > earlier);
            assert!(slightly_later > earlier);
        }
    }

    #[test]
    fn non_decreasing_in_engagement() {
        let scorer = Scorer::default();
        let mut previous = scorer.score(t0(), 0, 0);
        for likes in [1, 2, 10, 1_000, 1_000_000] {
            let current = scorer.score(t0(), likes, 0);
            assert!(current >= previous);
            previous = current;
        }
        let mut previous = scorer.score(t0(), 0, 0);
        for views in [1, 2, 10, 1_000, 1_000_000] {
            let current = scorer.score(t0(), 0, views);
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn likes_weigh_sixty_times_views_by_default() {
        let scorer = Scorer::default();
        let base = scorer.score(t0(), 0, 0);
        let like_boost = scorer.score(t0(), 1, 0) - base;
        let view_boost = scorer.score(t0(), 0, 1) - base;
        assert!((like_boost / view_boost - 60.0).abs() < 1e-4);
        assert!((like_boost - 3600.0 * 2f64.ln()).abs() < 1e-3);
    }

    #[test]
    fn custom_weights_apply() {
        let flat = Scorer::new(0.0, 0.0);
        assert_eq!(flat.score(t0(), 1_000, 1_000), flat.recency(t0()));
    }
}
