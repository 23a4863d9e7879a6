use std::time::Duration;

/// The configuration of the library system
#[derive(Debug, Clone)]
pub struct Config {
    /// How long an operation may wait on a per-resource lock before giving up
    pub lock_timeout: Duration,
    /// The similarity score required before a user is suggested as a friend
    pub suggestion_threshold: f32,
    /// How many commonly rated books give a similarity score full confidence
    pub full_confidence_overlap: usize,
    /// The default similarity required for an edge in the affinity graph
    pub affinity_threshold: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Far longer than any store roundtrip, short enough to not hang a request
            lock_timeout: Duration::from_secs(5),
            // Ratings agreeing within two stars on average
            suggestion_threshold: 0.5,
            // Below this overlap the score is proportionally discounted
            full_confidence_overlap: 3,
            affinity_threshold: 0.5,
        }
    }
}
