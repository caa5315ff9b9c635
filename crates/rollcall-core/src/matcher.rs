//! Identity matching for detected faces.

use crate::types::{Embedding, KnownIdentity, MatchResult};

/// Default maximum Euclidean distance for a positive match.
///
/// Tuned for L2-normalised ArcFace encodings, where a distance of 1.10
/// corresponds to a cosine similarity of roughly 0.40.
pub const DEFAULT_TOLERANCE: f32 = 1.10;

/// Strategy for deciding which known identity (if any) a probe encoding belongs to.
pub trait Matcher {
    fn find<'a>(&self, probe: &Embedding, known: &'a [KnownIdentity]) -> MatchResult<'a>;
}

/// First-match-wins matcher.
///
/// Scans `known` in order and accepts the first identity whose encoding lies
/// within `tolerance` of the probe. This is not a nearest-neighbour search:
/// when two identities are both within tolerance, the earlier one wins even
/// if the later one is closer. Callers order the known set (the encoding
/// store sorts by file name) and rely on that order.
#[derive(Debug, Clone, Copy)]
pub struct FirstMatchMatcher {
    tolerance: f32,
}

impl FirstMatchMatcher {
    pub fn new(tolerance: f32) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }
}

impl Default for FirstMatchMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl Matcher for FirstMatchMatcher {
    fn find<'a>(&self, probe: &Embedding, known: &'a [KnownIdentity]) -> MatchResult<'a> {
        let mut closest: Option<f32> = None;

        for identity in known {
            let Some(distance) = identity.encoding.euclidean_distance(probe) else {
                tracing::debug!(
                    name = %identity.name,
                    expected = identity.encoding.len(),
                    actual = probe.len(),
                    "skipping identity with mismatched encoding length"
                );
                continue;
            };

            if distance <= self.tolerance {
                return MatchResult {
                    matched: true,
                    identity: Some(identity),
                    distance: Some(distance),
                };
            }

            closest = Some(closest.map_or(distance, |c| c.min(distance)));
        }

        MatchResult::unknown(closest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str, values: Vec<f32>) -> KnownIdentity {
        KnownIdentity {
            name: name.into(),
            encoding: Embedding::new(values),
        }
    }

    #[test]
    fn test_first_match_wins_over_closer_match() {
        // Probe is within tolerance of both, but much closer to Bob.
        let known = vec![
            identity("Alice", vec![0.5, 0.0]),
            identity("Bob", vec![0.05, 0.0]),
        ];
        let probe = Embedding::new(vec![0.0, 0.0]);

        let result = FirstMatchMatcher::new(0.6).find(&probe, &known);
        assert!(result.matched);
        assert_eq!(result.name(), Some("Alice"));
        assert!((result.distance.unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_order_decides_between_overlapping_identities() {
        let known = vec![
            identity("Bob", vec![0.05, 0.0]),
            identity("Alice", vec![0.5, 0.0]),
        ];
        let probe = Embedding::new(vec![0.0, 0.0]);

        let result = FirstMatchMatcher::new(0.6).find(&probe, &known);
        assert_eq!(result.name(), Some("Bob"));
    }

    #[test]
    fn test_later_identity_matches_when_earlier_out_of_tolerance() {
        let known = vec![
            identity("Alice", vec![1.0, 0.0]),
            identity("Bob", vec![0.0, 1.0]),
        ];
        let probe = Embedding::new(vec![0.0, 0.9]);

        let result = FirstMatchMatcher::new(0.6).find(&probe, &known);
        assert_eq!(result.name(), Some("Bob"));
    }

    #[test]
    fn test_no_match_reports_closest_distance() {
        let known = vec![
            identity("Alice", vec![3.0, 0.0]),
            identity("Bob", vec![0.0, 2.0]),
        ];
        let probe = Embedding::new(vec![0.0, 0.0]);

        let result = FirstMatchMatcher::new(0.6).find(&probe, &known);
        assert!(!result.matched);
        assert!(result.identity.is_none());
        assert!((result.distance.unwrap() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_tolerance_is_inclusive() {
        let known = vec![identity("Alice", vec![0.5, 0.0])];
        let probe = Embedding::new(vec![0.0, 0.0]);
        assert!(FirstMatchMatcher::new(0.5).find(&probe, &known).matched);
    }

    #[test]
    fn test_empty_known_set() {
        let probe = Embedding::new(vec![1.0, 0.0]);
        let result = FirstMatchMatcher::default().find(&probe, &[]);
        assert!(!result.matched);
        assert_eq!(result.distance, None);
    }

    #[test]
    fn test_mismatched_dimensions_never_match() {
        let known = vec![identity("Alice", vec![0.0, 0.0, 0.0])];
        let probe = Embedding::new(vec![0.0, 0.0]);
        let result = FirstMatchMatcher::new(10.0).find(&probe, &known);
        assert!(!result.matched);
    }
}
