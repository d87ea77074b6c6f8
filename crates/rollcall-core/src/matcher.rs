use crate::cache::EncodingCache;
use crate::types::{Encoding, Identity};

/// Result of matching a probe encoding against the cache.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub matched: bool,
    /// Euclidean distance of the best candidate. Infinity when the cache
    /// held no comparable entry at all.
    pub distance: f32,
    /// Identity of the match (if any).
    pub identity: Option<Identity>,
    /// Gallery label of the winning reference image (if any).
    pub source: Option<String>,
}

/// Strategy for comparing a probe encoding against the encoding cache.
pub trait Matcher {
    fn compare(&self, probe: &Encoding, cache: &EncodingCache, threshold: f32) -> MatchResult;
}

/// Nearest-neighbor matcher over Euclidean distance.
///
/// Scans every cache entry; the minimum distance wins when it is at or
/// under the threshold. Exact distance ties resolve to the byte-wise
/// smallest identity, so repeated runs over the same cache always give
/// the same answer.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(&self, probe: &Encoding, cache: &EncodingCache, threshold: f32) -> MatchResult {
        let mut best: Option<(f32, usize)> = None;

        for (i, entry) in cache.entries().iter().enumerate() {
            let dist = entry.encoding.distance(probe);
            if dist.is_nan() {
                continue;
            }
            let better = match best {
                None => true,
                Some((best_dist, best_idx)) => {
                    dist < best_dist
                        || (dist == best_dist
                            && entry.identity < cache.entries()[best_idx].identity)
                }
            };
            if better {
                best = Some((dist, i));
            }
        }

        match best {
            Some((dist, idx)) if dist <= threshold => {
                let entry = &cache.entries()[idx];
                MatchResult {
                    matched: true,
                    distance: dist,
                    identity: Some(entry.identity.clone()),
                    source: Some(entry.source.clone()),
                }
            }
            Some((dist, _)) => MatchResult {
                matched: false,
                distance: dist,
                identity: None,
                source: None,
            },
            None => MatchResult {
                matched: false,
                distance: f32::INFINITY,
                identity: None,
                source: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheEntry;

    fn entry(name: &str, source: &str, values: Vec<f32>) -> CacheEntry {
        CacheEntry {
            identity: Identity::new(name).unwrap(),
            source: source.to_string(),
            encoding: Encoding::new(values),
        }
    }

    #[test]
    fn test_match_within_threshold() {
        let cache = EncodingCache::from_entries(vec![entry("Alice", "Alice/1.jpg", vec![0.0, 0.0])]);
        let probe = Encoding::new(vec![0.3, 0.0]);

        let result = EuclideanMatcher.compare(&probe, &cache, 0.6);
        assert!(result.matched);
        assert_eq!(result.identity.unwrap().as_str(), "Alice");
        assert!((result.distance - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_beyond_threshold() {
        let cache = EncodingCache::from_entries(vec![entry("Alice", "Alice/1.jpg", vec![0.0, 0.0])]);
        let probe = Encoding::new(vec![0.9, 0.0]);

        let result = EuclideanMatcher.compare(&probe, &cache, 0.6);
        assert!(!result.matched);
        assert!(result.identity.is_none());
        assert!((result.distance - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        // 3-4-5 triangle: the distance is exactly 5.0 in f32.
        let cache = EncodingCache::from_entries(vec![entry("Alice", "Alice/1.jpg", vec![0.0, 0.0])]);
        let probe = Encoding::new(vec![3.0, 4.0]);

        let result = EuclideanMatcher.compare(&probe, &cache, 5.0);
        assert!(result.matched);
        assert_eq!(result.distance, 5.0);
    }

    #[test]
    fn test_nearest_identity_wins() {
        let cache = EncodingCache::from_entries(vec![
            entry("Bob", "Bob/1.jpg", vec![10.0, 0.0]),
            entry("Alice", "Alice/1.jpg", vec![0.0, 0.0]),
        ]);
        let probe = Encoding::new(vec![0.2, 0.0]);

        let result = EuclideanMatcher.compare(&probe, &cache, 0.6);
        assert_eq!(result.identity.unwrap().as_str(), "Alice");
    }

    #[test]
    fn test_any_reference_of_identity_can_match() {
        // Two references for Alice far apart; the probe sits near the second.
        let cache = EncodingCache::from_entries(vec![
            entry("Alice", "Alice/1.jpg", vec![0.0, 0.0]),
            entry("Alice", "Alice/2.jpg", vec![10.0, 10.0]),
        ]);
        let probe = Encoding::new(vec![10.1, 10.0]);

        let result = EuclideanMatcher.compare(&probe, &cache, 0.6);
        assert!(result.matched);
        assert_eq!(result.source.as_deref(), Some("Alice/2.jpg"));
    }

    #[test]
    fn test_exact_tie_prefers_bytewise_smallest_identity() {
        // Bob listed first so insertion order cannot be what decides.
        let cache = EncodingCache::from_entries(vec![
            entry("Bob", "Bob/1.jpg", vec![1.0, 0.0]),
            entry("Alice", "Alice/1.jpg", vec![1.0, 0.0]),
        ]);
        let probe = Encoding::new(vec![0.0, 0.0]);

        let result = EuclideanMatcher.compare(&probe, &cache, 2.0);
        assert!(result.matched);
        assert_eq!(result.identity.unwrap().as_str(), "Alice");
    }

    #[test]
    fn test_empty_cache_matches_nothing() {
        let cache = EncodingCache::from_entries(vec![]);
        let probe = Encoding::new(vec![1.0, 0.0]);

        let result = EuclideanMatcher.compare(&probe, &cache, 0.6);
        assert!(!result.matched);
        assert_eq!(result.distance, f32::INFINITY);
    }

    #[test]
    fn test_mismatched_dimensions_never_match() {
        let cache = EncodingCache::from_entries(vec![entry("Alice", "Alice/1.jpg", vec![0.0])]);
        let probe = Encoding::new(vec![0.0, 0.0]);

        let result = EuclideanMatcher.compare(&probe, &cache, 0.6);
        assert!(!result.matched);
        assert_eq!(result.distance, f32::INFINITY);
    }
}
