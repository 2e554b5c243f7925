//! Candidate matching (spec.md §4.2). `find_match` is pure: it never
//! mutates its inputs and, for identical inputs, always returns the same
//! result (property tested below — the purity invariant spec.md §8 names).

use chrono::{DateTime, Utc};

use crate::ids::SubjectId;

/// A participant waiting to be matched.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub subject_id: SubjectId,
    pub measured_rtt_ms: Option<u32>,
    pub arrived_at: DateTime<Utc>,
}

/// Matchmaker configuration. `max_server_rtt_ms` is the §4.2 prefilter;
/// `max_p2p_rtt_ms` is consulted downstream by
/// [`should_reject_for_rtt`] once a probe result comes back.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchmakerConfig {
    pub max_server_rtt_ms: Option<u32>,
    pub max_p2p_rtt_ms: Option<u32>,
}

/// Finds a subset of `waiting` (size `group_size - 1`) to pair with
/// `arriving`. Returns `None` if no such subset exists yet. Never mutates
/// `waiting` — the caller removes the matched entries itself as part of
/// the atomic "create game" step (spec.md §4.4 Rule L3).
#[must_use]
pub fn find_match(
    config: &MatchmakerConfig,
    arriving: &MatchCandidate,
    waiting: &[MatchCandidate],
    group_size: usize,
) -> Option<Vec<SubjectId>> {
    if group_size == 0 {
        return Some(Vec::new());
    }
    let needed = group_size - 1;
    if needed == 0 {
        return Some(Vec::new());
    }

    let mut candidates: Vec<&MatchCandidate> = waiting
        .iter()
        .filter(|partner| compatible(config, arriving, partner))
        .collect();

    if candidates.len() < needed {
        return None;
    }

    // Default FIFO: earliest arrivals first.
    candidates.sort_by_key(|c| c.arrived_at);
    Some(candidates.into_iter().take(needed).map(|c| c.subject_id).collect())
}

fn compatible(config: &MatchmakerConfig, a: &MatchCandidate, b: &MatchCandidate) -> bool {
    let Some(max_server_rtt_ms) = config.max_server_rtt_ms else {
        return true;
    };

    match (a.measured_rtt_ms, b.measured_rtt_ms) {
        (Some(rtt_a), Some(rtt_b)) => rtt_a.saturating_add(rtt_b) <= max_server_rtt_ms,
        // Missing RTT with an active filter: matchmaker precondition
        // violation (spec.md §7) -- never matches, stays queued.
        _ => false,
    }
}

/// `true` iff a probe result must cause the pairing to be rejected:
/// `max_p2p_rtt_ms` is configured AND the measurement is missing or over
/// the bound.
#[must_use]
pub fn should_reject_for_rtt(max_p2p_rtt_ms: Option<u32>, measured_rtt_ms: Option<u32>) -> bool {
    match max_p2p_rtt_ms {
        None => false,
        Some(max) => measured_rtt_ms.is_none_or(|rtt| rtt > max),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn candidate(rtt: Option<u32>, offset_secs: i64) -> MatchCandidate {
        MatchCandidate {
            subject_id: SubjectId::new(),
            measured_rtt_ms: rtt,
            arrived_at: Utc::now() + ChronoDuration::seconds(offset_secs),
        }
    }

    #[test]
    fn fifo_without_rtt_filter_picks_earliest() {
        let config = MatchmakerConfig::default();
        let early = candidate(None, -10);
        let late = candidate(None, -1);
        let arriving = candidate(None, 0);
        let waiting = vec![late.clone(), early.clone()];

        let result = find_match(&config, &arriving, &waiting, 2).unwrap();
        assert_eq!(result, vec![early.subject_id]);
    }

    #[test]
    fn latency_filter_never_returns_a_violating_partner() {
        let config = MatchmakerConfig {
            max_server_rtt_ms: Some(100),
            max_p2p_rtt_ms: None,
        };
        let close = candidate(Some(30), -5);
        let far = candidate(Some(90), -4);
        let arriving = candidate(Some(30), 0);
        let waiting = vec![far, close.clone()];

        let result = find_match(&config, &arriving, &waiting, 2).unwrap();
        assert_eq!(result, vec![close.subject_id]);
    }

    #[test]
    fn missing_rtt_under_active_filter_never_matches() {
        let config = MatchmakerConfig {
            max_server_rtt_ms: Some(100),
            max_p2p_rtt_ms: None,
        };
        let partner = candidate(None, -1);
        let arriving = candidate(Some(10), 0);
        assert!(find_match(&config, &arriving, &[partner], 2).is_none());
    }

    #[test]
    fn should_reject_for_rtt_matches_spec_definition() {
        assert!(!should_reject_for_rtt(None, None));
        assert!(should_reject_for_rtt(Some(80), None));
        assert!(should_reject_for_rtt(Some(80), Some(120)));
        assert!(!should_reject_for_rtt(Some(80), Some(40)));
    }

    proptest::proptest! {
        #[test]
        fn purity_identical_inputs_yield_identical_output(
            rtt_a in proptest::option::of(0u32..200),
            rtt_b in proptest::option::of(0u32..200),
            max_server_rtt in proptest::option::of(0u32..300),
        ) {
            let config = MatchmakerConfig { max_server_rtt_ms: max_server_rtt, max_p2p_rtt_ms: None };
            let arriving = MatchCandidate { subject_id: SubjectId::new(), measured_rtt_ms: rtt_a, arrived_at: Utc::now() };
            let partner = MatchCandidate { subject_id: SubjectId::new(), measured_rtt_ms: rtt_b, arrived_at: Utc::now() };
            let waiting = vec![partner];

            let first = find_match(&config, &arriving, &waiting, 2);
            let second = find_match(&config, &arriving, &waiting, 2);
            proptest::prop_assert_eq!(first, second);
            // waiting must be unmutated: length and subject unchanged.
            proptest::prop_assert_eq!(waiting.len(), 1);
        }

        #[test]
        fn latency_filter_never_exceeds_bound(
            rtt_a in 0u32..500,
            rtt_b in 0u32..500,
            max_server_rtt in 0u32..500,
        ) {
            let config = MatchmakerConfig { max_server_rtt_ms: Some(max_server_rtt), max_p2p_rtt_ms: None };
            let arriving = MatchCandidate { subject_id: SubjectId::new(), measured_rtt_ms: Some(rtt_a), arrived_at: Utc::now() };
            let partner = MatchCandidate { subject_id: SubjectId::new(), measured_rtt_ms: Some(rtt_b), arrived_at: Utc::now() };

            if let Some(matched) = find_match(&config, &arriving, &[partner.clone()], 2) {
                proptest::prop_assert_eq!(matched, vec![partner.subject_id]);
                proptest::prop_assert!(rtt_a.saturating_add(rtt_b) <= max_server_rtt);
            }
        }
    }
}
