//! Pure classification logic: turning a receipt's event logs into an
//! [`Outcome`], and turning a revert/error message into a terminal-or-transient
//! verdict. Neither function does any I/O, which is what makes the
//! submitter's classifier "a deterministic function of `S`" (the log set).

use alloy_primitives::B256;
use alloy_sol_types::SolEvent;

use crate::contract::IRelayRouter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Forwarded,
    Fallback,
    OperatorRouted,
}

/// The result of scanning one receipt's logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogClassification {
    /// `None` when no primary signature (`Relayed`, `FallbackTriggered`,
    /// `OperatorRouted`) was found among the logs.
    pub outcome: Option<SubmissionOutcome>,
    /// `RecoveredFromConsumedNonce` may co-occur with any primary event; it
    /// never changes `outcome`, it only warrants an informational log.
    pub recovered_from_consumed_nonce: bool,
}

/// Classifies a receipt by scanning its logs' `topic[0]` values in order,
/// taking the first primary-event match. `RecoveredFromConsumedNonce` is
/// tracked independently regardless of where it appears in the log list.
pub fn classify_topics<'a>(topics0: impl IntoIterator<Item = &'a B256>) -> LogClassification {
    let mut result = LogClassification::default();

    for topic in topics0 {
        if *topic == IRelayRouter::RecoveredFromConsumedNonce::SIGNATURE_HASH {
            result.recovered_from_consumed_nonce = true;
            continue;
        }
        if result.outcome.is_some() {
            continue;
        }
        result.outcome = if *topic == IRelayRouter::Relayed::SIGNATURE_HASH {
            Some(SubmissionOutcome::Forwarded)
        } else if *topic == IRelayRouter::FallbackTriggered::SIGNATURE_HASH {
            Some(SubmissionOutcome::Fallback)
        } else if *topic == IRelayRouter::OperatorRouted::SIGNATURE_HASH {
            Some(SubmissionOutcome::OperatorRouted)
        } else {
            None
        };
    }

    result
}

/// Closed substring set signaling a permanent contract-layer rejection: no
/// retry of this job can ever succeed. Matching is case-insensitive.
///
/// `"settled"` and `"invalid fee"` additionally cover the destination
/// contract's literal revert strings ("transfer settled", "invalid fee")
/// observed for the already-settled-transfer and fee-mismatch cases; see
/// DESIGN.md for why the substring list is slightly broader than the
/// five named categories.
const TERMINAL_SUBSTRINGS: &[&str] = &[
    "settled",
    "already-used nonce",
    "nonce already used",
    "invalid destination domain",
    "invalid destination caller",
    "invalid mint recipient",
    "invalid fee",
];

/// Whether a submission failure is terminal (no retry can help) as opposed
/// to transient (worth retrying up to `max_retries`).
pub fn is_terminal_revert(reason: &str) -> bool {
    let lower = reason.to_lowercase();
    TERMINAL_SUBSTRINGS.iter().any(|needle| lower.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic_for<E: SolEvent>() -> B256 {
        E::SIGNATURE_HASH
    }

    #[test]
    fn relayed_only_is_forwarded() {
        let topics = vec![topic_for::<IRelayRouter::Relayed>()];
        let result = classify_topics(topics.iter());
        assert_eq!(result.outcome, Some(SubmissionOutcome::Forwarded));
        assert!(!result.recovered_from_consumed_nonce);
    }

    #[test]
    fn fallback_only_is_fallback() {
        let topics = vec![topic_for::<IRelayRouter::FallbackTriggered>()];
        let result = classify_topics(topics.iter());
        assert_eq!(result.outcome, Some(SubmissionOutcome::Fallback));
    }

    #[test]
    fn operator_routed_only() {
        let topics = vec![topic_for::<IRelayRouter::OperatorRouted>()];
        let result = classify_topics(topics.iter());
        assert_eq!(result.outcome, Some(SubmissionOutcome::OperatorRouted));
    }

    #[test]
    fn recovered_co_event_does_not_change_outcome() {
        let topics = vec![
            topic_for::<IRelayRouter::Relayed>(),
            topic_for::<IRelayRouter::RecoveredFromConsumedNonce>(),
        ];
        let result = classify_topics(topics.iter());
        assert_eq!(result.outcome, Some(SubmissionOutcome::Forwarded));
        assert!(result.recovered_from_consumed_nonce);
    }

    #[test]
    fn unknown_signature_yields_no_outcome() {
        let topics = vec![B256::from([0xAB; 32])];
        let result = classify_topics(topics.iter());
        assert_eq!(result.outcome, None);
        assert!(!result.recovered_from_consumed_nonce);
    }

    #[test]
    fn terminal_substrings_are_recognized_case_insensitively() {
        assert!(is_terminal_revert("transfer settled"));
        assert!(is_terminal_revert("Transfer SETTLED already"));
        assert!(is_terminal_revert("invalid fee"));
        assert!(is_terminal_revert("invalid destination domain 7"));
        assert!(!is_terminal_revert("insufficient gas"));
    }

    #[test]
    fn classifier_is_a_pure_function_of_the_log_set() {
        let topics = vec![topic_for::<IRelayRouter::FallbackTriggered>()];
        let a = classify_topics(topics.iter());
        let b = classify_topics(topics.iter());
        assert_eq!(a, b);
    }
}
