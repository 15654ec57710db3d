//! Test record lifecycle tests
//!
//! Tests for the test status table:
//! - legal and illegal test transitions, including retest after failure
//! - which transitions count as completing the test

use proptest::prelude::*;
use shared::TestStatus;
use std::str::FromStr;

const ALL_TEST_STATES: [TestStatus; 4] = [
    TestStatus::Pending,
    TestStatus::Testing,
    TestStatus::Completed,
    TestStatus::Failed,
];

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        let legal = [
            (TestStatus::Pending, TestStatus::Testing),
            (TestStatus::Pending, TestStatus::Completed),
            (TestStatus::Pending, TestStatus::Failed),
            (TestStatus::Testing, TestStatus::Completed),
            (TestStatus::Testing, TestStatus::Failed),
            (TestStatus::Failed, TestStatus::Testing),
        ];

        for from in ALL_TEST_STATES {
            for to in ALL_TEST_STATES {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_only_completion_completes() {
        assert!(TestStatus::Testing.completes_on(TestStatus::Completed));
        assert!(TestStatus::Pending.completes_on(TestStatus::Completed));
        assert!(!TestStatus::Testing.completes_on(TestStatus::Failed));
        assert!(!TestStatus::Failed.completes_on(TestStatus::Testing));
    }

    #[test]
    fn test_finished_states() {
        assert!(TestStatus::Completed.is_finished());
        assert!(TestStatus::Failed.is_finished());
        assert!(!TestStatus::Testing.is_finished());
        assert!(!TestStatus::Pending.is_finished());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(TestStatus::from_str("failed").unwrap(), TestStatus::Failed);
        assert!(TestStatus::from_str("passed").is_err());
    }
}

// ============================================================================
// Property Tests
// ============================================================================

fn test_state() -> impl Strategy<Value = TestStatus> {
    prop::sample::select(ALL_TEST_STATES.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Among legal moves, exactly those into completed are completing
    #[test]
    fn prop_completes_only_into_completed(from in test_state(), to in test_state()) {
        prop_assume!(from.can_transition_to(to));
        prop_assert_eq!(from.completes_on(to), to == TestStatus::Completed);
    }

    /// Completed is terminal
    #[test]
    fn prop_completed_is_terminal(to in test_state()) {
        prop_assert!(TestStatus::Completed.transition_to(to).is_err());
    }
}
