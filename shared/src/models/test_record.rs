//! Quality test record models

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Test record lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "VARCHAR", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Pending,
    Testing,
    Completed,
    Failed,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Pending => "pending",
            TestStatus::Testing => "testing",
            TestStatus::Completed => "completed",
            TestStatus::Failed => "failed",
        }
    }

    /// States reachable in one step. A failed test may be re-run.
    pub fn allowed_transitions(&self) -> &'static [TestStatus] {
        match self {
            TestStatus::Pending => &[TestStatus::Testing, TestStatus::Completed, TestStatus::Failed],
            TestStatus::Testing => &[TestStatus::Completed, TestStatus::Failed],
            TestStatus::Failed => &[TestStatus::Testing],
            TestStatus::Completed => &[],
        }
    }

    pub fn can_transition_to(&self, next: TestStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn transition_to(&self, next: TestStatus) -> Result<TestStatus, DomainError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::InvalidTransition {
                entity: "test",
                from: self.as_str().to_string(),
                to: next.as_str().to_string(),
            })
        }
    }

    /// Whether moving from `self` to `next` is the completion edge that may
    /// cascade to the linked order
    pub fn completes_on(&self, next: TestStatus) -> bool {
        *self != TestStatus::Completed && next == TestStatus::Completed
    }

    /// Whether entering this state closes the test window
    pub fn is_finished(&self) -> bool {
        matches!(self, TestStatus::Completed | TestStatus::Failed)
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TestStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TestStatus::Pending),
            "testing" => Ok(TestStatus::Testing),
            "completed" => Ok(TestStatus::Completed),
            "failed" => Ok(TestStatus::Failed),
            other => Err(DomainError::UnknownStatus {
                entity: "test",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_is_terminal() {
        assert!(TestStatus::Completed.allowed_transitions().is_empty());
        assert!(TestStatus::Completed
            .transition_to(TestStatus::Testing)
            .is_err());
    }

    #[test]
    fn test_retest_after_failure() {
        assert!(TestStatus::Failed.can_transition_to(TestStatus::Testing));
        assert!(!TestStatus::Failed.can_transition_to(TestStatus::Completed));
    }

    #[test]
    fn test_completion_edge() {
        assert!(TestStatus::Testing.completes_on(TestStatus::Completed));
        assert!(TestStatus::Pending.completes_on(TestStatus::Completed));
        assert!(!TestStatus::Testing.completes_on(TestStatus::Failed));
        assert!(!TestStatus::Completed.completes_on(TestStatus::Completed));
    }
}
