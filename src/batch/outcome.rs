use serde::Serialize;

use crate::config::FLASH_ERROR_EXCERPT;
use crate::error::{truncate_diagnostic, ErrorClass, ProvisionError};

/// Totals for one run. Only the batch loop and the flash engine write these.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCounters {
    pub attempted: u32,
    pub succeeded: u32,
    /// Zero-based retry of the flash currently in progress.
    pub current_retry: u32,
}

impl RunCounters {
    pub fn failed(&self) -> u32 {
        self.attempted.saturating_sub(self.succeeded)
    }
}

/// How one device session ended, as the batch loop sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum TransferOutcome {
    Success(String),
    /// Nothing to work with yet. The loop goes back to discovery.
    Timeout(String),
    TransportError(String),
    Cancelled,
}

impl TransferOutcome {
    /// Classify a session failure. Configuration errors never reach here:
    /// the loop stops on them before asking.
    pub fn from_error(err: &ProvisionError) -> Self {
        match err.class() {
            ErrorClass::Cancelled => TransferOutcome::Cancelled,
            ErrorClass::DiscoveryTimeout => TransferOutcome::Timeout(err.to_string()),
            ErrorClass::Transport | ErrorClass::Configuration => TransferOutcome::TransportError(
                truncate_diagnostic(&err.to_string(), FLASH_ERROR_EXCERPT),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(
            TransferOutcome::from_error(&ProvisionError::Cancelled),
            TransferOutcome::Cancelled
        );
        assert!(matches!(
            TransferOutcome::from_error(&ProvisionError::ScanTimeout {
                target: "prefix 'RX'".into(),
                timeout_ms: 180_000
            }),
            TransferOutcome::Timeout(_)
        ));

        let outcome = TransferOutcome::from_error(&ProvisionError::HttpStatus {
            status: 500,
            body: "x".repeat(2_000),
        });
        match outcome {
            TransferOutcome::TransportError(detail) => {
                assert!(detail.starts_with("HTTP 500"));
                assert!(detail.chars().count() <= FLASH_ERROR_EXCERPT);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_counters_serialise_for_events() {
        let counters = RunCounters {
            attempted: 5,
            succeeded: 3,
            current_retry: 1,
        };
        assert_eq!(counters.failed(), 2);
        assert_eq!(
            serde_json::to_value(&counters).unwrap(),
            serde_json::json!({"attempted": 5, "succeeded": 3, "currentRetry": 1})
        );
    }
}
