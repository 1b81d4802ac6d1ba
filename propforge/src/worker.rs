//! Message types of the consumed worker-isolation protocol.
//!
//! A pool controller running predicates in isolated processes only needs
//! "run this predicate with this payload, tell me pass/fail/skip"; these
//! types define that boundary. Transport and process management live
//! outside this crate.

use crate::property::RunOutcome;

/// A request to execute one registered predicate against one payload.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PredicateRequest {
    /// Identifier of the predicate registered with the pool.
    pub target_predicate_id: String,
    /// Rendered candidate value.
    pub payload: String,
    /// Trial index, for correlating responses with requests.
    pub run_id: u64,
}

/// Outcome classification mirrored across the process boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum WorkerStatus {
    Success,
    Failure,
    Skipped,
}

/// The worker's answer for one request.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PredicateResponse {
    pub status: WorkerStatus,
    pub output: Option<String>,
    pub error: Option<String>,
}

impl PredicateResponse {
    /// Translate an in-process outcome into the wire classification.
    pub fn from_outcome(outcome: &RunOutcome) -> Self {
        match outcome {
            RunOutcome::Success => Self {
                status: WorkerStatus::Success,
                output: None,
                error: None,
            },
            RunOutcome::Failure(error) => Self {
                status: WorkerStatus::Failure,
                output: None,
                error: Some(error.to_string()),
            },
            RunOutcome::Skipped(label) => Self {
                status: WorkerStatus::Skipped,
                output: label.clone(),
                error: None,
            },
        }
    }

    /// Fold the response back into the runner's outcome space. A worker that
    /// stopped unexpectedly is reported as a failure, like any predicate
    /// failure for that trial.
    pub fn into_outcome(self) -> RunOutcome {
        match self.status {
            WorkerStatus::Success => RunOutcome::Success,
            WorkerStatus::Failure => RunOutcome::Failure(
                crate::error::PropertyError::property_failed(
                    self.error
                        .unwrap_or_else(|| "worker stopped unexpectedly".to_string()),
                ),
            ),
            WorkerStatus::Skipped => RunOutcome::Skipped(self.output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PropertyError;

    #[test]
    fn outcomes_round_trip_across_the_boundary() {
        let outcome = RunOutcome::Failure(PropertyError::property_failed("boom"));
        let response = PredicateResponse::from_outcome(&outcome);
        assert_eq!(response.status, WorkerStatus::Failure);
        assert!(response.error.as_deref().unwrap().contains("boom"));
        assert!(response.into_outcome().is_failure());

        let response = PredicateResponse::from_outcome(&RunOutcome::Success);
        assert_eq!(response.into_outcome(), RunOutcome::Success);

        let response =
            PredicateResponse::from_outcome(&RunOutcome::Skipped(Some("dup".to_string())));
        assert_eq!(
            response.into_outcome(),
            RunOutcome::Skipped(Some("dup".to_string()))
        );
    }

    #[test]
    fn messages_serialize_for_the_transport() {
        let request = PredicateRequest {
            target_predicate_id: "prop-7".to_string(),
            payload: "(11, 3)".to_string(),
            run_id: 42,
        };
        let encoded = serde_json::to_string(&request).unwrap();
        let decoded: PredicateRequest = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, request);

        let response = PredicateResponse {
            status: WorkerStatus::Skipped,
            output: Some("precondition".to_string()),
            error: None,
        };
        let encoded = serde_json::to_string(&response).unwrap();
        let decoded: PredicateResponse = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, response);
    }
}
