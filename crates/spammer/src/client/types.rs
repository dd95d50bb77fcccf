//! Types for ledger endpoint communication.

use iotload_types::{AccountId, SequenceNumber};
use serde::Deserialize;

/// Operation result code reported when a create-account target already exists.
pub const OP_ALREADY_EXISTS: &str = "op_already_exists";

/// Transaction result code reported for an out-of-order sequence number.
pub const TX_BAD_SEQ: &str = "tx_bad_seq";

/// Encoded transaction result a submission endpoint returns for `tx_bad_seq`.
pub const BAD_SEQ_RESULT: &str = "AAAAAAAAAAH////7AAAAAA==";

/// Account record returned by `GET /accounts/<id>`.
#[derive(Debug, Deserialize)]
pub struct AccountResponse {
    pub id: String,
    /// Sequence numbers are rendered as strings to survive JSON number limits.
    pub sequence: String,
}

/// Authoritative account state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountInfo {
    pub id: AccountId,
    pub sequence: SequenceNumber,
}

/// Successful response from `POST /transactions`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitTransactionResponse {
    pub hash: String,
    #[serde(default)]
    pub ledger: Option<u64>,
    #[serde(default = "default_true")]
    pub successful: bool,
}

fn default_true() -> bool {
    true
}

/// Error document returned by read endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct Problem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub extras: Option<ProblemExtras>,
}

/// Extra problem details.
#[derive(Debug, Default, Deserialize)]
pub struct ProblemExtras {
    #[serde(default)]
    pub result_codes: Option<ResultCodes>,
}

/// Transaction- and operation-level result codes.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ResultCodes {
    #[serde(default)]
    pub transaction: Option<String>,
    #[serde(default)]
    pub operations: Vec<String>,
}

/// Status reported by a submission endpoint for `GET /tx?blob=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoreStatus {
    Pending,
    Duplicate,
    Error,
    TryAgainLater,
}

/// Raw response body of a submission endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CoreResponse {
    pub status: CoreStatus,
    #[serde(default)]
    pub error: Option<String>,
}

/// An accepted log submission and the endpoint's response to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreSubmission {
    /// HTTP status code.
    pub status_code: u16,
    /// Response body; its status is `Pending` or `Duplicate`.
    pub response: CoreResponse,
}

impl CoreSubmission {
    /// A bare `Pending` acceptance.
    pub fn pending(status_code: u16) -> Self {
        Self {
            status_code,
            response: CoreResponse {
                status: CoreStatus::Pending,
                error: None,
            },
        }
    }

    pub fn status(&self) -> CoreStatus {
        self.response.status
    }
}

impl CoreResponse {
    /// Classify the response into an accepted submission or an error.
    pub fn into_result(self, status_code: u16) -> Result<CoreSubmission, ClientError> {
        match self.status {
            CoreStatus::Pending | CoreStatus::Duplicate => Ok(CoreSubmission {
                status_code,
                response: self,
            }),
            CoreStatus::Error => match self.error {
                Some(result) if result == BAD_SEQ_RESULT => Err(ClientError::SequenceConflict {
                    detail: result,
                }),
                other => Err(ClientError::Rejected {
                    status: status_code,
                    codes: other.into_iter().collect(),
                }),
            },
            CoreStatus::TryAgainLater => Err(ClientError::Rejected {
                status: status_code,
                codes: vec!["TRY_AGAIN_LATER".to_string()],
            }),
        }
    }
}

/// Closed classification of everything that can go wrong talking to an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The first operation failed because its target already exists.
    #[error("Operation already exists")]
    DuplicateOperation,

    /// The network rejected the sequence number.
    #[error("Sequence number rejected: {detail}")]
    SequenceConflict { detail: String },

    /// The network rejected the transaction for another reason.
    #[error("Transaction rejected (HTTP {status}): {codes:?}")]
    Rejected { status: u16, codes: Vec<String> },

    /// The endpoint could not be reached or timed out.
    #[error("Transport failure talking to {endpoint}: {reason}")]
    Transport { endpoint: String, reason: String },

    /// The response body could not be understood.
    #[error("Undecodable response: {0}")]
    Decode(String),

    /// The transaction could not be encoded for submission.
    #[error("Failed to encode transaction: {0}")]
    Encoding(String),

    #[error("Unexpected response (HTTP {status}): {detail}")]
    Unknown { status: u16, detail: String },
}

impl ClientError {
    /// Classify an error document returned with a non-success status.
    pub fn from_problem(status: u16, problem: Problem) -> Self {
        let codes = problem
            .extras
            .and_then(|extras| extras.result_codes)
            .unwrap_or_default();

        if codes.operations.first().map(String::as_str) == Some(OP_ALREADY_EXISTS) {
            return ClientError::DuplicateOperation;
        }
        if codes.transaction.as_deref() == Some(TX_BAD_SEQ) {
            return ClientError::SequenceConflict {
                detail: TX_BAD_SEQ.to_string(),
            };
        }
        if codes.transaction.is_none() && codes.operations.is_empty() {
            return ClientError::Unknown {
                status,
                detail: problem.detail.unwrap_or(problem.title),
            };
        }

        ClientError::Rejected {
            status,
            codes: codes
                .transaction
                .into_iter()
                .chain(codes.operations)
                .collect(),
        }
    }

    /// Whether this error means a sequence number was reused or skipped.
    pub fn is_sequence_conflict(&self) -> bool {
        matches!(self, ClientError::SequenceConflict { .. })
    }
}
