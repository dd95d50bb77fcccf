//! Ledger endpoint client.
//!
//! [`LedgerClient`] is the seam between the dispatch engine and the network.
//! [`HttpLedgerClient`] is the production implementation; tests substitute an
//! in-memory ledger.

mod endpoints;
mod types;

pub use endpoints::EndpointSet;
pub use types::{
    AccountInfo, AccountResponse, ClientError, CoreResponse, CoreStatus, CoreSubmission, Problem,
    ProblemExtras, ResultCodes, SubmitTransactionResponse, BAD_SEQ_RESULT, OP_ALREADY_EXISTS,
    TX_BAD_SEQ,
};

use async_trait::async_trait;
use iotload_types::{AccountId, SequenceNumber, TransactionEnvelope};
use std::time::Duration;
use tracing::trace;

/// Operations the spammer needs from ledger endpoints.
#[async_trait]
pub trait LedgerClient: Send + Sync + 'static {
    /// Read an account's current sequence number from a read endpoint.
    async fn load_account(
        &self,
        endpoint: &str,
        account: &AccountId,
    ) -> Result<AccountInfo, ClientError>;

    /// Submit a transaction through a read endpoint and wait for its result.
    ///
    /// Used for account funding.
    async fn submit_transaction(
        &self,
        endpoint: &str,
        envelope: &TransactionEnvelope,
    ) -> Result<SubmitTransactionResponse, ClientError>;

    /// Hand a transaction to a submission endpoint via `GET /tx?blob=`.
    async fn submit_to_core(
        &self,
        endpoint: &str,
        envelope: &TransactionEnvelope,
    ) -> Result<CoreSubmission, ClientError>;
}

/// Build the log submission URL: `<endpoint>/tx?blob=<urlencoded blob>`.
pub fn core_submit_url(endpoint: &str, blob: &str) -> Result<reqwest::Url, ClientError> {
    let base = format!("{}/tx", endpoint.trim_end_matches('/'));
    reqwest::Url::parse_with_params(&base, &[("blob", blob)]).map_err(|e| ClientError::Transport {
        endpoint: endpoint.to_string(),
        reason: format!("invalid URL: {}", e),
    })
}

/// HTTP implementation of [`LedgerClient`].
#[derive(Clone, Debug)]
pub struct HttpLedgerClient {
    http: reqwest::Client,
}

impl HttpLedgerClient {
    /// Create a client with the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transport {
                endpoint: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self { http })
    }

    fn transport(endpoint: &str, error: reqwest::Error) -> ClientError {
        ClientError::Transport {
            endpoint: endpoint.to_string(),
            reason: error.to_string(),
        }
    }

    /// Turn a non-success response into a classified error.
    async fn problem(response: reqwest::Response) -> ClientError {
        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => {
                let problem = serde_json::from_str::<Problem>(&body).unwrap_or_else(|_| Problem {
                    detail: Some(body),
                    ..Problem::default()
                });
                ClientError::from_problem(status, problem)
            }
            Err(e) => ClientError::Decode(e.to_string()),
        }
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn load_account(
        &self,
        endpoint: &str,
        account: &AccountId,
    ) -> Result<AccountInfo, ClientError> {
        let url = format!("{}/accounts/{}", endpoint.trim_end_matches('/'), account);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Self::transport(endpoint, e))?;

        if !response.status().is_success() {
            return Err(Self::problem(response).await);
        }

        let body: AccountResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        let sequence = body
            .sequence
            .parse::<i64>()
            .map_err(|e| ClientError::Decode(format!("sequence '{}': {}", body.sequence, e)))?;

        Ok(AccountInfo {
            id: *account,
            sequence: SequenceNumber(sequence),
        })
    }

    async fn submit_transaction(
        &self,
        endpoint: &str,
        envelope: &TransactionEnvelope,
    ) -> Result<SubmitTransactionResponse, ClientError> {
        let blob = envelope
            .to_blob()
            .map_err(|e| ClientError::Encoding(e.to_string()))?;
        let url = format!("{}/transactions", endpoint.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .form(&[("tx", blob.as_str())])
            .send()
            .await
            .map_err(|e| Self::transport(endpoint, e))?;

        if !response.status().is_success() {
            return Err(Self::problem(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn submit_to_core(
        &self,
        endpoint: &str,
        envelope: &TransactionEnvelope,
    ) -> Result<CoreSubmission, ClientError> {
        let blob = envelope
            .to_blob()
            .map_err(|e| ClientError::Encoding(e.to_string()))?;
        let url = core_submit_url(endpoint, &blob)?;
        trace!(%url, "Submitting log transaction");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Self::transport(endpoint, e))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Self::transport(endpoint, e))?;

        match serde_json::from_str::<CoreResponse>(&body) {
            Ok(parsed) => parsed.into_result(status),
            Err(_) if !(200..300).contains(&status) => Err(ClientError::Unknown {
                status,
                detail: body,
            }),
            Err(e) => Err(ClientError::Decode(format!("{}: {}", e, body))),
        }
    }
}
