//! Idempotency guard for account provisioning.

use crate::client::ClientError;
use std::future::Future;

/// Run `operation`, treating "operation already exists" as success.
///
/// Returns `Ok(Some(value))` on success, `Ok(None)` when the network reported
/// that the operation's target already exists, and any other error
/// unchanged. Only wrap submissions that are safe to repeat.
pub async fn idempotent<T, F>(operation: F) -> Result<Option<T>, ClientError>
where
    F: Future<Output = Result<T, ClientError>>,
{
    match operation.await {
        Ok(value) => Ok(Some(value)),
        Err(ClientError::DuplicateOperation) => Ok(None),
        Err(e) => Err(e),
    }
}
