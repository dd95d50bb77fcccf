//! Identity generation for network setup.
//!
//! Produces TOML listing account ids and secrets, e.g. to pre-fund a
//! collection or funding account in a test network's genesis.

use crate::identity::{generate_identities, generate_identities_from_seed};
use iotload_types::Identity;
use std::fmt::Write;

/// Generate `count` identities and format them as TOML.
///
/// Output format:
/// ```toml
/// [[identities]]
/// account = "G..."
/// secret = "S..."
/// ```
pub fn generate_keys_toml(count: usize, seed: Option<u64>) -> Result<String, KeygenError> {
    let identities = match seed {
        Some(seed) => generate_identities_from_seed(count, seed),
        None => generate_identities(count),
    };
    format_identities_toml(&identities, seed)
}

/// Format identities as TOML.
pub fn format_identities_toml(
    identities: &[Identity],
    seed: Option<u64>,
) -> Result<String, KeygenError> {
    let mut output = String::new();

    writeln!(output, "# Generated spammer identities")?;
    match seed {
        Some(seed) => writeln!(output, "# {} identities from seed {}", identities.len(), seed)?,
        None => writeln!(output, "# {} identities", identities.len())?,
    }
    writeln!(output)?;

    for identity in identities {
        writeln!(output, "[[identities]]")?;
        writeln!(output, "account = \"{}\"", identity.account_id())?;
        writeln!(output, "secret = \"{}\"", identity.secret())?;
        writeln!(output)?;
    }

    Ok(output)
}

/// Errors during key generation.
#[derive(Debug, thiserror::Error)]
pub enum KeygenError {
    #[error("Failed to format output: {0}")]
    Format(#[from] std::fmt::Error),
}
