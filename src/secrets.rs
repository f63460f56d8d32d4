//! Private key passphrase storage in the OS keyring.
//!
//! The passphrase is looked up only when neither the config file nor the
//! environment provides one. Keyring failures are never fatal on lookup.

use crate::error::{RelayError, Result};
use keyring::Entry;
use tracing::debug;

const SERVICE_NAME: &str = "snowflake-sql-relay";

/// Keyring user under which a passphrase is stored: `{ACCOUNT}.{USER}`.
pub fn entry_user(account: &str, username: &str) -> String {
    format!("{}.{}", account.to_uppercase(), username.to_uppercase())
}

/// Looks up the private key passphrase for the given account and user.
pub fn keyring_passphrase(account: &str, username: &str) -> Option<String> {
    let user = entry_user(account, username);
    let entry = match Entry::new(SERVICE_NAME, &user) {
        Ok(entry) => entry,
        Err(e) => {
            debug!("Keyring unavailable: {e}");
            return None;
        }
    };

    match entry.get_password() {
        Ok(passphrase) => {
            debug!(user = %user, "Using private key passphrase from keyring");
            Some(passphrase)
        }
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            debug!("Keyring lookup failed: {e}");
            None
        }
    }
}

/// Stores the private key passphrase for the given account and user.
pub fn store_passphrase(account: &str, username: &str, passphrase: &str) -> Result<()> {
    let user = entry_user(account, username);
    let entry = Entry::new(SERVICE_NAME, &user)
        .map_err(|e| RelayError::config(format!("Keyring unavailable: {e}")))?;
    entry
        .set_password(passphrase)
        .map_err(|e| RelayError::config(format!("Failed to store passphrase in keyring: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_user_is_uppercase() {
        assert_eq!(entry_user("xy12345", "svc_relay"), "XY12345.SVC_RELAY");
    }

    #[test]
    fn test_lookup_never_panics() {
        // Whatever the platform store does, an unknown entry is not an error.
        let _ = keyring_passphrase("no-such-account", "no-such-user");
    }
}
