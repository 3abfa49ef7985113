//! Secret resolution for the three generic endpoints (planner/worker/embedder).
//!
//! Precedence: plaintext `key` (warns), then OS keychain via `service`+
//! `account`, then `env`. No key rotation — each role talks to exactly
//! one endpoint, so there is nothing to round-robin over.

use sentinel_domain::config::AuthConfig;

use crate::error::ProviderError;

pub fn resolve_api_key(auth: &AuthConfig) -> Result<String, ProviderError> {
    if let Some(ref key) = auth.key {
        tracing::warn!(
            "API key loaded from plaintext config field 'key' — prefer 'env' or keychain"
        );
        return Ok(key.clone());
    }

    if let (Some(ref service), Some(ref account)) = (&auth.service, &auth.account) {
        match resolve_from_keychain(service, account) {
            Ok(secret) => return Ok(secret),
            Err(e) => {
                tracing::warn!(service = %service, account = %account, error = %e, "keychain lookup failed, falling through to env");
            }
        }
    }

    if let Some(ref env_var) = auth.env {
        return std::env::var(env_var)
            .map_err(|_| ProviderError::Auth(format!("environment variable '{env_var}' not set")));
    }

    Err(ProviderError::Auth(
        "no API key configured: set 'key', 'env', or 'service'+'account' in AuthConfig".into(),
    ))
}

fn resolve_from_keychain(service: &str, account: &str) -> Result<String, ProviderError> {
    let entry = keyring::Entry::new(service, account)
        .map_err(|e| ProviderError::Auth(format!("keyring entry creation failed: {e}")))?;
    entry
        .get_password()
        .map_err(|e| ProviderError::Auth(format!("keyring get_password failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plaintext_key_wins() {
        let auth = AuthConfig {
            key: Some("sk-test-123".into()),
            ..Default::default()
        };
        assert_eq!(resolve_api_key(&auth).unwrap(), "sk-test-123");
    }

    #[test]
    fn env_var_is_resolved() {
        let var = "SENTINEL_TEST_RESOLVE_ENV_KEY";
        std::env::set_var(var, "env-secret");
        let auth = AuthConfig {
            env: Some(var.into()),
            ..Default::default()
        };
        assert_eq!(resolve_api_key(&auth).unwrap(), "env-secret");
        std::env::remove_var(var);
    }

    #[test]
    fn missing_everything_is_an_error() {
        let auth = AuthConfig::default();
        assert!(resolve_api_key(&auth).is_err());
    }
}
