//! Controller configuration
//!
//! All settings come from environment variables and are parsed once at startup.

use crate::error::ControllerError;
use infoblox_client::client::DEFAULT_WAPI_VERSION;
use infoblox_client::InfobloxConfig;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONCURRENCY: u16 = 4;

/// Typed controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Infoblox grid connection settings
    pub infoblox: InfobloxConfig,
    /// Namespace to watch (all namespaces when `None`)
    pub namespace: Option<String>,
    /// Maximum number of machines reconciled at once
    pub concurrency: u16,
    /// Event reporter instance (pod name when running in-cluster)
    pub instance: String,
}

impl ControllerConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which returns the value of a variable if set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ControllerError::InvalidConfig(format!("{} must be set", key)))
        };

        let mut infoblox = InfobloxConfig::new(
            required("INFOBLOX_URL")?,
            required("INFOBLOX_USERNAME")?,
            required("INFOBLOX_PASSWORD")?,
        );
        infoblox.wapi_version = lookup("INFOBLOX_WAPI_VERSION")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_WAPI_VERSION.to_string());
        infoblox.insecure_skip_verify = match lookup("INFOBLOX_INSECURE_SKIP_VERIFY") {
            Some(raw) => parse_bool("INFOBLOX_INSECURE_SKIP_VERIFY", &raw)?,
            None => false,
        };
        let timeout_secs = match lookup("INFOBLOX_TIMEOUT_SECS") {
            Some(raw) => parse_number::<u64>("INFOBLOX_TIMEOUT_SECS", &raw)?,
            None => DEFAULT_TIMEOUT_SECS,
        };
        if timeout_secs == 0 {
            return Err(ControllerError::InvalidConfig(
                "INFOBLOX_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }
        infoblox.timeout = Duration::from_secs(timeout_secs);

        let namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty());

        let concurrency = match lookup("RECONCILE_CONCURRENCY") {
            Some(raw) => parse_number::<u16>("RECONCILE_CONCURRENCY", &raw)?,
            None => DEFAULT_CONCURRENCY,
        };
        if concurrency == 0 {
            return Err(ControllerError::InvalidConfig(
                "RECONCILE_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        let instance = lookup("POD_NAME")
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("machine-ipam-controller-{}", uuid::Uuid::new_v4()));

        Ok(Self {
            infoblox,
            namespace,
            concurrency,
            instance,
        })
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ControllerError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" | "" => Ok(false),
        other => Err(ControllerError::InvalidConfig(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ControllerError> {
    raw.trim().parse::<T>().map_err(|_| {
        ControllerError::InvalidConfig(format!("{} must be a positive integer, got '{}'", key, raw))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| env.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("INFOBLOX_URL", "https://infoblox.example.com"),
        ("INFOBLOX_USERNAME", "admin"),
        ("INFOBLOX_PASSWORD", "secret"),
    ];

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::from_lookup(lookup_from(&REQUIRED)).unwrap();

        assert_eq!(config.infoblox.base_url, "https://infoblox.example.com");
        assert_eq!(config.infoblox.wapi_version, DEFAULT_WAPI_VERSION);
        assert_eq!(config.infoblox.timeout, Duration::from_secs(30));
        assert!(!config.infoblox.insecure_skip_verify);
        assert_eq!(config.namespace, None);
        assert_eq!(config.concurrency, 4);
        assert!(config.instance.starts_with("machine-ipam-controller-"));
    }

    #[test]
    fn test_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("INFOBLOX_WAPI_VERSION", "v2.12"),
            ("INFOBLOX_INSECURE_SKIP_VERIFY", "true"),
            ("INFOBLOX_TIMEOUT_SECS", "5"),
            ("WATCH_NAMESPACE", "capi-system"),
            ("RECONCILE_CONCURRENCY", "16"),
            ("POD_NAME", "machine-ipam-7d9f"),
        ]);

        let config = ControllerConfig::from_lookup(lookup_from(&pairs)).unwrap();

        assert_eq!(config.infoblox.wapi_version, "v2.12");
        assert!(config.infoblox.insecure_skip_verify);
        assert_eq!(config.infoblox.timeout, Duration::from_secs(5));
        assert_eq!(config.namespace.as_deref(), Some("capi-system"));
        assert_eq!(config.concurrency, 16);
        assert_eq!(config.instance, "machine-ipam-7d9f");
    }

    #[test]
    fn test_missing_required_variable() {
        let err = ControllerConfig::from_lookup(lookup_from(&REQUIRED[..2])).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(ref m) if m.contains("INFOBLOX_PASSWORD")));
    }

    #[test]
    fn test_invalid_values() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("RECONCILE_CONCURRENCY", "0"));
        assert!(ControllerConfig::from_lookup(lookup_from(&pairs)).is_err());

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("INFOBLOX_TIMEOUT_SECS", "0"));
        let err = ControllerConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(ref m) if m.contains("INFOBLOX_TIMEOUT_SECS")));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("INFOBLOX_TIMEOUT_SECS", "soon"));
        assert!(ControllerConfig::from_lookup(lookup_from(&pairs)).is_err());

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("INFOBLOX_INSECURE_SKIP_VERIFY", "maybe"));
        assert!(ControllerConfig::from_lookup(lookup_from(&pairs)).is_err());
    }
}
