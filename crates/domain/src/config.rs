//! Lifecycle configuration loaded from environment variables.

/// Tunables for the lifecycle services.
///
/// Reads from environment variables:
/// - `ORDER_MAX_COMMIT_ATTEMPTS`: optimistic commit attempts per operation (default: `3`, minimum `1`)
/// - `ORDER_NUMBER_PREFIX`: prefix of generated order numbers (default: `"ORD"`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleConfig {
    pub max_commit_attempts: u32,
    pub order_number_prefix: String,
}

impl LifecycleConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            max_commit_attempts: lookup("ORDER_MAX_COMMIT_ATTEMPTS")
                .and_then(|v| v.parse::<u32>().ok())
                .map(|n| n.max(1))
                .unwrap_or(defaults.max_commit_attempts),
            order_number_prefix: lookup("ORDER_NUMBER_PREFIX")
                .filter(|p| !p.trim().is_empty())
                .unwrap_or(defaults.order_number_prefix),
        }
    }

    /// Sets the number of commit attempts. Values below one are raised to one.
    pub fn with_max_commit_attempts(mut self, attempts: u32) -> Self {
        self.max_commit_attempts = attempts.max(1);
        self
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_commit_attempts: 3,
            order_number_prefix: "ORD".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = LifecycleConfig::default();
        assert_eq!(config.max_commit_attempts, 3);
        assert_eq!(config.order_number_prefix, "ORD");
    }

    #[test]
    fn test_overrides() {
        let config = LifecycleConfig::from_lookup(lookup(&[
            ("ORDER_MAX_COMMIT_ATTEMPTS", "7"),
            ("ORDER_NUMBER_PREFIX", "SHOP"),
        ]));
        assert_eq!(config.max_commit_attempts, 7);
        assert_eq!(config.order_number_prefix, "SHOP");
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = LifecycleConfig::from_lookup(lookup(&[
            ("ORDER_MAX_COMMIT_ATTEMPTS", "many"),
            ("ORDER_NUMBER_PREFIX", "  "),
        ]));
        assert_eq!(config, LifecycleConfig::default());
    }

    #[test]
    fn test_attempts_floor_at_one() {
        let config = LifecycleConfig::from_lookup(lookup(&[("ORDER_MAX_COMMIT_ATTEMPTS", "0")]));
        assert_eq!(config.max_commit_attempts, 1);
        assert_eq!(
            LifecycleConfig::default().with_max_commit_attempts(0).max_commit_attempts,
            1
        );
    }
}
