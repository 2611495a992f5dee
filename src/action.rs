use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

/// Environment variable holding the fully-qualified action name.
pub const ACTION_NAME_ENV: &str = "__OW_ACTION_NAME";
/// Environment variable holding the activation id.
pub const ACTIVATION_ID_ENV: &str = "__OW_ACTIVATION_ID";
/// Environment variable holding the activation deadline (epoch millis).
pub const DEADLINE_ENV: &str = "__OW_DEADLINE";

/// Parsed form of `/namespace/package/action`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionName {
    pub namespace: String,
    pub package: String,
    pub name: String,
}

impl ActionName {
    /// Parse a fully-qualified action name.
    ///
    /// - `/ns/pkg/name` and `/ns/name`: namespace first, up to 3 parts
    /// - `pkg/name` and `name`: no namespace, up to 2 parts
    /// - empty input: all fields empty
    pub fn parse(full_name: &str) -> Self {
        if full_name.is_empty() {
            return Self::default();
        }

        if let Some(rest) = full_name.strip_prefix('/') {
            let parts: Vec<&str> = rest.splitn(3, '/').collect();
            match parts.as_slice() {
                [namespace, package, name] => Self::from_parts(namespace, package, name),
                [namespace, name] => Self::from_parts(namespace, "", name),
                [namespace] => Self::from_parts(namespace, "", ""),
                _ => Self::default(),
            }
        } else {
            let parts: Vec<&str> = full_name.splitn(2, '/').collect();
            match parts.as_slice() {
                [package, name] => Self::from_parts("", package, name),
                [name] => Self::from_parts("", "", name),
                _ => Self::default(),
            }
        }
    }

    fn from_parts(namespace: &str, package: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            package: package.to_string(),
            name: name.to_string(),
        }
    }

    /// The action's own name without namespace or package.
    pub fn short_name(&self) -> &str {
        &self.name
    }

    /// `package/name`, or just `name` outside a package.
    pub fn package_qualified(&self) -> String {
        if self.package.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.package, self.name)
        }
    }
}

/// Identity and deadline of the current activation, captured once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionEnvironment {
    pub action: ActionName,
    pub activation_id: Option<String>,
    /// Epoch milliseconds after which the platform kills the activation.
    pub deadline_ms: Option<i64>,
}

impl ActionEnvironment {
    pub fn new(action_name: &str) -> Self {
        Self {
            action: ActionName::parse(action_name),
            activation_id: None,
            deadline_ms: None,
        }
    }

    /// Read identity and deadline from the process environment.
    pub fn from_env() -> Self {
        let action = std::env::var(ACTION_NAME_ENV).unwrap_or_default();
        let activation_id = std::env::var(ACTIVATION_ID_ENV)
            .ok()
            .filter(|id| !id.is_empty());
        let deadline_ms = std::env::var(DEADLINE_ENV)
            .ok()
            .and_then(|value| value.trim().parse::<i64>().ok());

        Self {
            action: ActionName::parse(&action),
            activation_id,
            deadline_ms,
        }
    }

    pub fn with_activation_id(mut self, activation_id: impl Into<String>) -> Self {
        self.activation_id = Some(activation_id.into());
        self
    }

    pub fn with_deadline_ms(mut self, deadline_ms: i64) -> Self {
        self.deadline_ms = Some(deadline_ms);
        self
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline_ms
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }

    /// Time left until the deadline; zero once it has passed.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        let deadline = self.deadline()?;
        Some((deadline - now).to_std().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fully_qualified_name() {
        let name = ActionName::parse("/ns/pkg/worker");
        assert_eq!(name.namespace, "ns");
        assert_eq!(name.package, "pkg");
        assert_eq!(name.name, "worker");
        assert_eq!(name.package_qualified(), "pkg/worker");
    }

    #[test]
    fn parses_namespace_without_package() {
        let name = ActionName::parse("/ns/worker");
        assert_eq!(name, ActionName::from_parts("ns", "", "worker"));
        assert_eq!(name.package_qualified(), "worker");
    }

    #[test]
    fn parses_relative_names() {
        assert_eq!(ActionName::parse("pkg/worker"), ActionName::from_parts("", "pkg", "worker"));
        assert_eq!(ActionName::parse("worker"), ActionName::from_parts("", "", "worker"));
        assert_eq!(ActionName::parse("worker").short_name(), "worker");
    }

    #[test]
    fn empty_name_yields_empty_fields() {
        assert_eq!(ActionName::parse(""), ActionName::default());
    }

    #[test]
    fn extra_segments_stay_in_the_last_part() {
        let name = ActionName::parse("a/b/c");
        assert_eq!(name.package, "a");
        assert_eq!(name.name, "b/c");
    }

    #[test]
    fn remaining_time_saturates_at_zero() {
        let env = ActionEnvironment::new("/ns/worker").with_deadline_ms(1_000);
        let now = Utc.timestamp_millis_opt(1_500).single().unwrap();
        assert_eq!(env.remaining(now), Some(Duration::ZERO));

        let earlier = Utc.timestamp_millis_opt(400).single().unwrap();
        assert_eq!(env.remaining(earlier), Some(Duration::from_millis(600)));
    }
}
