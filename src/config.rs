//! Operator configuration read from the environment.

use std::time::Duration;

use tracing::warn;

/// Default delay before a pass that changed something is rerun.
pub const DEFAULT_REQUEUE_INTERVAL_SECS: u64 = 10;

/// Default port of the health and metrics server.
pub const DEFAULT_HEALTH_PORT: u16 = 8080;

/// Runtime configuration for the operator process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Namespace to watch; `None` watches the whole cluster.
    pub watch_namespace: Option<String>,
    /// Identity used for leader election and as event reporting instance.
    pub pod_name: Option<String>,
    /// Namespace holding the leader election lease.
    pub pod_namespace: Option<String>,
    /// Fixed retry delay for passes that mutated cluster state or failed transiently.
    pub requeue_interval: Duration,
    pub health_port: u16,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            pod_name: None,
            pod_namespace: None,
            requeue_interval: Duration::from_secs(DEFAULT_REQUEUE_INTERVAL_SECS),
            health_port: DEFAULT_HEALTH_PORT,
        }
    }
}

impl OperatorConfig {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let watch_namespace = non_empty("WATCH_NAMESPACE")
            .or_else(|| non_empty("OLM_TARGET_NAMESPACE"))
            .and_then(|raw| first_namespace(&raw));

        let requeue_interval = non_empty("REQUEUE_INTERVAL_SECS")
            .and_then(|raw| parse_or_warn::<u64>("REQUEUE_INTERVAL_SECS", &raw))
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.requeue_interval);

        let health_port = non_empty("HEALTH_PORT")
            .and_then(|raw| parse_or_warn::<u16>("HEALTH_PORT", &raw))
            .unwrap_or(defaults.health_port);

        Self {
            watch_namespace,
            pod_name: non_empty("POD_NAME"),
            pod_namespace: non_empty("POD_NAMESPACE"),
            requeue_interval,
            health_port,
        }
    }
}

fn parse_or_warn<T: std::str::FromStr>(key: &str, raw: &str) -> Option<T> {
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = raw, "Ignoring unparsable setting, using default");
            None
        }
    }
}

/// Multi-namespace lists are not supported; only the first entry is watched.
fn first_namespace(raw: &str) -> Option<String> {
    let mut entries = raw.split(',').map(str::trim).filter(|s| !s.is_empty());
    let first = entries.next()?.to_string();
    if entries.next().is_some() {
        warn!(
            namespaces = raw,
            watching = %first,
            "Multiple namespaces configured, watching only the first"
        );
    }
    Some(first)
}
