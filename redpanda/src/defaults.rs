//! Client defaults for table consumers.
//!
//! A table always reads its topic from the start with a fresh consumer group,
//! so the defaults pick a unique group id and never commit offsets.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Consumers created by this process, so ids stay unique within one clock tick.
static GROUP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Environment variable naming the bootstrap servers.
pub const BOOTSTRAP_SERVERS_ENV: &str = "BOOTSTRAP_SERVERS";

/// Bootstrap servers used when [`BOOTSTRAP_SERVERS_ENV`] is unset.
pub const DEFAULT_BOOTSTRAP_SERVERS: &str = "localhost:9092";

/// Client name used as the group id prefix when none is given.
pub const DEFAULT_CLIENT_NAME: &str = "eventsource-table";

/// Default client properties, reading the environment and the clock.
///
/// Every call yields a distinct `group.id`. Two tables sharing a group would
/// split the topic's partitions and each catch up on only part of it.
#[must_use]
pub fn client_defaults(client_name: &str) -> BTreeMap<String, String> {
    defaults_with(
        std::env::var(BOOTSTRAP_SERVERS_ENV).ok(),
        client_name,
        &unique_group_suffix(),
    )
}

/// `<unix micros>.<pid>.<sequence>`, unique per consumer.
fn unique_group_suffix() -> String {
    let sequence = GROUP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!(
        "{}.{}.{sequence}",
        chrono::Utc::now().timestamp_micros(),
        std::process::id()
    )
}

/// Default client properties from explicit inputs.
///
/// The generated `group.id` is `client_name` followed by `group_suffix`.
#[must_use]
pub fn defaults_with(
    bootstrap_servers: Option<String>,
    client_name: &str,
    group_suffix: &str,
) -> BTreeMap<String, String> {
    let bootstrap = bootstrap_servers
        .filter(|servers| !servers.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_BOOTSTRAP_SERVERS.to_string());

    [
        ("bootstrap.servers", bootstrap),
        ("group.id", format!("{client_name}{group_suffix}")),
        ("client.id", client_name.to_string()),
        ("enable.auto.commit", "false".to_string()),
        ("auto.offset.reset", "earliest".to_string()),
        ("enable.partition.eof", "false".to_string()),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value))
    .collect()
}

/// Overlay `overrides` on `defaults`.
#[must_use]
pub fn merge(
    mut defaults: BTreeMap<String, String>,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    defaults.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    defaults
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_read_from_start_with_a_fresh_group() {
        let defaults = defaults_with(None, "alarms", "1700000000");
        assert_eq!(defaults["bootstrap.servers"], "localhost:9092");
        assert_eq!(defaults["group.id"], "alarms1700000000");
        assert_eq!(defaults["enable.auto.commit"], "false");
        assert_eq!(defaults["auto.offset.reset"], "earliest");
        assert_eq!(defaults["enable.partition.eof"], "false");
    }

    #[test]
    fn environment_servers_win_unless_blank() {
        let defaults = defaults_with(Some("broker:19092".to_string()), "t", "0");
        assert_eq!(defaults["bootstrap.servers"], "broker:19092");

        let blank = defaults_with(Some("  ".to_string()), "t", "0");
        assert_eq!(blank["bootstrap.servers"], DEFAULT_BOOTSTRAP_SERVERS);
    }

    #[test]
    fn overrides_replace_defaults() {
        let overrides = BTreeMap::from([
            ("group.id".to_string(), "fixed".to_string()),
            ("security.protocol".to_string(), "SSL".to_string()),
        ]);
        let merged = merge(defaults_with(None, "t", "0"), &overrides);
        assert_eq!(merged["group.id"], "fixed");
        assert_eq!(merged["security.protocol"], "SSL");
        assert_eq!(merged["auto.offset.reset"], "earliest");
    }

    #[test]
    fn back_to_back_consumers_get_distinct_groups() {
        let first = client_defaults(DEFAULT_CLIENT_NAME);
        let second = client_defaults(DEFAULT_CLIENT_NAME);
        assert!(first["group.id"].starts_with(DEFAULT_CLIENT_NAME));
        assert_ne!(first["group.id"], second["group.id"]);
    }
}
