//! Broker memory (spec §4.H): registry of installed brokers, default selection, and
//! broker-specific (opaque) configuration. Grounded in `dapp_utils.go`'s
//! `SelectBrokerFromPriorityList` for the resolution rule, and in the teacher's
//! `DbBroker` for the "explicit construction, Mutex-guarded" shape of a shared
//! registry — but per spec §9's redesign flag this is constructed explicitly by the
//! embedder and passed by reference, never a process-wide singleton.

use crate::error::InsprError;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// The closed set of broker kinds the core knows how to dispatch to. Mirrors the
/// original's `brokers.BrokerStatus` enum, which names `Kafka` as its only concrete
/// `BrokerConfiguration` — an unrecognized name is rejected at `create` rather than
/// accepted and left to fail later at reaction time.
const SUPPORTED_BROKERS: &[&str] = &["kafka"];

/// The view entity managers consume when resolving a channel's broker: which brokers
/// are installed, and which one is the fallback.
#[derive(Debug, Clone, Default)]
pub struct BrokersConfig {
    pub available: Vec<String>,
    pub default: String,
}

/// Picks the first broker in `priority_list` that is installed, falling back to the
/// configured default. Named after the original's `SelectBrokerFromPriorityList` for
/// continuity with the reference implementation.
pub fn select_broker_from_priority_list(
    priority_list: &[String],
    brokers: &BrokersConfig,
) -> Result<String, InsprError> {
    if brokers.available.is_empty() {
        return Err(InsprError::internal_server(
            "there are no brokers installed",
        ));
    }
    for candidate in priority_list {
        if brokers.available.iter().any(|b| b == candidate) {
            return Ok(candidate.clone());
        }
    }
    Ok(brokers.default.clone())
}

/// Registry mapping broker name to opaque, broker-specific configuration, plus a
/// default. Two separate mutexes (one per field) so that reading `default` never
/// blocks on a long-held `configs` lock, matching spec §4.H's "guarded by two
/// mutexes" instruction.
pub struct BrokerMemory {
    configs: Mutex<BTreeMap<String, serde_json::Value>>,
    default: Mutex<Option<String>>,
}

impl BrokerMemory {
    pub fn new() -> Self {
        BrokerMemory {
            configs: Mutex::new(BTreeMap::new()),
            default: Mutex::new(None),
        }
    }

    pub fn get(&self) -> BrokersConfig {
        let configs = self.configs.lock().unwrap();
        let default = self.default.lock().unwrap();
        BrokersConfig {
            available: configs.keys().cloned().collect(),
            default: default.clone().unwrap_or_default(),
        }
    }

    pub fn create(&self, name: &str, config: serde_json::Value) -> Result<(), InsprError> {
        if !SUPPORTED_BROKERS.contains(&name) {
            return Err(InsprError::bad_request(format!(
                "broker '{name}' is not a supported broker kind"
            )));
        }
        let mut configs = self.configs.lock().unwrap();
        if configs.contains_key(name) {
            return Err(InsprError::already_exists(format!(
                "broker '{name}' is already installed"
            )));
        }
        configs.insert(name.to_string(), config);
        Ok(())
    }

    pub fn set_default(&self, name: &str) -> Result<(), InsprError> {
        let configs = self.configs.lock().unwrap();
        if !configs.contains_key(name) {
            return Err(InsprError::not_found(format!(
                "broker '{name}' is not installed"
            )));
        }
        *self.default.lock().unwrap() = Some(name.to_string());
        Ok(())
    }

    pub fn configs(&self, name: &str) -> Result<serde_json::Value, InsprError> {
        self.configs
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| InsprError::not_found(format!("broker '{name}' is not installed")))
    }
}

impl Default for BrokerMemory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_first_available_priority_member() {
        let brokers = BrokersConfig {
            available: vec!["kafka".into(), "sqs".into()],
            default: "kafka".into(),
        };
        let picked = select_broker_from_priority_list(&["sqs".into()], &brokers).unwrap();
        assert_eq!(picked, "sqs");
    }

    #[test]
    fn falls_back_to_default_when_no_priority_member_available() {
        let brokers = BrokersConfig {
            available: vec!["kafka".into()],
            default: "kafka".into(),
        };
        let picked = select_broker_from_priority_list(&["sqs".into()], &brokers).unwrap();
        assert_eq!(picked, "kafka");
    }

    #[test]
    fn fails_when_no_brokers_installed() {
        let brokers = BrokersConfig::default();
        assert!(select_broker_from_priority_list(&[], &brokers).is_err());
    }

    #[test]
    fn registry_rejects_unsupported_broker_name_on_create() {
        let mem = BrokerMemory::new();
        let err = mem.create("brk1", serde_json::json!({})).unwrap_err();
        assert!(err.has_kind(crate::error::BAD_REQUEST));
        assert!(mem.get().available.is_empty());
    }

    #[test]
    fn registry_rejects_duplicate_install_and_unknown_default() {
        let mem = BrokerMemory::new();
        mem.create("kafka", serde_json::json!({"endpoint": "k:9092"})).unwrap();
        assert!(mem.create("kafka", serde_json::json!({})).is_err());
        assert!(mem.set_default("sqs").is_err());
        mem.set_default("kafka").unwrap();
        assert_eq!(mem.get().default, "kafka");
    }
}
