//! External collaborator contracts (spec §6): the Channel Operator (per broker) and
//! the Node Operator (orchestrator), invoked by the reactor pipeline. These are
//! interfaces the core *consumes*; wiring them to real Kafka clients or a Kubernetes
//! client lives outside the core. Grounded in `operators/channel.go`'s broker-dispatch
//! pattern and `operators/nodes/node_operator.go`.

use crate::error::InsprError;
use crate::meta::{App, Channel};
use std::collections::BTreeMap;

/// One broker's side of channel provisioning (topic creation, ACLs, etc — opaque to
/// the core).
pub trait ChannelOperator: Send + Sync {
    fn create(&self, scope: &str, channel: &Channel) -> Result<(), InsprError>;
    fn update(&self, scope: &str, channel: &Channel) -> Result<(), InsprError>;
    fn delete(&self, scope: &str, name: &str) -> Result<(), InsprError>;
}

/// The orchestrator's side of workload provisioning.
pub trait NodeOperator: Send + Sync {
    fn create_node(&self, scope: &str, app: &App) -> Result<(), InsprError>;
    fn update_node(&self, scope: &str, app: &App) -> Result<(), InsprError>;
    fn delete_node(&self, scope: &str, name: &str) -> Result<(), InsprError>;
}

/// Dispatches to the broker-specific operator named by `channel.spec.selectedBroker`,
/// mirroring the original's `GenOp` broker-dispatch table.
#[derive(Default)]
pub struct ChannelOperators {
    by_broker: BTreeMap<String, Box<dyn ChannelOperator>>,
}

impl ChannelOperators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, broker: impl Into<String>, operator: Box<dyn ChannelOperator>) {
        self.by_broker.insert(broker.into(), operator);
    }

    pub fn for_broker(&self, broker: &str) -> Result<&dyn ChannelOperator, InsprError> {
        self.by_broker
            .get(broker)
            .map(|op| op.as_ref())
            .ok_or_else(|| InsprError::internal_server(format!("no operator registered for broker '{broker}'")))
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Records every call it receives; used by reactor tests to assert ordering and
    /// call counts without touching a real broker or orchestrator.
    #[derive(Default)]
    pub struct RecordingChannelOperator {
        pub calls: Mutex<Vec<String>>,
    }

    impl ChannelOperator for RecordingChannelOperator {
        fn create(&self, scope: &str, channel: &Channel) -> Result<(), InsprError> {
            self.calls.lock().unwrap().push(format!("create:{scope}.{}", channel.meta.name));
            Ok(())
        }
        fn update(&self, scope: &str, channel: &Channel) -> Result<(), InsprError> {
            self.calls.lock().unwrap().push(format!("update:{scope}.{}", channel.meta.name));
            Ok(())
        }
        fn delete(&self, scope: &str, name: &str) -> Result<(), InsprError> {
            self.calls.lock().unwrap().push(format!("delete:{scope}.{name}"));
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct RecordingNodeOperator {
        pub calls: Mutex<Vec<String>>,
    }

    impl NodeOperator for RecordingNodeOperator {
        fn create_node(&self, scope: &str, app: &App) -> Result<(), InsprError> {
            self.calls.lock().unwrap().push(format!("create_node:{scope}.{}", app.meta.name));
            Ok(())
        }
        fn update_node(&self, scope: &str, app: &App) -> Result<(), InsprError> {
            self.calls.lock().unwrap().push(format!("update_node:{scope}.{}", app.meta.name));
            Ok(())
        }
        fn delete_node(&self, scope: &str, name: &str) -> Result<(), InsprError> {
            self.calls.lock().unwrap().push(format!("delete_node:{scope}.{name}"));
            Ok(())
        }
    }
}
