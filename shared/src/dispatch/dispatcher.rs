//! Command dispatcher fanning intents out to devices

use super::link::DeviceLink;
use crate::error::ExchangeError;
use crate::platform::{DeviceRef, ExecuteCommand, ExecuteRecord, Execution, QueryStates};
use crate::protocol::{DeviceMessage, DeviceReply, Intent};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, warn};

/// Failure of a whole batch (individual device failures never produce this)
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Device exchange task failed: {0}")]
    Aggregation(#[from] JoinError),
}

/// Settled exchange with one device of a batch
#[derive(Debug)]
pub struct DeviceOutcome {
    /// Position of the device in the batch
    pub index: usize,
    pub device_id: String,
    pub result: Result<DeviceReply, ExchangeError>,
}

/// Dispatches intents to batches of devices and aggregates their outcomes
pub struct CommandDispatcher {
    link: Arc<dyn DeviceLink>,
}

impl CommandDispatcher {
    /// Create a new command dispatcher over a device link
    pub fn new(link: Arc<dyn DeviceLink>) -> Self {
        Self { link }
    }

    pub fn link_name(&self) -> &'static str {
        self.link.name()
    }

    /// Exchange with every device of the batch concurrently
    ///
    /// Returns once every exchange has settled, in completion order. A failed
    /// device only affects its own outcome.
    pub async fn dispatch(
        &self,
        intent: Intent,
        devices: &[DeviceRef],
        execution: Option<&Execution>,
    ) -> Result<Vec<DeviceOutcome>, DispatchError> {
        let mut tasks = JoinSet::new();

        for (index, device) in devices.iter().enumerate() {
            let message = match execution {
                Some(execution) => DeviceMessage {
                    intent,
                    device_id: device.id.clone(),
                    command: Some(execution.command.clone()),
                    params: execution.params.clone(),
                },
                None => DeviceMessage {
                    intent,
                    device_id: device.id.clone(),
                    command: None,
                    params: None,
                },
            };

            let link = self.link.clone();
            tasks.spawn(async move {
                let device_id = message.device_id.clone();
                let result = link.exchange(message).await;
                DeviceOutcome {
                    index,
                    device_id,
                    result,
                }
            });
        }

        let mut outcomes = Vec::with_capacity(devices.len());
        while let Some(joined) = tasks.join_next().await {
            outcomes.push(joined?);
        }

        Ok(outcomes)
    }

    /// Query every device and map device id -> reported state
    ///
    /// Results are keyed by the id that was queried, not the `device_id` the
    /// reply claims. Devices that fail are logged and left out. When the same
    /// id is queried more than once, the reply that settles last wins.
    pub async fn query(&self, devices: &[DeviceRef]) -> Result<QueryStates, DispatchError> {
        let outcomes = self.dispatch(Intent::Query, devices, None).await?;
        let mut states = QueryStates::new();

        for outcome in outcomes {
            match outcome.result {
                Ok(reply) => {
                    debug!(device_id = %outcome.device_id, "QUERY succeeded");
                    states.insert(outcome.device_id, reply.states);
                }
                Err(e) => {
                    warn!(device_id = %outcome.device_id, error = %e, "QUERY failed for device");
                }
            }
        }

        Ok(states)
    }

    /// Run every execution step of every command and record one result per device and step
    ///
    /// Steps of a command run in order; within a step all devices run
    /// concurrently. Records follow step order, then device order.
    pub async fn execute(
        &self,
        commands: &[ExecuteCommand],
    ) -> Result<Vec<ExecuteRecord>, DispatchError> {
        let mut records = Vec::new();

        for command in commands {
            for execution in &command.execution {
                let mut outcomes = self
                    .dispatch(Intent::Execute, &command.devices, Some(execution))
                    .await?;
                outcomes.sort_by_key(|outcome| outcome.index);

                for outcome in outcomes {
                    let record = match outcome.result {
                        Ok(reply) => {
                            debug!(
                                device_id = %outcome.device_id,
                                command = %execution.command,
                                "EXECUTE succeeded"
                            );
                            ExecuteRecord::success(outcome.device_id, reply.states)
                        }
                        Err(e) => {
                            warn!(
                                device_id = %outcome.device_id,
                                command = %execution.command,
                                error = %e,
                                "EXECUTE failed for device"
                            );
                            ExecuteRecord::error(outcome.device_id, e.error_code())
                        }
                    };
                    records.push(record);
                }
            }
        }

        Ok(records)
    }
}
