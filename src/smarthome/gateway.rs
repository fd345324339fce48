use super::types::{
    CapabilityAction, CapabilityObject, DEVICE_TYPE, DeviceObject, ErrorCode, GatewayRequest,
    GatewayResponse, ON_OFF, QueryKind, RANGE, RangeInstance, RequestDevice, ResponsePayload,
    ToggleInstance,
};
use crate::receiver::{
    CHANNEL_MAX, CHANNEL_MIN, DeviceError, Receiver, VOLUME_MAX, VOLUME_MIN,
};
use serde_json::json;
use std::sync::Arc;

/// Static details shown to the user for the one device we expose
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    pub description: String,
    pub room: String,
}

/// Translates smart home discovery/query/action requests into receiver calls.
///
/// The receiver is optional: when nothing was found at startup, discovery
/// answers with an empty device list and everything else with NOT_FOUND.
pub struct CommandGateway {
    receiver: Option<Arc<Receiver>>,
    profile: DeviceProfile,
}

impl CommandGateway {
    pub fn new(receiver: Option<Receiver>, profile: DeviceProfile) -> Self {
        Self {
            receiver: receiver.map(Arc::new),
            profile,
        }
    }

    /// Never fails: a panic while handling the request comes back as an
    /// INTERNAL_ERROR envelope, device failures are mapped per operation.
    ///
    /// The work runs on its own task, so a caller that goes away (the
    /// client hung up and axum dropped the handler) doesn't cut a retry
    /// sequence or a cache fetch short.
    pub async fn process_request(
        self: &Arc<Self>,
        request: GatewayRequest,
        request_id: &str,
        user_id: &str,
        kind: QueryKind,
    ) -> GatewayResponse {
        tracing::debug!(
            "Processing {} request {} for user {}",
            kind,
            request_id,
            user_id
        );

        let task = tokio::spawn({
            let gateway = Arc::clone(self);
            let request_id = request_id.to_string();
            let user_id = user_id.to_string();
            async move {
                gateway
                    .dispatch(&request, &request_id, &user_id, kind)
                    .await
            }
        });

        match task.await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("{} request {} did not complete: {}", kind, request_id, e);
                GatewayResponse::error(
                    Some(request_id),
                    ErrorCode::InternalError,
                    "Internal server error",
                )
            }
        }
    }

    async fn dispatch(
        &self,
        request: &GatewayRequest,
        request_id: &str,
        user_id: &str,
        kind: QueryKind,
    ) -> GatewayResponse {
        match kind {
            QueryKind::Discovery => self.discovery(request_id, user_id),
            QueryKind::Query => self.query(request, request_id, user_id).await,
            QueryKind::Action => self.action(request, request_id, user_id).await,
        }
    }

    fn discovery(&self, request_id: &str, user_id: &str) -> GatewayResponse {
        tracing::info!("Handling device discovery for user {}", user_id);

        let devices = match &self.receiver {
            Some(receiver) => {
                let descriptor = receiver.descriptor();
                vec![DeviceObject {
                    id: descriptor.serial_number.clone(),
                    name: Some(descriptor.model.clone()),
                    description: Some(self.profile.description.clone()),
                    room: Some(self.profile.room.clone()),
                    device_type: Some(DEVICE_TYPE.to_string()),
                    capabilities: supported_capabilities(),
                }]
            }
            None => {
                tracing::warn!("Discovery requested but no receiver is connected");
                Vec::new()
            }
        };

        GatewayResponse::ok(
            request_id,
            ResponsePayload {
                user_id: user_id.to_string(),
                devices,
            },
        )
    }

    async fn query(&self, request: &GatewayRequest, request_id: &str, user_id: &str) -> GatewayResponse {
        tracing::info!("Handling device query for user {}", user_id);

        let Some(receiver) = &self.receiver else {
            return not_found(request_id);
        };
        let id = &receiver.descriptor().serial_number;

        let requested = request.devices();
        if !requested.is_empty() && !requested.iter().any(|d| &d.id == id) {
            tracing::warn!("Query for unknown device(s), known id is {}", id);
            return not_found(request_id);
        }

        let (power, volume, channel) = futures::join!(
            receiver.power(),
            receiver.volume(),
            receiver.current_channel()
        );

        let capabilities = vec![
            state_capability(ON_OFF, json!({"instance": "on", "value": power.is_on()})),
            state_capability(
                RANGE,
                json!({"instance": "channel", "value": channel.channel_number}),
            ),
            state_capability(RANGE, json!({"instance": "volume", "value": volume.state})),
        ];

        GatewayResponse::ok(
            request_id,
            ResponsePayload {
                user_id: user_id.to_string(),
                devices: vec![DeviceObject::with_capabilities(id, capabilities)],
            },
        )
    }

    async fn action(&self, request: &GatewayRequest, request_id: &str, user_id: &str) -> GatewayResponse {
        tracing::info!("Handling device action for user {}", user_id);

        let requested = request.devices();
        if requested.is_empty() {
            return GatewayResponse::error(
                Some(request_id),
                ErrorCode::InvalidValue,
                "No devices specified in action request",
            );
        }

        let Some(receiver) = &self.receiver else {
            return not_found(request_id);
        };
        let id = &receiver.descriptor().serial_number;

        let Some(device) = requested.iter().find(|d| &d.id == id) else {
            tracing::warn!("Action for unknown device(s), known id is {}", id);
            return not_found(request_id);
        };

        let (done, failed) = self.apply_actions(receiver, device).await;
        if failed > 0 {
            tracing::warn!(
                "{} of {} actions failed for request {}",
                failed,
                done.len() + failed,
                request_id
            );
            return GatewayResponse::error(
                Some(request_id),
                ErrorCode::InternalError,
                "Some actions failed to execute",
            );
        }

        let capabilities = done
            .iter()
            .map(|action| {
                state_capability(
                    action.capability_type(),
                    json!({
                        "instance": action.instance(),
                        "action_result": {"status": "DONE"},
                    }),
                )
            })
            .collect();

        GatewayResponse::ok(
            request_id,
            ResponsePayload {
                user_id: user_id.to_string(),
                devices: vec![DeviceObject::with_capabilities(id, capabilities)],
            },
        )
    }

    /// Runs the device's actions in request order. Earlier successes are not
    /// undone when a later one fails.
    async fn apply_actions(
        &self,
        receiver: &Receiver,
        device: &RequestDevice,
    ) -> (Vec<CapabilityAction>, usize) {
        let mut done = Vec::new();
        let mut failed = 0;

        for raw in device.capabilities.as_deref().unwrap_or_default() {
            let Some(action) = CapabilityAction::decode(raw) else {
                tracing::debug!("Skipping capability without type or state: {}", raw);
                continue;
            };

            match execute(receiver, &action).await {
                Ok(()) => done.push(action),
                Err(e) => {
                    tracing::warn!(
                        "Action {} / {} failed: {}",
                        action.capability_type(),
                        action.instance(),
                        e
                    );
                    failed += 1;
                }
            }
        }

        (done, failed)
    }
}

async fn execute(receiver: &Receiver, action: &CapabilityAction) -> Result<(), DeviceError> {
    match action {
        CapabilityAction::Power(on) => receiver.set_power(*on).await,
        CapabilityAction::Range {
            instance: RangeInstance::Volume,
            value,
        } => receiver.set_volume(*value).await,
        CapabilityAction::Range {
            instance: RangeInstance::Channel,
            value,
        } => receiver.change_channel(*value).await,
        CapabilityAction::Toggle { instance, value } => {
            tracing::debug!(
                "{} requested as {}, sending a key press",
                instance.as_str(),
                value
            );
            match instance {
                ToggleInstance::Mute => receiver.mute().await,
                ToggleInstance::Pause => receiver.pause().await,
            }
        }
        CapabilityAction::Unsupported {
            capability_type,
            instance,
        } => Err(DeviceError::Validation(format!(
            "Unsupported capability {} with instance '{}'",
            capability_type, instance
        ))),
    }
}

fn supported_capabilities() -> Vec<CapabilityObject> {
    vec![
        CapabilityObject {
            capability_type: ON_OFF.to_string(),
            retrievable: Some(true),
            parameters: None,
            state: None,
        },
        CapabilityObject {
            capability_type: RANGE.to_string(),
            retrievable: Some(true),
            parameters: Some(json!({
                "instance": "volume",
                "unit": "unit.percent",
                "range": {"min": VOLUME_MIN, "max": VOLUME_MAX, "precision": 1},
            })),
            state: None,
        },
        CapabilityObject {
            capability_type: RANGE.to_string(),
            retrievable: Some(true),
            parameters: Some(json!({
                "instance": "channel",
                "random_access": true,
                "range": {"min": CHANNEL_MIN, "max": CHANNEL_MAX, "precision": 1},
            })),
            state: None,
        },
    ]
}

fn state_capability(capability_type: &str, state: serde_json::Value) -> CapabilityObject {
    CapabilityObject {
        capability_type: capability_type.to_string(),
        retrievable: None,
        parameters: None,
        state: Some(state),
    }
}

fn not_found(request_id: &str) -> GatewayResponse {
    GatewayResponse::error(Some(request_id), ErrorCode::NotFound, "Device not found")
}
