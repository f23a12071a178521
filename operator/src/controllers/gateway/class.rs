use crate::conditions::{ConditionReason, ConditionStatus, GatewayConditionType, HasConditions};
use crate::kubernetes::ResourceClient;
use gateway_api::apis::standard::gatewayclasses::GatewayClass;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum GatewayClassError {
    #[error("Gateway does not name a GatewayClass")]
    EmptyName,
    #[error("GatewayClass {0} not found")]
    NotFound(String),
    #[error("GatewayClass {class} is handled by {controller_name}")]
    ControllerMismatch {
        class: String,
        controller_name: String,
    },
    #[error("GatewayClass {0} is not accepted")]
    NotAccepted(String),
    #[error("Failed to get GatewayClass: {0}")]
    Api(#[from] kube::Error),
}

impl GatewayClassError {
    /// A missing class may be eventual-consistency lag; the other
    /// classifications need a change to the class before retrying helps.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Api(_))
    }
}

/// Fetches the named class and checks it is served by `controller_name` and accepted.
pub async fn resolve_gateway_class(
    client: &dyn ResourceClient<GatewayClass>,
    controller_name: &str,
    class_name: &str,
) -> Result<GatewayClass, GatewayClassError> {
    if class_name.is_empty() {
        return Err(GatewayClassError::EmptyName);
    }

    let class = client
        .get("", class_name)
        .await?
        .ok_or_else(|| GatewayClassError::NotFound(class_name.to_string()))?;

    if class.spec.controller_name != controller_name {
        debug!(
            "GatewayClass {} belongs to {}, not {}",
            class_name, class.spec.controller_name, controller_name
        );
        return Err(GatewayClassError::ControllerMismatch {
            class: class_name.to_string(),
            controller_name: class.spec.controller_name.clone(),
        });
    }

    if !is_accepted(&class) {
        return Err(GatewayClassError::NotAccepted(class_name.to_string()));
    }

    Ok(class)
}

fn is_accepted(class: &GatewayClass) -> bool {
    let conditions = class
        .status
        .as_ref()
        .and_then(|s| s.conditions.clone())
        .unwrap_or_default();

    conditions
        .condition(GatewayConditionType::Accepted.as_ref())
        .is_some_and(|c| {
            c.status == ConditionStatus::True.as_ref()
                && c.reason == ConditionReason::Accepted.as_ref()
                && c.observed_generation == class.metadata.generation
        })
}
