use crate::conditions::{ConditionReason, GatewayConditionType, HasConditions, new_condition};
use crate::controllers::gateway::{ParametersRefError, class_parameters_ref};
use crate::kubernetes::ResourceClient;
use crate::kubernetes::objects::{ObjectRef, ObjectRefError};
use crate::kubernetes::patch::merge_patch;
use crate::options::Options;
use gateway_api::apis::standard::gatewayclasses::GatewayClass;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::runtime::controller::Action;
use portico_api::v1alpha1::GatewayConfiguration;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{Span, debug, field, info, instrument, warn};
use typed_builder::TypedBuilder;

#[derive(Debug, Error)]
pub enum ClassReconcileError {
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    ObjectRef(#[from] ObjectRefError),
}

#[derive(TypedBuilder)]
pub struct ClassContext {
    options: Arc<Options>,
    gateway_classes: Arc<dyn ResourceClient<GatewayClass>>,
    configurations: Arc<dyn ResourceClient<GatewayConfiguration>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct ClassStatusView {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    conditions: Vec<Condition>,
}

impl HasConditions for ClassStatusView {
    fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.conditions
    }
}

async fn check_parameters(
    class: &GatewayClass,
    configurations: &dyn ResourceClient<GatewayConfiguration>,
) -> Result<Result<(), ParametersRefError>, kube::Error> {
    let key = match class_parameters_ref(class) {
        Ok(Some(key)) => key,
        Ok(None) => return Ok(Ok(())),
        Err(err) => return Ok(Err(err)),
    };

    match configurations.get(&key.namespace, &key.name).await? {
        Some(_) => Ok(Ok(())),
        None => Ok(Err(ParametersRefError::NotFound {
            namespace: key.namespace,
            name: key.name,
        })),
    }
}

/// Writes the Accepted condition of classes served by this controller.
#[instrument(skip_all, fields(gateway_class = field::Empty))]
pub async fn reconcile(
    class: Arc<GatewayClass>,
    ctx: Arc<ClassContext>,
) -> Result<Action, ClassReconcileError> {
    let class_ref = ObjectRef::for_object(class.as_ref())?;
    Span::current().record("gateway_class", field::display(&class_ref));

    if class.spec.controller_name != *ctx.options.controller_name() {
        debug!("Ignoring class of {}", class.spec.controller_name);
        return Ok(Action::await_change());
    }

    let before = match class.status.as_ref() {
        Some(status) => serde_json::from_value(serde_json::to_value(status)?)?,
        None => ClassStatusView::default(),
    };
    let mut status = before.clone();
    let generation = class.metadata.generation;

    let condition = match check_parameters(&class, ctx.configurations.as_ref()).await? {
        Ok(()) => new_condition(
            GatewayConditionType::Accepted,
            true,
            ConditionReason::Accepted,
            "GatewayClass is accepted",
            generation,
        ),
        Err(err) => {
            warn!("Rejecting {}: {}", class_ref, err);
            new_condition(
                GatewayConditionType::Accepted,
                false,
                ConditionReason::InvalidParameters,
                err.to_string(),
                generation,
            )
        }
    };
    status.set_condition(condition);

    if let Some(diff) = merge_patch(&serde_json::to_value(&before)?, &serde_json::to_value(&status)?)
    {
        ctx.gateway_classes
            .patch_status("", class_ref.name(), &json!({ "status": diff }))
            .await?;
        info!("Updated status of {}", class_ref);
    }

    Ok(Action::requeue(ctx.options.converged_requeue_interval()))
}

pub fn error_policy(
    class: Arc<GatewayClass>,
    error: &ClassReconcileError,
    ctx: Arc<ClassContext>,
) -> Action {
    warn!(
        "Reconcile of GatewayClass {} failed: {}",
        class.metadata.name.as_deref().unwrap_or_default(),
        error
    );
    Action::requeue(ctx.options.waiting_requeue_interval())
}
