mod class;
mod configuration;
mod converge;
mod deletion;
mod desired;
mod listeners;
mod network_policy;
mod owned;
mod status;

pub use self::class::{GatewayClassError, resolve_gateway_class};
pub use self::configuration::{ParametersRefError, class_parameters_ref};

use self::configuration::{ResolveConfigurationError, resolve_configuration};
use self::converge::{Convergence, OwnedKind, converge};
use self::deletion::{GATEWAY_FINALIZERS, finalize, patch_finalizers};
use self::desired::{desired_control_plane, desired_data_plane};
use self::listeners::listeners_of;
use self::network_policy::desired_network_policy;
use self::status::{
    GatewayStatusView, certificate_ref_issues, project_accepted, project_listeners,
    service_addresses,
};
use crate::conditions::{ConditionReason, GatewayConditionType, HasConditions, is_ready, new_condition};
use crate::instrumentation::record_reconcile;
use crate::kubernetes::ResourceClient;
use crate::kubernetes::objects::{ObjectRef, ObjectRefError};
use crate::options::Options;
use dashmap::DashMap;
use gateway_api::apis::standard::gatewayclasses::GatewayClass;
use gateway_api::apis::standard::gateways::Gateway;
use gateway_api::apis::standard::referencegrants::ReferenceGrant;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::NetworkPolicy;
use kube::{Resource, ResourceExt};
use kube::api::ListParams;
use kube::runtime::controller::Action;
use portico_api::constants::{DATA_PLANE_LABEL, SERVICE_ROLE_INGRESS, SERVICE_ROLE_LABEL};
use portico_api::v1alpha1::{ControlPlane, DataPlane, GatewayConfiguration};
use std::sync::Arc;
use thiserror::Error;
use tracing::{Span, debug, field, info, instrument, warn};
use typed_builder::TypedBuilder;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    ObjectRef(#[from] ObjectRefError),
    #[error("{0} has no uid")]
    MissingUid(ObjectRef),
    #[error("{0} was returned by the API server without a name")]
    Unnamed(String),
    #[error(transparent)]
    GatewayClass(#[from] GatewayClassError),
}

/// Everything the Gateway reconciler reads and writes.
#[derive(TypedBuilder)]
pub struct Context {
    options: Arc<Options>,
    gateways: Arc<dyn ResourceClient<Gateway>>,
    gateway_classes: Arc<dyn ResourceClient<GatewayClass>>,
    configurations: Arc<dyn ResourceClient<GatewayConfiguration>>,
    reference_grants: Arc<dyn ResourceClient<ReferenceGrant>>,
    data_planes: Arc<dyn ResourceClient<DataPlane>>,
    control_planes: Arc<dyn ResourceClient<ControlPlane>>,
    network_policies: Arc<dyn ResourceClient<NetworkPolicy>>,
    services: Arc<dyn ResourceClient<Service>>,
    #[builder(default)]
    backoff: DashMap<ObjectRef, u32>,
}

impl Context {
    /// Drops the retry state of a Gateway that no longer exists.
    pub fn forget(&self, gateway: &Gateway) {
        if let Ok(gateway_ref) = ObjectRef::for_object(gateway) {
            if self.backoff.remove(&gateway_ref).is_some() {
                debug!("Cleared retry state of {}", gateway_ref);
            }
        }
    }
}

/// One pass over the status, remembering what it looked like when read.
struct StatusPass<'a> {
    ctx: &'a Context,
    gateway: &'a Gateway,
    generation: Option<i64>,
    before: GatewayStatusView,
    status: GatewayStatusView,
}

impl<'a> StatusPass<'a> {
    fn new(ctx: &'a Context, gateway: &'a Gateway) -> Result<Self, ReconcileError> {
        let before = GatewayStatusView::of(gateway)?;
        Ok(Self {
            ctx,
            gateway,
            generation: gateway.metadata.generation,
            status: before.clone(),
            before,
        })
    }

    fn set(
        &mut self,
        type_: GatewayConditionType,
        ready: bool,
        reason: ConditionReason,
        message: impl Into<String>,
    ) {
        self.status
            .set_condition(new_condition(type_, ready, reason, message, self.generation));
    }

    fn block(
        &mut self,
        type_: GatewayConditionType,
        reason: ConditionReason,
        message: impl Into<String>,
    ) {
        self.status.block(type_, reason, message, self.generation);
    }

    /// Writes the status when it differs from what was read and returns `action`.
    async fn finish(self, action: Action) -> Result<Action, ReconcileError> {
        let Some(patch) = self.status.patch_from(&self.before)? else {
            return Ok(action);
        };
        let gateway_ref = ObjectRef::for_object(self.gateway)?;
        let namespace = gateway_ref.namespace().clone().unwrap_or_default();
        self.ctx
            .gateways
            .patch_status(&namespace, gateway_ref.name(), &patch)
            .await?;
        debug!("Patched status of {}", gateway_ref);
        Ok(action)
    }
}

fn object_name<K: Resource<DynamicType = ()>>(object: &K) -> Result<String, ReconcileError> {
    object
        .meta()
        .name
        .clone()
        .ok_or_else(|| ReconcileError::Unnamed(K::kind(&()).to_string()))
}

async fn ensure_finalizers(ctx: &Context, gateway: &Gateway) -> Result<Gateway, ReconcileError> {
    let finalizers = gateway.finalizers();
    let missing: Vec<_> = GATEWAY_FINALIZERS
        .iter()
        .filter(|f| !finalizers.iter().any(|existing| existing == **f))
        .collect();
    if missing.is_empty() {
        return Ok(gateway.clone());
    }

    let mut updated = finalizers.to_vec();
    updated.extend(missing.into_iter().map(|f| f.to_string()));
    let patched = patch_finalizers(ctx.gateways.as_ref(), gateway, updated).await?;
    debug!("Added cleanup finalizers");
    Ok(patched)
}

/// Result of converging one child kind, as seen by the Gateway status.
enum Child<K> {
    Ready(K),
    Blocked(Action),
}

async fn provision<K>(
    pass: &mut StatusPass<'_>,
    client: &dyn ResourceClient<K>,
    desired: &K::Spec,
    condition: GatewayConditionType,
) -> Result<Child<K>, ReconcileError>
where
    K: OwnedKind + HasConditions,
{
    let kind = K::kind(&());
    let options = Arc::clone(&pass.ctx.options);
    let waiting = Action::requeue(options.waiting_requeue_interval());

    let child = match converge(client, pass.gateway, desired).await? {
        Convergence::Created(child) => {
            let name = object_name(&child)?;
            pass.block(condition, ConditionReason::Provisioning, format!("{kind} {name} created"));
            return Ok(Child::Blocked(waiting));
        }
        Convergence::Updated(child) => {
            let name = object_name(&child)?;
            pass.block(condition, ConditionReason::Updated, format!("{kind} {name} updated"));
            return Ok(Child::Blocked(waiting));
        }
        Convergence::Duplicates(count) => {
            warn!("Found {} {} objects owned by the Gateway", count, kind);
            pass.block(
                condition,
                ConditionReason::UnableToProvision,
                format!("found {count} {kind} objects for the Gateway, expected exactly one"),
            );
            return Ok(Child::Blocked(Action::requeue(
                options.converged_requeue_interval(),
            )));
        }
        Convergence::Unchanged(child) => child,
    };

    let name = object_name(&child)?;
    if !is_ready(&child) {
        pass.block(
            condition,
            ConditionReason::WaitingToBecomeReady,
            format!("{kind} {name} is not ready yet"),
        );
        return Ok(Child::Blocked(waiting));
    }

    pass.set(condition, true, ConditionReason::Ready, format!("{kind} {name} is ready"));
    Ok(Child::Ready(child))
}

async fn provision_network_policy(
    pass: &mut StatusPass<'_>,
    data_plane: &str,
    control_plane: &str,
) -> Result<Option<Action>, ReconcileError> {
    let options = Arc::clone(&pass.ctx.options);
    let desired = desired_network_policy(data_plane, control_plane)?;
    let client = Arc::clone(&pass.ctx.network_policies);

    match converge(client.as_ref(), pass.gateway, &desired).await? {
        Convergence::Unchanged(_) => Ok(None),
        Convergence::Created(_) | Convergence::Updated(_) => {
            pass.block(
                GatewayConditionType::Programmed,
                ConditionReason::Pending,
                "NetworkPolicy is being applied",
            );
            Ok(Some(Action::requeue(options.waiting_requeue_interval())))
        }
        Convergence::Duplicates(count) => {
            pass.block(
                GatewayConditionType::Programmed,
                ConditionReason::UnableToProvision,
                format!(
                    "found {count} {} objects for the Gateway, expected exactly one",
                    NetworkPolicy::kind(&())
                ),
            );
            Ok(Some(Action::requeue(options.converged_requeue_interval())))
        }
    }
}

async fn reconcile_gateway(gateway: &Gateway, ctx: &Context) -> Result<Action, ReconcileError> {
    if gateway.metadata.deletion_timestamp.is_some() {
        return finalize(gateway, ctx).await;
    }

    let class = match resolve_gateway_class(
        ctx.gateway_classes.as_ref(),
        ctx.options.controller_name(),
        &gateway.spec.gateway_class_name,
    )
    .await
    {
        Ok(class) => class,
        Err(err) if err.is_retryable() => return Err(err.into()),
        Err(err) => {
            debug!("Skipping Gateway: {}", err);
            return Ok(Action::await_change());
        }
    };

    let gateway = ensure_finalizers(ctx, gateway).await?;
    let namespace = gateway.namespace().unwrap_or_default();
    let converged = Action::requeue(ctx.options.converged_requeue_interval());
    let waiting = Action::requeue(ctx.options.waiting_requeue_interval());
    let mut pass = StatusPass::new(ctx, &gateway)?;

    let configuration = match resolve_configuration(
        ctx.configurations.as_ref(),
        ctx.reference_grants.as_ref(),
        &gateway,
        &class,
    )
    .await
    {
        Ok(configuration) => configuration,
        Err(ResolveConfigurationError::Invalid(err)) => {
            warn!("Invalid parameters: {}", err);
            pass.block(
                GatewayConditionType::Accepted,
                ConditionReason::InvalidParameters,
                err.to_string(),
            );
            return pass.finish(converged).await;
        }
        Err(ResolveConfigurationError::Api(err)) => return Err(err.into()),
    };

    let listeners = listeners_of(&gateway);
    let cert_issues =
        certificate_ref_issues(ctx.reference_grants.as_ref(), &namespace, &listeners).await?;
    pass.status.listeners =
        project_listeners(&listeners, &cert_issues, &pass.before.listeners, pass.generation);
    if !project_accepted(&mut pass.status, pass.generation) {
        pass.status.hold(GatewayConditionType::Accepted, pass.generation);
        return pass.finish(converged).await;
    }

    let overrides = configuration.as_ref().map(|c| &c.spec);
    let desired = desired_data_plane(
        overrides.and_then(|spec| spec.data_plane_options.as_ref()),
        &listeners,
    );
    for err in &desired.port_errors {
        debug!("Skipping listener port: {}", err);
    }

    let data_plane = match provision(
        &mut pass,
        ctx.data_planes.as_ref(),
        &desired.options,
        GatewayConditionType::DataPlaneReady,
    )
    .await?
    {
        Child::Ready(data_plane) => data_plane,
        Child::Blocked(action) => return pass.finish(action).await,
    };
    let data_plane_name = object_name(&data_plane)?;

    let desired = desired_control_plane(
        overrides.and_then(|spec| spec.control_plane_options.as_ref()),
        &data_plane_name,
    );
    let control_plane = match provision(
        &mut pass,
        ctx.control_planes.as_ref(),
        &desired,
        GatewayConditionType::ControlPlaneReady,
    )
    .await?
    {
        Child::Ready(control_plane) => control_plane,
        Child::Blocked(action) => return pass.finish(action).await,
    };
    let control_plane_name = object_name(&control_plane)?;

    if let Some(action) =
        provision_network_policy(&mut pass, &data_plane_name, &control_plane_name).await?
    {
        return pass.finish(action).await;
    }

    let selector = format!(
        "{DATA_PLANE_LABEL}={data_plane_name},{SERVICE_ROLE_LABEL}={SERVICE_ROLE_INGRESS}"
    );
    let services = ctx
        .services
        .list(&namespace, &ListParams::default().labels(&selector))
        .await?;
    let [service] = services.as_slice() else {
        pass.block(
            GatewayConditionType::GatewayServiceReady,
            ConditionReason::Pending,
            format!(
                "expected one ingress Service for DataPlane {data_plane_name}, found {}",
                services.len()
            ),
        );
        return pass.finish(waiting).await;
    };

    let addresses = service_addresses(service);
    if addresses.is_empty() {
        pass.block(
            GatewayConditionType::GatewayServiceReady,
            ConditionReason::AddressNotAssigned,
            format!("ingress Service {} has no address yet", service.name_any()),
        );
        return pass.finish(waiting).await;
    }

    pass.status.addresses = addresses;
    pass.set(
        GatewayConditionType::GatewayServiceReady,
        true,
        ConditionReason::Ready,
        format!("ingress Service {} has an address", service.name_any()),
    );
    pass.set(
        GatewayConditionType::Programmed,
        true,
        ConditionReason::Programmed,
        "Gateway is programmed",
    );
    pass.set(
        GatewayConditionType::Ready,
        true,
        ConditionReason::Ready,
        "Gateway is ready",
    );
    pass.finish(converged).await
}

#[instrument(skip_all, fields(gateway = field::Empty))]
pub async fn reconcile(gateway: Arc<Gateway>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let gateway_ref = ObjectRef::for_object(gateway.as_ref())?;
    Span::current().record("gateway", field::display(&gateway_ref));

    let result = reconcile_gateway(&gateway, &ctx).await;
    match &result {
        Ok(action) => {
            ctx.backoff.remove(&gateway_ref);
            record_reconcile("success");
            debug!("Reconciled, next: {:?}", action);
        }
        Err(err) => {
            record_reconcile("error");
            info!("Reconcile failed: {}", err);
        }
    }
    result
}

/// Requeues a failed Gateway with exponential backoff per Gateway.
pub fn error_policy(gateway: Arc<Gateway>, error: &ReconcileError, ctx: Arc<Context>) -> Action {
    let Ok(gateway_ref) = ObjectRef::for_object(gateway.as_ref()) else {
        return Action::requeue(ctx.options.error_backoff(0));
    };

    let releasing = gateway.metadata.deletion_timestamp.is_some()
        && !gateway
            .finalizers()
            .iter()
            .any(|f| GATEWAY_FINALIZERS.contains(&f.as_str()));
    if releasing {
        ctx.forget(&gateway);
        warn!("Reconcile of deleted {} failed: {}", gateway_ref, error);
        return Action::requeue(ctx.options.error_backoff(0));
    }

    let mut attempts = ctx.backoff.entry(gateway_ref.clone()).or_insert(0);
    let delay = ctx.options.error_backoff(*attempts);
    *attempts = attempts.saturating_add(1);
    drop(attempts);

    warn!("Reconcile of {} failed, retrying in {:?}: {}", gateway_ref, delay, error);
    Action::requeue(delay)
}
