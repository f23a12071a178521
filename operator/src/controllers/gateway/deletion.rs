use super::owned::list_owned;
use super::{Context, ReconcileError};
use crate::instrumentation::record_owned_write;
use crate::kubernetes::ResourceClient;
use crate::kubernetes::objects::ObjectRef;
use gateway_api::apis::standard::gateways::Gateway;
use k8s_openapi::chrono::Utc;
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use portico_api::constants::{
    CLEANUP_CONTROL_PLANES_FINALIZER, CLEANUP_DATA_PLANES_FINALIZER,
    CLEANUP_NETWORK_POLICIES_FINALIZER,
};
use serde_json::json;
use tracing::{debug, info};

pub const GATEWAY_FINALIZERS: [&str; 3] = [
    CLEANUP_DATA_PLANES_FINALIZER,
    CLEANUP_CONTROL_PLANES_FINALIZER,
    CLEANUP_NETWORK_POLICIES_FINALIZER,
];

enum Teardown {
    /// Children of this kind still exist.
    Pending,
    /// The finalizer was removed; the Gateway must be observed again.
    FinalizerRemoved,
    /// Nothing left to do for this kind.
    Done,
}

/// Patches the finalizer list, guarded by the resourceVersion it was read at.
pub async fn patch_finalizers(
    client: &dyn ResourceClient<Gateway>,
    gateway: &Gateway,
    finalizers: Vec<String>,
) -> Result<Gateway, ReconcileError> {
    let gateway_ref = ObjectRef::for_object(gateway)?;
    let patch = json!({
        "metadata": {
            "finalizers": finalizers,
            "resourceVersion": gateway.metadata.resource_version,
        }
    });
    let namespace = gateway_ref.namespace().clone().unwrap_or_default();
    Ok(client.patch(&namespace, gateway_ref.name(), &patch).await?)
}

async fn teardown<K>(
    client: &dyn ResourceClient<K>,
    gateways: &dyn ResourceClient<Gateway>,
    gateway: &Gateway,
    finalizer: &str,
) -> Result<Teardown, ReconcileError>
where
    K: Resource<DynamicType = ()> + Send + Sync + 'static,
{
    let children = list_owned(client, gateway).await?;

    if !children.is_empty() {
        for child in children
            .iter()
            .filter(|child| child.meta().deletion_timestamp.is_none())
        {
            let child_ref = ObjectRef::for_object(child)?;
            let namespace = child_ref.namespace().clone().unwrap_or_default();
            client.delete(&namespace, child_ref.name()).await?;
            record_owned_write(child_ref.kind(), "delete");
            info!("Deleted {}", child_ref);
        }
        return Ok(Teardown::Pending);
    }

    if !gateway.finalizers().iter().any(|f| f == finalizer) {
        return Ok(Teardown::Done);
    }

    let remaining = gateway
        .finalizers()
        .iter()
        .filter(|f| *f != finalizer)
        .cloned()
        .collect();
    patch_finalizers(gateways, gateway, remaining).await?;
    debug!("Removed finalizer {}", finalizer);
    Ok(Teardown::FinalizerRemoved)
}

/// Tears down the children of a deleted Gateway: DataPlanes, then
/// ControlPlanes, then NetworkPolicies. Each kind is released by removing its
/// own finalizer in a separate write once none of its objects are left.
pub async fn finalize(gateway: &Gateway, ctx: &Context) -> Result<Action, ReconcileError> {
    let Some(deletion_timestamp) = gateway.metadata.deletion_timestamp.as_ref() else {
        return Ok(Action::await_change());
    };

    if !gateway
        .finalizers()
        .iter()
        .any(|f| GATEWAY_FINALIZERS.contains(&f.as_str()))
    {
        return Ok(Action::await_change());
    }

    let now = Utc::now();
    if deletion_timestamp.0 > now {
        let remaining = (deletion_timestamp.0 - now).to_std().unwrap_or_default();
        debug!("Deletion is scheduled in {:?}", remaining);
        return Ok(Action::requeue(remaining));
    }

    let data_planes = teardown(
        ctx.data_planes.as_ref(),
        ctx.gateways.as_ref(),
        gateway,
        CLEANUP_DATA_PLANES_FINALIZER,
    )
    .await?;
    if let Some(action) = step_action(&data_planes, ctx) {
        return Ok(action);
    }

    let control_planes = teardown(
        ctx.control_planes.as_ref(),
        ctx.gateways.as_ref(),
        gateway,
        CLEANUP_CONTROL_PLANES_FINALIZER,
    )
    .await?;
    if let Some(action) = step_action(&control_planes, ctx) {
        return Ok(action);
    }

    let network_policies = teardown(
        ctx.network_policies.as_ref(),
        ctx.gateways.as_ref(),
        gateway,
        CLEANUP_NETWORK_POLICIES_FINALIZER,
    )
    .await?;
    Ok(step_action(&network_policies, ctx).unwrap_or_else(Action::await_change))
}

fn step_action(teardown: &Teardown, ctx: &Context) -> Option<Action> {
    match teardown {
        Teardown::Pending => Some(Action::requeue(ctx.options.waiting_requeue_interval())),
        Teardown::FinalizerRemoved => Some(Action::await_change()),
        Teardown::Done => None,
    }
}
