use super::ReconcileError;
use super::owned::list_owned;
use crate::compare::Comparator;
use crate::instrumentation::record_owned_write;
use crate::kubernetes::ResourceClient;
use crate::kubernetes::objects::ObjectRef;
use crate::kubernetes::patch::{merge_patch, versioned_patch};
use gateway_api::apis::standard::gateways::Gateway;
use k8s_openapi::api::networking::v1::{NetworkPolicy, NetworkPolicySpec};
use kube::Resource;
use kube::api::ObjectMeta;
use portico_api::constants::{
    CONTROL_PLANE_ADMIN_SERVICE_ENV, CONTROL_PLANE_PUBLISH_SERVICE_ENV, MANAGED_BY_GATEWAY,
    MANAGED_BY_LABEL,
};
use portico_api::v1alpha1::{
    ControlPlane, ControlPlaneOptions, ControlPlaneSpec, DataPlane, DataPlaneOptions,
    DataPlaneSpec,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt::Debug;
use tracing::{debug, info};

/// A child kind the Gateway provisions and keeps converged.
pub trait OwnedKind:
    Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Spec: Serialize + Clone + Send + Sync;

    fn new_owned(metadata: ObjectMeta, spec: Self::Spec) -> Self;

    fn owned_spec(&self) -> Option<&Self::Spec>;

    fn comparator() -> Comparator {
        Comparator::new()
    }
}

impl OwnedKind for DataPlane {
    type Spec = DataPlaneOptions;

    fn new_owned(metadata: ObjectMeta, spec: Self::Spec) -> Self {
        Self {
            metadata,
            spec: DataPlaneSpec { options: spec },
            status: None,
        }
    }

    fn owned_spec(&self) -> Option<&Self::Spec> {
        Some(&self.spec.options)
    }
}

impl OwnedKind for ControlPlane {
    type Spec = ControlPlaneOptions;

    fn new_owned(metadata: ObjectMeta, spec: Self::Spec) -> Self {
        Self {
            metadata,
            spec: ControlPlaneSpec { options: spec },
            status: None,
        }
    }

    fn owned_spec(&self) -> Option<&Self::Spec> {
        Some(&self.spec.options)
    }

    fn comparator() -> Comparator {
        Comparator::new().ignore_env(&[
            CONTROL_PLANE_PUBLISH_SERVICE_ENV,
            CONTROL_PLANE_ADMIN_SERVICE_ENV,
        ])
    }
}

impl OwnedKind for NetworkPolicy {
    type Spec = NetworkPolicySpec;

    fn new_owned(metadata: ObjectMeta, spec: Self::Spec) -> Self {
        Self {
            metadata,
            spec: Some(spec),
            ..Self::default()
        }
    }

    fn owned_spec(&self) -> Option<&Self::Spec> {
        self.spec.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Convergence<K> {
    /// No child existed; one was created and has not been observed yet.
    Created(K),
    /// The child drifted and was patched.
    Updated(K),
    Unchanged(K),
    /// More than one live child exists. None of them were touched.
    Duplicates(usize),
}

fn kind_name<K: OwnedKind>() -> String {
    K::kind(&()).to_string()
}

fn owned_metadata(gateway: &Gateway) -> Result<ObjectMeta, ReconcileError> {
    let gateway_ref = ObjectRef::for_object(gateway)?;
    let owner = gateway
        .controller_owner_ref(&())
        .ok_or_else(|| ReconcileError::MissingUid(gateway_ref.clone()))?;

    Ok(ObjectMeta {
        generate_name: Some(format!("{}-", gateway_ref.name())),
        namespace: gateway_ref.namespace().clone(),
        labels: Some(BTreeMap::from([(
            MANAGED_BY_LABEL.to_string(),
            MANAGED_BY_GATEWAY.to_string(),
        )])),
        owner_references: Some(vec![owner]),
        ..ObjectMeta::default()
    })
}

/// Drives the children of one kind towards `desired`.
///
/// Zero live children: create one. One: patch it when it drifted. More than
/// one: report the count and leave all of them alone.
pub async fn converge<K: OwnedKind>(
    client: &dyn ResourceClient<K>,
    gateway: &Gateway,
    desired: &K::Spec,
) -> Result<Convergence<K>, ReconcileError> {
    let namespace = gateway.metadata.namespace.as_deref().unwrap_or_default();
    let mut live: Vec<K> = list_owned(client, gateway)
        .await?
        .into_iter()
        .filter(|child| child.meta().deletion_timestamp.is_none())
        .collect();

    match live.len() {
        0 => {
            let child = K::new_owned(owned_metadata(gateway)?, desired.clone());
            let created = client.create(namespace, &child).await?;
            record_owned_write(&kind_name::<K>(), "create");
            info!("Created {}", ObjectRef::for_object(&created)?);
            Ok(Convergence::Created(created))
        }
        1 => {
            let Some(current) = live.pop() else {
                return Ok(Convergence::Duplicates(0));
            };
            let desired_value = serde_json::to_value(desired)?;
            let current_value = serde_json::to_value(current.owned_spec())?;

            if K::comparator().equivalent(&desired_value, &current_value) {
                return Ok(Convergence::Unchanged(current));
            }

            let current_ref = ObjectRef::for_object(&current)?;
            let Some(diff) = merge_patch(&current_value, &desired_value) else {
                return Ok(Convergence::Unchanged(current));
            };
            let patch = versioned_patch(current.meta().resource_version.as_deref(), "spec", diff);
            debug!("Patching {} with {}", current_ref, patch);

            let updated = client.patch(namespace, current_ref.name(), &patch).await?;
            record_owned_write(&kind_name::<K>(), "patch");
            info!("Updated {}", current_ref);
            Ok(Convergence::Updated(updated))
        }
        count => Ok(Convergence::Duplicates(count)),
    }
}
