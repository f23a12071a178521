use crate::controllers::gateway::class_parameters_ref;
use gateway_api::apis::standard::gatewayclasses::GatewayClass;
use gateway_api::apis::standard::gateways::Gateway;
use k8s_openapi::api::networking::v1::NetworkPolicy;
use kube::Resource;
use kube::api::ObjectMeta;
use kube::runtime::reflector::ObjectRef;
use portico_api::constants::{GATEWAY_API_GROUP, GATEWAY_CONFIGURATION_KIND, GATEWAY_KIND, GROUP};
use portico_api::v1alpha1::{ControlPlane, DataPlane, GatewayConfiguration};
use std::sync::Arc;

/// An object the Gateway controller watches besides Gateways themselves.
pub enum WatchedObject {
    GatewayClass(GatewayClass),
    GatewayConfiguration(GatewayConfiguration),
    DataPlane(DataPlane),
    ControlPlane(ControlPlane),
    NetworkPolicy(NetworkPolicy),
}

fn gateway_ref(gateway: &Gateway) -> Option<ObjectRef<Gateway>> {
    let name = gateway.metadata.name.as_deref()?;
    let namespace = gateway.metadata.namespace.as_deref()?;
    Some(ObjectRef::new(name).within(namespace))
}

fn owning_gateways(metadata: &ObjectMeta) -> Vec<ObjectRef<Gateway>> {
    let Some(namespace) = metadata.namespace.as_deref() else {
        return Vec::new();
    };
    metadata
        .owner_references
        .iter()
        .flatten()
        .filter(|owner| {
            owner.kind == GATEWAY_KIND
                && owner
                    .api_version
                    .split_once('/')
                    .is_some_and(|(group, _)| group == GATEWAY_API_GROUP)
        })
        .map(|owner| ObjectRef::new(&owner.name).within(namespace))
        .collect()
}

fn references_configuration(gateway: &Gateway, namespace: &str, name: &str) -> bool {
    gateway.metadata.namespace.as_deref() == Some(namespace)
        && gateway
            .spec
            .infrastructure
            .as_ref()
            .and_then(|infra| infra.parameters_ref.as_ref())
            .is_some_and(|r| {
                r.group == GROUP && r.kind == GATEWAY_CONFIGURATION_KIND && r.name == name
            })
}

impl WatchedObject {
    /// The Gateways whose reconcile outcome may change with this object.
    pub fn affected_gateways(
        &self,
        gateways: &[Arc<Gateway>],
        classes: &[Arc<GatewayClass>],
    ) -> Vec<ObjectRef<Gateway>> {
        match self {
            Self::GatewayClass(class) => {
                let Some(class_name) = class.metadata.name.as_deref() else {
                    return Vec::new();
                };
                gateways
                    .iter()
                    .filter(|g| g.spec.gateway_class_name == class_name)
                    .filter_map(|g| gateway_ref(g))
                    .collect()
            }
            Self::GatewayConfiguration(configuration) => {
                let (Some(namespace), Some(name)) = (
                    configuration.metadata.namespace.as_deref(),
                    configuration.metadata.name.as_deref(),
                ) else {
                    return Vec::new();
                };
                let referencing_classes: Vec<&str> = classes
                    .iter()
                    .filter(|class| {
                        class_parameters_ref(class)
                            .ok()
                            .flatten()
                            .is_some_and(|key| key.namespace == namespace && key.name == name)
                    })
                    .filter_map(|class| class.metadata.name.as_deref())
                    .collect();

                gateways
                    .iter()
                    .filter(|g| {
                        references_configuration(g, namespace, name)
                            || referencing_classes.contains(&g.spec.gateway_class_name.as_str())
                    })
                    .filter_map(|g| gateway_ref(g))
                    .collect()
            }
            Self::DataPlane(data_plane) => owning_gateways(data_plane.meta()),
            Self::ControlPlane(control_plane) => owning_gateways(control_plane.meta()),
            Self::NetworkPolicy(network_policy) => owning_gateways(network_policy.meta()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{gateway, gateway_class};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
    use portico_api::constants::DEFAULT_CONTROLLER_NAME;
    use portico_api::v1alpha1::GatewayConfigurationSpec;
    use serde_json::json;

    fn gateways() -> Vec<Arc<Gateway>> {
        let mut with_infrastructure = gateway("tuned", "infra", "shared", json!([]));
        with_infrastructure.spec.infrastructure = Some(
            serde_json::from_value(json!({
                "parametersRef": { "group": GROUP, "kind": GATEWAY_CONFIGURATION_KIND, "name": "fast" }
            }))
            .expect("infrastructure deserializes"),
        );
        vec![
            Arc::new(gateway("edge", "infra", "portico", json!([]))),
            Arc::new(gateway("internal", "apps", "portico", json!([]))),
            Arc::new(with_infrastructure),
            Arc::new(gateway("other", "apps", "shared", json!([]))),
        ]
    }

    fn classes() -> Vec<Arc<GatewayClass>> {
        let mut portico = gateway_class("portico", DEFAULT_CONTROLLER_NAME, true);
        portico.spec.parameters_ref = Some(
            serde_json::from_value(json!({
                "group": GROUP, "kind": GATEWAY_CONFIGURATION_KIND, "name": "defaults", "namespace": "infra"
            }))
            .expect("parametersRef deserializes"),
        );
        vec![
            Arc::new(portico),
            Arc::new(gateway_class("shared", DEFAULT_CONTROLLER_NAME, true)),
        ]
    }

    fn configuration(namespace: &str, name: &str) -> GatewayConfiguration {
        GatewayConfiguration {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..ObjectMeta::default()
            },
            spec: GatewayConfigurationSpec::default(),
        }
    }

    fn names(refs: Vec<ObjectRef<Gateway>>) -> Vec<String> {
        let mut names: Vec<_> = refs
            .into_iter()
            .map(|r| format!("{}/{}", r.namespace.unwrap_or_default(), r.name))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_class_change_affects_its_gateways() {
        let watched = WatchedObject::GatewayClass(gateway_class("portico", DEFAULT_CONTROLLER_NAME, true));
        assert_eq!(
            names(watched.affected_gateways(&gateways(), &classes())),
            vec!["apps/internal", "infra/edge"]
        );
    }

    #[test]
    fn test_configuration_referenced_by_class() {
        let watched = WatchedObject::GatewayConfiguration(configuration("infra", "defaults"));
        assert_eq!(
            names(watched.affected_gateways(&gateways(), &classes())),
            vec!["apps/internal", "infra/edge"]
        );
    }

    #[test]
    fn test_configuration_referenced_by_gateway() {
        let watched = WatchedObject::GatewayConfiguration(configuration("infra", "fast"));
        assert_eq!(
            names(watched.affected_gateways(&gateways(), &classes())),
            vec!["infra/tuned"]
        );

        let elsewhere = WatchedObject::GatewayConfiguration(configuration("apps", "fast"));
        assert!(elsewhere.affected_gateways(&gateways(), &classes()).is_empty());
    }

    #[test]
    fn test_owned_objects_map_to_their_owner() {
        let owner = |kind: &str, api_version: &str| OwnerReference {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            name: "edge".to_string(),
            uid: "gateway-uid".to_string(),
            ..OwnerReference::default()
        };
        let mut data_plane = DataPlane::default();
        data_plane.metadata.namespace = Some("infra".to_string());
        data_plane.metadata.owner_references = Some(vec![
            owner("Gateway", "gateway.networking.k8s.io/v1"),
            owner("Deployment", "apps/v1"),
            owner("Gateway", "example.com/v1"),
        ]);

        let watched = WatchedObject::DataPlane(data_plane);
        assert_eq!(names(watched.affected_gateways(&[], &[])), vec!["infra/edge"]);

        let orphan = WatchedObject::NetworkPolicy(NetworkPolicy::default());
        assert!(orphan.affected_gateways(&[], &[]).is_empty());
    }
}
