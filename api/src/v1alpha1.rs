use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::IntoStaticStr;

#[derive(Default, Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_template_spec: Option<PodTemplateSpec>,
}

#[derive(
    Default, Deserialize, Serialize, Copy, Clone, Debug, JsonSchema, PartialEq, Eq, IntoStaticStr,
)]
pub enum ServiceType {
    #[default]
    LoadBalancer,
    #[serde(rename = "ClusterIP")]
    #[strum(serialize = "ClusterIP")]
    ClusterIp,
    NodePort,
}

#[derive(Default, Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DataPlaneServicePort {
    pub name: String,
    pub port: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<IntOrString>,
}

#[derive(Default, Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DataPlaneServiceOptions {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub service_type: Option<ServiceType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<DataPlaneServicePort>,
}

#[derive(Default, Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DataPlaneServices {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<DataPlaneServiceOptions>,
}

#[derive(Default, Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DataPlaneNetworkOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<DataPlaneServices>,
}

#[derive(Default, Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DataPlaneOptions {
    #[serde(default)]
    pub deployment: DeploymentOptions,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<DataPlaneNetworkOptions>,
}

impl DataPlaneOptions {
    pub fn ingress_service(&self) -> Option<&DataPlaneServiceOptions> {
        self.network
            .as_ref()
            .and_then(|n| n.services.as_ref())
            .and_then(|s| s.ingress.as_ref())
    }

    pub fn ingress_service_mut(&mut self) -> &mut DataPlaneServiceOptions {
        self.network
            .get_or_insert_with(Default::default)
            .services
            .get_or_insert_with(Default::default)
            .ingress
            .get_or_insert_with(Default::default)
    }
}

#[derive(Default, Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneOptions {
    #[serde(default)]
    pub deployment: DeploymentOptions,

    /// Name of the DataPlane this ControlPlane configures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_plane: Option<String>,
}

#[derive(Default, CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[kube(
    kind = "GatewayConfiguration",
    group = "gateway-operator.portico.dev",
    version = "v1alpha1",
    namespaced,
    singular = "gatewayconfiguration",
    plural = "gatewayconfigurations"
)]
#[kube(derive = "Default")]
#[kube(derive = "PartialEq")]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfigurationSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_plane_options: Option<DataPlaneOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_options: Option<ControlPlaneOptions>,
}

#[derive(Default, Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DataPlaneAddress {
    #[serde(rename = "type")]
    pub address_type: String,
    pub value: String,
}

#[derive(Default, Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DataPlaneStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Name of the ingress Service currently backing the DataPlane.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<DataPlaneAddress>,

    #[serde(default)]
    pub ready_replicas: i32,

    #[serde(default)]
    pub replicas: i32,
}

#[derive(Default, CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[kube(
    kind = "DataPlane",
    group = "gateway-operator.portico.dev",
    version = "v1alpha1",
    namespaced,
    singular = "dataplane",
    plural = "dataplanes",
    shortname = "dp",
    status = "DataPlaneStatus"
)]
#[kube(derive = "Default")]
#[kube(derive = "PartialEq")]
pub struct DataPlaneSpec {
    #[serde(flatten)]
    pub options: DataPlaneOptions,
}

#[derive(Default, Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

#[derive(Default, CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[kube(
    kind = "ControlPlane",
    group = "gateway-operator.portico.dev",
    version = "v1alpha1",
    namespaced,
    singular = "controlplane",
    plural = "controlplanes",
    shortname = "cp",
    status = "ControlPlaneStatus"
)]
#[kube(derive = "Default")]
#[kube(derive = "PartialEq")]
pub struct ControlPlaneSpec {
    #[serde(flatten)]
    pub options: ControlPlaneOptions,
}
