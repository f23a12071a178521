//! In-memory stand-ins for the API server used by the controller tests.

use crate::controllers::gateway::Context;
use crate::kubernetes::ResourceClient;
use crate::options::Options;
use async_trait::async_trait;
use gateway_api::apis::standard::gatewayclasses::GatewayClass;
use gateway_api::apis::standard::gateways::Gateway;
use gateway_api::apis::standard::referencegrants::ReferenceGrant;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use k8s_openapi::chrono::Utc;
use kube::api::ListParams;
use kube::core::ErrorResponse;
use kube::{Resource, ResourceExt};
use portico_api::constants::{
    DATA_PLANE_LABEL, READY_CONDITION, SERVICE_ROLE_INGRESS, SERVICE_ROLE_LABEL,
};
use portico_api::v1alpha1::{ControlPlane, DataPlane, GatewayConfiguration};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Writes {
    pub creates: usize,
    pub patches: usize,
    pub status_patches: usize,
    pub deletes: usize,
    pub conflicts: usize,
}

impl Writes {
    pub fn total(&self) -> usize {
        self.creates + self.patches + self.status_patches + self.deletes
    }
}

struct FakeState<K> {
    objects: BTreeMap<(String, String), K>,
    next_id: u64,
    writes: Writes,
}

/// A single-kind object store that behaves like the API server for the
/// operations the controllers use.
pub struct FakeClient<K> {
    state: Mutex<FakeState<K>>,
}

impl<K> Default for FakeClient<K> {
    fn default() -> Self {
        Self {
            state: Mutex::new(FakeState {
                objects: BTreeMap::new(),
                next_id: 1,
                writes: Writes::default(),
            }),
        }
    }
}

fn key<K: Resource>(object: &K) -> (String, String) {
    (
        object.meta().namespace.clone().unwrap_or_default(),
        object.meta().name.clone().unwrap_or_default(),
    )
}

fn not_found(name: &str) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{name} not found"),
        reason: "NotFound".to_string(),
        code: 404,
    })
}

fn conflict(name: &str) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!(
            "Operation cannot be fulfilled on {name}: the object has been modified"
        ),
        reason: "Conflict".to_string(),
        code: 409,
    })
}

fn matches_selector<K: Resource>(object: &K, params: &ListParams) -> bool {
    let Some(selector) = params.label_selector.as_deref() else {
        return true;
    };
    let labels = object.labels();
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.get(k).is_some_and(|actual| actual == v),
            None => labels.contains_key(term),
        })
}

impl<K> FakeClient<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn with_objects(objects: Vec<K>) -> Self {
        let client = Self::default();
        for object in objects {
            client.insert(object);
        }
        client
    }

    /// Stores an object as if another actor had created it.
    pub fn insert(&self, mut object: K) {
        let mut state = self.state.lock().expect("fake state lock");
        let id = state.next_id;
        state.next_id += 1;
        let meta = object.meta_mut();
        meta.uid.get_or_insert_with(|| format!("uid-{id}"));
        meta.resource_version.get_or_insert_with(|| "1".to_string());
        meta.generation.get_or_insert(1);
        state.objects.insert(key(&object), object);
    }

    /// Mutates a stored object as if another controller had written it.
    pub fn update(&self, namespace: &str, name: &str, f: impl FnOnce(&mut K)) {
        let mut state = self.state.lock().expect("fake state lock");
        if let Some(object) = state
            .objects
            .get_mut(&(namespace.to_string(), name.to_string()))
        {
            f(object);
            bump_resource_version(object);
        }
    }

    pub fn objects(&self) -> Vec<K> {
        let state = self.state.lock().expect("fake state lock");
        state.objects.values().cloned().collect()
    }

    pub fn find(&self, namespace: &str, name: &str) -> Option<K> {
        let state = self.state.lock().expect("fake state lock");
        state
            .objects
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn writes(&self) -> Writes {
        self.state.lock().expect("fake state lock").writes
    }

    fn apply(&self, namespace: &str, name: &str, patch: &Value, status: bool) -> Result<K, kube::Error> {
        let mut state = self.state.lock().expect("fake state lock");
        let key = (namespace.to_string(), name.to_string());
        let current = state.objects.get(&key).cloned().ok_or_else(|| not_found(name))?;

        let expected_version = patch
            .pointer("/metadata/resourceVersion")
            .and_then(Value::as_str);
        if expected_version.is_some_and(|rv| current.meta().resource_version.as_deref() != Some(rv))
        {
            state.writes.conflicts += 1;
            return Err(conflict(name));
        }

        let mut value = serde_json::to_value(&current).expect("serializable object");
        let spec_before = value.get("spec").cloned();
        json_patch::merge(&mut value, patch);
        let spec_changed = value.get("spec").cloned() != spec_before;
        let mut updated: K = serde_json::from_value(value).expect("patched object deserializes");

        if spec_changed && !status {
            let generation = updated.meta().generation.unwrap_or_default();
            updated.meta_mut().generation = Some(generation + 1);
        }
        bump_resource_version(&mut updated);

        if status {
            state.writes.status_patches += 1;
        } else {
            state.writes.patches += 1;
        }

        let meta = updated.meta();
        if meta.deletion_timestamp.is_some() && updated.finalizers().is_empty() {
            state.objects.remove(&key);
        } else {
            state.objects.insert(key, updated.clone());
        }
        Ok(updated)
    }
}

fn bump_resource_version<K: Resource>(object: &mut K) {
    let next = object
        .meta()
        .resource_version
        .as_deref()
        .and_then(|rv| rv.parse::<u64>().ok())
        .unwrap_or_default()
        + 1;
    object.meta_mut().resource_version = Some(next.to_string());
}

#[async_trait]
impl<K> ResourceClient<K> for FakeClient<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, kube::Error> {
        Ok(self.find(namespace, name))
    }

    async fn list(&self, namespace: &str, params: &ListParams) -> Result<Vec<K>, kube::Error> {
        let state = self.state.lock().expect("fake state lock");
        Ok(state
            .objects
            .iter()
            .filter(|((ns, _), _)| namespace.is_empty() || ns == namespace)
            .map(|(_, object)| object)
            .filter(|object| matches_selector(*object, params))
            .cloned()
            .collect())
    }

    async fn create(&self, namespace: &str, object: &K) -> Result<K, kube::Error> {
        let mut state = self.state.lock().expect("fake state lock");
        let id = state.next_id;
        state.next_id += 1;

        let mut created = object.clone();
        let meta = created.meta_mut();
        if meta.name.is_none() {
            let prefix = meta.generate_name.clone().unwrap_or_default();
            meta.name = Some(format!("{prefix}{id:05}"));
        }
        if !namespace.is_empty() {
            meta.namespace = Some(namespace.to_string());
        }
        meta.uid = Some(format!("uid-{id}"));
        meta.resource_version = Some("1".to_string());
        meta.generation = Some(1);

        state.writes.creates += 1;
        state.objects.insert(key(&created), created.clone());
        Ok(created)
    }

    async fn patch(&self, namespace: &str, name: &str, patch: &Value) -> Result<K, kube::Error> {
        self.apply(namespace, name, patch, false)
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<K, kube::Error> {
        self.apply(namespace, name, patch, true)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), kube::Error> {
        let mut state = self.state.lock().expect("fake state lock");
        let key = (namespace.to_string(), name.to_string());
        state.writes.deletes += 1;
        if let Some(object) = state.objects.get_mut(&key) {
            if object.finalizers().is_empty() {
                state.objects.remove(&key);
            } else {
                object
                    .meta_mut()
                    .deletion_timestamp
                    .get_or_insert_with(|| Time(Utc::now()));
            }
        }
        Ok(())
    }
}

pub fn gateway_class(name: &str, controller_name: &str, accepted: bool) -> GatewayClass {
    let status = if accepted { "True" } else { "Unknown" };
    let reason = if accepted { "Accepted" } else { "Pending" };
    serde_json::from_value(json!({
        "apiVersion": "gateway.networking.k8s.io/v1",
        "kind": "GatewayClass",
        "metadata": { "name": name, "generation": 1 },
        "spec": { "controllerName": controller_name },
        "status": {
            "conditions": [{
                "type": "Accepted",
                "status": status,
                "reason": reason,
                "message": "",
                "observedGeneration": 1,
                "lastTransitionTime": "2024-01-01T00:00:00Z"
            }]
        }
    }))
    .expect("GatewayClass fixture deserializes")
}

pub fn gateway(name: &str, namespace: &str, class_name: &str, listeners: Value) -> Gateway {
    serde_json::from_value(json!({
        "apiVersion": "gateway.networking.k8s.io/v1",
        "kind": "Gateway",
        "metadata": { "name": name, "namespace": namespace, "generation": 1 },
        "spec": { "gatewayClassName": class_name, "listeners": listeners }
    }))
    .expect("Gateway fixture deserializes")
}

pub fn http_and_https_listeners() -> Value {
    json!([
        { "name": "http", "protocol": "HTTP", "port": 8080 },
        {
            "name": "https",
            "protocol": "HTTPS",
            "port": 8443,
            "tls": { "certificateRefs": [{ "kind": "Secret", "name": "edge-cert" }] }
        }
    ])
}

pub fn ready_condition(generation: Option<i64>) -> Condition {
    Condition {
        type_: READY_CONDITION.to_string(),
        status: "True".to_string(),
        reason: "Ready".to_string(),
        message: String::new(),
        observed_generation: generation,
        last_transition_time: Time(Utc::now()),
    }
}

/// Every API the Gateway reconciler talks to, backed by fakes.
#[derive(Default)]
pub struct TestCluster {
    pub gateways: Arc<FakeClient<Gateway>>,
    pub gateway_classes: Arc<FakeClient<GatewayClass>>,
    pub configurations: Arc<FakeClient<GatewayConfiguration>>,
    pub reference_grants: Arc<FakeClient<ReferenceGrant>>,
    pub data_planes: Arc<FakeClient<DataPlane>>,
    pub control_planes: Arc<FakeClient<ControlPlane>>,
    pub network_policies: Arc<FakeClient<NetworkPolicy>>,
    pub services: Arc<FakeClient<Service>>,
}

impl TestCluster {
    pub fn context(&self) -> Arc<Context> {
        Arc::new(
            Context::builder()
                .options(Arc::new(Options::default()))
                .gateways(self.gateways.clone())
                .gateway_classes(self.gateway_classes.clone())
                .configurations(self.configurations.clone())
                .reference_grants(self.reference_grants.clone())
                .data_planes(self.data_planes.clone())
                .control_planes(self.control_planes.clone())
                .network_policies(self.network_policies.clone())
                .services(self.services.clone())
                .build(),
        )
    }

    /// Plays the part of the DataPlane and ControlPlane controllers: marks
    /// every child ready and publishes the DataPlane ingress Service.
    pub fn run_child_controllers(&self) {
        for data_plane in self.data_planes.objects() {
            let namespace = data_plane.namespace().unwrap_or_default();
            let name = data_plane.name_any();
            let generation = data_plane.metadata.generation;
            self.data_planes.update(&namespace, &name, |dp| {
                let status = dp.status.get_or_insert_with(Default::default);
                status.conditions = vec![ready_condition(generation)];
            });

            let service_name = format!("{name}-ingress");
            if self.services.find(&namespace, &service_name).is_none() {
                self.services.insert(ingress_service(&namespace, &service_name, &name));
            }
        }

        for control_plane in self.control_planes.objects() {
            let namespace = control_plane.namespace().unwrap_or_default();
            let name = control_plane.name_any();
            let generation = control_plane.metadata.generation;
            self.control_planes.update(&namespace, &name, |cp| {
                let status = cp.status.get_or_insert_with(Default::default);
                status.conditions = vec![ready_condition(generation)];
            });
        }
    }

    pub fn owned_writes(&self) -> usize {
        self.data_planes.writes().total()
            + self.control_planes.writes().total()
            + self.network_policies.writes().total()
    }
}

pub fn ingress_service(namespace: &str, name: &str, data_plane: &str) -> Service {
    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "labels": {
                DATA_PLANE_LABEL: data_plane,
                SERVICE_ROLE_LABEL: SERVICE_ROLE_INGRESS
            }
        },
        "spec": { "type": "LoadBalancer", "clusterIP": "10.0.0.10" },
        "status": { "loadBalancer": { "ingress": [{ "ip": "203.0.113.7" }] } }
    }))
    .expect("Service fixture deserializes")
}
