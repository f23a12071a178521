use super::listeners::Listener;
use k8s_openapi::api::core::v1::{Container, HTTPGetAction, PodSpec, PodTemplateSpec, Probe};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use portico_api::constants::{
    CONTROL_PLANE_CONTAINER, DATA_PLANE_METRICS_PORT, DATA_PLANE_PROXY_CONTAINER,
    DATA_PLANE_READINESS_PATH, DEFAULT_CONTROL_PLANE_IMAGE, DEFAULT_DATA_PLANE_IMAGE,
    DEFAULT_REPLICAS,
};
use portico_api::v1alpha1::{
    ControlPlaneOptions, DataPlaneOptions, DataPlaneServicePort, DeploymentOptions,
};
use rand::distr::{Alphanumeric, SampleString};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

const PORT_NAME_SUFFIX_LEN: usize = 5;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ListenerPortError {
    #[error("listener {index} ({name}) uses unsupported protocol {protocol}")]
    UnsupportedProtocol {
        index: usize,
        name: String,
        protocol: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DesiredDataPlane {
    pub options: DataPlaneOptions,
    pub port_errors: Vec<ListenerPortError>,
}

fn container_mut<'a>(deployment: &'a mut DeploymentOptions, name: &str) -> &'a mut Container {
    let pod_spec = deployment
        .pod_template_spec
        .get_or_insert_with(PodTemplateSpec::default)
        .spec
        .get_or_insert_with(PodSpec::default);

    let index = match pod_spec.containers.iter().position(|c| c.name == name) {
        Some(index) => index,
        None => {
            pod_spec.containers.push(Container {
                name: name.to_string(),
                ..Container::default()
            });
            pod_spec.containers.len() - 1
        }
    };
    &mut pod_spec.containers[index]
}

fn default_deployment(deployment: &mut DeploymentOptions, container: &str, image: &str) {
    deployment.replicas.get_or_insert(DEFAULT_REPLICAS);
    let container = container_mut(deployment, container);
    if container.image.as_deref().is_none_or(str::is_empty) {
        container.image = Some(image.to_string());
    }
}

fn readiness_probe() -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(DATA_PLANE_READINESS_PATH.to_string()),
            port: IntOrString::Int(DATA_PLANE_METRICS_PORT),
            scheme: Some("HTTP".to_string()),
            ..HTTPGetAction::default()
        }),
        initial_delay_seconds: Some(5),
        period_seconds: Some(10),
        success_threshold: Some(1),
        failure_threshold: Some(3),
        timeout_seconds: Some(1),
        ..Probe::default()
    }
}

/// Port name for a listener without one. Seeded by the listener's position so
/// repeated generation yields the same name.
fn anonymous_port_name(protocol: &str, index: usize, port: i32) -> String {
    let seed = (u64::from(port.unsigned_abs()) << 16) ^ index as u64;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let suffix = Alphanumeric
        .sample_string(&mut rng, PORT_NAME_SUFFIX_LEN)
        .to_lowercase();
    format!("{}-{suffix}", protocol.to_lowercase())
}

fn ingress_ports(listeners: &[Listener]) -> (Vec<DataPlaneServicePort>, Vec<ListenerPortError>) {
    let mut ports = Vec::with_capacity(listeners.len());
    let mut errors = Vec::new();

    for (index, listener) in listeners.iter().enumerate() {
        let Some(protocol) = listener.protocol() else {
            errors.push(ListenerPortError::UnsupportedProtocol {
                index,
                name: listener.name.clone(),
                protocol: listener.protocol.clone(),
            });
            continue;
        };

        let name = if listener.name.is_empty() {
            anonymous_port_name(&listener.protocol, index, listener.port)
        } else {
            listener.name.clone()
        };

        ports.push(DataPlaneServicePort {
            name,
            port: listener.port,
            target_port: Some(IntOrString::Int(protocol.target_port())),
        });
    }

    (ports, errors)
}

/// Fills the DataPlane overrides with defaults and derives the ingress ports
/// from the listeners. Listeners with unsupported protocols are reported and
/// skipped; the remaining ports are still generated.
pub fn desired_data_plane(
    overrides: Option<&DataPlaneOptions>,
    listeners: &[Listener],
) -> DesiredDataPlane {
    let mut options = overrides.cloned().unwrap_or_default();

    default_deployment(
        &mut options.deployment,
        DATA_PLANE_PROXY_CONTAINER,
        DEFAULT_DATA_PLANE_IMAGE,
    );
    let proxy = container_mut(&mut options.deployment, DATA_PLANE_PROXY_CONTAINER);
    proxy.readiness_probe.get_or_insert_with(readiness_probe);

    let (ports, port_errors) = ingress_ports(listeners);
    options.ingress_service_mut().ports = ports;

    DesiredDataPlane {
        options,
        port_errors,
    }
}

/// Fills the ControlPlane overrides with defaults and points it at `data_plane`.
pub fn desired_control_plane(
    overrides: Option<&ControlPlaneOptions>,
    data_plane: &str,
) -> ControlPlaneOptions {
    let mut options = overrides.cloned().unwrap_or_default();
    default_deployment(
        &mut options.deployment,
        CONTROL_PLANE_CONTAINER,
        DEFAULT_CONTROL_PLANE_IMAGE,
    );
    options.data_plane = Some(data_plane.to_string());
    options
}
