pub mod gateway;
pub mod gateway_class;
mod mappers;
mod reference_grants;

use self::gateway::Context;
use self::gateway_class::ClassContext;
use self::mappers::WatchedObject;
use crate::kubernetes::KubeResourceClient;
use crate::options::Options;
use futures::StreamExt;
use gateway_api::apis::standard::gatewayclasses::GatewayClass;
use gateway_api::apis::standard::gateways::Gateway;
use gateway_api::apis::standard::referencegrants::ReferenceGrant;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::NetworkPolicy;
use kube::runtime::watcher::{Config as WatcherConfig, Event};
use kube::runtime::{Controller, WatchStreamExt, watcher};
use kube::{Api, Client, Resource};
use portico_api::constants::MANAGED_BY_GATEWAY_QUERY;
use portico_api::v1alpha1::{ControlPlane, DataPlane, GatewayConfiguration};
use portico_core::task::Builder as TaskBuilder;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, warn};

fn api<K>(client: &Client, watch_namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    K::DynamicType: Default,
{
    match watch_namespace {
        Some(namespace) if !namespace.is_empty() => Api::namespaced(client.clone(), namespace),
        _ => Api::all(client.clone()),
    }
}

fn log_result<T: Debug, E: Debug>(
    controller: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(reconciled) => debug!(?reconciled, "{} reconcile completed", controller),
            Err(err) => warn!(error = ?err, "{} reconcile failed", controller),
        }
        std::future::ready(())
    }
}

fn owned_watcher_config() -> WatcherConfig {
    WatcherConfig::default().labels(MANAGED_BY_GATEWAY_QUERY)
}

/// Spawns the GatewayClass and Gateway controllers.
pub fn spawn_controllers(
    task_builder: &TaskBuilder,
    options: Arc<Options>,
    client: &Client,
    watch_namespace: Option<&str>,
) {
    let class_controller = Controller::new(
        Api::<GatewayClass>::all(client.clone()),
        WatcherConfig::default(),
    );
    let classes = class_controller.store();

    let class_context = Arc::new(
        ClassContext::builder()
            .options(options.clone())
            .gateway_classes(Arc::new(KubeResourceClient::<GatewayClass>::cluster(
                client.clone(),
            )))
            .configurations(Arc::new(KubeResourceClient::<GatewayConfiguration>::namespaced(
                client.clone(),
            )))
            .build(),
    );

    task_builder.new_task("gateway_class_controller").spawn(
        class_controller
            .shutdown_on_signal()
            .run(
                gateway_class::reconcile,
                gateway_class::error_policy,
                class_context,
            )
            .for_each(log_result("GatewayClass")),
    );

    let context = Arc::new(
        Context::builder()
            .options(options)
            .gateways(Arc::new(KubeResourceClient::<Gateway>::namespaced(client.clone())))
            .gateway_classes(Arc::new(KubeResourceClient::<GatewayClass>::cluster(
                client.clone(),
            )))
            .configurations(Arc::new(KubeResourceClient::<GatewayConfiguration>::namespaced(
                client.clone(),
            )))
            .reference_grants(Arc::new(KubeResourceClient::<ReferenceGrant>::namespaced(
                client.clone(),
            )))
            .data_planes(Arc::new(KubeResourceClient::<DataPlane>::namespaced(client.clone())))
            .control_planes(Arc::new(KubeResourceClient::<ControlPlane>::namespaced(
                client.clone(),
            )))
            .network_policies(Arc::new(KubeResourceClient::<NetworkPolicy>::namespaced(
                client.clone(),
            )))
            .services(Arc::new(KubeResourceClient::<Service>::namespaced(client.clone())))
            .build(),
    );

    let deletions = context.clone();
    task_builder.new_task("gateway_deletion_watcher").spawn(
        watcher(api::<Gateway>(client, watch_namespace), WatcherConfig::default())
            .default_backoff()
            .for_each(move |event| {
                match event {
                    Ok(Event::Delete(gateway)) => deletions.forget(&gateway),
                    Ok(_) => {}
                    Err(err) => debug!("Gateway deletion watch interrupted: {}", err),
                }
                std::future::ready(())
            }),
    );

    let gateway_controller = Controller::new(
        api::<Gateway>(client, watch_namespace),
        WatcherConfig::default(),
    );
    let gateways = gateway_controller.store();

    let mapper = move |watched: WatchedObject| {
        watched.affected_gateways(&gateways.state(), &classes.state())
    };
    let class_mapper = mapper.clone();
    let configuration_mapper = mapper.clone();
    let data_plane_mapper = mapper.clone();
    let control_plane_mapper = mapper.clone();
    let network_policy_mapper = mapper;

    task_builder.new_task("gateway_controller").spawn(
        gateway_controller
            .watches(
                Api::<GatewayClass>::all(client.clone()),
                WatcherConfig::default(),
                move |class| class_mapper(WatchedObject::GatewayClass(class)),
            )
            .watches(
                api::<GatewayConfiguration>(client, watch_namespace),
                WatcherConfig::default(),
                move |configuration| {
                    configuration_mapper(WatchedObject::GatewayConfiguration(configuration))
                },
            )
            .watches(
                api::<DataPlane>(client, watch_namespace),
                owned_watcher_config(),
                move |data_plane| data_plane_mapper(WatchedObject::DataPlane(data_plane)),
            )
            .watches(
                api::<ControlPlane>(client, watch_namespace),
                owned_watcher_config(),
                move |control_plane| {
                    control_plane_mapper(WatchedObject::ControlPlane(control_plane))
                },
            )
            .watches(
                api::<NetworkPolicy>(client, watch_namespace),
                owned_watcher_config(),
                move |network_policy| {
                    network_policy_mapper(WatchedObject::NetworkPolicy(network_policy))
                },
            )
            .shutdown_on_signal()
            .run(gateway::reconcile, gateway::error_policy, context)
            .for_each(log_result("Gateway")),
    );
}
