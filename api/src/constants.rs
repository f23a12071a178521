pub const GROUP: &str = "gateway-operator.portico.dev";
pub const VERSION: &str = "v1alpha1";
pub const GATEWAY_CONFIGURATION_KIND: &str = "GatewayConfiguration";

pub const GATEWAY_API_GROUP: &str = "gateway.networking.k8s.io";
pub const GATEWAY_KIND: &str = "Gateway";
pub const HTTP_ROUTE_KIND: &str = "HTTPRoute";
pub const SECRET_KIND: &str = "Secret";

pub const DEFAULT_CONTROLLER_NAME: &str = "portico.dev/gateway-operator";
pub const CONTROLLER_NAME_ENV: &str = "PORTICO_CONTROLLER_NAME";

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_GATEWAY: &str = "gateway";
pub const MANAGED_BY_GATEWAY_QUERY: &str = "app.kubernetes.io/managed-by=gateway";

pub const APP_LABEL: &str = "app";
pub const DATA_PLANE_LABEL: &str = "gateway-operator.portico.dev/dataplane";
pub const SERVICE_ROLE_LABEL: &str = "gateway-operator.portico.dev/service-role";
pub const SERVICE_ROLE_INGRESS: &str = "ingress";
pub const SERVICE_ROLE_ADMIN: &str = "admin";

pub const CLEANUP_DATA_PLANES_FINALIZER: &str =
    "gateway-operator.portico.dev/cleanup-dataplanes";
pub const CLEANUP_CONTROL_PLANES_FINALIZER: &str =
    "gateway-operator.portico.dev/cleanup-controlplanes";
pub const CLEANUP_NETWORK_POLICIES_FINALIZER: &str =
    "gateway-operator.portico.dev/cleanup-networkpolicies";

pub const DATA_PLANE_PROXY_CONTAINER: &str = "proxy";
pub const CONTROL_PLANE_CONTAINER: &str = "controller";

pub const DEFAULT_DATA_PLANE_IMAGE: &str = "ghcr.io/portico-dev/proxy:3.9";
pub const DEFAULT_CONTROL_PLANE_IMAGE: &str = "ghcr.io/portico-dev/controller:3.4";
pub const DEFAULT_REPLICAS: i32 = 1;

pub const DATA_PLANE_PROXY_PORT: i32 = 8000;
pub const DATA_PLANE_PROXY_SSL_PORT: i32 = 8443;
pub const DATA_PLANE_ADMIN_API_PORT: i32 = 8444;
pub const DATA_PLANE_METRICS_PORT: i32 = 8100;
pub const DATA_PLANE_READINESS_PATH: &str = "/status/ready";

/// Set on the ControlPlane container by the ControlPlane controller, never by the Gateway
/// reconciler.
pub const CONTROL_PLANE_PUBLISH_SERVICE_ENV: &str = "PORTICO_PUBLISH_SERVICE";
pub const CONTROL_PLANE_ADMIN_SERVICE_ENV: &str = "PORTICO_ADMIN_SERVICE";

pub const READY_CONDITION: &str = "Ready";
