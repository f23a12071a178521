use gateway_api::apis::standard::gateways::{Gateway, GatewayListeners};
use portico_api::constants::{
    DATA_PLANE_PROXY_PORT, DATA_PLANE_PROXY_SSL_PORT, GATEWAY_API_GROUP, HTTP_ROUTE_KIND,
};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum ListenerProtocol {
    Http,
    Https,
}

impl ListenerProtocol {
    /// Port of the proxy container that serves this protocol.
    pub fn target_port(self) -> i32 {
        match self {
            Self::Http => DATA_PLANE_PROXY_PORT,
            Self::Https => DATA_PLANE_PROXY_SSL_PORT,
        }
    }

    pub fn supported_kinds(self) -> Vec<RouteGroupKind> {
        match self {
            Self::Http | Self::Https => vec![RouteGroupKind::http_route()],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteGroupKind {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub kind: String,
}

impl RouteGroupKind {
    pub fn http_route() -> Self {
        Self {
            group: Some(GATEWAY_API_GROUP.to_string()),
            kind: HTTP_ROUTE_KIND.to_string(),
        }
    }

    /// Kinds without a group belong to the Gateway API group.
    pub fn matches(&self, other: &RouteGroupKind) -> bool {
        let group = |g: &Option<String>| {
            g.clone()
                .filter(|g| !g.is_empty())
                .unwrap_or_else(|| GATEWAY_API_GROUP.to_string())
        };
        self.kind == other.kind && group(&self.group) == group(&other.group)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateRef {
    pub group: Option<String>,
    pub kind: Option<String>,
    pub name: String,
    pub namespace: Option<String>,
}

/// The parts of a Gateway listener the reconciler acts on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listener {
    pub name: String,
    pub protocol: String,
    pub port: i32,
    pub hostname: Option<String>,
    pub allowed_route_kinds: Option<Vec<RouteGroupKind>>,
    pub certificate_refs: Vec<CertificateRef>,
}

impl Listener {
    pub fn protocol(&self) -> Option<ListenerProtocol> {
        self.protocol.parse().ok()
    }

    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref().filter(|h| !h.is_empty())
    }
}

impl From<&GatewayListeners> for Listener {
    fn from(listener: &GatewayListeners) -> Self {
        let allowed_route_kinds = listener
            .allowed_routes
            .as_ref()
            .and_then(|allowed| allowed.kinds.as_ref())
            .map(|kinds| {
                kinds
                    .iter()
                    .map(|k| RouteGroupKind {
                        group: k.group.clone(),
                        kind: k.kind.clone(),
                    })
                    .collect()
            });

        let certificate_refs = listener
            .tls
            .as_ref()
            .and_then(|tls| tls.certificate_refs.as_ref())
            .map(|refs| {
                refs.iter()
                    .map(|r| CertificateRef {
                        group: r.group.clone(),
                        kind: r.kind.clone(),
                        name: r.name.clone(),
                        namespace: r.namespace.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            name: listener.name.clone(),
            protocol: listener.protocol.clone(),
            port: listener.port,
            hostname: listener.hostname.clone(),
            allowed_route_kinds,
            certificate_refs,
        }
    }
}

pub fn listeners_of(gateway: &Gateway) -> Vec<Listener> {
    gateway.spec.listeners.iter().map(Listener::from).collect()
}
