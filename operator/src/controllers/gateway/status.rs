use super::listeners::{Listener, ListenerProtocol, RouteGroupKind};
use crate::conditions::{
    ConditionReason, ConditionStatus, GatewayConditionType, HasConditions, ListenerConditionType,
    new_condition,
};
use crate::controllers::reference_grants::{GrantRequest, is_permitted};
use crate::kubernetes::ResourceClient;
use crate::kubernetes::patch::merge_patch;
use gateway_api::apis::standard::gateways::Gateway;
use gateway_api::apis::standard::referencegrants::ReferenceGrant;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use portico_api::constants::{GATEWAY_API_GROUP, GATEWAY_KIND, SECRET_KIND};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayAddress {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    pub value: String,
}

impl GatewayAddress {
    fn ip(value: &str) -> Self {
        Self {
            type_: Some("IPAddress".to_string()),
            value: value.to_string(),
        }
    }

    fn hostname(value: &str) -> Self {
        Self {
            type_: Some("Hostname".to_string()),
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerStatus {
    pub name: String,
    #[serde(default)]
    pub attached_routes: i32,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub supported_kinds: Vec<RouteGroupKind>,
}

/// The part of the Gateway status this operator writes.
///
/// Other fields are never part of a patch, so writes from other controllers
/// survive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayStatusView {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<GatewayAddress>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listeners: Vec<ListenerStatus>,
}

impl GatewayStatusView {
    pub fn of(gateway: &Gateway) -> Result<Self, serde_json::Error> {
        match gateway.status.as_ref() {
            Some(status) => serde_json::from_value(serde_json::to_value(status)?),
            None => Ok(Self::default()),
        }
    }

    /// Merge patch for the status subresource, or `None` when nothing changed.
    pub fn patch_from(&self, before: &Self) -> Result<Option<Value>, serde_json::Error> {
        let diff = merge_patch(&serde_json::to_value(before)?, &serde_json::to_value(self)?);
        Ok(diff.map(|diff| json!({ "status": diff })))
    }

    /// Marks `type_` false and holds back every condition behind it.
    pub fn block(
        &mut self,
        type_: GatewayConditionType,
        reason: ConditionReason,
        message: impl Into<String>,
        generation: Option<i64>,
    ) {
        self.set_condition(new_condition(type_, false, reason, message, generation));
        self.hold(type_, generation);
    }

    /// Sets the provisioning stages after `blocker`, Programmed and Ready to
    /// pending. Addresses are dropped until the ingress Service is read again.
    pub fn hold(&mut self, blocker: GatewayConditionType, generation: Option<i64>) {
        let pending = format!("Waiting for {blocker}");
        let held = downstream_of(blocker)
            .iter()
            .chain(&[GatewayConditionType::Programmed, GatewayConditionType::Ready])
            .filter(|held| **held != blocker);
        for held in held {
            self.set_condition(new_condition(
                *held,
                false,
                ConditionReason::Pending,
                pending.clone(),
                generation,
            ));
        }

        if blocker == GatewayConditionType::GatewayServiceReady
            || downstream_of(blocker).contains(&GatewayConditionType::GatewayServiceReady)
        {
            self.addresses.clear();
        }
    }
}

/// Provisioning stages that cannot be ready while `blocker` is not.
fn downstream_of(blocker: GatewayConditionType) -> &'static [GatewayConditionType] {
    use GatewayConditionType::{
        Accepted, ControlPlaneReady, DataPlaneReady, GatewayServiceReady, Programmed, Ready,
    };
    match blocker {
        Accepted => &[DataPlaneReady, ControlPlaneReady, GatewayServiceReady],
        DataPlaneReady => &[ControlPlaneReady, GatewayServiceReady],
        ControlPlaneReady | Programmed => &[GatewayServiceReady],
        GatewayServiceReady | Ready => &[],
    }
}

impl HasConditions for GatewayStatusView {
    fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.conditions
    }
}

impl HasConditions for ListenerStatus {
    fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.conditions
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateRefIssue {
    Invalid(String),
    NotPermitted(String),
}

impl CertificateRefIssue {
    fn reason(&self) -> ConditionReason {
        match self {
            Self::Invalid(_) => ConditionReason::InvalidCertificateRef,
            Self::NotPermitted(_) => ConditionReason::RefNotPermitted,
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::Invalid(message) | Self::NotPermitted(message) => message,
        }
    }
}

/// Checks the TLS certificate references of every listener. The first
/// problem found per listener is reported.
pub async fn certificate_ref_issues(
    reference_grants: &dyn ResourceClient<ReferenceGrant>,
    gateway_namespace: &str,
    listeners: &[Listener],
) -> Result<Vec<Option<CertificateRefIssue>>, kube::Error> {
    let mut issues = Vec::with_capacity(listeners.len());

    for listener in listeners {
        let mut issue = None;

        if listener.protocol() == Some(ListenerProtocol::Https)
            && listener.certificate_refs.is_empty()
        {
            issue = Some(CertificateRefIssue::Invalid(
                "HTTPS listener has no certificateRefs".to_string(),
            ));
        }

        for cert in &listener.certificate_refs {
            if issue.is_some() {
                break;
            }
            let group = cert.group.as_deref().unwrap_or_default();
            let kind = cert.kind.as_deref().unwrap_or(SECRET_KIND);
            if !group.is_empty() || kind != SECRET_KIND {
                issue = Some(CertificateRefIssue::Invalid(format!(
                    "certificateRef {} must be a core Secret, not {group}/{kind}",
                    cert.name
                )));
                continue;
            }

            let namespace = cert.namespace.as_deref().unwrap_or(gateway_namespace);
            let request = GrantRequest::builder()
                .from_group(GATEWAY_API_GROUP)
                .from_kind(GATEWAY_KIND)
                .from_namespace(gateway_namespace)
                .to_group("")
                .to_kind(SECRET_KIND)
                .to_namespace(namespace)
                .to_name(cert.name.clone())
                .build();
            if !is_permitted(reference_grants, &request).await? {
                issue = Some(CertificateRefIssue::NotPermitted(format!(
                    "no ReferenceGrant allows Gateways in {gateway_namespace} to reference Secret {namespace}/{}",
                    cert.name
                )));
            }
        }

        issues.push(issue);
    }

    Ok(issues)
}

/// First conflict of each listener against the others, in listener order.
pub fn listener_conflicts(listeners: &[Listener]) -> Vec<Option<ConditionReason>> {
    listeners
        .iter()
        .enumerate()
        .map(|(i, listener)| {
            listeners
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .find_map(|(_, other)| {
                    if listener.port == other.port && listener.protocol != other.protocol {
                        Some(ConditionReason::ProtocolConflict)
                    } else if listener
                        .hostname()
                        .is_some_and(|hostname| other.hostname() == Some(hostname))
                    {
                        Some(ConditionReason::HostnameConflict)
                    } else {
                        None
                    }
                })
        })
        .collect()
}

fn supported_kinds(listener: &Listener) -> (Vec<RouteGroupKind>, bool) {
    let supported = listener
        .protocol()
        .map(ListenerProtocol::supported_kinds)
        .unwrap_or_default();

    match listener.allowed_route_kinds.as_ref() {
        Some(allowed) if !allowed.is_empty() => {
            let resolved = allowed
                .iter()
                .all(|kind| supported.iter().any(|s| s.matches(kind)));
            let kinds = supported
                .into_iter()
                .filter(|s| allowed.iter().any(|kind| s.matches(kind)))
                .collect();
            (kinds, resolved)
        }
        _ => (supported, true),
    }
}

/// Computes the status of every listener. Attached route counts and
/// transition times carry over from `previous`.
pub fn project_listeners(
    listeners: &[Listener],
    cert_issues: &[Option<CertificateRefIssue>],
    previous: &[ListenerStatus],
    generation: Option<i64>,
) -> Vec<ListenerStatus> {
    let conflicts = listener_conflicts(listeners);

    listeners
        .iter()
        .enumerate()
        .map(|(index, listener)| {
            let mut status = previous
                .iter()
                .find(|p| p.name == listener.name)
                .cloned()
                .unwrap_or_else(|| ListenerStatus {
                    name: listener.name.clone(),
                    ..ListenerStatus::default()
                });

            let accepted = listener.protocol().is_some();
            status.set_condition(if accepted {
                new_condition(
                    ListenerConditionType::Accepted,
                    true,
                    ConditionReason::Accepted,
                    "Listener is accepted",
                    generation,
                )
            } else {
                new_condition(
                    ListenerConditionType::Accepted,
                    false,
                    ConditionReason::UnsupportedProtocol,
                    format!("Protocol {} is not supported", listener.protocol),
                    generation,
                )
            });

            let conflict = conflicts.get(index).copied().flatten();
            status.set_condition(match conflict {
                Some(reason) => new_condition(
                    ListenerConditionType::Conflicted,
                    true,
                    reason,
                    "Listener conflicts with another listener",
                    generation,
                ),
                None => new_condition(
                    ListenerConditionType::Conflicted,
                    false,
                    ConditionReason::NoConflicts,
                    "No conflicts",
                    generation,
                ),
            });

            let (kinds, kinds_resolved) = supported_kinds(listener);
            status.supported_kinds = kinds;
            let cert_issue = cert_issues.get(index).cloned().flatten();
            let resolved = kinds_resolved && cert_issue.is_none();
            status.set_condition(match (kinds_resolved, cert_issue) {
                (false, _) => new_condition(
                    ListenerConditionType::ResolvedRefs,
                    false,
                    ConditionReason::InvalidRouteKinds,
                    "Allowed route kinds are not supported by the listener protocol",
                    generation,
                ),
                (true, Some(issue)) => new_condition(
                    ListenerConditionType::ResolvedRefs,
                    false,
                    issue.reason(),
                    issue.message(),
                    generation,
                ),
                (true, None) => new_condition(
                    ListenerConditionType::ResolvedRefs,
                    true,
                    ConditionReason::ResolvedRefs,
                    "References are resolved",
                    generation,
                ),
            });

            let programmed = accepted && conflict.is_none() && resolved;
            status.set_condition(if programmed {
                new_condition(
                    ListenerConditionType::Programmed,
                    true,
                    ConditionReason::Programmed,
                    "Listener is programmed",
                    generation,
                )
            } else {
                new_condition(
                    ListenerConditionType::Programmed,
                    false,
                    ConditionReason::Invalid,
                    "Listener is not valid",
                    generation,
                )
            });

            status
        })
        .collect()
}

/// Gateway-level Accepted, derived from the projected listener statuses.
/// Returns whether the Gateway is accepted.
pub fn project_accepted(status: &mut GatewayStatusView, generation: Option<i64>) -> bool {
    let mut problems = Vec::new();
    let mut accepted = true;

    for (index, listener) in status.listeners.iter().enumerate() {
        if !listener.is_condition_true(ListenerConditionType::Accepted.as_ref()) {
            accepted = false;
            problems.push(format!("listener {index} is not accepted"));
        }
        if listener.is_condition_true(ListenerConditionType::Conflicted.as_ref()) {
            problems.push(format!("listener {index} is conflicted"));
        }
    }

    let message = if problems.is_empty() {
        "All listeners are accepted".to_string()
    } else {
        problems.join("; ")
    };
    let reason = if accepted {
        ConditionReason::Accepted
    } else {
        ConditionReason::ListenersNotValid
    };
    status.set_condition(new_condition(
        GatewayConditionType::Accepted,
        ConditionStatus::from(accepted),
        reason,
        message,
        generation,
    ));
    accepted
}

/// Addresses published by the DataPlane ingress Service.
pub fn service_addresses(service: &Service) -> Vec<GatewayAddress> {
    let load_balancer = service
        .spec
        .as_ref()
        .and_then(|spec| spec.type_.as_deref())
        == Some("LoadBalancer");

    if load_balancer {
        return service
            .status
            .as_ref()
            .and_then(|status| status.load_balancer.as_ref())
            .and_then(|lb| lb.ingress.as_ref())
            .into_iter()
            .flatten()
            .filter_map(|ingress| {
                ingress
                    .ip
                    .as_deref()
                    .filter(|ip| !ip.is_empty())
                    .map(GatewayAddress::ip)
                    .or_else(|| {
                        ingress
                            .hostname
                            .as_deref()
                            .filter(|h| !h.is_empty())
                            .map(GatewayAddress::hostname)
                    })
            })
            .collect();
    }

    service
        .spec
        .as_ref()
        .and_then(|spec| spec.cluster_ip.as_deref())
        .filter(|ip| !ip.is_empty() && *ip != "None")
        .map(GatewayAddress::ip)
        .into_iter()
        .collect()
}
