use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use k8s_openapi::chrono::Utc;
use portico_api::constants::READY_CONDITION;
use portico_api::v1alpha1::{ControlPlane, DataPlane};
use strum::{AsRefStr, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
pub enum GatewayConditionType {
    Accepted,
    Programmed,
    Ready,
    DataPlaneReady,
    ControlPlaneReady,
    GatewayServiceReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
pub enum ListenerConditionType {
    Accepted,
    Conflicted,
    ResolvedRefs,
    Programmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
pub enum ConditionReason {
    Accepted,
    Programmed,
    Ready,
    Pending,
    Invalid,
    InvalidParameters,
    ListenersNotValid,
    Provisioning,
    Updated,
    UnableToProvision,
    WaitingToBecomeReady,
    AddressNotAssigned,
    UnsupportedProtocol,
    ProtocolConflict,
    HostnameConflict,
    NoConflicts,
    ResolvedRefs,
    InvalidRouteKinds,
    InvalidCertificateRef,
    RefNotPermitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }
}

pub fn new_condition(
    type_: impl AsRef<str>,
    status: impl Into<ConditionStatus>,
    reason: ConditionReason,
    message: impl Into<String>,
    observed_generation: Option<i64>,
) -> Condition {
    Condition {
        type_: type_.as_ref().to_string(),
        status: status.into().to_string(),
        reason: reason.to_string(),
        message: message.into(),
        observed_generation,
        last_transition_time: Time(Utc::now()),
    }
}

/// Condition storage of a resource, independent of where the resource keeps it.
pub trait HasConditions {
    fn conditions(&self) -> &[Condition];

    fn conditions_mut(&mut self) -> &mut Vec<Condition>;

    fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions().iter().find(|c| c.type_ == type_)
    }

    fn is_condition_true(&self, type_: &str) -> bool {
        self.condition(type_)
            .is_some_and(|c| c.status == ConditionStatus::True.as_ref())
    }

    /// Inserts or replaces the condition of the same type.
    ///
    /// The previous `lastTransitionTime` is kept while the status is unchanged.
    fn set_condition(&mut self, mut condition: Condition) {
        let conditions = self.conditions_mut();
        match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
            Some(existing) => {
                if existing.status == condition.status {
                    condition.last_transition_time = existing.last_transition_time.clone();
                }
                *existing = condition;
            }
            None => conditions.push(condition),
        }
    }
}

impl HasConditions for Vec<Condition> {
    fn conditions(&self) -> &[Condition] {
        self
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        self
    }
}

impl HasConditions for DataPlane {
    fn conditions(&self) -> &[Condition] {
        self.status.as_ref().map_or(&[], |s| s.conditions.as_slice())
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.status.get_or_insert_with(Default::default).conditions
    }
}

impl HasConditions for ControlPlane {
    fn conditions(&self) -> &[Condition] {
        self.status.as_ref().map_or(&[], |s| s.conditions.as_slice())
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.status.get_or_insert_with(Default::default).conditions
    }
}

/// A child is ready when its Ready condition is true and, when stamped,
/// was observed at the child's current generation.
pub fn is_ready<K: HasConditions + kube::Resource>(object: &K) -> bool {
    object.condition(READY_CONDITION).is_some_and(|c| {
        c.status == ConditionStatus::True.as_ref()
            && (c.observed_generation.is_none()
                || c.observed_generation == object.meta().generation)
    })
}
