use crate::controllers::reference_grants::{GrantRequest, is_permitted};
use crate::kubernetes::ResourceClient;
use gateway_api::apis::standard::gatewayclasses::GatewayClass;
use gateway_api::apis::standard::gateways::Gateway;
use gateway_api::apis::standard::referencegrants::ReferenceGrant;
use portico_api::constants::{GATEWAY_API_GROUP, GATEWAY_CONFIGURATION_KIND, GATEWAY_KIND, GROUP};
use portico_api::v1alpha1::GatewayConfiguration;
use thiserror::Error;

/// A `parametersRef` the operator cannot use. Surfaced as a condition, never retried early.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParametersRefError {
    #[error("parametersRef must reference gateway-operator.portico.dev/GatewayConfiguration, not {group}/{kind}")]
    InvalidKind { group: String, kind: String },
    #[error("parametersRef to {0} must set a namespace")]
    MissingNamespace(String),
    #[error("GatewayConfiguration {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },
    #[error("no ReferenceGrant allows Gateways in {from_namespace} to reference GatewayConfiguration {namespace}/{name}")]
    NotPermitted {
        from_namespace: String,
        namespace: String,
        name: String,
    },
}

#[derive(Debug, Error)]
pub enum ResolveConfigurationError {
    #[error(transparent)]
    Invalid(#[from] ParametersRefError),
    #[error("Failed to resolve GatewayConfiguration: {0}")]
    Api(#[from] kube::Error),
}

/// Namespace and name of a GatewayConfiguration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationKey {
    pub namespace: String,
    pub name: String,
}

fn check_kind(group: &str, kind: &str) -> Result<(), ParametersRefError> {
    if group == GROUP && kind == GATEWAY_CONFIGURATION_KIND {
        Ok(())
    } else {
        Err(ParametersRefError::InvalidKind {
            group: group.to_string(),
            kind: kind.to_string(),
        })
    }
}

/// The GatewayConfiguration a class points at, if it points at one.
pub fn class_parameters_ref(
    class: &GatewayClass,
) -> Result<Option<ConfigurationKey>, ParametersRefError> {
    let Some(parameters_ref) = class.spec.parameters_ref.as_ref() else {
        return Ok(None);
    };
    check_kind(&parameters_ref.group, &parameters_ref.kind)?;
    let namespace = parameters_ref
        .namespace
        .clone()
        .filter(|ns| !ns.is_empty())
        .ok_or_else(|| ParametersRefError::MissingNamespace(parameters_ref.name.clone()))?;

    Ok(Some(ConfigurationKey {
        namespace,
        name: parameters_ref.name.clone(),
    }))
}

/// The GatewayConfiguration a Gateway points at through its infrastructure, if any.
pub fn gateway_parameters_ref(
    gateway: &Gateway,
) -> Result<Option<ConfigurationKey>, ParametersRefError> {
    let Some(parameters_ref) = gateway
        .spec
        .infrastructure
        .as_ref()
        .and_then(|infra| infra.parameters_ref.as_ref())
    else {
        return Ok(None);
    };
    check_kind(&parameters_ref.group, &parameters_ref.kind)?;

    Ok(Some(ConfigurationKey {
        namespace: gateway.metadata.namespace.clone().unwrap_or_default(),
        name: parameters_ref.name.clone(),
    }))
}

/// Resolves the GatewayConfiguration for a Gateway.
///
/// The Gateway's own infrastructure reference wins over the class reference.
/// A class reference into another namespace must be allowed by a ReferenceGrant.
pub async fn resolve_configuration(
    configurations: &dyn ResourceClient<GatewayConfiguration>,
    reference_grants: &dyn ResourceClient<ReferenceGrant>,
    gateway: &Gateway,
    class: &GatewayClass,
) -> Result<Option<GatewayConfiguration>, ResolveConfigurationError> {
    let gateway_namespace = gateway.metadata.namespace.clone().unwrap_or_default();

    let key = match gateway_parameters_ref(gateway)? {
        Some(key) => key,
        None => match class_parameters_ref(class)? {
            Some(key) => {
                let request = GrantRequest::builder()
                    .from_group(GATEWAY_API_GROUP)
                    .from_kind(GATEWAY_KIND)
                    .from_namespace(gateway_namespace.clone())
                    .to_group(GROUP)
                    .to_kind(GATEWAY_CONFIGURATION_KIND)
                    .to_namespace(key.namespace.clone())
                    .to_name(key.name.clone())
                    .build();
                if !is_permitted(reference_grants, &request).await? {
                    return Err(ParametersRefError::NotPermitted {
                        from_namespace: gateway_namespace,
                        namespace: key.namespace,
                        name: key.name,
                    }
                    .into());
                }
                key
            }
            None => return Ok(None),
        },
    };

    let configuration = configurations
        .get(&key.namespace, &key.name)
        .await?
        .ok_or(ParametersRefError::NotFound {
            namespace: key.namespace,
            name: key.name,
        })?;

    Ok(Some(configuration))
}
