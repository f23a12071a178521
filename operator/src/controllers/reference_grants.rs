use crate::kubernetes::ResourceClient;
use gateway_api::apis::standard::referencegrants::ReferenceGrant;
use kube::api::ListParams;
use typed_builder::TypedBuilder;

/// A cross-namespace reference that needs a ReferenceGrant in the target namespace.
#[derive(Debug, Clone, TypedBuilder, PartialEq, Eq)]
#[builder(field_defaults(setter(into)))]
pub struct GrantRequest {
    from_group: String,
    from_kind: String,
    from_namespace: String,
    to_group: String,
    to_kind: String,
    to_namespace: String,
    to_name: String,
}

/// Whether `grant` allows the reference described by `request`.
pub fn grant_permits(grant: &ReferenceGrant, request: &GrantRequest) -> bool {
    if grant.metadata.namespace.as_deref() != Some(request.to_namespace.as_str()) {
        return false;
    }

    let from = grant.spec.from.iter().any(|from| {
        from.group == request.from_group
            && from.kind == request.from_kind
            && from.namespace == request.from_namespace
    });

    let to = grant.spec.to.iter().any(|to| {
        to.group == request.to_group
            && to.kind == request.to_kind
            && to.name.as_deref().is_none_or(|name| name == request.to_name)
    });

    from && to
}

/// References within one namespace never need a grant.
pub async fn is_permitted(
    client: &dyn ResourceClient<ReferenceGrant>,
    request: &GrantRequest,
) -> Result<bool, kube::Error> {
    if request.from_namespace == request.to_namespace {
        return Ok(true);
    }

    let grants = client
        .list(&request.to_namespace, &ListParams::default())
        .await?;

    Ok(grants.iter().any(|grant| grant_permits(grant, request)))
}
