use getset::Getters;
use kube::Resource;
use std::fmt::{Display, Formatter, Write};
use thiserror::Error;
use typed_builder::TypedBuilder;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ObjectRefError {
    #[error("Object is missing a name")]
    MissingName,
}

/// Identity of a Kubernetes object used for logging and per-object bookkeeping.
#[derive(TypedBuilder, Getters, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    #[getset(get = "pub")]
    #[builder(setter(into))]
    kind: String,

    #[getset(get = "pub")]
    #[builder(default, setter(into))]
    group: Option<String>,

    #[getset(get = "pub")]
    #[builder(default, setter(into))]
    namespace: Option<String>,

    #[getset(get = "pub")]
    #[builder(setter(into))]
    name: String,
}

impl Display for ObjectRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind())?;
        if let Some(group) = self.group() {
            f.write_char('.')?;
            f.write_str(group)?;
        }
        f.write_char('/')?;
        if let Some(namespace) = self.namespace() {
            f.write_str(namespace)?;
            f.write_char('/')?;
        }
        f.write_str(self.name())
    }
}

impl ObjectRef {
    #[allow(clippy::type_complexity)] // Generated type
    pub fn of_kind<K: Resource>() -> ObjectRefBuilder<((String,), (Option<String>,), (), ())>
    where
        K::DynamicType: 'static + Default,
    {
        let dynamic_type = K::DynamicType::default();
        let kind = K::kind(&dynamic_type);
        let group = K::group(&dynamic_type);

        let builder = ObjectRef::builder().kind(kind);

        if group.is_empty() {
            builder.group(None)
        } else {
            builder.group(Some(group.to_string()))
        }
    }

    pub fn for_object<K: Resource>(object: &K) -> Result<Self, ObjectRefError>
    where
        K::DynamicType: 'static + Default,
    {
        let meta = object.meta();
        let name = meta.name.clone().ok_or(ObjectRefError::MissingName)?;

        Ok(Self::of_kind::<K>()
            .namespace(meta.namespace.clone())
            .name(name)
            .build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_api::apis::standard::gateways::Gateway;
    use k8s_openapi::api::networking::v1::NetworkPolicy;
    use kube::api::ObjectMeta;
    use portico_api::v1alpha1::DataPlane;

    #[test]
    fn test_display_namespaced_custom_resource() {
        let data_plane = DataPlane {
            metadata: ObjectMeta {
                name: Some("edge-x7k2q".to_string()),
                namespace: Some("infra".to_string()),
                ..ObjectMeta::default()
            },
            ..DataPlane::default()
        };

        let object_ref = ObjectRef::for_object(&data_plane).expect("DataPlane has a name");
        assert_eq!(
            object_ref.to_string(),
            "DataPlane.gateway-operator.portico.dev/infra/edge-x7k2q"
        );
    }

    #[test]
    fn test_display_core_group_is_omitted() {
        let object_ref = ObjectRef::of_kind::<NetworkPolicy>()
            .namespace(Some("infra".to_string()))
            .name("edge")
            .build();

        assert_eq!(object_ref.to_string(), "NetworkPolicy.networking.k8s.io/infra/edge");
    }

    #[test]
    fn test_missing_name_is_an_error() {
        let gateway: Gateway = serde_json::from_value(serde_json::json!({
            "apiVersion": "gateway.networking.k8s.io/v1",
            "kind": "Gateway",
            "metadata": { "namespace": "infra" },
            "spec": { "gatewayClassName": "portico", "listeners": [] }
        }))
        .expect("Gateway should deserialize");

        assert_eq!(
            ObjectRef::for_object(&gateway),
            Err(ObjectRefError::MissingName)
        );
    }
}
