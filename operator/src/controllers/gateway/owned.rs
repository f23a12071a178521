use crate::kubernetes::ResourceClient;
use gateway_api::apis::standard::gateways::Gateway;
use kube::Resource;
use kube::api::ListParams;
use portico_api::constants::MANAGED_BY_GATEWAY_QUERY;

pub fn owned_list_params() -> ListParams {
    ListParams::default().labels(MANAGED_BY_GATEWAY_QUERY)
}

pub fn is_owned_by<K: Resource>(object: &K, gateway: &Gateway) -> bool {
    let Some(uid) = gateway.metadata.uid.as_deref() else {
        return false;
    };
    object
        .meta()
        .owner_references
        .iter()
        .flatten()
        .any(|owner| owner.uid == uid)
}

/// Lists the objects of one kind owned by `gateway`, terminating ones included.
pub async fn list_owned<K>(
    client: &dyn ResourceClient<K>,
    gateway: &Gateway,
) -> Result<Vec<K>, kube::Error>
where
    K: Resource + Send + Sync + 'static,
{
    let namespace = gateway.metadata.namespace.as_deref().unwrap_or_default();
    let objects = client.list(namespace, &owned_list_params()).await?;
    Ok(objects
        .into_iter()
        .filter(|object| is_owned_by(object, gateway))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeClient, gateway, http_and_https_listeners};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
    use kube::api::ObjectMeta;
    use portico_api::constants::{MANAGED_BY_GATEWAY, MANAGED_BY_LABEL};
    use portico_api::v1alpha1::DataPlane;
    use std::collections::BTreeMap;

    fn data_plane(name: &str, namespace: &str, owner_uid: &str, managed: bool) -> DataPlane {
        let labels = managed.then(|| {
            BTreeMap::from([(MANAGED_BY_LABEL.to_string(), MANAGED_BY_GATEWAY.to_string())])
        });
        DataPlane {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels,
                owner_references: Some(vec![OwnerReference {
                    api_version: "gateway.networking.k8s.io/v1".to_string(),
                    kind: "Gateway".to_string(),
                    name: "edge".to_string(),
                    uid: owner_uid.to_string(),
                    controller: Some(true),
                    ..OwnerReference::default()
                }]),
                ..ObjectMeta::default()
            },
            ..DataPlane::default()
        }
    }

    #[tokio::test]
    async fn test_lists_only_children_of_the_gateway() {
        let mut gateway = gateway("edge", "infra", "portico", http_and_https_listeners());
        gateway.metadata.uid = Some("gateway-uid".to_string());

        let client = FakeClient::with_objects(vec![
            data_plane("mine", "infra", "gateway-uid", true),
            data_plane("someone-elses", "infra", "other-uid", true),
            data_plane("unlabelled", "infra", "gateway-uid", false),
            data_plane("elsewhere", "apps", "gateway-uid", true),
        ]);

        let owned = list_owned(&client, &gateway).await.expect("list succeeds");
        let names: Vec<_> = owned
            .iter()
            .filter_map(|dp| dp.metadata.name.as_deref())
            .collect();
        assert_eq!(names, vec!["mine"]);
    }

    #[tokio::test]
    async fn test_gateway_without_uid_owns_nothing() {
        let gateway = gateway("edge", "infra", "portico", http_and_https_listeners());
        let client = FakeClient::with_objects(vec![data_plane("mine", "infra", "gateway-uid", true)]);

        let owned = list_owned(&client, &gateway).await.expect("list succeeds");
        assert!(owned.is_empty());
    }
}
