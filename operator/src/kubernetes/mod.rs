pub mod objects;
pub mod patch;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource};
#[cfg(test)]
use mockall::automock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::Debug;
use std::marker::PhantomData;
use tracing::debug;

/// The operations the controllers perform against the API server for one kind.
///
/// An empty `namespace` addresses every namespace for reads and the
/// cluster scope for cluster-scoped kinds.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceClient<K>: Send + Sync
where
    K: Send + Sync + 'static,
{
    /// Returns `None` when the object does not exist.
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, kube::Error>;

    async fn list(&self, namespace: &str, params: &ListParams) -> Result<Vec<K>, kube::Error>;

    async fn create(&self, namespace: &str, object: &K) -> Result<K, kube::Error>;

    /// Applies a JSON merge patch to the object.
    async fn patch(&self, namespace: &str, name: &str, patch: &Value) -> Result<K, kube::Error>;

    /// Applies a JSON merge patch to the status subresource.
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<K, kube::Error>;

    /// Deleting an object that is already gone is not an error.
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), kube::Error>;
}

type ApiConstructor<K> = fn(Client, &str) -> Api<K>;

pub struct KubeResourceClient<K> {
    client: Client,
    api: ApiConstructor<K>,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeResourceClient<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    K::DynamicType: Default,
{
    pub fn namespaced(client: Client) -> Self {
        Self {
            client,
            api: |client, namespace| {
                if namespace.is_empty() {
                    Api::all(client)
                } else {
                    Api::namespaced(client, namespace)
                }
            },
            _kind: PhantomData,
        }
    }
}

impl<K> KubeResourceClient<K>
where
    K: Resource,
    K::DynamicType: Default,
{
    pub fn cluster(client: Client) -> Self {
        Self {
            client,
            api: |client, _| Api::all(client),
            _kind: PhantomData,
        }
    }

    fn api(&self, namespace: &str) -> Api<K> {
        (self.api)(self.client.clone(), namespace)
    }
}

fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == 404)
}

#[async_trait]
impl<K> ResourceClient<K> for KubeResourceClient<K>
where
    K: Resource + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
    K::DynamicType: Default,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, kube::Error> {
        self.api(namespace).get_opt(name).await
    }

    async fn list(&self, namespace: &str, params: &ListParams) -> Result<Vec<K>, kube::Error> {
        Ok(self.api(namespace).list(params).await?.items)
    }

    async fn create(&self, namespace: &str, object: &K) -> Result<K, kube::Error> {
        self.api(namespace)
            .create(&PostParams::default(), object)
            .await
    }

    async fn patch(&self, namespace: &str, name: &str, patch: &Value) -> Result<K, kube::Error> {
        self.api(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<K, kube::Error> {
        self.api(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), kube::Error> {
        match self
            .api(namespace)
            .delete(name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if is_not_found(&err) => {
                debug!("{}/{} was already deleted", namespace, name);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}
