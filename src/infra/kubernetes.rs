use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::{
    api::{apps::v1::Deployment, core::v1::Service, networking::v1::Ingress},
    NamespaceResourceScope,
};
use kube::{api::PostParams, Api, Client, Resource};
use log::debug;
use serde::{de::DeserializeOwned, Serialize};

use crate::domain::{
    error::StoreError,
    model::{Application, DependentKind, DependentObject, ObjectKey},
    port::{Lookup, ObjectStore},
};

/// [`ObjectStore`] backed by the Kubernetes API server. Updates are plain
/// replaces carrying the observed `resourceVersion`, so the server rejects
/// stale writes with 409.
pub struct KubeObjectStore {
    pub client: Client,
}

impl KubeObjectStore {
    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn fetch<K>(&self, kind: &'static str, key: &ObjectKey) -> Lookup<K>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        match self.api::<K>(&key.namespace).get(&key.name).await {
            Ok(object) => Lookup::Found(object),
            Err(kube::Error::Api(response)) if response.code == 404 => Lookup::NotFound,
            Err(error) => Lookup::Failed(store_error(kind, &key.name, error)),
        }
    }

    async fn create_object<K>(&self, kind: &'static str, object: &K) -> Result<K, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Serialize + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let (namespace, name) = placement(object);
        self.api::<K>(namespace)
            .create(&PostParams::default(), object)
            .await
            .map_err(|error| store_error(kind, name, error))
    }

    async fn replace_object<K>(&self, kind: &'static str, object: &K) -> Result<K, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Serialize + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let (namespace, name) = placement(object);
        self.api::<K>(namespace)
            .replace(name, &PostParams::default(), object)
            .await
            .map_err(|error| store_error(kind, name, error))
    }
}

fn placement<K: Resource>(object: &K) -> (&str, &str) {
    let meta = object.meta();
    (
        meta.namespace.as_deref().unwrap_or("default"),
        meta.name.as_deref().unwrap_or_default(),
    )
}

fn store_error(kind: &'static str, name: &str, error: kube::Error) -> StoreError {
    debug!("{} {} request failed: {:?}", kind, name, error);
    match error {
        kube::Error::Api(response) if response.code == 404 => StoreError::NotFound {
            kind,
            name: name.to_string(),
        },
        kube::Error::Api(response) if response.code == 409 => StoreError::Conflict {
            kind,
            name: name.to_string(),
        },
        kube::Error::Api(response) => StoreError::Rejected {
            code: response.code,
            reason: response.message,
        },
        other => StoreError::Transport(other.to_string()),
    }
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get_application(&self, key: &ObjectKey) -> Lookup<Application> {
        self.fetch::<Application>("Application", key).await
    }

    async fn get(&self, kind: DependentKind, key: &ObjectKey) -> Lookup<DependentObject> {
        match kind {
            DependentKind::Workload => self
                .fetch::<Deployment>(kind.as_str(), key)
                .await
                .map(DependentObject::Workload),
            DependentKind::NetworkService => self
                .fetch::<Service>(kind.as_str(), key)
                .await
                .map(DependentObject::NetworkService),
            DependentKind::Route => self
                .fetch::<Ingress>(kind.as_str(), key)
                .await
                .map(DependentObject::Route),
        }
    }

    async fn create(&self, object: &DependentObject) -> Result<DependentObject, StoreError> {
        let kind = object.kind().as_str();
        match object {
            DependentObject::Workload(deployment) => self
                .create_object(kind, deployment)
                .await
                .map(DependentObject::Workload),
            DependentObject::NetworkService(service) => self
                .create_object(kind, service)
                .await
                .map(DependentObject::NetworkService),
            DependentObject::Route(ingress) => self
                .create_object(kind, ingress)
                .await
                .map(DependentObject::Route),
        }
    }

    async fn update(&self, object: &DependentObject) -> Result<DependentObject, StoreError> {
        let kind = object.kind().as_str();
        match object {
            DependentObject::Workload(deployment) => self
                .replace_object(kind, deployment)
                .await
                .map(DependentObject::Workload),
            DependentObject::NetworkService(service) => self
                .replace_object(kind, service)
                .await
                .map(DependentObject::NetworkService),
            DependentObject::Route(ingress) => self
                .replace_object(kind, ingress)
                .await
                .map(DependentObject::Route),
        }
    }
}
