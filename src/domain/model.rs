use std::fmt;

use k8s_openapi::{
    api::{apps::v1::Deployment, core::v1::Service, networking::v1::Ingress},
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use kube::{CustomResource, CustomResourceExt, Resource};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Declarative description of a containerized workload. Owned by users; this
/// controller only ever reads it.
#[derive(CustomResource, Serialize, Deserialize, Debug, Clone, JsonSchema, PartialEq)]
#[kube(
    group = "almc.applicationmgr.io",
    version = "v1",
    kind = "Application",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    pub image: ImageSpec,
    pub service: ServiceConfig,
    #[serde(default)]
    pub ingress: IngressConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, PartialEq)]
pub struct ImageSpec {
    pub repository: String,
    pub tag: String,
}

impl ImageSpec {
    pub fn reference(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, PartialEq)]
pub struct ServiceConfig {
    #[schemars(range(min = 1, max = 65535))]
    pub port: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, JsonSchema, PartialEq)]
pub struct IngressConfig {
    #[serde(default)]
    pub hosts: Vec<IngressHost>,
}

#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, PartialEq)]
pub struct IngressHost {
    pub host: String,
    #[serde(default)]
    pub paths: Vec<IngressPath>,
}

#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, PartialEq)]
pub struct IngressPath {
    pub path: String,
}

/// Namespace-scoped identity of a stored object.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// The objects derived from an Application, in convergence order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DependentKind {
    Workload,
    NetworkService,
    Route,
}

impl DependentKind {
    pub const ALL: [DependentKind; 3] = [
        DependentKind::Workload,
        DependentKind::NetworkService,
        DependentKind::Route,
    ];

    /// Kubernetes kind backing this dependent.
    pub fn as_str(self) -> &'static str {
        match self {
            DependentKind::Workload => "Deployment",
            DependentKind::NetworkService => "Service",
            DependentKind::Route => "Ingress",
        }
    }

    pub fn object_name(self, application: &str) -> String {
        let suffix = match self {
            DependentKind::Workload => "deployment",
            DependentKind::NetworkService => "service",
            DependentKind::Route => "ingress",
        };
        format!("{}-{}", application, suffix)
    }
}

impl fmt::Display for DependentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DependentObject {
    Workload(Deployment),
    NetworkService(Service),
    Route(Ingress),
}

impl DependentObject {
    pub fn kind(&self) -> DependentKind {
        match self {
            DependentObject::Workload(_) => DependentKind::Workload,
            DependentObject::NetworkService(_) => DependentKind::NetworkService,
            DependentObject::Route(_) => DependentKind::Route,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            DependentObject::Workload(deployment) => deployment.meta(),
            DependentObject::NetworkService(service) => service.meta(),
            DependentObject::Route(ingress) => ingress.meta(),
        }
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            DependentObject::Workload(deployment) => deployment.meta_mut(),
            DependentObject::NetworkService(service) => service.meta_mut(),
            DependentObject::Route(ingress) => ingress.meta_mut(),
        }
    }

    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(
            self.metadata().namespace.clone().unwrap_or_default(),
            self.name(),
        )
    }
}

/// The Application CustomResourceDefinition as a YAML manifest, ready for
/// `kubectl apply -f -`.
pub fn crd_manifest() -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(&Application::crd())
}
