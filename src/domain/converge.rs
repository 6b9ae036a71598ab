use k8s_openapi::{
    api::{
        apps::v1::{Deployment, DeploymentSpec},
        core::v1::{Container, ContainerPort, PodSpec, PodTemplateSpec, Service, ServicePort, ServiceSpec},
        networking::v1::{
            HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
            IngressServiceBackend, IngressSpec, ServiceBackendPort,
        },
    },
    apimachinery::pkg::{apis::meta::v1::LabelSelector, util::intstr::IntOrString},
};
use kube::api::ObjectMeta;
use log::{debug, info};
use tokio_util::sync::CancellationToken;

use super::{
    cancellable,
    error::{ReconcileError, StoreError},
    model::{Application, DependentObject, ObjectKey},
    ownership::attach_owner,
    port::{Lookup, ObjectStore},
    synthesize::{Desired, DesiredRoute, DesiredService, DesiredWorkload},
};

const PROTOCOL_TCP: &str = "TCP";
const PORT_NAME: &str = "http";
const PATH_TYPE: &str = "ImplementationSpecific";

/// What a converge step did to the stored object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Convergence {
    Created,
    Updated,
    Unchanged,
}

/// Brings one dependent object in `namespace` to its desired state: creates it
/// (linked to `owner`) when absent, rewrites the fields this controller owns
/// when they drifted, and leaves it alone otherwise.
pub async fn converge(
    store: &dyn ObjectStore,
    cancel: &CancellationToken,
    namespace: &str,
    desired: &Desired,
    owner: &Application,
) -> Result<Convergence, ReconcileError> {
    let kind = desired.kind().as_str();
    let key = ObjectKey::new(namespace, desired.name());

    match cancellable(cancel, store.get(desired.kind(), &key)).await? {
        Lookup::Failed(source) => Err(ReconcileError::Fetch {
            kind,
            name: key.name,
            source,
        }),
        Lookup::NotFound => {
            let mut object = desired.build(namespace);
            attach_owner(&mut object, owner)?;
            cancellable(cancel, store.create(&object))
                .await?
                .map_err(|source| ReconcileError::Create {
                    kind,
                    name: key.name.clone(),
                    source,
                })?;
            info!("{} {} created", kind, key);
            Ok(Convergence::Created)
        }
        Lookup::Found(observed) => match desired.merge(&observed) {
            Err(source) => Err(ReconcileError::Fetch {
                kind,
                name: key.name,
                source,
            }),
            Ok(None) => {
                debug!("{} {} is up-to-date", kind, key);
                Ok(Convergence::Unchanged)
            }
            Ok(Some(merged)) => {
                cancellable(cancel, store.update(&merged))
                    .await?
                    .map_err(|source| ReconcileError::Update {
                        kind,
                        name: key.name.clone(),
                        source,
                    })?;
                info!("{} {} updated", kind, key);
                Ok(Convergence::Updated)
            }
        },
    }
}

impl Desired {
    /// Fresh object for the create path, without owner reference.
    pub fn build(&self, namespace: &str) -> DependentObject {
        match self {
            Desired::Workload(workload) => DependentObject::Workload(build_workload(workload, namespace)),
            Desired::NetworkService(service) => {
                DependentObject::NetworkService(build_service(service, namespace))
            }
            Desired::Route(route) => DependentObject::Route(build_route(route, namespace)),
        }
    }

    /// Copy of `observed` with owned fields set to their desired values, or
    /// `None` when they already match.
    pub fn merge(&self, observed: &DependentObject) -> Result<Option<DependentObject>, StoreError> {
        let mut merged = observed.clone();
        let changed = match (self, &mut merged) {
            (Desired::Workload(desired), DependentObject::Workload(deployment)) => {
                apply_workload(desired, deployment)
            }
            (Desired::NetworkService(desired), DependentObject::NetworkService(service)) => {
                apply_service(desired, service)
            }
            (Desired::Route(desired), DependentObject::Route(ingress)) => apply_route(desired, ingress),
            _ => {
                return Err(StoreError::UnexpectedKind {
                    expected: self.kind().as_str(),
                    found: observed.kind().as_str(),
                })
            }
        };
        Ok(changed.then_some(merged))
    }
}

fn metadata(name: &str, namespace: &str, labels: &std::collections::BTreeMap<String, String>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_owned()),
        namespace: Some(namespace.to_owned()),
        labels: Some(labels.clone()),
        ..Default::default()
    }
}

impl DesiredWorkload {
    fn container(&self) -> Container {
        Container {
            name: self.container_name.clone(),
            image: Some(self.image.clone()),
            ports: Some(vec![self.port()]),
            ..Default::default()
        }
    }

    fn port(&self) -> ContainerPort {
        ContainerPort {
            container_port: self.container_port,
            name: Some(PORT_NAME.to_string()),
            protocol: Some(PROTOCOL_TCP.to_string()),
            ..Default::default()
        }
    }
}

fn build_workload(desired: &DesiredWorkload, namespace: &str) -> Deployment {
    Deployment {
        metadata: metadata(&desired.name, namespace, &desired.labels),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(desired.labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(desired.labels.clone()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![desired.container()],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Owned: image and first port of the container named after the
/// application (or the first container when none is).
fn apply_workload(desired: &DesiredWorkload, deployment: &mut Deployment) -> bool {
    let containers = &mut deployment
        .spec
        .get_or_insert_with(Default::default)
        .template
        .spec
        .get_or_insert_with(Default::default)
        .containers;
    let index = containers
        .iter()
        .position(|container| container.name == desired.container_name)
        .or(if containers.is_empty() { None } else { Some(0) });
    let container = match index {
        Some(index) => &mut containers[index],
        None => {
            containers.push(desired.container());
            return true;
        }
    };

    let mut changed = false;
    if container.image.as_deref() != Some(desired.image.as_str()) {
        container.image = Some(desired.image.clone());
        changed = true;
    }
    let ports = container.ports.get_or_insert_with(Vec::new);
    match ports.first_mut() {
        Some(port) if port.container_port == desired.container_port => {}
        Some(port) => {
            port.container_port = desired.container_port;
            changed = true;
        }
        None => {
            ports.push(desired.port());
            changed = true;
        }
    }
    changed
}

impl DesiredService {
    fn port(&self) -> ServicePort {
        ServicePort {
            port: self.port,
            target_port: Some(IntOrString::Int(self.port)),
            protocol: Some(PROTOCOL_TCP.to_string()),
            ..Default::default()
        }
    }
}

fn build_service(desired: &DesiredService, namespace: &str) -> Service {
    Service {
        metadata: metadata(&desired.name, namespace, &desired.selector),
        spec: Some(ServiceSpec {
            selector: Some(desired.selector.clone()),
            ports: Some(vec![desired.port()]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Owned: port and target port of the first service port.
fn apply_service(desired: &DesiredService, service: &mut Service) -> bool {
    let target = IntOrString::Int(desired.port);
    let ports = service
        .spec
        .get_or_insert_with(Default::default)
        .ports
        .get_or_insert_with(Vec::new);
    match ports.first_mut() {
        Some(port) if port.port == desired.port && port.target_port.as_ref() == Some(&target) => false,
        Some(port) => {
            port.port = desired.port;
            port.target_port = Some(target);
            true
        }
        None => {
            ports.push(desired.port());
            true
        }
    }
}

impl DesiredRoute {
    fn rules(&self) -> Vec<IngressRule> {
        self.rules
            .iter()
            .map(|rule| IngressRule {
                host: non_empty(&rule.host),
                http: (!rule.paths.is_empty()).then(|| HTTPIngressRuleValue {
                    paths: rule
                        .paths
                        .iter()
                        .map(|path| HTTPIngressPath {
                            path: non_empty(path),
                            path_type: PATH_TYPE.to_string(),
                            backend: self.backend(),
                        })
                        .collect(),
                }),
            })
            .collect()
    }

    fn backend(&self) -> IngressBackend {
        IngressBackend {
            service: Some(IngressServiceBackend {
                name: self.backend_service.clone(),
                port: Some(ServiceBackendPort {
                    number: Some(self.backend_port),
                    ..Default::default()
                }),
            }),
            ..Default::default()
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn build_route(desired: &DesiredRoute, namespace: &str) -> Ingress {
    Ingress {
        metadata: ObjectMeta {
            name: Some(desired.name.clone()),
            namespace: Some(namespace.to_owned()),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            rules: Some(desired.rules()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Owned: the whole rule list. An absent list counts as empty.
fn apply_route(desired: &DesiredRoute, ingress: &mut Ingress) -> bool {
    let rules = desired.rules();
    let spec = ingress.spec.get_or_insert_with(Default::default);
    if spec.rules.as_deref().unwrap_or_default() == rules.as_slice() {
        return false;
    }
    spec.rules = Some(rules);
    true
}
