use std::collections::BTreeMap;

use map_macro::btree_map;

use super::{
    error::ReconcileError,
    model::{ApplicationSpec, DependentKind},
};

pub const APP_LABEL: &str = "app";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DesiredWorkload {
    pub name: String,
    pub container_name: String,
    pub image: String,
    pub container_port: i32,
    pub labels: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DesiredService {
    pub name: String,
    pub selector: BTreeMap<String, String>,
    pub port: i32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DesiredRoute {
    pub name: String,
    pub rules: Vec<DesiredRule>,
    pub backend_service: String,
    pub backend_port: i32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DesiredRule {
    pub host: String,
    pub paths: Vec<String>,
}

/// Desired spec of one dependent object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Desired {
    Workload(DesiredWorkload),
    NetworkService(DesiredService),
    Route(DesiredRoute),
}

impl Desired {
    pub fn kind(&self) -> DependentKind {
        match self {
            Desired::Workload(_) => DependentKind::Workload,
            Desired::NetworkService(_) => DependentKind::NetworkService,
            Desired::Route(_) => DependentKind::Route,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Desired::Workload(workload) => &workload.name,
            Desired::NetworkService(service) => &service.name,
            Desired::Route(route) => &route.name,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DesiredState {
    pub workload: DesiredWorkload,
    pub service: DesiredService,
    pub route: DesiredRoute,
}

impl DesiredState {
    /// Dependents in the order they must be converged: the route points at
    /// the service, so the service comes first.
    pub fn into_steps(self) -> [Desired; 3] {
        [
            Desired::Workload(self.workload),
            Desired::NetworkService(self.service),
            Desired::Route(self.route),
        ]
    }
}

/// Computes what the dependents of application `name` should look like.
pub fn synthesize(name: &str, spec: &ApplicationSpec) -> Result<DesiredState, ReconcileError> {
    validate(spec)?;
    let port = spec.service.port;
    let labels = btree_map! {
        APP_LABEL.to_string() => name.to_string(),
    };
    let service_name = DependentKind::NetworkService.object_name(name);

    Ok(DesiredState {
        workload: DesiredWorkload {
            name: DependentKind::Workload.object_name(name),
            container_name: name.to_string(),
            image: spec.image.reference(),
            container_port: port,
            labels: labels.clone(),
        },
        service: DesiredService {
            name: service_name.clone(),
            selector: labels,
            port,
        },
        route: DesiredRoute {
            name: DependentKind::Route.object_name(name),
            rules: spec
                .ingress
                .hosts
                .iter()
                .map(|host| DesiredRule {
                    host: host.host.clone(),
                    paths: host.paths.iter().map(|path| path.path.clone()).collect(),
                })
                .collect(),
            backend_service: service_name,
            backend_port: port,
        },
    })
}

fn validate(spec: &ApplicationSpec) -> Result<(), ReconcileError> {
    if !(1..=65535).contains(&spec.service.port) {
        return Err(ReconcileError::Validation(format!(
            "service port {} is outside 1-65535",
            spec.service.port
        )));
    }
    if spec.image.repository.is_empty() || spec.image.tag.is_empty() {
        return Err(ReconcileError::Validation(
            "image repository and tag must both be set".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{ImageSpec, IngressConfig, IngressHost, IngressPath, ServiceConfig};

    fn spec() -> ApplicationSpec {
        ApplicationSpec {
            image: ImageSpec {
                repository: "nginx".into(),
                tag: "1.25".into(),
            },
            service: ServiceConfig { port: 8080 },
            ingress: IngressConfig {
                hosts: vec![
                    IngressHost {
                        host: "web.example.com".into(),
                        paths: vec![IngressPath { path: "/".into() }],
                    },
                    IngressHost {
                        host: "api.example.com".into(),
                        paths: vec![
                            IngressPath { path: "/v1".into() },
                            IngressPath { path: "/v2".into() },
                        ],
                    },
                ],
            },
        }
    }

    #[test]
    fn derives_names_and_image() {
        let desired = synthesize("web", &spec()).unwrap();
        assert_eq!(desired.workload.name, "web-deployment");
        assert_eq!(desired.workload.container_name, "web");
        assert_eq!(desired.workload.image, "nginx:1.25");
        assert_eq!(desired.workload.container_port, 8080);
        assert_eq!(desired.service.name, "web-service");
        assert_eq!(desired.service.selector.get("app").map(String::as_str), Some("web"));
        assert_eq!(desired.route.name, "web-ingress");
        assert_eq!(desired.route.backend_service, "web-service");
        assert_eq!(desired.route.backend_port, 8080);
    }

    #[test]
    fn keeps_host_and_path_order() {
        let desired = synthesize("web", &spec()).unwrap();
        let hosts: Vec<&str> = desired.route.rules.iter().map(|rule| rule.host.as_str()).collect();
        assert_eq!(hosts, vec!["web.example.com", "api.example.com"]);
        assert_eq!(desired.route.rules[1].paths, vec!["/v1", "/v2"]);
    }

    #[test]
    fn is_deterministic() {
        assert_eq!(synthesize("web", &spec()).unwrap(), synthesize("web", &spec()).unwrap());
    }

    #[test]
    fn steps_run_workload_service_route() {
        let kinds: Vec<DependentKind> = synthesize("web", &spec())
            .unwrap()
            .into_steps()
            .iter()
            .map(Desired::kind)
            .collect();
        assert_eq!(kinds, DependentKind::ALL.to_vec());
    }

    #[test]
    fn rejects_out_of_range_port() {
        let mut spec = spec();
        spec.service.port = 70000;
        let error = synthesize("web", &spec).unwrap_err();
        assert!(matches!(error, ReconcileError::Validation(_)));
        assert!(!error.is_retryable());
    }

    #[test]
    fn rejects_empty_tag() {
        let mut spec = spec();
        spec.image.tag.clear();
        assert!(matches!(
            synthesize("web", &spec),
            Err(ReconcileError::Validation(_))
        ));
    }
}
