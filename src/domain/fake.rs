//! In-memory [`ObjectStore`] for tests: records every call, enforces resource
//! versions like the API server, and can be told to fail or hang.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use super::{
    error::StoreError,
    model::{
        Application, ApplicationSpec, DependentKind, DependentObject, ImageSpec, IngressConfig,
        IngressHost, IngressPath, ObjectKey, ServiceConfig,
    },
    port::{Lookup, ObjectStore},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreCall {
    GetApplication(ObjectKey),
    Get(DependentKind, ObjectKey),
    Create(DependentKind, ObjectKey),
    Update(DependentKind, ObjectKey),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Operation {
    Get,
    Create,
    Update,
}

#[derive(Default)]
struct State {
    applications: HashMap<ObjectKey, Application>,
    application_fault: Option<StoreError>,
    objects: BTreeMap<(DependentKind, ObjectKey), DependentObject>,
    faults: HashMap<(Operation, DependentKind), StoreError>,
    hangs: HashSet<DependentKind>,
    yield_reads: bool,
    calls: Vec<StoreCall>,
    version: u64,
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn with_application(application: Application) -> Self {
        let store = Self::default();
        store.put_application(application);
        store
    }

    pub fn put_application(&self, application: Application) {
        let key = ObjectKey::new(
            application.metadata.namespace.clone().unwrap_or_default(),
            application.metadata.name.clone().unwrap_or_default(),
        );
        self.state.lock().unwrap().applications.insert(key, application);
    }

    pub fn fail_application_get(&self, error: StoreError) {
        self.state.lock().unwrap().application_fault = Some(error);
    }

    pub fn fail_get(&self, kind: DependentKind, error: StoreError) {
        self.fail(Operation::Get, kind, error);
    }

    pub fn fail_create(&self, kind: DependentKind, error: StoreError) {
        self.fail(Operation::Create, kind, error);
    }

    pub fn fail_update(&self, kind: DependentKind, error: StoreError) {
        self.fail(Operation::Update, kind, error);
    }

    fn fail(&self, operation: Operation, kind: DependentKind, error: StoreError) {
        self.state.lock().unwrap().faults.insert((operation, kind), error);
    }

    pub fn clear_faults(&self) {
        let mut state = self.state.lock().unwrap();
        state.faults.clear();
        state.application_fault = None;
    }

    /// Reads of `kind` never complete.
    pub fn hang_on(&self, kind: DependentKind) {
        self.state.lock().unwrap().hangs.insert(kind);
    }

    /// Reads give way to other tasks before answering, so concurrent passes
    /// interleave the way they do against a real API server.
    pub fn yield_after_reads(&self) {
        self.state.lock().unwrap().yield_reads = true;
    }

    fn yields(&self) -> bool {
        self.state.lock().unwrap().yield_reads
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn writes(&self) -> Vec<StoreCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, StoreCall::Create(..) | StoreCall::Update(..)))
            .collect()
    }

    pub fn object(&self, kind: DependentKind, key: &ObjectKey) -> Option<DependentObject> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&(kind, key.clone()))
            .cloned()
    }

    /// Edits a stored object out of band, bumping its resource version.
    pub fn edit(&self, kind: DependentKind, key: &ObjectKey, edit: impl FnOnce(&mut DependentObject)) {
        let mut state = self.state.lock().unwrap();
        state.version += 1;
        let version = state.version.to_string();
        let object = state
            .objects
            .get_mut(&(kind, key.clone()))
            .expect("object to edit must exist");
        edit(object);
        object.metadata_mut().resource_version = Some(version);
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn get_application(&self, key: &ObjectKey) -> Lookup<Application> {
        let lookup = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(StoreCall::GetApplication(key.clone()));
            match (state.application_fault.clone(), state.applications.get(key)) {
                (Some(error), _) => Lookup::Failed(error),
                (None, Some(application)) => Lookup::Found(application.clone()),
                (None, None) => Lookup::NotFound,
            }
        };
        if self.yields() {
            tokio::task::yield_now().await;
        }
        lookup
    }

    async fn get(&self, kind: DependentKind, key: &ObjectKey) -> Lookup<DependentObject> {
        let lookup = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(StoreCall::Get(kind, key.clone()));
            if state.hangs.contains(&kind) {
                None
            } else if let Some(error) = state.faults.get(&(Operation::Get, kind)) {
                Some(Lookup::Failed(error.clone()))
            } else {
                Some(match state.objects.get(&(kind, key.clone())) {
                    Some(object) => Lookup::Found(object.clone()),
                    None => Lookup::NotFound,
                })
            }
        };
        match lookup {
            Some(lookup) => {
                if self.yields() {
                    tokio::task::yield_now().await;
                }
                lookup
            }
            None => std::future::pending().await,
        }
    }

    async fn create(&self, object: &DependentObject) -> Result<DependentObject, StoreError> {
        let kind = object.kind();
        let key = object.key();
        let mut state = self.state.lock().unwrap();
        state.calls.push(StoreCall::Create(kind, key.clone()));
        if let Some(error) = state.faults.get(&(Operation::Create, kind)) {
            return Err(error.clone());
        }
        if state.objects.contains_key(&(kind, key.clone())) {
            return Err(StoreError::Conflict {
                kind: kind.as_str(),
                name: key.name,
            });
        }
        state.version += 1;
        let mut stored = object.clone();
        stored.metadata_mut().resource_version = Some(state.version.to_string());
        state.objects.insert((kind, key), stored.clone());
        Ok(stored)
    }

    async fn update(&self, object: &DependentObject) -> Result<DependentObject, StoreError> {
        let kind = object.kind();
        let key = object.key();
        let mut state = self.state.lock().unwrap();
        state.calls.push(StoreCall::Update(kind, key.clone()));
        if let Some(error) = state.faults.get(&(Operation::Update, kind)) {
            return Err(error.clone());
        }
        let current = match state.objects.get(&(kind, key.clone())) {
            Some(current) => current.metadata().resource_version.clone(),
            None => {
                return Err(StoreError::NotFound {
                    kind: kind.as_str(),
                    name: key.name,
                })
            }
        };
        if current != object.metadata().resource_version {
            return Err(StoreError::Conflict {
                kind: kind.as_str(),
                name: key.name,
            });
        }
        state.version += 1;
        let mut stored = object.clone();
        stored.metadata_mut().resource_version = Some(state.version.to_string());
        state.objects.insert((kind, key), stored.clone());
        Ok(stored)
    }
}

/// Application in namespace `default` running `nginx:<tag>` on port 8080,
/// routed from `<name>.example.com/`.
pub fn application(name: &str, tag: &str) -> Application {
    let mut application = Application::new(
        name,
        ApplicationSpec {
            image: ImageSpec {
                repository: "nginx".to_string(),
                tag: tag.to_string(),
            },
            service: ServiceConfig { port: 8080 },
            ingress: IngressConfig {
                hosts: vec![IngressHost {
                    host: format!("{}.example.com", name),
                    paths: vec![IngressPath {
                        path: "/".to_string(),
                    }],
                }],
            },
        },
    );
    application.metadata.namespace = Some("default".to_string());
    application.metadata.uid = Some(format!("{}-uid", name));
    application
}
