use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use futures::{FutureExt, StreamExt};
use k8s_openapi::{
    api::{apps::v1::Deployment, core::v1::Service, networking::v1::Ingress},
    NamespaceResourceScope,
};
use kube::{
    runtime::{controller::Action, watcher, Controller},
    Api, Client, Resource, ResourceExt,
};
use log::{debug, error, info, warn};
use tokio::sync::{oneshot, Mutex as PassLock};
use tokio_util::sync::CancellationToken;

use crate::domain::{
    error::ReconcileError,
    model::{Application, ObjectKey},
    Outcome, ReconciliationService,
};

/// Shared by the controller loop and the HTTP surface.
pub struct Context {
    pub service: ReconciliationService,
    pub error_backoff: Duration,
    pub conflict_backoff: Duration,
    /// Fired on shutdown; aborts in-flight passes.
    pub shutdown: CancellationToken,
    /// One lock per Application in flight. The controller queue already
    /// serializes its own passes; this also covers manual triggers.
    passes: Mutex<HashMap<ObjectKey, Arc<PassLock<()>>>>,
}

impl Context {
    pub fn new(
        service: ReconciliationService,
        error_backoff: Duration,
        conflict_backoff: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            service,
            error_backoff,
            conflict_backoff,
            shutdown,
            passes: Mutex::new(HashMap::new()),
        }
    }

    /// Runs one pass for `key`, waiting for any other pass on the same
    /// Application to finish first.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Outcome, ReconcileError> {
        let lock = self.pass_lock(key);
        let pass = lock.lock().await;
        let result = self.service.reconcile(key, &self.shutdown).await;
        drop(pass);
        self.release(key, &lock);
        result
    }

    fn pass_lock(&self, key: &ObjectKey) -> Arc<PassLock<()>> {
        let mut passes = self.passes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        passes.entry(key.clone()).or_default().clone()
    }

    fn release(&self, key: &ObjectKey, lock: &Arc<PassLock<()>>) {
        let mut passes = self.passes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Map entry plus ours: nobody else is waiting.
        if Arc::strong_count(lock) == 2 {
            passes.remove(key);
        }
    }

    #[cfg(test)]
    fn tracked_passes(&self) -> usize {
        self.passes.lock().unwrap().len()
    }
}

/// Watches Applications and their owned Deployments, Services and Ingresses
/// until `context.shutdown` fires.
pub async fn run(client: Client, context: Arc<Context>, namespace: Option<String>) {
    let namespace = namespace.as_deref();
    let (stop, stopped) = oneshot::channel::<()>();
    let shutdown = context.shutdown.clone();
    tokio::spawn(async move {
        shutdown.cancelled().await;
        let _ = stop.send(());
    });

    info!(
        "Watching Applications in {}",
        namespace.unwrap_or("all namespaces")
    );
    Controller::new(scoped::<Application>(&client, namespace), watcher::Config::default())
        .owns(scoped::<Deployment>(&client, namespace), watcher::Config::default())
        .owns(scoped::<Service>(&client, namespace), watcher::Config::default())
        .owns(scoped::<Ingress>(&client, namespace), watcher::Config::default())
        .graceful_shutdown_on(stopped.map(|_| ()))
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((application, action)) => debug!("Reconciled {} : {:?}", application, action),
                Err(error) => warn!("Reconciliation error : {}", error),
            }
        })
        .await;
    info!("Controller stopped");
}

fn scoped<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    <K as Resource>::DynamicType: Default,
{
    match namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    }
}

pub fn key_of(application: &Application) -> ObjectKey {
    ObjectKey::new(application.namespace().unwrap_or_default(), application.name_any())
}

async fn reconcile(application: Arc<Application>, context: Arc<Context>) -> Result<Action, ReconcileError> {
    let key = key_of(&application);
    let outcome = context.reconcile(&key).await?;
    Ok(action(outcome))
}

fn action(outcome: Outcome) -> Action {
    match outcome {
        Outcome { requeue: false, .. } => Action::await_change(),
        Outcome {
            requeue_after: Some(after),
            ..
        } => Action::requeue(after),
        Outcome { .. } => Action::requeue(Duration::ZERO),
    }
}

fn error_policy(application: Arc<Application>, error: &ReconcileError, context: Arc<Context>) -> Action {
    let key = key_of(&application);
    if error.is_cancelled() {
        info!("Application {} : reconciliation cancelled", key);
        Action::await_change()
    } else if !error.is_retryable() {
        error!("Application {} : {}. Waiting for the next change", key, error);
        Action::await_change()
    } else if error.is_conflict() {
        warn!("Application {} : {}. Retrying shortly", key, error);
        Action::requeue(context.conflict_backoff)
    } else {
        error!("Application {} : {}. Retrying in {:?}", key, error, context.error_backoff);
        Action::requeue(context.error_backoff)
    }
}
