use std::{future::Future, time::Duration};

use converge::{converge, Convergence};
use error::ReconcileError;
use log::{info, warn};
use model::ObjectKey;
use port::{Lookup, ObjectStore};
use serde::Deserialize;
use synthesize::synthesize;
use tokio_util::sync::CancellationToken;

pub mod converge;
pub mod error;
pub mod model;
pub mod ownership;
pub mod port;
pub mod synthesize;

#[cfg(test)]
pub mod fake;

/// What to do when one dependent fails to converge.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Attempt every dependent and report all failures together.
    #[default]
    BestEffort,
    /// Stop the pass at the first failing dependent.
    AbortOnFirstFailure,
}

/// Requeue decision handed back to the event source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Outcome {
    pub requeue: bool,
    pub requeue_after: Option<Duration>,
}

impl Outcome {
    pub fn done() -> Self {
        Self::default()
    }

    pub fn requeue_after(after: Duration) -> Self {
        Self {
            requeue: true,
            requeue_after: Some(after),
        }
    }
}

pub struct ReconciliationService {
    pub store: Box<dyn ObjectStore>,
    pub failure_policy: FailurePolicy,
    pub resync_interval: Option<Duration>,
}

impl ReconciliationService {
    pub fn new(store: Box<dyn ObjectStore>) -> Self {
        Self {
            store,
            failure_policy: FailurePolicy::default(),
            resync_interval: None,
        }
    }

    /// One reconciliation pass for the Application at `key`. Every store call
    /// is raced against `cancel`; nothing is retried here.
    pub async fn reconcile(
        &self,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<Outcome, ReconcileError> {
        let application = match cancellable(cancel, self.store.get_application(key)).await? {
            Lookup::Found(application) => application,
            Lookup::NotFound => {
                info!("Application {} not found, nothing to reconcile", key);
                return Ok(Outcome::done());
            }
            Lookup::Failed(source) => {
                return Err(ReconcileError::Fetch {
                    kind: "Application",
                    name: key.name.clone(),
                    source,
                })
            }
        };

        let desired = synthesize(&key.name, &application.spec)?;
        let mut failures = Vec::new();
        let mut results = Vec::new();
        for step in desired.into_steps() {
            match converge(self.store.as_ref(), cancel, &key.namespace, &step, &application).await {
                Ok(result) => results.push(result),
                Err(ReconcileError::Cancelled) => return Err(ReconcileError::Cancelled),
                Err(error) if self.failure_policy == FailurePolicy::AbortOnFirstFailure => {
                    return Err(error)
                }
                Err(error) => {
                    warn!("Application {} : {} did not converge: {}", key, step.kind(), error);
                    failures.push(error);
                }
            }
        }

        if !failures.is_empty() {
            return Err(ReconcileError::Converge(failures));
        }
        info!("Application {} {}", key, pass_summary(&results));
        Ok(match self.resync_interval {
            Some(interval) => Outcome::requeue_after(interval),
            None => Outcome::done(),
        })
    }
}

fn pass_summary(results: &[Convergence]) -> String {
    let count = |wanted: Convergence| results.iter().filter(|result| **result == wanted).count();
    match (count(Convergence::Created), count(Convergence::Updated)) {
        (0, 0) => "is up-to-date".to_string(),
        (created, updated) => format!("converged : {} created, {} updated", created, updated),
    }
}

/// Runs `call` unless `cancel` fires first.
pub(crate) async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    call: F,
) -> Result<F::Output, ReconcileError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ReconcileError::Cancelled),
        output = call => Ok(output),
    }
}
