use async_trait::async_trait;

use super::{
    error::StoreError,
    model::{Application, DependentKind, DependentObject, ObjectKey},
};

/// Result of reading one object. Failures are kept apart from absence so a
/// broken read never turns into a create.
#[derive(Debug)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
    Failed(StoreError),
}

impl<T> Lookup<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Lookup::Found(object) => Lookup::Found(f(object)),
            Lookup::NotFound => Lookup::NotFound,
            Lookup::Failed(error) => Lookup::Failed(error),
        }
    }
}

/// Storage holding Applications and their dependents. Writes carry the
/// resource version observed at read time and fail with
/// [`StoreError::Conflict`] when it is stale.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_application(&self, key: &ObjectKey) -> Lookup<Application>;

    async fn get(&self, kind: DependentKind, key: &ObjectKey) -> Lookup<DependentObject>;

    async fn create(&self, object: &DependentObject) -> Result<DependentObject, StoreError>;

    async fn update(&self, object: &DependentObject) -> Result<DependentObject, StoreError>;
}
