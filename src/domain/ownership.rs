use kube::Resource;

use super::{
    error::ReconcileError,
    model::{Application, DependentObject},
};

/// Marks `object` as controlled by `owner` so the garbage collector removes
/// it together with the Application. Only called on objects about to be
/// created; updates keep whatever references the stored object has.
pub fn attach_owner(object: &mut DependentObject, owner: &Application) -> Result<(), ReconcileError> {
    let kind = object.kind().as_str();
    let name = object.name().to_string();
    let reference = owner
        .controller_owner_ref(&())
        .ok_or_else(|| ReconcileError::OwnerLink {
            kind,
            name: name.clone(),
            reason: "owner has no name or uid".to_string(),
        })?;

    let references = object
        .metadata_mut()
        .owner_references
        .get_or_insert_with(Vec::new);
    match references.iter().find(|existing| existing.controller == Some(true)) {
        Some(existing) if existing.uid == reference.uid => Ok(()),
        // Unreachable from the create path: freshly built objects carry no
        // references. Only hit when linking an object fetched from the store.
        Some(existing) => Err(ReconcileError::OwnerLink {
            kind,
            name,
            reason: format!("already controlled by {} {}", existing.kind, existing.name),
        }),
        None => {
            references.push(reference);
            Ok(())
        }
    }
}
