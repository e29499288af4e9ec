//! World folder operations. These run on background tasks, never on the
//! session task.

use std::io::ErrorKind;
use std::path::Path;

use manhunt_protocol::WorldTriple;
use tracing::info;

use crate::WorldError;

/// Recursively removes each named world folder under `container`.
/// Missing folders are not an error.
pub async fn delete_world_folders<S: AsRef<str>>(
    container: &Path,
    worlds: impl IntoIterator<Item = S>,
) -> Result<(), WorldError> {
    for world in worlds {
        let world = world.as_ref();
        let path = container.join(world);
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => info!(world, "deleted world folder"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(source) => {
                return Err(WorldError::Delete {
                    world: world.to_string(),
                    source,
                });
            }
        }
    }
    Ok(())
}

/// Replaces the `active` folders with the `staging` ones.
///
/// The active folders are deleted first, then each staging folder is
/// renamed onto its active name. A rename within one filesystem is atomic,
/// so every active name either holds the old map, nothing, or the complete
/// new one.
pub async fn swap_world_folders(
    container: &Path,
    active: &WorldTriple,
    staging: &WorldTriple,
) -> Result<(), WorldError> {
    let moves: Vec<(String, String)> = staging
        .iter()
        .zip(active.iter())
        .map(|((_, from), (_, to))| (from.to_string(), to.to_string()))
        .collect();
    let targets: Vec<String> = moves.iter().map(|(_, to)| to.clone()).collect();
    delete_world_folders(container, &targets).await?;

    for (from, to) in &moves {
        tokio::fs::rename(container.join(from), container.join(to))
            .await
            .map_err(|source| WorldError::Move {
                from: from.clone(),
                to: to.clone(),
                source,
            })?;
        info!(from = %from, to = %to, "moved world folder");
    }
    Ok(())
}
