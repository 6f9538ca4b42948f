use std::fs::{self, File};
use std::io::{self, BufReader};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use libcnb::build::BuildContext;
use libcnb::data::layer_name;
use libcnb::layer::{
    CachedLayerDefinition, InvalidMetadataAction, LayerState, RestoredLayerAction,
};
use libcnb::layer_env::{LayerEnv, ModificationBehavior, Scope};
use libherokubuildpack::log::log_info;
use serde::{Deserialize, Serialize};

use crate::dependency::{Dependency, DependencyCache};
use crate::errors::GradleBuildpackError;
use crate::GradleBuildpack;

/// Metadata persisted for the distribution layer. A change of the declared
/// distribution checksum invalidates the cached layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct DistributionMetadata {
    id: String,
    version: String,
    uri: String,
    sha256: String,
}

impl From<&Dependency> for DistributionMetadata {
    fn from(dependency: &Dependency) -> Self {
        Self {
            id: dependency.id.clone(),
            version: dependency.version.clone(),
            uri: dependency.uri.clone(),
            sha256: dependency.sha256.clone(),
        }
    }
}

/// Contributes a layer containing an unpacked Gradle distribution, reusing a
/// cached distribution when its checksum still matches the declared
/// dependency.
///
/// Returns the layer path and the layer's build environment.
pub(crate) fn handle(
    context: &BuildContext<GradleBuildpack>,
    dependency_cache: &DependencyCache,
    dependency: &Dependency,
) -> Result<(PathBuf, LayerEnv), libcnb::Error<GradleBuildpackError>> {
    let layer_ref = context.cached_layer(
        layer_name!("gradle"),
        CachedLayerDefinition {
            build: true,
            launch: false,
            invalid_metadata_action: &|_| InvalidMetadataAction::DeleteLayer,
            restored_layer_action: &|metadata: &DistributionMetadata, _| {
                if metadata.sha256 == dependency.sha256 {
                    RestoredLayerAction::KeepLayer
                } else {
                    RestoredLayerAction::DeleteLayer
                }
            },
        },
    )?;

    match layer_ref.state {
        LayerState::Restored { .. } => {
            log_info(format!("Reusing cached Gradle {}", dependency.version));
        }
        LayerState::Empty { .. } => {
            log_info(format!(
                "Installing Gradle {} from {}",
                dependency.version, dependency.uri
            ));

            let archive = dependency_cache
                .fetch(dependency)
                .map_err(GradleBuildpackError::DependencyFetch)?;

            unpack_distribution(&archive, &layer_ref.path())
                .map_err(GradleBuildpackError::DistributionUnpack)?;

            layer_ref.write_metadata(DistributionMetadata::from(dependency))?;
            layer_ref.write_env(LayerEnv::new().chainable_insert(
                Scope::Build,
                ModificationBehavior::Prepend,
                "PATH",
                layer_ref.path().join("bin"),
            ))?;
        }
    }

    Ok((layer_ref.path(), layer_ref.read_env()?))
}

/// Unpacks a Gradle distribution archive into `destination`.
///
/// Distribution archives nest all content under a single `gradle-<version>/`
/// root directory, which is stripped so that `bin/gradle` ends up directly in
/// the layer.
fn unpack_distribution(archive_path: &Path, destination: &Path) -> Result<(), UnpackError> {
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;

        let Some(path) = entry.enclosed_name() else {
            return Err(UnpackError::UnsafeEntry(entry.name().to_string()));
        };

        let stripped = path.components().skip(1).collect::<PathBuf>();
        if stripped.as_os_str().is_empty() {
            continue;
        }

        let target = destination.join(stripped);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }

            let mut output = File::create(&target)?;
            io::copy(&mut entry, &mut output)?;

            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&target, fs::Permissions::from_mode(mode))?;
            }
        }
    }

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum UnpackError {
    #[error("unable to read distribution archive: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid distribution archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("distribution archive contains unsafe entry path {0:?}")]
    UnsafeEntry(String),
}
