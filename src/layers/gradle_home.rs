use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use libcnb::build::BuildContext;
use libcnb::data::layer_name;
use libcnb::generic::GenericMetadata;
use libcnb::layer::{
    CachedLayerDefinition, InvalidMetadataAction, LayerState, RestoredLayerAction,
};
use libherokubuildpack::log::log_info;

use crate::errors::GradleBuildpackError;
use crate::GradleBuildpack;

/// Contributes the layer backing the user-level Gradle cache so that
/// dependency downloads survive rebuilds. The layer is contributed on every
/// build, independent of whether a wrapper script or a provisioned
/// distribution runs the build.
///
/// Returns the `.gradle` path the build subprocess must use as
/// `GRADLE_USER_HOME`.
pub(crate) fn handle(
    context: &BuildContext<GradleBuildpack>,
    home: &Path,
) -> Result<PathBuf, libcnb::Error<GradleBuildpackError>> {
    let layer_ref = context.cached_layer(
        layer_name!("cache"),
        CachedLayerDefinition {
            build: false,
            launch: false,
            invalid_metadata_action: &|_| InvalidMetadataAction::DeleteLayer,
            restored_layer_action: &|_: &GenericMetadata, _| RestoredLayerAction::KeepLayer,
        },
    )?;

    if let LayerState::Restored { .. } = layer_ref.state {
        log_info("Reusing Gradle dependency cache");
    }

    let gradle_home = home.join(".gradle");
    link_gradle_home(&layer_ref.path(), &gradle_home)
        .map_err(GradleBuildpackError::CacheLayer)?;

    Ok(gradle_home)
}

// The home directory starts out fresh in every build container, but a stale
// `.gradle` left behind by the base image or an earlier buildpack must not
// shadow the cache layer.
fn link_gradle_home(layer_path: &Path, gradle_home: &Path) -> io::Result<()> {
    match fs::symlink_metadata(gradle_home) {
        Ok(metadata) => {
            if metadata.is_dir() {
                fs::remove_dir_all(gradle_home)?;
            } else {
                fs::remove_file(gradle_home)?;
            }
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => return Err(error),
    }

    if let Some(parent) = gradle_home.parent() {
        fs::create_dir_all(parent)?;
    }

    std::os::unix::fs::symlink(layer_path, gradle_home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_fresh_gradle_home_to_the_layer() {
        let dir = tempfile::tempdir().unwrap();
        let layer = dir.path().join("layer");
        fs::create_dir_all(&layer).unwrap();
        let gradle_home = dir.path().join("home/.gradle");

        link_gradle_home(&layer, &gradle_home).unwrap();

        assert_eq!(fs::read_link(&gradle_home).unwrap(), layer);
    }

    #[test]
    fn replaces_an_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let layer = dir.path().join("layer");
        fs::create_dir_all(&layer).unwrap();
        let gradle_home = dir.path().join("home/.gradle");
        fs::create_dir_all(gradle_home.join("caches")).unwrap();

        link_gradle_home(&layer, &gradle_home).unwrap();

        assert_eq!(fs::read_link(&gradle_home).unwrap(), layer);
    }

    #[test]
    fn replaces_an_existing_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("stale");
        let layer = dir.path().join("layer");
        fs::create_dir_all(&stale).unwrap();
        fs::create_dir_all(&layer).unwrap();
        let gradle_home = dir.path().join("home/.gradle");
        fs::create_dir_all(gradle_home.parent().unwrap()).unwrap();
        std::os::unix::fs::symlink(&stale, &gradle_home).unwrap();

        link_gradle_home(&layer, &gradle_home).unwrap();

        assert_eq!(fs::read_link(&gradle_home).unwrap(), layer);
    }
}
