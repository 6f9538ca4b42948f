use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use libcnb::build::BuildContext;
use libcnb::data::layer_name;
use libcnb::layer::UncachedLayerDefinition;
use libcnb::Env;
use libherokubuildpack::command::CommandExt;
use libherokubuildpack::log::log_info;

use crate::artifact::ArtifactResolver;
use crate::errors::GradleBuildpackError;
use crate::GradleBuildpack;

/// Runs the resolved build command and registers the built artifact in a
/// fresh, uncached layer.
///
/// The subprocess runs in the application directory with `command_env` plus
/// the cache location exported as `GRADLE_USER_HOME`, and its output is
/// streamed unbuffered to the buildpack's own stdout and stderr. Afterwards
/// the artifact the build produced is located via `artifact_resolver` and
/// copied into the `application` layer under its original file name.
pub(crate) fn build(
    context: &BuildContext<GradleBuildpack>,
    command_path: &Path,
    arguments: &[String],
    gradle_home: &Path,
    artifact_resolver: &ArtifactResolver,
    command_env: &Env,
    platform_env: &Env,
) -> Result<(), libcnb::Error<GradleBuildpackError>> {
    log_info(format!(
        "Executing {} {}",
        command_path.display(),
        arguments.join(" ")
    ));

    let output = Command::new(command_path)
        .args(arguments)
        .current_dir(&context.app_dir)
        .env_clear()
        .envs(command_env.iter())
        .env("GRADLE_USER_HOME", gradle_home)
        .output_and_write_streams(io::stdout(), io::stderr())
        .map_err(GradleBuildpackError::BuildCommand)?;

    if !output.status.success() {
        return Err(GradleBuildpackError::BuildCommandExit {
            command: command_path.to_path_buf(),
            status: output.status,
        }
        .into());
    }

    let artifact = artifact_resolver
        .resolve(&context.app_dir, platform_env)
        .map_err(GradleBuildpackError::Artifact)?;

    log_info(format!(
        "Registering built artifact {}",
        artifact
            .strip_prefix(&context.app_dir)
            .unwrap_or(&artifact)
            .display()
    ));

    let layer_ref = context.uncached_layer(
        layer_name!("application"),
        UncachedLayerDefinition {
            build: false,
            launch: false,
        },
    )?;

    copy_artifact(&artifact, &layer_ref.path()).map_err(GradleBuildpackError::ApplicationLayer)?;

    Ok(())
}

fn copy_artifact(artifact: &Path, layer_path: &Path) -> io::Result<()> {
    let file_name = artifact.file_name().map(PathBuf::from).ok_or_else(|| {
        io::Error::other(format!(
            "artifact path {} has no file name",
            artifact.display()
        ))
    })?;

    fs::copy(artifact, layer_path.join(file_name)).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_artifact_keeps_the_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("app-1.0.jar");
        fs::write(&artifact, b"artifact bytes").unwrap();
        let layer = dir.path().join("layer");
        fs::create_dir_all(&layer).unwrap();

        copy_artifact(&artifact, &layer).unwrap();

        assert_eq!(
            fs::read(layer.join("app-1.0.jar")).unwrap(),
            b"artifact bytes"
        );
    }
}
