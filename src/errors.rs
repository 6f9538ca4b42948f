use std::path::PathBuf;
use std::process::ExitStatus;

use libherokubuildpack::log::log_error;

use crate::artifact::ResolveArtifactError;
use crate::dependency::{FetchDependencyError, ResolveDependencyError};
use crate::layers::distribution::UnpackError;

#[derive(Debug, thiserror::Error)]
pub(crate) enum GradleBuildpackError {
    #[error("invalid buildpack metadata: {0}")]
    Metadata(toml::de::Error),
    #[error("{0}")]
    DependencyResolution(#[from] ResolveDependencyError),
    #[error("unable to create download directory: {0}")]
    DependencyCache(std::io::Error),
    #[error("unable to stat {}: {error}", path.display())]
    GradlewStat {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
    #[error("{0}")]
    DependencyFetch(#[from] FetchDependencyError),
    #[error("{0}")]
    DistributionUnpack(#[from] UnpackError),
    #[error("unable to determine user home directory")]
    HomeDirectory,
    #[error("unable to link Gradle cache directory: {0}")]
    CacheLayer(std::io::Error),
    #[error("invalid build arguments: {0}")]
    BuildArguments(shell_words::ParseError),
    #[error("unable to run build command: {0}")]
    BuildCommand(std::io::Error),
    #[error("build command {} exited with {status}", command.display())]
    BuildCommandExit {
        command: PathBuf,
        status: ExitStatus,
    },
    #[error("{0}")]
    Artifact(#[from] ResolveArtifactError),
    #[error("unable to register application artifact: {0}")]
    ApplicationLayer(std::io::Error),
}

impl From<GradleBuildpackError> for libcnb::Error<GradleBuildpackError> {
    fn from(error: GradleBuildpackError) -> Self {
        libcnb::Error::BuildpackError(error)
    }
}

/// Reports build failures in a consistent style, naming the step that failed.
pub(crate) fn on_error(error: libcnb::Error<GradleBuildpackError>) {
    libherokubuildpack::error::on_error(on_buildpack_error, error);
}

fn on_buildpack_error(error: GradleBuildpackError) {
    let step = match &error {
        GradleBuildpackError::Metadata(_) => "Unable to create dependency resolver",
        GradleBuildpackError::DependencyCache(_) => "Unable to create dependency cache",
        GradleBuildpackError::DependencyResolution(_) => "Unable to find dependency",
        GradleBuildpackError::GradlewStat { .. } => "Unable to stat Gradle wrapper",
        GradleBuildpackError::DependencyFetch(_) | GradleBuildpackError::DistributionUnpack(_) => {
            "Unable to contribute Gradle distribution"
        }
        GradleBuildpackError::HomeDirectory => "Unable to determine user home directory",
        GradleBuildpackError::CacheLayer(_) => "Unable to contribute Gradle cache",
        GradleBuildpackError::BuildArguments(_) => "Unable to resolve build arguments",
        GradleBuildpackError::BuildCommand(_) | GradleBuildpackError::BuildCommandExit { .. } => {
            "Unable to run Gradle build"
        }
        GradleBuildpackError::Artifact(_) => "Unable to resolve built artifact",
        GradleBuildpackError::ApplicationLayer(_) => "Unable to create application layer",
    };

    log_error(step, error.to_string());
}
