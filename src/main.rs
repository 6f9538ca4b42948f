use libcnb::build::{BuildContext, BuildResult, BuildResultBuilder};
use libcnb::data::build_plan::BuildPlanBuilder;
use libcnb::detect::{DetectContext, DetectResult, DetectResultBuilder};
use libcnb::generic::{GenericMetadata, GenericPlatform};
use libcnb::{buildpack_main, Buildpack, Env, Platform};
use libherokubuildpack::log::log_header;

use std::path::{Path, PathBuf};

use crate::args::{ArgumentResolver, BUILD_ARGUMENTS_VARIABLE, DEFAULT_BUILD_ARGUMENTS};
use crate::artifact::{
    ArtifactResolver, BUILT_ARTIFACT_VARIABLE, BUILT_MODULE_VARIABLE, DEFAULT_ARTIFACT_PATTERN,
};
use crate::dependency::{BuildpackMetadata, DependencyCache, DependencyResolver};
use crate::errors::GradleBuildpackError;

mod application;
mod args;
mod artifact;
mod dependency;
mod errors;
mod layers;

// Suppress warnings due to the `unused_crate_dependencies` lint not handling integration tests well.
#[cfg(test)]
use libcnb_test as _;

const GRADLE_DEPENDENCY_ID: &str = "gradle";

pub(crate) struct GradleBuildpack;

impl Buildpack for GradleBuildpack {
    type Platform = GenericPlatform;
    type Metadata = GenericMetadata;
    type Error = GradleBuildpackError;

    fn detect(&self, context: DetectContext<Self>) -> libcnb::Result<DetectResult, Self::Error> {
        if has_gradle_build_files(&context.app_dir) {
            DetectResultBuilder::pass()
                .build_plan(
                    BuildPlanBuilder::new()
                        .provides("gradle")
                        .requires("gradle")
                        .build(),
                )
                .build()
        } else {
            DetectResultBuilder::fail().build()
        }
    }

    fn build(&self, context: BuildContext<Self>) -> libcnb::Result<BuildResult, Self::Error> {
        log_header(format!(
            "Gradle Buildpack {}",
            context.buildpack_descriptor.buildpack.version
        ));

        let metadata = context
            .buildpack_descriptor
            .metadata
            .clone()
            .map(|table| toml::Value::Table(table).try_into::<BuildpackMetadata>())
            .transpose()
            .map_err(GradleBuildpackError::Metadata)?
            .unwrap_or_default();

        let dependency_resolver = DependencyResolver::new(metadata);
        let dependency_cache = DependencyCache::new(&context.buildpack_dir)
            .map_err(GradleBuildpackError::DependencyCache)?;

        // Ambient state is read once here and passed explicitly: BP_* overrides
        // come from the platform environment, the build subprocess inherits the
        // process environment.
        let platform_env = context.platform.env();
        let mut command_env = Env::from_current();

        let command = match wrapper_command(&context.app_dir)? {
            Some(wrapper) => wrapper,
            None => {
                let dependency = dependency_resolver
                    .resolve(GRADLE_DEPENDENCY_ID, "")
                    .map_err(GradleBuildpackError::DependencyResolution)?;

                let (layer_path, layer_env) =
                    layers::distribution::handle(&context, &dependency_cache, dependency)?;
                command_env = layer_env.apply(libcnb::layer_env::Scope::Build, &command_env);

                layer_path.join("bin").join("gradle")
            }
        };

        let home = dirs::home_dir().ok_or(GradleBuildpackError::HomeDirectory)?;
        let gradle_home = layers::gradle_home::handle(&context, &home)?;

        let argument_resolver =
            ArgumentResolver::new(BUILD_ARGUMENTS_VARIABLE, &DEFAULT_BUILD_ARGUMENTS);
        let arguments = argument_resolver
            .resolve(platform_env)
            .map_err(GradleBuildpackError::BuildArguments)?;

        let artifact_resolver = ArtifactResolver::new(
            BUILT_ARTIFACT_VARIABLE,
            BUILT_MODULE_VARIABLE,
            DEFAULT_ARTIFACT_PATTERN,
        );

        application::build(
            &context,
            &command,
            &arguments,
            &gradle_home,
            &artifact_resolver,
            &command_env,
            platform_env,
        )?;

        BuildResultBuilder::new().build()
    }

    fn on_error(&self, error: libcnb::Error<Self::Error>) {
        errors::on_error(error);
    }
}

/// Returns the project's own wrapper script as the build command if it
/// exists. A missing wrapper means a Gradle distribution must be provisioned
/// instead; any other filesystem error is fatal.
fn wrapper_command(app_dir: &Path) -> Result<Option<PathBuf>, GradleBuildpackError> {
    let gradlew = app_dir.join("gradlew");
    match gradlew.try_exists() {
        Ok(true) => Ok(Some(gradlew)),
        Ok(false) => Ok(None),
        Err(error) => Err(GradleBuildpackError::GradlewStat {
            path: gradlew,
            error,
        }),
    }
}

fn has_gradle_build_files(app_dir: &Path) -> bool {
    [
        "build.gradle",
        "build.gradle.kts",
        "settings.gradle",
        "settings.gradle.kts",
    ]
    .iter()
    .any(|file| app_dir.join(file).exists())
}

buildpack_main!(GradleBuildpack);
