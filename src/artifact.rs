use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use libcnb::Env;

/// Glob matching the artifacts a Gradle JVM build produces by default.
pub(crate) const DEFAULT_ARTIFACT_PATTERN: &str = "build/libs/*.[jw]ar";

/// Name of the environment variable pointing at an explicit built artifact.
pub(crate) const BUILT_ARTIFACT_VARIABLE: &str = "BP_GRADLE_BUILT_ARTIFACT";

/// Name of the environment variable scoping the artifact search to a module
/// subdirectory.
pub(crate) const BUILT_MODULE_VARIABLE: &str = "BP_GRADLE_BUILT_MODULE";

/// Locates the single artifact produced by the build.
///
/// The search pattern is the explicit artifact override if set, otherwise the
/// default glob, optionally scoped to a module subdirectory. When the glob
/// matches more than one file, candidates that do not look like a JAR or WAR
/// are filtered out before ambiguity is declared.
pub(crate) struct ArtifactResolver {
    artifact_variable: String,
    module_variable: String,
    default_pattern: String,
}

impl ArtifactResolver {
    pub(crate) fn new(
        artifact_variable: impl Into<String>,
        module_variable: impl Into<String>,
        default_pattern: impl Into<String>,
    ) -> Self {
        Self {
            artifact_variable: artifact_variable.into(),
            module_variable: module_variable.into(),
            default_pattern: default_pattern.into(),
        }
    }

    fn pattern(&self, env: &Env) -> String {
        if let Some(artifact) = env.get_string_lossy(&self.artifact_variable) {
            artifact
        } else if let Some(module) = env.get_string_lossy(&self.module_variable) {
            format!("{module}/{}", self.default_pattern)
        } else {
            self.default_pattern.clone()
        }
    }

    pub(crate) fn resolve(
        &self,
        app_dir: &Path,
        env: &Env,
    ) -> Result<PathBuf, ResolveArtifactError> {
        let pattern = self.pattern(env);
        // Only the pattern is allowed to contain glob metacharacters; the
        // application path itself is matched literally.
        let search = if Path::new(&pattern).is_absolute() {
            pattern.clone()
        } else {
            format!(
                "{}/{pattern}",
                glob::Pattern::escape(&app_dir.to_string_lossy())
            )
        };

        let candidates = glob::glob(&search)
            .map_err(|error| ResolveArtifactError::Pattern {
                pattern: pattern.clone(),
                error,
            })?
            .filter_map(Result::ok)
            .filter(|path| path.is_file())
            .collect::<Vec<_>>();

        if let [artifact] = candidates.as_slice() {
            return Ok(artifact.clone());
        }

        let interesting = candidates
            .into_iter()
            .filter(|path| is_jar_like(path))
            .collect::<Vec<_>>();

        match interesting.as_slice() {
            [artifact] => Ok(artifact.clone()),
            [] => Err(ResolveArtifactError::NotFound { pattern }),
            _ => Err(ResolveArtifactError::Ambiguous {
                pattern,
                candidates: interesting,
            }),
        }
    }
}

/// A candidate is interesting when it is a readable zip archive whose
/// structure is consistent with a JAR or WAR.
fn is_jar_like(path: &Path) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    let Ok(archive) = zip::ZipArchive::new(BufReader::new(file)) else {
        return false;
    };

    let is_jar_like = archive.file_names().any(|name| {
        name == "META-INF/MANIFEST.MF" || name.starts_with("WEB-INF/") || name.ends_with(".class")
    });
    is_jar_like
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ResolveArtifactError {
    #[error("invalid artifact pattern {pattern:?}: {error}")]
    Pattern {
        pattern: String,
        #[source]
        error: glob::PatternError,
    },
    #[error("unable to find built artifact matching {pattern:?}")]
    NotFound { pattern: String },
    #[error("multiple built artifacts match {pattern:?}: {}", candidates.iter().map(|path| path.display().to_string()).collect::<Vec<_>>().join(", "))]
    Ambiguous {
        pattern: String,
        candidates: Vec<PathBuf>,
    },
}
