use std::path::{Path, PathBuf};

use libherokubuildpack::digest::sha256;
use libherokubuildpack::download::{download_file, DownloadError};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

/// A versioned binary dependency declared in `[[metadata.dependencies]]` of
/// `buildpack.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Dependency {
    pub(crate) id: String,
    pub(crate) version: String,
    pub(crate) uri: String,
    pub(crate) sha256: String,
}

impl Dependency {
    /// The file name under which the dependency's artifact is stored, derived
    /// from the last segment of its URI.
    pub(crate) fn file_name(&self) -> String {
        self.uri
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .unwrap_or(&self.id)
            .to_string()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct BuildpackMetadata {
    #[serde(default)]
    pub(crate) dependencies: Vec<Dependency>,
}

/// Looks up dependencies declared in the buildpack metadata by id and version
/// constraint.
#[derive(Debug)]
pub(crate) struct DependencyResolver {
    dependencies: Vec<Dependency>,
}

impl DependencyResolver {
    pub(crate) fn new(metadata: BuildpackMetadata) -> Self {
        Self {
            dependencies: metadata.dependencies,
        }
    }

    /// Resolves the single declared dependency matching `id` and `constraint`.
    ///
    /// An empty constraint matches every declared version of `id`, a non-empty
    /// constraint is interpreted as a semver requirement. In both cases the
    /// match must be unique: zero matches and multiple matches are errors, so
    /// an empty constraint only works when the metadata declares exactly one
    /// version of the dependency.
    pub(crate) fn resolve(
        &self,
        id: &str,
        constraint: &str,
    ) -> Result<&Dependency, ResolveDependencyError> {
        let requirement = if constraint.is_empty() {
            None
        } else {
            Some(semver::VersionReq::parse(constraint).map_err(|error| {
                ResolveDependencyError::InvalidConstraint {
                    constraint: constraint.to_string(),
                    error,
                }
            })?)
        };

        let matches = self
            .dependencies
            .iter()
            .filter(|dependency| dependency.id == id)
            .filter(|dependency| match &requirement {
                None => true,
                Some(requirement) => semver::Version::parse(&dependency.version)
                    .is_ok_and(|version| requirement.matches(&version)),
            })
            .collect::<Vec<_>>();

        match matches.as_slice() {
            [dependency] => Ok(dependency),
            [] => Err(ResolveDependencyError::NoMatch {
                id: id.to_string(),
                constraint: constraint.to_string(),
            }),
            _ => Err(ResolveDependencyError::Ambiguous {
                id: id.to_string(),
                constraint: constraint.to_string(),
                versions: matches
                    .iter()
                    .map(|dependency| dependency.version.clone())
                    .collect(),
            }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ResolveDependencyError {
    #[error("invalid version constraint {constraint:?}: {error}")]
    InvalidConstraint {
        constraint: String,
        #[source]
        error: semver::Error,
    },
    #[error("no dependency declared for id {id:?} and version constraint {constraint:?}")]
    NoMatch { id: String, constraint: String },
    #[error("multiple dependencies declared for id {id:?} and version constraint {constraint:?}: {}", versions.join(", "))]
    Ambiguous {
        id: String,
        constraint: String,
        versions: Vec<String>,
    },
}

/// Fetches resolved dependency artifacts, preferring artifacts vendored under
/// the buildpack's `dependencies/` directory over the network. Downloads are
/// written to a temporary directory that lives as long as the cache itself.
pub(crate) struct DependencyCache {
    vendor_dir: PathBuf,
    download_dir: TempDir,
}

impl DependencyCache {
    pub(crate) fn new(buildpack_dir: &Path) -> std::io::Result<Self> {
        Ok(Self {
            vendor_dir: buildpack_dir.join("dependencies"),
            download_dir: tempfile::tempdir()?,
        })
    }

    /// Returns a local path to the dependency's artifact, verified against its
    /// declared SHA-256.
    pub(crate) fn fetch(&self, dependency: &Dependency) -> Result<PathBuf, FetchDependencyError> {
        let file_name = dependency.file_name();

        let vendored = self
            .vendor_dir
            .join(&dependency.sha256)
            .join(&file_name);

        let artifact = if vendored.is_file() {
            vendored
        } else {
            let target = self.download_dir.path().join(&file_name);
            download_file(&dependency.uri, &target).map_err(|error| {
                FetchDependencyError::Download {
                    uri: dependency.uri.clone(),
                    error,
                }
            })?;
            target
        };

        let digest = sha256(&artifact).map_err(FetchDependencyError::Digest)?;
        if digest != dependency.sha256 {
            return Err(FetchDependencyError::ChecksumMismatch {
                uri: dependency.uri.clone(),
                expected: dependency.sha256.clone(),
                actual: digest,
            });
        }

        Ok(artifact)
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum FetchDependencyError {
    #[error("unable to download {uri}: {error}")]
    Download {
        uri: String,
        #[source]
        error: DownloadError,
    },
    #[error("unable to calculate artifact digest: {0}")]
    Digest(std::io::Error),
    #[error("checksum of {uri} does not match: expected {expected}, got {actual}")]
    ChecksumMismatch {
        uri: String,
        expected: String,
        actual: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn dependency(id: &str, version: &str) -> Dependency {
        Dependency {
            id: id.to_string(),
            version: version.to_string(),
            uri: format!("https://example.com/{id}-{version}.zip"),
            sha256: "0".repeat(64),
        }
    }

    fn resolver(dependencies: Vec<Dependency>) -> DependencyResolver {
        DependencyResolver::new(BuildpackMetadata { dependencies })
    }

    #[test]
    fn metadata_deserializes_from_buildpack_toml_table() {
        let metadata = toml::from_str::<BuildpackMetadata>(
            r#"
            [[dependencies]]
            id = "gradle"
            version = "8.14.3"
            uri = "https://services.gradle.org/distributions/gradle-8.14.3-bin.zip"
            sha256 = "cafebabe"
            "#,
        )
        .unwrap();

        assert_eq!(metadata.dependencies.len(), 1);
        assert_eq!(metadata.dependencies[0].id, "gradle");
        assert_eq!(metadata.dependencies[0].version, "8.14.3");
    }

    #[test]
    fn empty_constraint_resolves_single_declared_version() {
        let resolver = resolver(vec![dependency("gradle", "8.14.3")]);

        let resolved = resolver.resolve("gradle", "").unwrap();
        assert_eq!(resolved.version, "8.14.3");
    }

    #[test]
    fn empty_constraint_with_multiple_versions_is_ambiguous() {
        let resolver = resolver(vec![
            dependency("gradle", "7.6.4"),
            dependency("gradle", "8.14.3"),
        ]);

        assert!(matches!(
            resolver.resolve("gradle", ""),
            Err(ResolveDependencyError::Ambiguous { versions, .. }) if versions.len() == 2
        ));
    }

    #[test]
    fn semver_constraint_selects_matching_version() {
        let resolver = resolver(vec![
            dependency("gradle", "7.6.4"),
            dependency("gradle", "8.14.3"),
        ]);

        let resolved = resolver.resolve("gradle", "^8").unwrap();
        assert_eq!(resolved.version, "8.14.3");
    }

    #[test]
    fn unknown_id_does_not_resolve() {
        let resolver = resolver(vec![dependency("gradle", "8.14.3")]);

        assert!(matches!(
            resolver.resolve("maven", ""),
            Err(ResolveDependencyError::NoMatch { id, .. }) if id == "maven"
        ));
    }

    #[test]
    fn invalid_constraint_is_rejected() {
        let resolver = resolver(vec![dependency("gradle", "8.14.3")]);

        assert!(matches!(
            resolver.resolve("gradle", "not a constraint"),
            Err(ResolveDependencyError::InvalidConstraint { .. })
        ));
    }

    #[test]
    fn file_name_is_last_uri_segment() {
        assert_eq!(
            dependency("gradle", "8.14.3").file_name(),
            "gradle-8.14.3.zip"
        );
    }

    #[test]
    fn fetch_uses_vendored_artifact_when_digest_matches() {
        let buildpack_dir = tempfile::tempdir().unwrap();

        let mut dependency = dependency("gradle", "8.14.3");
        dependency.sha256 = sha256_of(b"distribution-bytes");

        let vendored_dir = buildpack_dir
            .path()
            .join("dependencies")
            .join(&dependency.sha256);
        fs::create_dir_all(&vendored_dir).unwrap();
        fs::write(vendored_dir.join("gradle-8.14.3.zip"), b"distribution-bytes").unwrap();

        let cache = DependencyCache::new(buildpack_dir.path()).unwrap();
        let artifact = cache.fetch(&dependency).unwrap();

        assert_eq!(artifact, vendored_dir.join("gradle-8.14.3.zip"));
    }

    #[test]
    fn fetch_rejects_vendored_artifact_with_wrong_digest() {
        let buildpack_dir = tempfile::tempdir().unwrap();

        let dependency = dependency("gradle", "8.14.3");
        let vendored_dir = buildpack_dir
            .path()
            .join("dependencies")
            .join(&dependency.sha256);
        fs::create_dir_all(&vendored_dir).unwrap();
        fs::write(vendored_dir.join("gradle-8.14.3.zip"), b"tampered").unwrap();

        let cache = DependencyCache::new(buildpack_dir.path()).unwrap();

        assert!(matches!(
            cache.fetch(&dependency),
            Err(FetchDependencyError::ChecksumMismatch { .. })
        ));
    }

    fn sha256_of(data: &[u8]) -> String {
        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(file.path(), data).unwrap();
        sha256(file.path()).unwrap()
    }
}
