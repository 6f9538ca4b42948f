use libcnb::Env;

/// Arguments passed to the build command when no override is set.
pub(crate) const DEFAULT_BUILD_ARGUMENTS: [&str; 4] = ["--no-daemon", "-x", "test", "build"];

/// Name of the environment variable that replaces the default build arguments.
pub(crate) const BUILD_ARGUMENTS_VARIABLE: &str = "BP_GRADLE_BUILD_ARGUMENTS";

/// Resolves the arguments for the build command. A set override variable
/// entirely replaces the defaults with its shell-tokenized value.
pub(crate) struct ArgumentResolver {
    variable: String,
    defaults: Vec<String>,
}

impl ArgumentResolver {
    pub(crate) fn new(variable: impl Into<String>, defaults: &[&str]) -> Self {
        Self {
            variable: variable.into(),
            defaults: defaults.iter().map(ToString::to_string).collect(),
        }
    }

    pub(crate) fn resolve(&self, env: &Env) -> Result<Vec<String>, shell_words::ParseError> {
        match env.get_string_lossy(&self.variable) {
            Some(value) => shell_words::split(&value),
            None => Ok(self.defaults.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> ArgumentResolver {
        ArgumentResolver::new(BUILD_ARGUMENTS_VARIABLE, &DEFAULT_BUILD_ARGUMENTS)
    }

    #[test]
    fn defaults_are_used_when_variable_is_unset() {
        let arguments = resolver().resolve(&Env::new()).unwrap();
        assert_eq!(arguments, vec!["--no-daemon", "-x", "test", "build"]);
    }

    #[test]
    fn override_replaces_defaults_entirely() {
        let mut env = Env::new();
        env.insert(BUILD_ARGUMENTS_VARIABLE, "clean assemble");

        let arguments = resolver().resolve(&env).unwrap();
        assert_eq!(arguments, vec!["clean", "assemble"]);
    }

    #[test]
    fn override_is_shell_tokenized() {
        let mut env = Env::new();
        env.insert(
            BUILD_ARGUMENTS_VARIABLE,
            r#"build -Porg.gradle.java.installations.paths="/a path/jdk""#,
        );

        let arguments = resolver().resolve(&env).unwrap();
        assert_eq!(
            arguments,
            vec![
                "build",
                "-Porg.gradle.java.installations.paths=/a path/jdk"
            ]
        );
    }

    #[test]
    fn unbalanced_quotes_are_rejected() {
        let mut env = Env::new();
        env.insert(BUILD_ARGUMENTS_VARIABLE, "build \"unterminated");

        assert!(resolver().resolve(&env).is_err());
    }
}
