//! Launch configuration for the supervised process.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What to run and where.
///
/// This is an intent-based configuration: assembling the command line for a
/// particular server jar is the caller's business.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchConfig {
    /// Executable to spawn (e.g. `java`).
    pub program: PathBuf,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
    /// Working directory; the server writes its world and config files here.
    pub working_dir: PathBuf,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
}

impl LaunchConfig {
    /// Create a launch configuration with required fields.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            env: Vec::new(),
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_args() {
        let config = LaunchConfig::new("java", "/srv/mc")
            .args(["-Xmx2G", "-jar"])
            .arg("server.jar")
            .arg("nogui")
            .env("JAVA_TOOL_OPTIONS", "-Dfile.encoding=UTF-8");
        assert_eq!(config.args, vec!["-Xmx2G", "-jar", "server.jar", "nogui"]);
        assert_eq!(config.env.len(), 1);
        assert_eq!(config.working_dir, PathBuf::from("/srv/mc"));
    }
}
