//! Per-run configuration.

use hearth_core::ResourceLimits;
use hearth_vfs::{DescriptorInit, VirtualFile};

/// Everything a guest sees of the outside world for one run.
///
/// Descriptors are installed from 3 in the order they were added; 0/1/2 are
/// always the standard streams.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    /// Argument vector, program name first by convention.
    pub args: Vec<String>,
    /// `KEY=VALUE` environment entries.
    pub env: Vec<String>,
    /// Descriptors installed after the standard streams.
    pub descriptors: Vec<DescriptorInit>,
    /// Contents of standard input.
    pub stdin: Vec<u8>,
    /// File that captures standard output; a fresh one when unset.
    pub stdout: Option<VirtualFile>,
    /// File that captures standard error; a fresh one when unset.
    pub stderr: Option<VirtualFile>,
    /// Limits for this run; the runtime defaults apply when unset.
    pub limits: Option<ResourceLimits>,
}

impl RunConfig {
    /// An empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn with_args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append one environment entry, as given.
    pub fn with_env(mut self, entry: impl Into<String>) -> Self {
        self.env.push(entry.into());
        self
    }

    /// Append a `key=value` environment entry.
    pub fn with_env_var(self, key: &str, value: &str) -> Self {
        self.with_env(format!("{key}={value}"))
    }

    /// Append a descriptor.
    pub fn with_descriptor(mut self, descriptor: DescriptorInit) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Append a preopened directory of `(path, contents)` files.
    pub fn with_directory<P, C>(
        self,
        name: impl Into<String>,
        files: impl IntoIterator<Item = (P, C)>,
    ) -> Self
    where
        P: Into<String>,
        C: Into<Vec<u8>>,
    {
        self.with_descriptor(DescriptorInit::directory(name, files))
    }

    /// Set the contents of standard input.
    pub fn with_stdin(mut self, stdin: impl Into<Vec<u8>>) -> Self {
        self.stdin = stdin.into();
        self
    }

    /// Capture standard output into `stdout`, appending to what it holds.
    ///
    /// The caller keeps a clone to read the output while or after the guest
    /// runs.
    pub fn with_stdout(mut self, stdout: VirtualFile) -> Self {
        self.stdout = Some(stdout);
        self
    }

    /// Capture standard error into `stderr`, appending to what it holds.
    pub fn with_stderr(mut self, stderr: VirtualFile) -> Self {
        self.stderr = Some(stderr);
        self
    }

    /// Override the runtime's resource limits.
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = Some(limits);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_config_builder() {
        let config = RunConfig::new()
            .with_args(["prog", "-v"])
            .with_env_var("FOO", "bar")
            .with_env("RAW")
            .with_directory(".", [("a.txt", "hi")])
            .with_stdin("input");

        assert_eq!(config.args, vec!["prog", "-v"]);
        assert_eq!(config.env, vec!["FOO=bar", "RAW"]);
        assert_eq!(config.descriptors.len(), 1);
        assert_eq!(config.stdin, b"input");
        assert!(config.limits.is_none());
        assert!(config.stdout.is_none() && config.stderr.is_none());
    }

    #[test]
    fn test_stream_overrides_share_the_buffer() {
        let out = VirtualFile::from("log: ");
        let config = RunConfig::new()
            .with_stdout(out.clone())
            .with_stderr(VirtualFile::empty());

        assert!(config.stdout.as_ref().is_some_and(|file| file.ptr_eq(&out)));
        assert!(config.stderr.is_some());
    }
}
