//! Argument and environment vectors.

/// Byte layout of a string vector as the guest receives it: every entry is
/// copied followed by a single NUL terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncodedSizes {
    /// Number of entries.
    pub count: usize,
    /// Total bytes including one terminator per entry.
    pub buffer_len: usize,
}

impl EncodedSizes {
    fn of(entries: &[String]) -> Self {
        Self {
            count: entries.len(),
            buffer_len: entries.iter().map(|entry| entry.len() + 1).sum(),
        }
    }
}

/// The argument vector and environment supplied to a run.
///
/// Both sequences are fixed at construction. Environment entries are meant
/// to be `KEY=VALUE`, but nothing is rejected: malformed entries reach the
/// guest unchanged and are only reported by [`EnvironmentContext::malformed_env`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentContext {
    args: Vec<String>,
    env: Vec<String>,
}

impl EnvironmentContext {
    /// Create a context from argument and `KEY=VALUE` environment lists.
    pub fn new<A, E>(args: A, env: E) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            env: env.into_iter().map(Into::into).collect(),
        }
    }

    /// The argument vector, in order.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The environment entries, in order.
    pub fn env(&self) -> &[String] {
        &self.env
    }

    /// Encoded size of the argument vector.
    pub fn args_sizes(&self) -> EncodedSizes {
        EncodedSizes::of(&self.args)
    }

    /// Encoded size of the environment vector.
    pub fn env_sizes(&self) -> EncodedSizes {
        EncodedSizes::of(&self.env)
    }

    /// Environment entries that are not well-formed `KEY=VALUE` strings.
    pub fn malformed_env(&self) -> impl Iterator<Item = &str> {
        self.env
            .iter()
            .map(String::as_str)
            .filter(|entry| !is_well_formed(entry))
    }
}

fn is_well_formed(entry: &str) -> bool {
    if entry.contains('\0') {
        return false;
    }
    matches!(entry.split_once('='), Some((key, _)) if !key.is_empty())
}
