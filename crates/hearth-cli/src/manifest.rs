//! TOML run manifests.
//!
//! A manifest describes the world a guest sees:
//!
//! ```toml
//! args = ["prog", "--verbose"]
//! env = ["HOME=/", "LANG=C"]
//!
//! [stdin]
//! text = "input\n"
//!
//! [[descriptors]]
//! kind = "directory"
//! name = "."
//! host_dir = "fixtures"
//! files = { "extra.txt" = "inline contents" }
//!
//! [[descriptors]]
//! kind = "content"
//! path = "data.bin"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use hearth::hearth_vfs::DescriptorInit;
use hearth::RunConfig;
use serde::Deserialize;

/// A parsed run manifest.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunManifest {
    /// Argument vector.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment entries, passed through as written.
    #[serde(default)]
    pub env: Vec<String>,
    /// Standard input contents.
    pub stdin: Option<Contents>,
    /// Descriptors installed from 3 onwards.
    #[serde(default)]
    pub descriptors: Vec<DescriptorSpec>,
}

/// Bytes given inline or read from a host file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Contents {
    /// Inline UTF-8 text.
    pub text: Option<String>,
    /// Host file to read.
    pub path: Option<PathBuf>,
}

impl Contents {
    fn load(&self, base: &Path) -> Result<Vec<u8>> {
        match (&self.text, &self.path) {
            (Some(text), None) => Ok(text.clone().into_bytes()),
            (None, Some(path)) => read_host_file(&base.join(path)),
            (None, None) => Ok(Vec::new()),
            (Some(_), Some(_)) => bail!("contents may set `text` or `path`, not both"),
        }
    }
}

/// One descriptor entry.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum DescriptorSpec {
    /// An empty file.
    Empty,
    /// A file with initial contents.
    Content {
        /// Inline UTF-8 text.
        text: Option<String>,
        /// Host file to read.
        path: Option<PathBuf>,
    },
    /// A preopened directory.
    Directory {
        /// Name reported by `fd_prestat_dir_name`.
        name: String,
        /// Host directory whose files are copied in.
        host_dir: Option<PathBuf>,
        /// Inline files, overriding copied ones with the same path.
        #[serde(default)]
        files: BTreeMap<String, String>,
    },
}

impl DescriptorSpec {
    fn into_init(self, base: &Path) -> Result<DescriptorInit> {
        Ok(match self {
            DescriptorSpec::Empty => DescriptorInit::Empty,
            DescriptorSpec::Content { text, path } => {
                DescriptorInit::Content(Contents { text, path }.load(base)?)
            }
            DescriptorSpec::Directory {
                name,
                host_dir,
                files,
            } => {
                let mut contents = match host_dir {
                    Some(dir) => snapshot_dir(&base.join(dir))?,
                    None => BTreeMap::new(),
                };
                contents.extend(files.into_iter().map(|(path, text)| (path, text.into_bytes())));
                DescriptorInit::directory(name, contents)
            }
        })
    }
}

impl RunManifest {
    /// Read and parse a manifest file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid manifest {}", path.display()))
    }

    /// Parse manifest text.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Build a run configuration. Relative host paths resolve against `base`.
    pub fn into_config(self, base: &Path) -> Result<RunConfig> {
        let mut config = RunConfig::new().with_args(self.args);
        for entry in self.env {
            config = config.with_env(entry);
        }
        if let Some(stdin) = &self.stdin {
            config = config.with_stdin(stdin.load(base).context("Failed to load stdin")?);
        }
        for descriptor in self.descriptors {
            config = config.with_descriptor(descriptor.into_init(base)?);
        }
        Ok(config)
    }
}

/// Read a host file into memory.
pub fn read_host_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Copy every regular file under `root` into memory, keyed by its
/// `/`-separated path relative to `root`.
pub fn snapshot_dir(root: &Path) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut files = BTreeMap::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir)
            .with_context(|| format!("Failed to read directory {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            let relative = path
                .strip_prefix(root)
                .with_context(|| format!("{} escapes {}", path.display(), root.display()))?;
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.insert(key, read_host_file(&path)?);
        }
    }

    tracing::debug!(root = %root.display(), files = files.len(), "Snapshot host directory");
    Ok(files)
}
