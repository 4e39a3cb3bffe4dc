//! Run command - execute a WASI module's `_start`.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::Args;

use hearth::prelude::*;

use crate::OutputFormat;
use crate::manifest::{RunManifest, read_host_file, snapshot_dir};

/// Arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    /// Path to the WebAssembly module
    #[arg(required = true)]
    pub module: PathBuf,

    /// Argument passed to the guest (repeatable; the first is argv[0])
    #[arg(long = "arg", value_name = "ARG")]
    pub args: Vec<String>,

    /// Environment entry passed to the guest, normally KEY=VALUE
    #[arg(long = "env", value_name = "ENTRY")]
    pub env: Vec<String>,

    /// Preopen a snapshot of a host directory as NAME=HOSTDIR
    #[arg(long = "dir", value_name = "NAME=HOSTDIR")]
    pub dirs: Vec<String>,

    /// Preopen a directory NAME holding one host file, as NAME=HOSTFILE
    #[arg(long = "file", value_name = "NAME=HOSTFILE")]
    pub files: Vec<String>,

    /// Host file used as the guest's standard input
    #[arg(long)]
    pub stdin: Option<PathBuf>,

    /// TOML run manifest; command-line values are appended to it
    #[arg(long)]
    pub manifest: Option<PathBuf>,

    /// Memory limit in bytes (default: 64MB)
    #[arg(long, default_value = "67108864")]
    pub memory_limit: usize,

    /// Fuel limit for execution (default: 1B)
    #[arg(long, default_value = "1000000000")]
    pub fuel_limit: u64,

    /// Largest size the guest may grow any virtual file to (default: 64MB)
    #[arg(long, default_value = "67108864")]
    pub file_limit: u64,

    /// Print the run report to stderr
    #[arg(long)]
    pub report: bool,
}

fn split_assignment(value: &str) -> Result<(&str, &str)> {
    value
        .split_once('=')
        .filter(|(name, path)| !name.is_empty() && !path.is_empty())
        .ok_or_else(|| anyhow!("expected NAME=PATH, got {value:?}"))
}

impl RunArgs {
    fn run_config(&self) -> Result<RunConfig> {
        let mut config = match &self.manifest {
            Some(path) => {
                let base = path.parent().unwrap_or_else(|| Path::new("."));
                RunManifest::from_file(path)?.into_config(base)?
            }
            None => RunConfig::new(),
        };

        config = config.with_args(self.args.iter().cloned());
        for entry in &self.env {
            config = config.with_env(entry.clone());
        }

        if let Some(path) = &self.stdin {
            config = config.with_stdin(read_host_file(path).context("Failed to load stdin")?);
        }

        for dir in &self.dirs {
            let (name, host_dir) = split_assignment(dir).context("Invalid --dir")?;
            let files = snapshot_dir(Path::new(host_dir))?;
            config = config.with_directory(name, files);
        }

        for file in &self.files {
            let (name, host_file) = split_assignment(file).context("Invalid --file")?;
            let path = Path::new(host_file);
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| anyhow!("{host_file} has no file name"))?;
            config = config.with_directory(name, [(file_name, read_host_file(path)?)]);
        }

        Ok(config)
    }
}

/// Execute the run command, returning the process exit status.
pub fn execute(args: RunArgs, format: OutputFormat, quiet: bool) -> Result<u8> {
    let config = args.run_config()?;

    let runtime = Hearth::builder()
        .with_memory_limit(args.memory_limit)
        .with_fuel_limit(args.fuel_limit)
        .with_file_size_limit(args.file_limit)
        .build()
        .context("Failed to create runtime")?;

    tracing::info!(
        module = %args.module.display(),
        args = config.args.len(),
        descriptors = config.descriptors.len(),
        "Running module"
    );

    let mut host = runtime.host(config).context("Failed to create host")?;
    let result = host.run(&mut FileSource::new(&args.module));

    // Output produced before a failure is still the guest's.
    std::io::stdout()
        .write_all(&host.stdout())
        .context("Failed to write guest stdout")?;
    std::io::stderr()
        .write_all(&host.stderr())
        .context("Failed to write guest stderr")?;

    if args.report {
        let report = host.report();
        let text = match format {
            OutputFormat::Human => report.to_text(),
            _ => format.json(&report)?,
        };
        eprintln!("{text}");
    }

    let outcome = result.with_context(|| format!("Failed to run {}", args.module.display()))?;

    if let RunOutcome::Trapped(trap) = &outcome {
        if !quiet {
            eprintln!("Guest trapped: {trap}");
        }
    }

    Ok(outcome.exit_code() as u8)
}
