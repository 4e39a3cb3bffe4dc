//! Inspect command - show a module's exports, imports and memories.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use hearth::hearth_core::{ExportInfo, ExportKind, ImportInfo, ImportKind};
use hearth::hearth_host::{WASI_MODULE, wasi_import};
use hearth::prelude::*;

use crate::OutputFormat;

/// Arguments for the inspect command.
#[derive(Args)]
pub struct InspectArgs {
    /// Path to the WebAssembly module
    #[arg(required = true)]
    pub module: PathBuf,

    /// Show exports
    #[arg(long)]
    pub exports: bool,

    /// Show imports
    #[arg(long)]
    pub imports: bool,

    /// Show memory information
    #[arg(long)]
    pub memory: bool,

    /// Show all information
    #[arg(long, short)]
    pub all: bool,
}

/// Inspection result.
#[derive(Debug, Serialize)]
struct InspectionResult {
    path: String,
    name: Option<String>,
    size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    exports: Option<Vec<ExportDisplay>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    imports: Option<Vec<ImportDisplay>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    memories: Option<Vec<MemoryDisplay>>,
}

#[derive(Debug, Serialize)]
struct ExportDisplay {
    name: String,
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
}

#[derive(Debug, Serialize)]
struct ImportDisplay {
    module: String,
    name: String,
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
    provided: bool,
}

#[derive(Debug, Serialize)]
struct MemoryDisplay {
    name: String,
    min_pages: u64,
    max_pages: Option<u64>,
    memory64: bool,
}

impl From<&ExportInfo> for ExportDisplay {
    fn from(info: &ExportInfo) -> Self {
        let (kind, signature) = match &info.kind {
            ExportKind::Function(sig) => ("function", Some(sig.to_string())),
            ExportKind::Memory => ("memory", None),
            ExportKind::Global => ("global", None),
            ExportKind::Table => ("table", None),
        };

        Self {
            name: info.name.clone(),
            kind: kind.to_string(),
            signature,
        }
    }
}

impl From<&ImportInfo> for ImportDisplay {
    fn from(info: &ImportInfo) -> Self {
        let (kind, signature) = match &info.kind {
            ImportKind::Function(sig) => ("function", Some(sig)),
            ImportKind::Memory => ("memory", None),
            ImportKind::Global => ("global", None),
            ImportKind::Table => ("table", None),
        };

        let provided = info.module == WASI_MODULE
            && signature.is_some_and(|sig| {
                wasi_import(&info.name).is_some_and(|host| host.signature() == *sig)
            });

        Self {
            module: info.module.clone(),
            name: info.name.clone(),
            kind: kind.to_string(),
            signature: signature.map(ToString::to_string),
            provided,
        }
    }
}

/// Execute the inspect command.
pub fn execute(args: InspectArgs, format: OutputFormat) -> Result<()> {
    let runtime = Hearth::builder().build().context("Failed to create runtime")?;

    let module = runtime
        .load_file(&args.module)
        .context("Failed to load module")?;

    let show_all = args.all || (!args.exports && !args.imports && !args.memory);

    let mut result = InspectionResult {
        path: args.module.display().to_string(),
        name: module.name().map(String::from),
        size: module.metadata().size,
        exports: None,
        imports: None,
        memories: None,
    };

    if show_all || args.exports {
        result.exports = Some(module.exports().iter().map(ExportDisplay::from).collect());
    }

    if show_all || args.imports {
        result.imports = Some(module.imports().iter().map(ImportDisplay::from).collect());
    }

    if show_all || args.memory {
        result.memories = Some(
            module
                .metadata()
                .memories
                .iter()
                .map(|m| MemoryDisplay {
                    name: m.name.clone(),
                    min_pages: m.min_pages,
                    max_pages: m.max_pages,
                    memory64: m.memory64,
                })
                .collect(),
        );
    }

    match format {
        OutputFormat::Human => {
            println!("Module: {}", args.module.display());
            if let Some(name) = &result.name {
                println!("Name: {name}");
            }
            println!("Size: {} bytes", result.size);
            println!();

            if let Some(exports) = &result.exports {
                println!("Exports ({}):", exports.len());
                for export in exports {
                    match &export.signature {
                        Some(sig) => println!("  {} [{}]: {}", export.name, export.kind, sig),
                        None => println!("  {} [{}]", export.name, export.kind),
                    }
                }
                println!();
            }

            if let Some(imports) = &result.imports {
                println!("Imports ({}):", imports.len());
                for import in imports {
                    let mark = if import.provided { "ok" } else { "MISSING" };
                    match &import.signature {
                        Some(sig) => println!(
                            "  {}::{} [{}]: {} ({mark})",
                            import.module, import.name, import.kind, sig
                        ),
                        None => println!(
                            "  {}::{} [{}] ({mark})",
                            import.module, import.name, import.kind
                        ),
                    }
                }
                println!();
            }

            if let Some(memories) = &result.memories {
                println!("Memories ({}):", memories.len());
                for memory in memories {
                    let max = memory
                        .max_pages
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "unbounded".to_string());
                    let bits = if memory.memory64 { "64-bit" } else { "32-bit" };
                    println!(
                        "  {}: {} - {} pages ({})",
                        memory.name, memory.min_pages, max, bits
                    );
                }
            }
        }
        OutputFormat::Json | OutputFormat::JsonCompact => {
            println!("{}", format.json(&result)?);
        }
    }

    Ok(())
}
