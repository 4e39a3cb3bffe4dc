//! Validate command - check that a module can run on this host.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use hearth::prelude::*;

use crate::OutputFormat;

/// Arguments for the validate command.
#[derive(Args)]
pub struct ValidateArgs {
    /// Path to the WebAssembly module
    #[arg(required = true)]
    pub module: PathBuf,

    /// Treat warnings as errors
    #[arg(long)]
    pub strict: bool,
}

/// Validation result.
#[derive(Debug, Serialize)]
struct ValidationResult {
    valid: bool,
    path: String,
    module_name: Option<String>,
    exports: usize,
    imports: usize,
    warnings: Vec<String>,
    errors: Vec<String>,
}

/// Execute the validate command.
pub fn execute(args: ValidateArgs, format: OutputFormat) -> Result<()> {
    let runtime = Hearth::builder().build().context("Failed to create runtime")?;

    let mut result = ValidationResult {
        valid: true,
        path: args.module.display().to_string(),
        module_name: None,
        exports: 0,
        imports: 0,
        warnings: Vec::new(),
        errors: Vec::new(),
    };

    match runtime.load_file(&args.module) {
        Ok(module) => {
            result.module_name = module.name().map(String::from);
            result.exports = module.exports().len();
            result.imports = module.imports().len();

            if let Err(e) = runtime.validate(&module) {
                result.errors.push(e.to_string());
            }

            if !module.has_export("memory") {
                result.warnings.push(
                    "Module exports no memory; any syscall touching guest memory will trap"
                        .to_string(),
                );
            }
            if module.metadata().memories.len() > 1 {
                result
                    .warnings
                    .push("Module exports more than one memory".to_string());
            }
        }
        Err(e) => {
            result.errors.push(e.to_string());
        }
    }

    if args.strict {
        result.errors.append(&mut result.warnings);
    }
    result.valid = result.errors.is_empty();

    match format {
        OutputFormat::Human => {
            if result.valid {
                println!("Module is valid: {}", args.module.display());
                if let Some(name) = &result.module_name {
                    println!("  Name: {name}");
                }
                println!("  Exports: {}", result.exports);
                println!("  Imports: {}", result.imports);

                if !result.warnings.is_empty() {
                    println!("\nWarnings:");
                    for warning in &result.warnings {
                        println!("  - {warning}");
                    }
                }
            } else {
                println!("Module is INVALID: {}", args.module.display());
                for error in &result.errors {
                    println!("  Error: {error}");
                }
            }
        }
        OutputFormat::Json | OutputFormat::JsonCompact => {
            println!("{}", format.json(&result)?);
        }
    }

    if result.valid {
        Ok(())
    } else {
        Err(anyhow::anyhow!("Validation failed"))
    }
}
