//! Validate command - Validate a registry manifest.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use modbridge_core::{MethodKind, StaticModuleRegistry};

use crate::OutputFormat;

/// Arguments for the validate command.
#[derive(Args)]
pub struct ValidateArgs {
    /// Path to the registry manifest (TOML or JSON)
    #[arg(required = true)]
    pub manifest: PathBuf,

    /// Treat warnings as errors
    #[arg(long)]
    pub strict: bool,
}

/// Validation result.
#[derive(Debug, Serialize)]
struct ValidationResult {
    valid: bool,
    path: String,
    modules: usize,
    methods: usize,
    warnings: Vec<String>,
    errors: Vec<String>,
}

/// Execute the validate command.
pub fn execute(args: ValidateArgs, format: OutputFormat, quiet: bool) -> Result<()> {
    let mut result = ValidationResult {
        valid: true,
        path: args.manifest.display().to_string(),
        modules: 0,
        methods: 0,
        warnings: Vec::new(),
        errors: Vec::new(),
    };

    // Structural problems (duplicates, bad names) fail the load itself
    match StaticModuleRegistry::load_file(&args.manifest) {
        Ok(registry) => {
            result.modules = registry.len();

            if registry.is_empty() {
                result.warnings.push("Manifest declares no modules".to_string());
            }

            for module in registry.iter() {
                result.methods += module.methods.len();

                if module.methods.is_empty() && module.constants.is_empty() {
                    result.warnings.push(format!(
                        "Module '{}' exports neither methods nor constants",
                        module.name
                    ));
                }

                for method in &module.methods {
                    if method.name.is_empty() {
                        result
                            .warnings
                            .push(format!("Module '{}' has a method with no name", module.name));
                    }
                }

                let sync = module.method_ids(MethodKind::Sync).len();
                if sync > 0 {
                    result.warnings.push(format!(
                        "Module '{}' declares {} sync method(s) - these block the script thread",
                        module.name, sync
                    ));
                }
            }

            if args.strict && !result.warnings.is_empty() {
                result.valid = false;
                result.errors = std::mem::take(&mut result.warnings);
            }
        }
        Err(e) => {
            result.valid = false;
            result.errors.push(e.to_string());
        }
    }

    // Output results
    match format {
        OutputFormat::Human => {
            if result.valid {
                if !quiet {
                    println!("Manifest is valid: {}", args.manifest.display());
                    println!("  Modules: {}", result.modules);
                    println!("  Methods: {}", result.methods);
                }

                if !result.warnings.is_empty() {
                    println!("\nWarnings:");
                    for warning in &result.warnings {
                        println!("  - {}", warning);
                    }
                }
            } else {
                println!("Manifest is INVALID: {}", args.manifest.display());
                for error in &result.errors {
                    println!("  Error: {}", error);
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        OutputFormat::JsonCompact => {
            println!("{}", serde_json::to_string(&result)?);
        }
    }

    if result.valid {
        Ok(())
    } else {
        Err(anyhow::anyhow!("Validation failed"))
    }
}
