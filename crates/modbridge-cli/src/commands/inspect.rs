//! Inspect command - List the modules of a registry manifest.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use modbridge_core::{ModuleDescriptor, ModuleRegistry, StaticModuleRegistry};

use crate::OutputFormat;

/// Arguments for the inspect command.
#[derive(Args)]
pub struct InspectArgs {
    /// Path to the registry manifest (TOML or JSON)
    #[arg(required = true)]
    pub manifest: PathBuf,

    /// Only show these modules
    #[arg(short, long = "module")]
    pub modules: Vec<String>,

    /// Show the config payload handed to the generator
    #[arg(long)]
    pub payloads: bool,
}

/// Inspection result.
#[derive(Debug, Serialize)]
struct InspectionResult {
    path: String,
    module_count: usize,
    modules: Vec<ModuleDisplay>,
}

#[derive(Debug, Serialize)]
struct ModuleDisplay {
    id: u32,
    name: String,
    constants: Vec<String>,
    methods: Vec<MethodDisplay>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct MethodDisplay {
    name: String,
    kind: String,
}

impl ModuleDisplay {
    fn new(id: u32, descriptor: &ModuleDescriptor, with_payload: bool) -> Self {
        Self {
            id,
            name: descriptor.name.clone(),
            constants: descriptor.constants.keys().cloned().collect(),
            methods: descriptor
                .methods
                .iter()
                .map(|m| MethodDisplay {
                    name: m.name.clone(),
                    kind: m.kind.to_string(),
                })
                .collect(),
            payload: with_payload.then(|| descriptor.config_payload()),
        }
    }
}

/// Execute the inspect command.
pub fn execute(args: InspectArgs, format: OutputFormat) -> Result<()> {
    let registry = StaticModuleRegistry::load_file(&args.manifest)
        .with_context(|| format!("Failed to load manifest {}", args.manifest.display()))?;

    for name in &args.modules {
        if !registry.has_module(name) {
            anyhow::bail!("Module '{}' is not in the manifest", name);
        }
    }

    let modules: Vec<ModuleDisplay> = registry
        .iter()
        .filter(|d| args.modules.is_empty() || args.modules.contains(&d.name))
        .filter_map(|d| {
            let id = registry.module_id(&d.name)?;
            Some(ModuleDisplay::new(id, d, args.payloads))
        })
        .collect();

    let result = InspectionResult {
        path: args.manifest.display().to_string(),
        module_count: registry.len(),
        modules,
    };

    // Output results
    match format {
        OutputFormat::Human => {
            println!("Manifest: {}", result.path);
            println!("Modules: {}", result.module_count);
            println!();

            for module in &result.modules {
                println!("[{}] {}", module.id, module.name);
                if !module.constants.is_empty() {
                    println!("  Constants: {}", module.constants.join(", "));
                }
                if module.methods.is_empty() {
                    println!("  Methods: none");
                } else {
                    println!("  Methods ({}):", module.methods.len());
                    for method in &module.methods {
                        println!("    {} [{}]", method.name, method.kind);
                    }
                }
                if let Some(payload) = &module.payload {
                    println!("  Payload: {}", payload);
                }
                println!();
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        OutputFormat::JsonCompact => {
            println!("{}", serde_json::to_string(&result)?);
        }
    }

    Ok(())
}
