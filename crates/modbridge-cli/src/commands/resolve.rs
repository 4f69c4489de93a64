//! Resolve command - Request module proxies against the reference script context.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use modbridge::ModBridge;
use modbridge_core::{BridgeConfig, DEFAULT_PROXY_PROPERTY, ScriptContext};
use modbridge_observe::{CacheMetricsSnapshot, LoggingSubscriber};
use modbridge_script::{HeapContext, ScriptValue, generate_module};

use crate::OutputFormat;

/// Arguments for the resolve command.
#[derive(Args)]
pub struct ResolveArgs {
    /// Path to the registry manifest (TOML or JSON)
    #[arg(required = true)]
    pub manifest: PathBuf,

    /// Module names to request, in order
    #[arg(required = true)]
    pub modules: Vec<String>,

    /// Number of times to request the whole list
    #[arg(short = 'n', long, default_value = "1")]
    pub repeat: usize,

    /// Reload the context between rounds
    #[arg(long)]
    pub reset_between: bool,

    /// Log every bridge event
    #[arg(long)]
    pub trace_events: bool,
}

/// Resolution report.
#[derive(Debug, Serialize)]
struct ResolveReport {
    manifest: String,
    generator: String,
    requests: Vec<RequestDisplay>,
    cached: Vec<String>,
    metrics: CacheMetricsSnapshot,
}

#[derive(Debug, Serialize)]
struct RequestDisplay {
    round: usize,
    module: String,
    outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    proxy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
enum Outcome {
    Created,
    Cached,
    Failed,
}

impl Outcome {
    fn as_str(self) -> &'static str {
        match self {
            Outcome::Created => "created",
            Outcome::Cached => "cached",
            Outcome::Failed => "failed",
        }
    }
}

/// Execute the resolve command.
pub fn execute(
    args: ResolveArgs,
    config: BridgeConfig,
    format: OutputFormat,
    quiet: bool,
) -> Result<()> {
    let mut builder = ModBridge::builder()
        .with_manifest_file(&args.manifest)
        .with_config(config.clone());
    if args.trace_events {
        builder = builder.with_event_subscriber(Arc::new(LoggingSubscriber::new()));
    }
    let runtime = builder
        .build::<HeapContext>()
        .with_context(|| format!("Failed to load manifest {}", args.manifest.display()))?;

    let ctx = HeapContext::new();
    install_generator(&ctx, &config);

    if !quiet {
        tracing::info!(
            context = %ctx.id(),
            modules = args.modules.len(),
            rounds = args.repeat,
            "Resolving modules"
        );
    }

    let cache = runtime.attach(&ctx);
    let mut requests = Vec::with_capacity(args.modules.len() * args.repeat);

    for round in 0..args.repeat {
        if round > 0 && args.reset_between {
            runtime.reload(ctx.id());
        }

        for module in &args.modules {
            let was_cached = cache.contains(module);
            let request = match cache.try_get_module(&ctx, module) {
                Ok(proxy) => RequestDisplay {
                    round,
                    module: module.clone(),
                    outcome: if was_cached {
                        Outcome::Cached
                    } else {
                        Outcome::Created
                    },
                    proxy: Some(proxy.to_string()),
                    error: None,
                },
                Err(e) => RequestDisplay {
                    round,
                    module: module.clone(),
                    outcome: Outcome::Failed,
                    proxy: None,
                    error: Some(e.to_string()),
                },
            };
            requests.push(request);
        }
    }

    let report = ResolveReport {
        manifest: args.manifest.display().to_string(),
        generator: config.generator_binding.clone(),
        requests,
        cached: cache.cached_modules(),
        metrics: cache.metrics().snapshot(),
    };

    // Output results
    match format {
        OutputFormat::Human => {
            for request in &report.requests {
                let detail = request
                    .proxy
                    .as_deref()
                    .or(request.error.as_deref())
                    .unwrap_or_default();
                println!(
                    "[{}] {:<24} {:<8} {}",
                    request.round,
                    request.module,
                    request.outcome.as_str(),
                    detail
                );
            }

            if !quiet {
                let requests = &report.metrics.requests;
                println!();
                println!("Cached: {}", report.cached.join(", "));
                println!(
                    "Hits: {}  Misses: {}  Failures: {}  Hit ratio: {:.2}",
                    requests.hits,
                    requests.misses,
                    requests.failures,
                    report.metrics.hit_ratio()
                );
                println!(
                    "Bootstraps: {}  Resets: {}",
                    report.metrics.lifecycle.bootstraps, report.metrics.lifecycle.resets
                );
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::JsonCompact => {
            println!("{}", serde_json::to_string(&report)?);
        }
    }

    Ok(())
}

/// Bind the reference generator, exposing proxies under the configured property.
fn install_generator(ctx: &HeapContext, config: &BridgeConfig) {
    let property = config.proxy_property.clone();
    let generator = ctx.alloc_function(move |ctx, args| {
        let info = generate_module(ctx, args)?;
        if property != DEFAULT_PROXY_PROPERTY {
            if let Some(handle) = info.as_object() {
                let proxy = ctx.property(handle, DEFAULT_PROXY_PROPERTY)?;
                ctx.set_property(handle, property.as_str(), proxy)?;
            }
        }
        Ok(info)
    });
    ctx.set_global(
        config.generator_binding.as_str(),
        ScriptValue::Object(generator),
    );
}
