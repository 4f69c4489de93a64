//! End-to-end behavior of the bridge against the in-memory script context.

use std::sync::Barrier;
use std::sync::atomic::{AtomicUsize, Ordering};

use modbridge::prelude::*;
use modbridge_script::generate_module;

fn registry() -> SharedRegistry {
    StaticModuleRegistry::from_toml_str(
        r#"
        [[modules]]
        name = "Timing"
        methods = [
            { name = "createTimer" },
            { name = "deleteTimer" },
            { name = "setSendIdleEvents", kind = "sync" },
        ]

        [[modules]]
        name = "AlertManager"
        methods = [{ name = "alertWithArgs" }]
        "#,
    )
    .unwrap()
    .into_shared()
}

fn context() -> HeapContext {
    let ctx = HeapContext::new();
    install_default_generator(&ctx, DEFAULT_GENERATOR_BINDING);
    ctx
}

#[test]
fn test_timing_alert_unknown_scenario() {
    let runtime = ModBridge::with_registry::<HeapContext>(registry()).unwrap();
    let ctx = context();

    let p1 = runtime.get_module(&ctx, "Timing").unwrap();
    assert_eq!(runtime.get_module(&ctx, "Timing").unwrap(), p1);

    assert!(runtime.get_module(&ctx, "Unknown").is_none());

    runtime.reload(ctx.id());

    let p2 = runtime.get_module(&ctx, "Timing").unwrap();
    assert_ne!(p1, p2);
    assert_eq!(runtime.get_module(&ctx, "Timing").unwrap(), p2);

    let alerts = runtime.get_module(&ctx, "AlertManager").unwrap();
    assert_ne!(alerts, p2);
}

#[test]
fn test_proxy_shape() {
    let ctx = context();
    let modules = NativeModules::new(registry());

    let timing = modules.get_module(&ctx, "Timing").unwrap();
    let idle = ctx.get_property(&timing, "setSendIdleEvents").unwrap();

    assert!(ctx.is_callable(&idle));
    assert_eq!(
        ctx.get_property(&idle, "type").unwrap(),
        ScriptValue::String("sync".into())
    );
}

#[test]
fn test_unknown_name_leaves_cache_untouched() {
    let ctx = context();
    let modules = NativeModules::new(registry());

    let timing = modules.get_module(&ctx, "Timing").unwrap();
    for _ in 0..3 {
        assert!(modules.get_module(&ctx, "Unknown").is_none());
    }

    assert_eq!(modules.cached_modules(), vec!["Timing"]);
    assert_eq!(modules.get_module(&ctx, "Timing").unwrap(), timing);
}

#[test]
fn test_reset_is_idempotent_and_releases_everything() {
    let ctx = context();
    let modules = NativeModules::new(registry());

    modules.get_module(&ctx, "Timing").unwrap();
    modules.get_module(&ctx, "AlertManager").unwrap();

    modules.reset();
    let protected_after_first = ctx.protected_objects();
    modules.reset();

    assert_eq!(protected_after_first, 0);
    assert_eq!(ctx.protected_objects(), 0);
    assert!(modules.is_empty());
    assert_eq!(modules.generator_status(), GeneratorStatus::Unloaded);
}

#[test]
fn test_concurrent_requests_share_one_proxy() {
    let ctx = HeapContext::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let generator = ctx.alloc_function(move |ctx, args| {
        counter.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(std::time::Duration::from_millis(10));
        generate_module(ctx, args)
    });
    ctx.set_global(DEFAULT_GENERATOR_BINDING, ScriptValue::Object(generator));

    let runtime = ModBridge::with_registry::<HeapContext>(registry()).unwrap();
    let barrier = Barrier::new(16);

    let proxies: Vec<ScriptValue> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let (runtime, ctx, barrier) = (&runtime, &ctx, &barrier);
                s.spawn(move || {
                    barrier.wait();
                    let name = if i % 2 == 0 { "Timing" } else { "AlertManager" };
                    runtime.get_module(ctx, name).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let timing: Vec<_> = proxies.iter().step_by(2).collect();
    let alerts: Vec<_> = proxies.iter().skip(1).step_by(2).collect();
    assert!(timing.iter().all(|p| *p == timing[0]));
    assert!(alerts.iter().all(|p| *p == alerts[0]));
    assert_ne!(timing[0], alerts[0]);

    // One creation per module, one bootstrap overall.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(ctx.global_lookups(), 1);
}

#[test]
fn test_requests_racing_a_reset() {
    let ctx = context();
    let modules = NativeModules::new(registry());

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..50 {
                    // A creation overtaken by a reset reports absence.
                    let _ = modules.get_module(&ctx, "Timing");
                }
            });
        }
        s.spawn(|| {
            for _ in 0..20 {
                modules.reset();
            }
        });
    });

    modules.reset();
    assert_eq!(ctx.protected_objects(), 0);

    let fresh = modules.get_module(&ctx, "Timing").unwrap();
    assert_eq!(modules.get_module(&ctx, "Timing").unwrap(), fresh);
}

#[test]
fn test_metrics_snapshot() {
    let ctx = context();
    let runtime = ModBridge::with_registry::<HeapContext>(registry()).unwrap();

    runtime.get_module(&ctx, "Timing");
    runtime.get_module(&ctx, "Timing");

    let snapshot = runtime.metrics(ctx.id()).unwrap();
    assert_eq!(snapshot.requests.hits, 1);
    assert_eq!(snapshot.lifecycle.creations, 1);
    assert!((snapshot.hit_ratio() - 0.5).abs() < f64::EPSILON);
}
