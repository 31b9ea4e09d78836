//! A controller talking to an executor on its own thread, through nothing but bytes.

use std::sync::Arc;

use relayrun::Caller;
use relayrun::Handle;
use relayrun::Isolate;
use relayrun::Registry;
use relayrun::ScriptCompiler;
use relayrun::Value;
use relayrun::caller::Error;
use relayrun::isolate;
use relayrun::registry;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Starts an isolate with source registration enabled and a few native methods.
fn start() -> anyhow::Result<(Isolate, Arc<Caller>)> {
    init_tracing();

    let registry = Registry::builder()
        .allow_source(ScriptCompiler::new())
        .function("b", |payload: Value, _| async move {
            Ok(Value::from(format!("b saw {}", payload)))
        })
        .function("a", |payload: Value, handle: Handle| async move {
            let nested = handle.dispatch("b", payload).await?;
            Ok::<_, registry::Error>(Value::map([("nested", nested)]))
        })
        .build();

    let mut isolate = Isolate::spawn("worker", registry)?;
    let caller = isolate.caller().ok_or_else(|| anyhow::anyhow!("caller already taken"))?;
    Ok((isolate, Arc::new(caller)))
}

/// Drops the caller and waits for the executor thread to finish.
async fn stop(isolate: Isolate, caller: Arc<Caller>) -> anyhow::Result<()> {
    drop(caller);
    isolate.join().await?;
    Ok(())
}

#[tokio::test]
async fn test_square_registered_from_source() -> anyhow::Result<()> {
    let (isolate, caller) = start()?;

    caller.register_source("square", "function (x) { return x * x }").await?;
    assert_eq!(caller.dispatch("square", Value::Int(5)).await?, Value::Int(25));

    stop(isolate, caller).await
}

#[tokio::test]
async fn test_register_compiled_function() -> anyhow::Result<()> {
    let (isolate, caller) = start()?;

    let cube = relayscript::compile("x => x * x * x")?;
    caller.register("cube", &cube).await?;
    assert_eq!(caller.dispatch("cube", Value::Int(3)).await?, Value::Int(27));

    stop(isolate, caller).await
}

#[tokio::test]
async fn test_missing_method_rejects_with_its_message() -> anyhow::Result<()> {
    let (isolate, caller) = start()?;

    let err = caller.dispatch("missing", Value::Int(1)).await.unwrap_err();
    assert_eq!(err.to_string(), "Method \"missing\" not registered");
    let Error::Remote(info) = err else { panic!("expected a remote failure") };
    assert_eq!(info.name, "MethodNotFound");

    stop(isolate, caller).await
}

#[tokio::test]
async fn test_unregister_then_dispatch_fails() -> anyhow::Result<()> {
    let (isolate, caller) = start()?;

    caller.register_source("temp", "() => 1").await?;
    assert_eq!(caller.dispatch("temp", Value::Unit).await?, Value::Int(1));

    caller.unregister("temp").await?;
    caller.unregister("temp").await?;
    let err = caller.dispatch("temp", Value::Unit).await.unwrap_err();
    assert_eq!(err.to_string(), "Method \"temp\" not registered");

    stop(isolate, caller).await
}

#[tokio::test]
async fn test_nested_dispatch_resolves_inside_the_isolate() -> anyhow::Result<()> {
    let (isolate, caller) = start()?;

    let out = caller.dispatch("a", Value::from("hi")).await?;
    assert_eq!(out.get("nested"), Some(&Value::from("b saw hi")));

    // Scripts nest through the same handle.
    caller.register_source("c", "async (x, registry) => 'c: ' + await registry.dispatch('a', x).nested").await?;
    assert_eq!(caller.dispatch("c", Value::Int(2)).await?, Value::from("c: b saw 2"));

    stop(isolate, caller).await
}

#[tokio::test]
async fn test_concurrent_calls_get_their_own_results() -> anyhow::Result<()> {
    let (isolate, caller) = start()?;
    caller.register_source("inc", "(x) => x + 1").await?;

    let mut tasks = Vec::new();
    for i in 0..64i64 {
        let caller = caller.clone();
        tasks.push(tokio::spawn(async move { (i, caller.dispatch("inc", Value::Int(i)).await) }));
    }
    for task in tasks {
        let (i, result) = task.await?;
        assert_eq!(result?, Value::Int(i + 1));
    }
    assert_eq!(caller.pending(), 0);

    stop(isolate, caller).await
}

#[tokio::test]
async fn test_user_failures_come_back_as_rejections() -> anyhow::Result<()> {
    let (isolate, caller) = start()?;

    caller.register_source("picky", r#"
        function (x) {
            if (typeof x !== "number") {
                throw new Error("picky wants a number, got " + typeof x);
            }
            return x;
        }
    "#).await?;

    let err = caller.dispatch("picky", Value::from("text")).await.unwrap_err();
    assert_eq!(err.to_string(), "picky wants a number, got string");
    assert_eq!(caller.dispatch("picky", Value::Float(2.5)).await?, Value::Float(2.5));

    stop(isolate, caller).await
}

#[tokio::test]
async fn test_invalid_registration_never_reaches_the_isolate() -> anyhow::Result<()> {
    let (isolate, caller) = start()?;

    let err = caller.register_source("foo", "foo").await.unwrap_err();
    assert_eq!(err, Error::InvalidRegistrationArgument);
    let err = caller.dispatch("foo", Value::Unit).await.unwrap_err();
    assert_eq!(err.to_string(), "Method \"foo\" not registered");

    stop(isolate, caller).await
}

#[tokio::test]
async fn test_deep_recursion_through_the_isolate() -> anyhow::Result<()> {
    let (isolate, caller) = start()?;

    caller.register_source("r", "(x, reg) => x <= 0 ? 0 : 1 + reg.dispatch('r', x - 1)").await?;
    assert_eq!(caller.dispatch("r", Value::Int(1000)).await?, Value::Int(1000));

    // The isolate survives and keeps serving.
    assert_eq!(caller.dispatch("r", Value::Int(3)).await?, Value::Int(3));

    stop(isolate, caller).await
}

#[tokio::test]
async fn test_isolate_with_configured_stack() -> anyhow::Result<()> {
    init_tracing();
    let registry = Registry::builder().allow_source(ScriptCompiler::new()).build();
    let config = isolate::Config { stack_size: 1024 * 1024 };
    let mut isolate = Isolate::spawn_with("small", registry, config)?;
    let caller = Arc::new(isolate.caller().ok_or_else(|| anyhow::anyhow!("caller already taken"))?);

    caller.register_source("r", "(x, reg) => x <= 0 ? 0 : 1 + reg.dispatch('r', x - 1)").await?;
    assert_eq!(caller.dispatch("r", Value::Int(500)).await?, Value::Int(500));

    stop(isolate, caller).await
}
