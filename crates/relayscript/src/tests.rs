use std::sync::Mutex;

use async_trait::async_trait;

use crate::*;

async fn run(source: &str, payload: Value) -> Result<Value, RuntimeError> {
    compile(source).expect("compiles").call(payload, &Detached).await
}

/// Answers `double` and records every registry call it sees.
#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<String>>,
}

impl Recorder {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock").clone()
    }
}

#[async_trait]
impl Host for Recorder {
    async fn dispatch(&self, method: &str, payload: Value) -> Result<Value, String> {
        self.calls.lock().expect("lock").push(format!("dispatch {}", method));
        match (method, payload) {
            ("double", Value::Int(x)) => Ok(Value::Int(x * 2)),
            _ => Err(format!("Method \"{}\" not registered", method)),
        }
    }

    async fn register(&self, method: &str, source: Value) -> Result<(), String> {
        self.calls.lock().expect("lock").push(format!("register {} {}", method, source));
        Ok(())
    }

    async fn unregister(&self, method: &str) {
        self.calls.lock().expect("lock").push(format!("unregister {}", method));
    }
}

// ============================================================================
//  COMPILATION
// ============================================================================

#[test]
fn test_function_forms_compile() {
    let forms = [
        "function (x) { return x * x }",
        "function square(x) { return x * x; }",
        "async function (x, registry) { return await registry.dispatch('a', x) }",
        "x => x * x",
        "(x) => x * x",
        "async (x, registry) => { return x }",
        "() => 1",
        "(function (x) { return x })",
        "  function (x) { return x };  ",
    ];
    for source in forms {
        assert!(compile(source).is_ok(), "{source}");
    }

    let named = compile("function square(x) { return x * x }").expect("compiles");
    assert_eq!(named.name(), Some("square"));
    assert_eq!(named.params(), ["x".to_owned()]);
}

#[test]
fn test_non_function_sources_are_rejected() {
    assert!(matches!(compile("foo"), Err(CompileError::NotAFunction(_))));
    assert!(matches!(compile("\"foo\""), Err(CompileError::NotAFunction(_))));
    assert!(matches!(compile("1 + 2"), Err(CompileError::NotAFunction(_))));
    assert!(matches!(compile("{ a: 1 }"), Err(CompileError::NotAFunction(_))));
}

#[test]
fn test_syntax_errors_carry_an_offset() {
    let Err(CompileError::Syntax { offset, .. }) = compile("function (x) { return x * }") else {
        panic!("expected a syntax error");
    };
    assert_eq!(offset, 26);

    assert!(matches!(compile(""), Err(CompileError::Syntax { .. })));
    assert!(matches!(compile("function (x) { return 'open }"), Err(CompileError::Syntax { .. })));
    assert!(matches!(compile("x => x; x"), Err(CompileError::Syntax { .. })));
    assert!(matches!(compile("function (x) { 1 = x }"), Err(CompileError::Syntax { .. })));
}

#[test]
fn test_limits_are_enforced() {
    let limits = Limits { max_source_len: 16, max_depth: 64 };
    assert!(matches!(
        compile_with("function (x) { return x }", &limits),
        Err(CompileError::TooLong { len: 25, max: 16 })
    ));

    let nested = format!("x => {}x{}", "(".repeat(200), ")".repeat(200));
    assert!(matches!(compile(&nested), Err(CompileError::TooDeep(64))));

    let chain = format!("x => x{}", " + 1".repeat(200));
    assert!(matches!(compile(&chain), Err(CompileError::TooDeep(64))));

    let blocks = format!("function (x) {}{}", "{".repeat(100), "}".repeat(100));
    assert!(matches!(compile(&blocks), Err(CompileError::TooDeep(64))));
}

// ============================================================================
//  EVALUATION
// ============================================================================

#[tokio::test]
async fn test_square() -> anyhow::Result<()> {
    assert_eq!(run("function (x) { return x * x }", Value::Int(5)).await?, Value::Int(25));
    assert_eq!(run("x => x * x", Value::Float(1.5)).await?, Value::Float(2.25));
    Ok(())
}

#[tokio::test]
async fn test_arithmetic_stays_integral_when_exact() -> anyhow::Result<()> {
    assert_eq!(run("() => 7 / 2", Value::Unit).await?, Value::Float(3.5));
    assert_eq!(run("() => 8 / 2", Value::Unit).await?, Value::Int(4));
    assert_eq!(run("() => 7 % 3", Value::Unit).await?, Value::Int(1));
    assert_eq!(run("() => 0.5 + 0.5", Value::Unit).await?, Value::Int(1));
    assert_eq!(run("() => 1 / 0", Value::Unit).await?, Value::Float(f64::INFINITY));
    assert_eq!(run("() => 9007199254740992 * 4", Value::Unit).await?, Value::Int(36028797018963968));
    Ok(())
}

#[tokio::test]
async fn test_string_concatenation_and_display() -> anyhow::Result<()> {
    let source = "(p) => 'hello ' + p.name + '!' + [1, 2] + undefined";
    let payload = Value::map([("name", Value::from("relay"))]);
    assert_eq!(run(source, payload).await?, Value::from("hello relay!1,2undefined"));
    Ok(())
}

#[tokio::test]
async fn test_control_flow_and_scopes() -> anyhow::Result<()> {
    let source = r#"
        function classify(n) {
            let label = "small";
            if (n > 100) {
                label = "large";
            } else if (n > 10) {
                let label = "shadowed";
                label = "ignored";
            }
            const parity = n % 2 === 0 ? "even" : "odd";
            return { label, parity, size: typeof n };
        }
    "#;

    let out = run(source, Value::Int(250)).await?;
    assert_eq!(out.get("label"), Some(&Value::from("large")));
    assert_eq!(out.get("parity"), Some(&Value::from("even")));
    assert_eq!(out.get("size"), Some(&Value::from("number")));

    let out = run(source, Value::Int(33)).await?;
    assert_eq!(out.get("label"), Some(&Value::from("small")));
    assert_eq!(out.get("parity"), Some(&Value::from("odd")));
    Ok(())
}

#[tokio::test]
async fn test_members_and_builtins() -> anyhow::Result<()> {
    let source = "(xs) => [xs.length, xs[0], xs[9], 'abc'.length, Math.max(xs[0], xs[1]), Math.sqrt(16)]";
    let out = run(source, Value::List(vec![Value::Int(3), Value::Int(8)])).await?;
    assert_eq!(out, Value::List(vec![
        Value::Int(2),
        Value::Int(3),
        Value::Unit,
        Value::Int(3),
        Value::Int(8),
        Value::Int(4),
    ]));
    Ok(())
}

#[tokio::test]
async fn test_missing_payload_is_undefined() -> anyhow::Result<()> {
    assert_eq!(run("(x) => typeof x", Value::Unit).await?, Value::from("undefined"));
    assert_eq!(run("function () {}", Value::Int(1)).await?, Value::Unit);
    Ok(())
}

#[tokio::test]
async fn test_runtime_errors() {
    let thrown = run("function (x) { throw new Error('bad ' + x) }", Value::Int(1)).await;
    let Err(error) = thrown else { panic!("expected a throw") };
    assert_eq!(error.to_string(), "bad 1");
    assert!(matches!(&error, RuntimeError::Thrown(v) if v.get("name") == Some(&Value::from("Error"))));

    let reference = run("() => missing + 1", Value::Unit).await;
    assert_eq!(reference, Err(RuntimeError::Reference("missing".into())));

    let type_error = run("(x) => x.y.z", Value::Unit).await;
    assert!(matches!(type_error, Err(RuntimeError::Type(_))));

    let not_callable = run("(x) => x.push(1)", Value::List(vec![])).await;
    assert!(matches!(not_callable, Err(RuntimeError::Type(_))));
}

#[tokio::test]
async fn test_registry_handle_is_usable_from_scripts() -> anyhow::Result<()> {
    let host = Recorder::default();
    let source = r#"
        async function (x, registry) {
            await registry.register("inner", "y => y");
            const doubled = await registry.dispatch("double", x);
            registry.unregister("inner");
            return doubled + 1;
        }
    "#;

    let out = compile(source)?.call(Value::Int(20), &host).await?;
    assert_eq!(out, Value::Int(41));
    assert_eq!(host.calls(), ["register inner y => y", "dispatch double", "unregister inner"]);
    Ok(())
}

#[tokio::test]
async fn test_host_failures_surface_as_errors() -> anyhow::Result<()> {
    let out = compile("(x, registry) => registry.dispatch('missing', x)")?
        .call(Value::Unit, &Recorder::default())
        .await;
    assert_eq!(out, Err(RuntimeError::Host("Method \"missing\" not registered".into())));

    let leaked = compile("(x, registry) => registry")?.call(Value::Unit, &Detached).await;
    assert!(matches!(leaked, Err(RuntimeError::Type(_))));
    Ok(())
}
