//! Tree-walking evaluator.
//!
//! Evaluation is async because registry calls made from a script suspend
//! until the registry answers. Recursive steps are boxed; the parser has
//! already bounded how deep they can go.

use std::collections::HashMap;

use futures::future::BoxFuture;
use futures::FutureExt;
use relaypack::Value;

use crate::ast::BinOp;
use crate::ast::Body;
use crate::ast::Expr;
use crate::ast::FunctionDef;
use crate::ast::LogicOp;
use crate::ast::Stmt;
use crate::ast::UnOp;
use crate::error::RuntimeError;
use crate::host::Host;

type Result<T> = std::result::Result<T, RuntimeError>;

/// Largest integer a double represents exactly: 2^53.
const MAX_SAFE: f64 = 9_007_199_254_740_992.0;

/// Normalizes a numeric result: exact integers stay `Int`, everything else is `Float`.
pub fn number(v: f64) -> Value {
    if v.is_finite() && v.fract() == 0.0 && v.abs() <= MAX_SAFE {
        Value::Int(v as i64)
    } else {
        Value::Float(v)
    }
}

/// What an identifier can be bound to.
///
/// The registry handle and `Math` are callable namespaces, not values; they
/// can be passed around inside a script but never returned or sent.
#[derive(Debug, Clone)]
enum Slot {
    Data(Value),
    Host,
    Math,
}

impl Slot {
    fn into_value(self) -> Result<Value> {
        match self {
            Slot::Data(v) => Ok(v),
            Slot::Host => Err(RuntimeError::Type("the registry handle is not a value".into())),
            Slot::Math => Err(RuntimeError::Type("Math is not a value".into())),
        }
    }
}

enum Flow {
    Normal,
    Return(Value),
}

struct Env {
    scopes: Vec<HashMap<String, Slot>>,
}

impl Env {
    fn new() -> Self {
        Self { scopes: vec![HashMap::new()] }
    }

    fn lookup(&self, name: &str) -> Option<Slot> {
        if let Some(slot) = self.scopes.iter().rev().find_map(|s| s.get(name)) {
            return Some(slot.clone());
        }
        match name {
            "Math" => Some(Slot::Math),
            "NaN" => Some(Slot::Data(Value::Float(f64::NAN))),
            "Infinity" => Some(Slot::Data(Value::Float(f64::INFINITY))),
            _ => None,
        }
    }

    fn declare(&mut self, name: &str, slot: Slot) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_owned(), slot);
        }
    }

    fn assign(&mut self, name: &str, slot: Slot) -> Result<()> {
        let scope = self.scopes.iter_mut().rev()
            .find(|s| s.contains_key(name))
            .ok_or_else(|| RuntimeError::Reference(name.to_owned()))?;
        scope.insert(name.to_owned(), slot);
        Ok(())
    }
}

/// Runs `def` with the payload bound to its first parameter and the registry
/// handle bound to its second.
pub async fn call(def: &FunctionDef, payload: Value, host: &dyn Host) -> Result<Value> {
    let mut env = Env::new();
    let mut payload = Some(payload);
    for (i, param) in def.params.iter().enumerate() {
        let slot = match i {
            0 => Slot::Data(payload.take().unwrap_or_default()),
            1 => Slot::Host,
            _ => Slot::Data(Value::Unit),
        };
        env.declare(param, slot);
    }

    let interp = Interpreter { host };
    match &def.body {
        Body::Expr(expr) => interp.value(expr, &mut env).await,
        Body::Block(stmts) => match interp.block(stmts, &mut env).await? {
            Flow::Return(v) => Ok(v),
            Flow::Normal => Ok(Value::Unit),
        },
    }
}

struct Interpreter<'h> {
    host: &'h dyn Host,
}

impl<'h> Interpreter<'h> {
    fn block<'a>(&'a self, stmts: &'a [Stmt], env: &'a mut Env) -> BoxFuture<'a, Result<Flow>> {
        async move {
            env.scopes.push(HashMap::new());
            let mut flow = Ok(Flow::Normal);
            for stmt in stmts {
                flow = self.exec(stmt, env).await;
                if !matches!(flow, Ok(Flow::Normal)) {
                    break;
                }
            }
            env.scopes.pop();
            flow
        }
        .boxed()
    }

    fn exec<'a>(&'a self, stmt: &'a Stmt, env: &'a mut Env) -> BoxFuture<'a, Result<Flow>> {
        async move {
            match stmt {
                Stmt::Let(name, init) => {
                    let slot = match init {
                        Some(expr) => self.eval(expr, env).await?,
                        None => Slot::Data(Value::Unit),
                    };
                    env.declare(name, slot);
                    Ok(Flow::Normal)
                }
                Stmt::Expr(expr) => {
                    self.eval(expr, env).await?;
                    Ok(Flow::Normal)
                }
                Stmt::Return(expr) => {
                    let value = match expr {
                        Some(expr) => self.value(expr, env).await?,
                        None => Value::Unit,
                    };
                    Ok(Flow::Return(value))
                }
                Stmt::If(cond, then, otherwise) => {
                    if truthy(&self.value(cond, env).await?) {
                        self.exec(then, env).await
                    } else if let Some(otherwise) = otherwise {
                        self.exec(otherwise, env).await
                    } else {
                        Ok(Flow::Normal)
                    }
                }
                Stmt::Throw(expr) => Err(RuntimeError::Thrown(self.value(expr, env).await?)),
                Stmt::Block(stmts) => self.block(stmts, env).await,
            }
        }
        .boxed()
    }

    async fn value(&self, expr: &Expr, env: &mut Env) -> Result<Value> {
        self.eval(expr, env).await?.into_value()
    }

    async fn values(&self, exprs: &[Expr], env: &mut Env) -> Result<Vec<Value>> {
        let mut out = Vec::with_capacity(exprs.len());
        for expr in exprs {
            out.push(self.value(expr, env).await?);
        }
        Ok(out)
    }

    fn eval<'a>(&'a self, expr: &'a Expr, env: &'a mut Env) -> BoxFuture<'a, Result<Slot>> {
        async move {
            match expr {
                Expr::Lit(v) => Ok(Slot::Data(v.clone())),
                Expr::Ident(name) => env.lookup(name).ok_or_else(|| RuntimeError::Reference(name.clone())),
                Expr::Array(items) => Ok(Slot::Data(Value::List(self.values(items, env).await?))),
                Expr::Object(props) => {
                    let mut entries = Vec::with_capacity(props.len());
                    for (key, expr) in props {
                        entries.push((key.clone(), self.value(expr, env).await?));
                    }
                    Ok(Slot::Data(Value::map(entries)))
                }
                Expr::Unary(UnOp::TypeOf, operand) => {
                    let name = match self.eval(operand, env).await {
                        Ok(slot) => type_of(&slot),
                        // `typeof` of an undeclared name is not an error.
                        Err(RuntimeError::Reference(_)) if matches!(**operand, Expr::Ident(_)) => "undefined",
                        Err(e) => return Err(e),
                    };
                    Ok(Slot::Data(Value::from(name)))
                }
                Expr::Unary(op, operand) => {
                    let v = self.value(operand, env).await?;
                    Ok(Slot::Data(unary(*op, &v)))
                }
                Expr::Binary(op, lhs, rhs) => {
                    let a = self.value(lhs, env).await?;
                    let b = self.value(rhs, env).await?;
                    Ok(Slot::Data(binary(*op, &a, &b)))
                }
                Expr::Logical(op, lhs, rhs) => {
                    let a = self.eval(lhs, env).await?;
                    let a_truthy = match &a {
                        Slot::Data(v) => truthy(v),
                        _ => true,
                    };
                    match (op, a_truthy) {
                        (LogicOp::And, true) | (LogicOp::Or, false) => self.eval(rhs, env).await,
                        _ => Ok(a),
                    }
                }
                Expr::Cond(cond, then, otherwise) => {
                    if truthy(&self.value(cond, env).await?) {
                        self.eval(then, env).await
                    } else {
                        self.eval(otherwise, env).await
                    }
                }
                Expr::Assign(name, expr) => {
                    let slot = self.eval(expr, env).await?;
                    env.assign(name, slot.clone())?;
                    Ok(slot)
                }
                Expr::Member(object, key) => {
                    let object = self.eval(object, env).await?;
                    let key = self.value(key, env).await?;
                    match object {
                        Slot::Data(v) => Ok(Slot::Data(member(&v, &key)?)),
                        _ => Err(RuntimeError::Type(format!("{} can only be called", key))),
                    }
                }
                Expr::Call(callee, args) => self.call(callee, args, env).await.map(Slot::Data),
                Expr::NewError(name, args) => {
                    let message = match args.first() {
                        Some(arg) => self.value(arg, env).await?.to_string(),
                        None => String::new(),
                    };
                    Ok(Slot::Data(Value::map([
                        ("name", Value::String(name.clone())),
                        ("message", Value::String(message)),
                    ])))
                }
                // Every call already completes before it yields a value.
                Expr::Await(operand) => self.eval(operand, env).await,
            }
        }
        .boxed()
    }

    async fn call(&self, callee: &Expr, args: &[Expr], env: &mut Env) -> Result<Value> {
        let Expr::Member(target, key) = callee else {
            return Err(RuntimeError::Type(match callee {
                Expr::Ident(name) => format!("{} is not a function", name),
                _ => "expression is not a function".into(),
            }));
        };

        let target = self.eval(target, env).await?;
        let key = self.value(key, env).await?;
        let method = key.to_string();
        let args = self.values(args, env).await?;

        match target {
            Slot::Host => self.host_call(&method, args).await,
            Slot::Math => math(&method, &args),
            Slot::Data(v) => Err(RuntimeError::Type(format!("{}.{} is not a function", v.type_name(), method))),
        }
    }

    async fn host_call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        let mut args = args.into_iter();
        let name = match args.next() {
            Some(Value::String(name)) => name,
            _ => return Err(RuntimeError::Type(format!("registry.{} expects a method name", method))),
        };
        let arg = args.next().unwrap_or_default();

        match method {
            "dispatch" => self.host.dispatch(&name, arg).await.map_err(RuntimeError::Host),
            "register" => {
                self.host.register(&name, arg).await.map_err(RuntimeError::Host)?;
                Ok(Value::Unit)
            }
            "unregister" => {
                self.host.unregister(&name).await;
                Ok(Value::Unit)
            }
            other => Err(RuntimeError::Type(format!("registry.{} is not a function", other))),
        }
    }
}

// ============================================================================
//  Operators
// ============================================================================

pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Unit => false,
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Float(f) => *f != 0.0 && !f.is_nan(),
        Value::String(s) => !s.is_empty(),
        Value::List(_) | Value::Map(_) => true,
    }
}

fn to_number(v: &Value) -> f64 {
    match v {
        Value::Unit => f64::NAN,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Int(i) => *i as f64,
        Value::Float(f) => *f,
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                0.0
            } else {
                s.parse().unwrap_or(f64::NAN)
            }
        }
        Value::List(items) if items.is_empty() => 0.0,
        Value::List(_) | Value::Map(_) => f64::NAN,
    }
}

fn type_of(slot: &Slot) -> &'static str {
    match slot {
        Slot::Data(Value::Unit) => "undefined",
        Slot::Data(Value::Bool(_)) => "boolean",
        Slot::Data(Value::Int(_) | Value::Float(_)) => "number",
        Slot::Data(Value::String(_)) => "string",
        Slot::Data(Value::List(_) | Value::Map(_)) | Slot::Host | Slot::Math => "object",
    }
}

fn unary(op: UnOp, v: &Value) -> Value {
    match (op, v) {
        (UnOp::Not, v) => Value::Bool(!truthy(v)),
        (UnOp::Neg, Value::Int(i)) => i.checked_neg().map(Value::Int).unwrap_or_else(|| number(-(*i as f64))),
        (UnOp::Neg, v) => number(-to_number(v)),
        (UnOp::Plus, Value::Int(i)) => Value::Int(*i),
        (UnOp::Plus, v) => number(to_number(v)),
        (UnOp::TypeOf, v) => Value::from(type_of(&Slot::Data(v.clone()))),
    }
}

fn is_textual(v: &Value) -> bool {
    matches!(v, Value::String(_) | Value::List(_) | Value::Map(_))
}

fn binary(op: BinOp, a: &Value, b: &Value) -> Value {
    use Value::Int;

    let (x, y) = (to_number(a), to_number(b));
    match op {
        BinOp::Add => match (a, b) {
            (Int(i), Int(j)) => i.checked_add(*j).map(Int).unwrap_or_else(|| number(x + y)),
            _ if is_textual(a) || is_textual(b) => Value::String(format!("{}{}", a, b)),
            _ => number(x + y),
        },
        BinOp::Sub => match (a, b) {
            (Int(i), Int(j)) => i.checked_sub(*j).map(Int).unwrap_or_else(|| number(x - y)),
            _ => number(x - y),
        },
        BinOp::Mul => match (a, b) {
            (Int(i), Int(j)) => i.checked_mul(*j).map(Int).unwrap_or_else(|| number(x * y)),
            _ => number(x * y),
        },
        BinOp::Div => match (a, b) {
            (Int(i), Int(j)) if *j != 0 && i.checked_rem(*j) == Some(0) => {
                i.checked_div(*j).map(Int).unwrap_or_else(|| number(x / y))
            }
            _ => number(x / y),
        },
        BinOp::Rem => match (a, b) {
            (Int(i), Int(j)) if *j != 0 => i.checked_rem(*j).map(Int).unwrap_or_else(|| number(x % y)),
            _ => number(x % y),
        },
        BinOp::Eq => Value::Bool(strict_equals(a, b)),
        BinOp::Ne => Value::Bool(!strict_equals(a, b)),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ordering = match (a, b) {
                (Value::String(s), Value::String(t)) => Some(s.cmp(t)),
                _ => x.partial_cmp(&y),
            };
            let Some(ordering) = ordering else {
                return Value::Bool(false);
            };
            Value::Bool(match op {
                BinOp::Lt => ordering.is_lt(),
                BinOp::Le => ordering.is_le(),
                BinOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
    }
}

fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(i), Value::Int(j)) => i == j,
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => to_number(a) == to_number(b),
        _ => a == b,
    }
}

fn member(object: &Value, key: &Value) -> Result<Value> {
    let index = |items: usize| key.as_int().and_then(|i| usize::try_from(i).ok()).filter(|i| *i < items);

    Ok(match object {
        Value::Unit => {
            return Err(RuntimeError::Type(format!("Cannot read properties of undefined (reading '{}')", key)));
        }
        Value::List(items) if key.as_str() == Some("length") => Value::Int(items.len() as i64),
        Value::List(items) => index(items.len()).map(|i| items[i].clone()).unwrap_or_default(),
        Value::String(s) if key.as_str() == Some("length") => Value::Int(s.chars().count() as i64),
        Value::String(s) => index(s.chars().count())
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::String(c.to_string()))
            .unwrap_or_default(),
        Value::Map(entries) => entries.get(&key.to_string()).cloned().unwrap_or_default(),
        _ => Value::Unit,
    })
}

fn math(name: &str, args: &[Value]) -> Result<Value> {
    let arg = |i: usize| args.get(i).map(to_number).unwrap_or(f64::NAN);

    let v = match name {
        "abs" => arg(0).abs(),
        "floor" => arg(0).floor(),
        "ceil" => arg(0).ceil(),
        "round" => (arg(0) + 0.5).floor(),
        "trunc" => arg(0).trunc(),
        "sqrt" => arg(0).sqrt(),
        "pow" => arg(0).powf(arg(1)),
        "min" => args.iter().map(to_number).fold(f64::INFINITY, |m, v| if v.is_nan() || m.is_nan() { f64::NAN } else { m.min(v) }),
        "max" => args.iter().map(to_number).fold(f64::NEG_INFINITY, |m, v| if v.is_nan() || m.is_nan() { f64::NAN } else { m.max(v) }),
        other => return Err(RuntimeError::Type(format!("Math.{} is not a function", other))),
    };
    Ok(number(v))
}
