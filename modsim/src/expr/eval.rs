//! Pure tree-walking evaluator (spec.md §4.3).

use super::ast::{BinOp, Expr, Func, UnOp};

/// The name -> value environment an expression is evaluated against:
/// current register `scaled` values plus the globals table
/// (`variable_name -> scaled`), composed by the update loop each tick
/// (spec.md §4.5).
pub trait Environment {
    fn lookup(&self, name: &str) -> Option<f64>;
}

/// Evaluate `expr` against `env`. Division by zero and out-of-domain
/// math calls propagate `inf`/`NaN` per IEEE-754 (spec.md §4.3); the
/// caller (the update loop) is responsible for rejecting a non-finite
/// result and retaining the register's prior value. An identifier that
/// fails to resolve evaluates to `NaN` — this should never happen for
/// a validated schema (invariant 3 guarantees reference closure), but
/// a defensive `NaN` here is safer than a panic.
pub fn eval(expr: &Expr, env: &dyn Environment) -> f64 {
    match expr {
        Expr::Number(n) => *n,
        Expr::Ident(name) => env.lookup(name).unwrap_or(f64::NAN),
        Expr::Unary(UnOp::Neg, inner) => -eval(inner, env),
        Expr::Binary(op, lhs, rhs) => {
            let l = eval(lhs, env);
            let r = eval(rhs, env);
            match op {
                BinOp::Add => l + r,
                BinOp::Sub => l - r,
                BinOp::Mul => l * r,
                BinOp::Div => l / r,
            }
        }
        Expr::Call(func, args) => {
            let vals: Vec<f64> = args.iter().map(|a| eval(a, env)).collect();
            call(*func, &vals)
        }
    }
}

fn call(func: Func, args: &[f64]) -> f64 {
    match func {
        Func::Min => args[0].min(args[1]),
        Func::Max => args[0].max(args[1]),
        Func::Sin => args[0].sin(),
        Func::Cos => args[0].cos(),
        Func::Tan => args[0].tan(),
        Func::Asin => args[0].asin(),
        Func::Acos => args[0].acos(),
        Func::Atan => args[0].atan(),
        Func::Atan2 => args[0].atan2(args[1]),
        Func::Sqrt => args[0].sqrt(),
        Func::Exp => args[0].exp(),
        Func::Log => args[0].ln(),
        Func::Log10 => args[0].log10(),
        Func::Pow => args[0].powf(args[1]),
        Func::Floor => args[0].floor(),
        Func::Ceil => args[0].ceil(),
        Func::Abs => args[0].abs(),
    }
}
