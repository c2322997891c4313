//! The parse tree for the restricted expression grammar of spec.md
//! §4.3. Built once at simulation start and reused every tick.

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Ident(String),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// The fixed function-call whitelist (spec.md §4.3). No identifier
/// outside this set, and no attribute/index access, is ever parsed
/// into a `Call`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Min,
    Max,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Sqrt,
    Exp,
    Log,
    Log10,
    Pow,
    Floor,
    Ceil,
    Abs,
}

impl Func {
    /// `Some(name)` if `name` is a whitelisted function, else `None`.
    pub fn from_name(name: &str) -> Option<Func> {
        Some(match name {
            "min" => Func::Min,
            "max" => Func::Max,
            "sin" => Func::Sin,
            "cos" => Func::Cos,
            "tan" => Func::Tan,
            "asin" => Func::Asin,
            "acos" => Func::Acos,
            "atan" => Func::Atan,
            "atan2" => Func::Atan2,
            "sqrt" => Func::Sqrt,
            "exp" => Func::Exp,
            "log" => Func::Log,
            "log10" => Func::Log10,
            "pow" => Func::Pow,
            "floor" => Func::Floor,
            "ceil" => Func::Ceil,
            "abs" => Func::Abs,
            _ => return None,
        })
    }

    /// Human-readable arity description, used in `ExprError::ArityMismatch`.
    pub fn arity_description(self) -> &'static str {
        match self {
            Func::Min | Func::Max | Func::Atan2 | Func::Pow => "2",
            _ => "1",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Func::Min | Func::Max | Func::Atan2 | Func::Pow => 2,
            _ => 1,
        }
    }
}
