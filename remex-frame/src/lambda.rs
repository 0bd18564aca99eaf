//! Translation of restricted column functions into DAG nodes
//!
//! User-supplied row/column functions are pushed down to the remote service
//! instead of being executed locally per row. Only a fixed whitelist of
//! expression forms is supported; anything else fails with a descriptive
//! translation error. Refusing is intentional: the translator must never
//! guess at semantics it cannot express remotely.

use remex_core::error::{Error, Result};
use remex_core::{Child, Literal, Node};

/// Binary arithmetic and logical operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `^`
    Pow,
    /// `mod`
    Mod,
    /// `&`
    And,
    /// `|`
    Or,
}

impl BinaryOp {
    fn tag(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
            BinaryOp::Mod => "mod",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `==`
    Eq,
    /// `!=`
    Ne,
}

impl CompareOp {
    fn tag(self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Logical negation
    Not,
    /// Arithmetic negation, translated as `0 - x`
    Neg,
}

/// One expression form of the restricted column-function grammar.
///
/// The grammar deliberately includes forms that are representable but
/// unsupported (chained comparisons, star-args calls) so the translator
/// can reject them by name instead of silently mistranslating.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnExpr {
    /// Integer literal
    Int(i64),
    /// Numeric literal
    Num(f64),
    /// Boolean literal
    Bool(bool),
    /// String literal
    Str(String),
    /// List literal; items must themselves be literals
    List(Vec<ColumnExpr>),
    /// Reference to a function parameter
    Ident(String),
    /// Unary operation
    Unary(UnaryOp, Box<ColumnExpr>),
    /// Binary arithmetic/logical operation
    Binary(BinaryOp, Box<ColumnExpr>, Box<ColumnExpr>),
    /// Single comparison
    Compare(CompareOp, Box<ColumnExpr>, Box<ColumnExpr>),
    /// Chained comparison such as `a < b < c`; always rejected
    CompareChain {
        /// Leftmost operand
        first: Box<ColumnExpr>,
        /// Subsequent operator/operand pairs
        rest: Vec<(CompareOp, ColumnExpr)>,
    },
    /// Call of a whitelisted named function
    Call {
        /// Function name
        name: String,
        /// Positional arguments
        args: Vec<ColumnExpr>,
        /// True for star-args call forms; always rejected
        star_args: bool,
    },
    /// Method call against the tabular value; missing trailing arguments
    /// are filled from the method's declared defaults at translation time
    Method {
        /// Receiver expression
        target: Box<ColumnExpr>,
        /// Method name
        name: String,
        /// Explicit positional arguments
        args: Vec<ColumnExpr>,
    },
    /// Subscript access
    Index {
        /// Receiver expression
        target: Box<ColumnExpr>,
        /// Index expression
        index: Box<ColumnExpr>,
    },
}

impl ColumnExpr {
    /// Parameter reference.
    pub fn ident(name: &str) -> Self {
        ColumnExpr::Ident(name.to_string())
    }

    /// Binary operation.
    pub fn binary(op: BinaryOp, lhs: ColumnExpr, rhs: ColumnExpr) -> Self {
        ColumnExpr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    /// Comparison.
    pub fn compare(op: CompareOp, lhs: ColumnExpr, rhs: ColumnExpr) -> Self {
        ColumnExpr::Compare(op, Box::new(lhs), Box::new(rhs))
    }

    /// Method call.
    pub fn method(target: ColumnExpr, name: &str, args: Vec<ColumnExpr>) -> Self {
        ColumnExpr::Method {
            target: Box::new(target),
            name: name.to_string(),
            args,
        }
    }
}

/// A single-body-expression lambda over named parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnFn {
    /// Parameter names, bound to columns/rows by the applying operation
    pub params: Vec<String>,

    /// The body expression
    pub body: ColumnExpr,
}

impl ColumnFn {
    /// Build a column function.
    pub fn new(params: &[&str], body: ColumnExpr) -> Self {
        Self {
            params: params.iter().map(|p| p.to_string()).collect(),
            body,
        }
    }
}

/// Named functions the remote service understands as unary/n-ary operators.
const FUNCTIONS: &[&str] = &[
    "abs", "sqrt", "exp", "log", "floor", "ceil", "trunc", "sign", "cos", "sin", "tan", "not",
    "is_na",
];

/// Declared default values for the trailing parameters of frame methods,
/// resolved statically at translation time.
fn method_defaults(name: &str) -> Option<Vec<Literal>> {
    match name {
        // na_rm
        "mean" | "sum" | "min" | "max" | "sd" => Some(vec![Literal::Bool(false)]),
        // y, na_rm, use
        "var" => Some(vec![
            Literal::Absent,
            Literal::Bool(false),
            Literal::Str("everything".into()),
        ]),
        // probs, na_rm
        "quantile" => Some(vec![
            Literal::List(vec![
                Literal::Num(0.25),
                Literal::Num(0.5),
                Literal::Num(0.75),
            ]),
            Literal::Bool(false),
        ]),
        _ => None,
    }
}

/// Translate a column function into a `(fun [params] body)` node.
pub fn translate(f: &ColumnFn) -> Result<Node> {
    for (i, param) in f.params.iter().enumerate() {
        if f.params[..i].contains(param) {
            return Err(Error::Translation(format!("duplicate parameter `{param}`")));
        }
    }
    let params = Literal::List(f.params.iter().map(|p| Literal::Str(p.clone())).collect());
    let body = translate_expr(&f.body, &f.params)?;
    Ok(Node::call("fun", vec![params.into(), body]))
}

fn translate_expr(expr: &ColumnExpr, params: &[String]) -> Result<Child> {
    match expr {
        ColumnExpr::Int(v) => Ok(Literal::Int(*v).into()),
        ColumnExpr::Num(v) => Ok(Literal::Num(*v).into()),
        ColumnExpr::Bool(v) => Ok(Literal::Bool(*v).into()),
        ColumnExpr::Str(v) => Ok(Literal::Str(v.clone()).into()),

        ColumnExpr::List(items) => {
            let items = items
                .iter()
                .map(|item| match translate_expr(item, params)? {
                    Child::Literal(lit) => Ok(lit),
                    Child::Node(_) => Err(Error::Translation(
                        "list items in column functions must be literals".into(),
                    )),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Literal::List(items).into())
        }

        ColumnExpr::Ident(name) => {
            if !params.contains(name) {
                return Err(Error::Translation(format!("unbound identifier `{name}`")));
            }
            Ok(Literal::Ident(name.clone()).into())
        }

        ColumnExpr::Unary(op, operand) => {
            let operand = translate_expr(operand, params)?;
            let node = match op {
                UnaryOp::Not => Node::call("not", vec![operand]),
                UnaryOp::Neg => Node::call("-", vec![Literal::Int(0).into(), operand]),
            };
            Ok(node.into())
        }

        ColumnExpr::Binary(op, lhs, rhs) => {
            let lhs = translate_expr(lhs, params)?;
            let rhs = translate_expr(rhs, params)?;
            Ok(Node::call(op.tag(), vec![lhs, rhs]).into())
        }

        ColumnExpr::Compare(op, lhs, rhs) => {
            let lhs = translate_expr(lhs, params)?;
            let rhs = translate_expr(rhs, params)?;
            Ok(Node::call(op.tag(), vec![lhs, rhs]).into())
        }

        ColumnExpr::CompareChain { .. } => Err(Error::Translation(
            "chained comparisons are not supported".into(),
        )),

        ColumnExpr::Call {
            name,
            args,
            star_args,
        } => {
            if *star_args {
                return Err(Error::Translation(
                    "star-args call forms are not supported".into(),
                ));
            }
            if !FUNCTIONS.contains(&name.as_str()) {
                return Err(Error::Translation(format!("unknown function `{name}`")));
            }
            let args = args
                .iter()
                .map(|arg| translate_expr(arg, params))
                .collect::<Result<Vec<_>>>()?;
            Ok(Node::call(name.as_str(), args).into())
        }

        ColumnExpr::Method { target, name, args } => {
            let Some(defaults) = method_defaults(name) else {
                return Err(Error::Translation(format!("unknown method `{name}`")));
            };
            if args.len() > defaults.len() {
                return Err(Error::Translation(format!(
                    "too many arguments for `{name}`: at most {}, got {}",
                    defaults.len(),
                    args.len()
                )));
            }
            let mut children = vec![translate_expr(target, params)?];
            for arg in args {
                children.push(translate_expr(arg, params)?);
            }
            for default in defaults.into_iter().skip(args.len()) {
                children.push(default.into());
            }
            Ok(Node::call(name.as_str(), children).into())
        }

        ColumnExpr::Index { target, index } => {
            let target = translate_expr(target, params)?;
            let index = translate_expr(index, params)?;
            Ok(Node::call("[", vec![target, index]).into())
        }
    }
}
