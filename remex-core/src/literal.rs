//! Literal values and their canonical wire-text form
//!
//! Literals are the raw leaf arguments of an expression: numbers, strings,
//! booleans, homogeneous lists, identifiers and row ranges. They are
//! serialized directly into the expression text, never pinned remotely.

use crate::error::{Error, Result};

/// A raw literal argument of an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Integer value, written bare
    Int(i64),

    /// Floating point value; NaN is written as the `NaN` sentinel
    Num(f64),

    /// Boolean value, written as `TRUE` / `FALSE`
    Bool(bool),

    /// String value, written double-quoted with backslash escaping
    Str(String),

    /// Homogeneous list: all-numeric or all-string, written bracketed
    List(Vec<Literal>),

    /// A bare identifier: a previously assigned remote temporary or a
    /// user-chosen remote name
    Ident(String),

    /// A row range, written as `[start:length]`; an unmeasured length is
    /// written as the `NaN` sentinel
    Range {
        /// First row of the range
        start: u64,
        /// Number of rows, if known
        len: Option<u64>,
    },

    /// An absent argument, written as the empty-list marker `[]`
    Absent,
}

impl Literal {
    /// Append the canonical wire text of this literal to `out`.
    ///
    /// Fails with [`Error::Serialization`] for heterogeneous lists or lists
    /// of anything other than numbers and strings.
    pub fn write_expr(&self, out: &mut String) -> Result<()> {
        match self {
            Literal::Int(v) => out.push_str(&v.to_string()),
            Literal::Num(v) => write_num(*v, out)?,
            Literal::Bool(v) => out.push_str(if *v { "TRUE" } else { "FALSE" }),
            Literal::Str(v) => write_quoted(v, out),
            Literal::Ident(name) => out.push_str(name),
            Literal::Absent => out.push_str("[]"),
            Literal::Range { start, len } => {
                out.push('[');
                out.push_str(&start.to_string());
                out.push(':');
                match len {
                    Some(len) => out.push_str(&len.to_string()),
                    None => out.push_str("NaN"),
                }
                out.push(']');
            }
            Literal::List(items) => write_list(items, out)?,
        }
        Ok(())
    }

    /// The canonical wire text of this literal as an owned string.
    pub fn to_expr_text(&self) -> Result<String> {
        let mut out = String::new();
        self.write_expr(&mut out)?;
        Ok(out)
    }

    fn is_numeric(&self) -> bool {
        matches!(self, Literal::Int(_) | Literal::Num(_))
    }
}

// The wire grammar has a NaN sentinel but no form for infinities.
fn write_num(v: f64, out: &mut String) -> Result<()> {
    if v.is_nan() {
        out.push_str("NaN");
    } else if v.is_infinite() {
        return Err(Error::Serialization(
            "infinite values have no wire form".into(),
        ));
    } else {
        out.push_str(&v.to_string());
    }
    Ok(())
}

fn write_quoted(v: &str, out: &mut String) {
    out.push('"');
    for c in v.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

// Lists must be homogeneous: all-numeric or all-string. Anything else is a
// caller bug surfaced as a serialization error.
fn write_list(items: &[Literal], out: &mut String) -> Result<()> {
    let ok = items.iter().all(Literal::is_numeric)
        || items.iter().all(|item| matches!(item, Literal::Str(_)));
    if !ok {
        return Err(Error::Serialization(
            "lists must be homogeneous (all-numeric or all-string)".into(),
        ));
    }

    out.push('[');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        item.write_expr(out)?;
    }
    out.push(']');
    Ok(())
}

impl From<i64> for Literal {
    fn from(v: i64) -> Self {
        Literal::Int(v)
    }
}

impl From<f64> for Literal {
    fn from(v: f64) -> Self {
        Literal::Num(v)
    }
}

impl From<bool> for Literal {
    fn from(v: bool) -> Self {
        Literal::Bool(v)
    }
}

impl From<&str> for Literal {
    fn from(v: &str) -> Self {
        Literal::Str(v.to_string())
    }
}

impl From<String> for Literal {
    fn from(v: String) -> Self {
        Literal::Str(v)
    }
}

impl From<Vec<f64>> for Literal {
    fn from(v: Vec<f64>) -> Self {
        Literal::List(v.into_iter().map(Literal::Num).collect())
    }
}

impl From<Vec<String>> for Literal {
    fn from(v: Vec<String>) -> Self {
        Literal::List(v.into_iter().map(Literal::Str).collect())
    }
}
