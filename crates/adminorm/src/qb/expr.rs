//! Condition expressions for WHERE/HAVING clauses.
//!
//! Conditions are kept as an ordered list of `(joiner, expr)` pairs rather
//! than a normalized tree: each predicate call declares how it attaches to
//! the conditions before it, and explicit groups are parenthesized. A flat
//! list such as `a AND b OR c` is rendered as written and evaluated with SQL
//! precedence.

use crate::error::OrmResult;
use crate::ident::Ident;
use crate::qb::param::ParamList;
use crate::value::Value;

/// How a condition attaches to the ones before it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Joiner {
    And,
    Or,
}

impl Joiner {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// Comparison operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }
}

/// Expression node.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// `column op $n`; a null value renders `IS [NOT] NULL` for `=`/`<>`.
    Compare {
        column: Ident,
        op: CmpOp,
        value: Value,
    },
    /// Case-insensitive substring match: `column::text ILIKE '%kw%'`.
    Contains { column: Ident, keyword: String },
    /// Parenthesized group joined internally by `joiner`.
    Group { joiner: Joiner, items: Vec<Expr> },
    /// Caller-supplied SQL fragment, parenthesized.
    Raw(String),
}

impl Expr {
    pub fn compare(column: &str, op: CmpOp, value: impl Into<Value>) -> OrmResult<Self> {
        Ok(Expr::Compare {
            column: Ident::parse(column)?,
            op,
            value: value.into(),
        })
    }

    pub fn contains(column: &str, keyword: impl Into<String>) -> OrmResult<Self> {
        Ok(Expr::Contains {
            column: Ident::parse(column)?,
            keyword: keyword.into(),
        })
    }

    pub fn group(joiner: Joiner, items: Vec<Expr>) -> Self {
        Expr::Group { joiner, items }
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Expr::Raw(sql.into())
    }

    /// Check if this expression renders to nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            Expr::Group { items, .. } => items.iter().all(Expr::is_empty),
            Expr::Raw(sql) => sql.trim().is_empty(),
            _ => false,
        }
    }

    /// Build the SQL fragment, numbering placeholders from `params`.
    pub fn build(&self, params: &mut ParamList) -> String {
        match self {
            Expr::Compare { column, op, value } => {
                let column = column.to_sql();
                match (value, op) {
                    (Value::Null, CmpOp::Eq) => format!("{column} IS NULL"),
                    (Value::Null, CmpOp::Ne) => format!("{column} IS NOT NULL"),
                    (Value::Null, op) => format!("{column} {} NULL", op.as_sql()),
                    (value, op) => {
                        let idx = params.push(value.clone());
                        format!("{column} {} ${idx}", op.as_sql())
                    }
                }
            }
            Expr::Contains { column, keyword } => {
                let idx = params.push(Value::Text(format!("%{}%", escape_like(keyword))));
                format!("{}::text ILIKE ${idx}", column.to_sql())
            }
            Expr::Group { joiner, items } => {
                let parts: Vec<String> = items
                    .iter()
                    .filter(|e| !e.is_empty())
                    .map(|e| e.build(params))
                    .collect();
                if parts.is_empty() {
                    String::new()
                } else {
                    format!("({})", parts.join(&format!(" {} ", joiner.as_sql())))
                }
            }
            Expr::Raw(sql) => format!("({})", sql.trim()),
        }
    }
}

/// Escape `%`, `_` and `\` so a keyword matches literally inside ILIKE.
pub(crate) fn escape_like(keyword: &str) -> String {
    let mut out = String::with_capacity(keyword.len());
    for ch in keyword.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Ordered condition list; the first joiner is dropped when rendering.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClauseList {
    clauses: Vec<(Joiner, Expr)>,
}

impl ClauseList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    /// Append a condition. Empty expressions are ignored.
    pub fn push(&mut self, joiner: Joiner, expr: Expr) {
        if !expr.is_empty() {
            self.clauses.push((joiner, expr));
        }
    }

    pub fn build(&self, params: &mut ParamList) -> String {
        let mut sql = String::new();
        for (i, (joiner, expr)) in self.clauses.iter().enumerate() {
            if i > 0 {
                sql.push(' ');
                sql.push_str(joiner.as_sql());
                sql.push(' ');
            }
            sql.push_str(&expr.build(params));
        }
        sql
    }
}
