//! SELECT statement composer.

use crate::catalog::JoinKind;
use crate::error::{OrmError, OrmResult};
use crate::ident::Ident;
use crate::qb::expr::{ClauseList, CmpOp, Expr, Joiner};
use crate::qb::param::ParamList;
use crate::value::Value;

/// Sort direction for ORDER BY.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn parse(s: &str) -> OrmResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ASC" => Ok(Self::Asc),
            "DESC" => Ok(Self::Desc),
            other => Err(OrmError::statement(format!(
                "unknown sort direction '{other}'"
            ))),
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct JoinClause {
    kind: JoinKind,
    table: Ident,
    left: Ident,
    right: Ident,
}

#[derive(Clone, Debug, PartialEq)]
struct HavingClause {
    column: Ident,
    op: CmpOp,
    threshold: i64,
}

/// SELECT composer with ordered WHERE clauses.
#[derive(Debug)]
pub struct SelectQb {
    table: String,
    /// SELECT columns (empty = `*`)
    columns: Vec<Ident>,
    joins: Vec<JoinClause>,
    where_clauses: ClauseList,
    group_by: Vec<Ident>,
    having: Vec<HavingClause>,
    order: Vec<(Ident, Direction)>,
    limit: Option<u64>,
    offset: Option<u64>,
    /// First composition error; surfaced when the statement is built.
    build_error: Option<OrmError>,
}

impl SelectQb {
    pub fn new(table: &str) -> Self {
        let mut qb = Self {
            table: String::new(),
            columns: Vec::new(),
            joins: Vec::new(),
            where_clauses: ClauseList::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            build_error: None,
        };
        match Ident::parse(table) {
            Ok(ident) => qb.table = ident.to_sql(),
            Err(e) => qb.fail(e),
        }
        qb
    }

    fn fail(&mut self, err: OrmError) {
        if self.build_error.is_none() {
            self.build_error = Some(err);
        }
    }

    fn ident(&mut self, name: &str) -> Option<Ident> {
        match Ident::parse(name) {
            Ok(ident) => Some(ident),
            Err(e) => {
                self.fail(e);
                None
            }
        }
    }

    /// Record an error found while composing outside this type.
    pub fn record_error(&mut self, err: OrmError) -> &mut Self {
        self.fail(err);
        self
    }

    /// Restrict the selected columns. An empty list selects `*`.
    pub fn columns<S: AsRef<str>>(&mut self, columns: &[S]) -> &mut Self {
        self.columns.clear();
        for column in columns {
            if let Some(ident) = self.ident(column.as_ref()) {
                self.columns.push(ident);
            }
        }
        self
    }

    /// Append `columns` to a restricted column list unless a column with the
    /// same final name is already selected. Returns the names appended; a
    /// `*` select is left alone.
    pub fn include_columns<S: AsRef<str>>(&mut self, columns: &[S]) -> Vec<String> {
        let mut added = Vec::new();
        if self.columns.is_empty() {
            return added;
        }
        for column in columns {
            let Some(ident) = self.ident(column.as_ref()) else {
                continue;
            };
            let Some(name) = ident.parts.last().cloned() else {
                continue;
            };
            if self.columns.iter().any(|c| c.parts.last() == Some(&name)) {
                continue;
            }
            self.columns.push(ident);
            added.push(name);
        }
        added
    }

    pub fn join(&mut self, kind: JoinKind, table: &str, left: &str, right: &str) -> &mut Self {
        if let (Some(table), Some(left), Some(right)) =
            (self.ident(table), self.ident(left), self.ident(right))
        {
            self.joins.push(JoinClause {
                kind,
                table,
                left,
                right,
            });
        }
        self
    }

    /// Append a condition attached with `joiner`.
    pub fn push_where(&mut self, joiner: Joiner, expr: OrmResult<Expr>) -> &mut Self {
        match expr {
            Ok(expr) => self.where_clauses.push(joiner, expr),
            Err(e) => self.fail(e),
        }
        self
    }

    pub fn has_where(&self) -> bool {
        !self.where_clauses.is_empty()
    }

    pub fn group_by<S: AsRef<str>>(&mut self, columns: &[S]) -> &mut Self {
        for column in columns {
            if let Some(ident) = self.ident(column.as_ref()) {
                self.group_by.push(ident);
            }
        }
        self
    }

    /// `HAVING COUNT(column) op threshold`
    pub fn having_count(&mut self, column: &str, op: CmpOp, threshold: i64) -> &mut Self {
        if let Some(column) = self.ident(column) {
            self.having.push(HavingClause {
                column,
                op,
                threshold,
            });
        }
        self
    }

    pub fn order_by(&mut self, column: &str, direction: Direction) -> &mut Self {
        if let Some(ident) = self.ident(column) {
            self.order.push((ident, direction));
        }
        self
    }

    pub fn limit(&mut self, n: u64) -> &mut Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(&mut self, n: u64) -> &mut Self {
        self.offset = Some(n);
        self
    }

    fn push_from(&self, sql: &mut String, params: &mut ParamList) {
        sql.push_str(" FROM ");
        sql.push_str(&self.table);

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join.kind.as_sql());
            sql.push(' ');
            join.table.write_sql(sql);
            sql.push_str(" ON ");
            join.left.write_sql(sql);
            sql.push_str(" = ");
            join.right.write_sql(sql);
        }

        if !self.where_clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.where_clauses.build(params));
        }

        if !self.group_by.is_empty() {
            let cols: Vec<String> = self.group_by.iter().map(Ident::to_sql).collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&cols.join(", "));
        }

        if !self.having.is_empty() {
            let parts: Vec<String> = self
                .having
                .iter()
                .map(|h| {
                    let idx = params.push(Value::Int(h.threshold));
                    format!("COUNT({}) {} ${idx}", h.column.to_sql(), h.op.as_sql())
                })
                .collect();
            sql.push_str(" HAVING ");
            sql.push_str(&parts.join(" AND "));
        }
    }

    fn check(&self) -> OrmResult<()> {
        match &self.build_error {
            None => Ok(()),
            Some(e) => Err(super::replay(e)),
        }
    }

    /// Build the SELECT statement.
    pub fn build(&self) -> OrmResult<(String, ParamList)> {
        self.check()?;
        let mut params = ParamList::new();

        let mut sql = String::from("SELECT ");
        if self.columns.is_empty() {
            sql.push('*');
        } else {
            let cols: Vec<String> = self.columns.iter().map(Ident::to_sql).collect();
            sql.push_str(&cols.join(", "));
        }
        self.push_from(&mut sql, &mut params);

        if !self.order.is_empty() {
            let parts: Vec<String> = self
                .order
                .iter()
                .map(|(col, dir)| format!("{} {}", col.to_sql(), dir.as_sql()))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&parts.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        Ok((sql, params))
    }

    /// Build a `COUNT(*)` statement over the same rows.
    ///
    /// Grouped statements are wrapped in a subquery so the count is the number
    /// of groups. ORDER BY and LIMIT are not applied.
    pub fn build_count(&self) -> OrmResult<(String, ParamList)> {
        self.check()?;
        let mut params = ParamList::new();

        if self.group_by.is_empty() && self.having.is_empty() {
            let mut sql = String::from("SELECT COUNT(*)");
            self.push_from(&mut sql, &mut params);
            Ok((sql, params))
        } else {
            let mut inner = String::from("SELECT 1");
            self.push_from(&mut inner, &mut params);
            Ok((format!("SELECT COUNT(*) FROM ({inner}) AS t"), params))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_all() {
        let (sql, params) = SelectQb::new("users").build().unwrap();
        assert_eq!(sql, r#"SELECT * FROM "users""#);
        assert!(params.is_empty());
    }

    #[test]
    fn select_with_join_order_and_limit() {
        let mut qb = SelectQb::new("users");
        qb.columns(&["users.IdUser", "groups.NameGroup"])
            .join(
                JoinKind::LeftOuter,
                "groups",
                "users.IdGroup",
                "groups.IdGroup",
            )
            .order_by("NameGroup", Direction::Desc)
            .limit(10)
            .offset(20);
        let (sql, _) = qb.build().unwrap();
        assert_eq!(
            sql,
            r#"SELECT "users"."IdUser", "groups"."NameGroup" FROM "users" LEFT OUTER JOIN "groups" ON "users"."IdGroup" = "groups"."IdGroup" ORDER BY "NameGroup" DESC LIMIT 10 OFFSET 20"#
        );
    }

    #[test]
    fn having_params_follow_where_params() {
        let mut qb = SelectQb::new("group_rights");
        qb.push_where(Joiner::And, Expr::compare("Rights", CmpOp::Eq, "rw"))
            .group_by(&["IdGroup"])
            .having_count("IdMenu", CmpOp::Gt, 2);
        let (sql, params) = qb.build().unwrap();
        assert_eq!(
            sql,
            r#"SELECT * FROM "group_rights" WHERE "Rights" = $1 GROUP BY "IdGroup" HAVING COUNT("IdMenu") > $2"#
        );
        assert_eq!(params.as_slice(), &[Value::from("rw"), Value::Int(2)]);
    }

    #[test]
    fn count_wraps_grouped_statement() {
        let mut qb = SelectQb::new("group_rights");
        qb.group_by(&["IdGroup"]).order_by("IdGroup", Direction::Asc);
        let (sql, _) = qb.build_count().unwrap();
        assert_eq!(
            sql,
            r#"SELECT COUNT(*) FROM (SELECT 1 FROM "group_rights" GROUP BY "IdGroup") AS t"#
        );
    }

    #[test]
    fn count_plain() {
        let mut qb = SelectQb::new("users");
        qb.push_where(Joiner::And, Expr::compare("IdGroup", CmpOp::Eq, 1i64))
            .limit(5);
        let (sql, _) = qb.build_count().unwrap();
        assert_eq!(sql, r#"SELECT COUNT(*) FROM "users" WHERE "IdGroup" = $1"#);
    }

    #[test]
    fn bad_identifier_surfaces_at_build() {
        let mut qb = SelectQb::new("users");
        qb.order_by("1; DROP TABLE users", Direction::Asc);
        assert!(matches!(qb.build(), Err(OrmError::Statement(_))));
    }
}
