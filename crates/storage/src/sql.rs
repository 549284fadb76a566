//! SQL evaluation for the in-memory backend
//!
//! Statements are parsed by `sqlparser` with the BigQuery dialect, which
//! reads `@name` as a placeholder and understands `IN UNNEST(@list)`. This
//! module only evaluates the parsed tree against stored rows:
//!
//! ```text
//! SELECT * | expr [AS name], ...  FROM table [alias]
//!   [WHERE cond]
//!   [ORDER BY expr [ASC|DESC], ...]
//!   [LIMIT n | @p] [OFFSET n | @p]
//!
//! cond := cond AND cond | cond OR cond | NOT cond | ( cond )
//!       | expr op expr | expr IS [NOT] NULL
//!       | expr [NOT] IN (expr, ...) | expr [NOT] IN UNNEST(@p)
//!       | [NOT] EXISTS (SELECT ... FROM table [alias] WHERE cond)
//! op   := = | != | <> | < | <= | > | >=
//! ```
//!
//! Conditions use three-valued logic and a row is kept only when its filter
//! is TRUE. Column names resolve against the innermost FROM that has them,
//! so `EXISTS` subqueries may refer to outer aliases. A TIMESTAMP compared
//! with a STRING parses the string as RFC 3339 first. Missing columns read
//! as NULL.

use keystone_core::{Error, Result, Row, Value};
use sqlparser::ast::{
    self, BinaryOperator, Expr, GroupByExpr, Query, SelectItem, SetExpr, Statement as SqlStatement,
    TableFactor, UnaryOperator,
};
use sqlparser::dialect::BigQueryDialect;
use sqlparser::parser::Parser;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Source of table rows for a query
pub(crate) trait Catalog {
    /// Rows of `table` in primary key order
    fn scan(&self, table: &str) -> Result<Vec<&Row>>;
}

#[derive(Debug, Clone)]
enum Projection {
    All,
    Column { name: String, expr: Expr },
}

/// A single-table SELECT ready for evaluation
#[derive(Debug, Clone)]
pub(crate) struct Select {
    pub(crate) table: String,
    alias: Option<String>,
    projection: Vec<Projection>,
    filter: Option<Expr>,
    order_by: Vec<(Expr, bool)>,
    limit: Option<Expr>,
    offset: Option<Expr>,
}

fn unsupported(what: impl std::fmt::Display) -> Error {
    Error::internal(format!("unsupported sql: {}", what))
}

/// Parse a statement into a [`Select`]
pub(crate) fn parse(sql: &str) -> Result<Select> {
    let mut statements = Parser::parse_sql(&BigQueryDialect {}, sql)
        .map_err(|e| Error::query(format!("sql syntax error in `{}`", sql), e))?;
    if statements.len() != 1 {
        return Err(unsupported(format!(
            "expected one statement, found {}",
            statements.len()
        )));
    }
    match statements.remove(0) {
        SqlStatement::Query(query) => Select::from_query(&query),
        other => Err(unsupported(other)),
    }
}

fn column_name(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(ident) => ident.value.clone(),
        Expr::CompoundIdentifier(parts) => parts
            .last()
            .map_or_else(|| expr.to_string(), |ident| ident.value.clone()),
        other => other.to_string(),
    }
}

impl Select {
    fn from_query(query: &Query) -> Result<Self> {
        if query.with.is_some() || query.fetch.is_some() || !query.limit_by.is_empty() {
            return Err(unsupported(query));
        }
        let SetExpr::Select(select) = query.body.as_ref() else {
            return Err(unsupported(&query.body));
        };
        let grouped =
            !matches!(&select.group_by, GroupByExpr::Expressions(exprs, _) if exprs.is_empty());
        if select.distinct.is_some() || select.having.is_some() || grouped {
            return Err(unsupported(select));
        }
        let [from] = select.from.as_slice() else {
            return Err(unsupported("exactly one table is required in FROM"));
        };
        if !from.joins.is_empty() {
            return Err(unsupported("joins"));
        }
        let (table, alias) = match &from.relation {
            TableFactor::Table { name, alias, .. } => {
                let table = name
                    .0
                    .last()
                    .map(|ident| ident.value.clone())
                    .ok_or_else(|| unsupported("empty table name"))?;
                (table, alias.as_ref().map(|a| a.name.value.clone()))
            }
            other => return Err(unsupported(other)),
        };

        let mut projection = Vec::with_capacity(select.projection.len());
        for item in &select.projection {
            projection.push(match item {
                SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(..) => Projection::All,
                SelectItem::UnnamedExpr(expr) => Projection::Column {
                    name: column_name(expr),
                    expr: expr.clone(),
                },
                SelectItem::ExprWithAlias { expr, alias } => Projection::Column {
                    name: alias.value.clone(),
                    expr: expr.clone(),
                },
            });
        }

        let order_by = query
            .order_by
            .as_ref()
            .map(|order| {
                order
                    .exprs
                    .iter()
                    .map(|o| (o.expr.clone(), o.asc == Some(false)))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Select {
            table,
            alias,
            projection,
            filter: select.selection.clone(),
            order_by,
            limit: query.limit.clone(),
            offset: query.offset.as_ref().map(|o| o.value.clone()),
        })
    }

    fn scope<'s>(&'s self, row: &'s Row) -> Scope<'s> {
        Scope {
            table: &self.table,
            alias: self.alias.as_deref(),
            row,
        }
    }
}

// ============================================================================
// Evaluation
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Scope<'s> {
    table: &'s str,
    alias: Option<&'s str>,
    row: &'s Row,
}

impl Scope<'_> {
    fn answers_to(&self, qualifier: &str) -> bool {
        match self.alias {
            Some(alias) => alias.eq_ignore_ascii_case(qualifier),
            None => self.table.eq_ignore_ascii_case(qualifier),
        }
    }
}

/// SQL ordering between two values; `None` when either side is NULL
pub(crate) fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Timestamp(t), Value::String(_)) => b.as_timestamp().map(|s| t.cmp(&s)),
        (Value::String(_), Value::Timestamp(t)) => a.as_timestamp().map(|s| s.cmp(t)),
        _ => Some(a.total_cmp(b)),
    }
}

fn non_negative(value: &Value, clause: &str) -> Result<usize> {
    match value {
        Value::Int(n) if *n >= 0 => Ok(*n as usize),
        other => Err(Error::internal(format!(
            "{} must be a non-negative integer, got {}",
            clause, other
        ))),
    }
}

fn holds(op: &BinaryOperator, ordering: Ordering) -> Result<bool> {
    Ok(match op {
        BinaryOperator::Eq => ordering == Ordering::Equal,
        BinaryOperator::NotEq => ordering != Ordering::Equal,
        BinaryOperator::Lt => ordering == Ordering::Less,
        BinaryOperator::LtEq => ordering != Ordering::Greater,
        BinaryOperator::Gt => ordering == Ordering::Greater,
        BinaryOperator::GtEq => ordering != Ordering::Less,
        other => return Err(unsupported(format!("operator {}", other))),
    })
}

/// `needle IN items` under three-valued logic
fn membership(needle: &Value, items: &[Value], negated: bool) -> Option<bool> {
    if needle.is_null() {
        return None;
    }
    if items.iter().any(|item| compare(needle, item) == Some(Ordering::Equal)) {
        Some(!negated)
    } else if items.iter().any(Value::is_null) {
        None
    } else {
        Some(negated)
    }
}

struct Eval<'a, C: ?Sized> {
    catalog: &'a C,
    params: &'a BTreeMap<String, Value>,
}

impl<C: Catalog + ?Sized> Eval<'_, C> {
    fn select(&self, select: &Select, outer: &[Scope<'_>]) -> Result<Vec<Row>> {
        let mut scopes = outer.to_vec();
        let mut kept = Vec::new();
        for row in self.catalog.scan(&select.table)? {
            scopes.push(select.scope(row));
            if self.passes(select, &scopes)? {
                let keys = select
                    .order_by
                    .iter()
                    .map(|(expr, _)| self.value(expr, &scopes))
                    .collect::<Result<Vec<_>>>()?;
                kept.push((keys, self.project(select, &scopes)?));
            }
            scopes.pop();
        }

        if !select.order_by.is_empty() {
            kept.sort_by(|(a, _), (b, _)| {
                for ((x, y), (_, desc)) in a.iter().zip(b.iter()).zip(&select.order_by) {
                    let ord = compare(x, y).unwrap_or_else(|| x.total_cmp(y));
                    let ord = if *desc { ord.reverse() } else { ord };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let offset = match &select.offset {
            Some(expr) => non_negative(&self.value(expr, outer)?, "OFFSET")?,
            None => 0,
        };
        let limit = match &select.limit {
            Some(expr) => non_negative(&self.value(expr, outer)?, "LIMIT")?,
            None => usize::MAX,
        };
        Ok(kept
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(_, row)| row)
            .collect())
    }

    fn passes(&self, select: &Select, scopes: &[Scope<'_>]) -> Result<bool> {
        match &select.filter {
            Some(filter) => Ok(self.truth(filter, scopes)? == Some(true)),
            None => Ok(true),
        }
    }

    fn exists(&self, query: &Query, scopes: &[Scope<'_>]) -> Result<bool> {
        let subquery = Select::from_query(query)?;
        let mut inner = scopes.to_vec();
        for row in self.catalog.scan(&subquery.table)? {
            inner.push(subquery.scope(row));
            if self.passes(&subquery, &inner)? {
                return Ok(true);
            }
            inner.pop();
        }
        Ok(false)
    }

    fn project(&self, select: &Select, scopes: &[Scope<'_>]) -> Result<Row> {
        let mut out = Row::new();
        for item in &select.projection {
            match item {
                Projection::All => {
                    if let Some(scope) = scopes.last() {
                        for (column, value) in scope.row.iter() {
                            out.set(column, value.clone());
                        }
                    }
                }
                Projection::Column { name, expr } => {
                    out.set(name.clone(), self.value(expr, scopes)?);
                }
            }
        }
        Ok(out)
    }

    fn column(&self, qualifier: Option<&str>, name: &str, scopes: &[Scope<'_>]) -> Result<Value> {
        let found = match qualifier {
            Some(qualifier) => {
                let scope = scopes
                    .iter()
                    .rev()
                    .find(|s| s.answers_to(qualifier))
                    .ok_or_else(|| Error::internal(format!("unknown table or alias {}", qualifier)))?;
                scope.row.get(name)
            }
            None => scopes.iter().rev().find_map(|s| s.row.get(name)),
        };
        Ok(found.cloned().unwrap_or(Value::Null))
    }

    fn literal(&self, value: &ast::Value) -> Result<Value> {
        match value {
            ast::Value::Number(n, _) => n
                .parse::<i64>()
                .map(Value::Int)
                .or_else(|_| n.parse::<f64>().map(Value::Float))
                .map_err(|e| Error::query(format!("bad numeric literal {}", n), e)),
            ast::Value::SingleQuotedString(s) | ast::Value::DoubleQuotedString(s) => {
                Ok(Value::String(s.clone()))
            }
            ast::Value::Boolean(b) => Ok(Value::Bool(*b)),
            ast::Value::Null => Ok(Value::Null),
            ast::Value::Placeholder(p) => {
                let name = p.strip_prefix('@').unwrap_or(p);
                self.params
                    .get(name)
                    .cloned()
                    .ok_or_else(|| Error::internal(format!("no value bound for @{}", name)))
            }
            other => Err(unsupported(other)),
        }
    }

    fn value(&self, expr: &Expr, scopes: &[Scope<'_>]) -> Result<Value> {
        match expr {
            Expr::Identifier(ident) => self.column(None, &ident.value, scopes),
            Expr::CompoundIdentifier(parts) => match parts.as_slice() {
                [qualifier, column] => self.column(Some(&qualifier.value), &column.value, scopes),
                _ => Err(unsupported(expr)),
            },
            Expr::Value(value) => self.literal(value),
            Expr::Nested(inner) => self.value(inner, scopes),
            Expr::UnaryOp {
                op: UnaryOperator::Plus,
                expr,
            } => self.value(expr, scopes),
            Expr::UnaryOp {
                op: UnaryOperator::Minus,
                expr: inner,
            } => match self.value(inner, scopes)? {
                Value::Int(i) => i
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| Error::internal(format!("integer overflow in {}", expr))),
                Value::Float(f) => Ok(Value::Float(-f)),
                Value::Null => Ok(Value::Null),
                other => Err(Error::internal(format!("cannot negate {}", other))),
            },
            other => Err(unsupported(other)),
        }
    }

    fn truth(&self, expr: &Expr, scopes: &[Scope<'_>]) -> Result<Option<bool>> {
        match expr {
            Expr::BinaryOp {
                left,
                op: BinaryOperator::And,
                right,
            } => {
                let l = self.truth(left, scopes)?;
                if l == Some(false) {
                    return Ok(Some(false));
                }
                Ok(match (l, self.truth(right, scopes)?) {
                    (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                })
            }
            Expr::BinaryOp {
                left,
                op: BinaryOperator::Or,
                right,
            } => {
                let l = self.truth(left, scopes)?;
                if l == Some(true) {
                    return Ok(Some(true));
                }
                Ok(match (l, self.truth(right, scopes)?) {
                    (_, Some(true)) => Some(true),
                    (Some(false), Some(false)) => Some(false),
                    _ => None,
                })
            }
            Expr::BinaryOp { left, op, right } => {
                let a = self.value(left, scopes)?;
                let b = self.value(right, scopes)?;
                compare(&a, &b).map(|ord| holds(op, ord)).transpose()
            }
            Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr,
            } => Ok(self.truth(expr, scopes)?.map(|b| !b)),
            Expr::Nested(inner) => self.truth(inner, scopes),
            Expr::IsNull(inner) => Ok(Some(self.value(inner, scopes)?.is_null())),
            Expr::IsNotNull(inner) => Ok(Some(!self.value(inner, scopes)?.is_null())),
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let needle = self.value(expr, scopes)?;
                let items = list
                    .iter()
                    .map(|item| self.value(item, scopes))
                    .collect::<Result<Vec<_>>>()?;
                Ok(membership(&needle, &items, *negated))
            }
            Expr::InUnnest {
                expr,
                array_expr,
                negated,
            } => {
                let needle = self.value(expr, scopes)?;
                match self.value(array_expr, scopes)? {
                    Value::Array(items) => Ok(membership(&needle, &items, *negated)),
                    Value::Null => Ok(None),
                    other => Err(Error::internal(format!(
                        "UNNEST expects an ARRAY, got {}",
                        other.type_name()
                    ))),
                }
            }
            Expr::Exists { subquery, negated } => {
                Ok(Some(self.exists(subquery, scopes)? != *negated))
            }
            other => match self.value(other, scopes)? {
                Value::Bool(b) => Ok(Some(b)),
                Value::Null => Ok(None),
                v => Err(Error::internal(format!(
                    "{} is a {}, not a condition",
                    other,
                    v.type_name()
                ))),
            },
        }
    }
}

/// Evaluate `select` against the tables in `catalog`
pub(crate) fn execute<C: Catalog + ?Sized>(
    select: &Select,
    catalog: &C,
    params: &BTreeMap<String, Value>,
) -> Result<Vec<Row>> {
    Eval { catalog, params }.select(select, &[])
}
