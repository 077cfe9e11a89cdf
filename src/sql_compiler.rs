//! Relational backend: compiles the query IR into a `sea-query` SELECT statement.

use std::collections::HashSet;
use std::fmt::Write;
use std::sync::Arc;

use sea_query::{
    Alias, Asterisk, BinOper, Expr, Func, Iden, JoinType, Keyword, LikeExpr, Order,
    PostgresQueryBuilder, SelectStatement, SimpleExpr, Value,
};
use tracing::{debug, warn};

use crate::ast::{
    ConditionValue, Direction, FunctionArgument, FunctionCall, GroupBy, Literal, Operator,
    PropertyExpression, SimpleCondition, Sort,
};
use crate::compiler::{
    compile_filter, prepare_advanced_query, prepare_query, resolve_polarity, simple_conditions,
    CompileContext, ConditionCompiler, Connective, Projection, QueryCompiler, QueryParts,
};
use crate::config::SchemaConfig;
use crate::error::CompileError;
use crate::function::Function;
use crate::native::Native;
use crate::paths::{JoinStep, PathResolver};
use crate::query::{AdvancedQuery, Query};
use crate::registry::{fixed_args, matching_customizers, FunctionTable, NativeTable};

const BACKEND: &str = "sql";

/// Table alias identifier for sea-query
#[derive(Debug, Clone)]
pub struct TableAlias(pub String);

impl Iden for TableAlias {
    fn unquoted(&self, s: &mut dyn Write) {
        let _ = s.write_str(&self.0);
    }
}

/// Column identifier wrapper
#[derive(Debug, Clone)]
pub struct ColumnName(pub String);

impl Iden for ColumnName {
    fn unquoted(&self, s: &mut dyn Write) {
        let _ = s.write_str(&self.0);
    }
}

/// Native sort payload: an arbitrary expression and its direction.
#[derive(Debug, Clone)]
pub struct NativeOrder {
    pub expr: SimpleExpr,
    pub order: Order,
}

/// Mutates the built statement before it is rendered.
#[derive(Clone)]
pub struct SqlCustomizer(Arc<dyn Fn(&mut SelectStatement) + Send + Sync>);

impl SqlCustomizer {
    pub fn new(customize: impl Fn(&mut SelectStatement) + Send + Sync + 'static) -> Self {
        Self(Arc::new(customize))
    }

    fn apply(&self, statement: &mut SelectStatement) {
        (self.0)(statement)
    }
}

/// Result of SQL compilation
#[derive(Debug, Clone)]
pub struct CompileResult {
    pub statement: SelectStatement,
    pub sql: String,
    /// Result keys of a projection, in select-list order; empty for entity queries.
    pub columns: Vec<String>,
    /// The query pages through a to-many join without `distinct`.
    pub requires_distinct: bool,
}

/// SQL Compiler that converts the query IR to sea-query statements
pub struct SqlCompiler {
    config: SchemaConfig,
    entity: String,
    functions: FunctionTable<SimpleExpr>,
    native_filters: NativeTable<SimpleExpr>,
    native_projections: NativeTable<Vec<SimpleExpr>>,
    native_sorts: NativeTable<NativeOrder>,
}

impl SqlCompiler {
    pub fn new(config: SchemaConfig, entity: impl Into<String>) -> Self {
        Self {
            config,
            entity: entity.into(),
            functions: function_table(),
            native_filters: NativeTable::new(BACKEND).register::<SimpleExpr>(SimpleExpr::clone),
            native_projections: NativeTable::new(BACKEND)
                .register::<SimpleExpr>(|expr| vec![expr.clone()])
                .register::<Vec<SimpleExpr>>(Vec::clone),
            native_sorts: NativeTable::new(BACKEND).register::<NativeOrder>(NativeOrder::clone),
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    fn resolver(&self) -> PathResolver<'_> {
        PathResolver::new(&self.config, &self.entity)
    }

    fn column(&self, path: &str) -> Result<SimpleExpr, CompileError> {
        let resolved = self.resolver().resolve(path)?;
        Ok(Expr::col((TableAlias(resolved.table_alias), ColumnName(resolved.column))).into())
    }

    pub fn compile_expression(&self, expr: &PropertyExpression) -> Result<SimpleExpr, CompileError> {
        match expr {
            PropertyExpression::Property(property) => self.column(property.path()),
            PropertyExpression::Call(call) => {
                let arguments = call
                    .arguments()
                    .iter()
                    .map(|argument| match argument {
                        FunctionArgument::Expression(inner) => self.compile_expression(inner),
                        FunctionArgument::Literal(literal) => Ok(literal_expr(literal)),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                self.functions.apply(call, arguments)
            }
        }
    }

    fn compile_parts(&self, parts: QueryParts<'_>) -> Result<CompileResult, CompileError> {
        debug!(
            backend = BACKEND,
            entity = %self.entity,
            filter = parts.filter.is_some(),
            projection = parts.select.is_some() || parts.group_by.is_some(),
            "compiling query"
        );
        let resolver = self.resolver();
        let root = resolver.root_alias().to_string();

        let mut statement = SelectStatement::new();
        statement.from(TableAlias(root.clone()));

        let (joins, multiplies_rows) = self.collect_joins(&parts)?;
        for join in &joins {
            statement.join_as(
                JoinType::LeftJoin,
                TableAlias(join.table.clone()),
                TableAlias(join.alias.clone()),
                Expr::col((TableAlias(join.parent_alias.clone()), ColumnName(join.join_column.clone())))
                    .equals((TableAlias(join.alias.clone()), ColumnName(join.target_column.clone()))),
            );
        }

        let projection = parts.projection()?;
        let mut columns = Vec::new();
        let mut visible = HashSet::new();
        match &projection {
            Projection::Entity => {
                statement.column((TableAlias(root), Asterisk));
            }
            Projection::Items(items) => {
                for (name, expr) in items {
                    statement.expr_as(self.compile_expression(expr)?, Alias::new(name.as_str()));
                    visible.insert(expr.to_expression_string());
                    columns.push(name.clone());
                }
            }
            Projection::Native(native) => {
                statement.exprs(self.native_projections.resolve(native)?);
            }
        }

        if let Some(filter) = compile_filter(self, parts.filter, self.config.max_depth)? {
            statement.and_where(filter);
        }

        if let Some(group_by) = parts.group_by {
            let keys = match group_by {
                GroupBy::Simple(_) => group_by
                    .effective_expressions()
                    .iter()
                    .map(|expr| self.compile_expression(expr))
                    .collect::<Result<Vec<_>, _>>()?,
                GroupBy::Native(native) => self.native_projections.resolve(native)?,
            };
            statement.add_group_by(keys);
        }

        if let Some(having) = compile_filter(self, parts.having, self.config.max_depth)? {
            statement.and_having(having);
        }

        for (i, sort) in parts.sort.iter().enumerate() {
            match sort {
                Sort::Simple(simple) => {
                    let expr = simple.effective_expression();
                    let compiled = self.compile_expression(expr)?;
                    // SELECT DISTINCT requires every ORDER BY expression in the select list
                    if parts.distinct && !self.is_selected(expr, &projection, &visible) {
                        statement.expr_as(compiled.clone(), Alias::new(format!("__sort_{}", i)));
                    }
                    statement.order_by_expr(compiled, order(simple.direction()));
                }
                Sort::Native(native) => {
                    let native = self.native_sorts.resolve(native)?;
                    statement.order_by_expr(native.expr, native.order);
                }
            }
        }

        if parts.distinct {
            statement.distinct();
        }

        let mut requires_distinct = false;
        if let Some(pagination) = parts.pagination {
            statement.limit(pagination.page_size()).offset(pagination.offset());
            if multiplies_rows && !parts.distinct {
                warn!(
                    entity = %self.entity,
                    "paginating through a to-many relation without distinct may return duplicate rows"
                );
                requires_distinct = true;
            }
        }

        for customizer in matching_customizers::<SqlCustomizer>(BACKEND, parts.customizers) {
            customizer.apply(&mut statement);
        }

        let sql = statement.to_string(PostgresQueryBuilder);
        Ok(CompileResult {
            statement,
            sql,
            columns,
            requires_distinct,
        })
    }

    fn is_selected(
        &self,
        expr: &PropertyExpression,
        projection: &Projection<'_>,
        visible: &HashSet<String>,
    ) -> bool {
        match projection {
            Projection::Entity => expr
                .property_path()
                .is_some_and(|path| !path.contains('.')),
            Projection::Items(_) => visible.contains(&expr.to_expression_string()),
            Projection::Native(_) => true,
        }
    }

    /// Joins for every path the query touches, one per relation prefix in first-use
    /// order, plus whether a filter or sort path crosses a to-many relation.
    fn collect_joins(&self, parts: &QueryParts<'_>) -> Result<(Vec<JoinStep>, bool), CompileError> {
        let resolver = self.resolver();
        let mut paths: Vec<(String, bool)> = Vec::new();

        for simple in parts.filter.into_iter().flat_map(simple_conditions) {
            paths.extend(condition_paths(simple).into_iter().map(|p| (p, true)));
        }
        for sort in parts.sort {
            if let Sort::Simple(simple) = sort {
                let expr = simple.effective_expression();
                paths.extend(expr.property_paths().into_iter().map(|p| (p.to_string(), true)));
            }
        }
        let projected = parts
            .select
            .map(|s| s.effective_expressions())
            .into_iter()
            .chain(parts.group_by.map(|g| g.effective_expressions()))
            .flatten();
        for expr in projected {
            paths.extend(expr.property_paths().into_iter().map(|p| (p.to_string(), false)));
        }
        for simple in parts.having.into_iter().flat_map(simple_conditions) {
            paths.extend(condition_paths(simple).into_iter().map(|p| (p, false)));
        }

        let mut seen = HashSet::new();
        let mut joins = Vec::new();
        let mut multiplies_rows = false;
        for (path, counts) in paths {
            let resolved = resolver.resolve(&path)?;
            if counts && resolved.crosses_to_many() {
                multiplies_rows = true;
            }
            for join in resolved.joins {
                if seen.insert(join.alias.clone()) {
                    joins.push(join);
                }
            }
        }
        Ok((joins, multiplies_rows))
    }
}

fn condition_paths(condition: &SimpleCondition) -> Vec<String> {
    let mut paths: Vec<String> = condition
        .left()
        .property_paths()
        .into_iter()
        .map(str::to_string)
        .collect();
    if let Some(ConditionValue::Field(field)) = condition.value() {
        paths.push(field.path().to_string());
    }
    paths
}

impl ConditionCompiler for SqlCompiler {
    type Filter = SimpleExpr;

    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn compile_simple(
        &self,
        condition: &SimpleCondition,
        ctx: CompileContext,
    ) -> Result<SimpleExpr, CompileError> {
        let left = self.compile_expression(condition.left())?;
        let polarity = resolve_polarity(condition.operator(), ctx.is_negated());
        let operator = polarity.operator;

        let expr = match condition.value() {
            None => match operator {
                Operator::IsNull => Expr::expr(left).is_null(),
                _ => Expr::expr(left).is_not_null(),
            },
            Some(ConditionValue::List(items)) => {
                let values = items.iter().map(literal_expr);
                match operator {
                    Operator::In => Expr::expr(left).is_in(values),
                    // NOT IN is unknown on null; the row must still match
                    _ => Expr::expr(left.clone())
                        .is_not_in(values)
                        .or(Expr::expr(left).is_null()),
                }
            }
            Some(ConditionValue::Field(field)) => {
                let right = self.column(field.path())?;
                let both_present = Expr::expr(left.clone())
                    .is_not_null()
                    .and(Expr::expr(right.clone()).is_not_null());
                match operator {
                    Operator::Equals => both_present.and(Expr::expr(left).eq(right)),
                    Operator::NotEquals => Expr::expr(left.clone())
                        .ne(right.clone())
                        .or(Expr::expr(left).is_null())
                        .or(Expr::expr(right).is_null()),
                    _ => {
                        let compared = compare(operator, left, right);
                        if polarity.wrapped {
                            both_present.and(compared.not())
                        } else {
                            compared
                        }
                    }
                }
            }
            Some(ConditionValue::Scalar(literal)) if operator.is_pattern() => {
                let text = literal.as_str().ok_or_else(|| {
                    CompileError::TypeMismatch(format!("{} requires a string value", operator))
                })?;
                let pattern = LikeExpr::new(like_pattern(operator, text)).escape('\\');
                let lowered = Expr::expr(named("LOWER", vec![left.clone()]));
                let matched = if polarity.wrapped {
                    lowered.not_like(pattern)
                } else {
                    lowered.like(pattern)
                };
                Expr::expr(left).is_not_null().and(matched)
            }
            Some(ConditionValue::Scalar(literal)) => {
                let value = literal_expr(literal);
                match operator {
                    Operator::Equals => Expr::expr(left.clone())
                        .is_not_null()
                        .and(Expr::expr(left).eq(value)),
                    Operator::NotEquals => Expr::expr(left.clone())
                        .ne(value)
                        .or(Expr::expr(left).is_null()),
                    _ if polarity.wrapped => Expr::expr(left.clone())
                        .is_not_null()
                        .and(compare(operator, left, value).not()),
                    _ => compare(operator, left, value),
                }
            }
        };
        Ok(expr)
    }

    fn compile_native(&self, native: &Native) -> Result<SimpleExpr, CompileError> {
        self.native_filters.resolve(native)
    }

    fn combine(&self, connective: Connective, parts: Vec<SimpleExpr>) -> SimpleExpr {
        let mut parts = parts.into_iter();
        let first = parts.next().unwrap_or_else(|| Expr::val(true).into());
        parts.fold(first, |acc, expr| match connective {
            Connective::And => acc.and(expr),
            Connective::Or => acc.or(expr),
        })
    }

    fn match_all(&self) -> SimpleExpr {
        Expr::val(true).into()
    }
}

impl QueryCompiler for SqlCompiler {
    type Output = CompileResult;

    fn name(&self) -> &'static str {
        BACKEND
    }

    fn compile_query(&self, query: &Query) -> Result<CompileResult, CompileError> {
        let query = prepare_query(query)?;
        self.compile_parts(QueryParts::of_query(&query))
    }

    fn compile_advanced_query(&self, query: &AdvancedQuery) -> Result<CompileResult, CompileError> {
        let query = prepare_advanced_query(query)?;
        self.compile_parts(QueryParts::of_advanced(&query))
    }
}

fn compare(operator: Operator, left: SimpleExpr, right: SimpleExpr) -> SimpleExpr {
    let left = Expr::expr(left);
    match operator {
        Operator::GreaterThan => left.gt(right),
        Operator::GreaterThanEquals => left.gte(right),
        Operator::LesserThan => left.lt(right),
        Operator::LesserThanEquals => left.lte(right),
        Operator::NotEquals => left.ne(right),
        _ => left.eq(right),
    }
}

fn order(direction: Direction) -> Order {
    match direction {
        Direction::Asc => Order::Asc,
        Direction::Desc => Order::Desc,
    }
}

/// Convert IR Literal to a sea-query value expression
fn literal_expr(literal: &Literal) -> SimpleExpr {
    let value = match literal {
        Literal::String(s) => Value::String(Some(Box::new(s.clone()))),
        Literal::Integer(n) => Value::BigInt(Some(*n)),
        Literal::Float(n) => Value::Double(Some(*n)),
        Literal::Boolean(b) => Value::Bool(Some(*b)),
    };
    SimpleExpr::Value(value)
}

/// Case-insensitive LIKE pattern with `%`, `_` and `\` escaped.
fn like_pattern(operator: Operator, text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    match operator {
        Operator::StartsWith => format!("{}%", escaped),
        Operator::EndsWith => format!("%{}", escaped),
        _ => format!("%{}%", escaped),
    }
}

fn named(name: &str, arguments: Vec<SimpleExpr>) -> SimpleExpr {
    Func::cust(Alias::new(name)).args(arguments).into()
}

fn function_table() -> FunctionTable<SimpleExpr> {
    FunctionTable::empty(BACKEND)
        .with(Function::Abs, same_name)
        .with(Function::Sqrt, same_name)
        .with(Function::Mod, same_name)
        .with(Function::Concat, concat)
        .with(Function::Substring, |_, args| Ok(named("SUBSTR", args)))
        .with(Function::Trim, |_, args| Ok(named("BTRIM", args)))
        .with(Function::Ltrim, same_name)
        .with(Function::Rtrim, same_name)
        .with(Function::Length, same_name)
        .with(Function::Locate, locate)
        .with(Function::Lower, same_name)
        .with(Function::Upper, same_name)
        .with(Function::CurrentDate, |_, _| Ok(SimpleExpr::Keyword(Keyword::CurrentDate)))
        .with(Function::CurrentTime, |_, _| Ok(SimpleExpr::Keyword(Keyword::CurrentTime)))
        .with(Function::CurrentTimestamp, |_, _| {
            Ok(SimpleExpr::Keyword(Keyword::CurrentTimestamp))
        })
        .with(Function::Coalesce, same_name)
        .with(Function::Nullif, nullif)
        .with(Function::Count, same_name)
        .with(Function::Sum, same_name)
        .with(Function::Avg, same_name)
        .with(Function::Min, same_name)
        .with(Function::Max, same_name)
}

fn same_name(call: &FunctionCall, args: Vec<SimpleExpr>) -> Result<SimpleExpr, CompileError> {
    Ok(named(call.function().name(), args))
}

/// `||` keeps null propagation, unlike PostgreSQL's CONCAT().
fn concat(_: &FunctionCall, args: Vec<SimpleExpr>) -> Result<SimpleExpr, CompileError> {
    let mut args = args.into_iter();
    let first = args
        .next()
        .ok_or_else(|| CompileError::TypeMismatch("CONCAT expects arguments".into()))?;
    Ok(args.fold(first, |acc, arg| {
        SimpleExpr::Binary(Box::new(acc), BinOper::Custom("||"), Box::new(arg))
    }))
}

/// `LOCATE(needle, haystack)` maps onto `STRPOS(haystack, needle)`.
fn locate(call: &FunctionCall, args: Vec<SimpleExpr>) -> Result<SimpleExpr, CompileError> {
    let [needle, haystack] = fixed_args(call, args)?;
    Ok(named("STRPOS", vec![haystack, needle]))
}

fn nullif(call: &FunctionCall, args: Vec<SimpleExpr>) -> Result<SimpleExpr, CompileError> {
    let literal_second = call.arguments().get(1).and_then(FunctionArgument::as_literal).is_some();
    let [first, second] = fixed_args(call, args)?;
    if literal_second {
        return Ok(named("NULLIF", vec![first, second]));
    }
    Ok(Expr::case(
        Expr::expr(first.clone()).eq(second),
        SimpleExpr::Keyword(Keyword::Null),
    )
    .finally(first)
    .into())
}
