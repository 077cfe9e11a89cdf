//! Backend-neutral compilation contract.
//!
//! Every backend walks conditions through [`compile_condition`], which threads a
//! `negate` flag from the root instead of building a negated tree:
//!
//! ```text
//! compile(Not(c), negate)      = compile(c, !negate)
//! compile(And(a, b), negate)   = negate ? Or(compile(a, true), compile(b, true))
//!                                       : And(compile(a, false), compile(b, false))
//! compile(Native(n), true)     = error
//! ```
//!
//! Leaves receive the flag and use [`resolve_polarity`] so that every backend
//! realises the same null semantics: EQUALS is false on null, NOT_EQUALS is true
//! on null, and ordering / pattern comparisons exclude null in both polarities.

use tracing::trace;

use crate::ast::{
    Condition, ConditionValue, GroupBy, Operator, PropertyExpression, Select, SimpleCondition, Sort,
};
use crate::error::CompileError;
use crate::native::Native;
use crate::query::{AdvancedQuery, Pagination, Query};

pub const DEFAULT_MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileContext {
    negate: bool,
    depth: usize,
    max_depth: usize,
}

impl CompileContext {
    pub fn new(max_depth: usize) -> Self {
        Self {
            negate: false,
            depth: 0,
            max_depth,
        }
    }

    pub fn is_negated(&self) -> bool {
        self.negate
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn negated(self) -> Self {
        Self {
            negate: !self.negate,
            ..self
        }
    }

    fn descend(self) -> Result<Self, CompileError> {
        if self.depth >= self.max_depth {
            return Err(CompileError::DepthExceeded {
                limit: self.max_depth,
            });
        }
        Ok(Self {
            depth: self.depth + 1,
            ..self
        })
    }
}

impl Default for CompileContext {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
}

impl Connective {
    /// De Morgan: a negated connective flips.
    pub fn under(self, negate: bool) -> Self {
        match (self, negate) {
            (c, false) => c,
            (Connective::And, true) => Connective::Or,
            (Connective::Or, true) => Connective::And,
        }
    }
}

/// How a leaf operator must be realised under the current negation flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Polarity {
    /// Operator to emit.
    pub operator: Operator,
    /// Emit as `NOT (operator)` with a not-null guard.
    pub wrapped: bool,
}

/// Operators whose complement keeps the same null behaviour are swapped; ordering
/// and pattern operators are wrapped in an explicit NOT instead.
pub fn resolve_polarity(operator: Operator, negate: bool) -> Polarity {
    if !negate {
        return Polarity {
            operator,
            wrapped: false,
        };
    }
    let complement = match operator {
        Operator::Equals => Some(Operator::NotEquals),
        Operator::NotEquals => Some(Operator::Equals),
        Operator::In => Some(Operator::NotIn),
        Operator::NotIn => Some(Operator::In),
        Operator::IsNull => Some(Operator::IsNotNull),
        Operator::IsNotNull => Some(Operator::IsNull),
        _ => None,
    };
    match complement {
        Some(operator) => Polarity {
            operator,
            wrapped: false,
        },
        None => Polarity {
            operator,
            wrapped: true,
        },
    }
}

/// The per-backend condition table. Each method handles one closed IR variant;
/// connectives and negation are handled once, in [`compile_condition`].
pub trait ConditionCompiler {
    type Filter;

    fn backend_name(&self) -> &'static str;

    fn compile_simple(
        &self,
        condition: &SimpleCondition,
        ctx: CompileContext,
    ) -> Result<Self::Filter, CompileError>;

    /// Only ever called with a non-negated context.
    fn compile_native(&self, native: &Native) -> Result<Self::Filter, CompileError>;

    fn combine(&self, connective: Connective, parts: Vec<Self::Filter>) -> Self::Filter;

    /// The filter imposing no restriction.
    fn match_all(&self) -> Self::Filter;
}

pub fn compile_condition<C: ConditionCompiler + ?Sized>(
    compiler: &C,
    condition: &Condition,
    ctx: CompileContext,
) -> Result<C::Filter, CompileError> {
    let ctx = ctx.descend()?;
    match condition {
        Condition::Simple(simple) => compiler.compile_simple(simple, ctx),
        Condition::And(children) => compile_connective(compiler, Connective::And, children, ctx),
        Condition::Or(children) => compile_connective(compiler, Connective::Or, children, ctx),
        Condition::Not(not) => compile_condition(compiler, not.condition(), ctx.negated()),
        Condition::Native(_) if ctx.is_negated() => Err(CompileError::NegatedNative),
        Condition::Native(native) => compiler.compile_native(native),
    }
}

fn compile_connective<C: ConditionCompiler + ?Sized>(
    compiler: &C,
    connective: Connective,
    children: &[Condition],
    ctx: CompileContext,
) -> Result<C::Filter, CompileError> {
    let mut parts = children
        .iter()
        .filter(|child| !child.is_empty())
        .map(|child| compile_condition(compiler, child, ctx))
        .collect::<Result<Vec<_>, _>>()?;
    match parts.len() {
        0 => Ok(compiler.match_all()),
        1 => Ok(parts.remove(0)),
        _ => Ok(compiler.combine(connective.under(ctx.is_negated()), parts)),
    }
}

/// Compiles an optional filter, treating an empty condition as absent.
pub fn compile_filter<C: ConditionCompiler + ?Sized>(
    compiler: &C,
    filter: Option<&Condition>,
    max_depth: usize,
) -> Result<Option<C::Filter>, CompileError> {
    match filter {
        Some(condition) if !condition.is_empty() => {
            compile_condition(compiler, condition, CompileContext::new(max_depth)).map(Some)
        }
        _ => Ok(None),
    }
}

/// Whole-query entry points of a backend that emits a native query object.
pub trait QueryCompiler {
    type Output;

    fn name(&self) -> &'static str;

    fn compile_query(&self, query: &Query) -> Result<Self::Output, CompileError>;

    fn compile_advanced_query(&self, query: &AdvancedQuery) -> Result<Self::Output, CompileError>;
}

/// Borrowed view over either query form, with empty parts normalised to `None`.
#[derive(Debug, Clone, Copy)]
pub struct QueryParts<'a> {
    pub filter: Option<&'a Condition>,
    pub sort: &'a [Sort],
    pub pagination: Option<Pagination>,
    pub distinct: bool,
    pub select: Option<&'a Select>,
    pub group_by: Option<&'a GroupBy>,
    pub having: Option<&'a Condition>,
    pub customizers: &'a [Native],
}

impl<'a> QueryParts<'a> {
    pub fn of_query(query: &'a Query) -> Self {
        Self {
            filter: query.filter().filter(|f| !f.is_empty()),
            sort: query.sort(),
            pagination: query.pagination(),
            distinct: query.is_distinct(),
            select: query.select().filter(|s| !s.is_empty()),
            group_by: None,
            having: None,
            customizers: query.customizers(),
        }
    }

    pub fn of_advanced(query: &'a AdvancedQuery) -> Self {
        Self {
            filter: query.filter().filter(|f| !f.is_empty()),
            sort: query.sort(),
            pagination: query.pagination(),
            distinct: query.is_distinct(),
            select: query.select().filter(|s| !s.is_empty()),
            group_by: query.group_by().filter(|g| !g.is_empty()),
            having: query.having().filter(|h| !h.is_empty()),
            customizers: query.customizers(),
        }
    }

    /// What the query returns: whole entities, keyed items, or a native projection.
    ///
    /// A grouped query without a select projects its group keys.
    pub fn projection(&self) -> Result<Projection<'a>, CompileError> {
        match (self.select, self.group_by) {
            (Some(Select::Native(native)), _) => Ok(Projection::Native(native)),
            (Some(select), _) => keyed_items(select),
            (None, Some(GroupBy::Simple(list))) => keyed_items(&Select::Simple(list.clone())),
            (None, _) => Ok(Projection::Entity),
        }
    }

    /// Every simple condition of the filter and the having clause.
    pub fn simple_conditions(&self) -> Vec<&'a SimpleCondition> {
        self.filter
            .into_iter()
            .chain(self.having)
            .flat_map(simple_conditions)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection<'a> {
    Entity,
    /// `(result key, expression)` in select-list order.
    Items(Vec<(String, PropertyExpression)>),
    Native(&'a Native),
}

fn keyed_items(select: &Select) -> Result<Projection<'static>, CompileError> {
    let names = select.alias_names()?;
    Ok(Projection::Items(
        names.into_iter().zip(select.effective_expressions()).collect(),
    ))
}

/// Runs preprocessors and the generic checks every backend relies on.
pub fn prepare_query(query: &Query) -> Result<Query, CompileError> {
    let query = query.clone().preprocess();
    check_condition(query.filter(), "filter")?;
    check_sorts(query.sort())?;
    Ok(query)
}

pub fn prepare_advanced_query(query: &AdvancedQuery) -> Result<AdvancedQuery, CompileError> {
    let query = query.clone().preprocess();
    check_condition(query.filter(), "filter")?;
    check_sorts(query.sort())?;
    if let Some(having) = query.having() {
        check_values(having)?;
    }
    Ok(query)
}

fn check_sorts(sorts: &[Sort]) -> Result<(), CompileError> {
    for sort in sorts {
        if let Sort::Simple(simple) = sort {
            if let Some(function) = simple.effective_expression().find_aggregate() {
                return Err(CompileError::AggregateNotAllowed {
                    function,
                    position: "sort",
                });
            }
        }
    }
    Ok(())
}

fn check_condition(condition: Option<&Condition>, position: &'static str) -> Result<(), CompileError> {
    let Some(condition) = condition else {
        return Ok(());
    };
    for simple in simple_conditions(condition) {
        if let Some(function) = simple.left().find_aggregate() {
            trace!(%function, position, "aggregate rejected");
            return Err(CompileError::AggregateNotAllowed { function, position });
        }
    }
    check_values(condition)
}

/// Value-shape checks that the constructor leaves to compile time.
fn check_values(condition: &Condition) -> Result<(), CompileError> {
    for simple in simple_conditions(condition) {
        let operator = simple.operator();
        match simple.value() {
            Some(ConditionValue::Scalar(_)) if operator.takes_collection() => {
                return Err(CompileError::TypeMismatch(format!(
                    "operator {} requires a collection value",
                    operator
                )));
            }
            Some(ConditionValue::Scalar(lit)) if operator.is_pattern() && lit.as_str().is_none() => {
                return Err(CompileError::TypeMismatch(format!(
                    "operator {} requires a string value, got {}",
                    operator, lit
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Every leaf of a condition tree, depth-first.
pub fn simple_conditions(condition: &Condition) -> Vec<&SimpleCondition> {
    let mut out = Vec::new();
    let mut stack = vec![condition];
    while let Some(node) = stack.pop() {
        match node {
            Condition::Simple(simple) => out.push(simple),
            Condition::And(children) | Condition::Or(children) => {
                stack.extend(children.iter().rev());
            }
            Condition::Not(not) => stack.push(not.condition()),
            Condition::Native(_) => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::*;
    use crate::function::Function;

    /// Renders conditions as text so the shape of the compiled tree is visible.
    struct TextCompiler;

    impl ConditionCompiler for TextCompiler {
        type Filter = String;

        fn backend_name(&self) -> &'static str {
            "text"
        }

        fn compile_simple(
            &self,
            condition: &SimpleCondition,
            ctx: CompileContext,
        ) -> Result<String, CompileError> {
            let polarity = resolve_polarity(condition.operator(), ctx.is_negated());
            let leaf = format!(
                "{} {}",
                condition.left().to_expression_string(),
                polarity.operator
            );
            Ok(if polarity.wrapped {
                format!("NOT({leaf})")
            } else {
                leaf
            })
        }

        fn compile_native(&self, native: &Native) -> Result<String, CompileError> {
            Ok(format!("native:{}", native.type_name()))
        }

        fn combine(&self, connective: Connective, parts: Vec<String>) -> String {
            let sep = match connective {
                Connective::And => " AND ",
                Connective::Or => " OR ",
            };
            format!("({})", parts.join(sep))
        }

        fn match_all(&self) -> String {
            "TRUE".into()
        }
    }

    fn compile(condition: &Condition) -> Result<String, CompileError> {
        compile_condition(&TextCompiler, condition, CompileContext::default())
    }

    fn a() -> Condition {
        filter_by("a", Operator::Equals, 1).unwrap()
    }

    fn b() -> Condition {
        filter_by("b", Operator::GreaterThan, 2).unwrap()
    }

    #[test]
    fn test_double_negation_is_identity() {
        let twice = not(not(a()).unwrap()).unwrap();
        assert_eq!(compile(&twice).unwrap(), compile(&a()).unwrap());
    }

    #[test]
    fn test_de_morgan() {
        let left = not(and(vec![a(), b()])).unwrap();
        let right = or(vec![not(a()).unwrap(), not(b()).unwrap()]);
        assert_eq!(compile(&left).unwrap(), compile(&right).unwrap());
        assert_eq!(compile(&left).unwrap(), "(a NOT_EQUALS OR NOT(b GREATER_THAN))");
    }

    #[test]
    fn test_negated_native_is_rejected() {
        let tree = not(and(vec![a(), native("raw".to_string())])).unwrap();
        assert_eq!(compile(&tree).unwrap_err(), CompileError::NegatedNative);
        assert_eq!(
            compile(&native("raw".to_string())).unwrap(),
            "native:alloc::string::String"
        );
    }

    #[test]
    fn test_empty_children_are_skipped() {
        let tree = and(vec![or(vec![]), a()]);
        assert_eq!(compile(&tree).unwrap(), "a EQUALS");
        assert_eq!(compile(&and(vec![])).unwrap(), "TRUE");
    }

    #[test]
    fn test_depth_limit() {
        let mut tree = a();
        for _ in 0..20 {
            tree = not(tree).unwrap();
        }
        let err = compile_condition(&TextCompiler, &tree, CompileContext::new(10)).unwrap_err();
        assert_eq!(err, CompileError::DepthExceeded { limit: 10 });
        assert!(compile(&tree).is_ok());
    }

    #[test]
    fn test_polarity_table() {
        assert_eq!(
            resolve_polarity(Operator::Equals, true),
            Polarity {
                operator: Operator::NotEquals,
                wrapped: false
            }
        );
        assert!(resolve_polarity(Operator::LesserThanEquals, true).wrapped);
        assert!(resolve_polarity(Operator::Contains, true).wrapped);
        assert!(!resolve_polarity(Operator::Contains, false).wrapped);
    }

    #[test]
    fn test_aggregate_rejected_in_filter_and_sort() {
        let in_filter = query()
            .filter(filter_by_expression(count(prop("id").unwrap()).unwrap(), Operator::GreaterThan, 1).unwrap())
            .build();
        assert_eq!(
            prepare_query(&in_filter).unwrap_err(),
            CompileError::AggregateNotAllowed {
                function: Function::Count,
                position: "filter"
            }
        );

        let in_sort = query()
            .sort(sort_by_expression(sum(prop("price").unwrap()).unwrap(), crate::ast::Direction::Asc))
            .build();
        assert!(matches!(
            prepare_query(&in_sort).unwrap_err(),
            CompileError::AggregateNotAllowed { position: "sort", .. }
        ));
    }

    #[test]
    fn test_aggregate_allowed_in_having() {
        let having = filter_by_expression(count(prop("id").unwrap()).unwrap(), Operator::GreaterThan, 1).unwrap();
        let q = advanced_query()
            .group_by(group_by(["category"]).unwrap())
            .having(having)
            .build()
            .unwrap();
        assert!(prepare_advanced_query(&q).is_ok());
    }

    #[test]
    fn test_in_with_scalar_is_a_type_error() {
        let q = query().filter(filter_by("a", Operator::In, 3).unwrap()).build();
        assert!(matches!(
            prepare_query(&q).unwrap_err(),
            CompileError::TypeMismatch(msg) if msg.contains("collection")
        ));
    }

    #[test]
    fn test_pattern_with_number_is_a_type_error() {
        let q = query()
            .filter(filter_by("a", Operator::StartsWith, 3).unwrap())
            .build();
        assert!(matches!(prepare_query(&q).unwrap_err(), CompileError::TypeMismatch(_)));
    }
}
