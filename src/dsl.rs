//! Free constructor functions for building IR values tersely.
//!
//! ```
//! use querity::ast::Operator;
//! use querity::dsl::*;
//!
//! let query = advanced_query()
//!     .group_by(group_by(["category"]).unwrap())
//!     .having(filter_by_expression(count(prop("id").unwrap()).unwrap(), Operator::GreaterThan, 5).unwrap())
//!     .build();
//! assert!(query.is_ok());
//! ```

use crate::ast::{
    Condition, ConditionValue, Direction, FieldReference, FunctionArgument,
    FunctionCall, GroupBy, Literal, Operator, PropertyExpression, PropertyReference, Select,
    SimpleCondition, SimpleSort, Sort,
};
use crate::error::ValidationError;
use crate::function::Function;
use crate::native::Native;
use crate::query::{AdvancedQueryBuilder, Pagination, Query, QueryBuilder};

pub fn query() -> QueryBuilder {
    Query::builder()
}

pub fn advanced_query() -> AdvancedQueryBuilder {
    crate::query::AdvancedQuery::builder()
}

pub fn prop(path: &str) -> Result<PropertyReference, ValidationError> {
    PropertyReference::new(path)
}

pub fn field(path: &str) -> Result<FieldReference, ValidationError> {
    FieldReference::new(path)
}

pub fn lit(value: impl Into<Literal>) -> Literal {
    value.into()
}

/// A collection value for `IN` / `NOT_IN`.
pub fn values<I, T>(items: I) -> ConditionValue
where
    I: IntoIterator<Item = T>,
    T: Into<Literal>,
{
    ConditionValue::List(items.into_iter().map(Into::into).collect())
}

pub fn filter_by(
    property: &str,
    operator: Operator,
    value: impl Into<ConditionValue>,
) -> Result<Condition, ValidationError> {
    SimpleCondition::new(PropertyExpression::property(property)?, operator, Some(value.into()))
        .map(Condition::Simple)
}

pub fn filter_by_expression(
    expression: impl Into<PropertyExpression>,
    operator: Operator,
    value: impl Into<ConditionValue>,
) -> Result<Condition, ValidationError> {
    SimpleCondition::new(expression, operator, Some(value.into())).map(Condition::Simple)
}

pub fn is_null(property: &str) -> Result<Condition, ValidationError> {
    SimpleCondition::new(PropertyExpression::property(property)?, Operator::IsNull, None)
        .map(Condition::Simple)
}

pub fn is_not_null(property: &str) -> Result<Condition, ValidationError> {
    SimpleCondition::new(PropertyExpression::property(property)?, Operator::IsNotNull, None)
        .map(Condition::Simple)
}

pub fn and(conditions: Vec<Condition>) -> Condition {
    Condition::And(conditions)
}

pub fn or(conditions: Vec<Condition>) -> Condition {
    Condition::Or(conditions)
}

pub fn not(condition: Condition) -> Result<Condition, ValidationError> {
    Condition::not(condition)
}

pub fn native<T: std::any::Any + Send + Sync>(value: T) -> Condition {
    Condition::Native(Native::new(value))
}

pub fn call(
    function: Function,
    arguments: Vec<FunctionArgument>,
) -> Result<FunctionCall, ValidationError> {
    FunctionCall::new(function, arguments)
}

fn unary(
    function: Function,
    argument: impl Into<FunctionArgument>,
) -> Result<FunctionCall, ValidationError> {
    FunctionCall::new(function, vec![argument.into()])
}

pub fn count(argument: impl Into<FunctionArgument>) -> Result<FunctionCall, ValidationError> {
    unary(Function::Count, argument)
}

pub fn sum(argument: impl Into<FunctionArgument>) -> Result<FunctionCall, ValidationError> {
    unary(Function::Sum, argument)
}

pub fn avg(argument: impl Into<FunctionArgument>) -> Result<FunctionCall, ValidationError> {
    unary(Function::Avg, argument)
}

pub fn min(argument: impl Into<FunctionArgument>) -> Result<FunctionCall, ValidationError> {
    unary(Function::Min, argument)
}

pub fn max(argument: impl Into<FunctionArgument>) -> Result<FunctionCall, ValidationError> {
    unary(Function::Max, argument)
}

pub fn upper(argument: impl Into<FunctionArgument>) -> Result<FunctionCall, ValidationError> {
    unary(Function::Upper, argument)
}

pub fn lower(argument: impl Into<FunctionArgument>) -> Result<FunctionCall, ValidationError> {
    unary(Function::Lower, argument)
}

pub fn length(argument: impl Into<FunctionArgument>) -> Result<FunctionCall, ValidationError> {
    unary(Function::Length, argument)
}

pub fn abs(argument: impl Into<FunctionArgument>) -> Result<FunctionCall, ValidationError> {
    unary(Function::Abs, argument)
}

pub fn sort_by(property: &str, direction: Direction) -> Result<Sort, ValidationError> {
    Ok(Sort::Simple(SimpleSort::new(
        PropertyExpression::property(property)?,
        direction,
    )))
}

pub fn sort_by_expression(expression: impl Into<PropertyExpression>, direction: Direction) -> Sort {
    Sort::Simple(SimpleSort::new(expression, direction))
}

pub fn paged(page: u64, page_size: u64) -> Result<Pagination, ValidationError> {
    Pagination::new(page, page_size)
}

pub fn select_by<I, S>(names: I) -> Result<Select, ValidationError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Select::properties(names)
}

pub fn select_by_expressions(expressions: Vec<PropertyExpression>) -> Select {
    Select::expressions(expressions)
}

pub fn group_by<I, S>(names: I) -> Result<GroupBy, ValidationError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    GroupBy::properties(names)
}

pub fn group_by_expressions(expressions: Vec<PropertyExpression>) -> GroupBy {
    GroupBy::expressions(expressions)
}
