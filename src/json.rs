//! JSON form of `Query` / `AdvancedQuery`.
//!
//! ```json
//! {
//!   "filter": { "and": [
//!     { "propertyName": "lastName", "operator": "EQUALS", "value": "Skywalker" },
//!     { "not": { "propertyName": "height", "operator": "LESSER_THAN", "value": 150 } }
//!   ]},
//!   "sort": [{ "propertyName": "firstName", "direction": "DESC" }],
//!   "pagination": { "page": 1, "pageSize": 20 },
//!   "select": { "propertyNames": ["firstName"], "propertyExpressions": [
//!     { "function": "UPPER", "arguments": [{ "propertyName": "lastName" }], "alias": "upperLast" }
//!   ]},
//!   "groupBy": { "propertyNames": ["category"] },
//!   "having": { "propertyExpression": { "function": "COUNT", "arguments": [{ "propertyName": "id" }] },
//!               "operator": "GREATER_THAN", "value": 5 }
//! }
//! ```
//!
//! Decoding goes through the same constructors as the builders, so a document that
//! decodes is a valid IR value. A `value` that is an array becomes an IN collection,
//! `{"field": "path"}` becomes a field reference.

use serde::Deserialize;
use serde_json::Value;

use crate::ast::{
    Condition, ConditionValue, Direction, ExpressionList, FieldReference, FunctionArgument,
    FunctionCall, GroupBy, Literal, Operator, PropertyExpression, PropertyReference, Select,
    SimpleCondition, SimpleSort, Sort,
};
use crate::error::ValidationError;
use crate::function::Function;
use crate::query::{AdvancedQuery, Pagination, Query};

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedQuery {
    Query(Query),
    Advanced(AdvancedQuery),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct QueryDto {
    filter: Option<ConditionDto>,
    #[serde(default)]
    sort: Vec<SortDto>,
    pagination: Option<PaginationDto>,
    #[serde(default)]
    distinct: bool,
    select: Option<ListDto>,
    group_by: Option<ListDto>,
    having: Option<ConditionDto>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ConditionDto {
    And { and: Vec<ConditionDto> },
    Or { or: Vec<ConditionDto> },
    Not { not: Box<ConditionDto> },
    Simple(SimpleConditionDto),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SimpleConditionDto {
    property_name: Option<String>,
    property_expression: Option<ExpressionDto>,
    operator: Option<String>,
    value: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ExpressionDto {
    property_name: Option<String>,
    function: Option<String>,
    #[serde(default)]
    arguments: Vec<ArgumentDto>,
    alias: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ArgumentDto {
    Expression(ExpressionDto),
    Literal(Value),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SortDto {
    property_name: Option<String>,
    property_expression: Option<ExpressionDto>,
    #[serde(default)]
    direction: DirectionDto,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
enum DirectionDto {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PaginationDto {
    page: u64,
    page_size: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ListDto {
    #[serde(default)]
    property_names: Vec<String>,
    #[serde(default)]
    property_expressions: Vec<ExpressionDto>,
}

/// Decodes either query form; `select`, `groupBy` or `having` make it advanced.
pub fn parse_query_json(text: &str) -> Result<ParsedQuery, ValidationError> {
    let dto: QueryDto = serde_json::from_str(text).map_err(document_error)?;
    if dto.select.is_some() || dto.group_by.is_some() || dto.having.is_some() {
        advanced_from_dto(dto).map(ParsedQuery::Advanced)
    } else {
        query_from_dto(dto).map(ParsedQuery::Query)
    }
}

/// Decodes an entity query; grouping keys are rejected.
pub fn parse_query(text: &str) -> Result<Query, ValidationError> {
    let dto: QueryDto = serde_json::from_str(text).map_err(document_error)?;
    if dto.group_by.is_some() || dto.having.is_some() {
        return Err(ValidationError::Document(
            "groupBy and having are only valid in an advanced query".into(),
        ));
    }
    query_from_dto(dto)
}

pub fn parse_advanced_query(text: &str) -> Result<AdvancedQuery, ValidationError> {
    let dto: QueryDto = serde_json::from_str(text).map_err(document_error)?;
    advanced_from_dto(dto)
}

fn document_error(err: serde_json::Error) -> ValidationError {
    ValidationError::Document(err.to_string())
}

fn query_from_dto(dto: QueryDto) -> Result<Query, ValidationError> {
    let mut builder = Query::builder()
        .sorts(convert_all(dto.sort, sort_from_dto)?)
        .distinct(dto.distinct);
    if let Some(filter) = dto.filter {
        builder = builder.filter(condition_from_dto(filter)?);
    }
    if let Some(pagination) = dto.pagination {
        builder = builder.pagination(Pagination::new(pagination.page, pagination.page_size)?);
    }
    if let Some(select) = dto.select {
        builder = builder.select(Select::Simple(list_from_dto(select)?));
    }
    Ok(builder.build())
}

fn advanced_from_dto(dto: QueryDto) -> Result<AdvancedQuery, ValidationError> {
    let mut builder = AdvancedQuery::builder()
        .sorts(convert_all(dto.sort, sort_from_dto)?)
        .distinct(dto.distinct);
    if let Some(filter) = dto.filter {
        builder = builder.filter(condition_from_dto(filter)?);
    }
    if let Some(pagination) = dto.pagination {
        builder = builder.pagination(Pagination::new(pagination.page, pagination.page_size)?);
    }
    if let Some(select) = dto.select {
        builder = builder.select(Select::Simple(list_from_dto(select)?));
    }
    if let Some(group_by) = dto.group_by {
        builder = builder.group_by(GroupBy::Simple(list_from_dto(group_by)?));
    }
    if let Some(having) = dto.having {
        builder = builder.having(condition_from_dto(having)?);
    }
    builder.build()
}

fn convert_all<D, T>(
    items: Vec<D>,
    convert: fn(D) -> Result<T, ValidationError>,
) -> Result<Vec<T>, ValidationError> {
    items.into_iter().map(convert).collect()
}

fn condition_from_dto(dto: ConditionDto) -> Result<Condition, ValidationError> {
    match dto {
        ConditionDto::And { and } => Ok(Condition::And(convert_all(and, condition_from_dto)?)),
        ConditionDto::Or { or } => Ok(Condition::Or(convert_all(or, condition_from_dto)?)),
        ConditionDto::Not { not } => Condition::not(condition_from_dto(*not)?),
        ConditionDto::Simple(simple) => {
            let operator = match simple.operator {
                Some(name) => Operator::from_name(&name)
                    .ok_or_else(|| ValidationError::Document(format!("unknown operator '{}'", name)))?,
                None => Operator::default(),
            };
            let expression = simple
                .property_expression
                .map(expression_from_dto)
                .transpose()?;
            let value = simple.value.map(condition_value).transpose()?;
            SimpleCondition::from_parts(simple.property_name, expression, operator, value)
                .map(Condition::Simple)
        }
    }
}

fn condition_value(value: Value) -> Result<ConditionValue, ValidationError> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(Literal::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map(ConditionValue::List),
        Value::Object(mut object) => match (object.remove("field"), object.is_empty()) {
            (Some(Value::String(path)), true) => FieldReference::new(path).map(ConditionValue::Field),
            _ => Err(ValidationError::Document(
                "an object value must be {\"field\": \"path\"}".into(),
            )),
        },
        scalar => Literal::try_from(&scalar).map(ConditionValue::Scalar),
    }
}

fn expression_from_dto(dto: ExpressionDto) -> Result<PropertyExpression, ValidationError> {
    let expression = match (dto.property_name, dto.function) {
        (Some(_), Some(_)) => return Err(ValidationError::NameAndExpression("expression")),
        (None, None) => return Err(ValidationError::MissingNameOrExpression("expression")),
        (Some(path), None) => {
            if !dto.arguments.is_empty() {
                return Err(ValidationError::Document(format!(
                    "property '{}' cannot take arguments",
                    path
                )));
            }
            let property = PropertyReference::new(path)?;
            PropertyExpression::Property(match dto.alias {
                Some(alias) => property.with_alias(alias),
                None => property,
            })
        }
        (None, Some(name)) => {
            let function = Function::from_name(&name)
                .ok_or_else(|| ValidationError::Document(format!("unknown function '{}'", name)))?;
            let arguments = convert_all(dto.arguments, argument_from_dto)?;
            let call = FunctionCall::new(function, arguments)?;
            PropertyExpression::Call(match dto.alias {
                Some(alias) => call.with_alias(alias),
                None => call,
            })
        }
    };
    Ok(expression)
}

fn argument_from_dto(dto: ArgumentDto) -> Result<FunctionArgument, ValidationError> {
    match dto {
        ArgumentDto::Expression(expression) => expression_from_dto(expression).map(FunctionArgument::Expression),
        ArgumentDto::Literal(value) => Literal::try_from(&value).map(FunctionArgument::Literal),
    }
}

fn sort_from_dto(dto: SortDto) -> Result<Sort, ValidationError> {
    let expression = dto.property_expression.map(expression_from_dto).transpose()?;
    let direction = match dto.direction {
        DirectionDto::Asc => Direction::Asc,
        DirectionDto::Desc => Direction::Desc,
    };
    SimpleSort::from_parts(dto.property_name, expression, direction).map(Sort::Simple)
}

fn list_from_dto(dto: ListDto) -> Result<ExpressionList, ValidationError> {
    let expressions = convert_all(dto.property_expressions, expression_from_dto)?;
    ExpressionList::new(dto.property_names, expressions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_query() {
        let parsed = parse_query_json(
            r#"{
                "filter": { "and": [
                    { "propertyName": "lastName", "operator": "EQUALS", "value": "Skywalker" },
                    { "not": { "propertyName": "height", "operator": "LESSER_THAN", "value": 150 } }
                ]},
                "sort": [{ "propertyName": "firstName", "direction": "DESC" }],
                "pagination": { "page": 2, "pageSize": 10 }
            }"#,
        )
        .unwrap();
        let ParsedQuery::Query(query) = parsed else {
            panic!("expected a plain query");
        };
        assert!(matches!(query.filter(), Some(Condition::And(children)) if children.len() == 2));
        assert_eq!(query.pagination().unwrap().offset(), 10);
        match &query.sort()[0] {
            Sort::Simple(sort) => assert_eq!(sort.direction(), Direction::Desc),
            other => panic!("unexpected sort {other:?}"),
        }
    }

    #[test]
    fn test_value_shapes() {
        let query = parse_query(
            r#"{ "filter": { "or": [
                { "propertyName": "category", "operator": "in", "value": ["jedi", "rebel"] },
                { "propertyName": "height", "operator": "GREATER_THAN", "value": { "field": "width" } },
                { "propertyName": "lastName", "operator": "IS_NULL" }
            ]}}"#,
        )
        .unwrap();
        let Some(Condition::Or(children)) = query.filter() else {
            panic!("expected an OR");
        };
        let values: Vec<Option<&ConditionValue>> = children
            .iter()
            .map(|c| match c {
                Condition::Simple(simple) => simple.value(),
                _ => None,
            })
            .collect();
        assert!(matches!(values[0], Some(ConditionValue::List(items)) if items.len() == 2));
        assert!(matches!(values[1], Some(ConditionValue::Field(f)) if f.path() == "width"));
        assert_eq!(values[2], None);
    }

    #[test]
    fn test_advanced_query_with_function() {
        let parsed = parse_query_json(
            r#"{
                "select": { "propertyNames": ["category"], "propertyExpressions": [
                    { "function": "COUNT", "arguments": [{ "propertyName": "id" }], "alias": "total" }
                ]},
                "groupBy": { "propertyNames": ["category"] },
                "having": {
                    "propertyExpression": { "function": "COUNT", "arguments": [{ "propertyName": "id" }] },
                    "operator": "GREATER_THAN",
                    "value": 5
                }
            }"#,
        )
        .unwrap();
        let ParsedQuery::Advanced(query) = parsed else {
            panic!("expected an advanced query");
        };
        assert_eq!(
            query.select().unwrap().alias_names().unwrap(),
            vec!["category".to_string(), "total".to_string()]
        );
        assert!(query.has_having());
    }

    #[test]
    fn test_validation_errors_surface() {
        let err = parse_query(r#"{ "filter": { "propertyName": "a", "operator": "IS_NULL", "value": 1 } }"#)
            .unwrap_err();
        assert!(matches!(err, ValidationError::ValueCount { .. }));

        let err = parse_query(r#"{ "pagination": { "page": 0, "pageSize": 10 } }"#).unwrap_err();
        assert!(matches!(err, ValidationError::Pagination { page: 0, .. }));

        let err = parse_query(r#"{ "pagination": { "page": 18446744073709551615, "pageSize": 2 } }"#)
            .unwrap_err();
        assert!(matches!(err, ValidationError::Pagination { page: u64::MAX, page_size: 2 }));

        let err = parse_advanced_query(
            r#"{ "having": { "propertyName": "a", "value": 1 } }"#,
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::HavingWithoutGroupBy);

        let err = parse_query(r#"{ "filter": { "propertyName": "a", "operator": "LIKE", "value": 1 } }"#)
            .unwrap_err();
        assert!(matches!(err, ValidationError::Document(msg) if msg.contains("LIKE")));

        let err = parse_query(r#"{ "filter": { "propertyName": "a", "propertyExpression": { "propertyName": "b" }, "value": 1 } }"#)
            .unwrap_err();
        assert_eq!(err, ValidationError::NameAndExpression("condition"));
    }

    #[test]
    fn test_function_arity_checked() {
        let err = parse_query(
            r#"{ "filter": { "propertyExpression": { "function": "LOCATE", "arguments": ["a"] }, "value": 1 } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::FunctionArity { function: Function::Locate, .. }));
    }

    #[test]
    fn test_malformed_document() {
        assert!(matches!(parse_query("{ not json"), Err(ValidationError::Document(_))));
        assert!(matches!(
            parse_query(r#"{ "filters": [] }"#),
            Err(ValidationError::Document(_))
        ));
    }
}
