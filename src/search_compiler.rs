//! Search backend: compiles the query IR into an Elasticsearch-style request body.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::ast::{ConditionValue, Direction, Literal, Operator, PropertyExpression, SimpleCondition, Sort};
use crate::compiler::{
    compile_filter, prepare_advanced_query, prepare_query, resolve_polarity, CompileContext,
    ConditionCompiler, Connective, Projection, QueryCompiler, QueryParts,
};
use crate::config::SchemaConfig;
use crate::error::CompileError;
use crate::native::Native;
use crate::query::{AdvancedQuery, Query};
use crate::registry::{matching_customizers, NativeTable};

const BACKEND: &str = "search";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub index: String,
    pub body: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
}

/// Mutates the request body before it is returned.
#[derive(Clone)]
pub struct SearchCustomizer(Arc<dyn Fn(&mut Map<String, Value>) + Send + Sync>);

impl SearchCustomizer {
    pub fn new(customize: impl Fn(&mut Map<String, Value>) + Send + Sync + 'static) -> Self {
        Self(Arc::new(customize))
    }
}

pub struct SearchCompiler {
    index: String,
    max_depth: usize,
    natives: NativeTable<Value>,
}

impl SearchCompiler {
    pub fn new(config: &SchemaConfig, entity: &str) -> Self {
        Self {
            index: config.table_name(entity),
            max_depth: config.max_depth,
            natives: NativeTable::new(BACKEND).register::<Value>(Value::clone),
        }
    }

    /// Field name of a bare property. Scripted functions are not translated, so every
    /// call is reported by name.
    fn field(&self, expr: &PropertyExpression) -> Result<String, CompileError> {
        match expr {
            PropertyExpression::Property(property) => Ok(property.path().to_string()),
            PropertyExpression::Call(call) => Err(CompileError::UnsupportedFunction {
                backend: BACKEND,
                function: call.function(),
            }),
        }
    }

    fn compile_parts(&self, parts: QueryParts<'_>) -> Result<SearchRequest, CompileError> {
        debug!(
            backend = BACKEND,
            index = %self.index,
            filter = parts.filter.is_some(),
            "compiling query"
        );
        if parts.group_by.is_some() {
            return Err(unsupported("GROUP BY"));
        }
        if parts.having.is_some() {
            return Err(unsupported("HAVING"));
        }

        let mut body = Map::new();
        let query = compile_filter(self, parts.filter, self.max_depth)?.unwrap_or_else(|| self.match_all());
        body.insert("query".into(), query);

        let mut columns = Vec::new();
        match parts.projection()? {
            Projection::Entity => {}
            Projection::Items(items) => {
                if parts.distinct {
                    return Err(unsupported("distinct projection"));
                }
                let mut source = Vec::with_capacity(items.len());
                for (name, expr) in &items {
                    source.push(Value::String(self.field(expr)?));
                    columns.push(name.clone());
                }
                body.insert("_source".into(), Value::Array(source));
            }
            Projection::Native(native) => {
                body.insert("_source".into(), self.natives.resolve(native)?);
            }
        }

        if !parts.sort.is_empty() {
            let mut sort = Vec::with_capacity(parts.sort.len());
            for item in parts.sort {
                match item {
                    Sort::Simple(simple) => {
                        let field = self.field(simple.effective_expression())?;
                        let order = match simple.direction() {
                            Direction::Asc => "asc",
                            Direction::Desc => "desc",
                        };
                        sort.push(json!({ field: { "order": order } }));
                    }
                    Sort::Native(native) => sort.push(self.natives.resolve(native)?),
                }
            }
            body.insert("sort".into(), Value::Array(sort));
        }

        if let Some(pagination) = parts.pagination {
            body.insert("from".into(), json!(pagination.offset()));
            body.insert("size".into(), json!(pagination.page_size()));
        }

        for customizer in matching_customizers::<SearchCustomizer>(BACKEND, parts.customizers) {
            (customizer.0)(&mut body);
        }

        Ok(SearchRequest {
            index: self.index.clone(),
            body: Value::Object(body),
            columns,
        })
    }
}

impl ConditionCompiler for SearchCompiler {
    type Filter = Value;

    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn compile_simple(&self, condition: &SimpleCondition, ctx: CompileContext) -> Result<Value, CompileError> {
        let field = self.field(condition.left())?;
        let polarity = resolve_polarity(condition.operator(), ctx.is_negated());
        let exists = json!({ "exists": { "field": field } });

        let clause = match (polarity.operator, condition.value()) {
            (_, Some(ConditionValue::Field(_))) => return Err(unsupported("field-to-field comparison")),
            (Operator::IsNull, _) => must_not(exists),
            (Operator::IsNotNull, _) => exists,
            (Operator::In, Some(ConditionValue::List(items))) => json!({ "terms": { field: literal_list(items) } }),
            (Operator::NotIn, Some(ConditionValue::List(items))) => {
                must_not(json!({ "terms": { field: literal_list(items) } }))
            }
            (Operator::Equals, Some(ConditionValue::Scalar(literal))) => {
                json!({ "term": { field: literal.to_json() } })
            }
            (Operator::NotEquals, Some(ConditionValue::Scalar(literal))) => {
                must_not(json!({ "term": { field: literal.to_json() } }))
            }
            (op, Some(ConditionValue::Scalar(literal))) => {
                let positive = if op.is_pattern() {
                    let text = literal.as_str().ok_or_else(|| {
                        CompileError::TypeMismatch(format!("{} requires a string value", op))
                    })?;
                    json!({ "wildcard": { field: { "value": wildcard(op, text), "case_insensitive": true } } })
                } else {
                    json!({ "range": { field: { range_key(op): literal.to_json() } } })
                };
                if polarity.wrapped {
                    json!({ "bool": { "filter": [exists], "must_not": [positive] } })
                } else {
                    positive
                }
            }
            (op, _) => {
                return Err(CompileError::TypeMismatch(format!(
                    "operator {} has no value",
                    op
                )))
            }
        };
        Ok(clause)
    }

    fn compile_native(&self, native: &Native) -> Result<Value, CompileError> {
        self.natives.resolve(native)
    }

    fn combine(&self, connective: Connective, parts: Vec<Value>) -> Value {
        match connective {
            Connective::And => json!({ "bool": { "must": parts } }),
            Connective::Or => json!({ "bool": { "should": parts, "minimum_should_match": 1 } }),
        }
    }

    fn match_all(&self) -> Value {
        json!({ "match_all": {} })
    }
}

impl QueryCompiler for SearchCompiler {
    type Output = SearchRequest;

    fn name(&self) -> &'static str {
        BACKEND
    }

    fn compile_query(&self, query: &Query) -> Result<SearchRequest, CompileError> {
        let query = prepare_query(query)?;
        self.compile_parts(QueryParts::of_query(&query))
    }

    fn compile_advanced_query(&self, query: &AdvancedQuery) -> Result<SearchRequest, CompileError> {
        let query = prepare_advanced_query(query)?;
        self.compile_parts(QueryParts::of_advanced(&query))
    }
}

fn unsupported(feature: &str) -> CompileError {
    CompileError::UnsupportedByBackend {
        backend: BACKEND,
        feature: feature.to_string(),
    }
}

fn must_not(clause: Value) -> Value {
    json!({ "bool": { "must_not": [clause] } })
}

fn range_key(operator: Operator) -> &'static str {
    match operator {
        Operator::GreaterThan => "gt",
        Operator::GreaterThanEquals => "gte",
        Operator::LesserThan => "lt",
        _ => "lte",
    }
}

fn literal_list(items: &[Literal]) -> Value {
    Value::Array(items.iter().map(Literal::to_json).collect())
}

fn wildcard(operator: Operator, text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    match operator {
        Operator::StartsWith => format!("{}*", escaped),
        Operator::EndsWith => format!("*{}", escaped),
        _ => format!("*{}*", escaped),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::*;
    use crate::function::Function;

    fn compiler() -> SearchCompiler {
        SearchCompiler::new(&SchemaConfig::default(), "Person")
    }

    fn compile_query(query: &Query) -> Value {
        compiler().compile_query(query).unwrap().body
    }

    #[test]
    fn test_term_and_must_not() {
        let query = Query::builder()
            .filter(and(vec![
                filter_by("lastName", Operator::Equals, "Skywalker").unwrap(),
                filter_by("planet", Operator::NotEquals, "Tatooine").unwrap(),
            ]))
            .build();
        assert_eq!(
            compile_query(&query)["query"],
            json!({ "bool": { "must": [
                { "term": { "lastName": "Skywalker" } },
                { "bool": { "must_not": [{ "term": { "planet": "Tatooine" } }] } },
            ]}})
        );
    }

    #[test]
    fn test_negated_range_keeps_exists_guard() {
        let query = Query::builder()
            .filter(not(filter_by("height", Operator::LesserThan, 150).unwrap()).unwrap())
            .build();
        assert_eq!(
            compile_query(&query)["query"],
            json!({ "bool": {
                "filter": [{ "exists": { "field": "height" } }],
                "must_not": [{ "range": { "height": { "lt": 150 } } }],
            }})
        );
    }

    #[test]
    fn test_wildcard_is_case_insensitive() {
        let query = Query::builder()
            .filter(filter_by("lastName", Operator::EndsWith, "walk*r").unwrap())
            .build();
        assert_eq!(
            compile_query(&query)["query"],
            json!({ "wildcard": { "lastName": { "value": "*walk\\*r", "case_insensitive": true } } })
        );
    }

    #[test]
    fn test_functions_are_reported_by_name() {
        let query = Query::builder()
            .filter(filter_by_expression(upper(prop("name").unwrap()).unwrap(), Operator::Equals, "LUKE").unwrap())
            .build();
        assert_eq!(
            compiler().compile_query(&query).unwrap_err(),
            CompileError::UnsupportedFunction {
                backend: "search",
                function: Function::Upper
            }
        );
    }

    #[test]
    fn test_multi_argument_call_in_sort_is_reported_by_name() {
        let locate = call(Function::Locate, vec![lit("a").into(), prop("name").unwrap().into()]).unwrap();
        let query = Query::builder()
            .sort(sort_by_expression(locate, Direction::Asc))
            .build();
        assert_eq!(
            compiler().compile_query(&query).unwrap_err(),
            CompileError::UnsupportedFunction {
                backend: "search",
                function: Function::Locate
            }
        );
    }

    #[test]
    fn test_field_reference_is_unsupported() {
        let query = Query::builder()
            .filter(filter_by("a", Operator::GreaterThan, field("b").unwrap()).unwrap())
            .build();
        assert!(matches!(
            compiler().compile_query(&query).unwrap_err(),
            CompileError::UnsupportedByBackend { backend: "search", .. }
        ));
    }

    #[test]
    fn test_source_sort_and_paging() {
        let query = Query::builder()
            .select(select_by(["firstName", "lastName"]).unwrap())
            .sort(sort_by("lastName", Direction::Asc).unwrap())
            .pagination(paged(2, 25).unwrap())
            .build();
        let request = compiler().compile_query(&query).unwrap();
        assert_eq!(request.index, "person");
        assert_eq!(request.columns, vec!["firstName", "lastName"]);
        assert_eq!(request.body["_source"], json!(["firstName", "lastName"]));
        assert_eq!(request.body["sort"], json!([{ "lastName": { "order": "asc" } }]));
        assert_eq!(request.body["from"], json!(25));
        assert_eq!(request.body["size"], json!(25));
    }

    #[test]
    fn test_group_by_is_unsupported() {
        let query = advanced_query()
            .group_by(group_by(["category"]).unwrap())
            .build()
            .unwrap();
        assert!(matches!(
            compiler().compile_advanced_query(&query).unwrap_err(),
            CompileError::UnsupportedByBackend { .. }
        ));
    }

    #[test]
    fn test_empty_filter_matches_all() {
        let query = Query::builder().filter(or(vec![])).build();
        assert_eq!(compile_query(&query)["query"], json!({ "match_all": {} }));
    }
}
