use serde_json::{json, Value};

use querity::ast::{Condition, Direction, Operator};
use querity::dsl::*;
use querity::json::{parse_advanced_query, parse_query};
use querity::memory::{MemoryBackend, MemoryCustomizer};
use querity::mongo_compiler::MongoCompiler;
use querity::query::Preprocessor;
use querity::search_compiler::SearchCompiler;
use querity::sql_compiler::{SqlCompiler, SqlCustomizer};
use querity::{CompileError, Query, QueryCompiler, SchemaConfig};

fn characters() -> MemoryBackend {
    MemoryBackend::from_json(json!([
        { "id": 1, "tenant": "rebels", "firstName": "Luke", "lastName": "Skywalker", "height": 172, "category": "jedi" },
        { "id": 2, "tenant": "rebels", "firstName": "Leia", "lastName": "Organa", "height": 150, "category": "rebel" },
        { "id": 3, "tenant": "rebels", "firstName": "Han", "lastName": "Solo", "height": 180, "category": "rebel" },
        { "id": 4, "tenant": "rebels", "firstName": "Yoda", "lastName": null, "height": 66, "category": "jedi" },
        { "id": 5, "tenant": "empire", "firstName": "Anakin", "lastName": "Skywalker", "height": 188, "category": "sith" },
        { "id": 6, "tenant": "empire", "firstName": "Tarkin", "lastName": null, "height": null, "category": "officer" },
    ]))
    .unwrap()
}

fn ids(rows: &[serde_json::Map<String, Value>]) -> Vec<i64> {
    rows.iter().filter_map(|row| row["id"].as_i64()).collect()
}

fn schema() -> SchemaConfig {
    SchemaConfig::default().with_table("Person", "people")
}

#[test]
fn test_same_query_across_backends() {
    let query = parse_query(
        r#"{
            "filter": { "and": [
                { "propertyName": "lastName", "operator": "EQUALS", "value": "Skywalker" },
                { "not": { "propertyName": "height", "operator": "LESSER_THAN", "value": 180 } }
            ]},
            "sort": [{ "propertyName": "firstName" }]
        }"#,
    )
    .unwrap();

    assert_eq!(ids(&characters().find_all(&query).unwrap()), vec![5]);

    let sql = SqlCompiler::new(schema(), "Person").compile_query(&query).unwrap().sql;
    assert!(sql.contains(r#""people"."lastName" = 'Skywalker'"#));
    assert!(sql.contains(r#""people"."height" IS NOT NULL"#));
    assert!(sql.contains(r#"ORDER BY "people"."firstName" ASC"#));

    let mongo = MongoCompiler::new(&schema(), "Person").compile_query(&query).unwrap();
    assert_eq!(mongo.collection, "people");
    assert_eq!(
        mongo.to_json()["filter"],
        json!({ "$and": [
            { "lastName": { "$eq": "Skywalker" } },
            { "height": { "$not": { "$lt": 180 }, "$ne": null } },
        ]})
    );

    let search = SearchCompiler::new(&schema(), "Person").compile_query(&query).unwrap();
    assert_eq!(search.index, "people");
    assert_eq!(search.body["query"]["bool"]["must"][0], json!({ "term": { "lastName": "Skywalker" } }));
}

#[test]
fn test_not_equals_keeps_nulls_everywhere() {
    let query = query()
        .filter(filter_by("lastName", Operator::NotEquals, "Skywalker").unwrap())
        .build();
    assert_eq!(ids(&characters().find_all(&query).unwrap()), vec![2, 3, 4, 6]);

    let sql = SqlCompiler::new(schema(), "Person").compile_query(&query).unwrap().sql;
    assert!(sql.contains(r#"OR "people"."lastName" IS NULL"#));
}

#[test]
fn test_function_support_differs_by_backend() {
    let query = query()
        .filter(filter_by_expression(upper(prop("lastName").unwrap()).unwrap(), Operator::Equals, "SOLO").unwrap())
        .build();
    assert_eq!(ids(&characters().find_all(&query).unwrap()), vec![3]);
    assert!(SqlCompiler::new(schema(), "Person").compile_query(&query).is_ok());
    assert!(MongoCompiler::new(&schema(), "Person").compile_query(&query).is_ok());
    assert!(matches!(
        SearchCompiler::new(&schema(), "Person").compile_query(&query),
        Err(CompileError::UnsupportedFunction { backend: "search", .. })
    ));
}

#[test]
fn test_grouped_projection_from_json() {
    let query = parse_advanced_query(
        r#"{
            "select": { "propertyNames": ["category"], "propertyExpressions": [
                { "function": "COUNT", "arguments": [{ "propertyName": "id" }], "alias": "total" },
                { "function": "MAX", "arguments": [{ "propertyName": "height" }], "alias": "tallest" }
            ]},
            "groupBy": { "propertyNames": ["category"] },
            "having": {
                "propertyExpression": { "function": "COUNT", "arguments": [{ "propertyName": "id" }] },
                "operator": "GREATER_THAN_EQUALS", "value": 2
            },
            "sort": [{ "propertyName": "category", "direction": "DESC" }]
        }"#,
    )
    .unwrap();

    let rows: Vec<Value> = characters()
        .find_all_projections(&query)
        .unwrap()
        .into_iter()
        .map(Value::Object)
        .collect();
    assert_eq!(
        rows,
        vec![
            json!({ "category": "rebel", "total": 2, "tallest": 180 }),
            json!({ "category": "jedi", "total": 2, "tallest": 172 }),
        ]
    );

    let sql = SqlCompiler::new(schema(), "Person").compile_advanced_query(&query).unwrap();
    assert_eq!(sql.columns, vec!["category", "total", "tallest"]);
    assert!(sql.sql.contains(r#"GROUP BY "people"."category""#));
    assert!(sql.sql.contains("HAVING"));
}

#[test]
fn test_preprocessor_injects_tenant_filter() {
    let tenant = Preprocessor::new("tenant", |query: Query| {
        let tenant = filter_by("tenant", Operator::Equals, "rebels").unwrap();
        let filter = match query.filter() {
            Some(existing) => Condition::And(vec![tenant, existing.clone()]),
            None => tenant,
        };
        query.to_builder().filter(filter).build()
    });
    let query = query()
        .filter(filter_by("category", Operator::Equals, "jedi").unwrap())
        .preprocessor(tenant)
        .build();

    assert_eq!(ids(&characters().find_all(&query).unwrap()), vec![1, 4]);
    assert_eq!(characters().count(&query).unwrap(), 2);
    let sql = SqlCompiler::new(schema(), "Person").compile_query(&query).unwrap().sql;
    assert!(sql.contains(r#""people"."tenant" = 'rebels'"#));
}

#[test]
fn test_customizers_apply_only_to_their_backend() {
    let query = query()
        .sort(sort_by("height", Direction::Desc).unwrap())
        .customizer(MemoryCustomizer::new(|rows| rows.truncate(2)))
        .customizer(SqlCustomizer::new(|select| {
            select.limit(1);
        }))
        .build();

    // DESC puts nulls first
    assert_eq!(ids(&characters().find_all(&query).unwrap()), vec![6, 5]);
    let sql = SqlCompiler::new(schema(), "Person").compile_query(&query).unwrap().sql;
    assert!(sql.ends_with("LIMIT 1"));
    assert!(MongoCompiler::new(&schema(), "Person").compile_query(&query).is_ok());
}

#[test]
fn test_pagination_and_distinct_projection() {
    let query = advanced_query()
        .select(select_by(["lastName"]).unwrap())
        .filter(is_not_null("lastName").unwrap())
        .sort(sort_by("lastName", Direction::Asc).unwrap())
        .distinct(true)
        .pagination(paged(1, 2).unwrap())
        .build()
        .unwrap();
    let rows: Vec<Value> = characters()
        .find_all_projections(&query)
        .unwrap()
        .into_iter()
        .map(Value::Object)
        .collect();
    assert_eq!(rows, vec![json!({ "lastName": "Organa" }), json!({ "lastName": "Skywalker" })]);
}

#[test]
fn test_aggregate_in_filter_is_rejected_everywhere() {
    let query = query()
        .filter(filter_by_expression(count(prop("id").unwrap()).unwrap(), Operator::GreaterThan, 1).unwrap())
        .build();
    let expected = |err: CompileError| matches!(err, CompileError::AggregateNotAllowed { .. });
    assert!(expected(characters().find_all(&query).unwrap_err()));
    assert!(expected(SqlCompiler::new(schema(), "Person").compile_query(&query).unwrap_err()));
    assert!(expected(MongoCompiler::new(&schema(), "Person").compile_query(&query).unwrap_err()));
    assert!(expected(SearchCompiler::new(&schema(), "Person").compile_query(&query).unwrap_err()));
}

#[test]
fn test_aggregate_without_group_by_yields_one_row() {
    let query = advanced_query()
        .select(select_by_expressions(vec![count(prop("id").unwrap()).unwrap().with_alias("total").into()]))
        .filter(filter_by("tenant", Operator::Equals, "rebels").unwrap())
        .build()
        .unwrap();

    let rows = characters().find_all_projections(&query).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["total"], json!(4));

    let sql = SqlCompiler::new(schema(), "Person").compile_advanced_query(&query).unwrap().sql;
    assert!(sql.starts_with(r#"SELECT COUNT("people"."id") AS "total""#));
    assert!(!sql.contains("GROUP BY"));

    let mongo = MongoCompiler::new(&schema(), "Person").compile_advanced_query(&query).unwrap();
    let pipeline = &mongo.to_json()["pipeline"];
    assert_eq!(pipeline[1]["$group"]["_id"], Value::Null);
    assert_eq!(pipeline[2]["$project"]["total"], json!("$a0"));
}

#[test]
fn test_plain_query_select_matches_sql_columns() {
    let query = query()
        .select(select_by(["firstName"]).unwrap())
        .filter(filter_by("category", Operator::Equals, "jedi").unwrap())
        .build();
    let rows: Vec<Value> = characters().find_all(&query).unwrap().into_iter().map(Value::Object).collect();
    assert_eq!(rows, vec![json!({ "firstName": "Luke" }), json!({ "firstName": "Yoda" })]);

    let sql = SqlCompiler::new(schema(), "Person").compile_query(&query).unwrap();
    assert_eq!(sql.columns, vec!["firstName"]);
}
