//! Document backend: compiles the query IR into Mongo-style filter documents and
//! aggregation pipelines, represented as `serde_json::Value`.
//!
//! Plain `property op literal` leaves use the query language directly. Leaves over
//! function calls, field-to-field comparisons and everything after a `$group` use
//! `$expr`, where null sorts below every value and needs an explicit guard.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::ast::{
    ConditionValue, Direction, FunctionArgument, FunctionCall, GroupBy, Literal, Operator,
    PropertyExpression, SimpleCondition, Sort,
};
use crate::compiler::{
    compile_filter, prepare_advanced_query, prepare_query, resolve_polarity, CompileContext,
    ConditionCompiler, Connective, Projection, QueryCompiler, QueryParts,
};
use crate::config::SchemaConfig;
use crate::error::CompileError;
use crate::function::Function;
use crate::native::Native;
use crate::query::{AdvancedQuery, Query};
use crate::registry::{fixed_args, matching_customizers, FunctionTable, NativeTable};

const BACKEND: &str = "mongo";
const SORT_KEY_PREFIX: &str = "__sort_";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum MongoCommand {
    Find {
        filter: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        sort: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        skip: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        limit: Option<u64>,
    },
    Aggregate {
        pipeline: Vec<Value>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MongoQuery {
    pub collection: String,
    #[serde(flatten)]
    pub command: MongoCommand,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
}

impl MongoQuery {
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Mutates the built command before it is returned.
#[derive(Clone)]
pub struct MongoCustomizer(Arc<dyn Fn(&mut MongoCommand) + Send + Sync>);

impl MongoCustomizer {
    pub fn new(customize: impl Fn(&mut MongoCommand) + Send + Sync + 'static) -> Self {
        Self(Arc::new(customize))
    }
}

/// Where an aggregation expression is evaluated.
enum Scope<'a> {
    Document,
    Grouped(&'a GroupScope),
}

/// Field references available after a `$group` stage.
struct GroupScope {
    /// Expression string to `$_id.gN` / `$aN`.
    fields: HashMap<String, String>,
    /// Group key is a native `_id` document; unknown properties read from it.
    native_id: bool,
}

pub struct MongoCompiler {
    collection: String,
    max_depth: usize,
    functions: FunctionTable<Value>,
    natives: NativeTable<Value>,
}

impl MongoCompiler {
    pub fn new(config: &SchemaConfig, entity: &str) -> Self {
        Self {
            collection: config.table_name(entity),
            max_depth: config.max_depth,
            functions: function_table(),
            natives: NativeTable::new(BACKEND).register::<Value>(Value::clone),
        }
    }

    fn expression(&self, expr: &PropertyExpression, scope: &Scope<'_>) -> Result<Value, CompileError> {
        if let Scope::Grouped(group) = scope {
            if let Some(field) = group.fields.get(&expr.to_expression_string()) {
                return Ok(Value::String(field.clone()));
            }
        }
        match (expr, scope) {
            (PropertyExpression::Property(property), Scope::Document) => {
                Ok(Value::String(format!("${}", property.path())))
            }
            (PropertyExpression::Property(property), Scope::Grouped(group)) if group.native_id => {
                Ok(Value::String(format!("$_id.{}", property.path())))
            }
            (PropertyExpression::Property(property), Scope::Grouped(_)) => {
                Err(CompileError::TypeMismatch(format!(
                    "property {} is neither grouped nor aggregated",
                    property.path()
                )))
            }
            (PropertyExpression::Call(call), _) => {
                let arguments = call
                    .arguments()
                    .iter()
                    .map(|argument| match argument {
                        FunctionArgument::Expression(inner) => self.expression(inner, scope),
                        FunctionArgument::Literal(literal) => Ok(literal_expr(literal)),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                self.functions.apply(call, arguments)
            }
        }
    }

    fn compile_parts(&self, parts: QueryParts<'_>) -> Result<MongoQuery, CompileError> {
        debug!(
            backend = BACKEND,
            collection = %self.collection,
            filter = parts.filter.is_some(),
            projection = parts.select.is_some() || parts.group_by.is_some(),
            "compiling query"
        );
        let document = MongoFilter {
            compiler: self,
            scope: Scope::Document,
        };
        let filter = compile_filter(&document, parts.filter, self.max_depth)?;
        let projection = parts.projection()?;

        let expression_sort = parts.sort.iter().any(|sort| {
            matches!(sort, Sort::Simple(s) if s.effective_expression().property_path().is_none())
        });
        let mut command = match projection {
            Projection::Entity if parts.group_by.is_none() && !expression_sort => {
                self.find(filter, &parts)?
            }
            _ => self.aggregate(filter, &parts, &projection)?,
        };

        for customizer in matching_customizers::<MongoCustomizer>(BACKEND, parts.customizers) {
            (customizer.0)(&mut command);
        }

        let columns = match &projection {
            Projection::Items(items) => items.iter().map(|(name, _)| name.clone()).collect(),
            _ => Vec::new(),
        };
        Ok(MongoQuery {
            collection: self.collection.clone(),
            command,
            columns,
        })
    }

    fn find(&self, filter: Option<Value>, parts: &QueryParts<'_>) -> Result<MongoCommand, CompileError> {
        let mut sort = Map::new();
        for item in parts.sort {
            match item {
                Sort::Simple(simple) => {
                    if let Some(path) = simple.effective_expression().property_path() {
                        sort.insert(path.to_string(), direction(simple.direction()));
                    }
                }
                Sort::Native(native) => merge_native_sort(&mut sort, &self.natives.resolve(native)?)?,
            }
        }
        Ok(MongoCommand::Find {
            filter: filter.unwrap_or_else(|| json!({})),
            sort: (!sort.is_empty()).then_some(Value::Object(sort)),
            skip: parts.pagination.map(|p| p.offset()).filter(|offset| *offset > 0),
            limit: parts.pagination.map(|p| p.page_size()),
        })
    }

    fn aggregate(
        &self,
        filter: Option<Value>,
        parts: &QueryParts<'_>,
        projection: &Projection<'_>,
    ) -> Result<MongoCommand, CompileError> {
        let mut pipeline = Vec::new();
        if let Some(filter) = filter {
            pipeline.push(json!({ "$match": filter }));
        }

        // aggregates without a group key fold the whole match into a single group
        let global = match projection {
            Projection::Items(items) => items.iter().any(|(_, expr)| expr.find_aggregate().is_some()),
            _ => false,
        };
        let group_scope = match parts.group_by {
            Some(group_by) => Some(self.group_stage(Some(group_by), parts, projection, &mut pipeline)?),
            None if global => Some(self.group_stage(None, parts, projection, &mut pipeline)?),
            None => None,
        };
        let scope = match &group_scope {
            Some(group) => Scope::Grouped(group),
            None => Scope::Document,
        };

        if let Some(having) = parts.having {
            let grouped = MongoFilter {
                compiler: self,
                scope: match &group_scope {
                    Some(group) => Scope::Grouped(group),
                    None => Scope::Document,
                },
            };
            if let Some(having) = compile_filter(&grouped, Some(having), self.max_depth)? {
                pipeline.push(json!({ "$match": having }));
            }
        }

        // sort keys are computed before projecting so they survive it
        let mut sort = Map::new();
        let mut sort_keys = Vec::new();
        let mut computed = Map::new();
        for (i, item) in parts.sort.iter().enumerate() {
            match item {
                Sort::Simple(simple) => {
                    let key = format!("{}{}", SORT_KEY_PREFIX, i);
                    computed.insert(key.clone(), self.expression(simple.effective_expression(), &scope)?);
                    sort.insert(key.clone(), direction(simple.direction()));
                    sort_keys.push(key);
                }
                Sort::Native(native) => merge_native_sort(&mut sort, &self.natives.resolve(native)?)?,
            }
        }

        match projection {
            Projection::Items(items) => {
                let mut project = Map::new();
                project.insert("_id".into(), json!(0));
                for (name, expr) in items {
                    project.insert(name.clone(), self.expression(expr, &scope)?);
                }
                project.extend(computed);
                pipeline.push(json!({ "$project": project }));
            }
            Projection::Native(native) => {
                let mut project = match self.natives.resolve(native)? {
                    Value::Object(map) => map,
                    _ => return Err(unsupported("non-document native projection")),
                };
                project.extend(computed);
                pipeline.push(json!({ "$project": project }));
            }
            Projection::Entity if !computed.is_empty() => {
                pipeline.push(json!({ "$addFields": computed }));
            }
            Projection::Entity => {}
        }

        if parts.distinct && !matches!(projection, Projection::Entity) {
            pipeline.push(json!({ "$group": { "_id": "$$ROOT" } }));
            pipeline.push(json!({ "$replaceRoot": { "newRoot": "$_id" } }));
        }
        if !sort.is_empty() {
            pipeline.push(json!({ "$sort": sort }));
        }
        if let Some(pagination) = parts.pagination {
            if pagination.offset() > 0 {
                pipeline.push(json!({ "$skip": pagination.offset() }));
            }
            pipeline.push(json!({ "$limit": pagination.page_size() }));
        }
        if !sort_keys.is_empty() {
            pipeline.push(json!({ "$unset": sort_keys }));
        }
        Ok(MongoCommand::Aggregate { pipeline })
    }

    /// Pushes the `$group` stage and returns the field map later stages read from.
    /// Without a group key every matched document lands in one `_id: null` group.
    fn group_stage(
        &self,
        group_by: Option<&GroupBy>,
        parts: &QueryParts<'_>,
        projection: &Projection<'_>,
        pipeline: &mut Vec<Value>,
    ) -> Result<GroupScope, CompileError> {
        let mut fields = HashMap::new();
        let mut group = Map::new();

        let native_id = match group_by {
            None => {
                group.insert("_id".into(), Value::Null);
                false
            }
            Some(group_by @ GroupBy::Simple(_)) => {
                let mut id = Map::new();
                for (i, expr) in group_by.effective_expressions().iter().enumerate() {
                    let key = format!("g{}", i);
                    id.insert(key.clone(), self.expression(expr, &Scope::Document)?);
                    fields.insert(expr.to_expression_string(), format!("$_id.{}", key));
                }
                group.insert("_id".into(), Value::Object(id));
                false
            }
            Some(GroupBy::Native(native)) => {
                group.insert("_id".into(), self.natives.resolve(native)?);
                true
            }
        };

        let mut aggregates: Vec<&FunctionCall> = Vec::new();
        if let Projection::Items(items) = projection {
            aggregates.extend(items.iter().flat_map(|(_, expr)| expr.aggregate_calls()));
        }
        for simple in parts.having.into_iter().flat_map(crate::compiler::simple_conditions) {
            aggregates.extend(simple.left().aggregate_calls());
        }

        for call in aggregates {
            let key = call.to_expression_string();
            if fields.contains_key(&key) {
                continue;
            }
            let name = format!("a{}", group.len() - 1);
            let accumulator = self.expression(&PropertyExpression::Call(call.clone()), &Scope::Document)?;
            group.insert(name.clone(), accumulator);
            fields.insert(key, format!("${}", name));
        }

        pipeline.push(json!({ "$group": group }));
        Ok(GroupScope { fields, native_id })
    }
}

impl QueryCompiler for MongoCompiler {
    type Output = MongoQuery;

    fn name(&self) -> &'static str {
        BACKEND
    }

    fn compile_query(&self, query: &Query) -> Result<MongoQuery, CompileError> {
        let query = prepare_query(query)?;
        self.compile_parts(QueryParts::of_query(&query))
    }

    fn compile_advanced_query(&self, query: &AdvancedQuery) -> Result<MongoQuery, CompileError> {
        let query = prepare_advanced_query(query)?;
        self.compile_parts(QueryParts::of_advanced(&query))
    }
}

/// Condition compiler bound to an evaluation scope.
struct MongoFilter<'a> {
    compiler: &'a MongoCompiler,
    scope: Scope<'a>,
}

impl MongoFilter<'_> {
    /// `{path: {...}}` form, only for a bare document property against a literal.
    fn query_leaf(
        &self,
        path: &str,
        operator: Operator,
        wrapped: bool,
        value: Option<&ConditionValue>,
    ) -> Result<Value, CompileError> {
        let clause = match (operator, value) {
            (Operator::IsNull, _) => json!({ "$eq": null }),
            (Operator::IsNotNull, _) => json!({ "$ne": null }),
            (Operator::In, Some(ConditionValue::List(items))) => json!({ "$in": literal_list(items) }),
            (Operator::NotIn, Some(ConditionValue::List(items))) => json!({ "$nin": literal_list(items) }),
            (op, Some(ConditionValue::Scalar(literal))) if op.is_pattern() => {
                let text = pattern_text(op, literal)?;
                json!({ "$regex": regex_pattern(op, text), "$options": "i" })
            }
            (op, Some(ConditionValue::Scalar(literal))) => {
                json!({ comparison_operator(op): literal.to_json() })
            }
            (op, _) => {
                return Err(CompileError::TypeMismatch(format!(
                    "operator {} has no value",
                    op
                )))
            }
        };
        let clause = if wrapped {
            json!({ "$not": clause, "$ne": null })
        } else {
            clause
        };
        Ok(json!({ path: clause }))
    }

    /// `{$expr: ...}` form over aggregation expressions.
    fn expr_leaf(
        &self,
        condition: &SimpleCondition,
        operator: Operator,
        wrapped: bool,
    ) -> Result<Value, CompileError> {
        let left = self.compiler.expression(condition.left(), &self.scope)?;
        let expr = match condition.value() {
            None if operator == Operator::IsNull => json!({ "$lte": [left, null] }),
            None => present(&left),
            Some(ConditionValue::List(items)) => {
                let contained = json!({ "$in": [left, literal_list(items)] });
                match operator {
                    Operator::In => json!({ "$and": [present(&left), contained] }),
                    _ => json!({ "$not": [contained] }),
                }
            }
            Some(ConditionValue::Scalar(literal)) if operator.is_pattern() => {
                let text = pattern_text(operator, literal)?;
                let matched = json!({ "$regexMatch": {
                    "input": left,
                    "regex": regex_pattern(operator, text),
                    "options": "i",
                }});
                let matched = if wrapped { json!({ "$not": [matched] }) } else { matched };
                json!({ "$and": [present(&left), matched] })
            }
            Some(value) => {
                let right = match value {
                    ConditionValue::Field(field) => {
                        let reference = PropertyExpression::property(field.path())
                            .map_err(|e| CompileError::TypeMismatch(e.to_string()))?;
                        self.compiler.expression(&reference, &self.scope)?
                    }
                    ConditionValue::Scalar(literal) => literal_expr(literal),
                    ConditionValue::List(_) => Value::Null,
                };
                let guard = json!({ "$and": [present(&left), present(&right)] });
                let equal = json!({ "$and": [guard.clone(), { "$eq": [left, right] }] });
                match operator {
                    Operator::Equals => equal,
                    Operator::NotEquals => json!({ "$not": [equal] }),
                    op => {
                        let compared = json!({ comparison_operator(op): [left, right] });
                        let compared = if wrapped { json!({ "$not": [compared] }) } else { compared };
                        json!({ "$and": [guard, compared] })
                    }
                }
            }
        };
        Ok(json!({ "$expr": expr }))
    }
}

impl ConditionCompiler for MongoFilter<'_> {
    type Filter = Value;

    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn compile_simple(&self, condition: &SimpleCondition, ctx: CompileContext) -> Result<Value, CompileError> {
        let polarity = resolve_polarity(condition.operator(), ctx.is_negated());
        let field_value = matches!(condition.value(), Some(ConditionValue::Field(_)));
        match (condition.left().property_path(), &self.scope) {
            (Some(path), Scope::Document) if !field_value => {
                self.query_leaf(path, polarity.operator, polarity.wrapped, condition.value())
            }
            _ => self.expr_leaf(condition, polarity.operator, polarity.wrapped),
        }
    }

    fn compile_native(&self, native: &Native) -> Result<Value, CompileError> {
        self.compiler.natives.resolve(native)
    }

    fn combine(&self, connective: Connective, parts: Vec<Value>) -> Value {
        match connective {
            Connective::And => json!({ "$and": parts }),
            Connective::Or => json!({ "$or": parts }),
        }
    }

    fn match_all(&self) -> Value {
        json!({})
    }
}

fn unsupported(feature: &str) -> CompileError {
    CompileError::UnsupportedByBackend {
        backend: BACKEND,
        feature: feature.to_string(),
    }
}

/// Aggregation-expression not-null guard.
fn present(expr: &Value) -> Value {
    json!({ "$gt": [expr, null] })
}

fn comparison_operator(operator: Operator) -> &'static str {
    match operator {
        Operator::NotEquals => "$ne",
        Operator::GreaterThan => "$gt",
        Operator::GreaterThanEquals => "$gte",
        Operator::LesserThan => "$lt",
        Operator::LesserThanEquals => "$lte",
        _ => "$eq",
    }
}

fn direction(direction: Direction) -> Value {
    match direction {
        Direction::Asc => json!(1),
        Direction::Desc => json!(-1),
    }
}

fn merge_native_sort(sort: &mut Map<String, Value>, native: &Value) -> Result<(), CompileError> {
    match native {
        Value::Object(keys) => {
            sort.extend(keys.clone());
            Ok(())
        }
        _ => Err(unsupported("non-document native sort")),
    }
}

fn literal_list(items: &[Literal]) -> Value {
    Value::Array(items.iter().map(Literal::to_json).collect())
}

/// Literal inside an aggregation expression; `$`-prefixed strings would read as paths.
fn literal_expr(literal: &Literal) -> Value {
    match literal {
        Literal::String(s) if s.starts_with('$') => json!({ "$literal": s }),
        other => other.to_json(),
    }
}

fn pattern_text(operator: Operator, literal: &Literal) -> Result<&str, CompileError> {
    literal
        .as_str()
        .ok_or_else(|| CompileError::TypeMismatch(format!("{} requires a string value", operator)))
}

fn regex_pattern(operator: Operator, text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if "\\^$.|?*+()[]{}".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    match operator {
        Operator::StartsWith => format!("^{}", escaped),
        Operator::EndsWith => format!("{}$", escaped),
        _ => escaped,
    }
}

fn function_table() -> FunctionTable<Value> {
    FunctionTable::empty(BACKEND)
        .with(Function::Abs, |call, args| unary("$abs", call, args))
        .with(Function::Sqrt, |call, args| unary("$sqrt", call, args))
        .with(Function::Mod, |_, args| Ok(json!({ "$mod": args })))
        .with(Function::Concat, |_, args| Ok(json!({ "$concat": args })))
        .with(Function::Substring, substring)
        .with(Function::Trim, |call, args| trim("$trim", call, args))
        .with(Function::Ltrim, |call, args| trim("$ltrim", call, args))
        .with(Function::Rtrim, |call, args| trim("$rtrim", call, args))
        .with(Function::Length, |call, args| unary("$strLenCP", call, args))
        .with(Function::Locate, locate)
        .with(Function::Lower, |call, args| unary("$toLower", call, args))
        .with(Function::Upper, |call, args| unary("$toUpper", call, args))
        .with(Function::CurrentDate, |_, _| {
            Ok(json!({ "$dateTrunc": { "date": "$$NOW", "unit": "day" } }))
        })
        .with(Function::CurrentTime, |_, _| {
            Ok(json!({ "$dateToString": { "format": "%H:%M:%S", "date": "$$NOW" } }))
        })
        .with(Function::CurrentTimestamp, |_, _| Ok(json!("$$NOW")))
        .with(Function::Coalesce, coalesce)
        .with(Function::Nullif, nullif)
        .with(Function::Count, count)
        .with(Function::Sum, |call, args| unary("$sum", call, args))
        .with(Function::Avg, |call, args| unary("$avg", call, args))
        .with(Function::Min, |call, args| unary("$min", call, args))
        .with(Function::Max, |call, args| unary("$max", call, args))
}

fn unary(operator: &str, call: &FunctionCall, args: Vec<Value>) -> Result<Value, CompileError> {
    let [arg] = fixed_args(call, args)?;
    Ok(json!({ operator: arg }))
}

fn trim(operator: &str, call: &FunctionCall, args: Vec<Value>) -> Result<Value, CompileError> {
    let [input] = fixed_args(call, args)?;
    Ok(json!({ operator: { "input": input } }))
}

/// One-based start normalised to `$substrCP`'s zero-based index.
fn substring(call: &FunctionCall, args: Vec<Value>) -> Result<Value, CompileError> {
    let [text, start, length] = fixed_args(call, args)?;
    Ok(json!({ "$substrCP": [text, { "$subtract": [start, 1] }, length] }))
}

/// `$indexOfCP` takes the haystack first and answers -1 when absent.
fn locate(call: &FunctionCall, args: Vec<Value>) -> Result<Value, CompileError> {
    let [needle, haystack] = fixed_args(call, args)?;
    Ok(json!({ "$add": [{ "$indexOfCP": [haystack, needle] }, 1] }))
}

fn coalesce(_: &FunctionCall, mut args: Vec<Value>) -> Result<Value, CompileError> {
    if args.len() == 1 {
        return Ok(args.remove(0));
    }
    Ok(json!({ "$ifNull": args }))
}

fn nullif(call: &FunctionCall, args: Vec<Value>) -> Result<Value, CompileError> {
    let [first, second] = fixed_args(call, args)?;
    Ok(json!({ "$cond": [{ "$eq": [first.clone(), second] }, null, first] }))
}

/// Counts non-null values, like SQL `COUNT(x)`.
fn count(call: &FunctionCall, args: Vec<Value>) -> Result<Value, CompileError> {
    let [arg] = fixed_args(call, args)?;
    Ok(json!({ "$sum": { "$cond": [present(&arg), 1, 0] } }))
}
