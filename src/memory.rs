//! In-memory reference backend over `serde_json` documents.
//!
//! Conditions compile to closures once per query; negation is resolved during
//! compilation, so the evaluated predicate tree never contains a NOT node. Null
//! handling matches the relational backend: EQUALS is false on null, NOT_EQUALS is
//! true on null, comparisons and patterns never match null, and nulls sort last
//! ascending.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::ast::{
    ConditionValue, Direction, FunctionArgument, FunctionCall, GroupBy, Literal, Operator,
    PropertyExpression, SimpleCondition, Sort,
};
use crate::compiler::{
    compile_filter, prepare_advanced_query, prepare_query, resolve_polarity, CompileContext,
    ConditionCompiler, Connective, Projection, QueryParts, DEFAULT_MAX_DEPTH,
};
use crate::error::{CompileError, ValidationError};
use crate::function::Function;
use crate::native::Native;
use crate::query::{AdvancedQuery, Query};
use crate::registry::{fixed_args, matching_customizers, FunctionTable, NativeTable};

const BACKEND: &str = "memory";

pub type Document = Map<String, Value>;

/// The row being evaluated plus the group it belongs to (itself when ungrouped).
pub struct Rows<'a> {
    current: &'a Document,
    group: &'a [&'a Document],
}

type Eval = Arc<dyn Fn(&Rows<'_>) -> Value + Send + Sync>;
type Test = Arc<dyn Fn(&Rows<'_>) -> bool + Send + Sync>;
type Comparator = Arc<dyn Fn(&Document, &Document) -> Ordering + Send + Sync>;

fn eval(f: impl Fn(&Rows<'_>) -> Value + Send + Sync + 'static) -> Eval {
    Arc::new(f)
}

fn test(f: impl Fn(&Rows<'_>) -> bool + Send + Sync + 'static) -> Test {
    Arc::new(f)
}

fn with_single<R>(doc: &Document, f: impl FnOnce(&Rows<'_>) -> R) -> R {
    let group = [doc];
    f(&Rows {
        current: doc,
        group: &group,
    })
}

/// Native condition payload.
#[derive(Clone)]
pub struct MemoryFilter(pub Arc<dyn Fn(&Document) -> bool + Send + Sync>);

impl MemoryFilter {
    pub fn new(f: impl Fn(&Document) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }
}

/// Native sort payload.
#[derive(Clone)]
pub struct MemorySort(pub Comparator);

impl MemorySort {
    pub fn new(f: impl Fn(&Document, &Document) -> Ordering + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }
}

/// Adjusts the result rows before they are returned.
#[derive(Clone)]
pub struct MemoryCustomizer(Arc<dyn Fn(&mut Vec<Document>) + Send + Sync>);

impl MemoryCustomizer {
    pub fn new(f: impl Fn(&mut Vec<Document>) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }
}

enum SortKey {
    /// Index into the precomputed sort values of a candidate.
    Value(usize, Direction),
    Native(Comparator),
}

struct Candidate<'a> {
    current: &'a Document,
    keys: Vec<Value>,
    output: Document,
}

pub struct MemoryBackend {
    documents: Vec<Document>,
    max_depth: usize,
    functions: FunctionTable<Eval>,
    native_filters: NativeTable<Test>,
    native_sorts: NativeTable<Comparator>,
}

impl MemoryBackend {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents,
            max_depth: DEFAULT_MAX_DEPTH,
            functions: function_table(),
            native_filters: NativeTable::new(BACKEND).register::<MemoryFilter>(|filter| {
                let filter = Arc::clone(&filter.0);
                test(move |rows| filter(rows.current))
            }),
            native_sorts: NativeTable::new(BACKEND).register::<MemorySort>(|sort| Arc::clone(&sort.0)),
        }
    }

    /// Every element of a JSON array must be an object.
    pub fn from_json(value: Value) -> Result<Self, ValidationError> {
        let Value::Array(items) = value else {
            return Err(ValidationError::Document("expected an array of objects".into()));
        };
        let documents = items
            .into_iter()
            .map(|item| match item {
                Value::Object(doc) => Ok(doc),
                other => Err(ValidationError::Document(format!("not an object: {}", other))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(documents))
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn find_all(&self, query: &Query) -> Result<Vec<Document>, CompileError> {
        let query = prepare_query(query)?;
        let parts = QueryParts::of_query(&query);
        debug!(backend = BACKEND, filter = parts.filter.is_some(), "evaluating query");

        // a select narrows each document to its aliased items, one row per document
        let items = match parts.projection()? {
            Projection::Entity => None,
            Projection::Items(items) => Some(
                items
                    .iter()
                    .map(|(name, expr)| Ok((name.clone(), self.expression(expr)?)))
                    .collect::<Result<Vec<_>, CompileError>>()?,
            ),
            Projection::Native(native) => return Err(unsupported_native(native)),
        };

        let filter = compile_filter(self, parts.filter, self.max_depth)?;
        let sort_evals = self.sort_evals(parts.sort)?;
        let candidates = self
            .documents
            .iter()
            .filter(|doc| passes(filter.as_ref(), doc))
            .map(|doc| Candidate {
                current: doc,
                keys: with_single(doc, |rows| sort_evals.values(rows)),
                output: match &items {
                    Some(items) => with_single(doc, |rows| {
                        items.iter().map(|(name, item)| (name.clone(), item(rows))).collect()
                    }),
                    None => doc.clone(),
                },
            })
            .collect();
        Ok(self.finish(candidates, &sort_evals.keys, &parts))
    }

    /// Number of matching documents, ignoring sort and pagination.
    pub fn count(&self, query: &Query) -> Result<usize, CompileError> {
        let query = prepare_query(query)?;
        let filter = compile_filter(self, query.filter().filter(|f| !f.is_empty()), self.max_depth)?;
        Ok(self
            .documents
            .iter()
            .filter(|doc| passes(filter.as_ref(), doc))
            .count())
    }

    /// Rows keyed by alias, keys in select-list order.
    pub fn find_all_projections(&self, query: &AdvancedQuery) -> Result<Vec<Document>, CompileError> {
        let query = prepare_advanced_query(query)?;
        let parts = QueryParts::of_advanced(&query);
        debug!(
            backend = BACKEND,
            filter = parts.filter.is_some(),
            grouped = parts.group_by.is_some(),
            "evaluating projection"
        );

        let items = match parts.projection()? {
            Projection::Items(items) => items,
            Projection::Native(native) => return Err(unsupported_native(native)),
            Projection::Entity => {
                return Err(CompileError::UnsupportedByBackend {
                    backend: BACKEND,
                    feature: "projection without select".into(),
                })
            }
        };
        let items = items
            .iter()
            .map(|(name, expr)| Ok((name.clone(), self.expression(expr)?)))
            .collect::<Result<Vec<_>, CompileError>>()?;

        let filter = compile_filter(self, parts.filter, self.max_depth)?;
        let matched: Vec<&Document> = self
            .documents
            .iter()
            .filter(|doc| passes(filter.as_ref(), doc))
            .collect();

        let aggregated = parts.having.is_some()
            || parts
                .select
                .map(|s| s.effective_expressions())
                .unwrap_or_default()
                .iter()
                .any(|expr| expr.find_aggregate().is_some());
        let groups: Vec<Vec<&Document>> = match parts.group_by {
            Some(GroupBy::Native(native)) => return Err(unsupported_native(native)),
            Some(group_by) => self.group(group_by, matched)?,
            None if aggregated => vec![matched],
            None => matched.into_iter().map(|doc| vec![doc]).collect(),
        };

        let having = compile_filter(self, parts.having, self.max_depth)?;
        let sort_evals = self.sort_evals(parts.sort)?;
        let empty = Document::new();
        let mut candidates = Vec::with_capacity(groups.len());
        for group in &groups {
            let current = group.first().copied().unwrap_or(&empty);
            let rows = Rows { current, group };
            if !having.as_ref().map_or(true, |h| h(&rows)) {
                continue;
            }
            let output = items
                .iter()
                .map(|(name, item)| (name.clone(), item(&rows)))
                .collect();
            candidates.push(Candidate {
                current,
                keys: sort_evals.values(&rows),
                output,
            });
        }
        Ok(self.finish(candidates, &sort_evals.keys, &parts))
    }

    fn group<'a>(
        &self,
        group_by: &GroupBy,
        rows: Vec<&'a Document>,
    ) -> Result<Vec<Vec<&'a Document>>, CompileError> {
        let keys = group_by
            .effective_expressions()
            .iter()
            .map(|expr| self.expression(expr))
            .collect::<Result<Vec<_>, _>>()?;
        // Value is not hashable; groups stay in first-appearance order
        let mut groups: Vec<(Vec<Value>, Vec<&'a Document>)> = Vec::new();
        for doc in rows {
            let key: Vec<Value> = with_single(doc, |r| keys.iter().map(|k| k(r)).collect());
            match groups.iter_mut().find(|(existing, _)| *existing == key) {
                Some((_, members)) => members.push(doc),
                None => groups.push((key, vec![doc])),
            }
        }
        Ok(groups.into_iter().map(|(_, members)| members).collect())
    }

    fn sort_evals(&self, sorts: &[Sort]) -> Result<SortEvals, CompileError> {
        let mut evals = Vec::new();
        let mut keys = Vec::with_capacity(sorts.len());
        for sort in sorts {
            match sort {
                Sort::Simple(simple) => {
                    keys.push(SortKey::Value(evals.len(), simple.direction()));
                    evals.push(self.expression(simple.effective_expression())?);
                }
                Sort::Native(native) => keys.push(SortKey::Native(self.native_sorts.resolve(native)?)),
            }
        }
        Ok(SortEvals { evals, keys })
    }

    fn finish(&self, mut candidates: Vec<Candidate<'_>>, keys: &[SortKey], parts: &QueryParts<'_>) -> Vec<Document> {
        if parts.distinct {
            let mut unique: Vec<Candidate<'_>> = Vec::with_capacity(candidates.len());
            for candidate in candidates {
                if !unique.iter().any(|u| u.output == candidate.output) {
                    unique.push(candidate);
                }
            }
            candidates = unique;
        }
        if !keys.is_empty() {
            candidates.sort_by(|a, b| {
                keys.iter()
                    .map(|key| match key {
                        SortKey::Value(i, direction) => {
                            let ordering = sort_order(&a.keys[*i], &b.keys[*i]);
                            match direction {
                                Direction::Asc => ordering,
                                Direction::Desc => ordering.reverse(),
                            }
                        }
                        SortKey::Native(compare) => compare(a.current, b.current),
                    })
                    .find(|ordering| *ordering != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }
        let mut rows: Vec<Document> = match parts.pagination {
            Some(pagination) => candidates
                .into_iter()
                .skip(usize::try_from(pagination.offset()).unwrap_or(usize::MAX))
                .take(usize::try_from(pagination.page_size()).unwrap_or(usize::MAX))
                .map(|c| c.output)
                .collect(),
            None => candidates.into_iter().map(|c| c.output).collect(),
        };
        for customizer in matching_customizers::<MemoryCustomizer>(BACKEND, parts.customizers) {
            (customizer.0)(&mut rows);
        }
        rows
    }

    fn expression(&self, expr: &PropertyExpression) -> Result<Eval, CompileError> {
        match expr {
            PropertyExpression::Property(property) => {
                let path = property.path().to_string();
                Ok(eval(move |rows| lookup(rows.current, &path)))
            }
            PropertyExpression::Call(call) => {
                let arguments = call
                    .arguments()
                    .iter()
                    .map(|argument| match argument {
                        FunctionArgument::Expression(inner) => self.expression(inner),
                        FunctionArgument::Literal(literal) => {
                            let value = literal.to_json();
                            Ok(eval(move |_| value.clone()))
                        }
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                self.functions.apply(call, arguments)
            }
        }
    }
}

struct SortEvals {
    evals: Vec<Eval>,
    keys: Vec<SortKey>,
}

impl SortEvals {
    fn values(&self, rows: &Rows<'_>) -> Vec<Value> {
        self.evals.iter().map(|e| e(rows)).collect()
    }
}

fn passes(filter: Option<&Test>, doc: &Document) -> bool {
    filter.map_or(true, |f| with_single(doc, |rows| f(rows)))
}

fn unsupported_native(native: &Native) -> CompileError {
    CompileError::UnsupportedNative {
        backend: BACKEND,
        type_name: native.type_name(),
    }
}

impl ConditionCompiler for MemoryBackend {
    type Filter = Test;

    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn compile_simple(&self, condition: &SimpleCondition, ctx: CompileContext) -> Result<Test, CompileError> {
        let left = self.expression(condition.left())?;
        let polarity = resolve_polarity(condition.operator(), ctx.is_negated());
        let (operator, wrapped) = (polarity.operator, polarity.wrapped);

        let predicate = match condition.value() {
            None => {
                let want_null = operator == Operator::IsNull;
                test(move |rows| left(rows).is_null() == want_null)
            }
            Some(ConditionValue::List(items)) => {
                let items: Vec<Value> = items.iter().map(Literal::to_json).collect();
                let negated = operator == Operator::NotIn;
                test(move |rows| {
                    let value = left(rows);
                    let contained = items.iter().any(|item| equal(&value, item));
                    contained != negated
                })
            }
            Some(ConditionValue::Scalar(literal)) if operator.is_pattern() => {
                let needle = literal
                    .as_str()
                    .ok_or_else(|| CompileError::TypeMismatch(format!("{} requires a string value", operator)))?
                    .to_lowercase();
                test(move |rows| {
                    let value = left(rows);
                    if value.is_null() {
                        return false;
                    }
                    let matched = value
                        .as_str()
                        .is_some_and(|text| pattern_matches(operator, &text.to_lowercase(), &needle));
                    matched != wrapped
                })
            }
            Some(value) => {
                let right = match value {
                    ConditionValue::Field(field) => {
                        let path = field.path().to_string();
                        eval(move |rows| lookup(rows.current, &path))
                    }
                    ConditionValue::Scalar(literal) => {
                        let literal = literal.to_json();
                        eval(move |_| literal.clone())
                    }
                    ConditionValue::List(_) => eval(|_| Value::Null),
                };
                test(move |rows| {
                    let (l, r) = (left(rows), right(rows));
                    let both = !l.is_null() && !r.is_null();
                    match operator {
                        Operator::Equals => both && equal(&l, &r),
                        Operator::NotEquals => !(both && equal(&l, &r)),
                        op => both && (compare_matches(op, &l, &r) != wrapped),
                    }
                })
            }
        };
        Ok(predicate)
    }

    fn compile_native(&self, native: &Native) -> Result<Test, CompileError> {
        self.native_filters.resolve(native)
    }

    fn combine(&self, connective: Connective, parts: Vec<Test>) -> Test {
        match connective {
            Connective::And => test(move |rows| parts.iter().all(|p| p(rows))),
            Connective::Or => test(move |rows| parts.iter().any(|p| p(rows))),
        }
    }

    fn match_all(&self) -> Test {
        test(|_| true)
    }
}

/// Dotted lookup through nested objects; anything missing is null.
pub fn lookup(doc: &Document, path: &str) -> Value {
    let mut segments = path.split('.');
    let mut current = segments.next().and_then(|first| doc.get(first));
    for segment in segments {
        current = current.and_then(|value| value.get(segment));
    }
    current.cloned().unwrap_or(Value::Null)
}

/// Ordering between two non-null values of the same kind.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(i), Some(j)) => Some(i.cmp(&j)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Some(Ordering::Equal)
}

fn compare_matches(operator: Operator, a: &Value, b: &Value) -> bool {
    let Some(ordering) = compare_values(a, b) else {
        return false;
    };
    match operator {
        Operator::GreaterThan => ordering == Ordering::Greater,
        Operator::GreaterThanEquals => ordering != Ordering::Less,
        Operator::LesserThan => ordering == Ordering::Less,
        Operator::LesserThanEquals => ordering != Ordering::Greater,
        _ => ordering == Ordering::Equal,
    }
}

/// Nulls compare greater than any value.
fn sort_order(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => compare_values(a, b).unwrap_or(Ordering::Equal),
    }
}

fn pattern_matches(operator: Operator, haystack: &str, needle: &str) -> bool {
    match operator {
        Operator::StartsWith => haystack.starts_with(needle),
        Operator::EndsWith => haystack.ends_with(needle),
        _ => haystack.contains(needle),
    }
}

fn number(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn map1(call: &FunctionCall, args: Vec<Eval>, f: fn(&Value) -> Value) -> Result<Eval, CompileError> {
    let [arg] = fixed_args(call, args)?;
    Ok(eval(move |rows| f(&arg(rows))))
}

fn map_text(call: &FunctionCall, args: Vec<Eval>, f: fn(&str) -> Value) -> Result<Eval, CompileError> {
    let [arg] = fixed_args(call, args)?;
    Ok(eval(move |rows| match arg(rows) {
        Value::String(s) => f(&s),
        _ => Value::Null,
    }))
}

fn now(format: &'static str) -> Eval {
    eval(move |_| Value::String(Utc::now().format(format).to_string()))
}

/// Aggregates evaluate their argument once per row of the group.
fn aggregate(call: &FunctionCall, args: Vec<Eval>, reduce: fn(Vec<Value>) -> Value) -> Result<Eval, CompileError> {
    let [arg] = fixed_args(call, args)?;
    Ok(eval(move |rows| {
        let values = rows
            .group
            .iter()
            .map(|doc| with_single(doc, |single| arg(single)))
            .filter(|value| !value.is_null())
            .collect();
        reduce(values)
    }))
}

fn function_table() -> FunctionTable<Eval> {
    FunctionTable::empty(BACKEND)
        .with(Function::Abs, |call, args| {
            map1(call, args, |v| match v.as_i64() {
                Some(i) => i.checked_abs().map(Value::from).unwrap_or(Value::Null),
                None => v.as_f64().map(|f| number(f.abs())).unwrap_or(Value::Null),
            })
        })
        .with(Function::Sqrt, |call, args| {
            map1(call, args, |v| match v.as_f64() {
                Some(f) if f >= 0.0 => number(f.sqrt()),
                _ => Value::Null,
            })
        })
        .with(Function::Mod, modulo)
        .with(Function::Concat, |_, args| {
            Ok(eval(move |rows| {
                let mut out = String::new();
                for arg in &args {
                    match text(&arg(rows)) {
                        Some(part) => out.push_str(&part),
                        None => return Value::Null,
                    }
                }
                Value::String(out)
            }))
        })
        .with(Function::Substring, substring)
        .with(Function::Trim, |call, args| map_text(call, args, |s| Value::from(s.trim_matches(' '))))
        .with(Function::Ltrim, |call, args| map_text(call, args, |s| Value::from(s.trim_start_matches(' '))))
        .with(Function::Rtrim, |call, args| map_text(call, args, |s| Value::from(s.trim_end_matches(' '))))
        .with(Function::Length, |call, args| map_text(call, args, |s| Value::from(s.chars().count())))
        .with(Function::Locate, locate)
        .with(Function::Lower, |call, args| map_text(call, args, |s| Value::from(s.to_lowercase())))
        .with(Function::Upper, |call, args| map_text(call, args, |s| Value::from(s.to_uppercase())))
        .with(Function::CurrentDate, |_, _| Ok(now("%Y-%m-%d")))
        .with(Function::CurrentTime, |_, _| Ok(now("%H:%M:%S")))
        .with(Function::CurrentTimestamp, |_, _| Ok(now("%Y-%m-%dT%H:%M:%S")))
        .with(Function::Coalesce, |_, args| {
            Ok(eval(move |rows| {
                args.iter()
                    .map(|arg| arg(rows))
                    .find(|value| !value.is_null())
                    .unwrap_or(Value::Null)
            }))
        })
        .with(Function::Nullif, |call, args| {
            let [first, second] = fixed_args(call, args)?;
            Ok(eval(move |rows| {
                let value = first(rows);
                if equal(&value, &second(rows)) {
                    Value::Null
                } else {
                    value
                }
            }))
        })
        .with(Function::Count, |call, args| aggregate(call, args, |values| Value::from(values.len())))
        .with(Function::Sum, |call, args| aggregate(call, args, sum_numbers))
        .with(Function::Avg, |call, args| {
            aggregate(call, args, |values| {
                let numbers: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
                if numbers.is_empty() {
                    return Value::Null;
                }
                number(numbers.iter().sum::<f64>() / numbers.len() as f64)
            })
        })
        .with(Function::Min, |call, args| aggregate(call, args, |values| extreme(values, Ordering::Less)))
        .with(Function::Max, |call, args| aggregate(call, args, |values| extreme(values, Ordering::Greater)))
}

fn modulo(call: &FunctionCall, args: Vec<Eval>) -> Result<Eval, CompileError> {
    let [a, b] = fixed_args(call, args)?;
    Ok(eval(move |rows| match (a(rows), b(rows)) {
        (x, y) if x.is_i64() && y.is_i64() => match (x.as_i64(), y.as_i64()) {
            (Some(i), Some(j)) => i.checked_rem(j).map(Value::from).unwrap_or(Value::Null),
            _ => Value::Null,
        },
        (x, y) => match (x.as_f64(), y.as_f64()) {
            (Some(i), Some(j)) if j != 0.0 => number(i % j),
            _ => Value::Null,
        },
    }))
}

/// One-based start; characters before position 1 consume length, as in SQL.
fn substring(call: &FunctionCall, args: Vec<Eval>) -> Result<Eval, CompileError> {
    let [source, start, length] = fixed_args(call, args)?;
    Ok(eval(move |rows| {
        let (Some(s), Some(start), Some(length)) = (
            source(rows).as_str().map(str::to_string),
            start(rows).as_i64(),
            length(rows).as_i64(),
        ) else {
            return Value::Null;
        };
        let end = start.saturating_add(length.max(0));
        let from = start.max(1);
        if end <= from {
            return Value::from("");
        }
        let taken: String = s
            .chars()
            .skip((from - 1) as usize)
            .take((end - from) as usize)
            .collect();
        Value::String(taken)
    }))
}

/// `LOCATE(needle, haystack)`: one-based character position, 0 when absent.
fn locate(call: &FunctionCall, args: Vec<Eval>) -> Result<Eval, CompileError> {
    let [needle, haystack] = fixed_args(call, args)?;
    Ok(eval(move |rows| match (needle(rows), haystack(rows)) {
        (Value::String(needle), Value::String(haystack)) => {
            let position = haystack
                .find(&needle)
                .map(|byte| haystack[..byte].chars().count() + 1)
                .unwrap_or(0);
            Value::from(position)
        }
        _ => Value::Null,
    }))
}

fn sum_numbers(values: Vec<Value>) -> Value {
    if values.is_empty() {
        return Value::Null;
    }
    if values.iter().all(Value::is_i64) {
        let total: Option<i64> = values
            .iter()
            .filter_map(Value::as_i64)
            .try_fold(0i64, |acc, n| acc.checked_add(n));
        if let Some(total) = total {
            return Value::from(total);
        }
    }
    number(values.iter().filter_map(Value::as_f64).sum())
}

fn extreme(values: Vec<Value>, wanted: Ordering) -> Value {
    values
        .into_iter()
        .reduce(|best, value| {
            if compare_values(&value, &best) == Some(wanted) {
                value
            } else {
                best
            }
        })
        .unwrap_or(Value::Null)
}
