//! The backend-neutral query IR: expressions, conditions, projections and ordering.
//!
//! Every value here is validated when it is built and immutable afterwards, so a
//! backend compiler never has to re-check an invariant.

use std::fmt;

use crate::error::{CompileError, ValidationError};
use crate::function::Function;
use crate::native::Native;

/// A scalar constant: string, number or boolean.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl Literal {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Literal::Integer(n) => Some(*n as f64),
            Literal::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Literal::String(s) => serde_json::Value::String(s.clone()),
            Literal::Integer(n) => serde_json::Value::from(*n),
            Literal::Float(n) => serde_json::Value::from(*n),
            Literal::Boolean(b) => serde_json::Value::Bool(*b),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Literal::Integer(n) => write!(f, "{}", n),
            Literal::Float(n) => write!(f, "{}", n),
            Literal::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::String(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::String(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Integer(value)
    }
}

impl From<i32> for Literal {
    fn from(value: i32) -> Self {
        Literal::Integer(value.into())
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Float(value)
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Boolean(value)
    }
}

impl TryFrom<&serde_json::Value> for Literal {
    type Error = ValidationError;

    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::String(s) => Ok(Literal::String(s.clone())),
            serde_json::Value::Bool(b) => Ok(Literal::Boolean(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Literal::Integer(i)),
                None => n
                    .as_f64()
                    .map(Literal::Float)
                    .ok_or_else(|| ValidationError::LiteralType(n.to_string())),
            },
            serde_json::Value::Null => Err(ValidationError::LiteralType("null".into())),
            other => Err(ValidationError::LiteralType(other.to_string())),
        }
    }
}

/// Marks a condition value as another property of the same record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldReference {
    path: String,
}

impl FieldReference {
    pub fn new(path: impl Into<String>) -> Result<Self, ValidationError> {
        let path = path.into();
        if path.trim().is_empty() {
            return Err(ValidationError::EmptyPropertyPath);
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Operator {
    #[default]
    Equals,
    NotEquals,
    StartsWith,
    EndsWith,
    Contains,
    GreaterThan,
    GreaterThanEquals,
    LesserThan,
    LesserThanEquals,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl Operator {
    pub const ALL: [Operator; 13] = [
        Operator::Equals,
        Operator::NotEquals,
        Operator::StartsWith,
        Operator::EndsWith,
        Operator::Contains,
        Operator::GreaterThan,
        Operator::GreaterThanEquals,
        Operator::LesserThan,
        Operator::LesserThanEquals,
        Operator::In,
        Operator::NotIn,
        Operator::IsNull,
        Operator::IsNotNull,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operator::Equals => "EQUALS",
            Operator::NotEquals => "NOT_EQUALS",
            Operator::StartsWith => "STARTS_WITH",
            Operator::EndsWith => "ENDS_WITH",
            Operator::Contains => "CONTAINS",
            Operator::GreaterThan => "GREATER_THAN",
            Operator::GreaterThanEquals => "GREATER_THAN_EQUALS",
            Operator::LesserThan => "LESSER_THAN",
            Operator::LesserThanEquals => "LESSER_THAN_EQUALS",
            Operator::In => "IN",
            Operator::NotIn => "NOT_IN",
            Operator::IsNull => "IS_NULL",
            Operator::IsNotNull => "IS_NOT_NULL",
        }
    }

    pub fn from_name(name: &str) -> Option<Operator> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.name().eq_ignore_ascii_case(name))
    }

    pub fn required_values_count(&self) -> usize {
        match self {
            Operator::IsNull | Operator::IsNotNull => 0,
            _ => 1,
        }
    }

    /// Field-to-field comparison is limited to plain comparisons.
    pub fn supports_field_reference(&self) -> bool {
        matches!(
            self,
            Operator::Equals
                | Operator::NotEquals
                | Operator::GreaterThan
                | Operator::GreaterThanEquals
                | Operator::LesserThan
                | Operator::LesserThanEquals
        )
    }

    pub fn takes_collection(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }

    pub fn is_pattern(&self) -> bool {
        matches!(
            self,
            Operator::StartsWith | Operator::EndsWith | Operator::Contains
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A dotted property path with an optional projection alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyReference {
    path: String,
    alias: Option<String>,
}

impl PropertyReference {
    pub fn new(path: impl Into<String>) -> Result<Self, ValidationError> {
        let path = path.into();
        if path.trim().is_empty() {
            return Err(ValidationError::EmptyPropertyPath);
        }
        Ok(Self { path, alias: None })
    }

    pub fn with_alias(self, alias: impl Into<String>) -> Self {
        Self {
            alias: Some(alias.into()),
            ..self
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionArgument {
    Expression(PropertyExpression),
    Literal(Literal),
}

impl FunctionArgument {
    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            FunctionArgument::Literal(lit) => Some(lit),
            FunctionArgument::Expression(_) => None,
        }
    }

    fn to_expression_string(&self) -> String {
        match self {
            FunctionArgument::Expression(expr) => expr.to_expression_string(),
            FunctionArgument::Literal(lit) => lit.to_string(),
        }
    }
}

impl From<PropertyExpression> for FunctionArgument {
    fn from(value: PropertyExpression) -> Self {
        FunctionArgument::Expression(value)
    }
}

impl From<PropertyReference> for FunctionArgument {
    fn from(value: PropertyReference) -> Self {
        FunctionArgument::Expression(value.into())
    }
}

impl From<FunctionCall> for FunctionArgument {
    fn from(value: FunctionCall) -> Self {
        FunctionArgument::Expression(value.into())
    }
}

impl From<Literal> for FunctionArgument {
    fn from(value: Literal) -> Self {
        FunctionArgument::Literal(value)
    }
}

/// A function applied to an ordered argument list, checked against its arity.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    function: Function,
    arguments: Vec<FunctionArgument>,
    alias: Option<String>,
}

impl FunctionCall {
    pub fn new(
        function: Function,
        arguments: Vec<FunctionArgument>,
    ) -> Result<Self, ValidationError> {
        let arity = function.arity();
        if !arity.accepts(arguments.len()) {
            return Err(ValidationError::FunctionArity {
                function,
                expected: arity.to_string(),
                actual: arguments.len(),
            });
        }
        Ok(Self {
            function,
            arguments,
            alias: None,
        })
    }

    pub fn with_alias(self, alias: impl Into<String>) -> Self {
        Self {
            alias: Some(alias.into()),
            ..self
        }
    }

    pub fn function(&self) -> Function {
        self.function
    }

    pub fn arguments(&self) -> &[FunctionArgument] {
        &self.arguments
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// `NAME(arg, ...)`, string literals quoted.
    pub fn to_expression_string(&self) -> String {
        let args: Vec<String> = self
            .arguments
            .iter()
            .map(FunctionArgument::to_expression_string)
            .collect();
        format!("{}({})", self.function, args.join(", "))
    }
}

/// Left-hand side of a condition or an item of a select / group-by / sort.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyExpression {
    Property(PropertyReference),
    Call(FunctionCall),
}

impl PropertyExpression {
    pub fn property(path: impl Into<String>) -> Result<Self, ValidationError> {
        PropertyReference::new(path).map(PropertyExpression::Property)
    }

    pub fn alias(&self) -> Option<&str> {
        match self {
            PropertyExpression::Property(p) => p.alias(),
            PropertyExpression::Call(c) => c.alias(),
        }
    }

    /// The bare property path, when this is not a function call.
    pub fn property_path(&self) -> Option<&str> {
        match self {
            PropertyExpression::Property(p) => Some(p.path()),
            PropertyExpression::Call(_) => None,
        }
    }

    pub fn to_expression_string(&self) -> String {
        match self {
            PropertyExpression::Property(p) => p.path().to_string(),
            PropertyExpression::Call(call) => call.to_expression_string(),
        }
    }

    /// First aggregate function found anywhere in this expression.
    pub fn find_aggregate(&self) -> Option<Function> {
        match self {
            PropertyExpression::Property(_) => None,
            PropertyExpression::Call(call) if call.function().is_aggregate() => {
                Some(call.function())
            }
            PropertyExpression::Call(call) => call.arguments().iter().find_map(|arg| match arg {
                FunctionArgument::Expression(expr) => expr.find_aggregate(),
                FunctionArgument::Literal(_) => None,
            }),
        }
    }

    /// Outermost aggregate calls, in order of appearance.
    pub fn aggregate_calls(&self) -> Vec<&FunctionCall> {
        match self {
            PropertyExpression::Property(_) => Vec::new(),
            PropertyExpression::Call(call) if call.function().is_aggregate() => vec![call],
            PropertyExpression::Call(call) => call
                .arguments()
                .iter()
                .flat_map(|arg| match arg {
                    FunctionArgument::Expression(expr) => expr.aggregate_calls(),
                    FunctionArgument::Literal(_) => Vec::new(),
                })
                .collect(),
        }
    }

    /// Every property path referenced, in order of appearance.
    pub fn property_paths(&self) -> Vec<&str> {
        let mut paths = Vec::new();
        self.collect_paths(&mut paths);
        paths
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            PropertyExpression::Property(p) => out.push(p.path()),
            PropertyExpression::Call(call) => {
                for arg in call.arguments() {
                    if let FunctionArgument::Expression(expr) = arg {
                        expr.collect_paths(out);
                    }
                }
            }
        }
    }
}

impl From<PropertyReference> for PropertyExpression {
    fn from(value: PropertyReference) -> Self {
        PropertyExpression::Property(value)
    }
}

impl From<FunctionCall> for PropertyExpression {
    fn from(value: FunctionCall) -> Self {
        PropertyExpression::Call(value)
    }
}

/// Right-hand side of a [`SimpleCondition`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionValue {
    Scalar(Literal),
    List(Vec<Literal>),
    Field(FieldReference),
}

macro_rules! scalar_condition_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for ConditionValue {
                fn from(value: $ty) -> Self {
                    ConditionValue::Scalar(value.into())
                }
            }
        )*
    };
}

scalar_condition_value!(Literal, &str, String, i64, i32, f64, bool);

impl From<FieldReference> for ConditionValue {
    fn from(value: FieldReference) -> Self {
        ConditionValue::Field(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimpleCondition {
    left: PropertyExpression,
    operator: Operator,
    value: Option<ConditionValue>,
}

impl SimpleCondition {
    pub fn new(
        left: impl Into<PropertyExpression>,
        operator: Operator,
        value: Option<ConditionValue>,
    ) -> Result<Self, ValidationError> {
        let actual = usize::from(value.is_some());
        if actual != operator.required_values_count() {
            return Err(ValidationError::ValueCount {
                operator: operator.name(),
                expected: operator.required_values_count(),
                actual,
            });
        }
        match &value {
            Some(ConditionValue::Field(_)) if !operator.supports_field_reference() => {
                return Err(ValidationError::FieldReferenceNotAllowed(operator.name()));
            }
            Some(ConditionValue::List(_)) if !operator.takes_collection() => {
                return Err(ValidationError::CollectionNotAllowed(operator.name()));
            }
            _ => {}
        }
        Ok(Self {
            left: left.into(),
            operator,
            value,
        })
    }

    /// Builds from the two mutually exclusive left-hand forms.
    pub fn from_parts(
        property_name: Option<String>,
        expression: Option<PropertyExpression>,
        operator: Operator,
        value: Option<ConditionValue>,
    ) -> Result<Self, ValidationError> {
        let left = exactly_one("condition", property_name, expression)?;
        Self::new(left, operator, value)
    }

    pub fn left(&self) -> &PropertyExpression {
        &self.left
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn value(&self) -> Option<&ConditionValue> {
        self.value.as_ref()
    }
}

fn exactly_one(
    what: &'static str,
    property_name: Option<String>,
    expression: Option<PropertyExpression>,
) -> Result<PropertyExpression, ValidationError> {
    match (property_name, expression) {
        (Some(_), Some(_)) => Err(ValidationError::NameAndExpression(what)),
        (None, None) => Err(ValidationError::MissingNameOrExpression(what)),
        (Some(name), None) => PropertyExpression::property(name),
        (None, Some(expr)) => Ok(expr),
    }
}

/// `NOT` over a condition that is never a native escape.
#[derive(Debug, Clone, PartialEq)]
pub struct NotCondition {
    condition: Box<Condition>,
}

impl NotCondition {
    pub fn new(condition: Condition) -> Result<Self, ValidationError> {
        if let Condition::Native(_) = condition {
            return Err(ValidationError::NegatedNative);
        }
        Ok(Self {
            condition: Box::new(condition),
        })
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Simple(SimpleCondition),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(NotCondition),
    Native(Native),
}

impl Condition {
    pub fn not(condition: Condition) -> Result<Condition, ValidationError> {
        NotCondition::new(condition).map(Condition::Not)
    }

    /// Empty wrappers impose no restriction, including through `NOT`.
    pub fn is_empty(&self) -> bool {
        match self {
            Condition::And(children) | Condition::Or(children) => {
                children.iter().all(Condition::is_empty)
            }
            Condition::Not(not) => not.condition().is_empty(),
            Condition::Simple(_) | Condition::Native(_) => false,
        }
    }
}

impl From<SimpleCondition> for Condition {
    fn from(value: SimpleCondition) -> Self {
        Condition::Simple(value)
    }
}

impl From<NotCondition> for Condition {
    fn from(value: NotCondition) -> Self {
        Condition::Not(value)
    }
}

/// Property names and explicit expressions, names first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExpressionList {
    property_names: Vec<String>,
    expressions: Vec<PropertyExpression>,
}

impl ExpressionList {
    pub fn new(
        property_names: Vec<String>,
        expressions: Vec<PropertyExpression>,
    ) -> Result<Self, ValidationError> {
        if property_names.iter().any(|n| n.trim().is_empty()) {
            return Err(ValidationError::EmptyPropertyPath);
        }
        Ok(Self {
            property_names,
            expressions,
        })
    }

    pub fn property_names(&self) -> &[String] {
        &self.property_names
    }

    pub fn expressions(&self) -> &[PropertyExpression] {
        &self.expressions
    }

    pub fn is_empty(&self) -> bool {
        self.property_names.is_empty() && self.expressions.is_empty()
    }

    pub fn effective_expressions(&self) -> Vec<PropertyExpression> {
        self.property_names
            .iter()
            .map(|name| {
                PropertyExpression::Property(PropertyReference {
                    path: name.clone(),
                    alias: None,
                })
            })
            .chain(self.expressions.iter().cloned())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Select {
    Simple(ExpressionList),
    Native(Native),
}

impl Select {
    pub fn properties<I, S>(names: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ExpressionList::new(names.into_iter().map(Into::into).collect(), Vec::new())
            .map(Select::Simple)
    }

    pub fn expressions(expressions: Vec<PropertyExpression>) -> Self {
        Select::Simple(ExpressionList {
            property_names: Vec::new(),
            expressions,
        })
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Select::Simple(list) => list.is_empty(),
            Select::Native(_) => false,
        }
    }

    pub fn effective_expressions(&self) -> Vec<PropertyExpression> {
        match self {
            Select::Simple(list) => list.effective_expressions(),
            Select::Native(_) => Vec::new(),
        }
    }

    /// Result keys, one per effective expression, in select-list order.
    pub fn alias_names(&self) -> Result<Vec<String>, CompileError> {
        self.effective_expressions()
            .iter()
            .map(|expr| match (expr.alias(), expr) {
                (Some(alias), _) => Ok(alias.to_string()),
                (None, PropertyExpression::Property(p)) => Ok(p.path().to_string()),
                (None, call) => Err(CompileError::MissingAlias(call.to_expression_string())),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupBy {
    Simple(ExpressionList),
    Native(Native),
}

impl GroupBy {
    pub fn expressions(expressions: Vec<PropertyExpression>) -> Self {
        GroupBy::Simple(ExpressionList {
            property_names: Vec::new(),
            expressions,
        })
    }

    pub fn properties<I, S>(names: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ExpressionList::new(names.into_iter().map(Into::into).collect(), Vec::new())
            .map(GroupBy::Simple)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            GroupBy::Simple(list) => list.is_empty(),
            GroupBy::Native(_) => false,
        }
    }

    pub fn effective_expressions(&self) -> Vec<PropertyExpression> {
        match self {
            GroupBy::Simple(list) => list.effective_expressions(),
            GroupBy::Native(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimpleSort {
    expression: PropertyExpression,
    direction: Direction,
}

impl SimpleSort {
    pub fn new(expression: impl Into<PropertyExpression>, direction: Direction) -> Self {
        Self {
            expression: expression.into(),
            direction,
        }
    }

    pub fn from_parts(
        property_name: Option<String>,
        expression: Option<PropertyExpression>,
        direction: Direction,
    ) -> Result<Self, ValidationError> {
        exactly_one("sort", property_name, expression).map(|expr| Self::new(expr, direction))
    }

    pub fn effective_expression(&self) -> &PropertyExpression {
        &self.expression
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sort {
    Simple(SimpleSort),
    Native(Native),
}

impl From<SimpleSort> for Sort {
    fn from(value: SimpleSort) -> Self {
        Sort::Simple(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prop(path: &str) -> PropertyExpression {
        PropertyExpression::property(path).unwrap()
    }

    #[test]
    fn test_null_checks_reject_values() {
        for op in [Operator::IsNull, Operator::IsNotNull] {
            assert!(SimpleCondition::new(prop("a"), op, Some("x".into())).is_err());
            assert!(SimpleCondition::new(prop("a"), op, None).is_ok());
        }
    }

    #[test]
    fn test_valued_operators_require_value() {
        for op in Operator::ALL
            .iter()
            .filter(|op| op.required_values_count() == 1)
        {
            let err = SimpleCondition::new(prop("a"), *op, None).unwrap_err();
            assert!(matches!(err, ValidationError::ValueCount { expected: 1, actual: 0, .. }));
        }
    }

    #[test]
    fn test_field_reference_operator_subset() {
        let field = FieldReference::new("b").unwrap();
        for op in Operator::ALL
            .iter()
            .filter(|op| op.required_values_count() == 1)
        {
            let result = SimpleCondition::new(prop("a"), *op, Some(field.clone().into()));
            assert_eq!(result.is_ok(), op.supports_field_reference(), "{op}");
        }
        // null checks fail on value count before the field-reference rule applies
        assert!(SimpleCondition::new(prop("a"), Operator::IsNull, Some(field.into())).is_err());
    }

    #[test]
    fn test_collection_only_for_in() {
        let list = ConditionValue::List(vec![1.into(), 2.into()]);
        assert!(SimpleCondition::new(prop("a"), Operator::In, Some(list.clone())).is_ok());
        assert!(SimpleCondition::new(prop("a"), Operator::NotIn, Some(list.clone())).is_ok());
        assert_eq!(
            SimpleCondition::new(prop("a"), Operator::Equals, Some(list)).unwrap_err(),
            ValidationError::CollectionNotAllowed("EQUALS")
        );
    }

    #[test]
    fn test_condition_name_xor_expression() {
        let both = SimpleCondition::from_parts(
            Some("a".into()),
            Some(prop("b")),
            Operator::Equals,
            Some(1.into()),
        );
        assert_eq!(both.unwrap_err(), ValidationError::NameAndExpression("condition"));
        let neither = SimpleCondition::from_parts(None, None, Operator::IsNull, None);
        assert_eq!(
            neither.unwrap_err(),
            ValidationError::MissingNameOrExpression("condition")
        );
    }

    #[test]
    fn test_function_arity() {
        assert!(FunctionCall::new(Function::CurrentDate, vec![Literal::from(1).into()]).is_err());
        assert!(FunctionCall::new(Function::Mod, vec![Literal::from(1).into()]).is_err());
        assert!(FunctionCall::new(
            Function::Mod,
            vec![Literal::from(1).into(), Literal::from(2).into(), Literal::from(3).into()]
        )
        .is_err());
        assert!(FunctionCall::new(Function::Concat, vec![Literal::from("a").into()]).is_err());
        assert!(FunctionCall::new(
            Function::Concat,
            vec![Literal::from("a").into(), Literal::from("b").into()]
        )
        .is_ok());
    }

    #[test]
    fn test_expression_string() {
        let inner = FunctionCall::new(Function::Lower, vec![prop("lastName").into()]).unwrap();
        let outer = FunctionCall::new(
            Function::Concat,
            vec![inner.into(), Literal::from("-x").into()],
        )
        .unwrap();
        assert_eq!(
            PropertyExpression::from(outer).to_expression_string(),
            "CONCAT(LOWER(lastName), '-x')"
        );
        let now = FunctionCall::new(Function::CurrentDate, vec![]).unwrap();
        assert_eq!(PropertyExpression::from(now).to_expression_string(), "CURRENT_DATE()");
    }

    #[test]
    fn test_not_rejects_native() {
        let native = Condition::Native(Native::new("raw".to_string()));
        assert_eq!(Condition::not(native).unwrap_err(), ValidationError::NegatedNative);
    }

    #[test]
    fn test_is_empty() {
        assert!(Condition::And(vec![]).is_empty());
        assert!(Condition::not(Condition::Or(vec![])).unwrap().is_empty());
        let simple: Condition = SimpleCondition::new(prop("a"), Operator::IsNull, None)
            .unwrap()
            .into();
        assert!(!Condition::And(vec![simple]).is_empty());
    }

    #[test]
    fn test_select_effective_expressions() {
        let select = Select::properties(["firstName", "address.city"]).unwrap();
        let exprs = select.effective_expressions();
        assert_eq!(exprs.len(), 2);
        assert_eq!(exprs[0].to_expression_string(), "firstName");
        assert_eq!(exprs[1].to_expression_string(), "address.city");
    }

    #[test]
    fn test_select_names_then_expressions() {
        let count = FunctionCall::new(Function::Count, vec![prop("id").into()])
            .unwrap()
            .with_alias("total");
        let list = ExpressionList::new(vec!["category".into()], vec![count.into()]).unwrap();
        let select = Select::Simple(list);
        assert_eq!(select.alias_names().unwrap(), vec!["category", "total"]);
    }

    #[test]
    fn test_select_alias_required_for_calls() {
        let upper = FunctionCall::new(Function::Upper, vec![prop("name").into()]).unwrap();
        let select = Select::expressions(vec![upper.into()]);
        assert_eq!(
            select.alias_names().unwrap_err(),
            CompileError::MissingAlias("UPPER(name)".into())
        );
    }

    #[test]
    fn test_literal_from_json() {
        assert_eq!(
            Literal::try_from(&serde_json::json!("a")).unwrap(),
            Literal::String("a".into())
        );
        assert_eq!(Literal::try_from(&serde_json::json!(3)).unwrap(), Literal::Integer(3));
        assert!(Literal::try_from(&serde_json::Value::Null).is_err());
        assert!(Literal::try_from(&serde_json::json!([1])).is_err());
    }

    #[test]
    fn test_find_aggregate_nested() {
        let sum = FunctionCall::new(Function::Sum, vec![prop("price").into()]).unwrap();
        let abs = FunctionCall::new(Function::Abs, vec![sum.into()]).unwrap();
        assert_eq!(PropertyExpression::from(abs).find_aggregate(), Some(Function::Sum));
    }
}
