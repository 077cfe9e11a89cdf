//! Error types shared by the IR, the backend compilers and the configuration loader.

use thiserror::Error;

use crate::function::Function;

/// Raised when an IR value would violate one of its construction invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("literal must be a string, number or boolean, got {0}")]
    LiteralType(String),

    #[error("operator {operator} requires {expected} value(s), got {actual}")]
    ValueCount {
        operator: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("operator {0} does not accept a collection value")]
    CollectionNotAllowed(&'static str),

    #[error("operator {0} does not support field references")]
    FieldReferenceNotAllowed(&'static str),

    #[error("function {function} expects {expected} argument(s), got {actual}")]
    FunctionArity {
        function: Function,
        expected: String,
        actual: usize,
    },

    #[error("{0}: property name and expression are mutually exclusive")]
    NameAndExpression(&'static str),

    #[error("{0}: either a property name or an expression is required")]
    MissingNameOrExpression(&'static str),

    #[error("HAVING clause requires a GROUP BY clause")]
    HavingWithoutGroupBy,

    #[error("a NOT condition cannot wrap a native condition")]
    NegatedNative,

    #[error("pagination requires page >= 1, page size >= 1 and an offset within i64, got page={page} pageSize={page_size}")]
    Pagination { page: u64, page_size: u64 },

    #[error("property path must not be empty")]
    EmptyPropertyPath,

    #[error("invalid query document: {0}")]
    Document(String),
}

/// Raised while translating a validated IR value into a backend's native form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("{feature} is not supported by the {backend} backend")]
    UnsupportedByBackend {
        backend: &'static str,
        feature: String,
    },

    #[error("native payload of type {type_name} is not supported by the {backend} backend")]
    UnsupportedNative {
        backend: &'static str,
        type_name: &'static str,
    },

    #[error("function {function} is not supported by the {backend} backend")]
    UnsupportedFunction {
        backend: &'static str,
        function: Function,
    },

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("aggregate function {function} is not allowed in {position}")]
    AggregateNotAllowed {
        function: Function,
        position: &'static str,
    },

    #[error("native conditions cannot be negated")]
    NegatedNative,

    #[error("condition nesting exceeds the depth limit of {limit}")]
    DepthExceeded { limit: usize },

    #[error("projection item '{0}' has no alias")]
    MissingAlias(String),

    #[error("unknown relation '{segment}' on '{entity}'")]
    UnknownRelation { entity: String, segment: String },
}

/// 配置文件加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("配置文件不存在: {0}")]
    NotFound(String),

    #[error("无法读取配置文件 {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("无法解析JSON配置文件 {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Umbrella error for callers that drive the whole pipeline.
#[derive(Debug, Error)]
pub enum QuerityError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_having_message_names_rule() {
        let err = ValidationError::HavingWithoutGroupBy;
        assert!(err
            .to_string()
            .contains("HAVING clause requires a GROUP BY clause"));
    }

    #[test]
    fn test_unsupported_function_names_backend() {
        let err = CompileError::UnsupportedFunction {
            backend: "search",
            function: Function::Upper,
        };
        assert_eq!(
            err.to_string(),
            "function UPPER is not supported by the search backend"
        );
    }

    #[test]
    fn test_umbrella_conversion() {
        let err: QuerityError = CompileError::NegatedNative.into();
        assert!(matches!(err, QuerityError::Compile(CompileError::NegatedNative)));
    }
}
