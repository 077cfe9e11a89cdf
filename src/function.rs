//! The closed set of functions usable inside property expressions.

use std::fmt;

/// Broad family a function belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionCategory {
    Arithmetic,
    String,
    DateTime,
    Conditional,
    Aggregate,
}

/// Argument-count contract of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// No arguments at all, e.g. `CURRENT_DATE`.
    Nullary,
    /// Exactly this many arguments.
    Fixed(usize),
    /// At least this many arguments.
    Variadic { min: usize },
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Arity::Nullary => count == 0,
            Arity::Fixed(n) => count == n,
            Arity::Variadic { min } => count >= min,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Nullary => write!(f, "no"),
            Arity::Fixed(n) => write!(f, "exactly {}", n),
            Arity::Variadic { min } => write!(f, "at least {}", min),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    // Arithmetic
    Abs,
    Sqrt,
    Mod,
    // String
    Concat,
    Substring,
    Trim,
    Ltrim,
    Rtrim,
    Length,
    /// `LOCATE(needle, haystack)`, one-based, 0 when absent.
    Locate,
    Lower,
    Upper,
    // Date / time
    CurrentDate,
    CurrentTime,
    CurrentTimestamp,
    // Conditional
    Coalesce,
    /// `NULLIF(x, y)`: null when `x = y`, otherwise `x`.
    Nullif,
    // Aggregate
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl Function {
    pub const ALL: [Function; 22] = [
        Function::Abs,
        Function::Sqrt,
        Function::Mod,
        Function::Concat,
        Function::Substring,
        Function::Trim,
        Function::Ltrim,
        Function::Rtrim,
        Function::Length,
        Function::Locate,
        Function::Lower,
        Function::Upper,
        Function::CurrentDate,
        Function::CurrentTime,
        Function::CurrentTimestamp,
        Function::Coalesce,
        Function::Nullif,
        Function::Count,
        Function::Sum,
        Function::Avg,
        Function::Min,
        Function::Max,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Function::Abs => "ABS",
            Function::Sqrt => "SQRT",
            Function::Mod => "MOD",
            Function::Concat => "CONCAT",
            Function::Substring => "SUBSTRING",
            Function::Trim => "TRIM",
            Function::Ltrim => "LTRIM",
            Function::Rtrim => "RTRIM",
            Function::Length => "LENGTH",
            Function::Locate => "LOCATE",
            Function::Lower => "LOWER",
            Function::Upper => "UPPER",
            Function::CurrentDate => "CURRENT_DATE",
            Function::CurrentTime => "CURRENT_TIME",
            Function::CurrentTimestamp => "CURRENT_TIMESTAMP",
            Function::Coalesce => "COALESCE",
            Function::Nullif => "NULLIF",
            Function::Count => "COUNT",
            Function::Sum => "SUM",
            Function::Avg => "AVG",
            Function::Min => "MIN",
            Function::Max => "MAX",
        }
    }

    /// Case-insensitive lookup by the rendered name.
    pub fn from_name(name: &str) -> Option<Function> {
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.name().eq_ignore_ascii_case(name))
    }

    pub fn category(&self) -> FunctionCategory {
        match self {
            Function::Abs | Function::Sqrt | Function::Mod => FunctionCategory::Arithmetic,
            Function::Concat
            | Function::Substring
            | Function::Trim
            | Function::Ltrim
            | Function::Rtrim
            | Function::Length
            | Function::Locate
            | Function::Lower
            | Function::Upper => FunctionCategory::String,
            Function::CurrentDate | Function::CurrentTime | Function::CurrentTimestamp => {
                FunctionCategory::DateTime
            }
            Function::Coalesce | Function::Nullif => FunctionCategory::Conditional,
            Function::Count | Function::Sum | Function::Avg | Function::Min | Function::Max => {
                FunctionCategory::Aggregate
            }
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            Function::CurrentDate | Function::CurrentTime | Function::CurrentTimestamp => {
                Arity::Nullary
            }
            Function::Concat => Arity::Variadic { min: 2 },
            Function::Coalesce => Arity::Variadic { min: 1 },
            Function::Mod | Function::Locate | Function::Nullif => Arity::Fixed(2),
            Function::Substring => Arity::Fixed(3),
            _ => Arity::Fixed(1),
        }
    }

    pub fn is_aggregate(&self) -> bool {
        self.category() == FunctionCategory::Aggregate
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
