//! Error taxonomy (§7): [`ParseError`] for lexical/syntactic failures,
//! [`EvaluationError`] for everything raised during type-checking or
//! evaluation. Both carry an optional byte-offset position; [`render_at`]
//! renders the §6.3 "caret under the offending column" suffix when the
//! original source text is available.

use std::fmt;

/// Render the `<message>\n\n>  <line> | <source line>\n         ^` suffix
/// described in §6.3, given the original source text and a byte offset.
pub fn render_at(message: &str, source: &str, pos: usize) -> String {
    let mut line_no = 1usize;
    let mut line_start = 0usize;
    for (i, ch) in source.char_indices() {
        if i >= pos {
            break;
        }
        if ch == '\n' {
            line_no += 1;
            line_start = i + 1;
        }
    }
    let line_end = source[line_start..]
        .find('\n')
        .map(|n| line_start + n)
        .unwrap_or(source.len());
    let line_text = &source[line_start..line_end];
    let column = source[line_start..pos].chars().count();

    let prefix = format!(">  {line_no} | ");
    let caret_indent = " ".repeat(prefix.len() + column);
    format!("{message}\n\n{prefix}{line_text}\n{caret_indent}^")
}

/// Lexical or syntactic failure, raised from the lexer or parser (§4.1,
/// §4.2).
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub pos: Option<usize>,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        ParseError {
            message: message.into(),
            pos: None,
        }
    }

    pub fn at(pos: usize, message: impl Into<String>) -> Self {
        ParseError {
            message: message.into(),
            pos: Some(pos),
        }
    }

    /// Render with the §6.3 source-position suffix, if a position is known.
    pub fn format_with_source(&self, source: &str) -> String {
        match self.pos {
            Some(pos) => render_at(&self.message, source, pos),
            None => self.message.clone(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Every failure detected during type-checking or evaluation (§7).
#[derive(Debug, Clone, PartialEq)]
pub enum EvalErrorKind {
    UnknownVariable {
        name: String,
    },
    NoSuchKey {
        key: String,
        type_name: Option<String>,
    },
    FunctionNotFound {
        name: String,
        receiver_type: Option<String>,
    },
    NoMatchingOverload {
        signature: String,
    },
    NoSuchOverload {
        op: String,
        left: String,
        right: Option<String>,
    },
    IntegerOverflow {
        detail: String,
    },
    DivisionByZero,
    ModuloByZero,
    TernaryConditionNotBoolean,
    LogicalOperandNotBoolean,
    InvalidEscapeSequence {
        detail: String,
    },
    ContextMustBeObject,
    PredicateResultNotBoolean,
    IndexOutOfBounds {
        index: i64,
        size: Option<i64>,
    },
    DuplicateKey {
        key: String,
    },
    CannotIterate {
        type_name: String,
    },
    ListElementTypeMismatch {
        expected: String,
        found: String,
    },
    FrozenRegistry,
    Custom(String),
}

impl fmt::Display for EvalErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalErrorKind::UnknownVariable { name } => write!(f, "Unknown variable: {name}"),
            EvalErrorKind::NoSuchKey { key, type_name } => match type_name {
                Some(t) => write!(f, "No such key: {key} (type {t})"),
                None => write!(f, "No such key: {key}"),
            },
            EvalErrorKind::FunctionNotFound {
                name,
                receiver_type,
            } => match receiver_type {
                Some(t) => write!(f, "Function not found: {name} for type {t}"),
                None => write!(f, "Function not found: {name}"),
            },
            EvalErrorKind::NoMatchingOverload { signature } => {
                write!(f, "found no matching overload for '{signature}'")
            }
            EvalErrorKind::NoSuchOverload { op, left, right } => match right {
                Some(r) => write!(f, "no such overload: {left} {op} {r}"),
                None => write!(f, "no such overload: {op}{left}"),
            },
            EvalErrorKind::IntegerOverflow { detail } => write!(f, "integer overflow: {detail}"),
            EvalErrorKind::DivisionByZero => write!(f, "division by zero"),
            EvalErrorKind::ModuloByZero => write!(f, "modulo by zero"),
            EvalErrorKind::TernaryConditionNotBoolean => {
                write!(f, "Ternary condition must be a boolean")
            }
            EvalErrorKind::LogicalOperandNotBoolean => {
                write!(f, "Left operand of &&/|| is not a boolean")
            }
            EvalErrorKind::InvalidEscapeSequence { detail } => {
                write!(f, "Invalid {detail} escape sequence")
            }
            EvalErrorKind::ContextMustBeObject => write!(f, "Context must be an object"),
            EvalErrorKind::PredicateResultNotBoolean => {
                write!(f, "predicate result is not a boolean")
            }
            EvalErrorKind::IndexOutOfBounds { index, size } => match size {
                Some(size) if *index >= 0 => write!(f, "index {index} >= size {size}"),
                _ => write!(f, "index {index} < 0"),
            },
            EvalErrorKind::DuplicateKey { key } => write!(f, "Duplicate key: {key}"),
            EvalErrorKind::CannotIterate { type_name } => {
                write!(f, "{type_name} cannot iterate over non-collection type")
            }
            EvalErrorKind::ListElementTypeMismatch { expected, found } => write!(
                f,
                "List elements must have the same type, expected {expected} but found {found}"
            ),
            EvalErrorKind::FrozenRegistry => write!(f, "Cannot modify frozen registry"),
            EvalErrorKind::Custom(s) => write!(f, "{s}"),
        }
    }
}

/// An [`EvalErrorKind`] annotated with the call-site/node position, if
/// known (§4.5: any `EvaluationError` raised is annotated with the
/// call-site AST position).
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationError {
    pub kind: EvalErrorKind,
    pub pos: Option<usize>,
}

impl EvaluationError {
    pub fn new(kind: EvalErrorKind) -> Self {
        EvaluationError { kind, pos: None }
    }

    pub fn at(pos: usize, kind: EvalErrorKind) -> Self {
        EvaluationError {
            kind,
            pos: Some(pos),
        }
    }

    /// Attach a position if one isn't already set; used by callers that
    /// propagate an error up through nodes that know their own position.
    pub fn with_pos(mut self, pos: usize) -> Self {
        if self.pos.is_none() {
            self.pos = Some(pos);
        }
        self
    }

    pub fn custom(message: impl Into<String>) -> Self {
        EvaluationError::new(EvalErrorKind::Custom(message.into()))
    }

    pub fn format_with_source(&self, source: &str) -> String {
        match self.pos {
            Some(pos) => render_at(&self.kind.to_string(), source, pos),
            None => self.kind.to_string(),
        }
    }
}

impl fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for EvaluationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caret_aligns_with_column() {
        let source = "1 + @";
        let msg = render_at("unexpected character '@'", source, 4);
        assert!(msg.contains("1 + @"));
        let last_line = msg.lines().last().unwrap();
        assert_eq!(last_line.rfind('^'), Some(last_line.len() - 1));
    }

    #[test]
    fn caret_on_second_line() {
        let source = "1 +\n@";
        let msg = render_at("unexpected character '@'", source, 4);
        assert!(msg.contains(">  2 | @"));
    }

    #[test]
    fn display_matches_spec_wording() {
        let err = EvaluationError::new(EvalErrorKind::UnknownVariable {
            name: "x".to_string(),
        });
        assert_eq!(err.to_string(), "Unknown variable: x");
    }

    #[test]
    fn no_such_overload_unary_omits_right_operand() {
        let err = EvalErrorKind::NoSuchOverload {
            op: "-".to_string(),
            left: "string".to_string(),
            right: None,
        };
        assert_eq!(err.to_string(), "no such overload: -string");
    }
}
