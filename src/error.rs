pub type EscapadeResult<T> = std::result::Result<T, EscapadeError>;

/// Source location of a node, 1-indexed, end inclusive.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub begin_line: usize,
    pub begin_column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl Span {
    pub const fn new(
        begin_line: usize,
        begin_column: usize,
        end_line: usize,
        end_column: usize,
    ) -> Self {
        Self {
            begin_line,
            begin_column,
            end_line,
            end_column,
        }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}", self.begin_line, self.begin_column)
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParseErrorKind {
    UnexpectedToken {
        expected: String,
        found: String,
    },
    UnexpectedEOF {
        /// Describes what was expected, e.g., "(expected '</#switch>')"
        expected_what: String,
    },
    InvalidIdentifier {
        at_char: String,
    },
    UnknownDirective {
        directive: String,
    },
    Expected {
        description: String,
    },
    DuplicateDefault,
    BreakOutsideLoop,
    LegacyEscapingInAutoEscape {
        builtin: String,
        format: String,
    },
    NotAMarkupFormat {
        format: String,
    },
    Message(String),
}

impl std::fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedToken { expected, found } => {
                write!(f, "Expected {}, found {}", expected, found)
            }
            Self::UnexpectedEOF { expected_what } => {
                write!(f, "Unexpected EOF{}", expected_what)
            }
            Self::InvalidIdentifier { at_char } => {
                write!(f, "Invalid identifier starting with '{}'", at_char)
            }
            Self::UnknownDirective { directive } => {
                write!(f, "Unknown directive '#{}'", directive)
            }
            Self::Expected { description } => {
                write!(f, "Expected {}", description)
            }
            Self::DuplicateDefault => {
                write!(f, "A #switch can only have one #default")
            }
            Self::BreakOutsideLoop => {
                write!(f, "#break must be inside a #list or #switch")
            }
            Self::LegacyEscapingInAutoEscape { builtin, format } => {
                write!(
                    f,
                    "Using ?{} is not allowed while auto-escaping with the {} output format",
                    builtin, format
                )
            }
            Self::NotAMarkupFormat { format } => {
                write!(
                    f,
                    "#autoesc requires a markup output format, but the current output format is {}",
                    format
                )
            }
            Self::Message(msg) => {
                write!(f, "Parser error: {}", msg)
            }
        }
    }
}

impl std::error::Error for ParseErrorKind {}

impl ParseErrorKind {
    pub fn unexpected_eof(expected: Option<String>) -> Self {
        Self::UnexpectedEOF {
            expected_what: expected.map_or_else(String::new, |e| format!(" (expected '{}')", e)),
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub kind: ParseErrorKind,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Parse error at line {}, column {}: {}",
            self.line, self.column, self.kind
        )
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

/// Semantic violations reachable at render time.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TemplateErrorKind {
    UndefinedVariable {
        name: String,
    },
    TypeMismatch {
        expected: String,
        found: String,
    },
    NonNamespaceTarget {
        expression: String,
        found: String,
    },
    IncompatibleOutputFormats {
        left: String,
        right: String,
    },
    LegacyBuiltInOnMarkup {
        builtin: String,
        format: String,
    },
    LocalOutsideMacro {
        name: String,
    },
    UncaughtBreak,
    Write,
}

impl std::fmt::Display for TemplateErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UndefinedVariable { name } => {
                write!(f, "The variable '{}' is not defined", name)
            }
            Self::TypeMismatch { expected, found } => {
                write!(f, "Expected {}, but the value is {}", expected, found)
            }
            Self::NonNamespaceTarget { expression, found } => {
                write!(
                    f,
                    "The assignment target '{}' must be a namespace, but it is {}",
                    expression, found
                )
            }
            Self::IncompatibleOutputFormats { left, right } => {
                write!(
                    f,
                    "Markup of the {} output format can't be mixed with markup of the {} output format",
                    left, right
                )
            }
            Self::LegacyBuiltInOnMarkup { builtin, format } => {
                write!(
                    f,
                    "?{} can't be applied to markup of the {} output format",
                    builtin, format
                )
            }
            Self::LocalOutsideMacro { name } => {
                write!(
                    f,
                    "Can't set local variable '{}' outside of a local frame",
                    name
                )
            }
            Self::UncaughtBreak => {
                write!(f, "#break reached the top of the template outside any #list or #switch")
            }
            Self::Write => {
                write!(f, "Failed to write template output")
            }
        }
    }
}

impl std::error::Error for TemplateErrorKind {}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateError {
    pub kind: TemplateErrorKind,
    /// Location of the instruction that was executing.
    pub span: Option<Span>,
    /// Short description of that instruction, e.g. `#switch x`.
    pub instruction: Option<String>,
    pub template_name: Option<String>,
}

impl TemplateError {
    pub const fn new(kind: TemplateErrorKind) -> Self {
        Self {
            kind,
            span: None,
            instruction: None,
            template_name: None,
        }
    }
}

impl From<TemplateErrorKind> for TemplateError {
    fn from(kind: TemplateErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<std::fmt::Error> for TemplateError {
    fn from(_: std::fmt::Error) -> Self {
        Self::new(TemplateErrorKind::Write)
    }
}

impl std::fmt::Display for TemplateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(instruction) = &self.instruction {
            write!(f, "\n  at {}", instruction)?;
            if let Some(span) = self.span {
                write!(f, " [{}", span)?;
                if let Some(name) = &self.template_name {
                    write!(f, " in template \"{}\"", name)?;
                }
                write!(f, "]")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for TemplateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

/// An introspection index outside `0..count`. This is a contract violation
/// in the calling tool, never a template authoring mistake.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ParameterIndexError {
    pub index: usize,
    pub count: usize,
}

impl std::fmt::Display for ParameterIndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Parameter index {} out of bounds for a node with {} parameters",
            self.index, self.count
        )
    }
}

impl std::error::Error for ParameterIndexError {}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EscapadeError {
    TemplateExists { template_name: String },
    MissingTemplate { template_name: String },
    UnknownOutputFormat { format_name: String },
    Stopped { message: String },
    Template(TemplateError),
    Parse(ParseError),
}

impl std::fmt::Display for EscapadeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TemplateExists { template_name } => {
                write!(f, "Template already exists: {}", template_name)
            }
            Self::MissingTemplate { template_name } => {
                write!(f, "Template not found: {}", template_name)
            }
            Self::UnknownOutputFormat { format_name } => {
                write!(f, "Unknown output format: {}", format_name)
            }
            Self::Stopped { message } => {
                write!(f, "Execution stopped: {}", message)
            }
            Self::Template(template_error) => {
                write!(f, "{}", template_error)
            }
            Self::Parse(parse_error) => {
                write!(f, "{}", parse_error)
            }
        }
    }
}

impl std::error::Error for EscapadeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(parse_error) => Some(parse_error),
            Self::Template(template_error) => Some(template_error),
            Self::TemplateExists { .. }
            | Self::MissingTemplate { .. }
            | Self::UnknownOutputFormat { .. }
            | Self::Stopped { .. } => None,
        }
    }
}

impl From<ParseError> for EscapadeError {
    fn from(error: ParseError) -> Self {
        Self::Parse(error)
    }
}

impl From<TemplateError> for EscapadeError {
    fn from(error: TemplateError) -> Self {
        Self::Template(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ntest::timeout(100)]
    fn test_template_error_display_with_location() {
        let error = TemplateError {
            kind: TemplateErrorKind::UndefinedVariable {
                name: "user".to_string(),
            },
            span: Some(Span::new(3, 7, 3, 13)),
            instruction: Some("${user}".to_string()),
            template_name: Some("profile".to_string()),
        };
        assert_eq!(
            error.to_string(),
            "The variable 'user' is not defined\n  at ${user} [line 3, column 7 in template \"profile\"]"
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_error_sources() {
        use std::error::Error;

        let parse = EscapadeError::from(ParseError {
            line: 1,
            column: 2,
            kind: ParseErrorKind::DuplicateDefault,
        });
        assert!(parse.source().is_some(), "parse errors expose their cause");

        let stopped = EscapadeError::Stopped {
            message: "halt".to_string(),
        };
        assert!(stopped.source().is_none(), "stops have no cause");
        assert_eq!(stopped.to_string(), "Execution stopped: halt");
    }
}
