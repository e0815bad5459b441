mod ast;
mod engine;
mod environment;
mod error;
mod eval;
mod expression;
mod number_format;
mod output_format;
mod parser;
mod template;
mod value;

// Public exports.
pub use ast::{
    Assignment, BlockAssignment, Case, Interpolation, ListBlock, Node, NodeKind, NumericOutput,
    ParameterRole, ParameterValue, Scope, SwitchBlock,
};
pub use engine::{Engine, EngineConfig};
pub use environment::{Debugger, Environment, EvalResult, Flow};
pub use error::{
    EscapadeError, EscapadeResult, ParameterIndexError, ParseError, ParseErrorKind, Span, TemplateError,
    TemplateErrorKind,
};
pub use expression::{Expression, LegacyEscape, Literal};
pub use number_format::{FormatterCache, Locale, NumberFormatter, NumberSymbols};
pub use output_format::{
    HTML, HtmlOutputFormat, MarkupFormatRef, MarkupOutput, MarkupOutputFormat, OutputFormat,
    OutputFormatRef, OutputFormatRegistry, PLAIN_TEXT, PlainTextOutputFormat, RTF,
    RtfOutputFormat, UNDEFINED, UndefinedOutputFormat, XHTML, XML, XhtmlOutputFormat,
    XmlOutputFormat, is_same_format, output_format_by_name,
};
pub use parser::{ParserSettings, parse};
pub use template::{RenderOutcome, Template};
pub use value::{DataModel, Namespace, Number, Value};
