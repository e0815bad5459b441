use std::fmt;
use std::sync::Arc;

use crate::ast::{Node, NodeKind, ParameterValue};
use crate::environment::{Debugger, Environment, Flow};
use crate::error::{EscapadeError, EscapadeResult, ParseError, TemplateError, TemplateErrorKind};
use crate::number_format::Locale;
use crate::parser::{ParserSettings, parse};
use crate::value::DataModel;

/// How a render ended without an error.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Completed,
    /// A `#stop` or the debugger halted the render; output written so far is
    /// kept.
    Stopped { message: String },
}

/// A parsed template that can be rendered against a data model.
///
/// The tree is immutable while rendering, so one `Template` can be shared
/// between threads and rendered concurrently, each render with its own
/// locale.
///
/// # Example
///
/// ```rust
/// use escapade::{DataModel, Template};
///
/// let template = Template::new("<#switch n><#case 1>one<#break><#default>many</#switch>").unwrap();
///
/// let mut model = DataModel::new();
/// model.insert("n", 1_i64);
///
/// assert_eq!(template.render(&model).unwrap(), "one");
/// ```
pub struct Template {
    source: String,
    settings: ParserSettings,
    root: Node,
    pub(crate) name: Option<String>,
}

impl Template {
    /// Parses `source` with the default settings: no output format, so
    /// nothing is auto-escaped.
    ///
    /// # Errors
    ///
    /// Returns an `EscapadeError::Parse` error if the template syntax is invalid.
    pub fn new<S: Into<String>>(source: S) -> EscapadeResult<Self> {
        Ok(Self::parse(source, ParserSettings::default())?)
    }

    pub fn parse<S: Into<String>>(source: S, settings: ParserSettings) -> Result<Self, ParseError> {
        let source = source.into();
        let root = parse(&source, &settings)?;
        Ok(Self {
            source,
            settings,
            root,
            name: None,
        })
    }

    pub fn with_name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn settings(&self) -> &ParserSettings {
        &self.settings
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Source text equivalent to this template, rebuilt from the tree.
    pub fn canonical_form(&self) -> String {
        self.root.canonical_form()
    }

    /// Renders into `out` in the English locale.
    pub fn process(&self, data_model: &DataModel, out: &mut dyn fmt::Write) -> Result<RenderOutcome, TemplateError> {
        self.process_with(data_model, out, &Locale::english(), None)
    }

    /// Renders into `out` with an explicit locale and an optional debugger.
    pub fn process_with(
        &self,
        data_model: &DataModel,
        out: &mut dyn fmt::Write,
        locale: &Locale,
        debugger: Option<Arc<dyn Debugger>>,
    ) -> Result<RenderOutcome, TemplateError> {
        let name = self.name.as_deref().unwrap_or_default();
        tracing::debug!(template = name, %locale, "render started");

        let mut env = Environment::new(out)
            .with_data_model(data_model)
            .with_locale(locale.clone())
            .with_template_name(name);
        if let Some(debugger) = debugger {
            env = env.with_debugger(debugger);
        }

        let outcome = match env.visit(&self.root)? {
            Flow::Normal => RenderOutcome::Completed,
            Flow::Stop { message } => RenderOutcome::Stopped { message },
            Flow::Break => {
                let mut error = TemplateError::new(TemplateErrorKind::UncaughtBreak);
                error.template_name = self.name.clone();
                return Err(error);
            }
        };
        tracing::debug!(template = name, ?outcome, "render finished");
        Ok(outcome)
    }

    /// Renders to a string. A `#stop` becomes `EscapadeError::Stopped`.
    pub fn render(&self, data_model: &DataModel) -> EscapadeResult<String> {
        let mut out = String::new();
        match self.process(data_model, &mut out)? {
            RenderOutcome::Completed => Ok(out),
            RenderOutcome::Stopped { message } => Err(EscapadeError::Stopped { message }),
        }
    }

    /// Names of the variables the template reads that it doesn't bind itself
    /// as loop variables, sorted and without duplicates.
    ///
    /// # Example
    ///
    /// ```
    /// use escapade::Template;
    ///
    /// let template = Template::new("<#list items as i>${i + sep}</#list>").unwrap();
    /// assert_eq!(template.referenced_variables(), vec!["items", "sep"]);
    /// ```
    pub fn referenced_variables(&self) -> Vec<&str> {
        let mut variables = Vec::new();
        let mut loop_variables = Vec::new();
        collect_variables_from_node(&self.root, &mut variables, &mut loop_variables);
        variables.sort_unstable();
        variables.dedup();
        variables
    }

    /// Wraps the first node starting on `line` in a debugger breakpoint.
    /// Returns whether a breakpoint is now set on that line.
    pub fn set_breakpoint(&mut self, line: usize) -> bool {
        insert_breakpoint(&mut self.root, line)
    }

    /// Removes every breakpoint, returning how many there were.
    pub fn clear_breakpoints(&mut self) -> usize {
        remove_breakpoints(&mut self.root)
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("output_format", &self.settings.output_format.name())
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

fn collect_variables_from_node<'a>(
    node: &'a Node,
    variables: &mut Vec<&'a str>,
    loop_variables: &mut Vec<&'a str>,
) {
    let mut found = Vec::new();
    for index in 0..node.parameter_count() {
        if let Ok(ParameterValue::Expression(expression)) = node.parameter_value(index) {
            expression.collect_variables(&mut found);
        }
    }
    variables.extend(
        found
            .into_iter()
            .filter(|name| !loop_variables.contains(name)),
    );

    if let NodeKind::List(_) = node.kind() {
        // The loop variable is only bound inside the body, not the #else.
        let loop_variable = if let Ok(ParameterValue::Name(name)) = node.parameter_value(1) {
            Some(name)
        } else {
            None
        };
        if let Some(body) = node.nested_block() {
            loop_variables.extend(loop_variable);
            collect_variables_from_node(body, variables, loop_variables);
            if loop_variable.is_some() {
                loop_variables.pop();
            }
        }
        for child in node.children().into_iter().skip(usize::from(node.nested_block().is_some())) {
            collect_variables_from_node(child, variables, loop_variables);
        }
        return;
    }

    for child in node.children() {
        collect_variables_from_node(child, variables, loop_variables);
    }
}

fn insert_breakpoint(node: &mut Node, line: usize) -> bool {
    if node.span().begin_line == line {
        match node.kind() {
            NodeKind::DebugBreak { .. } => return true,
            // Structural nodes can't be wrapped; their children can.
            NodeKind::Sequence { .. } | NodeKind::Case(_) | NodeKind::ElseOfList { .. } => {}
            NodeKind::Text { .. }
            | NodeKind::Interpolation(_)
            | NodeKind::NumericOutput(_)
            | NodeKind::Switch(_)
            | NodeKind::List(_)
            | NodeKind::Break
            | NodeKind::Stop { .. }
            | NodeKind::AutoEsc { .. }
            | NodeKind::Assignment(_)
            | NodeKind::BlockAssignment(_) => {
                let placeholder = Node::text("", node.span());
                let target = std::mem::replace(node, placeholder);
                *node = Node::debug_break(target);
                tracing::debug!(line, "breakpoint set");
                return true;
            }
        }
    }
    node.children_mut()
        .into_iter()
        .any(|child| insert_breakpoint(child, line))
}

fn remove_breakpoints(node: &mut Node) -> usize {
    let mut removed = 0;
    while let NodeKind::DebugBreak { .. } = node.kind() {
        let placeholder = Node::text("", node.span());
        if let NodeKind::DebugBreak { nested } = std::mem::replace(node, placeholder).into_kind() {
            *node = *nested;
            removed += 1;
        }
    }
    for child in node.children_mut() {
        removed += remove_breakpoints(child);
    }
    removed
}

#[cfg(feature = "serde")]
impl serde::Serialize for Template {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("Template", 4)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("source", &self.source)?;
        state.serialize_field("output_format", self.settings.output_format.name())?;
        state.serialize_field("auto_escaping", &self.settings.auto_escaping)?;
        state.end()
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Template {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Define a helper struct for deserialization
        #[derive(serde::Deserialize)]
        struct TemplateHelper {
            name: Option<String>,
            source: String,
            output_format: Option<String>,
            auto_escaping: Option<bool>,
        }

        let helper = TemplateHelper::deserialize(deserializer)?;
        let mut settings = ParserSettings::default();
        if let Some(format_name) = helper.output_format {
            settings.output_format = crate::output_format::output_format_by_name(&format_name)
                .ok_or_else(|| {
                    serde::de::Error::custom(format!("Unknown output format: {}", format_name))
                })?;
        }
        if let Some(auto_escaping) = helper.auto_escaping {
            settings.auto_escaping = auto_escaping;
        }

        // Rebuild the tree from the source
        let mut template = Self::parse(helper.source, settings)
            .map_err(|e| serde::de::Error::custom(format!("Failed to parse template: {}", e)))?;
        template.name = helper.name;
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output_format::RTF;

    #[test]
    #[ntest::timeout(100)]
    fn test_render_switch() {
        let template = Template::new(
            "<#switch x><#case 1>a<#case 2>b<#case 3>c<#default>d</#switch>",
        )
        .unwrap();
        let mut model = DataModel::new();
        model.insert("x", 2_i64);
        assert_eq!(template.render(&model).unwrap(), "bcd");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_stop_outcome_keeps_output() {
        let template = Template::new("before<#stop 'done'>after").unwrap();
        let mut out = String::new();
        let outcome = template.process(&DataModel::new(), &mut out).unwrap();
        assert_eq!(
            outcome,
            RenderOutcome::Stopped {
                message: "done".to_string()
            }
        );
        assert_eq!(out, "before");
        assert_eq!(
            template.render(&DataModel::new()),
            Err(EscapadeError::Stopped {
                message: "done".to_string()
            })
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_uncaught_break_from_built_tree() {
        // The parser rejects this, so build the tree by hand.
        let template = Template {
            source: String::new(),
            settings: ParserSettings::default(),
            root: Node::break_instruction(crate::error::Span::new(1, 1, 1, 9)),
            name: Some("t".to_string()),
        };
        let error = template.process(&DataModel::new(), &mut String::new()).unwrap_err();
        assert_eq!(error.kind, TemplateErrorKind::UncaughtBreak);
        assert_eq!(error.template_name.as_deref(), Some("t"));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_referenced_variables_skip_loop_variables() {
        let template = Template::new(
            "<#list xs as x>${x}${y}<#else>${x}</#list><#switch s><#case c>${z?html}</#switch>",
        )
        .unwrap();
        assert_eq!(template.referenced_variables(), vec!["c", "s", "x", "xs", "y", "z"]);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_breakpoints() {
        let mut template = Template::new("a\n${x}\nb").unwrap();
        assert!(template.set_breakpoint(2));
        assert!(template.set_breakpoint(2), "setting twice keeps one breakpoint");
        assert!(!template.set_breakpoint(9));
        assert!(template.canonical_form().contains("<#-- debug break -->${x}"));
        assert_eq!(template.clear_breakpoints(), 1);
        assert_eq!(template.canonical_form(), "a\n${x}\nb");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_rtf_capture_isnt_escaped_twice() {
        let template = Template::parse(
            "<#assign x>\\par {b}</#assign>${x}",
            ParserSettings::new(&RTF),
        )
        .unwrap();
        assert_eq!(template.render(&DataModel::new()).unwrap(), "\\par {b}");
    }
}
