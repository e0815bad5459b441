//! The template tree.
//!
//! A [`Node`] is immutable once built. The one exception is the formatter
//! cache of numeric output nodes, which is filled lazily and is safe to use
//! from concurrent renders of the same tree.

use crate::error::{ParameterIndexError, ParseErrorKind, Span};
use crate::expression::Expression;
use crate::number_format::FormatterCache;
use crate::output_format::{MarkupFormatRef, OutputFormatRef};

/// Where an assignment writes its value.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Local,
    Global,
    Namespace,
}

impl Scope {
    pub const fn directive_name(&self) -> &'static str {
        match self {
            Self::Local => "#local",
            Self::Global => "#global",
            Self::Namespace => "#assign",
        }
    }
}

/// What a node parameter means, for tools walking the tree.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ParameterRole {
    Value,
    Condition,
    Content,
    MinimumDecimals,
    MaximumDecimals,
    ListSource,
    TargetLoopVariable,
    Message,
    AssignmentTarget,
    AssignmentSource,
    VariableScope,
    Namespace,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ParameterValue<'n> {
    Expression(&'n Expression),
    Name(&'n str),
    Integer(usize),
    Scope(Scope),
    /// An optional parameter that wasn't given.
    Absent,
}

#[derive(Debug)]
pub struct Interpolation {
    pub(crate) expression: Expression,
    /// The output format of the template at this point.
    pub(crate) output_format: OutputFormatRef,
    /// Set when plain text printed here must be escaped.
    pub(crate) auto_escape: Option<MarkupFormatRef>,
}

#[derive(Debug)]
pub struct NumericOutput {
    pub(crate) expression: Expression,
    /// Explicit `(min, max)` fraction digits from `; mXMY`.
    pub(crate) fraction_digits: Option<(usize, usize)>,
    pub(crate) auto_escape: Option<MarkupFormatRef>,
    pub(crate) cache: FormatterCache,
}

const NOPARSE_END: &str = "</#noparse";

/// `#{...}` without explicit fraction digits prints up to this many.
const DEFAULT_MAX_FRACTION_DIGITS: usize = 50;

#[derive(Debug)]
pub struct SwitchBlock {
    pub(crate) subject: Expression,
    /// Every entry is a [`NodeKind::Case`].
    pub(crate) cases: Vec<Node>,
    pub(crate) default_case: Option<usize>,
}

#[derive(Debug)]
pub struct Case {
    /// `None` for `#default`.
    pub(crate) condition: Option<Expression>,
    pub(crate) nested: Option<Box<Node>>,
}

#[derive(Debug)]
pub struct ListBlock {
    pub(crate) source: Expression,
    pub(crate) loop_variable: String,
    pub(crate) body: Option<Box<Node>>,
    /// A [`NodeKind::ElseOfList`] run when the source is empty.
    pub(crate) else_branch: Option<Box<Node>>,
}

#[derive(Debug)]
pub struct Assignment {
    pub(crate) name: String,
    pub(crate) scope: Scope,
    pub(crate) source: Expression,
    pub(crate) namespace: Option<Expression>,
}

#[derive(Debug)]
pub struct BlockAssignment {
    pub(crate) name: String,
    pub(crate) scope: Scope,
    pub(crate) namespace: Option<Expression>,
    pub(crate) nested: Option<Box<Node>>,
    /// Captured text becomes markup of this format instead of a string.
    pub(crate) markup_format: Option<MarkupFormatRef>,
}

#[derive(Debug)]
pub enum NodeKind {
    Text { text: String },
    Sequence { children: Vec<Node> },
    Interpolation(Interpolation),
    NumericOutput(NumericOutput),
    Switch(SwitchBlock),
    Case(Case),
    List(ListBlock),
    ElseOfList { nested: Option<Box<Node>> },
    Break,
    Stop { message: Option<Expression> },
    AutoEsc { nested: Option<Box<Node>> },
    Assignment(Assignment),
    BlockAssignment(BlockAssignment),
    DebugBreak { nested: Box<Node> },
}

#[derive(Debug)]
pub struct Node {
    kind: NodeKind,
    span: Span,
}

impl Node {
    pub const fn new(kind: NodeKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn text<T: Into<String>>(text: T, span: Span) -> Self {
        Self::new(NodeKind::Text { text: text.into() }, span)
    }

    pub const fn sequence(children: Vec<Self>, span: Span) -> Self {
        Self::new(NodeKind::Sequence { children }, span)
    }

    pub const fn interpolation(
        expression: Expression,
        output_format: OutputFormatRef,
        auto_escape: Option<MarkupFormatRef>,
        span: Span,
    ) -> Self {
        Self::new(
            NodeKind::Interpolation(Interpolation {
                expression,
                output_format,
                auto_escape,
            }),
            span,
        )
    }

    pub fn numeric_output(
        expression: Expression,
        fraction_digits: Option<(usize, usize)>,
        auto_escape: Option<MarkupFormatRef>,
        span: Span,
    ) -> Self {
        let fraction_digits = fraction_digits.map(|(min, max)| (min, max.max(min)));
        let (min, max) = fraction_digits.unwrap_or((0, DEFAULT_MAX_FRACTION_DIGITS));
        Self::new(
            NodeKind::NumericOutput(NumericOutput {
                expression,
                fraction_digits,
                auto_escape,
                cache: FormatterCache::new(min, max),
            }),
            span,
        )
    }

    /// Builds a switch; every case must be a [`Node::case`], with at most one
    /// default among them.
    pub fn switch(subject: Expression, cases: Vec<Self>, span: Span) -> Result<Self, ParseErrorKind> {
        let mut default_case = None;
        for (idx, case) in cases.iter().enumerate() {
            match &case.kind {
                NodeKind::Case(Case {
                    condition: None, ..
                }) => {
                    if default_case.replace(idx).is_some() {
                        return Err(ParseErrorKind::DuplicateDefault);
                    }
                }
                NodeKind::Case(Case {
                    condition: Some(_),
                    ..
                }) => {}
                NodeKind::Text { .. }
                | NodeKind::Sequence { .. }
                | NodeKind::Interpolation(_)
                | NodeKind::NumericOutput(_)
                | NodeKind::Switch(_)
                | NodeKind::List(_)
                | NodeKind::ElseOfList { .. }
                | NodeKind::Break
                | NodeKind::Stop { .. }
                | NodeKind::AutoEsc { .. }
                | NodeKind::Assignment(_)
                | NodeKind::BlockAssignment(_)
                | NodeKind::DebugBreak { .. } => {
                    return Err(ParseErrorKind::Expected {
                        description: format!("#case or #default, found {}", case.node_type_symbol()),
                    });
                }
            }
        }
        Ok(Self::new(
            NodeKind::Switch(SwitchBlock {
                subject,
                cases,
                default_case,
            }),
            span,
        ))
    }

    /// A `#case`, or the `#default` when `condition` is `None`.
    pub fn case(condition: Option<Expression>, nested: Option<Self>, span: Span) -> Self {
        Self::new(
            NodeKind::Case(Case {
                condition,
                nested: nested.map(Box::new),
            }),
            span,
        )
    }

    pub fn list<V: Into<String>>(
        source: Expression,
        loop_variable: V,
        body: Option<Self>,
        else_branch: Option<Self>,
        span: Span,
    ) -> Self {
        Self::new(
            NodeKind::List(ListBlock {
                source,
                loop_variable: loop_variable.into(),
                body: body.map(Box::new),
                else_branch: else_branch.map(Box::new),
            }),
            span,
        )
    }

    pub fn else_of_list(nested: Option<Self>, span: Span) -> Self {
        Self::new(
            NodeKind::ElseOfList {
                nested: nested.map(Box::new),
            },
            span,
        )
    }

    pub const fn break_instruction(span: Span) -> Self {
        Self::new(NodeKind::Break, span)
    }

    pub const fn stop(message: Option<Expression>, span: Span) -> Self {
        Self::new(NodeKind::Stop { message }, span)
    }

    pub fn auto_esc(nested: Option<Self>, span: Span) -> Self {
        Self::new(
            NodeKind::AutoEsc {
                nested: nested.map(Box::new),
            },
            span,
        )
    }

    pub fn assignment<N: Into<String>>(
        name: N,
        scope: Scope,
        source: Expression,
        namespace: Option<Expression>,
        span: Span,
    ) -> Self {
        Self::new(
            NodeKind::Assignment(Assignment {
                name: name.into(),
                scope,
                source,
                namespace,
            }),
            span,
        )
    }

    pub fn block_assignment<N: Into<String>>(
        name: N,
        scope: Scope,
        namespace: Option<Expression>,
        nested: Option<Self>,
        markup_format: Option<MarkupFormatRef>,
        span: Span,
    ) -> Self {
        Self::new(
            NodeKind::BlockAssignment(BlockAssignment {
                name: name.into(),
                scope,
                namespace,
                nested: nested.map(Box::new),
                markup_format,
            }),
            span,
        )
    }

    /// Wraps `nested` in a debugger breakpoint at the same location.
    pub fn debug_break(nested: Self) -> Self {
        let span = nested.span;
        Self::new(
            NodeKind::DebugBreak {
                nested: Box::new(nested),
            },
            span,
        )
    }

    pub const fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub const fn span(&self) -> Span {
        self.span
    }

    pub const fn node_type_symbol(&self) -> &'static str {
        match &self.kind {
            NodeKind::Text { .. } => "#text",
            NodeKind::Sequence { .. } => "#mixed_content",
            NodeKind::Interpolation(_) => "${...}",
            NodeKind::NumericOutput(_) => "#{...}",
            NodeKind::Switch(_) => "#switch",
            NodeKind::Case(Case {
                condition: Some(_),
                ..
            }) => "#case",
            NodeKind::Case(Case {
                condition: None, ..
            }) => "#default",
            NodeKind::List(_) => "#list",
            NodeKind::ElseOfList { .. } => "#else",
            NodeKind::Break => "#break",
            NodeKind::Stop { .. } => "#stop",
            NodeKind::AutoEsc { .. } => "#autoesc",
            NodeKind::Assignment(Assignment { scope, .. })
            | NodeKind::BlockAssignment(BlockAssignment { scope, .. }) => scope.directive_name(),
            NodeKind::DebugBreak { .. } => "#debug_break",
        }
    }

    /// Whether evaluating this node can't have any effect.
    pub fn is_ignorable(&self) -> bool {
        match &self.kind {
            NodeKind::Text { text } => text.is_empty(),
            NodeKind::Sequence { children } => children.iter().all(Self::is_ignorable),
            NodeKind::AutoEsc { nested } | NodeKind::ElseOfList { nested } => {
                nested.as_deref().is_none_or(Self::is_ignorable)
            }
            NodeKind::Interpolation(_)
            | NodeKind::NumericOutput(_)
            | NodeKind::Switch(_)
            | NodeKind::Case(_)
            | NodeKind::List(_)
            | NodeKind::Break
            | NodeKind::Stop { .. }
            | NodeKind::Assignment(_)
            | NodeKind::BlockAssignment(_)
            | NodeKind::DebugBreak { .. } => false,
        }
    }

    /// Whether the nested block may run any number of times rather than at
    /// most once.
    pub const fn is_nested_block_repeater(&self) -> bool {
        matches!(self.kind, NodeKind::List(_))
    }

    /// The single nested block of wrapper-like nodes.
    pub fn nested_block(&self) -> Option<&Self> {
        match &self.kind {
            NodeKind::Case(Case { nested, .. })
            | NodeKind::ElseOfList { nested }
            | NodeKind::AutoEsc { nested }
            | NodeKind::BlockAssignment(BlockAssignment { nested, .. }) => nested.as_deref(),
            NodeKind::List(list) => list.body.as_deref(),
            NodeKind::DebugBreak { nested } => Some(nested),
            NodeKind::Text { .. }
            | NodeKind::Sequence { .. }
            | NodeKind::Interpolation(_)
            | NodeKind::NumericOutput(_)
            | NodeKind::Switch(_)
            | NodeKind::Break
            | NodeKind::Stop { .. }
            | NodeKind::Assignment(_) => None,
        }
    }

    /// All direct child nodes in evaluation order.
    pub fn children(&self) -> Vec<&Self> {
        match &self.kind {
            NodeKind::Sequence { children } => children.iter().collect(),
            NodeKind::Switch(switch) => switch.cases.iter().collect(),
            NodeKind::List(list) => list
                .body
                .as_deref()
                .into_iter()
                .chain(list.else_branch.as_deref())
                .collect(),
            NodeKind::Text { .. }
            | NodeKind::Interpolation(_)
            | NodeKind::NumericOutput(_)
            | NodeKind::Case(_)
            | NodeKind::ElseOfList { .. }
            | NodeKind::Break
            | NodeKind::Stop { .. }
            | NodeKind::AutoEsc { .. }
            | NodeKind::Assignment(_)
            | NodeKind::BlockAssignment(_)
            | NodeKind::DebugBreak { .. } => self.nested_block().into_iter().collect(),
        }
    }

    pub(crate) fn children_mut(&mut self) -> Vec<&mut Self> {
        match &mut self.kind {
            NodeKind::Sequence { children } => children.iter_mut().collect(),
            NodeKind::Switch(switch) => switch.cases.iter_mut().collect(),
            NodeKind::List(list) => list
                .body
                .as_deref_mut()
                .into_iter()
                .chain(list.else_branch.as_deref_mut())
                .collect(),
            NodeKind::Case(Case { nested, .. })
            | NodeKind::ElseOfList { nested }
            | NodeKind::AutoEsc { nested }
            | NodeKind::BlockAssignment(BlockAssignment { nested, .. }) => {
                nested.as_deref_mut().into_iter().collect()
            }
            NodeKind::DebugBreak { nested } => vec![&mut **nested],
            NodeKind::Text { .. }
            | NodeKind::Interpolation(_)
            | NodeKind::NumericOutput(_)
            | NodeKind::Break
            | NodeKind::Stop { .. }
            | NodeKind::Assignment(_) => Vec::new(),
        }
    }

    pub(crate) fn into_kind(self) -> NodeKind {
        self.kind
    }

    fn parameters(&self) -> Vec<(ParameterRole, ParameterValue<'_>)> {
        fn optional(expression: &Option<Expression>) -> ParameterValue<'_> {
            expression
                .as_ref()
                .map_or(ParameterValue::Absent, ParameterValue::Expression)
        }
        match &self.kind {
            NodeKind::Switch(switch) => vec![(
                ParameterRole::Value,
                ParameterValue::Expression(&switch.subject),
            )],
            NodeKind::Case(case) => vec![(ParameterRole::Condition, optional(&case.condition))],
            NodeKind::Interpolation(interpolation) => vec![(
                ParameterRole::Content,
                ParameterValue::Expression(&interpolation.expression),
            )],
            NodeKind::NumericOutput(numeric) => {
                let (min, max) = numeric.fraction_digits.map_or(
                    (ParameterValue::Absent, ParameterValue::Absent),
                    |(min, max)| (ParameterValue::Integer(min), ParameterValue::Integer(max)),
                );
                vec![
                    (
                        ParameterRole::Content,
                        ParameterValue::Expression(&numeric.expression),
                    ),
                    (ParameterRole::MinimumDecimals, min),
                    (ParameterRole::MaximumDecimals, max),
                ]
            }
            NodeKind::List(list) => vec![
                (
                    ParameterRole::ListSource,
                    ParameterValue::Expression(&list.source),
                ),
                (
                    ParameterRole::TargetLoopVariable,
                    ParameterValue::Name(&list.loop_variable),
                ),
            ],
            NodeKind::Stop { message } => vec![(ParameterRole::Message, optional(message))],
            NodeKind::Assignment(assignment) => vec![
                (
                    ParameterRole::AssignmentTarget,
                    ParameterValue::Name(&assignment.name),
                ),
                (
                    ParameterRole::AssignmentSource,
                    ParameterValue::Expression(&assignment.source),
                ),
                (
                    ParameterRole::VariableScope,
                    ParameterValue::Scope(assignment.scope),
                ),
                (ParameterRole::Namespace, optional(&assignment.namespace)),
            ],
            NodeKind::BlockAssignment(assignment) => vec![
                (
                    ParameterRole::AssignmentTarget,
                    ParameterValue::Name(&assignment.name),
                ),
                (
                    ParameterRole::VariableScope,
                    ParameterValue::Scope(assignment.scope),
                ),
                (ParameterRole::Namespace, optional(&assignment.namespace)),
            ],
            NodeKind::Text { .. }
            | NodeKind::Sequence { .. }
            | NodeKind::ElseOfList { .. }
            | NodeKind::Break
            | NodeKind::AutoEsc { .. }
            | NodeKind::DebugBreak { .. } => Vec::new(),
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters().len()
    }

    pub fn parameter_value(&self, index: usize) -> Result<ParameterValue<'_>, ParameterIndexError> {
        let parameters = self.parameters();
        let count = parameters.len();
        parameters
            .into_iter()
            .nth(index)
            .map(|(_, value)| value)
            .ok_or(ParameterIndexError { index, count })
    }

    pub fn parameter_role(&self, index: usize) -> Result<ParameterRole, ParameterIndexError> {
        let parameters = self.parameters();
        let count = parameters.len();
        parameters
            .into_iter()
            .nth(index)
            .map(|(role, _)| role)
            .ok_or(ParameterIndexError { index, count })
    }

    /// Source form when `canonical`, otherwise a short label.
    pub fn dump(&self, canonical: bool) -> String {
        let nested_form = |nested: &Option<Box<Self>>| {
            nested
                .as_deref()
                .map(Self::canonical_form)
                .unwrap_or_default()
        };
        match &self.kind {
            NodeKind::Text { text } => {
                if !canonical {
                    return "#text".to_string();
                }
                if ["${", "#{", "<#", "</#"].iter().any(|s| text.contains(s)) {
                    // A literal `</#noparse` is split across two noparse blocks.
                    let text = text.replace(NOPARSE_END, "<</#noparse><#noparse>/#noparse");
                    format!("<#noparse>{text}</#noparse>")
                } else {
                    text.clone()
                }
            }
            NodeKind::Sequence { children } => {
                if canonical {
                    children.iter().map(Self::canonical_form).collect()
                } else {
                    "#mixed_content".to_string()
                }
            }
            NodeKind::Interpolation(interpolation) => {
                format!("${{{}}}", interpolation.expression.canonical_form())
            }
            NodeKind::NumericOutput(numeric) => match numeric.fraction_digits {
                Some((min, max)) => format!(
                    "#{{{} ; m{}M{}}}",
                    numeric.expression.canonical_form(),
                    min,
                    max
                ),
                None => format!("#{{{}}}", numeric.expression.canonical_form()),
            },
            NodeKind::Switch(switch) => {
                let subject = switch.subject.canonical_form();
                if canonical {
                    let cases: String = switch.cases.iter().map(Self::canonical_form).collect();
                    format!("<#switch {subject}>{cases}</#switch>")
                } else {
                    format!("#switch {subject}")
                }
            }
            NodeKind::Case(case) => {
                let head = match &case.condition {
                    Some(condition) => format!("#case {}", condition.canonical_form()),
                    None => "#default".to_string(),
                };
                if canonical {
                    format!("<{head}>{}", nested_form(&case.nested))
                } else {
                    head
                }
            }
            NodeKind::List(list) => {
                let head = format!(
                    "#list {} as {}",
                    list.source.canonical_form(),
                    list.loop_variable
                );
                if canonical {
                    format!(
                        "<{head}>{}{}</#list>",
                        nested_form(&list.body),
                        nested_form(&list.else_branch)
                    )
                } else {
                    head
                }
            }
            NodeKind::ElseOfList { nested } => {
                if canonical {
                    format!("<#else>{}", nested_form(nested))
                } else {
                    "#else".to_string()
                }
            }
            NodeKind::Break => {
                if canonical {
                    "<#break>".to_string()
                } else {
                    "#break".to_string()
                }
            }
            NodeKind::Stop { message } => {
                let head = match message {
                    Some(message) => format!("#stop {}", message.canonical_form()),
                    None => "#stop".to_string(),
                };
                if canonical { format!("<{head}>") } else { head }
            }
            NodeKind::AutoEsc { nested } => {
                if canonical {
                    format!("<#autoesc>{}</#autoesc>", nested_form(nested))
                } else {
                    "#autoesc".to_string()
                }
            }
            NodeKind::Assignment(assignment) => {
                let mut head = format!(
                    "{} {} = {}",
                    assignment.scope.directive_name(),
                    assignment.name,
                    assignment.source.canonical_form()
                );
                if let Some(namespace) = &assignment.namespace {
                    head.push_str(" in ");
                    head.push_str(&namespace.canonical_form());
                }
                if canonical { format!("<{head}>") } else { head }
            }
            NodeKind::BlockAssignment(assignment) => {
                let symbol = assignment.scope.directive_name();
                let mut head = format!("{} {}", symbol, assignment.name);
                if let Some(namespace) = &assignment.namespace {
                    head.push_str(" in ");
                    head.push_str(&namespace.canonical_form());
                }
                if canonical {
                    format!("<{head}>{}</{symbol}>", nested_form(&assignment.nested))
                } else {
                    format!("{head} = .nested_output")
                }
            }
            NodeKind::DebugBreak { nested } => {
                if canonical {
                    format!(
                        "<#-- debug break -->{}<#--/ debug break -->",
                        nested.canonical_form()
                    )
                } else {
                    "debug break".to_string()
                }
            }
        }
    }

    pub fn canonical_form(&self) -> String {
        self.dump(true)
    }

    pub fn description(&self) -> String {
        self.dump(false)
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical_form())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output_format::UNDEFINED;

    fn span() -> Span {
        Span::new(1, 1, 1, 1)
    }

    fn case(value: i64, body: &str) -> Node {
        Node::case(
            Some(Expression::number(value)),
            Some(Node::text(body, span())),
            span(),
        )
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_switch_rejects_second_default() {
        let error = Node::switch(
            Expression::variable("x"),
            vec![Node::case(None, None, span()), Node::case(None, None, span())],
            span(),
        )
        .unwrap_err();
        assert_eq!(error, ParseErrorKind::DuplicateDefault);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_switch_rejects_non_case_children() {
        let error = Node::switch(
            Expression::variable("x"),
            vec![Node::text("stray", span())],
            span(),
        )
        .unwrap_err();
        assert!(matches!(error, ParseErrorKind::Expected { .. }));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_switch_dump() {
        let switch = Node::switch(
            Expression::variable("x"),
            vec![case(1, "a"), Node::case(None, Some(Node::text("d", span())), span())],
            span(),
        )
        .unwrap();
        assert_eq!(
            switch.canonical_form(),
            "<#switch x><#case 1>a<#default>d</#switch>"
        );
        assert_eq!(switch.description(), "#switch x");
        assert_eq!(switch.children().len(), 2);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_parameters_of_switch() {
        let switch = Node::switch(Expression::variable("x"), vec![case(1, "a")], span()).unwrap();
        assert_eq!(switch.parameter_count(), 1);
        assert_eq!(switch.parameter_role(0), Ok(ParameterRole::Value));
        assert_eq!(
            switch.parameter_value(0),
            Ok(ParameterValue::Expression(&Expression::variable("x")))
        );
        assert_eq!(
            switch.parameter_value(1),
            Err(ParameterIndexError { index: 1, count: 1 })
        );
        assert!(switch.parameter_role(7).is_err());
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_parameters_of_block_assignment() {
        let node = Node::block_assignment(
            "x",
            Scope::Namespace,
            Some(Expression::variable("ns")),
            None,
            None,
            span(),
        );
        assert_eq!(node.parameter_count(), 3);
        assert_eq!(node.parameter_value(0), Ok(ParameterValue::Name("x")));
        assert_eq!(
            node.parameter_value(1),
            Ok(ParameterValue::Scope(Scope::Namespace))
        );
        assert_eq!(node.parameter_role(2), Ok(ParameterRole::Namespace));
        assert_eq!(node.canonical_form(), "<#assign x in ns></#assign>");
        assert_eq!(node.description(), "#assign x in ns = .nested_output");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_parameters_of_numeric_output() {
        let node = Node::numeric_output(Expression::variable("n"), Some((1, 3)), None, span());
        assert_eq!(node.parameter_count(), 3);
        assert_eq!(node.parameter_value(1), Ok(ParameterValue::Integer(1)));
        assert_eq!(node.parameter_role(2), Ok(ParameterRole::MaximumDecimals));
        assert_eq!(node.canonical_form(), "#{n ; m1M3}");

        let plain = Node::numeric_output(Expression::variable("n"), None, None, span());
        assert_eq!(plain.parameter_value(1), Ok(ParameterValue::Absent));
        assert_eq!(plain.canonical_form(), "#{n}");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_wrappers_without_content_parameters() {
        let autoesc = Node::auto_esc(None, span());
        assert_eq!(autoesc.parameter_count(), 0);
        assert!(autoesc.parameter_value(0).is_err());
        assert!(autoesc.is_ignorable());

        let with_body = Node::auto_esc(Some(Node::text("x", span())), span());
        assert!(!with_body.is_ignorable());

        let with_empty = Node::else_of_list(Some(Node::text("", span())), span());
        assert!(with_empty.is_ignorable(), "ignorable body makes the wrapper ignorable");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_repeater_flag() {
        let list = Node::list(Expression::variable("xs"), "x", None, None, span());
        assert!(list.is_nested_block_repeater());
        let switch = Node::switch(Expression::variable("x"), vec![], span()).unwrap();
        assert!(!switch.is_nested_block_repeater());
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_text_with_directive_syntax_is_noparse_wrapped() {
        let text = Node::text("cost: ${price}", span());
        assert_eq!(text.canonical_form(), "<#noparse>cost: ${price}</#noparse>");
        assert_eq!(Node::text("plain", span()).canonical_form(), "plain");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_debug_break_dump() {
        let node = Node::debug_break(Node::interpolation(
            Expression::variable("x"),
            &UNDEFINED,
            None,
            Span::new(4, 2, 4, 5),
        ));
        assert_eq!(node.span().begin_line, 4, "breakpoint takes the nested location");
        assert_eq!(
            node.canonical_form(),
            "<#-- debug break -->${x}<#--/ debug break -->"
        );
        assert_eq!(node.description(), "debug break");
    }
}
