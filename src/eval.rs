//! Evaluation of template nodes against an [`Environment`].

use crate::ast::{
    Assignment, BlockAssignment, Case, Interpolation, ListBlock, Node,
    NodeKind, NumericOutput, Scope, SwitchBlock,
};
use crate::environment::{Environment, EvalResult, Flow};
use crate::error::{TemplateError, TemplateErrorKind};
use crate::expression::{Expression, scalar_to_string};
use crate::output_format::{MarkupFormatRef, MarkupOutput, OutputFormatRef, is_same_format};
use crate::value::{Namespace, Value};

const DEFAULT_STOP_MESSAGE: &str = "";
const DEBUGGER_STOP_MESSAGE: &str = "Stopped by debugger";

impl Node {
    /// Runs this node. Use [`Environment::visit`] rather than calling this
    /// directly, so errors get located and the instruction stack stays right.
    pub fn accept<'a>(&'a self, env: &mut Environment<'a>) -> EvalResult {
        match self.kind() {
            NodeKind::Text { text } => {
                env.out().write_str(text)?;
                Ok(Flow::Normal)
            }
            NodeKind::Sequence { children } => {
                for child in children {
                    match env.visit(child)? {
                        Flow::Normal => {}
                        flow @ (Flow::Break | Flow::Stop { .. }) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            NodeKind::Interpolation(interpolation) => interpolate(interpolation, env),
            NodeKind::NumericOutput(numeric) => numeric_output(numeric, env),
            NodeKind::Switch(switch) => run_switch(switch, env),
            NodeKind::Case(Case { nested, .. }) => match nested {
                Some(nested) => env.visit(nested),
                None => Ok(Flow::Normal),
            },
            NodeKind::ElseOfList { nested } | NodeKind::AutoEsc { nested } => match nested {
                Some(nested) => env.visit_by_hiding_parent(nested),
                None => Ok(Flow::Normal),
            },
            NodeKind::List(list) => run_list(list, env),
            NodeKind::Break => Ok(Flow::Break),
            NodeKind::Stop { message } => {
                let message = match message {
                    Some(message) => {
                        let value = message.eval(env)?;
                        scalar_to_string(&value, env)?
                    }
                    None => DEFAULT_STOP_MESSAGE.to_string(),
                };
                tracing::debug!(%message, "template stopped");
                Ok(Flow::Stop { message })
            }
            NodeKind::Assignment(assignment) => assign(assignment, env),
            NodeKind::BlockAssignment(assignment) => assign_block(assignment, env),
            NodeKind::DebugBreak { nested } => {
                if env.suspend_for_debugger(nested.span().begin_line) {
                    Ok(Flow::Stop {
                        message: DEBUGGER_STOP_MESSAGE.to_string(),
                    })
                } else {
                    env.visit_by_hiding_parent(nested)
                }
            }
        }
    }
}

fn write_plain(
    text: &str,
    auto_escape: Option<MarkupFormatRef>,
    env: &mut Environment<'_>,
) -> EvalResult {
    match auto_escape {
        Some(format) => format.output(text, env.out())?,
        None => env.out().write_str(text)?,
    }
    Ok(Flow::Normal)
}

fn interpolate(interpolation: &Interpolation, env: &mut Environment<'_>) -> EvalResult {
    match interpolation.expression.eval(env)? {
        Value::Markup(markup) => write_markup(&markup, interpolation.output_format, env),
        other => {
            let text = scalar_to_string(&other, env)?;
            write_plain(&text, interpolation.auto_escape, env)
        }
    }
}

/// Prints a markup value into a template of `output_format`. A value of
/// another format goes through its plain text source when mixing isn't
/// allowed.
fn write_markup(
    markup: &MarkupOutput,
    output_format: OutputFormatRef,
    env: &mut Environment<'_>,
) -> EvalResult {
    let context = output_format.as_markup();
    let same_format = context.is_some_and(|context| is_same_format(context, markup.format()));
    if same_format || output_format.is_output_format_mixing_allowed() {
        env.out().write_str(markup.markup_text())?;
        return Ok(Flow::Normal);
    }
    let Some(plain) = markup.plain_text() else {
        return Err(TemplateErrorKind::IncompatibleOutputFormats {
            left: output_format.name().to_string(),
            right: markup.format().name().to_string(),
        }
        .into());
    };
    match context {
        Some(context) => context.output(plain, env.out())?,
        None => env.out().write_str(plain)?,
    }
    Ok(Flow::Normal)
}

fn numeric_output(numeric: &NumericOutput, env: &mut Environment<'_>) -> EvalResult {
    let number = numeric.expression.eval_to_number(env)?;
    let text = numeric.cache.format(&number, env.locale());
    write_plain(&text, numeric.auto_escape, env)
}

/// Runs matching cases with fallthrough until a `#break`. The default case
/// is jumped to only when no case matched.
fn run_switch<'a>(switch: &'a SwitchBlock, env: &mut Environment<'a>) -> EvalResult {
    let subject = switch.subject.eval(env)?;
    let mut processed = false;
    for case_node in &switch.cases {
        if !processed {
            let NodeKind::Case(Case {
                condition: Some(condition),
                ..
            }) = case_node.kind()
            else {
                continue;
            };
            let value = condition.eval(env)?;
            processed = subject.equals(&value)?;
        }
        if processed {
            match env.visit_by_hiding_parent(case_node)? {
                Flow::Normal => {}
                Flow::Break => return Ok(Flow::Normal),
                stop @ Flow::Stop { .. } => return Ok(stop),
            }
        }
    }
    if processed {
        return Ok(Flow::Normal);
    }
    let Some(default_case) = switch
        .default_case
        .and_then(|default_idx| switch.cases.get(default_idx))
    else {
        return Ok(Flow::Normal);
    };
    match env.visit_by_hiding_parent(default_case)? {
        Flow::Break | Flow::Normal => Ok(Flow::Normal),
        stop @ Flow::Stop { .. } => Ok(stop),
    }
}

fn run_list<'a>(list: &'a ListBlock, env: &mut Environment<'a>) -> EvalResult {
    let items = match list.source.eval(env)? {
        Value::Sequence(items) => items,
        other => {
            return Err(TemplateErrorKind::TypeMismatch {
                expected: "a sequence".to_string(),
                found: other.type_name().to_string(),
            }
            .into());
        }
    };
    if items.is_empty() {
        return match &list.else_branch {
            Some(else_branch) => env.visit_by_hiding_parent(else_branch),
            None => Ok(Flow::Normal),
        };
    }
    for item in items {
        let flow = env.with_loop_variable(&list.loop_variable, item, |env| match &list.body {
            Some(body) => env.visit(body),
            None => Ok(Flow::Normal),
        })?;
        match flow {
            Flow::Normal => {}
            Flow::Break => break,
            stop @ Flow::Stop { .. } => return Ok(stop),
        }
    }
    Ok(Flow::Normal)
}

enum Target {
    Namespace(Namespace),
    Current,
    Local,
    Global,
}

fn resolve_target(
    scope: Scope,
    namespace: Option<&Expression>,
    env: &mut Environment<'_>,
) -> Result<Target, TemplateError> {
    if let Some(expression) = namespace {
        return match expression.eval(env)? {
            Value::Namespace(namespace) => Ok(Target::Namespace(namespace)),
            other => Err(TemplateErrorKind::NonNamespaceTarget {
                expression: expression.canonical_form(),
                found: other.type_name().to_string(),
            }
            .into()),
        };
    }
    Ok(match scope {
        Scope::Namespace => Target::Current,
        Scope::Local => Target::Local,
        Scope::Global => Target::Global,
    })
}

fn store(target: Target, name: &str, value: Value, env: &mut Environment<'_>) -> Result<(), TemplateError> {
    match target {
        Target::Namespace(namespace) => {
            namespace.put(name, value);
        }
        Target::Current => env.set_variable(name, value),
        Target::Local => env.set_local_variable(name, value)?,
        Target::Global => env.set_global_variable(name, value),
    }
    Ok(())
}

fn assign(assignment: &Assignment, env: &mut Environment<'_>) -> EvalResult {
    let target = resolve_target(assignment.scope, assignment.namespace.as_ref(), env)?;
    let value = assignment.source.eval(env)?;
    store(target, &assignment.name, value, env)?;
    Ok(Flow::Normal)
}

/// Captures the nested output into a variable. The value is stored when the
/// body finishes normally or through a break or stop; an error leaves the
/// variable untouched.
fn assign_block<'a>(assignment: &'a BlockAssignment, env: &mut Environment<'a>) -> EvalResult {
    let target = resolve_target(assignment.scope, assignment.namespace.as_ref(), env)?;
    let (captured, flow) = match &assignment.nested {
        Some(nested) => env.capture_output(|env| env.visit(nested))?,
        None => (String::new(), Flow::Normal),
    };
    let value = match assignment.markup_format {
        Some(format) => Value::Markup(format.from_markup(&captured)),
        None => Value::String(captured),
    };
    store(target, &assignment.name, value, env)?;
    Ok(flow)
}
