//! Per-render execution state.
//!
//! An [`Environment`] is created for one render and never shared between
//! threads. It borrows the template tree for the duration of the render and
//! owns everything that changes while walking it: variable scopes, the output
//! writer stack and the instruction stack used to locate errors.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::ast::Node;
use crate::error::{TemplateError, TemplateErrorKind};
use crate::number_format::{Locale, NumberFormatter};
use crate::value::{DataModel, Namespace, Number, Value};

/// How evaluation of a node ended when it didn't fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Normal,
    /// `#break`; caught by the nearest `#list` or `#switch`.
    Break,
    /// `#stop` or a debugger halt; caught only at the render boundary.
    Stop { message: String },
}

pub type EvalResult = Result<Flow, TemplateError>;

/// Hook called before a debug breakpoint node runs.
pub trait Debugger: Send + Sync {
    /// Returns `true` to halt the render.
    fn suspend_environment(&self, env: &Environment<'_>, source_name: &str, line: usize) -> bool;
}

/// Fraction digit range used by `${...}` when printing numbers.
const INTERPOLATION_MAX_FRACTION_DIGITS: usize = 3;

pub struct Environment<'a> {
    out: &'a mut dyn fmt::Write,
    captures: Vec<String>,
    instruction_stack: Vec<&'a Node>,
    loop_vars: Vec<(&'a str, Value)>,
    local_frames: Vec<HashMap<String, Value>>,
    main_namespace: Namespace,
    current_namespace: Namespace,
    globals: HashMap<String, Value>,
    data_model: Option<&'a DataModel>,
    locale: Locale,
    number_formatter: Option<NumberFormatter>,
    template_name: Option<String>,
    debugger: Option<Arc<dyn Debugger>>,
}

impl<'a> Environment<'a> {
    pub fn new(out: &'a mut dyn fmt::Write) -> Self {
        let main_namespace = Namespace::new();
        Self {
            out,
            captures: Vec::new(),
            instruction_stack: Vec::new(),
            loop_vars: Vec::new(),
            local_frames: Vec::new(),
            current_namespace: main_namespace.clone(),
            main_namespace,
            globals: HashMap::new(),
            data_model: None,
            locale: Locale::english(),
            number_formatter: None,
            template_name: None,
            debugger: None,
        }
    }

    pub fn with_data_model(mut self, data_model: &'a DataModel) -> Self {
        self.data_model = Some(data_model);
        self
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    pub fn with_template_name<N: Into<String>>(mut self, name: N) -> Self {
        self.template_name = Some(name.into());
        self
    }

    pub fn with_debugger(mut self, debugger: Arc<dyn Debugger>) -> Self {
        self.debugger = Some(debugger);
        self
    }

    pub fn template_name(&self) -> Option<&str> {
        self.template_name.as_deref()
    }

    // --- Evaluation ---

    /// Evaluates `node` as a child of the current instruction.
    pub fn visit(&mut self, node: &'a Node) -> EvalResult {
        self.instruction_stack.push(node);
        let result = node.accept(self);
        self.instruction_stack.pop();
        result.map_err(|error| self.locate(error, node))
    }

    /// Evaluates `node` in place of the current instruction, as if it were a
    /// child of the current instruction's parent. The returned [`Flow`] is
    /// passed through untouched, so a `#break` inside reaches the enclosing
    /// loop or switch.
    pub fn visit_by_hiding_parent(&mut self, node: &'a Node) -> EvalResult {
        let hidden = self.instruction_stack.pop();
        self.instruction_stack.push(node);
        let result = node.accept(self);
        self.instruction_stack.pop();
        if let Some(hidden) = hidden {
            self.instruction_stack.push(hidden);
        }
        result.map_err(|error| self.locate(error, node))
    }

    pub fn current_instruction(&self) -> Option<&'a Node> {
        self.instruction_stack.last().copied()
    }

    /// Short descriptions of the executing instructions, innermost first.
    pub fn instruction_stack_snapshot(&self) -> Vec<String> {
        self.instruction_stack
            .iter()
            .rev()
            .map(|node| node.description())
            .collect()
    }

    fn locate(&self, mut error: TemplateError, node: &Node) -> TemplateError {
        if error.span.is_none() {
            error.span = Some(node.span());
            error.instruction = Some(node.description());
            error.template_name.clone_from(&self.template_name);
        }
        error
    }

    pub(crate) fn suspend_for_debugger(&self, line: usize) -> bool {
        let Some(debugger) = &self.debugger else {
            return false;
        };
        let source_name = self.template_name.as_deref().unwrap_or_default();
        tracing::debug!(source_name, line, "suspending for debugger");
        debugger.suspend_environment(self, source_name, line)
    }

    // --- Output ---

    /// The writer output currently goes to: the innermost capture buffer, or
    /// the render's own writer.
    pub fn out(&mut self) -> &mut dyn fmt::Write {
        if let Some(buffer) = self.captures.last_mut() {
            return buffer;
        }
        &mut *self.out
    }

    /// Runs `body` with output redirected into a fresh buffer.
    ///
    /// The previous writer is restored on every path before this returns.
    /// On success the captured text is returned along with the body's flow.
    pub fn capture_output<F>(&mut self, body: F) -> Result<(String, Flow), TemplateError>
    where
        F: FnOnce(&mut Self) -> EvalResult,
    {
        self.captures.push(String::new());
        tracing::trace!(depth = self.captures.len(), "capture started");
        let result = body(self);
        let captured = self.captures.pop().unwrap_or_default();
        tracing::trace!(depth = self.captures.len(), bytes = captured.len(), "capture closed");
        result.map(|flow| (captured, flow))
    }

    pub fn capture_depth(&self) -> usize {
        self.captures.len()
    }

    // --- Variables ---

    /// Resolves `name`: loop variables, local frames (innermost first), the
    /// current namespace, globals, then the data model.
    pub fn get_variable(&self, name: &str) -> Option<Value> {
        if let Some((_, value)) = self.loop_vars.iter().rev().find(|(n, _)| *n == name) {
            return Some(value.clone());
        }
        if let Some(value) = self.local_frames.iter().rev().find_map(|frame| frame.get(name)) {
            return Some(value.clone());
        }
        if let Some(value) = self.current_namespace.get(name) {
            return Some(value);
        }
        if let Some(value) = self.globals.get(name) {
            return Some(value.clone());
        }
        self.data_model.and_then(|model| model.get(name)).cloned()
    }

    pub fn set_local_variable<N: Into<String>>(
        &mut self,
        name: N,
        value: Value,
    ) -> Result<(), TemplateErrorKind> {
        let name = name.into();
        match self.local_frames.last_mut() {
            Some(frame) => {
                frame.insert(name, value);
                Ok(())
            }
            None => Err(TemplateErrorKind::LocalOutsideMacro { name }),
        }
    }

    /// Sets a variable in the current namespace.
    pub fn set_variable<N: Into<String>>(&mut self, name: N, value: Value) {
        self.current_namespace.put(name, value);
    }

    pub fn set_global_variable<N: Into<String>>(&mut self, name: N, value: Value) {
        self.globals.insert(name.into(), value);
    }

    pub fn get_global_variable(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub fn get_local_variable(&self, name: &str) -> Option<&Value> {
        self.local_frames.last().and_then(|frame| frame.get(name))
    }

    pub fn push_local_frame(&mut self) {
        self.local_frames.push(HashMap::new());
    }

    pub fn pop_local_frame(&mut self) -> Option<HashMap<String, Value>> {
        self.local_frames.pop()
    }

    /// Runs `body` inside a fresh local frame, as a macro call would.
    pub fn with_local_frame<R, F>(&mut self, body: F) -> R
    where
        F: FnOnce(&mut Self) -> R,
    {
        self.push_local_frame();
        let result = body(self);
        self.pop_local_frame();
        result
    }

    pub(crate) fn with_loop_variable<F>(&mut self, name: &'a str, value: Value, body: F) -> EvalResult
    where
        F: FnOnce(&mut Self) -> EvalResult,
    {
        self.loop_vars.push((name, value));
        let result = body(self);
        self.loop_vars.pop();
        result
    }

    pub fn main_namespace(&self) -> &Namespace {
        &self.main_namespace
    }

    pub fn current_namespace(&self) -> &Namespace {
        &self.current_namespace
    }

    /// Makes `namespace` current, returning the previous one.
    pub fn set_current_namespace(&mut self, namespace: Namespace) -> Namespace {
        std::mem::replace(&mut self.current_namespace, namespace)
    }

    /// Binds a shared namespace under `alias` in the main namespace. The
    /// mapping is aliased, not copied.
    pub fn import_namespace<N: Into<String>>(&mut self, alias: N, namespace: &Namespace) {
        self.main_namespace
            .put(alias, Value::Namespace(namespace.clone()));
    }

    // --- Locale & numbers ---

    pub fn locale(&self) -> &Locale {
        &self.locale
    }

    pub fn set_locale(&mut self, locale: Locale) {
        self.locale = locale;
    }

    /// Formats a number the way `${...}` prints it in the current locale.
    pub fn format_number(&mut self, number: &Number) -> String {
        let stale = self
            .number_formatter
            .as_ref()
            .is_none_or(|formatter| formatter.locale() != &self.locale);
        if stale {
            self.number_formatter = Some(NumberFormatter::new(
                self.locale.clone(),
                0,
                INTERPOLATION_MAX_FRACTION_DIGITS,
            ));
        }
        match &self.number_formatter {
            Some(formatter) => formatter.format(number),
            None => NumberFormatter::new(self.locale.clone(), 0, INTERPOLATION_MAX_FRACTION_DIGITS)
                .format(number),
        }
    }
}

impl fmt::Debug for Environment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("template_name", &self.template_name)
            .field("locale", &self.locale)
            .field("capture_depth", &self.captures.len())
            .field("local_frames", &self.local_frames.len())
            .field("instruction_stack", &self.instruction_stack_snapshot())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ntest::timeout(100)]
    fn test_resolution_order() {
        let mut model = DataModel::new();
        model.insert("x", "data");
        let mut out = String::new();
        let mut env = Environment::new(&mut out).with_data_model(&model);

        assert_eq!(env.get_variable("x"), Some(Value::from("data")));
        env.set_global_variable("x", Value::from("global"));
        assert_eq!(env.get_variable("x"), Some(Value::from("global")));
        env.set_variable("x", Value::from("namespace"));
        assert_eq!(env.get_variable("x"), Some(Value::from("namespace")));

        env.with_local_frame(|env| {
            env.set_local_variable("x", Value::from("local")).unwrap();
            assert_eq!(env.get_variable("x"), Some(Value::from("local")));
        });
        assert_eq!(
            env.get_variable("x"),
            Some(Value::from("namespace")),
            "local frame is gone after the call"
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_local_frames_search_innermost_first() {
        let mut out = String::new();
        let mut env = Environment::new(&mut out);
        env.push_local_frame();
        env.set_local_variable("outer", Value::from(1_i64)).unwrap();
        env.set_local_variable("shadowed", Value::from(1_i64)).unwrap();
        env.push_local_frame();
        env.set_local_variable("shadowed", Value::from(2_i64)).unwrap();

        assert_eq!(env.get_variable("shadowed"), Some(Value::from(2_i64)));
        assert_eq!(env.get_variable("outer"), Some(Value::from(1_i64)));
        assert!(env.get_local_variable("outer").is_none(), "only the innermost frame is local");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_local_without_frame_fails() {
        let mut out = String::new();
        let mut env = Environment::new(&mut out);
        assert_eq!(
            env.set_local_variable("x", Value::from(1_i64)),
            Err(TemplateErrorKind::LocalOutsideMacro {
                name: "x".to_string()
            })
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_nested_captures_restore_writers() {
        let mut out = String::new();
        {
            let mut env = Environment::new(&mut out);
            env.out().write_str("a").unwrap();
            let (outer, flow) = env
                .capture_output(|env| {
                    env.out().write_str("b")?;
                    let (inner, _) = env.capture_output(|env| {
                        env.out().write_str("c")?;
                        Ok(Flow::Normal)
                    })?;
                    assert_eq!(inner, "c");
                    env.out().write_str("d")?;
                    Ok(Flow::Normal)
                })
                .unwrap();
            assert_eq!(outer, "bd");
            assert_eq!(flow, Flow::Normal);
            assert_eq!(env.capture_depth(), 0);
            env.out().write_str("e").unwrap();
        }
        assert_eq!(out, "ae");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_capture_restores_writer_on_error_and_signal() {
        let mut out = String::new();
        {
            let mut env = Environment::new(&mut out);
            let error = env
                .capture_output(|env| {
                    env.out().write_str("lost")?;
                    Err(TemplateErrorKind::UncaughtBreak.into())
                })
                .unwrap_err();
            assert_eq!(error.kind, TemplateErrorKind::UncaughtBreak);
            assert_eq!(env.capture_depth(), 0, "writer restored after an error");

            let (captured, flow) = env
                .capture_output(|env| {
                    env.out().write_str("kept")?;
                    Ok(Flow::Break)
                })
                .unwrap();
            assert_eq!((captured.as_str(), flow), ("kept", Flow::Break));
            assert_eq!(env.capture_depth(), 0, "writer restored after a break");
            env.out().write_str("main").unwrap();
        }
        assert_eq!(out, "main");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_import_aliases_namespace() {
        let mut out = String::new();
        let mut env = Environment::new(&mut out);
        let lib = Namespace::new();
        env.import_namespace("lib", &lib);
        lib.put("late", Value::from(true));

        match env.get_variable("lib") {
            Some(Value::Namespace(ns)) => {
                assert!(ns.ptr_eq(&lib));
                assert_eq!(ns.get("late"), Some(Value::from(true)));
            }
            other => panic!("expected a namespace, got {other:?}"),
        }
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_format_number_follows_locale() {
        let mut out = String::new();
        let mut env = Environment::new(&mut out);
        assert_eq!(env.format_number(&Number::Float(1.23456)), "1.235");
        env.set_locale(Locale::parse("de_DE"));
        assert_eq!(env.format_number(&Number::Float(1.5)), "1,5");
    }
}
