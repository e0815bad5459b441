use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::environment::Debugger;
use crate::error::{EscapadeError, EscapadeResult};
use crate::number_format::Locale;
use crate::output_format::{OutputFormatRef, OutputFormatRegistry, UNDEFINED};
use crate::parser::ParserSettings;
use crate::template::{RenderOutcome, Template};
use crate::value::DataModel;

/// Settings shared by every template an [`Engine`] parses and renders.
#[derive(Clone)]
pub struct EngineConfig {
    locale: Locale,
    output_format: OutputFormatRef,
    auto_escaping: bool,
    debugger: Option<Arc<dyn Debugger>>,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self {
            locale: Locale::english(),
            output_format: &UNDEFINED,
            auto_escaping: true,
            debugger: None,
        }
    }

    pub fn locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    pub fn output_format(mut self, output_format: OutputFormatRef) -> Self {
        self.output_format = output_format;
        self
    }

    pub fn auto_escaping(mut self, auto_escaping: bool) -> Self {
        self.auto_escaping = auto_escaping;
        self
    }

    pub fn debugger(mut self, debugger: Arc<dyn Debugger>) -> Self {
        self.debugger = Some(debugger);
        self
    }

    pub fn parser_settings(&self) -> ParserSettings {
        ParserSettings::new(self.output_format).with_auto_escaping(self.auto_escaping)
    }

    pub fn get_locale(&self) -> &Locale {
        &self.locale
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("locale", &self.locale)
            .field("output_format", &self.output_format.name())
            .field("auto_escaping", &self.auto_escaping)
            .field("debugger", &self.debugger.is_some())
            .finish()
    }
}

/// `Engine` manages a collection of named templates that can be added,
/// rendered, and analyzed for the variables they need.
///
/// # Examples
///
/// ```
/// use escapade::{DataModel, Engine, EngineConfig, HTML};
///
/// let mut engine = Engine::with_config(EngineConfig::new().output_format(&HTML));
/// engine.add_template("greeting", "Hello, ${name}!").unwrap();
///
/// let mut model = DataModel::new();
/// model.insert("name", "<World>");
///
/// let output = engine.render("greeting", &model).unwrap();
/// assert_eq!(output, "Hello, &lt;World&gt;!");
/// ```
#[derive(Debug, Default)]
pub struct Engine {
    config: EngineConfig,
    formats: OutputFormatRegistry,
    templates: HashMap<String, Template>,
}

impl Engine {
    /// Creates an engine with no templates and the default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::new())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            formats: OutputFormatRegistry::new(),
            templates: HashMap::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Makes a custom output format available to
    /// [`Engine::add_template_with_format`].
    pub fn register_output_format(&mut self, format: OutputFormatRef) {
        self.formats.register(format);
    }

    pub fn output_format(&self, name: &str) -> Option<OutputFormatRef> {
        self.formats.get(name)
    }

    /// Adds a new template to the engine with the given name and source,
    /// parsed with the engine's output format.
    ///
    /// # Errors
    ///
    /// * `EscapadeError::TemplateExists` if a template with the given name already exists
    /// * `EscapadeError::Parse` if the template source contains syntax errors
    pub fn add_template<N: AsRef<str>, S: Into<String>>(&mut self, name: N, source: S) -> EscapadeResult<()> {
        let settings = self.config.parser_settings();
        self.insert_template(name.as_ref(), source.into(), settings)
    }

    /// Adds a template whose output format is looked up by name, like
    /// `"HTML"` or `"RTF"`.
    pub fn add_template_with_format<N: AsRef<str>, S: Into<String>>(
        &mut self,
        name: N,
        source: S,
        format_name: &str,
    ) -> EscapadeResult<()> {
        let Some(format) = self.formats.get(format_name) else {
            return Err(EscapadeError::UnknownOutputFormat {
                format_name: format_name.to_string(),
            });
        };
        let settings = ParserSettings::new(format).with_auto_escaping(self.config.auto_escaping);
        self.insert_template(name.as_ref(), source.into(), settings)
    }

    fn insert_template(&mut self, name: &str, source: String, settings: ParserSettings) -> EscapadeResult<()> {
        if self.templates.contains_key(name) {
            return Err(EscapadeError::TemplateExists {
                template_name: name.to_string(),
            });
        }
        let template = Template::parse(source, settings)?.with_name(name);
        tracing::debug!(template = name, format = settings.output_format.name(), "template added");
        self.templates.insert(name.to_string(), template);
        Ok(())
    }

    pub fn get_template(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    fn template(&self, name: &str) -> EscapadeResult<&Template> {
        self.templates
            .get(name)
            .ok_or_else(|| EscapadeError::MissingTemplate {
                template_name: name.to_string(),
            })
    }

    pub fn template_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Renders a template with the given name into a string.
    ///
    /// # Errors
    ///
    /// * `EscapadeError::MissingTemplate` if no template with the given name exists
    /// * `EscapadeError::Stopped` if the template ran `#stop` or the debugger halted it
    /// * `EscapadeError::Template` for errors raised while rendering
    pub fn render<N: AsRef<str>>(&self, template_name: N, data_model: &DataModel) -> EscapadeResult<String> {
        let mut out = String::new();
        match self.process(template_name, data_model, &mut out)? {
            RenderOutcome::Completed => Ok(out),
            RenderOutcome::Stopped { message } => Err(EscapadeError::Stopped { message }),
        }
    }

    /// Renders a template into `out` with the engine's locale and debugger.
    pub fn process<N: AsRef<str>>(
        &self,
        template_name: N,
        data_model: &DataModel,
        out: &mut dyn fmt::Write,
    ) -> EscapadeResult<RenderOutcome> {
        self.process_in_locale(template_name, data_model, out, &self.config.locale)
    }

    /// Like [`Engine::process`], overriding the locale for this render only.
    pub fn process_in_locale<N: AsRef<str>>(
        &self,
        template_name: N,
        data_model: &DataModel,
        out: &mut dyn fmt::Write,
        locale: &Locale,
    ) -> EscapadeResult<RenderOutcome> {
        let template = self.template(template_name.as_ref())?;
        Ok(template.process_with(data_model, out, locale, self.config.debugger.clone())?)
    }

    /// Variables the template reads that the data model doesn't provide.
    ///
    /// Returns an empty vector if the template doesn't exist.
    ///
    /// # Examples
    ///
    /// ```
    /// use escapade::{DataModel, Engine};
    ///
    /// let mut engine = Engine::new();
    /// engine.add_template("greeting", "${greeting}, ${name}!").unwrap();
    ///
    /// let mut model = DataModel::new();
    /// model.insert("greeting", "Hello");
    ///
    /// assert_eq!(engine.referenced_variables("greeting", &model), vec!["name"]);
    /// ```
    pub fn referenced_variables<N: AsRef<str>>(&self, template_name: N, data_model: &DataModel) -> Vec<&str> {
        let Some(template) = self.templates.get(template_name.as_ref()) else {
            return vec![];
        };
        template
            .referenced_variables()
            .into_iter()
            .filter(|name| !data_model.contains(name))
            .collect()
    }

    /// Sets a breakpoint in a template; see [`Template::set_breakpoint`].
    pub fn set_breakpoint(&mut self, template_name: &str, line: usize) -> EscapadeResult<bool> {
        let template = self
            .templates
            .get_mut(template_name)
            .ok_or_else(|| EscapadeError::MissingTemplate {
                template_name: template_name.to_string(),
            })?;
        Ok(template.set_breakpoint(line))
    }

    pub fn clear_breakpoints(&mut self) -> usize {
        self.templates
            .values_mut()
            .map(Template::clear_breakpoints)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TemplateErrorKind;
    use crate::output_format::RTF;

    #[test]
    #[ntest::timeout(100)]
    fn test_duplicate_template() {
        let mut engine = Engine::new();
        engine.add_template("a", "x").unwrap();
        assert_eq!(
            engine.add_template("a", "y"),
            Err(EscapadeError::TemplateExists {
                template_name: "a".to_string()
            })
        );
        assert_eq!(engine.template_names(), vec!["a"]);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_missing_template() {
        let engine = Engine::new();
        assert_eq!(
            engine.render("nope", &DataModel::new()),
            Err(EscapadeError::MissingTemplate {
                template_name: "nope".to_string()
            })
        );
        assert!(engine.referenced_variables("nope", &DataModel::new()).is_empty());
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_template_format_by_name() {
        let mut engine = Engine::new();
        engine
            .add_template_with_format("doc", "{${s}}", "RTF")
            .unwrap();
        let mut model = DataModel::new();
        model.insert("s", "a{b}\\");
        assert_eq!(engine.render("doc", &model).unwrap(), "{a\\{b\\}\\\\}");

        assert_eq!(
            engine.add_template_with_format("x", "", "markdown"),
            Err(EscapadeError::UnknownOutputFormat {
                format_name: "markdown".to_string()
            })
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_render_errors_name_the_template() {
        let mut engine = Engine::with_config(EngineConfig::new().output_format(&RTF));
        engine.add_template("page", "line one\n  ${missing}").unwrap();
        let Err(EscapadeError::Template(error)) = engine.render("page", &DataModel::new()) else {
            panic!("expected a template error");
        };
        assert_eq!(
            error.kind,
            TemplateErrorKind::UndefinedVariable {
                name: "missing".to_string()
            }
        );
        assert_eq!(error.template_name.as_deref(), Some("page"));
        let span = error.span.unwrap();
        assert_eq!((span.begin_line, span.begin_column), (2, 3));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_locale_from_config() {
        let mut engine = Engine::with_config(EngineConfig::new().locale(Locale::parse("fr_FR")));
        engine.add_template("n", "${x}").unwrap();
        let mut model = DataModel::new();
        model.insert("x", 1.5);
        assert_eq!(engine.render("n", &model).unwrap(), "1,5");

        let mut out = String::new();
        engine
            .process_in_locale("n", &model, &mut out, &Locale::english())
            .unwrap();
        assert_eq!(out, "1.5");
    }
}
