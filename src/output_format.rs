//! Output formats and the markup output model.
//!
//! An [`OutputFormat`] names the kind of text a template produces. Formats
//! that have an escaping rule additionally implement [`MarkupOutputFormat`];
//! values already escaped for such a format travel as [`MarkupOutput`] and are
//! never escaped again by that same format.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::TemplateErrorKind;

pub type OutputFormatRef = &'static dyn OutputFormat;
pub type MarkupFormatRef = &'static dyn MarkupOutputFormat;

pub trait OutputFormat: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn mime_type(&self) -> Option<&str>;

    /// Whether markup of any other format may be printed into this format
    /// without conversion.
    fn is_output_format_mixing_allowed(&self) -> bool;

    fn as_markup(&self) -> Option<&dyn MarkupOutputFormat>;
}

pub trait MarkupOutputFormat: OutputFormat {
    fn escape_plain_text(&self, plain_text: &str) -> String {
        let mut escaped = String::with_capacity(plain_text.len());
        // Writing into a String can't fail.
        self.output(plain_text, &mut escaped).ok();
        escaped
    }

    /// Escapes `plain_text` straight into `out`.
    fn output(&self, plain_text: &str, out: &mut dyn fmt::Write) -> fmt::Result;

    /// Whether the legacy escaping built-in `builtin_name` (like `html` in
    /// `x?html`) may pass a value of this format through unchanged.
    fn is_legacy_builtin_bypassed(&self, builtin_name: &str) -> bool;

    fn is_auto_escaped_by_default(&self) -> bool {
        true
    }
}

impl dyn MarkupOutputFormat {
    /// Wraps text that is already valid markup of this format.
    pub fn from_markup(&'static self, markup: &str) -> MarkupOutput {
        MarkupOutput {
            plain: None,
            markup: Arc::from(markup),
            format: self,
        }
    }

    pub fn from_plain_text(&'static self, plain_text: &str) -> MarkupOutput {
        MarkupOutput {
            plain: Some(Arc::from(plain_text)),
            markup: Arc::from(self.escape_plain_text(plain_text)),
            format: self,
        }
    }

    /// Writes a markup value, failing if it belongs to another format.
    pub fn output_markup(&self, value: &MarkupOutput, out: &mut dyn fmt::Write) -> Result<(), TemplateErrorKind> {
        if !is_same_format(self, value.format) {
            return Err(TemplateErrorKind::IncompatibleOutputFormats {
                left: self.name().to_string(),
                right: value.format.name().to_string(),
            });
        }
        out.write_str(value.markup_text())
            .map_err(|_| TemplateErrorKind::Write)
    }
}

/// Formats are singletons identified by name.
pub fn is_same_format(left: &dyn MarkupOutputFormat, right: &dyn MarkupOutputFormat) -> bool {
    left.name() == right.name()
}

/// Immutable markup value tagged with the format that produced it.
#[derive(Clone)]
pub struct MarkupOutput {
    plain: Option<Arc<str>>,
    markup: Arc<str>,
    format: MarkupFormatRef,
}

impl MarkupOutput {
    pub fn format(&self) -> MarkupFormatRef {
        self.format
    }

    pub fn markup_text(&self) -> &str {
        &self.markup
    }

    /// The source text, if this value was built by escaping plain text.
    pub fn plain_text(&self) -> Option<&str> {
        self.plain.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.markup.is_empty()
    }

    /// Concatenates two markup values of the same format.
    pub fn concat(&self, other: &Self) -> Result<Self, TemplateErrorKind> {
        if !is_same_format(self.format, other.format) {
            return Err(TemplateErrorKind::IncompatibleOutputFormats {
                left: self.format.name().to_string(),
                right: other.format.name().to_string(),
            });
        }
        let plain = match (&self.plain, &other.plain) {
            (Some(left), Some(right)) => Some(Arc::from(format!("{left}{right}"))),
            (Some(_), None) | (None, Some(_)) | (None, None) => None,
        };
        Ok(Self {
            plain,
            markup: Arc::from(format!("{}{}", self.markup, other.markup)),
            format: self.format,
        })
    }
}

impl fmt::Debug for MarkupOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkupOutput")
            .field("format", &self.format.name())
            .field("plain", &self.plain)
            .field("markup", &self.markup)
            .finish()
    }
}

impl PartialEq for MarkupOutput {
    fn eq(&self, other: &Self) -> bool {
        is_same_format(self.format, other.format) && self.markup == other.markup
    }
}

impl Eq for MarkupOutput {}

fn escape_into(
    text: &str,
    out: &mut dyn fmt::Write,
    replacement: fn(char) -> Option<&'static str>,
) -> fmt::Result {
    let mut last = 0;
    for (idx, ch) in text.char_indices() {
        if let Some(rep) = replacement(ch) {
            out.write_str(text.get(last..idx).unwrap_or_default())?;
            out.write_str(rep)?;
            last = idx + ch.len_utf8();
        }
    }
    out.write_str(text.get(last..).unwrap_or_default())
}

const fn html_replacement(ch: char) -> Option<&'static str> {
    match ch {
        '<' => Some("&lt;"),
        '>' => Some("&gt;"),
        '&' => Some("&amp;"),
        '"' => Some("&quot;"),
        '\'' => Some("&#39;"),
        _ => None,
    }
}

const fn xml_replacement(ch: char) -> Option<&'static str> {
    match ch {
        '\'' => Some("&apos;"),
        other => html_replacement(other),
    }
}

const fn rtf_replacement(ch: char) -> Option<&'static str> {
    match ch {
        '\\' => Some("\\\\"),
        '{' => Some("\\{"),
        '}' => Some("\\}"),
        _ => None,
    }
}

/// Plain text output. It has no escaping rule and accepts no markup.
#[derive(Debug, Copy, Clone, Default)]
pub struct PlainTextOutputFormat;

impl OutputFormat for PlainTextOutputFormat {
    fn name(&self) -> &str {
        "plainText"
    }

    fn mime_type(&self) -> Option<&str> {
        Some("text/plain")
    }

    fn is_output_format_mixing_allowed(&self) -> bool {
        false
    }

    fn as_markup(&self) -> Option<&dyn MarkupOutputFormat> {
        None
    }
}

/// The format of templates that never declared one. Markup of any format
/// is printed into it as-is.
#[derive(Debug, Copy, Clone, Default)]
pub struct UndefinedOutputFormat;

impl OutputFormat for UndefinedOutputFormat {
    fn name(&self) -> &str {
        "undefined"
    }

    fn mime_type(&self) -> Option<&str> {
        None
    }

    fn is_output_format_mixing_allowed(&self) -> bool {
        true
    }

    fn as_markup(&self) -> Option<&dyn MarkupOutputFormat> {
        None
    }
}

#[derive(Debug, Copy, Clone, Default)]
pub struct HtmlOutputFormat;

impl OutputFormat for HtmlOutputFormat {
    fn name(&self) -> &str {
        "HTML"
    }

    fn mime_type(&self) -> Option<&str> {
        Some("text/html")
    }

    fn is_output_format_mixing_allowed(&self) -> bool {
        false
    }

    fn as_markup(&self) -> Option<&dyn MarkupOutputFormat> {
        Some(self)
    }
}

impl MarkupOutputFormat for HtmlOutputFormat {
    fn output(&self, plain_text: &str, out: &mut dyn fmt::Write) -> fmt::Result {
        escape_into(plain_text, out, html_replacement)
    }

    fn is_legacy_builtin_bypassed(&self, builtin_name: &str) -> bool {
        builtin_name == "html"
    }
}

#[derive(Debug, Copy, Clone, Default)]
pub struct XhtmlOutputFormat;

impl OutputFormat for XhtmlOutputFormat {
    fn name(&self) -> &str {
        "XHTML"
    }

    fn mime_type(&self) -> Option<&str> {
        Some("application/xhtml+xml")
    }

    fn is_output_format_mixing_allowed(&self) -> bool {
        false
    }

    fn as_markup(&self) -> Option<&dyn MarkupOutputFormat> {
        Some(self)
    }
}

impl MarkupOutputFormat for XhtmlOutputFormat {
    fn output(&self, plain_text: &str, out: &mut dyn fmt::Write) -> fmt::Result {
        escape_into(plain_text, out, html_replacement)
    }

    fn is_legacy_builtin_bypassed(&self, builtin_name: &str) -> bool {
        builtin_name == "html" || builtin_name == "xhtml"
    }
}

#[derive(Debug, Copy, Clone, Default)]
pub struct XmlOutputFormat;

impl OutputFormat for XmlOutputFormat {
    fn name(&self) -> &str {
        "XML"
    }

    fn mime_type(&self) -> Option<&str> {
        Some("application/xml")
    }

    fn is_output_format_mixing_allowed(&self) -> bool {
        false
    }

    fn as_markup(&self) -> Option<&dyn MarkupOutputFormat> {
        Some(self)
    }
}

impl MarkupOutputFormat for XmlOutputFormat {
    fn output(&self, plain_text: &str, out: &mut dyn fmt::Write) -> fmt::Result {
        escape_into(plain_text, out, xml_replacement)
    }

    fn is_legacy_builtin_bypassed(&self, builtin_name: &str) -> bool {
        builtin_name == "xml"
    }
}

/// Rich Text Format: backslash and curly braces are control characters.
#[derive(Debug, Copy, Clone, Default)]
pub struct RtfOutputFormat;

impl OutputFormat for RtfOutputFormat {
    fn name(&self) -> &str {
        "RTF"
    }

    fn mime_type(&self) -> Option<&str> {
        Some("text/rtf")
    }

    fn is_output_format_mixing_allowed(&self) -> bool {
        false
    }

    fn as_markup(&self) -> Option<&dyn MarkupOutputFormat> {
        Some(self)
    }
}

impl MarkupOutputFormat for RtfOutputFormat {
    fn output(&self, plain_text: &str, out: &mut dyn fmt::Write) -> fmt::Result {
        escape_into(plain_text, out, rtf_replacement)
    }

    fn is_legacy_builtin_bypassed(&self, builtin_name: &str) -> bool {
        builtin_name == "rtf"
    }
}

pub static PLAIN_TEXT: PlainTextOutputFormat = PlainTextOutputFormat;
pub static UNDEFINED: UndefinedOutputFormat = UndefinedOutputFormat;
pub static HTML: HtmlOutputFormat = HtmlOutputFormat;
pub static XHTML: XhtmlOutputFormat = XhtmlOutputFormat;
pub static XML: XmlOutputFormat = XmlOutputFormat;
pub static RTF: RtfOutputFormat = RtfOutputFormat;

fn builtin_formats() -> [OutputFormatRef; 6] {
    [&PLAIN_TEXT, &UNDEFINED, &HTML, &XHTML, &XML, &RTF]
}

/// Looks up one of the built-in formats by its name.
pub fn output_format_by_name(name: &str) -> Option<OutputFormatRef> {
    builtin_formats()
        .into_iter()
        .find(|format| format.name() == name)
}

/// Name to format mapping, pre-populated with the built-in formats.
#[derive(Debug, Clone)]
pub struct OutputFormatRegistry {
    formats: HashMap<String, OutputFormatRef>,
}

impl OutputFormatRegistry {
    pub fn new() -> Self {
        let formats = builtin_formats()
            .into_iter()
            .map(|format| (format.name().to_string(), format))
            .collect();
        Self { formats }
    }

    /// Registers a custom format, returning the one it replaced.
    pub fn register(&mut self, format: OutputFormatRef) -> Option<OutputFormatRef> {
        self.formats.insert(format.name().to_string(), format)
    }

    pub fn get(&self, name: &str) -> Option<OutputFormatRef> {
        self.formats.get(name).copied()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.formats.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for OutputFormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ntest::timeout(100)]
    fn test_rtf_escapes_control_characters() {
        let rtf: MarkupFormatRef = &RTF;
        assert_eq!(
            rtf.escape_plain_text(r"C:\path {x}"),
            r"C:\\path \{x\}",
            "backslash and braces are escaped"
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_rtf_markup_is_not_escaped_twice() {
        let rtf: MarkupFormatRef = &RTF;
        let escaped = rtf.escape_plain_text(r"a\b");
        let model = rtf.from_markup(&escaped);

        let mut out = String::new();
        rtf.output_markup(&model, &mut out).unwrap();
        assert_eq!(out, r"a\\b", "markup is written verbatim");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_html_and_xml_apostrophes_differ() {
        let html: MarkupFormatRef = &HTML;
        let xml: MarkupFormatRef = &XML;
        assert_eq!(html.escape_plain_text("<a href='x'>&</a>"), "&lt;a href=&#39;x&#39;&gt;&amp;&lt;/a&gt;");
        assert_eq!(xml.escape_plain_text("'"), "&apos;");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_output_streams_escaped_text() {
        let mut out = String::from("prefix:");
        HTML.output("1 < 2", &mut out).unwrap();
        assert_eq!(out, "prefix:1 &lt; 2");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_from_plain_text_keeps_source() {
        let html: MarkupFormatRef = &HTML;
        let model = html.from_plain_text("a & b");
        assert_eq!(model.plain_text(), Some("a & b"));
        assert_eq!(model.markup_text(), "a &amp; b");
        assert_eq!(model.format().name(), "HTML");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_mixing_formats_is_rejected() {
        let html: MarkupFormatRef = &HTML;
        let rtf: MarkupFormatRef = &RTF;
        let error = html
            .from_markup("<b>")
            .concat(&rtf.from_markup("\\b"))
            .unwrap_err();
        assert_eq!(
            error,
            TemplateErrorKind::IncompatibleOutputFormats {
                left: "HTML".to_string(),
                right: "RTF".to_string(),
            }
        );

        let mut out = String::new();
        assert!(
            html.output_markup(&rtf.from_markup("x"), &mut out).is_err(),
            "RTF markup can't be written as HTML"
        );
        assert!(out.is_empty(), "nothing is written on failure");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_legacy_bypass() {
        assert!(RTF.is_legacy_builtin_bypassed("rtf"));
        assert!(!RTF.is_legacy_builtin_bypassed("html"));
        assert!(XHTML.is_legacy_builtin_bypassed("html"));
        assert!(XHTML.is_legacy_builtin_bypassed("xhtml"));
        assert!(!XML.is_legacy_builtin_bypassed("html"));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_registry_lookup() {
        let mut registry = OutputFormatRegistry::new();
        assert_eq!(registry.get("RTF").map(|f| f.mime_type()), Some(Some("text/rtf")));
        assert!(registry.get("rtf").is_none(), "names are case sensitive");
        assert!(registry.get("HTML").and_then(|f| f.as_markup()).is_some());
        assert!(registry.get("plainText").and_then(|f| f.as_markup()).is_none());

        let previous = registry.register(&RTF);
        assert!(previous.is_some(), "re-registering replaces the built-in");
        assert_eq!(registry.names().len(), 6);
        assert_eq!(output_format_by_name("XML").map(|f| f.name()), Some("XML"));
    }
}
