use crate::{
    ast::{Node, NodeKind, Scope},
    error::{ParseError, ParseErrorKind, Span},
    expression::{Expression, LegacyEscape},
    output_format::{MarkupFormatRef, OutputFormatRef, UNDEFINED},
    value::Number,
};

type ParseResult<T> = Result<T, ParseError>;

/// Sequences that end a run of plain text.
const TEXT_DELIMITERS: [&str; 4] = ["${", "#{", "<#", "</#"];

/// How a template source is interpreted.
#[derive(Debug, Clone, Copy)]
pub struct ParserSettings {
    /// Format of the text the template produces.
    pub output_format: OutputFormatRef,
    /// Escape interpolations when the output format auto-escapes by default.
    pub auto_escaping: bool,
}

impl ParserSettings {
    pub fn new(output_format: OutputFormatRef) -> Self {
        Self {
            output_format,
            auto_escaping: true,
        }
    }

    pub fn with_auto_escaping(mut self, auto_escaping: bool) -> Self {
        self.auto_escaping = auto_escaping;
        self
    }

    fn initial_auto_escape(&self) -> Option<MarkupFormatRef> {
        if !self.auto_escaping {
            return None;
        }
        let format: OutputFormatRef = self.output_format;
        format
            .as_markup()
            .filter(|markup| markup.is_auto_escaped_by_default())
    }
}

impl Default for ParserSettings {
    fn default() -> Self {
        Self::new(&UNDEFINED)
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    /// Current line number (1-indexed)
    line: usize,
    /// The starting location of the current line
    line_start_pos: usize,
    settings: &'a ParserSettings,
    /// Format that interpolations escape into at this point.
    auto_escape: Option<MarkupFormatRef>,
    /// Number of enclosing `#list`/`#switch` bodies.
    break_targets: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, settings: &'a ParserSettings) -> Self {
        Parser {
            input,
            pos: 0,
            line: 1,
            line_start_pos: 0,
            settings,
            auto_escape: settings.initial_auto_escape(),
            break_targets: 0,
        }
    }

    #[inline]
    fn current_column(&self) -> usize {
        self.pos - self.line_start_pos + 1
    }

    #[inline]
    fn location(&self) -> (usize, usize) {
        (self.line, self.current_column())
    }

    #[inline]
    fn span_from(&self, (begin_line, begin_column): (usize, usize)) -> Span {
        Span::new(begin_line, begin_column, self.line, self.current_column())
    }

    #[inline]
    fn make_error(&self, kind: ParseErrorKind) -> ParseError {
        ParseError {
            line: self.line,
            column: self.current_column(),
            kind,
        }
    }

    fn make_error_at(&self, (line, column): (usize, usize), kind: ParseErrorKind) -> ParseError {
        ParseError { line, column, kind }
    }

    /// Advances the parser position past `current_char`, updating line
    /// tracking when it is a newline.
    #[inline]
    fn advance_by_char(&mut self, current_char: char) {
        let char_len = current_char.len_utf8();
        if current_char == '\n' {
            self.line += 1;
            self.line_start_pos = self.pos + char_len;
        }
        self.pos += char_len;
    }

    /// Advances the parser position by `len` bytes.
    /// This method assumes that the consumed string `s` does NOT contain newlines.
    /// If it can, line/column tracking will be incorrect. Used for fixed delimiters.
    #[inline]
    fn advance_bytes_no_newline(&mut self, len: usize) {
        self.pos += len;
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn next_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    /// Peek if the remaining input starts with `s`
    fn peek(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    /// Peek `word` as a whole word, so `<#case` doesn't match `<#cases`.
    fn peek_word(&self, word: &str) -> bool {
        self.peek(word)
            && !self.input[self.pos + word.len()..]
                .chars()
                .next()
                .is_some_and(is_identifier_char)
    }

    /// Consume `s` if the remaining input starts with it.
    /// Assumes `s` does not contain newlines.
    fn consume(&mut self, s: &str) -> bool {
        if self.peek(s) {
            self.advance_bytes_no_newline(s.len());
            true
        } else {
            false
        }
    }

    fn consume_whitespace(&mut self) {
        while let Some(current_char) = self.next_char() {
            if !current_char.is_whitespace() {
                break;
            }
            self.advance_by_char(current_char);
        }
    }

    /// Expect `s` to be the start of the remaining input, consume it or return Err.
    /// Assumes `s` does not contain newlines.
    fn expect(&mut self, s: &str) -> ParseResult<()> {
        if self.consume(s) {
            return Ok(());
        }
        if self.eof() {
            return Err(self.make_error(ParseErrorKind::unexpected_eof(Some(s.to_string()))));
        }
        let found: String = self.input[self.pos..].chars().take(s.len() + 10).collect();
        Err(self.make_error(ParseErrorKind::Expected {
            description: format!("'{}', found '{}'", s, found),
        }))
    }

    /// Consume and return an identifier (alphanumeric and '_', not starting
    /// with a digit).
    fn consume_identifier(&mut self) -> ParseResult<&'a str> {
        self.consume_whitespace();
        let start = self.pos;
        if let Some(first) = self.next_char() {
            if first.is_ascii_digit() {
                return Err(self.make_error(ParseErrorKind::InvalidIdentifier {
                    at_char: first.to_string(),
                }));
            }
        }
        while let Some(current_char) = self.next_char() {
            if !is_identifier_char(current_char) {
                break;
            }
            self.advance_by_char(current_char);
        }
        if start == self.pos {
            Err(self.make_error(ParseErrorKind::Expected {
                description: "identifier".to_string(),
            }))
        } else {
            Ok(&self.input[start..self.pos])
        }
    }

    /// Expect the keyword `word`, e.g. the `as` of `#list`.
    fn expect_keyword(&mut self, word: &str) -> ParseResult<()> {
        self.consume_whitespace();
        if self.peek_word(word) {
            self.advance_bytes_no_newline(word.len());
            Ok(())
        } else {
            Err(self.make_error(ParseErrorKind::Expected {
                description: format!("'{}'", word),
            }))
        }
    }

    /// The `>` (or `/>`) ending a start tag.
    fn end_tag(&mut self) -> ParseResult<()> {
        self.consume_whitespace();
        if self.consume("/>") {
            return Ok(());
        }
        self.expect(">")
    }

    fn expect_closing(&mut self, directive: &str) -> ParseResult<()> {
        self.expect("</#")?;
        self.expect(directive)?;
        self.consume_whitespace();
        self.expect(">")
    }

    // --- Text ---

    fn parse_text(&mut self) -> Node {
        let start = self.location();
        let start_pos = self.pos;
        while let Some(current_char) = self.next_char() {
            if TEXT_DELIMITERS.iter().any(|delimiter| self.peek(delimiter)) {
                break;
            }
            self.advance_by_char(current_char);
        }
        Node::text(&self.input[start_pos..self.pos], self.span_from(start))
    }

    fn skip_comment(&mut self) -> ParseResult<()> {
        self.expect("<#--")?;
        while !self.consume("-->") {
            let Some(current_char) = self.next_char() else {
                return Err(self.make_error(ParseErrorKind::unexpected_eof(Some("-->".to_string()))));
            };
            self.advance_by_char(current_char);
        }
        Ok(())
    }

    fn parse_noparse(&mut self, start: (usize, usize)) -> ParseResult<Node> {
        self.end_tag()?;
        let text_start = self.pos;
        while !self.peek("</#noparse") {
            let Some(current_char) = self.next_char() else {
                return Err(
                    self.make_error(ParseErrorKind::unexpected_eof(Some("</#noparse>".to_string())))
                );
            };
            self.advance_by_char(current_char);
        }
        let text = &self.input[text_start..self.pos];
        self.expect_closing("noparse")?;
        Ok(Node::text(text, self.span_from(start)))
    }

    // --- Nodes ---

    fn parse_node(&mut self) -> ParseResult<Option<Node>> {
        if self.peek("<#--") {
            self.skip_comment()?;
            Ok(None)
        } else if self.peek("${") {
            self.parse_interpolation().map(Some)
        } else if self.peek("#{") {
            self.parse_numeric_output().map(Some)
        } else if self.peek("</#") {
            let start = self.location();
            self.advance_bytes_no_newline(3);
            let name = self.consume_identifier().unwrap_or_default();
            Err(self.make_error_at(
                start,
                ParseErrorKind::UnexpectedToken {
                    expected: "text or a directive".to_string(),
                    found: format!("</#{}>", name),
                },
            ))
        } else if self.peek("<#") {
            self.parse_directive().map(Some)
        } else {
            Ok(Some(self.parse_text()))
        }
    }

    /// Parse nodes until one of the `terminators` (like `</#list`) is next.
    /// With no terminators, parses to the end of the input.
    fn parse_nodes_until(&mut self, terminators: &[&str]) -> ParseResult<Vec<Node>> {
        let mut nodes = Vec::new();
        loop {
            if self.eof() {
                if !terminators.is_empty() {
                    let expected = terminators
                        .iter()
                        .map(|terminator| format!("{}>", terminator))
                        .collect::<Vec<_>>()
                        .join(" or ");
                    return Err(self.make_error(ParseErrorKind::unexpected_eof(Some(expected))));
                }
                break;
            }
            if terminators.iter().any(|terminator| self.peek_word(terminator)) {
                break;
            }
            if let Some(node) = self.parse_node()? {
                push_node(&mut nodes, node);
            }
        }
        Ok(nodes)
    }

    fn parse_interpolation(&mut self) -> ParseResult<Node> {
        let start = self.location();
        self.expect("${")?;
        let expression = self.parse_expression()?;
        self.consume_whitespace();
        self.expect("}")?;
        Ok(Node::interpolation(
            expression,
            self.settings.output_format,
            self.auto_escape,
            self.span_from(start),
        ))
    }

    fn parse_numeric_output(&mut self) -> ParseResult<Node> {
        let start = self.location();
        self.expect("#{")?;
        let expression = self.parse_expression()?;
        self.consume_whitespace();
        let fraction_digits = if self.consume(";") {
            self.consume_whitespace();
            Some(self.parse_fraction_digits()?)
        } else {
            None
        };
        self.consume_whitespace();
        self.expect("}")?;
        Ok(Node::numeric_output(
            expression,
            fraction_digits,
            self.auto_escape,
            self.span_from(start),
        ))
    }

    /// Parses `mXMY`, `mX` or `MY`. A lone minimum also caps the maximum; a
    /// lone maximum leaves the minimum at zero.
    fn parse_fraction_digits(&mut self) -> ParseResult<(usize, usize)> {
        let mut min = None;
        let mut max = None;
        loop {
            if self.consume("m") {
                min = Some(self.parse_digits()?);
            } else if self.consume("M") {
                max = Some(self.parse_digits()?);
            } else {
                break;
            }
        }
        match (min, max) {
            (Some(min), Some(max)) => Ok((min, max.max(min))),
            (Some(min), None) => Ok((min, min)),
            (None, Some(max)) => Ok((0, max)),
            (None, None) => Err(self.make_error(ParseErrorKind::Expected {
                description: "a number format like m1M3".to_string(),
            })),
        }
    }

    fn parse_digits(&mut self) -> ParseResult<usize> {
        let start = self.pos;
        while self.next_char().is_some_and(|c| c.is_ascii_digit()) {
            self.advance_bytes_no_newline(1);
        }
        self.input[start..self.pos].parse().map_err(|_| {
            self.make_error(ParseErrorKind::Expected {
                description: "digits".to_string(),
            })
        })
    }

    fn parse_directive(&mut self) -> ParseResult<Node> {
        let start = self.location();
        self.expect("<#")?;
        let name = self.consume_identifier()?;
        match name {
            "noparse" => self.parse_noparse(start),
            "switch" => self.parse_switch(start),
            "list" => self.parse_list(start),
            "break" => {
                self.end_tag()?;
                if self.break_targets == 0 {
                    return Err(self.make_error_at(start, ParseErrorKind::BreakOutsideLoop));
                }
                Ok(Node::break_instruction(self.span_from(start)))
            }
            "stop" => {
                self.consume_whitespace();
                let message = if self.peek(">") || self.peek("/>") {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.end_tag()?;
                Ok(Node::stop(message, self.span_from(start)))
            }
            "autoesc" => self.parse_autoesc(start),
            "assign" => self.parse_assignment(Scope::Namespace, start),
            "global" => self.parse_assignment(Scope::Global, start),
            "local" => self.parse_assignment(Scope::Local, start),
            "case" | "default" | "else" => Err(self.make_error_at(
                start,
                ParseErrorKind::UnexpectedToken {
                    expected: "text or a directive".to_string(),
                    found: format!("#{}", name),
                },
            )),
            _ => Err(self.make_error_at(
                start,
                ParseErrorKind::UnknownDirective {
                    directive: name.to_string(),
                },
            )),
        }
    }

    fn parse_switch(&mut self, start: (usize, usize)) -> ParseResult<Node> {
        let subject = self.parse_expression()?;
        self.end_tag()?;
        self.break_targets += 1;
        let cases = self.parse_cases();
        self.break_targets -= 1;
        let cases = cases?;
        self.expect_closing("switch")?;
        Node::switch(subject, cases, self.span_from(start))
            .map_err(|kind| self.make_error_at(start, kind))
    }

    fn parse_cases(&mut self) -> ParseResult<Vec<Node>> {
        let mut cases = Vec::new();
        let mut seen_default = false;
        loop {
            if cases.is_empty() {
                // Only whitespace and comments may precede the first case.
                loop {
                    self.consume_whitespace();
                    if !self.peek("<#--") {
                        break;
                    }
                    self.skip_comment()?;
                }
            }
            if self.peek_word("</#switch") {
                break;
            }
            let case_start = self.location();
            let condition = if self.peek_word("<#case") {
                self.advance_bytes_no_newline("<#case".len());
                let condition = self.parse_expression()?;
                self.end_tag()?;
                Some(condition)
            } else if self.peek_word("<#default") {
                if seen_default {
                    return Err(self.make_error(ParseErrorKind::DuplicateDefault));
                }
                seen_default = true;
                self.advance_bytes_no_newline("<#default".len());
                self.end_tag()?;
                None
            } else if self.eof() {
                return Err(
                    self.make_error(ParseErrorKind::unexpected_eof(Some("</#switch>".to_string())))
                );
            } else {
                return Err(self.make_error(ParseErrorKind::Expected {
                    description: "#case, #default or </#switch>".to_string(),
                }));
            };
            let nested = self.parse_nodes_until(&["<#case", "<#default", "</#switch"])?;
            let span = self.span_from(case_start);
            cases.push(Node::case(condition, body_node(nested), span));
        }
        Ok(cases)
    }

    fn parse_list(&mut self, start: (usize, usize)) -> ParseResult<Node> {
        let source = self.parse_expression()?;
        self.expect_keyword("as")?;
        let loop_variable = self.consume_identifier()?;
        self.end_tag()?;

        self.break_targets += 1;
        let body = self.parse_nodes_until(&["<#else", "</#list"]);
        self.break_targets -= 1;
        let body = body?;

        let else_branch = if self.peek_word("<#else") {
            let else_start = self.location();
            self.advance_bytes_no_newline("<#else".len());
            self.end_tag()?;
            let nested = self.parse_nodes_until(&["</#list"])?;
            Some(Node::else_of_list(body_node(nested), self.span_from(else_start)))
        } else {
            None
        };
        self.expect_closing("list")?;
        Ok(Node::list(
            source,
            loop_variable,
            body_node(body),
            else_branch,
            self.span_from(start),
        ))
    }

    fn parse_autoesc(&mut self, start: (usize, usize)) -> ParseResult<Node> {
        self.end_tag()?;
        let format: OutputFormatRef = self.settings.output_format;
        let Some(markup) = format.as_markup() else {
            return Err(self.make_error_at(
                start,
                ParseErrorKind::NotAMarkupFormat {
                    format: format.name().to_string(),
                },
            ));
        };
        let outer = self.auto_escape.replace(markup);
        let nested = self.parse_nodes_until(&["</#autoesc"]);
        self.auto_escape = outer;
        let nested = nested?;
        self.expect_closing("autoesc")?;
        Ok(Node::auto_esc(body_node(nested), self.span_from(start)))
    }

    fn parse_assignment(&mut self, scope: Scope, start: (usize, usize)) -> ParseResult<Node> {
        let name = self.consume_identifier()?;
        self.consume_whitespace();
        if self.consume("=") {
            let source = self.parse_expression()?;
            let namespace = self.parse_target_namespace(scope)?;
            self.end_tag()?;
            return Ok(Node::assignment(
                name,
                scope,
                source,
                namespace,
                self.span_from(start),
            ));
        }

        let namespace = self.parse_target_namespace(scope)?;
        self.end_tag()?;
        let directive = &scope.directive_name()[1..];
        let terminator = format!("</#{}", directive);
        let nested = self.parse_nodes_until(&[terminator.as_str()])?;
        self.expect_closing(directive)?;
        let format: OutputFormatRef = self.settings.output_format;
        Ok(Node::block_assignment(
            name,
            scope,
            namespace,
            body_node(nested),
            format.as_markup(),
            self.span_from(start),
        ))
    }

    /// The optional `in ns` of `#assign`.
    fn parse_target_namespace(&mut self, scope: Scope) -> ParseResult<Option<Expression>> {
        self.consume_whitespace();
        if !self.peek_word("in") {
            return Ok(None);
        }
        if scope != Scope::Namespace {
            return Err(self.make_error(ParseErrorKind::Message(format!(
                "{} can't target a namespace",
                scope.directive_name()
            ))));
        }
        self.advance_bytes_no_newline(2);
        self.parse_expression().map(Some)
    }

    // --- Expressions ---
    // Precedence: + -> postfix built-ins -> primary

    fn parse_expression(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_postfix_expression()?;
        loop {
            self.consume_whitespace();
            if self.consume("+") {
                let right = self.parse_postfix_expression()?;
                left = Expression::add(left, right);
            } else {
                break;
            }
        }
        Ok(left)
    }

    // Handles built-ins (x?html)
    fn parse_postfix_expression(&mut self) -> ParseResult<Expression> {
        let mut expression = self.parse_primary_expression()?;
        while self.peek("?") {
            let at = self.location();
            self.advance_bytes_no_newline(1);
            let name = self.consume_identifier()?;
            let Some(builtin) = LegacyEscape::from_name(name) else {
                return Err(self.make_error_at(
                    at,
                    ParseErrorKind::Message(format!("Unknown built-in ?{}", name)),
                ));
            };
            if let Some(format) = self.auto_escape {
                return Err(self.make_error_at(
                    at,
                    ParseErrorKind::LegacyEscapingInAutoEscape {
                        builtin: name.to_string(),
                        format: format.name().to_string(),
                    },
                ));
            }
            expression = Expression::LegacyEscape {
                target: Box::new(expression),
                builtin,
            };
        }
        Ok(expression)
    }

    fn parse_primary_expression(&mut self) -> ParseResult<Expression> {
        self.consume_whitespace();
        match self.next_char() {
            Some(quote @ ('"' | '\'')) => self.parse_string_literal(quote),
            Some(c) if c.is_ascii_digit() => self.parse_number_literal(),
            Some('-') if self.peek_negative_number() => self.parse_number_literal(),
            Some('[') => {
                self.advance_bytes_no_newline(1);
                let mut items = Vec::new();
                self.consume_whitespace();
                if !self.consume("]") {
                    loop {
                        items.push(self.parse_expression()?);
                        self.consume_whitespace();
                        if !self.consume(",") {
                            break;
                        }
                    }
                    self.expect("]")?;
                }
                Ok(Expression::Sequence(items))
            }
            Some('(') => {
                self.advance_bytes_no_newline(1);
                let inner = self.parse_expression()?;
                self.consume_whitespace();
                self.expect(")")?;
                Ok(Expression::Parenthetical(Box::new(inner)))
            }
            Some(c) if c.is_alphabetic() || c == '_' => match self.consume_identifier()? {
                "true" => Ok(Expression::boolean(true)),
                "false" => Ok(Expression::boolean(false)),
                name => Ok(Expression::variable(name)),
            },
            Some(c) => Err(self.make_error(ParseErrorKind::UnexpectedToken {
                expected: "an expression".to_string(),
                found: format!("'{}'", c),
            })),
            None => Err(self.make_error(ParseErrorKind::unexpected_eof(Some(
                "an expression".to_string(),
            )))),
        }
    }

    fn parse_string_literal(&mut self, quote: char) -> ParseResult<Expression> {
        self.advance_bytes_no_newline(1);
        let mut value = String::new();
        loop {
            let Some(current_char) = self.next_char() else {
                return Err(self.make_error(ParseErrorKind::unexpected_eof(Some(quote.to_string()))));
            };
            self.advance_by_char(current_char);
            match current_char {
                c if c == quote => break,
                '\\' => {
                    let Some(escaped) = self.next_char() else {
                        continue;
                    };
                    self.advance_by_char(escaped);
                    value.push(match escaped {
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        other => other,
                    });
                }
                other => value.push(other),
            }
        }
        Ok(Expression::string(value))
    }

    /// A `-` directly followed by a digit starts a negative number literal.
    fn peek_negative_number(&self) -> bool {
        self.peek("-")
            && self
                .input
                .get(self.pos + 1..)
                .and_then(|rest| rest.chars().next())
                .is_some_and(|c| c.is_ascii_digit())
    }

    fn parse_number_literal(&mut self) -> ParseResult<Expression> {
        let start = self.pos;
        let at = self.location();
        self.consume("-");
        while self.next_char().is_some_and(|c| c.is_ascii_digit()) {
            self.advance_bytes_no_newline(1);
        }
        let is_float = self.peek(".")
            && self.input[self.pos + 1..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_digit());
        if is_float {
            self.advance_bytes_no_newline(1);
            while self.next_char().is_some_and(|c| c.is_ascii_digit()) {
                self.advance_bytes_no_newline(1);
            }
        }
        let literal = &self.input[start..self.pos];
        let number = if is_float {
            literal.parse::<f64>().map(Number::Float).ok()
        } else {
            literal.parse::<i64>().map(Number::Int).ok()
        };
        number.map(Expression::number).ok_or_else(|| {
            self.make_error_at(
                at,
                ParseErrorKind::Message(format!("Number literal out of range: {}", literal)),
            )
        })
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Appends `node`, merging adjacent text and dropping empty text.
fn push_node(nodes: &mut Vec<Node>, node: Node) {
    let NodeKind::Text { text } = node.kind() else {
        nodes.push(node);
        return;
    };
    if text.is_empty() {
        return;
    }
    let mut merged = None;
    if let Some(last) = nodes.last() {
        if let NodeKind::Text { text: previous } = last.kind() {
            let (begin, end) = (last.span(), node.span());
            merged = Some(Node::text(
                format!("{}{}", previous, text),
                Span::new(begin.begin_line, begin.begin_column, end.end_line, end.end_column),
            ));
        }
    }
    match merged {
        Some(merged) => {
            nodes.pop();
            nodes.push(merged);
        }
        None => nodes.push(node),
    }
}

/// A block body as a single node: absent, the only child, or a sequence.
fn body_node(mut nodes: Vec<Node>) -> Option<Node> {
    match nodes.len() {
        0 => None,
        1 => nodes.pop(),
        _ => {
            let (first, last) = (nodes[0].span(), nodes[nodes.len() - 1].span());
            let span = Span::new(first.begin_line, first.begin_column, last.end_line, last.end_column);
            Some(Node::sequence(nodes, span))
        }
    }
}

/// Parses a template source into its root node, always a sequence.
pub fn parse(input: &str, settings: &ParserSettings) -> Result<Node, ParseError> {
    let mut parser = Parser::new(input, settings);
    let nodes = parser.parse_nodes_until(&[])?;
    let span = Span::new(1, 1, parser.line, parser.current_column());
    Ok(Node::sequence(nodes, span))
}

/// Tests for individual functions in the parser module.
#[cfg(test)]
mod test_utils {
    use super::*;

    #[test]
    #[ntest::timeout(100)]
    fn test_peek_word() {
        let settings = ParserSettings::default();
        let parser = Parser::new("<#cases>", &settings);
        assert!(parser.peek("<#case"));
        assert!(!parser.peek_word("<#case"));

        let parser = Parser::new("<#case 1>", &settings);
        assert!(parser.peek_word("<#case"));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_fraction_digits() {
        let settings = ParserSettings::default();
        for (input, expected) in [("m1M3", (1, 3)), ("m2", (2, 2)), ("M4", (0, 4)), ("m3M1", (3, 3))] {
            let mut parser = Parser::new(input, &settings);
            assert_eq!(parser.parse_fraction_digits().unwrap(), expected, "{}", input);
        }
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_location_tracks_newlines() {
        let settings = ParserSettings::default();
        let mut parser = Parser::new("ab\ncd${x}", &settings);
        let text = parser.parse_text();
        assert_eq!(text.span(), Span::new(1, 1, 2, 3));
        assert_eq!(parser.location(), (2, 3));
    }
}
