use std::path::Path;

use log::debug;

use crate::Result;
use crate::error::{CompileError, Location};
use crate::tpl::token::{Hook, Token, TokenKind};

/// Tag openers recognised in plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Opener {
    Command,
    Expression,
    Comment,
}

impl Opener {
    fn closer(self) -> &'static str {
        match self {
            Opener::Command => "%}",
            Opener::Expression => "}}",
            Opener::Comment => "#}",
        }
    }
}

/// A multi-line capture that is still open when a line ends.
enum Pending {
    Comment {
        text: String,
        line: usize,
        column: usize,
        /// Blank text in front of the opener, kept or dropped once the
        /// comment closes.
        indent: Option<Token>,
    },
    Code {
        hook: Hook,
        code: String,
        line: usize,
        column: usize,
    },
}

/// Result of interpreting the words of a `{% ... %}` tag.
enum Command {
    Token(TokenKind),
    StartCode(Hook),
}

/// Line-oriented tokenizer for the template language.
///
/// Within a line the lexer is either in plain mode (looking for the next
/// `{%`, `{{` or `{#`), or inside a comment or a lifecycle code section that
/// started on an earlier line. Command and expression tags must close on the
/// line they open on.
struct Lexer<'a> {
    file: &'a Path,
    /// Suppress the newline of lines whose only output would be a command tag.
    trim: bool,
    tokens: Vec<Token>,
    pending: Option<Pending>,
    /// 1-based number of the line being scanned.
    line_no: usize,
}

impl<'a> Lexer<'a> {
    fn new(file: &'a Path, trim: bool) -> Self {
        Self {
            file,
            trim,
            tokens: Vec::new(),
            pending: None,
            line_no: 0,
        }
    }

    fn tokenize(mut self, source: &str) -> Result<Vec<Token>> {
        for (idx, line) in source.lines().enumerate() {
            self.line_no = idx + 1;
            self.lex_line(line)?;
        }

        match self.pending.take() {
            None => Ok(self.tokens),
            Some(Pending::Comment { line, column, .. }) => Err(CompileError::lex(
                Location::new(self.file, line, column),
                "unterminated comment, expected '#}'",
            )),
            Some(Pending::Code {
                hook, line, column, ..
            }) => Err(CompileError::lex(
                Location::new(self.file, line, column),
                format!("unterminated '{hook}' section, expected '{{% end{hook} %}}'"),
            )),
        }
    }

    fn location(&self, offset: usize) -> Location {
        Location::new(self.file, self.line_no, offset + 1)
    }

    fn push(&mut self, kind: TokenKind, offset: usize) {
        self.tokens.push(Token::new(kind, self.line_no, offset + 1));
    }

    fn lex_line(&mut self, line: &str) -> Result<()> {
        let mut offset = 0;
        loop {
            offset = match self.pending.take() {
                Some(Pending::Comment {
                    mut text,
                    line: start_line,
                    column,
                    indent,
                }) => match line[offset..].find("#}") {
                    Some(rel) => {
                        text.push_str(&line[offset..offset + rel]);
                        let after = offset + rel + 2;
                        let standalone = self.trim && line[after..].trim().is_empty();
                        if let Some(indent) = indent
                            && !standalone
                        {
                            self.tokens.push(indent);
                        }
                        self.tokens
                            .push(Token::new(TokenKind::Comment(text), start_line, column));
                        if self.finish_if_blank(line, after, true) {
                            return Ok(());
                        }
                        after
                    }
                    None => {
                        text.push_str(&line[offset..]);
                        text.push('\n');
                        self.pending = Some(Pending::Comment {
                            text,
                            line: start_line,
                            column,
                            indent,
                        });
                        return Ok(());
                    }
                },
                Some(Pending::Code {
                    hook,
                    mut code,
                    line: start_line,
                    column,
                }) => match find_terminator(line, offset, hook) {
                    Some((start, end)) => {
                        let before = &line[offset..start];
                        if !before.trim().is_empty() {
                            code.push_str(before);
                        }
                        self.tokens.push(Token::new(
                            TokenKind::Code { hook, code },
                            start_line,
                            column,
                        ));
                        if self.finish_if_blank(line, end, true) {
                            return Ok(());
                        }
                        end
                    }
                    None => {
                        code.push_str(&line[offset..]);
                        code.push('\n');
                        self.pending = Some(Pending::Code {
                            hook,
                            code,
                            line: start_line,
                            column,
                        });
                        return Ok(());
                    }
                },
                None => match self.lex_plain(line, offset)? {
                    Some(next) => next,
                    None => return Ok(()),
                },
            };
        }
    }

    /// Scans plain text starting at `offset` up to and including the next tag.
    /// Returns the offset to continue from, or `None` once the line is done.
    fn lex_plain(&mut self, line: &str, offset: usize) -> Result<Option<usize>> {
        let rest = &line[offset..];
        let Some((rel, opener)) = find_opener(rest) else {
            self.push(TokenKind::Text(format!("{rest}\n")), offset);
            return Ok(None);
        };
        let pos = offset + rel;
        let inner_start = pos + 2;

        let Some(close_rel) = line[inner_start..].find(opener.closer()) else {
            return match opener {
                Opener::Comment => {
                    let prefix = &line[offset..pos];
                    let indent = if !prefix.is_empty() && prefix.trim().is_empty() {
                        Some(Token::new(
                            TokenKind::Text(prefix.to_string()),
                            self.line_no,
                            offset + 1,
                        ))
                    } else {
                        self.push_prefix(prefix, false, offset);
                        None
                    };
                    self.pending = Some(Pending::Comment {
                        text: format!("{}\n", &line[inner_start..]),
                        line: self.line_no,
                        column: pos + 1,
                        indent,
                    });
                    Ok(None)
                }
                Opener::Command => Err(CompileError::lex(
                    self.location(pos),
                    "unterminated command tag, expected '%}'",
                )),
                Opener::Expression => Err(CompileError::lex(
                    self.location(pos),
                    "unterminated expression tag, expected '}}'",
                )),
            };
        };
        let inner = &line[inner_start..inner_start + close_rel];
        let after = inner_start + close_rel + 2;
        let rest_blank = line[after..].trim().is_empty();
        let standalone = self.trim && rest_blank && opener != Opener::Expression;

        self.push_prefix(&line[offset..pos], standalone, offset);

        match opener {
            Opener::Expression => {
                let code = inner.trim();
                if code.is_empty() {
                    return Err(CompileError::lex(self.location(pos), "empty expression tag"));
                }
                self.push(TokenKind::Expression(code.to_string()), pos);
            }
            Opener::Comment => self.push(TokenKind::Comment(inner.to_string()), pos),
            Opener::Command => match parse_command(inner).map_err(|msg| {
                CompileError::lex(self.location(pos), msg)
            })? {
                Command::Token(kind) => self.push(kind, pos),
                Command::StartCode(hook) => {
                    self.pending = Some(Pending::Code {
                        hook,
                        code: String::new(),
                        line: self.line_no,
                        column: pos + 1,
                    });
                    // Anything after the opening tag on this line is code.
                    return Ok(if rest_blank { None } else { Some(after) });
                }
            },
        }

        if self.finish_if_blank(line, after, opener != Opener::Expression) {
            return Ok(None);
        }
        Ok(Some(after))
    }

    /// Emits the literal in front of a tag. Blank text in front of a
    /// standalone command is indentation and is dropped with the newline.
    fn push_prefix(&mut self, prefix: &str, standalone: bool, offset: usize) {
        if prefix.is_empty() || (standalone && prefix.trim().is_empty()) {
            return;
        }
        self.push(TokenKind::Text(prefix.to_string()), offset);
    }

    /// Handles the end of a line once a tag closed at `after`. Returns `true`
    /// when nothing but whitespace remains.
    fn finish_if_blank(&mut self, line: &str, after: usize, is_command: bool) -> bool {
        let rest = &line[after..];
        if !rest.trim().is_empty() {
            return false;
        }
        if !(self.trim && is_command) {
            self.push(TokenKind::Text(format!("{rest}\n")), after);
        }
        true
    }
}

/// Finds the leftmost tag opener in `s`.
fn find_opener(s: &str) -> Option<(usize, Opener)> {
    [
        (s.find("{%"), Opener::Command),
        (s.find("{{"), Opener::Expression),
        (s.find("{#"), Opener::Comment),
    ]
    .into_iter()
    .filter_map(|(pos, opener)| pos.map(|p| (p, opener)))
    .min_by_key(|(pos, _)| *pos)
}

/// Finds a `{% end<hook> %}` or `{% endcode %}` tag at or after `offset`,
/// returning the byte range it occupies.
fn find_terminator(line: &str, offset: usize, hook: Hook) -> Option<(usize, usize)> {
    let mut from = offset;
    while let Some(rel) = line[from..].find("{%") {
        let start = from + rel;
        let close = line[start + 2..].find("%}")?;
        let inner = line[start + 2..start + 2 + close].trim();
        if hook.is_terminator(inner) {
            return Some((start, start + 2 + close + 2));
        }
        from = start + 2;
    }
    None
}

/// The text of `s` after its first `skip` whitespace-separated words, with
/// the original spacing of the remainder preserved.
fn tail(s: &str, skip: usize) -> &str {
    let mut rest = s.trim_start();
    for _ in 0..skip {
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        rest = rest[end..].trim_start();
    }
    rest.trim_end()
}

fn parse_command(inner: &str) -> std::result::Result<Command, String> {
    let words: Vec<&str> = inner.split_whitespace().collect();
    let Some((&keyword, args)) = words.split_first() else {
        return Err("empty command tag".to_string());
    };

    let require = |count: usize, usage: &str| {
        if args.len() < count {
            Err(format!("'{keyword}' expects {usage}"))
        } else {
            Ok(())
        }
    };

    let kind = match keyword {
        "variable" => {
            require(3, "'variable NAME ACCESSOR TYPE'")?;
            TokenKind::Variable {
                name: args[0].to_string(),
                accessor: args[1].to_string(),
                ty: tail(inner, 3).to_string(),
            }
        }
        "param" => {
            require(2, "'param NAME TYPE'")?;
            TokenKind::Param {
                name: args[0].to_string(),
                ty: tail(inner, 2).to_string(),
            }
        }
        "extends" => {
            require(1, "a template path")?;
            TokenKind::Extends(args[0].to_string())
        }
        "namespace" => {
            require(1, "a namespace path")?;
            TokenKind::Namespace(args[0].to_string())
        }
        "#include" => {
            require(1, "an include target")?;
            TokenKind::IncludeHeader(tail(inner, 1).to_string())
        }
        "#include_impl" => {
            require(1, "an include target")?;
            TokenKind::IncludeImpl(tail(inner, 1).to_string())
        }
        "for" => {
            if args.len() < 3 || args[1] != "in" {
                return Err("'for' expects 'for VAR in EXPR'".to_string());
            }
            TokenKind::For {
                variable: args[0].to_string(),
                source: tail(inner, 3).to_string(),
            }
        }
        "endfor" => TokenKind::EndFor,
        "if" => {
            require(1, "a condition")?;
            TokenKind::If(tail(inner, 1).to_string())
        }
        "elif" => {
            require(1, "a condition")?;
            TokenKind::Elif(tail(inner, 1).to_string())
        }
        "else" => TokenKind::Else,
        "endif" => TokenKind::EndIf,
        "block" => {
            require(1, "a block name")?;
            TokenKind::Block(args[0].to_string())
        }
        "endblock" => TokenKind::EndBlock,
        "parent()" => TokenKind::ParentCall,
        other => match Hook::from_keyword(other) {
            Some(hook) => return Ok(Command::StartCode(hook)),
            None => return Err(format!("unknown command '{other}'")),
        },
    };
    Ok(Command::Token(kind))
}

/// Drops comments and merges runs of literal text into single tokens, so the
/// generator emits as few appends as possible.
pub fn compact(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    for token in tokens {
        match token.kind {
            TokenKind::Comment(_) => {}
            TokenKind::Text(text) => {
                if let Some(Token {
                    kind: TokenKind::Text(last),
                    ..
                }) = out.last_mut()
                {
                    last.push_str(&text);
                } else {
                    out.push(Token::new(TokenKind::Text(text), token.line, token.column));
                }
            }
            kind => out.push(Token::new(kind, token.line, token.column)),
        }
    }
    out
}

/// Splits `source` into raw tokens, comments included.
pub fn tokenize(source: &str, file: &Path, trim: bool) -> Result<Vec<Token>> {
    Lexer::new(file, trim).tokenize(source)
}

/// Main entry point: tokenize `source` and compact the result.
pub fn lex(source: &str, file: &Path, trim: bool) -> Result<Vec<Token>> {
    let raw = tokenize(source, file, trim)?;
    let raw_count = raw.len();
    let tokens = compact(raw);
    debug!(
        "Lex: file={}, tokens={} (compacted from {})",
        file.display(),
        tokens.len(),
        raw_count
    );
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source, Path::new("test.tpl"), true)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn text(s: &str) -> TokenKind {
        TokenKind::Text(s.to_string())
    }

    #[test]
    fn test_plain_text_keeps_newlines() {
        assert_eq!(kinds("hello\nworld\n"), vec![text("hello\nworld\n")]);
    }

    #[test]
    fn test_expression_splits_text() {
        assert_eq!(
            kinds("Hello {{ name }}!\n"),
            vec![
                text("Hello "),
                TokenKind::Expression("name".to_string()),
                text("!\n"),
            ]
        );
    }

    #[test]
    fn test_expression_at_end_of_line_keeps_newline() {
        assert_eq!(
            kinds("  {{ a }}\nb\n"),
            vec![
                text("  "),
                TokenKind::Expression("a".to_string()),
                text("\nb\n"),
            ]
        );
    }

    #[test]
    fn test_standalone_command_line_is_trimmed() {
        assert_eq!(
            kinds("a\n    {% if x %}\nb\n{% endif %}\n"),
            vec![
                text("a\n"),
                TokenKind::If("x".to_string()),
                text("b\n"),
                TokenKind::EndIf,
            ]
        );
    }

    #[test]
    fn test_trimming_disabled_keeps_blank_line() {
        let tokens: Vec<TokenKind> = lex("{% if x %}\nb\n{% endif %}\n", Path::new("t"), false)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect();
        assert_eq!(
            tokens,
            vec![
                TokenKind::If("x".to_string()),
                text("\nb\n"),
                TokenKind::EndIf,
                text("\n"),
            ]
        );
    }

    #[test]
    fn test_command_with_trailing_content_keeps_newline() {
        assert_eq!(
            kinds("{% if x %}yes{% endif %} tail\n"),
            vec![
                TokenKind::If("x".to_string()),
                text("yes"),
                TokenKind::EndIf,
                text(" tail\n"),
            ]
        );
    }

    #[test]
    fn test_command_arguments() {
        assert_eq!(
            kinds("{% for item in model.items() %}{% endfor %}\n"),
            vec![
                TokenKind::For {
                    variable: "item".to_string(),
                    source: "model.items()".to_string(),
                },
                TokenKind::EndFor,
            ]
        );
        assert_eq!(
            kinds("{% variable items_ NavItems std::map<std::string, int> %}\n"),
            vec![TokenKind::Variable {
                name: "items_".to_string(),
                accessor: "NavItems".to_string(),
                ty: "std::map<std::string, int>".to_string(),
            }]
        );
        assert_eq!(
            kinds("{% if a  ==  b %}{% endif %}\n")[0],
            TokenKind::If("a  ==  b".to_string())
        );
    }

    #[test]
    fn test_comment_spanning_lines_is_dropped() {
        assert_eq!(
            kinds("a {# one\ntwo\nthree #} b\n"),
            vec![text("a  b\n")]
        );
    }

    #[test]
    fn test_indent_before_comment_with_trailing_text_is_kept() {
        assert_eq!(kinds("  {# a #} tail\n"), vec![text("   tail\n")]);
        assert_eq!(kinds("  {# a\n#} tail\n"), vec![text("   tail\n")]);
    }

    #[test]
    fn test_indent_before_standalone_comment_is_dropped() {
        assert_eq!(kinds("x\n  {# a #}\ny\n"), vec![text("x\ny\n")]);
        assert_eq!(kinds("x\n  {# a\n#}\ny\n"), vec![text("x\ny\n")]);

        let kept = lex("  {# a\n#}\n", Path::new("test.tpl"), false).unwrap();
        let kept: Vec<TokenKind> = kept.into_iter().map(|t| t.kind).collect();
        assert_eq!(kept, vec![text("  \n")]);
    }

    #[test]
    fn test_comment_ends_at_first_close() {
        let raw = tokenize("{# outer {# inner #} tail #}\n", Path::new("t"), true).unwrap();
        assert_eq!(raw[0].kind, TokenKind::Comment(" outer {# inner ".to_string()));
        assert_eq!(raw[1].kind, TokenKind::Text(" tail #}\n".to_string()));
    }

    #[test]
    fn test_code_section_is_captured_verbatim() {
        let source = "{% init %}\nint x = 1;\n  if (x) { {{ y }} }\n{% endinit %}\nbody\n";
        assert_eq!(
            kinds(source),
            vec![
                TokenKind::Code {
                    hook: Hook::Init,
                    code: "int x = 1;\n  if (x) { {{ y }} }\n".to_string(),
                },
                text("body\n"),
            ]
        );
    }

    #[test]
    fn test_code_section_accepts_generic_terminator() {
        assert_eq!(
            kinds("{% deinit %}\ncleanup();\n{% endcode %}\n"),
            vec![TokenKind::Code {
                hook: Hook::Deinit,
                code: "cleanup();\n".to_string(),
            }]
        );
    }

    #[test]
    fn test_code_section_ignores_other_terminators() {
        let kinds = kinds("{% prerender %}\na();\n{% endinit %}\n{% endprerender %}\n");
        assert_eq!(
            kinds,
            vec![TokenKind::Code {
                hook: Hook::Prerender,
                code: "a();\n{% endinit %}\n".to_string(),
            }]
        );
    }

    #[test]
    fn test_positions_are_one_based() {
        let tokens = lex("ab\n  {{ x }}\n", Path::new("t"), true).unwrap();
        let expr = tokens
            .iter()
            .find(|t| matches!(t.kind, TokenKind::Expression(_)))
            .unwrap();
        assert_eq!((expr.line, expr.column), (2, 3));
    }

    #[test]
    fn test_unknown_command_is_an_error() {
        let err = lex("line\n{% fro x in y %}\n", Path::new("t.tpl"), true).unwrap_err();
        match err {
            CompileError::Lex { location, message } => {
                assert_eq!(location, Location::new("t.tpl", 2, 1));
                assert!(message.contains("fro"), "{}", message);
            }
            other => panic!("Expected Lex error, got {:?}", other),
        }
    }

    #[test]
    fn test_unterminated_tags_are_errors() {
        for source in ["a {{ b\n", "a {% if x\n", "{# never closed\n", "{% init %}\nx;\n"] {
            match lex(source, Path::new("t"), true) {
                Err(CompileError::Lex { .. }) => {}
                other => panic!("Expected Lex error for {:?}, got {:?}", source, other),
            }
        }
    }

    #[test]
    fn test_malformed_for_is_an_error() {
        assert!(lex("{% for x of y %}\n", Path::new("t"), true).is_err());
        assert!(lex("{% variable x %}\n", Path::new("t"), true).is_err());
    }
}
