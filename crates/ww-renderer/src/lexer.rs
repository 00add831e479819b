//! First tokenization pass: extension constructs are cut out of the source.
//!
//! Block tokenizers are offered every line start outside fenced code,
//! including line starts inside blockquotes once the `>` markers are
//! stripped. Inline tokenizers scan the remaining prose, skipping code spans. Each match is
//! replaced by a private-use placeholder so that the CommonMark parser sees
//! an opaque word (inline) or paragraph (block) at that position. The tree
//! builder swaps the placeholders back for the extension tokens.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::extension::Tokenizer;
use crate::fence::FenceTracker;
use crate::token::{Token, TokenKind, TokenLevel};

pub(crate) const PLACEHOLDER_OPEN: char = '\u{E000}';
pub(crate) const PLACEHOLDER_CLOSE: char = '\u{E001}';

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("\u{E000}(\\d+)\u{E001}").expect("invalid placeholder regex"));

static QUOTE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?: {0,3}>[ \t]?)+").expect("invalid quote prefix regex"));

pub(crate) fn placeholder(index: usize) -> String {
    format!("{PLACEHOLDER_OPEN}{index}{PLACEHOLDER_CLOSE}")
}

/// Markdown with extension constructs replaced by placeholders.
#[derive(Debug, Default)]
pub struct Lexed {
    pub source: String,
    tokens: Vec<Option<Token>>,
}

impl Lexed {
    /// Number of extension tokens cut out of the source.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Take token `index` out. Each token can be taken once.
    pub(crate) fn take(&mut self, index: usize) -> Option<Token> {
        self.tokens.get_mut(index).and_then(Option::take)
    }

    /// Substitute placeholders in `text` with the raw source they replaced.
    ///
    /// Used for text that ends up outside an extension token, such as a
    /// placeholder inside a link destination or raw HTML.
    pub fn restore(&self, text: &str) -> String {
        if !text.contains(PLACEHOLDER_OPEN) {
            return text.to_owned();
        }
        PLACEHOLDER
            .replace_all(text, |caps: &regex::Captures| {
                caps[1]
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| self.tokens.get(i))
                    .and_then(Option::as_ref)
                    .map_or_else(|| caps[0].to_owned(), |t| t.raw.clone())
            })
            .into_owned()
    }

    /// Split `text` into plain runs and placeholder indices.
    pub(crate) fn segments(text: &str) -> Vec<Segment<'_>> {
        let mut out = Vec::new();
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            let Ok(index) = caps[1].parse::<usize>() else {
                continue;
            };
            if whole.start() > last {
                out.push(Segment::Text(&text[last..whole.start()]));
            }
            out.push(Segment::Token(index));
            last = whole.end();
        }
        if last < text.len() {
            out.push(Segment::Text(&text[last..]));
        }
        out
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Segment<'a> {
    Text(&'a str),
    Token(usize),
}

/// Runs registered tokenizers over Markdown source.
#[derive(Clone, Default)]
pub struct Lexer {
    block: Vec<Arc<dyn Tokenizer>>,
    inline: Vec<Arc<dyn Tokenizer>>,
}

impl Lexer {
    /// Build from tokenizers in registration order.
    pub fn new(tokenizers: &[Arc<dyn Tokenizer>]) -> Self {
        let (block, inline) = tokenizers
            .iter()
            .cloned()
            .partition(|t| t.level() == TokenLevel::Block);
        Self { block, inline }
    }

    pub fn lex(&self, markdown: &str) -> Lexed {
        let mut lexed = Lexed {
            source: String::with_capacity(markdown.len()),
            tokens: Vec::new(),
        };
        let mut fence = FenceTracker::new();
        let mut prose = String::new();
        let mut offset = 0;

        while offset < markdown.len() {
            let rest = &markdown[offset..];
            let line_end = rest.find('\n').map_or(rest.len(), |p| p + 1);
            let line = &rest[..line_end];

            let was_in_fence = fence.in_fence();
            if fence.update(line) || was_in_fence {
                self.flush_prose(&mut prose, &mut lexed);
                lexed.source.push_str(line);
                offset += line_end;
                continue;
            }

            if let Some(token) = self.match_block(rest) {
                self.flush_prose(&mut prose, &mut lexed);
                offset += token.raw.len();
                push_block_placeholder(&mut lexed, token);
                continue;
            }

            if let Some((prefix, consumed, token)) = self.match_quoted_block(rest) {
                self.flush_prose(&mut prose, &mut lexed);
                offset += consumed;
                push_quoted_placeholder(&mut lexed, prefix, token);
                continue;
            }

            prose.push_str(line);
            offset += line_end;
        }
        self.flush_prose(&mut prose, &mut lexed);
        lexed
    }

    fn match_block(&self, src: &str) -> Option<Token> {
        self.block
            .iter()
            .filter(|t| t.start(src) == Some(0))
            .find_map(|t| accept(t.as_ref(), src))
    }

    /// Match a block construct inside a blockquote.
    ///
    /// The run of lines sharing the first line's quote depth is stripped of
    /// its markers and offered to the block tokenizers. A match must end on a
    /// line boundary. Returns the first line's prefix, the number of source
    /// bytes consumed and the token, whose `raw` is the unquoted text.
    fn match_quoted_block<'s>(&self, src: &'s str) -> Option<(&'s str, usize, Token)> {
        let prefix = QUOTE_PREFIX.find(src)?.as_str();
        let depth = quote_depth(prefix);
        let first_line = src[prefix.len()..].lines().next().unwrap_or_default();
        if !self.block.iter().any(|t| t.start(first_line) == Some(0)) {
            return None;
        }

        let mut unquoted = String::new();
        // (source offset, unquoted length) after each line of the run
        let mut line_ends = Vec::new();
        let mut offset = 0;
        while offset < src.len() {
            let rest = &src[offset..];
            let Some(marker) = QUOTE_PREFIX.find(rest).filter(|m| quote_depth(m.as_str()) == depth)
            else {
                break;
            };
            let line_end = rest.find('\n').map_or(rest.len(), |p| p + 1);
            unquoted.push_str(&rest[marker.end().min(line_end)..line_end]);
            offset += line_end;
            line_ends.push((offset, unquoted.len()));
        }

        let token = self.match_block(&unquoted)?;
        let matched = token.raw.len();
        let &(consumed, _) = line_ends
            .iter()
            .find(|&&(_, len)| len >= matched && unquoted[matched..len].trim().is_empty())?;
        Some((prefix, consumed, token))
    }

    fn flush_prose(&self, prose: &mut String, lexed: &mut Lexed) {
        if prose.is_empty() {
            return;
        }
        for (is_code, part) in split_code_spans(prose) {
            if is_code || self.inline.is_empty() {
                lexed.source.push_str(part);
            } else {
                self.scan_inline(part, lexed);
            }
        }
        prose.clear();
    }

    /// Earliest start offset wins; ties go to the earlier registered
    /// tokenizer, falling through to the next one if it declines.
    fn scan_inline(&self, text: &str, lexed: &mut Lexed) {
        let mut pos = 0;
        while pos < text.len() {
            let rest = &text[pos..];
            let starts: Vec<(usize, &Arc<dyn Tokenizer>)> = self
                .inline
                .iter()
                .filter_map(|t| {
                    t.start(rest)
                        .filter(|&o| o < rest.len() && rest.is_char_boundary(o))
                        .map(|o| (o, t))
                })
                .collect();
            let Some(offset) = starts.iter().map(|(o, _)| *o).min() else {
                lexed.source.push_str(rest);
                return;
            };

            lexed.source.push_str(&rest[..offset]);
            let at = &rest[offset..];
            let matched = starts
                .iter()
                .filter(|(o, _)| *o == offset)
                .find_map(|(_, t)| accept(t.as_ref(), at));

            if let Some(token) = matched {
                pos += offset + token.raw.len();
                lexed.source.push_str(&placeholder(lexed.tokens.len()));
                lexed.tokens.push(Some(token));
            } else {
                let step = at.chars().next().map_or(1, char::len_utf8);
                lexed.source.push_str(&at[..step]);
                pos += offset + step;
            }
        }
    }
}

/// Validate a tokenizer result: an extension token consuming a non-empty
/// prefix of `src`.
fn accept(tokenizer: &dyn Tokenizer, src: &str) -> Option<Token> {
    let mut token = tokenizer.tokenize(src)?;
    if token.raw.is_empty() || !src.starts_with(token.raw.as_str()) {
        tracing::warn!(
            tokenizer = tokenizer.name(),
            "Tokenizer returned a token that does not consume a prefix of its input"
        );
        return None;
    }
    let TokenKind::Extension(ext) = &mut token.kind else {
        tracing::warn!(tokenizer = tokenizer.name(), "Tokenizer returned a non-extension token");
        return None;
    };
    if ext.name != tokenizer.name() {
        ext.name = tokenizer.name().to_owned();
    }
    Some(token)
}

fn push_block_placeholder(lexed: &mut Lexed, token: Token) {
    let source = &mut lexed.source;
    if !source.is_empty() && !source.ends_with("\n\n") {
        source.push_str(if source.ends_with('\n') { "\n" } else { "\n\n" });
    }
    source.push_str(&placeholder(lexed.tokens.len()));
    source.push_str("\n\n");
    lexed.tokens.push(Some(token));
}

/// Like [`push_block_placeholder`], inside a blockquote: blank quoted lines
/// keep the placeholder out of the surrounding quoted paragraphs.
fn push_quoted_placeholder(lexed: &mut Lexed, prefix: &str, token: Token) {
    let blank = prefix.trim_end();
    let source = &mut lexed.source;
    if !source.is_empty() && !source.ends_with('\n') {
        source.push('\n');
    }
    source.push_str(blank);
    source.push('\n');
    source.push_str(prefix);
    source.push_str(&placeholder(lexed.tokens.len()));
    source.push('\n');
    source.push_str(blank);
    source.push('\n');
    lexed.tokens.push(Some(token));
}

fn quote_depth(prefix: &str) -> usize {
    prefix.matches('>').count()
}

/// Split text into `(is_code_span, part)` runs.
///
/// A backtick run opens a code span only if a run of the same length
/// follows; otherwise the backticks are literal.
pub(crate) fn split_code_spans(text: &str) -> Vec<(bool, &str)> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut last = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'`' {
            i += 1;
            continue;
        }
        let open_start = i;
        while i < bytes.len() && bytes[i] == b'`' {
            i += 1;
        }
        let width = i - open_start;

        let mut j = i;
        let mut close_end = None;
        while j < bytes.len() {
            if bytes[j] == b'`' {
                let run_start = j;
                while j < bytes.len() && bytes[j] == b'`' {
                    j += 1;
                }
                if j - run_start == width {
                    close_end = Some(j);
                    break;
                }
            } else {
                j += 1;
            }
        }

        if let Some(end) = close_end {
            if open_start > last {
                parts.push((false, &text[last..open_start]));
            }
            parts.push((true, &text[open_start..end]));
            last = end;
            i = end;
        }
    }
    if last < text.len() {
        parts.push((false, &text[last..]));
    }
    parts
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::token::ExtToken;

    /// Matches `open ... close` delimited inline constructs.
    struct Delimited {
        name: &'static str,
        open: &'static str,
        close: &'static str,
    }

    impl Tokenizer for Delimited {
        fn name(&self) -> &'static str {
            self.name
        }

        fn level(&self) -> TokenLevel {
            TokenLevel::Inline
        }

        fn start(&self, src: &str) -> Option<usize> {
            src.find(self.open)
        }

        fn tokenize(&self, src: &str) -> Option<Token> {
            let body = src.strip_prefix(self.open)?;
            let end = body.find(self.close)?;
            let raw = &src[..self.open.len() + end + self.close.len()];
            Some(Token::extension(
                ExtToken::new(self.name, TokenLevel::Inline, &body[..end]),
                raw,
            ))
        }

        fn render(&self, token: &Token) -> String {
            token.raw.clone()
        }
    }

    /// Block construct spanning lines from `:::` to `:::`.
    struct Fenced;

    impl Tokenizer for Fenced {
        fn name(&self) -> &'static str {
            "fenced"
        }

        fn level(&self) -> TokenLevel {
            TokenLevel::Block
        }

        fn start(&self, src: &str) -> Option<usize> {
            src.find(":::")
        }

        fn tokenize(&self, src: &str) -> Option<Token> {
            let body = src.strip_prefix(":::\n")?;
            let end = body.find(":::\n")?;
            let raw = &src[..4 + end + 4];
            Some(Token::extension(
                ExtToken::new("fenced", TokenLevel::Block, &body[..end]),
                raw,
            ))
        }

        fn render(&self, _token: &Token) -> String {
            String::new()
        }
    }

    fn lexer(tokenizers: Vec<Arc<dyn Tokenizer>>) -> Lexer {
        Lexer::new(&tokenizers)
    }

    fn dollar() -> Arc<dyn Tokenizer> {
        Arc::new(Delimited {
            name: "math",
            open: "$",
            close: "$",
        })
    }

    #[test]
    fn test_inline_match_becomes_placeholder() {
        let mut lexed = lexer(vec![dollar()]).lex("a $x^2$ b\n");
        assert_eq!(lexed.source, "a \u{E000}0\u{E001} b\n");
        let token = lexed.take(0).unwrap();
        assert_eq!(token.raw, "$x^2$");
        assert_eq!(token.ext().unwrap().text, "x^2");
        assert!(lexed.take(0).is_none());
    }

    #[test]
    fn test_code_spans_are_skipped() {
        let lexed = lexer(vec![dollar()]).lex("`$a$` and $b$");
        assert_eq!(lexed.source, "`$a$` and \u{E000}0\u{E001}");
        assert_eq!(lexed.len(), 1);
    }

    #[test]
    fn test_fenced_code_is_skipped() {
        let src = "```\n$a$\n```\n$b$\n";
        let lexed = lexer(vec![dollar()]).lex(src);
        assert_eq!(lexed.source, "```\n$a$\n```\n\u{E000}0\u{E001}\n");
    }

    #[test]
    fn test_unmatched_start_consumes_one_char() {
        let lexed = lexer(vec![dollar()]).lex("costs $5 and ¥6");
        assert_eq!(lexed.source, "costs $5 and ¥6");
        assert!(lexed.is_empty());
    }

    #[test]
    fn test_tie_goes_to_first_registered() {
        let first: Arc<dyn Tokenizer> = Arc::new(Delimited {
            name: "first",
            open: "[[",
            close: "]]",
        });
        let second: Arc<dyn Tokenizer> = Arc::new(Delimited {
            name: "second",
            open: "[[",
            close: "]]",
        });
        let mut lexed = lexer(vec![first, second]).lex("[[x]]");
        assert!(lexed.take(0).unwrap().is_ext("first"));
    }

    #[test]
    fn test_declined_tie_falls_through() {
        let strict: Arc<dyn Tokenizer> = Arc::new(Delimited {
            name: "strict",
            open: "[[",
            close: "]]]",
        });
        let loose: Arc<dyn Tokenizer> = Arc::new(Delimited {
            name: "loose",
            open: "[[",
            close: "]]",
        });
        let mut lexed = lexer(vec![strict, loose]).lex("[[x]]");
        assert!(lexed.take(0).unwrap().is_ext("loose"));
    }

    #[test]
    fn test_earliest_offset_wins() {
        let brackets: Arc<dyn Tokenizer> = Arc::new(Delimited {
            name: "brackets",
            open: "[[",
            close: "]]",
        });
        let mut lexed = lexer(vec![brackets, dollar()]).lex("$a$ [[b]]");
        assert!(lexed.take(0).unwrap().is_ext("math"));
        assert!(lexed.take(1).unwrap().is_ext("brackets"));
    }

    #[test]
    fn test_block_token_is_isolated_paragraph() {
        let src = "before\n:::\nbody\n:::\nafter\n";
        let fenced: Arc<dyn Tokenizer> = Arc::new(Fenced);
        let lexed = lexer(vec![fenced]).lex(src);
        assert_eq!(lexed.source, "before\n\n\u{E000}0\u{E001}\n\nafter\n");
        assert_eq!(lexed.restore(&lexed.source), "before\n\n:::\nbody\n:::\n\n\nafter\n");
    }

    #[test]
    fn test_block_token_inside_blockquote() {
        let src = "> [!note] Title\n> :::\n> body\n> :::\n> after\n";
        let fenced: Arc<dyn Tokenizer> = Arc::new(Fenced);
        let mut lexed = lexer(vec![fenced]).lex(src);
        assert_eq!(
            lexed.source,
            "> [!note] Title\n>\n> \u{E000}0\u{E001}\n>\n> after\n"
        );
        let token = lexed.take(0).unwrap();
        assert_eq!(token.raw, ":::\nbody\n:::\n");
        assert_eq!(token.ext().unwrap().text, "body\n");
    }

    #[test]
    fn test_quoted_block_stops_at_quote_depth() {
        let src = "> :::\n> body\n\n:::\n";
        let fenced: Arc<dyn Tokenizer> = Arc::new(Fenced);
        let lexed = lexer(vec![fenced]).lex(src);
        assert!(lexed.is_empty());
        assert_eq!(lexed.source, src);
    }

    #[test]
    fn test_restore_leaves_unknown_placeholders() {
        let lexed = Lexed::default();
        assert_eq!(lexed.restore("a\u{E000}7\u{E001}"), "a\u{E000}7\u{E001}");
    }

    #[test]
    fn test_split_code_spans() {
        assert_eq!(
            split_code_spans("a ``b`c`` d `e"),
            vec![(false, "a "), (true, "``b`c``"), (false, " d `e")]
        );
    }

    #[test]
    fn test_segments() {
        assert_eq!(
            Lexed::segments("a\u{E000}0\u{E001}b"),
            vec![Segment::Text("a"), Segment::Token(0), Segment::Text("b")]
        );
    }
}
