//! `$…$` and `$$…$$` formulas.
//!
//! Formulas are typeset straight from the source text by the session's
//! formula renderer; nothing is borrowed from the host.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use ww_renderer::{
    Extension, ExtensionDefinition, ExtToken, FormulaRenderer, FormulaSyntax, RenderContext,
    Token, TokenLevel, Tokenizer, failure_placeholder,
};

pub const MATH_BLOCK: &str = "math-block";
pub const MATH_INLINE: &str = "math-inline";

/// Blockquote markers at the start of a continuation line.
static QUOTE_MARKERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*(?:>[ \t]?)+").expect("invalid quote marker regex"));

/// Remove the `>` markers a formula picks up when it spans quoted lines.
fn strip_quote_markers(formula: &str) -> String {
    match formula.split_once('\n') {
        Some((first, rest)) => format!("{first}\n{}", QUOTE_MARKERS.replace_all(rest, "")),
        None => formula.to_owned(),
    }
}

/// Wrap typeset formula markup in the inline or block container.
pub(crate) fn wrap_formula(markup: &str, display: bool) -> String {
    if display {
        format!(r#"<section class="block-math">{markup}</section>"#)
    } else {
        format!(r#"<span class="inline-math">{markup}</span>"#)
    }
}

/// Typeset `source`, falling back to the failure placeholder.
pub(crate) fn typeset(
    formula: &dyn FormulaRenderer,
    failure_text: &str,
    source: &str,
    syntax: FormulaSyntax,
    display: bool,
) -> String {
    match formula.render(source, syntax, display) {
        Ok(markup) => wrap_formula(&markup, display),
        Err(e) => {
            tracing::warn!(formula = source, error = %e, "Formula rendering failed");
            wrap_formula(&failure_placeholder(failure_text), display)
        }
    }
}

pub struct MathExtension {
    formula: Arc<dyn FormulaRenderer>,
    failure_text: String,
}

impl MathExtension {
    pub fn new(ctx: &RenderContext) -> Self {
        Self {
            formula: Arc::clone(&ctx.formula),
            failure_text: ctx.config.render.failure_text.clone(),
        }
    }
}

#[async_trait]
impl Extension for MathExtension {
    fn name(&self) -> &'static str {
        "math"
    }

    fn definition(&self) -> ExtensionDefinition {
        ExtensionDefinition::default()
            .with_tokenizer(MathTokenizer {
                level: TokenLevel::Block,
                formula: Arc::clone(&self.formula),
                failure_text: self.failure_text.clone(),
            })
            .with_tokenizer(MathTokenizer {
                level: TokenLevel::Inline,
                formula: Arc::clone(&self.formula),
                failure_text: self.failure_text.clone(),
            })
    }
}

struct MathTokenizer {
    level: TokenLevel,
    formula: Arc<dyn FormulaRenderer>,
    failure_text: String,
}

impl MathTokenizer {
    /// `$$` at a line start, body up to the closing `$$`, rest of that line.
    fn block(src: &str) -> Option<Token> {
        let body = src.strip_prefix("$$")?;
        let end = body.find("$$")?;
        let formula = body[..end].trim();
        if formula.is_empty() {
            return None;
        }
        let after = &body[end + 2..];
        let line_end = after.find('\n').map_or(after.len(), |p| p + 1);
        if !after[..line_end].trim().is_empty() {
            return None;
        }
        let consumed = 2 + end + 2 + line_end;
        Some(Token::extension(
            ExtToken::new(MATH_BLOCK, TokenLevel::Block, formula),
            &src[..consumed],
        ))
    }

    /// `$$…$$` (display) or `$…$` inside text.
    ///
    /// Single-dollar formulas may not start or end with whitespace and the
    /// closing `$` may not be followed by a digit, so prices stay text.
    fn inline(src: &str) -> Option<Token> {
        if let Some(body) = src.strip_prefix("$$") {
            let end = body.find("$$")?;
            let formula = &body[..end];
            if formula.trim().is_empty() || formula.contains("\n\n") {
                return None;
            }
            let formula = strip_quote_markers(formula);
            return Some(Token::extension(
                ExtToken::new(MATH_INLINE, TokenLevel::Inline, formula.trim())
                    .with_attr("display", "true"),
                &src[..end + 4],
            ));
        }

        let body = src.strip_prefix('$')?;
        let end = closing_dollar(body)?;
        let formula = &body[..end];
        if formula.is_empty()
            || formula.starts_with(char::is_whitespace)
            || formula.ends_with(char::is_whitespace)
            || formula.contains('\n')
        {
            return None;
        }
        if body[end + 1..].starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }
        Some(Token::extension(
            ExtToken::new(MATH_INLINE, TokenLevel::Inline, formula),
            &src[..end + 2],
        ))
    }
}

/// Offset of the first unescaped `$` in `body`.
fn closing_dollar(body: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        match c {
            '\\' => escaped = !escaped,
            '$' if !escaped => return Some(i),
            _ => escaped = false,
        }
    }
    None
}

/// Offset of the first `$` not preceded by a backslash.
fn unescaped_dollar(src: &str) -> Option<usize> {
    let bytes = src.as_bytes();
    let mut from = 0;
    while let Some(p) = src[from..].find('$') {
        let at = from + p;
        let backslashes = bytes[..at].iter().rev().take_while(|&&b| b == b'\\').count();
        if backslashes % 2 == 0 {
            return Some(at);
        }
        from = at + 1;
    }
    None
}

impl Tokenizer for MathTokenizer {
    fn name(&self) -> &'static str {
        match self.level {
            TokenLevel::Block => MATH_BLOCK,
            TokenLevel::Inline => MATH_INLINE,
        }
    }

    fn level(&self) -> TokenLevel {
        self.level
    }

    fn start(&self, src: &str) -> Option<usize> {
        match self.level {
            TokenLevel::Block => src.starts_with("$$").then_some(0),
            TokenLevel::Inline => unescaped_dollar(src),
        }
    }

    fn tokenize(&self, src: &str) -> Option<Token> {
        match self.level {
            TokenLevel::Block => Self::block(src),
            TokenLevel::Inline => Self::inline(src),
        }
    }

    fn render(&self, token: &Token) -> String {
        let Some(ext) = token.ext() else {
            return String::new();
        };
        let display = self.level == TokenLevel::Block || ext.attr("display") == Some("true");
        typeset(
            self.formula.as_ref(),
            &self.failure_text,
            &ext.text,
            FormulaSyntax::Latex,
            display,
        )
    }
}
