//! Obsidian callouts (`> [!type] title`).
//!
//! Plain blockquotes are left to the default renderer. Callouts are replaced
//! by the host's rendering, which carries the icon and title bar.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use ww_dom::outer_html;
use ww_renderer::{
    Extension, ExtensionError, RenderContext, ResourceCursor, Token, TokenKind, WalkContext,
    Walked, failure_placeholder,
};

/// `ad-*` fences also render as `.callout`; those belong to the code extension.
pub const CALLOUT_SELECTOR: &str = ".callout:not(.admonition)";

static CALLOUT_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[!([A-Za-z0-9_-]+)\][+-]?").expect("invalid callout regex")
});

/// Callout type of a blockquote token, lowercased.
pub fn callout_type(token: &Token) -> Option<String> {
    if !matches!(token.kind, TokenKind::BlockQuote) {
        return None;
    }
    let first = token.children.first()?;
    if !matches!(first.kind, TokenKind::Paragraph) {
        return None;
    }
    let text = first.plain_text();
    let caps = CALLOUT_MARKER.captures(text.trim_start())?;
    Some(caps[1].to_ascii_lowercase())
}

pub struct BlockquoteExtension {
    cursor: ResourceCursor,
    failure_text: String,
}

impl BlockquoteExtension {
    pub fn new(ctx: &RenderContext) -> Self {
        Self {
            cursor: ResourceCursor::new(CALLOUT_SELECTOR),
            failure_text: ctx.config.render.failure_text.clone(),
        }
    }
}

#[async_trait]
impl Extension for BlockquoteExtension {
    fn name(&self) -> &'static str {
        "blockquote"
    }

    async fn prepare(&mut self) {
        self.cursor.reset();
    }

    fn walks(&self, kind: &TokenKind) -> bool {
        matches!(kind, TokenKind::BlockQuote)
    }

    async fn walk(
        &mut self,
        token: &mut Token,
        ctx: &mut WalkContext<'_>,
    ) -> Result<Walked, ExtensionError> {
        let Some(kind) = callout_type(token) else {
            return Ok(Walked::Skipped);
        };
        let index = self.cursor.position();
        token.html = Some(match self.cursor.claim(ctx.resources) {
            Some(callout) => outer_html(&callout),
            None => {
                ctx.warn("blockquote", format!("no {kind} callout at index {index}"));
                format!(
                    r#"<section class="callout" data-callout="{kind}">{}</section>"#,
                    failure_placeholder(&self.failure_text)
                )
            }
        });
        Ok(Walked::Claimed)
    }

    fn resource_demand(&self, token: &Token) -> Option<&'static str> {
        callout_type(token).map(|_| CALLOUT_SELECTOR)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn quote(text: &str) -> Token {
        Token::new(TokenKind::BlockQuote).with_children(vec![
            Token::new(TokenKind::Paragraph).with_children(vec![Token::text(text)]),
        ])
    }

    #[test]
    fn test_callout_type() {
        assert_eq!(callout_type(&quote("[!Warning] Careful")), Some("warning".to_owned()));
        assert_eq!(callout_type(&quote("[!tip]- folded")), Some("tip".to_owned()));
    }

    #[test]
    fn test_plain_quote_is_not_a_callout() {
        assert_eq!(callout_type(&quote("just words")), None);
        assert_eq!(callout_type(&Token::new(TokenKind::BlockQuote)), None);
        assert_eq!(callout_type(&Token::text("[!note]")), None);
    }
}
