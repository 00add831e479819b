//! Iconize shortcodes such as `:LiHeart:`.
//!
//! The icon pack lives in the host plugin; each shortcode is paired with the
//! next `.iconize-icon` the host rendered.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use ww_dom::escape_text;
use ww_renderer::{
    ExtToken, Extension, ExtensionDefinition, ExtensionError, RenderContext, ResourceCursor, Token,
    TokenKind, TokenLevel, Tokenizer, WalkContext, Walked, failure_placeholder,
};

use crate::svg::svg_img;

pub const ICONIZE: &str = "iconize";
pub const ICON_SELECTOR: &str = ".iconize-icon";

/// A pack prefix (`Li`, `Fas`, `Ib`, …) followed by a PascalCase icon name.
static SHORTCODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r":([A-Z][a-z]{1,3}[A-Z][A-Za-z0-9]*):").expect("invalid iconize regex")
});

pub struct IconizeExtension {
    cursor: ResourceCursor,
    failure_text: String,
}

impl IconizeExtension {
    pub fn new(ctx: &RenderContext) -> Self {
        Self {
            cursor: ResourceCursor::new(ICON_SELECTOR),
            failure_text: ctx.config.render.failure_text.clone(),
        }
    }
}

#[async_trait]
impl Extension for IconizeExtension {
    fn name(&self) -> &'static str {
        ICONIZE
    }

    async fn prepare(&mut self) {
        self.cursor.reset();
    }

    fn definition(&self) -> ExtensionDefinition {
        ExtensionDefinition::default().with_tokenizer(IconTokenizer)
    }

    fn walks(&self, kind: &TokenKind) -> bool {
        matches!(kind, TokenKind::Extension(ext) if ext.name == ICONIZE)
    }

    async fn walk(
        &mut self,
        token: &mut Token,
        ctx: &mut WalkContext<'_>,
    ) -> Result<Walked, ExtensionError> {
        let index = self.cursor.position();
        let icon = self
            .cursor
            .claim(ctx.resources)
            .and_then(|el| svg_img(&el, "iconize-icon"));
        token.html = Some(icon.unwrap_or_else(|| {
            ctx.warn(ICONIZE, format!("no icon for {} at index {index}", token.raw));
            failure_placeholder(&self.failure_text)
        }));
        Ok(Walked::Claimed)
    }

    fn resource_demand(&self, token: &Token) -> Option<&'static str> {
        token.is_ext(ICONIZE).then_some(ICON_SELECTOR)
    }
}

struct IconTokenizer;

impl Tokenizer for IconTokenizer {
    fn name(&self) -> &'static str {
        ICONIZE
    }

    fn level(&self) -> TokenLevel {
        TokenLevel::Inline
    }

    fn start(&self, src: &str) -> Option<usize> {
        SHORTCODE.find(src).map(|m| m.start())
    }

    fn tokenize(&self, src: &str) -> Option<Token> {
        let caps = SHORTCODE.captures(src)?;
        let whole = caps.get(0).filter(|m| m.start() == 0)?;
        Some(Token::extension(
            ExtToken::new(ICONIZE, TokenLevel::Inline, &caps[1]),
            whole.as_str(),
        ))
    }

    fn render(&self, token: &Token) -> String {
        escape_text(&token.raw)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_shortcode() {
        assert_eq!(IconTokenizer.start("see :LiHeart: here"), Some(4));
        let token = IconTokenizer.tokenize(":LiHeart: here").unwrap();
        assert_eq!(token.raw, ":LiHeart:");
        assert_eq!(token.ext().unwrap().text, "LiHeart");
    }

    #[test]
    fn test_plain_colons_are_text() {
        assert_eq!(IconTokenizer.start("time 10:30: ok"), None);
        assert!(IconTokenizer.tokenize(":smile:").is_none());
        assert!(IconTokenizer.tokenize("x :LiHeart:").is_none());
    }
}
