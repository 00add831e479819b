//! Fenced code blocks: plain code, mermaid, admonitions, charts and math.

use std::fmt::Write;
use std::sync::Arc;

use async_trait::async_trait;
use ww_dom::{escape_attr, escape_text, outer_html};
use ww_renderer::{
    ExtensionError, Extension, FormulaRenderer, FormulaSyntax, RenderContext, ResourceCursor,
    Token, TokenKind, WalkContext, Walked, failure_placeholder,
};

use crate::math::typeset;
use crate::svg::svg_img;

pub const MERMAID_SELECTOR: &str = ".mermaid";
pub const ADMONITION_SELECTOR: &str = ".callout.admonition";
pub const CHART_SELECTOR: &str = ".block-language-chart";

/// What a fence's language tag asks for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FenceKind {
    Plain(Option<String>),
    Mermaid,
    /// `ad-<type>` blocks from the Admonition plugin.
    Admonition(String),
    Chart,
    Math(FormulaSyntax),
}

impl FenceKind {
    pub fn classify(lang: Option<&str>) -> Self {
        let Some(lang) = lang.map(str::trim).filter(|l| !l.is_empty()) else {
            return Self::Plain(None);
        };
        match lang.to_ascii_lowercase().as_str() {
            "mermaid" => Self::Mermaid,
            "chart" => Self::Chart,
            "math" | "latex" | "tex" => Self::Math(FormulaSyntax::Latex),
            "asciimath" | "am" => Self::Math(FormulaSyntax::AsciiMath),
            lower => match lower.strip_prefix("ad-") {
                Some(kind) if !kind.is_empty() => Self::Admonition(kind.to_owned()),
                _ => Self::Plain(Some(lang.to_owned())),
            },
        }
    }

    /// Selector of the host fragment this kind borrows, if any.
    pub fn selector(&self) -> Option<&'static str> {
        match self {
            Self::Mermaid => Some(MERMAID_SELECTOR),
            Self::Admonition(_) => Some(ADMONITION_SELECTOR),
            Self::Chart => Some(CHART_SELECTOR),
            Self::Plain(_) | Self::Math(_) => None,
        }
    }
}

fn fence_kind(token: &Token) -> Option<FenceKind> {
    match &token.kind {
        TokenKind::Code { lang, .. } => Some(FenceKind::classify(lang.as_deref())),
        _ => None,
    }
}

pub struct CodeExtension {
    mermaid: ResourceCursor,
    admonition: ResourceCursor,
    chart: ResourceCursor,
    formula: Arc<dyn FormulaRenderer>,
    failure_text: String,
    line_numbers: bool,
}

impl CodeExtension {
    pub fn new(ctx: &RenderContext) -> Self {
        Self {
            mermaid: ResourceCursor::new(MERMAID_SELECTOR),
            admonition: ResourceCursor::new(ADMONITION_SELECTOR),
            chart: ResourceCursor::new(CHART_SELECTOR),
            formula: Arc::clone(&ctx.formula),
            failure_text: ctx.config.render.failure_text.clone(),
            line_numbers: ctx.config.code.line_numbers,
        }
    }

    /// Current cursor positions: mermaid, admonition, chart.
    pub fn positions(&self) -> (usize, usize, usize) {
        (
            self.mermaid.position(),
            self.admonition.position(),
            self.chart.position(),
        )
    }

    fn failure(&self) -> String {
        failure_placeholder(&self.failure_text)
    }

    fn mermaid(&mut self, ctx: &mut WalkContext<'_>) -> String {
        let index = self.mermaid.position();
        let img = self
            .mermaid
            .claim(ctx.resources)
            .and_then(|el| svg_img(&el, "mermaid-img"));
        let inner = img.unwrap_or_else(|| {
            ctx.warn("code", format!("no mermaid diagram at index {index}"));
            self.failure()
        });
        format!(r#"<section class="mermaid">{inner}</section>"#)
    }

    fn admonition(&mut self, kind: &str, ctx: &mut WalkContext<'_>) -> String {
        let index = self.admonition.position();
        match self.admonition.claim(ctx.resources) {
            Some(el) => outer_html(&el),
            None => {
                ctx.warn("code", format!("no ad-{kind} admonition at index {index}"));
                format!(
                    r#"<section class="admonition admonition-{}">{}</section>"#,
                    escape_attr(kind),
                    self.failure()
                )
            }
        }
    }

    fn chart(&mut self, ctx: &mut WalkContext<'_>) -> String {
        let index = self.chart.position();
        let inner = match self.chart.claim(ctx.resources) {
            Some(el) => svg_img(&el, "chart-img").unwrap_or_else(|| outer_html(&el)),
            None => {
                ctx.warn("code", format!("no chart at index {index}"));
                self.failure()
            }
        };
        format!(r#"<section class="chart">{inner}</section>"#)
    }
}

/// Code block markup, optionally with a line-number gutter.
pub fn render_code(lang: Option<&str>, text: &str, line_numbers: bool) -> String {
    let mut out = String::from(r#"<section class="code-section">"#);
    let text = text.strip_suffix('\n').unwrap_or(text);
    if line_numbers {
        out.push_str(r#"<ul class="code-line-numbers">"#);
        for n in 1..=text.lines().count().max(1) {
            write!(out, "<li>{n}</li>").ok();
        }
        out.push_str("</ul>");
    }
    out.push_str("<pre><code");
    if let Some(lang) = lang {
        write!(out, r#" class="language-{}""#, escape_attr(lang)).ok();
    }
    out.push('>');
    out.push_str(&escape_text(text));
    out.push_str("</code></pre></section>");
    out
}

#[async_trait]
impl Extension for CodeExtension {
    fn name(&self) -> &'static str {
        "code"
    }

    async fn prepare(&mut self) {
        self.mermaid.reset();
        self.admonition.reset();
        self.chart.reset();
    }

    fn walks(&self, kind: &TokenKind) -> bool {
        matches!(kind, TokenKind::Code { .. })
    }

    async fn walk(
        &mut self,
        token: &mut Token,
        ctx: &mut WalkContext<'_>,
    ) -> Result<Walked, ExtensionError> {
        let TokenKind::Code { lang, text } = &token.kind else {
            return Ok(Walked::Skipped);
        };
        let html = match FenceKind::classify(lang.as_deref()) {
            FenceKind::Plain(lang) => {
                let line_numbers = ctx
                    .properties
                    .show_code_line_number()
                    .unwrap_or(self.line_numbers);
                render_code(lang.as_deref(), text, line_numbers)
            }
            FenceKind::Math(syntax) => {
                typeset(self.formula.as_ref(), &self.failure_text, text.trim(), syntax, true)
            }
            FenceKind::Mermaid => self.mermaid(ctx),
            FenceKind::Admonition(kind) => self.admonition(&kind, ctx),
            FenceKind::Chart => self.chart(ctx),
        };
        token.html = Some(html);
        Ok(Walked::Claimed)
    }

    fn resource_demand(&self, token: &Token) -> Option<&'static str> {
        fence_kind(token).and_then(|kind| kind.selector())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(FenceKind::classify(None), FenceKind::Plain(None));
        assert_eq!(FenceKind::classify(Some("Mermaid")), FenceKind::Mermaid);
        assert_eq!(
            FenceKind::classify(Some("ad-warning")),
            FenceKind::Admonition("warning".to_owned())
        );
        assert_eq!(
            FenceKind::classify(Some("ad-")),
            FenceKind::Plain(Some("ad-".to_owned()))
        );
        assert_eq!(FenceKind::classify(Some("am")), FenceKind::Math(FormulaSyntax::AsciiMath));
        assert_eq!(
            FenceKind::classify(Some("rust")),
            FenceKind::Plain(Some("rust".to_owned()))
        );
    }

    #[test]
    fn test_selectors() {
        assert_eq!(FenceKind::Mermaid.selector(), Some(".mermaid"));
        assert_eq!(FenceKind::Chart.selector(), Some(".block-language-chart"));
        assert_eq!(FenceKind::Plain(None).selector(), None);
    }

    #[test]
    fn test_render_code_with_line_numbers() {
        assert_eq!(
            render_code(Some("rs"), "a\n<b>\n", true),
            "<section class=\"code-section\"><ul class=\"code-line-numbers\"><li>1</li><li>2</li></ul>\
             <pre><code class=\"language-rs\">a\n&lt;b&gt;</code></pre></section>"
        );
    }

    #[test]
    fn test_render_code_plain() {
        assert_eq!(
            render_code(None, "x", false),
            "<section class=\"code-section\"><pre><code>x</code></pre></section>"
        );
    }
}
