//! `![[target#subpath|alias]]` embeds.
//!
//! The target's file name decides how it is rendered: images link to the
//! vault resource, SVG files are inlined as data URIs, Excalidraw drawings
//! and PDF crops are borrowed from the host render, notes are rendered
//! recursively through the element registry.

use std::collections::HashSet;
use std::fmt::Write;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use ww_cache::{Cache, CacheBucket, CacheBucketExt};
use ww_dom::{Element, Node, Selector, escape_attr, escape_text, inner_html, parse_fragment};
use ww_renderer::{
    DeferredElement, ElementSink, ExtToken, Extension, ExtensionDefinition, ExtensionError,
    PostprocessContext, RenderContext, ResourceCursor, Token, TokenKind, TokenLevel, Tokenizer,
    Vault, WalkContext, Walked, failure_placeholder,
};

use crate::svg::{img_tag, svg_data_uri, svg_img};

pub const EMBED: &str = "embed";
pub const EXCALIDRAW_SELECTOR: &str = ".excalidraw-svg";
pub const PDF_CROP_SELECTOR: &str = ".pdf-cropped-embed";

/// Cache bucket holding rendered SVG and drawing embeds.
pub const EMBED_BUCKET: &str = "embeds";

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp", "avif"];

static SIZE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)(?:x(\d+))?$").expect("invalid embed size regex"));

static CAPTIONED: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img[alt]").expect("invalid caption selector"));

static IN_FIGURE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("figure img").expect("invalid figure selector"));

/// How an embed target is rendered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbedKind {
    Image,
    Svg,
    /// A PDF page region, `file.pdf#page=3&rect=…`.
    PdfCrop,
    Excalidraw,
    Note,
    File,
}

impl EmbedKind {
    pub fn classify(target: &str, subpath: Option<&str>) -> Self {
        let lower = target.to_ascii_lowercase();
        if lower.ends_with(".excalidraw") || lower.ends_with(".excalidraw.md") {
            return Self::Excalidraw;
        }
        let name = lower.rsplit('/').next().unwrap_or(&lower);
        let Some((_, extension)) = name.rsplit_once('.') else {
            return Self::Note;
        };
        match extension {
            "md" => Self::Note,
            "svg" => Self::Svg,
            "pdf" if subpath.is_some_and(|s| s.contains("page=")) => Self::PdfCrop,
            ext if IMAGE_EXTENSIONS.contains(&ext) => Self::Image,
            _ => Self::File,
        }
    }

    /// Selector of the host fragment this kind borrows, if any.
    pub fn selector(self) -> Option<&'static str> {
        match self {
            Self::Excalidraw => Some(EXCALIDRAW_SELECTOR),
            Self::PdfCrop => Some(PDF_CROP_SELECTOR),
            Self::Image | Self::Svg | Self::Note | Self::File => None,
        }
    }
}

/// Parts of an embed token.
struct EmbedTarget {
    target: String,
    subpath: Option<String>,
    alias: Option<String>,
}

impl EmbedTarget {
    fn from_token(token: &Token) -> Option<Self> {
        let ext = token.ext()?;
        Some(Self {
            target: ext.text.clone(),
            subpath: ext.attr("subpath").map(str::to_owned),
            alias: ext.attr("alias").map(str::to_owned),
        })
    }

    fn kind(&self) -> EmbedKind {
        EmbedKind::classify(&self.target, self.subpath.as_deref())
    }
}

/// Drop the cached render of `path` from `cache`.
///
/// Hook for file-change notifications.
pub fn invalidate_embed_cache(cache: &dyn Cache, path: &str) {
    cache.bucket(EMBED_BUCKET).invalidate(path);
}

pub struct EmbedExtension {
    vault: Arc<dyn Vault>,
    cache: Box<dyn CacheBucket>,
    excalidraw: ResourceCursor,
    pdf: ResourceCursor,
    failure_text: String,
}

impl EmbedExtension {
    pub fn new(ctx: &RenderContext) -> Self {
        Self {
            vault: Arc::clone(&ctx.vault),
            cache: ctx.cache.bucket(EMBED_BUCKET),
            excalidraw: ResourceCursor::new(EXCALIDRAW_SELECTOR),
            pdf: ResourceCursor::new(PDF_CROP_SELECTOR),
            failure_text: ctx.config.render.failure_text.clone(),
        }
    }

    fn failure(&self) -> String {
        failure_placeholder(&self.failure_text)
    }

    /// Cached render of `path` and the etag to store a fresh one under.
    ///
    /// Files without a known version are never cached.
    async fn cached(&self, path: &str) -> (Option<String>, Option<String>) {
        let Some(etag) = self.vault.version(path).await.filter(|v| !v.is_empty()) else {
            return (None, None);
        };
        (self.cache.get_string(path, &etag), Some(etag))
    }

    fn store(&self, path: &str, etag: Option<&str>, html: &str) {
        if let Some(etag) = etag {
            self.cache.set_string(path, etag, html);
        }
    }

    async fn excalidraw(&mut self, embed: &EmbedTarget, ctx: &mut WalkContext<'_>) -> String {
        let index = self.excalidraw.position();
        let Some(el) = self.excalidraw.claim(ctx.resources) else {
            ctx.warn(EMBED, format!("no drawing for {} at index {index}", embed.target));
            return self.failure();
        };

        let path = self
            .vault
            .resolve(&embed.target, ctx.note_path)
            .unwrap_or_else(|| embed.target.clone());
        let (cached, etag) = self.cached(&path).await;
        if let Some(cached) = cached {
            return cached;
        }
        let Some(img) = svg_img(&el, "excalidraw-img") else {
            ctx.warn(EMBED, format!("drawing for {} has no svg", embed.target));
            return self.failure();
        };
        let html = format!(r#"<section class="excalidraw">{img}</section>"#);
        self.store(&path, etag.as_deref(), &html);
        html
    }

    fn pdf_crop(&mut self, embed: &EmbedTarget, ctx: &mut WalkContext<'_>) -> String {
        let index = self.pdf.position();
        let Some(el) = self.pdf.claim(ctx.resources) else {
            ctx.warn(EMBED, format!("no pdf crop for {} at index {index}", embed.target));
            return self.failure();
        };
        let id = ctx.elements.allocate_id();
        ctx.elements.add_element_by_id(&id, DeferredElement::Node(el));
        format!(r#"<section class="pdf-crop" id="{id}"></section>"#)
    }

    async fn svg_file(&self, path: &str, ctx: &mut WalkContext<'_>) -> String {
        let (cached, etag) = self.cached(path).await;
        if let Some(cached) = cached {
            return cached;
        }
        match self.vault.read_to_string(path).await {
            Ok(svg) => {
                let html = img_tag("embed-svg", &svg_data_uri(svg.trim()));
                self.store(path, etag.as_deref(), &html);
                html
            }
            Err(e) => {
                ctx.warn(EMBED, e.to_string());
                self.failure()
            }
        }
    }

    fn image(&self, path: &str, alias: Option<&str>) -> String {
        let src = escape_attr(&self.vault.resource_url(path));
        match alias.map(str::trim).filter(|a| !a.is_empty()) {
            Some(alias) => match SIZE.captures(alias) {
                Some(caps) => {
                    let mut size = format!(r#" width="{}""#, &caps[1]);
                    if let Some(height) = caps.get(2) {
                        write!(size, r#" height="{}""#, height.as_str()).ok();
                    }
                    format!(r#"<img class="embed-image" src="{src}" alt=""{size} />"#)
                }
                None => format!(
                    r#"<img class="embed-image" src="{src}" alt="{}" />"#,
                    escape_attr(alias)
                ),
            },
            None => format!(r#"<img class="embed-image" src="{src}" alt="" />"#),
        }
    }

    fn file(&self, path: &str, alias: Option<&str>) -> String {
        let label = alias
            .or_else(|| path.rsplit('/').next())
            .unwrap_or(path);
        format!(
            r#"<a class="embed-file" href="{}">{}</a>"#,
            escape_attr(&self.vault.resource_url(path)),
            escape_text(label)
        )
    }
}

#[async_trait]
impl Extension for EmbedExtension {
    fn name(&self) -> &'static str {
        EMBED
    }

    async fn prepare(&mut self) {
        self.excalidraw.reset();
        self.pdf.reset();
    }

    fn definition(&self) -> ExtensionDefinition {
        ExtensionDefinition::default().with_tokenizer(EmbedTokenizer)
    }

    fn walks(&self, kind: &TokenKind) -> bool {
        matches!(kind, TokenKind::Extension(ext) if ext.name == EMBED)
    }

    async fn walk(
        &mut self,
        token: &mut Token,
        ctx: &mut WalkContext<'_>,
    ) -> Result<Walked, ExtensionError> {
        let Some(embed) = EmbedTarget::from_token(token) else {
            return Ok(Walked::Skipped);
        };
        let kind = embed.kind();

        // Host-borrowed kinds claim their fragment even when the target is
        // missing from the vault so later embeds stay aligned.
        let html = match kind {
            EmbedKind::Excalidraw => self.excalidraw(&embed, ctx).await,
            EmbedKind::PdfCrop => self.pdf_crop(&embed, ctx),
            EmbedKind::Image | EmbedKind::Svg | EmbedKind::Note | EmbedKind::File => {
                match self.vault.resolve(&embed.target, ctx.note_path) {
                    None => {
                        ctx.warn(EMBED, format!("cannot resolve {}", embed.target));
                        self.failure()
                    }
                    Some(path) => match kind {
                        EmbedKind::Image => self.image(&path, embed.alias.as_deref()),
                        EmbedKind::Svg => self.svg_file(&path, ctx).await,
                        EmbedKind::Note => {
                            let id = ctx.elements.allocate_id();
                            ctx.elements.add_element_by_id(&id, DeferredElement::Note(path));
                            format!(r#"<section class="embed-note" id="{id}"></section>"#)
                        }
                        _ => self.file(&path, embed.alias.as_deref()),
                    },
                }
            }
        };
        token.html = Some(html);
        Ok(Walked::Claimed)
    }

    fn resource_demand(&self, token: &Token) -> Option<&'static str> {
        EmbedTarget::from_token(token).and_then(|embed| embed.kind().selector())
    }

    /// Wrap images that carry alt text in a captioned `<figure>`.
    async fn postprocess(
        &mut self,
        html: String,
        _ctx: &PostprocessContext<'_>,
    ) -> Result<String, ExtensionError> {
        if !html.contains("<img") {
            return Ok(html);
        }
        let mut root = parse_fragment(&html);
        let in_figure: HashSet<Vec<usize>> = root.select_paths(&IN_FIGURE).into_iter().collect();
        let mut paths = root.select_paths(&CAPTIONED);
        paths.reverse();
        for path in paths {
            if in_figure.contains(&path) {
                continue;
            }
            let Some(img) = root.get(&path).cloned() else {
                continue;
            };
            let caption = img.attr("alt").unwrap_or_default().trim().to_owned();
            if caption.is_empty() {
                continue;
            }
            let figure = Element::new("figure")
                .with_attr("class", "image-caption")
                .with_child(img)
                .with_child(Element::new("figcaption").with_text(caption));
            root.replace(&path, vec![Node::Element(figure)]);
        }
        Ok(inner_html(&root))
    }
}

struct EmbedTokenizer;

impl Tokenizer for EmbedTokenizer {
    fn name(&self) -> &'static str {
        EMBED
    }

    fn level(&self) -> TokenLevel {
        TokenLevel::Inline
    }

    fn start(&self, src: &str) -> Option<usize> {
        src.find("![[")
    }

    fn tokenize(&self, src: &str) -> Option<Token> {
        let rest = src.strip_prefix("![[")?;
        let end = rest.find("]]")?;
        let inner = &rest[..end];
        if inner.contains(['\n', '[', ']']) {
            return None;
        }
        let (link, alias) = match inner.split_once('|') {
            Some((link, alias)) => (link, Some(alias.trim())),
            None => (inner, None),
        };
        let (target, subpath) = match link.split_once('#') {
            Some((target, subpath)) => (target.trim(), Some(subpath.trim())),
            None => (link.trim(), None),
        };
        if target.is_empty() {
            return None;
        }
        let mut ext = ExtToken::new(EMBED, TokenLevel::Inline, target);
        if let Some(subpath) = subpath.filter(|s| !s.is_empty()) {
            ext = ext.with_attr("subpath", subpath);
        }
        if let Some(alias) = alias.filter(|a| !a.is_empty()) {
            ext = ext.with_attr("alias", alias);
        }
        Some(Token::extension(ext, &src[..3 + end + 2]))
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
    fn test_classify() {
        assert_eq!(EmbedKind::classify("a/b.PNG", None), EmbedKind::Image);
        assert_eq!(EmbedKind::classify("flow.svg", None), EmbedKind::Svg);
        assert_eq!(EmbedKind::classify("doc.pdf", Some("page=2")), EmbedKind::PdfCrop);
        assert_eq!(EmbedKind::classify("doc.pdf", None), EmbedKind::File);
        assert_eq!(EmbedKind::classify("Drawing.excalidraw.md", None), EmbedKind::Excalidraw);
        assert_eq!(EmbedKind::classify("Other note", None), EmbedKind::Note);
        assert_eq!(EmbedKind::classify("v1.2/notes.md", None), EmbedKind::Note);
        assert_eq!(EmbedKind::classify("data.zip", None), EmbedKind::File);
    }

    #[test]
    fn test_tokenize_parts() {
        let token = EmbedTokenizer.tokenize("![[pic.png#x|Sunset]] after").unwrap();
        assert_eq!(token.raw, "![[pic.png#x|Sunset]]");
        let ext = token.ext().unwrap();
        assert_eq!(ext.text, "pic.png");
        assert_eq!(ext.attr("subpath"), Some("x"));
        assert_eq!(ext.attr("alias"), Some("Sunset"));
    }

    #[test]
    fn test_tokenize_rejects_broken_links() {
        assert!(EmbedTokenizer.tokenize("![[a\nb]]").is_none());
        assert!(EmbedTokenizer.tokenize("![[|x]]").is_none());
        assert!(EmbedTokenizer.tokenize("![[open").is_none());
    }

    #[test]
    fn test_demand_only_for_borrowed_kinds() {
        let ctx = RenderContext::new(
            Arc::new(ww_config::Config::default()),
            Arc::new(ww_renderer::MemoryVault::new()),
        );
        let ext = EmbedExtension::new(&ctx);
        let drawing = EmbedTokenizer.tokenize("![[d.excalidraw]]").unwrap();
        let image = EmbedTokenizer.tokenize("![[p.png]]").unwrap();
        assert_eq!(ext.resource_demand(&drawing), Some(EXCALIDRAW_SELECTOR));
        assert_eq!(ext.resource_demand(&image), None);
    }
}
