//! Rendering extensions for WeWrite.
//!
//! Each module implements one [`Extension`]. [`default_engine`] registers
//! them in the order the pipeline relies on: extensions that classify content
//! (code, embeds, math) come before the cosmetic postprocessors.
//!
//! ```
//! use std::sync::Arc;
//!
//! use ww_config::Config;
//! use ww_renderer::{MemoryVault, RenderContext};
//!
//! let ctx = RenderContext::new(Arc::new(Config::default()), Arc::new(MemoryVault::new()));
//! let engine = ww_extensions::default_engine(&ctx);
//! assert_eq!(engine.extension_names().first(), Some(&"code"));
//! ```

mod blockquote;
mod code;
mod embed;
mod heading;
mod iconize;
mod links;
mod list_item;
mod math;
mod svg;
mod table;

pub use blockquote::{BlockquoteExtension, CALLOUT_SELECTOR, callout_type};
pub use code::{
    ADMONITION_SELECTOR, CHART_SELECTOR, CodeExtension, FenceKind, MERMAID_SELECTOR, render_code,
};
pub use embed::{
    EMBED, EMBED_BUCKET, EXCALIDRAW_SELECTOR, EmbedExtension, EmbedKind, PDF_CROP_SELECTOR,
    invalidate_embed_cache,
};
pub use heading::HeadingExtension;
pub use iconize::{ICON_SELECTOR, ICONIZE, IconizeExtension};
pub use links::LinksExtension;
pub use list_item::ListItemExtension;
pub use math::{MATH_BLOCK, MATH_INLINE, MathExtension};
pub use svg::{find_svg, svg_data_uri, svg_img};
pub use table::{TABLE_SELECTOR, TableExtension};
use ww_renderer::{Extension, RenderContext, RenderEngine};

/// All extensions in default registration order.
pub fn default_extensions(ctx: &RenderContext) -> Vec<Box<dyn Extension>> {
    vec![
        Box::new(CodeExtension::new(ctx)),
        Box::new(EmbedExtension::new(ctx)),
        Box::new(MathExtension::new(ctx)),
        Box::new(IconizeExtension::new(ctx)),
        Box::new(TableExtension::new()),
        Box::new(BlockquoteExtension::new(ctx)),
        Box::new(HeadingExtension),
        Box::new(LinksExtension::new(ctx)),
        Box::new(ListItemExtension),
    ]
}

/// An engine with every default extension, configured from `ctx`.
pub fn default_engine(ctx: &RenderContext) -> RenderEngine {
    default_extensions(ctx)
        .into_iter()
        .fold(
            RenderEngine::builder().with_config(&ctx.config),
            ww_renderer::RenderEngineBuilder::with_boxed,
        )
        .build()
}
