//! Tables borrowed from the host render.

use async_trait::async_trait;
use ww_dom::outer_html;
use ww_renderer::{
    Extension, ExtensionError, ResourceCursor, Token, TokenKind, WalkContext, Walked,
};

pub const TABLE_SELECTOR: &str = "table";

/// Pairs each Markdown table with the host's rendering of it.
///
/// A table the host did not render falls back to the built-in table markup,
/// which is always available.
pub struct TableExtension {
    cursor: ResourceCursor,
}

impl TableExtension {
    pub fn new() -> Self {
        Self {
            cursor: ResourceCursor::new(TABLE_SELECTOR),
        }
    }
}

impl Default for TableExtension {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extension for TableExtension {
    fn name(&self) -> &'static str {
        "table"
    }

    async fn prepare(&mut self) {
        self.cursor.reset();
    }

    fn walks(&self, kind: &TokenKind) -> bool {
        matches!(kind, TokenKind::Table { .. })
    }

    async fn walk(
        &mut self,
        token: &mut Token,
        ctx: &mut WalkContext<'_>,
    ) -> Result<Walked, ExtensionError> {
        let index = self.cursor.position();
        let Some(table) = self.cursor.claim(ctx.resources) else {
            ctx.warn("table", format!("no host table at index {index}, using plain markup"));
            return Ok(Walked::Skipped);
        };
        token.html = Some(format!(
            r#"<section class="table-container">{}</section>"#,
            outer_html(&table)
        ));
        Ok(Walked::Claimed)
    }

    fn resource_demand(&self, token: &Token) -> Option<&'static str> {
        matches!(token.kind, TokenKind::Table { .. }).then_some(TABLE_SELECTOR)
    }
}
