//! Formula rendering boundary.

use ww_dom::escape_text;

use crate::error::FormulaError;

/// Input notation of a formula.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormulaSyntax {
    Latex,
    AsciiMath,
}

/// Turns formula source into markup (typically inline SVG).
pub trait FormulaRenderer: Send + Sync {
    /// `display` selects block layout over inline layout.
    fn render(
        &self,
        source: &str,
        syntax: FormulaSyntax,
        display: bool,
    ) -> Result<String, FormulaError>;
}

/// Emits the escaped source in a `<code class="formula">` element.
///
/// Used when no typesetting engine is available.
pub struct PassthroughFormula;

impl FormulaRenderer for PassthroughFormula {
    fn render(
        &self,
        source: &str,
        syntax: FormulaSyntax,
        _display: bool,
    ) -> Result<String, FormulaError> {
        let notation = match syntax {
            FormulaSyntax::Latex => "latex",
            FormulaSyntax::AsciiMath => "asciimath",
        };
        Ok(format!(
            r#"<code class="formula" data-syntax="{notation}">{}</code>"#,
            escape_text(source)
        ))
    }
}
