//! Parse tree handed between the lexer, the walk phase and the HTML writer.

use std::collections::BTreeMap;

/// Where a tokenizer may match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenLevel {
    /// At the start of a line outside fenced code.
    Block,
    /// Inside paragraph text outside code spans.
    Inline,
}

/// Column alignment of a table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Alignment {
    None,
    Left,
    Center,
    Right,
}

impl Alignment {
    pub(crate) fn style(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Left => Some("text-align: left"),
            Self::Center => Some("text-align: center"),
            Self::Right => Some("text-align: right"),
        }
    }
}

impl From<pulldown_cmark::Alignment> for Alignment {
    fn from(value: pulldown_cmark::Alignment) -> Self {
        match value {
            pulldown_cmark::Alignment::None => Self::None,
            pulldown_cmark::Alignment::Left => Self::Left,
            pulldown_cmark::Alignment::Center => Self::Center,
            pulldown_cmark::Alignment::Right => Self::Right,
        }
    }
}

/// Payload of a token produced by an extension tokenizer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtToken {
    /// Name of the tokenizer that produced the token; selects its renderer.
    pub name: String,
    pub level: TokenLevel,
    /// Construct body, e.g. the formula between `$` delimiters.
    pub text: String,
    pub attrs: BTreeMap<String, String>,
}

impl ExtToken {
    pub fn new(name: impl Into<String>, level: TokenLevel, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            level,
            text: text.into(),
            attrs: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }
}

/// Construct discriminant with construct-specific fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    /// Transparent container; renders as its children. Used for the document root.
    Group,
    Paragraph,
    Heading { depth: u8 },
    BlockQuote,
    Code { lang: Option<String>, text: String },
    List { ordered: bool, start: u64 },
    ListItem { checked: Option<bool> },
    Table { alignments: Vec<Alignment> },
    TableHead,
    TableRow,
    TableCell,
    Text { text: String },
    CodeSpan { text: String },
    Emphasis,
    Strong,
    Strikethrough,
    Link { href: String, title: String },
    Image { src: String, title: String },
    Html { html: String },
    SoftBreak,
    HardBreak,
    Rule,
    FootnoteReference { label: String },
    FootnoteDefinition { label: String },
    Extension(ExtToken),
}

/// One node of the parse tree.
///
/// `html` is filled by the extension that claims the token during the walk
/// phase; the writer then emits it verbatim instead of rendering the token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub raw: String,
    pub children: Vec<Token>,
    pub html: Option<String>,
}

impl Token {
    pub fn new(kind: TokenKind) -> Self {
        Self {
            kind,
            raw: String::new(),
            children: Vec::new(),
            html: None,
        }
    }

    /// An extension token consuming `raw`.
    pub fn extension(ext: ExtToken, raw: impl Into<String>) -> Self {
        Self::new(TokenKind::Extension(ext)).with_raw(raw)
    }

    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            raw: text.clone(),
            ..Self::new(TokenKind::Text { text })
        }
    }

    #[must_use]
    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = raw.into();
        self
    }

    #[must_use]
    pub fn with_children(mut self, children: Vec<Token>) -> Self {
        self.children = children;
        self
    }

    /// The extension payload, if this token came from an extension tokenizer.
    pub fn ext(&self) -> Option<&ExtToken> {
        match &self.kind {
            TokenKind::Extension(ext) => Some(ext),
            _ => None,
        }
    }

    /// Whether this is an extension token produced by tokenizer `name`.
    pub fn is_ext(&self, name: &str) -> bool {
        self.ext().is_some_and(|ext| ext.name == name)
    }

    pub fn is_claimed(&self) -> bool {
        self.html.is_some()
    }

    /// Plain text of the subtree: text, code spans and extension bodies.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match &self.kind {
            TokenKind::Text { text }
            | TokenKind::CodeSpan { text }
            | TokenKind::Code { text, .. } => out.push_str(text),
            TokenKind::Extension(ext) => out.push_str(&ext.text),
            TokenKind::SoftBreak | TokenKind::HardBreak => out.push('\n'),
            _ => {}
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }

    /// Visit the subtree in document order (pre-order), the receiver first.
    pub fn visit(&self, f: &mut impl FnMut(&Token)) {
        f(self);
        for child in &self.children {
            child.visit(f);
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_plain_text_includes_nested_content() {
        let token = Token::new(TokenKind::Paragraph).with_children(vec![
            Token::text("a "),
            Token::new(TokenKind::Strong).with_children(vec![Token::text("b")]),
            Token::new(TokenKind::SoftBreak),
            Token::extension(ExtToken::new("math-inline", TokenLevel::Inline, "x^2"), "$x^2$"),
        ]);
        assert_eq!(token.plain_text(), "a b\nx^2");
    }

    #[test]
    fn test_visit_is_pre_order() {
        let token = Token::new(TokenKind::Group).with_children(vec![
            Token::new(TokenKind::Paragraph).with_children(vec![Token::text("x")]),
            Token::new(TokenKind::Rule),
        ]);
        let mut kinds = Vec::new();
        token.visit(&mut |t| kinds.push(std::mem::discriminant(&t.kind)));
        assert_eq!(kinds.len(), 4);
        assert_eq!(kinds[1], std::mem::discriminant(&TokenKind::Paragraph));
        assert_eq!(kinds[3], std::mem::discriminant(&TokenKind::Rule));
    }

    #[test]
    fn test_is_ext() {
        let token = Token::extension(ExtToken::new("embed", TokenLevel::Inline, "a.png"), "![[a.png]]");
        assert!(token.is_ext("embed"));
        assert!(!token.is_ext("math-inline"));
        assert!(!Token::text("x").is_ext("embed"));
    }
}
