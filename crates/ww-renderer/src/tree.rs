//! Second tokenization pass: CommonMark structure around the placeholders.

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag};

use crate::lexer::{Lexed, PLACEHOLDER_OPEN, Segment, placeholder};
use crate::token::{Token, TokenKind, TokenLevel};

fn options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_FOOTNOTES
}

/// Parse placeholder Markdown into a token tree rooted at a [`TokenKind::Group`].
///
/// Extension tokens are moved out of `lexed` to the positions of their
/// placeholders. A paragraph holding nothing but one block-level extension
/// token is replaced by that token.
pub fn build_tree(mut lexed: Lexed) -> Token {
    let source = std::mem::take(&mut lexed.source);
    let mut stack = vec![Token::new(TokenKind::Group).with_raw(lexed.restore(&source))];

    for (event, range) in Parser::new_ext(&source, options()).into_offset_iter() {
        match event {
            Event::Start(tag) => {
                let kind = start_kind(tag, &lexed);
                stack.push(Token::new(kind).with_raw(lexed.restore(&source[range])));
            }
            Event::End(_) => close_top(&mut stack, &mut lexed),
            Event::Text(text) => push_text(&mut stack, &text),
            Event::Code(text) => {
                let token = Token::new(TokenKind::CodeSpan {
                    text: lexed.restore(&text),
                })
                .with_raw(lexed.restore(&source[range]));
                push_child(&mut stack, token);
            }
            Event::Html(html) | Event::InlineHtml(html) => {
                let html = lexed.restore(&html);
                match stack.last_mut().map(|t| &mut t.kind) {
                    Some(TokenKind::Html { html: buf }) => buf.push_str(&html),
                    _ => push_child(
                        &mut stack,
                        Token::new(TokenKind::Html { html: html.clone() }).with_raw(html),
                    ),
                }
            }
            Event::InlineMath(text) => push_text(&mut stack, &format!("${text}$")),
            Event::DisplayMath(text) => push_text(&mut stack, &format!("$${text}$$")),
            Event::FootnoteReference(label) => {
                let token = Token::new(TokenKind::FootnoteReference {
                    label: label.into_string(),
                })
                .with_raw(&source[range]);
                push_child(&mut stack, token);
            }
            Event::SoftBreak => push_child(&mut stack, Token::new(TokenKind::SoftBreak).with_raw("\n")),
            Event::HardBreak => push_child(&mut stack, Token::new(TokenKind::HardBreak)),
            Event::Rule => push_child(&mut stack, Token::new(TokenKind::Rule)),
            Event::TaskListMarker(checked) => {
                // Loose items put the marker inside the item's paragraph.
                if let Some(item) = stack
                    .iter_mut()
                    .rev()
                    .find(|t| matches!(t.kind, TokenKind::ListItem { .. }))
                {
                    item.kind = TokenKind::ListItem {
                        checked: Some(checked),
                    };
                }
            }
        }
    }

    while stack.len() > 1 {
        close_top(&mut stack, &mut lexed);
    }
    let mut root = stack.pop().unwrap_or_else(|| Token::new(TokenKind::Group));
    finish(&mut root, &mut lexed);
    root
}

fn start_kind(tag: Tag<'_>, lexed: &Lexed) -> TokenKind {
    match tag {
        Tag::Paragraph => TokenKind::Paragraph,
        Tag::Heading { level, .. } => TokenKind::Heading { depth: level as u8 },
        Tag::BlockQuote(_) => TokenKind::BlockQuote,
        Tag::CodeBlock(kind) => {
            let lang = match kind {
                CodeBlockKind::Fenced(info) => info
                    .split_whitespace()
                    .next()
                    .map(str::to_owned),
                CodeBlockKind::Indented => None,
            };
            TokenKind::Code {
                lang,
                text: String::new(),
            }
        }
        Tag::HtmlBlock => TokenKind::Html {
            html: String::new(),
        },
        Tag::List(start) => TokenKind::List {
            ordered: start.is_some(),
            start: start.unwrap_or(1),
        },
        Tag::Item => TokenKind::ListItem { checked: None },
        Tag::FootnoteDefinition(label) => TokenKind::FootnoteDefinition {
            label: label.into_string(),
        },
        Tag::Table(alignments) => TokenKind::Table {
            alignments: alignments.into_iter().map(Into::into).collect(),
        },
        Tag::TableHead => TokenKind::TableHead,
        Tag::TableRow => TokenKind::TableRow,
        Tag::TableCell => TokenKind::TableCell,
        Tag::Emphasis => TokenKind::Emphasis,
        Tag::Strong => TokenKind::Strong,
        Tag::Strikethrough => TokenKind::Strikethrough,
        Tag::Link {
            dest_url, title, ..
        } => TokenKind::Link {
            href: lexed.restore(&dest_url),
            title: lexed.restore(&title),
        },
        Tag::Image {
            dest_url, title, ..
        } => TokenKind::Image {
            src: lexed.restore(&dest_url),
            title: lexed.restore(&title),
        },
        Tag::Superscript
        | Tag::Subscript
        | Tag::DefinitionList
        | Tag::DefinitionListTitle
        | Tag::DefinitionListDefinition
        | Tag::MetadataBlock(_) => TokenKind::Group,
    }
}

fn push_child(stack: &mut [Token], token: Token) {
    if let Some(top) = stack.last_mut() {
        top.children.push(token);
    }
}

fn push_text(stack: &mut [Token], text: &str) {
    let Some(top) = stack.last_mut() else { return };
    match &mut top.kind {
        TokenKind::Code { text: buf, .. } => buf.push_str(text),
        TokenKind::Html { html } => html.push_str(text),
        _ => top.children.push(Token::text(text)),
    }
}

fn close_top(stack: &mut Vec<Token>, lexed: &mut Lexed) {
    if stack.len() < 2 {
        return;
    }
    if let Some(mut node) = stack.pop() {
        finish(&mut node, lexed);
        push_child(stack, node);
    }
}

/// Merge adjacent text, expand placeholders and unwrap lone block tokens.
fn finish(node: &mut Token, lexed: &mut Lexed) {
    if let TokenKind::Code { text, .. } = &mut node.kind
        && text.contains(PLACEHOLDER_OPEN)
    {
        *text = lexed.restore(text);
    }

    let mut merged: Vec<Token> = Vec::with_capacity(node.children.len());
    for child in std::mem::take(&mut node.children) {
        if let TokenKind::Text { text } = &child.kind
            && let Some(last) = merged.last_mut()
            && let TokenKind::Text { text: prev } = &mut last.kind
        {
            prev.push_str(text);
            last.raw.push_str(text);
            continue;
        }
        merged.push(child);
    }

    for child in merged {
        if let TokenKind::Text { text } = &child.kind
            && text.contains(PLACEHOLDER_OPEN)
        {
            for segment in Lexed::segments(text) {
                let token = match segment {
                    Segment::Text(text) => Token::text(text),
                    Segment::Token(index) => lexed
                        .take(index)
                        .unwrap_or_else(|| Token::text(placeholder(index))),
                };
                node.children.push(token);
            }
            continue;
        }
        node.children.push(child);
    }

    if node.kind == TokenKind::Paragraph
        && node.children.len() == 1
        && node.children[0]
            .ext()
            .is_some_and(|ext| ext.level == TokenLevel::Block)
        && let Some(only) = node.children.pop()
    {
        *node = only;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::extension::Tokenizer;
    use crate::lexer::Lexer;
    use crate::token::{Alignment, ExtToken};

    struct Math;

    impl Tokenizer for Math {
        fn name(&self) -> &'static str {
            "math"
        }

        fn level(&self) -> TokenLevel {
            TokenLevel::Inline
        }

        fn start(&self, src: &str) -> Option<usize> {
            src.find('$')
        }

        fn tokenize(&self, src: &str) -> Option<Token> {
            let body = src.strip_prefix('$')?;
            let end = body.find('$')?;
            Some(Token::extension(
                ExtToken::new("math", TokenLevel::Inline, &body[..end]),
                &src[..end + 2],
            ))
        }

        fn render(&self, _token: &Token) -> String {
            String::new()
        }
    }

    struct Banner;

    impl Tokenizer for Banner {
        fn name(&self) -> &'static str {
            "banner"
        }

        fn level(&self) -> TokenLevel {
            TokenLevel::Block
        }

        fn start(&self, src: &str) -> Option<usize> {
            src.find("!!! ")
        }

        fn tokenize(&self, src: &str) -> Option<Token> {
            let line = src.strip_prefix("!!! ")?;
            let end = line.find('\n').map_or(line.len(), |p| p + 1);
            Some(Token::extension(
                ExtToken::new("banner", TokenLevel::Block, line[..end].trim()),
                &src[..4 + end],
            ))
        }

        fn render(&self, _token: &Token) -> String {
            String::new()
        }
    }

    fn parse(src: &str) -> Token {
        let tokenizers: Vec<Arc<dyn Tokenizer>> = vec![Arc::new(Math), Arc::new(Banner)];
        build_tree(Lexer::new(&tokenizers).lex(src))
    }

    #[test]
    fn test_inline_token_lands_in_paragraph() {
        let root = parse("a $x$ b\n");
        let para = &root.children[0];
        assert_eq!(para.kind, TokenKind::Paragraph);
        assert_eq!(para.children.len(), 3);
        assert_eq!(para.children[0].kind, TokenKind::Text { text: "a ".into() });
        assert!(para.children[1].is_ext("math"));
        assert_eq!(para.children[1].raw, "$x$");
        assert_eq!(para.children[2].kind, TokenKind::Text { text: " b".into() });
    }

    #[test]
    fn test_inline_token_inside_emphasis() {
        let root = parse("*$y$*");
        let em = &root.children[0].children[0];
        assert_eq!(em.kind, TokenKind::Emphasis);
        assert!(em.children[0].is_ext("math"));
    }

    #[test]
    fn test_block_token_replaces_paragraph() {
        let root = parse("intro\n!!! Attention\nouter\n");
        assert_eq!(root.children.len(), 3);
        assert!(root.children[1].is_ext("banner"));
        assert_eq!(root.children[1].ext().unwrap().text, "Attention");
        assert_eq!(root.children[2].kind, TokenKind::Paragraph);
    }

    #[test]
    fn test_fenced_code_keeps_text_and_language() {
        let root = parse("```rust\nlet a = $b$;\n```\n");
        assert_eq!(
            root.children[0].kind,
            TokenKind::Code {
                lang: Some("rust".into()),
                text: "let a = $b$;\n".into(),
            }
        );
    }

    #[test]
    fn test_placeholder_in_link_destination_is_restored() {
        let root = parse("[pay](https://x.test/$a$)");
        let link = &root.children[0].children[0];
        assert_eq!(
            link.kind,
            TokenKind::Link {
                href: "https://x.test/$a$".into(),
                title: String::new(),
            }
        );
    }

    #[test]
    fn test_task_list_and_table() {
        let root = parse("- [x] done\n- todo\n\n| a | b |\n|:-|-:|\n| 1 | 2 |\n");
        let list = &root.children[0];
        assert_eq!(list.kind, TokenKind::List { ordered: false, start: 1 });
        assert_eq!(list.children[0].kind, TokenKind::ListItem { checked: Some(true) });
        assert_eq!(list.children[1].kind, TokenKind::ListItem { checked: None });
        assert_eq!(
            root.children[1].kind,
            TokenKind::Table {
                alignments: vec![Alignment::Left, Alignment::Right],
            }
        );
    }

    #[test]
    fn test_callout_marker_stays_text() {
        let root = parse("> [!note] Title\n> body\n");
        let quote = &root.children[0];
        assert_eq!(quote.kind, TokenKind::BlockQuote);
        assert!(quote.plain_text().starts_with("[!note] Title"));
    }
}
