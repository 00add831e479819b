//! HTML writer for the token tree.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;

use ww_dom::{escape_attr, escape_text};

use crate::extension::Tokenizer;
use crate::token::{Alignment, Token, TokenKind};

/// Renders a token tree to HTML.
///
/// Claimed tokens emit their stored markup verbatim; extension tokens are
/// handed to the tokenizer that produced them.
pub struct HtmlWriter<'a> {
    renderers: &'a HashMap<&'static str, Arc<dyn Tokenizer>>,
}

impl<'a> HtmlWriter<'a> {
    pub fn new(renderers: &'a HashMap<&'static str, Arc<dyn Tokenizer>>) -> Self {
        Self { renderers }
    }

    pub fn render(&self, root: &Token) -> String {
        let mut out = String::with_capacity(root.raw.len() * 2);
        self.write(root, &mut out);
        out
    }

    fn write_children(&self, token: &Token, out: &mut String) {
        for child in &token.children {
            self.write(child, out);
        }
    }

    fn wrap(&self, tag: &str, token: &Token, out: &mut String) {
        write!(out, "<{tag}>").ok();
        self.write_children(token, out);
        write!(out, "</{tag}>").ok();
    }

    fn write(&self, token: &Token, out: &mut String) {
        if let Some(html) = &token.html {
            out.push_str(html);
            return;
        }
        match &token.kind {
            TokenKind::Group => self.write_children(token, out),
            TokenKind::Paragraph => {
                self.wrap("p", token, out);
                out.push('\n');
            }
            TokenKind::Heading { depth } => {
                self.wrap(&format!("h{depth}"), token, out);
                out.push('\n');
            }
            TokenKind::BlockQuote => {
                out.push_str("<blockquote>\n");
                self.write_children(token, out);
                out.push_str("</blockquote>\n");
            }
            TokenKind::Code { lang, text } => {
                out.push_str("<pre><code");
                if let Some(lang) = lang {
                    write!(out, r#" class="language-{}""#, escape_attr(lang)).ok();
                }
                writeln!(out, ">{}</code></pre>", escape_text(text)).ok();
            }
            TokenKind::List { ordered, start } => {
                if *ordered {
                    if *start == 1 {
                        out.push_str("<ol>\n");
                    } else {
                        writeln!(out, r#"<ol start="{start}">"#).ok();
                    }
                } else {
                    out.push_str("<ul>\n");
                }
                self.write_children(token, out);
                out.push_str(if *ordered { "</ol>\n" } else { "</ul>\n" });
            }
            TokenKind::ListItem { checked } => {
                out.push_str("<li>");
                if let Some(checked) = checked {
                    out.push_str(if *checked {
                        r#"<input type="checkbox" disabled="" checked="" /> "#
                    } else {
                        r#"<input type="checkbox" disabled="" /> "#
                    });
                }
                self.write_children(token, out);
                out.push_str("</li>\n");
            }
            TokenKind::Table { alignments } => self.write_table(token, alignments, out),
            // Table parts outside a table: render their content only.
            TokenKind::TableHead | TokenKind::TableRow | TokenKind::TableCell => {
                self.write_children(token, out);
            }
            TokenKind::Text { text } => out.push_str(&escape_text(text)),
            TokenKind::CodeSpan { text } => {
                write!(out, "<code>{}</code>", escape_text(text)).ok();
            }
            TokenKind::Emphasis => self.wrap("em", token, out),
            TokenKind::Strong => self.wrap("strong", token, out),
            TokenKind::Strikethrough => self.wrap("del", token, out),
            TokenKind::Link { href, title } => {
                write!(out, r#"<a href="{}""#, escape_attr(href)).ok();
                if !title.is_empty() {
                    write!(out, r#" title="{}""#, escape_attr(title)).ok();
                }
                out.push('>');
                self.write_children(token, out);
                out.push_str("</a>");
            }
            TokenKind::Image { src, title } => {
                write!(
                    out,
                    r#"<img src="{}" alt="{}""#,
                    escape_attr(src),
                    escape_attr(&token.plain_text())
                )
                .ok();
                if !title.is_empty() {
                    write!(out, r#" title="{}""#, escape_attr(title)).ok();
                }
                out.push_str(" />");
            }
            TokenKind::Html { html } => out.push_str(html),
            TokenKind::SoftBreak => out.push('\n'),
            TokenKind::HardBreak => out.push_str("<br />\n"),
            TokenKind::Rule => out.push_str("<hr />\n"),
            TokenKind::FootnoteReference { label } => {
                let label = escape_attr(label);
                write!(
                    out,
                    r#"<sup class="footnote-ref" data-footnote="{label}">[{label}]</sup>"#
                )
                .ok();
            }
            TokenKind::FootnoteDefinition { label } => {
                write!(
                    out,
                    r#"<section class="footnote-def" data-footnote="{}">"#,
                    escape_attr(label)
                )
                .ok();
                self.write_children(token, out);
                out.push_str("</section>\n");
            }
            TokenKind::Extension(ext) => match self.renderers.get(ext.name.as_str()) {
                Some(renderer) => out.push_str(&renderer.render(token)),
                None => out.push_str(&escape_text(&token.raw)),
            },
        }
    }

    fn write_table(&self, token: &Token, alignments: &[Alignment], out: &mut String) {
        out.push_str("<table>\n");
        let mut body_open = false;
        for section in &token.children {
            if section.is_claimed() {
                self.write(section, out);
                continue;
            }
            match section.kind {
                TokenKind::TableHead => {
                    out.push_str("<thead>\n<tr>");
                    self.write_cells(section, "th", alignments, out);
                    out.push_str("</tr>\n</thead>\n");
                }
                TokenKind::TableRow => {
                    if !body_open {
                        out.push_str("<tbody>\n");
                        body_open = true;
                    }
                    out.push_str("<tr>");
                    self.write_cells(section, "td", alignments, out);
                    out.push_str("</tr>\n");
                }
                _ => self.write(section, out),
            }
        }
        if body_open {
            out.push_str("</tbody>\n");
        }
        out.push_str("</table>\n");
    }

    fn write_cells(&self, row: &Token, tag: &str, alignments: &[Alignment], out: &mut String) {
        for (i, cell) in row.children.iter().enumerate() {
            if let Some(html) = &cell.html {
                out.push_str(html);
                continue;
            }
            match alignments.get(i).and_then(|a| a.style()) {
                Some(style) => write!(out, r#"<{tag} style="{style}">"#).ok(),
                None => write!(out, "<{tag}>").ok(),
            };
            self.write_children(cell, out);
            write!(out, "</{tag}>").ok();
        }
    }
}
