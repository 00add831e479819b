//! Inline SVG to `<img>` conversion.
//!
//! The WeChat editor drops inline `<svg>` from pasted articles, so borrowed
//! drawings are shipped as base64 data URIs instead.

use std::sync::LazyLock;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use ww_dom::{Element, Selector, escape_attr, outer_html};

const SVG_NS: &str = "http://www.w3.org/2000/svg";

static SVG: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("svg").expect("invalid svg selector"));

/// `data:image/svg+xml;base64,…` for an SVG document.
pub fn svg_data_uri(svg: &str) -> String {
    format!("data:image/svg+xml;base64,{}", STANDARD.encode(svg.as_bytes()))
}

/// The first `<svg>` in `el` (or `el` itself), with its namespace set so it
/// renders standalone.
pub fn find_svg(el: &Element) -> Option<Element> {
    let mut svg = if el.tag == "svg" {
        el.clone()
    } else {
        el.select_first(&SVG)?.clone()
    };
    if svg.attr("xmlns").is_none() {
        svg.set_attr("xmlns", SVG_NS);
    }
    Some(svg)
}

/// `<img>` markup showing the first SVG found in `el`.
pub fn svg_img(el: &Element, class: &str) -> Option<String> {
    let svg = find_svg(el)?;
    Some(img_tag(class, &svg_data_uri(&outer_html(&svg))))
}

pub(crate) fn img_tag(class: &str, src: &str) -> String {
    format!(
        r#"<img class="{}" src="{}" alt="" />"#,
        escape_attr(class),
        escape_attr(src)
    )
}
