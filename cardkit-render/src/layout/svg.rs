/// SVG writer for a placed layout tree.
///
/// Assets are resolved before writing: [`collect_assets`] lists every emoji
/// key and image source the tree references, the engine resolves them to
/// data URIs, and [`write_svg`] embeds whatever resolved. Anything missing is
/// left blank.
use std::collections::{BTreeSet, HashMap};
use std::fmt::Write;

use super::compute::{Placed, Rect};
use super::text::{self, TextRun};
use super::{Paint, Style, TextStyle};

/// Ascent as a fraction of font size; places the baseline in the line box.
const ASCENT_RATIO: f32 = 0.8;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AssetRefs {
    pub emoji: BTreeSet<String>,
    pub images: BTreeSet<String>,
}

/// Data URIs keyed by emoji code or image source.
#[derive(Debug, Default, Clone)]
pub struct ResolvedAssets {
    pub emoji: HashMap<String, String>,
    pub images: HashMap<String, String>,
}

pub fn collect_assets(placed: &Placed<'_>) -> AssetRefs {
    let mut refs = AssetRefs::default();
    collect_into(placed, &mut refs);
    refs
}

fn collect_into(placed: &Placed<'_>, refs: &mut AssetRefs) {
    match placed {
        Placed::Frame { children, .. } => {
            for child in children {
                collect_into(child, refs);
            }
        }
        Placed::Text { runs, .. } => {
            for run in runs {
                if let TextRun::Emoji { code, .. } = run {
                    refs.emoji.insert(code.clone());
                }
            }
        }
        Placed::Image { src, .. } => {
            refs.images.insert((*src).to_string());
        }
    }
}

struct Writer<'a> {
    out: String,
    assets: &'a ResolvedAssets,
    font_family: &'a str,
    next_id: usize,
}

impl Writer<'_> {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

/// Write the document. Width and height are in layout units; the raster
/// scale is applied later.
pub fn write_svg(
    placed: &Placed<'_>,
    width: f32,
    height: f32,
    assets: &ResolvedAssets,
    font_family: &str,
) -> String {
    let mut w = Writer {
        out: String::with_capacity(4096),
        assets,
        font_family,
        next_id: 0,
    };

    let _ = write!(
        w.out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"#,
    );
    write_node(&mut w, placed);
    w.out.push_str("</svg>");
    w.out
}

fn write_node(w: &mut Writer<'_>, placed: &Placed<'_>) {
    match placed {
        Placed::Frame {
            rect,
            style,
            children,
        } => {
            let grouped = style.opacity < 1.0;
            if grouped {
                let _ = write!(w.out, r#"<g opacity="{}">"#, style.opacity);
            }
            write_background(w, *rect, style);
            let clip = if style.clip {
                let id = w.id("clip");
                write_clip_path(w, &id, *rect, style.radius);
                let _ = write!(w.out, r#"<g clip-path="url(#{id})">"#);
                true
            } else {
                false
            };
            for child in children {
                write_node(w, child);
            }
            if clip {
                w.out.push_str("</g>");
            }
            // Border goes last so it sits on top of clipped children.
            write_border(w, *rect, style);
            if grouped {
                w.out.push_str("</g>");
            }
        }
        Placed::Text { rect, style, runs } => write_text(w, *rect, style, runs),
        Placed::Image { rect, src, radius } => {
            let Some(uri) = w.assets.images.get(*src) else {
                return;
            };
            let uri = uri.clone();
            write_image(w, *rect, &uri, *radius);
        }
    }
}

fn write_background(w: &mut Writer<'_>, rect: Rect, style: &Style) {
    let Rect {
        x,
        y,
        width,
        height,
    } = rect;
    let r = style.radius;

    if let Some(paint) = &style.background {
        let fill = match paint {
            Paint::Solid(color) => xml_escape(color),
            Paint::LinearGradient { from, to, angle } => {
                let id = w.id("grad");
                let (x1, y1, x2, y2) = gradient_vector(*angle);
                let _ = write!(
                    w.out,
                    r#"<defs><linearGradient id="{id}" x1="{x1}" y1="{y1}" x2="{x2}" y2="{y2}"><stop offset="0" stop-color="{}"/><stop offset="1" stop-color="{}"/></linearGradient></defs>"#,
                    xml_escape(from),
                    xml_escape(to),
                );
                format!("url(#{id})")
            }
        };
        let _ = write!(
            w.out,
            r#"<rect x="{x}" y="{y}" width="{width}" height="{height}" rx="{r}" fill="{fill}"/>"#,
        );
    }
}

fn write_border(w: &mut Writer<'_>, rect: Rect, style: &Style) {
    let Rect {
        x,
        y,
        width,
        height,
    } = rect;
    if let Some(border) = &style.border {
        // Stroke is centred on the path; inset so it stays inside the box.
        let half = border.width / 2.0;
        let _ = write!(
            w.out,
            r#"<rect x="{}" y="{}" width="{}" height="{}" rx="{}" fill="none" stroke="{}" stroke-width="{}"/>"#,
            x + half,
            y + half,
            (width - border.width).max(0.0),
            (height - border.width).max(0.0),
            (style.radius - half).max(0.0),
            xml_escape(&border.color),
            border.width,
        );
    }
}

fn gradient_vector(angle: f32) -> (f32, f32, f32, f32) {
    let (sin, cos) = angle.to_radians().sin_cos();
    (
        0.5 - cos / 2.0,
        0.5 - sin / 2.0,
        0.5 + cos / 2.0,
        0.5 + sin / 2.0,
    )
}

fn write_text(w: &mut Writer<'_>, rect: Rect, style: &TextStyle, runs: &[TextRun]) {
    let family = xml_escape(style.family.as_deref().unwrap_or(w.font_family));
    let line = text::line_height(style);
    let baseline = rect.y + (line - style.size) / 2.0 + style.size * ASCENT_RATIO;
    let emoji = text::emoji_size(style);
    let letter_spacing = if style.letter_spacing != 0.0 {
        format!(r#" letter-spacing="{}""#, style.letter_spacing)
    } else {
        String::new()
    };

    let mut x = rect.x;
    for run in runs {
        match run {
            TextRun::Plain(content) => {
                let _ = write!(
                    w.out,
                    r#"<text x="{x}" y="{baseline}" font-family="'{family}', sans-serif" font-size="{}" font-weight="{}" fill="{}"{letter_spacing} xml:space="preserve">{}</text>"#,
                    style.size,
                    style.weight,
                    xml_escape(&style.color),
                    xml_escape(content),
                );
                x += text::plain_width(content, style);
            }
            TextRun::Emoji { code, .. } => {
                if let Some(uri) = w.assets.emoji.get(code) {
                    let ey = rect.y + (line - emoji) / 2.0;
                    let _ = write!(
                        w.out,
                        r#"<image x="{x}" y="{ey}" width="{emoji}" height="{emoji}" xlink:href="{uri}"/>"#,
                    );
                }
                x += emoji;
            }
        }
    }
}

fn write_image(w: &mut Writer<'_>, rect: Rect, uri: &str, radius: f32) {
    let Rect {
        x,
        y,
        width,
        height,
    } = rect;
    let clip = if radius > 0.0 {
        let id = w.id("clip");
        write_clip_path(w, &id, rect, radius);
        format!(r#" clip-path="url(#{id})""#)
    } else {
        String::new()
    };
    let _ = write!(
        w.out,
        r#"<image x="{x}" y="{y}" width="{width}" height="{height}" preserveAspectRatio="xMidYMid slice" xlink:href="{uri}"{clip}/>"#,
    );
}

fn write_clip_path(w: &mut Writer<'_>, id: &str, rect: Rect, radius: f32) {
    let Rect {
        x,
        y,
        width,
        height,
    } = rect;
    let _ = write!(
        w.out,
        r#"<defs><clipPath id="{id}"><rect x="{x}" y="{y}" width="{width}" height="{height}" rx="{radius}"/></clipPath></defs>"#,
    );
}

pub(crate) fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}
