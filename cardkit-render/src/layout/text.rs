//! Text segmentation and width estimation.
//!
//! Emoji sequences are split out of text so they can be drawn as images;
//! widths are estimated per character like the table renderer always did,
//! slightly overestimated to avoid overflow.

use super::TextStyle;

/// Average advance of a proportional sans-serif, as a fraction of font size.
const CHAR_WIDTH_RATIO: f32 = 0.6;
/// Extra width bold text needs relative to regular.
const BOLD_RATIO: f32 = 1.06;
/// Emoji glyph box relative to font size.
pub const EMOJI_RATIO: f32 = 1.15;
/// Line box height relative to font size.
pub const LINE_HEIGHT_RATIO: f32 = 1.3;

const ZWJ: char = '\u{200D}';
const VS16: char = '\u{FE0F}';
const KEYCAP: char = '\u{20E3}';

#[derive(Debug, Clone, PartialEq)]
pub enum TextRun {
    Plain(String),
    Emoji {
        /// Dash-joined lowercase hex codepoints, without VS16
        code: String,
        raw: String,
    },
}

fn is_emoji_base(c: char) -> bool {
    matches!(c as u32,
        0x1F000..=0x1FAFF | 0x2600..=0x27BF | 0x2B50 | 0x2B55 | 0x2B1B | 0x2B1C | 0x2934 | 0x2935
        | 0x3030 | 0x303D | 0x3297 | 0x3299)
}

fn is_modifier(c: char) -> bool {
    matches!(c as u32, 0x1F3FB..=0x1F3FF) || c == VS16 || c == KEYCAP
}

/// Split text into plain and emoji runs.
pub fn segment(text: &str) -> Vec<TextRun> {
    let mut runs = Vec::new();
    let mut plain = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        let keycap_base = (c.is_ascii_digit() || c == '#' || c == '*')
            && chars.peek().is_some_and(|&n| n == VS16 || n == KEYCAP);
        if !is_emoji_base(c) && !keycap_base {
            plain.push(c);
            continue;
        }

        if !plain.is_empty() {
            runs.push(TextRun::Plain(std::mem::take(&mut plain)));
        }

        let mut raw = String::from(c);
        // Regional indicators pair up into flags.
        if (0x1F1E6..=0x1F1FF).contains(&(c as u32))
            && let Some(&n) = chars.peek()
            && (0x1F1E6..=0x1F1FF).contains(&(n as u32))
        {
            raw.push(n);
            chars.next();
        }
        loop {
            match chars.peek() {
                Some(&n) if is_modifier(n) => {
                    raw.push(n);
                    chars.next();
                }
                Some(&ZWJ) => {
                    raw.push(ZWJ);
                    chars.next();
                    if let Some(&n) = chars.peek()
                        && is_emoji_base(n)
                    {
                        raw.push(n);
                        chars.next();
                    }
                }
                _ => break,
            }
        }

        runs.push(TextRun::Emoji {
            code: codepoint_key(&raw),
            raw,
        });
    }

    if !plain.is_empty() {
        runs.push(TextRun::Plain(plain));
    }
    runs
}

/// Codepoint key used by emoji image sets, e.g. `1f469-200d-1f4bb`.
pub fn codepoint_key(raw: &str) -> String {
    raw.chars()
        .filter(|&c| c != VS16)
        .map(|c| format!("{:x}", c as u32))
        .collect::<Vec<_>>()
        .join("-")
}

/// Estimated advance of a plain run.
pub fn plain_width(text: &str, style: &TextStyle) -> f32 {
    let chars = text.chars().count() as f32;
    let mut width = chars * style.size * CHAR_WIDTH_RATIO + chars * style.letter_spacing;
    if style.weight >= 600 {
        width *= BOLD_RATIO;
    }
    width
}

pub fn emoji_size(style: &TextStyle) -> f32 {
    style.size * EMOJI_RATIO
}

/// Estimated width of a whole run list.
pub fn runs_width(runs: &[TextRun], style: &TextStyle) -> f32 {
    runs.iter()
        .map(|run| match run {
            TextRun::Plain(text) => plain_width(text, style),
            TextRun::Emoji { .. } => emoji_size(style),
        })
        .sum()
}

pub fn line_height(style: &TextStyle) -> f32 {
    style.size * LINE_HEIGHT_RATIO
}
