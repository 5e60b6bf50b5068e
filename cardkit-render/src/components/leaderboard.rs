//! Ranked leaderboard table.
//!
//! Rows use the same zebra/header-accent look as the chat table renderer.

use super::format::format_number;
use super::palette::*;
use super::{PropError, Props};
use crate::engine::RenderConfig;
use crate::layout::{Align, Edges, Node, Style, TextStyle};
use crate::registry::ComponentSpec;

pub const WIDTH: f32 = 520.0;
pub const MAX_ROWS: usize = 10;

const HEADER_HEIGHT: f32 = 48.0;
const HEADER_ACCENT_HEIGHT: f32 = 3.0;
const ROW_HEIGHT: f32 = 36.0;
const CELL_PAD_X: f32 = 14.0;
const RANK_WIDTH: f32 = 44.0;

pub const SPEC: ComponentSpec = ComponentSpec {
    name: "Leaderboard",
    template,
    numeric_fields: &["entries[].score", "entries[].rank"],
};

fn rank_label(rank: u64) -> String {
    match rank {
        1 => "🥇".to_string(),
        2 => "🥈".to_string(),
        3 => "🥉".to_string(),
        n => format!("#{n}"),
    }
}

fn row(index: usize, entry: &Props<'_>) -> Result<Node, PropError> {
    let name = entry.str("name")?;
    let score = entry.number("score")?;
    let rank = entry
        .opt_number("rank")?
        .map(|r| r.max(0.0) as u64)
        .unwrap_or(index as u64 + 1);
    let fill = if index % 2 == 1 { ZEBRA_ODD } else { ZEBRA_EVEN };

    Ok(Node::frame(
        Style::row()
            .height(ROW_HEIGHT)
            .padding(Edges::xy(CELL_PAD_X, 0.0))
            .gap(12.0)
            .align(Align::Center)
            .background(fill),
    )
    .children([
        Node::frame(Style::row().width(RANK_WIDTH)).child(Node::text(
            rank_label(rank),
            TextStyle::new(14.0, MUTED).weight(600),
        )),
        Node::frame(Style::row().grow(1.0)).child(Node::text(name, TextStyle::new(14.0, TEXT_COLOR))),
        Node::text(
            format_number(score),
            TextStyle::new(14.0, HEADER_TEXT).weight(600),
        ),
    ]))
}

fn template(props: &Props<'_>, config: &RenderConfig) -> Result<Node, PropError> {
    let title = props.opt_str("title")?.unwrap_or("Leaderboard");
    let entries = props.list("entries")?;
    let accent = config.accent.as_deref().unwrap_or(ACCENT);
    let background = if props.has_banner() {
        BG_TRANSLUCENT
    } else {
        config.background.as_deref().unwrap_or(BG_COLOR)
    };

    let rows = entries
        .iter()
        .take(MAX_ROWS)
        .enumerate()
        .map(|(i, entry)| row(i, entry))
        .collect::<Result<Vec<_>, _>>()?;

    let mut root = Node::frame(
        Style::column()
            .width(WIDTH)
            .align(Align::Stretch)
            .background(background)
            .radius(10.0)
            .border(1.0, BORDER_COLOR)
            .clip(),
    )
    .child(
        Node::frame(
            Style::row()
                .height(HEADER_HEIGHT)
                .padding(Edges::xy(CELL_PAD_X, 0.0))
                .align(Align::Center)
                .background(PANEL_BG),
        )
        .child(Node::text(
            title,
            TextStyle::new(16.0, HEADER_TEXT)
                .weight(600)
                .letter_spacing(0.3),
        )),
    )
    .child(Node::frame(
        Style::row()
            .height(HEADER_ACCENT_HEIGHT)
            .background(accent),
    ));

    if rows.is_empty() {
        root = root.child(
            Node::frame(
                Style::row()
                    .height(ROW_HEIGHT)
                    .padding(Edges::xy(CELL_PAD_X, 0.0))
                    .align(Align::Center),
            )
            .child(Node::text("No entries yet", TextStyle::new(14.0, MUTED))),
        );
    }
    Ok(root.children(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::compute::layout;
    use serde_json::json;

    #[test]
    fn test_rank_labels() {
        assert_eq!(rank_label(1), "🥇");
        assert_eq!(rank_label(4), "#4");
    }

    #[test]
    fn test_rows_are_capped() {
        let entries: Vec<_> = (0..25)
            .map(|i| json!({"name": format!("user{i}"), "score": i}))
            .collect();
        let value = json!({"entries": entries});
        let props = Props::new(&value).unwrap();
        let Node::Frame { children, .. } = template(&props, &RenderConfig::default()).unwrap()
        else {
            panic!("expected frame");
        };
        // header + accent + rows
        assert_eq!(children.len(), 2 + MAX_ROWS);
    }

    #[test]
    fn test_height_follows_rows() {
        let value = json!({"entries": [{"name": "a", "score": 1}, {"name": "b", "score": 2}]});
        let props = Props::new(&value).unwrap();
        let node = template(&props, &RenderConfig::default()).unwrap();
        let (w, h) = crate::layout::compute::intrinsic_size(&node);
        assert_eq!(w, WIDTH);
        assert_eq!(h, HEADER_HEIGHT + HEADER_ACCENT_HEIGHT + 2.0 * ROW_HEIGHT);
        // Layout at that size keeps every row inside the canvas.
        let _ = layout(&node, w, h);
    }
}
