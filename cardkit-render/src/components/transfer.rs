//! Money transfer receipt.

use super::format::format_amount;
use super::palette::*;
use super::{PropError, Props};
use crate::engine::RenderConfig;
use crate::layout::{Align, Edges, Justify, Node, Style, TextStyle};
use crate::registry::ComponentSpec;

pub const WIDTH: f32 = 520.0;
pub const HEIGHT: f32 = 240.0;

pub const SPEC: ComponentSpec = ComponentSpec {
    name: "Transfer",
    template,
    numeric_fields: &["amount", "fee"],
};

fn party(label: &str, name: &str, avatar: Option<&str>) -> Node {
    let mut node = Node::frame(Style::column().align(Align::Center).gap(6.0));
    if let Some(url) = avatar {
        node = node.child(Node::image(url, 44.0, 44.0).rounded(22.0));
    }
    node.child(Node::text(label, TextStyle::new(11.0, MUTED).letter_spacing(0.3)))
        .child(Node::text(name, TextStyle::new(16.0, HEADER_TEXT).weight(600)))
}

fn template(props: &Props<'_>, config: &RenderConfig) -> Result<Node, PropError> {
    let from = props.str("from")?;
    let to = props.str("to")?;
    let amount = props.number("amount")?;
    let fee = props.opt_number("fee")?;
    let currency = props.opt_str("currency")?.unwrap_or("coins");
    let note = props.opt_str("note")?;
    let accent = config.accent.as_deref().unwrap_or(ACCENT);
    let background = if props.has_banner() {
        BG_TRANSLUCENT
    } else {
        config.background.as_deref().unwrap_or(BG_COLOR)
    };

    let parties = Node::frame(
        Style::row()
            .align(Align::Center)
            .justify(Justify::SpaceBetween)
            .padding(Edges::xy(16.0, 12.0))
            .background(PANEL_BG)
            .radius(12.0),
    )
    .children([
        party("FROM", from, props.opt_str("from_avatar")?),
        Node::text("→", TextStyle::new(28.0, accent).weight(700)),
        party("TO", to, props.opt_str("to_avatar")?),
    ]);

    let mut summary = Node::frame(Style::row().align(Align::End).gap(10.0)).child(Node::text(
        format!("{} {currency}", format_amount(amount)),
        TextStyle::new(28.0, POSITIVE).weight(700),
    ));
    if let Some(fee) = fee {
        summary = summary.child(Node::text(
            format!("fee {}", format_amount(fee)),
            TextStyle::new(13.0, MUTED),
        ));
    }

    let mut root = Node::frame(
        Style::column()
            .size(WIDTH, HEIGHT)
            .padding(Edges::all(24.0))
            .gap(14.0)
            .align(Align::Stretch)
            .background(background)
            .radius(16.0)
            .border(1.0, BORDER_COLOR),
    )
    .child(Node::text(
        "Transfer complete",
        TextStyle::new(18.0, HEADER_TEXT).weight(700),
    ))
    .child(parties)
    .child(summary);

    if let Some(note) = note {
        root = root.child(Node::text(format!("“{note}”"), TextStyle::new(13.0, TEXT_COLOR)));
    }
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transfer_formats_amount() {
        let value = json!({"from": "ada", "to": "grace", "amount": 12.5});
        let props = Props::new(&value).unwrap();
        let node = template(&props, &RenderConfig::default()).unwrap();
        assert!(format!("{node:?}").contains("12.50 coins"));
    }

    #[test]
    fn test_transfer_rejects_string_amount() {
        let value = json!({"from": "ada", "to": "grace", "amount": "12.50"});
        let props = Props::new(&value).unwrap();
        assert!(matches!(
            template(&props, &RenderConfig::default()),
            Err(PropError::Type { .. })
        ));
    }
}
