//! Wallet/bank balance card.

use super::format::format_amount;
use super::palette::*;
use super::{PropError, Props};
use crate::engine::RenderConfig;
use crate::layout::{Align, Edges, Node, Style, TextStyle};
use crate::registry::ComponentSpec;

pub const WIDTH: f32 = 480.0;
pub const HEIGHT: f32 = 220.0;

pub const SPEC: ComponentSpec = ComponentSpec {
    name: "Balance",
    template,
    numeric_fields: &["balance", "bank"],
};

fn stat(label: &str, value: String, color: &str) -> Node {
    Node::frame(
        Style::column()
            .grow(1.0)
            .padding(Edges::all(12.0))
            .gap(6.0)
            .background(PANEL_BG)
            .radius(10.0),
    )
    .child(Node::text(label, TextStyle::new(12.0, MUTED).letter_spacing(0.3)))
    .child(Node::text(value, TextStyle::new(20.0, color).weight(700)))
}

fn template(props: &Props<'_>, config: &RenderConfig) -> Result<Node, PropError> {
    let username = props.str("username")?;
    let balance = props.number("balance")?;
    let bank = props.opt_number("bank")?.unwrap_or(0.0);
    let currency = props.opt_str("currency")?.unwrap_or("coins");
    let accent = config.accent.as_deref().unwrap_or(ACCENT);
    let background = if props.has_banner() {
        BG_TRANSLUCENT
    } else {
        config.background.as_deref().unwrap_or(BG_COLOR)
    };

    let mut header = Node::frame(Style::row().align(Align::Center).gap(12.0));
    if let Some(avatar) = props.opt_str("avatar_url")? {
        header = header.child(Node::image(avatar, 48.0, 48.0).rounded(24.0));
    }
    header = header.child(
        Node::frame(Style::column().gap(2.0))
            .child(Node::text(
                username,
                TextStyle::new(20.0, HEADER_TEXT).weight(700),
            ))
            .child(Node::text(
                format!("Balance in {currency}"),
                TextStyle::new(13.0, MUTED),
            )),
    );

    let stats = Node::frame(Style::row().gap(12.0).align(Align::Stretch)).children([
        stat("WALLET", format_amount(balance), HEADER_TEXT),
        stat("BANK", format_amount(bank), HEADER_TEXT),
        stat("NET WORTH", format_amount(balance + bank), accent),
    ]);

    Ok(Node::frame(
        Style::column()
            .size(WIDTH, HEIGHT)
            .padding(Edges::all(24.0))
            .gap(20.0)
            .align(Align::Stretch)
            .background(background)
            .radius(16.0)
            .border(1.0, BORDER_COLOR),
    )
    .child(
        Node::frame(
            Style::column()
                .size(WIDTH - 48.0, 3.0)
                .absolute(24.0, 0.0)
                .background(accent),
        ),
    )
    .child(header)
    .child(stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_balance_requires_balance() {
        let value = json!({"username": "ada"});
        let props = Props::new(&value).unwrap();
        let err = template(&props, &RenderConfig::default()).unwrap_err();
        assert_eq!(err, PropError::Missing("balance".into()));
    }

    #[test]
    fn test_balance_renders_formatted_amounts() {
        let value = json!({"username": "ada", "balance": 42.5, "bank": 10});
        let props = Props::new(&value).unwrap();
        let node = template(&props, &RenderConfig::default()).unwrap();
        let debug = format!("{node:?}");
        assert!(debug.contains("42.50"));
        assert!(debug.contains("52.50"));
    }
}
