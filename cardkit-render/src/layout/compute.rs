//! Box layout pass.

use super::text::{self, TextRun};
use super::{Align, Direction, Justify, Node, Position, Style, TextStyle};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A node with its final box.
#[derive(Debug, Clone, PartialEq)]
pub enum Placed<'a> {
    Frame {
        rect: Rect,
        style: &'a Style,
        children: Vec<Placed<'a>>,
    },
    Text {
        rect: Rect,
        style: &'a TextStyle,
        runs: Vec<TextRun>,
    },
    Image {
        rect: Rect,
        src: &'a str,
        radius: f32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Size {
    width: f32,
    height: f32,
}

impl Size {
    fn main(&self, dir: Direction) -> f32 {
        match dir {
            Direction::Row => self.width,
            Direction::Column => self.height,
        }
    }

    fn cross(&self, dir: Direction) -> f32 {
        match dir {
            Direction::Row => self.height,
            Direction::Column => self.width,
        }
    }
}

/// Lay out `root` into a `width` × `height` canvas.
pub fn layout(root: &Node, width: f32, height: f32) -> Placed<'_> {
    place(
        root,
        Rect {
            x: 0.0,
            y: 0.0,
            width,
            height,
        },
    )
}

/// Width and height the tree asks for when nothing constrains it.
pub fn intrinsic_size(node: &Node) -> (f32, f32) {
    let size = measure(node);
    (size.width, size.height)
}

fn is_flow(node: &Node) -> bool {
    !matches!(
        node,
        Node::Frame {
            style: Style {
                position: Position::Absolute { .. },
                ..
            },
            ..
        }
    )
}

fn grow_of(node: &Node) -> f32 {
    match node {
        Node::Frame { style, .. } => style.grow.max(0.0),
        _ => 0.0,
    }
}

fn fixed_cross(node: &Node, dir: Direction) -> bool {
    match node {
        Node::Frame { style, .. } => match dir {
            Direction::Row => style.height.is_some(),
            Direction::Column => style.width.is_some(),
        },
        _ => true,
    }
}

/// Intrinsic size of a node.
fn measure(node: &Node) -> Size {
    match node {
        Node::Text { content, style } => {
            let runs = text::segment(content);
            Size {
                width: text::runs_width(&runs, style),
                height: text::line_height(style),
            }
        }
        Node::Image { width, height, .. } => Size {
            width: *width,
            height: *height,
        },
        Node::Frame { style, children } => {
            let dir = style.direction;
            let flow: Vec<Size> = children
                .iter()
                .filter(|c| is_flow(c))
                .map(measure)
                .collect();
            let gaps = style.gap * flow.len().saturating_sub(1) as f32;
            let main: f32 = flow.iter().map(|s| s.main(dir)).sum::<f32>() + gaps;
            let cross = flow.iter().map(|s| s.cross(dir)).fold(0.0, f32::max);

            let (content_w, content_h) = match dir {
                Direction::Row => (main, cross),
                Direction::Column => (cross, main),
            };
            Size {
                width: style
                    .width
                    .unwrap_or(content_w + style.padding.horizontal()),
                height: style
                    .height
                    .unwrap_or(content_h + style.padding.vertical()),
            }
        }
    }
}

fn place(node: &Node, rect: Rect) -> Placed<'_> {
    match node {
        Node::Text { content, style } => Placed::Text {
            rect,
            style,
            runs: text::segment(content),
        },
        Node::Image { src, radius, .. } => Placed::Image {
            rect,
            src,
            radius: *radius,
        },
        Node::Frame { style, children } => Placed::Frame {
            rect,
            style,
            children: place_children(style, children, rect),
        },
    }
}

fn place_children<'a>(style: &'a Style, children: &'a [Node], rect: Rect) -> Vec<Placed<'a>> {
    let dir = style.direction;
    let inner = Rect {
        x: rect.x + style.padding.left,
        y: rect.y + style.padding.top,
        width: (rect.width - style.padding.horizontal()).max(0.0),
        height: (rect.height - style.padding.vertical()).max(0.0),
    };
    let (inner_main, inner_cross) = match dir {
        Direction::Row => (inner.width, inner.height),
        Direction::Column => (inner.height, inner.width),
    };

    let flow: Vec<&Node> = children.iter().filter(|c| is_flow(c)).collect();
    let sizes: Vec<Size> = flow.iter().map(|c| measure(c)).collect();
    let gaps = style.gap * flow.len().saturating_sub(1) as f32;
    let used: f32 = sizes.iter().map(|s| s.main(dir)).sum::<f32>() + gaps;
    let free = (inner_main - used).max(0.0);
    let total_grow: f32 = flow.iter().map(|c| grow_of(c)).sum();

    let (mut cursor, spacing) = if total_grow > 0.0 {
        (0.0, style.gap)
    } else {
        match style.justify {
            Justify::Start => (0.0, style.gap),
            Justify::Center => (free / 2.0, style.gap),
            Justify::End => (free, style.gap),
            Justify::SpaceBetween if flow.len() > 1 => {
                (0.0, style.gap + free / (flow.len() - 1) as f32)
            }
            Justify::SpaceBetween => (0.0, style.gap),
        }
    };

    let mut placed = Vec::with_capacity(children.len());
    for (child, size) in flow.iter().zip(&sizes) {
        let mut main = size.main(dir);
        if total_grow > 0.0 {
            main += free * grow_of(child) / total_grow;
        }

        let stretch = style.align == Align::Stretch && !fixed_cross(child, dir);
        let cross = if stretch {
            inner_cross
        } else {
            size.cross(dir)
        };
        let cross_offset = match style.align {
            Align::Start | Align::Stretch => 0.0,
            Align::Center => (inner_cross - cross) / 2.0,
            Align::End => inner_cross - cross,
        };

        let child_rect = match dir {
            Direction::Row => Rect {
                x: inner.x + cursor,
                y: inner.y + cross_offset,
                width: main,
                height: cross,
            },
            Direction::Column => Rect {
                x: inner.x + cross_offset,
                y: inner.y + cursor,
                width: cross,
                height: main,
            },
        };
        placed.push(place(child, child_rect));
        cursor += main + spacing;
    }

    for child in children.iter().filter(|c| !is_flow(c)) {
        if let Node::Frame {
            style: child_style, ..
        } = child
            && let Position::Absolute { x, y } = child_style.position
        {
            let size = measure(child);
            placed.push(place(
                child,
                Rect {
                    x: rect.x + x,
                    y: rect.y + y,
                    width: size.width,
                    height: size.height,
                },
            ));
        }
    }

    placed
}
