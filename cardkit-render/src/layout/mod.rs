//! Declarative card layout.
//!
//! Templates build a tree of [`Node`]s: frames stack their children along a
//! row or column (flex-like grow, justify and cross-axis alignment), or pin
//! them with absolute offsets; text and image leaves have intrinsic sizes.
//! [`compute`] turns the tree into positioned boxes and [`svg`] writes the
//! vector document.

pub mod compute;
pub mod svg;
pub mod text;

/// Box edges in layout units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Edges {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Edges {
    pub fn all(v: f32) -> Self {
        Self {
            top: v,
            right: v,
            bottom: v,
            left: v,
        }
    }

    pub fn xy(x: f32, y: f32) -> Self {
        Self {
            top: y,
            right: x,
            bottom: y,
            left: x,
        }
    }

    fn horizontal(&self) -> f32 {
        self.left + self.right
    }

    fn vertical(&self) -> f32 {
        self.top + self.bottom
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    Row,
    #[default]
    Column,
}

/// Cross-axis placement of flow children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    #[default]
    Start,
    Center,
    End,
    Stretch,
}

/// Main-axis distribution of leftover space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Justify {
    #[default]
    Start,
    Center,
    End,
    SpaceBetween,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Position {
    #[default]
    Flow,
    /// Offset from the parent frame's top-left corner
    Absolute { x: f32, y: f32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Paint {
    Solid(String),
    /// Left-to-right gradient rotated by `angle` degrees
    LinearGradient {
        from: String,
        to: String,
        angle: f32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Border {
    pub width: f32,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Style {
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub padding: Edges,
    pub gap: f32,
    pub direction: Direction,
    pub align: Align,
    pub justify: Justify,
    pub grow: f32,
    pub position: Position,
    pub background: Option<Paint>,
    pub radius: f32,
    pub border: Option<Border>,
    pub opacity: f32,
    /// Clip children to this frame's rounded box
    pub clip: bool,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            padding: Edges::default(),
            gap: 0.0,
            direction: Direction::Column,
            align: Align::Start,
            justify: Justify::Start,
            grow: 0.0,
            position: Position::Flow,
            background: None,
            radius: 0.0,
            border: None,
            opacity: 1.0,
            clip: false,
        }
    }
}

impl Style {
    pub fn row() -> Self {
        Self {
            direction: Direction::Row,
            ..Self::default()
        }
    }

    pub fn column() -> Self {
        Self::default()
    }

    pub fn size(mut self, width: f32, height: f32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn width(mut self, width: f32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn height(mut self, height: f32) -> Self {
        self.height = Some(height);
        self
    }

    pub fn padding(mut self, padding: Edges) -> Self {
        self.padding = padding;
        self
    }

    pub fn gap(mut self, gap: f32) -> Self {
        self.gap = gap;
        self
    }

    pub fn align(mut self, align: Align) -> Self {
        self.align = align;
        self
    }

    pub fn justify(mut self, justify: Justify) -> Self {
        self.justify = justify;
        self
    }

    pub fn grow(mut self, grow: f32) -> Self {
        self.grow = grow;
        self
    }

    pub fn absolute(mut self, x: f32, y: f32) -> Self {
        self.position = Position::Absolute { x, y };
        self
    }

    pub fn background(mut self, color: impl Into<String>) -> Self {
        self.background = Some(Paint::Solid(color.into()));
        self
    }

    pub fn gradient(mut self, from: impl Into<String>, to: impl Into<String>, angle: f32) -> Self {
        self.background = Some(Paint::LinearGradient {
            from: from.into(),
            to: to.into(),
            angle,
        });
        self
    }

    pub fn radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    pub fn border(mut self, width: f32, color: impl Into<String>) -> Self {
        self.border = Some(Border {
            width,
            color: color.into(),
        });
        self
    }

    pub fn opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    pub fn clip(mut self) -> Self {
        self.clip = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    pub size: f32,
    pub weight: u16,
    pub color: String,
    pub family: Option<String>,
    pub letter_spacing: f32,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            size: 14.0,
            weight: 400,
            color: "#D2D5D9".to_string(),
            family: None,
            letter_spacing: 0.0,
        }
    }
}

impl TextStyle {
    pub fn new(size: f32, color: impl Into<String>) -> Self {
        Self {
            size,
            color: color.into(),
            ..Self::default()
        }
    }

    pub fn weight(mut self, weight: u16) -> Self {
        self.weight = weight;
        self
    }

    pub fn family(mut self, family: impl Into<String>) -> Self {
        self.family = Some(family.into());
        self
    }

    pub fn letter_spacing(mut self, spacing: f32) -> Self {
        self.letter_spacing = spacing;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Frame { style: Style, children: Vec<Node> },
    Text { content: String, style: TextStyle },
    /// Remote or data-URI image resolved through the asset loader
    Image {
        src: String,
        width: f32,
        height: f32,
        radius: f32,
    },
}

impl Node {
    pub fn frame(style: Style) -> Self {
        Node::Frame {
            style,
            children: Vec::new(),
        }
    }

    pub fn text(content: impl Into<String>, style: TextStyle) -> Self {
        Node::Text {
            content: content.into(),
            style,
        }
    }

    pub fn image(src: impl Into<String>, width: f32, height: f32) -> Self {
        Node::Image {
            src: src.into(),
            width,
            height,
            radius: 0.0,
        }
    }

    /// Round the corners of an image leaf; no-op for other nodes.
    pub fn rounded(mut self, r: f32) -> Self {
        if let Node::Image { radius, .. } = &mut self {
            *radius = r;
        }
        self
    }

    /// Append a child to a frame; no-op for leaves.
    pub fn child(mut self, node: Node) -> Self {
        if let Node::Frame { children, .. } = &mut self {
            children.push(node);
        }
        self
    }

    pub fn children(mut self, nodes: impl IntoIterator<Item = Node>) -> Self {
        if let Node::Frame { children, .. } = &mut self {
            children.extend(nodes);
        }
        self
    }
}
