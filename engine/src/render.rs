//! Rendering button tokens into interactive controls.
//!
//! The renderer never fails on token content. A token naming a group that
//! does not exist is kept as its literal text, and a token naming a state
//! its group no longer has is drawn with the group's first state (unless
//! strict mode asks for the literal text instead). Nothing here touches the
//! document; activation is handled by [`crate::engine::ButtonEngine`].
//!
//! Hosts expose their display surface through [`RenderTarget`]. The crate
//! ships [`RenderedDocument`], a flat list of text and control nodes, which
//! is what the CLI prints.

use std::fmt;

use tracing::{debug, warn};

use crate::model::{TaskState, TaskStateGroup};
use crate::settings::Settings;
use crate::token::{scan, ButtonRef, ButtonToken};

/// Weighted sum threshold: `0.5 * 255 * 1000`.
const LUMINANCE_THRESHOLD: u32 = 127_500;

/// An RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// Parses `#rrggbb`, `rrggbb`, or the `#rgb` shorthand.
    #[must_use]
    pub fn parse_hex(color: &str) -> Option<Self> {
        let hex = color.trim();
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if !hex.is_ascii() {
            return None;
        }

        match hex.len() {
            6 => Some(Self {
                r: u8::from_str_radix(&hex[0..2], 16).ok()?,
                g: u8::from_str_radix(&hex[2..4], 16).ok()?,
                b: u8::from_str_radix(&hex[4..6], 16).ok()?,
            }),
            3 => {
                let channel = |i: usize| u8::from_str_radix(&hex[i..=i], 16).ok().map(|v| v * 17);
                Some(Self {
                    r: channel(0)?,
                    g: channel(1)?,
                    b: channel(2)?,
                })
            }
            _ => None,
        }
    }

    /// Relative luminance `(0.299·R + 0.587·G + 0.114·B) / 255`.
    #[must_use]
    pub fn luminance(self) -> f64 {
        f64::from(self.weighted_sum()) / 255_000.0
    }

    /// `299·R + 587·G + 114·B`, the luminance scaled by `255 * 1000`.
    fn weighted_sum(self) -> u32 {
        299 * u32::from(self.r) + 587 * u32::from(self.g) + 114 * u32::from(self.b)
    }
}

/// Text colour drawn over a state's background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Foreground {
    Black,
    White,
}

impl Foreground {
    /// CSS colour keyword.
    #[must_use]
    pub fn as_css(self) -> &'static str {
        match self {
            Self::Black => "black",
            Self::White => "white",
        }
    }
}

/// Picks black text for backgrounds with luminance strictly above 0.5 and
/// white otherwise. Unparseable colours get white text.
///
/// The comparison runs on the integer weighted sum so a background sitting
/// exactly on the threshold always selects white.
#[must_use]
pub fn contrast_color(background: &str) -> Foreground {
    match Rgb::parse_hex(background) {
        Some(rgb) if rgb.weighted_sum() > LUMINANCE_THRESHOLD => Foreground::Black,
        _ => Foreground::White,
    }
}

/// Back-reference from a control to the token it was rendered from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonContext {
    /// Path of the document holding the token.
    pub document: String,

    pub button_id: String,

    /// Resolved group (the default group when the token names none).
    pub group_id: String,

    /// State id as currently written in the document. This can differ from
    /// the displayed state after a fallback or a failed rewrite.
    pub source_state_id: String,
}

/// An interactive multi-state button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonControl {
    context: ButtonContext,
    group: TaskStateGroup,
    state: TaskState,
    foreground: Foreground,
}

impl ButtonControl {
    fn new(context: ButtonContext, group: TaskStateGroup, state: TaskState) -> Self {
        let foreground = contrast_color(&state.color);
        Self {
            context,
            group,
            state,
            foreground,
        }
    }

    /// Back-reference to the originating token.
    #[must_use]
    pub fn context(&self) -> &ButtonContext {
        &self.context
    }

    #[must_use]
    pub fn button_id(&self) -> &str {
        &self.context.button_id
    }

    #[must_use]
    pub fn group_id(&self) -> &str {
        &self.context.group_id
    }

    /// The displayed state id.
    #[must_use]
    pub fn state_id(&self) -> &str {
        &self.state.id
    }

    /// Group captured when the control was rendered.
    #[must_use]
    pub fn group(&self) -> &TaskStateGroup {
        &self.group
    }

    /// The displayed state.
    #[must_use]
    pub fn state(&self) -> &TaskState {
        &self.state
    }

    /// Label text.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.state.name
    }

    /// Background colour.
    #[must_use]
    pub fn background(&self) -> &str {
        &self.state.color
    }

    #[must_use]
    pub fn foreground(&self) -> Foreground {
        self.foreground
    }

    /// The `(button, group, state)` triple the control is bound to.
    #[must_use]
    pub fn bound_ref(&self) -> ButtonRef {
        ButtonRef::new(
            self.context.button_id.clone(),
            self.context.group_id.clone(),
            self.state.id.clone(),
        )
    }

    /// Redraws the control in `state`.
    pub fn apply_state(&mut self, state: &TaskState) {
        self.foreground = contrast_color(&state.color);
        self.state = state.clone();
    }

    /// Records that the document now holds `state_id` for this button.
    pub fn mark_persisted(&mut self, state_id: &str) {
        self.context.source_state_id = state_id.to_string();
    }
}

/// One piece of rendered content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(String),
    Control(ButtonControl),
}

/// A mutable display surface that tokens are rendered into.
pub trait RenderTarget {
    /// Number of nodes in the target.
    fn node_count(&self) -> usize;

    /// Text of the node at `index`, or `None` if it is not a text node.
    fn text_at(&self, index: usize) -> Option<&str>;

    /// Replaces the node at `index` with `nodes`.
    fn replace_node(&mut self, index: usize, nodes: Vec<Node>);
}

/// Flat list of text and control nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedDocument {
    /// Path of the document this was rendered from.
    pub path: String,
    nodes: Vec<Node>,
}

impl RenderedDocument {
    /// Creates an unrendered target holding `text` as a single node.
    pub fn from_text(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            nodes: vec![Node::Text(text.into())],
        }
    }

    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Iterates over the controls in document order.
    pub fn controls(&self) -> impl Iterator<Item = &ButtonControl> {
        self.nodes.iter().filter_map(|node| match node {
            Node::Control(control) => Some(control),
            Node::Text(_) => None,
        })
    }

    /// Mutable access to the first control bound to `button_id`.
    pub fn control_mut(&mut self, button_id: &str) -> Option<&mut ButtonControl> {
        self.nodes.iter_mut().find_map(|node| match node {
            Node::Control(control) if control.button_id() == button_id => Some(control),
            _ => None,
        })
    }

    /// Mutable access to the `n`th control.
    pub fn nth_control_mut(&mut self, n: usize) -> Option<&mut ButtonControl> {
        self.nodes
            .iter_mut()
            .filter_map(|node| match node {
                Node::Control(control) => Some(control),
                Node::Text(_) => None,
            })
            .nth(n)
    }
}

impl RenderTarget for RenderedDocument {
    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn text_at(&self, index: usize) -> Option<&str> {
        match self.nodes.get(index)? {
            Node::Text(text) => Some(text),
            Node::Control(_) => None,
        }
    }

    fn replace_node(&mut self, index: usize, nodes: Vec<Node>) {
        self.nodes.splice(index..=index, nodes);
    }
}

impl fmt::Display for RenderedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.nodes {
            match node {
                Node::Text(text) => f.write_str(text)?,
                Node::Control(control) => write!(f, "[{}]", control.label())?,
            }
        }
        Ok(())
    }
}

/// Rendering switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Render tokens with an unknown state as literal text instead of
    /// falling back to the group's first state.
    pub strict_states: bool,
}

/// Turns tokens into controls against one settings snapshot.
#[derive(Debug, Clone, Copy)]
pub struct Renderer<'s> {
    settings: &'s Settings,
    options: RenderOptions,
}

impl<'s> Renderer<'s> {
    #[must_use]
    pub fn new(settings: &'s Settings, options: RenderOptions) -> Self {
        Self { settings, options }
    }

    /// Renders one token. `literal` is the token's original text, used when
    /// the token cannot be drawn as a control.
    #[must_use]
    pub fn render(&self, document: &str, token: &ButtonToken, literal: &str) -> Node {
        let Some(group) = self.settings.resolve_group(token.group_id.as_deref()) else {
            debug!(
                button_id = %token.button_id,
                group = token.group_id.as_deref().unwrap_or(&self.settings.default_state_group),
                "Unknown state group, keeping literal token"
            );
            return Node::Text(literal.to_string());
        };

        let state = match group.state(&token.state_id) {
            Some(state) => state,
            None if self.options.strict_states => {
                warn!(
                    button_id = %token.button_id,
                    state = %token.state_id,
                    group = %group.id(),
                    "Unknown state in strict mode, keeping literal token"
                );
                return Node::Text(literal.to_string());
            }
            None => {
                debug!(
                    button_id = %token.button_id,
                    state = %token.state_id,
                    group = %group.id(),
                    "Unknown state, falling back to first state"
                );
                group.first_state()
            }
        };

        let context = ButtonContext {
            document: document.to_string(),
            button_id: token.button_id.clone(),
            group_id: group.id().to_string(),
            source_state_id: token.state_id.clone(),
        };
        Node::Control(ButtonControl::new(context, group.clone(), state.clone()))
    }

    /// Splits `text` into text and control nodes.
    #[must_use]
    pub fn render_text(&self, document: &str, text: &str) -> Vec<Node> {
        let mut nodes = Vec::new();
        let mut last = 0;

        for found in scan(text) {
            if found.start() > last {
                nodes.push(Node::Text(text[last..found.start()].to_string()));
            }
            nodes.push(self.render(document, &found.token, found.as_str()));
            last = found.end();
        }
        if last < text.len() {
            nodes.push(Node::Text(text[last..].to_string()));
        }

        merge_adjacent_text(nodes)
    }

    /// Renders every token in `target`'s text nodes. Returns the number of
    /// controls created.
    pub fn render_into<T: RenderTarget + ?Sized>(&self, target: &mut T, document: &str) -> usize {
        let mut created = 0;

        // Back to front so replacements never shift unvisited indices.
        for index in (0..target.node_count()).rev() {
            let Some(text) = target.text_at(index) else {
                continue;
            };
            let nodes = self.render_text(document, text);
            let controls = nodes
                .iter()
                .filter(|node| matches!(node, Node::Control(_)))
                .count();
            if controls > 0 {
                created += controls;
                target.replace_node(index, nodes);
            }
        }

        debug!(document, controls = created, "Rendered button tokens");
        created
    }
}

fn merge_adjacent_text(nodes: Vec<Node>) -> Vec<Node> {
    let mut merged: Vec<Node> = Vec::with_capacity(nodes.len());
    for node in nodes {
        match (merged.last_mut(), node) {
            (Some(Node::Text(prev)), Node::Text(next)) => prev.push_str(&next),
            (_, node) => merged.push(node),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::parse_token;

    fn settings_with_two_states() -> Settings {
        let mut settings = Settings::default();
        let group = TaskStateGroup::new(
            "default",
            "Default",
            vec![
                TaskState::new("todo", "To Do", "#e74c3c", 0),
                TaskState::new("done", "Done", "#27ae60", 1),
            ],
        )
        .unwrap();
        settings.state_groups.insert("default".to_string(), group);
        settings
    }

    fn render_one(settings: &Settings, options: RenderOptions, literal: &str) -> Node {
        let (token, _) = parse_token(literal).unwrap();
        Renderer::new(settings, options).render("note.md", &token, literal)
    }

    #[test]
    fn contrast_black_background_gets_white_text() {
        assert_eq!(contrast_color("#000000"), Foreground::White);
    }

    #[test]
    fn contrast_white_background_gets_black_text() {
        assert_eq!(contrast_color("#FFFFFF"), Foreground::Black);
        assert_eq!(contrast_color("#fff"), Foreground::Black);
    }

    #[test]
    fn contrast_exact_half_luminance_gets_white_text() {
        // 299*22 + 587*206 + 114*0 == 127_500
        let rgb = Rgb::parse_hex("#16ce00").unwrap();
        assert_eq!(rgb.luminance(), 0.5);
        assert_eq!(contrast_color("#16ce00"), Foreground::White);

        // One step brighter on red crosses the threshold.
        assert_eq!(contrast_color("#17ce00"), Foreground::Black);
    }

    #[test]
    fn contrast_invalid_color_gets_white_text() {
        assert_eq!(contrast_color("not-a-color"), Foreground::White);
        assert_eq!(contrast_color("#12345"), Foreground::White);
        assert_eq!(contrast_color("#gg0000"), Foreground::White);
    }

    #[test]
    fn rgb_parse_accepts_common_forms() {
        let expected = Rgb { r: 0x27, g: 0xae, b: 0x60 };
        assert_eq!(Rgb::parse_hex("#27ae60"), Some(expected));
        assert_eq!(Rgb::parse_hex("27AE60"), Some(expected));
        assert_eq!(Rgb::parse_hex("#abc"), Some(Rgb { r: 0xaa, g: 0xbb, b: 0xcc }));
    }

    #[test]
    fn render_binds_parsed_triple() {
        let settings = Settings::default();
        let node = render_one(
            &settings,
            RenderOptions::default(),
            "{{multi-state-button:id=b1;group=default;state=in-progress}}",
        );

        let Node::Control(control) = node else {
            panic!("expected a control");
        };
        assert_eq!(control.bound_ref(), ButtonRef::new("b1", "default", "in-progress"));
        assert_eq!(control.label(), "In Progress");
        assert_eq!(control.background(), "#f39c12");
        assert_eq!(control.foreground(), Foreground::Black);
        assert_eq!(control.context().document, "note.md");
    }

    #[test]
    fn render_legacy_token_uses_default_group() {
        let settings = Settings::default();
        let Node::Control(control) =
            render_one(&settings, RenderOptions::default(), "{{multi-state-button:b1:done}}")
        else {
            panic!("expected a control");
        };
        assert_eq!(control.group_id(), "default");
        assert_eq!(control.state_id(), "done");
    }

    #[test]
    fn render_unknown_state_falls_back_to_first_state() {
        let settings = settings_with_two_states();
        let Node::Control(control) = render_one(
            &settings,
            RenderOptions::default(),
            "{{multi-state-button:btn2:ghost-state}}",
        ) else {
            panic!("expected a control");
        };

        assert_eq!(control.state_id(), "todo");
        assert_eq!(control.label(), "To Do");
        assert_eq!(control.context().source_state_id, "ghost-state");
    }

    #[test]
    fn render_unknown_state_in_strict_mode_keeps_literal() {
        let settings = settings_with_two_states();
        let literal = "{{multi-state-button:btn2:ghost-state}}";
        let node = render_one(&settings, RenderOptions { strict_states: true }, literal);
        assert_eq!(node, Node::Text(literal.to_string()));
    }

    #[test]
    fn render_unknown_group_keeps_literal() {
        let settings = Settings::default();
        let literal = "{{multi-state-button:state=todo;id=b9;group=nowhere}}";
        let node = render_one(&settings, RenderOptions::default(), literal);
        assert_eq!(node, Node::Text(literal.to_string()));
    }

    #[test]
    fn render_text_keeps_surrounding_text() {
        let settings = Settings::default();
        let renderer = Renderer::new(&settings, RenderOptions::default());
        let nodes = renderer.render_text(
            "n.md",
            "a {{multi-state-button:x:todo}} b {{multi-state-button:broken}} c",
        );

        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0], Node::Text("a ".to_string()));
        assert!(matches!(nodes[1], Node::Control(_)));
        assert_eq!(
            nodes[2],
            Node::Text(" b {{multi-state-button:broken}} c".to_string())
        );
    }

    #[test]
    fn render_text_merges_literal_fallbacks_into_text() {
        let settings = Settings::default();
        let renderer = Renderer::new(&settings, RenderOptions::default());
        let nodes = renderer.render_text("n.md", "a {{multi-state-button:id=x;group=zz;state=s}} b");
        assert_eq!(
            nodes,
            vec![Node::Text(
                "a {{multi-state-button:id=x;group=zz;state=s}} b".to_string()
            )]
        );
    }

    #[test]
    fn render_into_replaces_only_text_nodes_with_tokens() {
        let settings = Settings::default();
        let renderer = Renderer::new(&settings, RenderOptions::default());
        let mut doc = RenderedDocument::from_text(
            "n.md",
            "one {{multi-state-button:a:todo}} two {{multi-state-button:b:done}}",
        );

        let created = renderer.render_into(&mut doc, "n.md");

        assert_eq!(created, 2);
        assert_eq!(doc.to_string(), "one [To Do] two [Done]");
        let ids: Vec<_> = doc.controls().map(|c| c.button_id().to_string()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        // A second pass finds nothing new.
        assert_eq!(renderer.render_into(&mut doc, "n.md"), 0);
    }

    #[test]
    fn apply_state_updates_visuals_only() {
        let settings = Settings::default();
        let Node::Control(mut control) =
            render_one(&settings, RenderOptions::default(), "{{multi-state-button:b:todo}}")
        else {
            panic!("expected a control");
        };

        let done = settings.group("default").unwrap().state("done").unwrap().clone();
        control.apply_state(&done);

        assert_eq!(control.label(), "Done");
        assert_eq!(control.context().source_state_id, "todo");
        control.mark_persisted("done");
        assert_eq!(control.context().source_state_id, "done");
    }
}
