//! Button token parser.
//!
//! Buttons are persisted in documents as inline tokens. Two syntaxes are
//! accepted, and callers always receive the same normalized fields whichever
//! one matched.
//!
//! | Syntax | Form | Group |
//! |--------|------|-------|
//! | Legacy | `{{multi-state-button:<id>:<state>}}` | absent |
//! | Extended | `{{multi-state-button:id=<id>;group=<group>;state=<state>}}` | optional |
//!
//! Extended parameters may appear in any order and unknown keys are ignored.
//! A candidate that yields no `id` or no `state` under either syntax is
//! skipped: the scanner logs it at debug level and moves on, leaving the
//! literal text for the caller to keep as-is.
//!
//! # Example
//!
//! ```
//! use taskmaster_engine::token::scan;
//!
//! let text = "Ship it {{multi-state-button:btn1:todo}} today";
//! let found: Vec<_> = scan(text).collect();
//!
//! assert_eq!(found.len(), 1);
//! assert_eq!(found[0].token.button_id, "btn1");
//! assert_eq!(found[0].as_str(), "{{multi-state-button:btn1:todo}}");
//! ```

use std::ops::Range;
use std::sync::OnceLock;

use regex::{CaptureMatches, Regex};
use tracing::debug;

/// Tag name that opens every button token.
pub const TOKEN_TAG: &str = "multi-state-button";

/// Matches one candidate token. Braces are excluded from the parameter
/// string so a stray `{{` never swallows the token that follows it.
fn token_regex() -> &'static Regex {
    static TOKEN_RE: OnceLock<Regex> = OnceLock::new();
    TOKEN_RE.get_or_init(|| {
        Regex::new(r"\{\{multi-state-button:([^{}]+)\}\}").expect("token pattern is valid")
    })
}

/// Which concrete syntax a token was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenSyntax {
    /// `{{multi-state-button:<id>:<state>}}`
    Legacy,
    /// `{{multi-state-button:id=<id>;group=<group>;state=<state>}}`
    Extended,
}

/// Fields decoded from a single token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ButtonToken {
    /// Stable identifier of the button instance.
    pub button_id: String,

    /// State group, when the token names one.
    pub group_id: Option<String>,

    /// Current state written in the document.
    pub state_id: String,
}

impl ButtonToken {
    /// Resolves the optional group against `default_group`.
    #[must_use]
    pub fn normalize(&self, default_group: &str) -> ButtonRef {
        ButtonRef {
            button_id: self.button_id.clone(),
            group_id: self
                .group_id
                .clone()
                .unwrap_or_else(|| default_group.to_string()),
            state_id: self.state_id.clone(),
        }
    }
}

/// The normalized `(button, group, state)` triple of a token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ButtonRef {
    pub button_id: String,
    pub group_id: String,
    pub state_id: String,
}

impl ButtonRef {
    /// Creates a triple from its parts.
    pub fn new(
        button_id: impl Into<String>,
        group_id: impl Into<String>,
        state_id: impl Into<String>,
    ) -> Self {
        Self {
            button_id: button_id.into(),
            group_id: group_id.into(),
            state_id: state_id.into(),
        }
    }
}

/// A token found in a piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMatch<'t> {
    /// Decoded token fields.
    pub token: ButtonToken,

    /// Syntax the token was written in.
    pub syntax: TokenSyntax,

    haystack: &'t str,
    span: Range<usize>,
}

impl<'t> TokenMatch<'t> {
    /// Byte offset of the opening `{{`.
    #[must_use]
    pub fn start(&self) -> usize {
        self.span.start
    }

    /// Byte offset just past the closing `}}`.
    #[must_use]
    pub fn end(&self) -> usize {
        self.span.end
    }

    /// Length of the token text in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.span.len()
    }

    /// Always `false`; a token is never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.span.is_empty()
    }

    /// Byte range of the token within the scanned text.
    #[must_use]
    pub fn span(&self) -> Range<usize> {
        self.span.clone()
    }

    /// The literal token text.
    #[must_use]
    pub fn as_str(&self) -> &'t str {
        &self.haystack[self.span.clone()]
    }
}

/// Lazy, left-to-right iterator over the tokens in a string.
///
/// Matches never overlap. Candidates that fail validation are skipped.
pub struct TokenScanner<'t> {
    haystack: &'t str,
    captures: CaptureMatches<'static, 't>,
}

impl<'t> Iterator for TokenScanner<'t> {
    type Item = TokenMatch<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let caps = self.captures.next()?;
            let (Some(whole), Some(params)) = (caps.get(0), caps.get(1)) else {
                continue;
            };

            match parse_params(params.as_str()) {
                Some((token, syntax)) => {
                    return Some(TokenMatch {
                        token,
                        syntax,
                        haystack: self.haystack,
                        span: whole.range(),
                    });
                }
                None => {
                    debug!(
                        candidate = whole.as_str(),
                        offset = whole.start(),
                        "Skipping malformed button token"
                    );
                }
            }
        }
    }
}

/// Scans `text` for button tokens.
#[must_use]
pub fn scan(text: &str) -> TokenScanner<'_> {
    TokenScanner {
        haystack: text,
        captures: token_regex().captures_iter(text),
    }
}

/// Parses exactly one token, with nothing before or after it.
#[must_use]
pub fn parse_token(text: &str) -> Option<(ButtonToken, TokenSyntax)> {
    let found = scan(text).next()?;
    (found.start() == 0 && found.end() == text.len()).then_some((found.token, found.syntax))
}

/// Decodes the parameter string between `multi-state-button:` and `}}`.
///
/// The extended form is tried first; if it does not produce both an `id`
/// and a `state`, the legacy `<id>:<state>` form is tried.
#[must_use]
pub fn parse_params(params: &str) -> Option<(ButtonToken, TokenSyntax)> {
    if let Some(token) = parse_extended(params) {
        return Some((token, TokenSyntax::Extended));
    }
    parse_legacy(params).map(|token| (token, TokenSyntax::Legacy))
}

fn parse_extended(params: &str) -> Option<ButtonToken> {
    if !params.contains('=') {
        return None;
    }

    let mut button_id = None;
    let mut group_id = None;
    let mut state_id = None;

    for part in params.split(';') {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            continue;
        }
        match key {
            "id" => button_id = Some(value.to_string()),
            "group" => group_id = Some(value.to_string()),
            "state" => state_id = Some(value.to_string()),
            _ => {}
        }
    }

    Some(ButtonToken {
        button_id: button_id?,
        group_id,
        state_id: state_id?,
    })
}

fn parse_legacy(params: &str) -> Option<ButtonToken> {
    let (button_id, state_id) = params.split_once(':')?;
    if button_id.is_empty() || state_id.is_empty() || state_id.contains(':') {
        return None;
    }
    Some(ButtonToken {
        button_id: button_id.to_string(),
        group_id: None,
        state_id: state_id.to_string(),
    })
}

/// Formats a legacy token.
#[must_use]
pub fn legacy_token(button_id: &str, state_id: &str) -> String {
    format!("{{{{{TOKEN_TAG}:{button_id}:{state_id}}}}}")
}

/// Formats an extended token in canonical `id;group;state` order. The group
/// parameter is left out when `group_id` is `None`.
#[must_use]
pub fn extended_token(button_id: &str, group_id: Option<&str>, state_id: &str) -> String {
    match group_id {
        Some(group_id) => {
            format!("{{{{{TOKEN_TAG}:id={button_id};group={group_id};state={state_id}}}}}")
        }
        None => format!("{{{{{TOKEN_TAG}:id={button_id};state={state_id}}}}}"),
    }
}

/// Returns `true` if `value` can be written into either syntax unchanged.
#[must_use]
pub fn is_valid_field(value: &str) -> bool {
    !value.is_empty()
        && !value
            .chars()
            .any(|c| matches!(c, ':' | ';' | '=' | '{' | '}') || c.is_whitespace())
}
