//! Editor commands that work on raw document text.
//!
//! Lines and columns are zero-based. Columns count characters, not bytes.

use std::ops::Range;

use chrono::Utc;
use rand::Rng;
use thiserror::Error;

use crate::model::TaskState;
use crate::settings::Settings;
use crate::token::{extended_token, is_valid_field, legacy_token, scan, TokenMatch, TokenSyntax};

/// How far (in characters) outside a token the cursor may sit and still
/// select it.
pub const CURSOR_TOLERANCE: usize = 5;

/// Length of the random suffix in generated button ids.
const ID_SUFFIX_LEN: usize = 5;

/// Characters used in generated button ids.
const ID_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Errors that can occur while running an editor command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// No token sits at or near the cursor.
    #[error("no button at line {line}, column {column}")]
    NoButtonAtCursor { line: usize, column: usize },

    /// The requested state group does not exist.
    #[error("unknown state group: {0}")]
    UnknownGroup(String),

    /// The token's state is not in its group and strict mode hides it.
    #[error("unknown state '{state_id}' in group '{group_id}'")]
    UnknownState { group_id: String, state_id: String },

    /// The button id contains whitespace or a token delimiter.
    #[error("invalid button id: {0:?}")]
    InvalidButtonId(String),

    /// The cursor lies outside the document.
    #[error("cursor out of range: line {line}, column {column}")]
    CursorOutOfRange { line: usize, column: usize },

    /// No rendered control carries the button id.
    #[error("button not found: {0}")]
    ButtonNotFound(String),
}

/// Generates a fresh button id of the form `btn_<millis base36>_<5 chars>`.
#[must_use]
pub fn generate_button_id() -> String {
    let millis = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
    let mut rng = rand::rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| ID_CHARSET[rng.random_range(0..ID_CHARSET.len())] as char)
        .collect();
    format!("btn_{}_{suffix}", to_base36(millis))
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    let mut digits = Vec::new();
    loop {
        digits.push(DIGITS[(value % 36) as usize] as char);
        value /= 36;
        if value == 0 {
            break;
        }
    }
    digits.iter().rev().collect()
}

/// Byte range of `line` within `text`, excluding the line terminator.
fn line_range(text: &str, line: usize) -> Option<Range<usize>> {
    let mut start = 0;
    for (index, content) in text.split('\n').enumerate() {
        let end = start + content.len();
        if index == line {
            let end = if content.ends_with('\r') { end - 1 } else { end };
            return Some(start..end);
        }
        start = end + 1;
    }
    None
}

/// Converts a cursor position into a byte offset into `text`.
///
/// # Errors
///
/// Returns [`CommandError::CursorOutOfRange`] if the line does not exist or
/// the column is past the end of the line.
pub fn cursor_offset(text: &str, line: usize, column: usize) -> Result<usize, CommandError> {
    let out_of_range = CommandError::CursorOutOfRange { line, column };
    let range = line_range(text, line).ok_or_else(|| out_of_range.clone())?;
    let content = &text[range.clone()];

    if column == content.chars().count() {
        return Ok(range.end);
    }
    content
        .char_indices()
        .nth(column)
        .map(|(offset, _)| range.start + offset)
        .ok_or(out_of_range)
}

/// Finds the token on `line` whose span contains the cursor, allowing
/// [`CURSOR_TOLERANCE`] characters either side. The first such token on the
/// line wins.
///
/// # Errors
///
/// Returns [`CommandError::CursorOutOfRange`] for a cursor outside the text
/// and [`CommandError::NoButtonAtCursor`] when no token is close enough.
pub fn token_at_cursor(text: &str, line: usize, column: usize) -> Result<TokenMatch<'_>, CommandError> {
    cursor_offset(text, line, column)?;
    let range = line_range(text, line).ok_or(CommandError::CursorOutOfRange { line, column })?;
    let line_start = range.start;

    scan(text)
        .skip_while(|found| found.start() < range.start)
        .take_while(|found| found.end() <= range.end)
        .find(|found| {
            let start = text[line_start..found.start()].chars().count();
            let end = start + found.as_str().chars().count();
            column + CURSOR_TOLERANCE >= start && column <= end + CURSOR_TOLERANCE
        })
        .ok_or(CommandError::NoButtonAtCursor { line, column })
}

/// Result of inserting a button token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insertion {
    /// The document text with the token inserted.
    pub text: String,
    /// The inserted token.
    pub token: String,
    /// Byte offset the token was inserted at.
    pub offset: usize,
}

/// Inserts a button token at the cursor, starting in the group's first
/// state. Buttons in the default group use the legacy syntax and all others
/// the canonical extended syntax.
///
/// # Errors
///
/// Returns [`CommandError::InvalidButtonId`] if the id cannot be written
/// into a token, [`CommandError::UnknownGroup`] if the group does not exist
/// and [`CommandError::CursorOutOfRange`] for an invalid cursor.
pub fn insert_button(
    text: &str,
    line: usize,
    column: usize,
    button_id: &str,
    group_id: Option<&str>,
    settings: &Settings,
) -> Result<Insertion, CommandError> {
    if !is_valid_field(button_id) {
        return Err(CommandError::InvalidButtonId(button_id.to_string()));
    }
    let group = settings.resolve_group(group_id).ok_or_else(|| {
        CommandError::UnknownGroup(
            group_id
                .unwrap_or(&settings.default_state_group)
                .to_string(),
        )
    })?;
    let offset = cursor_offset(text, line, column)?;

    let first = group.first_state();
    let token = if group.id() == settings.default_state_group {
        legacy_token(button_id, &first.id)
    } else {
        extended_token(button_id, Some(group.id()), &first.id)
    };

    let mut updated = String::with_capacity(text.len() + token.len());
    updated.push_str(&text[..offset]);
    updated.push_str(&token);
    updated.push_str(&text[offset..]);

    Ok(Insertion {
        text: updated,
        token,
        offset,
    })
}

/// A button token found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonListing {
    pub button_id: String,
    /// Group as resolved against the settings (the default group when the
    /// token names none).
    pub group_id: String,
    /// State id as written in the token.
    pub state_id: String,
    /// State the button displays, or `None` if its group does not exist.
    pub display_state: Option<TaskState>,
    pub syntax: TokenSyntax,
    /// Zero-based line the token starts on.
    pub line: usize,
}

/// Lists every button token in `text`.
#[must_use]
pub fn list_buttons(text: &str, settings: &Settings) -> Vec<ButtonListing> {
    let mut line = 0;
    let mut counted_to = 0;

    scan(text)
        .map(|found| {
            line += text[counted_to..found.start()].matches('\n').count();
            counted_to = found.start();

            let token = found.token;
            let group_id = token
                .group_id
                .clone()
                .unwrap_or_else(|| settings.default_state_group.clone());
            let display_state = settings.group(&group_id).map(|group| {
                group
                    .state(&token.state_id)
                    .unwrap_or_else(|| group.first_state())
                    .clone()
            });

            ButtonListing {
                button_id: token.button_id,
                group_id,
                state_id: token.state_id,
                display_state,
                syntax: found.syntax,
                line,
            }
        })
        .collect()
}
