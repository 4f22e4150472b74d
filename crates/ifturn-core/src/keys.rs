//! Mapping of logical key presses to RemGlk key names.
//!
//! RemGlk reads a `char` event's `value` as either a single literal character
//! or one of a small set of lowercase key names. Anything it does not know as
//! a name is decoded from its first character, so a caller sending `"space"`
//! would actually press `s`. The encoder refuses such tokens instead.

use crate::error::{Result, TurnError};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoEnumIterator};

/// Special keys with a designated RemGlk name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NamedKey {
    Return,
    Escape,
    Tab,
    Left,
    Right,
    Up,
    Down,
    PageUp,
    PageDown,
    Home,
    End,
    Delete,
    Func1,
    Func2,
    Func3,
    Func4,
    Func5,
    Func6,
    Func7,
    Func8,
    Func9,
    Func10,
    Func11,
    Func12,
}

impl NamedKey {
    /// Looks up a key by one of its accepted spellings (case-insensitive).
    fn from_alias(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        let key = match lower.as_str() {
            "return" | "enter" => NamedKey::Return,
            "escape" | "esc" => NamedKey::Escape,
            "tab" => NamedKey::Tab,
            "left" | "arrow-left" | "arrowleft" => NamedKey::Left,
            "right" | "arrow-right" | "arrowright" => NamedKey::Right,
            "up" | "arrow-up" | "arrowup" => NamedKey::Up,
            "down" | "arrow-down" | "arrowdown" => NamedKey::Down,
            "pageup" | "page-up" | "page_up" | "pgup" => NamedKey::PageUp,
            "pagedown" | "page-down" | "page_down" | "pgdn" => NamedKey::PageDown,
            "home" => NamedKey::Home,
            "end" => NamedKey::End,
            "delete" | "del" | "backspace" => NamedKey::Delete,
            other => return Self::function_key(other),
        };
        Some(key)
    }

    /// Parses `f1`..`f12` and `func1`..`func12`.
    fn function_key(name: &str) -> Option<Self> {
        let digits = name
            .strip_prefix("func")
            .or_else(|| name.strip_prefix('f'))?;
        let n: usize = digits.parse().ok()?;
        if (1..=12).contains(&n) {
            NamedKey::iter().nth(NamedKey::Func1 as usize + n - 1)
        } else {
            None
        }
    }
}

/// One encoded key press, ready to be placed in a `char` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum KeyToken {
    /// A single printable character (already lowercased).
    Char(char),
    /// A designated special key.
    Named(NamedKey),
}

impl KeyToken {
    /// The token as it appears on the wire.
    pub fn as_protocol_value(&self) -> String {
        match self {
            KeyToken::Char(c) => c.to_string(),
            KeyToken::Named(key) => key.to_string(),
        }
    }
}

impl std::fmt::Display for KeyToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_protocol_value())
    }
}

/// Encodes a logical key press.
///
/// - `""` and `" "` both encode as a literal space.
/// - `"\n"`, `"\r"`, `"\t"` and `"\x1b"` map to their named keys.
/// - Any other single printable character encodes as itself, lowercased.
/// - Multi-character input must be a known key name; `"space"` is refused.
pub fn encode_key(input: &str) -> Result<KeyToken> {
    if input.is_empty() {
        return Ok(KeyToken::Char(' '));
    }

    let mut chars = input.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return encode_single(c, input);
    }

    if input.eq_ignore_ascii_case("space") {
        return Err(TurnError::invalid_key(
            input,
            "there is no named space key; send \" \" or an empty key instead",
        ));
    }

    NamedKey::from_alias(input)
        .map(KeyToken::Named)
        .ok_or_else(|| TurnError::invalid_key(input, "not a single character or a known key name"))
}

fn encode_single(c: char, input: &str) -> Result<KeyToken> {
    match c {
        '\n' | '\r' => Ok(KeyToken::Named(NamedKey::Return)),
        '\t' => Ok(KeyToken::Named(NamedKey::Tab)),
        '\u{1b}' => Ok(KeyToken::Named(NamedKey::Escape)),
        '\u{7f}' | '\u{8}' => Ok(KeyToken::Named(NamedKey::Delete)),
        c if c.is_control() => Err(TurnError::invalid_key(
            input.escape_default().to_string(),
            "control characters have no key encoding",
        )),
        c => {
            let mut lower = c.to_lowercase();
            match (lower.next(), lower.next()) {
                (Some(l), None) => Ok(KeyToken::Char(l)),
                // Multi-char lowercase forms (e.g. 'İ') are sent unchanged.
                _ => Ok(KeyToken::Char(c)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_space() {
        assert_eq!(encode_key("").unwrap(), encode_key(" ").unwrap());
        assert_eq!(encode_key("").unwrap().as_protocol_value(), " ");
    }

    #[test]
    fn test_named_space_rejected() {
        for token in ["space", "SPACE", "Space"] {
            let err = encode_key(token).unwrap_err();
            assert!(matches!(err, TurnError::InvalidKeyToken { .. }), "{token}");
        }
    }

    #[test]
    fn test_printable_lowercased() {
        assert_eq!(encode_key("x").unwrap(), KeyToken::Char('x'));
        assert_eq!(encode_key("Q").unwrap(), KeyToken::Char('q'));
        assert_eq!(encode_key("?").unwrap().as_protocol_value(), "?");
    }

    #[test]
    fn test_named_keys() {
        assert_eq!(encode_key("\n").unwrap().as_protocol_value(), "return");
        assert_eq!(encode_key("enter").unwrap().as_protocol_value(), "return");
        assert_eq!(encode_key("ESC").unwrap().as_protocol_value(), "escape");
        assert_eq!(encode_key("page-up").unwrap().as_protocol_value(), "pageup");
        assert_eq!(encode_key("PageDown").unwrap().as_protocol_value(), "pagedown");
        assert_eq!(encode_key("arrow-left").unwrap().as_protocol_value(), "left");
        assert_eq!(encode_key("delete").unwrap().as_protocol_value(), "delete");
        assert_eq!(encode_key("\t").unwrap().as_protocol_value(), "tab");
    }

    #[test]
    fn test_function_keys() {
        assert_eq!(encode_key("f1").unwrap().as_protocol_value(), "func1");
        assert_eq!(encode_key("F12").unwrap().as_protocol_value(), "func12");
        assert_eq!(encode_key("func7").unwrap().as_protocol_value(), "func7");
        assert!(encode_key("f13").is_err());
        assert!(encode_key("f0").is_err());
    }

    #[test]
    fn test_unknown_names_rejected() {
        assert!(encode_key("north").is_err());
        assert!(encode_key("\u{1}").is_err());
    }
}
