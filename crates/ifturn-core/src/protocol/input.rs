//! Encoding of RemGlk input documents.

use crate::error::{Result, TurnError};
use crate::session::{InputRequest, TurnInputEvent, TurnMetadata};
use serde::Serialize;
use serde_json::{Value, json};

/// Screen size reported to the interpreter on `init`, in character cells.
pub const SCREEN_WIDTH: u32 = 80;
pub const SCREEN_HEIGHT: u32 = 24;

/// Where the restored game stopped, as needed to address the next input.
///
/// The autosave files themselves reach the interpreter through its autosave
/// directory; the input document only has to agree with them on `gen` and
/// the window waiting for input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredContext {
    pub interpreter_gen: u64,
    pub input: InputRequest,
}

impl RestoredContext {
    /// Context for a stored turn, or `None` once the game has ended.
    pub fn from_metadata(metadata: &TurnMetadata) -> Option<Self> {
        Some(Self {
            interpreter_gen: metadata.interpreter_gen,
            input: metadata.input.clone()?,
        })
    }
}

#[derive(Serialize)]
struct Metrics {
    width: u32,
    height: u32,
    gridcharwidth: u32,
    gridcharheight: u32,
    buffercharwidth: u32,
    buffercharheight: u32,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            width: SCREEN_WIDTH,
            height: SCREEN_HEIGHT,
            gridcharwidth: 1,
            gridcharheight: 1,
            buffercharwidth: 1,
            buffercharheight: 1,
        }
    }
}

/// Builds the document the interpreter reads from stdin for one turn.
///
/// `init` is only valid without restored state; `line` and `character`
/// events must match the input request the restored game is waiting for.
/// A line event answers a pending file prompt (an empty line cancels it).
pub fn encode_input(event: &TurnInputEvent, restored: Option<&RestoredContext>) -> Result<Vec<u8>> {
    let document = match (event, restored) {
        (TurnInputEvent::Init, None) => json!({
            "type": "init",
            "gen": 0,
            "metrics": Metrics::default(),
            // No timer or hyperlink events are ever sent back.
            "support": [],
        }),
        (TurnInputEvent::Init, Some(_)) => {
            return Err(TurnError::input_mismatch(
                "init sent to a game in progress; reset it first",
            ));
        }
        (_, None) => {
            return Err(TurnError::input_mismatch(format!(
                "{} event needs a restored game",
                event.kind_name()
            )));
        }
        (event, Some(ctx)) => encode_for_request(event, ctx)?,
    };

    let mut bytes = serde_json::to_vec(&document)
        .map_err(|e| TurnError::protocol(format!("failed to encode input: {}", e)))?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn encode_for_request(event: &TurnInputEvent, ctx: &RestoredContext) -> Result<Value> {
    let generation = ctx.interpreter_gen;
    match (event, &ctx.input) {
        (TurnInputEvent::Line { text }, InputRequest::Line { window }) => Ok(json!({
            "type": "line",
            "gen": generation,
            "window": window,
            "value": text,
        })),
        (TurnInputEvent::Character { key }, InputRequest::Character { window }) => Ok(json!({
            "type": "char",
            "gen": generation,
            "window": window,
            "value": key.as_protocol_value(),
        })),
        (TurnInputEvent::Line { text }, InputRequest::FilePrompt { .. }) => {
            let value = if text.trim().is_empty() {
                Value::Null
            } else {
                Value::String(text.trim().to_string())
            };
            Ok(json!({
                "type": "specialresponse",
                "gen": generation,
                "response": "fileref_prompt",
                "value": value,
            }))
        }
        (event, request) => Err(TurnError::input_mismatch(format!(
            "game is waiting for {} input, got a {} event",
            request.mode(),
            event.kind_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::encode_key;

    fn decode(bytes: &[u8]) -> Value {
        assert_eq!(bytes.last(), Some(&b'\n'));
        serde_json::from_slice(bytes).unwrap()
    }

    fn ctx(input: InputRequest) -> RestoredContext {
        RestoredContext {
            interpreter_gen: 4,
            input,
        }
    }

    #[test]
    fn test_init_document() {
        let doc = decode(&encode_input(&TurnInputEvent::Init, None).unwrap());
        assert_eq!(doc["type"], "init");
        assert_eq!(doc["gen"], 0);
        assert_eq!(doc["metrics"]["width"], 80);
        assert_eq!(doc["support"], json!([]));
    }

    #[test]
    fn test_line_document() {
        let event = TurnInputEvent::line("go north");
        let doc = decode(&encode_input(&event, Some(&ctx(InputRequest::Line { window: 22 }))).unwrap());
        assert_eq!(doc, json!({"type": "line", "gen": 4, "window": 22, "value": "go north"}));
    }

    #[test]
    fn test_space_key_document() {
        let restored = ctx(InputRequest::Character { window: 3 });
        let empty = TurnInputEvent::Character { key: encode_key("").unwrap() };
        let space = TurnInputEvent::Character { key: encode_key(" ").unwrap() };
        let a = encode_input(&empty, Some(&restored)).unwrap();
        let b = encode_input(&space, Some(&restored)).unwrap();
        assert_eq!(a, b);
        assert_eq!(decode(&a)["value"], " ");
    }

    #[test]
    fn test_file_prompt_response() {
        let restored = ctx(InputRequest::FilePrompt {
            filemode: "write".to_string(),
            filetype: "save".to_string(),
        });
        let doc = decode(&encode_input(&TurnInputEvent::line(" mysave "), Some(&restored)).unwrap());
        assert_eq!(doc["type"], "specialresponse");
        assert_eq!(doc["value"], "mysave");
        let cancel = decode(&encode_input(&TurnInputEvent::line(""), Some(&restored)).unwrap());
        assert!(cancel["value"].is_null());
    }

    #[test]
    fn test_mismatches() {
        let line_ctx = ctx(InputRequest::Line { window: 1 });
        assert!(matches!(
            encode_input(&TurnInputEvent::Init, Some(&line_ctx)),
            Err(TurnError::InputMismatch(_))
        ));
        assert!(matches!(
            encode_input(&TurnInputEvent::line("look"), None),
            Err(TurnError::InputMismatch(_))
        ));
        let key = TurnInputEvent::character("x").unwrap();
        assert!(matches!(
            encode_input(&key, Some(&line_ctx)),
            Err(TurnError::InputMismatch(_))
        ));
    }
}
