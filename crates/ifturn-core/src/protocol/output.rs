//! Decoding of RemGlk output documents.

use crate::error::{Result, TurnError};
use crate::session::{InputRequest, WindowSummary};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// A style tag on a content run.
///
/// Unknown tags are kept as `Other` so they survive the round trip to the
/// caller untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Style {
    Normal,
    Emphasized,
    Preformatted,
    Header,
    Subheader,
    Alert,
    Note,
    Blockquote,
    Input,
    User1,
    User2,
    Other(String),
}

impl From<String> for Style {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "normal" => Style::Normal,
            "emphasized" => Style::Emphasized,
            "preformatted" => Style::Preformatted,
            "header" => Style::Header,
            "subheader" => Style::Subheader,
            "alert" => Style::Alert,
            "note" => Style::Note,
            "blockquote" => Style::Blockquote,
            "input" => Style::Input,
            "user1" => Style::User1,
            "user2" => Style::User2,
            _ => Style::Other(tag),
        }
    }
}

impl From<Style> for String {
    fn from(style: Style) -> Self {
        style.as_str().to_string()
    }
}

impl Style {
    pub fn as_str(&self) -> &str {
        match self {
            Style::Normal => "normal",
            Style::Emphasized => "emphasized",
            Style::Preformatted => "preformatted",
            Style::Header => "header",
            Style::Subheader => "subheader",
            Style::Alert => "alert",
            Style::Note => "note",
            Style::Blockquote => "blockquote",
            Style::Input => "input",
            Style::User1 => "user1",
            Style::User2 => "user2",
            Style::Other(tag) => tag,
        }
    }
}

/// One styled piece of text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRun {
    pub style: Style,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hyperlink: Option<Value>,
}

/// A paragraph of a buffer window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    /// Continues the previous paragraph instead of starting a new line.
    pub append: bool,
    pub runs: Vec<ContentRun>,
}

/// One row of a grid window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridLine {
    pub line: u32,
    pub runs: Vec<ContentRun>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WindowContent {
    Buffer { paragraphs: Vec<Paragraph> },
    Grid { lines: Vec<GridLine> },
    /// Only a `clear`, or an update for a window type without text.
    Empty,
}

/// A content delta for one window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowUpdate {
    pub window: u32,
    pub clear: bool,
    pub content: WindowContent,
}

/// A decoded interpreter response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutputMessage {
    /// The interpreter's `gen`, echoed back on the next input.
    pub interpreter_gen: u64,
    /// The new window layout, when it changed this turn.
    pub windows: Option<Vec<WindowSummary>>,
    pub updates: Vec<WindowUpdate>,
    /// The pending request; `None` only when the game has ended.
    pub input: Option<InputRequest>,
}

impl TurnOutputMessage {
    pub fn is_game_over(&self) -> bool {
        self.input.is_none()
    }
}

#[derive(Deserialize)]
struct RawOutput {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "gen", default)]
    generation: Option<u64>,
    #[serde(default)]
    windows: Option<Vec<WindowSummary>>,
    #[serde(default)]
    content: Vec<RawContent>,
    #[serde(default)]
    input: Option<Vec<RawInput>>,
    #[serde(default)]
    specialinput: Option<RawSpecialInput>,
    #[serde(default)]
    exit: bool,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct RawContent {
    id: u32,
    #[serde(default)]
    clear: bool,
    #[serde(default)]
    text: Option<Vec<RawParagraph>>,
    #[serde(default)]
    lines: Option<Vec<RawGridLine>>,
}

#[derive(Deserialize)]
struct RawParagraph {
    #[serde(default)]
    append: bool,
    #[serde(default)]
    content: Vec<Value>,
}

#[derive(Deserialize)]
struct RawGridLine {
    line: u32,
    #[serde(default)]
    content: Vec<Value>,
}

#[derive(Deserialize)]
struct RawInput {
    id: u32,
    /// Absent on hyperlink-only entries.
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

#[derive(Deserialize)]
struct RawSpecialInput {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    filemode: Option<String>,
    #[serde(default)]
    filetype: Option<String>,
}

/// Parses the interpreter's stdout.
///
/// Trailing whitespace and unknown top-level fields are ignored. An update
/// that asks for no line, character or file input ends the game, whether or
/// not it sets `exit`. A missing `gen`, an unknown input type, or content
/// runs that are neither objects nor style/text pairs fail with `Protocol`.
pub fn decode_output(bytes: &[u8]) -> Result<TurnOutputMessage> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| TurnError::protocol(format!("output is not UTF-8: {}", e)))?
        .trim();
    if text.is_empty() {
        return Err(TurnError::protocol("interpreter produced no output"));
    }

    let raw: RawOutput = serde_json::from_str(text)
        .map_err(|e| TurnError::protocol(format!("malformed output: {}", e)))?;

    match raw.kind.as_str() {
        "update" => {}
        "error" => {
            return Err(TurnError::protocol(format!(
                "interpreter reported an error: {}",
                raw.message.as_deref().unwrap_or("(no message)")
            )));
        }
        other => {
            return Err(TurnError::protocol(format!(
                "unexpected output type '{}'",
                other
            )));
        }
    }

    let interpreter_gen = raw
        .generation
        .ok_or_else(|| TurnError::protocol("output is missing 'gen'"))?;

    let updates = raw
        .content
        .into_iter()
        .map(decode_content)
        .collect::<Result<Vec<_>>>()?;

    let input = if raw.exit {
        None
    } else {
        decode_input_request(raw.input, raw.specialinput)?
    };

    Ok(TurnOutputMessage {
        interpreter_gen,
        windows: raw.windows,
        updates,
        input,
    })
}

fn decode_input_request(
    input: Option<Vec<RawInput>>,
    special: Option<RawSpecialInput>,
) -> Result<Option<InputRequest>> {
    if let Some(special) = special {
        if special.kind != "fileref_prompt" {
            return Err(TurnError::protocol(format!(
                "unsupported special input '{}'",
                special.kind
            )));
        }
        return Ok(Some(InputRequest::FilePrompt {
            filemode: special.filemode.unwrap_or_default(),
            filetype: special.filetype.unwrap_or_default(),
        }));
    }

    let requests: Vec<(u32, String)> = input
        .unwrap_or_default()
        .into_iter()
        .filter_map(|raw| Some((raw.id, raw.kind?)))
        .collect();
    let Some((window, kind)) = requests.first() else {
        return Ok(None);
    };
    if requests.len() > 1 {
        warn!(
            count = requests.len(),
            window = *window,
            "Interpreter requested input in several windows; using the first"
        );
    }
    match kind.as_str() {
        "line" => Ok(Some(InputRequest::Line { window: *window })),
        "char" => Ok(Some(InputRequest::Character { window: *window })),
        other => Err(TurnError::protocol(format!(
            "unknown input request type '{}'",
            other
        ))),
    }
}

fn decode_content(raw: RawContent) -> Result<WindowUpdate> {
    let content = match (raw.text, raw.lines) {
        (Some(paragraphs), _) => WindowContent::Buffer {
            paragraphs: paragraphs
                .into_iter()
                .map(|p| {
                    Ok(Paragraph {
                        append: p.append,
                        runs: decode_runs(p.content)?,
                    })
                })
                .collect::<Result<_>>()?,
        },
        (None, Some(lines)) => WindowContent::Grid {
            lines: lines
                .into_iter()
                .map(|l| {
                    Ok(GridLine {
                        line: l.line,
                        runs: decode_runs(l.content)?,
                    })
                })
                .collect::<Result<_>>()?,
        },
        (None, None) => WindowContent::Empty,
    };
    Ok(WindowUpdate {
        window: raw.id,
        clear: raw.clear,
        content,
    })
}

/// Runs arrive as `{"style","text"}` objects or as flat `style, text` string pairs.
fn decode_runs(values: Vec<Value>) -> Result<Vec<ContentRun>> {
    let mut runs = Vec::with_capacity(values.len());
    let mut pending_style: Option<String> = None;

    for value in values {
        match value {
            Value::Object(mut obj) => {
                if pending_style.is_some() {
                    return Err(TurnError::protocol("style without text in content run list"));
                }
                let text = match obj.remove("text") {
                    Some(Value::String(s)) => s,
                    Some(_) => return Err(TurnError::protocol("content run text is not a string")),
                    None => String::new(),
                };
                let style = match obj.remove("style") {
                    Some(Value::String(s)) => Style::from(s),
                    None => Style::Normal,
                    Some(_) => return Err(TurnError::protocol("content run style is not a string")),
                };
                runs.push(ContentRun {
                    style,
                    text,
                    hyperlink: obj.remove("hyperlink"),
                });
            }
            Value::String(s) => match pending_style.take() {
                None => pending_style = Some(s),
                Some(style) => runs.push(ContentRun {
                    style: Style::from(style),
                    text: s,
                    hyperlink: None,
                }),
            },
            other => {
                return Err(TurnError::protocol(format!(
                    "unexpected content run {}",
                    other
                )));
            }
        }
    }

    if pending_style.is_some() {
        return Err(TurnError::protocol("style without text in content run list"));
    }
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPENING: &str = r#"{"type":"update","gen":1,
        "windows":[{"id":22,"type":"buffer","rock":201,"left":0,"top":1,"width":80,"height":23},
                   {"id":21,"type":"grid","rock":202,"gridwidth":80,"gridheight":1}],
        "content":[{"id":21,"lines":[{"line":0,"content":[{"style":"normal","text":" West of House"}]}]},
                   {"id":22,"clear":true,"text":[{"content":[{"style":"header","text":"ZORK I"}]},
                                                 {},
                                                 {"content":["normal","You are standing in an open field."]}]}],
        "input":[{"id":22,"gen":1,"type":"line","maxlen":200}],
        "timer":null}

"#;

    #[test]
    fn test_decode_opening() {
        let msg = decode_output(OPENING.as_bytes()).unwrap();
        assert_eq!(msg.interpreter_gen, 1);
        assert_eq!(msg.input, Some(InputRequest::Line { window: 22 }));
        let windows = msg.windows.unwrap();
        assert_eq!(windows.len(), 2);
        assert!(windows[1].is_grid());
        assert_eq!(msg.updates.len(), 2);
        match &msg.updates[1].content {
            WindowContent::Buffer { paragraphs } => {
                assert_eq!(paragraphs.len(), 3);
                assert_eq!(paragraphs[0].runs[0].style, Style::Header);
                assert!(paragraphs[1].runs.is_empty());
                assert_eq!(paragraphs[2].runs[0].text, "You are standing in an open field.");
            }
            other => panic!("unexpected content: {:?}", other),
        }
        assert!(msg.updates[1].clear);
    }

    #[test]
    fn test_unknown_style_passes_through() {
        let doc = r#"{"type":"update","gen":2,"content":[{"id":1,"text":[{"content":[{"style":"sparkle","text":"!"}]}]}],"input":[{"id":1,"type":"char"}]}"#;
        let msg = decode_output(doc.as_bytes()).unwrap();
        let WindowContent::Buffer { paragraphs } = &msg.updates[0].content else {
            panic!("expected buffer content");
        };
        assert_eq!(paragraphs[0].runs[0].style, Style::Other("sparkle".to_string()));
        assert_eq!(String::from(paragraphs[0].runs[0].style.clone()), "sparkle");
        assert_eq!(msg.input, Some(InputRequest::Character { window: 1 }));
        assert!(msg.windows.is_none());
    }

    #[test]
    fn test_exit_is_terminal() {
        let doc = r#"{"type":"update","gen":9,"content":[],"exit":true}"#;
        let msg = decode_output(doc.as_bytes()).unwrap();
        assert!(msg.is_game_over());
    }

    #[test]
    fn test_missing_input_request_is_terminal() {
        let doc = r#"{"type":"update","gen":2,"content":[{"id":22,"text":[{"content":[{"style":"alert","text":"*** You have died ***"}]}]}]}"#;
        let msg = decode_output(doc.as_bytes()).unwrap();
        assert_eq!(msg.input, None);
        assert!(msg.is_game_over());
        assert_eq!(msg.updates.len(), 1);

        let empty = decode_output(br#"{"type":"update","gen":1,"content":[]}"#).unwrap();
        assert!(empty.is_game_over());
    }

    #[test]
    fn test_hyperlink_entries_are_skipped() {
        let doc = r#"{"type":"update","gen":3,"input":[{"id":21,"gen":3,"hyperlink":true},{"id":22,"gen":3,"type":"line"}]}"#;
        let msg = decode_output(doc.as_bytes()).unwrap();
        assert_eq!(msg.input, Some(InputRequest::Line { window: 22 }));

        let only_links = r#"{"type":"update","gen":3,"input":[{"id":21,"gen":3,"hyperlink":true}]}"#;
        assert!(decode_output(only_links.as_bytes()).unwrap().is_game_over());
    }

    #[test]
    fn test_special_input() {
        let doc = r#"{"type":"update","gen":3,"specialinput":{"type":"fileref_prompt","filemode":"write","filetype":"save"}}"#;
        let msg = decode_output(doc.as_bytes()).unwrap();
        assert_eq!(
            msg.input,
            Some(InputRequest::FilePrompt {
                filemode: "write".to_string(),
                filetype: "save".to_string()
            })
        );
    }

    #[test]
    fn test_rejections() {
        let cases = [
            "",
            "   \n\n",
            "{not json",
            r#"{"type":"update","content":[],"input":[{"id":1,"type":"line"}]}"#,
            r#"{"type":"update","gen":1,"input":[{"id":1,"type":"mouse"}]}"#,
            r#"{"type":"update","gen":1,"content":[{"id":1,"text":[{"content":["normal"]}]}],"input":[{"id":1,"type":"line"}]}"#,
            r#"{"type":"error","message":"game file is corrupt"}"#,
            r#"{"type":"pass"}"#,
        ];
        for case in cases {
            let err = decode_output(case.as_bytes()).unwrap_err();
            assert!(err.is_protocol(), "{case}: {err:?}");
        }
    }

    #[test]
    fn test_error_message_is_kept() {
        let err = decode_output(br#"{"type":"error","message":"boom"}"#).unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_first_of_several_inputs() {
        let doc = r#"{"type":"update","gen":1,"input":[{"id":5,"type":"char"},{"id":6,"type":"line"}]}"#;
        let msg = decode_output(doc.as_bytes()).unwrap();
        assert_eq!(msg.input, Some(InputRequest::Character { window: 5 }));
    }
}
