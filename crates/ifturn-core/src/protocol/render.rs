//! Rendering of decoded window updates into caller-facing text.

use super::output::{ContentRun, Style, TurnOutputMessage, WindowContent};
use crate::error::TurnWarning;
use crate::session::{InputMode, InputRequest, WindowSummary};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const KEYPRESS_NOTE: &str = "[Waiting for keypress]";
pub const GAME_OVER_NOTE: &str = "[The game has ended]";
const STATUS_FRAME: &str = "===";

/// The final text of one window after this turn's updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedWindow {
    pub id: u32,
    pub window_type: String,
    pub text: String,
    /// The styled runs behind `text`, for callers doing their own rendering.
    pub runs: Vec<ContentRun>,
}

/// What one turn produced, as returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedOutput {
    pub game_id: String,
    pub turn_id: String,
    /// Generation committed by this turn.
    pub generation: u64,
    pub text: String,
    pub windows: Vec<RenderedWindow>,
    pub input: Option<InputRequest>,
    pub game_over: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<TurnWarning>,
}

impl RenderedOutput {
    pub fn input_mode(&self) -> Option<InputMode> {
        self.input.as_ref().map(InputRequest::mode)
    }
}

/// Rendered screen content, before turn bookkeeping is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedScreen {
    pub text: String,
    pub windows: Vec<RenderedWindow>,
}

/// Applies the markdown convention for a style.
pub fn apply_style(style: &Style, text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    match style {
        Style::Emphasized => format!("*{}*", text),
        Style::Header | Style::Subheader => format!("**{}**", text),
        Style::Preformatted => format!("`{}`", text),
        Style::User1 => format!("[{}]", text),
        Style::Blockquote => format!("\"{}\"", text),
        Style::Input => format!("> {}", text),
        _ => text.to_string(),
    }
}

fn render_runs(runs: &[ContentRun]) -> String {
    runs.iter().map(|r| apply_style(&r.style, &r.text)).collect()
}

#[derive(Default)]
struct WindowText {
    window_type: String,
    paragraphs: Vec<Vec<ContentRun>>,
    grid: BTreeMap<u32, Vec<ContentRun>>,
}

impl WindowText {
    fn is_grid(&self) -> bool {
        self.window_type == "grid"
    }

    fn text(&self) -> String {
        if self.is_grid() {
            self.grid
                .values()
                .map(|runs| render_runs(runs).trim_end().to_string())
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            self.paragraphs
                .iter()
                .map(|runs| render_runs(runs))
                .collect::<Vec<_>>()
                .join("\n")
        }
    }

    fn runs(&self) -> Vec<ContentRun> {
        if self.is_grid() {
            self.grid.values().flatten().cloned().collect()
        } else {
            self.paragraphs.iter().flatten().cloned().collect()
        }
    }
}

/// Renders a turn's window updates against the current layout.
///
/// Grid windows (status lines) come first in a framed block, then buffer
/// text, then a note about the pending input.
pub fn render(message: &TurnOutputMessage, layout: &[WindowSummary]) -> RenderedScreen {
    let mut order: Vec<u32> = Vec::new();
    let mut windows: BTreeMap<u32, WindowText> = BTreeMap::new();

    for update in &message.updates {
        let entry = windows.entry(update.window).or_insert_with(|| {
            order.push(update.window);
            let window_type = layout
                .iter()
                .find(|w| w.id == update.window)
                .map(|w| w.window_type.clone())
                .unwrap_or_else(|| match update.content {
                    WindowContent::Grid { .. } => "grid".to_string(),
                    _ => "buffer".to_string(),
                });
            WindowText {
                window_type,
                ..Default::default()
            }
        });

        if update.clear {
            entry.paragraphs.clear();
            entry.grid.clear();
        }
        match &update.content {
            WindowContent::Buffer { paragraphs } => {
                for paragraph in paragraphs {
                    match entry.paragraphs.last_mut() {
                        Some(last) if paragraph.append => last.extend(paragraph.runs.iter().cloned()),
                        _ => entry.paragraphs.push(paragraph.runs.clone()),
                    }
                }
            }
            WindowContent::Grid { lines } => {
                for line in lines {
                    entry.grid.insert(line.line, line.runs.clone());
                }
            }
            WindowContent::Empty => {}
        }
    }

    let rendered: Vec<RenderedWindow> = order
        .iter()
        .filter_map(|id| {
            windows.get(id).map(|w| RenderedWindow {
                id: *id,
                window_type: w.window_type.clone(),
                text: w.text(),
                runs: w.runs(),
            })
        })
        .collect();

    let mut sections: Vec<String> = Vec::new();
    for window in rendered.iter().filter(|w| w.window_type == "grid") {
        if !window.text.trim().is_empty() {
            sections.push(format!("{}\n{}\n{}", STATUS_FRAME, window.text, STATUS_FRAME));
        }
    }
    for window in rendered.iter().filter(|w| w.window_type != "grid") {
        let text = window.text.trim_end();
        if !text.is_empty() {
            sections.push(text.to_string());
        }
    }
    if let Some(note) = input_note(message.input.as_ref()) {
        sections.push(note);
    }

    RenderedScreen {
        text: sections.join("\n\n"),
        windows: rendered,
    }
}

fn input_note(input: Option<&InputRequest>) -> Option<String> {
    match input {
        None => Some(GAME_OVER_NOTE.to_string()),
        Some(InputRequest::Line { .. }) => None,
        Some(InputRequest::Character { .. }) => Some(KEYPRESS_NOTE.to_string()),
        Some(InputRequest::FilePrompt { filemode, .. }) => {
            let mode = if filemode.is_empty() { "file" } else { filemode };
            Some(format!(
                "[File prompt ({}): send a file name, or an empty line to cancel]",
                mode
            ))
        }
    }
}
