//! The RemGlk turn exchange: input encoding, output decoding and rendering.

mod input;
mod output;
mod render;

pub use input::{RestoredContext, SCREEN_HEIGHT, SCREEN_WIDTH, encode_input};
pub use output::{
    ContentRun, GridLine, Paragraph, Style, TurnOutputMessage, WindowContent, WindowUpdate,
    decode_output,
};
pub use render::{
    GAME_OVER_NOTE, KEYPRESS_NOTE, RenderedOutput, RenderedScreen, RenderedWindow, apply_style,
    render,
};
