//! Output rendering for streamed chat completions.
//!
//! The completion reducer reports progress through the [`Renderer`] trait and
//! never touches the terminal itself. [`PlainTextRenderer`] is the stdout
//! implementation used by the `groq-chat` binary.

use std::io::{self, Stdout, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::Error;

/// Transient marker appended to the live preview while a response streams.
pub const CURSOR_MARKER: &str = "▌";

/// ANSI escape code for dim text (used for informational messages).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code to clear from the cursor to the end of the line.
const ANSI_CLEAR_TO_EOL: &str = "\x1b[K";

/// Observer for one streaming completion.
///
/// The completion reducer calls `on_fragment` once per received fragment,
/// then exactly one of `on_complete`, `on_error` or `on_interrupted`.
pub trait Renderer: Send {
    /// A fragment arrived; `preview` is all text so far plus [`CURSOR_MARKER`].
    fn on_fragment(&mut self, preview: &str);

    /// The stream finished; `text` is the full response without the cursor.
    fn on_complete(&mut self, text: &str);

    /// The request or stream failed.
    fn on_error(&mut self, error: &Error);

    /// The stream was cut short by the user.
    fn on_interrupted(&mut self) {}

    /// Print an error message that is not tied to a stream.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Returns true if streaming should be interrupted.
    fn should_interrupt(&self) -> bool {
        false
    }
}

/// Plain text renderer with optional ANSI styling.
///
/// Only the new suffix of each preview is written, so the response appears
/// to type itself out. With color enabled the cursor marker is drawn after
/// the text and erased once the response completes.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
    printed: usize,
    cursor_visible: bool,
    interrupted: Option<Arc<AtomicBool>>,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
            printed: 0,
            cursor_visible: false,
            interrupted: None,
        }
    }

    /// Attaches an interrupt flag to the renderer.
    pub fn with_interrupt(mut self, interrupted: Arc<AtomicBool>) -> Self {
        self.interrupted = Some(interrupted);
        self
    }

    /// Flushes stdout to ensure immediate display of streamed content.
    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }

    fn erase_cursor(&mut self) {
        if self.cursor_visible {
            print!("{ANSI_CLEAR_TO_EOL}");
            self.cursor_visible = false;
        }
    }

    fn end_stream(&mut self) {
        self.erase_cursor();
        self.printed = 0;
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn on_fragment(&mut self, preview: &str) {
        let text = preview.strip_suffix(CURSOR_MARKER).unwrap_or(preview);
        let suffix = new_suffix(text, self.printed);
        self.erase_cursor();
        print!("{suffix}");
        self.printed = text.len();
        if self.use_color {
            // Draw the marker, then step back over it so the next fragment
            // overwrites it.
            print!("{CURSOR_MARKER}\x08");
            self.cursor_visible = true;
        }
        self.flush();
    }

    fn on_complete(&mut self, text: &str) {
        let suffix = new_suffix(text, self.printed).to_string();
        self.end_stream();
        println!("{suffix}");
        self.flush();
    }

    fn on_error(&mut self, error: &Error) {
        let had_output = self.printed > 0;
        self.end_stream();
        if had_output {
            println!();
        }
        self.print_error(&error.to_string());
    }

    fn on_interrupted(&mut self) {
        self.end_stream();
        println!("\n[interrupted]");
        self.flush();
    }

    fn print_error(&mut self, error: &str) {
        if self.use_color {
            eprintln!("{ANSI_RED}Error: {error}{ANSI_RESET}");
        } else {
            eprintln!("Error: {error}");
        }
    }

    fn print_info(&mut self, info: &str) {
        if self.use_color {
            println!("{ANSI_DIM}{info}{ANSI_RESET}");
        } else {
            println!("{info}");
        }
        self.flush();
    }

    fn should_interrupt(&self) -> bool {
        self.interrupted
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// The part of `text` past the first `printed` bytes.
///
/// Falls back to the whole text if `printed` does not land on a character
/// boundary.
fn new_suffix(text: &str, printed: usize) -> &str {
    text.get(printed..).unwrap_or(text)
}
