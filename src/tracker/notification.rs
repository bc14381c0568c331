use std::{
    io::{self, Write},
    time::Duration,
};

use ansi_term::Colour;
#[cfg(test)]
use mockall::automock;
use tracing::warn;

/// Surface that shows tracked time to the user.
#[cfg_attr(test, automock)]
pub trait NotificationSink: Send {
    /// `display` is produced by [format_elapsed]. `over_cap` is set once the daily limit is
    /// exceeded.
    fn refresh(&mut self, display: &str, over_cap: bool);
}

/// Formats time as `[H:]MM:SS`. Hours are omitted when there are none.
pub fn format_elapsed(value: Duration) -> String {
    if value.is_zero() {
        return "00:00".into();
    }
    let seconds = value.as_secs();
    let hours = seconds / 3600;
    let minutes = seconds / 60 % 60;
    let seconds = seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// Redraws a single terminal line with the current time.
pub struct TerminalSink<W> {
    out: W,
}

impl TerminalSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    fn draw(&mut self, display: &str, over_cap: bool) -> io::Result<()> {
        // Carriage return plus "erase line" keeps the timer on one line.
        write!(self.out, "\r\x1b[2K")?;
        if over_cap {
            write!(self.out, "{}", Colour::Red.bold().paint(display))?;
        } else {
            write!(self.out, "{display}")?;
        }
        self.out.flush()
    }
}

impl<W: Write + Send> NotificationSink for TerminalSink<W> {
    fn refresh(&mut self, display: &str, over_cap: bool) {
        if let Err(e) = self.draw(display, over_cap) {
            warn!("Failed to draw the timer {e:?}");
        }
    }
}
