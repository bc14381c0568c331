use anyhow::Result;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    select,
    sync::mpsc::UnboundedSender,
};
use tokio_stream::{wrappers::LinesStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::event::TrackerEvent;

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Toggle,
    Pause,
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    match line.trim().to_lowercase().as_str() {
        "" | "t" | "toggle" => Some(Command::Toggle),
        "p" | "pause" => Some(Command::Pause),
        "q" | "quit" => Some(Command::Quit),
        _ => None,
    }
}

/// Turns lines of `input` into toggle requests. Returns on end of input, on quit or once
/// `shutdown` is cancelled.
pub async fn read_toggles(
    input: impl AsyncBufRead + Unpin,
    sender: UnboundedSender<TrackerEvent>,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut lines = LinesStream::new(input.lines());
    loop {
        let line = select! {
            _ = shutdown.cancelled() => return Ok(()),
            line = lines.next() => match line {
                Some(line) => line?,
                None => {
                    debug!("Input closed");
                    return Ok(());
                }
            },
        };
        match parse_command(&line) {
            Some(Command::Toggle) => {
                if sender.send(TrackerEvent::Toggle).is_err() {
                    return Ok(());
                }
            }
            Some(Command::Pause) => {
                if sender.send(TrackerEvent::Pause).is_err() {
                    return Ok(());
                }
            }
            Some(Command::Quit) => {
                info!("Quit requested");
                shutdown.cancel();
                return Ok(());
            }
            None => warn!("Unknown command {line:?}. Use enter to toggle, p to pause, q to quit"),
        }
    }
}
