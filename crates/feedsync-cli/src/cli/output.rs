use std::collections::HashSet;
use std::io::Write;

use anyhow::Result;
use feedsync_core::feed::PageKind;
use feedsync_core::models::{GroupOption, MessageKey};
use feedsync_core::{BufferChange, ConnectionState, FeedEvent, Message};
use serde::Serialize;

/// One line of command output.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Record<'a> {
    Message(&'a Message),
    Group(&'a GroupOption),
    Connection {
        state: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<&'a str>,
    },
    FetchFailed {
        page: &'static str,
        error: &'a str,
    },
}

/// Writes records as JSON, one per line unless pretty-printing.
pub struct Printer<W: Write> {
    out: W,
    pretty: bool,
}

impl Printer<std::io::Stdout> {
    pub fn stdout(pretty: bool) -> Self {
        Self::new(std::io::stdout(), pretty)
    }
}

impl<W: Write> Printer<W> {
    pub fn new(out: W, pretty: bool) -> Self {
        Self { out, pretty }
    }

    pub fn emit(&mut self, record: &Record<'_>) -> Result<()> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut self.out, record)?;
        } else {
            serde_json::to_writer(&mut self.out, record)?;
        }
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Prints each buffered message once, in buffer order, as feed events arrive.
pub struct FeedPrinter<W: Write> {
    printer: Printer<W>,
    printed: HashSet<MessageKey>,
}

impl<W: Write> FeedPrinter<W> {
    pub fn new(printer: Printer<W>) -> Self {
        Self {
            printer,
            printed: HashSet::new(),
        }
    }

    pub fn on_event(&mut self, event: &FeedEvent, buffer: &[Message]) -> Result<()> {
        match event {
            FeedEvent::BufferChanged(BufferChange::Cleared) => self.printed.clear(),
            FeedEvent::BufferChanged(_) => {
                for message in buffer {
                    if self.printed.insert(message.key()) {
                        self.printer.emit(&Record::Message(message))?;
                    }
                }
            }
            FeedEvent::ConnectionChanged { state, reason } => {
                self.printer.emit(&Record::Connection {
                    state: state.to_string(),
                    reason: reason.as_deref(),
                })?;
            }
            FeedEvent::FetchFailed { kind, error } => {
                self.printer.emit(&Record::FetchFailed {
                    page: match kind {
                        PageKind::First => "first",
                        PageKind::Older => "older",
                    },
                    error,
                })?;
            }
            FeedEvent::Ignored => {}
        }
        Ok(())
    }

    pub fn printed(&self) -> usize {
        self.printed.len()
    }

    pub fn into_printer(self) -> Printer<W> {
        self.printer
    }
}

/// Pretty connection state for the stderr status line.
pub fn describe_connection(state: ConnectionState, reason: Option<&str>) -> String {
    match reason {
        Some(reason) => format!("{} ({})", state, reason),
        None => state.to_string(),
    }
}
