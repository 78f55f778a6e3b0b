use crate::types::Payload;
use anyhow::{Context, Result};
use std::io::Write;

/// Writes payloads to a single sink, one JSON document per line (or
/// pretty-printed when constructed with [`PayloadWriter::pretty`]).
pub struct PayloadWriter<W: Write> {
    writer: W,
    pretty: bool,
}

impl<W: Write> PayloadWriter<W> {
    pub fn new(writer: W) -> Self {
        PayloadWriter {
            writer,
            pretty: false,
        }
    }

    /// Pretty-print each payload instead of emitting compact lines.
    pub fn pretty(writer: W) -> Self {
        PayloadWriter {
            writer,
            pretty: true,
        }
    }

    pub fn write_payload(&mut self, payload: &Payload) -> Result<()> {
        let json = if self.pretty {
            serde_json::to_string_pretty(payload)
        } else {
            serde_json::to_string(payload)
        }
        .context("Failed to serialize payload")?;

        writeln!(self.writer, "{}", json).context("Failed to write payload")?;
        Ok(())
    }

    /// Flush the underlying sink
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush writer")
    }
}
