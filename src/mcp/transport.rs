use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, trace};

use super::protocol::{JsonRpcResponse, PARSE_ERROR};

const READ_CHUNK: usize = 8 * 1024;

pub trait Handler: Send + Sync {
    /// Handle one raw protocol line. Always yields exactly one response.
    async fn handle_line(&self, line: &str) -> JsonRpcResponse;
}

/// Accumulates bytes from the input stream and splits them into lines.
///
/// Partial lines stay buffered until their `\n` arrives. Blank lines are
/// dropped and a trailing `\r` is stripped.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
    /// Prefix of `buf` already known to hold no `\n`
    scanned: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and drain every complete line now present, in order.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = self.buf[from..].iter().position(|&b| b == b'\n') {
            let end = from + offset;
            if let Some(line) = normalize(self.buf[start..end].to_vec()) {
                lines.push(line);
            }
            start = end + 1;
            from = start;
        }

        self.buf.drain(..start);
        self.scanned = self.buf.len();
        lines
    }

    /// Take whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        self.scanned = 0;
        normalize(std::mem::take(&mut self.buf))
    }

    /// Bytes waiting for a newline
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

fn normalize(mut line: Vec<u8>) -> Option<Vec<u8>> {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    if line.iter().all(|b| b.is_ascii_whitespace()) {
        None
    } else {
        Some(line)
    }
}

/// Run the server over stdio transport
///
/// Reads newline-delimited JSON from stdin, writes to stdout.
/// All logging/tracing goes to stderr only.
pub async fn run_stdio<H: Handler>(handler: &H) -> Result<()> {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    serve(handler, stdin, stdout).await
}

/// Serve the line protocol over any byte stream pair.
///
/// Each line is handled and its response written and flushed before the next
/// line is looked at, so responses leave in request order.
pub async fn serve<H, R, W>(handler: &H, mut reader: R, mut writer: W) -> Result<()>
where
    H: Handler,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = LineBuffer::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    debug!("Server started, listening for requests");

    loop {
        let n = reader
            .read(&mut chunk)
            .await
            .context("Failed to read from input stream")?;
        if n == 0 {
            break;
        }

        for line in buffer.feed(&chunk[..n]) {
            process_line(handler, &mut writer, &line).await?;
        }
    }

    if let Some(line) = buffer.finish() {
        process_line(handler, &mut writer, &line).await?;
    }

    debug!("Input closed, shutting down");
    Ok(())
}

async fn process_line<H, W>(handler: &H, writer: &mut W, line: &[u8]) -> Result<()>
where
    H: Handler,
    W: AsyncWrite + Unpin,
{
    let response = match std::str::from_utf8(line) {
        Ok(text) => {
            trace!("Received line: {}", text);
            handler.handle_line(text).await
        }
        Err(e) => {
            error!("Request is not valid UTF-8: {}", e);
            JsonRpcResponse::error(None, PARSE_ERROR, format!("Parse error: {}", e))
        }
    };

    write_response(writer, &response).await
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &JsonRpcResponse,
) -> Result<()> {
    let json = serde_json::to_string(response)?;
    trace!("Sending response: {}", json);

    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;

    Ok(())
}
