//! LP Bank terminal client.
//!
//! One binary serves both roles. The client joins by sending an empty
//! envelope typed with its role, then forwards every non-empty input line
//! and redraws the screen whenever the bank sends something.
//!
//! ```text
//! stdin ─► sanitize ─► encode ─► socket
//! socket ─► Framer ─► ChatView ─► Terminal::render
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod terminal;
mod view;

pub use error::ClientError;
use lpbank_proto::{Envelope, Framer, Origin, encode, sanitize};
pub use terminal::{PROMPT, Terminal};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
pub use view::{ChatView, HISTORY_LIMIT};

const READ_BUFFER_SIZE: usize = 4096;

const SERVER_CLOSED: &str = "[ DISCONNECTED FROM THE BANK ]";

/// Why a session finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Local input reached end of file.
    InputClosed,
    /// The server closed the connection.
    ServerClosed,
}

/// Run one session until input closes or the server hangs up.
///
/// `stream` is the connection to the bank, `input` the line source, and
/// `terminal` where each updated screen is drawn.
pub async fn run_session<S, R, W>(
    stream: S,
    role: Origin,
    input: R,
    terminal: &mut Terminal<W>,
) -> Result<SessionEnd, ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: AsyncBufRead + Unpin,
    W: std::io::Write,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut lines = input.lines();
    let mut framer = Framer::new();
    let mut view = ChatView::new(role);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    writer.write_all(&encode(&Envelope::new(role, ""))?).await?;
    terminal.render(&view.lines())?;

    let end = loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break SessionEnd::InputClosed;
                };
                let line = line.trim();
                if !line.is_empty() {
                    let frame = encode(&Envelope::new(role, sanitize(line)))?;
                    writer.write_all(&frame).await?;
                }
                terminal.render(&view.lines())?;
            },
            read = reader.read(&mut buf) => {
                let n = read?;
                if n == 0 {
                    view.push_notice(SERVER_CLOSED);
                    terminal.render(&view.lines())?;
                    break SessionEnd::ServerClosed;
                }
                for envelope in framer.feed(&buf[..n]) {
                    tracing::debug!(origin = %envelope.origin, "message received");
                    view.push(&envelope);
                }
                terminal.render(&view.lines())?;
            },
        }
    };

    // The peer may already be gone.
    let _ = writer.shutdown().await;
    Ok(end)
}
