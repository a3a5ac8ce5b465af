//! Full-screen redraw shared by the client and the server console.

use std::io::{self, Write};

use crossterm::{
    cursor::MoveTo,
    queue,
    terminal::{Clear, ClearType},
};

/// Prompt drawn below every screen.
pub const PROMPT: &str = "LP Bank> ";

/// Clear screen and scrollback, write `lines`, then the prompt.
pub fn draw<W: Write>(out: &mut W, lines: &[String]) -> io::Result<()> {
    queue!(out, Clear(ClearType::Purge), Clear(ClearType::All), MoveTo(0, 0))?;
    for line in lines {
        out.write_all(line.as_bytes())?;
        out.write_all(b"\n")?;
    }
    out.write_all(PROMPT.as_bytes())?;
    out.flush()
}
