//! Operator console on the server's own terminal.
//!
//! Reads commands from stdin and redraws the screen. End of input ends the
//! console, which the binary treats as a shutdown request.

use std::io::Write;

pub use lpbank_proto::screen::PROMPT;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::{BankHandle, ServerError};

const HELP: [&str; 3] =
    ["Commands:", "  status   show tellers, waiting and served customers", "  help     show this help"];

/// Run the console until stdin closes.
///
/// # Errors
///
/// Returns a transport error if stdin or stdout fail.
pub async fn run(bank: BankHandle) -> Result<(), ServerError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    render(&mut std::io::stdout(), &help())?;

    while let Some(line) = lines.next_line().await? {
        let screen = match line.trim() {
            "" => continue,
            "status" => bank.summary().await?,
            "help" => help(),
            other => {
                let mut screen = vec![format!("unknown command: {other}")];
                screen.extend(help());
                screen
            },
        };
        render(&mut std::io::stdout(), &screen)?;
    }

    Ok(())
}

fn help() -> Vec<String> {
    HELP.iter().map(|line| (*line).to_string()).collect()
}

/// Clear the terminal, draw `lines`, then the prompt.
pub fn render<W: Write>(out: &mut W, lines: &[String]) -> Result<(), ServerError> {
    Ok(lpbank_proto::screen::draw(out, lines)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_draws_console_screen() {
        let mut out = Vec::new();
        render(&mut out, &help()).expect("render");

        let text = String::from_utf8(out).expect("utf8");
        assert!(text.contains("Commands:\n"));
        assert!(text.ends_with(&format!("show this help\n{PROMPT}")));
    }
}
