//! Screen output.

use std::io::Write;

pub use lpbank_proto::screen::PROMPT;

/// Redraws the whole screen on every update.
#[derive(Debug)]
pub struct Terminal<W> {
    out: W,
}

impl<W: Write> Terminal<W> {
    /// Wrap an output stream, usually stdout.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Clear screen and scrollback, write `lines`, then the prompt.
    pub fn render(&mut self, lines: &[String]) -> std::io::Result<()> {
        lpbank_proto::screen::draw(&mut self.out, lines)
    }

    /// Give back the output stream.
    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_clears_before_drawing() {
        let mut term = Terminal::new(Vec::new());
        term.render(&["hello".to_string()]).expect("render");

        let text = String::from_utf8(term.into_inner()).expect("utf8");
        assert!(text.starts_with("\u{1b}[3J\u{1b}[2J"));
        assert!(text.ends_with("hello\nLP Bank> "));
    }

    #[test]
    fn each_render_redraws_from_scratch() {
        let mut term = Terminal::new(Vec::new());
        term.render(&["one".to_string()]).expect("render");
        term.render(&["two".to_string()]).expect("render");

        let text = String::from_utf8(term.into_inner()).expect("utf8");
        assert_eq!(text.matches(PROMPT).count(), 2);
        assert_eq!(text.matches("\u{1b}[2J").count(), 2);
    }
}
