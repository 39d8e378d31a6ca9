//! User-facing output, behind a trait so flows can be tested without a
//! terminal.

use owo_colors::OwoColorize;

pub trait Ui {
    fn success(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
    fn info(&self, message: &str);
    /// Plain line with no glyph (tables, blank spacers).
    fn plain(&self, message: &str);
}

pub struct ConsoleUi;

impl Ui for ConsoleUi {
    fn success(&self, message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    fn warn(&self, message: &str) {
        println!("{} {}", "!".yellow(), message);
    }

    fn error(&self, message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    fn info(&self, message: &str) {
        println!("{} {}", "i".cyan(), message.dimmed());
    }

    fn plain(&self, message: &str) {
        println!("{message}");
    }
}

#[cfg(test)]
pub mod testing {
    use super::Ui;
    use std::sync::Mutex;

    /// Captures output lines for assertions.
    #[derive(Default)]
    pub struct CaptureUi {
        pub lines: Mutex<Vec<String>>,
    }

    impl CaptureUi {
        pub fn contains(&self, needle: &str) -> bool {
            self.lines.lock().unwrap().iter().any(|l| l.contains(needle))
        }
    }

    impl Ui for CaptureUi {
        fn success(&self, message: &str) {
            self.lines.lock().unwrap().push(format!("ok: {message}"));
        }
        fn warn(&self, message: &str) {
            self.lines.lock().unwrap().push(format!("warn: {message}"));
        }
        fn error(&self, message: &str) {
            self.lines.lock().unwrap().push(format!("error: {message}"));
        }
        fn info(&self, message: &str) {
            self.lines.lock().unwrap().push(format!("info: {message}"));
        }
        fn plain(&self, message: &str) {
            self.lines.lock().unwrap().push(message.to_string());
        }
    }
}
