//! Interactive prompting, behind a trait so flows can be driven by a
//! scripted double in tests.

use std::io::Write;

use anyhow::Result;

pub trait Prompter {
    /// Print `question` and read one trimmed line.
    fn ask(&mut self, question: &str) -> Result<String>;

    /// Ask with a default used when the answer is empty.
    fn ask_default(&mut self, question: &str, default: &str) -> Result<String> {
        let answer = self.ask(&format!("{question} [{default}]"))?;
        if answer.is_empty() {
            Ok(default.to_string())
        } else {
            Ok(answer)
        }
    }

    /// Yes/no question. Empty input takes the default.
    fn confirm(&mut self, question: &str, default: bool) -> Result<bool> {
        let hint = if default { "Y/n" } else { "y/N" };
        let answer = self.ask(&format!("{question} ({hint})"))?;
        Ok(match answer.to_lowercase().as_str() {
            "" => default,
            "y" | "yes" => true,
            _ => false,
        })
    }
}

pub struct StdinPrompter;

impl Prompter for StdinPrompter {
    fn ask(&mut self, question: &str) -> Result<String> {
        print!("{question}: ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}
