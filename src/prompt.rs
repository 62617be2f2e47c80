use std::io::{self, Write};

use crossterm::ExecutableCommand;
use crossterm::cursor::MoveToColumn;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{Clear, ClearType, disable_raw_mode, enable_raw_mode};

use crate::error::ProteoError;

pub trait PasswordPrompt {
    fn read_password(&self, prompt: &str) -> Result<String, ProteoError>;
}

/// Reads a password from the terminal without echoing it, then clears the
/// prompt line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

impl PasswordPrompt for TerminalPrompt {
    fn read_password(&self, prompt: &str) -> Result<String, ProteoError> {
        let mut stderr = io::stderr();
        write!(stderr, "{prompt}").map_err(|err| ProteoError::Prompt(err.to_string()))?;
        stderr
            .flush()
            .map_err(|err| ProteoError::Prompt(err.to_string()))?;

        enable_raw_mode().map_err(|err| ProteoError::Prompt(err.to_string()))?;
        let result = read_hidden_line();
        disable_raw_mode().map_err(|err| ProteoError::Prompt(err.to_string()))?;

        stderr
            .execute(Clear(ClearType::CurrentLine))
            .and_then(|stderr| stderr.execute(MoveToColumn(0)))
            .map_err(|err| ProteoError::Prompt(err.to_string()))?;
        result
    }
}

fn read_hidden_line() -> Result<String, ProteoError> {
    let mut password = String::new();
    loop {
        let event = event::read().map_err(|err| ProteoError::Prompt(err.to_string()))?;
        let Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            ..
        }) = event
        else {
            continue;
        };
        match code {
            KeyCode::Enter => return Ok(password),
            KeyCode::Backspace => {
                password.pop();
            }
            KeyCode::Esc => return Err(ProteoError::Prompt("cancelled".to_string())),
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                return Err(ProteoError::Prompt("interrupted".to_string()));
            }
            KeyCode::Char(ch) => password.push(ch),
            _ => {}
        }
    }
}

/// Used when no terminal is attached: asking for a password is an error
/// instead of a blocking read.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonInteractivePrompt;

impl PasswordPrompt for NonInteractivePrompt {
    fn read_password(&self, prompt: &str) -> Result<String, ProteoError> {
        Err(ProteoError::PasswordRequired(
            prompt.trim().trim_end_matches(':').to_string(),
        ))
    }
}
