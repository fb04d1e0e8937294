//! Console I/O
//!
//! All user-facing output goes through [`Console`]: stdout for results,
//! stderr for status and prompts, stdin for answers. Tests and the scenario
//! runner build captured consoles with scripted input.

use crate::error::{CliError, Result};
use crate::progress::ProgressEvent;
use crate::scenario::capture::SessionCapturer;
use std::io::{self, BufRead, BufReader, IsTerminal, Write};
use std::sync::{Arc, Mutex, MutexGuard};

/// Number of invalid answers tolerated by a menu prompt
const MAX_CHOICE_ATTEMPTS: usize = 3;

/// A clonable in-memory writer
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().map(|b| b.clone()).unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .map_err(|_| io::Error::other("buffer poisoned"))?
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Handles to the output of a captured console
#[derive(Clone)]
pub struct CapturedOutput {
    pub stdout: SharedBuffer,
    pub stderr: SharedBuffer,
}

struct Inner {
    out: Box<dyn Write + Send>,
    err: Box<dyn Write + Send>,
    input: Box<dyn BufRead + Send>,
    interactive: bool,
    stdout_is_terminal: bool,
    capturer: Option<SessionCapturer>,
    progress: Vec<ProgressEvent>,
}

#[derive(Clone)]
pub struct Console {
    inner: Arc<Mutex<Inner>>,
}

impl Console {
    /// Console bound to the process streams
    pub fn stdio() -> Self {
        let interactive = io::stdin().is_terminal() && io::stderr().is_terminal();
        Self::from_parts(
            Box::new(io::stdout()),
            Box::new(io::stderr()),
            Box::new(BufReader::new(io::stdin())),
            interactive,
            io::stdout().is_terminal(),
        )
    }

    /// Console writing to memory, answering prompts from `input` lines
    pub fn captured(input: &[String], interactive: bool) -> (Self, CapturedOutput) {
        let stdout = SharedBuffer::default();
        let stderr = SharedBuffer::default();
        let mut script = input.join("\n");
        if !input.is_empty() {
            script.push('\n');
        }
        let console = Self::from_parts(
            Box::new(stdout.clone()),
            Box::new(stderr.clone()),
            Box::new(io::Cursor::new(script.into_bytes())),
            interactive,
            false,
        );
        (console, CapturedOutput { stdout, stderr })
    }

    fn from_parts(
        out: Box<dyn Write + Send>,
        err: Box<dyn Write + Send>,
        input: Box<dyn BufRead + Send>,
        interactive: bool,
        stdout_is_terminal: bool,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                out,
                err,
                input,
                interactive,
                stdout_is_terminal,
                capturer: None,
                progress: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves the streams usable
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_capturer(&self, capturer: SessionCapturer) {
        self.lock().capturer = Some(capturer);
    }

    pub fn capturer(&self) -> Option<SessionCapturer> {
        self.lock().capturer.clone()
    }

    pub fn is_interactive(&self) -> bool {
        self.lock().interactive
    }

    pub fn stdout_is_terminal(&self) -> bool {
        self.lock().stdout_is_terminal
    }

    /// Write command output, also recorded by the session capturer
    pub fn write_out(&self, text: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.out.write_all(text.as_bytes())?;
        if let Some(capturer) = &inner.capturer {
            capturer.record_stdout(text);
        }
        Ok(())
    }

    /// Write command output that must never be persisted to disk
    pub fn write_out_private(&self, text: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.out.write_all(text.as_bytes())?;
        Ok(())
    }

    pub fn write_err(&self, text: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.err.write_all(text.as_bytes())?;
        if let Some(capturer) = &inner.capturer {
            capturer.record_stderr(text);
        }
        Ok(())
    }

    /// One status line on stderr
    pub fn status(&self, line: &str) {
        if let Err(e) = self.write_err(&format!("{line}\n")) {
            tracing::warn!("Failed to write status: {}", e);
        }
    }

    pub fn flush(&self) {
        let mut inner = self.lock();
        let _ = inner.out.flush();
        let _ = inner.err.flush();
    }

    fn read_line(&self) -> Result<Option<String>> {
        let mut inner = self.lock();
        let mut line = String::new();
        let read = inner.input.read_line(&mut line)?;
        if read == 0 {
            return Ok(None);
        }
        let answer = line.trim_end_matches(['\r', '\n']).to_string();
        if let Some(capturer) = &inner.capturer {
            capturer.record_user_input(&answer);
        }
        Ok(Some(answer))
    }

    /// Ask a yes/no question on stderr; EOF and empty answers take `default`
    pub fn prompt_continue(
        &self,
        message: Option<&str>,
        prompt: &str,
        default: bool,
    ) -> Result<bool> {
        if let Some(message) = message {
            self.write_err(&format!("{message}\n\n"))?;
        }
        let suffix = if default { "(Y/n)" } else { "(y/N)" };
        loop {
            self.write_err(&format!("{prompt}? {suffix}?  "))?;
            self.flush();
            let Some(answer) = self.read_line()? else {
                self.write_err("\n")?;
                return Ok(default);
            };
            match answer.trim().to_lowercase().as_str() {
                "" => return Ok(default),
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => self.write_err("Please enter 'y' or 'n':  \n")?,
            }
        }
    }

    /// Present a numbered menu; returns the chosen index
    pub fn prompt_choice(
        &self,
        message: &str,
        options: &[String],
        default: Option<usize>,
    ) -> Result<usize> {
        if options.is_empty() {
            return Err(CliError::Internal("No options to choose from".into()));
        }
        let mut menu = format!("{message}\n");
        for (i, option) in options.iter().enumerate() {
            menu.push_str(&format!(" [{}] {}\n", i + 1, option));
        }
        self.write_err(&menu)?;

        for _ in 0..MAX_CHOICE_ATTEMPTS {
            match default {
                Some(d) => self.write_err(&format!(
                    "Please enter your numeric choice ({}):  ",
                    d + 1
                ))?,
                None => self.write_err("Please enter your numeric choice:  ")?,
            }
            self.flush();
            let Some(answer) = self.read_line()? else {
                self.write_err("\n")?;
                return default.ok_or_else(|| {
                    CliError::Cancelled("No choice was made.".to_string())
                });
            };
            let answer = answer.trim();
            if answer.is_empty() {
                if let Some(d) = default {
                    return Ok(d);
                }
            }
            match answer.parse::<usize>() {
                Ok(n) if (1..=options.len()).contains(&n) => return Ok(n - 1),
                _ => self.write_err(&format!(
                    "Please enter a value between 1 and {}:\n",
                    options.len()
                ))?,
            }
        }
        Err(CliError::Cancelled("Too many invalid choices.".to_string()))
    }

    pub fn record_progress(&self, event: ProgressEvent) {
        let mut inner = self.lock();
        if let Some(capturer) = &inner.capturer {
            capturer.record_progress(&event);
        }
        inner.progress.push(event);
    }

    pub fn progress_events(&self) -> Vec<ProgressEvent> {
        self.lock().progress.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captured_output() {
        let (console, captured) = Console::captured(&[], false);
        console.write_out("hello\n").unwrap();
        console.status("working");
        assert_eq!(captured.stdout.contents(), "hello\n");
        assert_eq!(captured.stderr.contents(), "working\n");
    }

    #[test]
    fn test_prompt_continue_answers() {
        let (console, captured) = Console::captured(&["y".to_string()], true);
        assert!(console.prompt_continue(None, "Enable API", false).unwrap());
        assert!(captured.stderr.contents().contains("Enable API? (y/N)?"));

        let (console, _) = Console::captured(&[], true);
        assert!(console.prompt_continue(None, "Continue", true).unwrap());
    }

    #[test]
    fn test_prompt_choice_retries_invalid_input() {
        let input = vec!["9".to_string(), "2".to_string()];
        let (console, captured) = Console::captured(&input, true);
        let options = vec!["a".to_string(), "b".to_string()];
        assert_eq!(console.prompt_choice("Pick", &options, None).unwrap(), 1);
        assert!(captured.stderr.contents().contains(" [2] b"));
        assert!(captured
            .stderr
            .contents()
            .contains("Please enter a value between 1 and 2"));
    }

    #[test]
    fn test_prompt_choice_default_on_empty() {
        let (console, _) = Console::captured(&[String::new()], true);
        let options = vec!["a".to_string(), "b".to_string()];
        assert_eq!(console.prompt_choice("Pick", &options, Some(0)).unwrap(), 0);
    }
}
