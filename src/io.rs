use std::io::{Cursor, Read, Result as IoResult, Write};
use std::process::Stdio;

/// Where a pipeline stage reads its input from.
#[derive(Debug)]
pub enum StageInput {
    /// The shell's own standard input.
    Inherit,
    /// Output captured from the previous stage (or nothing at all).
    Bytes(Cursor<Vec<u8>>),
}

impl StageInput {
    pub fn bytes(buf: Vec<u8>) -> Self {
        StageInput::Bytes(Cursor::new(buf))
    }

    pub fn empty() -> Self {
        Self::bytes(Vec::new())
    }

    /// Handle for a child process. Buffered input has to be written to the
    /// child's piped stdin by the caller.
    pub fn stdio(&self) -> Stdio {
        match self {
            StageInput::Inherit => Stdio::inherit(),
            StageInput::Bytes(_) => Stdio::piped(),
        }
    }
}

impl Default for StageInput {
    fn default() -> Self {
        Self::empty()
    }
}

impl Read for StageInput {
    fn read(&mut self, out: &mut [u8]) -> IoResult<usize> {
        match self {
            StageInput::Inherit => std::io::stdin().lock().read(out),
            StageInput::Bytes(cursor) => cursor.read(out),
        }
    }
}

/// Where a pipeline stage writes its stdout or stderr.
#[derive(Debug)]
pub enum StageOutput {
    /// Straight through to the terminal; `stderr` selects the stream.
    Inherit { stderr: bool },
    /// Collected in memory for the next stage or for the caller.
    Capture(Vec<u8>),
}

impl StageOutput {
    pub fn capture() -> Self {
        StageOutput::Capture(Vec::new())
    }

    pub fn inherit_stdout() -> Self {
        StageOutput::Inherit { stderr: false }
    }

    pub fn inherit_stderr() -> Self {
        StageOutput::Inherit { stderr: true }
    }

    pub fn is_captured(&self) -> bool {
        matches!(self, StageOutput::Capture(_))
    }

    pub fn stdio(&self) -> Stdio {
        match self {
            StageOutput::Inherit { .. } => Stdio::inherit(),
            StageOutput::Capture(_) => Stdio::piped(),
        }
    }

    /// Captured bytes so far; empty for inherited streams.
    pub fn take_bytes(&mut self) -> Vec<u8> {
        match self {
            StageOutput::Inherit { .. } => Vec::new(),
            StageOutput::Capture(buf) => std::mem::take(buf),
        }
    }

    /// Captured text, or `None` when the stream went to the terminal or
    /// nothing was written.
    pub fn into_text(self) -> Option<String> {
        match self {
            StageOutput::Capture(buf) if !buf.is_empty() => {
                Some(String::from_utf8_lossy(&buf).into_owned())
            }
            _ => None,
        }
    }
}

impl Write for StageOutput {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        match self {
            StageOutput::Inherit { stderr: false } => std::io::stdout().write(data),
            StageOutput::Inherit { stderr: true } => std::io::stderr().write(data),
            StageOutput::Capture(buf) => {
                buf.extend_from_slice(data);
                Ok(data.len())
            }
        }
    }

    fn flush(&mut self) -> IoResult<()> {
        match self {
            StageOutput::Inherit { stderr: false } => std::io::stdout().flush(),
            StageOutput::Inherit { stderr: true } => std::io::stderr().flush(),
            StageOutput::Capture(_) => Ok(()),
        }
    }
}
