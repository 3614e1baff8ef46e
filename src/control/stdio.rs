//! Stdio I/O for the control plane.
//!
//! - **stdout**: control events, one JSON object per line
//! - **stderr**: logs (never parsed by the wrapper)
//! - **Never use `println!`**: It may add `\r\n` on Windows

use std::io::Write;

use serde::Serialize;

use crate::error::Result;

/// Serialize `value` as one `\n`-terminated JSON line into `writer` and flush.
pub fn write_json_line<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer(&mut *writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Write a line to stdout and flush.
///
/// Uses an explicit `\n` rather than `println!`, and holds the stdout lock
/// for the whole line so concurrent writers never interleave.
pub fn write_stdout_line(line: &str) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    handle.write_all(line.as_bytes())?;
    handle.write_all(b"\n")?;
    handle.flush()
}

/// Write a JSON value to stdout as a single line.
///
/// # Errors
///
/// Returns `Json` if serialization fails and `Io` if the write fails.
pub fn write_stdout_json<T: Serialize>(value: &T) -> Result<()> {
    write_json_line(&mut std::io::stdout().lock(), value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlEvent;
    use crate::transport::ConnectionState;

    #[test]
    fn test_json_lines_are_newline_terminated() {
        let mut out = Vec::new();
        for state in [ConnectionState::Connecting, ConnectionState::Connected] {
            write_json_line(&mut out, &ControlEvent::Status { state }).unwrap();
        }

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"event":"status","state":"connecting"}"#);
        assert_eq!(lines[1], r#"{"event":"status","state":"connected"}"#);
        assert!(!text.contains('\r'));
    }

    #[test]
    fn test_write_stdout_json_succeeds() {
        // stdout is not captured here; only check the call succeeds.
        let event = ControlEvent::Status {
            state: ConnectionState::Idle,
        };
        assert!(write_stdout_json(&event).is_ok());
        assert!(write_stdout_line("").is_ok());
    }
}
