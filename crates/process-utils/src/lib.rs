//! Helpers for building analysis-worker child processes.
//!
//! Workers are always launched with piped stdio so the caller can feed a JSON
//! payload on stdin and collect both output streams, and with `kill_on_drop`
//! so an abandoned handle never leaks a running interpreter.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

impl NoWindowExt for std::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.creation_flags(CREATE_NO_WINDOW);
        }
    }
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Build the command line for one worker run: `interpreter script args...`.
///
/// stdout and stderr are always piped. stdin is piped only when the caller
/// intends to write a payload, otherwise it is closed so a worker that reads
/// stdin sees EOF immediately instead of blocking.
#[cfg(feature = "tokio")]
pub fn worker_command<I, S>(
    interpreter: impl AsRef<OsStr>,
    script: &Path,
    args: I,
    pipe_stdin: bool,
) -> tokio::process::Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = tokio::process::Command::new(interpreter);
    cmd.no_window();
    cmd.arg(script)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if pipe_stdin {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .kill_on_drop(true);
    cmd
}

/// Render a command as a single line for logs.
#[cfg(feature = "tokio")]
pub fn describe(cmd: &tokio::process::Command) -> String {
    let std_cmd = cmd.as_std();
    std::iter::once(std_cmd.get_program())
        .chain(std_cmd.get_args())
        .map(|part| part.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(all(test, feature = "tokio"))]
mod tests {
    use super::*;

    #[test]
    fn worker_command_places_script_before_args() {
        let cmd = worker_command("python", Path::new("dev/velocity.py"), ["a.msgpack", "left"], false);
        assert_eq!(describe(&cmd), "python dev/velocity.py a.msgpack left");
    }

    #[test]
    fn worker_command_without_args() {
        let cmd = worker_command("sh", Path::new("run.sh"), Vec::<String>::new(), true);
        assert_eq!(describe(&cmd), "sh run.sh");
    }
}
