//! Process-tree termination.

use std::process::Command;

/// Put the child in its own process group so the whole tree can be killed.
pub(crate) fn isolate_process_group(command: &mut Command) {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    #[cfg(not(unix))]
    {
        let _ = command;
    }
}

/// Kill `pid` and every process it spawned. Best-effort: never fails and
/// never panics, all errors are swallowed.
///
/// On unix only the process group is signalled. `pid` must have been
/// started through [`isolate_process_group`], so the group id equals the
/// pid and stays valid while any member is alive; the bare pid may already
/// be reaped and reused.
pub fn kill_process_tree(pid: u32) {
    tracing::debug!("Killing process tree rooted at {}", pid);

    #[cfg(unix)]
    {
        let Ok(pid) = libc::pid_t::try_from(pid) else {
            return;
        };
        // SAFETY: kill(2) has no memory-safety preconditions; an empty
        // group only yields ESRCH, which we ignore.
        unsafe {
            libc::kill(-pid, libc::SIGKILL);
        }
    }

    #[cfg(windows)]
    {
        let _ = Command::new("taskkill")
            .args(["/T", "/F", "/PID", &pid.to_string()])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::time::{Duration, Instant};

    #[test]
    fn test_group_kill_reaches_grandchildren() {
        let mut command = Command::new("sh");
        command.args(["-c", "sleep 30 & wait"]);
        isolate_process_group(&mut command);
        let mut child = command.spawn().unwrap();

        std::thread::sleep(Duration::from_millis(100));
        let started = Instant::now();
        kill_process_tree(child.id());
        let status = child.wait().unwrap();

        assert_eq!(status.signal(), Some(libc::SIGKILL));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
