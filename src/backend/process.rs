//! Adapters that spawn an external converter executable.
//!
//! Every invocation runs in a private temporary directory created next to the
//! destination. The converter writes `<source stem>.pdf` there, and the file
//! is renamed onto the destination afterwards. The directory is removed on
//! drop, so a killed or failed converter never leaves anything behind.
//!
//! On unix the converter runs in its own process group. When the attempt
//! ends, whether by exit, timeout or the attempt future being dropped, the
//! whole group is sent `SIGKILL`, so helpers such as LibreOffice's
//! `soffice.bin` cannot outlive it. The direct child is also marked
//! `kill_on_drop`. A run that exceeds its time budget is reported as
//! [`AttemptError::TimedOut`].

use super::{Availability, BackendAdapter};
use crate::error::AttemptError;
use crate::format::Format;
use async_trait::async_trait;
use exe_locator::ExecutableLocator;
use once_cell::sync::OnceCell;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Upper bound on the stderr text kept in an error message.
const STDERR_TAIL: usize = 400;

/// How the command line is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandShape {
    /// `<exe> --headless --convert-to pdf --outdir <dir> <input>`.
    ///
    /// With `isolated_profile`, a throwaway user profile inside the work
    /// directory is passed first so concurrent instances do not contend for
    /// the shared one.
    OfficeSuite { isolated_profile: bool },
    /// `<exe> <input> -o <output>`.
    OutputFlag,
    /// Arbitrary arguments with `{input}`, `{output}` and `{outdir}`
    /// placeholders substituted.
    Template(Vec<String>),
}

/// A converter run as a child process.
pub struct ExternalProcessAdapter {
    name: String,
    executable: String,
    formats: Vec<Format>,
    shape: CommandShape,
    timeout: Duration,
    locator: Arc<dyn ExecutableLocator>,
    resolved: OnceCell<Option<PathBuf>>,
}

impl ExternalProcessAdapter {
    pub fn new(
        name: impl Into<String>,
        executable: impl Into<String>,
        formats: impl Into<Vec<Format>>,
        shape: CommandShape,
        timeout: Duration,
        locator: Arc<dyn ExecutableLocator>,
    ) -> Self {
        Self {
            name: name.into(),
            executable: executable.into(),
            formats: formats.into(),
            shape,
            timeout,
            locator,
            resolved: OnceCell::new(),
        }
    }

    /// Headless LibreOffice, for every format.
    pub fn libreoffice(
        locator: Arc<dyn ExecutableLocator>,
        timeout: Duration,
        isolated_profile: bool,
    ) -> Self {
        Self::new(
            "libreoffice",
            "libreoffice",
            Format::ALL.to_vec(),
            CommandShape::OfficeSuite { isolated_profile },
            timeout,
            locator,
        )
    }

    /// Pandoc, for word-processor and presentation sources.
    pub fn pandoc(locator: Arc<dyn ExecutableLocator>, timeout: Duration) -> Self {
        Self::new(
            "pandoc",
            "pandoc",
            vec![Format::WordDoc, Format::Presentation],
            CommandShape::OutputFlag,
            timeout,
            locator,
        )
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn resolved_path(&self) -> Option<&PathBuf> {
        self.resolved
            .get_or_init(|| self.locator.find(&self.executable))
            .as_ref()
    }

    fn arguments(&self, source: &Path, output: &Path, workdir: &Path) -> Vec<OsString> {
        match &self.shape {
            CommandShape::OfficeSuite { isolated_profile } => {
                let mut args = Vec::new();
                if *isolated_profile {
                    let mut env = OsString::from("-env:UserInstallation=");
                    env.push(file_url(&workdir.join("profile")));
                    args.push(env);
                }
                args.extend(
                    ["--headless", "--convert-to", "pdf", "--outdir"]
                        .into_iter()
                        .map(OsString::from),
                );
                args.push(workdir.as_os_str().to_owned());
                args.push(source.as_os_str().to_owned());
                args
            }
            CommandShape::OutputFlag => vec![
                source.as_os_str().to_owned(),
                OsString::from("-o"),
                output.as_os_str().to_owned(),
            ],
            CommandShape::Template(template) => template
                .iter()
                .map(|arg| substitute(arg, source, output, workdir))
                .collect(),
        }
    }
}

/// Replace the placeholders in one template argument.
fn substitute(arg: &str, input: &Path, output: &Path, outdir: &Path) -> OsString {
    let whole = match arg {
        "{input}" => Some(input),
        "{output}" => Some(output),
        "{outdir}" => Some(outdir),
        _ => None,
    };
    if let Some(path) = whole {
        return path.as_os_str().to_owned();
    }
    OsString::from(
        arg.replace("{input}", &input.to_string_lossy())
            .replace("{output}", &output.to_string_lossy())
            .replace("{outdir}", &outdir.to_string_lossy()),
    )
}

fn file_url(path: &Path) -> OsString {
    let text = path.to_string_lossy().replace('\\', "/");
    let prefix = if text.starts_with('/') { "file://" } else { "file:///" };
    OsString::from(format!("{prefix}{text}"))
}

/// `<stem>.pdf`, keeping inner dots of the stem.
fn produced_name(source: &Path) -> OsString {
    let mut name = source
        .file_stem()
        .map(OsStr::to_os_string)
        .unwrap_or_else(|| OsString::from("output"));
    name.push(".pdf");
    name
}

fn tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let count = text.chars().count();
    if count <= STDERR_TAIL {
        return text.to_string();
    }
    text.chars().skip(count - STDERR_TAIL).collect()
}

/// Sends `SIGKILL` to a converter's process group, once explicitly and again
/// on drop.
#[cfg_attr(not(unix), allow(dead_code))]
struct GroupReaper {
    pgid: Option<u32>,
}

impl GroupReaper {
    fn kill(&self) {
        #[cfg(unix)]
        if let Some(pgid) = self.pgid.and_then(|p| i32::try_from(p).ok()) {
            use nix::errno::Errno;
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => warn!(pgid, error = %e, "Could not kill converter process group"),
            }
        }
    }
}

impl Drop for GroupReaper {
    fn drop(&mut self) {
        self.kill();
    }
}

#[async_trait]
impl BackendAdapter for ExternalProcessAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn formats(&self) -> &[Format] {
        &self.formats
    }

    fn probe(&self) -> Availability {
        match self.resolved_path() {
            Some(_) => Availability::Available,
            None => Availability::Unavailable(format!(
                "'{}' not found on PATH or in known install locations",
                self.executable
            )),
        }
    }

    async fn invoke(&self, source: &Path, destination: &Path) -> Result<(), AttemptError> {
        let Some(exe) = self.resolved_path() else {
            return Err(AttemptError::unavailable(format!(
                "'{}' is not installed",
                self.executable
            )));
        };
        let parent = destination
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let workdir = tempfile::Builder::new()
            .prefix(".office2pdf-work-")
            .tempdir_in(parent)?;
        let produced = workdir.path().join(produced_name(source));
        let args = self.arguments(source, &produced, workdir.path());

        debug!(adapter = %self.name, exe = %exe.display(), ?args, "Spawning converter");
        let mut command = Command::new(exe);
        command
            .args(&args)
            .current_dir(workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        let mut child = command
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    AttemptError::unavailable(format!("{} vanished: {e}", exe.display()))
                } else {
                    AttemptError::failed(format!("failed to spawn {}: {e}", exe.display()))
                }
            })?;
        let group = GroupReaper { pgid: child.id() };

        // Drained concurrently so a chatty converter cannot block on a full pipe.
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                buf
            })
        });

        let waited = timeout(self.timeout, child.wait()).await;
        let status = match waited {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                group.kill();
                let _ = child.kill().await;
                if let Some(reader) = stderr_reader {
                    reader.abort();
                }
                return Err(AttemptError::timed_out(self.timeout));
            }
        };
        // Stragglers would hold the stderr pipe and the office profile lock.
        group.kill();

        let stderr = match stderr_reader {
            // A grandchild may still hold the pipe open; don't wait on it forever.
            Some(reader) => match timeout(Duration::from_secs(2), reader).await {
                Ok(Ok(buf)) => buf,
                _ => Vec::new(),
            },
            None => Vec::new(),
        };

        if !status.success() {
            let detail = tail(&stderr);
            return Err(AttemptError::failed(if detail.is_empty() {
                format!("{} exited with {status}", self.name)
            } else {
                format!("{} exited with {status}: {detail}", self.name)
            }));
        }

        match tokio::fs::rename(&produced, destination).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Exit code 0 with no output; the orchestrator's validation
                // reports it.
                debug!(adapter = %self.name, expected = %produced.display(), "Converter produced no file");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exe_locator::FixedLocator;

    fn adapter(shape: CommandShape, locator: FixedLocator) -> ExternalProcessAdapter {
        ExternalProcessAdapter::new(
            "tool",
            "tool",
            vec![Format::WordDoc],
            shape,
            Duration::from_secs(5),
            Arc::new(locator),
        )
    }

    #[test]
    fn probe_reports_missing_executable() {
        let a = adapter(CommandShape::OutputFlag, FixedLocator::new());
        assert!(matches!(a.probe(), Availability::Unavailable(_)));
    }

    #[test]
    fn probe_reports_present_executable() {
        let a = adapter(
            CommandShape::OutputFlag,
            FixedLocator::new().with("tool", "/usr/bin/tool"),
        );
        assert_eq!(a.probe(), Availability::Available);
    }

    #[test]
    fn office_suite_arguments() {
        let a = adapter(
            CommandShape::OfficeSuite {
                isolated_profile: false,
            },
            FixedLocator::new(),
        );
        let args = a.arguments(
            Path::new("/in/a.docx"),
            Path::new("/w/a.pdf"),
            Path::new("/w"),
        );
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            ["--headless", "--convert-to", "pdf", "--outdir", "/w", "/in/a.docx"]
        );
    }

    #[test]
    fn isolated_profile_comes_first() {
        let a = adapter(
            CommandShape::OfficeSuite {
                isolated_profile: true,
            },
            FixedLocator::new(),
        );
        let args = a.arguments(Path::new("/in/a.docx"), Path::new("/w/a.pdf"), Path::new("/w"));
        assert_eq!(
            args[0].to_string_lossy(),
            "-env:UserInstallation=file:///w/profile"
        );
    }

    #[test]
    fn template_substitutes_placeholders() {
        let a = adapter(
            CommandShape::Template(vec![
                "--from={input}".into(),
                "{output}".into(),
                "{outdir}".into(),
            ]),
            FixedLocator::new(),
        );
        let args = a.arguments(Path::new("/in/a.rtf"), Path::new("/w/a.pdf"), Path::new("/w"));
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, ["--from=/in/a.rtf", "/w/a.pdf", "/w"]);
    }

    #[test]
    fn produced_name_keeps_inner_dots() {
        assert_eq!(produced_name(Path::new("/in/q3.final.pptx")), "q3.final.pdf");
    }

    #[test]
    fn stderr_tail_is_bounded() {
        let long = "x".repeat(1000);
        assert_eq!(tail(long.as_bytes()).len(), STDERR_TAIL);
        assert_eq!(tail(b"  short\n"), "short");
    }

    #[tokio::test]
    async fn missing_executable_is_unavailable_on_invoke() {
        let dir = tempfile::tempdir().unwrap();
        let a = adapter(CommandShape::OutputFlag, FixedLocator::new());
        let err = a
            .invoke(&dir.path().join("a.docx"), &dir.path().join("a.pdf"))
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shell_converter_output_is_moved_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("memo.docx");
        std::fs::write(&src, b"source").unwrap();
        let dest = dir.path().join("out").join("memo.pdf");
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();

        let a = adapter(
            CommandShape::Template(vec![
                "-c".into(),
                "printf '%%PDF-1.4 fake' > \"$1\"".into(),
                "sh".into(),
                "{output}".into(),
            ]),
            FixedLocator::new().with("tool", "/bin/sh"),
        );
        a.invoke(&src, &dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"%PDF-1.4 fake");
        // Work directory is gone.
        assert_eq!(std::fs::read_dir(dest.parent().unwrap()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let a = adapter(
            CommandShape::Template(vec!["-c".into(), "echo 'bad input' >&2; exit 3".into()]),
            FixedLocator::new().with("tool", "/bin/sh"),
        );
        let err = a
            .invoke(&dir.path().join("a.docx"), &dir.path().join("a.pdf"))
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("bad input"), "got: {msg}");
        assert!(!dir.path().join("a.pdf").exists());
    }

    /// Whether `pid` is still running. Zombies waiting to be reaped by init
    /// count as gone.
    #[cfg(target_os = "linux")]
    fn running(pid: &str) -> bool {
        let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
            return false;
        };
        let state = stat
            .rsplit(')')
            .next()
            .and_then(|rest| rest.trim_start().chars().next());
        !matches!(state, Some('Z' | 'X'))
    }

    #[cfg(target_os = "linux")]
    async fn gone_within(pid: &str, limit: Duration) -> bool {
        let started = std::time::Instant::now();
        while started.elapsed() < limit {
            if !running(pid) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        !running(pid)
    }

    /// `sh -c` script that starts a background `sleep`, records its pid and
    /// then runs `tail`.
    #[cfg(target_os = "linux")]
    fn spawning_worker(pid_file: &Path, tail: &str) -> CommandShape {
        CommandShape::Template(vec![
            "-c".into(),
            format!("sleep 30 & echo $! > '{}'; {tail}", pid_file.display()),
        ])
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn timeout_kills_processes_the_converter_started() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("worker.pid");
        let a = ExternalProcessAdapter::new(
            "tool",
            "tool",
            vec![Format::WordDoc],
            spawning_worker(&pid_file, "wait"),
            Duration::from_millis(500),
            Arc::new(FixedLocator::new().with("tool", "/bin/sh")),
        );

        let err = a
            .invoke(&dir.path().join("a.docx"), &dir.path().join("a.pdf"))
            .await
            .unwrap_err();

        assert_eq!(err, AttemptError::TimedOut { budget_ms: 500 });
        assert!(err.to_string().ends_with("500ms"), "got: {err}");
        let worker = std::fs::read_to_string(&pid_file).unwrap();
        assert!(
            gone_within(worker.trim(), Duration::from_secs(2)).await,
            "worker {} outlived the timed-out converter",
            worker.trim()
        );
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn dropped_attempt_kills_the_process_group() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("worker.pid");
        let a = ExternalProcessAdapter::new(
            "tool",
            "tool",
            vec![Format::WordDoc],
            spawning_worker(&pid_file, "wait"),
            Duration::from_secs(60),
            Arc::new(FixedLocator::new().with("tool", "/bin/sh")),
        );

        let outer = tokio::time::timeout(
            Duration::from_millis(400),
            a.invoke(&dir.path().join("a.docx"), &dir.path().join("a.pdf")),
        )
        .await;
        assert!(outer.is_err());

        let worker = std::fs::read_to_string(&pid_file).unwrap();
        assert!(gone_within(worker.trim(), Duration::from_secs(2)).await);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn stragglers_are_killed_after_a_clean_exit() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("worker.pid");
        let a = adapter(
            spawning_worker(&pid_file, "exit 0"),
            FixedLocator::new().with("tool", "/bin/sh"),
        );

        // No PDF is produced; the orchestrator's validation reports that.
        a.invoke(&dir.path().join("a.docx"), &dir.path().join("a.pdf"))
            .await
            .unwrap();

        let worker = std::fs::read_to_string(&pid_file).unwrap();
        assert!(gone_within(worker.trim(), Duration::from_secs(2)).await);
    }
}
