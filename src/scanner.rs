use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::builder::ScannerBuilder;
use crate::context::{ContextError, ScanContext};
use crate::error::{Error, Result};
use crate::filter::PostScanFilter;
use crate::finalize::{self, Collected, RunResult};
use crate::stream::{self, Drained, ProgressHandler, RawSink};
use crate::types::Run;

/// Hook that can adjust the command before it is spawned.
pub type ProcessCustomizer = Arc<dyn Fn(&mut Command) + Send + Sync>;

const XML_OUTPUT_FLAG: &str = "-oX";
const STDOUT_DESTINATION: &str = "-";

/// A configured nmap invocation.
///
/// Built once through [`ScannerBuilder`] and read-only afterwards. A scanner
/// may be reused for sequential runs, but callers must not start a second run
/// while one is still in flight; that is not checked here.
#[derive(Clone)]
pub struct Scanner {
    pub(crate) binary_path: PathBuf,
    pub(crate) args: Vec<String>,
    pub(crate) output_file: Option<PathBuf>,
    pub(crate) progress: Option<ProgressHandler>,
    pub(crate) filter: PostScanFilter,
    pub(crate) sink: Option<RawSink>,
    pub(crate) customizer: Option<ProcessCustomizer>,
}

/// Live handles of a scan started with [`Scanner::run_async`].
///
/// Both chunk channels close once their pipe reaches end of stream. Chunk
/// boundaries carry no meaning. `result` yields exactly one value after both
/// pipes are drained and nmap has exited.
#[derive(Debug)]
pub struct AsyncRun {
    pub stdout: UnboundedReceiver<Vec<u8>>,
    pub stderr: UnboundedReceiver<Vec<u8>>,
    pub result: oneshot::Receiver<RunResult>,
}

struct StreamSenders {
    stdout: UnboundedSender<Vec<u8>>,
    stderr: UnboundedSender<Vec<u8>>,
}

/// A started process with both of its pipes already being drained.
struct Launched {
    child: Child,
    stdout: JoinHandle<Drained>,
    stderr: JoinHandle<Drained>,
    ctx: ScanContext,
    output_file: Option<PathBuf>,
    /// Set only in output-file mode, where the sink is fed from the file.
    file_sink: Option<RawSink>,
    filter: PostScanFilter,
    started: Instant,
}

impl Scanner {
    pub fn builder() -> ScannerBuilder {
        ScannerBuilder::new()
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Accumulated tokens, without the output directive.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Full argument vector: caller tokens, then `-oX` and its destination.
    pub fn command_args(&self) -> Vec<OsString> {
        let mut argv: Vec<OsString> = self.args.iter().map(OsString::from).collect();
        argv.push(XML_OUTPUT_FLAG.into());
        argv.push(match &self.output_file {
            Some(path) => path.as_os_str().to_owned(),
            None => STDOUT_DESTINATION.into(),
        });
        argv
    }

    /// Run to completion and return the filtered run.
    ///
    /// Non-fatal diagnostics are in [`Run::warnings`] even on success.
    pub async fn run(&self, ctx: &ScanContext) -> Result<Run> {
        self.execute(ctx).await?.into_result()
    }

    /// Like [`Scanner::run`], but keeps the (possibly partial) run next to the
    /// error. Only a launch failure is returned as `Err`.
    pub async fn execute(&self, ctx: &ScanContext) -> Result<RunResult> {
        let launched = self.launch(ctx, None)?;
        Ok(launched.finish().await)
    }

    /// Start the scan in the background and return immediately.
    ///
    /// The returned error only reports launch failures. Must be called from
    /// within a tokio runtime.
    pub fn run_async(&self, ctx: &ScanContext) -> Result<AsyncRun> {
        let (stdout_tx, stdout_rx) = mpsc::unbounded_channel();
        let (stderr_tx, stderr_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = oneshot::channel();

        let launched = self.launch(
            ctx,
            Some(StreamSenders {
                stdout: stdout_tx,
                stderr: stderr_tx,
            }),
        )?;
        tokio::spawn(async move {
            let outcome = launched.finish().await;
            // The caller may have dropped the receiver; the scan is done either way.
            let _ = result_tx.send(outcome);
        });

        Ok(AsyncRun {
            stdout: stdout_rx,
            stderr: stderr_rx,
            result: result_rx,
        })
    }

    /// Spawn nmap and start draining both pipes before anyone waits on it.
    fn launch(&self, ctx: &ScanContext, senders: Option<StreamSenders>) -> Result<Launched> {
        let argv = self.command_args();
        let mut cmd = Command::new(&self.binary_path);
        cmd.args(&argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(customize) = &self.customizer {
            customize(&mut cmd);
        }

        info!(binary = %self.binary_path.display(), args = ?argv, "starting nmap");
        let mut child = cmd.spawn().map_err(|source| Error::Launch {
            path: self.binary_path.clone(),
            source,
        })?;
        let started = Instant::now();

        let (stdout_pipe, stderr_pipe) = match (child.stdout.take(), child.stderr.take()) {
            (Some(out), Some(err)) => (out, err),
            _ => {
                return Err(Error::Launch {
                    path: self.binary_path.clone(),
                    source: io::Error::other("child pipes were not captured"),
                })
            }
        };
        let (stdout_chunks, stderr_chunks) = match senders {
            Some(s) => (Some(s.stdout), Some(s.stderr)),
            None => (None, None),
        };

        // With an output file, stdout carries nmap's normal output, not XML.
        let (pipe_sink, file_sink) = match &self.output_file {
            Some(_) => (None, self.sink.clone()),
            None => (self.sink.clone(), None),
        };
        let stdout = tokio::spawn(stream::drain_stdout(
            stdout_pipe,
            stdout_chunks,
            pipe_sink,
            self.progress.clone(),
        ));
        let stderr = tokio::spawn(stream::drain_stderr(stderr_pipe, stderr_chunks));

        Ok(Launched {
            child,
            stdout,
            stderr,
            ctx: ctx.clone(),
            output_file: self.output_file.clone(),
            file_sink,
            filter: self.filter.clone(),
            started,
        })
    }
}

impl Launched {
    /// Wait for exit, collect both pipes and classify the outcome.
    async fn finish(mut self) -> RunResult {
        let (status, context) = wait_with_context(&mut self.child, &self.ctx).await;
        let stdout = join_drain(self.stdout, "stdout").await;
        let stderr = join_drain(self.stderr, "stderr").await;

        let mut warnings = stdout.warnings;
        warnings.extend(stderr.warnings);
        let stdout_empty = stdout.bytes.is_empty();
        let document = match &self.output_file {
            Some(path) => {
                let document = read_output_file(path, &mut warnings).await;
                if let Some(sink) = &self.file_sink {
                    copy_to_sink(sink, &document, &mut warnings).await;
                }
                document
            }
            None => stdout.bytes,
        };

        let outcome = finalize::finalize(
            Collected {
                status,
                context,
                document,
                stdout_empty,
                stderr: stderr.bytes,
                warnings,
            },
            &self.filter,
        );

        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        match &outcome.error {
            None => info!(
                elapsed_ms,
                hosts = outcome.run.hosts.len(),
                warnings = outcome.run.warnings.len(),
                "nmap finished"
            ),
            Some(e) => warn!(
                elapsed_ms,
                error = %e,
                warnings = outcome.run.warnings.len(),
                "nmap failed"
            ),
        }
        outcome
    }
}

/// Wait for the process, killing it if the context finishes first. The process
/// is always reaped before returning.
async fn wait_with_context(
    child: &mut Child,
    ctx: &ScanContext,
) -> (io::Result<ExitStatus>, Option<ContextError>) {
    let reason = tokio::select! {
        status = child.wait() => return (status, None),
        reason = ctx.done() => reason,
    };
    if let Err(e) = child.start_kill() {
        warn!(error = %e, "failed to kill nmap");
    }
    (child.wait().await, Some(reason))
}

async fn join_drain(handle: JoinHandle<Drained>, name: &str) -> Drained {
    match handle.await {
        Ok(drained) => drained,
        Err(e) => Drained {
            bytes: Vec::new(),
            warnings: vec![format!("nmap {name} reader stopped: {e}")],
        },
    }
}

/// Read the XML nmap wrote to `path`, then restrict the file to its owner.
/// Failures become warnings.
async fn read_output_file(path: &Path, warnings: &mut Vec<String>) -> Vec<u8> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warnings.push(format!("failed to read {}: {e}", path.display()));
            return Vec::new();
        }
    };
    if let Err(e) = restrict_permissions(path).await {
        warn!(path = %path.display(), error = %e, "could not restrict output file permissions");
        warnings.push(format!(
            "failed to restrict permissions of {}: {e}",
            path.display()
        ));
    }
    bytes
}

async fn copy_to_sink(sink: &RawSink, document: &[u8], warnings: &mut Vec<String>) {
    if document.is_empty() {
        return;
    }
    let mut out = sink.lock().await;
    let written = match out.write_all(document).await {
        Ok(()) => out.flush().await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        warn!(error = %e, "raw output sink failed");
        warnings.push(format!("writing raw nmap output failed: {e}"));
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

impl fmt::Debug for Scanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scanner")
            .field("binary_path", &self.binary_path)
            .field("args", &self.args)
            .field("output_file", &self.output_file)
            .field("progress", &self.progress.is_some())
            .field("filter", &self.filter)
            .field("sink", &self.sink.is_some())
            .field("customizer", &self.customizer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_directive_is_appended_last() {
        let scanner = ScannerBuilder::new()
            .binary_path("/bin/sh")
            .custom_args(["-sn", "10.0.0.1"])
            .build()
            .unwrap();
        assert_eq!(scanner.command_args(), ["-sn", "10.0.0.1", "-oX", "-"]);

        let scanner = ScannerBuilder::new()
            .binary_path("/bin/sh")
            .custom_args(["-sn"])
            .output_file("/tmp/scan.xml")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(scanner.command_args(), ["-sn", "-oX", "/tmp/scan.xml"]);
    }
}
