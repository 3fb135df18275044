//! Reconciles exit status, context state and parse outcome into one result.
use std::io;
use std::process::ExitStatus;

use tracing::debug;

use crate::context::ContextError;
use crate::error::Error;
use crate::filter::PostScanFilter;
use crate::types::Run;
use crate::xml;

const OUT_OF_MEMORY_MARKER: &str = "Malloc Failed!";
const REQUIRES_ROOT_MARKER: &str = "requires root privileges";
const RESOLVE_NAME_MARKER: &str = "Error resolving name";

/// Exit code of a Windows console process ended by Ctrl-C (`STATUS_CONTROL_C_EXIT`).
const WINDOWS_CTRL_C_EXIT: i32 = 0xC000_013Au32 as i32;

/// Outcome of one scan: the materialized run and, if the scan failed, why.
///
/// `run` is always present. It is empty apart from `warnings` when the scan
/// timed out or was interrupted, and may be partially populated for other
/// failures.
#[derive(Debug)]
pub struct RunResult {
    pub run: Run,
    pub error: Option<Error>,
}

impl RunResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> crate::Result<Run> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.run),
        }
    }
}

/// Everything the coordinator gathered once the process exited and both pipes
/// were drained.
#[derive(Debug)]
pub(crate) struct Collected {
    pub status: io::Result<ExitStatus>,
    pub context: Option<ContextError>,
    /// The `-oX` document, from stdout or from the output file.
    pub document: Vec<u8>,
    /// Whether nmap wrote nothing at all to stdout. Differs from an empty
    /// `document` when the XML went to a file.
    pub stdout_empty: bool,
    pub stderr: Vec<u8>,
    /// Non-fatal problems seen while collecting, reported after the stderr lines.
    pub warnings: Vec<String>,
}

pub(crate) fn finalize(collected: Collected, filter: &PostScanFilter) -> RunResult {
    let Collected {
        status,
        context,
        document,
        stdout_empty,
        stderr,
        warnings: collect_warnings,
    } = collected;

    let mut warnings = diagnostic_lines(&stderr);
    let classified = classify_diagnostics(&warnings);
    warnings.extend(collect_warnings);

    if let Some(reason) = context {
        return discarded(warnings, reason.into());
    }

    let (mut run, parse_error) = match xml::parse_run(&document) {
        Ok(run) => (run, None),
        Err(e) => {
            warnings.push(e.to_string());
            let run = Run {
                raw_xml: document,
                ..Run::default()
            };
            (run, Some(e))
        }
    };
    // Assigned after parsing so the decoded document cannot overwrite them.
    run.warnings = warnings;
    let parsed = parse_error.is_none();

    if let Some(err) = classified {
        return RunResult { run, error: Some(err) };
    }

    let mut error = match status {
        Ok(status) if status.success() => parse_error,
        Ok(status) if is_interrupt_exit(&status) => {
            return discarded(run.warnings, Error::ScanInterrupt);
        }
        exited => {
            if parse_error.is_some() && stdout_empty && stderr.is_empty() {
                None
            } else if parse_error.is_some() {
                parse_error
            } else {
                Some(match exited {
                    Ok(status) => Error::Exit(status),
                    Err(e) => Error::Io(e),
                })
            }
        }
    };

    if parsed && !run.stats.finished.error_msg.is_empty() {
        error = Some(classify_critical(&run.stats.finished.error_msg));
    }

    if error.is_none() {
        filter.apply(&mut run);
    }
    RunResult { run, error }
}

fn discarded(warnings: Vec<String>, error: Error) -> RunResult {
    RunResult {
        run: Run {
            warnings,
            ..Run::default()
        },
        error: Some(error),
    }
}

/// Non-empty stderr lines in emission order.
pub(crate) fn diagnostic_lines(stderr: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(stderr)
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            debug!(line, "nmap diagnostic");
            line.to_string()
        })
        .collect()
}

/// First diagnostic line matching a known fatal marker wins. These markers
/// mean nmap could not have produced usable output.
pub(crate) fn classify_diagnostics(lines: &[String]) -> Option<Error> {
    lines.iter().find_map(|line| {
        if line.contains(OUT_OF_MEMORY_MARKER) {
            Some(Error::OutOfMemory)
        } else if line.contains(REQUIRES_ROOT_MARKER) {
            Some(Error::RequiresRoot)
        } else {
            None
        }
    })
}

/// Map nmap's own `errormsg` onto an error kind.
pub(crate) fn classify_critical(message: &str) -> Error {
    if message.contains(RESOLVE_NAME_MARKER) {
        Error::ResolveName
    } else {
        Error::Nmap(message.to_string())
    }
}

/// True when the exit status says the process was stopped by Ctrl-C.
pub(crate) fn is_interrupt_exit(status: &ExitStatus) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if status.signal() == Some(SIGINT) {
            return true;
        }
    }
    matches!(status.code(), Some(130) | Some(WINDOWS_CTRL_C_EXIT))
}

#[cfg(unix)]
const SIGINT: i32 = 2;

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::filter::PostScanFilter;
    use std::os::unix::process::ExitStatusExt;

    const DOC: &str = r#"<nmaprun scanner="nmap"><host><status state="up" reason="syn-ack"/><address addr="10.0.0.1" addrtype="ipv4"/></host><runstats><finished elapsed="1.0"/><hosts up="1" down="0" total="1"/></runstats></nmaprun>"#;

    fn exit(code: i32) -> io::Result<ExitStatus> {
        Ok(ExitStatus::from_raw(code << 8))
    }

    fn collected(status: io::Result<ExitStatus>, document: &str, stderr: &str) -> Collected {
        Collected {
            status,
            context: None,
            document: document.as_bytes().to_vec(),
            stdout_empty: document.is_empty(),
            stderr: stderr.as_bytes().to_vec(),
            warnings: Vec::new(),
        }
    }

    fn run(c: Collected) -> RunResult {
        finalize(c, &PostScanFilter::default())
    }

    #[test]
    fn clean_exit_returns_parsed_run() {
        let res = run(collected(exit(0), DOC, ""));
        assert!(res.is_ok());
        assert_eq!(res.run.hosts.len(), 1);
        assert!(res.run.warnings.is_empty());
    }

    #[test]
    fn clean_exit_with_broken_xml_is_parse_error() {
        let res = run(collected(exit(0), "<nmaprun><host>", "Warning: x\n"));
        assert!(matches!(res.error, Some(Error::ParseOutput(_))));
        assert_eq!(res.run.warnings.len(), 2);
        assert_eq!(res.run.warnings[0], "Warning: x");
    }

    #[test]
    fn deadline_wins_over_everything() {
        let mut c = collected(exit(1), DOC, "Malloc Failed!\n");
        c.context = Some(ContextError::DeadlineExceeded);
        let res = run(c);
        assert!(matches!(res.error, Some(Error::ScanTimeout)));
        assert!(res.run.hosts.is_empty());
        assert_eq!(res.run.warnings, vec!["Malloc Failed!".to_string()]);
    }

    #[test]
    fn cancellation_is_interrupt() {
        let mut c = collected(exit(1), "", "");
        c.context = Some(ContextError::Canceled);
        assert!(matches!(run(c).error, Some(Error::ScanInterrupt)));
    }

    #[test]
    fn sigint_exit_is_interrupt() {
        let res = run(collected(Ok(ExitStatus::from_raw(2)), DOC, ""));
        assert!(matches!(res.error, Some(Error::ScanInterrupt)));
        let res = run(collected(exit(130), DOC, ""));
        assert!(matches!(res.error, Some(Error::ScanInterrupt)));
    }

    #[test]
    fn silent_abnormal_exit_is_not_an_error() {
        let res = run(collected(exit(1), "", ""));
        assert!(res.is_ok());
        assert!(res.run.hosts.is_empty());
    }

    #[test]
    fn missing_output_file_with_stdout_chatter_is_parse_error() {
        let mut c = collected(exit(1), "", "");
        c.stdout_empty = false;
        c.warnings.push("failed to read /tmp/out.xml: No such file or directory".into());
        let res = run(c);
        assert!(matches!(res.error, Some(Error::ParseOutput(_))));
        assert_eq!(res.run.warnings.len(), 2);
    }

    #[test]
    fn abnormal_exit_prefers_parse_error() {
        let res = run(collected(exit(1), "", "Failed to open device\n"));
        assert!(matches!(res.error, Some(Error::ParseOutput(_))));
    }

    #[test]
    fn abnormal_exit_with_valid_xml_surfaces_exit_status() {
        let res = run(collected(exit(3), DOC, ""));
        match res.error {
            Some(Error::Exit(status)) => assert_eq!(status.code(), Some(3)),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(res.run.hosts.len(), 1);
    }

    #[test]
    fn out_of_memory_marker_beats_exit_status() {
        let res = run(collected(
            exit(1),
            "",
            "Starting Nmap\nMalloc Failed! Probably out of space.\nQUITTING!\n",
        ));
        assert!(matches!(res.error, Some(Error::OutOfMemory)));
        assert_eq!(res.run.warnings[1], "Malloc Failed! Probably out of space.");
    }

    #[test]
    fn first_marker_short_circuits() {
        let lines = vec![
            "You requested a scan type which requires root privileges.".to_string(),
            "Malloc Failed!".to_string(),
        ];
        assert!(matches!(classify_diagnostics(&lines), Some(Error::RequiresRoot)));
    }

    #[test]
    fn embedded_error_message_is_classified() {
        let doc = r#"<nmaprun><runstats><finished errormsg="Error resolving name &quot;nope.invalid&quot;" exit="error"/></runstats></nmaprun>"#;
        assert!(matches!(run(collected(exit(1), doc, "")).error, Some(Error::ResolveName)));

        let doc = r#"<nmaprun><runstats><finished errormsg="Something broke" exit="error"/></runstats></nmaprun>"#;
        match run(collected(exit(0), doc, "")).error {
            Some(Error::Nmap(msg)) => assert_eq!(msg, "Something broke"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn collection_warnings_follow_stderr_lines() {
        let mut c = collected(exit(0), DOC, "first\r\n\nsecond\n");
        c.warnings.push("progress decoding stopped: x".into());
        let res = run(c);
        assert_eq!(
            res.run.warnings,
            vec!["first", "second", "progress decoding stopped: x"]
        );
    }
}
