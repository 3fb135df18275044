//! Accumulates nmap arguments through typed, individually validated steps.
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWrite;
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::filter::PostScanFilter;
use crate::ports;
use crate::scanner::{ProcessCustomizer, Scanner};
use crate::stream::{ProgressHandler, RawSink};
use crate::targets;
use crate::types::{Host, Port, TaskProgress};

const DEFAULT_BINARY: &str = "nmap";
const NON_INTERACTIVE_FLAG: &str = "--noninteractive";

/// Builder for a [`Scanner`].
///
/// Steps that can reject their input return `Result<Self>`, so a chain reads
/// `ScannerBuilder::new().targets(["10.0.0.1"])?.ports("22,80")?.build()?`.
/// Tokens are emitted in call order; the `-oX` directive is always appended last
/// at launch time.
#[derive(Default)]
pub struct ScannerBuilder {
    binary_path: Option<PathBuf>,
    args: Vec<String>,
    output_file: Option<PathBuf>,
    progress: Option<ProgressHandler>,
    filter: PostScanFilter,
    sink: Option<RawSink>,
    customizer: Option<ProcessCustomizer>,
}

impl ScannerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this executable instead of looking up `nmap` on `PATH`.
    pub fn binary_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary_path = Some(path.into());
        self
    }

    pub fn targets<I, S>(mut self, targets: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for target in targets {
            let target = target.as_ref().trim();
            targets::validate_target(target)?;
            self.args.push(targets::normalize_target(target));
        }
        Ok(self)
    }

    /// `-p` with a validated, canonicalized port list such as `22,80,8000-8010`.
    pub fn ports(mut self, spec: &str) -> Result<Self> {
        let ranges = ports::parse_ports_str(spec)?;
        self.args.push("-p".into());
        self.args.push(ports::format_ports(&ranges));
        Ok(self)
    }

    /// `-sV`
    pub fn service_version_detection(self) -> Self {
        self.flag("-sV")
    }

    /// `-O`
    pub fn os_detection(self) -> Self {
        self.flag("-O")
    }

    /// `-Pn`
    pub fn skip_host_discovery(self) -> Self {
        self.flag("-Pn")
    }

    /// `-T0` (paranoid) through `-T5` (insane).
    pub fn timing_template(self, level: u8) -> Result<Self> {
        if level > 5 {
            return Err(Error::InvalidOption(format!(
                "timing template must be 0-5, got {level}"
            )));
        }
        Ok(self.flag(&format!("-T{level}")))
    }

    pub fn scripts<I, S>(mut self, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() || name.contains(char::is_whitespace) || name.contains(',') {
                return Err(Error::InvalidOption(format!("invalid script name: {name:?}")));
            }
            list.push(name.to_string());
        }
        if list.is_empty() {
            return Err(Error::InvalidOption("no scripts given".into()));
        }
        self.args.push("--script".into());
        self.args.push(list.join(","));
        Ok(self)
    }

    /// `-v` repeated `level` times.
    pub fn verbosity(self, level: u8) -> Self {
        if level == 0 {
            return self;
        }
        self.flag(&format!("-{}", "v".repeat(level as usize)))
    }

    /// `--stats-every`, which makes nmap emit `<taskprogress>` periodically.
    pub fn stats_every(mut self, interval: Duration) -> Result<Self> {
        let ms = interval.as_millis();
        if ms == 0 {
            return Err(Error::InvalidOption("stats interval must be positive".into()));
        }
        self.args.push("--stats-every".into());
        self.args.push(format!("{ms}ms"));
        Ok(self)
    }

    /// `--noninteractive`. Incompatible with a progress handler.
    pub fn non_interactive(mut self) -> Result<Self> {
        if self.progress.is_some() {
            return Err(progress_conflict("non-interactive mode"));
        }
        self.args.push(NON_INTERACTIVE_FLAG.into());
        Ok(self)
    }

    /// Tokens passed to nmap verbatim.
    pub fn custom_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Have nmap write its XML to `path` instead of stdout; the file is read back
    /// after exit. Incompatible with a progress handler.
    pub fn output_file(mut self, path: impl Into<PathBuf>) -> Result<Self> {
        if self.progress.is_some() {
            return Err(progress_conflict("an output file"));
        }
        self.output_file = Some(path.into());
        Ok(self)
    }

    /// Receive `<taskprogress>` snapshots while the scan runs, asking nmap for
    /// one every `every`.
    ///
    /// The handler runs on the task decoding stdout; while it runs, decoding
    /// waits. Requires XML on stdout and interactive mode.
    pub fn progress_handler<F>(self, every: Duration, handler: F) -> Result<Self>
    where
        F: Fn(TaskProgress) + Send + Sync + 'static,
    {
        if self.output_file.is_some() {
            return Err(progress_conflict("an output file"));
        }
        if self.has_arg(NON_INTERACTIVE_FLAG) {
            return Err(progress_conflict("non-interactive mode"));
        }
        let mut builder = self.stats_every(every)?;
        builder.progress = Some(Arc::new(handler));
        Ok(builder)
    }

    /// Keep only hosts for which `keep` returns true.
    pub fn host_filter<F>(mut self, keep: F) -> Self
    where
        F: Fn(&Host) -> bool + Send + Sync + 'static,
    {
        self.filter.host = Some(Arc::new(keep));
        self
    }

    /// Keep only ports for which `keep` returns true, in every remaining host.
    pub fn port_filter<F>(mut self, keep: F) -> Self
    where
        F: Fn(&Port) -> bool + Send + Sync + 'static,
    {
        self.filter.port = Some(Arc::new(keep));
        self
    }

    /// Copy the raw XML stream into `sink` as it arrives, in addition to parsing it.
    ///
    /// With [`output_file`](Self::output_file) the sink receives the file's
    /// contents once nmap has exited, and never nmap's normal stdout.
    pub fn stream_to<W>(mut self, sink: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let sink: Box<dyn AsyncWrite + Send + Unpin> = Box::new(sink);
        self.sink = Some(Arc::new(Mutex::new(sink)));
        self
    }

    /// Adjust the command right before it is spawned, e.g. to set a process group.
    pub fn process_customizer<F>(mut self, customize: F) -> Self
    where
        F: Fn(&mut Command) + Send + Sync + 'static,
    {
        self.customizer = Some(Arc::new(customize));
        self
    }

    /// Check cross-step constraints and locate the executable.
    pub fn build(self) -> Result<Scanner> {
        if self.progress.is_some() {
            if self.output_file.is_some() {
                return Err(progress_conflict("an output file"));
            }
            if self.has_arg(NON_INTERACTIVE_FLAG) {
                return Err(progress_conflict("non-interactive mode"));
            }
        }

        let binary_path = match self.binary_path {
            Some(path) => resolve_binary(&path)?,
            None => resolve_binary(Path::new(DEFAULT_BINARY))?,
        };

        Ok(Scanner {
            binary_path,
            args: self.args,
            output_file: self.output_file,
            progress: self.progress,
            filter: self.filter,
            sink: self.sink,
            customizer: self.customizer,
        })
    }

    fn flag(mut self, flag: &str) -> Self {
        self.args.push(flag.to_string());
        self
    }

    fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }
}

fn progress_conflict(what: &str) -> Error {
    Error::InvalidOption(format!(
        "progress reporting needs XML on stdout and cannot be combined with {what}"
    ))
}

/// Paths containing a separator must exist as given; bare names are searched on `PATH`.
fn resolve_binary(path: &Path) -> Result<PathBuf> {
    if path.components().count() > 1 {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(Error::NmapNotInstalled)
        };
    }
    let paths = env::var_os("PATH").ok_or(Error::NmapNotInstalled)?;
    env::split_paths(&paths)
        .flat_map(|dir| executable_candidates(&dir, path))
        .find(|candidate| candidate.is_file())
        .ok_or(Error::NmapNotInstalled)
}

fn executable_candidates(dir: &Path, name: &Path) -> Vec<PathBuf> {
    let plain = dir.join(name);
    if cfg!(windows) && name.extension().is_none() {
        vec![plain.with_extension("exe"), plain]
    } else {
        vec![plain]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh() -> ScannerBuilder {
        ScannerBuilder::new().binary_path("/bin/sh")
    }

    #[test]
    fn steps_emit_tokens_in_order() {
        let scanner = sh()
            .targets(["10.0.0.7/24", "scanme.nmap.org"])
            .unwrap()
            .ports("80,22-25")
            .unwrap()
            .service_version_detection()
            .timing_template(4)
            .unwrap()
            .scripts(["banner", "http-title"])
            .unwrap()
            .verbosity(2)
            .custom_args(["--reason"])
            .build()
            .unwrap();
        assert_eq!(
            scanner.args(),
            [
                "10.0.0.0/24", "scanme.nmap.org", "-p", "80,22-25", "-sV", "-T4", "--script",
                "banner,http-title", "-vv", "--reason",
            ]
        );
    }

    #[test]
    fn invalid_steps_fail() {
        assert!(sh().targets(["-iL"]).is_err());
        assert!(sh().ports("99999").is_err());
        assert!(sh().timing_template(6).is_err());
        assert!(sh().scripts(Vec::<String>::new()).is_err());
        assert!(sh().scripts(["a b"]).is_err());
        assert!(sh().stats_every(Duration::ZERO).is_err());
    }

    #[test]
    fn progress_requires_stdout_in_either_order() {
        let err = sh()
            .output_file("/tmp/out.xml")
            .unwrap()
            .progress_handler(Duration::from_secs(1), |_| {});
        assert!(matches!(err, Err(Error::InvalidOption(_))));

        let err = sh()
            .progress_handler(Duration::from_secs(1), |_| {})
            .unwrap()
            .output_file("/tmp/out.xml");
        assert!(matches!(err, Err(Error::InvalidOption(_))));
    }

    #[test]
    fn progress_requires_interactive_mode() {
        let err = sh()
            .non_interactive()
            .unwrap()
            .progress_handler(Duration::from_secs(1), |_| {});
        assert!(err.is_err());

        let err = sh()
            .progress_handler(Duration::from_secs(1), |_| {})
            .unwrap()
            .custom_args([NON_INTERACTIVE_FLAG])
            .build();
        assert!(err.is_err());
    }

    #[test]
    fn progress_handler_requests_stats() {
        let scanner = sh()
            .progress_handler(Duration::from_millis(500), |_| {})
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(scanner.args(), ["--stats-every", "500ms"]);
    }

    #[test]
    fn missing_binary_is_a_configuration_error() {
        let err = ScannerBuilder::new()
            .binary_path("/definitely/not/here/nmap")
            .build();
        assert!(matches!(err, Err(Error::NmapNotInstalled)));

        let err = ScannerBuilder::new()
            .binary_path("nmap-binary-that-does-not-exist")
            .build();
        assert!(matches!(err, Err(Error::NmapNotInstalled)));
    }
}
