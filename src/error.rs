use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure a scan can end in.
///
/// Configuration problems (`NmapNotInstalled`, `InvalidOption`) surface while
/// building a [`Scanner`](crate::scanner::Scanner). `Launch` is returned before any
/// process exists. Everything else is produced by the finalizer after the process
/// has exited.
#[derive(Error, Debug)]
pub enum Error {
    #[error("nmap binary was not found")]
    NmapNotInstalled,

    #[error("failed to launch {path}: {source}")]
    Launch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid scanner option: {0}")]
    InvalidOption(String),

    #[error("nmap scan timed out")]
    ScanTimeout,

    #[error("nmap scan interrupted")]
    ScanInterrupt,

    #[error("unable to parse nmap output, see warnings for details: {0}")]
    ParseOutput(#[from] quick_xml::DeError),

    #[error("malformed nmap XML stream: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("nmap could not resolve the target name")]
    ResolveName,

    #[error("nmap reported a critical error: {0}")]
    Nmap(String),

    #[error("nmap ran out of memory")]
    OutOfMemory,

    #[error("nmap requires root privileges for this scan")]
    RequiresRoot,

    #[error("nmap exited unsuccessfully: {0}")]
    Exit(ExitStatus),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for the two kinds caused by the caller's context rather than by nmap.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::ScanTimeout | Error::ScanInterrupt)
    }
}
