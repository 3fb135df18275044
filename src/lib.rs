//! Library crate for nmap-runner-rs: runs nmap as a subprocess and materializes its XML report.
pub mod builder;
pub mod context;
pub mod error;
pub mod filter;
pub mod finalize;
pub mod ports;
pub mod progress;
pub mod scanner;
pub mod stream;
pub mod targets;
pub mod types;
pub mod xml;

pub use builder::ScannerBuilder;
pub use context::{ContextError, ScanContext};
pub use error::{Error, Result};
pub use filter::PostScanFilter;
pub use finalize::RunResult;
pub use scanner::{AsyncRun, Scanner};
pub use types::{Element, Host, Port, Run, Script, ScriptNode, Table, TaskProgress, Timestamp};
