//! Caller-supplied host and port predicates applied after a successful parse.
use std::fmt;
use std::sync::Arc;

use crate::types::{Host, Port, Run};

pub type HostFilter = Arc<dyn Fn(&Host) -> bool + Send + Sync>;
pub type PortFilter = Arc<dyn Fn(&Port) -> bool + Send + Sync>;

/// Order-preserving pruning of a materialized run. Hosts are filtered first,
/// then the ports of every surviving host. Entries are only ever removed.
#[derive(Clone, Default)]
pub struct PostScanFilter {
    pub host: Option<HostFilter>,
    pub port: Option<PortFilter>,
}

impl PostScanFilter {
    pub fn is_empty(&self) -> bool {
        self.host.is_none() && self.port.is_none()
    }

    pub fn apply(&self, run: &mut Run) {
        if let Some(keep_host) = &self.host {
            run.hosts.retain(|h| keep_host(h));
        }
        if let Some(keep_port) = &self.port {
            for host in &mut run.hosts {
                host.ports.ports.retain(|p| keep_port(p));
            }
        }
    }
}

impl fmt::Debug for PostScanFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostScanFilter")
            .field("host", &self.host.is_some())
            .field("port", &self.port.is_some())
            .finish()
    }
}
