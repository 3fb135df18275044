use std::net::IpAddr;

use ipnet::IpNet;

use crate::error::{Error, Result};

/// Check that a target token is safe to hand to nmap.
///
/// Accepts anything nmap accepts as a target (addresses, octet ranges, host
/// names, `host/prefix`), but never a token that nmap would read as an option.
/// Address-prefixed CIDRs must be valid networks.
pub fn validate_target(target: &str) -> Result<()> {
    if target.is_empty() {
        return Err(Error::InvalidOption("empty target".into()));
    }
    if target.starts_with('-') {
        return Err(Error::InvalidOption(format!(
            "target looks like an option: {target}"
        )));
    }
    if target.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::InvalidOption(format!(
            "target contains whitespace: {target:?}"
        )));
    }

    if let Some((base, prefix)) = target.split_once('/') {
        if base.parse::<IpAddr>().is_ok() {
            target
                .parse::<IpNet>()
                .map_err(|e| Error::InvalidOption(format!("invalid CIDR {target}: {e}")))?;
        } else if prefix.parse::<u8>().is_err() {
            return Err(Error::InvalidOption(format!(
                "invalid prefix length in {target}"
            )));
        }
    }
    Ok(())
}

/// Network address form of a CIDR target, e.g. `192.168.1.42/24` to
/// `192.168.1.0/24`. Other targets are returned unchanged.
pub fn normalize_target(target: &str) -> String {
    match target.parse::<IpNet>() {
        Ok(net) => net.trunc().to_string(),
        Err(_) => target.to_string(),
    }
}
