use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// One entry of an nmap `-p` list: a single port or an inclusive range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Parse a port specification into ranges, deduplicated in first-seen order.
///
/// Supported formats, freely mixed:
/// - single port number: `80`
/// - inclusive range: `8000-8010`
/// - separators: commas, whitespace and newlines
/// - comments: everything after `#` on a line is ignored
pub fn parse_ports_str(s: &str) -> Result<Vec<PortRange>> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();

    for (idx, raw_line) in s.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.split('#').next().map(str::trim).unwrap_or("");

        for token in line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            let range = parse_range(token)
                .map_err(|e| Error::InvalidOption(format!("line {line_no}: {e}")))?;
            if seen.insert(range) {
                out.push(range);
            }
        }
    }

    if out.is_empty() {
        return Err(Error::InvalidOption("port specification is empty".into()));
    }
    Ok(out)
}

/// Load a port specification from a file.
pub fn load_ports_from_path(path: impl AsRef<Path>) -> Result<Vec<PortRange>> {
    let content = fs::read_to_string(path.as_ref()).map_err(|e| {
        Error::InvalidOption(format!(
            "failed to read ports file {}: {e}",
            path.as_ref().display()
        ))
    })?;
    parse_ports_str(&content)
}

/// Render ranges as the single token nmap expects after `-p`.
pub fn format_ports(ranges: &[PortRange]) -> String {
    ranges
        .iter()
        .map(PortRange::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_range(token: &str) -> std::result::Result<PortRange, String> {
    if let Some((a, b)) = token.split_once('-') {
        let start = parse_port_str(a.trim()).map_err(|e| format!("invalid start in range {token}: {e}"))?;
        let end = parse_port_str(b.trim()).map_err(|e| format!("invalid end in range {token}: {e}"))?;
        if start > end {
            return Err(format!("invalid range {start}-{end} (start > end)"));
        }
        return Ok(PortRange { start, end });
    }
    let port = parse_port_str(token).map_err(|e| format!("invalid port value {token}: {e}"))?;
    Ok(PortRange { start: port, end: port })
}

fn parse_port_str(s: &str) -> std::result::Result<u16, String> {
    let val: u32 = s.parse::<u32>().map_err(|e| e.to_string())?;
    if val > 65535 {
        return Err(format!("port out of range: {val}"));
    }
    Ok(val as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(p: u16) -> PortRange {
        PortRange { start: p, end: p }
    }

    #[test]
    fn parse_single_ports() {
        let ports = parse_ports_str("80,22\n   443  \n").unwrap();
        assert_eq!(ports, vec![single(80), single(22), single(443)]);
    }

    #[test]
    fn parse_ranges_and_dedup() {
        let ports = parse_ports_str("8000-8002, 80 8000-8002\n80\n").unwrap();
        assert_eq!(
            ports,
            vec![PortRange { start: 8000, end: 8002 }, single(80)]
        );
        assert_eq!(format_ports(&ports), "8000-8002,80");
    }

    #[test]
    fn reversed_range_rejected() {
        assert!(parse_ports_str("90-80").is_err());
    }

    #[test]
    fn out_of_range_rejected() {
        assert!(parse_ports_str("70000\n").is_err());
        assert!(parse_ports_str("abc").is_err());
    }

    #[test]
    fn empty_spec_rejected() {
        assert!(parse_ports_str(" # nothing here\n").is_err());
    }
}
