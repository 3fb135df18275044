//! Typed result tree for one nmap run, mirroring the `-oX` document.
//!
//! Attribute fields use quick-xml's `@name` convention and element text uses
//! `$text`. Every struct defaults its missing fields so that partial documents
//! still decode.
use std::fmt;

use ::time::{format_description::well_known, OffsetDateTime};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A point in time carried on the wire as UNIX epoch seconds.
///
/// Zero and absent values both decode to the empty timestamp, which is never
/// written back out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Timestamp(Option<OffsetDateTime>);

impl Timestamp {
    /// `None` when `secs` is outside the representable range.
    pub fn from_unix(secs: i64) -> Option<Self> {
        if secs == 0 {
            return Some(Self::default());
        }
        OffsetDateTime::from_unix_timestamp(secs)
            .ok()
            .map(|t| Self(Some(t)))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_none()
    }

    pub fn unix(&self) -> i64 {
        self.0.map_or(0, OffsetDateTime::unix_timestamp)
    }

    pub fn datetime(&self) -> Option<OffsetDateTime> {
        self.0
    }

    pub fn to_rfc3339(&self) -> Option<String> {
        self.0.and_then(|t| t.format(&well_known::Rfc3339).ok())
    }
}

impl From<OffsetDateTime> for Timestamp {
    fn from(t: OffsetDateTime) -> Self {
        Self(Some(t))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.unix().to_string())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(TimestampVisitor)
    }
}

struct TimestampVisitor;

impl<'de> Visitor<'de> for TimestampVisitor {
    type Value = Timestamp;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("UNIX epoch seconds")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Timestamp, E> {
        let v = v.trim();
        if v.is_empty() {
            return Ok(Timestamp::default());
        }
        let secs: i64 = v.parse().map_err(E::custom)?;
        self.visit_i64(secs)
    }

    fn visit_i64<E: de::Error>(self, secs: i64) -> Result<Timestamp, E> {
        Timestamp::from_unix(secs)
            .ok_or_else(|| E::custom(format!("timestamp out of range: {secs}")))
    }

    fn visit_u64<E: de::Error>(self, secs: u64) -> Result<Timestamp, E> {
        let secs = i64::try_from(secs).map_err(E::custom)?;
        self.visit_i64(secs)
    }
}

/// Root of a materialized scan: the `<nmaprun>` element plus side channels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename = "nmaprun", default)]
pub struct Run {
    #[serde(rename = "@scanner", skip_serializing_if = "String::is_empty")]
    pub scanner: String,
    #[serde(rename = "@args", skip_serializing_if = "String::is_empty")]
    pub args: String,
    #[serde(rename = "@start", skip_serializing_if = "Timestamp::is_zero")]
    pub start: Timestamp,
    #[serde(rename = "@startstr", skip_serializing_if = "String::is_empty")]
    pub start_str: String,
    #[serde(rename = "@version", skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(rename = "@profile_name", skip_serializing_if = "String::is_empty")]
    pub profile_name: String,
    #[serde(rename = "@xmloutputversion", skip_serializing_if = "String::is_empty")]
    pub xml_output_version: String,
    #[serde(rename = "scaninfo", skip_serializing_if = "Vec::is_empty")]
    pub scan_info: Vec<ScanInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbose: Option<Level>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debugging: Option<Level>,
    #[serde(rename = "taskbegin", skip_serializing_if = "Vec::is_empty")]
    pub task_begin: Vec<Task>,
    #[serde(rename = "taskprogress", skip_serializing_if = "Vec::is_empty")]
    pub task_progress: Vec<TaskProgress>,
    #[serde(rename = "taskend", skip_serializing_if = "Vec::is_empty")]
    pub task_end: Vec<Task>,
    #[serde(rename = "prescript", skip_serializing_if = "Scripts::is_empty")]
    pub pre_scripts: Scripts,
    #[serde(rename = "host", skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<Host>,
    #[serde(rename = "postscript", skip_serializing_if = "Scripts::is_empty")]
    pub post_scripts: Scripts,
    #[serde(rename = "runstats")]
    pub stats: Stats,

    /// Non-fatal diagnostics: stderr lines first, then anything noticed while
    /// collecting and parsing the output.
    #[serde(skip)]
    pub warnings: Vec<String>,
    /// The document exactly as nmap wrote it.
    #[serde(skip)]
    pub raw_xml: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanInfo {
    #[serde(rename = "@type")]
    pub scan_type: String,
    #[serde(rename = "@protocol")]
    pub protocol: String,
    #[serde(rename = "@numservices")]
    pub num_services: u32,
    #[serde(rename = "@services")]
    pub services: String,
    #[serde(rename = "@scanflags", skip_serializing_if = "String::is_empty")]
    pub scan_flags: String,
}

/// `<verbose>` and `<debugging>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Level {
    #[serde(rename = "@level")]
    pub level: i32,
}

/// `<taskbegin>` / `<taskend>` lifecycle marker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Task {
    #[serde(rename = "@task")]
    pub task: String,
    #[serde(rename = "@time", skip_serializing_if = "Timestamp::is_zero")]
    pub time: Timestamp,
    #[serde(rename = "@extrainfo", skip_serializing_if = "String::is_empty")]
    pub extra_info: String,
}

/// One `<taskprogress>` snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename = "taskprogress", default)]
pub struct TaskProgress {
    #[serde(rename = "@task")]
    pub task: String,
    #[serde(rename = "@time", skip_serializing_if = "Timestamp::is_zero")]
    pub time: Timestamp,
    /// 0 to 100.
    #[serde(rename = "@percent")]
    pub percent: f64,
    #[serde(rename = "@remaining")]
    pub remaining: u64,
    #[serde(rename = "@etc", skip_serializing_if = "Timestamp::is_zero")]
    pub etc: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stats {
    pub finished: Finished,
    #[serde(rename = "hosts")]
    pub hosts: HostStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Finished {
    #[serde(rename = "@time", skip_serializing_if = "Timestamp::is_zero")]
    pub time: Timestamp,
    #[serde(rename = "@timestr", skip_serializing_if = "String::is_empty")]
    pub time_str: String,
    #[serde(rename = "@elapsed")]
    pub elapsed: f64,
    #[serde(rename = "@summary", skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(rename = "@exit", skip_serializing_if = "String::is_empty")]
    pub exit: String,
    /// Set by nmap itself when the scan failed.
    #[serde(rename = "@errormsg", skip_serializing_if = "String::is_empty")]
    pub error_msg: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostStats {
    #[serde(rename = "@up")]
    pub up: u32,
    #[serde(rename = "@down")]
    pub down: u32,
    #[serde(rename = "@total")]
    pub total: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Host {
    #[serde(rename = "@starttime", skip_serializing_if = "Timestamp::is_zero")]
    pub start_time: Timestamp,
    #[serde(rename = "@endtime", skip_serializing_if = "Timestamp::is_zero")]
    pub end_time: Timestamp,
    #[serde(rename = "@comment", skip_serializing_if = "String::is_empty")]
    pub comment: String,
    pub status: Status,
    #[serde(rename = "address", skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<Address>,
    #[serde(skip_serializing_if = "Hostnames::is_empty")]
    pub hostnames: Hostnames,
    #[serde(skip_serializing_if = "PortList::is_empty")]
    pub ports: PortList,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<Os>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<Uptime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<Distance>,
    #[serde(rename = "tcpsequence", skip_serializing_if = "Option::is_none")]
    pub tcp_sequence: Option<TcpSequence>,
    #[serde(rename = "ipidsequence", skip_serializing_if = "Option::is_none")]
    pub ip_id_sequence: Option<Sequence>,
    #[serde(rename = "tcptssequence", skip_serializing_if = "Option::is_none")]
    pub tcp_ts_sequence: Option<Sequence>,
    #[serde(rename = "hostscript", skip_serializing_if = "Scripts::is_empty")]
    pub host_scripts: Scripts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<Trace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub times: Option<Times>,
}

impl Host {
    pub fn is_up(&self) -> bool {
        self.status.state == "up"
    }

    pub fn ipv4(&self) -> Option<&str> {
        self.address_of_type("ipv4")
    }

    pub fn mac(&self) -> Option<&str> {
        self.address_of_type("mac")
    }

    /// First address of any family, in document order.
    pub fn address(&self) -> Option<&str> {
        self.addresses.first().map(|a| a.addr.as_str())
    }

    pub fn hostname(&self) -> Option<&str> {
        self.hostnames.list.first().map(|h| h.name.as_str())
    }

    pub fn open_ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.ports.iter().filter(|p| p.is_open())
    }

    fn address_of_type(&self, kind: &str) -> Option<&str> {
        self.addresses
            .iter()
            .find(|a| a.addr_type == kind)
            .map(|a| a.addr.as_str())
    }
}

/// Host `<status>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Status {
    #[serde(rename = "@state")]
    pub state: String,
    #[serde(rename = "@reason")]
    pub reason: String,
    #[serde(rename = "@reason_ttl")]
    pub reason_ttl: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Address {
    #[serde(rename = "@addr")]
    pub addr: String,
    #[serde(rename = "@addrtype")]
    pub addr_type: String,
    #[serde(rename = "@vendor", skip_serializing_if = "String::is_empty")]
    pub vendor: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hostnames {
    #[serde(rename = "hostname", skip_serializing_if = "Vec::is_empty")]
    pub list: Vec<Hostname>,
}

impl Hostnames {
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hostname {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@type", skip_serializing_if = "String::is_empty")]
    pub kind: String,
}

/// Host `<ports>`: summarized and individually listed ports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortList {
    #[serde(rename = "extraports", skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<ExtraPorts>,
    #[serde(rename = "port", skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<Port>,
}

impl PortList {
    pub fn is_empty(&self) -> bool {
        self.extra.is_empty() && self.ports.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtraPorts {
    #[serde(rename = "@state")]
    pub state: String,
    #[serde(rename = "@count")]
    pub count: u32,
    #[serde(rename = "extrareasons", skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<ExtraReason>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtraReason {
    #[serde(rename = "@reason")]
    pub reason: String,
    #[serde(rename = "@count")]
    pub count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Port {
    #[serde(rename = "@protocol")]
    pub protocol: String,
    #[serde(rename = "@portid")]
    pub id: u16,
    pub state: PortState,
    #[serde(skip_serializing_if = "Service::is_empty")]
    pub service: Service,
    #[serde(rename = "script", skip_serializing_if = "Vec::is_empty")]
    pub scripts: Vec<Script>,
}

impl Port {
    pub fn is_open(&self) -> bool {
        self.state.state == "open"
    }
}

/// open, closed, filtered, unfiltered and the combined nmap states.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortState {
    #[serde(rename = "@state")]
    pub state: String,
    #[serde(rename = "@reason")]
    pub reason: String,
    #[serde(rename = "@reason_ttl")]
    pub reason_ttl: u32,
    #[serde(rename = "@reason_ip", skip_serializing_if = "String::is_empty")]
    pub reason_ip: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Service {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@product", skip_serializing_if = "String::is_empty")]
    pub product: String,
    #[serde(rename = "@version", skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(rename = "@extrainfo", skip_serializing_if = "String::is_empty")]
    pub extra_info: String,
    #[serde(rename = "@method", skip_serializing_if = "String::is_empty")]
    pub method: String,
    /// Detection confidence, 0 to 10.
    #[serde(rename = "@conf")]
    pub confidence: u8,
    #[serde(rename = "@ostype", skip_serializing_if = "String::is_empty")]
    pub os_type: String,
    #[serde(rename = "@devicetype", skip_serializing_if = "String::is_empty")]
    pub device_type: String,
    #[serde(rename = "@tunnel", skip_serializing_if = "String::is_empty")]
    pub tunnel: String,
    #[serde(rename = "@servicefp", skip_serializing_if = "String::is_empty")]
    pub service_fp: String,
    #[serde(rename = "cpe", skip_serializing_if = "Vec::is_empty")]
    pub cpes: Vec<String>,
}

impl Service {
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.product.is_empty() && self.cpes.is_empty()
    }
}

/// Wrapper for `<prescript>`, `<postscript>` and `<hostscript>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scripts {
    #[serde(rename = "script", skip_serializing_if = "Vec::is_empty")]
    pub scripts: Vec<Script>,
}

impl Scripts {
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

/// NSE script result. Structured output is the ordered `nodes` forest.
///
/// `nodes` is filled by [`parse_run`](crate::xml::parse_run), which decodes
/// script bodies itself; deserializing a `Script` on its own leaves it empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename = "script", default)]
pub struct Script {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@output")]
    pub output: String,
    #[serde(rename = "$value", skip_deserializing, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<ScriptNode>,
    /// Index of the body decoded out of band for this script.
    #[serde(rename = "@nmap-runner-body", skip_serializing)]
    pub(crate) body: Option<usize>,
}

impl Script {
    /// Value of the first top-level `<elem>` with this key.
    pub fn get(&self, key: &str) -> Option<&str> {
        find_element(&self.nodes, key)
    }

    pub fn table(&self, key: &str) -> Option<&Table> {
        find_table(&self.nodes, key)
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.nodes.iter().filter_map(ScriptNode::as_element)
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.nodes.iter().filter_map(ScriptNode::as_table)
    }
}

/// One child of a `<script>` or `<table>`, in document order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ScriptNode {
    #[serde(rename = "elem")]
    Element(Element),
    #[serde(rename = "table")]
    Table(Table),
}

impl ScriptNode {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            ScriptNode::Element(e) => Some(e),
            ScriptNode::Table(_) => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            ScriptNode::Table(t) => Some(t),
            ScriptNode::Element(_) => None,
        }
    }
}

/// A `<table>` node. Tables nest without limit; walking and dropping them
/// never recurses on the call stack.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename = "table")]
pub struct Table {
    #[serde(rename = "@key", skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(rename = "$value", skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<ScriptNode>,
}

impl Table {
    pub fn new(key: Option<String>) -> Self {
        Self {
            key,
            nodes: Vec::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        find_element(&self.nodes, key)
    }

    pub fn table(&self, key: &str) -> Option<&Table> {
        find_table(&self.nodes, key)
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.nodes.iter().filter_map(ScriptNode::as_element)
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.nodes.iter().filter_map(ScriptNode::as_table)
    }

    /// Number of nested table levels below this one.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut pending = vec![(self, 0usize)];
        while let Some((table, level)) = pending.pop() {
            deepest = deepest.max(level);
            pending.extend(table.tables().map(|t| (t, level + 1)));
        }
        deepest
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.nodes);
        while let Some(node) = pending.pop() {
            if let ScriptNode::Table(mut table) = node {
                pending.append(&mut table.nodes);
            }
        }
    }
}

/// An `<elem>` leaf, keyed or not. `value` is the text exactly as written.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename = "elem")]
pub struct Element {
    #[serde(rename = "@key", skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(rename = "$text")]
    pub value: String,
}

fn find_element<'a>(nodes: &'a [ScriptNode], key: &str) -> Option<&'a str> {
    nodes
        .iter()
        .filter_map(ScriptNode::as_element)
        .find(|e| e.key.as_deref() == Some(key))
        .map(|e| e.value.as_str())
}

fn find_table<'a>(nodes: &'a [ScriptNode], key: &str) -> Option<&'a Table> {
    nodes
        .iter()
        .filter_map(ScriptNode::as_table)
        .find(|t| t.key.as_deref() == Some(key))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Os {
    #[serde(rename = "portused", skip_serializing_if = "Vec::is_empty")]
    pub ports_used: Vec<PortUsed>,
    #[serde(rename = "osmatch", skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<OsMatch>,
    #[serde(rename = "osfingerprint", skip_serializing_if = "Vec::is_empty")]
    pub fingerprints: Vec<OsFingerprint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortUsed {
    #[serde(rename = "@state")]
    pub state: String,
    #[serde(rename = "@proto")]
    pub protocol: String,
    #[serde(rename = "@portid")]
    pub id: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OsMatch {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@accuracy")]
    pub accuracy: u8,
    #[serde(rename = "@line")]
    pub line: u32,
    #[serde(rename = "osclass", skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<OsClass>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OsClass {
    #[serde(rename = "@type", skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(rename = "@vendor")]
    pub vendor: String,
    #[serde(rename = "@osfamily")]
    pub family: String,
    #[serde(rename = "@osgen", skip_serializing_if = "String::is_empty")]
    pub generation: String,
    #[serde(rename = "@accuracy")]
    pub accuracy: u8,
    #[serde(rename = "cpe", skip_serializing_if = "Vec::is_empty")]
    pub cpes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OsFingerprint {
    #[serde(rename = "@fingerprint")]
    pub fingerprint: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Uptime {
    #[serde(rename = "@seconds")]
    pub seconds: u64,
    #[serde(rename = "@lastboot", skip_serializing_if = "String::is_empty")]
    pub last_boot: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Distance {
    #[serde(rename = "@value")]
    pub value: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpSequence {
    #[serde(rename = "@index")]
    pub index: u32,
    #[serde(rename = "@difficulty")]
    pub difficulty: String,
    #[serde(rename = "@values")]
    pub values: String,
}

/// IP ID and TCP timestamp sequence classes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sequence {
    #[serde(rename = "@class")]
    pub class: String,
    #[serde(rename = "@values", skip_serializing_if = "String::is_empty")]
    pub values: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Trace {
    #[serde(rename = "@proto", skip_serializing_if = "String::is_empty")]
    pub protocol: String,
    #[serde(rename = "@port")]
    pub port: u16,
    #[serde(rename = "hop", skip_serializing_if = "Vec::is_empty")]
    pub hops: Vec<Hop>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hop {
    #[serde(rename = "@ttl")]
    pub ttl: u32,
    /// Kept textual: nmap writes `--` for unanswered probes.
    #[serde(rename = "@rtt", skip_serializing_if = "String::is_empty")]
    pub rtt: String,
    #[serde(rename = "@ipaddr")]
    pub ip_addr: String,
    #[serde(rename = "@host", skip_serializing_if = "String::is_empty")]
    pub host: String,
}

/// Round-trip timing estimates, in microseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Times {
    #[serde(rename = "@srtt")]
    pub srtt: String,
    #[serde(rename = "@rttvar")]
    pub rttvar: String,
    #[serde(rename = "@to")]
    pub to: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_zero_is_empty() {
        let ts = Timestamp::from_unix(0).unwrap();
        assert!(ts.is_zero());
        assert_eq!(ts.unix(), 0);
        assert_eq!(ts.to_rfc3339(), None);
    }

    #[test]
    fn timestamp_formats_rfc3339() {
        let ts = Timestamp::from_unix(1_700_000_000).unwrap();
        assert_eq!(ts.unix(), 1_700_000_000);
        assert_eq!(ts.to_rfc3339().as_deref(), Some("2023-11-14T22:13:20Z"));
    }

    #[test]
    fn table_lookup_and_depth() {
        let mut leaf = Table::new(Some("inner".into()));
        leaf.nodes.push(ScriptNode::Element(Element {
            key: Some("k".into()),
            value: "v".into(),
        }));
        let mut root = Table::new(None);
        root.nodes.push(ScriptNode::Table(leaf));
        assert_eq!(root.depth(), 1);
        assert_eq!(root.table("inner").and_then(|t| t.get("k")), Some("v"));
        assert_eq!(root.get("k"), None);
    }

    #[test]
    fn very_deep_tables_drop_without_recursion() {
        let mut table = Table::new(Some("leaf".into()));
        for _ in 0..100_000 {
            let mut parent = Table::new(None);
            parent.nodes.push(ScriptNode::Table(table));
            table = parent;
        }
        assert_eq!(table.depth(), 100_000);
        drop(table);
    }
}
