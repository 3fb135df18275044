//! Decoding and re-encoding of nmap's `-oX` document.
//!
//! Script bodies (`<table>`/`<elem>` forests) have no fixed depth, so they are
//! decoded by an explicit event walk with a heap stack. The rest of the
//! document goes through serde. Each `<script>` is handed to serde as an empty
//! element tagged with the index of its already decoded body.
use std::io::BufRead;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::{DeError, Reader};

use crate::error::Result;
use crate::types::{Element, Run, Script, ScriptNode, Table};

const SCRIPT_TAG: &[u8] = b"script";
const TABLE_TAG: &[u8] = b"table";
const ELEM_TAG: &[u8] = b"elem";
const BODY_ATTR: &str = "nmap-runner-body";

type Bodies = Vec<Vec<ScriptNode>>;

/// Decode a complete `-oX` document. The input bytes are kept on the returned
/// run so that it can be exported verbatim later.
pub fn parse_run(xml: &[u8]) -> Result<Run> {
    let (skeleton, bodies) = split_script_bodies(xml)?;
    let mut run: Run = quick_xml::de::from_reader(skeleton.as_slice())?;
    attach_script_bodies(&mut run, bodies);
    run.raw_xml = xml.to_vec();
    Ok(run)
}

/// Copy `xml` with every script body cut out, decoding the bodies on the way.
fn split_script_bodies(xml: &[u8]) -> std::result::Result<(Vec<u8>, Bodies), DeError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut skeleton = Vec::with_capacity(xml.len());
    let mut bodies = Vec::new();
    let mut copied = 0;

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == SCRIPT_TAG => {
                // `<` + name and attributes + `>`
                let tag_end = reader.buffer_position() as usize;
                let tag_start = tag_end - e.len() - 2;
                skeleton.extend_from_slice(&xml[copied..tag_start]);
                skeleton.push(b'<');
                skeleton.extend_from_slice(&e);
                skeleton.extend_from_slice(format!(" {BODY_ATTR}=\"{}\"/>", bodies.len()).as_bytes());

                bodies.push(read_script_body(&mut reader)?);
                copied = reader.buffer_position() as usize;
            }
            Event::Eof => break,
            _ => {}
        }
    }
    skeleton.extend_from_slice(&xml[copied..]);
    Ok((skeleton, bodies))
}

/// Read the children of an open `<script>` up to and including its end tag.
fn read_script_body<R: BufRead>(reader: &mut Reader<R>) -> std::result::Result<Vec<ScriptNode>, DeError> {
    let mut buf = Vec::new();
    let mut top = Vec::new();
    let mut open: Vec<Table> = Vec::new();

    loop {
        buf.clear();
        let node = match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                TABLE_TAG => {
                    open.push(Table::new(key_of(&e)?));
                    continue;
                }
                ELEM_TAG => {
                    let key = key_of(&e)?;
                    ScriptNode::Element(Element {
                        key,
                        value: read_elem_text(reader)?,
                    })
                }
                _ => {
                    let end = e.to_end().into_owned();
                    reader.read_to_end_into(end.name(), &mut Vec::new())?;
                    continue;
                }
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                TABLE_TAG => ScriptNode::Table(Table::new(key_of(&e)?)),
                ELEM_TAG => ScriptNode::Element(Element {
                    key: key_of(&e)?,
                    value: String::new(),
                }),
                _ => continue,
            },
            // End names are checked by the reader, so this closes the innermost
            // open table, or the script itself.
            Event::End(_) => match open.pop() {
                Some(table) => ScriptNode::Table(table),
                None => return Ok(top),
            },
            Event::Eof => return Err(DeError::UnexpectedEof),
            _ => continue,
        };
        match open.last_mut() {
            Some(parent) => parent.nodes.push(node),
            None => top.push(node),
        }
    }
}

/// Text of an open `<elem>`, whitespace included, up to its end tag.
fn read_elem_text<R: BufRead>(reader: &mut Reader<R>) -> std::result::Result<String, DeError> {
    let mut buf = Vec::new();
    let mut value = String::new();
    loop {
        buf.clear();
        match reader.read_event_into(&mut buf)? {
            Event::Text(t) => value.push_str(&t.unescape()?),
            Event::CData(c) => value.push_str(&reader.decoder().decode(&c)?),
            Event::Start(e) => {
                let end = e.to_end().into_owned();
                reader.read_to_end_into(end.name(), &mut Vec::new())?;
            }
            Event::End(_) => return Ok(value),
            Event::Eof => return Err(DeError::UnexpectedEof),
            _ => {}
        }
    }
}

fn key_of(e: &BytesStart<'_>) -> std::result::Result<Option<String>, DeError> {
    Ok(match e.try_get_attribute("key")? {
        Some(attr) => Some(attr.unescape_value()?.into_owned()),
        None => None,
    })
}

fn attach_script_bodies(run: &mut Run, mut bodies: Bodies) {
    let mut attach = |script: &mut Script| {
        if let Some(body) = script.body.take().and_then(|i| bodies.get_mut(i)) {
            script.nodes = std::mem::take(body);
        }
    };
    run.pre_scripts.scripts.iter_mut().for_each(&mut attach);
    for host in &mut run.hosts {
        for port in &mut host.ports.ports {
            port.scripts.iter_mut().for_each(&mut attach);
        }
        host.host_scripts.scripts.iter_mut().for_each(&mut attach);
    }
    run.post_scripts.scripts.iter_mut().for_each(&mut attach);
}

impl Run {
    /// The document as nmap produced it; empty for runs that were not parsed.
    pub fn raw_xml(&self) -> &[u8] {
        &self.raw_xml
    }

    /// Write the original document to `path`.
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, &self.raw_xml)?;
        Ok(())
    }

    /// Re-encode the typed tree. Empty timestamps and empty optional fields are omitted.
    ///
    /// Unlike decoding, encoding recurses once per table level; use
    /// [`Run::to_file`] to export documents with pathologically deep script output.
    pub fn to_xml(&self) -> Result<String> {
        Ok(quick_xml::se::to_string(self)?)
    }
}
