//! Live `<taskprogress>` extraction from a still-growing `-oX` stream.
//!
//! The handler runs on the decoding task itself. A slow handler holds up the
//! decoder, and through the tee the stdout reader, but never loses data.
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tokio::io::AsyncBufRead;

use crate::error::Result;
use crate::types::TaskProgress;

const PROGRESS_TAG: &[u8] = b"taskprogress";

/// Read `input` until end of stream, calling `on_progress` for every
/// `<taskprogress>` element in document order.
///
/// Returns `Ok(())` at end of stream. Any other decoding failure ends the loop
/// and is returned; progress already delivered stays delivered.
pub async fn decode_progress<R, F>(input: R, mut on_progress: F) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    F: FnMut(TaskProgress),
{
    let mut reader = Reader::from_reader(input);
    let mut buf = Vec::new();
    let mut skip = Vec::new();

    loop {
        buf.clear();
        let found = match reader.read_event_into_async(&mut buf).await? {
            Event::Empty(e) if is_progress(&e) => Some((decode_element(&e)?, None)),
            Event::Start(e) if is_progress(&e) => {
                Some((decode_element(&e)?, Some(e.to_end().into_owned())))
            }
            Event::Eof => return Ok(()),
            _ => None,
        };
        let Some((progress, open)) = found else {
            continue;
        };
        if let Some(end) = open {
            skip.clear();
            reader.read_to_end_into_async(end.name(), &mut skip).await?;
        }
        on_progress(progress);
    }
}

fn is_progress(e: &BytesStart<'_>) -> bool {
    e.local_name().as_ref() == PROGRESS_TAG
}

/// Decode the attributes of one progress element with the same codec the full
/// document parse uses.
fn decode_element(e: &BytesStart<'_>) -> Result<TaskProgress> {
    let mut raw = Vec::with_capacity(e.len() + 3);
    raw.push(b'<');
    raw.extend_from_slice(e);
    raw.extend_from_slice(b"/>");
    Ok(quick_xml::de::from_reader(raw.as_slice())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(xml: &'static str) -> (Vec<TaskProgress>, Result<()>) {
        let mut seen = Vec::new();
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let res = rt.block_on(decode_progress(xml.as_bytes(), |p| seen.push(p)));
        (seen, res)
    }

    #[test]
    fn reports_each_progress_element_in_order() {
        let (seen, res) = collect(
            r#"<?xml version="1.0"?>
<nmaprun scanner="nmap">
<taskbegin task="Ping Scan" time="1700000000"/>
<taskprogress task="Ping Scan" time="1700000001" percent="12.50" remaining="20" etc="1700000021"/>
<taskprogress task="Ping Scan" time="1700000002" percent="56.66" remaining="9" etc="1700000011"/>
<taskend task="Ping Scan" time="1700000012"/>
</nmaprun>"#,
        );
        assert!(res.is_ok());
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].percent, 12.5);
        assert_eq!(seen[1].percent, 56.66);
        assert_eq!(seen[1].remaining, 9);
        assert_eq!(seen[1].task, "Ping Scan");
        assert_eq!(seen[1].etc.unix(), 1_700_000_011);
    }

    #[test]
    fn unterminated_document_is_not_an_error() {
        let (seen, res) = collect(
            r#"<nmaprun><taskprogress task="SYN Stealth Scan" percent="3.00" remaining="100"/>"#,
        );
        assert!(res.is_ok());
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn non_empty_progress_element_is_consumed_whole() {
        let (seen, res) = collect(
            r#"<nmaprun><taskprogress task="A" percent="1.00"><ignored/></taskprogress><taskprogress task="B" percent="2.00"/></nmaprun>"#,
        );
        assert!(res.is_ok());
        let tasks: Vec<_> = seen.iter().map(|p| p.task.as_str()).collect();
        assert_eq!(tasks, vec!["A", "B"]);
    }

    #[test]
    fn malformed_tail_keeps_earlier_progress() {
        let (seen, res) = collect(
            r#"<nmaprun><taskprogress task="A" percent="40.00"/></mismatched>"#,
        );
        assert_eq!(seen.len(), 1);
        assert!(res.is_err());
    }

    #[test]
    fn bad_attribute_value_is_an_error() {
        let (seen, res) = collect(r#"<nmaprun><taskprogress task="A" percent="lots"/></nmaprun>"#);
        assert!(seen.is_empty());
        assert!(matches!(res, Err(crate::Error::ParseOutput(_))));
    }
}
