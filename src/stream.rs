//! Draining of nmap's stdout and stderr pipes.
//!
//! Each pipe is drained by exactly one task, which owns its accumulation
//! buffer and hands it back through its `JoinHandle`.
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tracing::warn;

use crate::progress;
use crate::types::TaskProgress;

const CHUNK_SIZE: usize = 8 * 1024;
const TEE_CAPACITY: usize = 64 * 1024;

/// Caller-supplied callback for live `<taskprogress>` snapshots.
pub type ProgressHandler = Arc<dyn Fn(TaskProgress) + Send + Sync>;

/// Caller-supplied destination that receives a copy of the raw XML stream.
pub type RawSink = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

/// Everything one pipe produced.
#[derive(Debug, Default)]
pub(crate) struct Drained {
    pub bytes: Vec<u8>,
    pub warnings: Vec<String>,
}

/// Drain stdout into a buffer, forwarding copies to the chunk channel and raw
/// sink. With a progress handler, the bytes are also teed into the progress
/// decoder, which runs alongside the reader on this same task.
pub(crate) async fn drain_stdout<R>(
    pipe: R,
    chunks: Option<UnboundedSender<Vec<u8>>>,
    sink: Option<RawSink>,
    progress: Option<ProgressHandler>,
) -> Drained
where
    R: AsyncRead + Unpin,
{
    let Some(handler) = progress else {
        return pump(pipe, "stdout", chunks, sink, None).await;
    };

    let (tee_writer, tee_reader) = tokio::io::duplex(TEE_CAPACITY);
    let (mut drained, decoded) = tokio::join!(
        pump(pipe, "stdout", chunks, sink, Some(tee_writer)),
        progress::decode_progress(BufReader::new(tee_reader), |p| handler(p)),
    );
    if let Err(e) = decoded {
        warn!(error = %e, "progress decoding stopped early");
        drained.warnings.push(format!("progress decoding stopped: {e}"));
    }
    drained
}

/// Drain stderr into a buffer, forwarding copies to the chunk channel.
pub(crate) async fn drain_stderr<R>(pipe: R, chunks: Option<UnboundedSender<Vec<u8>>>) -> Drained
where
    R: AsyncRead + Unpin,
{
    pump(pipe, "stderr", chunks, None, None).await
}

/// Copy `pipe` to end of stream. Every destination gets every byte in order;
/// a destination that fails is dropped and the rest keep going. The chunk
/// sender is dropped on return, which closes the channel.
async fn pump<R>(
    mut pipe: R,
    name: &str,
    chunks: Option<UnboundedSender<Vec<u8>>>,
    mut sink: Option<RawSink>,
    mut tee: Option<DuplexStream>,
) -> Drained
where
    R: AsyncRead + Unpin,
{
    let mut drained = Drained::default();
    let mut chunk = vec![0u8; CHUNK_SIZE];

    loop {
        let n = match pipe.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                drained.warnings.push(format!("reading nmap {name} failed: {e}"));
                break;
            }
        };
        let bytes = &chunk[..n];
        drained.bytes.extend_from_slice(bytes);

        if let Some(tx) = &chunks {
            // A dropped receiver only means nobody is listening any more.
            let _ = tx.send(bytes.to_vec());
        }
        let tee_closed = match tee.as_mut() {
            Some(writer) => writer.write_all(bytes).await.is_err(),
            None => false,
        };
        if tee_closed {
            tee = None;
        }
        let sink_failed = match &sink {
            Some(out) => out.lock().await.write_all(bytes).await.err(),
            None => None,
        };
        if let Some(e) = sink_failed {
            warn!(error = %e, "raw output sink failed");
            drained.warnings.push(format!("writing raw nmap output failed: {e}"));
            sink = None;
        }
    }

    // Closing the tee is what lets the progress decoder see end of stream.
    drop(tee);
    if let Some(out) = &sink {
        if let Err(e) = out.lock().await.flush().await {
            drained.warnings.push(format!("flushing raw nmap output failed: {e}"));
        }
    }
    drained
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn every_destination_sees_every_byte() {
        let input: &[u8] = b"<nmaprun><taskprogress task=\"t\" percent=\"56.66\"/></nmaprun>";
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (sink_writer, mut sink_reader) = tokio::io::duplex(4096);
        let sink: RawSink = Arc::new(Mutex::new(
            Box::new(sink_writer) as Box<dyn AsyncWrite + Send + Unpin>
        ));
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let seen_in_handler = Arc::clone(&seen);
        let handler: ProgressHandler =
            Arc::new(move |p: TaskProgress| seen_in_handler.lock().unwrap().push(p.percent));

        let drained = drain_stdout(input, Some(tx), Some(sink.clone()), Some(handler)).await;
        assert_eq!(drained.bytes, input);
        assert!(drained.warnings.is_empty());

        let mut forwarded = Vec::new();
        while let Some(chunk) = rx.recv().await {
            forwarded.extend(chunk);
        }
        assert_eq!(forwarded, input);

        drop(sink);
        let mut copied = Vec::new();
        sink_reader.read_to_end(&mut copied).await.unwrap();
        assert_eq!(copied, input);

        assert_eq!(*seen.lock().unwrap(), vec![56.66]);
    }

    #[tokio::test]
    async fn decoder_failure_does_not_stall_the_pipe() {
        // Larger than the tee buffer so the pump would block on a dead decoder.
        let mut input = b"<a></b>".to_vec();
        input.extend(std::iter::repeat(b' ').take(TEE_CAPACITY * 3));
        let handler: ProgressHandler = Arc::new(|_: TaskProgress| {});

        let drained = drain_stdout(input.as_slice(), None, None, Some(handler)).await;
        assert_eq!(drained.bytes.len(), input.len());
        assert_eq!(drained.warnings.len(), 1);
        assert!(drained.warnings[0].starts_with("progress decoding stopped"));
    }

    #[tokio::test]
    async fn stderr_channel_closes_at_end_of_stream() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let drained = drain_stderr(&b"Warning: something\n"[..], Some(tx)).await;
        assert_eq!(drained.bytes, b"Warning: something\n");
        assert_eq!(rx.recv().await, Some(b"Warning: something\n".to_vec()));
        assert_eq!(rx.recv().await, None);
    }
}
