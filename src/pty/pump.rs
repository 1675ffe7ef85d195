//! Blocking PTY handles bridged onto channels.

use std::io::{ErrorKind, Read, Write};

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Bytes requested from the PTY per read.
const CHUNK_SIZE: usize = 4096;

/// Copy PTY output into `chunks` until the terminal closes.
///
/// Returns once the PTY reports end of file (EIO on Unix, once the last
/// process holding the slave side is gone), a read fails, or the
/// receiving side of `chunks` is dropped.
pub async fn pump_output<R>(reader: R, chunks: mpsc::Sender<Vec<u8>>)
where
    R: Read + Send + 'static,
{
    let task = tokio::task::spawn_blocking(move || read_chunks(reader, &chunks));
    if let Err(e) = task.await {
        warn!(error = %e, "output pump stopped abnormally");
    }
}

fn read_chunks<R: Read>(mut reader: R, chunks: &mpsc::Sender<Vec<u8>>) {
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if is_closed(&e) => break,
            Err(e) => {
                warn!(error = %e, "reading terminal output failed");
                break;
            }
        };
        trace!(bytes = n, "terminal output");
        if chunks.blocking_send(buf[..n].to_vec()).is_err() {
            break;
        }
    }
    debug!("terminal output closed");
}

#[cfg(unix)]
fn is_closed(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(libc::EIO)
}

#[cfg(not(unix))]
fn is_closed(_e: &std::io::Error) -> bool {
    false
}

/// Write every chunk received on `input` to the PTY.
///
/// Stops when all senders are dropped or a write fails, and hands the
/// writer back.
pub async fn pump_input<W>(writer: W, input: mpsc::Receiver<Vec<u8>>) -> Option<W>
where
    W: Write + Send + 'static,
{
    let task = tokio::task::spawn_blocking(move || write_chunks(writer, input));
    match task.await {
        Ok(writer) => Some(writer),
        Err(e) => {
            warn!(error = %e, "input pump stopped abnormally");
            None
        }
    }
}

fn write_chunks<W: Write>(mut writer: W, mut input: mpsc::Receiver<Vec<u8>>) -> W {
    while let Some(bytes) = input.blocking_recv() {
        trace!(bytes = bytes.len(), "terminal input");
        if let Err(e) = writer.write_all(&bytes).and_then(|()| writer.flush()) {
            if e.kind() != ErrorKind::BrokenPipe {
                warn!(error = %e, "writing terminal input failed");
            }
            break;
        }
    }
    writer
}
