//! Forwarding of child output pipes onto the log bus.

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::{LogBus, LogChunk, OutputStream};

const READ_BUFFER: usize = 8 * 1024;

/// Spawn a task that republishes everything read from `pipe`.
///
/// Each successful read becomes one chunk. Multi-byte characters split
/// across reads are held back until complete.
pub(crate) fn spawn_forwarder<R>(
    pipe: R,
    project_id: String,
    stream: OutputStream,
    bus: LogBus,
    mirror: bool,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut pipe = pipe;
        let mut buf = vec![0u8; READ_BUFFER];
        let mut pending: Vec<u8> = Vec::new();

        loop {
            let n = match pipe.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    warn!(project_id = %project_id, %stream, error = %e, "Output read failed");
                    break;
                }
            };
            pending.extend_from_slice(&buf[..n]);

            let take = complete_prefix_len(&pending);
            if take == 0 {
                continue;
            }
            let data = String::from_utf8_lossy(&pending[..take]).into_owned();
            pending.drain(..take);
            emit(&bus, &project_id, stream, data, mirror).await;
        }

        if !pending.is_empty() {
            let data = String::from_utf8_lossy(&pending).into_owned();
            emit(&bus, &project_id, stream, data, mirror).await;
        }
        debug!(project_id = %project_id, %stream, "Output reader finished");
    })
}

async fn emit(bus: &LogBus, project_id: &str, stream: OutputStream, data: String, mirror: bool) {
    if mirror {
        info!(target: "launchpad::output", project_id, %stream, "{}", data.trim_end());
    }
    bus.publish(project_id, LogChunk { stream, data }).await;
}

/// Length of the longest prefix that does not end inside a UTF-8 sequence.
///
/// Invalid bytes are not held back; they are replaced when decoded.
fn complete_prefix_len(bytes: &[u8]) -> usize {
    match std::str::from_utf8(bytes) {
        Ok(_) => bytes.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => bytes.len(),
    }
}
