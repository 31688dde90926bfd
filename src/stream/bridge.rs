// Blocking capture loop → async consumer.

use bytes::Bytes;
use tokio::task::JoinHandle;
use tracing::debug;

use super::FrameStream;

/// Chunks produced by a capture worker. Dropping `chunks` stops the worker
/// at its next send, which drops the stream and releases the camera.
pub struct LiveFeed {
    pub chunks: flume::Receiver<Bytes>,
    pub worker: JoinHandle<()>,
}

/// Run `stream` on tokio's blocking pool. Must be called from inside a
/// tokio runtime.
pub fn spawn(stream: FrameStream, depth: usize) -> LiveFeed {
    let (tx, rx) = flume::bounded(depth.max(1));
    let index = stream.camera_index();

    let worker = tokio::task::spawn_blocking(move || {
        for chunk in stream {
            if tx.send(chunk).is_err() {
                debug!("Consumer of camera {} went away", index);
                break;
            }
        }
        debug!("Capture worker for camera {} finished", index);
    });

    LiveFeed { chunks: rx, worker }
}
