use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

use crate::gelf::message;
use crate::ingest::Ingestor;

/// Per-connection accumulation cap. A producer that never sends a null byte
/// gets its connection dropped instead of growing the buffer without bound.
const MAX_CONNECTION_BUFFER: usize = 16 * 1024 * 1024;

const READ_CHUNK: usize = 4096;

/// Accept loop for GELF over TCP. Each connection carries null-terminated
/// JSON messages; accept errors are logged and the loop keeps going.
pub async fn run_tcp_server(listener: TcpListener, ingestor: Arc<Ingestor>) {
    info!(addr = ?listener.local_addr().ok(), "GELF TCP server listening");

    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                tokio::spawn(handle_connection(socket, peer, ingestor.clone()));
            }
            Err(e) => {
                error!(error = %e, "error accepting GELF connection");
            }
        }
    }
}

async fn handle_connection(mut socket: TcpStream, peer: SocketAddr, ingestor: Arc<Ingestor>) {
    let mut buffer: Vec<u8> = Vec::with_capacity(2 * READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) => return,
            Ok(n) => n,
            Err(e) => {
                error!(peer = %peer, error = %e, "error reading GELF connection");
                return;
            }
        };

        buffer.extend_from_slice(&chunk[..n]);

        for frame in drain_frames(&mut buffer) {
            match message::parse(&frame) {
                Ok(msg) => {
                    if let Err(e) = ingestor.process_gelf(msg).await {
                        error!(peer = %peer, error = %e, "error processing GELF message");
                    }
                }
                Err(e) => {
                    warn!(peer = %peer, error = %e, "dropping malformed GELF message");
                }
            }
        }

        if buffer.len() > MAX_CONNECTION_BUFFER {
            warn!(
                peer = %peer,
                buffered = buffer.len(),
                "GELF connection exceeded buffer limit without a message terminator, closing"
            );
            return;
        }
    }
}

/// Pull every complete null-terminated frame out of the accumulation buffer,
/// leaving any trailing partial message in place. Empty frames (consecutive
/// null bytes) are skipped.
fn drain_frames(buffer: &mut Vec<u8>) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();

    while let Some(idx) = buffer.iter().position(|&b| b == 0) {
        let rest = buffer.split_off(idx + 1);
        let mut frame = std::mem::replace(buffer, rest);
        frame.pop();
        if !frame.is_empty() {
            frames.push(frame);
        }
    }

    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_frame() {
        let mut buffer = b"{\"short_message\":\"a\"}\0".to_vec();
        let frames = drain_frames(&mut buffer);
        assert_eq!(frames, vec![b"{\"short_message\":\"a\"}".to_vec()]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_partial_frame_stays_buffered() {
        let mut buffer = b"{\"short_mes".to_vec();
        assert!(drain_frames(&mut buffer).is_empty());
        assert_eq!(buffer, b"{\"short_mes".to_vec());
    }

    #[test]
    fn test_terminator_split_across_reads() {
        // First read delivers the message body, second read the null byte.
        let mut buffer = b"{\"a\":1}".to_vec();
        assert!(drain_frames(&mut buffer).is_empty());

        buffer.extend_from_slice(b"\0");
        let frames = drain_frames(&mut buffer);
        assert_eq!(frames, vec![b"{\"a\":1}".to_vec()]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_one_read() {
        let mut buffer = b"one\0two\0thr".to_vec();
        let frames = drain_frames(&mut buffer);
        assert_eq!(frames, vec![b"one".to_vec(), b"two".to_vec()]);
        assert_eq!(buffer, b"thr".to_vec());
    }

    #[test]
    fn test_empty_frames_are_skipped() {
        let mut buffer = b"\0\0one\0\0".to_vec();
        let frames = drain_frames(&mut buffer);
        assert_eq!(frames, vec![b"one".to_vec()]);
        assert!(buffer.is_empty());
    }
}
