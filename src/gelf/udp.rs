use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::{error, info, warn};

use crate::gelf::message;
use crate::ingest::Ingestor;

/// GELF datagrams are typically well under 8 KiB. Chunked GELF (magic bytes
/// 0x1e 0x0f) is not supported; such datagrams fail JSON parsing and drop.
const DATAGRAM_BUFFER: usize = 8192;

/// Receive loop for GELF over UDP: one JSON object per datagram. The payload
/// is copied out of the receive buffer before being handed to a worker task,
/// so slow admissions never corrupt the next datagram.
pub async fn run_udp_server(socket: UdpSocket, ingestor: Arc<Ingestor>) {
    info!(addr = ?socket.local_addr().ok(), "GELF UDP server listening");

    let mut buffer = [0u8; DATAGRAM_BUFFER];
    loop {
        match socket.recv_from(&mut buffer).await {
            Ok((n, peer)) => {
                let payload = buffer[..n].to_vec();
                let ingestor = ingestor.clone();
                tokio::spawn(async move {
                    match message::parse(&payload) {
                        Ok(msg) => {
                            if let Err(e) = ingestor.process_gelf(msg).await {
                                error!(peer = %peer, error = %e, "error processing GELF datagram");
                            }
                        }
                        Err(e) => {
                            warn!(peer = %peer, error = %e, "dropping malformed GELF datagram");
                        }
                    }
                });
            }
            Err(e) => {
                error!(error = %e, "error receiving GELF datagram");
            }
        }
    }
}
