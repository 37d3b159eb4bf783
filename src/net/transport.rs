// Peer transport: one TCP connection per request, request packet in,
// reply packet out, connection closed. No persistent peer sessions, no
// handshake, no broadcast fan-out tracking — a node that wants to tell
// its peers about a new block dials each of them in turn.
//
// Grounded in the listener/dial shape of the source's P2P node (bind,
// accept loop, spawn a task per connection) but stripped of everything
// that shape carried for a stateful gossip network: handshake stages,
// peer tables, Tor bootstrap.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use crate::config::WAITTIME_SECS;
use crate::error::TransportError;
use crate::net::protocol::{read_packet, write_packet, Packet};

/// Binds `addr` and hands each inbound packet to `handler`, writing back
/// whatever packet it returns. Runs until the process is torn down or the
/// listener errors; callers typically spawn this on its own task.
pub async fn listen<F, Fut>(addr: SocketAddr, handler: F) -> Result<(), TransportError>
where
    F: Fn(Packet) -> Fut + Clone + Send + Sync + 'static,
    Fut: std::future::Future<Output = Packet> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    loop {
        let (mut stream, _peer) = listener.accept().await?;
        let handler = handler.clone();
        tokio::spawn(async move {
            let request = match read_packet(&mut stream).await {
                Ok(pkt) => pkt,
                Err(_) => return,
            };
            let reply = handler(request).await;
            let _ = write_packet(&mut stream, &reply).await;
        });
    }
}

/// Dials `addr`, sends `pkt`, and waits up to `WAITTIME_SECS` for a reply.
/// A fresh connection every call — no connection pooling or reuse.
pub async fn send(addr: SocketAddr, pkt: &Packet) -> Result<Packet, TransportError> {
    let connect = TcpStream::connect(addr);
    let mut stream = timeout(Duration::from_secs(WAITTIME_SECS), connect)
        .await
        .map_err(|_| TransportError::Timeout)??;

    write_packet(&mut stream, pkt).await?;

    timeout(Duration::from_secs(WAITTIME_SECS), read_packet(&mut stream))
        .await
        .map_err(|_| TransportError::Timeout)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol::Opcode;

    #[tokio::test]
    async fn test_send_receives_handler_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        tokio::spawn(listen(addr, |pkt: Packet| async move {
            assert_eq!(pkt.option, Opcode::GetLHash as i32);
            Packet::reply("echoed")
        }));

        tokio::time::sleep(Duration::from_millis(50)).await;

        let reply = send(addr, &Packet::new(Opcode::GetLHash, "")).await.unwrap();
        assert_eq!(reply.data, "echoed");
    }

    #[tokio::test]
    async fn test_send_times_out_on_unreachable_peer() {
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let result = send(addr, &Packet::new(Opcode::Wakeup, "")).await;
        assert!(result.is_err());
    }
}
