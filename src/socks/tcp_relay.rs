//! Bidirectional TCP relay
//!
//! Pumps bytes between two streams, one task per direction. The first
//! direction to finish ends the relay; half-closed peers therefore end the
//! session, which matches how SOCKS clients behave in practice.

use crate::error::ProxyError;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

/// Relay data between two streams until either direction terminates or the
/// session is cancelled.
///
/// Each direction runs as its own task so both sides keep independent
/// back-pressure. The first terminal event wins and becomes the result;
/// the losing direction is torn down by aborting its task, which drops the
/// stream halves and closes both endpoints. Both tasks have terminated by
/// the time this returns.
pub async fn relay<A, B>(
    a: A,
    b: B,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<(), ProxyError>
where
    A: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    B: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut a_read, mut a_write) = tokio::io::split(a);
    let (mut b_read, mut b_write) = tokio::io::split(b);

    let (tx, mut rx) = mpsc::channel::<io::Result<u64>>(2);
    let tx_b = tx.clone();

    let a_to_b = tokio::spawn(async move {
        let res = tokio::io::copy(&mut a_read, &mut b_write).await;
        let _ = tx.send(res).await;
    });
    let b_to_a = tokio::spawn(async move {
        let res = tokio::io::copy(&mut b_read, &mut a_write).await;
        let _ = tx_b.send(res).await;
    });

    let outcome = tokio::select! {
        first = rx.recv() => match first {
            Some(Ok(bytes)) => {
                debug!("relay direction finished after {} bytes", bytes);
                Ok(())
            }
            Some(Err(e)) => Err(ProxyError::Io(e)),
            None => Ok(()),
        },
        _ = shutdown.recv() => Err(ProxyError::Cancelled),
    };

    a_to_b.abort();
    b_to_a.abort();
    let _ = a_to_b.await;
    let _ = b_to_a.await;

    outcome
}
