//! Implements a three-stage "pinger" task that tracks liveness of the
//! connection based on time since the last byte was received from the
//! server. We never send outbound `PING`s ourselves (the server does); we
//! just watch the clock and tell the main loop when to worry.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

/// Seconds of silence after which we tell the UI we might be pinged out.
pub(crate) const IO_PING_MIN: u64 = 150;
/// Seconds between "still pinged" reminders once `IO_PING_MIN` has passed.
pub(crate) const IO_PING_REFRESH: u64 = 5;
/// Seconds of silence after which we give up and reconnect.
pub(crate) const IO_PING_MAX: u64 = 300;

pub(crate) struct Pinger {
    snd_rst: mpsc::Sender<()>,
}

#[derive(Debug)]
pub(crate) enum Event {
    /// We've been quiet for `IO_PING_MIN` seconds; surface this to the UI.
    /// Carries seconds since last byte, refreshed every `IO_PING_REFRESH`
    /// seconds so the UI can show a live counter.
    Pinged { secs_since_last_recv: u64 },
    /// We've been quiet for `IO_PING_MAX` seconds; the connection is dead.
    Disconnect,
}

async fn pinger_task(rcv_rst: mpsc::Receiver<()>, snd_ev: mpsc::Sender<Event>) {
    let mut rcv_rst_fused = ReceiverStream::new(rcv_rst).fuse();
    let mut secs_since_last_recv: u64 = 0;

    loop {
        match timeout(
            Duration::from_secs(IO_PING_REFRESH),
            rcv_rst_fused.next(),
        )
        .await
        {
            Err(_) => {
                secs_since_last_recv += IO_PING_REFRESH;
                if secs_since_last_recv >= IO_PING_MAX {
                    let _ = snd_ev.try_send(Event::Disconnect);
                    return;
                }
                if secs_since_last_recv >= IO_PING_MIN {
                    let _ = snd_ev.try_send(Event::Pinged {
                        secs_since_last_recv,
                    });
                }
            }
            Ok(None) => {
                // Sender end dropped; client is shutting down this connection.
                return;
            }
            Ok(Some(())) => {
                secs_since_last_recv = 0;
            }
        }
    }
}

impl Pinger {
    pub(crate) fn new() -> (Pinger, mpsc::Receiver<Event>) {
        let (snd_ev, rcv_ev) = mpsc::channel(1);
        // No need for another "reset" when one's already waiting to be processed.
        let (snd_rst, rcv_rst) = mpsc::channel(1);
        tokio::task::spawn_local(pinger_task(rcv_rst, snd_ev));
        (Pinger { snd_rst }, rcv_ev)
    }

    pub(crate) fn reset(&mut self) {
        let _ = self.snd_rst.try_send(());
    }
}
