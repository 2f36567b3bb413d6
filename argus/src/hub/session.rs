// argus/src/hub/session.rs
//
// One live WebSocket subscriber.
//
// The socket is split into a write pump and a read pump that run
// concurrently. The write pump drains the subscriber's hub queue and sends a
// Ping every heartbeat period; the read pump never looks at payloads and only
// enforces a read deadline that each Pong pushes forward. Whichever pump ends
// first ends the session, and dropping the Registration unregisters from the
// hub exactly once.

use std::fmt::Display;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::hub::{Frame, HubHandle};

pub async fn serve(socket: WebSocket, hub: HubHandle, config: SessionConfig, cancel: CancellationToken) {
    let (sink, stream) = socket.split();
    run_session(sink, stream, hub, config, cancel).await
}

/// Drives one subscriber over any split transport until either pump ends.
pub async fn run_session<S, R, E>(
    sink:   S,
    stream: R,
    hub:    HubHandle,
    config: SessionConfig,
    cancel: CancellationToken,
)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let (registration, queue) = hub.subscribe();

    let (pump, outcome) = tokio::select! {
        r = write_pump(sink, queue, &config, &cancel) => ("write", r),
        r = read_pump(stream, config.pong_wait())     => ("read", r),
    };

    match outcome {
        Ok(())  => debug!(subscriber = registration.id(), pump, "session closed"),
        Err(e)  => debug!(subscriber = registration.id(), pump, "session ended: {}", e),
    }
    drop(registration);
}

pub async fn write_pump<S>(
    mut sink:  S,
    mut queue: mpsc::Receiver<Frame>,
    config:    &SessionConfig,
    cancel:    &CancellationToken,
) -> Result<(), SessionError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let write_wait    = config.write_wait();
    let mut heartbeat = interval_at(Instant::now() + config.heartbeat(), config.heartbeat());

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = send(&mut sink, Message::Close(None), write_wait).await;
                return Ok(());
            }
            frame = queue.recv() => match frame {
                Some(frame) => send(&mut sink, Message::Text(frame.to_string()), write_wait).await?,
                None => {
                    // hub closed our queue (evicted or shutting down)
                    let _ = send(&mut sink, Message::Close(None), write_wait).await;
                    return Ok(());
                }
            },
            _ = heartbeat.tick() => send(&mut sink, Message::Ping(Vec::new()), write_wait).await?,
        }
    }
}

pub async fn read_pump<R, E>(mut stream: R, pong_wait: Duration) -> Result<(), SessionError>
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let mut deadline = Instant::now() + pong_wait;
    loop {
        match timeout_at(deadline, stream.next()).await {
            Err(_)                         => return Err(SessionError::ReadDeadline(pong_wait)),
            Ok(None)                       => return Ok(()),
            Ok(Some(Err(e)))               => return Err(SessionError::Read(e.to_string())),
            Ok(Some(Ok(Message::Close(_)))) => return Ok(()),
            Ok(Some(Ok(Message::Pong(_)))) => deadline = Instant::now() + pong_wait,
            Ok(Some(Ok(_)))                => {}
        }
    }
}

async fn send<S>(sink: &mut S, message: Message, wait: Duration) -> Result<(), SessionError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match timeout(wait, sink.send(message)).await {
        Ok(Ok(()))  => Ok(()),
        Ok(Err(e))  => Err(SessionError::Write(e.to_string())),
        Err(_)      => Err(SessionError::WriteTimeout(wait)),
    }
}
