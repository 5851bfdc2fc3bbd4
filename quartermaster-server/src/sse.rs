use std::{
    convert::Infallible,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
    task::{Context, Poll},
    time::Duration,
};

use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive},
        Sse,
    },
    routing::get,
};
use dashmap::DashMap;
use futures_util::Stream;
use log::warn;
use quartermaster_core::{EventReceiver, GuildEvent, PrimaryKey};
use tokio::{sync::mpsc, time::timeout};

use crate::{auth::Session, context::ServerContext, serialized::ToSerialized, Router};

/// How long one delivery may take before the connection is written off
const SEND_TIMEOUT: Duration = Duration::from_secs(1);
const CONNECTION_BUFFER: usize = 64;

/// An outgoing frame before SSE encoding
#[derive(Debug, Clone, PartialEq)]
struct Frame {
    event: Option<&'static str>,
    data: String,
    /// Connection-local sequence number
    id: Option<u64>,
}

/// Manages server sent event connections and fans the event queue out to
/// them
pub struct SseBroadcaster {
    me: Weak<Self>,
    connections: DashMap<u64, Connection>,
    next_connection_id: AtomicU64,
}

struct Connection {
    guild_id: PrimaryKey,
    sink: mpsc::Sender<Frame>,
    next_frame_id: AtomicU64,
}

pub struct ConnectionHandle {
    id: u64,
    receiver: mpsc::Receiver<Frame>,
    /// Required to remove the connection when dropped
    manager: Weak<SseBroadcaster>,
}

impl SseBroadcaster {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            connections: DashMap::new(),
            next_connection_id: AtomicU64::new(0),
        })
    }

    /// Registers a connection scoped to one guild
    fn connect(&self, guild_id: PrimaryKey) -> ConnectionHandle {
        let (sink, receiver) = mpsc::channel(CONNECTION_BUFFER);
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);

        // The hello frame, confirming the stream before any event
        sink.try_send(Frame {
            event: None,
            data: "empty".to_string(),
            id: None,
        })
        .expect("hello fits the fresh buffer");

        self.connections.insert(
            id,
            Connection {
                guild_id,
                sink,
                next_frame_id: AtomicU64::new(1),
            },
        );

        ConnectionHandle {
            id,
            receiver,
            manager: self.me.clone(),
        }
    }

    fn disconnect(&self, id: u64) {
        self.connections.remove(&id);
    }

    /// Drains the event queue for the lifetime of the process,
    /// delivering every event in publish order
    pub async fn run(self: Arc<Self>, mut receiver: EventReceiver) {
        while let Some(event) = receiver.recv().await {
            self.broadcast(&event).await;
        }
    }

    async fn broadcast(&self, event: &GuildEvent) {
        let name = event_name(event);
        let data = event_data(event);

        // Frame ids are claimed before delivery so the map guards are
        // not held across an await point
        let deliveries: Vec<_> = self
            .connections
            .iter()
            .filter(|c| event.guild_id().map_or(true, |g| g == c.guild_id))
            .map(|c| {
                let frame_id = c.next_frame_id.fetch_add(1, Ordering::Relaxed);

                (*c.key(), c.sink.clone(), frame_id)
            })
            .collect();

        for (id, sink, frame_id) in deliveries {
            let frame = Frame {
                event: Some(name),
                data: data.clone(),
                id: Some(frame_id),
            };

            match timeout(SEND_TIMEOUT, sink.send(frame)).await {
                Ok(Ok(())) => {}
                _ => {
                    warn!("Connection {id} is not keeping up, dropping it");
                    self.disconnect(id);
                }
            }
        }
    }
}

fn event_name(event: &GuildEvent) -> &'static str {
    match event {
        GuildEvent::LootLock { .. } => "lock",
        GuildEvent::Requests { .. } => "requests",
        GuildEvent::Loots { .. } => "loots",
        GuildEvent::Items { .. } => "items",
    }
}

fn event_data(event: &GuildEvent) -> String {
    let value = match event {
        GuildEvent::LootLock { locked, .. } => serde_json::to_string(locked),
        GuildEvent::Requests { requests, .. } => serde_json::to_string(&requests.to_serialized()),
        GuildEvent::Loots { loots, .. } => serde_json::to_string(&loots.to_serialized()),
        GuildEvent::Items { items } => serde_json::to_string(&items.to_serialized()),
    };

    value.expect("serializes properly")
}

impl Frame {
    fn into_event(self) -> Event {
        let mut event = Event::default().data(self.data);

        if let Some(name) = self.event {
            event = event.event(name);
        }

        if let Some(id) = self.id {
            event = event.id(id.to_string());
        }

        event
    }
}

impl Stream for ConnectionHandle {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.receiver.poll_recv(cx) {
            Poll::Ready(Some(frame)) => Poll::Ready(Some(Ok(frame.into_event()))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.disconnect(self.id)
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/events",
    tag = "events",
    params(
        ("key" = String, Query, description = "The player key to scope the stream with")
    ),
    responses(
        (
            status = 200,
            content_type = "text/event-stream",
            description = "A stream of push updates for the player's guild"
        )
    )
)]
pub(crate) async fn event_stream(
    session: Session,
    State(context): State<ServerContext>,
) -> Sse<ConnectionHandle> {
    Sse::new(context.sse.connect(session.guild().id)).keep_alive(KeepAlive::default())
}

pub fn router() -> Router {
    Router::new().route("/", get(event_stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quartermaster_core::event_channel;

    fn lock_event(guild_id: PrimaryKey, locked: bool) -> GuildEvent {
        GuildEvent::LootLock { guild_id, locked }
    }

    #[tokio::test]
    async fn streams_open_with_a_hello_frame() {
        let broadcaster = SseBroadcaster::new();
        let mut handle = broadcaster.connect(1);

        let hello = handle.receiver.recv().await.expect("hello arrives");

        assert_eq!(
            hello,
            Frame {
                event: None,
                data: "empty".to_string(),
                id: None,
            }
        );
    }

    #[tokio::test]
    async fn events_arrive_in_publish_order_with_increasing_ids() {
        let broadcaster = SseBroadcaster::new();
        let (sender, receiver) = event_channel();

        tokio::spawn(broadcaster.clone().run(receiver));

        let mut handle = broadcaster.connect(1);
        let _hello = handle.receiver.recv().await.expect("hello arrives");

        sender.send(lock_event(1, true)).expect("event queues");
        sender.send(lock_event(1, false)).expect("event queues");

        let first = handle.receiver.recv().await.expect("first frame arrives");
        let second = handle.receiver.recv().await.expect("second frame arrives");

        assert_eq!(first.event, Some("lock"));
        assert_eq!(first.data, "true");
        assert_eq!(first.id, Some(1));

        assert_eq!(second.data, "false");
        assert_eq!(second.id, Some(2));
    }

    #[tokio::test]
    async fn events_only_reach_connections_of_the_guild() {
        let broadcaster = SseBroadcaster::new();

        let mut ours = broadcaster.connect(1);
        let mut theirs = broadcaster.connect(2);

        broadcaster.broadcast(&lock_event(1, true)).await;

        let _hello = ours.receiver.recv().await.expect("hello arrives");
        let frame = ours.receiver.recv().await.expect("the event arrives");
        assert_eq!(frame.event, Some("lock"));

        let _hello = theirs.receiver.recv().await.expect("hello arrives");
        assert!(
            theirs.receiver.try_recv().is_err(),
            "the other guild sees nothing"
        );
    }

    #[tokio::test]
    async fn catalog_events_reach_every_connection() {
        let broadcaster = SseBroadcaster::new();

        let mut ours = broadcaster.connect(1);
        let mut theirs = broadcaster.connect(2);

        broadcaster
            .broadcast(&GuildEvent::Items { items: Vec::new() })
            .await;

        let _hello = ours.receiver.recv().await.expect("hello arrives");
        let _hello = theirs.receiver.recv().await.expect("hello arrives");

        assert_eq!(
            ours.receiver.recv().await.expect("frame arrives").event,
            Some("items")
        );
        assert_eq!(
            theirs.receiver.recv().await.expect("frame arrives").event,
            Some("items")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_connections_are_pruned() {
        let broadcaster = SseBroadcaster::new();

        // Never drained; the hello plus the broadcasts below fill its
        // buffer and the next delivery times out
        let _stalled = broadcaster.connect(1);

        for _ in 0..CONNECTION_BUFFER {
            broadcaster.broadcast(&lock_event(1, true)).await;
        }

        assert_eq!(broadcaster.connections.len(), 0);

        // Broadcasting keeps working for a fresh connection
        let mut healthy = broadcaster.connect(1);
        broadcaster.broadcast(&lock_event(1, false)).await;

        let _hello = healthy.receiver.recv().await.expect("hello arrives");
        let frame = healthy.receiver.recv().await.expect("frame arrives");

        assert_eq!(frame.data, "false");
    }

    #[tokio::test]
    async fn dropping_a_handle_removes_its_registration() {
        let broadcaster = SseBroadcaster::new();

        let handle = broadcaster.connect(1);
        assert_eq!(broadcaster.connections.len(), 1);

        drop(handle);
        assert_eq!(broadcaster.connections.len(), 0);
    }
}
