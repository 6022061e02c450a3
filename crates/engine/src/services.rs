//! Per-engine handles the operations use to reach the outside world:
//! the notification queue, the log, async requests, and the shared
//! context services.

use crate::context::EngineContext;
use crate::engine::EngineShared;
use crate::event::EngineEvent;
use crate::notification::{AsyncRequest, AsyncRequestNotification, Notification};
use crossbeam_channel::Sender;
use logging::MessageKind;
use protocol::TransferDirection;
use std::sync::Arc;

/// Cheap-to-clone bundle of everything an operation may call out to.
#[derive(Clone)]
pub(crate) struct Services {
    pub ctx: EngineContext,
    pub shared: Arc<EngineShared>,
    pub engine_id: u64,
    pub events: Sender<EngineEvent>,
    /// Bumped per connection attempt; stamps socket events.
    pub socket_generation: Arc<std::sync::atomic::AtomicU64>,
}

impl Services {
    /// Queues a notification and wakes the UI on the idle to non-empty
    /// transition.
    pub fn notify(&self, notification: Notification) {
        self.shared.push_notification(notification);
    }

    /// Logs to the file sink (honouring the debug level) and mirrors the
    /// line into the notification queue.
    pub fn log(&self, kind: MessageKind, text: String) {
        let options = self.ctx.options();
        if !kind.passes(options.debug_level, options.raw_listing_log) {
            return;
        }
        self.ctx.log().log(self.engine_id, kind, &text);
        self.notify(Notification::Log { kind, text });
    }

    /// Issues an async request; the returned id correlates the reply.
    pub fn request_async(&self, request: AsyncRequest) -> u64 {
        let request_id = self.ctx.allocate_request_id();
        self.shared.set_pending_request(request_id);
        self.notify(Notification::AsyncRequest(AsyncRequestNotification {
            request_id,
            request,
        }));
        request_id
    }

    /// Ticks the edge-triggered activity indicator; notifies only on
    /// the inactive-to-active edge.
    pub fn set_activity(&self, direction: TransferDirection) {
        if self.shared.set_activity(direction) {
            self.notify(Notification::ActiveTransfer { direction });
        }
    }

    /// Event sink handed to transport sockets; posts into this engine's
    /// queue, stamped with the current connection generation.
    pub fn socket_sink(&self) -> transport::socket::EventSink {
        let tx = self.events.clone();
        let generation = self
            .socket_generation
            .load(std::sync::atomic::Ordering::SeqCst);
        Arc::new(move |event| {
            let _ = tx.send(EngineEvent::Socket { generation, event });
        })
    }

    /// Socket tuning derived from the engine options.
    pub fn socket_options(&self) -> transport::SocketOptions {
        let options = self.ctx.options();
        transport::SocketOptions {
            connect_timeout: if options.timeout.is_zero() {
                std::time::Duration::from_secs(30)
            } else {
                options.timeout
            },
            ..transport::SocketOptions::default()
        }
    }
}
