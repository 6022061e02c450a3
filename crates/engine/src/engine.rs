//! The engine facade and its worker loop. The facade is what the
//! embedding application holds: submit a command, pull notifications,
//! answer async requests. The worker thread owns all protocol state.

use crate::cache::ServerKey;
use crate::context::{EngineContext, EngineHandle};
use crate::control_socket::{ControlSocket, DriveOutcome, ProtocolState};
use crate::event::EngineEvent;
use crate::ftp::{self, FtpState};
use crate::http::{self, HttpState};
use crate::notification::{AsyncReply, Notification};
use crate::operation::WireEvent;
use crate::services::Services;
use crate::sftp::{self, SftpState};
use crate::transfer_status::{TransferStatus, TransferStatusCell};
use crossbeam_channel::{Receiver, Sender};
use listing::DirectoryListing;
use logging::MessageKind;
use protocol::{Command, ListFlags, Protocol, ReplyCode, Server, ServerPath, TransferDirection};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Callback the engine invokes once per idle-to-non-empty transition of
/// the notification queue.
pub type WakeupFn = Box<dyn Fn() + Send + Sync>;

struct NotificationQueue {
    queue: VecDeque<Notification>,
    signalled: bool,
}

/// State shared between the facade (application threads) and the
/// engine's worker thread.
pub struct EngineShared {
    engine_id: u64,
    busy: AtomicBool,
    connected: AtomicBool,
    activity: [AtomicBool; 2],
    pending_request: AtomicU64,
    queue: Mutex<NotificationQueue>,
    wakeup: WakeupFn,
    transfer_status: TransferStatusCell,
    server_key: Mutex<Option<ServerKey>>,
    current_path: Mutex<Option<ServerPath>>,
    last_listing_path: Mutex<Option<ServerPath>>,
}

impl EngineShared {
    fn new(engine_id: u64, wakeup: WakeupFn) -> Self {
        Self {
            engine_id,
            busy: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            activity: [AtomicBool::new(false), AtomicBool::new(false)],
            pending_request: AtomicU64::new(0),
            queue: Mutex::new(NotificationQueue {
                queue: VecDeque::new(),
                signalled: false,
            }),
            wakeup,
            transfer_status: TransferStatusCell::default(),
            server_key: Mutex::new(None),
            current_path: Mutex::new(None),
            last_listing_path: Mutex::new(None),
        }
    }

    pub(crate) fn push_notification(&self, notification: Notification) {
        let signal = {
            let mut state = lock(&self.queue);
            state.queue.push_back(notification);
            if state.signalled {
                false
            } else {
                state.signalled = true;
                true
            }
        };
        if signal {
            (self.wakeup)();
        }
    }

    fn pop_notification(&self) -> Option<Notification> {
        let mut state = lock(&self.queue);
        let notification = state.queue.pop_front();
        if state.queue.is_empty() {
            state.signalled = false;
        }
        notification
    }

    /// Sets the direction's activity flag; returns `true` on the edge.
    pub(crate) fn set_activity(&self, direction: TransferDirection) -> bool {
        !self.activity[direction_index(direction)].swap(true, Ordering::Relaxed)
    }

    pub(crate) fn transfer_status(&self) -> &TransferStatusCell {
        &self.transfer_status
    }

    pub(crate) fn set_pending_request(&self, request_id: u64) {
        self.pending_request.store(request_id, Ordering::SeqCst);
    }

    pub(crate) fn set_current_path(&self, path: Option<ServerPath>) {
        *lock(&self.current_path) = path;
    }

    pub(crate) fn current_path(&self) -> Option<ServerPath> {
        lock(&self.current_path).clone()
    }

    pub(crate) fn set_last_listing_path(&self, path: Option<ServerPath>) {
        *lock(&self.last_listing_path) = path;
    }

    pub(crate) fn last_listing_path(&self) -> Option<ServerPath> {
        lock(&self.last_listing_path).clone()
    }

    pub(crate) fn set_server_key(&self, key: Option<ServerKey>) {
        *lock(&self.server_key) = key;
    }

    pub(crate) fn server_key(&self) -> Option<ServerKey> {
        lock(&self.server_key).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

const fn direction_index(direction: TransferDirection) -> usize {
    match direction {
        TransferDirection::Download => 0,
        TransferDirection::Upload => 1,
    }
}

/// One protocol-driving session. At most one command is in flight.
pub struct Engine {
    ctx: EngineContext,
    shared: Arc<EngineShared>,
    events: Sender<EngineEvent>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl Engine {
    /// Creates an engine and its worker thread. `wakeup` fires once per
    /// idle-to-non-empty transition of the notification queue.
    #[must_use]
    pub fn new(ctx: &EngineContext, wakeup: WakeupFn) -> Self {
        let engine_id = ctx.allocate_engine_id();
        let shared = Arc::new(EngineShared::new(engine_id, wakeup));
        let (tx, rx) = crossbeam_channel::unbounded();

        ctx.register_engine(EngineHandle {
            engine_id,
            shared: Arc::downgrade(&shared),
            events: tx.clone(),
        });

        let services = Services {
            ctx: ctx.clone(),
            shared: Arc::clone(&shared),
            engine_id,
            events: tx.clone(),
            socket_generation: Arc::new(std::sync::atomic::AtomicU64::new(0)),
        };
        let worker = std::thread::spawn(move || Worker::new(services, rx).run());

        Self {
            ctx: ctx.clone(),
            shared,
            events: tx,
            worker: Some(worker),
        }
    }

    /// Submits a command. `WOULDBLOCK` means the command was accepted
    /// and a terminal `OperationFinished` notification will follow.
    pub fn execute(&self, command: Command) -> ReplyCode {
        if let Err(error) = command.validate() {
            tracing::debug!(%error, "command rejected");
            return ReplyCode::SYNTAX_ERROR;
        }

        match &command {
            Command::Connect { .. } => {
                if self.is_busy() {
                    return ReplyCode::BUSY;
                }
                if self.is_connected() {
                    return ReplyCode::ALREADY_CONNECTED;
                }
            }
            Command::Disconnect => {
                if !self.is_connected() && !self.is_busy() {
                    return ReplyCode::OK;
                }
            }
            _ => {
                if !self.is_connected() {
                    return ReplyCode::NOT_CONNECTED;
                }
                if self.is_busy() {
                    return ReplyCode::BUSY;
                }
            }
        }

        // Listing short-circuit: serve straight from the cache when the
        // caller does not insist on a refresh.
        if let Command::List {
            path: Some(path),
            subdir,
            flags,
        } = &command
        {
            if subdir.is_empty() && !flags.contains(ListFlags::REFRESH) {
                if let Some(key) = self.shared.server_key() {
                    if let Some(hit) = self.ctx.cache().lookup(&key, path) {
                        let fresh = !hit.outdated && !hit.unsure;
                        if fresh || flags.contains(ListFlags::AVOID) {
                            self.shared.push_notification(Notification::ListingUpdated {
                                path: path.clone(),
                                failed: false,
                                modified: false,
                            });
                            return ReplyCode::OK;
                        }
                    } else if flags.contains(ListFlags::AVOID) {
                        // Nothing cached and the wire is off limits.
                        return ReplyCode::OK;
                    }
                }
            }
        }

        self.shared.busy.store(true, Ordering::SeqCst);
        if self.events.send(EngineEvent::Execute(command)).is_err() {
            self.shared.busy.store(false, Ordering::SeqCst);
            return ReplyCode::INTERNAL_ERROR;
        }
        ReplyCode::WOULDBLOCK
    }

    /// Cancels the command in flight, if any.
    pub fn cancel(&self) -> ReplyCode {
        if !self.is_busy() {
            return ReplyCode::OK;
        }
        if self.events.send(EngineEvent::Cancel).is_err() {
            return ReplyCode::INTERNAL_ERROR;
        }
        ReplyCode::WOULDBLOCK
    }

    /// A command is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.shared.busy.load(Ordering::SeqCst)
    }

    /// A session is established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Edge-triggered activity indicator; reading it resets it.
    #[must_use]
    pub fn is_active(&self, direction: TransferDirection) -> bool {
        self.shared.activity[direction_index(direction)].swap(false, Ordering::Relaxed)
    }

    /// Looks a directory up in the shared cache.
    pub fn cache_lookup(&self, path: &ServerPath) -> Result<DirectoryListing, ReplyCode> {
        let key = self.shared.server_key().ok_or(ReplyCode::NOT_CONNECTED)?;
        self.ctx
            .cache()
            .lookup(&key, path)
            .map(|hit| hit.listing)
            .ok_or(ReplyCode::ERROR)
    }

    /// Answers an outstanding async request. Returns `false` when the
    /// request number is stale.
    pub fn set_async_request_reply(&self, request_id: u64, reply: AsyncReply) -> bool {
        let pending = self.shared.pending_request.load(Ordering::SeqCst);
        if pending != request_id || request_id == 0 {
            return false;
        }
        self.shared.set_pending_request(0);
        self.events
            .send(EngineEvent::AsyncReply { request_id, reply })
            .is_ok()
    }

    /// Pulls the next queued notification.
    #[must_use]
    pub fn next_notification(&self) -> Option<Notification> {
        self.shared.pop_notification()
    }

    /// Snapshot of the transfer status and its changed flag.
    #[must_use]
    pub fn get_transfer_status(&self) -> (Option<TransferStatus>, bool) {
        self.shared.transfer_status.snapshot()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.events.send(EngineEvent::Shutdown);
        self.ctx.deregister_engine(self.shared.engine_id);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Queues a listing-changed event at every peer engine of `origin`
/// whose view includes `path`.
pub(crate) fn notify_peers_listing_changed(
    services: &Services,
    server: &ServerKey,
    path: &ServerPath,
) {
    services.ctx.for_each_peer(services.engine_id, server, |handle| {
        let interested = handle
            .shared
            .upgrade()
            .and_then(|shared| shared.last_listing_path())
            .is_some_and(|last| last.same_dir(path));
        interested.then(|| EngineEvent::PeerListingChanged {
            server: server.clone(),
            path: path.clone(),
        })
    });
}

/// Invalidates the working directory of every peer engine below a
/// removed or renamed directory.
pub(crate) fn notify_peers_path_invalidated(
    services: &Services,
    server: &ServerKey,
    path: &ServerPath,
) {
    services.ctx.for_each_peer(services.engine_id, server, |handle| {
        let affected = handle
            .shared
            .upgrade()
            .and_then(|shared| shared.current_path())
            .is_some_and(|current| current.same_dir(path) || current.is_subdir_of(path));
        affected.then(|| EngineEvent::PeerInvalidatePath {
            server: server.clone(),
            path: path.clone(),
        })
    });
}

struct Worker {
    services: Services,
    rx: Receiver<EngineEvent>,
    control: Option<ControlSocket>,
    current_command: Option<Command>,
    retry_count: u32,
    retry_deadline: Option<Instant>,
    keepalive_deadline: Option<Instant>,
}

impl Worker {
    fn new(services: Services, rx: Receiver<EngineEvent>) -> Self {
        Self {
            services,
            rx,
            control: None,
            current_command: None,
            retry_count: 0,
            retry_deadline: None,
            keepalive_deadline: None,
        }
    }

    fn run(mut self) {
        loop {
            let deadline = self.next_deadline();
            let event = match deadline {
                Some(deadline) => {
                    let timeout = deadline.saturating_duration_since(Instant::now());
                    match self.rx.recv_timeout(timeout) {
                        Ok(event) => Some(event),
                        Err(crossbeam_channel::RecvTimeoutError::Timeout) => None,
                        Err(crossbeam_channel::RecvTimeoutError::Disconnected) => return,
                    }
                }
                None => match self.rx.recv() {
                    Ok(event) => Some(event),
                    Err(_) => return,
                },
            };
            match event {
                Some(EngineEvent::Shutdown) => return,
                Some(event) => self.handle_event(event),
                None => self.handle_timers(),
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        let watchdog = self
            .control
            .as_ref()
            .filter(|control| control.in_command())
            .and_then(|control| control.conn.watchdog_deadline());
        [self.retry_deadline, watchdog, self.keepalive_deadline]
            .into_iter()
            .flatten()
            .min()
    }

    fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Execute(command) => self.begin_command(command),
            EngineEvent::Cancel => self.handle_cancel(),
            EngineEvent::AsyncReply { reply, .. } => {
                let outcome = self
                    .control
                    .as_mut()
                    .map(|control| control.deliver_async_reply(&self.services, reply));
                self.process_outcome(outcome);
            }
            EngineEvent::Socket { generation, event } => {
                let current = self
                    .services
                    .socket_generation
                    .load(std::sync::atomic::Ordering::SeqCst);
                if generation != current {
                    // A socket of a torn-down connection attempt.
                    return;
                }
                let idle_close = !self
                    .control
                    .as_ref()
                    .is_some_and(ControlSocket::in_command);
                if idle_close {
                    if let transport::SocketEventKind::Closed { .. } = event.kind {
                        if event.source == transport::SocketSource::Control {
                            // HTTP stays logically connected; its
                            // transport comes and goes per request.
                            if let Some(control) = self.control.as_mut() {
                                if let ProtocolState::Http(http) = &mut control.session.protocol {
                                    http.connected_to = None;
                                    control.conn.close();
                                    return;
                                }
                            }
                            self.drop_session("Connection closed by server");
                            return;
                        }
                    }
                }
                let outcome = self
                    .control
                    .as_mut()
                    .map(|control| control.handle_socket_event(&self.services, event));
                self.process_outcome(outcome);
            }
            EngineEvent::SftpLine(line) => {
                let event = sftp::parse_helper_line(&line);
                let outcome = self
                    .control
                    .as_mut()
                    .map(|control| control.deliver(&self.services, WireEvent::Sftp(&event)));
                self.process_outcome(outcome);
            }
            EngineEvent::SftpClosed => {
                let in_command = self
                    .control
                    .as_ref()
                    .is_some_and(ControlSocket::in_command);
                if in_command {
                    let outcome = self
                        .control
                        .as_mut()
                        .map(|control| control.deliver(&self.services, WireEvent::SftpClosed));
                    self.process_outcome(outcome);
                } else {
                    self.drop_session("Transfer helper exited");
                }
            }
            EngineEvent::LockGranted { .. } => {
                let outcome = self
                    .control
                    .as_mut()
                    .map(|control| control.deliver(&self.services, WireEvent::LockGranted));
                self.process_outcome(outcome);
            }
            EngineEvent::UploadTick => {
                let outcome = self
                    .control
                    .as_mut()
                    .map(|control| control.deliver(&self.services, WireEvent::UploadTick));
                self.process_outcome(outcome);
            }
            EngineEvent::PeerListingChanged { server, path } => {
                self.services.ctx.cache().touch(&server, &path);
                self.services.notify(Notification::ListingUpdated {
                    path,
                    failed: false,
                    modified: true,
                });
            }
            EngineEvent::PeerInvalidatePath { path, .. } => {
                if let Some(control) = self.control.as_mut() {
                    let affected = control
                        .session
                        .current_path
                        .as_ref()
                        .is_some_and(|current| {
                            current.same_dir(&path) || current.is_subdir_of(&path)
                        });
                    if affected {
                        control.session.current_path = None;
                        self.services.shared.set_current_path(None);
                    }
                }
            }
            EngineEvent::Shutdown => {}
        }
    }

    fn begin_command(&mut self, command: Command) {
        match &command {
            Command::Connect { server, .. } => {
                self.retry_count = 0;
                self.current_command = Some(command.clone());
                self.start_connect(server.clone());
            }
            Command::Disconnect => {
                self.current_command = Some(command);
                if let Some(control) = self.control.as_mut() {
                    if control.in_command() {
                        let outcome = control
                            .tear_down(&self.services, ReplyCode::CANCELED | ReplyCode::DISCONNECTED);
                        if let DriveOutcome::Finished { code, command } = outcome {
                            self.services
                                .notify(Notification::OperationFinished { code, command });
                        }
                    }
                }
                self.drop_session("Disconnected from server");
                self.finish_command(ReplyCode::OK, "disconnect");
            }
            _ => {
                self.current_command = Some(command.clone());
                let logged_in = self
                    .control
                    .as_ref()
                    .is_some_and(|control| control.session.logged_in);
                if !logged_in {
                    self.finish_command(ReplyCode::NOT_CONNECTED, command.name());
                    return;
                }
                let operation = match self.control.as_ref().map(|c| &c.session.protocol) {
                    Some(ProtocolState::Ftp(_)) => ftp::make_operation(&command),
                    Some(ProtocolState::Http(_)) => http::make_operation(&command),
                    Some(ProtocolState::Sftp(_)) => sftp::make_operation(&command),
                    None => None,
                };
                match operation {
                    Some(op) => {
                        let outcome = self
                            .control
                            .as_mut()
                            .map(|control| control.start(&self.services, op));
                        self.process_outcome(outcome);
                    }
                    None => {
                        self.finish_command(ReplyCode::NOT_SUPPORTED, command.name());
                    }
                }
            }
        }
    }

    fn start_connect(&mut self, server: Server) {
        // Invalidate any sockets still reporting for earlier attempts.
        self.services
            .socket_generation
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let timeout = self.services.ctx.options().timeout;
        self.services.shared.set_server_key(Some(ServerKey::of(&server)));
        self.services.log(
            MessageKind::Status,
            format!("Connecting to {server}..."),
        );

        let (protocol_state, op): (ProtocolState, Option<Box<dyn crate::operation::Operation>>) =
            match server.protocol {
                Protocol::Http | Protocol::Https => (ProtocolState::Http(HttpState::new()), None),
                Protocol::Sftp => (
                    ProtocolState::Sftp(SftpState::new()),
                    Some(Box::new(sftp::SftpConnectOp::new(server.clone()))),
                ),
                _ => (
                    ProtocolState::Ftp(FtpState::new()),
                    Some(Box::new(ftp::LogonOp::new(server.clone()))),
                ),
            };

        let mut control = ControlSocket::new(server, protocol_state, timeout);
        match op {
            Some(op) => {
                let outcome = control.start(&self.services, op);
                self.control = Some(control);
                self.process_outcome(Some(outcome));
            }
            None => {
                // HTTP connects lazily, per request.
                control.session.logged_in = true;
                self.control = Some(control);
                self.services.shared.connected.store(true, Ordering::SeqCst);
                self.finish_command(ReplyCode::OK, "connect");
            }
        }
    }

    fn process_outcome(&mut self, outcome: Option<DriveOutcome>) {
        if let Some(DriveOutcome::Finished { code, command }) = outcome {
            self.finish_command(code, command);
        }
    }

    fn finish_command(&mut self, code: ReplyCode, command_name: &'static str) {
        let is_connect = matches!(self.current_command, Some(Command::Connect { .. }));

        if is_connect {
            if code.is_ok() {
                if let Some(control) = self.control.as_ref() {
                    self.services
                        .ctx
                        .failed_logins()
                        .clear(&control.session.server);
                }
                self.services.shared.connected.store(true, Ordering::SeqCst);
                self.retry_deadline = None;
                self.arm_keepalive();
            } else if !code.was_canceled() {
                let (server, retry_allowed) = match &self.current_command {
                    Some(Command::Connect { server, retry }) => (Some(server.clone()), *retry),
                    _ => (None, false),
                };
                if let Some(server) = server {
                    self.services
                        .ctx
                        .failed_logins()
                        .record(&server, code.is_critical());
                    let options = self.services.ctx.options();
                    if retry_allowed
                        && !code.is_critical()
                        && !code.intersects(ReplyCode::PASSWORD_FAILED)
                        && self.retry_count < options.reconnect_count
                    {
                        self.retry_count += 1;
                        let delay = self
                            .services
                            .ctx
                            .failed_logins()
                            .remaining_delay(&server, options.reconnect_delay)
                            .unwrap_or(options.reconnect_delay)
                            .max(Duration::from_millis(1));
                        self.services.log(
                            MessageKind::Status,
                            format!(
                                "Waiting to retry... ({} of {})",
                                self.retry_count, options.reconnect_count
                            ),
                        );
                        self.control = None;
                        self.retry_deadline = Some(Instant::now() + delay);
                        // The connect command stays in flight.
                        return;
                    }
                }
                self.control = None;
                self.services.shared.connected.store(false, Ordering::SeqCst);
            }
        }

        if !code.is_ok() && !is_connect && code.intersects(ReplyCode::DISCONNECTED) {
            self.drop_session("Connection to server lost");
        }

        self.services.log(
            MessageKind::Status,
            format!("Command '{command_name}' finished: {code}"),
        );
        self.services
            .notify(Notification::OperationFinished { code, command: command_name });
        self.current_command = None;
        self.services.shared.busy.store(false, Ordering::SeqCst);
        self.arm_keepalive();
    }

    fn handle_cancel(&mut self) {
        if self.retry_deadline.is_some()
            && matches!(self.current_command, Some(Command::Connect { .. }))
        {
            self.retry_deadline = None;
            self.finish_command(
                ReplyCode::CANCELED | ReplyCode::DISCONNECTED,
                "connect",
            );
            return;
        }
        let in_command = self
            .control
            .as_ref()
            .is_some_and(ControlSocket::in_command);
        if !in_command {
            // Cancel raced a command that already finished.
            if self.current_command.take().is_some() {
                self.services.shared.busy.store(false, Ordering::SeqCst);
            }
            return;
        }
        let outcome = self.control.as_mut().map(|control| {
            control.tear_down(
                &self.services,
                ReplyCode::CANCELED | ReplyCode::DISCONNECTED,
            )
        });
        self.services.shared.connected.store(false, Ordering::SeqCst);
        if let Some(DriveOutcome::Finished { code, command }) = outcome {
            self.finish_command(code, command);
        }
    }

    fn handle_timers(&mut self) {
        let now = Instant::now();

        if self.retry_deadline.is_some_and(|deadline| deadline <= now) {
            self.retry_deadline = None;
            if let Some(Command::Connect { server, .. }) = self.current_command.clone() {
                self.services.log(
                    MessageKind::Status,
                    format!("Reconnect attempt {} ...", self.retry_count),
                );
                self.start_connect(server);
            }
            return;
        }

        let watchdog_due = self
            .control
            .as_ref()
            .filter(|control| control.in_command())
            .and_then(|control| control.conn.watchdog_deadline())
            .is_some_and(|deadline| deadline <= now);
        if watchdog_due {
            let outcome = self
                .control
                .as_mut()
                .and_then(|control| control.watchdog_expired(&self.services));
            if let Some(DriveOutcome::Finished { code, command }) = outcome {
                self.services.shared.connected.store(false, Ordering::SeqCst);
                self.finish_command(code, command);
            }
            return;
        }

        if self.keepalive_deadline.is_some_and(|deadline| deadline <= now) {
            self.keepalive_deadline = None;
            let connected = self.services.shared.connected.load(Ordering::SeqCst);
            let idle = !self
                .control
                .as_ref()
                .is_some_and(ControlSocket::in_command);
            if connected && idle {
                if let Some(control) = self.control.as_mut() {
                    if matches!(control.session.protocol, ProtocolState::Ftp(_)) {
                        self.services.log(MessageKind::Command, "NOOP".to_owned());
                        let _ = control.conn.send_line("NOOP");
                    }
                }
            }
            self.arm_keepalive();
        }
    }

    fn arm_keepalive(&mut self) {
        let interval = self.services.ctx.options().keepalive_interval;
        let connected = self.services.shared.connected.load(Ordering::SeqCst);
        self.keepalive_deadline = if connected && !interval.is_zero() {
            Some(Instant::now() + interval)
        } else {
            None
        };
    }

    fn drop_session(&mut self, message: &str) {
        self.services
            .socket_generation
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.control.is_some() {
            self.services.log(MessageKind::Status, message.to_owned());
        }
        if let Some(mut control) = self.control.take() {
            control.conn.close();
        }
        self.services.shared.connected.store(false, Ordering::SeqCst);
        self.services.shared.set_current_path(None);
        self.services.shared.set_last_listing_path(None);
        self.keepalive_deadline = None;
    }
}
