//! Directory listing: cache lock, change-directory, transfer over the
//! data connection, parse, store, and notify peers.

use super::cwd::CwdOp;
use super::transfer::{DataSink, DataTransferOp};
use crate::cache::ServerKey;
use crate::lock::LockReason;
use crate::notification::Notification;
use crate::operation::{OpCtx, Operation, WireEvent};
use listing::{ListingParser, ParserOptions};
use protocol::{ListFlags, ReplyCode, ServerPath};
use std::any::Any;

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Cwd,
    Lock,
    Transfer,
}

pub(crate) struct ListOp {
    path: Option<ServerPath>,
    subdir: String,
    flags: ListFlags,
    state: State,
    waiting_for_lock: bool,
    holds_lock: bool,
    effective_path: Option<ServerPath>,
}

impl ListOp {
    pub fn new(path: Option<ServerPath>, subdir: String, flags: ListFlags) -> Self {
        Self {
            path,
            subdir,
            flags,
            state: State::Cwd,
            waiting_for_lock: false,
            holds_lock: false,
            effective_path: None,
        }
    }

    fn parser_options(&self, cx: &OpCtx<'_>) -> ParserOptions {
        ParserOptions {
            server_type: cx.session.server.server_type,
            timezone_offset_minutes: cx.session.server.timezone_offset,
            strip_vms_versions: cx.services.ctx.options().strip_vms_revisions,
            today: None,
        }
    }

    fn try_lock(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        let Some(path) = self.effective_path.clone() else {
            return ReplyCode::INTERNAL_ERROR;
        };
        let key = ServerKey::of(&cx.session.server);
        let held = cx.services.ctx.locks().try_lock(
            &key,
            &path,
            LockReason::List,
            cx.services.engine_id,
            cx.services.events.clone(),
        );
        if held {
            self.holds_lock = true;
            self.waiting_for_lock = false;
            self.start_transfer(cx)
        } else {
            self.waiting_for_lock = true;
            ReplyCode::WOULDBLOCK
        }
    }

    fn start_transfer(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        self.state = State::Transfer;
        let mlsd = cx
            .session
            .protocol
            .ftp_mut()
            .is_some_and(|ftp| ftp.features.mlsd);
        let command = if mlsd { "MLSD" } else { "LIST" };
        cx.services
            .shared
            .transfer_status()
            .start(-1, 0, true);
        cx.services.notify(Notification::TransferStatusChanged);
        let parser = ListingParser::new(self.parser_options(cx));
        cx.push(Box::new(DataTransferOp::download(
            command.to_owned(),
            DataSink::Listing(parser),
            false,
            0,
        )));
        ReplyCode::WOULDBLOCK
    }

    fn finish_listing(&mut self, cx: &mut OpCtx<'_>, child: Box<dyn Operation>) -> ReplyCode {
        let Some(path) = self.effective_path.clone() else {
            return ReplyCode::INTERNAL_ERROR;
        };
        let mut child = child;
        let Some(transfer) = child.as_any().downcast_mut::<DataTransferOp>() else {
            return ReplyCode::INTERNAL_ERROR;
        };
        let sink = std::mem::replace(&mut transfer.sink, DataSink::Null);
        let DataSink::Listing(parser) = sink else {
            return ReplyCode::INTERNAL_ERROR;
        };

        cx.services.shared.transfer_status().finish();
        cx.services.notify(Notification::TransferStatusChanged);

        let directory_listing = parser.finish(path.clone());
        let key = ServerKey::of(&cx.session.server);
        let modified = cx.services.ctx.cache().store(&key, directory_listing);
        cx.services.shared.set_last_listing_path(Some(path.clone()));
        cx.notify(Notification::ListingUpdated {
            path: path.clone(),
            failed: false,
            modified,
        });
        if modified {
            crate::engine::notify_peers_listing_changed(cx.services, &key, &path);
        }
        ReplyCode::OK
    }
}

impl Operation for ListOp {
    fn command_name(&self) -> &'static str {
        "list"
    }

    fn send(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        match self.state {
            State::Cwd => {
                self.state = State::Lock;
                cx.push(Box::new(CwdOp::new(
                    self.path.clone(),
                    self.subdir.clone(),
                    self.flags.contains(ListFlags::LINK),
                )));
                ReplyCode::WOULDBLOCK
            }
            State::Lock => self.try_lock(cx),
            State::Transfer => ReplyCode::WOULDBLOCK,
        }
    }

    fn on_event(&mut self, cx: &mut OpCtx<'_>, event: WireEvent<'_>) -> ReplyCode {
        match event {
            WireEvent::LockGranted => {
                if self.waiting_for_lock {
                    self.waiting_for_lock = false;
                    self.holds_lock = true;
                    return self.start_transfer(cx);
                }
                ReplyCode::WOULDBLOCK
            }
            WireEvent::Closed { .. } => ReplyCode::ERROR | ReplyCode::DISCONNECTED,
            _ => ReplyCode::INTERNAL_ERROR,
        }
    }

    fn subcommand_result(
        &mut self,
        cx: &mut OpCtx<'_>,
        code: ReplyCode,
        mut child: Box<dyn Operation>,
    ) -> ReplyCode {
        match self.state {
            State::Lock => {
                if !code.is_ok() {
                    if code.contains(ReplyCode::LINK_NOT_DIR) {
                        return code;
                    }
                    if self.flags.contains(ListFlags::FALLBACK_CURRENT)
                        && cx.session.current_path.is_some()
                    {
                        // Listing the requested directory failed; fall
                        // back to wherever the server left us.
                        self.path = None;
                        self.subdir.clear();
                        self.effective_path = cx.session.current_path.clone();
                        return self.try_lock(cx);
                    }
                    let failed_path = self
                        .path
                        .clone()
                        .unwrap_or_else(|| ServerPath::empty(cx.session.syntax));
                    cx.notify(Notification::ListingUpdated {
                        path: failed_path,
                        failed: true,
                        modified: false,
                    });
                    return code;
                }
                self.effective_path = child
                    .as_any()
                    .downcast_mut::<CwdOp>()
                    .and_then(|cwd| cwd.resulting_path.clone());
                self.try_lock(cx)
            }
            State::Transfer => {
                if !code.is_ok() {
                    cx.services.shared.transfer_status().finish();
                    if let Some(path) = self.effective_path.clone() {
                        cx.notify(Notification::ListingUpdated {
                            path,
                            failed: true,
                            modified: false,
                        });
                    }
                    return code;
                }
                self.finish_listing(cx, child)
            }
            State::Cwd => ReplyCode::INTERNAL_ERROR,
        }
    }

    fn waiting_for_lock(&self) -> bool {
        self.waiting_for_lock
    }

    fn held_lock(&self) -> Option<(LockReason, ServerPath)> {
        if self.holds_lock {
            self.effective_path
                .clone()
                .map(|path| (LockReason::List, path))
        } else {
            None
        }
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}
