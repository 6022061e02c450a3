//! The small mutating FTP operations: mkdir, rmdir, delete, rename,
//! chmod, and raw command pass-through.

use super::cwd::CwdOp;
use super::{failure_code, send_command, FtpReply};
use crate::cache::ServerKey;
use crate::lock::LockReason;
use crate::notification::Notification;
use crate::operation::{OpCtx, Operation, WireEvent};
use protocol::{ReplyCode, ServerPath};
use std::any::Any;

fn reply_of<'a>(event: &WireEvent<'a>) -> Result<&'a FtpReply, ReplyCode> {
    match event {
        WireEvent::FtpReply(reply) => Ok(*reply),
        WireEvent::Closed { .. } => Err(ReplyCode::ERROR | ReplyCode::DISCONNECTED),
        _ => Err(ReplyCode::INTERNAL_ERROR),
    }
}

/// Creates a directory, walking up to the deepest existing ancestor and
/// creating every missing segment below it.
pub(crate) struct MkdirOp {
    target: ServerPath,
    /// Segments still to create below `probe`, deepest last.
    missing: Vec<String>,
    probe: ServerPath,
    state: MkdirState,
    waiting_for_lock: bool,
    holds_lock: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum MkdirState {
    Lock,
    Probe,
    WaitProbe,
    WaitMkd,
}

impl MkdirOp {
    pub fn new(target: ServerPath) -> Self {
        Self {
            probe: target.clone(),
            target,
            missing: Vec::new(),
            state: MkdirState::Lock,
            waiting_for_lock: false,
            holds_lock: false,
        }
    }

    fn send_probe(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        self.state = MkdirState::WaitProbe;
        match send_command(cx, &format!("CWD {}", self.probe), false) {
            Ok(()) => ReplyCode::WOULDBLOCK,
            Err(code) => code,
        }
    }

    fn send_mkd(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        // Create the shallowest missing directory next.
        let Some(segment) = self.missing.last() else {
            return ReplyCode::INTERNAL_ERROR;
        };
        let mut path = self.probe.clone();
        if !path.add_segment(segment) {
            return ReplyCode::INTERNAL_ERROR;
        }
        self.state = MkdirState::WaitMkd;
        match send_command(cx, &format!("MKD {path}"), false) {
            Ok(()) => ReplyCode::WOULDBLOCK,
            Err(code) => code,
        }
    }
}

impl Operation for MkdirOp {
    fn command_name(&self) -> &'static str {
        "mkdir"
    }

    fn send(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        match self.state {
            MkdirState::Lock => {
                let key = ServerKey::of(&cx.session.server);
                let held = cx.services.ctx.locks().try_lock(
                    &key,
                    &self.target,
                    LockReason::Mkdir,
                    cx.services.engine_id,
                    cx.services.events.clone(),
                );
                if !held {
                    self.waiting_for_lock = true;
                    return ReplyCode::WOULDBLOCK;
                }
                self.holds_lock = true;
                self.state = MkdirState::Probe;
                self.send_probe(cx)
            }
            MkdirState::Probe => self.send_probe(cx),
            _ => ReplyCode::WOULDBLOCK,
        }
    }

    fn on_event(&mut self, cx: &mut OpCtx<'_>, event: WireEvent<'_>) -> ReplyCode {
        if matches!(event, WireEvent::LockGranted) {
            if self.waiting_for_lock {
                self.waiting_for_lock = false;
                self.holds_lock = true;
                self.state = MkdirState::Probe;
                return self.send_probe(cx);
            }
            return ReplyCode::WOULDBLOCK;
        }
        let reply = match reply_of(&event) {
            Ok(reply) => reply,
            Err(code) => return code,
        };
        match self.state {
            MkdirState::WaitProbe => {
                if reply.is_success() {
                    // The probe directory exists; everything recorded in
                    // `missing` needs creating.
                    cx.session.current_path = Some(self.probe.clone());
                    cx.services.shared.set_current_path(Some(self.probe.clone()));
                    if self.missing.is_empty() {
                        // The full target already existed.
                        return ReplyCode::OK;
                    }
                    return self.send_mkd(cx);
                }
                // Walk one level up and remember the segment.
                match (self.probe.last_segment(), self.probe.parent()) {
                    (Some(segment), Some(parent)) => {
                        self.missing.push(segment.to_owned());
                        self.probe = parent;
                        self.state = MkdirState::Probe;
                        ReplyCode::CONTINUE
                    }
                    _ => failure_code(reply),
                }
            }
            MkdirState::WaitMkd => {
                if !reply.is_success() {
                    return failure_code(reply);
                }
                let Some(segment) = self.missing.pop() else {
                    return ReplyCode::INTERNAL_ERROR;
                };
                if !self.probe.add_segment(&segment) {
                    return ReplyCode::INTERNAL_ERROR;
                }
                let key = ServerKey::of(&cx.session.server);
                if let Some(parent) = self.probe.parent() {
                    cx.services.ctx.cache().mark_outdated(&key, &parent);
                    cx.notify(Notification::ListingUpdated {
                        path: parent,
                        failed: false,
                        modified: true,
                    });
                }
                if self.missing.is_empty() {
                    return ReplyCode::OK;
                }
                self.send_mkd(cx)
            }
            _ => ReplyCode::INTERNAL_ERROR,
        }
    }

    fn waiting_for_lock(&self) -> bool {
        self.waiting_for_lock
    }

    fn held_lock(&self) -> Option<(LockReason, ServerPath)> {
        self.holds_lock
            .then(|| (LockReason::Mkdir, self.target.clone()))
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}

/// Removes one directory, invalidating the cached subtree and peers'
/// working directories below it.
pub(crate) struct RmdirOp {
    path: ServerPath,
    subdir: String,
    sent: bool,
}

impl RmdirOp {
    pub fn new(path: ServerPath, subdir: String) -> Self {
        Self {
            path,
            subdir,
            sent: false,
        }
    }
}

impl Operation for RmdirOp {
    fn command_name(&self) -> &'static str {
        "rmdir"
    }

    fn send(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        if self.sent {
            return ReplyCode::WOULDBLOCK;
        }
        self.sent = true;
        cx.push(Box::new(CwdOp::new(
            Some(self.path.clone()),
            String::new(),
            false,
        )));
        ReplyCode::WOULDBLOCK
    }

    fn subcommand_result(
        &mut self,
        cx: &mut OpCtx<'_>,
        code: ReplyCode,
        _child: Box<dyn Operation>,
    ) -> ReplyCode {
        if !code.is_ok() {
            return code;
        }
        match send_command(cx, &format!("RMD {}", self.subdir), false) {
            Ok(()) => ReplyCode::WOULDBLOCK,
            Err(code) => code,
        }
    }

    fn on_event(&mut self, cx: &mut OpCtx<'_>, event: WireEvent<'_>) -> ReplyCode {
        let reply = match reply_of(&event) {
            Ok(reply) => reply,
            Err(code) => return code,
        };
        if !reply.is_success() {
            return failure_code(reply);
        }
        let Some(removed) = self.path.change_to(&self.subdir) else {
            return ReplyCode::INTERNAL_ERROR;
        };
        let key = ServerKey::of(&cx.session.server);
        cx.services.ctx.cache().invalidate_subtree(&key, &removed);
        cx.notify(Notification::ListingUpdated {
            path: self.path.clone(),
            failed: false,
            modified: true,
        });
        crate::engine::notify_peers_listing_changed(cx.services, &key, &self.path);
        crate::engine::notify_peers_path_invalidated(cx.services, &key, &removed);
        ReplyCode::OK
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}

/// Deletes a set of files inside one directory; keeps going on
/// individual failures and reports an error at the end if any file
/// could not be removed.
pub(crate) struct DeleteOp {
    path: ServerPath,
    files: Vec<String>,
    index: usize,
    failures: usize,
    cwd_done: bool,
}

impl DeleteOp {
    pub fn new(path: ServerPath, files: Vec<String>) -> Self {
        Self {
            path,
            files,
            index: 0,
            failures: 0,
            cwd_done: false,
        }
    }

    fn send_next(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        let Some(file) = self.files.get(self.index) else {
            return ReplyCode::INTERNAL_ERROR;
        };
        let command = format!("DELE {file}");
        match send_command(cx, &command, false) {
            Ok(()) => ReplyCode::WOULDBLOCK,
            Err(code) => code,
        }
    }
}

impl Operation for DeleteOp {
    fn command_name(&self) -> &'static str {
        "delete"
    }

    fn send(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        if self.cwd_done {
            return self.send_next(cx);
        }
        self.cwd_done = true;
        cx.push(Box::new(CwdOp::new(
            Some(self.path.clone()),
            String::new(),
            false,
        )));
        ReplyCode::WOULDBLOCK
    }

    fn subcommand_result(
        &mut self,
        cx: &mut OpCtx<'_>,
        code: ReplyCode,
        _child: Box<dyn Operation>,
    ) -> ReplyCode {
        if !code.is_ok() {
            return code;
        }
        self.send_next(cx)
    }

    fn on_event(&mut self, cx: &mut OpCtx<'_>, event: WireEvent<'_>) -> ReplyCode {
        let reply = match reply_of(&event) {
            Ok(reply) => reply,
            Err(code) => return code,
        };
        let key = ServerKey::of(&cx.session.server);
        if reply.is_success() {
            if let Some(file) = self.files.get(self.index) {
                cx.services.ctx.cache().remove_file(&key, &self.path, file);
            }
        } else {
            self.failures += 1;
        }
        self.index += 1;
        if self.index < self.files.len() {
            return self.send_next(cx);
        }
        cx.notify(Notification::ListingUpdated {
            path: self.path.clone(),
            failed: false,
            modified: true,
        });
        crate::engine::notify_peers_listing_changed(cx.services, &key, &self.path);
        if self.failures > 0 {
            ReplyCode::ERROR
        } else {
            ReplyCode::OK
        }
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}

/// `RNFR`/`RNTO` rename, including cross-directory moves.
pub(crate) struct RenameOp {
    from_path: ServerPath,
    from: String,
    to_path: ServerPath,
    to: String,
    state: RenameState,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum RenameState {
    Cwd,
    WaitRnfr,
    WaitRnto,
}

impl RenameOp {
    pub fn new(from_path: ServerPath, from: String, to_path: ServerPath, to: String) -> Self {
        Self {
            from_path,
            from,
            to_path,
            to,
            state: RenameState::Cwd,
        }
    }
}

impl Operation for RenameOp {
    fn command_name(&self) -> &'static str {
        "rename"
    }

    fn send(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        if self.state != RenameState::Cwd {
            return ReplyCode::WOULDBLOCK;
        }
        cx.push(Box::new(CwdOp::new(
            Some(self.from_path.clone()),
            String::new(),
            false,
        )));
        self.state = RenameState::WaitRnfr;
        ReplyCode::WOULDBLOCK
    }

    fn subcommand_result(
        &mut self,
        cx: &mut OpCtx<'_>,
        code: ReplyCode,
        _child: Box<dyn Operation>,
    ) -> ReplyCode {
        if !code.is_ok() {
            return code;
        }
        match send_command(cx, &format!("RNFR {}", self.from), false) {
            Ok(()) => ReplyCode::WOULDBLOCK,
            Err(code) => code,
        }
    }

    fn on_event(&mut self, cx: &mut OpCtx<'_>, event: WireEvent<'_>) -> ReplyCode {
        let reply = match reply_of(&event) {
            Ok(reply) => reply,
            Err(code) => return code,
        };
        match self.state {
            RenameState::WaitRnfr => {
                if !reply.is_intermediate() {
                    return failure_code(reply);
                }
                self.state = RenameState::WaitRnto;
                let target = if self.from_path.same_dir(&self.to_path) {
                    self.to.clone()
                } else {
                    self.to_path.format_filename(&self.to)
                };
                match send_command(cx, &format!("RNTO {target}"), false) {
                    Ok(()) => ReplyCode::WOULDBLOCK,
                    Err(code) => code,
                }
            }
            RenameState::WaitRnto => {
                if !reply.is_success() {
                    return failure_code(reply);
                }
                let key = ServerKey::of(&cx.session.server);
                // A renamed directory invalidates the whole subtree and
                // every peer working below it.
                if let Some(renamed_dir) = self.from_path.change_to(&self.from) {
                    cx.services
                        .ctx
                        .cache()
                        .invalidate_subtree(&key, &renamed_dir);
                    crate::engine::notify_peers_path_invalidated(cx.services, &key, &renamed_dir);
                }
                cx.services
                    .ctx
                    .cache()
                    .remove_file(&key, &self.from_path, &self.from);
                cx.services.ctx.cache().mark_outdated(&key, &self.to_path);
                for path in [self.from_path.clone(), self.to_path.clone()] {
                    cx.notify(Notification::ListingUpdated {
                        path: path.clone(),
                        failed: false,
                        modified: true,
                    });
                    crate::engine::notify_peers_listing_changed(cx.services, &key, &path);
                }
                ReplyCode::OK
            }
            RenameState::Cwd => ReplyCode::INTERNAL_ERROR,
        }
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}

/// `SITE CHMOD`.
pub(crate) struct ChmodOp {
    path: ServerPath,
    file: String,
    permissions: String,
    cwd_done: bool,
}

impl ChmodOp {
    pub fn new(path: ServerPath, file: String, permissions: String) -> Self {
        Self {
            path,
            file,
            permissions,
            cwd_done: false,
        }
    }
}

impl Operation for ChmodOp {
    fn command_name(&self) -> &'static str {
        "chmod"
    }

    fn send(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        if self.cwd_done {
            return ReplyCode::WOULDBLOCK;
        }
        self.cwd_done = true;
        cx.push(Box::new(CwdOp::new(
            Some(self.path.clone()),
            String::new(),
            false,
        )));
        ReplyCode::WOULDBLOCK
    }

    fn subcommand_result(
        &mut self,
        cx: &mut OpCtx<'_>,
        code: ReplyCode,
        _child: Box<dyn Operation>,
    ) -> ReplyCode {
        if !code.is_ok() {
            return code;
        }
        let command = format!("SITE CHMOD {} {}", self.permissions, self.file);
        match send_command(cx, &command, false) {
            Ok(()) => ReplyCode::WOULDBLOCK,
            Err(code) => code,
        }
    }

    fn on_event(&mut self, cx: &mut OpCtx<'_>, event: WireEvent<'_>) -> ReplyCode {
        let reply = match reply_of(&event) {
            Ok(reply) => reply,
            Err(code) => return code,
        };
        if !reply.is_success() {
            return failure_code(reply);
        }
        let key = ServerKey::of(&cx.session.server);
        cx.services.ctx.cache().mark_outdated(&key, &self.path);
        ReplyCode::OK
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}

/// Sends a raw command line; succeeds on any 2xx or 3xx reply.
pub(crate) struct RawOp {
    line: String,
    sent: bool,
}

impl RawOp {
    pub fn new(line: String) -> Self {
        Self { line, sent: false }
    }
}

impl Operation for RawOp {
    fn command_name(&self) -> &'static str {
        "raw"
    }

    fn send(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        if self.sent {
            return ReplyCode::WOULDBLOCK;
        }
        self.sent = true;
        // Raw commands may change the working directory behind our
        // back; drop the assumption rather than risk a stale path.
        cx.session.current_path = None;
        cx.services.shared.set_current_path(None);
        let line = self.line.clone();
        match send_command(cx, &line, false) {
            Ok(()) => ReplyCode::WOULDBLOCK,
            Err(code) => code,
        }
    }

    fn on_event(&mut self, _cx: &mut OpCtx<'_>, event: WireEvent<'_>) -> ReplyCode {
        let reply = match reply_of(&event) {
            Ok(reply) => reply,
            Err(code) => return code,
        };
        if reply.is_success() || reply.is_intermediate() {
            ReplyCode::OK
        } else {
            failure_code(reply)
        }
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}
