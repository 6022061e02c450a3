//! Change-directory sub-operation shared by list, transfer and the
//! mutating commands. Skips the wire round-trip when the control
//! socket already sits in the target directory.

use super::{failure_code, send_command, FtpReply};
use crate::operation::{OpCtx, Operation, WireEvent};
use protocol::{ReplyCode, ServerPath};
use std::any::Any;

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Init,
    WaitCwd,
    WaitSubdir,
}

pub(crate) struct CwdOp {
    target: Option<ServerPath>,
    subdir: String,
    /// The subdir is a symlink; a failure to change into it is reported
    /// as `LINK_NOT_DIR` instead of a generic error.
    link_discovery: bool,
    state: State,
    /// Where the socket ended up; consumed by the parent.
    pub resulting_path: Option<ServerPath>,
}

impl CwdOp {
    pub fn new(target: Option<ServerPath>, subdir: String, link_discovery: bool) -> Self {
        Self {
            target,
            subdir,
            link_discovery,
            state: State::Init,
            resulting_path: None,
        }
    }

    fn effective_target(&self, cx: &OpCtx<'_>) -> Option<ServerPath> {
        match &self.target {
            Some(path) => Some(path.clone()),
            None => cx.session.current_path.clone(),
        }
    }
}

impl Operation for CwdOp {
    fn command_name(&self) -> &'static str {
        "cwd"
    }

    fn send(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        match self.state {
            State::Init => {
                let Some(target) = self.effective_target(cx) else {
                    // No target and no known directory: nothing to do.
                    self.resulting_path = cx.session.current_path.clone();
                    return if self.subdir.is_empty() {
                        ReplyCode::OK
                    } else {
                        ReplyCode::ERROR
                    };
                };

                if self.subdir.is_empty() {
                    if cx
                        .session
                        .current_path
                        .as_ref()
                        .is_some_and(|current| current.same_dir(&target))
                    {
                        self.resulting_path = Some(target);
                        return ReplyCode::OK;
                    }
                    self.state = State::WaitCwd;
                    return match send_command(cx, &format!("CWD {target}"), false) {
                        Ok(()) => ReplyCode::WOULDBLOCK,
                        Err(code) => code,
                    };
                }

                // With a subdir we must pass through the base directory
                // first, unless we are already there.
                if cx
                    .session
                    .current_path
                    .as_ref()
                    .is_some_and(|current| current.same_dir(&target))
                {
                    self.state = State::WaitSubdir;
                    return match send_command(cx, &format!("CWD {}", self.subdir), false) {
                        Ok(()) => ReplyCode::WOULDBLOCK,
                        Err(code) => code,
                    };
                }
                self.state = State::WaitCwd;
                match send_command(cx, &format!("CWD {target}"), false) {
                    Ok(()) => ReplyCode::WOULDBLOCK,
                    Err(code) => code,
                }
            }
            _ => ReplyCode::WOULDBLOCK,
        }
    }

    fn on_event(&mut self, cx: &mut OpCtx<'_>, event: WireEvent<'_>) -> ReplyCode {
        let reply = match event {
            WireEvent::FtpReply(reply) => reply,
            WireEvent::Closed { .. } => return ReplyCode::ERROR | ReplyCode::DISCONNECTED,
            _ => return ReplyCode::INTERNAL_ERROR,
        };
        match self.state {
            State::WaitCwd => self.on_cwd_reply(cx, reply),
            State::WaitSubdir => self.on_subdir_reply(cx, reply),
            State::Init => ReplyCode::INTERNAL_ERROR,
        }
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}

impl CwdOp {
    fn on_cwd_reply(&mut self, cx: &mut OpCtx<'_>, reply: &FtpReply) -> ReplyCode {
        if !reply.is_success() {
            cx.session.current_path = None;
            return failure_code(reply);
        }
        let Some(target) = self.effective_target(cx) else {
            return ReplyCode::INTERNAL_ERROR;
        };
        cx.session.current_path = Some(target.clone());
        cx.services.shared.set_current_path(Some(target.clone()));

        if self.subdir.is_empty() {
            self.resulting_path = Some(target);
            return ReplyCode::OK;
        }
        self.state = State::WaitSubdir;
        match send_command(cx, &format!("CWD {}", self.subdir), false) {
            Ok(()) => ReplyCode::WOULDBLOCK,
            Err(code) => code,
        }
    }

    fn on_subdir_reply(&mut self, cx: &mut OpCtx<'_>, reply: &FtpReply) -> ReplyCode {
        if !reply.is_success() {
            if self.link_discovery && reply.is_permanent_failure() {
                // The link points at a file.
                return ReplyCode::LINK_NOT_DIR;
            }
            cx.session.current_path = None;
            return failure_code(reply);
        }
        let target = self
            .effective_target(cx)
            .and_then(|base| base.change_to(&self.subdir));
        match target {
            Some(path) => {
                cx.session.current_path = Some(path.clone());
                cx.services.shared.set_current_path(Some(path.clone()));
                self.resulting_path = Some(path);
                ReplyCode::OK
            }
            None => ReplyCode::INTERNAL_ERROR,
        }
    }
}
