//! SFTP operations: connect/login, listing, transfers and the simple
//! one-command mutations.

use super::{log_helper_event, SftpEvent};
use crate::cache::ServerKey;
use crate::lock::LockReason;
use crate::local_file;
use crate::notification::{
    AsyncReply, AsyncRequest, FileExistsAction, FileExistsPrompt, Notification,
};
use crate::operation::{OpCtx, Operation, WireEvent};
use listing::{ListingParser, ParserOptions};
use logging::MessageKind;
use protocol::{
    ListFlags, LogonType, ReplyCode, Server, ServerPath, TransferDirection, TransferSettings,
};
use std::any::Any;
use std::path::PathBuf;

fn helper_send(cx: &mut OpCtx<'_>, line: &str, hide: bool) -> Result<(), ReplyCode> {
    if hide {
        let verb = line.split(' ').next().unwrap_or(line);
        cx.log(MessageKind::Command, format!("{verb} ****"));
    } else {
        cx.log(MessageKind::Command, line.to_owned());
    }
    let Some(sftp) = cx.session.protocol.sftp_mut() else {
        return Err(ReplyCode::INTERNAL_ERROR);
    };
    sftp.send_line(line)
        .map_err(|_| ReplyCode::ERROR | ReplyCode::DISCONNECTED)
}

/// Quotes an argument for the helper's line protocol.
fn quote(argument: &str) -> String {
    if argument.contains(' ') || argument.contains('"') {
        format!("\"{}\"", argument.replace('"', "\\\""))
    } else {
        argument.to_owned()
    }
}

/// Spawns the helper and runs the SSH login conversation.
pub(crate) struct SftpConnectOp {
    server: Server,
    launched: bool,
    waiting_async: bool,
    password_sent: bool,
}

impl SftpConnectOp {
    pub fn new(server: Server) -> Self {
        Self {
            server,
            launched: false,
            waiting_async: false,
            password_sent: false,
        }
    }
}

impl Operation for SftpConnectOp {
    fn command_name(&self) -> &'static str {
        "connect"
    }

    fn send(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        if self.launched {
            return ReplyCode::WOULDBLOCK;
        }
        self.launched = true;

        let helper = cx.services.ctx.options().sftp_helper.clone();
        let events = cx.services.events.clone();
        {
            let Some(sftp) = cx.session.protocol.sftp_mut() else {
                return ReplyCode::INTERNAL_ERROR;
            };
            if let Err(error) = sftp.spawn(&helper, events) {
                cx.log(
                    MessageKind::Error,
                    format!("Cannot start transfer helper {helper:?}: {error}"),
                );
                return ReplyCode::ERROR | ReplyCode::CRITICAL_ERROR;
            }
        }

        let mut open = format!(
            "open {}@{} {}",
            quote(self.server.logon_user()),
            quote(&self.server.host),
            self.server.port
        );
        if self.server.logon_type == LogonType::KeyFile {
            if let Some(key_file) = &self.server.key_file {
                open.push(' ');
                open.push_str(&quote(key_file));
            }
        }
        match helper_send(cx, &open, false) {
            Ok(()) => ReplyCode::WOULDBLOCK,
            Err(code) => code,
        }
    }

    fn on_event(&mut self, cx: &mut OpCtx<'_>, event: WireEvent<'_>) -> ReplyCode {
        let event = match event {
            WireEvent::Sftp(event) => event,
            WireEvent::SftpClosed => return ReplyCode::ERROR | ReplyCode::DISCONNECTED,
            _ => return ReplyCode::INTERNAL_ERROR,
        };
        if log_helper_event(cx, event) {
            return ReplyCode::WOULDBLOCK;
        }
        match event {
            SftpEvent::AlgorithmDetail(name, value) => {
                if let Some(sftp) = cx.session.protocol.sftp_mut() {
                    sftp.algorithm_details.push((name.clone(), value.clone()));
                }
                ReplyCode::WOULDBLOCK
            }
            SftpEvent::AskHostkey {
                fingerprint,
                changed,
            } => {
                self.waiting_async = true;
                cx.request_async(AsyncRequest::HostKey {
                    host: self.server.host.clone(),
                    port: self.server.port,
                    fingerprint: fingerprint.clone(),
                    changed: *changed,
                });
                ReplyCode::WOULDBLOCK
            }
            SftpEvent::AskPassword(challenge) => {
                if self.server.logon_type == LogonType::Normal
                    || self.server.logon_type == LogonType::Account
                {
                    if self.password_sent {
                        // The stored password was already rejected once.
                        return ReplyCode::CRITICAL_ERROR | ReplyCode::PASSWORD_FAILED;
                    }
                    self.password_sent = true;
                    let pass = format!("pass {}", quote(self.server.logon_pass()));
                    return match helper_send(cx, &pass, true) {
                        Ok(()) => ReplyCode::WOULDBLOCK,
                        Err(code) => code,
                    };
                }
                self.waiting_async = true;
                cx.request_async(AsyncRequest::InteractiveLogin {
                    challenge: challenge.clone(),
                });
                ReplyCode::WOULDBLOCK
            }
            SftpEvent::RequestText(text) => {
                cx.log(MessageKind::Status, text.clone());
                ReplyCode::WOULDBLOCK
            }
            SftpEvent::Done => {
                let details = cx
                    .session
                    .protocol
                    .sftp_mut()
                    .map(|sftp| sftp.algorithm_details.clone())
                    .unwrap_or_default();
                if !details.is_empty() {
                    cx.request_async(AsyncRequest::SftpEncryption { details });
                }
                cx.session.logged_in = true;
                cx.log(MessageKind::Status, "Connected to server".to_owned());
                ReplyCode::OK
            }
            SftpEvent::Error(message) => {
                cx.log(MessageKind::Error, message.clone());
                ReplyCode::ERROR | ReplyCode::DISCONNECTED
            }
            _ => ReplyCode::WOULDBLOCK,
        }
    }

    fn on_async_reply(&mut self, cx: &mut OpCtx<'_>, reply: AsyncReply) -> ReplyCode {
        self.waiting_async = false;
        match reply {
            AsyncReply::HostKey { trust } => {
                let answer = if trust { "yes" } else { "no" };
                if let Err(code) = helper_send(cx, answer, false) {
                    return code;
                }
                if trust {
                    ReplyCode::WOULDBLOCK
                } else {
                    ReplyCode::ERROR | ReplyCode::DISCONNECTED | ReplyCode::CRITICAL_ERROR
                }
            }
            AsyncReply::InteractiveLogin { password } => {
                match helper_send(cx, &format!("pass {}", quote(&password)), true) {
                    Ok(()) => ReplyCode::WOULDBLOCK,
                    Err(code) => code,
                }
            }
            AsyncReply::Dismissed => ReplyCode::WOULDBLOCK,
            _ => ReplyCode::INTERNAL_ERROR,
        }
    }

    fn waiting_for_async(&self) -> bool {
        self.waiting_async
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}

/// Directory listing through the helper's `ls`.
pub(crate) struct SftpListOp {
    path: Option<ServerPath>,
    subdir: String,
    flags: ListFlags,
    started: bool,
    waiting_for_lock: bool,
    holds_lock: bool,
    effective_path: Option<ServerPath>,
    parser: Option<ListingParser>,
}

impl SftpListOp {
    pub fn new(path: Option<ServerPath>, subdir: String, flags: ListFlags) -> Self {
        Self {
            path,
            subdir,
            flags,
            started: false,
            waiting_for_lock: false,
            holds_lock: false,
            effective_path: None,
            parser: None,
        }
    }

    fn resolve_path(&self, cx: &OpCtx<'_>) -> Option<ServerPath> {
        let base = self
            .path
            .clone()
            .or_else(|| cx.session.current_path.clone())?;
        if self.subdir.is_empty() {
            Some(base)
        } else {
            base.change_to(&self.subdir)
        }
    }

    fn start_listing(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        let Some(path) = self.effective_path.clone() else {
            return ReplyCode::INTERNAL_ERROR;
        };
        self.parser = Some(ListingParser::new(ParserOptions {
            server_type: cx.session.server.server_type,
            timezone_offset_minutes: cx.session.server.timezone_offset,
            strip_vms_versions: false,
            today: None,
        }));
        cx.services.shared.transfer_status().start(-1, 0, true);
        cx.services.notify(Notification::TransferStatusChanged);
        self.started = true;
        match helper_send(cx, &format!("ls {}", quote(&path.to_string())), false) {
            Ok(()) => ReplyCode::WOULDBLOCK,
            Err(code) => code,
        }
    }
}

impl Operation for SftpListOp {
    fn command_name(&self) -> &'static str {
        "list"
    }

    fn send(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        if self.started {
            return ReplyCode::WOULDBLOCK;
        }
        let Some(path) = self.resolve_path(cx) else {
            return if self.flags.contains(ListFlags::LINK) {
                ReplyCode::LINK_NOT_DIR
            } else {
                ReplyCode::ERROR
            };
        };
        self.effective_path = Some(path.clone());

        let key = ServerKey::of(&cx.session.server);
        let held = cx.services.ctx.locks().try_lock(
            &key,
            &path,
            LockReason::List,
            cx.services.engine_id,
            cx.services.events.clone(),
        );
        if !held {
            self.waiting_for_lock = true;
            return ReplyCode::WOULDBLOCK;
        }
        self.holds_lock = true;
        self.start_listing(cx)
    }

    fn on_event(&mut self, cx: &mut OpCtx<'_>, event: WireEvent<'_>) -> ReplyCode {
        match event {
            WireEvent::LockGranted => {
                if self.waiting_for_lock {
                    self.waiting_for_lock = false;
                    self.holds_lock = true;
                    return self.start_listing(cx);
                }
                ReplyCode::WOULDBLOCK
            }
            WireEvent::Sftp(event) => {
                if log_helper_event(cx, event) {
                    return ReplyCode::WOULDBLOCK;
                }
                match event {
                    SftpEvent::Listentry(line) => {
                        if cx.services.ctx.options().raw_listing_log {
                            cx.log(MessageKind::Listing, line.clone());
                        }
                        if let Some(parser) = self.parser.as_mut() {
                            parser.add_data(line.as_bytes());
                            parser.add_data(b"\n");
                        }
                        ReplyCode::WOULDBLOCK
                    }
                    SftpEvent::Done => {
                        let Some(path) = self.effective_path.clone() else {
                            return ReplyCode::INTERNAL_ERROR;
                        };
                        let Some(parser) = self.parser.take() else {
                            return ReplyCode::INTERNAL_ERROR;
                        };
                        cx.services.shared.transfer_status().finish();
                        cx.services.notify(Notification::TransferStatusChanged);

                        cx.session.current_path = Some(path.clone());
                        cx.services.shared.set_current_path(Some(path.clone()));
                        let directory_listing = parser.finish(path.clone());
                        let key = ServerKey::of(&cx.session.server);
                        let modified =
                            cx.services.ctx.cache().store(&key, directory_listing);
                        cx.services.shared.set_last_listing_path(Some(path.clone()));
                        cx.notify(Notification::ListingUpdated {
                            path: path.clone(),
                            failed: false,
                            modified,
                        });
                        if modified {
                            crate::engine::notify_peers_listing_changed(
                                cx.services,
                                &key,
                                &path,
                            );
                        }
                        ReplyCode::OK
                    }
                    SftpEvent::Error(message) => {
                        cx.log(MessageKind::Error, message.clone());
                        cx.services.shared.transfer_status().finish();
                        if let Some(path) = self.effective_path.clone() {
                            cx.notify(Notification::ListingUpdated {
                                path,
                                failed: true,
                                modified: false,
                            });
                        }
                        ReplyCode::ERROR
                    }
                    _ => ReplyCode::WOULDBLOCK,
                }
            }
            WireEvent::SftpClosed => ReplyCode::ERROR | ReplyCode::DISCONNECTED,
            _ => ReplyCode::INTERNAL_ERROR,
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

/// File up/download through the helper's `get`/`put`.
pub(crate) struct SftpTransferOp {
    local: PathBuf,
    remote_path: ServerPath,
    remote_file: String,
    direction: TransferDirection,
    settings: TransferSettings,
    resume: bool,
    started: bool,
    waiting_async: bool,
    local_size: i64,
    remote_size: i64,
    remote_time: Option<chrono::NaiveDateTime>,
}

impl SftpTransferOp {
    pub fn new(
        local: PathBuf,
        remote_path: ServerPath,
        remote_file: String,
        direction: TransferDirection,
        settings: TransferSettings,
    ) -> Self {
        Self {
            local,
            remote_path,
            remote_file,
            direction,
            settings,
            resume: settings.resume,
            started: false,
            waiting_async: false,
            local_size: -1,
            remote_size: -1,
            remote_time: None,
        }
    }

    fn start_transfer(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        self.started = true;
        let remote = self.remote_path.format_filename(&self.remote_file);
        let local = self.local.display().to_string();
        let offset = if self.resume {
            match self.direction {
                TransferDirection::Download => self.local_size.max(0),
                TransferDirection::Upload => self.remote_size.max(0),
            }
        } else {
            0
        };

        let (verb, total) = match self.direction {
            TransferDirection::Download => ("get", self.remote_size),
            TransferDirection::Upload => ("put", self.local_size),
        };
        cx.services
            .shared
            .transfer_status()
            .start(total, offset, false);
        cx.services.notify(Notification::TransferStatusChanged);

        let command = match self.direction {
            TransferDirection::Download => {
                format!("{verb} {} {} {offset}", quote(&remote), quote(&local))
            }
            TransferDirection::Upload => {
                format!("{verb} {} {} {offset}", quote(&local), quote(&remote))
            }
        };
        match helper_send(cx, &command, false) {
            Ok(()) => ReplyCode::WOULDBLOCK,
            Err(code) => code,
        }
    }
}

impl Operation for SftpTransferOp {
    fn command_name(&self) -> &'static str {
        "transfer"
    }

    fn send(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        if self.started {
            return ReplyCode::WOULDBLOCK;
        }
        self.local_size = local_file::local_size(&self.local);
        let key = ServerKey::of(&cx.session.server);
        if let Some(hit) = cx.services.ctx.cache().lookup(&key, &self.remote_path) {
            if let Some(entry) = hit.listing.find(&self.remote_file) {
                self.remote_size = entry.size;
                self.remote_time = entry.time.map(|t| t.as_datetime());
            }
        }

        let conflict = match self.direction {
            TransferDirection::Download => self.local_size >= 0,
            TransferDirection::Upload => self.remote_size >= 0,
        };
        if !conflict {
            return self.start_transfer(cx);
        }
        self.waiting_async = true;
        cx.request_async(AsyncRequest::FileExists(FileExistsPrompt {
            download: self.direction.is_download(),
            local_path: self.local.clone(),
            remote_path: self.remote_path.clone(),
            remote_file: self.remote_file.clone(),
            local_size: self.local_size,
            remote_size: self.remote_size,
            local_time: local_file::local_mtime(&self.local),
            remote_time: self.remote_time,
            resume_possible: !self.settings.ascii,
            ascii: self.settings.ascii,
        }));
        ReplyCode::WOULDBLOCK
    }

    fn on_event(&mut self, cx: &mut OpCtx<'_>, event: WireEvent<'_>) -> ReplyCode {
        match event {
            WireEvent::Sftp(event) => {
                if log_helper_event(cx, event) {
                    return ReplyCode::WOULDBLOCK;
                }
                match event {
                    SftpEvent::Transfer(bytes) => {
                        cx.services.shared.transfer_status().advance(*bytes);
                        cx.services.notify(Notification::TransferStatusChanged);
                        cx.services.set_activity(self.direction);
                        ReplyCode::WOULDBLOCK
                    }
                    SftpEvent::Done => {
                        cx.services.shared.transfer_status().finish();
                        cx.services.notify(Notification::TransferStatusChanged);
                        let key = ServerKey::of(&cx.session.server);
                        if self.direction == TransferDirection::Upload {
                            cx.services.ctx.cache().update_file(
                                &key,
                                &self.remote_path,
                                &self.remote_file,
                                local_file::local_size(&self.local),
                                local_file::local_mtime(&self.local),
                            );
                            cx.notify(Notification::ListingUpdated {
                                path: self.remote_path.clone(),
                                failed: false,
                                modified: true,
                            });
                            crate::engine::notify_peers_listing_changed(
                                cx.services,
                                &key,
                                &self.remote_path,
                            );
                        } else if let Some(mtime) = self.remote_time {
                            local_file::set_local_mtime(&self.local, mtime);
                        }
                        cx.log(MessageKind::Status, "File transfer successful".to_owned());
                        ReplyCode::OK
                    }
                    SftpEvent::Error(message) => {
                        cx.log(MessageKind::Error, message.clone());
                        cx.services.shared.transfer_status().finish();
                        ReplyCode::ERROR
                    }
                    _ => ReplyCode::WOULDBLOCK,
                }
            }
            WireEvent::SftpClosed => ReplyCode::ERROR | ReplyCode::DISCONNECTED,
            _ => ReplyCode::INTERNAL_ERROR,
        }
    }

    fn on_async_reply(&mut self, cx: &mut OpCtx<'_>, reply: AsyncReply) -> ReplyCode {
        self.waiting_async = false;
        let AsyncReply::FileExists(action) = reply else {
            return ReplyCode::INTERNAL_ERROR;
        };
        match action {
            FileExistsAction::Skip => {
                cx.log(
                    MessageKind::Status,
                    format!("Skipping transfer of {}", self.remote_file),
                );
                ReplyCode::OK
            }
            FileExistsAction::Resume => {
                self.resume = !self.settings.ascii;
                self.start_transfer(cx)
            }
            FileExistsAction::Rename(new_name) => {
                match self.direction {
                    TransferDirection::Download => {
                        self.local = self
                            .local
                            .parent()
                            .map_or_else(|| PathBuf::from(&new_name), |p| p.join(&new_name));
                        self.local_size = local_file::local_size(&self.local);
                    }
                    TransferDirection::Upload => {
                        self.remote_file = new_name;
                        self.remote_size = -1;
                    }
                }
                self.start_transfer(cx)
            }
            FileExistsAction::OverwriteSize if self.local_size == self.remote_size => {
                ReplyCode::OK
            }
            _ => {
                self.resume = false;
                self.start_transfer(cx)
            }
        }
    }

    fn waiting_for_async(&self) -> bool {
        self.waiting_async
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}

/// One-command operations: mkdir, rmdir, delete, rename, chmod.
pub(crate) struct SftpSimpleOp {
    name: &'static str,
    commands: Vec<String>,
    index: usize,
    cache_paths: Vec<ServerPath>,
    invalidate_subtree: Option<ServerPath>,
    started: bool,
    failures: usize,
}

impl SftpSimpleOp {
    pub fn delete(path: ServerPath, files: Vec<String>) -> Self {
        let commands = files
            .iter()
            .map(|file| format!("rm {}", quote(&path.format_filename(file))))
            .collect();
        Self {
            name: "delete",
            commands,
            index: 0,
            cache_paths: vec![path],
            invalidate_subtree: None,
            started: false,
            failures: 0,
        }
    }

    pub fn rmdir(path: ServerPath, subdir: String) -> Self {
        let removed = path.change_to(&subdir);
        let target = removed
            .as_ref()
            .map_or_else(|| subdir.clone(), ServerPath::to_string);
        Self {
            name: "rmdir",
            commands: vec![format!("rmdir {}", quote(&target))],
            index: 0,
            cache_paths: vec![path],
            invalidate_subtree: removed,
            started: false,
            failures: 0,
        }
    }

    pub fn mkdir(path: ServerPath) -> Self {
        let parent = path.parent();
        Self {
            name: "mkdir",
            commands: vec![format!("mkdir {}", quote(&path.to_string()))],
            index: 0,
            cache_paths: parent.into_iter().collect(),
            invalidate_subtree: None,
            started: false,
            failures: 0,
        }
    }

    pub fn rename(from_path: ServerPath, from: String, to_path: ServerPath, to: String) -> Self {
        let source = from_path.format_filename(&from);
        let target = to_path.format_filename(&to);
        let renamed_dir = from_path.change_to(&from);
        Self {
            name: "rename",
            commands: vec![format!("mv {} {}", quote(&source), quote(&target))],
            index: 0,
            cache_paths: vec![from_path, to_path],
            invalidate_subtree: renamed_dir,
            started: false,
            failures: 0,
        }
    }

    pub fn chmod(path: ServerPath, file: String, permissions: String) -> Self {
        let target = path.format_filename(&file);
        Self {
            name: "chmod",
            commands: vec![format!("chmod {} {}", quote(&permissions), quote(&target))],
            index: 0,
            cache_paths: vec![path],
            invalidate_subtree: None,
            started: false,
            failures: 0,
        }
    }

    fn send_current(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        let Some(command) = self.commands.get(self.index).cloned() else {
            return ReplyCode::INTERNAL_ERROR;
        };
        match helper_send(cx, &command, false) {
            Ok(()) => ReplyCode::WOULDBLOCK,
            Err(code) => code,
        }
    }

    fn finish(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        let key = ServerKey::of(&cx.session.server);
        if let Some(subtree) = self.invalidate_subtree.take() {
            cx.services.ctx.cache().invalidate_subtree(&key, &subtree);
            crate::engine::notify_peers_path_invalidated(cx.services, &key, &subtree);
        }
        for path in self.cache_paths.clone() {
            cx.services.ctx.cache().mark_outdated(&key, &path);
            cx.notify(Notification::ListingUpdated {
                path: path.clone(),
                failed: false,
                modified: true,
            });
            crate::engine::notify_peers_listing_changed(cx.services, &key, &path);
        }
        if self.failures > 0 {
            ReplyCode::ERROR
        } else {
            ReplyCode::OK
        }
    }
}

impl Operation for SftpSimpleOp {
    fn command_name(&self) -> &'static str {
        self.name
    }

    fn send(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        if self.started {
            return ReplyCode::WOULDBLOCK;
        }
        self.started = true;
        self.send_current(cx)
    }

    fn on_event(&mut self, cx: &mut OpCtx<'_>, event: WireEvent<'_>) -> ReplyCode {
        match event {
            WireEvent::Sftp(event) => {
                if log_helper_event(cx, event) {
                    return ReplyCode::WOULDBLOCK;
                }
                match event {
                    SftpEvent::Done | SftpEvent::Error(_) => {
                        if let SftpEvent::Error(message) = event {
                            cx.log(MessageKind::Error, message.clone());
                            self.failures += 1;
                        }
                        self.index += 1;
                        if self.index < self.commands.len() {
                            return self.send_current(cx);
                        }
                        self.finish(cx)
                    }
                    _ => ReplyCode::WOULDBLOCK,
                }
            }
            WireEvent::SftpClosed => ReplyCode::ERROR | ReplyCode::DISCONNECTED,
            _ => ReplyCode::INTERNAL_ERROR,
        }
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}
