//! The FTP transfer pipeline: the generic passive-mode data-transfer
//! sub-operation (used by listings and files alike) and the
//! file-transfer operation with its overwrite and resume handling.

use super::cwd::CwdOp;
use super::{failure_code, send_command, DataConnection, FtpReply};
use crate::event::EngineEvent;
use crate::local_file;
use crate::notification::{
    AsyncReply, AsyncRequest, FileExistsAction, FileExistsPrompt, Notification,
};
use crate::operation::{OpCtx, Operation, WireEvent};
use listing::ListingParser;
use logging::MessageKind;
use protocol::{ReplyCode, ServerPath, TransferDirection, TransferSettings};
use std::any::Any;
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use transport::{Backend, Socket, SocketSource};

const UPLOAD_CHUNK: usize = 64 * 1024;

/// Where downloaded data-connection bytes go.
pub(crate) enum DataSink {
    /// Raw listing bytes, assembled by the parser.
    Listing(ListingParser),
    /// File download.
    File(File),
    /// Data is discarded (failed transfers being drained).
    Null,
}

impl DataSink {
    fn write(&mut self, services: &crate::services::Services, bytes: &[u8]) -> ReplyCode {
        match self {
            Self::Listing(parser) => {
                if services.ctx.options().raw_listing_log {
                    for line in String::from_utf8_lossy(bytes).lines() {
                        services.log(MessageKind::Listing, line.to_owned());
                    }
                }
                parser.add_data(bytes);
                ReplyCode::OK
            }
            Self::File(file) => match file.write_all(bytes) {
                Ok(()) => ReplyCode::OK,
                Err(_) => ReplyCode::ERROR | ReplyCode::CRITICAL_ERROR,
            },
            Self::Null => ReplyCode::OK,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
    Type,
    WaitType,
    Passive,
    WaitPassive,
    WaitDataConnect,
    Rest,
    WaitRest,
    Command,
    WaitPreliminary,
    Transfer,
}

/// Generic passive-mode data transfer: TYPE, EPSV/PASV, optional REST,
/// the transfer command, then the data itself.
pub(crate) struct DataTransferOp {
    command: String,
    upload_source: Option<File>,
    pub sink: DataSink,
    ascii: bool,
    resume_offset: u64,
    state: State,
    got_preliminary: bool,
    got_complete: bool,
    data_closed: bool,
    data_error: bool,
    upload_done: bool,
    /// Bytes moved, maintained for the transfer status.
    pub transferred: u64,
}

impl DataTransferOp {
    pub fn download(command: String, sink: DataSink, ascii: bool, resume_offset: u64) -> Self {
        Self {
            command,
            upload_source: None,
            sink,
            ascii,
            resume_offset,
            state: State::Type,
            got_preliminary: false,
            got_complete: false,
            data_closed: false,
            data_error: false,
            upload_done: true,
            transferred: 0,
        }
    }

    pub fn upload(command: String, source: File, ascii: bool, resume_offset: u64) -> Self {
        Self {
            command,
            upload_source: Some(source),
            sink: DataSink::Null,
            ascii,
            resume_offset,
            state: State::Type,
            got_preliminary: false,
            got_complete: false,
            data_closed: false,
            data_error: false,
            upload_done: false,
            transferred: 0,
        }
    }

    fn is_upload(&self) -> bool {
        self.upload_source.is_some()
    }

    fn maybe_finished(&self) -> Option<ReplyCode> {
        if self.data_error {
            return Some(ReplyCode::ERROR | ReplyCode::DISCONNECTED);
        }
        let data_done = if self.is_upload() {
            self.upload_done
        } else {
            self.data_closed
        };
        (self.got_complete && data_done).then_some(ReplyCode::OK)
    }

    fn open_data_connection(&mut self, cx: &mut OpCtx<'_>, host: String, port: u16) -> ReplyCode {
        let socket = Socket::connect(
            host,
            port,
            SocketSource::Data,
            cx.services.socket_options(),
            cx.services.ctx.limiter().clone(),
            cx.services.socket_sink(),
        );
        let protected = cx
            .session
            .protocol
            .ftp_mut()
            .is_some_and(|ftp| ftp.protect_data_channel);
        if let Some(ftp) = cx.session.protocol.ftp_mut() {
            ftp.data = Some(DataConnection {
                backend: Backend::new(socket),
                tls: None,
                connected: false,
                protected,
            });
        }
        self.state = State::WaitDataConnect;
        ReplyCode::WOULDBLOCK
    }

    fn pump_upload(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        if !(self.got_preliminary
            && cx
                .session
                .protocol
                .ftp_mut()
                .and_then(|ftp| ftp.data.as_ref())
                .is_some_and(|data| data.connected))
        {
            return ReplyCode::WOULDBLOCK;
        }
        let Some(source) = self.upload_source.as_mut() else {
            return ReplyCode::INTERNAL_ERROR;
        };
        let mut chunk = vec![0u8; UPLOAD_CHUNK];
        let read = match source.read(&mut chunk) {
            Ok(read) => read,
            Err(_) => return ReplyCode::ERROR | ReplyCode::CRITICAL_ERROR,
        };
        if read == 0 {
            // EOF: close the data connection so the server sees the end
            // of the stream, then wait for the completion reply.
            self.upload_done = true;
            if let Some(ftp) = cx.session.protocol.ftp_mut() {
                if let Some(data) = ftp.data.as_mut() {
                    if let Some(tls) = data.tls.as_mut() {
                        if let Ok(bye) = tls.close() {
                            let _ = data.backend.send_all(&bye);
                        }
                    }
                }
                ftp.close_data();
            }
            return self.maybe_finished().unwrap_or(ReplyCode::WOULDBLOCK);
        }

        let sent = {
            let Some(data) = cx
                .session
                .protocol
                .ftp_mut()
                .and_then(|ftp| ftp.data.as_mut())
            else {
                return ReplyCode::ERROR | ReplyCode::DISCONNECTED;
            };
            let payload = &chunk[..read];
            let result = match data.tls.as_mut() {
                Some(tls) => tls
                    .write_plain(payload)
                    .map_err(|_| ())
                    .and_then(|wire| data.backend.send_all(&wire).map_err(|_| ())),
                None => data.backend.send_all(payload).map_err(|_| ()),
            };
            result.is_ok()
        };
        if !sent {
            return ReplyCode::ERROR | ReplyCode::DISCONNECTED;
        }
        self.transferred += read as u64;
        cx.services.shared.transfer_status().advance(read as u64);
        cx.services.notify(Notification::TransferStatusChanged);
        cx.services.set_activity(TransferDirection::Upload);
        // Stay responsive between chunks.
        let _ = cx.services.events.send(EngineEvent::UploadTick);
        ReplyCode::WOULDBLOCK
    }
}

impl Operation for DataTransferOp {
    fn command_name(&self) -> &'static str {
        "transfer"
    }

    fn send(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        match self.state {
            State::Type => {
                self.state = State::WaitType;
                let mode = if self.ascii { "TYPE A" } else { "TYPE I" };
                match send_command(cx, mode, false) {
                    Ok(()) => ReplyCode::WOULDBLOCK,
                    Err(code) => code,
                }
            }
            State::Passive => {
                let epsv = cx
                    .session
                    .protocol
                    .ftp_mut()
                    .is_some_and(|ftp| ftp.features.epsv);
                self.state = State::WaitPassive;
                match send_command(cx, if epsv { "EPSV" } else { "PASV" }, false) {
                    Ok(()) => ReplyCode::WOULDBLOCK,
                    Err(code) => code,
                }
            }
            State::Rest => {
                self.state = State::WaitRest;
                match send_command(cx, &format!("REST {}", self.resume_offset), false) {
                    Ok(()) => ReplyCode::WOULDBLOCK,
                    Err(code) => code,
                }
            }
            State::Command => {
                self.state = State::WaitPreliminary;
                let command = self.command.clone();
                match send_command(cx, &command, false) {
                    Ok(()) => ReplyCode::WOULDBLOCK,
                    Err(code) => code,
                }
            }
            State::Transfer => {
                if self.is_upload() {
                    self.pump_upload(cx)
                } else {
                    self.maybe_finished().unwrap_or(ReplyCode::WOULDBLOCK)
                }
            }
            _ => ReplyCode::WOULDBLOCK,
        }
    }

    fn on_event(&mut self, cx: &mut OpCtx<'_>, event: WireEvent<'_>) -> ReplyCode {
        match event {
            WireEvent::FtpReply(reply) => self.on_reply(cx, reply),
            WireEvent::DataConnected => {
                if self.state == State::WaitDataConnect {
                    self.state = if self.resume_offset > 0 {
                        State::Rest
                    } else {
                        State::Command
                    };
                    return ReplyCode::CONTINUE;
                }
                // Connected while pumping: the upload may proceed.
                if self.state == State::Transfer && self.is_upload() {
                    return self.pump_upload(cx);
                }
                ReplyCode::WOULDBLOCK
            }
            WireEvent::DataBytes(bytes) => {
                let result = self.sink.write(cx.services, bytes);
                if !result.is_ok() {
                    return result;
                }
                self.transferred += bytes.len() as u64;
                cx.services.shared.transfer_status().advance(bytes.len() as u64);
                cx.services.notify(Notification::TransferStatusChanged);
                ReplyCode::WOULDBLOCK
            }
            WireEvent::DataClosed { error } => {
                self.data_closed = true;
                if error.is_some() && !self.got_complete {
                    self.data_error = true;
                }
                if let Some(ftp) = cx.session.protocol.ftp_mut() {
                    ftp.close_data();
                }
                self.maybe_finished().unwrap_or(ReplyCode::WOULDBLOCK)
            }
            WireEvent::UploadTick => {
                if self.state == State::Transfer && self.is_upload() && !self.upload_done {
                    return self.pump_upload(cx);
                }
                ReplyCode::WOULDBLOCK
            }
            WireEvent::Closed { .. } => ReplyCode::ERROR | ReplyCode::DISCONNECTED,
            _ => ReplyCode::INTERNAL_ERROR,
        }
    }

    fn release_resources(&mut self, cx: &mut OpCtx<'_>) {
        if let Some(ftp) = cx.session.protocol.ftp_mut() {
            ftp.close_data();
        }
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}

impl DataTransferOp {
    fn on_reply(&mut self, cx: &mut OpCtx<'_>, reply: &FtpReply) -> ReplyCode {
        match self.state {
            State::WaitType => {
                if !reply.is_success() {
                    return failure_code(reply);
                }
                self.state = State::Passive;
                ReplyCode::CONTINUE
            }
            State::WaitPassive => {
                if !reply.is_success() {
                    return failure_code(reply);
                }
                let endpoint = if reply.code == 229 {
                    parse_epsv(reply.text()).map(|port| (cx.session.server.host.clone(), port))
                } else {
                    parse_pasv(reply.text())
                };
                match endpoint {
                    Some((host, port)) => self.open_data_connection(cx, host, port),
                    None => ReplyCode::ERROR | ReplyCode::DISCONNECTED,
                }
            }
            State::WaitRest => {
                if reply.severity() > 3 {
                    // Server will not resume; restart from zero and
                    // rewind whatever target we already positioned.
                    cx.services.log(
                        MessageKind::Status,
                        "Server does not support resume, restarting from the beginning"
                            .to_owned(),
                    );
                    self.resume_offset = 0;
                    if let DataSink::File(file) = &mut self.sink {
                        use std::io::Seek;
                        let _ = file.seek(std::io::SeekFrom::Start(0));
                        let _ = file.set_len(0);
                    }
                    cx.services.shared.transfer_status().start(-1, 0, false);
                }
                self.state = State::Command;
                ReplyCode::CONTINUE
            }
            State::WaitPreliminary => {
                if reply.severity() == 1 {
                    self.got_preliminary = true;
                    self.state = State::Transfer;
                    return ReplyCode::CONTINUE;
                }
                if reply.is_success() {
                    // Some servers skip the 1xx entirely.
                    self.got_preliminary = true;
                    self.got_complete = true;
                    self.state = State::Transfer;
                    return ReplyCode::CONTINUE;
                }
                failure_code(reply)
            }
            State::Transfer => {
                if reply.is_success() {
                    self.got_complete = true;
                    return self.maybe_finished().unwrap_or(ReplyCode::WOULDBLOCK);
                }
                failure_code(reply)
            }
            _ => ReplyCode::INTERNAL_ERROR,
        }
    }
}

/// `229 Entering Extended Passive Mode (|||6446|)`.
fn parse_epsv(text: &str) -> Option<u16> {
    let open = text.find("(|||")?;
    let rest = &text[open + 4..];
    let close = rest.find('|')?;
    rest[..close].parse().ok()
}

/// `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)`.
fn parse_pasv(text: &str) -> Option<(String, u16)> {
    let open = text.find('(')?;
    let close = text[open..].find(')')? + open;
    let numbers: Vec<u16> = text[open + 1..close]
        .split(',')
        .map(str::trim)
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    if numbers.len() != 6 || numbers[..4].iter().any(|&n| n > 255) || numbers[4] > 255 || numbers[5] > 255 {
        return None;
    }
    let host = format!(
        "{}.{}.{}.{}",
        numbers[0], numbers[1], numbers[2], numbers[3]
    );
    Some((host, numbers[4] * 256 + numbers[5]))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum FileState {
    Cwd,
    CheckOverwrite,
    WaitOverwriteReply,
    Transfer,
    SendMfmt,
    WaitMfmt,
}

/// Up- or download of one file, protocol-agnostic apart from the wire
/// command names it hands to [`DataTransferOp`].
pub(crate) struct FileTransferOp {
    local: PathBuf,
    remote_path: ServerPath,
    remote_file: String,
    direction: TransferDirection,
    settings: TransferSettings,
    state: FileState,
    waiting_async: bool,
    local_size: i64,
    remote_size: i64,
    remote_time: Option<chrono::NaiveDateTime>,
    resume: bool,
    transferred: u64,
}

impl FileTransferOp {
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
            state: FileState::Cwd,
            waiting_async: false,
            local_size: -1,
            remote_size: -1,
            remote_time: None,
            resume: settings.resume,
            transferred: 0,
        }
    }

    /// Looks the remote file up in the directory cache to learn its size
    /// and time without extra round-trips.
    fn probe_remote(&mut self, cx: &OpCtx<'_>) {
        let key = crate::cache::ServerKey::of(&cx.session.server);
        if let Some(hit) = cx.services.ctx.cache().lookup(&key, &self.remote_path) {
            if let Some(entry) = hit.listing.find(&self.remote_file) {
                self.remote_size = entry.size;
                self.remote_time = entry.time.map(|t| t.as_datetime());
            }
        }
    }

    fn needs_overwrite_prompt(&self) -> bool {
        match self.direction {
            TransferDirection::Download => self.local_size >= 0,
            TransferDirection::Upload => self.remote_size >= 0,
        }
    }

    fn resume_possible(&self) -> bool {
        !self.settings.ascii
            && match self.direction {
                TransferDirection::Download => self.local_size > 0,
                TransferDirection::Upload => self.remote_size > 0,
            }
    }

    fn apply_overwrite_action(&mut self, action: &FileExistsAction) -> Decision {
        match action {
            FileExistsAction::Overwrite => Decision::Proceed,
            FileExistsAction::OverwriteNewer => {
                let (source_time, target_time) = match self.direction {
                    TransferDirection::Download => {
                        (self.remote_time, local_time_of(&self.local))
                    }
                    TransferDirection::Upload => {
                        (local_time_of(&self.local), self.remote_time)
                    }
                };
                match (source_time, target_time) {
                    (Some(source), Some(target)) if source > target => Decision::Proceed,
                    _ => Decision::Skip,
                }
            }
            FileExistsAction::OverwriteSize => {
                if self.local_size != self.remote_size {
                    Decision::Proceed
                } else {
                    Decision::Skip
                }
            }
            FileExistsAction::OverwriteSizeOrNewer => {
                if self.local_size != self.remote_size {
                    return Decision::Proceed;
                }
                let newer = FileExistsAction::OverwriteNewer;
                self.apply_overwrite_action(&newer)
            }
            FileExistsAction::Resume => {
                if self.resume_possible() {
                    self.resume = true;
                }
                Decision::Proceed
            }
            FileExistsAction::Rename(new_name) => {
                match self.direction {
                    TransferDirection::Download => {
                        self.local = self
                            .local
                            .parent()
                            .map_or_else(|| PathBuf::from(new_name), |p| p.join(new_name));
                        self.local_size = local_file::local_size(&self.local);
                    }
                    TransferDirection::Upload => {
                        self.remote_file = new_name.clone();
                        self.remote_size = -1;
                    }
                }
                Decision::Proceed
            }
            FileExistsAction::Skip => Decision::Skip,
        }
    }

    fn start_transfer(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        self.state = FileState::Transfer;
        let remote_name = self.remote_file.clone();
        let ascii = self.settings.ascii;

        match self.direction {
            TransferDirection::Download => {
                let (file, offset) = match local_file::open_download_target(
                    cx.services,
                    &self.local,
                    self.resume,
                ) {
                    Ok(opened) => opened,
                    Err(error) => {
                        cx.log(
                            MessageKind::Error,
                            format!("Cannot open {:?} for writing: {error}", self.local),
                        );
                        return ReplyCode::ERROR | ReplyCode::CRITICAL_ERROR;
                    }
                };
                cx.services.shared.transfer_status().start(
                    self.remote_size,
                    i64::try_from(offset).unwrap_or(0),
                    false,
                );
                cx.services.notify(Notification::TransferStatusChanged);
                cx.push(Box::new(DataTransferOp::download(
                    format!("RETR {remote_name}"),
                    DataSink::File(file),
                    ascii,
                    offset,
                )));
            }
            TransferDirection::Upload => {
                let offset = if self.resume && self.remote_size > 0 {
                    u64::try_from(self.remote_size).unwrap_or(0)
                } else {
                    0
                };
                let file = match local_file::open_upload_source(&self.local, offset) {
                    Ok(file) => file,
                    Err(error) => {
                        cx.log(
                            MessageKind::Error,
                            format!("Cannot open {:?} for reading: {error}", self.local),
                        );
                        return ReplyCode::ERROR | ReplyCode::CRITICAL_ERROR;
                    }
                };
                cx.services.shared.transfer_status().start(
                    self.local_size,
                    i64::try_from(offset).unwrap_or(0),
                    false,
                );
                cx.services.notify(Notification::TransferStatusChanged);
                let command = if offset > 0 {
                    format!("APPE {remote_name}")
                } else {
                    format!("STOR {remote_name}")
                };
                cx.push(Box::new(DataTransferOp::upload(command, file, ascii, 0)));
            }
        }
        ReplyCode::WOULDBLOCK
    }

    fn finish_success(&mut self, cx: &mut OpCtx<'_>, transferred: u64) -> ReplyCode {
        cx.services.shared.transfer_status().finish();
        cx.services.notify(Notification::TransferStatusChanged);

        let key = crate::cache::ServerKey::of(&cx.session.server);
        match self.direction {
            TransferDirection::Download => {
                if let Some(mtime) = self.remote_time {
                    local_file::set_local_mtime(&self.local, mtime);
                }
            }
            TransferDirection::Upload => {
                let new_size = local_file::local_size(&self.local);
                cx.services.ctx.cache().update_file(
                    &key,
                    &self.remote_path,
                    &self.remote_file,
                    new_size,
                    local_file::local_mtime(&self.local),
                );
                cx.services.notify(Notification::ListingUpdated {
                    path: self.remote_path.clone(),
                    failed: false,
                    modified: true,
                });
                crate::engine::notify_peers_listing_changed(
                    cx.services,
                    &key,
                    &self.remote_path,
                );
            }
        }
        cx.log(
            MessageKind::Status,
            format!("File transfer successful, transferred {transferred} bytes"),
        );
        ReplyCode::OK
    }
}

enum Decision {
    Proceed,
    Skip,
}

fn local_time_of(path: &std::path::Path) -> Option<chrono::NaiveDateTime> {
    local_file::local_mtime(path)
}

impl Operation for FileTransferOp {
    fn command_name(&self) -> &'static str {
        "transfer"
    }

    fn send(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        match self.state {
            FileState::Cwd => {
                self.local_size = local_file::local_size(&self.local);
                self.probe_remote(cx);
                self.state = FileState::CheckOverwrite;
                cx.push(Box::new(CwdOp::new(
                    Some(self.remote_path.clone()),
                    String::new(),
                    false,
                )));
                ReplyCode::WOULDBLOCK
            }
            FileState::CheckOverwrite => {
                if !self.needs_overwrite_prompt() {
                    return self.start_transfer(cx);
                }
                self.state = FileState::WaitOverwriteReply;
                self.waiting_async = true;
                cx.request_async(AsyncRequest::FileExists(FileExistsPrompt {
                    download: self.direction.is_download(),
                    local_path: self.local.clone(),
                    remote_path: self.remote_path.clone(),
                    remote_file: self.remote_file.clone(),
                    local_size: self.local_size,
                    remote_size: self.remote_size,
                    local_time: local_time_of(&self.local),
                    remote_time: self.remote_time,
                    resume_possible: self.resume_possible(),
                    ascii: self.settings.ascii,
                }));
                ReplyCode::WOULDBLOCK
            }
            FileState::SendMfmt => {
                let Some(mtime) = local_file::local_mtime(&self.local) else {
                    return self.finish_success(cx, self.transferred);
                };
                self.state = FileState::WaitMfmt;
                let stamp = mtime.format("%Y%m%d%H%M%S");
                let command = format!("MFMT {stamp} {}", self.remote_file);
                match send_command(cx, &command, false) {
                    Ok(()) => ReplyCode::WOULDBLOCK,
                    Err(code) => code,
                }
            }
            _ => ReplyCode::WOULDBLOCK,
        }
    }

    fn on_event(&mut self, cx: &mut OpCtx<'_>, event: WireEvent<'_>) -> ReplyCode {
        match event {
            WireEvent::FtpReply(_) if self.state == FileState::WaitMfmt => {
                // Best effort; a refused MFMT does not fail the transfer.
                self.finish_success(cx, self.transferred)
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
            FileState::CheckOverwrite => {
                if !code.is_ok() {
                    return code;
                }
                // CWD finished; send() will run the overwrite check.
                ReplyCode::CONTINUE
            }
            FileState::Transfer => {
                self.transferred = child
                    .as_any()
                    .downcast_mut::<DataTransferOp>()
                    .map_or(0, |op| op.transferred);
                if code.is_ok() {
                    // Preserve the source mtime on uploads when the
                    // server supports MFMT.
                    let mfmt = cx
                        .session
                        .protocol
                        .ftp_mut()
                        .is_some_and(|ftp| ftp.features.mfmt);
                    if self.direction == TransferDirection::Upload
                        && mfmt
                        && local_file::local_mtime(&self.local).is_some()
                    {
                        self.state = FileState::SendMfmt;
                        return ReplyCode::CONTINUE;
                    }
                    return self.finish_success(cx, self.transferred);
                }
                cx.services.shared.transfer_status().finish();
                cx.services.notify(Notification::TransferStatusChanged);
                code
            }
            _ => ReplyCode::INTERNAL_ERROR,
        }
    }

    fn on_async_reply(&mut self, cx: &mut OpCtx<'_>, reply: AsyncReply) -> ReplyCode {
        self.waiting_async = false;
        let AsyncReply::FileExists(action) = reply else {
            return ReplyCode::INTERNAL_ERROR;
        };
        match self.apply_overwrite_action(&action) {
            Decision::Proceed => self.start_transfer(cx),
            Decision::Skip => {
                cx.log(
                    MessageKind::Status,
                    format!("Skipping transfer of {}", self.remote_file),
                );
                ReplyCode::OK
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
