//! FTP protocol driver: reply framing, session capabilities, and the
//! operations implementing each engine command.

mod cwd;
mod list;
mod logon;
mod misc;
mod transfer;

pub(crate) use list::ListOp;
pub(crate) use logon::LogonOp;
pub(crate) use misc::{ChmodOp, DeleteOp, MkdirOp, RawOp, RenameOp, RmdirOp};
pub(crate) use transfer::FileTransferOp;

use crate::operation::Operation;
use protocol::{Command, ReplyCode};
use transport::{Backend, TlsSession};

/// One complete FTP reply; multiline replies carry every line.
#[derive(Debug, Clone)]
pub(crate) struct FtpReply {
    /// Three-digit code; zero for unparseable garbage.
    pub code: u16,
    /// All lines of the reply, undecorated.
    pub lines: Vec<String>,
}

impl FtpReply {
    /// First digit of the code (2 = success, 3 = continue, ...).
    pub fn severity(&self) -> u16 {
        self.code / 100
    }

    pub fn is_success(&self) -> bool {
        self.severity() == 2
    }

    pub fn is_intermediate(&self) -> bool {
        self.severity() == 3
    }

    pub fn is_permanent_failure(&self) -> bool {
        self.severity() == 5
    }

    /// Text of the first line, code stripped.
    pub fn text(&self) -> &str {
        self.lines
            .first()
            .map_or("", |line| line.get(4..).unwrap_or("").trim())
    }

    /// The whole reply joined for searching (FEAT).
    pub fn joined(&self) -> String {
        self.lines.join("\n")
    }
}

/// Accumulates control-connection bytes into complete replies,
/// reassembling multiline replies.
#[derive(Default)]
pub(crate) struct ReplyFraming {
    lines: Vec<String>,
    multiline_code: Option<u16>,
}

impl ReplyFraming {
    /// Extracts the next complete reply from `recv`, consuming its
    /// bytes. Returns `None` while the reply is still partial.
    pub fn extract(&mut self, recv: &mut Vec<u8>) -> Option<FtpReply> {
        while let Some(line) = take_line(recv) {
            match self.multiline_code {
                None => {
                    let code = parse_code(&line);
                    match code {
                        Some((code, true)) => {
                            // `ddd-`: start of a multiline reply.
                            self.lines.push(line);
                            self.multiline_code = Some(code);
                        }
                        Some((code, false)) => {
                            return Some(FtpReply {
                                code,
                                lines: vec![line],
                            });
                        }
                        None => {
                            // Garbage where a reply was expected.
                            return Some(FtpReply {
                                code: 0,
                                lines: vec![line],
                            });
                        }
                    }
                }
                Some(expected) => {
                    let done = parse_code(&line)
                        .is_some_and(|(code, dash)| code == expected && !dash);
                    self.lines.push(line);
                    if done {
                        self.multiline_code = None;
                        return Some(FtpReply {
                            code: expected,
                            lines: std::mem::take(&mut self.lines),
                        });
                    }
                }
            }
        }
        None
    }
}

fn take_line(recv: &mut Vec<u8>) -> Option<String> {
    let newline = recv.iter().position(|&b| b == b'\n')?;
    let mut line: Vec<u8> = recv.drain(..=newline).collect();
    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Some(match String::from_utf8(line) {
        Ok(text) => text,
        Err(error) => error
            .as_bytes()
            .iter()
            .map(|&b| char::from(b))
            .collect(),
    })
}

fn parse_code(line: &str) -> Option<(u16, bool)> {
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return None;
    }
    let code: u16 = line[..3].parse().ok()?;
    if !(100..600).contains(&code) {
        return None;
    }
    match bytes.get(3) {
        None | Some(b' ') => Some((code, false)),
        Some(b'-') => Some((code, true)),
        _ => None,
    }
}

/// Capabilities learned from the FEAT response.
#[derive(Clone, Debug, Default)]
pub(crate) struct Features {
    pub utf8: bool,
    pub clnt: bool,
    pub mlsd: bool,
    /// Raw fact list from the `MLST` FEAT line, `*` markers included.
    pub mlst_facts: String,
    pub mfmt: bool,
    pub mdtm: bool,
    pub size: bool,
    pub tvfs: bool,
    pub rest_stream: bool,
    pub epsv: bool,
    pub mode_z: bool,
}

impl Features {
    /// Parses the joined FEAT reply.
    pub fn from_feat(reply: &FtpReply) -> Self {
        let mut features = Self::default();
        for raw_line in &reply.lines {
            let line = raw_line.trim();
            // Skip the "211-Features:" frame lines.
            if line.len() >= 4 && line.as_bytes()[..3].iter().all(u8::is_ascii_digit) {
                continue;
            }
            let upper = line.to_ascii_uppercase();
            if upper == "UTF8" {
                features.utf8 = true;
            } else if upper == "CLNT" {
                features.clnt = true;
            } else if upper == "MFMT" {
                features.mfmt = true;
            } else if upper == "MDTM" {
                features.mdtm = true;
            } else if upper == "SIZE" {
                features.size = true;
            } else if upper == "TVFS" {
                features.tvfs = true;
            } else if upper == "EPSV" {
                features.epsv = true;
            } else if upper == "REST STREAM" {
                features.rest_stream = true;
            } else if upper.starts_with("MODE Z") {
                features.mode_z = true;
            } else if upper == "MLSD" {
                features.mlsd = true;
            } else if let Some(facts) = upper.strip_prefix("MLST") {
                features.mlsd = true;
                features.mlst_facts = facts.trim().to_ascii_lowercase();
            }
        }
        features
    }
}

/// One FTP data connection (passive mode), with its optional TLS layer.
pub(crate) struct DataConnection {
    pub backend: Backend,
    pub tls: Option<TlsSession>,
    pub connected: bool,
    /// `PROT P` was negotiated: wrap in TLS as soon as connected.
    pub protected: bool,
}

/// Session state of an FTP control socket.
pub(crate) struct FtpState {
    pub framing: ReplyFraming,
    pub features: Features,
    pub use_utf8: bool,
    /// `PROT P` active for subsequent data connections.
    pub protect_data_channel: bool,
    pub data: Option<DataConnection>,
}

impl FtpState {
    pub fn new() -> Self {
        Self {
            framing: ReplyFraming::default(),
            features: Features::default(),
            use_utf8: true,
            protect_data_channel: false,
            data: None,
        }
    }

    /// Drops the data connection, closing its socket.
    pub fn close_data(&mut self) {
        if let Some(mut data) = self.data.take() {
            data.backend.close();
        }
    }
}

/// Maps an engine command onto the FTP operation implementing it.
pub(crate) fn make_operation(command: &Command) -> Option<Box<dyn Operation>> {
    match command {
        Command::Connect { server, .. } => Some(Box::new(LogonOp::new(server.clone()))),
        Command::List {
            path,
            subdir,
            flags,
        } => Some(Box::new(ListOp::new(path.clone(), subdir.clone(), *flags))),
        Command::Transfer {
            local,
            remote_path,
            remote_file,
            direction,
            settings,
        } => Some(Box::new(FileTransferOp::new(
            local.clone(),
            remote_path.clone(),
            remote_file.clone(),
            *direction,
            *settings,
        ))),
        Command::Delete { path, files } => {
            Some(Box::new(DeleteOp::new(path.clone(), files.clone())))
        }
        Command::RemoveDir { path, subdir } => {
            Some(Box::new(RmdirOp::new(path.clone(), subdir.clone())))
        }
        Command::Mkdir { path } => Some(Box::new(MkdirOp::new(path.clone()))),
        Command::Rename {
            from_path,
            from,
            to_path,
            to,
        } => Some(Box::new(RenameOp::new(
            from_path.clone(),
            from.clone(),
            to_path.clone(),
            to.clone(),
        ))),
        Command::Chmod {
            path,
            file,
            permissions,
        } => Some(Box::new(ChmodOp::new(
            path.clone(),
            file.clone(),
            permissions.clone(),
        ))),
        Command::Raw(line) => Some(Box::new(RawOp::new(line.clone()))),
        Command::Disconnect => None,
    }
}

/// Sends one control-connection command, encoded per the session's
/// UTF-8 mode, logging it with arguments masked when `hide` is set.
pub(crate) fn send_command(
    cx: &mut crate::operation::OpCtx<'_>,
    line: &str,
    hide: bool,
) -> Result<(), ReplyCode> {
    let logged = if hide {
        let verb = line.split(' ').next().unwrap_or(line);
        format!("{verb} ****")
    } else {
        line.to_owned()
    };
    cx.log(logging::MessageKind::Command, logged);

    let use_utf8 = cx
        .session
        .protocol
        .ftp_mut()
        .is_none_or(|ftp| ftp.use_utf8);
    let mut wire = encode_line(line, use_utf8);
    wire.extend_from_slice(b"\r\n");
    cx.conn.send_raw(&wire)
}

/// UTF-8 or Latin-1 encoding of one command line.
fn encode_line(line: &str, use_utf8: bool) -> Vec<u8> {
    if use_utf8 {
        line.as_bytes().to_vec()
    } else {
        line.chars()
            .map(|c| {
                let value = c as u32;
                if value <= 0xff {
                    value as u8
                } else {
                    b'?'
                }
            })
            .collect()
    }
}

/// Shorthand used by every FTP operation when a reply means failure.
pub(crate) fn failure_code(reply: &FtpReply) -> ReplyCode {
    if reply.code == 0 {
        ReplyCode::ERROR | ReplyCode::DISCONNECTED
    } else {
        ReplyCode::ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_replies_are_framed() {
        let mut framing = ReplyFraming::default();
        let mut recv = b"220 Welcome\r\n331 Need password\r\n".to_vec();
        let first = framing.extract(&mut recv).expect("first reply");
        assert_eq!(first.code, 220);
        assert_eq!(first.text(), "Welcome");
        let second = framing.extract(&mut recv).expect("second reply");
        assert_eq!(second.code, 331);
        assert!(framing.extract(&mut recv).is_none());
    }

    #[test]
    fn multiline_replies_wait_for_the_closing_line() {
        let mut framing = ReplyFraming::default();
        let mut recv = b"211-Features:\r\n MLST type*;size*;modify*;\r\n UTF8\r\n".to_vec();
        assert!(framing.extract(&mut recv).is_none());
        recv.extend_from_slice(b"211 End\r\n");
        let reply = framing.extract(&mut recv).expect("complete reply");
        assert_eq!(reply.code, 211);
        assert_eq!(reply.lines.len(), 4);
    }

    #[test]
    fn partial_lines_are_kept_in_the_buffer() {
        let mut framing = ReplyFraming::default();
        let mut recv = b"22".to_vec();
        assert!(framing.extract(&mut recv).is_none());
        recv.extend_from_slice(b"0 hello\r\n");
        assert_eq!(framing.extract(&mut recv).expect("reply").code, 220);
    }

    #[test]
    fn garbage_is_reported_as_code_zero() {
        let mut framing = ReplyFraming::default();
        let mut recv = b"not an ftp reply\r\n".to_vec();
        let reply = framing.extract(&mut recv).expect("garbage consumed");
        assert_eq!(reply.code, 0);
    }

    #[test]
    fn feat_parsing_collects_capabilities() {
        let reply = FtpReply {
            code: 211,
            lines: vec![
                "211-Features:".into(),
                " MLST type*;size*;modify*;perm;unix.mode;".into(),
                " MDTM".into(),
                " MFMT".into(),
                " SIZE".into(),
                " REST STREAM".into(),
                " EPSV".into(),
                " TVFS".into(),
                " UTF8".into(),
                " CLNT".into(),
                " MODE Z".into(),
                "211 End".into(),
            ],
        };
        let features = Features::from_feat(&reply);
        assert!(features.utf8 && features.clnt && features.mlsd);
        assert!(features.mdtm && features.mfmt && features.size);
        assert!(features.rest_stream && features.epsv && features.tvfs);
        assert!(features.mode_z);
        assert_eq!(features.mlst_facts, "type*;size*;modify*;perm;unix.mode;");
    }
}
