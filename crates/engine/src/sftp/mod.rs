//! SFTP driver: a helper child process speaks a line-based control
//! protocol over its standard pipes; this module parses those lines and
//! maps engine commands onto helper commands.

mod ops;

pub(crate) use ops::{SftpConnectOp, SftpListOp, SftpSimpleOp, SftpTransferOp};

use crate::event::EngineEvent;
use crate::operation::Operation;
use crossbeam_channel::Sender;
use logging::MessageKind;
use protocol::Command;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command as ProcessCommand, Stdio};

/// One parsed line from the helper.
#[derive(Debug, Clone)]
pub(crate) enum SftpEvent {
    /// Command completed successfully.
    Done,
    /// Command failed; the helper printed the reason.
    Error(String),
    /// Progress/status text for the log.
    Status(String),
    /// Verbose trace output.
    Verbose(String),
    /// Reply payload of a query command.
    Reply(String),
    /// One raw listing line.
    Listentry(String),
    /// Bytes moved since the last `Transfer` line.
    Transfer(u64),
    /// Host-key confirmation request.
    AskHostkey {
        fingerprint: String,
        changed: bool,
    },
    /// Password request.
    AskPassword(String),
    /// Keyboard-interactive preamble and instruction.
    RequestText(String),
    /// One negotiated-algorithm detail, e.g. `KexAlgorithm`.
    AlgorithmDetail(String, String),
    /// Inbound quota consumed; pacing bookkeeping only.
    UsedQuotaRecv,
    /// Outbound quota consumed.
    UsedQuotaSend,
    /// The server's host key, fingerprint form.
    Hostkey(String),
    /// Anything unrecognised, kept for the trace log.
    Unknown(String),
}

/// Parses one helper stdout line.
pub(crate) fn parse_helper_line(line: &str) -> SftpEvent {
    let (token, rest) = match line.split_once(' ') {
        Some((token, rest)) => (token, rest),
        None => (line, ""),
    };
    let rest_owned = rest.to_owned();
    match token {
        "Done" => SftpEvent::Done,
        "Error" => SftpEvent::Error(rest_owned),
        "Status" => SftpEvent::Status(rest_owned),
        "Verbose" => SftpEvent::Verbose(rest_owned),
        "Reply" => SftpEvent::Reply(rest_owned),
        "Listentry" => SftpEvent::Listentry(rest_owned),
        "Transfer" => SftpEvent::Transfer(rest.trim().parse().unwrap_or(0)),
        "Recv" | "Send" => SftpEvent::Status(line.to_owned()),
        "AskHostkey" => SftpEvent::AskHostkey {
            fingerprint: rest_owned,
            changed: false,
        },
        "AskHostkeyChanged" | "AskHostkeyBetteralg" => SftpEvent::AskHostkey {
            fingerprint: rest_owned,
            changed: true,
        },
        "AskPassword" => SftpEvent::AskPassword(rest_owned),
        "RequestPreamble" | "RequestInstruction" => SftpEvent::RequestText(rest_owned),
        "UsedQuotaRecv" => SftpEvent::UsedQuotaRecv,
        "UsedQuotaSend" => SftpEvent::UsedQuotaSend,
        "KexAlgorithm" | "KexHash" | "KexCurve" | "CipherClientToServer"
        | "CipherServerToClient" | "MacClientToServer" | "MacServerToClient" => {
            SftpEvent::AlgorithmDetail(token.to_owned(), rest_owned)
        }
        "Hostkey" => SftpEvent::Hostkey(rest_owned),
        _ => SftpEvent::Unknown(line.to_owned()),
    }
}

/// Session state of an SFTP control socket: the helper process and its
/// stdin.
pub(crate) struct SftpState {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    /// Algorithm details collected during the handshake.
    pub algorithm_details: Vec<(String, String)>,
}

impl SftpState {
    pub fn new() -> Self {
        Self {
            child: None,
            stdin: None,
            algorithm_details: Vec::new(),
        }
    }

    /// Spawns the helper and wires its stdout into the engine queue.
    pub fn spawn(
        &mut self,
        helper: &std::path::Path,
        events: Sender<EngineEvent>,
    ) -> std::io::Result<()> {
        let mut child = ProcessCommand::new(helper)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdout = child.stdout.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "helper has no stdout")
        })?;
        self.stdin = child.stdin.take();
        self.child = Some(child);

        std::thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        if events.send(EngineEvent::SftpLine(line)).is_err() {
                            return;
                        }
                    }
                    Err(_) => break,
                }
            }
            let _ = events.send(EngineEvent::SftpClosed);
        });
        Ok(())
    }

    /// Sends one command line to the helper.
    pub fn send_line(&mut self, line: &str) -> std::io::Result<()> {
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotConnected, "helper not running")
        })?;
        stdin.write_all(line.as_bytes())?;
        stdin.write_all(b"\n")?;
        stdin.flush()
    }

    /// Terminates the helper.
    pub fn shutdown(&mut self) {
        self.stdin = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for SftpState {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Maps an engine command onto its SFTP operation.
pub(crate) fn make_operation(command: &Command) -> Option<Box<dyn Operation>> {
    match command {
        Command::Connect { server, .. } => Some(Box::new(SftpConnectOp::new(server.clone()))),
        Command::List {
            path,
            subdir,
            flags,
        } => Some(Box::new(SftpListOp::new(path.clone(), subdir.clone(), *flags))),
        Command::Transfer {
            local,
            remote_path,
            remote_file,
            direction,
            settings,
        } => Some(Box::new(SftpTransferOp::new(
            local.clone(),
            remote_path.clone(),
            remote_file.clone(),
            *direction,
            *settings,
        ))),
        Command::Delete { path, files } => Some(Box::new(SftpSimpleOp::delete(
            path.clone(),
            files.clone(),
        ))),
        Command::RemoveDir { path, subdir } => {
            Some(Box::new(SftpSimpleOp::rmdir(path.clone(), subdir.clone())))
        }
        Command::Mkdir { path } => Some(Box::new(SftpSimpleOp::mkdir(path.clone()))),
        Command::Rename {
            from_path,
            from,
            to_path,
            to,
        } => Some(Box::new(SftpSimpleOp::rename(
            from_path.clone(),
            from.clone(),
            to_path.clone(),
            to.clone(),
        ))),
        Command::Chmod {
            path,
            file,
            permissions,
        } => Some(Box::new(SftpSimpleOp::chmod(
            path.clone(),
            file.clone(),
            permissions.clone(),
        ))),
        // Raw commands are an FTP concept.
        Command::Raw(_) | Command::Disconnect => None,
    }
}

/// Routes a helper status/verbose line into the engine log.
pub(crate) fn log_helper_event(
    cx: &crate::operation::OpCtx<'_>,
    event: &SftpEvent,
) -> bool {
    match event {
        SftpEvent::Status(text) => {
            cx.log(MessageKind::Status, text.clone());
            true
        }
        SftpEvent::Verbose(text) | SftpEvent::Unknown(text) => {
            cx.log(MessageKind::Trace, text.clone());
            true
        }
        SftpEvent::UsedQuotaRecv | SftpEvent::UsedQuotaSend | SftpEvent::Hostkey(_) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helper_lines_parse_to_events() {
        assert!(matches!(parse_helper_line("Done"), SftpEvent::Done));
        assert!(matches!(
            parse_helper_line("Error Permission denied"),
            SftpEvent::Error(text) if text == "Permission denied"
        ));
        assert!(matches!(
            parse_helper_line("Transfer 32768"),
            SftpEvent::Transfer(32768)
        ));
        assert!(matches!(
            parse_helper_line("Listentry drwxr-xr-x 2 u g 512 Jan 15 2020 pub"),
            SftpEvent::Listentry(_)
        ));
        assert!(matches!(
            parse_helper_line("AskHostkeyChanged ssh-ed25519 SHA256:abcdef"),
            SftpEvent::AskHostkey { changed: true, .. }
        ));
        assert!(matches!(
            parse_helper_line("KexAlgorithm curve25519-sha256"),
            SftpEvent::AlgorithmDetail(name, value)
                if name == "KexAlgorithm" && value == "curve25519-sha256"
        ));
        assert!(matches!(
            parse_helper_line("SomethingNew x"),
            SftpEvent::Unknown(_)
        ));
    }
}
