#![deny(unsafe_code)]

//! `oc-ferry` — command-line driver for the transfer engine. Connects
//! to a server URL, runs one command, prints the engine's notifications
//! and exits with a status reflecting the reply code.

use clap::{Parser, Subcommand};
use engine::{
    AsyncReply, Command, Engine, EngineContext, EngineOptions, FileExistsAction, ListFlags,
    Notification, PathSyntax, ReplyCode, Server, ServerPath, TransferDirection, TransferSettings,
    Uri,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "oc-ferry", about = "Multi-protocol file transfer client", version)]
struct Cli {
    /// Server URL: ftp://, ftps://, ftpes://, sftp://, http(s)://
    url: String,

    #[command(subcommand)]
    action: Action,

    /// Trust unknown server certificates and host keys
    #[arg(long)]
    insecure: bool,

    /// Overwrite existing files without asking
    #[arg(long)]
    overwrite: bool,

    /// Resume partial transfers
    #[arg(long)]
    resume: bool,

    /// Timeout in seconds for the no-activity watchdog
    #[arg(long, default_value_t = 20)]
    timeout: u64,

    /// Download limit in KiB/s
    #[arg(long, default_value_t = 0)]
    limit_down: u64,

    /// Upload limit in KiB/s
    #[arg(long, default_value_t = 0)]
    limit_up: u64,

    /// Debug verbosity 0-4
    #[arg(long, default_value_t = 0)]
    debug: u8,
}

#[derive(Subcommand)]
enum Action {
    /// List a remote directory
    Ls {
        /// Directory to list; defaults to the URL's path
        path: Option<String>,
    },
    /// Download a file
    Get {
        /// Remote file path
        remote: String,
        /// Local target; defaults to the remote file name
        local: Option<PathBuf>,
    },
    /// Upload a file
    Put {
        /// Local source
        local: PathBuf,
        /// Remote target path
        remote: String,
    },
    /// Delete a remote file
    Rm {
        /// Remote file path
        remote: String,
    },
    /// Create a remote directory
    Mkdir {
        /// Remote directory path
        path: String,
    },
    /// Remove a remote directory
    Rmdir {
        /// Remote directory path
        path: String,
    },
    /// Rename a remote file or directory
    Mv {
        /// Source path
        from: String,
        /// Target path
        to: String,
    },
    /// Change permissions of a remote file
    Chmod {
        /// Permission string, e.g. 644
        mode: String,
        /// Remote file path
        remote: String,
    },
    /// Send a raw protocol command (FTP only)
    Raw {
        /// The command line to send
        line: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) if code.is_ok() => ExitCode::SUCCESS,
        Ok(code) => {
            eprintln!("oc-ferry: {code}");
            ExitCode::FAILURE
        }
        Err(message) => {
            eprintln!("oc-ferry: {message}");
            ExitCode::FAILURE
        }
    }
}

fn split_remote(remote: &str) -> Result<(ServerPath, String), String> {
    let full = ServerPath::parse(PathSyntax::Unix, remote)
        .ok_or_else(|| format!("invalid remote path: {remote}"))?;
    let name = full
        .last_segment()
        .ok_or_else(|| format!("remote path has no file name: {remote}"))?
        .to_owned();
    let parent = full
        .parent()
        .ok_or_else(|| format!("remote path has no parent: {remote}"))?;
    Ok((parent, name))
}

fn build_command(cli: &Cli, server: &Server) -> Result<Command, String> {
    let settings = TransferSettings {
        ascii: false,
        resume: cli.resume,
    };
    let command = match &cli.action {
        Action::Ls { path } => {
            let target = path.clone().unwrap_or_else(|| "/".to_owned());
            let path = ServerPath::parse(PathSyntax::Unix, &target)
                .ok_or_else(|| format!("invalid directory: {target}"))?;
            Command::List {
                path: Some(path),
                subdir: String::new(),
                flags: ListFlags::REFRESH,
            }
        }
        Action::Get { remote, local } => {
            let (remote_path, remote_file) = split_remote(remote)?;
            let local = local
                .clone()
                .unwrap_or_else(|| PathBuf::from(&remote_file));
            Command::Transfer {
                local,
                remote_path,
                remote_file,
                direction: TransferDirection::Download,
                settings,
            }
        }
        Action::Put { local, remote } => {
            let (remote_path, remote_file) = split_remote(remote)?;
            Command::Transfer {
                local: local.clone(),
                remote_path,
                remote_file,
                direction: TransferDirection::Upload,
                settings,
            }
        }
        Action::Rm { remote } => {
            let (path, file) = split_remote(remote)?;
            Command::Delete {
                path,
                files: vec![file],
            }
        }
        Action::Mkdir { path } => Command::Mkdir {
            path: ServerPath::parse(PathSyntax::Unix, path)
                .ok_or_else(|| format!("invalid directory: {path}"))?,
        },
        Action::Rmdir { path } => {
            let (parent, name) = split_remote(path)?;
            Command::RemoveDir {
                path: parent,
                subdir: name,
            }
        }
        Action::Mv { from, to } => {
            let (from_path, from_name) = split_remote(from)?;
            let (to_path, to_name) = split_remote(to)?;
            Command::Rename {
                from_path,
                from: from_name,
                to_path,
                to: to_name,
            }
        }
        Action::Chmod { mode, remote } => {
            let (path, file) = split_remote(remote)?;
            Command::Chmod {
                path,
                file,
                permissions: mode.clone(),
            }
        }
        Action::Raw { line } => {
            if !server.protocol.is_ftp() {
                return Err("raw commands are only available on FTP".to_owned());
            }
            Command::Raw(line.clone())
        }
    };
    Ok(command)
}

fn run(cli: &Cli) -> Result<ReplyCode, String> {
    let uri = Uri::parse_lenient(&cli.url).map_err(|error| format!("invalid URL: {error}"))?;
    let server = Server::from_uri(&uri).ok_or_else(|| "URL names no server".to_owned())?;

    let options = EngineOptions {
        timeout: Duration::from_secs(cli.timeout),
        speed_limit_inbound: cli.limit_down,
        speed_limit_outbound: cli.limit_up,
        speed_limits_enabled: cli.limit_down > 0 || cli.limit_up > 0,
        debug_level: cli.debug,
        ..EngineOptions::default()
    };
    let context = EngineContext::new(options);

    let (wake_tx, wake_rx) = mpsc::channel::<()>();
    let engine = Engine::new(
        &context,
        Box::new(move || {
            let _ = wake_tx.send(());
        }),
    );

    let connect = Command::Connect {
        server: server.clone(),
        retry: true,
    };
    let code = run_command(cli, &engine, &wake_rx, connect)?;
    if code.failed() {
        return Ok(code);
    }

    let command = build_command(cli, &server)?;
    run_command(cli, &engine, &wake_rx, command)
}

/// Runs one command to completion, printing notifications and
/// answering prompts per the CLI's trust flags.
fn run_command(
    cli: &Cli,
    engine: &Engine,
    wake: &mpsc::Receiver<()>,
    command: Command,
) -> Result<ReplyCode, String> {
    let submitted = engine.execute(command);
    if !submitted.would_block() {
        return Ok(submitted);
    }

    loop {
        let _ = wake.recv_timeout(Duration::from_millis(200));
        while let Some(notification) = engine.next_notification() {
            match notification {
                Notification::Log { kind, text } => {
                    eprintln!("{} {}", kind.prefix(), text);
                }
                Notification::OperationFinished { code, .. } => {
                    return Ok(code);
                }
                Notification::ListingUpdated { path, failed, .. } => {
                    if failed {
                        eprintln!("Listing of {path} failed");
                    } else if let Ok(listing) = engine.cache_lookup(&path) {
                        for entry in &listing.entries {
                            let kind = if entry.is_link {
                                'l'
                            } else if entry.is_dir {
                                'd'
                            } else {
                                '-'
                            };
                            let size = if entry.size < 0 {
                                "-".to_owned()
                            } else {
                                entry.size.to_string()
                            };
                            println!("{kind} {size:>12} {}", entry.name);
                        }
                    }
                }
                Notification::AsyncRequest(request) => {
                    let reply = match &request.request {
                        engine::AsyncRequest::Certificate { .. }
                        | engine::AsyncRequest::HostKey { .. } => {
                            if cli.insecure {
                                match &request.request {
                                    engine::AsyncRequest::Certificate { .. } => {
                                        AsyncReply::Certificate { trust: true }
                                    }
                                    _ => AsyncReply::HostKey { trust: true },
                                }
                            } else {
                                eprintln!(
                                    "Unknown server identity; re-run with --insecure to trust it"
                                );
                                match &request.request {
                                    engine::AsyncRequest::Certificate { .. } => {
                                        AsyncReply::Certificate { trust: false }
                                    }
                                    _ => AsyncReply::HostKey { trust: false },
                                }
                            }
                        }
                        engine::AsyncRequest::FileExists(prompt) => {
                            if cli.resume && prompt.resume_possible {
                                AsyncReply::FileExists(FileExistsAction::Resume)
                            } else if cli.overwrite {
                                AsyncReply::FileExists(FileExistsAction::Overwrite)
                            } else {
                                eprintln!(
                                    "Target exists; pass --overwrite or --resume to proceed"
                                );
                                AsyncReply::FileExists(FileExistsAction::Skip)
                            }
                        }
                        engine::AsyncRequest::InteractiveLogin { challenge } => {
                            eprintln!("{challenge}");
                            let password = rpassword_fallback()?;
                            AsyncReply::InteractiveLogin { password }
                        }
                        engine::AsyncRequest::SftpEncryption { details } => {
                            for (name, value) in details {
                                eprintln!("{name}: {value}");
                            }
                            AsyncReply::Dismissed
                        }
                    };
                    engine.set_async_request_reply(request.request_id, reply);
                }
                Notification::DataChunk(bytes) => {
                    use std::io::Write;
                    let _ = std::io::stdout().write_all(&bytes);
                }
                Notification::LocalDirCreated(dir) => {
                    eprintln!("Created directory {}", dir.display());
                }
                Notification::ActiveTransfer { .. } | Notification::TransferStatusChanged => {}
            }
        }
    }
}

/// Reads a password from stdin; the terminal-echo handling a real UI
/// would do is out of scope for the demo driver.
fn rpassword_fallback() -> Result<String, String> {
    use std::io::BufRead;
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|error| format!("cannot read password: {error}"))?;
    Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}
