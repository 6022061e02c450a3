//! HTTP download: request issuing, redirect chasing, resume via Range,
//! and delivery either into a local file or as in-memory data chunks.

use super::request::{HttpRequest, HttpRequestOp, HttpResponse, ResponseConsumer};
use super::uri_for;
use crate::local_file;
use crate::notification::Notification;
use crate::operation::{OpCtx, Operation, WireEvent};
use logging::MessageKind;
use protocol::{ReplyCode, TransferDirection, TransferSettings, Uri};
use std::any::Any;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

/// Redirect ceiling, after which the transfer fails.
const MAX_REDIRECTS: u32 = 6;

/// Consumer side of a download: writes the body to its destination and
/// records what the header told us.
struct TransferConsumer {
    local: PathBuf,
    resume: bool,
    file: Option<File>,
    /// Redirect target from a 3xx response.
    redirect: Option<String>,
    /// A resume attempt was answered with 416.
    range_failed: bool,
    status_started: bool,
}

impl TransferConsumer {
    fn new(local: PathBuf, resume: bool) -> Self {
        Self {
            local,
            resume,
            file: None,
            redirect: None,
            range_failed: false,
            status_started: false,
        }
    }

    fn in_memory(&self) -> bool {
        self.local.as_os_str().is_empty()
    }
}

impl ResponseConsumer for TransferConsumer {
    fn on_header(&mut self, cx: &mut OpCtx<'_>, response: &HttpResponse) -> ReplyCode {
        let code = response.code;

        if (300..400).contains(&code) {
            if code == 305 {
                cx.log(MessageKind::Error, "Proxy redirects are not supported".to_owned());
                return ReplyCode::NOT_SUPPORTED;
            }
            match response.header("Location") {
                Some(location) => {
                    self.redirect = Some(location.to_owned());
                    // Drain whatever body the redirect carries.
                    return ReplyCode::CONTINUE;
                }
                None => return ReplyCode::ERROR | ReplyCode::DISCONNECTED,
            }
        }

        if code == 416 && self.resume {
            // Requested range not satisfiable: restart from scratch.
            self.range_failed = true;
            return ReplyCode::CONTINUE;
        }

        if code >= 400 {
            cx.log(
                MessageKind::Error,
                format!("Server returned HTTP status {code}"),
            );
            return ReplyCode::ERROR;
        }

        // A 200 to a Range request means the server ignored the range;
        // restart the local file from zero.
        let effective_resume = self.resume && code == 206;
        if self.resume && code == 200 {
            cx.log(
                MessageKind::Status,
                "Server does not support resume, restarting from the beginning".to_owned(),
            );
            self.resume = false;
        }

        let total = response
            .header("Content-Length")
            .and_then(|value| value.trim().parse::<i64>().ok())
            .unwrap_or(-1);

        if !self.in_memory() {
            match local_file::open_download_target(cx.services, &self.local, effective_resume) {
                Ok((file, offset)) => {
                    cx.services.shared.transfer_status().start(
                        total,
                        i64::try_from(offset).unwrap_or(0),
                        false,
                    );
                    self.status_started = true;
                    cx.services.notify(Notification::TransferStatusChanged);
                    self.file = Some(file);
                }
                Err(error) => {
                    cx.log(
                        MessageKind::Error,
                        format!("Cannot open {:?} for writing: {error}", self.local),
                    );
                    return ReplyCode::ERROR | ReplyCode::CRITICAL_ERROR;
                }
            }
        } else {
            cx.services.shared.transfer_status().start(total, 0, false);
            self.status_started = true;
            cx.services.notify(Notification::TransferStatusChanged);
        }
        ReplyCode::CONTINUE
    }

    fn on_data(&mut self, cx: &mut OpCtx<'_>, data: &[u8]) -> ReplyCode {
        // Bodies of redirects and failed ranges are drained silently.
        if self.redirect.is_some() || self.range_failed {
            return ReplyCode::CONTINUE;
        }
        if let Some(file) = self.file.as_mut() {
            if file.write_all(data).is_err() {
                return ReplyCode::ERROR | ReplyCode::CRITICAL_ERROR;
            }
        } else if self.in_memory() {
            cx.notify(Notification::DataChunk(data.to_vec()));
        }
        cx.services.shared.transfer_status().advance(data.len() as u64);
        cx.services.notify(Notification::TransferStatusChanged);
        cx.services.set_activity(TransferDirection::Download);
        ReplyCode::CONTINUE
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}

/// Downloads one URI, following redirects and handling resume.
pub(crate) struct HttpFileTransferOp {
    local: PathBuf,
    remote_path: String,
    uri: Uri,
    resume: bool,
    redirects: u32,
    started: bool,
}

impl HttpFileTransferOp {
    pub fn new(local: PathBuf, remote_path: String, settings: TransferSettings) -> Self {
        Self {
            local,
            remote_path,
            uri: Uri::default(),
            resume: settings.resume,
            redirects: 0,
            started: false,
        }
    }

    fn build_request(&mut self, cx: &OpCtx<'_>, path: &str) -> HttpRequest {
        if self.uri.host.is_empty() {
            self.uri = uri_for(&cx.session.server, path);
        }
        let mut request = HttpRequest::get(self.uri.clone());
        if self.resume {
            let offset = local_file::local_size(&self.local);
            if offset > 0 {
                request.header("Range", format!("bytes={offset}-"));
            } else {
                self.resume = false;
            }
        }
        request
    }

    fn push_request(&mut self, cx: &mut OpCtx<'_>, request: HttpRequest) -> ReplyCode {
        let consumer = TransferConsumer::new(self.local.clone(), self.resume);
        cx.push(Box::new(HttpRequestOp::new(request, Box::new(consumer))));
        ReplyCode::WOULDBLOCK
    }
}

impl Operation for HttpFileTransferOp {
    fn command_name(&self) -> &'static str {
        "transfer"
    }

    fn send(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        if self.started {
            return ReplyCode::WOULDBLOCK;
        }
        self.started = true;
        let path = self.remote_path.clone();
        let request = self.build_request(cx, &path);
        self.push_request(cx, request)
    }

    fn on_event(&mut self, _cx: &mut OpCtx<'_>, event: WireEvent<'_>) -> ReplyCode {
        match event {
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
        let Some(request_op) = child.as_any().downcast_mut::<HttpRequestOp>() else {
            return ReplyCode::INTERNAL_ERROR;
        };

        if !code.is_ok() {
            cx.services.shared.transfer_status().finish();
            cx.services.notify(Notification::TransferStatusChanged);
            return code;
        }

        let Some(consumer) = request_op
            .consumer
            .as_mut()
            .and_then(|consumer| consumer.as_any().downcast_mut::<TransferConsumer>())
        else {
            return ReplyCode::INTERNAL_ERROR;
        };
        let redirect = consumer.redirect.take();
        let range_failed = consumer.range_failed;

        if let Some(location) = redirect {
            self.redirects += 1;
            if self.redirects > MAX_REDIRECTS {
                cx.log(MessageKind::Error, "Too many redirects".to_owned());
                return ReplyCode::ERROR;
            }
            let mut target = match Uri::parse(&location) {
                Ok(target) => target,
                Err(_) => return ReplyCode::ERROR,
            };
            target.resolve(&self.uri);
            if !matches!(target.scheme.as_str(), "http" | "https") {
                cx.log(
                    MessageKind::Error,
                    format!("Redirect to unsupported scheme {}", target.scheme),
                );
                return ReplyCode::ERROR;
            }
            cx.log(MessageKind::Status, format!("Redirected to {target}"));
            self.uri = target;
            let path = self.uri.path.clone();
            let request = self.build_request(cx, &path);
            return self.push_request(cx, request);
        }

        if range_failed {
            // 416: retry without resume, from offset zero.
            self.resume = false;
            let _ = std::fs::remove_file(&self.local);
            let path = self.uri.path.clone();
            let request = self.build_request(cx, &path);
            return self.push_request(cx, request);
        }

        cx.services.shared.transfer_status().finish();
        cx.services.notify(Notification::TransferStatusChanged);
        cx.log(MessageKind::Status, "File transfer successful".to_owned());
        ReplyCode::OK
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}
