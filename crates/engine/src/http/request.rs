//! The HTTP request/response state machine: request emission, status
//! and header parsing, identity and chunked body decoding.

use super::InternalConnectOp;
use crate::operation::{OpCtx, Operation, WireEvent};
use logging::MessageKind;
use protocol::{ReplyCode, Uri};
use std::any::Any;

/// Longest accepted header or chunk-size line.
const MAX_LINE: usize = 8 * 1024;

/// An outgoing request.
pub(crate) struct HttpRequest {
    pub verb: String,
    pub uri: Uri,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn get(uri: Uri) -> Self {
        Self {
            verb: "GET".to_owned(),
            uri,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.push((name.to_owned(), value.into()));
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers
            .iter()
            .any(|(header, _)| header.eq_ignore_ascii_case(name))
    }
}

/// Status line and headers of a response.
#[derive(Clone, Debug, Default)]
pub(crate) struct HttpResponse {
    pub code: u16,
    pub headers: Vec<(String, String)>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// What the request operation hands response data to.
pub(crate) trait ResponseConsumer: Send {
    /// Complete header block received. Return `CONTINUE` to read the
    /// body, anything with the error bit to abort.
    fn on_header(&mut self, cx: &mut OpCtx<'_>, response: &HttpResponse) -> ReplyCode;

    /// One decoded body chunk. Return `CONTINUE` to keep reading.
    fn on_data(&mut self, cx: &mut OpCtx<'_>, data: &[u8]) -> ReplyCode;

    /// Downcast support so the issuing operation can take its results
    /// back out.
    fn as_any(&mut self) -> &mut dyn Any;
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
    Init,
    WaitConnect,
    SendHeader,
    SendBody,
    ReadStatus,
    ReadHeaders,
    ReadBody,
    ReadChunkSize,
    ReadChunkData,
    ReadChunkTrailer,
    Done,
}

enum BodyFraming {
    Identity { remaining: Option<u64> },
    Chunked,
    None,
}

/// One request/response exchange on the session's HTTP connection.
pub(crate) struct HttpRequestOp {
    request: HttpRequest,
    pub consumer: Option<Box<dyn ResponseConsumer>>,
    state: State,
    buffer: Vec<u8>,
    response: HttpResponse,
    framing: BodyFraming,
    chunk_remaining: u64,
    /// Set when the response carries `Connection: close`.
    close_after: bool,
    pub completed_response: Option<HttpResponse>,
}

impl HttpRequestOp {
    pub fn new(request: HttpRequest, consumer: Box<dyn ResponseConsumer>) -> Self {
        Self {
            request,
            consumer: Some(consumer),
            state: State::Init,
            buffer: Vec::new(),
            response: HttpResponse::default(),
            framing: BodyFraming::None,
            chunk_remaining: 0,
            close_after: false,
            completed_response: None,
        }
    }

    fn take_line(&mut self) -> Result<Option<String>, ReplyCode> {
        match self.buffer.iter().position(|&b| b == b'\n') {
            Some(position) => {
                if position > MAX_LINE {
                    return Err(ReplyCode::ERROR | ReplyCode::DISCONNECTED);
                }
                let mut line: Vec<u8> = self.buffer.drain(..=position).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                String::from_utf8(line)
                    .map(Some)
                    .map_err(|_| ReplyCode::ERROR | ReplyCode::DISCONNECTED)
            }
            None if self.buffer.len() > MAX_LINE => {
                Err(ReplyCode::ERROR | ReplyCode::DISCONNECTED)
            }
            None => Ok(None),
        }
    }

    fn emit_request(&mut self, cx: &mut OpCtx<'_>) -> Result<(), ReplyCode> {
        if !self.request.has_header("Host") {
            let host = self.request.uri.authority(false);
            self.request.header("Host", host);
        }
        if !self.request.has_header("Connection") {
            self.request.header("Connection", "close");
        }
        if !self.request.has_header("User-Agent") {
            self.request.header("User-Agent", "oc-ferry/0.6");
        }
        let body_length = self.request.body.as_ref().map(Vec::len);
        if let Some(length) = body_length {
            if !self.request.has_header("Content-Length") {
                self.request.header("Content-Length", length.to_string());
            }
        }

        let target = self.request.uri.request_target();
        let mut head = format!("{} {} HTTP/1.1\r\n", self.request.verb, target);
        cx.log(
            MessageKind::Command,
            format!("{} {} HTTP/1.1", self.request.verb, target),
        );
        for (name, value) in &self.request.headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");
        cx.conn.send_raw(head.as_bytes())
    }

    fn parse_status_line(&mut self, line: &str) -> Result<(), ReplyCode> {
        let malformed = ReplyCode::ERROR | ReplyCode::DISCONNECTED;
        if !line.starts_with("HTTP/1.") {
            return Err(malformed);
        }
        let code_text = line.split_whitespace().nth(1).ok_or(malformed)?;
        if code_text.len() != 3 {
            return Err(malformed);
        }
        let code: u16 = code_text.parse().map_err(|_| malformed)?;
        if !(100..600).contains(&code) {
            return Err(malformed);
        }
        self.response = HttpResponse {
            code,
            headers: Vec::new(),
        };
        Ok(())
    }

    fn body_prohibited(&self) -> bool {
        let code = self.response.code;
        self.request.verb.eq_ignore_ascii_case("HEAD")
            || (100..200).contains(&code)
            || code == 204
            || code == 304
    }

    fn on_headers_complete(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        let malformed = ReplyCode::ERROR | ReplyCode::DISCONNECTED;

        if self.response.code == 100 {
            // Interim response; the real one follows.
            self.state = State::ReadStatus;
            return self.drain_buffer(cx);
        }

        if self
            .response
            .header("Connection")
            .is_some_and(|value| value.eq_ignore_ascii_case("close"))
        {
            self.close_after = true;
        }

        self.framing = match self.response.header("Transfer-Encoding") {
            Some(value) if value.eq_ignore_ascii_case("chunked") => BodyFraming::Chunked,
            Some(value) if value.eq_ignore_ascii_case("identity") => {
                BodyFraming::Identity { remaining: None }
            }
            Some(_) => return malformed,
            None => BodyFraming::Identity { remaining: None },
        };
        if let BodyFraming::Identity { remaining } = &mut self.framing {
            if let Some(value) = self.response.header("Content-Length") {
                let length: u64 = match value.trim().parse() {
                    Ok(length) => length,
                    Err(_) => return malformed,
                };
                *remaining = Some(length);
            }
        }
        if self.body_prohibited() {
            self.framing = BodyFraming::None;
        }

        let response = self.response.clone();
        let verdict = match self.consumer.as_mut() {
            Some(consumer) => consumer.on_header(cx, &response),
            None => ReplyCode::INTERNAL_ERROR,
        };
        if verdict.failed() {
            return verdict;
        }

        match &self.framing {
            BodyFraming::None => self.complete(cx),
            BodyFraming::Identity {
                remaining: Some(0),
            } => self.complete(cx),
            BodyFraming::Identity { .. } => {
                self.state = State::ReadBody;
                self.drain_buffer(cx)
            }
            BodyFraming::Chunked => {
                self.state = State::ReadChunkSize;
                self.drain_buffer(cx)
            }
        }
    }

    fn complete(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        self.state = State::Done;
        self.completed_response = Some(self.response.clone());
        if self.close_after {
            cx.conn.close();
            if let Some(http) = cx.session.protocol.http_mut() {
                http.connected_to = None;
            }
        }
        ReplyCode::OK
    }

    /// Consumes buffered bytes according to the current state. Returns
    /// `WOULDBLOCK` when more input is needed.
    fn drain_buffer(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        loop {
            match self.state {
                State::ReadStatus => {
                    let Some(line) = (match self.take_line() {
                        Ok(line) => line,
                        Err(code) => return code,
                    }) else {
                        return ReplyCode::WOULDBLOCK;
                    };
                    if line.is_empty() {
                        // Stray CRLF between responses is tolerated.
                        continue;
                    }
                    cx.log(MessageKind::Response, line.clone());
                    if let Err(code) = self.parse_status_line(&line) {
                        return code;
                    }
                    self.state = State::ReadHeaders;
                }
                State::ReadHeaders => {
                    let Some(line) = (match self.take_line() {
                        Ok(line) => line,
                        Err(code) => return code,
                    }) else {
                        return ReplyCode::WOULDBLOCK;
                    };
                    if line.is_empty() {
                        let verdict = self.on_headers_complete(cx);
                        if matches!(self.state, State::ReadStatus) && !verdict.failed() {
                            // 100 Continue was swallowed; keep parsing.
                            if verdict.would_block() {
                                return verdict;
                            }
                            continue;
                        }
                        return verdict;
                    }
                    let Some((name, value)) = line.split_once(':') else {
                        return ReplyCode::ERROR | ReplyCode::DISCONNECTED;
                    };
                    self.response
                        .headers
                        .push((name.trim().to_owned(), value.trim().to_owned()));
                }
                State::ReadBody => {
                    if self.buffer.is_empty() {
                        return ReplyCode::WOULDBLOCK;
                    }
                    let take = match &self.framing {
                        BodyFraming::Identity {
                            remaining: Some(remaining),
                        } => {
                            let take = (*remaining).min(self.buffer.len() as u64) as usize;
                            if take == 0 && !self.buffer.is_empty() {
                                // Server sent more than Content-Length.
                                return ReplyCode::ERROR | ReplyCode::DISCONNECTED;
                            }
                            take
                        }
                        _ => self.buffer.len(),
                    };
                    let data: Vec<u8> = self.buffer.drain(..take).collect();
                    let verdict = match self.consumer.as_mut() {
                        Some(consumer) => consumer.on_data(cx, &data),
                        None => ReplyCode::INTERNAL_ERROR,
                    };
                    if verdict.failed() {
                        return verdict;
                    }
                    if let BodyFraming::Identity {
                        remaining: Some(remaining),
                    } = &mut self.framing
                    {
                        *remaining -= take as u64;
                        if *remaining == 0 {
                            if !self.buffer.is_empty() {
                                return ReplyCode::ERROR | ReplyCode::DISCONNECTED;
                            }
                            return self.complete(cx);
                        }
                    }
                }
                State::ReadChunkSize => {
                    let Some(line) = (match self.take_line() {
                        Ok(line) => line,
                        Err(code) => return code,
                    }) else {
                        return ReplyCode::WOULDBLOCK;
                    };
                    if line.is_empty() {
                        // CRLF terminating the previous chunk's data.
                        continue;
                    }
                    let size_text = line.split(';').next().unwrap_or("").trim();
                    let Ok(size) = u64::from_str_radix(size_text, 16) else {
                        return ReplyCode::ERROR | ReplyCode::DISCONNECTED;
                    };
                    if size == 0 {
                        self.state = State::ReadChunkTrailer;
                        continue;
                    }
                    self.chunk_remaining = size;
                    self.state = State::ReadChunkData;
                }
                State::ReadChunkData => {
                    if self.buffer.is_empty() {
                        return ReplyCode::WOULDBLOCK;
                    }
                    let take = self.chunk_remaining.min(self.buffer.len() as u64) as usize;
                    let data: Vec<u8> = self.buffer.drain(..take).collect();
                    let verdict = match self.consumer.as_mut() {
                        Some(consumer) => consumer.on_data(cx, &data),
                        None => ReplyCode::INTERNAL_ERROR,
                    };
                    if verdict.failed() {
                        return verdict;
                    }
                    self.chunk_remaining -= take as u64;
                    if self.chunk_remaining == 0 {
                        self.state = State::ReadChunkSize;
                    }
                }
                State::ReadChunkTrailer => {
                    let Some(line) = (match self.take_line() {
                        Ok(line) => line,
                        Err(code) => return code,
                    }) else {
                        return ReplyCode::WOULDBLOCK;
                    };
                    if line.is_empty() {
                        return self.complete(cx);
                    }
                    // Trailer headers are read and dropped.
                }
                _ => return ReplyCode::WOULDBLOCK,
            }
        }
    }
}

impl Operation for HttpRequestOp {
    fn command_name(&self) -> &'static str {
        "transfer"
    }

    fn send(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        match self.state {
            State::Init => {
                let tls = self.request.uri.scheme.eq_ignore_ascii_case("https");
                let port = if self.request.uri.port == 0 {
                    if tls { 443 } else { 80 }
                } else {
                    self.request.uri.port
                };
                self.state = State::WaitConnect;
                cx.push(Box::new(InternalConnectOp::new(
                    self.request.uri.host.clone(),
                    port,
                    tls,
                )));
                ReplyCode::WOULDBLOCK
            }
            State::SendHeader => {
                if let Err(code) = self.emit_request(cx) {
                    return code;
                }
                if self.request.body.is_some() {
                    self.state = State::SendBody;
                    return ReplyCode::CONTINUE;
                }
                self.state = State::ReadStatus;
                ReplyCode::WOULDBLOCK
            }
            State::SendBody => {
                let Some(body) = self.request.body.take() else {
                    return ReplyCode::INTERNAL_ERROR;
                };
                if let Err(code) = cx.conn.send_raw(&body) {
                    return code;
                }
                self.state = State::ReadStatus;
                ReplyCode::WOULDBLOCK
            }
            _ => ReplyCode::WOULDBLOCK,
        }
    }

    fn on_event(&mut self, cx: &mut OpCtx<'_>, event: WireEvent<'_>) -> ReplyCode {
        match event {
            WireEvent::Bytes(bytes) => {
                self.buffer.extend_from_slice(bytes);
                self.drain_buffer(cx)
            }
            WireEvent::Closed { error } => {
                // EOF terminates an identity body of unknown length.
                if self.state == State::ReadBody && error.is_none() {
                    if let BodyFraming::Identity { remaining: None } = self.framing {
                        if let Some(http) = cx.session.protocol.http_mut() {
                            http.connected_to = None;
                        }
                        return self.complete(cx);
                    }
                }
                ReplyCode::ERROR | ReplyCode::DISCONNECTED
            }
            _ => ReplyCode::INTERNAL_ERROR,
        }
    }

    fn subcommand_result(
        &mut self,
        _cx: &mut OpCtx<'_>,
        code: ReplyCode,
        _child: Box<dyn Operation>,
    ) -> ReplyCode {
        if self.state != State::WaitConnect {
            return ReplyCode::INTERNAL_ERROR;
        }
        if !code.is_ok() {
            return code;
        }
        self.state = State::SendHeader;
        ReplyCode::CONTINUE
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}
