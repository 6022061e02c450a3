//! Sans-IO TLS layer over rustls.
//!
//! The session never owns a socket: the engine feeds received wire bytes
//! into [`TlsSession::read_wire`] and sends whatever
//! [`TlsSession::take_wire`] and [`TlsSession::write_plain`] produce.
//! Certificate verification is trust-on-first-use: the rustls verifier
//! accepts any chain, the engine extracts it after the handshake and
//! asks the user (or the pinned-certificate store) before any
//! application data is sent.

use bitflags::bitflags;
use rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use rustls::{ClientConfig, ClientConnection, DigitallySignedStruct, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use std::io::{Read, Write};
use std::sync::Arc;
use thiserror::Error;

bitflags! {
    /// Deprecated-algorithm indicators surfaced with the certificate
    /// prompt.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct AlgorithmWarnings: u8 {
        /// Negotiated protocol below TLS 1.2.
        const OLD_PROTOCOL = 1 << 0;
        /// Key exchange without forward secrecy.
        const NO_FORWARD_SECRECY = 1 << 1;
        /// SHA-1 based integrity protection.
        const WEAK_MAC = 1 << 2;
    }
}

/// TLS-level failures.
#[derive(Debug, Error)]
pub enum TlsError {
    /// The host name is not a valid SNI name.
    #[error("invalid server name for TLS: {0}")]
    InvalidServerName(String),
    /// Handshake or record-layer failure from rustls.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),
    /// Record plumbing failed; carries the underlying I/O error.
    #[error("TLS I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of feeding wire bytes into the session.
#[derive(Debug, Default)]
pub struct TlsStatus {
    /// Decrypted application bytes, possibly empty.
    pub plaintext: Vec<u8>,
    /// The handshake finished during this call.
    pub handshake_complete: bool,
    /// The peer sent close_notify.
    pub closed: bool,
}

/// One TLS client session layered over a byte stream.
pub struct TlsSession {
    connection: ClientConnection,
    handshake_seen: bool,
}

impl TlsSession {
    /// Starts a handshake for `server_name` (used for SNI only; chain
    /// validation is the TOFU prompt's job).
    pub fn new(server_name: &str) -> Result<Self, TlsError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(rustls::Error::from)?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(TofuVerifier))
            .with_no_client_auth();

        let name = ServerName::try_from(server_name.to_owned())
            .map_err(|_| TlsError::InvalidServerName(server_name.to_owned()))?;
        let connection = ClientConnection::new(Arc::new(config), name)?;
        Ok(Self {
            connection,
            handshake_seen: false,
        })
    }

    /// Returns `true` until the handshake has completed.
    #[must_use]
    pub fn is_handshaking(&self) -> bool {
        self.connection.is_handshaking()
    }

    /// Feeds received wire bytes; returns decrypted plaintext and state
    /// transitions.
    pub fn read_wire(&mut self, mut wire: &[u8]) -> Result<TlsStatus, TlsError> {
        let mut status = TlsStatus::default();
        loop {
            if !wire.is_empty() {
                self.connection.read_tls(&mut wire)?;
            }
            let state = self.connection.process_new_packets()?;

            let available = state.plaintext_bytes_to_read();
            if available > 0 {
                let start = status.plaintext.len();
                status.plaintext.resize(start + available, 0);
                self.connection
                    .reader()
                    .read_exact(&mut status.plaintext[start..])?;
            }
            if state.peer_has_closed() {
                status.closed = true;
            }
            if wire.is_empty() {
                break;
            }
        }
        if !self.handshake_seen && !self.connection.is_handshaking() {
            self.handshake_seen = true;
            status.handshake_complete = true;
        }
        Ok(status)
    }

    /// Encrypts application data; the returned bytes go on the wire.
    pub fn write_plain(&mut self, data: &[u8]) -> Result<Vec<u8>, TlsError> {
        self.connection.writer().write_all(data)?;
        self.take_wire()
    }

    /// Drains pending wire output (handshake records, alerts, encrypted
    /// application data).
    pub fn take_wire(&mut self) -> Result<Vec<u8>, TlsError> {
        let mut wire = Vec::new();
        while self.connection.wants_write() {
            self.connection.write_tls(&mut wire)?;
        }
        Ok(wire)
    }

    /// Queues a close_notify; send the returned bytes before closing.
    pub fn close(&mut self) -> Result<Vec<u8>, TlsError> {
        self.connection.send_close_notify();
        self.take_wire()
    }

    /// DER certificate chain the server presented, leaf first. Empty
    /// before the handshake has progressed far enough.
    #[must_use]
    pub fn peer_chain(&self) -> Vec<Vec<u8>> {
        self.connection
            .peer_certificates()
            .map(|certs| certs.iter().map(|c| c.as_ref().to_vec()).collect())
            .unwrap_or_default()
    }

    /// Deprecated-algorithm flags of the negotiated session.
    #[must_use]
    pub fn warnings(&self) -> AlgorithmWarnings {
        let mut warnings = AlgorithmWarnings::empty();
        if let Some(version) = self.connection.protocol_version() {
            if !matches!(
                version,
                rustls::ProtocolVersion::TLSv1_2 | rustls::ProtocolVersion::TLSv1_3
            ) {
                warnings |= AlgorithmWarnings::OLD_PROTOCOL;
            }
        }
        if let Some(suite) = self.connection.negotiated_cipher_suite() {
            let name = format!("{:?}", suite.suite());
            if name.contains("RSA_WITH") {
                warnings |= AlgorithmWarnings::NO_FORWARD_SECRECY;
            }
            if name.ends_with("SHA") {
                warnings |= AlgorithmWarnings::WEAK_MAC;
            }
        }
        warnings
    }

    /// Version and cipher of the established session, for logging.
    #[must_use]
    pub fn describe(&self) -> String {
        let version = self
            .connection
            .protocol_version()
            .map_or_else(|| "unknown".to_owned(), |v| format!("{v:?}"));
        let suite = self
            .connection
            .negotiated_cipher_suite()
            .map_or_else(|| "unknown".to_owned(), |s| format!("{:?}", s.suite()));
        format!("{version}, {suite}")
    }
}

/// Accepts every chain; trust is decided by the engine's TOFU prompt.
#[derive(Debug)]
struct TofuVerifier;

impl ServerCertVerifier for TofuVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ED25519,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_hello_is_produced_immediately() {
        let mut session = TlsSession::new("example.com").expect("session starts");
        assert!(session.is_handshaking());
        let hello = session.take_wire().expect("hello bytes");
        // TLS handshake record: content type 22, version 3.x.
        assert!(hello.len() > 5);
        assert_eq!(hello[0], 22);
        assert_eq!(hello[1], 3);
    }

    #[test]
    fn ip_literals_are_valid_server_names() {
        assert!(TlsSession::new("192.0.2.1").is_ok());
        assert!(TlsSession::new("not a hostname").is_err());
    }

    #[test]
    fn garbage_wire_data_is_a_tls_error() {
        let mut session = TlsSession::new("example.com").expect("session starts");
        let _ = session.take_wire().expect("hello bytes");
        assert!(session.read_wire(&[0xff; 64]).is_err());
    }
}
