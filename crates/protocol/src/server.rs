use crate::uri::Uri;
use std::fmt;

/// Wire protocol a [`Server`] is reached over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Protocol {
    /// Plain FTP, opportunistically upgraded with `AUTH TLS` when the
    /// server offers it.
    #[default]
    Ftp,
    /// FTP over implicit TLS; the handshake precedes the banner.
    Ftps,
    /// FTP with mandatory explicit TLS (`AUTH TLS` must succeed).
    Ftpes,
    /// FTP with TLS negotiation disabled entirely.
    InsecureFtp,
    /// SSH file transfer protocol via the helper child process.
    Sftp,
    /// Plain HTTP.
    Http,
    /// HTTP over TLS.
    Https,
}

impl Protocol {
    /// Default control-connection port.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Ftp | Self::Ftpes | Self::InsecureFtp => 21,
            Self::Ftps => 990,
            Self::Sftp => 22,
            Self::Http => 80,
            Self::Https => 443,
        }
    }

    /// URL scheme prefix; `fz_`-prefixed spellings are accepted by
    /// [`Protocol::from_prefix`] as equivalents.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Ftp => "ftp",
            Self::Ftps => "ftps",
            Self::Ftpes => "ftpes",
            Self::InsecureFtp => "insecure_ftp",
            Self::Sftp => "sftp",
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    /// Resolves a URL scheme to a protocol.
    #[must_use]
    pub fn from_prefix(scheme: &str) -> Option<Self> {
        let scheme = scheme.to_ascii_lowercase();
        let scheme = scheme.strip_prefix("fz_").unwrap_or(&scheme);
        [
            Self::Ftp,
            Self::Ftps,
            Self::Ftpes,
            Self::InsecureFtp,
            Self::Sftp,
            Self::Http,
            Self::Https,
        ]
        .into_iter()
        .find(|p| p.prefix() == scheme)
    }

    /// Guesses the protocol from a well-known port, for URLs that carry a
    /// port but no scheme.
    #[must_use]
    pub const fn from_port(port: u16) -> Self {
        match port {
            990 => Self::Ftps,
            22 => Self::Sftp,
            80 => Self::Http,
            443 => Self::Https,
            _ => Self::Ftp,
        }
    }

    /// Returns `true` for the FTP family.
    #[must_use]
    pub const fn is_ftp(self) -> bool {
        matches!(self, Self::Ftp | Self::Ftps | Self::Ftpes | Self::InsecureFtp)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ftp => "FTP",
            Self::Ftps => "FTPS",
            Self::Ftpes => "FTPES",
            Self::InsecureFtp => "FTP (insecure)",
            Self::Sftp => "SFTP",
            Self::Http => "HTTP",
            Self::Https => "HTTPS",
        })
    }
}

/// How credentials are obtained at logon time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum LogonType {
    /// `anonymous` with a fixed token as the password.
    #[default]
    Anonymous,
    /// Stored user and password.
    Normal,
    /// Stored user, password prompted per session.
    Ask,
    /// Every challenge is forwarded to the user (SFTP
    /// keyboard-interactive, multi-step FTP logins).
    Interactive,
    /// Stored user, password and account (FTP `ACCT`).
    Account,
    /// SFTP public-key authentication with a key file on disk.
    KeyFile,
}

/// Server OS hint steering path syntax and listing-dialect preference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ServerType {
    /// Autodetect from `SYST` and the listing itself.
    #[default]
    Default,
    /// Unix and unix-alikes; `/`-separated absolute paths.
    Unix,
    /// OpenVMS; `DEVICE:[DIR.SUB]NAME` syntax, `;N` file versions.
    Vms,
    /// DOS/Windows with backslashes and drive letters.
    Dos,
    /// DOS/Windows servers that present forward slashes.
    DosFwdSlashes,
    /// IBM MVS data sets, quoted and dot-separated.
    Mvs,
    /// VxWorks devices, `device:/path`.
    VxWorks,
    /// z/VM minidisks.
    Zvm,
    /// HP NonStop (Tandem), `\node.$volume.subvol`.
    HpNonStop,
    /// Cygwin: Unix syntax over a Windows host.
    Cygwin,
}

/// Character-encoding policy for file names on the control connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum CharsetEncoding {
    /// UTF-8 when the server advertises it, ISO-8859-1 fallback on
    /// non-ASCII logon failure.
    #[default]
    Auto,
    /// Force UTF-8 regardless of FEAT.
    Utf8,
    /// A named single-byte encoding configured by the user.
    Custom(String),
}

/// Identity and session policy of one remote server.
///
/// Equality is structural over every identifying field; `name` is a
/// display label and intentionally not identifying.
#[derive(Clone, Debug, Default)]
pub struct Server {
    /// Display label, not part of the identity.
    pub name: String,
    /// Wire protocol.
    pub protocol: Protocol,
    /// Host name or address literal.
    pub host: String,
    /// Control-connection port.
    pub port: u16,
    /// Credential policy.
    pub logon_type: LogonType,
    /// User name; empty for [`LogonType::Anonymous`].
    pub user: String,
    /// Password, where the logon type stores one.
    pub pass: String,
    /// FTP `ACCT` value.
    pub account: String,
    /// Key file path for [`LogonType::KeyFile`].
    pub key_file: Option<String>,
    /// Control-connection encoding policy.
    pub encoding: CharsetEncoding,
    /// Minutes added to listing timestamps to compensate a server whose
    /// clock is not UTC.
    pub timezone_offset: i32,
    /// Raw commands issued after a successful logon.
    pub post_login_commands: Vec<String>,
    /// Connect directly even when a proxy is configured.
    pub bypass_proxy: bool,
    /// Path-syntax and listing hint.
    pub server_type: ServerType,
}

impl Server {
    /// Builds a server from a parsed URI, filling scheme/port defaults the
    /// way the original command-line parser does: a missing scheme is
    /// guessed from the port, a missing port comes from the scheme.
    #[must_use]
    pub fn from_uri(uri: &Uri) -> Option<Self> {
        if uri.host.is_empty() {
            return None;
        }
        let protocol = if uri.scheme.is_empty() {
            Protocol::from_port(uri.port)
        } else {
            Protocol::from_prefix(&uri.scheme)?
        };
        let port = if uri.port == 0 {
            protocol.default_port()
        } else {
            uri.port
        };
        let logon_type = if uri.user.is_empty() || uri.user == "anonymous" {
            LogonType::Anonymous
        } else if uri.pass.is_empty() {
            LogonType::Ask
        } else {
            LogonType::Normal
        };
        Some(Self {
            protocol,
            host: uri.host.clone(),
            port,
            logon_type,
            user: uri.user.clone(),
            pass: uri.pass.clone(),
            ..Self::default()
        })
    }

    /// The user name presented on the wire.
    #[must_use]
    pub fn logon_user(&self) -> &str {
        match self.logon_type {
            LogonType::Anonymous => "anonymous",
            _ => &self.user,
        }
    }

    /// The password presented on the wire, if the logon type carries one.
    #[must_use]
    pub fn logon_pass(&self) -> &str {
        match self.logon_type {
            LogonType::Anonymous => "anonymous@example.com",
            _ => &self.pass,
        }
    }

    /// Returns `true` when both servers name the same endpoint, ignoring
    /// credentials. Used by the failed-login list to match non-critical
    /// failures across credential changes.
    #[must_use]
    pub fn same_endpoint(&self, other: &Self) -> bool {
        self.host == other.host && self.port == other.port
    }

    /// `host:port` for log output.
    #[must_use]
    pub fn display_endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl PartialEq for Server {
    fn eq(&self, other: &Self) -> bool {
        self.protocol == other.protocol
            && self.host == other.host
            && self.port == other.port
            && self.logon_type == other.logon_type
            && self.user == other.user
            && self.pass == other.pass
            && self.account == other.account
            && self.key_file == other.key_file
            && self.encoding == other.encoding
            && self.timezone_offset == other.timezone_offset
            && self.post_login_commands == other.post_login_commands
            && self.bypass_proxy == other.bypass_proxy
            && self.server_type == other.server_type
    }
}

impl Eq for Server {}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.port == self.protocol.default_port() {
            write!(f, "{}://{}", self.protocol.prefix(), self.host)
        } else {
            write!(f, "{}://{}:{}", self.protocol.prefix(), self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(host: &str) -> Server {
        Server {
            name: "bookmark".into(),
            host: host.into(),
            port: 21,
            ..Server::default()
        }
    }

    #[test]
    fn name_is_not_identifying() {
        let mut a = server("example.com");
        let b = server("example.com");
        a.name = "renamed".into();
        assert_eq!(a, b);
    }

    #[test]
    fn every_identifying_field_participates_in_equality() {
        let base = server("example.com");

        let mut changed = base.clone();
        changed.timezone_offset = 60;
        assert_ne!(base, changed);

        let mut changed = base.clone();
        changed.encoding = CharsetEncoding::Utf8;
        assert_ne!(base, changed);

        let mut changed = base.clone();
        changed.user = "someone".into();
        assert_ne!(base, changed);
    }

    #[test]
    fn fz_prefixed_schemes_are_equivalent() {
        assert_eq!(Protocol::from_prefix("fz_ftpes"), Some(Protocol::Ftpes));
        assert_eq!(Protocol::from_prefix("FTPS"), Some(Protocol::Ftps));
        assert_eq!(Protocol::from_prefix("gopher"), None);
    }

    #[test]
    fn from_uri_fills_defaults() {
        let uri = Uri::parse("ftp://user@example.com/pub").expect("valid url");
        let server = Server::from_uri(&uri).expect("maps to a server");
        assert_eq!(server.port, 21);
        assert_eq!(server.logon_type, LogonType::Ask);

        let uri = Uri::parse("https://example.com").expect("valid url");
        let server = Server::from_uri(&uri).expect("maps to a server");
        assert_eq!(server.port, 443);
        assert_eq!(server.logon_type, LogonType::Anonymous);
    }

    #[test]
    fn anonymous_credentials_are_synthesised() {
        let server = server("example.com");
        assert_eq!(server.logon_user(), "anonymous");
        assert!(!server.logon_pass().is_empty());
    }
}
