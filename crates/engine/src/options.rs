//! Read-only engine configuration, populated by the embedding
//! application before the context is created.

use std::path::PathBuf;
use std::time::Duration;
use transport::ProxySettings;

/// FTP-specific proxy flavours; these rewrite the login sequence rather
/// than wrapping the socket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FtpProxyType {
    /// No FTP proxy.
    #[default]
    None,
    /// `USER user@host:port` after optional proxy login.
    UserAtHost,
    /// `SITE host:port` after optional proxy login.
    Site,
    /// `OPEN host:port` after optional proxy login.
    Open,
    /// Fully templated custom sequence with `%h %u %p %a %s %w`
    /// placeholders.
    Custom,
}

/// FTP proxy endpoint, credentials and custom sequence.
#[derive(Clone, Debug, Default)]
pub struct FtpProxySettings {
    /// Which login-sequence rewrite to apply.
    pub proxy_type: FtpProxyType,
    /// Proxy `host:port`.
    pub host: String,
    /// Proxy user, empty for none.
    pub user: String,
    /// Proxy password.
    pub pass: String,
    /// Custom login sequence, one command per line, used with
    /// [`FtpProxyType::Custom`].
    pub login_sequence: Vec<String>,
}

/// Everything the engine consumes read-only from the application's
/// settings store.
#[derive(Clone, Debug)]
pub struct EngineOptions {
    /// No-I/O watchdog; zero disables.
    pub timeout: Duration,
    /// Automatic reconnect attempts after a failed connect.
    pub reconnect_count: u32,
    /// Delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Burst tolerance 0, 1 or 2 (bucket of 1, 2 or 5 ticks).
    pub burst_tolerance: u8,
    /// Download limit in KiB/s; active only with `speed_limits_enabled`.
    pub speed_limit_inbound: u64,
    /// Upload limit in KiB/s; active only with `speed_limits_enabled`.
    pub speed_limit_outbound: u64,
    /// Master switch for the two speed limits.
    pub speed_limits_enabled: bool,
    /// Socket-level proxy for all protocols; `None` for direct
    /// connections.
    pub proxy: Option<ProxySettings>,
    /// FTP login-sequence proxy.
    pub ftp_proxy: FtpProxySettings,
    /// Engine log file; `None` disables file logging.
    pub log_file: Option<PathBuf>,
    /// Log rotation cap in bytes; zero disables rotation.
    pub log_file_size_cap: u64,
    /// Debug verbosity 0-4.
    pub debug_level: u8,
    /// Mirror raw listing lines into the log.
    pub raw_listing_log: bool,
    /// Strip `;N` revisions from VMS file names.
    pub strip_vms_revisions: bool,
    /// Path to the SFTP helper binary.
    pub sftp_helper: PathBuf,
    /// Idle keep-alive interval for FTP; zero disables.
    pub keepalive_interval: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            reconnect_count: 2,
            reconnect_delay: Duration::from_secs(5),
            burst_tolerance: 0,
            speed_limit_inbound: 0,
            speed_limit_outbound: 0,
            speed_limits_enabled: false,
            proxy: None,
            ftp_proxy: FtpProxySettings::default(),
            log_file: None,
            log_file_size_cap: 0,
            debug_level: 0,
            raw_listing_log: false,
            strip_vms_revisions: false,
            sftp_helper: PathBuf::from("oc-sftp-helper"),
            keepalive_interval: Duration::from_secs(30),
        }
    }
}

impl EngineOptions {
    /// Effective inbound byte budget per second, zero when unlimited.
    #[must_use]
    pub const fn inbound_limit_bytes(&self) -> u64 {
        if self.speed_limits_enabled {
            self.speed_limit_inbound * 1024
        } else {
            0
        }
    }

    /// Effective outbound byte budget per second, zero when unlimited.
    #[must_use]
    pub const fn outbound_limit_bytes(&self) -> u64 {
        if self.speed_limits_enabled {
            self.speed_limit_outbound * 1024
        } else {
            0
        }
    }
}
