use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Composable outcome of a command or operation step.
    ///
    /// The empty set is `OK`. Primary failure values each carry the
    /// [`ReplyCode::ERROR`] bit so `failed()` needs a single test;
    /// modifiers ([`ReplyCode::CRITICAL_ERROR`], [`ReplyCode::CANCELED`],
    /// [`ReplyCode::PASSWORD_FAILED`], [`ReplyCode::DISCONNECTED`]) are
    /// OR-ed on top and survive stack unwinding.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ReplyCode: u32 {
        /// Operation is parked on a suspension point; a terminal
        /// notification follows later.
        const WOULDBLOCK = 1 << 0;
        /// Generic failure.
        const ERROR = 1 << 1;
        /// Failure that prohibits automatic retry.
        const CRITICAL_ERROR = (1 << 2) | Self::ERROR.bits();
        /// The user cancelled; sticky, short-circuits reconnect logic.
        const CANCELED = (1 << 3) | Self::ERROR.bits();
        /// Command parameters were rejected before any wire activity.
        const SYNTAX_ERROR = (1 << 4) | Self::ERROR.bits();
        /// The command requires an established connection.
        const NOT_CONNECTED = (1 << 5) | Self::ERROR.bits();
        /// The transport went away, either as the failure itself or as a
        /// side effect of one.
        const DISCONNECTED = 1 << 6;
        /// A state that should be unreachable was reached.
        const INTERNAL_ERROR = (1 << 7) | Self::ERROR.bits();
        /// Another command is already in flight on this engine.
        const BUSY = (1 << 8) | Self::ERROR.bits();
        /// Connect was issued while already connected.
        const ALREADY_CONNECTED = (1 << 9) | Self::ERROR.bits();
        /// Authentication failed; prohibits silent password reuse.
        const PASSWORD_FAILED = 1 << 10;
        /// The no-I/O watchdog expired.
        const TIMEOUT = (1 << 11) | Self::ERROR.bits();
        /// The server or the protocol driver cannot perform the request.
        const NOT_SUPPORTED = (1 << 12) | Self::ERROR.bits();
        /// A listing was requested through a link whose target is a file.
        const LINK_NOT_DIR = (1 << 13) | Self::ERROR.bits();
        /// Internal signal: the current operation wants its `send` called
        /// again. Never surfaced to the embedding application.
        const CONTINUE = 1 << 14;
    }
}

impl ReplyCode {
    /// Terminal success.
    pub const OK: Self = Self::empty();

    /// Returns `true` for plain success without modifiers.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        self.is_empty()
    }

    /// Returns `true` when any error bit is set.
    #[must_use]
    pub const fn failed(self) -> bool {
        self.intersects(Self::ERROR)
    }

    /// Returns `true` when automatic retry is prohibited.
    #[must_use]
    pub const fn is_critical(self) -> bool {
        self.contains(Self::CRITICAL_ERROR)
            || self.contains(Self::CANCELED)
            || self.intersects(Self::PASSWORD_FAILED)
    }

    /// Returns `true` when the user cancelled somewhere along the way.
    #[must_use]
    pub const fn was_canceled(self) -> bool {
        self.contains(Self::CANCELED)
    }

    /// Returns `true` for the internal continue signal.
    #[must_use]
    pub const fn is_continue(self) -> bool {
        self.intersects(Self::CONTINUE)
    }

    /// Returns `true` while the operation is parked.
    #[must_use]
    pub const fn would_block(self) -> bool {
        self.intersects(Self::WOULDBLOCK)
    }

    /// Human-readable name of the most significant primary value.
    #[must_use]
    pub fn describe(self) -> &'static str {
        if self.contains(Self::CANCELED) {
            "interrupted by user"
        } else if self.contains(Self::TIMEOUT) {
            "connection timed out"
        } else if self.contains(Self::PASSWORD_FAILED) {
            "authentication failed"
        } else if self.contains(Self::NOT_SUPPORTED) {
            "operation not supported"
        } else if self.contains(Self::SYNTAX_ERROR) {
            "invalid command parameters"
        } else if self.contains(Self::NOT_CONNECTED) {
            "not connected to any server"
        } else if self.contains(Self::ALREADY_CONNECTED) {
            "already connected"
        } else if self.contains(Self::BUSY) {
            "another command is in progress"
        } else if self.contains(Self::LINK_NOT_DIR) {
            "link target is not a directory"
        } else if self.contains(Self::INTERNAL_ERROR) {
            "internal error"
        } else if self.intersects(Self::DISCONNECTED) && self.failed() {
            "disconnected from server"
        } else if self.failed() {
            "failed"
        } else if self.would_block() {
            "pending"
        } else {
            "successful"
        }
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_code_is_ok() {
        assert!(ReplyCode::OK.is_ok());
        assert!(ReplyCode::default().is_ok());
        assert!(!ReplyCode::OK.failed());
    }

    #[test]
    fn primary_failures_carry_the_error_bit() {
        for code in [
            ReplyCode::CRITICAL_ERROR,
            ReplyCode::CANCELED,
            ReplyCode::SYNTAX_ERROR,
            ReplyCode::NOT_CONNECTED,
            ReplyCode::INTERNAL_ERROR,
            ReplyCode::BUSY,
            ReplyCode::ALREADY_CONNECTED,
            ReplyCode::TIMEOUT,
            ReplyCode::NOT_SUPPORTED,
            ReplyCode::LINK_NOT_DIR,
        ] {
            assert!(code.failed(), "{code:?} must count as a failure");
        }
    }

    #[test]
    fn modifiers_stay_sticky_through_accumulation() {
        let mut accumulated = ReplyCode::ERROR;
        accumulated |= ReplyCode::CANCELED;
        accumulated |= ReplyCode::DISCONNECTED;
        assert!(accumulated.was_canceled());
        assert!(accumulated.is_critical());
        assert!(accumulated.intersects(ReplyCode::DISCONNECTED));
    }

    #[test]
    fn password_failure_is_critical_even_without_the_critical_bit() {
        let code = ReplyCode::ERROR | ReplyCode::PASSWORD_FAILED;
        assert!(code.is_critical());
        assert!(!code.contains(ReplyCode::CRITICAL_ERROR));
    }

    #[test]
    fn wouldblock_is_neither_success_nor_failure() {
        let code = ReplyCode::WOULDBLOCK;
        assert!(!code.is_ok());
        assert!(!code.failed());
        assert!(code.would_block());
    }
}
