//! The set of routable process signals.

use std::fmt;
use std::str::FromStr;

use signal_hook::consts;

use super::SignalError;

/// A catchable process signal.
///
/// Signals that cannot be caught (`SIGKILL`, `SIGSTOP`) or that indicate a
/// fault in the process itself (`SIGSEGV`, `SIGILL`, `SIGFPE`) are not
/// representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Signal {
    Hangup,
    Interrupt,
    Quit,
    Terminate,
    User1,
    User2,
    Child,
    Pipe,
    Alarm,
    WindowChange,
}

impl Signal {
    /// Every routable signal, in raw-number order on Linux.
    pub const ALL: [Signal; 10] = [
        Signal::Hangup,
        Signal::Interrupt,
        Signal::Quit,
        Signal::User1,
        Signal::User2,
        Signal::Pipe,
        Signal::Alarm,
        Signal::Terminate,
        Signal::Child,
        Signal::WindowChange,
    ];

    /// Returns the platform signal number.
    #[must_use]
    pub fn as_raw(self) -> i32 {
        match self {
            Self::Hangup => consts::SIGHUP,
            Self::Interrupt => consts::SIGINT,
            Self::Quit => consts::SIGQUIT,
            Self::Terminate => consts::SIGTERM,
            Self::User1 => consts::SIGUSR1,
            Self::User2 => consts::SIGUSR2,
            Self::Child => consts::SIGCHLD,
            Self::Pipe => consts::SIGPIPE,
            Self::Alarm => consts::SIGALRM,
            Self::WindowChange => consts::SIGWINCH,
        }
    }

    /// Returns the conventional upper-case name, e.g. `"SIGINT"`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hangup => "SIGHUP",
            Self::Interrupt => "SIGINT",
            Self::Quit => "SIGQUIT",
            Self::Terminate => "SIGTERM",
            Self::User1 => "SIGUSR1",
            Self::User2 => "SIGUSR2",
            Self::Child => "SIGCHLD",
            Self::Pipe => "SIGPIPE",
            Self::Alarm => "SIGALRM",
            Self::WindowChange => "SIGWINCH",
        }
    }
}

impl TryFrom<i32> for Signal {
    type Error = SignalError;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|signal| signal.as_raw() == raw)
            .ok_or(SignalError::Unsupported { raw })
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Signal {
    type Err = SignalError;

    /// Parses `"SIGINT"`, `"INT"`, or either in lower case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let short = upper.strip_prefix("SIG").unwrap_or(&upper);
        Self::ALL
            .into_iter()
            .find(|signal| &signal.as_str()[3..] == short)
            .ok_or_else(|| SignalError::Unknown {
                name: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_numbers_round_trip() {
        for signal in Signal::ALL {
            assert_eq!(Signal::try_from(signal.as_raw()).unwrap(), signal);
        }
    }

    #[test]
    fn uncatchable_number_is_unsupported() {
        let err = Signal::try_from(consts::SIGKILL).unwrap_err();
        assert!(matches!(err, SignalError::Unsupported { raw } if raw == consts::SIGKILL));
    }

    #[test]
    fn parses_long_short_and_lower_case_names() {
        assert_eq!("SIGINT".parse::<Signal>().unwrap(), Signal::Interrupt);
        assert_eq!("term".parse::<Signal>().unwrap(), Signal::Terminate);
        assert_eq!("sigusr1".parse::<Signal>().unwrap(), Signal::User1);
        assert_eq!(" HUP ".parse::<Signal>().unwrap(), Signal::Hangup);
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = "SIGFOO".parse::<Signal>().unwrap_err();
        assert_eq!(err.to_string(), "unknown signal name: SIGFOO");
    }

    #[test]
    fn displays_conventional_name() {
        assert_eq!(Signal::WindowChange.to_string(), "SIGWINCH");
        assert_eq!(Signal::Pipe.to_string(), "SIGPIPE");
    }
}
