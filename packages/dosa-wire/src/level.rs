use std::fmt;

/// Log levels carried in `log` payloads, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Status,
    Warning,
    Error,
    Critical,
    Security,
}

impl LogLevel {
    pub fn as_wire(self) -> u8 {
        match self {
            LogLevel::Debug => 10,
            LogLevel::Info => 20,
            LogLevel::Status => 30,
            LogLevel::Warning => 40,
            LogLevel::Error => 50,
            LogLevel::Critical => 60,
            LogLevel::Security => 100,
        }
    }

    pub fn from_wire(v: u8) -> Option<Self> {
        match v {
            10 => Some(LogLevel::Debug),
            20 => Some(LogLevel::Info),
            30 => Some(LogLevel::Status),
            40 => Some(LogLevel::Warning),
            50 => Some(LogLevel::Error),
            60 => Some(LogLevel::Critical),
            100 => Some(LogLevel::Security),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Status => "STATUS",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
            LogLevel::Security => "SECURITY",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity carried in `sec` payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityLevel {
    Alert,
    Breach,
    Tamper,
    Panic,
}

impl SecurityLevel {
    pub fn as_wire(self) -> u8 {
        match self {
            SecurityLevel::Alert => 1,
            SecurityLevel::Breach => 2,
            SecurityLevel::Tamper => 3,
            SecurityLevel::Panic => 4,
        }
    }

    pub fn from_wire(v: u8) -> Option<Self> {
        match v {
            1 => Some(SecurityLevel::Alert),
            2 => Some(SecurityLevel::Breach),
            3 => Some(SecurityLevel::Tamper),
            4 => Some(SecurityLevel::Panic),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SecurityLevel::Alert => "ALERT",
            SecurityLevel::Breach => "BREACH",
            SecurityLevel::Tamper => "TAMPER",
            SecurityLevel::Panic => "PANIC",
        }
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incident categories used when paging alert endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertCategory {
    Network,
    Security,
}

impl AlertCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertCategory::Network => "network",
            AlertCategory::Security => "security",
        }
    }
}

impl fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock states settable on door-style devices via the config protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Locked,
    Alarm,
    Breach,
}

impl LockState {
    pub fn as_wire(self) -> u8 {
        match self {
            LockState::Unlocked => 0,
            LockState::Locked => 1,
            LockState::Alarm => 2,
            LockState::Breach => 3,
        }
    }

    pub fn from_wire(v: u8) -> Option<Self> {
        match v {
            0 => Some(LockState::Unlocked),
            1 => Some(LockState::Locked),
            2 => Some(LockState::Alarm),
            3 => Some(LockState::Breach),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LockState::Unlocked => "UNLOCKED",
            LockState::Locked => "LOCKED",
            LockState::Alarm => "ALARM",
            LockState::Breach => "BREACH",
        }
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_levels_order_by_severity() {
        assert!(LogLevel::Critical > LogLevel::Error);
        assert!(LogLevel::Error > LogLevel::Warning);
        assert!(LogLevel::Security > LogLevel::Critical);
    }

    #[test]
    fn wire_values_round_trip() {
        for v in [10u8, 20, 30, 40, 50, 60, 100] {
            assert_eq!(LogLevel::from_wire(v).unwrap().as_wire(), v);
        }
        assert!(LogLevel::from_wire(42).is_none());
        for v in 1u8..=4 {
            assert_eq!(SecurityLevel::from_wire(v).unwrap().as_wire(), v);
        }
        for v in 0u8..=3 {
            assert_eq!(LockState::from_wire(v).unwrap().as_wire(), v);
        }
        assert!(LockState::from_wire(4).is_none());
    }
}
