use std::fmt;

/// 3-byte message codes used by UDP comms.
///
/// Unrecognised codes are carried verbatim in `Other` so sniffing tools can
/// still display them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Ack,
    Log,
    Online,
    Trigger,
    Ota,
    Debug,
    Flush,
    Begin,
    End,
    BtConfig,
    Ping,
    Pong,
    ConfigSetting,
    Security,
    Play,
    Status,
    ReqStat,
    Alt,
    Other([u8; 3]),
}

impl Opcode {
    pub const fn bytes(self) -> [u8; 3] {
        match self {
            Opcode::Ack => *b"ack",
            Opcode::Log => *b"log",
            Opcode::Online => *b"onl",
            Opcode::Trigger => *b"trg",
            Opcode::Ota => *b"ota",
            Opcode::Debug => *b"dbg",
            Opcode::Flush => *b"fls",
            Opcode::Begin => *b"bgn",
            Opcode::End => *b"end",
            Opcode::BtConfig => *b"btc",
            Opcode::Ping => *b"pin",
            Opcode::Pong => *b"pon",
            Opcode::ConfigSetting => *b"cfg",
            Opcode::Security => *b"sec",
            Opcode::Play => *b"ply",
            Opcode::Status => *b"sta",
            Opcode::ReqStat => *b"rqs",
            Opcode::Alt => *b"alt",
            Opcode::Other(b) => b,
        }
    }

    pub fn from_bytes(b: [u8; 3]) -> Self {
        match &b {
            b"ack" => Opcode::Ack,
            b"log" => Opcode::Log,
            b"onl" => Opcode::Online,
            b"trg" => Opcode::Trigger,
            b"ota" => Opcode::Ota,
            b"dbg" => Opcode::Debug,
            b"fls" => Opcode::Flush,
            b"bgn" => Opcode::Begin,
            b"end" => Opcode::End,
            b"btc" => Opcode::BtConfig,
            b"pin" => Opcode::Ping,
            b"pon" => Opcode::Pong,
            b"cfg" => Opcode::ConfigSetting,
            b"sec" => Opcode::Security,
            b"ply" => Opcode::Play,
            b"sta" => Opcode::Status,
            b"rqs" => Opcode::ReqStat,
            b"alt" => Opcode::Alt,
            _ => Opcode::Other(b),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.bytes();
        write!(f, "{}", String::from_utf8_lossy(&b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_round_trip() {
        for op in [
            Opcode::Ack,
            Opcode::Log,
            Opcode::Online,
            Opcode::Trigger,
            Opcode::Ota,
            Opcode::Debug,
            Opcode::Flush,
            Opcode::Begin,
            Opcode::End,
            Opcode::BtConfig,
            Opcode::Ping,
            Opcode::Pong,
            Opcode::ConfigSetting,
            Opcode::Security,
            Opcode::Play,
            Opcode::Status,
            Opcode::ReqStat,
            Opcode::Alt,
        ] {
            assert_eq!(Opcode::from_bytes(op.bytes()), op);
        }
    }

    #[test]
    fn unknown_codes_are_preserved() {
        let op = Opcode::from_bytes(*b"zzz");
        assert_eq!(op, Opcode::Other(*b"zzz"));
        assert_eq!(op.bytes(), *b"zzz");
        assert_eq!(op.to_string(), "zzz");
    }
}
