use crate::error::{Result, SeedlinkError};
use crate::frame::{PayloadFormat, PayloadSubformat};
use crate::info::InfoLevel;
use crate::sequence::SequenceNumber;
use crate::version::ProtocolVersion;

/// One entry of an `ACCEPT` list.
///
/// A token is either a single format character (`2`), a format followed by a
/// subformat character (`2D`), or the decimal ASCII code of a format (`50`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct AcceptCode {
    pub format: PayloadFormat,
    pub subformat: Option<PayloadSubformat>,
}

impl AcceptCode {
    pub fn parse(token: &str) -> Result<Self> {
        let invalid = || SeedlinkError::InvalidCommand(format!("ACCEPT: invalid code {token:?}"));
        let bytes = token.as_bytes();

        if bytes.len() > 1 && bytes.iter().all(u8::is_ascii_digit) {
            let code: u8 = token.parse().map_err(|_| invalid())?;
            let format = PayloadFormat::from_byte(code).map_err(|_| invalid())?;
            return Ok(Self {
                format,
                subformat: None,
            });
        }

        match *bytes {
            [f] => Ok(Self {
                format: PayloadFormat::from_byte(f).map_err(|_| invalid())?,
                subformat: None,
            }),
            [f, s] => Ok(Self {
                format: PayloadFormat::from_byte(f).map_err(|_| invalid())?,
                subformat: Some(PayloadSubformat::from_byte(s).map_err(|_| invalid())?),
            }),
            _ => Err(invalid()),
        }
    }

    /// True if a record of this format/subformat is covered by the code.
    pub fn covers(&self, format: PayloadFormat, subformat: Option<PayloadSubformat>) -> bool {
        self.format == format && self.subformat.is_none_or(|s| Some(s) == subformat)
    }
}

impl std::fmt::Display for AcceptCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.format.to_byte() as char)?;
        if let Some(s) = self.subformat {
            write!(f, "{}", s.to_byte() as char)?;
        }
        Ok(())
    }
}

/// Credentials carried by `AUTH`. Only `USERPASS` is understood.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthMethod {
    UserPass { user: String, password: String },
}

/// Where `DATA` starts delivery when an argument is given.
///
/// The sequence token is kept as sent: its radix depends on the protocol
/// version, which only the session knows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataStart {
    /// `DATA ALL`: the oldest record still held.
    All,
    /// `DATA <seq>`: hex in SLPROTO 3.x, decimal in 4.0.
    Sequence(String),
}

impl DataStart {
    /// Token for `sequence` in the dialect of `version`.
    pub fn from_sequence(sequence: SequenceNumber, version: ProtocolVersion) -> Self {
        if version.is_extended() {
            Self::Sequence(sequence.value().to_string())
        } else {
            Self::Sequence(sequence.to_legacy_hex())
        }
    }

    /// First sequence number to deliver.
    pub fn resolve(&self, version: ProtocolVersion) -> Result<SequenceNumber> {
        let token = match self {
            Self::All => return Ok(SequenceNumber::UNDEFINED.next()),
            Self::Sequence(token) => token,
        };
        let invalid =
            || SeedlinkError::InvalidSequence(format!("DATA: invalid sequence {token:?}"));

        let value = if version.is_extended() {
            if !token.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            token.parse::<i64>().map_err(|_| invalid())?
        } else {
            if token.len() > 6 || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            let value = i64::from_str_radix(token, 16).map_err(|_| invalid())?;
            if value >= SequenceNumber::LEGACY_MODULUS {
                return Err(invalid());
            }
            value
        };
        SequenceNumber::new(value)
    }

    fn as_str(&self) -> &str {
        match self {
            Self::All => "ALL",
            Self::Sequence(token) => token,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Hello,
    SlProto { version: ProtocolVersion },
    Accept { codes: Vec<AcceptCode> },
    Station { station: String, network: String },
    Select { pattern: String },
    Data { start: Option<DataStart> },
    End,
    Bye,
    UserAgent { description: String },
    Auth { method: AuthMethod },
    Feed,
    Info { level: InfoLevel },
}

impl Command {
    /// Parse a command from a text line.
    ///
    /// Keywords are case-sensitive. A trailing `\r\n` is stripped.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches('\n').trim_end_matches('\r');
        let mut parts = line.split_whitespace();
        let keyword = parts
            .next()
            .ok_or_else(|| SeedlinkError::InvalidCommand("empty command".into()))?;

        match keyword {
            "HELLO" => {
                reject_extra_args(&mut parts, "HELLO")?;
                Ok(Self::Hello)
            }
            "SLPROTO" => {
                let version = parts.next().ok_or_else(|| {
                    SeedlinkError::InvalidCommand("SLPROTO requires version".into())
                })?;
                reject_extra_args(&mut parts, "SLPROTO")?;
                Ok(Self::SlProto {
                    version: ProtocolVersion::parse(version)?,
                })
            }
            "ACCEPT" => {
                let codes = parts.map(AcceptCode::parse).collect::<Result<Vec<_>>>()?;
                if codes.is_empty() {
                    return Err(SeedlinkError::InvalidCommand(
                        "ACCEPT requires at least one code".into(),
                    ));
                }
                Ok(Self::Accept { codes })
            }
            "STATION" => {
                let (Some(station), Some(network)) = (parts.next(), parts.next()) else {
                    return Err(SeedlinkError::InvalidCommand(
                        "STATION requires 'STA NET'".into(),
                    ));
                };
                reject_extra_args(&mut parts, "STATION")?;
                Ok(Self::Station {
                    station: station.to_owned(),
                    network: network.to_owned(),
                })
            }
            "SELECT" => {
                let pattern = parts.next().ok_or_else(|| {
                    SeedlinkError::InvalidCommand("SELECT requires a pattern".into())
                })?;
                reject_extra_args(&mut parts, "SELECT")?;
                Ok(Self::Select {
                    pattern: pattern.to_owned(),
                })
            }
            "DATA" => {
                let start = parts.next().map(|token| match token {
                    "ALL" => DataStart::All,
                    token => DataStart::Sequence(token.to_owned()),
                });
                reject_extra_args(&mut parts, "DATA")?;
                Ok(Self::Data { start })
            }
            "END" => {
                reject_extra_args(&mut parts, "END")?;
                Ok(Self::End)
            }
            "BYE" => {
                reject_extra_args(&mut parts, "BYE")?;
                Ok(Self::Bye)
            }
            "USERAGENT" => {
                let rest: Vec<&str> = parts.collect();
                if rest.is_empty() {
                    return Err(SeedlinkError::InvalidCommand(
                        "USERAGENT requires a description".into(),
                    ));
                }
                Ok(Self::UserAgent {
                    description: rest.join(" "),
                })
            }
            "AUTH" => match parts.next() {
                Some("USERPASS") => {
                    let (Some(user), Some(password)) = (parts.next(), parts.next()) else {
                        return Err(SeedlinkError::InvalidCommand(
                            "AUTH USERPASS requires user and password".into(),
                        ));
                    };
                    reject_extra_args(&mut parts, "AUTH")?;
                    Ok(Self::Auth {
                        method: AuthMethod::UserPass {
                            user: user.to_owned(),
                            password: password.to_owned(),
                        },
                    })
                }
                Some(other) => Err(SeedlinkError::InvalidCommand(format!(
                    "AUTH: unsupported method {other:?}"
                ))),
                None => Err(SeedlinkError::InvalidCommand("AUTH requires a method".into())),
            },
            "FEED" => {
                reject_extra_args(&mut parts, "FEED")?;
                Ok(Self::Feed)
            }
            "INFO" => {
                let level = parts
                    .next()
                    .ok_or_else(|| SeedlinkError::InvalidCommand("INFO requires a level".into()))?;
                reject_extra_args(&mut parts, "INFO")?;
                Ok(Self::Info {
                    level: InfoLevel::parse(level)?,
                })
            }
            _ => Err(SeedlinkError::InvalidCommand(format!(
                "unknown command: {keyword:?}"
            ))),
        }
    }

    /// Serialize to a CRLF-terminated wire line.
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("{}\r\n", self.format_line()).into_bytes()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Hello => "HELLO",
            Self::SlProto { .. } => "SLPROTO",
            Self::Accept { .. } => "ACCEPT",
            Self::Station { .. } => "STATION",
            Self::Select { .. } => "SELECT",
            Self::Data { .. } => "DATA",
            Self::End => "END",
            Self::Bye => "BYE",
            Self::UserAgent { .. } => "USERAGENT",
            Self::Auth { .. } => "AUTH",
            Self::Feed => "FEED",
            Self::Info { .. } => "INFO",
        }
    }

    fn format_line(&self) -> String {
        match self {
            Self::SlProto { version } => format!("SLPROTO {version}"),
            Self::Accept { codes } => {
                let codes: Vec<String> = codes.iter().map(ToString::to_string).collect();
                format!("ACCEPT {}", codes.join(" "))
            }
            Self::Station { station, network } => format!("STATION {station} {network}"),
            Self::Select { pattern } => format!("SELECT {pattern}"),
            Self::Data { start: Some(start) } => format!("DATA {}", start.as_str()),
            Self::Info { level } => format!("INFO {level}"),
            Self::UserAgent { description } => format!("USERAGENT {description}"),
            Self::Auth {
                method: AuthMethod::UserPass { user, password },
            } => format!("AUTH USERPASS {user} {password}"),
            other => other.name().to_owned(),
        }
    }
}

fn reject_extra_args(parts: &mut std::str::SplitWhitespace<'_>, command: &str) -> Result<()> {
    if parts.next().is_some() {
        Err(SeedlinkError::InvalidCommand(format!(
            "{command}: unexpected extra arguments"
        )))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hello() {
        assert_eq!(Command::parse("HELLO").unwrap(), Command::Hello);
    }

    #[test]
    fn keywords_are_case_sensitive() {
        assert!(Command::parse("hello").is_err());
        assert!(Command::parse("Station WLF GE").is_err());
    }

    #[test]
    fn parse_slproto() {
        assert_eq!(
            Command::parse("SLPROTO 4.0").unwrap(),
            Command::SlProto {
                version: ProtocolVersion::V4
            }
        );
        assert!(Command::parse("SLPROTO 9.9").is_err());
        assert!(Command::parse("SLPROTO").is_err());
    }

    #[test]
    fn parse_accept_tokens() {
        let cmd = Command::parse("ACCEPT 2 3E 50").unwrap();
        assert_eq!(
            cmd,
            Command::Accept {
                codes: vec![
                    AcceptCode {
                        format: PayloadFormat::MiniSeed2,
                        subformat: None
                    },
                    AcceptCode {
                        format: PayloadFormat::MiniSeed3,
                        subformat: Some(PayloadSubformat::Event)
                    },
                    AcceptCode {
                        format: PayloadFormat::MiniSeed2,
                        subformat: None
                    },
                ]
            }
        );
    }

    #[test]
    fn parse_accept_invalid() {
        assert!(Command::parse("ACCEPT").is_err());
        assert!(Command::parse("ACCEPT Q").is_err());
        assert!(Command::parse("ACCEPT 2Z").is_err());
        assert!(Command::parse("ACCEPT 999").is_err());
    }

    #[test]
    fn accept_code_covers() {
        let any2 = AcceptCode::parse("2").unwrap();
        assert!(any2.covers(PayloadFormat::MiniSeed2, Some(PayloadSubformat::Log)));
        assert!(any2.covers(PayloadFormat::MiniSeed2, None));
        assert!(!any2.covers(PayloadFormat::MiniSeed3, None));

        let data2 = AcceptCode::parse("2D").unwrap();
        assert!(data2.covers(PayloadFormat::MiniSeed2, Some(PayloadSubformat::Data)));
        assert!(!data2.covers(PayloadFormat::MiniSeed2, Some(PayloadSubformat::Event)));
    }

    #[test]
    fn parse_station() {
        assert_eq!(
            Command::parse("STATION WLF GE").unwrap(),
            Command::Station {
                station: "WLF".into(),
                network: "GE".into(),
            }
        );
        assert!(Command::parse("STATION WLF").is_err());
        assert!(Command::parse("STATION WLF GE X").is_err());
    }

    #[test]
    fn parse_select() {
        assert_eq!(
            Command::parse("SELECT *.3").unwrap(),
            Command::Select {
                pattern: "*.3".into(),
            }
        );
        assert!(Command::parse("SELECT").is_err());
    }

    #[test]
    fn parse_data_end_bye_feed() {
        assert_eq!(Command::parse("DATA").unwrap(), Command::Data { start: None });
        assert_eq!(Command::parse("END").unwrap(), Command::End);
        assert_eq!(Command::parse("BYE").unwrap(), Command::Bye);
        assert_eq!(Command::parse("FEED").unwrap(), Command::Feed);
    }

    #[test]
    fn parse_data_start() {
        assert_eq!(
            Command::parse("DATA 00001A").unwrap(),
            Command::Data {
                start: Some(DataStart::Sequence("00001A".into()))
            }
        );
        assert_eq!(
            Command::parse("DATA ALL").unwrap(),
            Command::Data {
                start: Some(DataStart::All)
            }
        );
        assert!(Command::parse("DATA 1 2").is_err());
    }

    #[test]
    fn data_start_radix_follows_version() {
        let token = DataStart::Sequence("000010".into());
        assert_eq!(token.resolve(ProtocolVersion::V3).unwrap().value(), 16);
        assert_eq!(token.resolve(ProtocolVersion::V4).unwrap().value(), 10);

        assert_eq!(DataStart::All.resolve(ProtocolVersion::V4).unwrap().value(), 0);
        assert!(DataStart::Sequence("FFFFFF".into()).resolve(ProtocolVersion::V3).is_err());
        assert!(DataStart::Sequence("1000000".into()).resolve(ProtocolVersion::V3).is_err());
        assert!(DataStart::Sequence("1A".into()).resolve(ProtocolVersion::V4).is_err());
        assert!(DataStart::Sequence("-1".into()).resolve(ProtocolVersion::V4).is_err());

        let seq = SequenceNumber::new(26).unwrap();
        let v3 = DataStart::from_sequence(seq, ProtocolVersion::V3);
        assert_eq!(v3, DataStart::Sequence("00001A".into()));
        assert_eq!(v3.resolve(ProtocolVersion::V3).unwrap(), seq);
        let v4 = DataStart::from_sequence(seq, ProtocolVersion::V4);
        assert_eq!(v4.resolve(ProtocolVersion::V4).unwrap(), seq);
    }

    #[test]
    fn parse_info() {
        assert_eq!(
            Command::parse("INFO STATIONS").unwrap(),
            Command::Info {
                level: InfoLevel::Stations
            }
        );
        assert!(Command::parse("INFO").is_err());
        assert!(Command::parse("INFO GAPS").is_err());
        assert!(Command::parse("INFO ID extra").is_err());
    }

    #[test]
    fn parse_auth_userpass() {
        assert_eq!(
            Command::parse("AUTH USERPASS alice secret").unwrap(),
            Command::Auth {
                method: AuthMethod::UserPass {
                    user: "alice".into(),
                    password: "secret".into(),
                }
            }
        );
        assert!(Command::parse("AUTH USERPASS alice").is_err());
        assert!(Command::parse("AUTH TOKEN abc").is_err());
        assert!(Command::parse("AUTH").is_err());
    }

    #[test]
    fn parse_useragent() {
        assert_eq!(
            Command::parse("USERAGENT relay/0.1 (test)").unwrap(),
            Command::UserAgent {
                description: "relay/0.1 (test)".into(),
            }
        );
    }

    #[test]
    fn parse_trailing_crlf() {
        assert_eq!(Command::parse("DATA\r\n").unwrap(), Command::Data { start: None });
    }

    #[test]
    fn parse_empty_and_unknown() {
        assert!(Command::parse("").is_err());
        assert!(Command::parse("   ").is_err());
        assert!(Command::parse("FOOBAR").is_err());
    }

    #[test]
    fn to_bytes_lines() {
        assert_eq!(Command::Data { start: None }.to_bytes(), b"DATA\r\n");
        assert_eq!(
            Command::Data {
                start: Some(DataStart::All)
            }
            .to_bytes(),
            b"DATA ALL\r\n"
        );
        assert_eq!(
            Command::Station {
                station: "WLF".into(),
                network: "GE".into()
            }
            .to_bytes(),
            b"STATION WLF GE\r\n"
        );
        assert_eq!(
            Command::SlProto {
                version: ProtocolVersion::V4
            }
            .to_bytes(),
            b"SLPROTO 4.0\r\n"
        );
        assert_eq!(
            Command::parse("ACCEPT 2 3E").unwrap().to_bytes(),
            b"ACCEPT 2 3E\r\n"
        );
    }

    #[test]
    fn roundtrip() {
        let commands = vec![
            Command::Hello,
            Command::Station {
                station: "*".into(),
                network: "GE".into(),
            },
            Command::Select {
                pattern: "!WLF.E".into(),
            },
            Command::Data { start: None },
            Command::Data {
                start: Some(DataStart::Sequence("42".into())),
            },
            Command::End,
            Command::Bye,
            Command::Feed,
            Command::Info {
                level: InfoLevel::Connections,
            },
            Command::Auth {
                method: AuthMethod::UserPass {
                    user: "u".into(),
                    password: "p".into(),
                },
            },
        ];
        for cmd in commands {
            let bytes = cmd.to_bytes();
            let line = std::str::from_utf8(&bytes).unwrap();
            assert_eq!(Command::parse(line).unwrap(), cmd, "roundtrip failed for {cmd:?}");
        }
    }
}
