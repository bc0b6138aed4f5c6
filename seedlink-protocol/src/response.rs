use crate::error::{Result, SeedlinkError};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    Unsupported,
    Unexpected,
    Unauthorized,
    Limit,
    Arguments,
    Auth,
    Internal,
}

impl ErrorCode {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "UNSUPPORTED" => Some(Self::Unsupported),
            "UNEXPECTED" => Some(Self::Unexpected),
            "UNAUTHORIZED" => Some(Self::Unauthorized),
            "LIMIT" => Some(Self::Limit),
            "ARGUMENTS" => Some(Self::Arguments),
            "AUTH" => Some(Self::Auth),
            "INTERNAL" => Some(Self::Internal),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unsupported => "UNSUPPORTED",
            Self::Unexpected => "UNEXPECTED",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Limit => "LIMIT",
            Self::Arguments => "ARGUMENTS",
            Self::Auth => "AUTH",
            Self::Internal => "INTERNAL",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    Ok,
    /// `code` is `None` for the bare legacy `ERROR` line.
    Error {
        code: Option<ErrorCode>,
        description: String,
    },
    /// Two-line `HELLO` banner.
    Hello {
        software: String,
        capabilities: Vec<String>,
        organization: String,
    },
}

impl Response {
    pub fn error(code: ErrorCode, description: impl Into<String>) -> Self {
        Self::Error {
            code: Some(code),
            description: description.into(),
        }
    }

    /// Parse a single-line response: OK or ERROR.
    pub fn parse_line(line: &str) -> Result<Self> {
        let line = line.trim_end_matches('\n').trim_end_matches('\r');

        if line == "OK" {
            return Ok(Self::Ok);
        }

        if let Some(rest) = line.strip_prefix("ERROR") {
            return Ok(Self::parse_error(rest));
        }

        Err(SeedlinkError::InvalidResponse(format!(
            "unrecognized response: {line:?}"
        )))
    }

    /// Parse a two-line HELLO response.
    ///
    /// Line 1: `"SeedLink v4.0 :: SLPROTO:4.0 SLPROTO:3.1"`
    /// Line 2: `"GFZ Potsdam"`
    pub fn parse_hello(line1: &str, line2: &str) -> Result<Self> {
        let line1 = line1.trim_end_matches('\n').trim_end_matches('\r');
        let line2 = line2.trim_end_matches('\n').trim_end_matches('\r');

        if line1.is_empty() {
            return Err(SeedlinkError::InvalidResponse("empty HELLO banner".into()));
        }

        let (software, capabilities) = match line1.split_once("::") {
            Some((main, caps)) => (
                main.trim().to_owned(),
                caps.split_whitespace().map(str::to_owned).collect(),
            ),
            None => (line1.trim().to_owned(), Vec::new()),
        };

        Ok(Self::Hello {
            software,
            capabilities,
            organization: line2.to_owned(),
        })
    }

    /// Serialize to wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Ok => b"OK\r\n".to_vec(),
            Self::Error {
                code: Some(code),
                description,
            } => format!("ERROR {} {}\r\n", code.as_str(), description).into_bytes(),
            Self::Error { code: None, .. } => b"ERROR\r\n".to_vec(),
            Self::Hello {
                software,
                capabilities,
                organization,
            } => {
                let line1 = if capabilities.is_empty() {
                    software.clone()
                } else {
                    format!("{software} :: {}", capabilities.join(" "))
                };
                format!("{line1}\r\n{organization}\r\n").into_bytes()
            }
        }
    }

    fn parse_error(rest: &str) -> Self {
        let rest = rest.trim();
        let (first_word, description) = rest.split_once(' ').unwrap_or((rest, ""));

        match ErrorCode::parse(first_word) {
            Some(code) => Self::Error {
                code: Some(code),
                description: description.to_owned(),
            },
            None => Self::Error {
                code: None,
                description: rest.to_owned(),
            },
        }
    }
}
