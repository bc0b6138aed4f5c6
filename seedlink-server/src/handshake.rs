//! Per-connection command state machine.
//!
//! The negotiator never touches the socket. It turns one parsed [`Command`]
//! into an [`Action`] that the session carries out, so every ordering rule
//! can be tested without a network.

use std::net::IpAddr;

use seedlink4_protocol::response::ErrorCode;
use seedlink4_protocol::{
    AcceptCode, AuthMethod, Command, InfoLevel, ProtocolVersion, Response, SeedlinkError,
};
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::dispatcher::StreamPlan;
use crate::ingest::StationCatalog;
use crate::subscription::{Selector, Subscription};

pub(crate) const CAPABILITIES: [&str; 3] = ["SLPROTO:4.0", "SLPROTO:3.1", "CAP:AUTH:USERPASS"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    Init,
    Versioned,
    Authenticated,
    Scoped,
    Selecting,
    Streaming,
    Feeding,
    Closed,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "Init",
            Self::Versioned => "Versioned",
            Self::Authenticated => "Authenticated",
            Self::Scoped => "Scoped",
            Self::Selecting => "Selecting",
            Self::Streaming => "Streaming",
            Self::Feeding => "Feeding",
            Self::Closed => "Closed",
        }
    }
}

/// What the negotiator sees of the server and the peer.
pub(crate) struct Context<'a> {
    pub config: &'a ServerConfig,
    pub peer: IpAddr,
    pub catalog: &'a StationCatalog,
}

/// What the session must do after a command.
#[derive(Debug)]
pub(crate) enum Action {
    /// Send the response and keep reading commands.
    Reply(Response),
    /// Register the plan with the fan-out, send the response if any, then
    /// stream. `END` starts streaming without a response.
    Stream {
        plan: StreamPlan,
        reply: Option<Response>,
    },
    /// Send the INFO document for `level`, framed for `version`.
    Info {
        level: InfoLevel,
        version: ProtocolVersion,
    },
    /// Send an INFO error document.
    InfoError {
        version: ProtocolVersion,
        code: ErrorCode,
        message: String,
    },
    /// Answer `OK` and treat everything that follows as record frames.
    Feed,
    /// Send the response, if any, and close.
    Close(Option<Response>),
}

#[derive(Debug)]
pub(crate) struct Negotiator {
    state: State,
    version: Option<ProtocolVersion>,
    accept: Vec<AcceptCode>,
    subscription: Option<Subscription>,
    authenticated: bool,
    user_agent: Option<String>,
}

impl Negotiator {
    pub fn new() -> Self {
        Self {
            state: State::Init,
            version: None,
            accept: Vec::new(),
            subscription: None,
            authenticated: false,
            user_agent: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    /// Negotiated version, 3.1 until `SLPROTO` says otherwise.
    pub fn version(&self) -> ProtocolVersion {
        self.version.unwrap_or_default()
    }

    /// SLPROTO 4.0 sessions get coded errors, everything else the bare line.
    fn versioned(&self) -> bool {
        self.version.is_some_and(|v| v.is_extended())
    }

    /// Error response in the dialect of this session.
    pub fn error(&self, code: ErrorCode, description: impl Into<String>) -> Response {
        if self.versioned() {
            Response::error(code, description)
        } else {
            Response::Error {
                code: None,
                description: description.into(),
            }
        }
    }

    /// Response for a line that did not parse as a command.
    pub fn reject(&self, err: &SeedlinkError) -> Response {
        self.error(ErrorCode::Unsupported, err.to_string())
    }

    /// Commit the subscription and switch to streaming.
    fn start_stream(&mut self, command: &Command, reply: Option<Response>) -> Action {
        use State::*;

        let Some(subscription) = self.subscription.clone() else {
            return self.unexpected(command);
        };
        if !matches!(self.state, Scoped | Selecting) {
            return self.unexpected(command);
        }
        let start = match command {
            Command::Data { start: Some(start) } => match start.resolve(self.version()) {
                Ok(sequence) => Some(sequence),
                Err(err) => return Action::Reply(self.error(ErrorCode::Arguments, err.to_string())),
            },
            _ => None,
        };
        self.state = Streaming;
        Action::Stream {
            plan: StreamPlan {
                subscription,
                accept: self.accept.clone(),
                extended: self.versioned() || !self.accept.is_empty(),
                start,
            },
            reply,
        }
    }

    fn unexpected(&self, command: &Command) -> Action {
        debug!(command = command.name(), state = ?self.state, "command out of order");
        Action::Reply(self.error(
            ErrorCode::Unexpected,
            format!("{} not allowed now", command.name()),
        ))
    }

    pub fn handle(&mut self, command: Command, ctx: &Context<'_>) -> Action {
        use State::*;

        if matches!(self.state, Streaming | Feeding | Closed) {
            return self.unexpected(&command);
        }

        match command {
            Command::Hello => Action::Reply(Response::Hello {
                software: ctx.config.software.clone(),
                capabilities: CAPABILITIES.iter().map(|c| (*c).to_owned()).collect(),
                organization: ctx.config.organization.clone(),
            }),

            Command::SlProto { version } => {
                if self.state != Init || self.version.is_some() {
                    return self.unexpected(&Command::SlProto { version });
                }
                self.version = Some(version);
                self.state = Versioned;
                debug!(%version, "protocol negotiated");
                Action::Reply(Response::Ok)
            }

            Command::Accept { codes } => {
                if !matches!(self.state, Init | Versioned) {
                    return self.unexpected(&Command::Accept { codes });
                }
                self.accept = codes;
                Action::Reply(Response::Ok)
            }

            Command::Auth {
                method: AuthMethod::UserPass { user, password },
            } => {
                if !matches!(self.state, Init | Versioned | Authenticated) {
                    return self.unexpected(&Command::Auth {
                        method: AuthMethod::UserPass { user, password },
                    });
                }
                if ctx.config.feed_auth.verify(&user, &password) {
                    self.authenticated = true;
                    self.state = Authenticated;
                    debug!(%user, "authenticated");
                    Action::Reply(Response::Ok)
                } else {
                    warn!(%user, peer = %ctx.peer, "authentication failed");
                    Action::Reply(self.error(ErrorCode::Auth, "invalid credentials"))
                }
            }

            Command::Feed => {
                if !matches!(self.state, Init | Versioned | Authenticated) {
                    return self.unexpected(&Command::Feed);
                }
                if !ctx.config.feed_auth.feed_allowed(self.authenticated, ctx.peer) {
                    warn!(peer = %ctx.peer, "FEED denied");
                    return Action::Reply(
                        self.error(ErrorCode::Unauthorized, "FEED requires authentication"),
                    );
                }
                self.state = Feeding;
                Action::Feed
            }

            Command::Station { station, network } => {
                if !matches!(self.state, Init | Versioned | Authenticated | Scoped | Selecting) {
                    return self.unexpected(&Command::Station { station, network });
                }
                if ctx.config.reject_unknown_stations && !ctx.catalog.knows(&station, &network) {
                    let description = format!("unknown station {network}_{station}");
                    return Action::Reply(self.error(ErrorCode::Arguments, description));
                }
                self.subscription = Some(Subscription::new(station, network));
                self.state = Scoped;
                Action::Reply(Response::Ok)
            }

            Command::Select { pattern } => {
                if !matches!(self.state, Scoped | Selecting) {
                    return self.unexpected(&Command::Select { pattern });
                }
                let Some(selector) = Selector::parse(&pattern) else {
                    return Action::Reply(
                        self.error(ErrorCode::Arguments, format!("invalid selector {pattern:?}")),
                    );
                };
                let Some(subscription) = self.subscription.as_mut() else {
                    return self.unexpected(&Command::Select { pattern });
                };
                subscription.add_selector(selector);
                self.state = Selecting;
                Action::Reply(Response::Ok)
            }

            Command::Data { .. } => self.start_stream(&command, Some(Response::Ok)),

            Command::UserAgent { description } => {
                debug!(user_agent = %description, "user agent");
                self.user_agent = Some(description);
                Action::Reply(Response::Ok)
            }

            Command::Info { level } => {
                let version = self.version();
                if !level.is_valid_for(version) {
                    return Action::InfoError {
                        version,
                        code: ErrorCode::Arguments,
                        message: format!("INFO {level} requires SLPROTO 4.0"),
                    };
                }
                if level == InfoLevel::Connections
                    && !ctx.config.feed_auth.feed_allowed(self.authenticated, ctx.peer)
                {
                    warn!(peer = %ctx.peer, "INFO CONNECTIONS denied");
                    return Action::InfoError {
                        version,
                        code: ErrorCode::Unauthorized,
                        message: "INFO CONNECTIONS requires authentication".to_owned(),
                    };
                }
                Action::Info { level, version }
            }

            // With a subscription, END is the start-of-transfer marker.
            Command::End if matches!(self.state, Scoped | Selecting) => {
                self.start_stream(&Command::End, None)
            }

            Command::End => {
                self.state = Closed;
                Action::Close(Some(Response::Ok))
            }

            Command::Bye => {
                self.state = Closed;
                Action::Close(None)
            }
        }
    }
}
