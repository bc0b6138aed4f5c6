//! SeedLink 4 protocol types, commands, and record framing.
//!
//! This crate provides the wire layer shared by the server engine and the
//! client harness: command lines, responses, sequence numbers, the
//! legacy / SE2 / SE3 binary frame families, and INFO document framing.

pub mod command;
pub mod error;
pub mod frame;
pub mod info;
pub mod response;
pub mod sequence;
pub mod version;

pub use command::{AcceptCode, AuthMethod, Command, DataStart};
pub use error::{Result, SeedlinkError};
pub use frame::{FrameFamily, PayloadFormat, PayloadSubformat, Record, Signature};
pub use info::{InfoDocument, InfoKind, InfoLevel};
pub use response::{ErrorCode, Response};
pub use sequence::SequenceNumber;
pub use version::ProtocolVersion;
