// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{application, transport, varint::VarInt};
use alloc::string::String;
use bytes::Bytes;
use core::fmt;

/// The maximum number of reason phrase bytes kept in a CONNECTION_CLOSE
pub const MAX_REASON_LEN: usize = 1024;

/// Errors that a connection can encounter.
///
/// Transport and application errors may originate locally or from the peer.
/// Internal errors are never sent on the wire.
#[derive(Clone, PartialEq, Eq)]
pub enum Error {
    /// The connection was closed on the transport level
    Transport {
        code: VarInt,
        /// The frame type that triggered the error, if known
        frame_type: Option<VarInt>,
        reason: Bytes,
    },

    /// The connection was closed on the application level
    Application {
        code: application::Error,
        reason: Bytes,
    },

    /// A condition reported to the caller that never reaches the peer
    Internal(InternalError),

    /// The idle timer expired and the connection was discarded silently
    IdleTimeout,
}

/// Local conditions surfaced through return values
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InternalError {
    /// The packet could not be decoded or decrypted and was dropped
    PacketIgnored,
    /// The stream send buffer is full; the write should be retried later
    SendBufferFull,
    /// The connection finished closing and its resources can be released
    FreeConnection,
}

impl InternalError {
    const fn packed(self) -> u32 {
        match self {
            Self::PacketIgnored => 0xff01,
            Self::SendBufferFull => 0xff02,
            Self::FreeConnection => 0xff03,
        }
    }
}

const TRANSPORT_TAG: u32 = 0x20000;
const APPLICATION_TAG: u32 = 0x30000;
const IDLE_TIMEOUT_PACKED: u32 = 0xff04;

impl Error {
    /// Creates an application close error
    #[inline]
    pub fn application(code: application::Error, reason: &[u8]) -> Self {
        Self::Application {
            code,
            reason: truncate_reason(reason),
        }
    }

    /// Creates a transport close error
    #[inline]
    pub fn transport(code: VarInt, frame_type: Option<VarInt>, reason: &[u8]) -> Self {
        Self::Transport {
            code,
            frame_type,
            reason: truncate_reason(reason),
        }
    }

    /// Returns true if the error is the clean NO_ERROR transport close
    #[inline]
    pub fn is_no_error(&self) -> bool {
        matches!(self, Self::Transport { code, .. } if *code == transport::Error::NO_ERROR.code)
    }

    /// Returns the reason phrase, if any
    #[inline]
    pub fn reason(&self) -> &[u8] {
        match self {
            Self::Transport { reason, .. } | Self::Application { reason, .. } => reason,
            _ => &[],
        }
    }

    /// Converts the error to the packed integer form used in logs and C-style APIs
    ///
    /// Transport and application codes occupy the low 16 bits, tagged with
    /// `0x20000` and `0x30000` respectively. Larger codes are truncated.
    pub fn to_packed(&self) -> u32 {
        match self {
            Self::Transport { code, .. } => TRANSPORT_TAG | (code.as_u64() as u16 as u32),
            Self::Application { code, .. } => {
                APPLICATION_TAG | (code.as_varint().as_u64() as u16 as u32)
            }
            Self::Internal(error) => error.packed(),
            Self::IdleTimeout => IDLE_TIMEOUT_PACKED,
        }
    }

    /// Reconstructs an error from its packed form
    ///
    /// Reason phrases and frame types do not survive packing.
    pub fn from_packed(value: u32) -> Option<Self> {
        let code = VarInt::from_u16(value as u16);
        Some(match value & APPLICATION_TAG {
            TRANSPORT_TAG => Self::transport(code, None, &[]),
            APPLICATION_TAG => Self::application(code.into(), &[]),
            _ => match value {
                0xff01 => Self::Internal(InternalError::PacketIgnored),
                0xff02 => Self::Internal(InternalError::SendBufferFull),
                0xff03 => Self::Internal(InternalError::FreeConnection),
                IDLE_TIMEOUT_PACKED => Self::IdleTimeout,
                _ => return None,
            },
        })
    }
}

#[inline]
fn truncate_reason(reason: &[u8]) -> Bytes {
    let len = reason.len().min(MAX_REASON_LEN);
    Bytes::copy_from_slice(&reason[..len])
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport {
                code,
                frame_type,
                reason,
            } => {
                let mut d = f.debug_struct("Transport");
                d.field("code", &code.as_u64());
                if let Some(description) = transport::Error::new(*code).description() {
                    d.field("description", &description);
                }
                if let Some(frame_type) = frame_type {
                    d.field("frame_type", &frame_type.as_u64());
                }
                if !reason.is_empty() {
                    d.field("reason", &String::from_utf8_lossy(reason));
                }
                d.finish()
            }
            Self::Application { code, reason } => {
                let mut d = f.debug_struct("Application");
                d.field("code", &code.as_varint().as_u64());
                if !reason.is_empty() {
                    d.field("reason", &String::from_utf8_lossy(reason));
                }
                d.finish()
            }
            Self::Internal(error) => f.debug_tuple("Internal").field(error).finish(),
            Self::IdleTimeout => f.write_str("IdleTimeout"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport { code, .. } => {
                match transport::Error::new(*code).description() {
                    Some(description) => write!(f, "transport error {description}")?,
                    None => write!(f, "transport error {code}")?,
                }
            }
            Self::Application { code, .. } => write!(f, "application error {}", **code)?,
            Self::Internal(InternalError::PacketIgnored) => return f.write_str("packet ignored"),
            Self::Internal(InternalError::SendBufferFull) => return f.write_str("send buffer full"),
            Self::Internal(InternalError::FreeConnection) => {
                return f.write_str("connection can be freed")
            }
            Self::IdleTimeout => return f.write_str("idle timeout"),
        }

        let reason = self.reason();
        if !reason.is_empty() {
            write!(f, ": {}", String::from_utf8_lossy(reason))?;
        }
        Ok(())
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl From<transport::Error> for Error {
    #[inline]
    fn from(error: transport::Error) -> Self {
        Self::Transport {
            code: error.code,
            frame_type: error.frame_type,
            reason: Bytes::from_static(error.reason.as_bytes()),
        }
    }
}

impl From<application::Error> for Error {
    #[inline]
    fn from(code: application::Error) -> Self {
        Self::Application {
            code,
            reason: Bytes::new(),
        }
    }
}

impl From<InternalError> for Error {
    #[inline]
    fn from(error: InternalError) -> Self {
        Self::Internal(error)
    }
}
