//! Command channel protocol.
//!
//! Clients talk to the daemon through a FIFO. A message is a single command
//! byte immediately followed by a path, with no separator and no terminator.
//! The writer closes its end after one message.
//!
//! The only command is `R`, which unmounts the device registered under the
//! path (a device node or a mountpoint).

use snafu::{OptionExt, ResultExt, Snafu};

/// Command byte for "remove".
pub const REMOVE: u8 = b'R';

/// A decoded command channel message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Unmount the device registered under this path.
    Remove(String),
}

/// Why a message could not be decoded.
#[derive(Debug, Snafu)]
pub enum DecodeError {
    #[snafu(display("empty message"))]
    Empty,

    #[snafu(display("unknown command {:?}", char::from(*byte)))]
    UnknownCommand { byte: u8 },

    #[snafu(display("path is not valid UTF-8"))]
    InvalidPath { source: std::str::Utf8Error },
}

impl Command {
    /// Decodes one message.
    ///
    /// A single trailing `/` on the path is dropped, so `R/mnt/disk/` and
    /// `R/mnt/disk` are the same request.
    pub fn decode(message: &[u8]) -> Result<Self, DecodeError> {
        let (&command, payload) = message.split_first().context(EmptySnafu)?;

        match command {
            REMOVE => {
                let path = std::str::from_utf8(payload).context(InvalidPathSnafu)?;
                let path = path.strip_suffix('/').unwrap_or(path);
                Ok(Command::Remove(path.to_string()))
            }
            byte => UnknownCommandSnafu { byte }.fail(),
        }
    }

    /// Encodes the command into one message.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Command::Remove(path) => {
                let mut message = Vec::with_capacity(path.len() + 1);
                message.push(REMOVE);
                message.extend_from_slice(path.as_bytes());
                message
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_strips_trailing_slash() {
        assert_eq!(
            Command::decode(b"R/mnt/My_Disk/").unwrap(),
            Command::Remove("/mnt/My_Disk".to_string())
        );
        assert_eq!(
            Command::decode(b"R/dev/sdb1").unwrap(),
            Command::Remove("/dev/sdb1".to_string())
        );
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            Command::decode(b"").unwrap_err(),
            DecodeError::Empty
        ));

        let unknown = Command::decode(b"X/mnt/a").unwrap_err();
        assert!(matches!(unknown, DecodeError::UnknownCommand { byte: b'X' }));
        assert_eq!(unknown.to_string(), "unknown command 'X'");

        assert!(matches!(
            Command::decode(b"R\xff\xfe").unwrap_err(),
            DecodeError::InvalidPath { .. }
        ));
    }

    #[test]
    fn test_encode() {
        let message = Command::Remove("/mnt/Stick/".to_string()).encode();
        assert_eq!(message, b"R/mnt/Stick/");
        assert_eq!(
            Command::decode(&message).unwrap(),
            Command::Remove("/mnt/Stick".to_string())
        );
    }
}
