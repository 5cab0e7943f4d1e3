// SPDX-License-Identifier: MIT
//
// Crate error types.
//
// Most of the renderer is tolerant by construction: bad escape sequences
// are dropped, out-of-range draws are clipped and transport failures turn
// into `Event::Disconnect`. What's left is setup: bad configuration,
// a terminal that can't be put into raw mode, sixel configuration.

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sixel(#[from] cellterm_sixel::SixelError),

    /// The operation needs a terminal and the descriptor isn't one.
    #[error("not a terminal")]
    NotATerminal,

    /// The backend was already shut down.
    #[error("backend is shut down")]
    Closed,
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn conversions_keep_messages() {
        let err: Error = cellterm_sixel::SixelError::InvalidPaletteSize(100).into();
        assert_eq!(
            err.to_string(),
            "invalid palette size 100: expected a power of two between 2 and 2048"
        );

        let err: Error = std::io::Error::other("pipe closed").into();
        assert_eq!(err.to_string(), "I/O error: pipe closed");
    }
}
