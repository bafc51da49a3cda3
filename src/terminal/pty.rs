//! Thin shim over the platform PTY, isolating `portable-pty` specifics.
//!
//! Everything above this module works with an opaque master handle; only
//! allocation and window sizing know what a `PtySize` is.

use portable_pty::{native_pty_system, MasterPty, PtyPair, PtySize};

use super::error::{TerminalError, TerminalResult};

/// Window size applied when a create request omits (or zeroes) dimensions.
pub const DEFAULT_COLS: u16 = 80;
pub const DEFAULT_ROWS: u16 = 24;

fn pty_size(cols: u16, rows: u16) -> PtySize {
    PtySize {
        rows: if rows == 0 { DEFAULT_ROWS } else { rows },
        cols: if cols == 0 { DEFAULT_COLS } else { cols },
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// Allocate a master/slave pseudo-terminal pair at the requested size.
///
/// The caller owns both halves and must close whichever side it does not
/// hand off to a child process.
pub fn open_pty(cols: u16, rows: u16) -> TerminalResult<PtyPair> {
    native_pty_system()
        .openpty(pty_size(cols, rows))
        .map_err(|e| TerminalError::Allocation(format!("failed to open PTY: {e}")))
}

/// Change the window size of an existing PTY.
///
/// Zero dimensions are a caller bug at this layer; the session validates
/// them before delegating here.
pub fn resize_pty(master: &dyn MasterPty, cols: u16, rows: u16) -> TerminalResult<()> {
    master
        .resize(pty_size(cols, rows))
        .map_err(|e| TerminalError::Allocation(format!("failed to resize PTY: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_dimensions_fall_back_to_defaults() {
        let size = pty_size(0, 0);
        assert_eq!(size.cols, DEFAULT_COLS);
        assert_eq!(size.rows, DEFAULT_ROWS);

        let size = pty_size(132, 43);
        assert_eq!(size.cols, 132);
        assert_eq!(size.rows, 43);
    }

    #[test]
    fn open_and_resize() {
        let pair = open_pty(80, 24).expect("openpty");
        resize_pty(pair.master.as_ref(), 120, 40).expect("resize");
    }
}
