//! # Connection Window
//!
//! Sliding bitmap of the connection numbers a recogniser still expects for
//! one secret. Bit `i` stands for connection `base + i`; a set bit means the
//! number has been seen.
//!
//! ```text
//!            base = centre - min(centre, 16)
//!              │
//!   seen ◄─────┼──────── 32 slots ─────────┤
//!              [ 1 0 0 1 0 ... 0 0 0 0 0 0 ]
//!                          ▲
//!                        centre = highest seen + 1
//! ```
//!
//! Seeing a number at or above the centre moves the centre past it. Slots
//! that fall off the bottom are retired (their tags must be dropped) and the
//! same number of fresh slots appear at the top (their tags must be minted).

use crate::domain::errors::RecogniserError;
use shared_types::MAX_32_BIT_UNSIGNED;

/// Slots tracked per window.
pub const WINDOW_SIZE: u64 = 32;

/// Slots kept below the centre.
const WINDOW_LOOKBACK: u64 = WINDOW_SIZE / 2;

/// Numbers that left and entered the window after [`ConnectionWindow::set_seen`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowUpdate {
    /// Numbers that dropped out of the window without ever being seen.
    pub retired: Vec<u64>,
    /// Numbers that entered the window at the top.
    pub added: Vec<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionWindow {
    centre: u64,
    bitmap: u32,
}

impl ConnectionWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a persisted window.
    pub fn from_parts(centre: u64, bitmap: u32) -> Result<Self, RecogniserError> {
        if centre > MAX_32_BIT_UNSIGNED + 1 {
            return Err(RecogniserError::InvalidWindow(centre));
        }
        Ok(Self { centre, bitmap })
    }

    pub fn centre(&self) -> u64 {
        self.centre
    }

    pub fn bitmap(&self) -> u32 {
        self.bitmap
    }

    pub fn base(&self) -> u64 {
        self.centre - self.centre.min(WINDOW_LOOKBACK)
    }

    /// One past the highest number in the window. Connection numbers never
    /// exceed 32 bits, so neither does the window.
    fn end(&self) -> u64 {
        (self.base() + WINDOW_SIZE).min(MAX_32_BIT_UNSIGNED + 1)
    }

    pub fn contains(&self, connection: u64) -> bool {
        connection >= self.base() && connection < self.end()
    }

    /// Numbers below the window count as seen.
    pub fn is_seen(&self, connection: u64) -> bool {
        if connection < self.base() {
            return true;
        }
        self.contains(connection) && self.bit(connection)
    }

    /// Every number in the window that has not been seen, lowest first.
    pub fn unseen(&self) -> Vec<u64> {
        (self.base()..self.end())
            .filter(|&n| !self.bit(n))
            .collect()
    }

    /// Mark `connection` seen, sliding the window if it is at or above the
    /// centre.
    pub fn set_seen(&mut self, connection: u64) -> Result<WindowUpdate, RecogniserError> {
        if !self.contains(connection) {
            return Err(RecogniserError::NotInWindow {
                connection,
                base: self.base(),
            });
        }
        if self.bit(connection) {
            return Err(RecogniserError::AlreadySeen { connection });
        }
        let old_base = self.base();
        let old_end = self.end();
        self.bitmap |= 1u32 << (connection - old_base);

        if connection < self.centre {
            return Ok(WindowUpdate::default());
        }
        self.centre = connection + 1;
        let new_base = self.base();
        let shift = new_base - old_base;

        let retired = (0..shift.min(WINDOW_SIZE))
            .filter(|&i| self.bitmap & (1u32 << i) == 0)
            .map(|i| old_base + i)
            .collect();
        self.bitmap = if shift >= WINDOW_SIZE {
            0
        } else {
            self.bitmap >> shift
        };
        let added = (old_end.max(new_base)..self.end()).collect();

        Ok(WindowUpdate { retired, added })
    }

    fn bit(&self, connection: u64) -> bool {
        self.bitmap & (1u32 << (connection - self.base())) != 0
    }
}
