//! Packed cell byte: bit 0 is the alive flag, bits 1..=7 hold the live
//! neighbour count times two.

pub const ALIVE: u8 = 0x01;
/// One live neighbour, as seen by the count field.
pub const NEIGHBOR_STEP: u8 = 0x02;

#[inline(always)]
pub const fn is_alive(cell: u8) -> bool {
    cell & ALIVE != 0
}

#[inline(always)]
pub const fn neighbor_count(cell: u8) -> u8 {
    cell >> 1
}

/// Packs a state and count the same way incremental toggles would leave it.
#[inline]
pub const fn encode(alive: bool, neighbors: u8) -> u8 {
    (neighbors << 1) | alive as u8
}

/// A state change decided for one cell during a generation scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Birth,
    Death,
}

impl Transition {
    /// Wrapping delta applied to each of the eight neighbour bytes.
    #[inline(always)]
    pub const fn neighbor_delta(self) -> u8 {
        match self {
            Transition::Birth => NEIGHBOR_STEP,
            Transition::Death => NEIGHBOR_STEP.wrapping_neg(),
        }
    }
}

/// B3/S23 on a packed byte. Zero bytes never change and are reported as `None`
/// without decoding, which is what lets the scan skip empty stretches.
#[inline(always)]
pub const fn transition(cell: u8) -> Option<Transition> {
    if cell == 0 {
        return None;
    }
    let count = neighbor_count(cell);
    if is_alive(cell) {
        if count != 2 && count != 3 {
            return Some(Transition::Death);
        }
    } else if count == 3 {
        return Some(Transition::Birth);
    }
    None
}
