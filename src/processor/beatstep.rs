//! Arturia BeatStep pads used as a transposition selector.
//!
//! Pad LEDs are driven with a vendor sysex:
//! `F0 00 20 6B 7F 42 02 00 10 7n cc F7`, `n` being the pad and `cc` the
//! colour.

pub const PAD_COUNT: usize = 16;

const FIRST_PAD_NOTE: u8 = 0x24;

/// Transposition (before the octave drop) selected by each pad.
const PAD_SHIFTS: [Option<i32>; PAD_COUNT] = [
    None,
    None,
    None,
    None,
    Some(-3),
    Some(-8),
    Some(-1),
    Some(-6),
    Some(1),
    Some(-4),
    Some(3),
    Some(-2),
    Some(5),
    Some(0),
    Some(7),
    Some(2),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PadColor {
    Black = 0x00,
    Red = 0x01,
    Green = 0x04,
    Yellow = 0x05,
    Blue = 0x10,
    Magenta = 0x11,
    Cyan = 0x14,
    White = 0x7F,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pad(usize);

impl Pad {
    /// The bottom row (notes 0x24..0x2C) is pads 8..16, the top row
    /// (0x2C..0x34) pads 0..8.
    pub fn from_note(note: u8) -> Option<Self> {
        let key = note.checked_sub(FIRST_PAD_NOTE).map(usize::from)?;
        if key >= PAD_COUNT {
            return None;
        }

        let col = key % 8;
        let row = if key >= 8 { 0 } else { 1 };
        Some(Self(col + row * 8))
    }

    pub fn index(&self) -> usize {
        self.0
    }

    pub fn shift(&self) -> Option<i32> {
        PAD_SHIFTS[self.0]
    }

    pub fn sysex(&self, color: PadColor) -> [u8; 12] {
        [
            0xF0,
            0x00,
            0x20,
            0x6B,
            0x7F,
            0x42,
            0x02,
            0x00,
            0x10,
            0x70 + self.0 as u8,
            color as u8,
            0xF7,
        ]
    }

    pub fn all() -> impl Iterator<Item = Pad> {
        (0..PAD_COUNT).map(Pad)
    }
}

/// Floor modulo, always in `0..d` for positive `d`.
pub fn asym_mod(n: i32, d: i32) -> i32 {
    n.rem_euclid(d)
}

/// The colours currently shown on the pads, `None` until first painted.
#[derive(Debug, Default)]
pub struct PadDisplay {
    colors: [Option<PadColor>; PAD_COUNT],
}

impl PadDisplay {
    /// Repaint every pad but `held`: blue for the pad matching the current
    /// key, black for the rest. Returns the LED messages to send.
    pub fn refresh(&mut self, shift: i32, held: Option<Pad>) -> Vec<[u8; 12]> {
        let key = asym_mod(shift, 12);

        Pad::all()
            .filter(|&pad| Some(pad) != held)
            .map(|pad| {
                let color = if pad.shift() == Some(key) {
                    PadColor::Blue
                } else {
                    PadColor::Black
                };
                self.colors[pad.index()] = Some(color);
                pad.sysex(color)
            })
            .collect()
    }
}
