use super::Exit;

/// Middle C, the origin of console notes.
const CONSOLE_ORIGIN: i32 = 60;
const EXIT_PRESSES: u32 = 5;

/// Chords held while the pedal goes down, as 12 bit pitch class sets, and
/// the transposition they apply.
const CHORD_SHIFTS: &[(u16, i32)] = &[
    (0x122, 2),
    (0x922, 2),
    (0x092, -2),
    (0x292, -2),
    (0x212, -2),
    (0x910, -7),
    (0x914, -7),
    (0x452, 7),
    (0x442, 7),
];

/// Transposition applied by a chord, zero for anything not in the table.
pub fn chord_shift(chord: u16) -> i32 {
    CHORD_SHIFTS
        .iter()
        .find(|(pattern, _)| *pattern == chord)
        .map_or(0, |&(_, delta)| delta)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Normal,
    /// Pedal held: notes select the transposition instead of sounding.
    Console,
}

#[derive(Debug, Default)]
pub struct GestureState {
    mode: Mode,
    shift: i32,
    exit_count: u32,
}

impl GestureState {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_console(&self) -> bool {
        self.mode == Mode::Console
    }

    pub fn shift(&self) -> i32 {
        self.shift
    }

    pub fn set_shift(&mut self, shift: i32) {
        self.shift = shift;
        log::info!("shift = {shift}");
    }

    pub fn exit_count(&self) -> u32 {
        self.exit_count
    }

    /// Pedal moved. `chord` is what was sounding at that moment and only
    /// matters on the way down.
    pub fn pedal(&mut self, down: bool, chord: u16) {
        self.mode = if down { Mode::Console } else { Mode::Normal };
        self.exit_count = 0;
        log::info!("console = {}", u8::from(down));

        if down {
            log::info!("chord = 0x{chord:03x}");
            let delta = chord_shift(chord);
            if delta != 0 {
                self.set_shift(self.shift + delta);
            }
        }
    }

    /// Note-on received while in console mode.
    pub fn console_note(&mut self, note: u8) -> Option<Exit> {
        let relative = i32::from(note) - CONSOLE_ORIGIN;

        match relative {
            -11..=11 => {
                self.set_shift(relative - 4);
                None
            }
            -12 => self.count_exit_press(Exit::Halt),
            -13 => self.count_exit_press(Exit::Quiet),
            _ => None,
        }
    }

    fn count_exit_press(&mut self, exit: Exit) -> Option<Exit> {
        self.exit_count += 1;
        log::debug!("exit count = {}", self.exit_count);
        (self.exit_count >= EXIT_PRESSES).then_some(exit)
    }
}
