const NOTE_COUNT: usize = 128;

/// Notes as the synthesizer behind the output sees them.
///
/// Both tables are indexed by the untransposed note: `velocity` is what was
/// forwarded at note-on (zero while the note is off), `pitch` is the
/// transposed note that was actually sent. `pitch[n]` is meaningless while
/// `velocity[n]` is zero.
pub struct ForwardState {
    velocity: [u8; NOTE_COUNT],
    pitch: [u8; NOTE_COUNT],
}

impl Default for ForwardState {
    fn default() -> Self {
        Self {
            velocity: [0; NOTE_COUNT],
            pitch: [0; NOTE_COUNT],
        }
    }
}

impl ForwardState {
    pub fn is_sounding(&self, note: u8) -> bool {
        self.velocity
            .get(usize::from(note))
            .is_some_and(|&velocity| velocity != 0)
    }

    /// Records a note-on transposed by `shift` and returns the pitch to
    /// send, or `None` when the result falls outside `0..=127`.
    pub fn note_on(&mut self, note: u8, velocity: u8, shift: i32) -> Option<u8> {
        let index = usize::from(note);
        if index >= NOTE_COUNT {
            return None;
        }

        let pitch = u8::try_from(i32::from(note) + shift)
            .ok()
            .filter(|&pitch| usize::from(pitch) < NOTE_COUNT)?;

        if self.velocity[index] != 0 {
            log::warn!("unexpected note on message (note {note})");
        }

        self.velocity[index] = velocity;
        self.pitch[index] = pitch;
        Some(pitch)
    }

    /// Releases `note` and returns the pitch it was sounding at, or `None`
    /// if nothing was forwarded for it.
    pub fn note_off(&mut self, note: u8) -> Option<u8> {
        let index = usize::from(note);
        match self.velocity.get_mut(index) {
            Some(velocity) if *velocity != 0 => {
                *velocity = 0;
                Some(self.pitch[index])
            }
            _ => None,
        }
    }

    /// 12 bit pitch class set of every sounding note, bit `n % 12` per note.
    pub fn chord(&self) -> u16 {
        self.velocity
            .iter()
            .enumerate()
            .filter(|&(_, &velocity)| velocity != 0)
            .fold(0, |chord, (note, _)| chord | 1 << (note % 12))
    }
}
