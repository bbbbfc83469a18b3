use std::fmt;

/// A time signature, `num_beats` notes of value `1/note_value` per bar.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Signature {
  num_beats: u8,  // numerator
  note_value: u8, // denominator
}

impl Signature {
  pub fn new(num_beats: u8, note_value: u8) -> Signature {
    assert!(num_beats > 0);
    assert!(note_value > 0 && note_value <= 16);
    Signature {
      num_beats,
      note_value,
    }
  }

  /// Same as `new` but rejecting invalid values instead of panicking.
  pub fn try_new(num_beats: u8, note_value: u8) -> Option<Signature> {
    if num_beats > 0 && note_value > 0 && note_value <= 16 {
      Some(Signature {
        num_beats,
        note_value,
      })
    } else {
      None
    }
  }

  pub fn get_num_beats(&self) -> u8 {
    self.num_beats
  }

  pub fn get_note_value(&self) -> u8 {
    self.note_value
  }

  /// Length of a bar measured in quarter notes (4/4 -> 4, 6/8 -> 3, 7/8 -> 3.5).
  pub fn quarters_per_bar(&self) -> f64 {
    f64::from(self.num_beats) * 4.0 / f64::from(self.note_value)
  }
}

impl Default for Signature {
  fn default() -> Signature {
    Signature::new(4, 4)
  }
}

impl fmt::Display for Signature {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}/{}", self.num_beats, self.note_value)
  }
}

#[cfg(test)]
mod test {

  use super::Signature;

  #[test]
  pub fn signature_new() {
    let signature = Signature::new(3, 4);
    assert_eq!(signature.get_num_beats(), 3);
    assert_eq!(signature.get_note_value(), 4);
  }

  #[test]
  pub fn signature_try_new() {
    assert_eq!(Signature::try_new(6, 8), Some(Signature::new(6, 8)));
    assert_eq!(Signature::try_new(0, 4), None);
    assert_eq!(Signature::try_new(4, 32), None);
  }

  #[test]
  pub fn signature_quarters_per_bar() {
    assert_eq!(Signature::new(4, 4).quarters_per_bar(), 4.0);
    assert_eq!(Signature::new(6, 8).quarters_per_bar(), 3.0);
    assert_eq!(Signature::new(7, 8).quarters_per_bar(), 3.5);
  }

  #[test]
  pub fn signature_display() {
    assert_eq!(Signature::new(6, 8).to_string(), "6/8");
  }
}
