//! Controller button bitmask.
//!
//! One byte per input channel, one bit per button, in the layout the
//! simulated hardware reads from its controller shift register.

use bitflags::bitflags;

use crate::error::BridgeError;

bitflags! {
    /// The eight buttons of a controller channel.
    ///
    /// All eight bits are named, so every `u8` is a valid `Buttons`
    /// value and complement stays within the byte.
    ///
    /// # Examples
    ///
    /// ```
    /// use tickgate_core::Buttons;
    ///
    /// let held = Buttons::A | Buttons::RIGHT;
    /// assert_eq!(held.bits(), 0x81);
    /// assert_eq!(!Buttons::empty(), Buttons::all());
    /// ```
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Buttons: u8 {
        /// The A button.
        const A = 0x01;
        /// The B button.
        const B = 0x02;
        /// The Select button.
        const SELECT = 0x04;
        /// The Start button.
        const START = 0x08;
        /// D-pad up.
        const UP = 0x10;
        /// D-pad down.
        const DOWN = 0x20;
        /// D-pad left.
        const LEFT = 0x40;
        /// D-pad right.
        const RIGHT = 0x80;
    }
}

const NAMES: [(&str, Buttons); 8] = [
    ("A", Buttons::A),
    ("B", Buttons::B),
    ("Select", Buttons::SELECT),
    ("Start", Buttons::START),
    ("Up", Buttons::UP),
    ("Down", Buttons::DOWN),
    ("Left", Buttons::LEFT),
    ("Right", Buttons::RIGHT),
];

impl Buttons {
    /// Look up a single button by name, case-insensitively.
    pub fn from_button_name(name: &str) -> Option<Buttons> {
        let name = name.trim();
        NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|&(_, b)| b)
    }

    /// Combine a list of button names into a mask.
    ///
    /// Returns [`BridgeError::InvalidArgument`] naming the first unknown
    /// button. An empty list yields the empty mask.
    pub fn from_names<'a, I>(names: I) -> Result<Buttons, BridgeError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names.into_iter().try_fold(Buttons::empty(), |acc, name| {
            Self::from_button_name(name)
                .map(|b| acc | b)
                .ok_or_else(|| BridgeError::invalid(format!("unknown button '{name}'")))
        })
    }

    /// Names of the buttons in this mask, in bit order.
    pub fn names(self) -> Vec<&'static str> {
        NAMES
            .iter()
            .filter(|(_, b)| self.contains(*b))
            .map(|&(n, _)| n)
            .collect()
    }
}
