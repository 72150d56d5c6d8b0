use chrono::{DateTime, Utc};
use evdev::Key;
use tracing::{debug, trace};

use crate::controller::raw_event::RawEventRecord;

// Logical buttons of a DualShock-style pad
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonName {
    Triangle,
    Cross,
    Square,
    Circle,
    L1,
    R1,
    L2,
    R2,
    L3,
    R3,
    Share,
    Options,
    Ps,
}

// Fixed code table, the only source of truth for code <-> name
const BUTTON_CODES: [(Key, ButtonName); 13] = [
    (Key::BTN_NORTH, ButtonName::Triangle),
    (Key::BTN_SOUTH, ButtonName::Cross),
    (Key::BTN_WEST, ButtonName::Square),
    (Key::BTN_EAST, ButtonName::Circle),
    (Key::BTN_TL, ButtonName::L1),
    (Key::BTN_TR, ButtonName::R1),
    (Key::BTN_TL2, ButtonName::L2),
    (Key::BTN_TR2, ButtonName::R2),
    (Key::BTN_THUMBL, ButtonName::L3),
    (Key::BTN_THUMBR, ButtonName::R3),
    (Key::BTN_SELECT, ButtonName::Share),
    (Key::BTN_START, ButtonName::Options),
    (Key::BTN_MODE, ButtonName::Ps),
];

impl ButtonName {
    pub const ALL: [ButtonName; 13] = [
        ButtonName::Triangle,
        ButtonName::Cross,
        ButtonName::Square,
        ButtonName::Circle,
        ButtonName::L1,
        ButtonName::R1,
        ButtonName::L2,
        ButtonName::R2,
        ButtonName::L3,
        ButtonName::R3,
        ButtonName::Share,
        ButtonName::Options,
        ButtonName::Ps,
    ];

    pub fn from_code(code: u16) -> Option<Self> {
        BUTTON_CODES
            .iter()
            .find(|(key, _)| key.code() == code)
            .map(|(_, name)| *name)
    }

    pub fn code(self) -> u16 {
        BUTTON_CODES
            .iter()
            .find(|(_, name)| *name == self)
            .map(|(key, _)| key.code())
            .unwrap_or_default()
    }

    /// PlayStation label printed on the pad
    pub fn label(self) -> &'static str {
        match self {
            ButtonName::Triangle => "Triangle",
            ButtonName::Cross => "Cross",
            ButtonName::Square => "Square",
            ButtonName::Circle => "Circle",
            ButtonName::L1 => "L1",
            ButtonName::R1 => "R1",
            ButtonName::L2 => "L2",
            ButtonName::R2 => "R2",
            ButtonName::L3 => "L3",
            ButtonName::R3 => "R3",
            ButtonName::Share => "Share",
            ButtonName::Options => "Options",
            ButtonName::Ps => "PS",
        }
    }

    /// Position-based evdev label
    pub fn generic_label(self) -> &'static str {
        match self {
            ButtonName::Triangle => "North",
            ButtonName::Cross => "South",
            ButtonName::Square => "West",
            ButtonName::Circle => "East",
            ButtonName::L1 => "LeftShoulder",
            ButtonName::R1 => "RightShoulder",
            ButtonName::L2 => "LeftTrigger",
            ButtonName::R2 => "RightTrigger",
            ButtonName::L3 => "LeftStick",
            ButtonName::R3 => "RightStick",
            ButtonName::Share => "Select",
            ButtonName::Options => "Start",
            ButtonName::Ps => "Mode",
        }
    }
}

// Button edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Pressed,
    Released,
}

impl Edge {
    /// 0 is release, 1 is press. Auto-repeat (2) and anything else has no edge.
    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(Edge::Released),
            1 => Some(Edge::Pressed),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Edge::Pressed => "PRESSED",
            Edge::Released => "RELEASED",
        }
    }
}

/// One press or release of a known button, emitted once per edge.
#[derive(Debug, Clone, PartialEq)]
pub struct ButtonEvent {
    pub button: ButtonName,
    pub edge: Edge,
    pub raw_code: u16,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Turns a raw record into a button event.
///
/// Returns `None` for non-key records, for values other than press/release and
/// for codes outside the button table. Unknown codes are only noted at debug level.
pub fn decode(record: &RawEventRecord) -> Option<ButtonEvent> {
    if !record.is_key() {
        trace!(
            "Ignoring non-key record type={} code={}",
            record.event_type,
            record.code
        );
        return None;
    }

    let Some(edge) = Edge::from_value(record.value) else {
        trace!("Ignoring key value {} for code {}", record.value, record.code);
        return None;
    };

    let Some(button) = ButtonName::from_code(record.code) else {
        debug!("Unhandled key code: {}", record.code);
        return None;
    };

    Some(ButtonEvent {
        button,
        edge,
        raw_code: record.code,
        timestamp: record.timestamp(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn south_press_and_release_map_to_cross() {
        let pressed = decode(&RawEventRecord::key(Key::BTN_SOUTH.code(), 1)).unwrap();
        assert_eq!(pressed.button, ButtonName::Cross);
        assert_eq!(pressed.edge, Edge::Pressed);
        assert_eq!(pressed.raw_code, Key::BTN_SOUTH.code());

        let released = decode(&RawEventRecord::key(Key::BTN_SOUTH.code(), 0)).unwrap();
        assert_eq!(released.button, ButtonName::Cross);
        assert_eq!(released.edge, Edge::Released);
    }

    #[test]
    fn auto_repeat_emits_nothing() {
        assert!(decode(&RawEventRecord::key(Key::BTN_SOUTH.code(), 2)).is_none());
        assert!(decode(&RawEventRecord::key(Key::BTN_SOUTH.code(), -1)).is_none());
    }

    #[test]
    fn unknown_codes_emit_nothing() {
        assert!(decode(&RawEventRecord::key(9999, 1)).is_none());
        assert!(decode(&RawEventRecord::key(Key::KEY_A.code(), 1)).is_none());
    }

    #[test]
    fn non_key_records_emit_nothing() {
        let mut record = RawEventRecord::key(Key::BTN_SOUTH.code(), 1);
        record.event_type = evdev::EventType::SYNCHRONIZATION.0;
        assert!(decode(&record).is_none());
    }

    #[test]
    fn code_table_is_a_bijection() {
        let codes: HashSet<u16> = ButtonName::ALL.iter().map(|b| b.code()).collect();
        assert_eq!(codes.len(), 13);

        for button in ButtonName::ALL {
            assert_eq!(ButtonName::from_code(button.code()), Some(button));
        }
    }

    #[test]
    fn labels_follow_the_pad() {
        assert_eq!(ButtonName::from_code(Key::BTN_MODE.code()).unwrap().label(), "PS");
        assert_eq!(ButtonName::from_code(Key::BTN_SELECT.code()).unwrap().label(), "Share");
        assert_eq!(ButtonName::Triangle.generic_label(), "North");
        assert_eq!(Edge::Released.label(), "RELEASED");
    }
}
