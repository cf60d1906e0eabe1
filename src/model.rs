use std::str::FromStr;

use crate::{error::Error, media::LabelWidth};

/// USB vendor id of Brother Industries.
pub const BROTHER_VENDOR_ID: u16 = 0x04F9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    QL500,
    QL550,
    QL560,
    QL570,
    QL580N,
    QL650TD,
    QL700,
    QL710W,
    QL720NW,
    QL800,
    QL810W,
    QL820NWB,
    QL1050,
    QL1060N,
    QL1100,
    QL1110NWB,
    QL1115NWB,
}

impl Model {
    pub const ALL: [Model; 17] = [
        Self::QL500,
        Self::QL550,
        Self::QL560,
        Self::QL570,
        Self::QL580N,
        Self::QL650TD,
        Self::QL700,
        Self::QL710W,
        Self::QL720NW,
        Self::QL800,
        Self::QL810W,
        Self::QL820NWB,
        Self::QL1050,
        Self::QL1060N,
        Self::QL1100,
        Self::QL1110NWB,
        Self::QL1115NWB,
    ];

    pub fn vid(&self) -> u16 {
        BROTHER_VENDOR_ID
    }

    pub fn pid(&self) -> u16 {
        match self {
            Self::QL500 => 0x2015,
            Self::QL550 => 0x2016,
            Self::QL560 => 0x2027,
            Self::QL570 => 0x2028,
            Self::QL580N => 0x2029,
            Self::QL650TD => 0x201B,
            Self::QL700 => 0x2042,
            Self::QL710W => 0x2043,
            Self::QL720NW => 0x2044,
            Self::QL800 => 0x209b,
            Self::QL810W => 0x209c,
            Self::QL820NWB => 0x209d,
            Self::QL1050 => 0x2020,
            Self::QL1060N => 0x202A,
            Self::QL1100 => 0x20A7,
            Self::QL1110NWB => 0x20A8,
            Self::QL1115NWB => 0x20AB,
        }
    }

    pub fn from_pid(pid: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|model| model.pid() == pid)
    }

    pub fn pins(&self) -> u32 {
        match self {
            Self::QL1050 => crate::WIDE_PRINTER_WIDTH,
            Self::QL1060N => crate::WIDE_PRINTER_WIDTH,
            Self::QL1100 => crate::WIDE_PRINTER_WIDTH,
            Self::QL1110NWB => crate::WIDE_PRINTER_WIDTH,
            Self::QL1115NWB => crate::WIDE_PRINTER_WIDTH,
            _ => crate::NORMAL_PRINTER_WIDTH,
        }
    }

    /// Number of zero bytes sent before `ESC @` to flush the receive buffer.
    pub fn invalidate_len(&self) -> usize {
        match self {
            Self::QL800
            | Self::QL810W
            | Self::QL820NWB
            | Self::QL1100
            | Self::QL1110NWB
            | Self::QL1115NWB => 400,
            _ => crate::command::INVALIDATE_LEN,
        }
    }

    /// A label is supported when it is laid out for this model's print head.
    pub fn supports(&self, label: LabelWidth) -> bool {
        label.head_pins() == self.pins()
    }
}

impl FromStr for Model {
    type Err = Error;

    /// Accepts names such as `QL570`, `ql-570` or `QL-820NWB`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_uppercase();

        Self::ALL
            .iter()
            .copied()
            .find(|model| format!("{:?}", model) == wanted)
            .ok_or_else(|| Error::InvalidConfig(format!("unknown printer model {}", s)))
    }
}
