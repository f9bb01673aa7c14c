//! XBee protocol families and their derivation from version registers.
//!
//! The protocol a module speaks is not directly queryable; it is derived
//! from the hardware version (`HV`, upper byte identifies the board) and
//! the firmware version (`VR`, whose leading nibble selects the firmware
//! family flashed onto multi-protocol boards). The table below is
//! deliberately declarative: one row per hardware range, one rule per
//! firmware family.

/// Protocol family an XBee module speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XbeeProtocol {
    /// ZigBee (S2 hardware families).
    ZigBee,
    /// Raw 802.15.4 (S1 hardware, or S2C with 802.15.4 firmware).
    Raw802Dot15Dot4,
    /// DigiMesh.
    DigiMesh,
    /// DigiMesh on XTend hardware.
    XTendDigiMesh,
    /// XTend point-to-multipoint.
    XTend,
    /// Smart Energy profile.
    SmartEnergy,
    /// Point-to-multipoint (Digi Point / XLR).
    DigiPoint,
    /// ZNet 2.5 (pre-ZigBee S2 firmware).
    ZNet,
    /// XBee Wi-Fi.
    WiFi,
    /// XBee Cellular.
    Cellular,
    /// Protocol could not be derived.
    Unknown,
}

impl XbeeProtocol {
    /// Whether modules of this protocol carry a 16-bit network address
    /// (`MY` register).
    ///
    /// DigiMesh and point-to-multipoint networks route purely on 64-bit
    /// addresses.
    #[must_use]
    pub fn supports_16bit_addressing(self) -> bool {
        matches!(
            self,
            Self::ZigBee | Self::Raw802Dot15Dot4 | Self::XTend | Self::SmartEnergy | Self::ZNet
        )
    }

    /// Derive the protocol from the `HV` and `VR` registers.
    ///
    /// `firmware` is the `VR` value with leading zero bytes stripped, as
    /// [`read_device_info`](crate::device::XbeeDevice::read_device_info)
    /// stores it.
    #[must_use]
    pub fn determine(hardware_version: u16, firmware: &[u8]) -> Self {
        let board = (hardware_version >> 8) as u8;
        let family = firmware.first().map_or(0, |b| b >> 4);

        match board {
            // S1 hardware: 802.15.4, or DigiMesh with 0x8xxx firmware.
            0x17 | 0x18 => match family {
                0x8 => Self::DigiMesh,
                _ => Self::Raw802Dot15Dot4,
            },
            // S2 / S2B hardware: ZNet shipped 0x1xxx, ZigBee 0x2xxx+,
            // Smart Energy 0x3xxx.
            0x19 | 0x1A | 0x1E => match family {
                0x1 => Self::ZNet,
                0x3 => Self::SmartEnergy,
                _ => Self::ZigBee,
            },
            // S2C hardware is multi-protocol: the firmware family is the
            // only discriminator.
            0x21 | 0x22 => match family {
                0x2 => Self::Raw802Dot15Dot4,
                0x3 => Self::SmartEnergy,
                0x9 => Self::DigiMesh,
                _ => Self::ZigBee,
            },
            // XTend boards.
            0x1B => match family {
                0x8 => Self::XTendDigiMesh,
                _ => Self::XTend,
            },
            // 900HP / XSC point or mesh.
            0x23 => match family {
                0x8 => Self::DigiMesh,
                _ => Self::DigiPoint,
            },
            // XLR point-to-multipoint.
            0x24 => Self::DigiPoint,
            // Wi-Fi (S6 / S6B).
            0x1F | 0x27 => Self::WiFi,
            // Cellular family.
            0x40..=0x4F => Self::Cellular,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for XbeeProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ZigBee => "ZigBee",
            Self::Raw802Dot15Dot4 => "802.15.4",
            Self::DigiMesh => "DigiMesh",
            Self::XTendDigiMesh => "XTend DigiMesh",
            Self::XTend => "XTend",
            Self::SmartEnergy => "Smart Energy",
            Self::DigiPoint => "Point-to-Multipoint",
            Self::ZNet => "ZNet 2.5",
            Self::WiFi => "Wi-Fi",
            Self::Cellular => "Cellular",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}
