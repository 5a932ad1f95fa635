/// Sensor classes sharing the wire framing, keyed by the device code byte.
///
/// The table mirrors the vendor's device family; only the respiration belt
/// (`0xCC`) is driven by this crate, but telemetry from any family member
/// decodes the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    BloodPressure,
    Gastrointestinal,
    SkinTemperature,
    SkinResistance,
    Emg,
    SpO2,
    HeartRate,
    BodyTemperature,
    Pulse,
    InfraredPulse,
    Respiration,
    BloodPressureAlt,
    Ecg,
    Phonocardiogram,
}

impl DeviceKind {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0xC0 => Some(Self::BloodPressure),
            0xC3 => Some(Self::Gastrointestinal),
            0xC4 => Some(Self::SkinTemperature),
            0xC5 => Some(Self::SkinResistance),
            0xC6 => Some(Self::Emg),
            0xC7 => Some(Self::SpO2),
            0xC8 => Some(Self::HeartRate),
            0xC9 => Some(Self::BodyTemperature),
            0xCA => Some(Self::Pulse),
            0xCB => Some(Self::InfraredPulse),
            0xCC => Some(Self::Respiration),
            0xCD => Some(Self::BloodPressureAlt),
            0xCE => Some(Self::Ecg),
            0xB1 => Some(Self::Phonocardiogram),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::BloodPressure => 0xC0,
            Self::Gastrointestinal => 0xC3,
            Self::SkinTemperature => 0xC4,
            Self::SkinResistance => 0xC5,
            Self::Emg => 0xC6,
            Self::SpO2 => 0xC7,
            Self::HeartRate => 0xC8,
            Self::BodyTemperature => 0xC9,
            Self::Pulse => 0xCA,
            Self::InfraredPulse => 0xCB,
            Self::Respiration => 0xCC,
            Self::BloodPressureAlt => 0xCD,
            Self::Ecg => 0xCE,
            Self::Phonocardiogram => 0xB1,
        }
    }

    /// Human-readable sensor class.
    pub fn label(self) -> &'static str {
        match self {
            Self::BloodPressure => "blood pressure",
            Self::Gastrointestinal => "gastrointestinal",
            Self::SkinTemperature => "skin temperature",
            Self::SkinResistance => "skin resistance",
            Self::Emg => "EMG",
            Self::SpO2 => "SpO2",
            Self::HeartRate => "heart rate",
            Self::BodyTemperature => "body temperature",
            Self::Pulse => "pulse",
            Self::InfraredPulse => "infrared pulse",
            Self::Respiration => "respiration",
            Self::BloodPressureAlt => "blood pressure (alt)",
            Self::Ecg => "ECG",
            Self::Phonocardiogram => "phonocardiogram",
        }
    }

    /// Vendor model designation for the sensor.
    pub fn model(self) -> &'static str {
        match self {
            Self::BloodPressure => "HKB-08B V2.0",
            Self::Gastrointestinal => "HKV-15/2D",
            Self::SkinTemperature => "HKT-09B",
            Self::SkinResistance => "HKR-11C",
            Self::Emg => "HKJ-15C",
            Self::SpO2 => "HKS-12C",
            Self::HeartRate => "HKX-08C",
            Self::BodyTemperature => "HKT-09A",
            Self::Pulse => "HK-2000C",
            Self::InfraredPulse => "HKG-07C",
            Self::Respiration => "HKH-11C",
            Self::BloodPressureAlt => "HKB-08B",
            Self::Ecg => "HKD-10C",
            Self::Phonocardiogram => "HKY-06C",
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.label(), self.model())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_roundtrip() {
        for code in 0x00..=0xFF {
            if let Some(kind) = DeviceKind::from_code(code) {
                assert_eq!(kind.code(), code);
            }
        }
    }

    #[test]
    fn test_respiration_belt_lookup() {
        let kind = DeviceKind::from_code(0xCC).unwrap();
        assert_eq!(kind, DeviceKind::Respiration);
        assert_eq!(kind.model(), "HKH-11C");
    }

    #[test]
    fn test_unknown_code() {
        assert_eq!(DeviceKind::from_code(0x00), None);
        assert_eq!(DeviceKind::from_code(0xB0), None);
    }
}
