use std::fmt;

/// Hardware classes reported in the first PONG payload byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Monitor,
    Utility,
    PirSensor,
    IrSensor,
    OpticalSensor,
    SonarSensor,
    Button,
    Switch,
    Winch,
    LightController,
    Unknown(u8),
}

impl DeviceType {
    pub fn from_wire(v: u8) -> Self {
        match v {
            1 => DeviceType::Monitor,
            2 => DeviceType::Utility,
            10 => DeviceType::PirSensor,
            11 => DeviceType::IrSensor,
            12 => DeviceType::OpticalSensor,
            20 => DeviceType::SonarSensor,
            40 => DeviceType::Button,
            110 => DeviceType::Switch,
            112 => DeviceType::Winch,
            113 => DeviceType::LightController,
            other => DeviceType::Unknown(other),
        }
    }

    pub fn as_wire(self) -> u8 {
        match self {
            DeviceType::Monitor => 1,
            DeviceType::Utility => 2,
            DeviceType::PirSensor => 10,
            DeviceType::IrSensor => 11,
            DeviceType::OpticalSensor => 12,
            DeviceType::SonarSensor => 20,
            DeviceType::Button => 40,
            DeviceType::Switch => 110,
            DeviceType::Winch => 112,
            DeviceType::LightController => 113,
            DeviceType::Unknown(other) => other,
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::Monitor => f.write_str("Monitor"),
            DeviceType::Utility => f.write_str("Utility"),
            DeviceType::PirSensor => f.write_str("PIR Sensor"),
            DeviceType::IrSensor => f.write_str("Infrared Sensor"),
            DeviceType::OpticalSensor => f.write_str("Optical Sensor"),
            DeviceType::SonarSensor => f.write_str("Sonar Sensor"),
            DeviceType::Button => f.write_str("Button"),
            DeviceType::Switch => f.write_str("Switch"),
            DeviceType::Winch => f.write_str("Motorised Winch"),
            DeviceType::LightController => f.write_str("Light Controller"),
            DeviceType::Unknown(v) => write!(f, "Unknown ({v})"),
        }
    }
}

/// Health state reported in the second PONG payload byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Ok,
    Active,
    MinorFault,
    MajorFault,
    Critical,
    Unknown(u8),
}

impl DeviceState {
    pub fn from_wire(v: u8) -> Self {
        match v {
            0 => DeviceState::Ok,
            1 => DeviceState::Active,
            10 => DeviceState::MinorFault,
            11 => DeviceState::MajorFault,
            12 => DeviceState::Critical,
            other => DeviceState::Unknown(other),
        }
    }

    pub fn as_wire(self) -> u8 {
        match self {
            DeviceState::Ok => 0,
            DeviceState::Active => 1,
            DeviceState::MinorFault => 10,
            DeviceState::MajorFault => 11,
            DeviceState::Critical => 12,
            DeviceState::Unknown(other) => other,
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceState::Ok => f.write_str("OK"),
            DeviceState::Active => f.write_str("ACTIVE"),
            DeviceState::MinorFault => f.write_str("MINOR FAULT"),
            DeviceState::MajorFault => f.write_str("MAJOR FAULT"),
            DeviceState::Critical => f.write_str("CRITICAL"),
            DeviceState::Unknown(_) => f.write_str("UNKNOWN STATE"),
        }
    }
}
