//! Device commands
//!
//! Each device accepts a fixed set of command names. A name outside the set
//! is rejected before any external program runs.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("400: Bad {device} command: {name}")]
    BadCommand { device: &'static str, name: String },
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    /// `output` holds whatever the program printed before failing
    #[error("{command} failed: {reason}")]
    CommandFailed {
        command: &'static str,
        output: String,
        reason: String,
    },
}

impl ExecutorError {
    /// Partial output captured before the failure
    pub fn output(&self) -> &str {
        match self {
            ExecutorError::CommandFailed { output, .. } => output,
        }
    }
}

/// Controlled hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    /// TV driven over HDMI-CEC
    Tv,
    /// Laptop woken over the LAN
    Toshiba,
}

impl Device {
    pub fn name(&self) -> &'static str {
        match self {
            Device::Tv => "tv",
            Device::Toshiba => "toshiba",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    PowerStatus,
    PowerOn,
    PowerOff,
    Hdmi1,
    Hdmi2,
    Hdmi4,
    VolumeUp,
    VolumeDown,
    WakeOnLan,
}

impl DeviceCommand {
    /// Map a command name from the URL onto the device's command set
    pub fn parse(device: Device, name: &str) -> Result<Self, CommandError> {
        let command = match (device, name) {
            (Device::Tv, "powerstatus") => DeviceCommand::PowerStatus,
            (Device::Tv, "poweron") => DeviceCommand::PowerOn,
            (Device::Tv, "poweroff") => DeviceCommand::PowerOff,
            (Device::Tv, "hdmi1") => DeviceCommand::Hdmi1,
            (Device::Tv, "hdmi2") => DeviceCommand::Hdmi2,
            (Device::Tv, "hdmi4") => DeviceCommand::Hdmi4,
            (Device::Tv, "volumeup") => DeviceCommand::VolumeUp,
            (Device::Tv, "volumedown") => DeviceCommand::VolumeDown,
            (Device::Toshiba, "wol") => DeviceCommand::WakeOnLan,
            _ => {
                return Err(CommandError::BadCommand {
                    device: device.name(),
                    name: name.to_string(),
                });
            }
        };
        Ok(command)
    }

    pub fn device(&self) -> Device {
        match self {
            DeviceCommand::WakeOnLan => Device::Toshiba,
            _ => Device::Tv,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DeviceCommand::PowerStatus => "powerstatus",
            DeviceCommand::PowerOn => "poweron",
            DeviceCommand::PowerOff => "poweroff",
            DeviceCommand::Hdmi1 => "hdmi1",
            DeviceCommand::Hdmi2 => "hdmi2",
            DeviceCommand::Hdmi4 => "hdmi4",
            DeviceCommand::VolumeUp => "volumeup",
            DeviceCommand::VolumeDown => "volumedown",
            DeviceCommand::WakeOnLan => "wol",
        }
    }

    /// Line written to `cec-client` stdin; `None` for non-CEC commands.
    /// Raw `tx` frames decode at cec-o-matic.com.
    pub fn cec_line(&self) -> Option<&'static str> {
        match self {
            DeviceCommand::PowerStatus => Some("pow 0"),
            DeviceCommand::PowerOn => Some("on 0"),
            DeviceCommand::PowerOff => Some("standby 0"),
            DeviceCommand::Hdmi1 => Some("tx 4F:82:10:00"),
            DeviceCommand::Hdmi2 => Some("tx 4F:82:20:00"),
            DeviceCommand::Hdmi4 => Some("tx 4F:82:40:00"),
            DeviceCommand::VolumeUp => Some("tx 4F:44:41"),
            DeviceCommand::VolumeDown => Some("tx 4F:44:42"),
            DeviceCommand::WakeOnLan => None,
        }
    }

    /// Every command, in menu order
    pub fn all() -> &'static [DeviceCommand] {
        &[
            DeviceCommand::PowerStatus,
            DeviceCommand::PowerOn,
            DeviceCommand::PowerOff,
            DeviceCommand::Hdmi1,
            DeviceCommand::Hdmi2,
            DeviceCommand::Hdmi4,
            DeviceCommand::VolumeUp,
            DeviceCommand::VolumeDown,
            DeviceCommand::WakeOnLan,
        ]
    }
}

/// Runs device commands. Implementations may be slow or fail; callers must
/// not hold shared locks across `execute`.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: DeviceCommand) -> Result<String, ExecutorError>;
}
