//! Stored settings and their merge semantics.

use serde::{Deserialize, Serialize};

/// Persisted recorder settings.
///
/// Loaded with defaults merged in, so a store that has never been written
/// still yields a usable value. Saves go through [`SettingsPatch`]: a partial
/// update is merged field-by-field over the stored values, never a wholesale
/// replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Host of the device-control endpoint.
    pub control_host: String,

    /// TCP port of the device-control endpoint.
    pub control_port: u16,

    /// Device-selection port number carried inside tune commands, selecting
    /// which receiver of the remote rig to drive.
    pub rig_port: u32,

    /// Identifier of the capture device; recording fails without one.
    pub capture_device: Option<String>,

    /// Human-readable label of the capture device.
    pub capture_device_label: Option<String>,

    /// Output filename template. Placeholders: `{date}`, `{time}`, `{freq}`,
    /// `{mode}`.
    pub filename_template: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            control_host: "127.0.0.1".to_string(),
            control_port: 14_290,
            rig_port: 1,
            capture_device: None,
            capture_device_label: None,
            filename_template: "{date}_{time}_{freq}_{mode}".to_string(),
        }
    }
}

impl Settings {
    /// Socket address string of the control endpoint.
    pub fn control_endpoint(&self) -> String {
        format!("{}:{}", self.control_host, self.control_port)
    }

    /// Merge a partial update over these settings.
    pub fn merged(&self, patch: SettingsPatch) -> Settings {
        Settings {
            control_host: patch.control_host.unwrap_or_else(|| self.control_host.clone()),
            control_port: patch.control_port.unwrap_or(self.control_port),
            rig_port: patch.rig_port.unwrap_or(self.rig_port),
            capture_device: match patch.capture_device {
                Some(device) => device,
                None => self.capture_device.clone(),
            },
            capture_device_label: match patch.capture_device_label {
                Some(label) => label,
                None => self.capture_device_label.clone(),
            },
            filename_template: patch
                .filename_template
                .unwrap_or_else(|| self.filename_template.clone()),
        }
    }
}

/// Partial settings update.
///
/// `None` leaves the stored field untouched. The capture-device fields are
/// doubly optional so a patch can explicitly clear them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SettingsPatch {
    pub control_host: Option<String>,
    pub control_port: Option<u16>,
    pub rig_port: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_device: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_device_label: Option<Option<String>>,
    pub filename_template: Option<String>,
}
