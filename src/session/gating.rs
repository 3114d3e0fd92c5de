//! Compile-time feature gate table (spec.md §4.3).

use crate::error::JensenError;
use crate::model::Model;
use crate::protocol::constants::*;

/// Named features a command can be gated behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Settings,
    FactoryReset,
    StorageOps,
    BluetoothAudioPrompt,
    RestoreFactorySettings,
    BluetoothFamily,
}

impl Feature {
    fn name(self) -> &'static str {
        match self {
            Feature::Settings => "settings",
            Feature::FactoryReset => "factory_reset",
            Feature::StorageOps => "storage_ops",
            Feature::BluetoothAudioPrompt => "bluetooth_audio_prompt",
            Feature::RestoreFactorySettings => "restore_factory_settings",
            Feature::BluetoothFamily => "bluetooth_family",
        }
    }

    /// Minimum firmware version required for `model`, or `None` if the
    /// feature is unconditionally available (or unconditionally absent) on
    /// that model.
    fn min_firmware(self, model: Model) -> Option<u32> {
        match (self, model) {
            (Feature::Settings, Model::H1) => Some(FW_SETTINGS_H1),
            (Feature::Settings, Model::H1E) => Some(FW_SETTINGS_H1E),
            (Feature::Settings, Model::P1) => None, // always available

            (Feature::FactoryReset, Model::H1) => Some(FW_FACTORY_RESET_H1),
            (Feature::FactoryReset, Model::H1E) => Some(FW_FACTORY_RESET_H1E),
            (Feature::FactoryReset, Model::P1) => None,

            (Feature::StorageOps, Model::H1) => Some(FW_STORAGE_OPS_H1),
            (Feature::StorageOps, Model::H1E) => Some(FW_STORAGE_OPS_H1E),
            (Feature::StorageOps, Model::P1) => None,

            (Feature::BluetoothAudioPrompt, Model::H1) => Some(FW_BLUETOOTH_AUDIO_PROMPT_H1),
            (Feature::BluetoothAudioPrompt, Model::H1E) => Some(FW_BLUETOOTH_AUDIO_PROMPT_H1E),
            (Feature::BluetoothAudioPrompt, Model::P1) => None,

            (Feature::RestoreFactorySettings, Model::H1) => {
                Some(FW_RESTORE_FACTORY_SETTINGS_H1)
            }
            (Feature::RestoreFactorySettings, Model::H1E) => {
                Some(FW_RESTORE_FACTORY_SETTINGS_H1E)
            }
            (Feature::RestoreFactorySettings, Model::P1) => None,

            // Bluetooth family is only ever exposed at all on P1.
            (Feature::BluetoothFamily, Model::P1) => None,
            (Feature::BluetoothFamily, _) => Some(u32::MAX),
        }
    }
}

/// Check whether `feature` is usable on `model` at `firmware`. Returns an
/// error describing the gap rather than panicking, so callers can surface
/// `NotSupported` to collaborators without issuing any transport bytes.
pub fn check(feature: Feature, model: Model, firmware: u32) -> Result<(), JensenError> {
    match feature.min_firmware(model) {
        None => Ok(()),
        Some(min) if firmware >= min => Ok(()),
        Some(_) => Err(JensenError::NotSupported {
            feature: feature.name(),
            model,
            firmware,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_gated_below_threshold() {
        assert!(check(Feature::Settings, Model::H1, 327713).is_err());
        assert!(check(Feature::Settings, Model::H1, 327714).is_ok());
    }

    #[test]
    fn bluetooth_family_only_on_p1() {
        assert!(check(Feature::BluetoothFamily, Model::H1, u32::MAX).is_err());
        assert!(check(Feature::BluetoothFamily, Model::H1E, u32::MAX).is_err());
        assert!(check(Feature::BluetoothFamily, Model::P1, 0).is_ok());
    }

    #[test]
    fn h1e_bluetooth_prompt_threshold_differs_from_h1() {
        assert!(check(Feature::BluetoothAudioPrompt, Model::H1, 327940).is_ok());
        assert!(check(Feature::BluetoothAudioPrompt, Model::H1E, 327940).is_err());
        assert!(check(Feature::BluetoothAudioPrompt, Model::H1E, 393476).is_ok());
    }
}
