//! Découverte des périphériques système
//!
//! `CpalDevices` est la fabrique utilisée en production : micro et
//! haut-parleurs par défaut de l'host cpal.

use cpal::traits::{DeviceTrait, HostTrait};
use tokio::sync::mpsc;

use crate::{
    AudioCapture, AudioConfig, AudioResult, AudioSink, CpalCapture, CpalOutput, DeviceProvider,
    OutputEvent,
};

/// Fabrique de périphériques cpal
#[derive(Clone, Copy, Debug, Default)]
pub struct CpalDevices;

impl DeviceProvider for CpalDevices {
    fn open_capture(&self, config: &AudioConfig) -> AudioResult<Box<dyn AudioCapture>> {
        Ok(Box::new(CpalCapture::new(config.clone())?))
    }

    fn open_output(
        &self,
        config: &AudioConfig,
        events: mpsc::UnboundedSender<OutputEvent>,
    ) -> AudioResult<Box<dyn AudioSink>> {
        Ok(Box::new(CpalOutput::open(config, events)?))
    }
}

/// Description d'un périphérique par défaut
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceSummary {
    pub name: String,
    pub default_sample_rate: u32,
    pub channels: u16,
}

/// Périphériques par défaut (entrée, sortie), None si absent
pub fn default_devices() -> (Option<DeviceSummary>, Option<DeviceSummary>) {
    let host = cpal::default_host();

    let input = host.default_input_device().and_then(|device| {
        let config = device.default_input_config().ok()?;
        Some(DeviceSummary {
            name: device_name(&device),
            default_sample_rate: config.sample_rate(),
            channels: config.channels(),
        })
    });

    let output = host.default_output_device().and_then(|device| {
        let config = device.default_output_config().ok()?;
        Some(DeviceSummary {
            name: device_name(&device),
            default_sample_rate: config.sample_rate(),
            channels: config.channels(),
        })
    });

    (input, output)
}

fn device_name(device: &cpal::Device) -> String {
    device
        .description()
        .ok()
        .map(|desc| desc.name().to_string())
        .unwrap_or_else(|| "Périphérique inconnu".to_string())
}
