//! Shared output device context
//!
//! One [`Mixer`] stands between every pipeline and the audio hardware.
//! It resolves the output device (system default or by name), owns the
//! master gain multiplied into every pipeline's callback path, keeps a
//! weak registry of the players it spawned, and tears everything down
//! in one place through [`Mixer::shutdown`]. No playback logic lives
//! here.
//!
//! The mixer stores the device by name and resolves a fresh handle for
//! each pipeline, so an unplugged device surfaces as an error on the
//! next open instead of a stale handle misbehaving mid-stream.

use crate::error::{PlaybackError, Result};
use crate::player::Player;
use crate::volume::Gain;
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::Device;
use drift_core::PlaybackState;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::{debug, warn};

/// Information about one audio output device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Human-readable device name
    pub name: String,
    /// Whether this is the system default output device
    pub is_default: bool,
    /// Native sample rate (Hz)
    pub sample_rate: u32,
    /// Output channel count
    pub channels: u16,
}

/// Shared device context and master gain for a set of pipelines
pub struct Mixer {
    /// `None` means the system default output device
    device_name: Option<String>,
    master: Arc<Gain>,
    registry: Mutex<Vec<Weak<dyn Player>>>,
    closed: AtomicBool,
}

impl Mixer {
    /// Mixer bound to the system default output device
    ///
    /// Fails when no output device exists, so a misconfigured machine
    /// surfaces before any pipeline is built.
    pub fn new() -> Result<Self> {
        let mixer = Self::unbound(None);
        mixer.open_device()?;
        Ok(mixer)
    }

    /// Mixer bound to a named output device
    pub fn with_device(name: impl Into<String>) -> Result<Self> {
        let mixer = Self::unbound(Some(name.into()));
        mixer.open_device()?;
        Ok(mixer)
    }

    fn unbound(device_name: Option<String>) -> Self {
        Self {
            device_name,
            master: Arc::new(Gain::new(1.0)),
            registry: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Enumerate output devices, the system default first and the rest
    /// alphabetical
    pub fn output_devices() -> Result<Vec<DeviceInfo>> {
        let host = cpal::default_host();
        let default_name = host.default_output_device().and_then(|d| d.name().ok());
        let devices = host.output_devices().map_err(|err| {
            PlaybackError::device(format!("could not enumerate output devices: {err}"))
        })?;

        let mut list = Vec::new();
        for device in devices {
            let Ok(name) = device.name() else { continue };
            let Ok(config) = device.default_output_config() else {
                continue;
            };
            list.push(DeviceInfo {
                is_default: default_name.as_deref() == Some(name.as_str()),
                sample_rate: config.sample_rate(),
                channels: config.channels(),
                name,
            });
        }

        list.sort_by(|a, b| match (a.is_default, b.is_default) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => a.name.cmp(&b.name),
        });
        Ok(list)
    }

    /// Resolve a fresh handle to this mixer's output device
    pub(crate) fn open_device(&self) -> Result<Device> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PlaybackError::Closed);
        }
        let host = cpal::default_host();
        match &self.device_name {
            None => host
                .default_output_device()
                .ok_or_else(|| PlaybackError::device("no default output device")),
            Some(wanted) => {
                let devices = host.output_devices().map_err(|err| {
                    PlaybackError::device(format!("could not enumerate output devices: {err}"))
                })?;
                for device in devices {
                    if device.name().is_ok_and(|name| name == *wanted) {
                        return Ok(device);
                    }
                }
                Err(PlaybackError::device(format!(
                    "output device '{wanted}' not found"
                )))
            }
        }
    }

    /// Gain cell multiplied into every pipeline's callback path
    pub(crate) fn master_gain(&self) -> Arc<Gain> {
        Arc::clone(&self.master)
    }

    /// Set the master volume, clamped to `[0.0, 1.0]`
    pub fn set_master_volume(&self, volume: f32) {
        self.master.set(volume);
    }

    /// Current master volume
    pub fn master_volume(&self) -> f32 {
        self.master.get()
    }

    /// Track a player so [`Mixer::shutdown`] can reach it
    pub(crate) fn register(&self, player: &Arc<dyn Player>) {
        let mut registry = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        registry.retain(|weak| weak.strong_count() > 0);
        registry.push(Arc::downgrade(player));
    }

    /// Registered players that are still alive and not closed
    pub fn active_pipelines(&self) -> usize {
        let mut registry = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        registry.retain(|weak| weak.strong_count() > 0);
        registry
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|player| player.state() != PlaybackState::Closed)
            .count()
    }

    /// Close every surviving pipeline and refuse further device opens
    ///
    /// Idempotent; also runs on drop.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let players: Vec<_> = {
            let mut registry = self
                .registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *registry)
                .into_iter()
                .filter_map(|weak| weak.upgrade())
                .collect()
        };
        for player in players {
            if let Err(err) = player.close() {
                warn!(player = %player.id(), "pipeline close failed during shutdown: {}", err);
            }
        }
        debug!("mixer shut down");
    }
}

impl Drop for Mixer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
