// =============================================================================
// CONFIGURATION - Load settings from presenter.toml
// =============================================================================
//
// Every section is optional; a missing file or missing keys fall back to the
// defaults below.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::Path;

use crate::backend::ChainPreferences;
use crate::frame::SessionSettings;
use crate::MAX_FRAMES_IN_FLIGHT;

pub const CONFIG_FILE: &str = "presenter.toml";

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Frame Presenter".to_string(),
            width: 1280,
            height: 720,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
    pub depth_clear: f32,
    pub frames_in_flight: usize,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "mailbox".to_string(),
            clear_color: [0.1, 0.2, 0.8, 1.0],
            depth_clear: 1.0,
            frames_in_flight: MAX_FRAMES_IN_FLIGHT,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: cfg!(debug_assertions),
            show_fps: true,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path(CONFIG_FILE).unwrap_or_else(|e| {
            log::warn!("Failed to load {}: {:#}. Using defaults.", CONFIG_FILE, e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get present mode as Vulkan enum
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => vk::PresentModeKHR::MAILBOX,
            "fifo" => vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to MAILBOX",
                    self.graphics.present_mode
                );
                vk::PresentModeKHR::MAILBOX
            }
        }
    }

    /// Frame slots, clamped to 1..=3
    pub fn frames_in_flight(&self) -> usize {
        let requested = self.graphics.frames_in_flight;
        let clamped = requested.clamp(1, 3);
        if clamped != requested {
            log::warn!("frames_in_flight = {} out of range, using {}", requested, clamped);
        }
        clamped
    }

    pub fn chain_preferences(&self) -> ChainPreferences {
        ChainPreferences {
            present_mode: self.present_mode(),
            ..ChainPreferences::default()
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            chain: self.chain_preferences(),
            frames_in_flight: self.frames_in_flight(),
            clear_color: self.graphics.clear_color,
            clear_depth: self.graphics.depth_clear,
        }
    }
}
