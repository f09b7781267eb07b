//! # Simulator Configuration
//!
//! File-driven setup for a simulator and its replication.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [simulator]
//! id = "queue"
//! flavor = "real_time"
//! error_strategy = "warn_and_continue"
//!
//! [replication]
//! context = "baseline"
//! warmup_period = 10.0
//! run_length = 500.0
//!
//! [real_time]
//! speed_factor = 20.0
//! catchup = false
//!
//! [animation]
//! animation_delay = 50
//! ```
//!
//! Every section and key is optional; missing values take the defaults
//! below.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::SimulatorError;
use crate::simulator::{
    ErrorStrategy, LogLevel, RealTimeClock, Replication, RunLoop, Simulator,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error(transparent)]
    Simulator(#[from] SimulatorError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Flavor {
    #[default]
    Devs,
    Dess,
    Hybrid,
    RealTime,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub simulator: SimulatorConfig,
    #[serde(default)]
    pub replication: ReplicationConfig,
    #[serde(default)]
    pub real_time: RealTimeConfig,
    #[serde(default)]
    pub animation: AnimationConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulatorConfig {
    #[serde(default = "default_id")]
    pub id: String,
    #[serde(default)]
    pub flavor: Flavor,
    /// Clock step of the DESS and hybrid flavors.
    #[serde(default = "default_time_step")]
    pub time_step: f64,
    #[serde(default)]
    pub error_strategy: ErrorStrategy,
    /// Overrides the strategy's default log level.
    #[serde(default)]
    pub error_log_level: Option<LogLevel>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            id: default_id(),
            flavor: Flavor::default(),
            time_step: default_time_step(),
            error_strategy: ErrorStrategy::default(),
            error_log_level: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReplicationConfig {
    #[serde(default = "default_context")]
    pub context: String,
    #[serde(default)]
    pub start_time: f64,
    #[serde(default)]
    pub warmup_period: f64,
    #[serde(default = "default_run_length")]
    pub run_length: f64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            context: default_context(),
            start_time: 0.0,
            warmup_period: 0.0,
            run_length: default_run_length(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RealTimeConfig {
    #[serde(default = "default_speed_factor")]
    pub speed_factor: f64,
    #[serde(default = "default_catchup")]
    pub catchup: bool,
    #[serde(default = "default_update_msec")]
    pub update_msec: u64,
    #[serde(default = "default_wall_ms_per_unit")]
    pub wall_ms_per_unit: f64,
}

impl Default for RealTimeConfig {
    fn default() -> Self {
        Self {
            speed_factor: default_speed_factor(),
            catchup: default_catchup(),
            update_msec: default_update_msec(),
            wall_ms_per_unit: default_wall_ms_per_unit(),
        }
    }
}

impl RealTimeConfig {
    pub fn clock(&self) -> RealTimeClock {
        RealTimeClock {
            speed_factor: self.speed_factor,
            catchup: self.catchup,
            update_msec: self.update_msec,
            wall_ms_per_unit: self.wall_ms_per_unit,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnimationConfig {
    /// Turns a hybrid simulator into an animator that pauses between steps.
    #[serde(default)]
    pub enabled: bool,
    /// Milliseconds.
    #[serde(default = "default_animation_delay")]
    pub animation_delay: u64,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            animation_delay: default_animation_delay(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sim = &self.simulator;
        if sim.id.trim().is_empty() {
            return Err(ConfigError::Invalid("simulator.id must not be empty".into()));
        }
        if matches!(sim.flavor, Flavor::Dess | Flavor::Hybrid)
            && !(sim.time_step.is_finite() && sim.time_step > 0.0)
        {
            return Err(ConfigError::Invalid(format!(
                "simulator.time_step must be positive, got {}",
                sim.time_step
            )));
        }
        let rep = &self.replication;
        if !rep.start_time.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "replication.start_time must be finite, got {}",
                rep.start_time
            )));
        }
        if !(rep.run_length.is_finite() && rep.run_length > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "replication.run_length must be positive, got {}",
                rep.run_length
            )));
        }
        if !(rep.warmup_period >= 0.0 && rep.warmup_period <= rep.run_length) {
            return Err(ConfigError::Invalid(format!(
                "replication.warmup_period {} must lie within [0, {}]",
                rep.warmup_period, rep.run_length
            )));
        }
        if sim.flavor == Flavor::RealTime {
            self.real_time
                .clock()
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("real_time: {}", e)))?;
        }
        Ok(())
    }

    pub fn run_loop(&self) -> RunLoop<f64> {
        let time_step = self.simulator.time_step;
        match self.simulator.flavor {
            Flavor::Devs => RunLoop::Devs,
            Flavor::Dess => RunLoop::Dess { time_step },
            Flavor::Hybrid => RunLoop::Hybrid {
                time_step,
                animated: self.animation.enabled,
            },
            Flavor::RealTime => RunLoop::RealTime(self.real_time.clock()),
        }
    }

    /// A simulator with the configured flavor, error policy and animation
    /// delay. Validates first.
    pub fn build_simulator(&self) -> Result<Simulator<f64>, ConfigError> {
        self.validate()?;
        let simulator = Simulator::new(self.simulator.id.clone(), self.run_loop())?;
        let strategy = self.simulator.error_strategy;
        let level = self
            .simulator
            .error_log_level
            .unwrap_or_else(|| strategy.default_log_level());
        simulator.set_error_strategy_with_level(strategy, level);
        simulator.set_animation_delay(self.animation.animation_delay);
        Ok(simulator)
    }

    pub fn build_replication(&self) -> Result<Replication<f64>, ConfigError> {
        let rep = &self.replication;
        Ok(Replication::new(
            rep.context.clone(),
            rep.start_time,
            rep.warmup_period,
            rep.run_length,
        )?)
    }
}

fn default_id() -> String { "simulator".to_string() }
fn default_time_step() -> f64 { 1.0 }
fn default_context() -> String { "replication".to_string() }
fn default_run_length() -> f64 { 100.0 }
fn default_speed_factor() -> f64 { 1.0 }
fn default_catchup() -> bool { true }
fn default_update_msec() -> u64 { 10 }
fn default_wall_ms_per_unit() -> f64 { 1000.0 }
fn default_animation_delay() -> u64 { 100 }

/// Loads configuration from a TOML file.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                Err(ConfigError::Toml(e))
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            Err(ConfigError::Io(e))
        }
    }
}
