use serde::{Deserialize, Serialize};
use std::fmt;

/// Where oracle computation happens. Reported on every run.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    /// An externally managed accelerator, identified by its backend name.
    Named(String),
}

impl Default for Device {
    fn default() -> Self {
        Self::Cpu
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Named(name) => write!(f, "{}", name),
        }
    }
}

/// Explicit execution state threaded through attack, evaluation and sweep
/// calls in place of a process-wide device and logger.
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    device: Device,
    log_target: String,
}

impl ExecutionContext {
    pub fn new(device: Device, log_target: impl Into<String>) -> Self {
        Self {
            device,
            log_target: log_target.into(),
        }
    }

    pub const fn device(&self) -> &Device {
        &self.device
    }

    /// Target passed to every `log` macro issued on behalf of this context.
    pub fn target(&self) -> &str {
        &self.log_target
    }

    pub fn with_target(&self, suffix: &str) -> Self {
        Self {
            device: self.device.clone(),
            log_target: format!("{}::{}", self.log_target, suffix),
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(Device::Cpu, "nnv_robust")
    }
}
