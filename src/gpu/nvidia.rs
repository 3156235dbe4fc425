//! NVIDIA GPU busy percentage via NVML
//!
//! NVML is initialised once when the engine is built; device 0 is queried
//! on each call. Without the `nvidia` feature, or when the library cannot
//! be loaded, the engine reports 0.

#[cfg(all(feature = "nvidia", target_os = "linux"))]
use crate::error::Result;
use crate::sampler::clamp_percent;

#[cfg(all(feature = "nvidia", target_os = "linux"))]
use nvml_wrapper::Nvml;

/// NVIDIA busy engine
pub struct NvidiaUsageEngine {
    #[cfg(all(feature = "nvidia", target_os = "linux"))]
    nvml: Option<Nvml>,
}

impl NvidiaUsageEngine {
    /// Initialise NVML, logging rather than failing when it is unavailable
    pub fn new() -> Self {
        #[cfg(all(feature = "nvidia", target_os = "linux"))]
        {
            Self::try_new().unwrap_or_else(|e| {
                log::debug!("nvidia: {}", e);
                Self { nvml: None }
            })
        }

        #[cfg(not(all(feature = "nvidia", target_os = "linux")))]
        {
            Self {}
        }
    }

    /// Initialise NVML, returning the loader error as [`LxError::Nvml`](crate::LxError)
    #[cfg(all(feature = "nvidia", target_os = "linux"))]
    pub fn try_new() -> Result<Self> {
        let nvml = Nvml::init()?;
        Ok(Self { nvml: Some(nvml) })
    }

    /// Whether NVML was loaded
    pub fn is_available(&self) -> bool {
        #[cfg(all(feature = "nvidia", target_os = "linux"))]
        {
            self.nvml.is_some()
        }

        #[cfg(not(all(feature = "nvidia", target_os = "linux")))]
        {
            false
        }
    }

    /// Core utilisation of GPU 0 in percent, 0 when unavailable
    pub fn get_usage(&self) -> f64 {
        self.utilization().map(clamp_percent).unwrap_or(0.0)
    }

    #[cfg(all(feature = "nvidia", target_os = "linux"))]
    fn utilization(&self) -> Option<f64> {
        let nvml = self.nvml.as_ref()?;
        let rates = nvml
            .device_by_index(0)
            .and_then(|device| device.utilization_rates())
            .map_err(|e| log::debug!("nvidia: utilization query failed: {}", e))
            .ok()?;
        Some(rates.gpu as f64)
    }

    #[cfg(not(all(feature = "nvidia", target_os = "linux")))]
    fn utilization(&self) -> Option<f64> {
        None
    }
}

impl Default for NvidiaUsageEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_usage_in_range() {
        let engine = NvidiaUsageEngine::new();
        let usage = engine.get_usage();
        assert!((0.0..=100.0).contains(&usage));
        if !engine.is_available() {
            assert_eq!(usage, 0.0);
        }
    }

    #[cfg(all(feature = "nvidia", target_os = "linux"))]
    #[test]
    fn test_try_new_surfaces_nvml_errors() {
        match NvidiaUsageEngine::try_new() {
            Ok(engine) => assert!(engine.is_available()),
            Err(e) => assert!(matches!(e, crate::LxError::Nvml(_))),
        }
    }
}
