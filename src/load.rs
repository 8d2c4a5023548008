//! System load sampling for the adaptive controller

use parking_lot::Mutex;
use sysinfo::System;

/// One load reading, consumed within a single controller run
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LoadSample {
    pub cpu_percent: f32,
    pub memory_percent: f32,
}

impl LoadSample {
    pub fn new(cpu_percent: f32, memory_percent: f32) -> Self {
        Self {
            cpu_percent,
            memory_percent,
        }
    }

    pub fn exceeds(&self, max_cpu: f32, max_memory: f32) -> bool {
        self.cpu_percent > max_cpu || self.memory_percent > max_memory
    }
}

pub trait LoadSampler: Send + Sync {
    fn sample(&self) -> LoadSample;
}

/// Reads global CPU and memory usage of the machine
pub struct SystemLoadSampler {
    system: Mutex<System>,
}

impl SystemLoadSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is computed between two refreshes; prime the first one
        system.refresh_cpu();
        system.refresh_memory();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for SystemLoadSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadSampler for SystemLoadSampler {
    fn sample(&self) -> LoadSample {
        let mut system = self.system.lock();
        system.refresh_cpu();
        system.refresh_memory();

        let total = system.total_memory();
        let memory_percent = if total == 0 {
            0.0
        } else {
            (system.used_memory() as f64 / total as f64 * 100.0) as f32
        };

        LoadSample::new(system.global_cpu_info().cpu_usage(), memory_percent)
    }
}

/// Returns a settable constant reading
#[derive(Debug, Default)]
pub struct FixedLoadSampler {
    sample: Mutex<LoadSample>,
}

impl FixedLoadSampler {
    pub fn new(sample: LoadSample) -> Self {
        Self {
            sample: Mutex::new(sample),
        }
    }

    pub fn set(&self, sample: LoadSample) {
        *self.sample.lock() = sample;
    }
}

impl LoadSampler for FixedLoadSampler {
    fn sample(&self) -> LoadSample {
        *self.sample.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exceeds() {
        let sample = LoadSample::new(50.0, 85.0);
        assert!(sample.exceeds(70.0, 80.0));
        assert!(!sample.exceeds(70.0, 90.0));
    }

    #[test]
    fn test_fixed_sampler() {
        let sampler = FixedLoadSampler::new(LoadSample::new(10.0, 20.0));
        assert_eq!(sampler.sample(), LoadSample::new(10.0, 20.0));
        sampler.set(LoadSample::new(90.0, 20.0));
        assert_eq!(sampler.sample().cpu_percent, 90.0);
    }

    #[test]
    fn test_system_sampler_in_range() {
        let sample = SystemLoadSampler::new().sample();
        assert!(sample.cpu_percent >= 0.0);
        assert!((0.0..=100.0).contains(&sample.memory_percent));
    }
}
