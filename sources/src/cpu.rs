use eyre::Result;
use multi_sampler_collector::SampleSource;
use std::{
    future::Future,
    pin::Pin,
};
use sysinfo::System;

/// Global CPU utilization in percent since the previous reading.
pub struct CpuSource {
    system: System,
}

impl std::fmt::Debug for CpuSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuSource").field("cpus", &self.system.cpus().len()).finish()
    }
}

impl CpuSource {
    /// Takes a first reading so the first sample covers a real interval.
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        Self { system }
    }

    fn read(&mut self) -> Option<f64> {
        self.system.refresh_cpu_all();
        let usage = f64::from(self.system.global_cpu_usage());
        usage.is_finite().then_some(usage)
    }
}

impl Default for CpuSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleSource for CpuSource {
    fn fetch(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<f64>>> + Send + '_>> {
        let usage = self.read();
        if usage.is_none() {
            debug!(source = self.name(), "cpu usage is not available");
        }
        Box::pin(async move { Ok(usage) })
    }

    fn name(&self) -> &'static str {
        "cpu"
    }
}
