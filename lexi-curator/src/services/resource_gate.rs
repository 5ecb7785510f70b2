//! GPU utilization gate
//!
//! Samples GPU utilization and reports whether model scoring should be
//! skipped. Throttling is advisory: observation failures (no `nvidia-smi`,
//! timeout, malformed output) always read as "not throttled".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::Instant;

const NVIDIA_SMI_TIMEOUT: Duration = Duration::from_secs(5);

/// One observed GPU
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuUnit {
    pub index: u32,
    pub name: String,
    pub utilization_percent: u8,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
}

impl GpuUnit {
    pub fn memory_free_mb(&self) -> u64 {
        self.memory_total_mb.saturating_sub(self.memory_used_mb)
    }
}

/// Gate status for the HTTP API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateStatus {
    pub available: bool,
    pub unit_count: usize,
    pub units: Vec<GpuUnit>,
    pub selected_unit: Option<u32>,
    pub throttled: bool,
    pub threshold_percent: u8,
}

/// Source of utilization samples
///
/// `None` means the resource could not be observed.
#[async_trait]
pub trait UtilizationProbe: Send + Sync {
    async fn sample(&self) -> Option<Vec<GpuUnit>>;
}

/// Probe backed by `nvidia-smi`
pub struct NvidiaSmiProbe;

#[async_trait]
impl UtilizationProbe for NvidiaSmiProbe {
    async fn sample(&self) -> Option<Vec<GpuUnit>> {
        let child = Command::new("nvidia-smi")
            .args([
                "--query-gpu=index,name,utilization.gpu,memory.used,memory.total",
                "--format=csv,noheader,nounits",
            ])
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(NVIDIA_SMI_TIMEOUT, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::debug!("nvidia-smi unavailable: {}", e);
                return None;
            }
            Err(_) => {
                tracing::warn!("nvidia-smi timed out after {:?}", NVIDIA_SMI_TIMEOUT);
                return None;
            }
        };

        if !output.status.success() {
            tracing::debug!(status = ?output.status, "nvidia-smi exited with failure");
            return None;
        }

        let units = parse_nvidia_smi(&String::from_utf8_lossy(&output.stdout));
        if units.is_empty() {
            None
        } else {
            Some(units)
        }
    }
}

/// Parse `nvidia-smi --format=csv,noheader,nounits` output
///
/// Lines with missing or non-numeric fields are skipped.
pub fn parse_nvidia_smi(output: &str) -> Vec<GpuUnit> {
    output
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split(',').map(str::trim).collect();
            if parts.len() < 5 {
                return None;
            }
            let utilization: f64 = parts[2].parse().ok()?;
            Some(GpuUnit {
                index: parts[0].parse().ok()?,
                name: parts[1].to_string(),
                utilization_percent: utilization.clamp(0.0, 100.0).round() as u8,
                memory_used_mb: parts[3].parse().ok()?,
                memory_total_mb: parts[4].parse().ok()?,
            })
        })
        .collect()
}

/// Throttle decision over a shared GPU
#[derive(Clone)]
pub struct ResourceGate {
    probe: Arc<dyn UtilizationProbe>,
    threshold_percent: u8,
}

impl ResourceGate {
    pub fn new(probe: Arc<dyn UtilizationProbe>, threshold_percent: u8) -> Self {
        Self {
            probe,
            threshold_percent,
        }
    }

    /// Gate over the local NVIDIA GPUs
    pub fn nvidia(threshold_percent: u8) -> Self {
        Self::new(Arc::new(NvidiaSmiProbe), threshold_percent)
    }

    /// Same probe, different threshold (per-batch override)
    pub fn with_threshold(&self, threshold_percent: u8) -> Self {
        Self {
            probe: Arc::clone(&self.probe),
            threshold_percent,
        }
    }

    pub fn threshold_percent(&self) -> u8 {
        self.threshold_percent
    }

    /// Least-utilized unit; ties go to the lowest index
    pub fn select_best_unit(units: &[GpuUnit]) -> Option<&GpuUnit> {
        units
            .iter()
            .min_by_key(|u| (u.utilization_percent, u.index))
    }

    /// Whether even the least-loaded unit is above the threshold
    pub async fn is_throttled(&self) -> bool {
        match self.probe.sample().await {
            Some(units) => self.throttled_for(&units),
            None => false,
        }
    }

    fn throttled_for(&self, units: &[GpuUnit]) -> bool {
        match Self::select_best_unit(units) {
            Some(best) => {
                let throttled = best.utilization_percent > self.threshold_percent;
                if throttled {
                    tracing::debug!(
                        unit = best.index,
                        utilization = best.utilization_percent,
                        threshold = self.threshold_percent,
                        "GPU above throttle threshold"
                    );
                }
                throttled
            }
            None => false,
        }
    }

    /// Id of the unit scoring should run on
    pub async fn best_unit(&self) -> Option<u32> {
        let units = self.probe.sample().await?;
        Self::select_best_unit(&units).map(|u| u.index)
    }

    /// Poll until throttling clears
    ///
    /// Returns true once the gate opens, false when `max_wait` expires. Callers
    /// proceed either way.
    pub async fn wait_until_available(&self, poll_interval: Duration, max_wait: Duration) -> bool {
        let start = Instant::now();

        loop {
            if !self.is_throttled().await {
                return true;
            }

            let elapsed = start.elapsed();
            if elapsed >= max_wait {
                tracing::warn!(
                    waited_secs = elapsed.as_secs(),
                    "GPU still busy after max wait, proceeding anyway"
                );
                return false;
            }

            tracing::info!(
                threshold = self.threshold_percent,
                "GPU busy, waiting {:?} before re-checking",
                poll_interval
            );
            tokio::time::sleep(poll_interval.min(max_wait - elapsed)).await;
        }
    }

    pub async fn status(&self) -> GateStatus {
        let units = self.probe.sample().await.unwrap_or_default();
        let selected_unit = Self::select_best_unit(&units).map(|u| u.index);
        GateStatus {
            available: !units.is_empty(),
            unit_count: units.len(),
            throttled: self.throttled_for(&units),
            selected_unit,
            units,
            threshold_percent: self.threshold_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedProbe {
        samples: Mutex<Vec<Option<Vec<GpuUnit>>>>,
        calls: AtomicUsize,
    }

    impl ScriptedProbe {
        /// Samples are returned in order; the last one repeats
        fn new(samples: Vec<Option<Vec<GpuUnit>>>) -> Self {
            Self {
                samples: Mutex::new(samples),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl UtilizationProbe for ScriptedProbe {
        async fn sample(&self) -> Option<Vec<GpuUnit>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut samples = self.samples.lock().unwrap();
            if samples.len() > 1 {
                samples.remove(0)
            } else {
                samples[0].clone()
            }
        }
    }

    fn unit(index: u32, utilization: u8) -> GpuUnit {
        GpuUnit {
            index,
            name: format!("GPU {}", index),
            utilization_percent: utilization,
            memory_used_mb: 1000,
            memory_total_mb: 8000,
        }
    }

    #[test]
    fn test_parse_nvidia_smi() {
        let output = "0, NVIDIA GeForce RTX 3090, 42, 5120, 24576\n1, NVIDIA A100, 7, 100, 40960\nbogus line\n";
        let units = parse_nvidia_smi(output);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].name, "NVIDIA GeForce RTX 3090");
        assert_eq!(units[0].utilization_percent, 42);
        assert_eq!(units[1].memory_free_mb(), 40860);
    }

    #[test]
    fn test_select_best_unit_breaks_ties_by_index() {
        let units = vec![unit(2, 10), unit(0, 30), unit(1, 10)];
        assert_eq!(ResourceGate::select_best_unit(&units).map(|u| u.index), Some(1));
        assert!(ResourceGate::select_best_unit(&[]).is_none());
    }

    #[tokio::test]
    async fn test_throttle_uses_least_loaded_unit() {
        let busy = ResourceGate::new(
            Arc::new(ScriptedProbe::new(vec![Some(vec![unit(0, 90), unit(1, 80)])])),
            75,
        );
        assert!(busy.is_throttled().await);

        let one_free = ResourceGate::new(
            Arc::new(ScriptedProbe::new(vec![Some(vec![unit(0, 90), unit(1, 20)])])),
            75,
        );
        assert!(!one_free.is_throttled().await);

        let at_threshold = ResourceGate::new(
            Arc::new(ScriptedProbe::new(vec![Some(vec![unit(0, 75)])])),
            75,
        );
        assert!(!at_threshold.is_throttled().await, "threshold itself is not throttled");
    }

    #[tokio::test]
    async fn test_unobservable_gpu_fails_open() {
        let gate = ResourceGate::new(Arc::new(ScriptedProbe::new(vec![None])), 0);
        assert!(!gate.is_throttled().await);
        assert_eq!(gate.best_unit().await, None);
        let status = gate.status().await;
        assert!(!status.available);
        assert!(!status.throttled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_available_returns_when_cleared() {
        let probe = Arc::new(ScriptedProbe::new(vec![
            Some(vec![unit(0, 95)]),
            Some(vec![unit(0, 95)]),
            Some(vec![unit(0, 10)]),
        ]));
        let gate = ResourceGate::new(probe.clone(), 75);

        let cleared = gate
            .wait_until_available(Duration::from_secs(5), Duration::from_secs(60))
            .await;
        assert!(cleared);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_available_times_out() {
        let gate = ResourceGate::new(
            Arc::new(ScriptedProbe::new(vec![Some(vec![unit(0, 99)])])),
            75,
        );
        let cleared = gate
            .wait_until_available(Duration::from_secs(5), Duration::from_secs(12))
            .await;
        assert!(!cleared);
    }
}
