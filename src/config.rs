use serde::{Deserialize, Serialize};

/// Kernel bootstrap configuration.
///
/// Serializable so drivers and offline tooling can embed deterministic kernel
/// images that recreate the same runtime topology on every boot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Memory pool capacity in bytes.
    pub memory_pool_size: usize,
    /// Tensor arena capacity in f32 elements.
    pub tensor_arena_elems: usize,
    /// Cognitive-loop tick frequency hint (Hz). Informational; the driver
    /// owns the cadence.
    pub scheduler_freq_hz: u32,
    /// Maximum concurrent tasks; normalizes the ready-queue input feature.
    pub max_tasks: u32,
    /// Hypergraph adjacency matrix dimension.
    pub max_atoms: usize,
    /// Maximum membrane depth; deeper allocations are clamped.
    pub max_membrane_depth: u32,
    /// Soft budget for one scheduler tick (nanoseconds).
    pub max_tick_ns: u64,
    /// Soft budget for one pool allocation (nanoseconds).
    pub max_alloc_ns: u64,
    /// When set, a tick that overruns `max_tick_ns` is reported as an error
    /// instead of only being instrumented.
    pub enable_realtime: bool,
    /// Seed for the kernel RNG (reservoir weight initialization).
    pub seed: u64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            memory_pool_size: 16 * 1024 * 1024,
            tensor_arena_elems: 4 * 1024 * 1024,
            scheduler_freq_hz: 1000,
            max_tasks: 256,
            max_atoms: 1024,
            max_membrane_depth: 16,
            max_tick_ns: 5_000,
            max_alloc_ns: 100,
            enable_realtime: false,
            seed: 0,
        }
    }
}

/// How the recurrent weight matrix is normalized toward the target spectral
/// radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SpectralScaling {
    /// Divide by the empirical 1.5 constant. Compatibility default; the
    /// constant approximates the expected dominant eigenvalue of a dense
    /// uniform [-1,1] matrix and is not exact.
    Approximate,
    /// Normalize by a power-iteration estimate of the dominant eigenvalue.
    PowerIteration { iterations: usize },
}

impl Default for SpectralScaling {
    fn default() -> Self {
        SpectralScaling::Approximate
    }
}

/// Echo-state reservoir configuration. Immutable once the scheduler is
/// initialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservoirConfig {
    /// Reservoir neurons.
    pub size: usize,
    /// Target spectral radius of the recurrent matrix.
    pub spectral_radius: f32,
    /// Probability that a recurrent weight is zero.
    pub sparsity: f32,
    /// Input vector length.
    pub input_dim: usize,
    /// Readout vector length; also the default priority-scan bound.
    pub output_dim: usize,
    /// Leaky-integration factor in (0, 1].
    pub leak_rate: f32,
    pub scaling: SpectralScaling,
}

impl Default for ReservoirConfig {
    fn default() -> Self {
        Self {
            size: 1024,
            spectral_radius: 0.95,
            sparsity: 0.1,
            input_dim: 64,
            output_dim: 32,
            leak_rate: 0.3,
            scaling: SpectralScaling::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = ReservoirConfig::default();
        assert_eq!(config.size, 1024);
        assert_eq!(config.input_dim, 64);
        assert_eq!(config.output_dim, 32);
        assert!((config.spectral_radius - 0.95).abs() < f32::EPSILON);
        assert!((config.leak_rate - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: ReservoirConfig =
            serde_json::from_value(serde_json::json!({"size": 16, "output_dim": 4}))
                .expect("partial reservoir config");
        assert_eq!(config.size, 16);
        assert_eq!(config.output_dim, 4);
        assert_eq!(config.input_dim, 64);
    }
}
