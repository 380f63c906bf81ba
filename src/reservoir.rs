use rand::rngs::StdRng;
use rand::Rng;

use crate::config::{ReservoirConfig, SpectralScaling};
use crate::tensor::{Tensor, TensorArena, TensorError};

/// Echo-state reservoir: fixed random recurrent and input matrices, a leaky
/// tanh state update, and a linear readout. All weights are frozen at
/// initialization; only the state vector evolves.
#[derive(Debug)]
pub struct Reservoir {
    size: usize,
    input_dim: usize,
    output_dim: usize,
    leak_rate: f32,
    w_reservoir: Tensor,
    w_input: Tensor,
    w_output: Tensor,
    state: Tensor,
    scratch: Vec<f32>,
}

impl Reservoir {
    pub fn init(
        arena: &mut TensorArena,
        config: &ReservoirConfig,
        rng: &mut StdRng,
    ) -> Result<Self, TensorError> {
        let size = config.size;
        let mut w_reservoir = arena.matrix(size, size)?;
        let mut w_input = arena.matrix(size, config.input_dim)?;
        let mut w_output = arena.matrix(config.output_dim, size)?;
        let state = arena.vector(size)?;

        // Recurrent weights: zero with probability `sparsity`, otherwise
        // uniform in [-1, 1].
        for w in w_reservoir.as_mut_slice() {
            *w = if rng.gen::<f32>() > config.sparsity {
                rng.gen_range(-1.0..1.0)
            } else {
                0.0
            };
        }

        let scale = match config.scaling {
            SpectralScaling::Approximate => config.spectral_radius / 1.5,
            SpectralScaling::PowerIteration { iterations } => {
                let estimate = dominant_eigenvalue(&w_reservoir, size, iterations);
                if estimate > f32::EPSILON {
                    config.spectral_radius / estimate
                } else {
                    0.0
                }
            }
        };
        for w in w_reservoir.as_mut_slice() {
            *w *= scale;
        }

        for w in w_input.as_mut_slice() {
            *w = rng.gen_range(-0.5..0.5);
        }
        for w in w_output.as_mut_slice() {
            *w = rng.gen_range(-0.1..0.1);
        }

        Ok(Self {
            size,
            input_dim: config.input_dim,
            output_dim: config.output_dim,
            leak_rate: config.leak_rate,
            w_reservoir,
            w_input,
            w_output,
            state,
            scratch: vec![0.0; size],
        })
    }

    /// Leaky state update: s' = (1 - a) * s + a * tanh(W*s + W_in*x).
    /// Input components beyond `input_dim` are ignored; missing ones read as
    /// zero.
    pub fn update(&mut self, input: &[f32]) {
        let mut scratch = std::mem::take(&mut self.scratch);
        let state = self.state.as_slice();
        let w = self.w_reservoir.as_slice();
        let w_in = self.w_input.as_slice();

        for i in 0..self.size {
            let mut activation = 0.0f32;
            let row = &w[i * self.size..(i + 1) * self.size];
            for (weight, s) in row.iter().zip(state) {
                activation += weight * s;
            }
            let in_row = &w_in[i * self.input_dim..(i + 1) * self.input_dim];
            for (weight, x) in in_row.iter().zip(input) {
                activation += weight * x;
            }
            scratch[i] = activation.tanh();
        }

        let state = self.state.as_mut_slice();
        for (s, activated) in state.iter_mut().zip(&scratch) {
            *s = (1.0 - self.leak_rate) * *s + self.leak_rate * activated;
        }
        self.scratch = scratch;
    }

    /// Linear readout into `output`; slots beyond `output_dim` are untouched.
    pub fn readout(&self, output: &mut [f32]) {
        let state = self.state.as_slice();
        let w_out = self.w_output.as_slice();
        for (i, slot) in output.iter_mut().take(self.output_dim).enumerate() {
            let row = &w_out[i * self.size..(i + 1) * self.size];
            let mut sum = 0.0f32;
            for (weight, s) in row.iter().zip(state) {
                sum += weight * s;
            }
            *slot = sum;
        }
    }

    pub fn state(&self) -> &[f32] {
        self.state.as_slice()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    pub fn release(self, arena: &mut TensorArena) {
        arena.release(self.w_reservoir);
        arena.release(self.w_input);
        arena.release(self.w_output);
        arena.release(self.state);
    }
}

/// Power-iteration estimate of the dominant eigenvalue magnitude of a square
/// matrix. Returns 0 when the iterate collapses to the zero vector.
fn dominant_eigenvalue(matrix: &Tensor, size: usize, iterations: usize) -> f32 {
    let w = matrix.as_slice();
    let mut v = vec![1.0f32; size];
    let mut next = vec![0.0f32; size];
    let mut norm = 0.0f32;

    for _ in 0..iterations.max(1) {
        for (i, slot) in next.iter_mut().enumerate() {
            let row = &w[i * size..(i + 1) * size];
            *slot = row.iter().zip(&v).map(|(a, b)| a * b).sum();
        }
        norm = next.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm <= f32::EPSILON {
            return 0.0;
        }
        for (dst, src) in v.iter_mut().zip(&next) {
            *dst = src / norm;
        }
    }
    norm
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn small_config() -> ReservoirConfig {
        ReservoirConfig {
            size: 16,
            input_dim: 8,
            output_dim: 4,
            ..ReservoirConfig::default()
        }
    }

    #[test]
    fn state_stays_in_the_tanh_envelope() {
        let mut arena = TensorArena::new(8192);
        let mut rng = StdRng::seed_from_u64(7);
        let mut reservoir =
            Reservoir::init(&mut arena, &small_config(), &mut rng).expect("reservoir init");

        let input = [1.0f32, -1.0, 0.5, 0.25, 0.0, 0.0, 0.0, 0.0];
        for _ in 0..100 {
            reservoir.update(&input);
        }
        assert!(reservoir.state().iter().all(|&s| (-1.0..=1.0).contains(&s)));
    }

    #[test]
    fn identical_seeds_produce_identical_trajectories() {
        let mut arena_a = TensorArena::new(8192);
        let mut arena_b = TensorArena::new(8192);
        let mut rng_a = StdRng::seed_from_u64(42);
        let mut rng_b = StdRng::seed_from_u64(42);

        let mut a = Reservoir::init(&mut arena_a, &small_config(), &mut rng_a).expect("init a");
        let mut b = Reservoir::init(&mut arena_b, &small_config(), &mut rng_b).expect("init b");

        let input = [0.3f32, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        for _ in 0..10 {
            a.update(&input);
            b.update(&input);
        }
        assert_eq!(a.state(), b.state());

        let mut out_a = [0.0f32; 4];
        let mut out_b = [0.0f32; 4];
        a.readout(&mut out_a);
        b.readout(&mut out_b);
        assert_eq!(out_a, out_b);
    }

    #[test]
    fn power_iteration_recovers_a_known_eigenvalue() {
        let mut arena = TensorArena::new(64);
        let mut m = arena.matrix(3, 3).expect("matrix");
        m.set(0, 0, 2.0);
        m.set(1, 1, 0.5);
        m.set(2, 2, 0.25);

        let estimate = dominant_eigenvalue(&m, 3, 50);
        assert!((estimate - 2.0).abs() < 1e-3);
    }

    #[test]
    fn power_iteration_scaling_hits_the_target_radius() {
        let mut arena = TensorArena::new(8192);
        let mut rng = StdRng::seed_from_u64(9);
        let config = ReservoirConfig {
            size: 16,
            input_dim: 8,
            output_dim: 4,
            spectral_radius: 0.9,
            scaling: SpectralScaling::PowerIteration { iterations: 60 },
            ..ReservoirConfig::default()
        };
        let reservoir = Reservoir::init(&mut arena, &config, &mut rng).expect("init");

        let estimate = dominant_eigenvalue(&reservoir.w_reservoir, 16, 60);
        assert!(
            (estimate - 0.9).abs() < 1e-2,
            "dominant eigenvalue {estimate} not near 0.9"
        );
    }

    #[test]
    fn zero_matrix_scales_to_zero_instead_of_dividing_by_zero() {
        let mut arena = TensorArena::new(4096);
        let mut rng = StdRng::seed_from_u64(1);
        let config = ReservoirConfig {
            size: 8,
            input_dim: 4,
            output_dim: 2,
            sparsity: 1.0,
            scaling: SpectralScaling::PowerIteration { iterations: 20 },
            ..ReservoirConfig::default()
        };
        let reservoir = Reservoir::init(&mut arena, &config, &mut rng).expect("init");
        assert!(reservoir.w_reservoir.as_slice().iter().all(|&w| w == 0.0));
    }
}
