use serde::Serialize;
use thiserror::Error;

/// Explicit tensor dimensions; data is row-major for matrices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TensorShape {
    Vector(usize),
    Matrix { rows: usize, cols: usize },
}

impl TensorShape {
    pub fn len(&self) -> usize {
        match *self {
            TensorShape::Vector(len) => len,
            TensorShape::Matrix { rows, cols } => rows * cols,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A dense f32 buffer that carries its dimensions alongside the data.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: TensorShape,
    data: Vec<f32>,
}

impl Tensor {
    fn zeros(shape: TensorShape) -> Result<Self, TensorError> {
        let len = shape.len();
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| TensorError::BackingAllocation(len))?;
        data.resize(len, 0.0);
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> TensorShape {
        self.shape
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Bounds-checked matrix element read; `None` for vectors or
    /// out-of-range indices.
    pub fn at(&self, row: usize, col: usize) -> Option<f32> {
        match self.shape {
            TensorShape::Matrix { rows, cols } if row < rows && col < cols => {
                Some(self.data[row * cols + col])
            }
            _ => None,
        }
    }

    pub fn set(&mut self, row: usize, col: usize, value: f32) -> bool {
        match self.shape {
            TensorShape::Matrix { rows, cols } if row < rows && col < cols => {
                self.data[row * cols + col] = value;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TensorError {
    #[error("tensor arena exhausted (requested {requested} elements, available {available})")]
    Exhausted { requested: usize, available: usize },
    #[error("tensor backing allocation of {0} elements failed")]
    BackingAllocation(usize),
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ArenaStats {
    pub capacity_elems: usize,
    pub used_elems: usize,
    pub peak_elems: usize,
    pub live_tensors: u64,
    pub released_tensors: u64,
}

/// Shared tensor context. Budget accounting is bump-only: releasing a tensor
/// records the release but never returns elements to the budget, mirroring
/// the pool's arena-without-reclaim contract. The whole arena goes away at
/// kernel shutdown.
#[derive(Debug)]
pub struct TensorArena {
    capacity_elems: usize,
    used_elems: usize,
    peak_elems: usize,
    live_tensors: u64,
    released_tensors: u64,
}

impl TensorArena {
    pub fn new(capacity_elems: usize) -> Self {
        Self {
            capacity_elems,
            used_elems: 0,
            peak_elems: 0,
            live_tensors: 0,
            released_tensors: 0,
        }
    }

    pub fn vector(&mut self, len: usize) -> Result<Tensor, TensorError> {
        self.admit(TensorShape::Vector(len))
    }

    pub fn matrix(&mut self, rows: usize, cols: usize) -> Result<Tensor, TensorError> {
        self.admit(TensorShape::Matrix { rows, cols })
    }

    /// Accounting-only: the element budget is not reclaimed.
    pub fn release(&mut self, tensor: Tensor) {
        drop(tensor);
        self.released_tensors += 1;
        self.live_tensors = self.live_tensors.saturating_sub(1);
    }

    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            capacity_elems: self.capacity_elems,
            used_elems: self.used_elems,
            peak_elems: self.peak_elems,
            live_tensors: self.live_tensors,
            released_tensors: self.released_tensors,
        }
    }

    // All-or-nothing: counters move only after the backing buffer exists.
    fn admit(&mut self, shape: TensorShape) -> Result<Tensor, TensorError> {
        let elems = shape.len();
        if self.used_elems + elems > self.capacity_elems {
            return Err(TensorError::Exhausted {
                requested: elems,
                available: self.capacity_elems - self.used_elems,
            });
        }
        let tensor = Tensor::zeros(shape)?;
        self.used_elems += elems;
        if self.used_elems > self.peak_elems {
            self.peak_elems = self.used_elems;
        }
        self.live_tensors += 1;
        Ok(tensor)
    }
}
