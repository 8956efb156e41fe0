use std::{
    fmt::{self, Display},
    sync::atomic::{AtomicUsize, Ordering},
};

use ndarray::{Array, ArrayD, ArrayViewD, Dimension};

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

/// Identifies a trainable parameter, optimizers key their per-parameter slots by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(usize);

impl ParamId {
    /// Returns a process-wide unique id.
    pub fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> usize {
        self.0
    }
}

impl Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A trainable tensor owned by the training loop.
///
/// Optimizers only borrow it mutably for the duration of a single update.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    id: ParamId,
    value: ArrayD<f32>,
}

impl Parameter {
    /// Creates a new `Parameter` with a fresh id.
    ///
    /// # Arguments
    /// * `value` - The initial value of the parameter, of any dimensionality.
    pub fn new<D: Dimension>(value: Array<f32, D>) -> Self {
        Self::with_id(ParamId::next(), value)
    }

    /// Creates a new `Parameter` with an explicit id, e.g. when restoring a checkpoint.
    pub fn with_id<D: Dimension>(id: ParamId, value: Array<f32, D>) -> Self {
        Self {
            id,
            value: value.into_dyn(),
        }
    }

    pub fn id(&self) -> ParamId {
        self.id
    }

    pub fn shape(&self) -> &[usize] {
        self.value.shape()
    }

    pub fn value(&self) -> ArrayViewD<'_, f32> {
        self.value.view()
    }

    pub fn value_mut(&mut self) -> &mut ArrayD<f32> {
        &mut self.value
    }

    pub fn into_inner(self) -> ArrayD<f32> {
        self.value
    }
}
