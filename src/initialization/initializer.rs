use ndarray::ArrayD;

/// An `Initializer` generates the initial state of an optimizer's per-parameter slots.
pub trait Initializer: Send {
    /// Should generate a tensor of exactly `shape`.
    ///
    /// # Arguments
    /// * `shape` - The shape of the parameter owning the slot.
    fn initialize(&mut self, shape: &[usize]) -> ArrayD<f32>;
}

impl<T: Initializer + ?Sized> Initializer for Box<T> {
    fn initialize(&mut self, shape: &[usize]) -> ArrayD<f32> {
        (**self).initialize(shape)
    }
}
