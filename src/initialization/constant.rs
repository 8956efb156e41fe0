use ndarray::{ArrayD, IxDyn};

use super::Initializer;

/// An initializer that fills every slot with zeros.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZerosInitializer;

impl Initializer for ZerosInitializer {
    fn initialize(&mut self, shape: &[usize]) -> ArrayD<f32> {
        ArrayD::zeros(IxDyn(shape))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar() {
        let slot = ZerosInitializer.initialize(&[]);

        assert_eq!(slot.ndim(), 0);
        assert_eq!(slot.len(), 1);
        assert_eq!(slot.sum(), 0.);
    }

    #[test]
    fn matrix() {
        let slot = ZerosInitializer.initialize(&[3, 2]);

        assert_eq!(slot.shape(), &[3, 2]);
        assert!(slot.iter().all(|&x| x == 0.));
    }
}
