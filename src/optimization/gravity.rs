use std::collections::HashMap;

use log::{debug, info};
use ndarray::{ArrayD, ArrayViewD, Zip};

use super::{BaseOptimizer, Optimizer, optimizer::check_shape};
use crate::{
    GravityConfig, OptimErr, OptimizerConfig, ParamId, Parameter, Result,
    initialization::{Initializer, NormalInitializer},
};

/// The Gravity optimization algorithm.
///
/// Keeps one velocity slot per parameter, an exponential moving average of a saturated
/// version of the gradient whose decay warms up from `1/2` towards `beta` as training
/// advances:
///
/// ```text
/// beta_t = (beta * t + 1) / (t + 2)
/// g'     = g / (1 + (g * max|g|)^2)
/// vel    = beta_t * vel + (1 - beta_t) * g'
/// param  = param - lr * vel
/// ```
///
/// Slots are disjoint, `slots_mut` hands them out together with `gravity_update` so that
/// distinct parameters can be updated in parallel.
pub struct Gravity {
    base: BaseOptimizer,
    alpha: f32,
    beta: f32,
    epsilon: f32,
    initializer: SlotInitializer,
    velocity: HashMap<ParamId, ArrayD<f32>>,
}

/// Generates new velocity slots.
enum SlotInitializer {
    /// `N(0, alpha / learning_rate)`, rescaled with the learning rate in effect on attach.
    Scaled(NormalInitializer),
    Custom(Box<dyn Initializer>),
}

impl Gravity {
    /// Creates a new `Gravity` whose velocity slots are drawn from `N(0, alpha / learning_rate)`.
    ///
    /// # Arguments
    /// * `config` - The optimizer's hyperparameters.
    ///
    /// # Returns
    /// An error if the hyperparameters are invalid.
    pub fn new(config: GravityConfig) -> Result<Self> {
        Self::from_seed(config, None)
    }

    /// Same as `new` but with a seeded random number generator for the velocity slots.
    pub fn seeded(config: GravityConfig, seed: u64) -> Result<Self> {
        Self::from_seed(config, Some(seed))
    }

    /// Creates a new `Gravity` with a custom velocity initializer.
    ///
    /// # Arguments
    /// * `config` - The optimizer's hyperparameters.
    /// * `initializer` - Generates the initial value of every velocity slot.
    ///
    /// # Returns
    /// An error if the hyperparameters are invalid.
    pub fn with_initializer<I>(config: GravityConfig, initializer: I) -> Result<Self>
    where
        I: Initializer + 'static,
    {
        Self::build(config, SlotInitializer::Custom(Box::new(initializer)))
    }

    fn from_seed(config: GravityConfig, seed: Option<u64>) -> Result<Self> {
        config.validate()?;

        let std_dev = config.alpha / config.learning_rate;
        let initializer = NormalInitializer::from_seed(seed, 0., std_dev)?;
        Self::build(config, SlotInitializer::Scaled(initializer))
    }

    fn build(config: GravityConfig, initializer: SlotInitializer) -> Result<Self> {
        config.validate()?;

        let GravityConfig {
            name,
            learning_rate,
            alpha,
            beta,
            decay,
            epsilon,
            clipnorm,
            clipvalue,
        } = config;

        let base = BaseOptimizer::new(name, learning_rate, decay).with_clipping(clipnorm, clipvalue);

        Ok(Self {
            base,
            alpha,
            beta,
            epsilon,
            initializer,
            velocity: HashMap::new(),
        })
    }

    /// The decay of the velocity's moving average for the current step.
    pub fn current_beta(&self) -> f32 {
        effective_beta(self.beta, self.base.iterations())
    }

    /// The amount of velocity slots, one per attached parameter.
    pub fn slot_count(&self) -> usize {
        self.velocity.len()
    }

    /// Returns the velocity slot of `id`, if it was attached.
    pub fn velocity(&self, id: ParamId) -> Option<ArrayViewD<'_, f32>> {
        self.velocity.get(&id).map(|v| v.view())
    }

    /// Overwrites the velocity slot of an attached parameter, e.g. when restoring a checkpoint.
    ///
    /// # Arguments
    /// * `id` - The parameter owning the slot.
    /// * `value` - The new velocity, must have the slot's shape.
    pub fn set_velocity(&mut self, id: ParamId, value: ArrayD<f32>) -> Result<()> {
        let slot = self
            .velocity
            .get_mut(&id)
            .ok_or(OptimErr::UnknownParameter(id))?;

        if slot.shape() != value.shape() {
            return Err(OptimErr::ShapeMismatch {
                what: "velocity",
                got: value.shape().to_vec(),
                expected: slot.shape().to_vec(),
            });
        }

        *slot = value;
        Ok(())
    }

    /// Hands out every velocity slot at once, each one borrowed independently.
    ///
    /// Together with `gravity_update`, `decayed_learning_rate` and `current_beta` this lets a
    /// training loop update distinct parameters concurrently, calling `finish_step` once
    /// they are all done.
    pub fn slots_mut(&mut self) -> impl Iterator<Item = (ParamId, &mut ArrayD<f32>)> {
        self.velocity.iter_mut().map(|(&id, slot)| (id, slot))
    }
}

impl Optimizer for Gravity {
    fn base(&self) -> &BaseOptimizer {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseOptimizer {
        &mut self.base
    }

    fn attach(&mut self, params: &[Parameter]) -> Result<()> {
        for param in params {
            if let Some(slot) = self.velocity.get(&param.id()) {
                if slot.shape() != param.shape() {
                    return Err(OptimErr::ShapeMismatch {
                        what: "velocity",
                        got: param.shape().to_vec(),
                        expected: slot.shape().to_vec(),
                    });
                }
            }
        }

        let initializer: &mut dyn Initializer = match &mut self.initializer {
            SlotInitializer::Scaled(normal) => {
                normal.set_std_dev(self.alpha / self.base.learning_rate())?;
                normal
            }
            SlotInitializer::Custom(custom) => custom.as_mut(),
        };

        for param in params {
            if !self.velocity.contains_key(&param.id()) {
                let slot = initializer.initialize(param.shape());
                self.velocity.insert(param.id(), slot);
            }
        }

        info!(
            optimizer = self.base.name(),
            slots = self.velocity.len();
            "attached velocity slots"
        );
        Ok(())
    }

    fn check(&self, grad: &ArrayViewD<'_, f32>, param: &Parameter) -> Result<()> {
        check_shape(grad, param)?;

        if !self.velocity.contains_key(&param.id()) {
            return Err(OptimErr::UnknownParameter(param.id()));
        }

        Ok(())
    }

    fn apply_dense(&mut self, grad: ArrayViewD<'_, f32>, param: &mut Parameter) -> Result<()> {
        self.check(&grad, param)?;

        let lr = self.base.decayed_learning_rate();
        let beta = self.current_beta();

        let velocity = self
            .velocity
            .get_mut(&param.id())
            .ok_or(OptimErr::UnknownParameter(param.id()))?;

        gravity_update(grad, velocity, param, lr, beta)
    }

    fn config(&self) -> OptimizerConfig {
        OptimizerConfig::Gravity(GravityConfig {
            name: self.base.name().to_string(),
            learning_rate: self.base.learning_rate(),
            alpha: self.alpha,
            beta: self.beta,
            decay: self.base.decay(),
            epsilon: self.epsilon,
            clipnorm: self.base.clipnorm(),
            clipvalue: self.base.clipvalue(),
        })
    }
}

/// Updates a single parameter and its velocity slot in place.
///
/// # Arguments
/// * `grad` - The gradient of `param`.
/// * `velocity` - The velocity slot of `param`.
/// * `param` - The parameter to update.
/// * `lr` - The decayed learning rate of the current step.
/// * `beta` - The effective beta of the current step, see `effective_beta`.
///
/// # Returns
/// An error, before any mutation, if the three shapes differ.
pub fn gravity_update(
    grad: ArrayViewD<'_, f32>,
    velocity: &mut ArrayD<f32>,
    param: &mut Parameter,
    lr: f32,
    beta: f32,
) -> Result<()> {
    check_shape(&grad, param)?;

    if velocity.shape() != param.shape() {
        return Err(OptimErr::ShapeMismatch {
            what: "velocity",
            got: velocity.shape().to_vec(),
            expected: param.shape().to_vec(),
        });
    }

    if grad.is_empty() {
        return Ok(());
    }

    let saturated = saturate(&grad);

    Zip::from(&mut *velocity)
        .and(&saturated)
        .for_each(|v, &g| *v = beta * *v + (1. - beta) * g);

    Zip::from(param.value_mut())
        .and(&*velocity)
        .for_each(|p, &v| *p -= lr * v);

    Ok(())
}

/// The decay of the velocity's moving average at step `t`.
///
/// Starts at `1/2` and approaches `beta` as `t` grows.
pub fn effective_beta(beta: f32, t: u64) -> f32 {
    let t = t as f32;
    (beta * t + 1.) / (t + 2.)
}

/// Softly clips a gradient: `g / (1 + (g / max_step)^2)` with `max_step = 1 / max|g|`.
///
/// An all zero gradient has no `max_step`, it's returned untouched.
pub fn saturate(grad: &ArrayViewD<'_, f32>) -> ArrayD<f32> {
    let max_abs = grad.iter().fold(0f32, |acc, g| acc.max(g.abs()));

    if max_abs == 0. {
        debug!("all zero gradient, skipping saturation");
        return grad.to_owned();
    }

    let max_step = 1. / max_abs;
    grad.mapv(|g| g / (1. + (g / max_step).powi(2)))
}

#[cfg(test)]
mod tests {
    use ndarray::{Array1, Array2, ArrayD, IxDyn, array};

    use super::*;
    use crate::initialization::ZerosInitializer;

    fn zeroed(config: GravityConfig) -> Gravity {
        Gravity::with_initializer(config, ZerosInitializer).unwrap()
    }

    #[test]
    fn beta_warms_up() {
        assert_eq!(effective_beta(0.9, 0), 0.5);
        assert!((effective_beta(0.9, 1) - 1.9 / 3.).abs() < 1e-6);
        assert!((effective_beta(0.9, 1_000_000) - 0.9).abs() < 1e-5);

        let mut prev = effective_beta(0.9, 0);
        for t in 1..100 {
            let beta = effective_beta(0.9, t);
            assert!(beta > prev);
            prev = beta;
        }
    }

    #[test]
    fn saturation_is_odd() {
        let grad = array![0.5f32, -2., 3., 0.01].into_dyn();
        let neg = grad.mapv(|g| -g);

        assert_eq!(saturate(&neg.view()), saturate(&grad.view()).mapv(|g| -g));
    }

    #[test]
    fn saturation_is_bounded() {
        let grad = array![10f32, -0.1, 0.1, 4., -7.].into_dyn();
        let max_step = 1. / 10.;

        for g in saturate(&grad.view()).iter() {
            assert!(g.abs() <= max_step / 2. + 1e-6, "{g}");
        }
    }

    #[test]
    fn saturation_suppresses_outliers() {
        let grad = array![10f32, 0.1, 0.1, 0.1].into_dyn();
        let saturated = saturate(&grad.view());

        let outlier = saturated[IxDyn(&[0])];
        let small = saturated[IxDyn(&[1])];

        assert!(outlier / small < 10. / 0.1);
        assert!(outlier < small);
    }

    #[test]
    fn zero_gradient_is_untouched() {
        let grad = ArrayD::<f32>::zeros(IxDyn(&[3]));
        assert_eq!(saturate(&grad.view()), grad);
    }

    #[test]
    fn single_step() {
        let mut gravity = zeroed(GravityConfig::default());
        let mut param = Parameter::new(array![1f32]);
        gravity.attach(std::slice::from_ref(&param)).unwrap();

        let grad = array![0.5f32].into_dyn();
        gravity.apply_dense(grad.view(), &mut param).unwrap();

        let vel = gravity.velocity(param.id()).unwrap()[IxDyn(&[0])];
        let value = param.value()[IxDyn(&[0])];

        assert!((vel - 0.235_294).abs() < 1e-5, "{vel}");
        assert!((value - 0.976_470_6).abs() < 1e-5, "{value}");
    }

    #[test]
    fn velocity_moving_average() {
        let mut gravity = zeroed(GravityConfig::default());
        let mut param = Parameter::new(Array1::<f32>::zeros(3));
        gravity.attach(std::slice::from_ref(&param)).unwrap();

        let prev = array![0.2f32, -0.4, 1.].into_dyn();
        gravity.set_velocity(param.id(), prev.clone()).unwrap();
        gravity.set_iterations(8);

        let grad = array![1f32, -3., 0.5].into_dyn();
        gravity.apply_dense(grad.view(), &mut param).unwrap();

        let beta = effective_beta(0.9, 8);
        let expected = &prev * beta + &saturate(&grad.view()) * (1. - beta);
        let got = gravity.velocity(param.id()).unwrap();

        for (g, e) in got.iter().zip(expected.iter()) {
            assert!((g - e).abs() < 1e-6, "{g} != {e}");
        }
    }

    #[test]
    fn zero_gradient_decays_velocity() {
        let mut gravity = zeroed(GravityConfig::default());
        let mut param = Parameter::new(array![1f32, 1.]);
        gravity.attach(std::slice::from_ref(&param)).unwrap();
        gravity
            .set_velocity(param.id(), array![1f32, -1.].into_dyn())
            .unwrap();

        let grad = ArrayD::zeros(IxDyn(&[2]));
        gravity.apply_dense(grad.view(), &mut param).unwrap();

        let vel = gravity.velocity(param.id()).unwrap().to_owned();
        assert_eq!(vel, array![0.5f32, -0.5].into_dyn());
        assert!(param.value().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn one_slot_per_parameter() {
        let mut gravity = Gravity::seeded(GravityConfig::default(), 42).unwrap();
        let params = [
            Parameter::new(Array2::<f32>::zeros((2, 2))),
            Parameter::new(Array1::<f32>::zeros(5)),
            Parameter::new(Array2::<f32>::zeros((3, 3))),
        ];

        gravity.attach(&params).unwrap();
        gravity.attach(&params).unwrap();

        assert_eq!(gravity.slot_count(), 3);
        for param in &params {
            let slot = gravity.velocity(param.id()).unwrap();
            assert_eq!(slot.shape(), param.shape());
        }
    }

    #[test]
    fn reattach_with_other_shape_fails() {
        let mut gravity = zeroed(GravityConfig::default());
        let id = ParamId::next();

        gravity
            .attach(&[Parameter::with_id(id, Array1::<f32>::zeros(2))])
            .unwrap();
        let err = gravity
            .attach(&[Parameter::with_id(id, Array1::<f32>::zeros(3))])
            .unwrap_err();

        assert!(matches!(err, OptimErr::ShapeMismatch { .. }), "{err}");
        assert_eq!(gravity.velocity(id).unwrap().len(), 2);
    }

    #[test]
    fn unattached_parameter_fails() {
        let mut gravity = zeroed(GravityConfig::default());
        let mut param = Parameter::new(array![1f32]);
        let grad = array![0.5f32].into_dyn();

        let err = gravity.apply_dense(grad.view(), &mut param).unwrap_err();

        assert!(matches!(err, OptimErr::UnknownParameter(_)), "{err}");
        assert_eq!(param.value()[IxDyn(&[0])], 1.);
    }

    #[test]
    fn shape_mismatch_fails() {
        let mut gravity = zeroed(GravityConfig::default());
        let mut param = Parameter::new(array![1f32, 2.]);
        gravity.attach(std::slice::from_ref(&param)).unwrap();

        let grad = array![0.5f32].into_dyn();
        let err = gravity.apply_dense(grad.view(), &mut param).unwrap_err();

        assert!(matches!(err, OptimErr::ShapeMismatch { .. }), "{err}");
    }

    #[test]
    fn sparse_is_unimplemented() {
        let mut gravity = zeroed(GravityConfig::default());
        let mut param = Parameter::new(array![1f32, 2.]);
        gravity.attach(std::slice::from_ref(&param)).unwrap();

        let grad = array![0.5f32].into_dyn();
        let err = gravity
            .apply_sparse(&[1], grad.view(), &mut param)
            .unwrap_err();

        assert!(matches!(err, OptimErr::Unimplemented { .. }), "{err}");
        assert_eq!(param.value().to_owned(), array![1f32, 2.].into_dyn());
    }

    #[test]
    fn velocity_std_follows_config() {
        let config = GravityConfig {
            learning_rate: 0.1,
            alpha: 0.05,
            ..Default::default()
        };
        let mut gravity = Gravity::seeded(config, 3).unwrap();
        let param = Parameter::new(Array1::<f32>::zeros(20_000));
        gravity.attach(std::slice::from_ref(&param)).unwrap();

        let std = gravity.velocity(param.id()).unwrap().std(0.);
        assert!((std - 0.5).abs() < 0.02, "{std}");
    }

    #[test]
    fn velocity_std_follows_learning_rate_on_attach() {
        let config = GravityConfig {
            learning_rate: 0.1,
            alpha: 0.05,
            ..Default::default()
        };
        let mut gravity = Gravity::seeded(config, 3).unwrap();
        gravity.set_learning_rate(0.5);

        let param = Parameter::new(Array1::<f32>::zeros(20_000));
        gravity.attach(std::slice::from_ref(&param)).unwrap();

        let std = gravity.velocity(param.id()).unwrap().std(0.);
        assert!((std - 0.1).abs() < 0.01, "{std}");
    }

    #[test]
    fn empty_gradient_is_a_noop() {
        let mut gravity = zeroed(GravityConfig::default());
        let mut params = [Parameter::new(Array1::<f32>::zeros(0))];
        gravity.attach(&params).unwrap();

        let grads = [ArrayD::<f32>::zeros(IxDyn(&[0]))];
        gravity.apply_gradients(&grads, &mut params).unwrap();

        assert_eq!(params[0].shape(), &[0]);
        assert_eq!(gravity.velocity(params[0].id()).unwrap().len(), 0);
        assert_eq!(gravity.iterations(), 1);
    }

    #[test]
    fn update_rejects_mismatched_slot() {
        let mut param = Parameter::new(array![1f32, 2.]);
        let mut velocity = ArrayD::<f32>::zeros(IxDyn(&[3]));
        let grad = array![0.5f32, 0.5].into_dyn();

        let err = gravity_update(grad.view(), &mut velocity, &mut param, 0.1, 0.5).unwrap_err();

        assert!(matches!(err, OptimErr::ShapeMismatch { .. }), "{err}");
        assert_eq!(param.value().to_owned(), array![1f32, 2.].into_dyn());
    }

    #[test]
    fn distinct_parameters_update_in_parallel() {
        let shapes: [&[usize]; 3] = [&[2, 2], &[5], &[3, 3]];
        let mut sequential = zeroed(GravityConfig::default());
        let mut parallel = zeroed(GravityConfig::default());

        let mut a: Vec<_> = shapes
            .iter()
            .map(|&shape| Parameter::new(ArrayD::<f32>::ones(IxDyn(shape))))
            .collect();
        let mut b = a.clone();
        let grads: Vec<_> = shapes
            .iter()
            .enumerate()
            .map(|(i, &shape)| ArrayD::from_elem(IxDyn(shape), 0.1 * (i as f32 + 1.)))
            .collect();

        sequential.attach(&a).unwrap();
        parallel.attach(&b).unwrap();
        sequential.apply_gradients(&grads, &mut a).unwrap();

        let lr = parallel.decayed_learning_rate();
        let beta = parallel.current_beta();
        let mut slots: HashMap<_, _> = parallel.slots_mut().collect();

        std::thread::scope(|s| {
            let handles: Vec<_> = b
                .iter_mut()
                .zip(&grads)
                .map(|(param, grad)| {
                    let velocity = slots.remove(&param.id()).unwrap();
                    s.spawn(move || gravity_update(grad.view(), velocity, param, lr, beta))
                })
                .collect();

            for handle in handles {
                handle.join().unwrap().unwrap();
            }
        });
        parallel.finish_step();

        assert_eq!(parallel.iterations(), sequential.iterations());
        for (a, b) in a.iter().zip(&b) {
            assert_eq!(a.value(), b.value());
            assert_eq!(sequential.velocity(a.id()), parallel.velocity(b.id()));
        }
    }

    #[test]
    fn config_snapshot() {
        let config = GravityConfig {
            learning_rate: 0.3,
            beta: 0.8,
            decay: 0.01,
            ..Default::default()
        };
        let gravity = zeroed(config.clone());

        assert_eq!(gravity.config(), OptimizerConfig::Gravity(config));
    }
}
