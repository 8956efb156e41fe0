use std::{env, error::Error, fs};

use gravity::{GravityConfig, OptimizerBuilder, OptimizerConfig, Parameter};
use log::{info, warn};
use ndarray::{Array1, Array2, Ix1, array};
use ndarray_rand::RandomExt;
use rand::{SeedableRng, rngs::StdRng};
use rand_distr::Uniform;

const EPOCHS: usize = 300;
const SAMPLES: usize = 256;

/// Fits a linear regression with the optimizer described by an optional JSON config.
///
/// Usage: `gravity [config.json] [seed]`
fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let mut args = env::args().skip(1);

    let config = match args.next() {
        Some(path) => OptimizerConfig::from_json(&fs::read_to_string(path)?)?,
        None => GravityConfig::default().into(),
    };

    let seed = args.next().and_then(|s| match s.parse::<u64>() {
        Ok(seed) => Some(seed),
        Err(e) => {
            warn!("ignoring seed {s}: {e}");
            None
        }
    });

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let mut x = Array2::random_using((SAMPLES, 4), Uniform::new(-1f32, 1.)?, &mut rng);
    x.column_mut(3).fill(1.);

    let expected = array![2f32, -1., 0.5, 1.];
    let y = x.dot(&expected);

    let mut optimizer = OptimizerBuilder::new().seed(seed).build(config)?;
    let mut params = [Parameter::new(Array1::<f32>::zeros(4))];
    optimizer.attach(&params)?;

    for epoch in 0..EPOCHS {
        let theta = params[0].value().into_dimensionality::<Ix1>()?;
        let residual = x.dot(&theta) - &y;
        let loss = residual.mapv(|r| r * r).mean().unwrap_or_default();

        let grad = x.t().dot(&residual) * (2. / SAMPLES as f32);
        optimizer.apply_gradients(&[grad.into_dyn()], &mut params)?;

        if epoch % 20 == 0 {
            info!("epoch {epoch}: loss={loss:.6}");
        }
    }

    info!(
        "{} finished after {} steps, learned {} (expected {expected})",
        optimizer.name(),
        optimizer.iterations(),
        params[0].value()
    );

    Ok(())
}
