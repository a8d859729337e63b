//! Integrates a two-dimensional peak with VEGAS and prints the grid of the last iteration as JSON.
use mcintir::callbacks::SimpleCallback;
use mcintir::integrands::make_integrand_with_parameters;
use mcintir::integrators::vegas::{self, VegasConfig};
use mcintir::Error;

use rand_pcg::Pcg64;

struct Peak {
    x0: f64,
    y0: f64,
    width: f64,
}

fn peak(x: &[f64], p: &Peak) -> f64 {
    let (dx, dy) = ((x[0] - p.x0) / p.width, (x[1] - p.y0) / p.width);

    (-0.5 * (dx * dx + dy * dy)).exp() / (2.0 * std::f64::consts::PI * p.width * p.width)
}

fn main() -> Result<(), Error> {
    let rng = Pcg64::new(0xcafef00dd15ea5e5, 0xa02bdbf7bb3c0a7ac28fa16a64abf96);
    let parameters = Peak {
        x0: 0.3,
        y0: 0.6,
        width: 0.05,
    };
    let integrand = make_integrand_with_parameters(2, parameters, peak);
    let config = VegasConfig {
        bins: 32,
        ..VegasConfig::default()
    };

    let chkpts = vegas::integrate(
        &integrand,
        &rng,
        &SimpleCallback {},
        &[10_000; 8],
        &config,
        None,
    )?;

    if let Some(chkpt) = chkpts.last() {
        let json = serde_json::to_string_pretty(chkpt.estimators().pdf())
            .map_err(|e| Error::InvalidPdf(e.to_string()))?;
        println!("{}", json);
    }

    Ok(())
}
