// Copyright 2020 @TwoCookingMice

use super::constants::{Float, Matrix3f, Vector3f};
use super::lerp;

pub const LAMBDA_MIN: Float = 360.0;
pub const LAMBDA_MAX: Float = 830.0;
pub const N_SPECTRUM_SAMPLES: usize = 4;

/// Integral of the CIE Y matching function over the visible range.
pub const CIE_Y_INTEGRAL: Float = 106.856895;

/// Planck's law, in W·sr⁻¹·m⁻³, for a wavelength given in nanometres.
pub fn planck(lambda_nm: Float, kelvin: Float) -> Float {
    const C: f64 = 299792458.0;
    const H: f64 = 6.62606957e-34;
    const KB: f64 = 1.3806488e-23;

    if kelvin <= 0.0 {
        return 0.0;
    }
    let l = lambda_nm as f64 * 1e-9;
    let exponent = (H * C) / (l * KB * kelvin as f64);
    ((2.0 * H * C * C) / (l.powi(5) * (exponent.exp() - 1.0))) as Float
}

/// Blackbody emitter scaled so its peak is 1.
#[derive(Debug, Clone, Copy)]
pub struct Blackbody {
    kelvin: Float,
    normalization: Float,
}

impl Blackbody {
    pub fn new(kelvin: Float) -> Self {
        // Wien's displacement law gives the peak wavelength.
        let peak_nm = 2.8977721e-3 / kelvin * 1e9;
        let peak = planck(peak_nm, kelvin);
        Self {
            kelvin,
            normalization: if peak > 0.0 { 1.0 / peak } else { 0.0 },
        }
    }

    pub fn kelvin(&self) -> Float {
        self.kelvin
    }

    pub fn evaluate(&self, lambda_nm: Float) -> Float {
        planck(lambda_nm, self.kelvin) * self.normalization
    }
}

/// A set of wavelengths stratified over the visible range, all with the same pdf.
#[derive(Debug, Clone, Copy)]
pub struct SampledWavelengths {
    pub lambda: [Float; N_SPECTRUM_SAMPLES],
    pub pdf: Float,
}

impl SampledWavelengths {
    pub fn sample_visible(u: Float) -> Self {
        let mut lambda = [0.0; N_SPECTRUM_SAMPLES];
        lambda[0] = lerp(u, LAMBDA_MIN, LAMBDA_MAX);
        let delta = (LAMBDA_MAX - LAMBDA_MIN) / N_SPECTRUM_SAMPLES as Float;
        for i in 1..N_SPECTRUM_SAMPLES {
            lambda[i] = lambda[i - 1] + delta;
            if lambda[i] > LAMBDA_MAX {
                lambda[i] = LAMBDA_MIN + (lambda[i] - LAMBDA_MAX);
            }
        }

        Self {
            lambda,
            pdf: 1.0 / (LAMBDA_MAX - LAMBDA_MIN),
        }
    }
}

fn lobe(lambda: Float, mu: Float, sigma_lo: Float, sigma_hi: Float) -> Float {
    let sigma = if lambda < mu { sigma_lo } else { sigma_hi };
    let t = (lambda - mu) / sigma;
    (-0.5 * t * t).exp()
}

/// CIE 1931 colour matching functions, multi-lobe Gaussian fit
/// (Wyman, Sloan and Shirley 2013).
pub fn cie_xyz(lambda: Float) -> Vector3f {
    let x = 1.056 * lobe(lambda, 599.8, 37.9, 31.0) + 0.362 * lobe(lambda, 442.0, 16.0, 26.7)
        - 0.065 * lobe(lambda, 501.1, 20.4, 26.2);
    let y = 0.821 * lobe(lambda, 568.8, 46.9, 40.5) + 0.286 * lobe(lambda, 530.9, 16.3, 31.1);
    let z = 1.217 * lobe(lambda, 437.0, 11.8, 36.0) + 0.681 * lobe(lambda, 459.0, 26.0, 13.8);
    Vector3f::new(x, y, z)
}

/// Monte Carlo estimate of the XYZ colour of `spectrum` from one wavelength set.
pub fn estimate_xyz(spectrum: impl Fn(Float) -> Float, wavelengths: &SampledWavelengths) -> Vector3f {
    let mut xyz = Vector3f::zeros();
    for lambda in wavelengths.lambda.iter() {
        xyz += cie_xyz(*lambda) * (spectrum(*lambda) / wavelengths.pdf);
    }
    xyz / (N_SPECTRUM_SAMPLES as Float * CIE_Y_INTEGRAL)
}

/// XYZ to linear sRGB (D65 white).
pub fn xyz_to_linear_srgb(xyz: &Vector3f) -> Vector3f {
    let m = Matrix3f::new(
        3.2404542, -1.5371385, -0.4985314,
        -0.9692660, 1.8760108, 0.0415560,
        0.0556434, -0.2040259, 1.0572252,
    );
    m * xyz
}
