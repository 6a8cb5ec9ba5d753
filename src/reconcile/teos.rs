//! Depth/pressure conversion (TEOS-10, no dynamic height anomaly).
//!
//! Heights `z` are negative downward, as in the TEOS-10 toolbox. Pressure
//! is sea pressure in dbar. The specific volume used by the Newton step is
//! the exact derivative of the `enthalpy_SSO_0` polynomial, so
//! `z_from_p(p_from_z(z))` returns `z` to round-off.
//!
//! Practical salinity from conductivity follows PSS-78 with the Hill et al.
//! (1986) extension below SP = 2, as in the TEOS-10 toolbox.

use std::f64::consts::PI;

const DEG2RAD: f64 = PI / 180.0;
const DB2PA: f64 = 1.0e4;
const GAMMA: f64 = 2.26e-7;

/// Coefficients of `enthalpy_SSO_0` in powers of p·1e-4 (z¹ … z⁷)
const H: [f64; 7] = [
    9.726613854843870e-4,
    -2.252956605630465e-5,
    2.376909655387404e-6,
    -1.664294869986011e-7,
    -5.988108894465758e-9,
    -2.1078768810e-9,
    2.8019291329e-10,
];

const MAX_NEWTON_STEPS: usize = 10;
const NEWTON_TOLERANCE_DBAR: f64 = 1.0e-10;

/// Surface gravity (m/s²) at a latitude
fn surface_gravity(lat: f64) -> f64 {
    let sin2 = (lat * DEG2RAD).sin().powi(2);
    9.780327 * (1.0 + (5.2792e-3 + 2.32e-5 * sin2) * sin2)
}

/// Dynamic enthalpy at SA = SSO, CT = 0 (J/kg)
fn enthalpy_sso_0(p: f64) -> f64 {
    let z = p * 1.0e-4;
    let poly = H.iter().rev().fold(0.0, |acc, c| acc * z + c) * z;
    poly * DB2PA * 1.0e4
}

/// Specific volume at SA = SSO, CT = 0 (m³/kg)
fn specvol_sso_0(p: f64) -> f64 {
    let z = p * 1.0e-4;
    H.iter()
        .enumerate()
        .rev()
        .fold(0.0, |acc, (i, c)| acc * z + (i + 1) as f64 * c)
}

/// Height (m, negative below the surface) from sea pressure (dbar)
pub fn z_from_p(p: f64, lat: f64) -> f64 {
    let b = surface_gravity(lat);
    let a = -0.5 * GAMMA * b;
    let c = enthalpy_sso_0(p);
    -2.0 * c / (b + (b * b - 4.0 * a * c).sqrt())
}

/// Sea pressure (dbar) from height (m, negative below the surface)
///
/// Heights more than 5 m above the surface give NaN.
pub fn p_from_z(z: f64, lat: f64) -> f64 {
    if z.is_nan() || lat.is_nan() || z > 5.0 {
        return f64::NAN;
    }

    let sin2 = (lat * DEG2RAD).sin().powi(2);
    let gs = surface_gravity(lat);

    // Saunders (1981) first estimate
    let c1 = 5.25e-3 * sin2 + 5.92e-3;
    let mut p = -2.0 * z / ((1.0 - c1) + ((1.0 - c1) * (1.0 - c1) + 8.84e-6 * z).sqrt());

    for _ in 0..MAX_NEWTON_STEPS {
        let f = enthalpy_sso_0(p) + gs * (z - 0.5 * GAMMA * z * z);
        let step = f / (DB2PA * specvol_sso_0(p));
        p -= step;
        if step.abs() < NEWTON_TOLERANCE_DBAR {
            break;
        }
    }
    p
}

/// Sign convention of a stored depth array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthConvention {
    /// Depth grows positive downward (storage convention)
    PositiveDown,
    /// Depth is a height, negative below the surface
    NegativeDown,
}

impl DepthConvention {
    /// Majority vote over non-missing samples; ties are positive-down
    pub fn detect(depth: &[f64]) -> Self {
        let positive = depth.iter().filter(|d| **d > 0.0).count();
        let negative = depth.iter().filter(|d| **d < 0.0).count();
        if negative > positive {
            DepthConvention::NegativeDown
        } else {
            DepthConvention::PositiveDown
        }
    }

    /// Height (negative downward) of a depth in this convention
    pub fn to_height(self, depth: f64) -> f64 {
        match self {
            DepthConvention::PositiveDown => -depth,
            DepthConvention::NegativeDown => depth,
        }
    }

    /// Depth in this convention of a height (negative downward)
    pub fn from_height(self, z: f64) -> f64 {
        match self {
            DepthConvention::PositiveDown => -z,
            DepthConvention::NegativeDown => z,
        }
    }
}

/// Pressure for every depth sample, each with its own latitude
pub fn pressure_from_depth(depth: &[f64], lat: &[f64]) -> Vec<f64> {
    let convention = DepthConvention::detect(depth);
    depth
        .iter()
        .zip(lat)
        .map(|(&d, &la)| p_from_z(convention.to_height(d), la))
        .collect()
}

/// Depth for every pressure sample, expressed in `convention`
pub fn depth_from_pressure(press: &[f64], lat: &[f64], convention: DepthConvention) -> Vec<f64> {
    press
        .iter()
        .zip(lat)
        .map(|(&p, &la)| convention.from_height(z_from_p(p, la)))
        .collect()
}

// PSS-78 coefficients
const PSS_A: [f64; 6] = [0.0080, -0.1692, 25.3851, 14.0941, -7.0261, 2.7081];
const PSS_B: [f64; 6] = [0.0005, -0.0056, -0.0066, -0.0375, 0.0636, -0.0144];
const PSS_C: [f64; 5] = [0.6766097, 2.00564e-2, 1.104259e-4, -6.9698e-7, 1.0031e-9];
const PSS_D: [f64; 4] = [3.426e-2, 4.464e-4, 4.215e-1, -3.107e-3];
const PSS_E: [f64; 3] = [2.070e-5, -6.370e-10, 3.989e-15];
const PSS_K: f64 = 0.0162;

/// Conductivity (mS/cm) of SP = 35 seawater at 15 °C (IPTS-68), 0 dbar
pub const C3515: f64 = 42.9140;

/// Lower limit of the PSS-78 polynomial; the Hill extension applies below
const SP_HILL_LIMIT: f64 = 2.0;

fn horner(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Temperature term of PSS-78
fn ft68(t68: f64) -> f64 {
    (t68 - 15.0) / (1.0 + PSS_K * (t68 - 15.0))
}

/// PSS-78 practical salinity from the square root of the conductivity ratio
fn sp_pss78(rt: f64, ft: f64) -> f64 {
    horner(&PSS_A, rt) + ft * horner(&PSS_B, rt)
}

fn dsp_drt(rt: f64, ft: f64) -> f64 {
    let derivative = |coeffs: &[f64]| {
        coeffs
            .iter()
            .enumerate()
            .skip(1)
            .rev()
            .fold(0.0, |acc, (i, c)| acc * rt + i as f64 * c)
    };
    derivative(&PSS_A[..]) + ft * derivative(&PSS_B[..])
}

/// Hill et al. raw salinity for a given `rt`, before scaling
fn sp_hill_raw(sp: f64, rt: f64, ft: f64) -> f64 {
    let x = 400.0 * rt * rt;
    let sqrty = 10.0 * rt;
    let part1 = 1.0 + x * (1.5 + x);
    let part2 = 1.0 + sqrty * (1.0 + sqrty * (1.0 + sqrty));
    sp - PSS_A[0] / part1 - PSS_B[0] * ft / part2
}

/// Ratio that makes the Hill extension meet PSS-78 at SP = 2
fn hill_ratio_at_sp2(ft: f64) -> f64 {
    let mut rt = (SP_HILL_LIMIT / 35.0).sqrt();
    for _ in 0..MAX_NEWTON_STEPS {
        let step = (sp_pss78(rt, ft) - SP_HILL_LIMIT) / dsp_drt(rt, ft);
        rt -= step;
        if step.abs() < 1.0e-14 {
            break;
        }
    }
    SP_HILL_LIMIT / sp_hill_raw(SP_HILL_LIMIT, rt, ft)
}

/// Practical salinity from conductivity (mS/cm), in-situ temperature
/// (ITS-90 °C) and sea pressure (dbar)
///
/// Missing inputs and negative conductivity give NaN.
pub fn sp_from_c(c: f64, t: f64, p: f64) -> f64 {
    if c.is_nan() || t.is_nan() || p.is_nan() || c < 0.0 {
        return f64::NAN;
    }

    let t68 = t * 1.00024;
    let ft = ft68(t68);
    let r = c / C3515;

    let rt_lc = horner(&PSS_C, t68);
    let rp = 1.0
        + p * horner(&PSS_E, p)
            / (1.0 + PSS_D[0] * t68 + PSS_D[1] * t68 * t68 + (PSS_D[2] + PSS_D[3] * t68) * r);
    let rt = (r / (rp * rt_lc)).sqrt();

    let sp = sp_pss78(rt, ft);
    let sp = if sp < SP_HILL_LIMIT {
        hill_ratio_at_sp2(ft) * sp_hill_raw(sp, rt, ft)
    } else {
        sp
    };
    sp.max(0.0)
}

/// Salinity for every conductivity sample with its temperature and pressure
pub fn salinity_from_conductivity(cond: &[f64], temp: &[f64], press: &[f64]) -> Vec<f64> {
    cond.iter()
        .zip(temp)
        .zip(press)
        .map(|((&c, &t), &p)| sp_from_c(c, t, p))
        .collect()
}
