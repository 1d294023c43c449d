//! Pointwise SRAD arithmetic shared by every execution strategy.
//!
//! All three strategies funnel through these helpers, so the coefficient
//! formula, the update stencil and the epsilon policy cannot drift apart
//! between them. Keeping the expression order identical here is what makes
//! the cross-strategy equivalence hold.

use crate::float_trait::SradFloat;

/// Magnitude floor applied to every denominator before division.
///
/// In flat regions both the gradient and the Laplacian are near zero and the
/// coefficient formula would otherwise divide by vanishing quantities; a NaN
/// produced here would silently corrupt the whole image on the following
/// iterations.
pub const DENOM_EPSILON: f64 = 1e-10;

/// Floor a denominator's magnitude at [`DENOM_EPSILON`], preserving sign.
#[inline]
fn guard_denominator<F: SradFloat>(value: F) -> F {
    let eps = F::from_f64_c(DENOM_EPSILON);
    if value.abs() < eps {
        if value < F::zero() {
            -eps
        } else {
            eps
        }
    } else {
        value
    }
}

/// Diffusion coefficient for one pixel from its intensity `j`, the four
/// directional derivatives and the region baseline `q0sqr`.
///
/// Computes the squared instantaneous coefficient of variation
///
/// ```text
/// g2  = (dn^2 + ds^2 + dw^2 + de^2) / j^2
/// l   = (dn + ds + dw + de) / j
/// q2  = (0.5*g2 - l^2/16) / (1 + l/4)^2
/// ```
///
/// and maps it against the baseline:
/// `c = 1 / (1 + (q2 - q0sqr) / (q0sqr * (1 + q0sqr)))`, clamped to `[0, 1]`.
/// Homogeneous regions (`q2 <= q0sqr`) saturate at 1 (full smoothing);
/// strong edges (`q2 >> q0sqr`) fall toward 0 (diffusion stops).
#[inline]
pub fn diffusion_coefficient<F: SradFloat>(j: F, dn: F, ds: F, dw: F, de: F, q0sqr: F) -> F {
    let one = F::one();
    let half = F::from_f64_c(0.5);
    let quarter = F::from_f64_c(0.25);
    let sixteenth = F::from_f64_c(1.0 / 16.0);

    let g2 = (dn * dn + ds * ds + dw * dw + de * de) / guard_denominator(j * j);
    let l = (dn + ds + dw + de) / guard_denominator(j);

    let num = half * g2 - sixteenth * (l * l);
    let den_base = one + quarter * l;
    let q2 = num / guard_denominator(den_base * den_base);

    let c = one / (one + (q2 - q0sqr) / guard_denominator(q0sqr * (one + q0sqr)));
    c.max(F::zero()).min(one)
}

/// Forward-difference divergence at one pixel.
///
/// `dn` and `dw` are first differences back into the pixel, so they are
/// weighted by the pixel's own coefficient; `ds` and `de` are weighted by the
/// south and east neighbors' own coefficients. This convention is shared by
/// all strategies and must not be re-derived per strategy.
#[inline]
pub fn divergence<F: SradFloat>(c_self: F, c_south: F, c_east: F, dn: F, ds: F, dw: F, de: F) -> F {
    c_self * dn + c_south * ds + c_self * dw + c_east * de
}

/// Apply the diffusion update to one pixel: `j + (lambda/4) * div`.
#[inline]
pub fn apply_update<F: SradFloat>(j: F, lambda: F, div: F) -> F {
    j + F::from_f64_c(0.25) * lambda * div
}
