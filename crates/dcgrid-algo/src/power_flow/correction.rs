//! Fixed factors between the AC-equivalent solve and single-phase DC magnitudes.

use dcgrid_core::Kilowatts;

pub const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// DC power as handed to the solver
#[inline]
pub fn ac_equivalent(dc: Kilowatts) -> Kilowatts {
    dc * SQRT_3
}

/// Solver power back to DC
#[inline]
pub fn dc_power(ac: Kilowatts) -> Kilowatts {
    ac / SQRT_3
}

/// Solver line loss back to DC (two conductors instead of three)
#[inline]
pub fn dc_line_loss(ac: Kilowatts) -> Kilowatts {
    ac * (2.0 / 3.0)
}
