//! Mean-shift window search over a probability map.
//!
//! The window is moved to the centroid of the map inside it until the shift
//! becomes small or the iteration limit is reached. Shifts are rounded half to
//! even so a centroid sitting exactly between two pixels does not oscillate.

use anyhow::{anyhow, Result};
use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::Rect;

/// When to stop shifting: after `max_iterations`, or once a step moves the
/// window by less than `epsilon` pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TermCriteria {
    pub max_iterations: u32,
    pub epsilon: f64,
}

impl Default for TermCriteria {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            epsilon: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeanShiftOutcome {
    /// Final window, always inside the map.
    pub window: Rect,
    /// Shift steps taken.
    pub iterations: u32,
    /// Stopped on `epsilon` rather than on the iteration limit or an empty map.
    pub converged: bool,
}

/// Zeroth and first raw moments of `map` over `rect`, in rect-local coordinates.
fn moments(map: &GrayImage, rect: Rect) -> (f64, f64, f64) {
    let (mut m00, mut m10, mut m01) = (0.0f64, 0.0f64, 0.0f64);
    for ly in 0..rect.height {
        let mut row_sum = 0u64;
        let mut row_x = 0u64;
        for lx in 0..rect.width {
            let v = map.get_pixel((rect.x + lx) as u32, (rect.y + ly) as u32).0[0] as u64;
            row_sum += v;
            row_x += v * lx as u64;
        }
        m00 += row_sum as f64;
        m10 += row_x as f64;
        m01 += row_sum as f64 * ly as f64;
    }
    (m00, m10, m01)
}

/// Shift `window` toward the densest part of `map`.
///
/// Errors when `window` does not overlap the map at all.
pub fn mean_shift(map: &GrayImage, window: Rect, criteria: TermCriteria) -> Result<MeanShiftOutcome> {
    let bounds = Rect::new(0, 0, map.width() as i32, map.height() as i32);
    if window.intersect(&bounds).is_empty() {
        return Err(anyhow!(
            "mean shift window {} lies outside the {}x{} frame",
            window,
            bounds.width,
            bounds.height
        ));
    }

    let max_iterations = criteria.max_iterations.max(1);
    let eps = (criteria.epsilon.max(0.0) * criteria.epsilon.max(0.0)).round() as i64;
    let half_w = window.width as f64 * 0.5;
    let half_h = window.height as f64 * 0.5;

    let mut current = window;
    let mut iterations = 0;
    let mut converged = false;

    while iterations < max_iterations {
        current = current.intersect(&bounds);
        if current.is_empty() {
            break;
        }

        let (m00, m10, m01) = moments(map, current);
        if m00.abs() < f64::EPSILON {
            break;
        }

        let dx = (m10 / m00 - half_w).round_ties_even() as i32;
        let dy = (m01 / m00 - half_h).round_ties_even() as i32;
        let nx = (current.x + dx).clamp(0, bounds.width - current.width);
        let ny = (current.y + dy).clamp(0, bounds.height - current.height);
        let (dx, dy) = ((nx - current.x) as i64, (ny - current.y) as i64);
        current.x = nx;
        current.y = ny;
        iterations += 1;

        if dx * dx + dy * dy < eps {
            converged = true;
            break;
        }
    }

    log::trace!(
        "mean shift {} -> {} in {} steps (converged={})",
        window,
        current,
        iterations,
        converged
    );
    Ok(MeanShiftOutcome {
        window: current,
        iterations,
        converged,
    })
}
