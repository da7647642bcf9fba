use phylo_core::RngHandle;

/// Draws a windowed proposal around `old`, redrawing until `constraint`
/// holds. The constraint region must have positive overlap with the window
/// or this loops forever; callers guarantee that by construction (the old
/// value itself satisfies the constraint).
pub fn propose_in_window<F>(old: f64, span: f64, rng: &mut RngHandle, constraint: F) -> f64
where
    F: Fn(f64) -> bool,
{
    loop {
        let candidate = old + rng.next_f64() * span - span / 2.0;
        if constraint(candidate) {
            return candidate;
        }
    }
}

/// Length of the part of a half-window-`half` proposal window around a
/// point that lies inside the constraint region. `dist_below` and
/// `dist_above` are the distances from the point to the lower and upper
/// boundaries; `None` means unbounded on that side.
pub fn window_overlap(dist_below: Option<f64>, dist_above: Option<f64>, half: f64) -> f64 {
    let below = dist_below.map_or(half, |d| d.min(half));
    let above = dist_above.map_or(half, |d| d.min(half));
    below + above
}
