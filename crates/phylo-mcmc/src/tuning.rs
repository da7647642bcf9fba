use phylo_core::TuningState;

use crate::config::TuningConfig;
use crate::stats::{AcceptCounter, MoveCounters};

/// Rescales the proposal spans from the rolling acceptance rates.
///
/// Called at a fixed cadence during burn-in only. For every tunable move
/// whose attempt count has passed the minimum-sample threshold, an
/// acceptance rate above the target band widens the proposal (the window
/// multiplier is divided by the window factor; the scalar spans are divided
/// by the span multiplier, which is below one) and a rate below the band
/// does the opposite. The counter of an adjusted move is reset so the next
/// check sees a fresh rate. The window multiplier is clamped to its
/// configured bounds; spans are unclamped, matching their role as plain
/// window widths.
pub fn tune_burn_in(tuning: &mut TuningState, counters: &mut MoveCounters, cfg: &TuningConfig) {
    if let Some(direction) = band_verdict(&counters.alignment, cfg) {
        tuning.window_multiplier = match direction {
            Verdict::OverAccepting => {
                (tuning.window_multiplier / cfg.window_change_factor).max(cfg.min_window_multiplier)
            }
            Verdict::UnderAccepting => {
                (tuning.window_multiplier * cfg.window_change_factor).min(cfg.max_window_multiplier)
            }
        };
        counters.alignment.reset();
    }
    adjust_span(&mut tuning.edge_span, &mut counters.edge, cfg);
    adjust_span(&mut tuning.r_span, &mut counters.r, cfg);
    adjust_span(&mut tuning.lambda_span, &mut counters.lambda, cfg);
    adjust_span(&mut tuning.mu_span, &mut counters.mu, cfg);
}

fn adjust_span(span: &mut f64, counter: &mut AcceptCounter, cfg: &TuningConfig) {
    match band_verdict(counter, cfg) {
        Some(Verdict::OverAccepting) => {
            *span /= cfg.span_multiplier;
            counter.reset();
        }
        Some(Verdict::UnderAccepting) => {
            *span *= cfg.span_multiplier;
            counter.reset();
        }
        None => {}
    }
}

enum Verdict {
    OverAccepting,
    UnderAccepting,
}

fn band_verdict(counter: &AcceptCounter, cfg: &TuningConfig) -> Option<Verdict> {
    if counter.attempted <= cfg.min_samples {
        return None;
    }
    let rate = counter.rate();
    if rate > cfg.max_acceptance {
        Some(Verdict::OverAccepting)
    } else if rate < cfg.min_acceptance {
        Some(Verdict::UnderAccepting)
    } else {
        None
    }
}
