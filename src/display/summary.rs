use crate::mcmc::MetropolisHastingsMove;
use std::fmt::Write;

/// Renders a fixed-width table of move statistics. Meant for people, not parsers.
pub fn format_move_summary(moves: &[MetropolisHastingsMove]) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "{:<28} {:>8} {:>10} {:>10} {:>8}  {}",
        "Move", "Weight", "Tried", "Accepted", "Ratio", "Parameters"
    );
    let _ = writeln!(output, "{}", "-".repeat(90));

    for mv in moves {
        let summary = mv.summary();
        let _ = writeln!(
            output,
            "{:<28} {:>8.2} {:>10} {:>10} {:>8.4}  {}",
            summary.name,
            summary.weight,
            summary.tried,
            summary.accepted,
            summary.acceptance_rate(),
            summary.parameter
        );
    }
    output
}
