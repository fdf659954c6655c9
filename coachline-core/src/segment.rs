//! Segment overlap arithmetic for seats sold by stop range.
//!
//! Ranges are half-open over stop order indices: a passenger riding `[a, b)`
//! leaves the seat at stop `b`, so another passenger may board there.

use coachline_shared::Segment;

/// Returns `true` when the candidate range conflicts with any existing one.
///
/// Fails closed: an unknown stop, a range that does not move forward, or an
/// existing occupant without segment data all count as a conflict.
pub fn overlaps<'a, I>(stop_order: &[String], origin: &str, destination: &str, existing: I) -> bool
where
    I: IntoIterator<Item = Option<&'a Segment>>,
{
    let Some((a, b)) = resolve(stop_order, origin, destination) else {
        return true;
    };

    existing.into_iter().any(|segment| match segment {
        None => true,
        Some(s) => match resolve(stop_order, &s.origin_stop, &s.destination_stop) {
            Some((c, d)) => a < d && b > c,
            None => true,
        },
    })
}

fn resolve(stop_order: &[String], origin: &str, destination: &str) -> Option<(usize, usize)> {
    let from = stop_order.iter().position(|s| s == origin)?;
    let to = stop_order.iter().position(|s| s == destination)?;
    (from < to).then_some((from, to))
}
