//! Delogo filter chain construction.

use unmark_models::Region;

/// Build a single `-vf` chain with one delogo clause per region.
///
/// Multiple regions merge into one invocation; the audio stream is
/// untouched by this chain.
pub fn delogo_chain(regions: &[Region]) -> String {
    regions
        .iter()
        .map(|r| format!("delogo=x={}:y={}:w={}:h={}", r.x, r.y, r.width, r.height))
        .collect::<Vec<_>>()
        .join(",")
}
