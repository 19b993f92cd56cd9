//! Chain state helpers.

use volt_chain::block::Height;

/// The heights to include in a block locator for a chain tipped at `tip`:
/// the tip, ten single steps back, then exponentially widening gaps down to
/// the genesis block.
///
/// Peers use the locator to find the fork point between two chains in
/// O(log n) messages.
pub fn block_locator_heights(tip: Height) -> Vec<Height> {
    let mut heights = Vec::new();
    let mut current = i64::from(tip.0);
    let mut step = 1i64;
    let mut unit_steps = 0u32;

    while current > 0 {
        heights.push(Height(current as u32));
        unit_steps += 1;
        if unit_steps > 10 {
            step *= 2;
        }
        current -= step;
    }
    heights.push(Height(0));
    heights
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locator_starts_at_tip_and_ends_at_genesis() {
        let heights = block_locator_heights(Height(1000));
        assert_eq!(heights.first(), Some(&Height(1000)));
        assert_eq!(heights.last(), Some(&Height(0)));
    }

    #[test]
    fn locator_walks_single_steps_then_doubles() {
        let heights = block_locator_heights(Height(100));
        // Tip plus ten unit steps.
        let unit: Vec<u32> = (90..=100).rev().collect();
        assert_eq!(
            &heights[0..11].iter().map(|h| h.0).collect::<Vec<_>>(),
            &unit
        );
        // Then gaps double: 88, 84, 76, 60, 28, 0.
        assert_eq!(
            heights[11..].iter().map(|h| h.0).collect::<Vec<_>>(),
            vec![88, 84, 76, 60, 28, 0]
        );
    }

    #[test]
    fn genesis_locator_is_just_genesis() {
        assert_eq!(block_locator_heights(Height(0)), vec![Height(0)]);
    }
}
