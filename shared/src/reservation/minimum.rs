//! Minimum-remainder enforcement

use super::pool::PartPool;
use crate::models::OrderBasketHandle;

/// Order enough new lines to bring the part's free stock up to its floor.
///
/// Free stock is re-measured on every call, so repeating the call without
/// intervening consumption creates nothing.
pub fn top_up_minimum(pool: &mut PartPool, basket: &OrderBasketHandle) -> usize {
    let Some(floor) = pool.part().floor() else {
        return 0;
    };

    let free = pool.free_count();
    let gap = floor.saturating_sub(free);
    if gap == 0 {
        return 0;
    }

    pool.register_basket(basket);
    for _ in 0..gap {
        pool.push_ordered(basket, None, false);
    }

    tracing::info!(
        part_id = %pool.part_id(),
        floor,
        free,
        created = gap,
        "Topped up minimum remainder"
    );

    gap
}

/// Run the top-up over every part with a configured floor
pub fn check_minimum_remainder(pools: &mut [PartPool], basket: &OrderBasketHandle) -> usize {
    pools
        .iter_mut()
        .map(|pool| top_up_minimum(pool, basket))
        .sum()
}
