//! Block subsidies and halvings.

use volt_chain::amount::Amount;
use volt_chain::block::Height;
use volt_chain::parameters::{Network, NetworkParameters};

use crate::error::SubsidyError;

/// The block subsidy at `height`.
///
/// The subsidy starts at the network's maximum and halves every halving
/// interval; after the 64th halving the shift would wrap, so the subsidy is
/// pinned to zero.
pub fn block_subsidy(height: Height, network: Network) -> Amount {
    let params = NetworkParameters::for_network(network);
    let halvings = height.0 / params.halving_interval;
    if halvings >= 64 {
        return Amount::zero();
    }
    Amount::from_units(params.max_block_subsidy >> halvings)
}

/// Returns `Ok(())` if a coinbase paying out `coinbase_paid` is within the
/// subsidy plus `fees` at `height`.
pub fn coinbase_is_valid(
    coinbase_paid: Amount,
    height: Height,
    network: Network,
    fees: Amount,
) -> Result<(), SubsidyError> {
    let allowed = block_subsidy(height, network).checked_add(fees)?;
    if coinbase_paid > allowed {
        return Err(SubsidyError::OverSubsidy {
            paid: coinbase_paid,
            allowed,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use volt_chain::amount::COIN;

    #[test]
    fn subsidy_halves_on_schedule() {
        let network = Network::Mainnet;
        let interval = NetworkParameters::for_network(network).halving_interval;

        assert_eq!(block_subsidy(Height(0), network), Amount::from_units(50 * COIN));
        assert_eq!(
            block_subsidy(Height(interval - 1), network),
            Amount::from_units(50 * COIN)
        );
        assert_eq!(
            block_subsidy(Height(interval), network),
            Amount::from_units(25 * COIN)
        );
        assert_eq!(
            block_subsidy(Height(interval * 2), network),
            Amount::from_units(1_250_000_000)
        );
    }

    #[test]
    fn subsidy_runs_out_after_sixty_four_halvings() {
        let network = Network::Mainnet;
        let interval = NetworkParameters::for_network(network).halving_interval;
        assert_eq!(block_subsidy(Height(interval * 64), network), Amount::zero());
        // The shift result is already far below one unit well before that.
        assert_eq!(block_subsidy(Height(interval * 33), network), Amount::zero());
    }

    #[test]
    fn coinbase_may_pay_subsidy_plus_fees_but_no_more() {
        let height = Height(1);
        let fees = Amount::from_units(1_000);
        let allowed = block_subsidy(height, Network::Mainnet)
            .checked_add(fees)
            .unwrap();

        assert!(coinbase_is_valid(allowed, height, Network::Mainnet, fees).is_ok());
        assert!(coinbase_is_valid(
            allowed.checked_add(Amount::from_units(1)).unwrap(),
            height,
            Network::Mainnet,
            fees
        )
        .is_err());
    }
}
