//! ABI bindings for the CacheManagerAutomation contract.
//!
//! Contract owners can delegate bid placement to the automation contract,
//! which rebids on their behalf up to a configured ceiling. The indexer
//! tracks the opt-in lifecycle through these two events.

use alloy::sol;

sol! {
    /// Emitted when a contract enrolls in automated bidding.
    ///
    /// # Indexed Fields
    /// - `user`: Wallet that enrolled the contract
    /// - `contractAddress`: The enrolled contract
    ///
    /// # Data Fields
    /// - `maxBid`: Ceiling the automation may bid up to
    #[derive(Debug, PartialEq, Eq)]
    event ContractAdded(
        address indexed user,
        address indexed contractAddress,
        uint256 maxBid
    );

    /// Emitted when an enrolled contract's bid ceiling changes.
    ///
    /// # Indexed Fields
    /// - `contractAddress`: The enrolled contract
    ///
    /// # Data Fields
    /// - `maxBid`: New bid ceiling
    #[derive(Debug, PartialEq, Eq)]
    event ContractUpdated(
        address indexed contractAddress,
        uint256 maxBid
    );
}

#[cfg(test)]
mod tests {
    use alloy::sol_types::SolEvent;

    use super::*;

    #[test]
    fn event_signatures_match_abi() {
        assert_eq!(
            ContractAdded::SIGNATURE,
            "ContractAdded(address,address,uint256)"
        );
        assert_eq!(ContractUpdated::SIGNATURE, "ContractUpdated(address,uint256)");
    }
}
