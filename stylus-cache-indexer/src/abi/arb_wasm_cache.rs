//! ABI bindings for the ArbWasmCache precompile.
//!
//! ArbWasmCache is the ArbOS-side view of the Stylus code cache. The
//! indexer only needs the membership check, which backs the operator
//! `check-cached` command and the API layer's live verification path.

use alloy::sol;

sol! {
    /// Membership surface of the ArbWasmCache precompile.
    #[sol(rpc)]
    interface IArbWasmCache {
        /// Whether the given codehash is currently cached by ArbOS.
        function codehashIsCached(bytes32 codehash) external view returns (bool);
    }
}
