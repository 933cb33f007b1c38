//! ABI bindings for the CacheManager contract.
//!
//! CacheManager runs the on-chain bytecode cache auction:
//! - Bid placement (`InsertBid`) and eviction (`DeleteBid`)
//! - Cache parameter administration (`SetCacheSize`, `SetDecayRate`)
//! - Pause control (`Pause` / `Unpause`)
//!
//! # Solidity Contract
//!
//! ```solidity
//! contract CacheManager {
//!     event InsertBid(bytes32 indexed codehash, address program, uint192 bid, uint64 size);
//!     event DeleteBid(bytes32 indexed codehash, uint192 bid, uint64 size);
//!     // ... etc
//! }
//! ```

use alloy::sol;

sol! {
    /// Emitted when a program's bytecode is inserted into the cache.
    ///
    /// # Indexed Fields
    /// - `codehash`: Hash of the cached bytecode
    ///
    /// # Data Fields
    /// - `program`: Address of the program whose code was cached
    /// - `bid`: Raw bid as paid, including accrued decay
    /// - `size`: Bytecode size in bytes
    #[derive(Debug, PartialEq, Eq)]
    event InsertBid(
        bytes32 indexed codehash,
        address program,
        uint192 bid,
        uint64 size
    );

    /// Emitted when a cache entry is evicted.
    ///
    /// # Indexed Fields
    /// - `codehash`: Hash of the evicted bytecode
    ///
    /// # Data Fields
    /// - `bid`: Bid value the entry held at eviction time
    /// - `size`: Bytecode size in bytes
    #[derive(Debug, PartialEq, Eq)]
    event DeleteBid(
        bytes32 indexed codehash,
        uint192 bid,
        uint64 size
    );

    /// Emitted when bidding is paused.
    #[derive(Debug, PartialEq, Eq)]
    event Pause();

    /// Emitted when bidding is resumed.
    #[derive(Debug, PartialEq, Eq)]
    event Unpause();

    /// Emitted when the total cache capacity changes.
    #[derive(Debug, PartialEq, Eq)]
    event SetCacheSize(uint64 size);

    /// Emitted when the bid decay rate (wei per second) changes.
    #[derive(Debug, PartialEq, Eq)]
    event SetDecayRate(uint64 decay);

    /// Emitted once when the contract is initialized.
    #[derive(Debug, PartialEq, Eq)]
    event Initialized(uint8 version);
}

sol! {
    /// View surface used by the on-chain state poller.
    #[sol(rpc)]
    interface ICacheManager {
        /// A single cache entry.
        struct Entry {
            bytes32 code;
            uint64 size;
            uint192 bid;
        }

        /// Total cache capacity in bytes.
        function cacheSize() external view returns (uint64);

        /// Bytes currently occupied by cached entries.
        function queueSize() external view returns (uint64);

        /// Bid decay rate in wei per second.
        function decay() external view returns (uint64);

        /// Whether bidding is currently paused.
        function isPaused() external view returns (bool);

        /// Minimum bid required to cache a program of the given size.
        function getMinBid(uint64 size) external view returns (uint192);

        /// All current cache entries.
        function getEntries() external view returns (Entry[] memory);
    }
}
