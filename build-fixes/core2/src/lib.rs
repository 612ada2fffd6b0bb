// Stub to satisfy resolution of the yanked core2 0.4.0.
// Only reached through polkadot-omni-node-lib, an optional polkadot-sdk
// dependency that this pallet never enables, so this crate is never compiled.
