//! Network layer: node clients behind small traits so backends can be driven by mocks.

pub mod evm;
pub mod solana;
