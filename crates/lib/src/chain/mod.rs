//! EVM collaborators: JSON-RPC client and the mint contract adapter.

mod evm;
mod nft;

pub use evm::{ChainError, EvmClient};
pub use nft::{reply_token_id, NftContract};
