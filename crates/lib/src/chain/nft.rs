//! Mint contract adapter: mintNFT(address,uint256,string) and the tokenURI getter.

use crate::chain::{ChainError, EvmClient};
use ethers_core::abi::{self, ParamType, Token};
use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{Address, Bytes, H256, TransactionRequest, U256};
use ethers_core::utils::keccak256;
use ethers_signers::{LocalWallet, Signer};

const MINT_SIGNATURE: &str = "mintNFT(address,uint256,string)";
const TOKEN_URI_SIGNATURE: &str = "tokenURI(uint256)";

/// Token id for a reply: current Unix timestamp in milliseconds. Two requests landing in the
/// same millisecond collide; that is left unhandled.
pub fn reply_token_id() -> U256 {
    U256::from(chrono::Utc::now().timestamp_millis() as u64)
}

/// The deployed mint contract, reached through an `EvmClient`.
#[derive(Clone)]
pub struct NftContract {
    address: Address,
    client: EvmClient,
    fallback_gas: u64,
}

impl NftContract {
    pub fn new(address: Address, client: EvmClient, fallback_gas: u64) -> Self {
        Self {
            address,
            client,
            fallback_gas,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Mint a token with the given metadata string, signed locally and submitted raw.
    /// Returns the transaction hash. A reverted or failed submission propagates to the caller.
    pub async fn mint(
        &self,
        signer: &LocalWallet,
        to: Address,
        token_id: U256,
        metadata: &str,
    ) -> Result<H256, ChainError> {
        let data = mint_calldata(to, token_id, metadata);
        let from = signer.address();
        let chain_id = self.client.chain_id().await?;
        let nonce = self.client.transaction_count(from).await?;
        let gas_price = self.client.gas_price().await?;
        let gas = match self.client.estimate_gas(from, self.address, &data).await {
            Ok(g) => g,
            Err(e) => {
                log::debug!("eth_estimateGas failed ({}), using fallback gas limit", e);
                U256::from(self.fallback_gas)
            }
        };

        let tx: TypedTransaction = TransactionRequest::new()
            .from(from)
            .to(self.address)
            .data(data)
            .value(U256::zero())
            .nonce(nonce)
            .gas(gas)
            .gas_price(gas_price)
            .chain_id(chain_id)
            .into();
        let signature = signer
            .sign_transaction(&tx)
            .await
            .map_err(|e| ChainError::Sign(e.to_string()))?;
        let raw = tx.rlp_signed(&signature);
        self.client.send_raw_transaction(raw.as_ref()).await
    }

    /// Read a minted token's metadata back through the contract getter.
    pub async fn token_uri(&self, token_id: U256) -> Result<String, ChainError> {
        let data = token_uri_calldata(token_id);
        let out = self.client.call(self.address, &data).await?;
        decode_string_result(out.as_ref())
    }
}

fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// ABI-encoded calldata for mintNFT(to, tokenId, uri).
pub fn mint_calldata(to: Address, token_id: U256, uri: &str) -> Bytes {
    let mut encoded = selector(MINT_SIGNATURE).to_vec();
    encoded.extend(abi::encode(&[
        Token::Address(to),
        Token::Uint(token_id),
        Token::String(uri.to_string()),
    ]));
    Bytes::from(encoded)
}

fn token_uri_calldata(token_id: U256) -> Bytes {
    let mut encoded = selector(TOKEN_URI_SIGNATURE).to_vec();
    encoded.extend(abi::encode(&[Token::Uint(token_id)]));
    Bytes::from(encoded)
}

/// Decode a single ABI string return value (tokenURI result).
fn decode_string_result(raw: &[u8]) -> Result<String, ChainError> {
    let tokens = abi::decode(&[ParamType::String], raw)
        .map_err(|e| ChainError::Decode(format!("tokenURI: {}", e)))?;
    match tokens.into_iter().next() {
        Some(Token::String(s)) => Ok(s),
        _ => Err(ChainError::Decode("tokenURI: not a string".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn mint_calldata_layout() {
        let to = Address::from_str("0xAC99583EE8ae7BfCda7D43657F6a4c0c0Da7E0B8").unwrap();
        let data = mint_calldata(to, U256::from(7u64), "hi");
        // selector + (address, uint256, string-offset, string-length, padded "hi")
        assert_eq!(data.len(), 4 + 32 * 5);
        let mut padded_to = [0u8; 32];
        padded_to[12..].copy_from_slice(to.as_bytes());
        assert_eq!(&data[4..36], &padded_to[..]);
        assert_eq!(U256::from_big_endian(&data[36..68]), U256::from(7u64));
        // dynamic string head points past the three head words
        assert_eq!(U256::from_big_endian(&data[68..100]), U256::from(0x60u64));
        assert_eq!(U256::from_big_endian(&data[100..132]), U256::from(2u64));
        assert_eq!(&data[132..134], b"hi");
    }

    #[test]
    fn mint_and_token_uri_selectors_differ() {
        assert_ne!(selector(MINT_SIGNATURE), selector(TOKEN_URI_SIGNATURE));
    }

    #[test]
    fn decodes_token_uri_result() {
        let raw = abi::encode(&[Token::String("ipfs://QmReply".to_string())]);
        assert_eq!(decode_string_result(&raw).unwrap(), "ipfs://QmReply");
        assert!(decode_string_result(&[0u8; 3]).is_err());
    }

    #[test]
    fn reply_token_ids_differ_across_milliseconds() {
        let first = reply_token_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = reply_token_id();
        // Equal only when both land in the same millisecond, which the sleep rules out.
        assert!(second > first);
    }
}
