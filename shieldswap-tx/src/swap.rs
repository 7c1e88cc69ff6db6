//! Swap call assembly.
//!
//! A private swap runs two calls through the relay adapt contract: an ERC-20
//! approval of the router and the router's `execute`. The swapped output is
//! sent back to the relay adapt contract, which re-shields it.

use ethers::abi::{self, Token};
use ethers::types::{Address, Bytes, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};
use shieldswap_engine::ContractCall;

const APPROVE_SIGNATURE: &str = "approve(address,uint256)";
const EXECUTE_SIGNATURE: &str = "execute((address,bytes,uint256)[],uint256,uint256,address)";

/// One hop of a routed swap, as returned by the quote service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapStep {
    pub target: Address,
    pub data: Bytes,
    #[serde(default)]
    pub value: U256,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapQuote {
    pub sell_token: Address,
    pub buy_token: Address,
    pub from_amount: U256,
    pub to_amount: U256,
    pub min_received: U256,
    pub router: Address,
    pub steps: Vec<SwapStep>,
}

fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn call(to: Address, signature: &str, args: &[Token]) -> ContractCall {
    let mut data = selector(signature).to_vec();
    data.extend_from_slice(&abi::encode(args));
    ContractCall {
        to,
        data: Bytes::from(data),
        value: U256::zero(),
    }
}

pub fn approve_call(token: Address, spender: Address, amount: U256) -> ContractCall {
    call(
        token,
        APPROVE_SIGNATURE,
        &[Token::Address(spender), Token::Uint(amount)],
    )
}

pub fn execute_call(
    router: Address,
    steps: &[SwapStep],
    amount_in: U256,
    min_out: U256,
    recipient: Address,
) -> ContractCall {
    let steps = steps
        .iter()
        .map(|step| {
            Token::Tuple(vec![
                Token::Address(step.target),
                Token::Bytes(step.data.to_vec()),
                Token::Uint(step.value),
            ])
        })
        .collect();
    call(
        router,
        EXECUTE_SIGNATURE,
        &[
            Token::Array(steps),
            Token::Uint(amount_in),
            Token::Uint(min_out),
            Token::Address(recipient),
        ],
    )
}

/// Approval followed by execution, for `amount_in` of the sell token.
pub fn swap_calls(quote: &SwapQuote, amount_in: U256, min_out: U256, recipient: Address) -> Vec<ContractCall> {
    vec![
        approve_call(quote.sell_token, quote.router, amount_in),
        execute_call(quote.router, &quote.steps, amount_in, min_out, recipient),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::ParamType;

    #[test]
    fn approve_uses_erc20_selector() {
        let call = approve_call(
            Address::repeat_byte(1),
            Address::repeat_byte(2),
            U256::from(997u64),
        );
        assert_eq!(&call.data[..4], &[0x09, 0x5e, 0xa7, 0xb3]);
        let decoded = abi::decode(&[ParamType::Address, ParamType::Uint(256)], &call.data[4..]).unwrap();
        assert_eq!(decoded[0], Token::Address(Address::repeat_byte(2)));
        assert_eq!(decoded[1], Token::Uint(U256::from(997u64)));
        assert_eq!(call.to, Address::repeat_byte(1));
    }

    #[test]
    fn execute_encodes_adjusted_amounts() {
        let quote = SwapQuote {
            sell_token: Address::repeat_byte(0xaa),
            buy_token: Address::repeat_byte(0xbb),
            from_amount: U256::from(1_000u64),
            to_amount: U256::from(2_100u64),
            min_received: U256::from(2_000u64),
            router: Address::repeat_byte(0xcc),
            steps: vec![SwapStep {
                target: Address::repeat_byte(0xdd),
                data: Bytes::from(vec![0xab, 0xcd]),
                value: U256::zero(),
            }],
        };
        let calls = swap_calls(&quote, U256::from(997u64), U256::from(1_994u64), Address::repeat_byte(0xee));
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].to, quote.router);

        let params = [
            ParamType::Array(Box::new(ParamType::Tuple(vec![
                ParamType::Address,
                ParamType::Bytes,
                ParamType::Uint(256),
            ]))),
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Address,
        ];
        let decoded = abi::decode(&params, &calls[1].data[4..]).unwrap();
        assert_eq!(decoded[1], Token::Uint(U256::from(997u64)));
        assert_eq!(decoded[2], Token::Uint(U256::from(1_994u64)));
        assert_eq!(decoded[3], Token::Address(Address::repeat_byte(0xee)));
    }
}
