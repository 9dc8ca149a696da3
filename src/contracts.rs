//! Multihop contract binding

use alloy::primitives::{Address, Bytes};
use alloy::sol_types::SolCall;

alloy::sol! {
    interface IMultihop {
        function withdraw(address token) external;
    }
}

/// Calldata for `withdraw(token)` on the multihop contract
pub fn withdraw_calldata(token: Address) -> Bytes {
    IMultihop::withdrawCall { token }.abi_encode().into()
}
