//! The destination contract's interface, consumed only, never reimplemented
//! (see the orchestrator's scope: "the on-chain smart contract is not
//! reimplemented"). Event selectors (`topic[0]` discriminants) are derived
//! at compile time from these canonical signatures by `alloy_sol_types`,
//! exactly as real clients of this contract must do.

use alloy_sol_types::sol;

sol! {
    #[derive(Debug)]
    interface IRelayRouter {
        function receiveAndForward(bytes message, bytes attestation, uint256 relayFee) external;

        event Relayed(uint32 sourceDomain, bytes32 sourceSender, bytes32 nonce, uint256 amount, uint256 relayFee);
        event FallbackTriggered(bytes32 fallbackRecipient, uint256 amount, uint256 relayFee);
        event RecoveredFromConsumedNonce(bytes32 nonce, uint256 amount);
        event OperatorRouted(bytes32 transferId, bytes32 nonce, uint256 amount, string reason);
    }
}
