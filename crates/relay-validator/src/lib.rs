//! Parses and validates the attested payload before it is handed to the
//! submitter. Pure: no I/O, no shared state, and calling it twice with the
//! same bytes and the same local policy always yields the same result.
//!
//! The payload is packed binary with fixed absolute byte offsets; every
//! multi-byte integer is big-endian. Layout (offsets from the start of the
//! message):
//!
//! ```text
//! 0                 8                         12                        44
//! |  (unchecked)     | destinationDomain (u32) | nonce (32 bytes)         |
//!
//! 44                                       108                        140
//! |  (unchecked)                             | destinationCaller (32)   |
//!
//! 140                                      184                        216
//! |  (unchecked)                             | mintRecipient (32)       |
//!
//! 216                                     248
//! |  amount (u256, 32 bytes)                |
//! ```

use alloy_primitives::{Address, U256};

/// The outer header is 148 bytes; the minimum complete message (header
/// through the amount field) is 248 bytes.
pub const HEADER_LEN: usize = 148;
pub const MIN_MESSAGE_LEN: usize = 248;

const DESTINATION_DOMAIN_OFFSET: usize = 8;
const DESTINATION_DOMAIN_LEN: usize = 4;
const NONCE_OFFSET: usize = 12;
const NONCE_LEN: usize = 32;
const DESTINATION_CALLER_OFFSET: usize = 108;
const DESTINATION_CALLER_LEN: usize = 32;
const MINT_RECIPIENT_OFFSET: usize = 184;
const MINT_RECIPIENT_LEN: usize = 32;
const AMOUNT_OFFSET: usize = 216;
const AMOUNT_LEN: usize = 32;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("message too short")]
    MessageTooShort,

    #[error("destination domain {0} != {1}")]
    WrongDestinationDomain(u32, u32),

    #[error("destinationCaller {0} != router or zero")]
    WrongDestinationCaller(String),

    #[error("mintRecipient {0} != router {1}")]
    WrongMintRecipient(String, String),
}

/// The fields the submitter needs, plus the one fact (`destination_caller_is_zero`)
/// the poller logs a warning about. The validator itself performs no I/O,
/// so it surfaces the fact rather than logging it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedMessage {
    pub mint_recipient: Address,
    pub destination_domain: u32,
    pub nonce: [u8; 32],
    /// Decimal string representation of the uint256 amount.
    pub amount: String,
    /// True when `destinationCaller` was all-zero, which accepts the
    /// message but exposes the transfer to front-running by any caller.
    pub destination_caller_is_zero: bool,
}

fn read_address_from_bytes32(word: &[u8]) -> Address {
    debug_assert_eq!(word.len(), 32);
    Address::from_slice(&word[12..32])
}

/// Validates `message` against the local domain identifier and router
/// address, returning the fields the store persists on a successful
/// `attested` transition.
pub fn validate(
    message: &[u8],
    local_domain: u32,
    router: Address,
) -> Result<ValidatedMessage, ValidationError> {
    if message.len() < MIN_MESSAGE_LEN {
        return Err(ValidationError::MessageTooShort);
    }

    let destination_domain = u32::from_be_bytes(
        message[DESTINATION_DOMAIN_OFFSET..DESTINATION_DOMAIN_OFFSET + DESTINATION_DOMAIN_LEN]
            .try_into()
            .unwrap(),
    );
    if destination_domain != local_domain {
        return Err(ValidationError::WrongDestinationDomain(
            destination_domain,
            local_domain,
        ));
    }

    let mut nonce = [0u8; 32];
    nonce.copy_from_slice(&message[NONCE_OFFSET..NONCE_OFFSET + NONCE_LEN]);

    let destination_caller_word =
        &message[DESTINATION_CALLER_OFFSET..DESTINATION_CALLER_OFFSET + DESTINATION_CALLER_LEN];
    let destination_caller_is_zero = destination_caller_word.iter().all(|&b| b == 0);
    if !destination_caller_is_zero {
        let destination_caller = read_address_from_bytes32(destination_caller_word);
        if destination_caller != router {
            return Err(ValidationError::WrongDestinationCaller(format!(
                "{destination_caller:#x}"
            )));
        }
    }

    let mint_recipient_word =
        &message[MINT_RECIPIENT_OFFSET..MINT_RECIPIENT_OFFSET + MINT_RECIPIENT_LEN];
    let mint_recipient = read_address_from_bytes32(mint_recipient_word);
    if mint_recipient != router {
        return Err(ValidationError::WrongMintRecipient(
            format!("{mint_recipient:#x}"),
            format!("{router:#x}"),
        ));
    }

    let amount = U256::from_be_slice(&message[AMOUNT_OFFSET..AMOUNT_OFFSET + AMOUNT_LEN]);

    Ok(ValidatedMessage {
        mint_recipient,
        destination_domain,
        nonce,
        amount: amount.to_string(),
        destination_caller_is_zero,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROUTER: Address = Address::new([0x11; 20]);

    fn message_of(len: usize, router: Address, destination_domain: u32) -> Vec<u8> {
        let mut msg = vec![0u8; len];
        if len > DESTINATION_DOMAIN_OFFSET + DESTINATION_DOMAIN_LEN {
            msg[DESTINATION_DOMAIN_OFFSET..DESTINATION_DOMAIN_OFFSET + DESTINATION_DOMAIN_LEN]
                .copy_from_slice(&destination_domain.to_be_bytes());
        }
        if len >= MINT_RECIPIENT_OFFSET + MINT_RECIPIENT_LEN {
            msg[MINT_RECIPIENT_OFFSET + 12..MINT_RECIPIENT_OFFSET + MINT_RECIPIENT_LEN]
                .copy_from_slice(router.as_slice());
        }
        if len >= AMOUNT_OFFSET + AMOUNT_LEN {
            msg[AMOUNT_OFFSET + AMOUNT_LEN - 1] = 42; // amount = 42
        }
        msg
    }

    #[test]
    fn rejects_247_bytes_as_too_short() {
        let msg = message_of(247, ROUTER, 0);
        assert_eq!(
            validate(&msg, 0, ROUTER).unwrap_err(),
            ValidationError::MessageTooShort
        );
    }

    #[test]
    fn accepts_exactly_248_bytes_with_well_formed_fields() {
        let msg = message_of(MIN_MESSAGE_LEN, ROUTER, 0);
        let validated = validate(&msg, 0, ROUTER).unwrap();
        assert_eq!(validated.destination_domain, 0);
        assert_eq!(validated.mint_recipient, ROUTER);
        assert_eq!(validated.amount, "42");
        assert!(validated.destination_caller_is_zero);
    }

    #[test]
    fn rejects_wrong_destination_domain() {
        let msg = message_of(MIN_MESSAGE_LEN, ROUTER, 7);
        assert_eq!(
            validate(&msg, 0, ROUTER).unwrap_err(),
            ValidationError::WrongDestinationDomain(7, 0)
        );
    }

    #[test]
    fn accepts_zero_destination_caller_with_warning_flag() {
        let msg = message_of(MIN_MESSAGE_LEN, ROUTER, 0);
        let validated = validate(&msg, 0, ROUTER).unwrap();
        assert!(validated.destination_caller_is_zero);
    }

    #[test]
    fn accepts_destination_caller_equal_to_router() {
        let mut msg = message_of(MIN_MESSAGE_LEN, ROUTER, 0);
        msg[DESTINATION_CALLER_OFFSET + 12..DESTINATION_CALLER_OFFSET + DESTINATION_CALLER_LEN]
            .copy_from_slice(ROUTER.as_slice());
        let validated = validate(&msg, 0, ROUTER).unwrap();
        assert!(!validated.destination_caller_is_zero);
    }

    #[test]
    fn rejects_destination_caller_neither_zero_nor_router() {
        let mut msg = message_of(MIN_MESSAGE_LEN, ROUTER, 0);
        let other = Address::new([0x22; 20]);
        msg[DESTINATION_CALLER_OFFSET + 12..DESTINATION_CALLER_OFFSET + DESTINATION_CALLER_LEN]
            .copy_from_slice(other.as_slice());
        assert!(matches!(
            validate(&msg, 0, ROUTER).unwrap_err(),
            ValidationError::WrongDestinationCaller(_)
        ));
    }

    #[test]
    fn rejects_wrong_mint_recipient() {
        let mut msg = message_of(MIN_MESSAGE_LEN, ROUTER, 0);
        let other = Address::new([0x33; 20]);
        msg[MINT_RECIPIENT_OFFSET + 12..MINT_RECIPIENT_OFFSET + MINT_RECIPIENT_LEN]
            .copy_from_slice(other.as_slice());
        assert!(matches!(
            validate(&msg, 0, ROUTER).unwrap_err(),
            ValidationError::WrongMintRecipient(_, _)
        ));
    }

    #[test]
    fn is_pure_repeated_calls_agree() {
        let msg = message_of(MIN_MESSAGE_LEN, ROUTER, 0);
        let a = validate(&msg, 0, ROUTER);
        let b = validate(&msg, 0, ROUTER);
        assert_eq!(a, b);
    }
}
