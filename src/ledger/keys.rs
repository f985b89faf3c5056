//! Store key layout.
//!
//! ```text
//! claim/{address:20}/{session_header_hash:32}
//! invoice/{address:20}/{session_header_hash:32}
//! ```
//!
//! Addresses are fixed-width, so `{prefix}{address}/` is an exact
//! per-address prefix and key order is address-major.

use crate::core::types::{Address, SessionHeader};

/// Prefix of pending claims.
pub const CLAIM_PREFIX: &[u8] = b"claim/";

/// Prefix of settled invoices.
pub const INVOICE_PREFIX: &[u8] = b"invoice/";

const SEPARATOR: u8 = b'/';

fn address_prefix(family: &[u8], address: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(family.len() + address.as_bytes().len() + 1 + 32);
    key.extend_from_slice(family);
    key.extend_from_slice(address.as_bytes());
    key.push(SEPARATOR);
    key
}

/// Key of one claim.
pub fn claim_key(address: &Address, header: &SessionHeader) -> Vec<u8> {
    let mut key = address_prefix(CLAIM_PREFIX, address);
    key.extend_from_slice(&header.hash());
    key
}

/// Prefix of every claim owned by `address`.
pub fn claims_key(address: &Address) -> Vec<u8> {
    address_prefix(CLAIM_PREFIX, address)
}

/// Key of one invoice.
pub fn invoice_key(address: &Address, header: &SessionHeader) -> Vec<u8> {
    let mut key = address_prefix(INVOICE_PREFIX, address);
    key.extend_from_slice(&header.hash());
    key
}

/// Prefix of every invoice owned by `address`.
pub fn invoices_key(address: &Address) -> Vec<u8> {
    address_prefix(INVOICE_PREFIX, address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_families_do_not_overlap() {
        let addr = Address::new([1; 20]);
        let header = SessionHeader::new("aa", "0001", 1);

        assert!(claim_key(&addr, &header).starts_with(&claims_key(&addr)));
        assert!(invoice_key(&addr, &header).starts_with(&invoices_key(&addr)));
        assert_ne!(claim_key(&addr, &header), invoice_key(&addr, &header));
        assert!(!claim_key(&addr, &header).starts_with(INVOICE_PREFIX));
    }

    #[test]
    fn test_address_prefix_is_exact() {
        let header = SessionHeader::new("aa", "0001", 1);
        let a = Address::new([1; 20]);
        let mut b_bytes = [1; 20];
        b_bytes[19] = 2;
        let b = Address::new(b_bytes);

        assert!(!claim_key(&b, &header).starts_with(&claims_key(&a)));
        assert!(claims_key(&a) < claims_key(&b));
    }

    #[test]
    fn test_key_length() {
        let key = claim_key(&Address::default(), &SessionHeader::new("aa", "0001", 1));
        assert_eq!(key.len(), CLAIM_PREFIX.len() + 20 + 1 + 32);
    }
}
