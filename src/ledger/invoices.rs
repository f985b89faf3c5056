//! Invoice Ledger
//!
//! Settled work. An invoice is written once, when a claim's proof verifies,
//! and is never modified afterwards.

use std::ops::{Deref, DerefMut};

use serde::{Serialize, Deserialize};

use crate::core::types::{Address, SessionHeader};
use crate::error::FatalError;
use crate::proof::merkle::MerkleProof;
use super::codec::{marshal, unmarshal};
use super::keys::{invoice_key, invoices_key, INVOICE_PREFIX};
use super::store::KvStore;

const RECORD: &str = "invoice";

/// Proof that a servicer's claimed work was audited and accepted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredInvoice {
    /// Servicer that did the work.
    pub servicer_address: Address,

    /// Session the work belongs to.
    pub session_header: SessionHeader,

    /// Relays billed.
    pub total_relays: u64,

    /// Accepted reveal paths.
    pub proofs: Vec<MerkleProof>,
}

/// Invoices stored under [`INVOICE_PREFIX`].
pub struct InvoiceLedger<St> {
    store: St,
}

impl<St> InvoiceLedger<St>
where
    St: Deref,
    St::Target: KvStore,
{
    /// Wrap a store handle.
    pub fn new(store: St) -> Self {
        Self { store }
    }

    /// Invoice of `address` for `header`.
    pub fn get(&self, address: &Address, header: &SessionHeader) -> Result<Option<StoredInvoice>, FatalError> {
        let key = invoice_key(address, header);
        self.store
            .get(&key)
            .map(|bytes| unmarshal(RECORD, &key, &bytes))
            .transpose()
    }

    /// Has `address` already been paid for `header`?
    pub fn contains(&self, address: &Address, header: &SessionHeader) -> bool {
        self.store.get(&invoice_key(address, header)).is_some()
    }

    /// All invoices of `address`.
    pub fn list_by_address(&self, address: &Address) -> Result<Vec<StoredInvoice>, FatalError> {
        self.scan(&invoices_key(address))
    }

    /// Every invoice.
    pub fn list_all(&self) -> Result<Vec<StoredInvoice>, FatalError> {
        self.scan(INVOICE_PREFIX)
    }

    fn scan(&self, prefix: &[u8]) -> Result<Vec<StoredInvoice>, FatalError> {
        self.store
            .iter_prefix(prefix)
            .into_iter()
            .map(|(key, bytes)| unmarshal(RECORD, &key, &bytes))
            .collect()
    }
}

impl<St> InvoiceLedger<St>
where
    St: DerefMut,
    St::Target: KvStore,
{
    /// Store an invoice.
    pub fn put(&mut self, invoice: &StoredInvoice) -> Result<(), FatalError> {
        let bytes = marshal(RECORD, invoice)?;
        self.store
            .set(invoice_key(&invoice.servicer_address, &invoice.session_header), bytes);
        Ok(())
    }

    /// Store many invoices (genesis import).
    pub fn put_many(&mut self, invoices: &[StoredInvoice]) -> Result<(), FatalError> {
        let encoded = invoices
            .iter()
            .map(|invoice| {
                marshal(RECORD, invoice).map(|bytes| {
                    (invoice_key(&invoice.servicer_address, &invoice.session_header), bytes)
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        for (key, bytes) in encoded {
            self.store.set(key, bytes);
        }
        Ok(())
    }
}
