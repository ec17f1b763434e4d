//! Message envelope.

use mailpost_smtp::Address;

use crate::classify::{Cause, Failure, Stage, classify};
use crate::error::Result;

/// Sender, recipients and an optional size hint for one message.
///
/// Addresses are validated on construction, before any server is contacted.
///
/// ```
/// use mailpost::Envelope;
///
/// let envelope = Envelope::new(
///     "test@valid.sender",
///     ["a@valid.recipient", "b@valid.recipient", "a@valid.recipient"],
/// )
/// .unwrap();
/// assert_eq!(envelope.to().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    from: Address,
    to: Vec<Address>,
    size_hint: Option<usize>,
}

impl Envelope {
    /// Parses and validates the sender and recipients.
    ///
    /// Duplicate recipients are dropped, keeping the first occurrence.
    ///
    /// # Errors
    ///
    /// Returns an envelope error if an address is malformed or there are no
    /// recipients.
    pub fn new<I, S>(from: &str, to: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let invalid = |err| classify(Failure::new(Stage::Validate, Cause::Wire(err)));

        let from = Address::new(from).map_err(invalid)?;
        let to = to
            .into_iter()
            .map(|address| Address::new(address.as_ref()).map_err(invalid))
            .collect::<Result<Vec<_>>>()?;
        Self::from_addresses(from, to)
    }

    /// Builds an envelope from already parsed addresses.
    ///
    /// # Errors
    ///
    /// Returns an envelope error if `to` is empty.
    pub fn from_addresses(from: Address, to: Vec<Address>) -> Result<Self> {
        let mut unique: Vec<Address> = Vec::with_capacity(to.len());
        for address in to {
            if !unique.contains(&address) {
                unique.push(address);
            }
        }

        if unique.is_empty() {
            return Err(classify(Failure::new(
                Stage::Validate,
                Cause::Invalid("no recipients defined".into()),
            )));
        }

        Ok(Self {
            from,
            to: unique,
            size_hint: None,
        })
    }

    /// Declares the message size, sent as `SIZE=` when the server supports it.
    #[must_use]
    pub const fn with_size_hint(mut self, size: usize) -> Self {
        self.size_hint = Some(size);
        self
    }

    /// Returns the sender.
    #[must_use]
    pub const fn from(&self) -> &Address {
        &self.from
    }

    /// Returns the recipients.
    #[must_use]
    pub fn to(&self) -> &[Address] {
        &self.to
    }

    /// Returns the declared size.
    #[must_use]
    pub const fn size_hint(&self) -> Option<usize> {
        self.size_hint
    }
}
