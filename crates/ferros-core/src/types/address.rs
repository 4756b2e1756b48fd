//! Machine address type.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Strongly typed machine address inside the traced process
///
/// Breakpoints are keyed by address (at most one breakpoint per address), and
/// the wire protocol addresses a single breakpoint for clearing by its
/// address, so this newtype shows up in almost every layer. It serializes as a
/// bare integer.
///
/// ## Example
///
/// ```rust
/// use ferros_core::types::Address;
///
/// let addr: Address = "0x401000".parse()?;
/// assert_eq!(addr.value(), 0x40_1000);
/// assert_eq!(addr.to_string(), "0x401000");
/// # Ok::<(), ferros_core::types::address::ParseAddressError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(u64);

impl Address
{
    /// The null address, used where a thread has no readable program counter.
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value (usable in const contexts).
    #[must_use]
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address.
    #[must_use]
    pub const fn value(self) -> u64
    {
        self.0
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{:#x}", self.0)
    }
}

/// Error returned when a string is not a valid address literal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid address literal: {0:?}")]
pub struct ParseAddressError(pub String);

impl FromStr for Address
{
    type Err = ParseAddressError;

    /// Parse `0x`-prefixed hexadecimal or plain decimal.
    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        let trimmed = s.trim();
        let parsed = if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
            u64::from_str_radix(hex, 16)
        } else {
            trimmed.parse::<u64>()
        };
        parsed.map(Address).map_err(|_| ParseAddressError(s.to_string()))
    }
}
