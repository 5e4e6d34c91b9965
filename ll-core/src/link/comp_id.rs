//! Bluetooth SIG-assigned company identifiers.

use crate::{bytes::*, Error};

/// A Bluetooth SIG-assigned company identifier, as used in `LL_VERSION_IND` PDUs.
///
/// The canonical list is maintained by the Bluetooth SIG; this type just carries the raw 16-bit
/// value around without interpreting it.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct CompanyId(u16);

impl CompanyId {
    /// The "not assigned" placeholder used by implementations that have not registered with the
    /// Bluetooth SIG.
    pub const UNKNOWN: Self = CompanyId(0xFFFF);

    /// Creates a `CompanyId` from its raw 16-bit value.
    pub fn from_raw(raw: u16) -> Self {
        CompanyId(raw)
    }

    /// Returns the raw 16-bit company identifier.
    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

impl ToBytes for CompanyId {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.0)
    }
}

impl<'a> FromBytes<'a> for CompanyId {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(CompanyId(bytes.read_u16_le()?))
    }
}
