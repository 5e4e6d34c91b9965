//! Defines packet structures used by the Link Layer Control Protocol.

use crate::bytes::*;
use crate::link::comp_id::CompanyId;
use crate::Error;
use zerocopy::{AsBytes, FromBytes, Unaligned};

/// An undecoded LLCP PDU.
#[derive(Debug)]
pub struct RawPdu<T>(T);

impl<T: AsRef<[u8]>> RawPdu<T> {
    pub fn new(buf: T) -> Option<Self> {
        if buf.as_ref().len() < 1 {
            None
        } else {
            Some(RawPdu(buf))
        }
    }

    /// Decodes the LLCP opcode, returning a structured representation of the PDU.
    ///
    /// Opcodes this Link Layer doesn't implement a payload type for (everything but
    /// `LL_TERMINATE_IND`, `LL_VERSION_IND` and `LL_UNKNOWN_RSP`) decode to `PduRef::Other`, which
    /// carries just the opcode so the caller can still reply with `LL_UNKNOWN_RSP`.
    pub fn decode(&self) -> Option<PduRef<'_>> {
        let bytes = self.0.as_ref();
        let (opcode, data) = bytes.split_first()?;
        Some(match ControlOpcode::from(*opcode) {
            ControlOpcode::TerminateInd => PduRef::TerminateInd(data.decode_as()?),
            ControlOpcode::VersionInd => PduRef::VersionInd(data.decode_as()?),
            ControlOpcode::UnknownRsp => PduRef::UnknownRsp(data.decode_as()?),
            ControlOpcode::Unknown(_) => return None,
            known => PduRef::Other(known),
        })
    }

    pub fn opcode(&self) -> ControlOpcode {
        ControlOpcode::from(self.0.as_ref()[0])
    }
}

/// Reference to a structured LLCP PDU.
#[derive(Debug, Copy, Clone)]
pub enum PduRef<'a> {
    TerminateInd(&'a TerminateInd),
    VersionInd(&'a VersionInd),
    UnknownRsp(&'a UnknownRsp),
    /// A recognized opcode this Link Layer does not implement a payload type for.
    Other(ControlOpcode),
}

impl<'a> PduRef<'a> {
    pub fn opcode(&self) -> ControlOpcode {
        match self {
            Self::TerminateInd(_) => ControlOpcode::TerminateInd,
            Self::VersionInd(_) => ControlOpcode::VersionInd,
            Self::UnknownRsp(_) => ControlOpcode::UnknownRsp,
            Self::Other(opcode) => *opcode,
        }
    }
}

/// Structured representation of an LLCP PDU.
#[derive(Debug, Copy, Clone)]
pub enum Pdu {
    TerminateInd(TerminateInd),
    VersionInd(VersionInd),
    UnknownRsp(UnknownRsp),
}

impl Pdu {
    pub fn opcode(&self) -> ControlOpcode {
        match self {
            Self::TerminateInd(_) => ControlOpcode::TerminateInd,
            Self::VersionInd(_) => ControlOpcode::VersionInd,
            Self::UnknownRsp(_) => ControlOpcode::UnknownRsp,
        }
    }

    fn ctr_data(&self) -> &[u8] {
        match self {
            Self::TerminateInd(it) => it.as_bytes(),
            Self::VersionInd(it) => it.as_bytes(),
            Self::UnknownRsp(it) => it.as_bytes(),
        }
    }
}

impl ToBytes for Pdu {
    fn to_bytes(&self, buffer: &mut ByteWriter<'_>) -> Result<(), Error> {
        buffer.write_u8(self.opcode().into())?;
        buffer.write_slice(self.ctr_data())?;
        Ok(())
    }
}

enum_with_unknown! {
    /// Enumeration of all LL Control PDU opcodes assigned by the Bluetooth spec.
    ///
    /// Most of these are never constructed as a payload type by this Link Layer (see `PduRef`):
    /// keeping the full opcode space here lets `LL_UNKNOWN_RSP` correctly distinguish "a real,
    /// assigned opcode we don't support" from a genuinely reserved/invalid byte.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub enum ControlOpcode(u8) {
        ConnectionUpdateReq = 0x00,
        ChannelMapReq = 0x01,
        TerminateInd = 0x02,
        EncReq = 0x03,
        EncRsp = 0x04,
        StartEncReq = 0x05,
        StartEncRsp = 0x06,
        UnknownRsp = 0x07,
        FeatureReq = 0x08,
        FeatureRsp = 0x09,
        PauseEncReq = 0x0A,
        PauseEncRsp = 0x0B,
        VersionInd = 0x0C,
        RejectInd = 0x0D,
        SlaveFeatureReq = 0x0E,
        ConnectionParamReq = 0x0F,
        ConnectionParamRsp = 0x10,
        RejectIndExt = 0x11,
        PingReq = 0x12,
        PingRsp = 0x13,
        LengthReq = 0x14,
        LengthRsp = 0x15,
    }
}

enum_with_unknown! {
    /// Enumeration of all possible `VersNr` for `LL_VERSION_IND` PDUs.
    ///
    /// According to https://www.bluetooth.com/specifications/assigned-numbers/link-layer
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub enum VersionNumber(u8) {
        V4_0 = 6,
        V4_1 = 7,
        V4_2 = 8,
        V5_0 = 9,
        V5_1 = 10,
    }
}

/// `LL_TERMINATE_IND` - Connection termination indication.
#[derive(Debug, Copy, Clone, FromBytes, AsBytes, Unaligned)]
#[repr(C, packed)]
pub struct TerminateInd {
    error: u8,
}

impl TerminateInd {
    pub fn new(error_code: u8) -> Self {
        Self { error: error_code }
    }

    pub fn error_code(&self) -> u8 {
        self.error
    }
}

/// `LL_UNKNOWN_RSP`
#[derive(Debug, Copy, Clone, FromBytes, AsBytes, Unaligned)]
#[repr(C, packed)]
pub struct UnknownRsp {
    unknown_type: u8,
}

impl UnknownRsp {
    pub fn new(unknown: ControlOpcode) -> Self {
        Self {
            unknown_type: unknown.into(),
        }
    }
}

/// `LL_VERSION_IND`.
#[derive(Debug, Copy, Clone, FromBytes, AsBytes, Unaligned)]
#[repr(C, packed)]
pub struct VersionInd {
    vers_nr: u8,
    comp_id: u16,
    sub_vers_nr: u16,
}

impl VersionInd {
    pub fn new(bt_vers: VersionNumber, comp_id: CompanyId, sub_vers_nr: u16) -> Self {
        Self {
            vers_nr: bt_vers.into(),
            comp_id: comp_id.as_u16(),
            sub_vers_nr,
        }
    }
}
