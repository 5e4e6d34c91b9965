//! Advertising channel structures.
//!
//! This module defines the Protocol Data Units (PDUs) transmitted on the 3 advertising channels,
//! and the `ConnectRequest` payload carried inside a `CONNECT_REQ` PDU.

use crate::{
    bytes::*,
    link::{channel_map::ChannelMap, AddressKind, DeviceAddress},
    time::Duration,
    utils::HexSlice,
    Error,
};
use byteorder::{ByteOrder, LittleEndian};
use core::fmt;

/// The access address used by all advertising channel packets.
pub const ACCESS_ADDRESS: u32 = 0x8E89_BED6;

/// The CRC preset (`CRCInit`) used for advertising channel PDUs.
pub const CRC_PRESET: u32 = 0x55_5555;

/// Advertising channel PDU types, as carried in the 4-bit `PDU Type` header field.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PduType {
    /// Connectable and scannable undirected advertising.
    AdvInd,
    /// Connectable directed advertising.
    AdvDirectInd,
    /// Non-connectable and non-scannable undirected advertising.
    AdvNonconnInd,
    /// Scan request.
    ScanReq,
    /// Scan response.
    ScanRsp,
    /// Connection request.
    ConnectReq,
    /// Scannable undirected advertising.
    AdvScanInd,
    /// Reserved or unsupported PDU type.
    Unknown(u8),
}

impl PduType {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0b0000 => PduType::AdvInd,
            0b0001 => PduType::AdvDirectInd,
            0b0010 => PduType::AdvNonconnInd,
            0b0011 => PduType::ScanReq,
            0b0100 => PduType::ScanRsp,
            0b0101 => PduType::ConnectReq,
            0b0110 => PduType::AdvScanInd,
            other => PduType::Unknown(other),
        }
    }

    fn raw(&self) -> u8 {
        match self {
            PduType::AdvInd => 0b0000,
            PduType::AdvDirectInd => 0b0001,
            PduType::AdvNonconnInd => 0b0010,
            PduType::ScanReq => 0b0011,
            PduType::ScanRsp => 0b0100,
            PduType::ConnectReq => 0b0101,
            PduType::AdvScanInd => 0b0110,
            PduType::Unknown(raw) => *raw,
        }
    }

    /// Whether this PDU type is transmitted by a beacon (non-connectable advertiser).
    pub fn is_beacon(&self) -> bool {
        matches!(
            self,
            PduType::AdvInd | PduType::AdvNonconnInd | PduType::AdvScanInd
        )
    }

    /// Whether devices may send a `CONNECT_REQ` in response to this advertisement.
    pub fn is_connectable(&self) -> bool {
        matches!(self, PduType::AdvInd | PduType::AdvDirectInd)
    }

    /// Whether devices may send a `SCAN_REQ` in response to this advertisement.
    pub fn is_scannable(&self) -> bool {
        matches!(self, PduType::AdvInd | PduType::AdvScanInd)
    }
}

const TXADD_MASK: u16 = 0b0000_0000_0100_0000;
const RXADD_MASK: u16 = 0b0000_0000_1000_0000;

/// 16-bit advertising channel PDU header.
///
/// Layout:
///
/// ```notrust
/// LSB                                                               MSB
/// +-----------+---------+---------+-----------+---------+--------------+
/// | PDU Type  |   RFU   |  TxAdd  |   RxAdd    |   RFU   |    Length    |
/// | (4 bits)  | (2 bit) | (1 bit) |  (1 bit)   | (2 bit) |   (6 bits)   |
/// +-----------+---------+---------+-----------+---------+--------------+
/// ```
#[derive(Copy, Clone)]
pub struct Header(u16);

impl Header {
    /// Creates a new header for a PDU of type `ty` with the given payload length.
    pub fn new(ty: PduType, payload_length: u8) -> Self {
        let mut header = Header(u16::from(ty.raw()));
        header.set_payload_length(payload_length);
        header
    }

    /// Parses a header from its on-air representation (at least 2 Bytes).
    pub fn parse(raw: &[u8]) -> Self {
        Header(LittleEndian::read_u16(raw))
    }

    /// Returns the raw 16-bit representation of this header, to be sent LSB first.
    pub fn to_u16(&self) -> u16 {
        self.0
    }

    /// Returns the PDU type carried in this header.
    pub fn type_(&self) -> PduType {
        PduType::from_raw((self.0 & 0b1111) as u8)
    }

    /// Returns the `TxAdd` flag: set when the advertiser's address is a random address.
    pub fn txadd(&self) -> bool {
        self.0 & TXADD_MASK != 0
    }

    /// Sets the `TxAdd` flag.
    pub fn set_txadd(&mut self, random: bool) {
        if random {
            self.0 |= TXADD_MASK;
        } else {
            self.0 &= !TXADD_MASK;
        }
    }

    /// Returns the `RxAdd` flag: set when the target address is a random address.
    pub fn rxadd(&self) -> bool {
        self.0 & RXADD_MASK != 0
    }

    /// Sets the `RxAdd` flag.
    pub fn set_rxadd(&mut self, random: bool) {
        if random {
            self.0 |= RXADD_MASK;
        } else {
            self.0 &= !RXADD_MASK;
        }
    }

    /// Returns the length of the payload following this header, in octets.
    pub fn payload_length(&self) -> u8 {
        ((self.0 >> 8) & 0b0011_1111) as u8
    }

    /// Sets the payload length field.
    pub fn set_payload_length(&mut self, len: u8) {
        self.0 = (self.0 & 0x00ff) | (u16::from(len & 0b0011_1111) << 8);
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Header")
            .field("Type", &self.type_())
            .field("TxAdd", &self.txadd())
            .field("RxAdd", &self.rxadd())
            .field("Length", &self.payload_length())
            .finish()
    }
}

impl<'a> FromBytes<'a> for Header {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Header(bytes.read_u16_le()?))
    }
}

impl ToBytes for Header {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.to_u16())
    }
}

fn addr_kind(random: bool) -> AddressKind {
    if random {
        AddressKind::Random
    } else {
        AddressKind::Public
    }
}

/// The `LLData` field carried in a `CONNECT_REQ` PDU, describing the parameters of the
/// connection the initiator proposes.
#[derive(Copy, Clone, Debug)]
pub struct ConnectRequestData {
    access_address: u32,
    crc_init: u32,
    win_size: u8,
    win_offset: u16,
    interval: u16,
    latency: u16,
    timeout: u16,
    channel_map: ChannelMap,
    hop: u8,
    sca: u8,
}

impl ConnectRequestData {
    /// Creates the `LLData` field for a `CONNECT_REQ` PDU.
    ///
    /// All interval-like parameters are given in their raw, unscaled on-air unit (see the
    /// individual accessors for the scale used).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        access_address: u32,
        crc_init: u32,
        win_size: u8,
        win_offset: u16,
        interval: u16,
        latency: u16,
        timeout: u16,
        channel_map: ChannelMap,
        hop: u8,
        sca: u8,
    ) -> Self {
        Self {
            access_address,
            crc_init,
            win_size,
            win_offset,
            interval,
            latency,
            timeout,
            channel_map,
            hop: hop & 0b0001_1111,
            sca: sca & 0b0000_0111,
        }
    }

    /// The access address to be used for the data channel connection.
    pub fn access_address(&self) -> u32 {
        self.access_address
    }

    /// The initial value of `CRCInit` for the data channel connection.
    pub fn crc_init(&self) -> u32 {
        self.crc_init
    }

    /// The duration of the `transmitWindowSize`.
    pub fn win_size(&self) -> Duration {
        Duration::from_micros(u32::from(self.win_size) * 1_250)
    }

    /// The offset of the `transmitWindowOffset` from the end of the `CONNECT_REQ` packet.
    pub fn win_offset(&self) -> Duration {
        Duration::from_micros(u32::from(self.win_offset) * 1_250)
    }

    /// The connection event interval.
    pub fn interval(&self) -> Duration {
        Duration::from_micros(u32::from(self.interval) * 1_250)
    }

    /// The slave latency, in number of connection events.
    pub fn latency(&self) -> u16 {
        self.latency
    }

    /// The supervision timeout for the connection.
    pub fn timeout(&self) -> Duration {
        Duration::from_micros(u32::from(self.timeout) * 10_000)
    }

    /// The initial data channel map.
    pub fn channel_map(&self) -> &ChannelMap {
        &self.channel_map
    }

    /// The hop increment used by the data channel selection algorithm (5..=16).
    pub fn hop(&self) -> u8 {
        self.hop
    }

    /// The initiator's Sleep Clock Accuracy index.
    pub fn sca(&self) -> u8 {
        self.sca
    }

    /// Returns the time between the end of the `CONNECT_REQ` packet and the end of the
    /// transmit window, i.e. `transmitWindowOffset + transmitWindowSize`.
    pub fn end_of_tx_window(&self) -> Duration {
        self.win_offset() + self.win_size()
    }
}

impl<'a> FromBytes<'a> for ConnectRequestData {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        let access_address = bytes.read_u32_le()?;
        let crc_init_lo = bytes.read_u16_le()?;
        let crc_init_hi = bytes.read_u8()?;
        let crc_init = u32::from(crc_init_lo) | (u32::from(crc_init_hi) << 16);
        let win_size = bytes.read_u8()?;
        let win_offset = bytes.read_u16_le()?;
        let interval = bytes.read_u16_le()?;
        let latency = bytes.read_u16_le()?;
        let timeout = bytes.read_u16_le()?;
        let mut map = [0; 5];
        map.copy_from_slice(bytes.read_slice(5)?);
        let hop_sca = bytes.read_u8()?;
        Ok(Self {
            access_address,
            crc_init,
            win_size,
            win_offset,
            interval,
            latency,
            timeout,
            channel_map: ChannelMap::from_raw(map),
            hop: hop_sca & 0b0001_1111,
            sca: (hop_sca >> 5) & 0b0000_0111,
        })
    }
}

impl ToBytes for ConnectRequestData {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u32_le(self.access_address)?;
        writer.write_u16_le((self.crc_init & 0xFFFF) as u16)?;
        writer.write_u8(((self.crc_init >> 16) & 0xFF) as u8)?;
        writer.write_u8(self.win_size)?;
        writer.write_u16_le(self.win_offset)?;
        writer.write_u16_le(self.interval)?;
        writer.write_u16_le(self.latency)?;
        writer.write_u16_le(self.timeout)?;
        writer.write_slice(&self.channel_map.to_raw())?;
        writer.write_u8((self.hop & 0b0001_1111) | ((self.sca & 0b111) << 5))
    }
}

/// A structured representation of an advertising channel PDU, parsed from its header and
/// payload.
///
/// Advertising and scan response data is carried as an opaque octet buffer (up to 31 Bytes); this
/// Link Layer does not interpret its internal structure (that is the Host's job).
#[derive(Debug)]
pub enum Pdu<'a> {
    /// Connectable and scannable undirected advertisement.
    AdvInd { adv_addr: DeviceAddress, data: &'a [u8] },
    /// Connectable directed advertisement.
    AdvDirectInd {
        adv_addr: DeviceAddress,
        target_addr: DeviceAddress,
    },
    /// Non-connectable, non-scannable undirected advertisement.
    AdvNonconnInd { adv_addr: DeviceAddress, data: &'a [u8] },
    /// Scannable undirected advertisement.
    AdvScanInd { adv_addr: DeviceAddress, data: &'a [u8] },
    /// Scan request, sent by a scanner to an advertiser.
    ScanRequest {
        scan_addr: DeviceAddress,
        adv_addr: DeviceAddress,
    },
    /// Scan response, sent by an advertiser in reply to a scan request.
    ScanResponse { adv_addr: DeviceAddress, data: &'a [u8] },
    /// Connection request, sent by an initiator to an advertiser.
    ConnectRequest {
        init_addr: DeviceAddress,
        adv_addr: DeviceAddress,
        lldata: ConnectRequestData,
    },
}

impl<'a> Pdu<'a> {
    /// Parses a `Pdu` from a header and the raw payload that follows it.
    pub fn from_header_and_payload(header: Header, payload: &'a [u8]) -> Result<Self, Error> {
        let mut reader = ByteReader::new(payload);
        let tx_kind = addr_kind(header.txadd());
        let rx_kind = addr_kind(header.rxadd());
        Ok(match header.type_() {
            PduType::AdvInd => Pdu::AdvInd {
                adv_addr: read_address(&mut reader, tx_kind)?,
                data: reader.read_rest(),
            },
            PduType::AdvDirectInd => Pdu::AdvDirectInd {
                adv_addr: read_address(&mut reader, tx_kind)?,
                target_addr: read_address(&mut reader, rx_kind)?,
            },
            PduType::AdvNonconnInd => Pdu::AdvNonconnInd {
                adv_addr: read_address(&mut reader, tx_kind)?,
                data: reader.read_rest(),
            },
            PduType::AdvScanInd => Pdu::AdvScanInd {
                adv_addr: read_address(&mut reader, tx_kind)?,
                data: reader.read_rest(),
            },
            PduType::ScanReq => Pdu::ScanRequest {
                scan_addr: read_address(&mut reader, tx_kind)?,
                adv_addr: read_address(&mut reader, rx_kind)?,
            },
            PduType::ScanRsp => Pdu::ScanResponse {
                adv_addr: read_address(&mut reader, tx_kind)?,
                data: reader.read_rest(),
            },
            PduType::ConnectReq => Pdu::ConnectRequest {
                init_addr: read_address(&mut reader, tx_kind)?,
                adv_addr: read_address(&mut reader, rx_kind)?,
                lldata: ConnectRequestData::from_bytes(&mut reader)?,
            },
            PduType::Unknown(_) => return Err(Error::InvalidValue),
        })
    }

    /// Returns the address of the device that sent this PDU, if it carries one.
    pub fn sender(&self) -> Option<DeviceAddress> {
        match self {
            Pdu::AdvInd { adv_addr, .. }
            | Pdu::AdvDirectInd { adv_addr, .. }
            | Pdu::AdvNonconnInd { adv_addr, .. }
            | Pdu::AdvScanInd { adv_addr, .. }
            | Pdu::ScanResponse { adv_addr, .. } => Some(*adv_addr),
            Pdu::ScanRequest { scan_addr, .. } => Some(*scan_addr),
            Pdu::ConnectRequest { init_addr, .. } => Some(*init_addr),
        }
    }

    /// Returns the address of the device this PDU was sent to, if it targets one specifically.
    pub fn receiver(&self) -> Option<DeviceAddress> {
        match self {
            Pdu::AdvDirectInd { target_addr, .. } => Some(*target_addr),
            Pdu::ScanRequest { adv_addr, .. }
            | Pdu::ConnectRequest { adv_addr, .. } => Some(*adv_addr),
            _ => None,
        }
    }
}

fn read_address(reader: &mut ByteReader<'_>, kind: AddressKind) -> Result<DeviceAddress, Error> {
    let mut bytes = [0; 6];
    bytes.copy_from_slice(reader.read_slice(6)?);
    Ok(DeviceAddress::new(bytes, kind))
}

/// Maximum payload size for an advertising channel PDU header (`Length` field is 6 bits).
const MAX_PAYLOAD: usize = 37;

/// An owned, fixed-capacity buffer holding a complete advertising channel PDU (header + payload),
/// ready to be copied into a radio's transmit buffer.
#[derive(Clone)]
pub struct PduBuf {
    header: Header,
    buf: [u8; MAX_PAYLOAD],
    payload_len: u8,
}

impl PduBuf {
    fn from_parts(ty: PduType, build: impl FnOnce(&mut ByteWriter<'_>) -> Result<(), Error>) -> Result<Self, Error> {
        let mut buf = [0; MAX_PAYLOAD];
        let len = {
            let mut writer = ByteWriter::new(&mut buf);
            build(&mut writer)?;
            MAX_PAYLOAD - writer.space_left()
        };
        Ok(Self {
            header: Header::new(ty, len as u8),
            buf,
            payload_len: len as u8,
        })
    }

    /// Builds an `ADV_IND` (connectable and scannable, undirected) advertising PDU.
    pub fn discoverable(adv_addr: DeviceAddress, data: &[u8]) -> Self {
        Self::from_parts(PduType::AdvInd, |w| {
            w.write_slice(adv_addr.raw())?;
            w.write_slice_truncate(data);
            Ok(())
        })
        .expect("ADV_IND payload too large")
        .with_txadd(adv_addr.is_random())
    }

    /// Builds an `ADV_NONCONN_IND` (non-connectable, non-scannable) advertising PDU.
    pub fn nonconnectable(adv_addr: DeviceAddress, data: &[u8]) -> Self {
        Self::from_parts(PduType::AdvNonconnInd, |w| {
            w.write_slice(adv_addr.raw())?;
            w.write_slice_truncate(data);
            Ok(())
        })
        .expect("ADV_NONCONN_IND payload too large")
        .with_txadd(adv_addr.is_random())
    }

    /// Builds an `ADV_SCAN_IND` (scannable, non-connectable) advertising PDU.
    pub fn scannable(adv_addr: DeviceAddress, data: &[u8]) -> Self {
        Self::from_parts(PduType::AdvScanInd, |w| {
            w.write_slice(adv_addr.raw())?;
            w.write_slice_truncate(data);
            Ok(())
        })
        .expect("ADV_SCAN_IND payload too large")
        .with_txadd(adv_addr.is_random())
    }

    /// Builds a `SCAN_RSP` PDU sent in reply to a `SCAN_REQ`.
    pub fn scan_response(adv_addr: DeviceAddress, data: &[u8]) -> Self {
        Self::from_parts(PduType::ScanRsp, |w| {
            w.write_slice(adv_addr.raw())?;
            w.write_slice_truncate(data);
            Ok(())
        })
        .expect("SCAN_RSP payload too large")
        .with_txadd(adv_addr.is_random())
    }

    /// Builds a `SCAN_REQ` PDU sent by a scanner to request more data from an advertiser.
    pub fn scan_request(scan_addr: DeviceAddress, adv_addr: DeviceAddress) -> Self {
        Self::from_parts(PduType::ScanReq, |w| {
            w.write_slice(scan_addr.raw())?;
            w.write_slice(adv_addr.raw())
        })
        .expect("SCAN_REQ payload too large")
        .with_txadd(scan_addr.is_random())
        .with_rxadd(adv_addr.is_random())
    }

    /// Builds a `CONNECT_REQ` PDU sent by an initiator to establish a connection.
    pub fn connect_request(
        init_addr: DeviceAddress,
        adv_addr: DeviceAddress,
        lldata: &ConnectRequestData,
    ) -> Self {
        Self::from_parts(PduType::ConnectReq, |w| {
            w.write_slice(init_addr.raw())?;
            w.write_slice(adv_addr.raw())?;
            lldata.to_bytes(w)
        })
        .expect("CONNECT_REQ payload too large")
        .with_txadd(init_addr.is_random())
        .with_rxadd(adv_addr.is_random())
    }

    fn with_txadd(mut self, random: bool) -> Self {
        self.header.set_txadd(random);
        self
    }

    fn with_rxadd(mut self, random: bool) -> Self {
        self.header.set_rxadd(random);
        self
    }

    /// Returns the header of this PDU.
    pub fn header(&self) -> Header {
        self.header
    }

    /// Returns the raw payload bytes following the header.
    pub fn payload(&self) -> &[u8] {
        &self.buf[..self.payload_len as usize]
    }
}

impl fmt::Debug for PduBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PduBuf")
            .field("header", &self.header)
            .field("payload", &HexSlice(self.payload()))
            .finish()
    }
}
