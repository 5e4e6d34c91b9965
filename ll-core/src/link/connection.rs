//! Link-Layer connection management and the simplified LLCP subset.

use {
    crate::{
        bytes::ByteWriter,
        config::Config,
        link::{
            advertising::ConnectRequestData,
            channel_map::ChannelMap,
            data::{self, Header, Llid},
            events::{DisconnectReason, Event, EventQueue},
            llcp, CompanyId, Cmd, DeviceAddress, NextUpdate, RadioCmd, SeqNum, Transmitter,
        },
        phy::DataChannel,
        time::{Duration, Instant, Timer},
        utils::HexSlice,
        BLUETOOTH_VERSION,
    },
    core::num::Wrapping,
};

/// Which side of the connection this device is playing.
///
/// A device becomes [`Role::Slave`] when it was advertising and accepted an incoming
/// `CONNECT_REQ`; it becomes [`Role::Master`] when it was initiating and sent its own
/// `CONNECT_REQ` to a scanned peer. The two roles are symmetric in flow control and channel
/// hopping (§4.3.6), but differ in who transmits first in a connection event.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Role {
    Master,
    Slave,
}

/// A pending LL Control PDU reply, computed while processing an incoming Control PDU and sent as
/// soon as this side is allowed to transmit.
#[derive(Debug, Copy, Clone)]
enum PendingResponse {
    /// Empty data PDU acknowledging a peer `LL_TERMINATE_IND`.
    Empty,
    VersionInd,
    UnknownRsp(llcp::ControlOpcode),
}

/// Connection state and parameters (§3's per-connection context).
pub struct Connection<C: Config> {
    role: Role,
    peer_addr: DeviceAddress,

    access_address: u32,
    crc_init: u32,
    channel_map: ChannelMap,

    /// Number of (unmapped) channels to hop between each connection event.
    hop: u8,

    /// Connection event interval (duration between the start of 2 subsequent connection events).
    conn_interval: Duration,

    /// Connection event counter (`connEventCount` in the spec).
    conn_event_count: Wrapping<u16>,

    /// Unmapped data channel on which the next connection event will take place.
    unmapped_channel: DataChannel,

    /// Actual (remapped) data channel to use for the next connection event.
    channel: DataChannel,

    // Acknowledgement / Flow Control state
    transmit_seq_num: SeqNum,
    next_expected_seq_num: SeqNum,

    /// Header of the last transmitted packet, used for retransmission.
    last_header: data::Header,

    /// Whether this side has ever handed a PDU to the transmitter. `false` until the first
    /// `transmit()` call, so a NACK received before anything was ever sent (which cannot really
    /// happen, but isn't ruled out by the types) falls back to building a fresh PDU instead of
    /// resending garbage.
    ever_sent: bool,

    /// Whether the peer acknowledged the last PDU this side sent (`peer.NESN == local.SN + 1`).
    /// Computed when a reply is processed; consumed by the master role on the following
    /// connection event, where the corresponding retransmit-or-advance decision is made (§4.3.5
    /// step 3 / property 4).
    last_tx_acked: bool,

    /// Whether the slave has ever received a valid-CRC packet in this connection.
    received_packet: bool,

    /// Whether the connection has ever seen a valid-CRC packet (governs which supervision ceiling
    /// applies, §4.3.5 step 1 vs. normal supervision timeout).
    established: bool,

    /// Connection events since the last valid-CRC receive.
    superv_timer: u16,

    /// `supervisionTimeout / connInterval`, in whole connection events.
    superv_timeout_events: u16,

    /// Set by `terminate()`: the next PDU sent will be `LL_TERMINATE_IND`.
    term_local: bool,

    pending_response: Option<PendingResponse>,

    /// Outgoing application payload, queued by `LinkLayer::conn_send`. Single-slot: a new call
    /// overwrites anything not yet sent (§2.1 excludes a full packet queue from `Config`).
    tx_buf: [u8; 27],
    tx_len: u8,

    /// Last payload delivered to the host via `Event::PacketsReceived`; read with
    /// [`Connection::rx_data`].
    rx_buf: [u8; 27],
    rx_len: u8,
}

impl<C: Config> Connection<C> {
    /// Initializes connection state for the SLAVE role, from the `LLData` contained in an
    /// accepted `CONNECT_REQ` advertising PDU.
    ///
    /// Returns the connection state and a `Cmd` that arms the receiver for the master's first
    /// connection-event transmission (the slave never transmits first, §4.3.6).
    pub(crate) fn create_slave(
        lldata: &ConnectRequestData,
        peer_addr: DeviceAddress,
        rx_end: Instant,
        events: &mut EventQueue,
    ) -> (Self, Cmd) {
        let this = Self::new(Role::Slave, lldata, peer_addr, events);

        let cmd = Cmd {
            next_update: NextUpdate::At(
                rx_end + lldata.end_of_tx_window() + Duration::from_micros(500),
            ),
            radio: RadioCmd::ListenData {
                channel: this.channel,
                access_address: this.access_address,
                crc_init: this.crc_init,
                timeout: false,
            },
            queued_work: false,
        };

        (this, cmd)
    }

    /// Initializes connection state for the MASTER role, right after our own `CONNECT_REQ` was
    /// transmitted to an accepted peer (§4.3.4). The first connection event (our own transmission)
    /// is driven by `LinkLayer::update_timer` calling [`Connection::on_timer`].
    pub(crate) fn create_master(
        lldata: &ConnectRequestData,
        peer_addr: DeviceAddress,
        req_end: Instant,
        events: &mut EventQueue,
    ) -> (Self, Cmd) {
        let this = Self::new(Role::Master, lldata, peer_addr, events);

        let cmd = Cmd {
            next_update: NextUpdate::At(req_end + lldata.end_of_tx_window()),
            radio: RadioCmd::Off,
            queued_work: false,
        };

        (this, cmd)
    }

    fn new(
        role: Role,
        lldata: &ConnectRequestData,
        peer_addr: DeviceAddress,
        events: &mut EventQueue,
    ) -> Self {
        let interval_us = lldata.interval().as_micros().max(1);
        let superv_timeout_events = (lldata.timeout().as_micros() / interval_us).max(1) as u16;

        let mut this = Self {
            role,
            peer_addr,
            access_address: lldata.access_address(),
            crc_init: lldata.crc_init(),
            channel_map: *lldata.channel_map(),
            hop: lldata.hop(),
            conn_interval: lldata.interval(),
            conn_event_count: Wrapping(0),

            unmapped_channel: DataChannel::new(0),
            channel: DataChannel::new(0),

            transmit_seq_num: SeqNum::ZERO,
            next_expected_seq_num: SeqNum::ZERO,
            last_header: Header::new(Llid::DataCont),
            ever_sent: false,
            last_tx_acked: true,
            received_packet: false,
            established: false,
            superv_timer: 0,
            superv_timeout_events,

            term_local: false,
            pending_response: None,

            tx_buf: [0; 27],
            tx_len: 0,
            rx_buf: [0; 27],
            rx_len: 0,
        };
        this.hop_channel();

        events.push(Event::ConnectionComplete {
            index: 0,
            peer_addr,
        });

        this
    }

    /// The role this device is playing in the connection.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the configured interval between connection events.
    pub fn connection_interval(&self) -> Duration {
        self.conn_interval
    }

    /// Returns the address of the peer on the other end of this connection.
    pub fn peer_address(&self) -> DeviceAddress {
        self.peer_addr
    }

    /// Queues `data` to be sent at the next opportunity. Overwrites any previously queued and
    /// not-yet-sent payload.
    pub fn send(&mut self, data: &[u8]) {
        let len = data.len().min(self.tx_buf.len());
        self.tx_buf[..len].copy_from_slice(&data[..len]);
        self.tx_len = len as u8;
    }

    /// Returns the last payload delivered via `Event::PacketsReceived`.
    pub fn rx_data(&self) -> &[u8] {
        &self.rx_buf[..usize::from(self.rx_len)]
    }

    /// Requests termination of the connection. The next PDU this device sends will be
    /// `LL_TERMINATE_IND`; the connection closes once that is acknowledged.
    pub fn terminate(&mut self) {
        self.term_local = true;
    }

    /// Called by the `LinkLayer` when a data channel packet is received.
    ///
    /// Returns `Err(Some(reason))` when the connection has ended and a `DisconnectComplete` event
    /// has been raised, `Err(None)` when it silently returns to Standby without ever having
    /// become established (§4.3.6 point 1).
    pub(crate) fn process_data_packet(
        &mut self,
        timer: &mut C::Timer,
        tx: &mut C::Transmitter,
        header: data::Header,
        payload: &[u8],
        crc_ok: bool,
        events: &mut EventQueue,
    ) -> Result<Cmd, Option<DisconnectReason>> {
        let is_new = header.sn() == self.next_expected_seq_num && crc_ok;
        let acknowledged = header.nesn() == self.transmit_seq_num + SeqNum::ONE && crc_ok;
        let is_empty = header.llid() == Llid::DataCont && payload.is_empty();

        if crc_ok {
            self.superv_timer = 0;
            self.established = true;
        }

        let mut disconnect: Option<DisconnectReason> = None;

        self.last_tx_acked = acknowledged;

        if acknowledged {
            self.transmit_seq_num += SeqNum::ONE;
            if self.term_local {
                disconnect = Some(DisconnectReason::LocalHostTerminated);
            }
        }

        if is_new {
            if is_empty {
                self.next_expected_seq_num += SeqNum::ONE;
            } else if header.llid() == Llid::Control {
                if let Some(decoded) = llcp::RawPdu::new(payload).and_then(|raw| raw.decode()) {
                    self.next_expected_seq_num += SeqNum::ONE;
                    match decoded {
                        llcp::PduRef::TerminateInd(_) => {
                            self.pending_response = Some(PendingResponse::Empty);
                            disconnect = Some(DisconnectReason::RemoteUserTerminated);
                        }
                        llcp::PduRef::VersionInd(_) => {
                            self.pending_response = Some(PendingResponse::VersionInd);
                        }
                        other => {
                            self.pending_response =
                                Some(PendingResponse::UnknownRsp(other.opcode()));
                        }
                    }
                }
                // Undecodable control PDU (e.g. reserved opcode): don't acknowledge, let the
                // peer retransmit.
            } else {
                let n = payload.len().min(self.rx_buf.len());
                self.rx_buf[..n].copy_from_slice(&payload[..n]);
                self.rx_len = n as u8;
                self.next_expected_seq_num += SeqNum::ONE;
                events.push(Event::PacketsReceived {
                    index: 0,
                    length: n as u8,
                });
            }
        }

        if self.role == Role::Slave {
            self.received_packet = true;
            self.send_next(tx, events, acknowledged);
        }
        // Master: this is the slave's reply within the event we already opened in `on_timer`;
        // nothing more to send until the next tick, where `last_tx_acked` decides retransmission.

        let last_channel = self.channel;
        self.hop_channel();
        self.conn_event_count += Wrapping(1);
        self.superv_timer += 1;

        trace!(
            "#{} DATA({}->{})<- {}{:?}, {:?}",
            self.conn_event_count,
            last_channel.index(),
            self.channel.index(),
            if crc_ok { "" } else { "BADCRC, " },
            header,
            HexSlice(payload)
        );

        if let Some(reason) = disconnect {
            return Err(Some(reason));
        }
        if let Some(reason) = self.check_supervision() {
            return Err(Some(reason));
        }

        Ok(self.next_cmd(timer))
    }

    /// Called by the `LinkLayer` when the timer programmed by the last `Cmd` expires.
    ///
    /// For the master role, this *is* the start of a new connection event (the master transmits
    /// first). For the slave role, reaching this point means the master failed to show up in the
    /// expected window.
    pub(crate) fn on_timer(
        &mut self,
        timer: &mut C::Timer,
        tx: &mut C::Transmitter,
        events: &mut EventQueue,
    ) -> Result<Cmd, Option<DisconnectReason>> {
        match self.role {
            Role::Master => {
                self.send_next(tx, events, self.last_tx_acked);

                let last_channel = self.channel;
                self.hop_channel();
                self.conn_event_count += Wrapping(1);
                self.superv_timer += 1;

                trace!(
                    "#{} DATA({}->{})->",
                    self.conn_event_count,
                    last_channel.index(),
                    self.channel.index(),
                );

                if let Some(reason) = self.check_supervision() {
                    return Err(Some(reason));
                }
                Ok(self.next_cmd(timer))
            }
            Role::Slave => {
                if !self.received_packet {
                    // First packet never arrived: never established, silent return to Standby.
                    return Err(None);
                }
                self.conn_event_count += Wrapping(1);
                self.superv_timer += 1;
                if let Some(reason) = self.check_supervision() {
                    return Err(Some(reason));
                }
                self.hop_channel();
                Ok(self.next_cmd(timer))
            }
        }
    }

    fn check_supervision(&self) -> Option<DisconnectReason> {
        let limit = if self.established {
            self.superv_timeout_events
        } else {
            6
        };
        if self.superv_timer >= limit {
            Some(DisconnectReason::ConnectionTimeout)
        } else {
            None
        }
    }

    fn next_cmd(&self, timer: &mut C::Timer) -> Cmd {
        Cmd {
            next_update: NextUpdate::At(timer.now() + self.conn_interval),
            radio: RadioCmd::ListenData {
                channel: self.channel,
                access_address: self.access_address,
                crc_init: self.crc_init,
                timeout: true,
            },
            queued_work: false,
        }
    }

    /// Advances `unmapped_channel` and `channel` to the next connection event's data channel,
    /// per the hop algorithm of §4.3.3.
    fn hop_channel(&mut self) {
        let unmapped_channel = DataChannel::new((self.unmapped_channel.index() + self.hop) % 37);

        self.unmapped_channel = unmapped_channel;
        self.channel = if self.channel_map.is_used(unmapped_channel) {
            unmapped_channel
        } else {
            let remapping_index = unmapped_channel.index() % self.channel_map.num_used_channels();
            self.channel_map.by_index(remapping_index)
        };
    }

    /// Builds the next PDU to send (§4.3.5 step 3 / §4.3.6 step 3) and hands it to the
    /// transmitter, or, if `acknowledged` is false, retransmits the previous PDU byte-for-byte
    /// (property 4: a flipped NESN bit on a bad-CRC packet must never be trusted as an ack).
    fn send_next(&mut self, tx: &mut C::Transmitter, events: &mut EventQueue, acknowledged: bool) {
        if !acknowledged && self.ever_sent {
            // The transmitter is contractually required to retain the payload buffer's contents
            // across a transmit (see `Transmitter::tx_payload_buf`), so resending only requires
            // refreshing NESN and re-issuing the same header; the PHY payload is untouched.
            self.last_header.set_nesn(self.next_expected_seq_num);
            tx.transmit_data(self.access_address, self.crc_init, self.last_header, self.channel);
            return;
        }

        let header = if self.term_local {
            let pdu = llcp::Pdu::TerminateInd(llcp::TerminateInd::new(
                DisconnectReason::LocalHostTerminated.code(),
            ));
            self.write_control(tx, &pdu)
        } else if let Some(resp) = self.pending_response.take() {
            match resp {
                PendingResponse::Empty => Header::new(Llid::DataCont),
                PendingResponse::VersionInd => {
                    let pdu = llcp::Pdu::VersionInd(llcp::VersionInd::new(
                        BLUETOOTH_VERSION,
                        CompanyId::UNKNOWN,
                        0,
                    ));
                    self.write_control(tx, &pdu)
                }
                PendingResponse::UnknownRsp(opcode) => {
                    let pdu = llcp::Pdu::UnknownRsp(llcp::UnknownRsp::new(opcode));
                    self.write_control(tx, &pdu)
                }
            }
        } else if self.tx_len > 0 {
            let len = usize::from(self.tx_len);
            tx.tx_payload_buf()[..len].copy_from_slice(&self.tx_buf[..len]);
            let mut header = Header::new(Llid::DataStart);
            header.set_payload_length(self.tx_len);
            self.tx_len = 0;
            events.push(Event::PacketsSent { index: 0 });
            header
        } else {
            Header::new(Llid::DataCont)
        };

        self.transmit(header, tx);
    }

    fn write_control(&self, tx: &mut C::Transmitter, pdu: &llcp::Pdu) -> Header {
        use crate::bytes::ToBytes;

        let buf = tx.tx_payload_buf();
        let space = buf.len();
        let mut writer = ByteWriter::new(buf);
        pdu.to_bytes(&mut writer).expect("LLCP response too large");
        let len = (space - writer.space_left()) as u8;
        let mut header = Header::new(Llid::Control);
        header.set_payload_length(len);
        header
    }

    fn transmit(&mut self, mut header: Header, tx: &mut C::Transmitter) {
        header.set_md(false); // this core never sets MD
        header.set_nesn(self.next_expected_seq_num);
        header.set_sn(self.transmit_seq_num);
        self.last_header = header;
        self.ever_sent = true;

        tx.transmit_data(self.access_address, self.crc_init, header, self.channel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{link::{AddressKind, TxPower}, phy::AdvertisingChannel};

    struct MockTimer {
        now: Instant,
    }

    impl Timer for MockTimer {
        fn now(&self) -> Instant {
            self.now
        }
    }

    struct MockTx {
        buf: [u8; 37],
    }

    impl MockTx {
        fn new() -> Self {
            Self { buf: [0; 37] }
        }
    }

    impl Transmitter for MockTx {
        fn tx_payload_buf(&mut self) -> &mut [u8] {
            &mut self.buf
        }

        fn transmit_advertising(&mut self, _header: crate::link::advertising::Header, _channel: AdvertisingChannel) {}

        fn transmit_data(&mut self, _access_address: u32, _crc_iv: u32, _header: Header, _channel: DataChannel) {}

        fn set_tx_power(&mut self, _power: TxPower) {}

        fn set_out_buffer(&mut self, _buf: &mut [u8]) {}
    }

    struct MockRng;

    impl rand_core::RngCore for MockRng {
        fn next_u32(&mut self) -> u32 {
            0
        }
        fn next_u64(&mut self) -> u64 {
            0
        }
        fn fill_bytes(&mut self, dest: &mut [u8]) {
            for b in dest {
                *b = 0;
            }
        }
        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    struct MockConfig;

    impl Config for MockConfig {
        type Timer = MockTimer;
        type Transmitter = MockTx;
        type Rng = MockRng;
    }

    fn peer() -> DeviceAddress {
        DeviceAddress::new([1, 2, 3, 4, 5, 6], AddressKind::Random)
    }

    /// `interval` and `timeout` are both in their raw on-air units (1.25 ms, 10 ms).
    fn lldata(map: ChannelMap, hop: u8, interval: u16, timeout: u16) -> ConnectRequestData {
        ConnectRequestData::new(0x1234_5678, 0x55_5555, 2, 3, interval, 0, timeout, map, hop, 0)
    }

    fn master_conn(map: ChannelMap, hop: u8) -> (Connection<MockConfig>, EventQueue) {
        let mut events = EventQueue::new();
        let (conn, _cmd) = Connection::<MockConfig>::create_master(
            &lldata(map, hop, 24, 100),
            peer(),
            Instant::from_raw_micros(0),
            &mut events,
        );
        (conn, events)
    }

    /// Property 3 (bijectivity): with a full channel map and a fixed `hop`, 37 connection events
    /// starting from `lastUnmappedCh = 0` visit all 37 distinct data channels.
    #[test]
    fn hop_channel_visits_all_channels_with_full_map() {
        let (mut conn, mut events) = master_conn(ChannelMap::with_all_channels(), 7);
        let mut timer = MockTimer { now: Instant::from_raw_micros(0) };
        let mut tx = MockTx::new();

        let mut visited = [false; 37];
        for _ in 0..37 {
            let header = Header::new(Llid::DataCont);
            conn.process_data_packet(&mut timer, &mut tx, header, &[], true, &mut events)
                .expect("connection should stay alive for 37 well-acked events");
            visited[usize::from(conn.channel.index())] = true;
        }
        assert!(visited.iter().all(|&v| v), "expected all 37 data channels to be visited");
    }

    /// Property 3 (map restriction): with a channel map excluding some channels, hopping never
    /// lands on an unused channel, regardless of how `hop` walks the unmapped sequence.
    #[test]
    fn hop_channel_never_visits_unused_channel() {
        let mut raw = [0u8; 5];
        for &ch in &[0u8, 3, 7, 10, 15, 20, 25, 30, 35] {
            raw[usize::from(ch / 8)] |= 1 << (ch % 8);
        }
        let map = ChannelMap::from_raw(raw);
        let (mut conn, mut events) = master_conn(map, 11);
        let mut timer = MockTimer { now: Instant::from_raw_micros(0) };
        let mut tx = MockTx::new();

        for _ in 0..37 {
            let header = Header::new(Llid::DataCont);
            conn.process_data_packet(&mut timer, &mut tx, header, &[], true, &mut events)
                .expect("connection should stay alive for 37 well-acked events");
            assert!(
                map.is_used(conn.channel),
                "hopped onto channel {} which is not marked used",
                conn.channel.index()
            );
        }
    }

    /// Property 4 (ack round-trip): a peer echoing the same `NESN` twice means our last
    /// transmission was NACKed, and the retransmit must be byte-for-byte, unmodified except for a
    /// refreshed `NESN`. Only once the peer's `NESN` flips does `SN` advance.
    #[test]
    fn nack_retransmits_byte_for_byte_then_ack_advances_sn() {
        let (mut conn, mut events) = master_conn(ChannelMap::with_all_channels(), 7);
        let mut timer = MockTimer { now: Instant::from_raw_micros(0) };
        let mut tx = MockTx::new();

        conn.send(&[0xAA, 0xBB, 0xCC]);

        // First connection event: master transmits the queued payload.
        conn.on_timer(&mut timer, &mut tx, &mut events).unwrap();
        assert_eq!(conn.transmit_seq_num, SeqNum::ZERO);
        let first_header = conn.last_header;
        let first_payload = tx.buf;

        // Peer replies with NESN == local.SN: a NACK of that first transmission.
        let mut nack = Header::new(Llid::DataCont);
        nack.set_sn(SeqNum::ZERO);
        nack.set_nesn(conn.transmit_seq_num);
        conn.process_data_packet(&mut timer, &mut tx, nack, &[], true, &mut events)
            .unwrap();
        assert!(!conn.last_tx_acked);
        assert_eq!(conn.transmit_seq_num, SeqNum::ZERO, "NACK must not advance SN");

        // Next connection event: the master must resend, not build a new PDU.
        conn.on_timer(&mut timer, &mut tx, &mut events).unwrap();
        assert_eq!(
            conn.last_header.llid(),
            first_header.llid(),
            "resent PDU must carry the same LLID"
        );
        assert_eq!(
            conn.last_header.payload_length(),
            first_header.payload_length(),
            "resent PDU must carry the same length"
        );
        assert_eq!(conn.last_header.sn(), first_header.sn(), "SN must be unchanged on resend");
        assert_eq!(tx.buf, first_payload, "resent payload must be byte-for-byte identical");
        assert_eq!(conn.transmit_seq_num, SeqNum::ZERO);

        // Peer now acknowledges (NESN flips relative to local.SN): SN advances, no more resend.
        let mut ack = Header::new(Llid::DataCont);
        ack.set_sn(SeqNum::ZERO);
        ack.set_nesn(conn.transmit_seq_num + SeqNum::ONE);
        conn.process_data_packet(&mut timer, &mut tx, ack, &[], true, &mut events)
            .unwrap();
        assert!(conn.last_tx_acked);
        assert_eq!(conn.transmit_seq_num, SeqNum::ONE, "ACK must advance SN");
    }

    /// Supervision timeout (S5): with no valid replies ever received, an unestablished connection
    /// is torn down after 6 connection events, before the configured supervision timeout even
    /// applies.
    #[test]
    fn unestablished_connection_times_out_after_six_events() {
        let (mut conn, mut events) = master_conn(ChannelMap::with_all_channels(), 7);
        let mut timer = MockTimer { now: Instant::from_raw_micros(0) };
        let mut tx = MockTx::new();

        let mut result = Ok(Cmd {
            next_update: NextUpdate::Keep,
            radio: RadioCmd::Off,
            queued_work: false,
        });
        for _ in 0..6 {
            result = conn.on_timer(&mut timer, &mut tx, &mut events);
        }
        assert!(matches!(result, Err(Some(DisconnectReason::ConnectionTimeout))));
    }

    /// A peer `LL_TERMINATE_IND` is acknowledged with an empty PDU and ends the connection with
    /// `RemoteUserTerminated`, without ever touching the queued application payload.
    #[test]
    fn peer_terminate_ind_ends_connection() {
        let (mut conn, mut events) = master_conn(ChannelMap::with_all_channels(), 7);
        let mut timer = MockTimer { now: Instant::from_raw_micros(0) };
        let mut tx = MockTx::new();

        conn.on_timer(&mut timer, &mut tx, &mut events).unwrap();

        let mut buf = [0u8; 2];
        let mut writer = ByteWriter::new(&mut buf);
        let pdu = llcp::Pdu::TerminateInd(llcp::TerminateInd::new(
            DisconnectReason::RemoteUserTerminated.code(),
        ));
        crate::bytes::ToBytes::to_bytes(&pdu, &mut writer).unwrap();

        let mut header = Header::new(Llid::Control);
        header.set_payload_length(buf.len() as u8);
        header.set_sn(SeqNum::ZERO);
        header.set_nesn(conn.transmit_seq_num + SeqNum::ONE);

        let result = conn.process_data_packet(&mut timer, &mut tx, header, &buf, true, &mut events);
        assert!(matches!(result, Err(Some(DisconnectReason::RemoteUserTerminated))));
    }
}
