use std::sync::Arc;

use matches::assert_matches;

use crate::host::Recorder;

use super::*;

type TestHci = Hci<Arc<Recorder>>;

fn new_hci() -> (TestHci, Arc<Recorder>) {
    let rec = Arc::new(Recorder::default());
    (Hci::new(Arc::clone(&rec), Duration::from_millis(100)), rec)
}

fn evt(code: u8, params: &[u8]) -> Vec<u8> {
    let mut v = vec![0x04, code, u8::try_from(params.len()).unwrap()];
    v.extend_from_slice(params);
    v
}

fn cmd_complete(opcode: Opcode, ret: &[u8]) -> Vec<u8> {
    let mut p = vec![1];
    p.extend_from_slice(&u16::from(opcode).to_le_bytes());
    p.extend_from_slice(ret);
    evt(0x0E, &p)
}

fn opcodes(rec: &Recorder) -> Vec<Opcode> {
    (rec.take().iter())
        .filter(|p| p[0] == 0x01)
        .map(|p| Opcode::from(u16::from_le_bytes([p[1], p[2]])))
        .collect()
}

fn signals<T: Transport>(h: &mut Hci<T>) -> Vec<Signal> {
    std::iter::from_fn(|| h.poll_signal()).collect()
}

fn connect(h: &mut TestHci) -> ConnHandle {
    let pkt = evt(
        0x3E,
        &[
            0x01, 0x00, 0x40, 0x00, 0x01, 0x00, 1, 2, 3, 4, 5, 6, 0x18, 0x00, 0x00, 0x00, 0xC8,
            0x00, 0x00,
        ],
    );
    h.recv(&pkt).unwrap();
    ConnHandle::new(0x40).unwrap()
}

#[test]
fn init() {
    let (mut h, rec) = new_hci();
    h.init(true).unwrap();
    assert_eq!(rec.take(), vec![vec![0x01, 0x03, 0x0C, 0x00]]);

    h.recv(&cmd_complete(Opcode::Reset, &[0])).unwrap();
    let pkts = rec.take();
    assert_eq!(pkts[0][..4], [0x01, 0x01, 0x0C, 8]);
    assert_eq!(pkts[0][4..], EVENT_MASK);
    assert_eq!(pkts[1][4..], LE_EVENT_MASK);
    assert_eq!(pkts[3], [0x01, 0x6D, 0x0C, 2, 1, 0]);
    let ops: Vec<_> = (pkts.iter())
        .map(|p| Opcode::from(u16::from_le_bytes([p[1], p[2]])))
        .collect();
    assert_eq!(
        ops,
        [
            Opcode::SetEventMask,
            Opcode::LeSetEventMask,
            Opcode::ReadLocalVersionInformation,
            Opcode::WriteLeHostSupport,
            Opcode::ReadLeHostSupport,
            Opcode::ReadBdAddr,
            Opcode::LeReadBufferSize,
        ]
    );
}

#[test]
fn power_on() {
    let (mut h, rec) = new_hci();
    h.init(false).unwrap();
    rec.take();
    h.recv(&cmd_complete(
        Opcode::ReadLocalVersionInformation,
        &[0, 0x09, 0, 0, 0x09, 0x0F, 0, 0, 0],
    ))
    .unwrap();
    let pkts = rec.take();
    assert_eq!(pkts[0], [0x01, 0x0A, 0x20, 1, 0]);
    assert_eq!(
        pkts[1],
        [0x01, 0x06, 0x20, 15, 0xA0, 0x00, 0xA0, 0x00, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x07, 0]
    );
    h.recv(&cmd_complete(
        Opcode::ReadBdAddr,
        &[0, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11],
    ))
    .unwrap();
    h.recv(&cmd_complete(Opcode::LeSetAdvertisingParameters, &[0]))
        .unwrap();
    let addr = Addr::Public(RawAddr::from_le_bytes([0x66, 0x55, 0x44, 0x33, 0x22, 0x11]));
    assert_eq!(
        signals(&mut h),
        [
            Signal::AddressChange(addr),
            Signal::StateChange(AdapterState::PoweredOn)
        ]
    );
    assert_eq!(h.addr(), Some(addr));

    // State changes are only signaled once
    h.recv(&cmd_complete(Opcode::LeSetAdvertisingParameters, &[0]))
        .unwrap();
    assert!(signals(&mut h).is_empty());
}

#[test]
fn unsupported() {
    let (mut h, rec) = new_hci();
    h.recv(&cmd_complete(
        Opcode::ReadLocalVersionInformation,
        &[0, 0x05, 0, 0, 0x05, 0x0F, 0, 0, 0],
    ))
    .unwrap();
    assert!(rec.take().is_empty());
    assert_eq!(
        signals(&mut h),
        [Signal::StateChange(AdapterState::Unsupported)]
    );
}

#[test]
fn unauthorized() {
    #[derive(Debug)]
    struct Denied;

    impl Transport for Denied {
        fn write(&self, _: &[u8]) -> io::Result<()> {
            Err(io::ErrorKind::PermissionDenied.into())
        }
    }

    let mut h = Hci::new(Denied, Duration::from_millis(100));
    h.init(true).unwrap();
    assert_eq!(h.state(), AdapterState::Unauthorized);
    assert_eq!(
        signals(&mut h),
        [Signal::StateChange(AdapterState::Unauthorized)]
    );
}

#[test]
fn buffer_size() {
    let (mut h, rec) = new_hci();
    h.recv(&cmd_complete(Opcode::LeReadBufferSize, &[0, 0, 0, 0]))
        .unwrap();
    assert_eq!(opcodes(&rec), [Opcode::ReadBufferSize]);
    h.recv(&cmd_complete(
        Opcode::ReadBufferSize,
        &[0, 0xFB, 0x00, 0x40, 0x02, 0x00, 0x00, 0x00],
    ))
    .unwrap();
    assert_eq!(h.tx.mtu(), 251);
}

#[test]
fn connection() {
    let (mut h, rec) = new_hci();
    let hdl = connect(&mut h);
    assert_matches!(&signals(&mut h)[..], [Signal::Connected(c)] if c.handle == hdl);

    // Central role is ignored
    let central = evt(
        0x3E,
        &[
            0x01, 0x00, 0x41, 0x00, 0x00, 0x00, 1, 2, 3, 4, 5, 6, 0x18, 0x00, 0x00, 0x00, 0xC8,
            0x00, 0x00,
        ],
    );
    h.recv(&central).unwrap();
    assert!(signals(&mut h).is_empty());
    assert_eq!(h.conn().unwrap().handle, hdl);

    // Flow control: one packet in flight
    h.send_frame(hdl, Cid::ATT, &[1]).unwrap();
    h.send_frame(hdl, Cid::ATT, &[2]).unwrap();
    assert_eq!(rec.take(), vec![vec![0x02, 0x40, 0x00, 5, 0, 1, 0, 4, 0, 1]]);
    h.recv(&evt(0x13, &[1, 0x40, 0x00, 1, 0])).unwrap();
    assert_eq!(rec.take(), vec![vec![0x02, 0x40, 0x00, 5, 0, 1, 0, 4, 0, 2]]);

    // Inbound frames
    h.recv(&[0x02, 0x40, 0x20, 7, 0, 3, 0, 4, 0, 0x02, 0x17, 0x00])
        .unwrap();
    assert_matches!(
        &signals(&mut h)[..],
        [Signal::Frame(f)] if f.cid == Cid::ATT && f.data == [0x02, 0x17, 0x00]
    );

    // Encryption
    h.recv(&evt(0x08, &[0, 0x40, 0x00, 1])).unwrap();
    assert!(h.conn().unwrap().encrypted);
    assert_eq!(
        signals(&mut h),
        [Signal::EncryptChange {
            handle: hdl,
            enabled: true
        }]
    );

    // Disconnect discards queued data
    h.send_frame(hdl, Cid::ATT, &[3]).unwrap();
    h.recv(&evt(0x05, &[0, 0x40, 0x00, 0x13])).unwrap();
    assert_matches!(
        &signals(&mut h)[..],
        [Signal::Disconnected { conn, reason: Status::RemoteUserTerminatedConnection }]
            if conn.handle == hdl
    );
    assert!(h.conn().is_none());
    assert!(h.tx.is_empty());
}

#[test]
fn advertising() {
    let (mut h, rec) = new_hci();
    assert_matches!(
        h.start_advertising(&[0; 32], &[]),
        Err(Error::AdvDataTooLong(32))
    );
    h.start_advertising(&[0x02, 0x01, 0x06], &[0x03, 0x09, b'h', b'i'])
        .unwrap();
    let pkts = rec.take();
    assert_eq!(pkts[0][..9], [0x01, 0x09, 0x20, 32, 4, 0x03, 0x09, b'h', b'i']);
    assert_eq!(pkts[1].len(), 4 + 32);
    assert_eq!(pkts[2], [0x01, 0x0A, 0x20, 1, 1]);
    h.recv(&cmd_complete(Opcode::LeSetAdvertisingEnable, &[0]))
        .unwrap();
    assert_eq!(h.adv_state(), AdvState::Started);
    assert_eq!(signals(&mut h), [Signal::AdvertisingStart(Status::Success)]);

    // Restart after disconnect
    connect(&mut h);
    h.recv(&evt(0x05, &[0, 0x40, 0x00, 0x13])).unwrap();
    assert_eq!(opcodes(&rec), [Opcode::LeSetAdvertisingEnable]);
    h.recv(&cmd_complete(Opcode::LeSetAdvertisingEnable, &[0]))
        .unwrap();
    assert_eq!(h.adv_state(), AdvState::Started);

    h.stop_advertising().unwrap();
    h.recv(&cmd_complete(Opcode::LeSetAdvertisingEnable, &[0]))
        .unwrap();
    assert_matches!(
        &signals(&mut h)[..],
        [.., Signal::AdvertisingStop(Status::Success)]
    );
    assert_eq!(h.adv_state(), AdvState::Stopped);
}

#[test]
fn ltk() {
    let (mut h, rec) = new_hci();
    let hdl = connect(&mut h);
    signals(&mut h);
    h.recv(&evt(0x3E, &[0x05, 0x40, 0x00, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]))
        .unwrap();
    assert_eq!(
        signals(&mut h),
        [Signal::LtkRequest(LeLongTermKeyRequest {
            handle: hdl,
            rand: 0,
            ediv: 0
        })]
    );
    h.le_ltk_negative_reply(hdl).unwrap();
    assert_eq!(rec.take(), vec![vec![0x01, 0x1B, 0x20, 2, 0x40, 0x00]]);
    h.recv(&cmd_complete(
        Opcode::LeLongTermKeyRequestNegativeReply,
        &[0, 0x40, 0x00],
    ))
    .unwrap();
    assert_eq!(signals(&mut h), [Signal::LtkNegativeReply(hdl)]);

    h.read_rssi().unwrap();
    assert_eq!(opcodes(&rec), [Opcode::ReadRssi]);
    h.recv(&cmd_complete(Opcode::ReadRssi, &[0, 0x40, 0x00, 0xC4]))
        .unwrap();
    assert_eq!(signals(&mut h), [Signal::Rssi { handle: hdl, rssi: -60 }]);

    h.disconnect(DEFAULT_DISCONNECT_REASON).unwrap();
    assert_eq!(rec.take(), vec![vec![0x01, 0x06, 0x04, 3, 0x40, 0x00, 0x13]]);
}
