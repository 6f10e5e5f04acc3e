use std::time::Duration;

use matches::assert_matches;

use crate::hci::*;
use crate::le::{Addr, RawAddr};

fn hdl(v: u16) -> ConnHandle {
    ConnHandle::new(v).unwrap()
}

#[test]
fn cmd_complete() {
    let mut pkt = vec![EventCode::CommandComplete as u8, 3, 1, 0x01, 0x10];
    let e = Event::unpack(&pkt).unwrap();
    assert_eq!(
        e,
        Event::CommandComplete(CommandComplete {
            cmd_quota: 1,
            opcode: Opcode::ReadLocalVersionInformation,
            status: Status::Success,
            ret: vec![],
        })
    );

    pkt[1] += 2;
    pkt.extend_from_slice(&[Status::UnknownCommand as _, 6]);
    let Event::CommandComplete(cc) = Event::unpack(&pkt).unwrap() else {
        panic!("not a command completion");
    };
    assert_eq!(cc.status, Status::UnknownCommand);
    assert_eq!(cc.ret, [6]);
}

#[test]
fn cmd_status() {
    let pkt = [EventCode::CommandStatus as u8, 4, 0x1f, 3, 0x06, 0x04];
    assert_eq!(
        Event::unpack(&pkt).unwrap(),
        Event::CommandStatus {
            status: Status::UnspecifiedError,
            cmd_quota: 3,
            opcode: Opcode::Disconnect,
        }
    );
}

#[test]
fn disconnection_complete() {
    let pkt = [0x05, 4, 0x00, 0x40, 0x00, 0x13];
    assert_eq!(
        Event::unpack(&pkt).unwrap(),
        Event::DisconnectionComplete(DisconnectionComplete {
            status: Status::Success,
            handle: hdl(0x40),
            reason: Status::RemoteUserTerminatedConnection,
        })
    );
}

#[test]
fn completed_packets() {
    let pkt = [0x13, 9, 2, 0x40, 0x00, 0x02, 0x00, 0x41, 0x00, 0x01, 0x00];
    let Event::NumberOfCompletedPackets(v) = Event::unpack(&pkt).unwrap() else {
        panic!("not a completed packets event");
    };
    assert_eq!(v.as_slice(), &[(hdl(0x40), 2), (hdl(0x41), 1)]);

    // Truncated handle list
    assert_matches!(
        Event::unpack(&[0x13, 5, 2, 0x40, 0x00, 0x02, 0x00]),
        Err(Error::InvalidEvent(_))
    );
}

#[test]
fn le_conn_complete() {
    let pkt = [
        0x3E, 19, 0x01, 0x00, 0x40, 0x00, 0x01, 0x01, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11, 0x18,
        0x00, 0x00, 0x00, 0xC8, 0x00, 0x01,
    ];
    let Event::LeConnectionComplete(cc) = Event::unpack(&pkt).unwrap() else {
        panic!("not a connection complete event");
    };
    assert_eq!(cc.handle, hdl(0x40));
    assert_eq!(cc.role, Role::Peripheral);
    assert_eq!(
        cc.peer,
        Addr::Random(RawAddr::from_le_bytes([0x66, 0x55, 0x44, 0x33, 0x22, 0x11]))
    );
    assert_eq!(cc.params.interval, Duration::from_millis(30));
    assert_eq!(cc.params.supervision_timeout, Duration::from_secs(2));
    assert_eq!(cc.central_clock_accuracy, 250);
}

#[test]
fn le_ltk_request() {
    let pkt = [
        0x3E, 13, 0x05, 0x40, 0x00, 1, 2, 3, 4, 5, 6, 7, 8, 0x34, 0x12,
    ];
    assert_eq!(
        Event::unpack(&pkt).unwrap(),
        Event::LeLongTermKeyRequest(LeLongTermKeyRequest {
            handle: hdl(0x40),
            rand: 0x0807_0605_0403_0201,
            ediv: 0x1234,
        })
    );
}

#[test]
fn invalid() {
    assert_matches!(Event::unpack(&[0x0E, 5, 1]), Err(Error::InvalidEvent(_)));
    assert_matches!(
        Event::unpack(&[0x3E, 2, 0x02, 0x00]),
        Err(Error::UnknownEvent { code: 0x3E, subevent: 0x02, .. })
    );
    assert_matches!(
        Event::unpack(&[0xFF, 0]),
        Err(Error::UnknownEvent { code: 0xFF, .. })
    );
}
