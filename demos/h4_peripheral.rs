//! Counter peripheral over an H4 transport exposed on a TCP socket, such as
//! a Zephyr `hci_uart` bridge or a virtual controller.

#![allow(unused_crate_dependencies)]

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use blep::gap::Uuid16;
use blep::gatt::{
    Capability, CharProps, CharacteristicDef, DescriptorDef, Io, Notifier, ReadReq, ServiceDef,
    WriteReq,
};
use blep::hci::AdapterState;
use blep::host::{Framer, Transport};
use blep::peripheral::{self, Event, Peripheral};
use blep::smp::MemKeyring;
use blep::Config;

#[derive(Clone, Debug, clap::Parser)]
struct Args {
    /// Address of the H4 TCP endpoint.
    #[arg(short, long, default_value = "127.0.0.1:9000")]
    addr: String,

    /// Advertised device name.
    #[arg(short, long, default_value = "blep")]
    name: String,

    /// Reset the controller before setup.
    #[arg(short, long)]
    reset: bool,
}

#[derive(Debug)]
struct Tcp(TcpStream);

impl Transport for Tcp {
    fn write(&self, pkt: &[u8]) -> std::io::Result<()> {
        (&self.0).write_all(pkt)
    }
}

/// 32-bit counter that can be read, written, and subscribed to.
#[derive(Debug, Default)]
struct Counter {
    v: Mutex<u32>,
    ntf: Mutex<Option<Notifier>>,
}

impl Capability for Counter {
    fn read(&self, _: ReadReq) -> Io<Vec<u8>> {
        Io::Ready(Ok(self.v.lock().to_le_bytes().to_vec()))
    }

    fn write(&self, req: WriteReq<'_>) -> Io<()> {
        let Ok(b) = <[u8; 4]>::try_from(req.data) else {
            return Io::Ready(Err(blep::att::ErrorCode::InvalidAttributeValueLength));
        };
        let v = u32::from_le_bytes(b);
        *self.v.lock() = v;
        info!("Counter set to {v}");
        if let Some(n) = self.ntf.lock().as_ref() {
            n.update(b);
        }
        Io::Ready(Ok(()))
    }

    fn subscribe(&self, _: usize, n: Notifier) {
        info!("Subscribed to {}", n.handle());
        *self.ntf.lock() = Some(n);
    }

    fn unsubscribe(&self) {
        info!("Unsubscribed");
        self.ntf.lock().take();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let stream = TcpStream::connect(&args.addr)?;
    info!("Connected to {}", args.addr);
    let rd = stream.try_clone()?;
    let cfg = Config {
        device_name: args.name.clone(),
        user_channel: args.reset,
        ..Config::default()
    };
    let mut p = Peripheral::new(Tcp(stream), cfg, Box::new(MemKeyring::new()))?;
    let mut events = p.events().expect("event receiver");

    let svc = Uuid16::new(0xFFF0).expect("service UUID").as_uuid();
    let chr = Uuid16::new(0xFFF1).expect("characteristic UUID").as_uuid();
    let desc = Uuid16::new(0x2901).expect("descriptor UUID").as_uuid();
    let counter: Arc<dyn Capability> = Arc::new(Counter::default());
    p.set_services(&[ServiceDef::new(svc).characteristic(
        CharacteristicDef::new(chr, CharProps::READ | CharProps::WRITE | CharProps::NOTIFY)
            .descriptor(DescriptorDef::new(desc, "Counter"))
            .capability(counter),
    )])?;
    p.init()?;

    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || read_packets(rd, &tx));
    let p = Arc::new(Mutex::new(p));
    let ct = CancellationToken::new();
    let run = tokio::spawn(peripheral::run(Arc::clone(&p), rx, ct.clone()));

    loop {
        tokio::select! {
            e = events.recv() => {
                let Some(e) = e else { break };
                info!("{e:?}");
                if e == Event::StateChange(AdapterState::PoweredOn) {
                    p.lock().start_advertising(&args.name, &[svc])?;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    ct.cancel();
    Ok(run.await??)
}

/// Splits the inbound byte stream into H4 packets.
fn read_packets(mut rd: TcpStream, tx: &mpsc::Sender<Vec<u8>>) {
    let mut f = Framer::new();
    let mut buf = [0; 1024];
    loop {
        let n = match rd.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => n,
            Err(e) => {
                warn!("Read error: {e}");
                return;
            }
        };
        f.extend(&buf[..n]);
        while let Some(pkt) = f.next_packet() {
            if tx.blocking_send(pkt).is_err() {
                return;
            }
        }
    }
}
