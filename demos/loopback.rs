//! Two-thread loopback session: a compute peer issues reads against a
//! memory peer over an in-process channel pair, with both virtual clocks
//! held together by the sync discipline.
//!
//! Run with: cargo run --example loopback --features transport

use memlink::channel::{ChannelConfig, ChannelPair};
use memlink::clock::{Advance, SyncConfig};
use memlink::ranges::{PhysRange, ProxyRole, RangeSet};
use memlink::session::{CpuPeer, MemPeer, PeerEvent};
use memlink::wire::{Command, PacketMsg};

const REQUESTS: u64 = 10_000;
const LINE: u32 = 64;

fn main() {
    env_logger_init();

    let config = ChannelConfig::new(16, 4096).expect("geometry");
    let sync = SyncConfig {
        lookahead: 500,
        sync_interval: 250,
    };
    let pair = ChannelPair::allocate(&config);
    let (ctx, crx) = pair.compute_side();
    let (mtx, mrx) = pair.memory_side();

    std::thread::scope(|s| {
        s.spawn(|| {
            let mut peer = CpuPeer::new(ctx, crx, sync);
            let ranges =
                RangeSet::from_ranges(ProxyRole::Pio, &[PhysRange::new(0, 0x1000)]).unwrap();
            peer.advertise(&ranges).unwrap();

            let mut time = 0u64;
            let mut issued = 0u64;
            let mut answered = 0u64;
            while answered < REQUESTS {
                match peer.advance(time + 10).unwrap() {
                    Advance::Granted(now) => {
                        time = now;
                        if issued < REQUESTS {
                            let head = PacketMsg::new(
                                Command::ReadReq,
                                0x8000_0000 + issued * LINE as u64,
                                0,
                            );
                            peer.send_packet(head, &[]).unwrap();
                            issued += 1;
                        }
                    }
                    Advance::Stalled { .. } => {}
                }
                while let Some(event) = peer.poll().unwrap() {
                    if let PeerEvent::Packet { .. } = event {
                        answered += 1;
                    }
                }
            }
            println!(
                "compute: {} reads answered, local time {}",
                answered,
                peer.clock().local_time()
            );
        });

        s.spawn(|| {
            let mut peer = MemPeer::new(mtx, mrx, sync);
            let ranges = RangeSet::from_ranges(
                ProxyRole::Pio,
                &[PhysRange::new(0x8000_0000, 0x9000_0000)],
            )
            .unwrap();
            peer.advertise(&ranges).unwrap();

            let mut time = 0u64;
            let mut answered = 0u64;
            while answered < REQUESTS {
                if let Advance::Granted(now) = peer.advance(time + 10).unwrap() {
                    time = now;
                }
                while let Some(event) = peer.poll().unwrap() {
                    if let PeerEvent::Packet { head, .. } = event {
                        let addr = head.addr;
                        let resp = PacketMsg::new(Command::ReadResp, addr, LINE);
                        peer.send_packet(resp, &[0u8; LINE as usize]).unwrap();
                        answered += 1;
                    }
                }
            }
            println!(
                "memory: {} reads served, local time {}",
                answered,
                peer.clock().local_time()
            );
        });
    });
}

fn env_logger_init() {
    // The library logs through the `log` facade; a demo doesn't need a
    // full logger, stderr suffices when RUST_LOG is set.
    struct Stderr;
    impl log::Log for Stderr {
        fn enabled(&self, _: &log::Metadata) -> bool {
            std::env::var_os("RUST_LOG").is_some()
        }
        fn log(&self, record: &log::Record) {
            if self.enabled(record.metadata()) {
                eprintln!("[{}] {}", record.level(), record.args());
            }
        }
        fn flush(&self) {}
    }
    let _ = log::set_logger(&Stderr);
    log::set_max_level(log::LevelFilter::Debug);
}
