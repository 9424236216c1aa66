use fnqueue::{
    ActionKind, DeviceId, FnQueue, QueueConfig, QueueContext, Runner, VirtualTime,
};
use tracing_subscriber::EnvFilter;

// Higher kinds win time ties: a transmission starting at the same instant
// another one ends is seen as overlapping it.
const RX_SEARCH: ActionKind = ActionKind::new(1);
const TX_END: ActionKind = ActionKind::new(2);
const TX_START: ActionKind = ActionKind::new(3);

const N_DEVICES: u32 = 8;
const PACKET_LEN: u64 = 40;
const RX_WINDOW: u64 = 1_000;
const END_TIME: u64 = 20_000;

/// Shared radio channel seen by every device model.
#[derive(Debug, Default)]
struct Channel {
    periods: Vec<u64>,
    on_air: u32,
    transmissions: u64,
    collisions: u64,
    rx_wakeups: u64,
}

fn build_runner() -> Runner<Channel> {
    let mut q = FnQueue::with_config(QueueConfig::new(N_DEVICES as usize).with_trace(4096));

    q.register(TX_START, |ch: &mut Channel, ctx: &mut QueueContext<'_>, _dev: DeviceId| {
        if ch.on_air > 0 {
            ch.collisions += 1;
        }
        ch.on_air += 1;
        ch.transmissions += 1;
        ctx.schedule_after(PACKET_LEN, TX_END);
    });
    q.register(TX_END, |ch: &mut Channel, ctx: &mut QueueContext<'_>, dev: DeviceId| {
        ch.on_air -= 1;
        ctx.schedule_after(ch.periods[dev.index()], TX_START);
    });
    q.register(RX_SEARCH, |ch: &mut Channel, ctx: &mut QueueContext<'_>, _dev: DeviceId| {
        ch.rx_wakeups += 1;
        match ctx.now().advance(RX_WINDOW) {
            Some(deadline) => ctx.defer_until(deadline, RX_SEARCH),
            None => ctx.park(),
        }
    });

    // Even devices transmit with co-prime periods, odd devices listen.
    let mut periods = Vec::with_capacity(N_DEVICES as usize);
    for dev in 0..N_DEVICES {
        let id = DeviceId::new(dev);
        if dev % 2 == 0 {
            periods.push(170 + 30 * u64::from(dev));
            q.add(VirtualTime::new(u64::from(dev) * 7), TX_START, id);
        } else {
            periods.push(0);
            q.add(VirtualTime::ZERO, RX_SEARCH, id);
        }
    }

    Runner::new(
        q,
        Channel {
            periods,
            ..Channel::default()
        },
    )
}

fn run_simulation(label: &str) -> u64 {
    let mut runner = build_runner();
    let dispatched = runner.run_until(VirtualTime::new(END_TIME));
    let stats = runner.queue().stats();
    let channel = runner.model();

    println!(
        "  {}: {} dispatches, {} transmissions, {} collisions, {} rx wakeups",
        label, dispatched, channel.transmissions, channel.collisions, channel.rx_wakeups
    );
    println!(
        "    order index: {} rebuilds, {} fast steps, {} reinsertions, {} flushes",
        stats.full_rebuilds, stats.fast_advances, stats.reinsertions, stats.flushes
    );

    runner.trace().map(|t| t.hash()).unwrap_or_default()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    println!("═══════════════════════════════════════════════════════");
    println!("  fnqueue: deterministic device function queue");
    println!("═══════════════════════════════════════════════════════");
    println!();

    let hash_1 = run_simulation("Run 1");
    let hash_2 = run_simulation("Run 2");

    println!();
    println!("  Run 1 trace hash: {:016x}", hash_1);
    println!("  Run 2 trace hash: {:016x}", hash_2);
    if hash_1 == hash_2 {
        println!("  ✓ Dispatch order is identical across runs.");
    } else {
        println!("  ✗ MISMATCH: determinism violation detected!");
        std::process::exit(1);
    }
}
