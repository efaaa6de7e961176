use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, info};

use rcplink_buffer::Priority;
use rcplink_link::RcpLink;
use rcplink_transport::{ChannelBus, Endpoint, MemEndpoint};

use crate::cmd::LoopbackArgs;
use crate::exit::{link_error, transport_error, CliError, CliResult, FAILURE, SUCCESS, TRANSPORT_ERROR};
use crate::output::{print_loopback_report, LoopbackReport, OutputFormat};

/// Run a full send/receive cycle against an in-memory echo peer.
///
/// Every frame goes through the real pipeline: enqueue, drain task, bus
/// write, peer echo, inbound poll, receive callback.
pub fn run(args: LoopbackArgs, format: OutputFormat) -> CliResult<i32> {
    let (host, mut peer) = MemEndpoint::pair();
    peer.open(args.bus_id, None)
        .map_err(|err| transport_error("opening echo peer", err))?;

    let mut link = RcpLink::new(ChannelBus::new(host));
    link.init(args.bus_id)
        .map_err(|err| link_error("initializing link", err))?;

    let received = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&received);
    link.set_receive_callback(Box::new(move |payload| {
        debug!(len = payload.len(), "echo frame delivered");
        *sink.lock().unwrap() += 1;
    }));

    let priority: Priority = args.priority.into();
    let started = Instant::now();
    let mut bytes = 0usize;

    for seq in 0..args.count {
        if args.reset_midway && seq == args.count / 2 {
            info!(seq, "simulating rcp restart");
            link.handle_rcp_reset();
        }

        let payload = format!("{} {seq}", args.payload).into_bytes();
        bytes += payload.len();
        link.enqueue(payload, priority)
            .map_err(|err| link_error("queueing frame", err))?;
        link.process()
            .map_err(|err| link_error("draining frame", err))?;

        while let Some(rx) = peer.try_read() {
            let echo = rx.as_bytes().to_vec();
            rx.release();
            if peer.try_write(echo).is_err() {
                return Err(CliError::new(TRANSPORT_ERROR, "echo peer could not write back"));
            }
        }

        link.process()
            .map_err(|err| link_error("delivering echo", err))?;
    }

    let frames_echoed = *received.lock().unwrap();
    let report = LoopbackReport {
        schema_id: LoopbackReport::SCHEMA_ID,
        frames_sent: args.count,
        frames_echoed,
        bytes,
        elapsed_ms: started.elapsed().as_millis(),
        reset_epoch: link.epoch().value(),
    };
    print_loopback_report(&report, format);

    link.deinit();
    Ok(if frames_echoed == args.count {
        SUCCESS
    } else {
        FAILURE
    })
}
