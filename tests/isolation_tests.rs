//! Integration tests for process-hosted elements.

use bytes::Bytes;
use millrace::elements::testing::{CollectSnk, DataSrc};
use millrace::isolation::{Supervisor, WorkerConfig};
use millrace::pipeline::{ElementDef, Pipeline};
use millrace::{Error, Frame};
use std::time::Duration;

fn num(v: u64) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

fn decode(data: &Bytes) -> u64 {
    u64::from_le_bytes(data.as_ref().try_into().unwrap())
}

/// Short operation timeouts keep the post-run worker wind-down quick.
fn quick() -> WorkerConfig {
    WorkerConfig {
        op_timeout: Duration::from_millis(200),
        join_timeout: Duration::from_secs(5),
        ..WorkerConfig::default()
    }
}

#[test]
fn test_isolated_transform_round_trip() {
    let mut supervisor = Supervisor::new();
    supervisor.to_shm("scratch", &[0u8; 16]).unwrap();

    let square = supervisor
        .isolate("square", quick().with_arg("exponent", "2"), |ctx| {
            let exponent: u32 = ctx
                .arg("exponent")
                .ok_or_else(|| Error::Element("missing exponent argument".into()))?
                .parse()
                .map_err(|e| Error::Element(format!("bad exponent: {e}")))?;
            while !ctx.stopped() {
                let Some((_pad, frame)) = ctx.recv()? else {
                    continue;
                };
                let out = if frame.is_eos() {
                    Frame::eos()
                } else {
                    let v = decode(frame.data().unwrap());
                    Frame::new(num(v.pow(exponent)))
                };
                while !ctx.send("out", out.clone())? {
                    if ctx.stopped() {
                        break;
                    }
                }
            }
            Ok(())
        })
        .unwrap();
    assert_eq!(square.worker_name(), "square");

    let (snk, collected) = CollectSnk::new();
    let mut pipeline = Pipeline::new();
    pipeline
        .insert(
            ElementDef::source(["out"]).named("count"),
            Box::new(DataSrc::new().with_pad("out", (1..=5).map(num))),
        )
        .unwrap();
    pipeline
        .insert(
            ElementDef::transform(["in"], ["out"]).named("square"),
            Box::new(square),
        )
        .unwrap();
    pipeline
        .insert(ElementDef::sink(["in"]).named("record"), Box::new(snk))
        .unwrap();
    pipeline
        .link_many([
            ("square:snk:in", "count:src:out"),
            ("record:snk:in", "square:src:out"),
        ])
        .unwrap();

    supervisor.run(&mut pipeline).unwrap();

    let values: Vec<u64> = collected.payloads().iter().map(decode).collect();
    assert_eq!(values, [1, 4, 9, 16, 25]);
    assert_eq!(collected.eos_count(), 1);

    // Scope ended: the worker is reaped and the registry is empty.
    assert_eq!(supervisor.worker_count(), 0);
    assert_eq!(supervisor.segment_count(), 0);
}

#[test]
fn test_shared_memory_visible_in_worker() {
    let greeting = b"hello from the graph process";

    let mut supervisor = Supervisor::new();
    supervisor.to_shm("greeting", greeting).unwrap();

    let echo = supervisor
        .isolate("echo", quick(), |ctx| {
            while !ctx.stopped() {
                let Some((_pad, frame)) = ctx.recv()? else {
                    continue;
                };
                let out = if frame.is_eos() {
                    Frame::eos()
                } else {
                    let seg = ctx
                        .shm("greeting")
                        .ok_or_else(|| Error::Element("greeting segment missing".into()))?;
                    Frame::new(seg.as_slice().to_vec())
                };
                while !ctx.send("out", out.clone())? {
                    if ctx.stopped() {
                        break;
                    }
                }
            }
            Ok(())
        })
        .unwrap();

    let (snk, collected) = CollectSnk::new();
    let mut pipeline = Pipeline::new();
    pipeline
        .insert(
            ElementDef::source(["out"]).named("ping"),
            Box::new(DataSrc::new().with_pad("out", [num(0)])),
        )
        .unwrap();
    pipeline
        .insert(
            ElementDef::transform(["in"], ["out"]).named("echo"),
            Box::new(echo),
        )
        .unwrap();
    pipeline
        .insert(ElementDef::sink(["in"]).named("record"), Box::new(snk))
        .unwrap();
    pipeline
        .link_many([
            ("echo:snk:in", "ping:src:out"),
            ("record:snk:in", "echo:src:out"),
        ])
        .unwrap();

    supervisor.run(&mut pipeline).unwrap();

    let payloads = collected.payloads();
    assert_eq!(payloads[0].as_ref(), greeting);
    assert_eq!(supervisor.segment_count(), 0);
}

#[test]
fn test_worker_fault_surfaces_on_produce() {
    let mut supervisor = Supervisor::new();

    // Echoes the first frame, fails on the second. The failure reaches the
    // graph as a fault item on the output queue.
    let flaky = supervisor
        .isolate("flaky", quick(), |ctx| {
            let mut seen = 0u32;
            while !ctx.stopped() {
                let Some((_pad, frame)) = ctx.recv()? else {
                    continue;
                };
                seen += 1;
                if seen == 2 {
                    return Err(Error::Element("synthetic worker failure".into()));
                }
                while !ctx.send("out", frame.clone())? {
                    if ctx.stopped() {
                        break;
                    }
                }
            }
            Ok(())
        })
        .unwrap();

    let (snk, _collected) = CollectSnk::new();
    let mut pipeline = Pipeline::new();
    pipeline
        .insert(
            ElementDef::source(["out"]).named("count"),
            Box::new(DataSrc::new().with_pad("out", (1..=3).map(num))),
        )
        .unwrap();
    pipeline
        .insert(
            ElementDef::transform(["in"], ["out"]).named("flaky"),
            Box::new(flaky),
        )
        .unwrap();
    pipeline
        .insert(ElementDef::sink(["in"]).named("record"), Box::new(snk))
        .unwrap();
    pipeline
        .link_many([
            ("flaky:snk:in", "count:src:out"),
            ("record:snk:in", "flaky:src:out"),
        ])
        .unwrap();

    match supervisor.run(&mut pipeline).unwrap_err() {
        Error::Hook {
            element,
            hook,
            source,
        } => {
            assert_eq!(element, "flaky");
            assert_eq!(hook, "produce");
            match *source {
                Error::Worker(worker, message) => {
                    assert_eq!(worker, "flaky");
                    assert!(message.contains("synthetic worker failure"));
                }
                other => panic!("unexpected source error: {other}"),
            }
        }
        other => panic!("unexpected error: {other}"),
    }

    // Teardown still ran on the error path.
    assert_eq!(supervisor.worker_count(), 0);
    assert_eq!(supervisor.segment_count(), 0);
}

#[test]
fn test_isolated_sink_consumes_stream() {
    let mut supervisor = Supervisor::new();

    let drain = supervisor
        .isolate("drain", quick(), |ctx| {
            while !ctx.stopped() {
                let _ = ctx.recv()?;
            }
            Ok(())
        })
        .unwrap();

    let mut pipeline = Pipeline::new();
    pipeline
        .insert(
            ElementDef::source(["out"]).named("count"),
            Box::new(DataSrc::new().with_pad("out", (1..=4).map(num))),
        )
        .unwrap();
    pipeline
        .insert(ElementDef::sink(["in"]).named("drain"), Box::new(drain))
        .unwrap();
    pipeline.link("drain:snk:in", "count:src:out").unwrap();

    supervisor.run(&mut pipeline).unwrap();
    assert_eq!(supervisor.worker_count(), 0);
}
