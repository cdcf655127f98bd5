//! Subscriptions and cache reads racing against decode cycles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc::error::TryRecvError;
use trafficflow_ingest::traffic::{SiteFilter, TrafficHandler};

const SUBSCRIBERS: usize = 8;
const CYCLES: usize = 50;

fn publication(flow: usize) -> String {
    format!(
        r#"<d2LogicalModel><payloadPublication>
        <siteMeasurements>
          <measurementSiteReference id="S1"/>
          <measurementTimeDefault>2024-03-01T12:00:00Z</measurementTimeDefault>
          <measuredValue index="1"><measuredValue><basicData type="TrafficFlow">
            <vehicleFlow><vehicleFlowRate>{flow}</vehicleFlowRate></vehicleFlow>
          </basicData></measuredValue></measuredValue>
        </siteMeasurements>
      </payloadPublication></d2LogicalModel>"#
    )
}

#[test]
fn test_subscribe_churn_during_decode_cycles() {
    let handler = Arc::new(TrafficHandler::new(SiteFilter::all(), 2));
    let decoding = Arc::new(AtomicBool::new(true));

    let subscribers: Vec<_> = (0..SUBSCRIBERS)
        .map(|i| {
            let handler = Arc::clone(&handler);
            let decoding = Arc::clone(&decoding);
            thread::spawn(move || {
                let client_id = format!("client-{i}");
                let mut received = 0usize;
                while decoding.load(Ordering::SeqCst) {
                    let mut receiver = handler.subscribe(client_id.clone());
                    while let Ok(notice) = receiver.try_recv() {
                        assert!(notice.cycle >= 1);
                        received += 1;
                    }
                    handler.unsubscribe(&client_id);
                    // Only notices sent before the unsubscribe may remain queued.
                    loop {
                        match receiver.try_recv() {
                            Ok(_) => received += 1,
                            Err(TryRecvError::Empty) => thread::yield_now(),
                            Err(TryRecvError::Disconnected) => break,
                        }
                    }
                }
                received
            })
        })
        .collect();

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let handler = Arc::clone(&handler);
            let decoding = Arc::clone(&decoding);
            thread::spawn(move || {
                while decoding.load(Ordering::SeqCst) {
                    if let Some(aggregate) = handler.get_aggregate("S1") {
                        assert_eq!(aggregate.site_id, "S1");
                        assert!(aggregate.is_undetermined());
                    }
                }
            })
        })
        .collect();

    for cycle in 0..CYCLES {
        let stats = handler.trigger_decode(publication(cycle).as_bytes()).unwrap();
        assert_eq!(stats.sites_updated, 1);
    }
    decoding.store(false, Ordering::SeqCst);

    for subscriber in subscribers {
        subscriber.join().unwrap();
    }
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(handler.cycles(), CYCLES as u64);
    assert_eq!(handler.subscriber_count(), 0);
}

#[test]
fn test_no_notice_after_unsubscribe() {
    let handler = TrafficHandler::new(SiteFilter::all(), 4);
    let mut kept = handler.subscribe("kept");
    let mut dropped = handler.subscribe("dropped");

    handler.trigger_decode(publication(1).as_bytes()).unwrap();
    handler.unsubscribe("dropped");
    handler.trigger_decode(publication(2).as_bytes()).unwrap();

    assert_eq!(kept.try_recv().unwrap().cycle, 1);
    assert_eq!(kept.try_recv().unwrap().cycle, 2);
    assert_eq!(dropped.try_recv().unwrap().cycle, 1);
    assert_eq!(dropped.try_recv(), Err(TryRecvError::Disconnected));
}

#[test]
fn test_parallel_decode_cycles() {
    let handler = Arc::new(TrafficHandler::new(SiteFilter::all(), 4));

    let workers: Vec<_> = (0..4)
        .map(|i| {
            let handler = Arc::clone(&handler);
            thread::spawn(move || {
                for cycle in 0..10 {
                    handler
                        .trigger_decode(publication(i * 100 + cycle).as_bytes())
                        .unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(handler.cycles(), 40);
    assert!(handler.get_aggregate("S1").is_some());
}
