#[cfg(test)]
pub(crate) mod out_port_tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};
    use crate::*;
    use crate::logging_util::steady_logger;
    use crate::port_testing::{EndpointCall, FailingEndpoint, RecordingEndpoint};

    fn recorder() -> Arc<RecordingEndpoint<Vec<i16>>> {
        Arc::new(RecordingEndpoint::new())
    }

    fn data_streams(endpoint: &RecordingEndpoint<Vec<i16>>) -> Vec<String> {
        endpoint.packets().into_iter().map(|(_, _, _, stream_id)| stream_id).collect()
    }

    #[test]
    fn connection_ids_are_unique() {
        let port: OutPort<Vec<i16>> = OutPort::new("out");
        assert_eq!(port.state(), PortUsage::Idle);
        port.connect(recorder(), "c1").expect("first connect");
        assert_eq!(port.state(), PortUsage::Active);
        assert_eq!(port.connect(recorder(), "c1"), Err(PortError::DuplicateConnection("c1".to_string())));
        assert_eq!(port.disconnect("nope"), Err(PortError::UnknownConnection("nope".to_string())));

        port.connect(recorder(), "c2").expect("second connect");
        assert_eq!(port.connections(), vec!["c1".to_string(), "c2".to_string()]);
        port.disconnect("c1").expect("known");
        port.disconnect("c2").expect("known");
        assert_eq!(port.state(), PortUsage::Idle);
        // the id is free again
        port.connect(recorder(), "c1").expect("reconnect");
    }

    #[test]
    fn unfiltered_push_reaches_all_connections() {
        let port: OutPort<Vec<i16>> = OutPort::new("out");
        let (a, b) = (recorder(), recorder());
        port.connect(a.clone(), "a").expect("connect");
        port.connect(b.clone(), "b").expect("connect");

        port.push_packet(vec![1, 2, 3], PrecisionTime::from_secs(7.0, 0.0), false, "s");
        for endpoint in [&a, &b] {
            let calls = endpoint.calls();
            assert_eq!(calls.len(), 2);
            // default SRI goes ahead of the first data
            assert_eq!(calls[0], EndpointCall::Sri(StreamSri::new("s")));
            assert_eq!(endpoint.packets()[0].0, vec![1, 2, 3]);
        }
    }

    #[test]
    fn filter_routes_listed_streams_and_broadcasts_the_rest() {
        let port: OutPort<Vec<i16>> = OutPort::new("out");
        let (a, b) = (recorder(), recorder());
        port.connect(a.clone(), "a").expect("connect");
        port.connect(b.clone(), "b").expect("connect");
        port.update_connection_filter(vec![
            ConnectionFilterEntry::new("out", "b", "S"),
            // entries for other ports never apply here
            ConnectionFilterEntry::new("other", "a", "T"),
        ]);

        port.push_packet(vec![1], PrecisionTime::not_set(), false, "S");
        port.push_packet(vec![2], PrecisionTime::not_set(), false, "T");
        assert_eq!(data_streams(&a), vec!["T".to_string()]);
        assert_eq!(data_streams(&b), vec!["S".to_string(), "T".to_string()]);

        port.update_connection_filter(Vec::new());
        assert!(port.connection_filter().is_empty());
        port.push_packet(vec![3], PrecisionTime::not_set(), false, "S");
        assert_eq!(data_streams(&a), vec!["T".to_string(), "S".to_string()]);

        // unnamed entries route on every port
        port.update_connection_filter(vec![ConnectionFilterEntry::any_port("a", "U")]);
        port.push_packet(vec![4], PrecisionTime::not_set(), false, "U");
        assert_eq!(data_streams(&a).last().map(String::as_str), Some("U"));
        assert_eq!(data_streams(&b).last().map(String::as_str), Some("S"));
    }

    #[test]
    fn newly_routed_connection_gets_sri_before_data() {
        let port: OutPort<Vec<i16>> = OutPort::new("out");
        let (a, b) = (recorder(), recorder());
        port.connect(a.clone(), "a").expect("connect");
        port.connect(b.clone(), "b").expect("connect");
        port.update_connection_filter(vec![ConnectionFilterEntry::new("out", "a", "s")]);

        let sri = StreamSri::new("s").with_xdelta(0.125);
        port.push_sri(&sri);
        port.push_packet(vec![1], PrecisionTime::not_set(), false, "s");
        assert_eq!(a.sris(), vec![sri.clone()]);
        assert!(b.calls().is_empty());

        port.update_connection_filter(vec![
            ConnectionFilterEntry::new("out", "a", "s"),
            ConnectionFilterEntry::new("out", "b", "s"),
        ]);
        port.push_packet(vec![2], PrecisionTime::not_set(), false, "s");
        // unchanged SRI is resent only to the connection that never saw it
        assert_eq!(a.sris().len(), 1);
        assert_eq!(b.calls(), vec![
            EndpointCall::Sri(sri),
            EndpointCall::Packet { data: vec![2], time: PrecisionTime::not_set(), eos: false, stream_id: "s".to_string() },
        ]);
    }

    #[test]
    fn identical_sri_is_forwarded_once() {
        let port: OutPort<Vec<i16>> = OutPort::new("out");
        let a = recorder();
        port.connect(a.clone(), "a").expect("connect");
        let sri = StreamSri::new("s");
        port.push_sri(&sri);
        port.push_sri(&sri);
        assert_eq!(a.sris().len(), 1);

        let changed = sri.clone().with_subsize(16);
        port.push_sri(&changed);
        assert_eq!(a.sris(), vec![sri, changed.clone()]);
        assert_eq!(port.active_sris(), vec![changed]);
    }

    #[test]
    fn eos_closes_stream_and_forgets_sri() {
        let port: OutPort<Vec<i16>> = OutPort::new("out");
        let a = recorder();
        port.connect(a.clone(), "a").expect("connect");
        port.push_sri(&StreamSri::new("s").with_xdelta(2.0));
        port.push_packet(vec![1], PrecisionTime::not_set(), true, "s");
        assert!(port.active_sris().is_empty());

        port.push_packet(vec![2], PrecisionTime::not_set(), false, "s");
        let sris = a.sris();
        assert_eq!(sris.len(), 2);
        assert_eq!(sris[1], StreamSri::new("s"));
    }

    #[test]
    fn failing_connection_does_not_stop_the_others() {
        let _guard = steady_logger::start_log_capture();
        let port: OutPort<Vec<i16>> = OutPort::new("out");
        let bad: Arc<FailingEndpoint<Vec<i16>>> = Arc::new(FailingEndpoint::new(true));
        let good = recorder();
        port.connect(bad.clone(), "bad").expect("connect");
        port.connect(good.clone(), "good").expect("connect");

        port.push_packet(vec![1], PrecisionTime::not_set(), false, "s");
        port.push_packet(vec![2], PrecisionTime::not_set(), false, "s");
        assert_eq!(good.packets().len(), 2);
        assert_eq!(port.error_count("bad"), Some(2));
        assert_eq!(port.error_count("good"), Some(0));
        assert_eq!(bad.rejected(), 2);
        crate::assert_in_logs!(["connection \"bad\" stream \"s\": delivery failed: endpoint unavailable"]);

        bad.set_failing(false);
        port.push_packet(vec![3], PrecisionTime::not_set(), false, "s");
        assert_eq!(port.error_count("bad"), Some(0));
        // SRI never got through, so it leads the first successful delivery
        assert_eq!(bad.recorder().calls()[0], EndpointCall::Sri(StreamSri::new("s")));
        assert_eq!(bad.recorder().packets().len(), 1);
    }

    #[test]
    fn oversized_push_is_chunked_per_connection() {
        // 80 payload bits, five i16 per transfer
        let port = PortBuilder::new()
            .with_max_transfer_bytes(port_config::TRANSFER_OVERHEAD_BYTES + 10)
            .build_out_port::<Vec<i16>>("out");
        let a = recorder();
        port.connect(a.clone(), "a").expect("connect");
        port.push_sri(&StreamSri::new("s").with_xdelta(0.1));

        let start = PrecisionTime::from_secs(10.0, 0.0);
        port.push_packet((0..12).collect(), start, true, "s");
        let packets = a.packets();
        assert_eq!(packets.iter().map(|p| p.0.len()).collect::<Vec<_>>(), vec![5, 5, 2]);
        assert_eq!(packets.iter().map(|p| p.2).collect::<Vec<_>>(), vec![false, false, true]);
        assert_eq!(packets[0].1, start);
        assert!((packets[1].1 - start - 0.5).abs() < 1e-9);
        assert!((packets[2].1 - start - 1.0).abs() < 1e-9);
        assert_eq!(packets[2].0, vec![10, 11]);
    }

    #[test]
    fn disconnect_closes_active_streams() {
        let port: OutPort<Vec<i16>> = OutPort::new("out");
        let a = recorder();
        port.connect(a.clone(), "a").expect("connect");
        port.push_packet(vec![1], PrecisionTime::not_set(), false, "x");
        port.push_packet(vec![2], PrecisionTime::not_set(), false, "y");
        port.push_packet(vec![3], PrecisionTime::not_set(), true, "y");
        a.clear();

        port.disconnect("a").expect("known");
        assert_eq!(a.packets(), vec![(Vec::new(), PrecisionTime::not_set(), true, "x".to_string())]);
        assert_eq!(port.error_count("a"), None);
    }

    #[test]
    fn disconnect_does_not_wait_for_stuck_push() {
        let input: Arc<InPort<Vec<i16>>> = Arc::new(
            PortBuilder::new().with_max_queue_depth(1).build_in_port("in").expect("valid depth"));
        let out: Arc<OutPort<Vec<i16>>> = Arc::new(OutPort::new("out"));
        out.connect(input.clone(), "dead").expect("connect");
        out.push_sri(&StreamSri::new("s").with_blocking(true));
        out.push_packet(vec![1], PrecisionTime::not_set(), false, "s");

        // nobody reads, so this push parks waiting for queue space
        let producer = {
            let out = out.clone();
            thread::spawn(move || out.push_packet(vec![2], PrecisionTime::not_set(), false, "s"))
        };
        thread::sleep(Duration::from_millis(30));

        let started = Instant::now();
        assert_eq!(out.disconnect("dead"), Ok(()));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(out.connections().is_empty());
        assert_eq!(out.state(), PortUsage::Idle);
        assert_eq!(out.error_count("dead"), None);

        input.stop();
        producer.join().expect("producer");
    }

    #[test]
    fn statistics_cover_every_connection() {
        let port: OutPort<Vec<i16>> = OutPort::new("out");
        port.connect(recorder(), "busy").expect("connect");
        port.connect(recorder(), "idle").expect("connect");
        port.update_connection_filter(vec![ConnectionFilterEntry::new("out", "busy", "s")]);
        for _ in 0..3 {
            port.push_packet(vec![0; 100], PrecisionTime::not_set(), false, "s");
        }

        let stats = port.statistics().expect("enabled");
        assert_eq!(stats.iter().map(|s| s.connection_id.as_str()).collect::<Vec<_>>(), vec!["busy", "idle"]);
        assert_eq!(stats[0].statistics.stream_ids, vec!["s".to_string()]);
        assert!(stats[0].statistics.elements_per_second > 0.0);
        assert_eq!(stats[1].statistics.elements_per_second, 0.0);
        assert!(stats[1].statistics.stream_ids.is_empty());

        port.set_statistics_enabled(false);
        assert!(port.statistics().is_none());
    }

    #[test]
    fn feeds_in_process_receive_port() {
        let out = PortBuilder::new()
            .with_max_transfer_bytes(port_config::TRANSFER_OVERHEAD_BYTES + 16)
            .build_out_port::<Vec<f32>>("out");
        let input: Arc<InPort<Vec<f32>>> = Arc::new(InPort::new("in"));
        out.connect(input.clone(), "local").expect("connect");

        let sri = StreamSri::new("iq").with_mode(SampleMode::Complex);
        out.push_sri(&sri);
        out.push_packet(vec![0.5; 10], PrecisionTime::from_secs(1.0, 0.0), true, "iq");

        // four f32 per transfer, whole complex pairs
        let received: Vec<_> = std::iter::from_fn(|| input.get_packet(Wait::NonBlocking)).collect();
        assert_eq!(received.iter().map(|p| p.data.len()).collect::<Vec<_>>(), vec![4, 4, 2]);
        assert_eq!(received.iter().map(|p| p.sri_changed).collect::<Vec<_>>(), vec![true, false, false]);
        assert!(received.iter().all(|p| p.sri == sri));
        assert!(received[2].eos);
        assert_eq!(input.state(), PortUsage::Idle);
    }
}
