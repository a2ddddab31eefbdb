//! Full scrape cycles against a fake control socket on loopback TCP.

use std::sync::Arc;
use std::time::Duration;

use kamailio_binrpc::record::{
    TYPE_ARRAY, TYPE_AVP, TYPE_INT, TYPE_STR, TYPE_STRUCT, encode_records,
};
use kamailio_binrpc::{Header, Record, read_packet};
use kamailio_collector::{
    Catalog, Collector, CollectorConfig, CollectorError, PrometheusSink, ScrapePhase,
};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

/// Serve every connection, answering each request with the payload bytes
/// chosen by method name.
async fn fake_kamailio(answer: fn(&str) -> Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                while let Ok((header, request)) = read_packet(&mut socket).await {
                    let method = match request.first() {
                        Some(Record::Str(m)) => m.clone(),
                        _ => break,
                    };
                    let payload = answer(&method);
                    let mut packet = Vec::new();
                    Header {
                        flags: 0,
                        payload_len: payload.len(),
                        cookie: header.cookie,
                    }
                    .encode(&mut packet);
                    packet.extend_from_slice(&payload);
                    if socket.write_all(&packet).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    format!("tcp://{addr}")
}

fn encoded_replies(method: &str) -> Vec<u8> {
    encode_records(&kamailio_replies(method))
}

/// Raw payload writer for layouts `Record` cannot express.
#[derive(Default)]
struct Payload(Vec<u8>);

impl Payload {
    fn value(mut self, ty: u8, bytes: &[u8]) -> Self {
        if bytes.len() < 8 {
            self.0.push((bytes.len() as u8) << 4 | ty);
        } else {
            self.0.push(0x80 | 0x10 | ty);
            self.0.push(bytes.len() as u8);
        }
        self.0.extend_from_slice(bytes);
        self
    }

    fn text(self, ty: u8, text: &str) -> Self {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        self.value(ty, &bytes)
    }

    fn name(self, name: &str) -> Self {
        self.text(TYPE_AVP, name)
    }

    fn str(self, text: &str) -> Self {
        self.text(TYPE_STR, text)
    }

    fn int(self, value: u8) -> Self {
        if value == 0 {
            self.value(TYPE_INT, &[])
        } else {
            self.value(TYPE_INT, &[value])
        }
    }

    fn open(mut self, ty: u8) -> Self {
        self.0.push(ty);
        self
    }

    fn close(mut self, ty: u8) -> Self {
        self.0.push(0x10 | ty);
        self
    }
}

fn dest(payload: Payload, uri: &str, flags: &str) -> Payload {
    payload
        .name("DEST")
        .open(TYPE_STRUCT)
        .name("URI")
        .str(uri)
        .name("FLAGS")
        .str(flags)
        .name("PRIORITY")
        .int(0)
        .close(TYPE_STRUCT)
}

/// `dispatcher.list` as Kamailio lays it out: sets and destinations are
/// named members of arrays.
fn dispatcher_list_reply(method: &str) -> Vec<u8> {
    if method != "dispatcher.list" {
        return encoded_replies(method);
    }

    let payload = Payload::default()
        .open(TYPE_STRUCT)
        .name("NRSETS")
        .int(2)
        .name("RECORDS")
        .open(TYPE_ARRAY)
        .name("SET")
        .open(TYPE_STRUCT)
        .name("ID")
        .int(1)
        .name("TARGETS")
        .open(TYPE_ARRAY);
    let payload = dest(payload, "sip:10.0.0.1:5060", "AP");
    let payload = dest(payload, "sip:10.0.0.2:5060", "IP");
    let payload = payload
        .close(TYPE_ARRAY)
        .close(TYPE_STRUCT)
        .name("SET")
        .open(TYPE_STRUCT)
        .name("ID")
        .int(2)
        .name("TARGETS")
        .open(TYPE_ARRAY);
    let payload = dest(payload, "sip:10.0.0.3:5060", "AP");
    payload
        .close(TYPE_ARRAY)
        .close(TYPE_STRUCT)
        .close(TYPE_ARRAY)
        .close(TYPE_STRUCT)
        .0
}

fn kamailio_replies(method: &str) -> Vec<Record> {
    match method {
        "core.uptime" => vec![Record::from_items([
            ("now", Record::str("Mon Oct 19 10:00:00 2026")),
            ("up_since", Record::str("Mon Oct 19 06:34:15 2026")),
            ("uptime", Record::Int(12345)),
        ])],
        "tm.stats" => vec![Record::from_items([
            ("current", Record::Int(1)),
            ("waiting", Record::Int(0)),
            ("total", Record::Int(9_514_528)),
            ("total_local", Record::Int(1_220_405)),
            ("rpl_received", Record::Int(8_010_376)),
            ("rpl_generated", Record::Int(1_542_386)),
            ("rpl_sent", Record::Int(7_727_958)),
            ("6xx", Record::Int(7782)),
            ("5xx", Record::Int(126_394)),
            ("4xx", Record::Int(1_089_540)),
            ("3xx", Record::Int(0)),
            ("2xx", Record::Int(6_267_549)),
            ("created", Record::Int(9_514_528)),
            ("freed", Record::Int(9_514_527)),
            ("delayed_free", Record::Int(0)),
        ])],
        "sl.stats" => vec![Record::from_items([
            ("200", Record::Int(666_263)),
            ("202", Record::Int(0)),
            ("4xx", Record::Int(5621)),
            ("xxx", Record::Int(0)),
        ])],
        "core.shmmem" => vec![Record::from_items([
            ("total", Record::Int(67_108_864)),
            ("free", Record::Int(60_193_640)),
            ("used", Record::Int(5_397_616)),
            ("real_used", Record::Int(6_915_224)),
            ("max_used", Record::Int(7_141_384)),
            ("fragments", Record::Int(2)),
        ])],
        _ => vec![Record::Int(500), Record::str("command not found")],
    }
}

fn config(uri: String, methods: &[&str]) -> CollectorConfig {
    CollectorConfig {
        uri,
        timeout: Duration::from_secs(2),
        methods: methods.iter().map(|m| m.to_string()).collect(),
    }
}

#[tokio::test]
async fn default_methods_render_to_prometheus_text() {
    let uri = fake_kamailio(encoded_replies).await;
    let collector = Collector::from_config(
        &config(uri, &["tm.stats", "sl.stats", "core.shmmem", "core.uptime"]),
        Arc::new(Catalog::builtin()),
    )
    .unwrap();

    let mut sink = PrometheusSink::new();
    assert!(collector.collect(&mut sink).await.is_success());
    let text = sink.render().unwrap();

    assert!(text.contains("# TYPE kamailio_tm_stats_current gauge"));
    assert!(text.contains("kamailio_tm_stats_current 1\n"));
    assert!(text.contains("kamailio_tm_stats_total_total 9514528\n"));
    assert!(text.contains("kamailio_tm_stats_codes_total{code=\"6xx\"} 7782\n"));
    assert!(text.contains("kamailio_sl_stats_codes_total{code=\"200\"} 666263\n"));
    assert!(text.contains("kamailio_sl_stats_codes_total{code=\"xxx\"} 0\n"));
    assert!(text.contains("kamailio_core_shmmem_free 60193640\n"));
    assert!(text.contains("kamailio_core_uptime_uptime_total 12345\n"));
    assert!(text.contains("kamailio_up 1\n"));
    assert!(text.contains("kamailio_exporter_total_scrapes 1\n"));
    assert!(text.contains("kamailio_exporter_failed_scrapes 0\n"));
}

#[tokio::test]
async fn remote_fault_leaves_only_health() {
    let uri = fake_kamailio(encoded_replies).await;
    let collector = Collector::from_config(
        &config(uri, &["core.uptime", "dispatcher.list"]),
        Arc::new(Catalog::builtin()),
    )
    .unwrap();

    let mut sink = PrometheusSink::new();
    let outcome = collector.collect(&mut sink).await;
    let failure = outcome.failure().unwrap();
    assert_eq!(failure.phase, ScrapePhase::Decoding);
    assert!(matches!(failure.error, CollectorError::Remote { code: 500, .. }));

    let text = sink.render().unwrap();
    assert!(!text.contains("kamailio_core_uptime"));
    assert!(text.contains("kamailio_up 0\n"));
    assert!(text.contains("kamailio_exporter_failed_scrapes 1\n"));
}

#[tokio::test]
async fn unreachable_socket_counts_failures() {
    // bind then drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let uri = format!("tcp://{}", listener.local_addr().unwrap());
    drop(listener);

    let collector =
        Collector::from_config(&config(uri, &["core.uptime"]), Arc::new(Catalog::builtin()))
            .unwrap();

    for _ in 0..2 {
        let outcome = collector.collect(&mut Vec::new()).await;
        assert_eq!(outcome.failure().unwrap().phase, ScrapePhase::Connecting);
    }
    let health = collector.health().await;
    assert_eq!(health.total_scrapes(), 2);
    assert_eq!(health.failed_scrapes(), 2);
}

#[tokio::test]
async fn bad_config_fails_before_connecting() {
    let err = Collector::from_config(
        &config("http://127.0.0.1:1".into(), &["core.uptime"]),
        Arc::new(Catalog::builtin()),
    )
    .unwrap_err();
    assert!(err.is_fatal());
}

#[tokio::test]
async fn dispatcher_sets_nested_in_arrays() {
    let uri = fake_kamailio(dispatcher_list_reply).await;
    let collector = Collector::from_config(
        &config(uri, &["dispatcher.list"]),
        Arc::new(Catalog::builtin()),
    )
    .unwrap();

    let mut sink = PrometheusSink::new();
    assert!(collector.collect(&mut sink).await.is_success());
    let text = sink.render().unwrap();

    for (uri, flags, setid) in [
        ("sip:10.0.0.1:5060", "AP", "1"),
        ("sip:10.0.0.2:5060", "IP", "1"),
        ("sip:10.0.0.3:5060", "AP", "2"),
    ] {
        let series = format!(
            "kamailio_dispatcher_list_target{{flags=\"{flags}\",setid=\"{setid}\",uri=\"{uri}\"}} 1\n"
        );
        assert!(text.contains(&series), "missing {series} in {text}");
    }
    assert!(text.contains("kamailio_up 1\n"));
}
