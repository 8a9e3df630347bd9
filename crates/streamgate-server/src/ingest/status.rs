use serde::Serialize;
use tracing::debug;

/// Application namespace this gatekeeper serves. Streams published under
/// any other ingest application are ignored.
const INGEST_APPLICATION: &str = "live";

/// Raw per-stream metrics extracted from the ingest status document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    pub name: String,
    pub uptime_seconds: u64,
    pub client_count: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub bandwidth_in: u64,
    pub bandwidth_out: u64,
}

/// Parse the ingest server's `stat` XML into per-stream metrics, in
/// document order.
///
/// A document that fails to parse yields an empty list, never an error:
/// the dashboard degrades to "no streams" while the ingest server is
/// mid-restart instead of going down with it.
pub fn parse_stat_xml(raw: &str) -> Vec<StreamStats> {
    let doc = match roxmltree::Document::parse(raw) {
        Ok(doc) => doc,
        Err(e) => {
            debug!(error = %e, "unparseable ingest status document");
            return Vec::new();
        }
    };

    let mut streams = Vec::new();
    for application in doc.descendants().filter(|n| n.has_tag_name("application")) {
        if child_text(application, "name").map(str::trim) != Some(INGEST_APPLICATION) {
            continue;
        }
        let Some(live) = application.children().find(|n| n.has_tag_name("live")) else {
            continue;
        };
        for stream in live.children().filter(|n| n.has_tag_name("stream")) {
            let name = child_text(stream, "name").map(str::trim).unwrap_or("");
            if name.is_empty() {
                continue;
            }
            // nginx-rtmp reports nclients; older builds call it clients.
            let client_count = child_u64(stream, "nclients")
                .or_else(|| child_u64(stream, "clients"))
                .unwrap_or(0);
            streams.push(StreamStats {
                name: name.to_owned(),
                uptime_seconds: child_u64(stream, "time").unwrap_or(0),
                client_count,
                bytes_in: child_u64(stream, "bytes_in").unwrap_or(0),
                bytes_out: child_u64(stream, "bytes_out").unwrap_or(0),
                bandwidth_in: child_u64(stream, "bw_in").unwrap_or(0),
                bandwidth_out: child_u64(stream, "bw_out").unwrap_or(0),
            });
        }
    }
    streams
}

fn child_text<'a>(node: roxmltree::Node<'a, '_>, tag: &str) -> Option<&'a str> {
    node.children()
        .find(|n| n.has_tag_name(tag))
        .and_then(|n| n.text())
}

fn child_u64(node: roxmltree::Node, tag: &str) -> Option<u64> {
    child_text(node, tag).and_then(|t| t.trim().parse().ok())
}
