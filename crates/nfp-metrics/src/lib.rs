use anyhow::Result;
use axum::{Router, routing::get};
use nfp_core::{NamespaceStatus, NftError, RequestObserver};
use nfp_nft::Engine;
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Metrics collector for the nf_tables control plane
pub struct MetricsCollector {
    registry: Arc<Registry>,

    requests_total: IntCounterVec,

    tables: IntGaugeVec,
    chains: IntGaugeVec,
    rules: IntGaugeVec,
}

impl MetricsCollector {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let requests_total = IntCounterVec::new(
            Opts::new(
                "nfplane_requests_total",
                "Processed nf_tables requests by command and outcome",
            ),
            &["command", "outcome"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let tables = IntGaugeVec::new(
            Opts::new("nfplane_tables", "Number of tables"),
            &["family"],
        )?;
        registry.register(Box::new(tables.clone()))?;

        let chains = IntGaugeVec::new(
            Opts::new("nfplane_chains", "Number of chains per table"),
            &["table"],
        )?;
        registry.register(Box::new(chains.clone()))?;

        let rules = IntGaugeVec::new(
            Opts::new("nfplane_rules", "Number of rules per table"),
            &["table"],
        )?;
        registry.register(Box::new(rules.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            tables,
            chains,
            rules,
        })
    }

    /// Replace the object gauges with a fresh namespace snapshot.
    pub fn update_namespace_metrics(&self, status: &NamespaceStatus) {
        self.tables.reset();
        self.chains.reset();
        self.rules.reset();

        let mut family_counts = HashMap::new();
        for table in &status.tables {
            *family_counts.entry(table.family.as_str()).or_insert(0) += 1;

            let label = format!("{} {}", table.family, table.name);
            self.chains
                .with_label_values(&[&label])
                .set(table.chains.len() as i64);
            self.rules
                .with_label_values(&[&label])
                .set(table.rule_count() as i64);
        }

        for (family, count) in family_counts {
            self.tables.with_label_values(&[family]).set(count);
        }
    }

    pub fn record_request(&self, command: &str, errno: i32) {
        let outcome = if errno == 0 {
            "ok"
        } else {
            NftError::from_errno(errno).kind()
        };
        self.requests_total
            .with_label_values(&[command, outcome])
            .inc();
    }

    /// Render metrics in Prometheus text format
    pub fn render_metrics(&self) -> Result<String> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl RequestObserver for MetricsCollector {
    fn request_completed(&self, command: &'static str, errno: i32) {
        self.record_request(command, errno);
    }
}

/// HTTP server for the Prometheus metrics endpoint
pub struct MetricsServer {
    collector: Arc<MetricsCollector>,
    engine: Engine,
    addr: std::net::SocketAddr,
}

impl MetricsServer {
    /// Gauges are refreshed from `engine` on every scrape.
    pub fn new(collector: Arc<MetricsCollector>, engine: Engine, port: u16) -> Self {
        let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
        Self {
            collector,
            engine,
            addr,
        }
    }

    pub fn router(&self) -> Router {
        let collector = self.collector.clone();
        let engine = self.engine.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let collector = collector.clone();
                let engine = engine.clone();
                async move {
                    collector.update_namespace_metrics(&engine.status());
                    match collector.render_metrics() {
                        Ok(metrics) => metrics,
                        Err(e) => {
                            warn!(error = %e, "failed to render metrics");
                            format!("# Error rendering metrics: {}", e)
                        }
                    }
                }
            }),
        )
    }

    pub async fn serve(self) -> Result<()> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "metrics server listening on /metrics");
        axum::serve(listener, app).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfp_core::Family;
    use nfp_nl::consts::*;
    use nfp_nl::{Attr, MessageBuilder, NftMsg};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn new_table(name: &str) -> Vec<u8> {
        MessageBuilder::new(NftMsg::NewTable, Family::Inet.as_u8())
            .flags(NLM_F_ACK | NLM_F_EXCL)
            .attr(Attr::string(NFTA_TABLE_NAME, name))
            .build()
    }

    #[test]
    fn counts_requests_by_outcome() {
        let collector = Arc::new(MetricsCollector::new().unwrap());
        let engine = Engine::default().with_observer(collector.clone());
        let conn = engine.connect();
        conn.send(&new_table("filter")).unwrap();
        conn.send(&new_table("filter")).unwrap();

        let ok = collector.requests_total.with_label_values(&["newtable", "ok"]);
        let exists = collector
            .requests_total
            .with_label_values(&["newtable", "exists"]);
        assert_eq!(ok.get(), 1);
        assert_eq!(exists.get(), 1);
    }

    #[test]
    fn gauges_follow_the_namespace() {
        let collector = MetricsCollector::new().unwrap();
        let engine = Engine::default();
        let conn = engine.connect();
        conn.send(&new_table("a")).unwrap();
        conn.send(&new_table("b")).unwrap();
        collector.update_namespace_metrics(&engine.status());
        assert_eq!(collector.tables.with_label_values(&["inet"]).get(), 2);

        let delete = MessageBuilder::new(NftMsg::DelTable, Family::Inet.as_u8())
            .attr(Attr::string(NFTA_TABLE_NAME, "a"))
            .build();
        conn.send(&delete).unwrap();
        collector.update_namespace_metrics(&engine.status());

        let output = collector.render_metrics().unwrap();
        assert!(output.contains("nfplane_tables{family=\"inet\"} 1"));
        assert!(output.contains("nfplane_chains{table=\"inet b\"} 0"));
        assert!(!output.contains("table=\"inet a\""));
    }

    #[tokio::test]
    async fn serves_metrics_over_http() {
        let collector = Arc::new(MetricsCollector::new().unwrap());
        let engine = Engine::default();
        engine.connect().send(&new_table("filter")).unwrap();
        let server = MetricsServer::new(collector, engine, 0);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = server.router();
        tokio::spawn(async move { axum::serve(listener, app).await });

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("nfplane_tables{family=\"inet\"} 1"));
    }
}
