//! End-to-end tests for collect -> aggregate -> persist

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Utc;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use ticker_aggregator::oracle::sources::{ConnectorRegistry, ExchangeConnector};
    use ticker_aggregator::oracle::{
        ConfidenceWeights, PriceAggregator, Quote, QuoteCollector, SourceError, StatusReporter,
    };
    use ticker_aggregator::persistence::{CsvPersistence, PriceStore, StatusBoard};
    use ticker_aggregator::service::{PriceOrigin, PricingService, ServiceError};
    use ticker_aggregator::types::{ExchangeId, ExchangeStatus, MarketPair, MarketSet};

    /// Exchange that lists BTC/USDT and answers with a fixed ticker until
    /// switched off
    struct ScriptedExchange {
        id: ExchangeId,
        price: f64,
        volume: f64,
        down: AtomicBool,
    }

    impl ScriptedExchange {
        fn new(id: ExchangeId, price: f64, volume: f64) -> Arc<Self> {
            Arc::new(Self {
                id,
                price,
                volume,
                down: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl ExchangeConnector for ScriptedExchange {
        fn id(&self) -> ExchangeId {
            self.id
        }

        fn is_active(&self) -> bool {
            true
        }

        async fn load_markets(&self) -> Result<MarketSet, SourceError> {
            Ok([MarketPair::new("BTC", "USDT")].into_iter().collect())
        }

        async fn fetch_ticker(&self, _pair: &MarketPair) -> Result<Quote, SourceError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(SourceError::Status {
                    status: 503,
                    body: "service unavailable".into(),
                });
            }
            Ok(Quote {
                volume_24h: Some(self.volume),
                bid: Some(self.price - 1.0),
                ask: Some(self.price + 1.0),
                ..Quote::with_price(self.id, Some(self.price), Utc::now())
            })
        }
    }

    struct Harness {
        data_dir: PathBuf,
        exchanges: Vec<Arc<ScriptedExchange>>,
        board: Arc<StatusBoard>,
        store: Arc<CsvPersistence>,
        service: PricingService,
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.data_dir);
        }
    }

    fn harness(test_name: &str) -> Harness {
        let data_dir = std::env::temp_dir().join(format!(
            "tickagg_pipeline_{}_{}",
            test_name,
            uuid::Uuid::new_v4()
        ));

        let exchanges = vec![
            ScriptedExchange::new(ExchangeId::Binance, 50000.0, 100.0),
            ScriptedExchange::new(ExchangeId::Coinbase, 50200.0, 50.0),
            ScriptedExchange::new(ExchangeId::Kraken, 49800.0, 150.0),
        ];
        let connectors: Vec<Arc<dyn ExchangeConnector>> = exchanges
            .iter()
            .map(|e| Arc::clone(e) as Arc<dyn ExchangeConnector>)
            .collect();

        let board = Arc::new(StatusBoard::open(&data_dir).unwrap());
        let store = Arc::new(CsvPersistence::new(&data_dir, 2).unwrap());

        let reporter: Arc<dyn StatusReporter> = board.clone();
        let price_store: Arc<dyn PriceStore> = store.clone();
        let collector = QuoteCollector::new(
            &ConnectorRegistry::from_connectors(connectors),
            reporter,
            Duration::from_secs(2),
            3,
        );
        let service = PricingService::new(
            collector,
            PriceAggregator::new(ConfidenceWeights::default()),
            Some(price_store),
            Duration::ZERO,
        );

        Harness {
            data_dir,
            exchanges,
            board,
            store,
            service,
        }
    }

    // ============================================================================
    // Happy path
    // ============================================================================

    #[tokio::test]
    async fn test_three_exchange_scenario_is_priced_and_stored() {
        let h = harness("happy");

        let report = h.service.price("btc").await.unwrap();
        assert_eq!(report.origin, PriceOrigin::Fresh);

        let agg = &report.snapshot.aggregated;
        assert_eq!(agg.exchange_count, 3);
        assert_eq!(agg.price_simple_avg, 50000.0);
        assert_eq!(agg.price_median, 50000.0);
        assert_eq!(agg.price_spread_percent, 0.8032);
        assert_eq!(agg.total_volume_24h, 300.0);
        assert!((agg.price_vwap.unwrap() - 49933.33333333).abs() < 1e-6);
        assert_eq!(agg.confidence_score, 63.67);

        let latest = h.store.fetch_latest_aggregate("BTC").await.unwrap().unwrap();
        assert_eq!(latest, report.snapshot);

        let now = Utc::now();
        let raw = h
            .service
            .raw_quotes("btc", now - chrono::Duration::minutes(1), now)
            .await
            .unwrap();
        assert_eq!(raw.len(), 3);
        assert!(raw.iter().all(|r| r.run_id == report.snapshot.run_id));
    }

    #[tokio::test]
    async fn test_successful_fetches_mark_exchanges_operational() {
        let h = harness("operational");
        h.service.price("BTC").await.unwrap();

        let board = StatusBoard::load(&h.data_dir).unwrap();
        assert_eq!(board.len(), 3);
        assert!(board
            .values()
            .all(|health| health.status == ExchangeStatus::Operational));
    }

    // ============================================================================
    // Partial and total failure
    // ============================================================================

    #[tokio::test]
    async fn test_failing_exchange_is_excluded_and_degraded() {
        let h = harness("partial");
        h.exchanges[1].down.store(true, Ordering::SeqCst);

        let report = h.service.price("BTC").await.unwrap();
        assert_eq!(report.snapshot.aggregated.exchange_count, 2);
        assert_eq!(
            report.exchanges.exchanges(),
            vec![ExchangeId::Binance, ExchangeId::Kraken]
        );

        let coinbase = h.board.get(ExchangeId::Coinbase).unwrap();
        assert_eq!(coinbase.status, ExchangeStatus::Degraded);
        assert!(coinbase.last_error_message.unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_total_outage_serves_last_snapshot_as_stale() {
        let h = harness("outage");
        let first = h.service.price("BTC").await.unwrap();

        for exchange in &h.exchanges {
            exchange.down.store(true, Ordering::SeqCst);
        }

        let report = h.service.price("BTC").await.unwrap();
        assert_eq!(report.origin, PriceOrigin::Stale);
        assert_eq!(report.snapshot, first.snapshot);
        assert!(report.exchanges.is_empty());

        let history = h.service.history("BTC", 10).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_total_outage_without_history_is_an_error() {
        let h = harness("cold_outage");
        for exchange in &h.exchanges {
            exchange.down.store(true, Ordering::SeqCst);
        }

        let err = h.service.price("BTC").await.unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientData(_)));
    }

    #[tokio::test]
    async fn test_unlisted_symbol_leaves_status_untouched() {
        let h = harness("unlisted");

        assert!(h.service.price("DOGE").await.is_err());
        assert!(h.board.snapshot().is_empty());
    }
}
