//! End-to-end flows through `ExchangeService` with the in-memory adapters.

pub mod flows;
pub mod workers;

use std::sync::{Arc, Once};

use qc_18_block_exchange::adapters::{InMemoryBlockStore, RecordingTransport};
use qc_18_block_exchange::{ExchangeConfig, ExchangeService};
use quantum_telemetry::{init_logging, TelemetryConfig};
use shared_types::{Block, BlockKey, PeerId};

static LOGGING: Once = Once::new();

/// Installs the log subscriber once per test binary. Set `RUST_LOG` to see output.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let mut config = TelemetryConfig::for_subsystem("18", "block-exchange");
        config.console_output = std::env::var("RUST_LOG").is_ok();
        // Another harness may already own the global subscriber.
        let _ = init_logging(&config);
    });
}

/// Service under test with handles on its adapters.
pub struct Harness {
    pub service: Arc<ExchangeService<RecordingTransport, InMemoryBlockStore>>,
    pub transport: Arc<RecordingTransport>,
    pub store: Arc<InMemoryBlockStore>,
}

impl Harness {
    pub fn new(config: ExchangeConfig) -> anyhow::Result<Self> {
        init_test_logging();
        let transport = Arc::new(RecordingTransport::new());
        let store = Arc::new(InMemoryBlockStore::new());
        let service = Arc::new(ExchangeService::new(
            config,
            Arc::clone(&transport),
            Arc::clone(&store),
        )?);
        Ok(Self {
            service,
            transport,
            store,
        })
    }

    /// Stores a block of `size` bytes filled with `fill`.
    pub fn hold(&self, fill: u8, size: usize) -> Block {
        let block = Block::new(vec![fill; size]);
        self.store.insert(block.clone());
        block
    }
}

pub fn peer(n: u8) -> PeerId {
    PeerId::new([n; 32])
}

pub fn key(n: u8) -> BlockKey {
    BlockKey::new([n; 32])
}
