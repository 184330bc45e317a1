pub mod aggregator;
pub mod rates;
pub mod spikes;

pub use aggregator::EnergyAggregator;
pub use rates::{start_of_day, RateBook};
pub use spikes::{default_week_start, SpikeAnalyzer};

use std::sync::Arc;

use crate::analytics::{AnalyticsConfig, RateDefaults};
use crate::store::{DeviceRegistry, EnergyStore, RateStore, ReadingStore, SpikeStore, SystemLogStore};

/// The services wired against one backing store.
#[derive(Clone)]
pub struct Services {
    pub rates: RateBook,
    pub aggregator: EnergyAggregator,
    pub spikes: SpikeAnalyzer,
}

impl Services {
    pub fn new<S>(store: Arc<S>, config: AnalyticsConfig, defaults: RateDefaults) -> Self
    where
        S: DeviceRegistry + ReadingStore + RateStore + EnergyStore + SpikeStore + SystemLogStore + 'static,
    {
        let rates = RateBook::new(store.clone(), defaults);
        let aggregator = EnergyAggregator::new(
            store.clone(),
            store.clone(),
            store.clone(),
            rates.clone(),
            config.clone(),
        );
        let spikes = SpikeAnalyzer::new(store.clone(), store.clone(), store.clone(), store, config);

        Self {
            rates,
            aggregator,
            spikes,
        }
    }
}
