//! Provider clients, reshaping and persistence

pub mod align;
pub mod fama_french;
pub mod frame;
pub mod fred;
pub mod provider;
pub mod store;
pub mod world_bank;
pub mod yahoo;

pub use fama_french::{FactorDataset, FactorTable, FamaFrenchClient, Frequency};
pub use fred::FredClient;
pub use provider::{CollectError, DataSource};
pub use store::{Dataset, DatasetMeta, DatasetStatus, ParquetStore};
pub use world_bank::{WorldBankClient, WorldBankIndicator};
pub use yahoo::{Interval, PriceHistory, YahooClient};
