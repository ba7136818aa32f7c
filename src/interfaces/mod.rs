pub mod relay;

pub use relay::{run, ConverterFetcher, RunReport, SubscriptionFetcher};
