pub mod account;
pub mod bar;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod indicator;
pub mod interval;
pub mod position;
pub mod prediction;
pub mod traits;

pub use account::{AutoTradingStatus, FuturesAccount, VirtualBalance};
pub use bar::Bar;
pub use bar::normalize_symbol;
pub use config::{
    AmountConfig, AmountMode, AppConfig, CollectorConfig, DatabaseConfig, FeedConfig,
    FuturesSettings, MarketKind, RiskConfig, TradingConfig,
};
pub use config_loader::ConfigLoader;
pub use error::TradeError;
pub use indicator::{IndicatorSnapshot, Regime};
pub use interval::Interval;
pub use position::{
    liquidation_price, maintenance_margin_rate, position_id, protective_prices, CloseReason,
    FuturesPosition, FuturesSide, Position, PositionStatus, SpotPosition, SpotSide,
};
pub use prediction::{Direction, Prediction};
pub use traits::{PriceResult, PriceSource};
