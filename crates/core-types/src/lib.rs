pub mod enums;
pub mod error;
pub mod numeric;
pub mod structs;
pub mod time;

// Re-export the core types to provide a clean public API.
pub use enums::TradeSide;
pub use error::CoreError;
pub use structs::{
    Holding, Instrument, InstrumentInfo, Kline, PositionEntry, PositionSnapshot, TradeEvent,
};
