// Technical indicators over bar windows

pub mod market_analysis;
pub mod moving_average;

pub use market_analysis::{
    calculate_average_volume, close_change_pct, preceding_average_volume, resistance_level,
    support_level,
};
pub use moving_average::{calculate_sma, is_above_sma};
